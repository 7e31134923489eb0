use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedReceiver;

use super::snapshot::Snapshot;
use crate::azdo::Build;

/// Which gauge family a per-build duration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildPhase {
    /// Finished build: finish - start.
    Completed,
    /// Active build without a start time: now - queue.
    Queued,
    /// Active build that has started: now - start.
    Running,
}

/// Per-project build counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountKind {
    Total,
    Running,
    Queued,
}

/// Result outcomes tallied per definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl Outcome {
    /// Maps a build result string, `None` for anything not tallied.
    pub fn from_result(result: &str) -> Option<Self> {
        match result {
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            // The REST API spells it "canceled".
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Duration distributions observed over finished builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistogramKind {
    /// finish - queue
    Total,
    /// start - queue
    Queue,
    /// finish - start
    Run,
}

/// Label values attached to every per-build gauge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLabels {
    pub project: String,
    pub build_id: String,
    pub build_number: String,
    pub definition_id: String,
    pub definition_name: String,
    pub status: String,
    pub result: String,
}

impl BuildLabels {
    fn new(project: &str, build: &Build) -> Self {
        Self {
            project: project.to_owned(),
            build_id: build.id.to_string(),
            build_number: build.number.clone(),
            definition_id: build.definition.id.to_string(),
            definition_name: build.definition.name.clone(),
            status: build.status.clone(),
            result: build.result.clone(),
        }
    }

    pub fn values(&self) -> [&str; 7] {
        [
            &self.project,
            &self.build_id,
            &self.build_number,
            &self.definition_id,
            &self.definition_name,
            &self.status,
            &self.result,
        ]
    }
}

/// Label values of a per-definition result tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionLabels {
    pub project: String,
    pub definition_id: String,
    pub definition_name: String,
}

impl DefinitionLabels {
    pub fn values(&self) -> [&str; 3] {
        [&self.project, &self.definition_id, &self.definition_name]
    }
}

/// A single metric value derived from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    BuildDuration {
        phase: BuildPhase,
        labels: BuildLabels,
        seconds: f64,
    },
    ProjectCount {
        kind: CountKind,
        project: String,
        count: usize,
    },
    ResultTally {
        outcome: Outcome,
        labels: DefinitionLabels,
        count: usize,
    },
    Histogram {
        kind: HistogramKind,
        project: String,
        samples: Vec<f64>,
    },
    ScrapeDuration {
        seconds: f64,
    },
}

/// Derives the full metric set of one snapshot.
///
/// `now` is the reference time for in-flight builds. No state is kept between
/// calls, so snapshots can be derived in any order.
pub fn derive(snapshot: &Snapshot, now: DateTime<Utc>) -> Vec<Observation> {
    let project = snapshot.project.name.as_str();
    let mut observations = Vec::new();

    observations.extend(completion_gauges(project, &snapshot.finished));
    observations.extend(in_flight_gauges(project, &snapshot.active, now));
    observations.extend(histograms(project, &snapshot.finished));
    observations.extend(project_counts(project, snapshot));
    observations.extend(result_tallies(project, &snapshot.finished));

    observations
}

/// Drains `snapshots` and derives each one as it arrives.
///
/// Every snapshot of a cycle is measured against the same `now`. Returns once
/// the sending side has closed the channel.
pub async fn derive_all(
    mut snapshots: UnboundedReceiver<Snapshot>,
    now: DateTime<Utc>,
) -> Vec<Observation> {
    let mut staged = Vec::new();
    while let Some(snapshot) = snapshots.recv().await {
        staged.extend(derive(&snapshot, now));
    }
    staged
}

#[allow(clippy::cast_precision_loss)]
fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

fn elapsed(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Option<f64> {
    Some(seconds_between(from?, to?))
}

fn completion_gauges<'a>(
    project: &'a str,
    finished: &'a [Build],
) -> impl Iterator<Item = Observation> + 'a {
    finished.iter().filter_map(move |build| {
        let seconds = elapsed(build.start_time, build.finish_time)?;
        Some(Observation::BuildDuration {
            phase: BuildPhase::Completed,
            labels: BuildLabels::new(project, build),
            seconds,
        })
    })
}

fn in_flight_gauges<'a>(
    project: &'a str,
    active: &'a [Build],
    now: DateTime<Utc>,
) -> impl Iterator<Item = Observation> + 'a {
    active.iter().map(move |build| {
        let (phase, seconds) = match build.start_time {
            None => (
                BuildPhase::Queued,
                build.queue_time.map_or(0.0, |queued| seconds_between(queued, now)),
            ),
            Some(started) => (BuildPhase::Running, seconds_between(started, now)),
        };
        Observation::BuildDuration {
            phase,
            labels: BuildLabels::new(project, build),
            seconds,
        }
    })
}

fn histograms(project: &str, finished: &[Build]) -> [Observation; 3] {
    let samples = |from: fn(&Build) -> Option<DateTime<Utc>>, to: fn(&Build) -> Option<DateTime<Utc>>| {
        finished
            .iter()
            .filter_map(|build| elapsed(from(build), to(build)))
            .collect::<Vec<_>>()
    };

    [
        Observation::Histogram {
            kind: HistogramKind::Total,
            project: project.to_owned(),
            samples: samples(|b| b.queue_time, |b| b.finish_time),
        },
        Observation::Histogram {
            kind: HistogramKind::Queue,
            project: project.to_owned(),
            samples: samples(|b| b.queue_time, |b| b.start_time),
        },
        Observation::Histogram {
            kind: HistogramKind::Run,
            project: project.to_owned(),
            samples: samples(|b| b.start_time, |b| b.finish_time),
        },
    ]
}

fn project_counts(project: &str, snapshot: &Snapshot) -> [Observation; 3] {
    let queued = snapshot.active.iter().filter(|b| b.is_queued()).count();
    let running = snapshot.active.len() - queued;
    let total = snapshot.finished.len() + snapshot.active.len();

    [
        (CountKind::Total, total),
        (CountKind::Running, running),
        (CountKind::Queued, queued),
    ]
    .map(|(kind, count)| Observation::ProjectCount {
        kind,
        project: project.to_owned(),
        count,
    })
}

#[derive(Default)]
struct Tally {
    definition_name: String,
    succeeded: usize,
    failed: usize,
    cancelled: usize,
}

fn result_tallies(project: &str, finished: &[Build]) -> Vec<Observation> {
    let mut by_definition: BTreeMap<i64, Tally> = BTreeMap::new();

    for build in finished {
        let tally = by_definition
            .entry(build.definition.id)
            .or_insert_with(|| Tally {
                definition_name: build.definition.name.clone(),
                ..Tally::default()
            });

        match Outcome::from_result(&build.result) {
            Some(Outcome::Succeeded) => tally.succeeded += 1,
            Some(Outcome::Failed) => tally.failed += 1,
            Some(Outcome::Cancelled) => tally.cancelled += 1,
            None => {}
        }
    }

    by_definition
        .into_iter()
        .flat_map(|(definition_id, tally)| {
            let labels = DefinitionLabels {
                project: project.to_owned(),
                definition_id: definition_id.to_string(),
                definition_name: tally.definition_name,
            };
            [
                (Outcome::Succeeded, tally.succeeded),
                (Outcome::Failed, tally.failed),
                (Outcome::Cancelled, tally.cancelled),
            ]
            .map(|(outcome, count)| Observation::ResultTally {
                outcome,
                labels: labels.clone(),
                count,
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::azdo::{Definition, Project};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn at(secs: i64) -> Option<DateTime<Utc>> {
        Some(t0() + Duration::seconds(secs))
    }

    fn build(id: i64, definition: i64, result: &str) -> Build {
        Build {
            id,
            number: format!("2024.{id}"),
            status: "completed".to_string(),
            result: result.to_string(),
            queue_time: at(0),
            start_time: at(10),
            finish_time: at(70),
            receive_time: None,
            definition: Definition {
                id: definition,
                name: format!("def-{definition}"),
            },
        }
    }

    fn active(id: i64, queued: i64, started: Option<i64>) -> Build {
        Build {
            status: if started.is_some() { "inProgress" } else { "notStarted" }.to_string(),
            result: String::new(),
            queue_time: at(queued),
            start_time: started.and_then(at),
            finish_time: None,
            ..build(id, 1, "")
        }
    }

    fn snapshot(finished: Vec<Build>, active: Vec<Build>) -> Snapshot {
        Snapshot {
            project: Project::from_name("P1"),
            finished,
            active,
        }
    }

    fn durations(observations: &[Observation], wanted: BuildPhase) -> Vec<(String, f64)> {
        observations
            .iter()
            .filter_map(|o| match o {
                Observation::BuildDuration { phase, labels, seconds } if *phase == wanted => {
                    Some((labels.build_id.clone(), *seconds))
                }
                _ => None,
            })
            .collect()
    }

    fn count(observations: &[Observation], wanted: CountKind) -> usize {
        observations
            .iter()
            .find_map(|o| match o {
                Observation::ProjectCount { kind, count, .. } if *kind == wanted => Some(*count),
                _ => None,
            })
            .unwrap()
    }

    fn tally(observations: &[Observation], definition: &str, wanted: Outcome) -> usize {
        observations
            .iter()
            .find_map(|o| match o {
                Observation::ResultTally { outcome, labels, count }
                    if *outcome == wanted && labels.definition_id == definition =>
                {
                    Some(*count)
                }
                _ => None,
            })
            .unwrap()
    }

    fn histogram(observations: &[Observation], wanted: HistogramKind) -> Vec<f64> {
        observations
            .iter()
            .find_map(|o| match o {
                Observation::Histogram { kind, samples, .. } if *kind == wanted => Some(samples.clone()),
                _ => None,
            })
            .unwrap()
    }

    mod derive {
        use super::*;

        #[test]
        fn single_project_end_to_end() {
            let now = t0() + Duration::seconds(95);
            let snap = snapshot(vec![build(1, 7, "succeeded")], vec![active(2, 5, None)]);

            let observations = super::super::derive(&snap, now);

            assert_eq!(durations(&observations, BuildPhase::Completed), vec![("1".to_string(), 60.0)]);
            assert_eq!(durations(&observations, BuildPhase::Queued), vec![("2".to_string(), 90.0)]);
            assert!(durations(&observations, BuildPhase::Running).is_empty());
            assert_eq!(count(&observations, CountKind::Total), 2);
            assert_eq!(count(&observations, CountKind::Running), 0);
            assert_eq!(count(&observations, CountKind::Queued), 1);
            assert_eq!(tally(&observations, "7", Outcome::Succeeded), 1);
            assert_eq!(tally(&observations, "7", Outcome::Failed), 0);
            assert_eq!(tally(&observations, "7", Outcome::Cancelled), 0);
        }

        #[test]
        fn labels_carry_build_and_definition_details() {
            let snap = snapshot(vec![build(42, 9, "failed")], vec![]);
            let observations = super::super::derive(&snap, t0());

            let labels = observations
                .iter()
                .find_map(|o| match o {
                    Observation::BuildDuration { labels, .. } => Some(labels.clone()),
                    _ => None,
                })
                .unwrap();

            assert_eq!(
                labels.values(),
                ["P1", "42", "2024.42", "9", "def-9", "completed", "failed"]
            );
        }

        #[test]
        fn empty_snapshot_still_reports_counts_and_histograms() {
            let observations = super::super::derive(&snapshot(vec![], vec![]), t0());

            assert_eq!(count(&observations, CountKind::Total), 0);
            assert!(histogram(&observations, HistogramKind::Total).is_empty());
            assert!(!observations
                .iter()
                .any(|o| matches!(o, Observation::ResultTally { .. })));
        }
    }

    mod completion_gauges {
        use super::*;

        #[test]
        fn reports_negative_durations_unclamped() {
            let mut skewed = build(1, 1, "succeeded");
            skewed.start_time = at(100);
            skewed.finish_time = at(40);

            let observations = super::super::derive(&snapshot(vec![skewed], vec![]), t0());
            assert_eq!(durations(&observations, BuildPhase::Completed), vec![("1".to_string(), -60.0)]);
        }

        #[test]
        fn keeps_sub_second_precision() {
            let mut quick = build(1, 1, "succeeded");
            quick.finish_time = Some(t0() + Duration::milliseconds(10_250));

            let observations = super::super::derive(&snapshot(vec![quick], vec![]), t0());
            assert_eq!(durations(&observations, BuildPhase::Completed), vec![("1".to_string(), 0.25)]);
        }

        #[test]
        fn skips_builds_that_never_started() {
            let mut cancelled = build(1, 1, "canceled");
            cancelled.start_time = None;

            let observations = super::super::derive(&snapshot(vec![cancelled], vec![]), t0());
            assert!(durations(&observations, BuildPhase::Completed).is_empty());
            assert_eq!(tally(&observations, "1", Outcome::Cancelled), 1);
        }
    }

    mod in_flight_gauges {
        use super::*;

        #[test]
        fn partitions_active_builds_by_start_time() {
            let now = t0() + Duration::seconds(300);
            let builds = vec![
                active(1, 0, None),
                active(2, 10, Some(20)),
                active(3, 30, None),
                active(4, 40, Some(100)),
            ];

            let observations = super::super::derive(&snapshot(vec![], builds), now);
            let queued = durations(&observations, BuildPhase::Queued);
            let running = durations(&observations, BuildPhase::Running);

            assert_eq!(queued, vec![("1".to_string(), 300.0), ("3".to_string(), 270.0)]);
            assert_eq!(running, vec![("2".to_string(), 280.0), ("4".to_string(), 200.0)]);
            assert_eq!(count(&observations, CountKind::Queued), 2);
            assert_eq!(count(&observations, CountKind::Running), 2);
            assert_eq!(count(&observations, CountKind::Total), 4);
        }

        #[test]
        fn queued_build_without_queue_time_reports_zero() {
            let mut odd = active(1, 0, None);
            odd.queue_time = None;

            let observations = super::super::derive(&snapshot(vec![], vec![odd]), t0());
            assert_eq!(durations(&observations, BuildPhase::Queued), vec![("1".to_string(), 0.0)]);
        }
    }

    mod histograms {
        use super::*;

        #[test]
        fn observes_only_finished_builds() {
            let finished = vec![build(1, 1, "succeeded"), build(2, 1, "failed")];
            let observations = super::super::derive(
                &snapshot(finished, vec![active(3, 0, Some(5))]),
                t0() + Duration::seconds(600),
            );

            assert_eq!(histogram(&observations, HistogramKind::Total), vec![70.0, 70.0]);
            assert_eq!(histogram(&observations, HistogramKind::Queue), vec![10.0, 10.0]);
            assert_eq!(histogram(&observations, HistogramKind::Run), vec![60.0, 60.0]);
        }
    }

    mod result_tallies {
        use super::*;

        #[test]
        fn groups_by_definition() {
            let finished = vec![
                build(1, 1, "succeeded"),
                build(2, 1, "failed"),
                build(3, 1, "succeeded"),
                build(4, 2, "cancelled"),
                build(5, 2, "canceled"),
            ];

            let observations = super::super::derive(&snapshot(finished, vec![]), t0());

            assert_eq!(tally(&observations, "1", Outcome::Succeeded), 2);
            assert_eq!(tally(&observations, "1", Outcome::Failed), 1);
            assert_eq!(tally(&observations, "1", Outcome::Cancelled), 0);
            assert_eq!(tally(&observations, "2", Outcome::Cancelled), 2);
        }

        #[test]
        fn ignores_unknown_results() {
            let finished = vec![
                build(1, 1, "partiallySucceeded"),
                build(2, 1, ""),
                build(3, 1, "failed"),
            ];

            let observations = super::super::derive(&snapshot(finished, vec![]), t0());
            let total: usize = [Outcome::Succeeded, Outcome::Failed, Outcome::Cancelled]
                .into_iter()
                .map(|o| tally(&observations, "1", o))
                .sum();

            assert_eq!(total, 1);
        }
    }

    #[tokio::test]
    async fn derive_all_consumes_until_channel_closes() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(snapshot(vec![build(1, 1, "succeeded")], vec![])).unwrap();
        tx.send(snapshot(vec![], vec![active(2, 0, None)])).unwrap();
        drop(tx);

        let staged = derive_all(rx, t0()).await;
        let totals: Vec<_> = staged
            .iter()
            .filter(|o| matches!(o, Observation::ProjectCount { kind: CountKind::Total, .. }))
            .collect();
        assert_eq!(totals.len(), 2);
    }

    #[tokio::test]
    async fn derive_all_measures_every_snapshot_from_one_reference_time() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let sender = tokio::spawn(async move {
            tx.send(snapshot(vec![], vec![active(1, 0, None)])).unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            tx.send(snapshot(vec![], vec![active(2, 0, None)])).unwrap();
        });

        let now = t0() + Duration::seconds(100);
        let staged = derive_all(rx, now).await;
        sender.await.unwrap();

        let queued = durations(&staged, BuildPhase::Queued);
        assert_eq!(queued, vec![("1".to_string(), 100.0), ("2".to_string(), 100.0)]);
    }
}
