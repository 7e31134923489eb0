use prometheus::{Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

use super::buckets::{duration_buckets, queue_buckets};
use super::derive::{BuildPhase, CountKind, HistogramKind, Observation, Outcome};
use crate::error::Result;

const BUILD_LABELS: [&str; 7] = [
    "Project",
    "BuildId",
    "BuildNumber",
    "DefinitionId",
    "DefinitionName",
    "status",
    "result",
];
const PROJECT_LABELS: [&str; 1] = ["project"];
const DEFINITION_LABELS: [&str; 3] = ["Project", "DefinitionId", "DefinitionName"];

/// Destination for observations of completed cycles.
pub trait MetricsSink: Send + Sync {
    fn publish(&self, observation: Observation);
}

/// Prometheus registry holding every metric family the exporter exposes.
///
/// A fresh instance is created per scrape request, so only values of the
/// cycles that ran for that request are rendered.
pub struct BuildMetrics {
    registry: Registry,
    scrape_duration: GaugeVec,
    complete_in: GaugeVec,
    queued_in: GaugeVec,
    running_in: GaugeVec,
    build_count: GaugeVec,
    queued_count: GaugeVec,
    running_count: GaugeVec,
    result_success: GaugeVec,
    result_failed: GaugeVec,
    result_cancelled: GaugeVec,
    total_length: HistogramVec,
    queue_length: HistogramVec,
    running_length: HistogramVec,
}

impl BuildMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let gauge = |name: &str, help: &str, labels: &[&str]| -> Result<GaugeVec> {
            let vec = GaugeVec::new(Opts::new(name, help), labels)?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };
        let histogram = |name: &str, help: &str, buckets: Vec<f64>| -> Result<HistogramVec> {
            let vec = HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets), &PROJECT_LABELS)?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };

        let metrics = Self {
            scrape_duration: gauge(
                "azdo_build_build_total_scrape_duration_seconds",
                "Duration of time it took to scrape total of builds",
                &[],
            )?,
            complete_in: gauge(
                "azdo_build_complete_in_seconds",
                "Build complete in seconds",
                &BUILD_LABELS,
            )?,
            queued_in: gauge(
                "azdo_build_queued_in_seconds",
                "Build queued in seconds",
                &BUILD_LABELS,
            )?,
            running_in: gauge(
                "azdo_build_running_in_seconds",
                "Build running in seconds",
                &BUILD_LABELS,
            )?,
            build_count: gauge(
                "azdo_build_count",
                "Total of builds for project",
                &PROJECT_LABELS,
            )?,
            queued_count: gauge(
                "azdo_build_queued_count",
                "Total of queued builds for project",
                &PROJECT_LABELS,
            )?,
            running_count: gauge(
                "azdo_build_running_count",
                "Total of running builds for project",
                &PROJECT_LABELS,
            )?,
            result_success: gauge(
                "azdo_build_result_success_count",
                "Build Result Success",
                &DEFINITION_LABELS,
            )?,
            result_failed: gauge(
                "azdo_build_result_failed_count",
                "Build Result Failed",
                &DEFINITION_LABELS,
            )?,
            result_cancelled: gauge(
                "azdo_build_result_cancelled_count",
                "Build Result Cancelled",
                &DEFINITION_LABELS,
            )?,
            total_length: histogram(
                "azdo_build_total_length_secs",
                "Total length of build duration including queue time",
                duration_buckets(),
            )?,
            queue_length: histogram(
                "azdo_build_queue_length_secs",
                "Total length of queue duration for build",
                queue_buckets(),
            )?,
            running_length: histogram(
                "azdo_build_running_length_secs",
                "Total length of run duration for build",
                duration_buckets(),
            )?,
            registry,
        };

        Ok(metrics)
    }

    /// Renders everything published so far in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl MetricsSink for BuildMetrics {
    #[allow(clippy::cast_precision_loss)]
    fn publish(&self, observation: Observation) {
        match observation {
            Observation::BuildDuration {
                phase,
                labels,
                seconds,
            } => {
                let family = match phase {
                    BuildPhase::Completed => &self.complete_in,
                    BuildPhase::Queued => &self.queued_in,
                    BuildPhase::Running => &self.running_in,
                };
                family.with_label_values(&labels.values()).set(seconds);
            }
            Observation::ProjectCount {
                kind,
                project,
                count,
            } => {
                let family = match kind {
                    CountKind::Total => &self.build_count,
                    CountKind::Running => &self.running_count,
                    CountKind::Queued => &self.queued_count,
                };
                family.with_label_values(&[project.as_str()]).set(count as f64);
            }
            Observation::ResultTally {
                outcome,
                labels,
                count,
            } => {
                let family = match outcome {
                    Outcome::Succeeded => &self.result_success,
                    Outcome::Failed => &self.result_failed,
                    Outcome::Cancelled => &self.result_cancelled,
                };
                family.with_label_values(&labels.values()).set(count as f64);
            }
            Observation::Histogram {
                kind,
                project,
                samples,
            } => {
                let family = match kind {
                    HistogramKind::Total => &self.total_length,
                    HistogramKind::Queue => &self.queue_length,
                    HistogramKind::Run => &self.running_length,
                };
                let histogram = family.with_label_values(&[project.as_str()]);
                for sample in samples {
                    histogram.observe(sample);
                }
            }
            Observation::ScrapeDuration { seconds } => {
                self.scrape_duration.with_label_values(&[]).set(seconds);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::derive::{BuildLabels, DefinitionLabels};

    fn labels() -> BuildLabels {
        BuildLabels {
            project: "P1".to_string(),
            build_id: "12".to_string(),
            build_number: "20240601.1".to_string(),
            definition_id: "3".to_string(),
            definition_name: "ci".to_string(),
            status: "completed".to_string(),
            result: "succeeded".to_string(),
        }
    }

    #[test]
    fn renders_per_build_gauge_with_all_labels() {
        let metrics = BuildMetrics::new().unwrap();
        metrics.publish(Observation::BuildDuration {
            phase: BuildPhase::Completed,
            labels: labels(),
            seconds: 60.0,
        });

        let text = metrics.encode().unwrap();
        assert!(text.contains(
            r#"azdo_build_complete_in_seconds{BuildId="12",BuildNumber="20240601.1",DefinitionId="3",DefinitionName="ci",Project="P1",result="succeeded",status="completed"} 60"#
        ));
        assert!(!text.contains("azdo_build_queued_in_seconds{"));
    }

    #[test]
    fn renders_counts_and_tallies() {
        let metrics = BuildMetrics::new().unwrap();
        metrics.publish(Observation::ProjectCount {
            kind: CountKind::Queued,
            project: "P1".to_string(),
            count: 4,
        });
        metrics.publish(Observation::ResultTally {
            outcome: Outcome::Failed,
            labels: DefinitionLabels {
                project: "P1".to_string(),
                definition_id: "3".to_string(),
                definition_name: "ci".to_string(),
            },
            count: 2,
        });

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"azdo_build_queued_count{project="P1"} 4"#));
        assert!(text.contains(
            r#"azdo_build_result_failed_count{DefinitionId="3",DefinitionName="ci",Project="P1"} 2"#
        ));
    }

    #[test]
    fn renders_histogram_buckets() {
        let metrics = BuildMetrics::new().unwrap();
        metrics.publish(Observation::Histogram {
            kind: HistogramKind::Queue,
            project: "P1".to_string(),
            samples: vec![3.0, 300.0],
        });

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"azdo_build_queue_length_secs_bucket{project="P1",le="4"} 1"#));
        assert!(text.contains(r#"azdo_build_queue_length_secs_bucket{project="P1",le="512"} 2"#));
        assert!(text.contains(r#"azdo_build_queue_length_secs_count{project="P1"} 2"#));
    }

    #[test]
    fn renders_nothing_before_publish() {
        let metrics = BuildMetrics::new().unwrap();
        let text = metrics.encode().unwrap();
        assert!(!text.lines().any(|line| line.starts_with("azdo_build")));
    }

    #[test]
    fn renders_scrape_duration_without_labels() {
        let metrics = BuildMetrics::new().unwrap();
        metrics.publish(Observation::ScrapeDuration { seconds: 1.5 });

        let text = metrics.encode().unwrap();
        assert!(text.contains("azdo_build_build_total_scrape_duration_seconds 1.5"));
    }
}
