//! Scrape-and-aggregate pipeline.
//!
//! A cycle lists projects, fetches every project's builds concurrently
//! ([`snapshot`]), derives metric observations from each snapshot as it arrives
//! ([`derive`]) and, only if every project succeeded, publishes them to a
//! metrics sink ([`publish`]). [`Collector`] owns the watermark that links
//! consecutive cycles.

mod buckets;
mod cycle;
mod derive;
mod publish;
mod snapshot;

pub use cycle::Collector;
pub use publish::BuildMetrics;

#[cfg(test)]
pub(crate) use snapshot::tests as snapshot_fixtures;
