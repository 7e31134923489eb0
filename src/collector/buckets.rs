/// Bucket upper bounds for total and run duration histograms, in seconds.
///
/// Four linear segments, each continuing from the last bound of the previous one:
/// 8 buckets 15s apart, 10 buckets 30s apart, 28 buckets 60s apart and 11
/// buckets 300s apart. Short builds get fine resolution, long tails coarse.
pub fn duration_buckets() -> Vec<f64> {
    let mut bounds = linear_segment(0.0, 15.0, 8);
    for (gap, count) in [(30.0, 10), (60.0, 28), (300.0, 11)] {
        let start = bounds.last().copied().unwrap_or_default();
        bounds.extend(linear_segment(start, gap, count));
    }
    bounds
}

/// Bucket upper bounds for queue time histograms: 1s doubling, ten buckets.
pub fn queue_buckets() -> Vec<f64> {
    (0..10).map(|exp| f64::from(1u32 << exp)).collect()
}

/// `count` bounds spaced `gap` apart, the first one at `start + gap`.
fn linear_segment(start: f64, gap: f64, count: usize) -> Vec<f64> {
    let mut bound = start;
    (0..count)
        .map(|_| {
            bound += gap;
            bound
        })
        .collect()
}
