//! Summary statistics over plain slices.

use statrs::statistics::{Data, OrderStatistics, RankTieBreaker, Statistics};

/// Arithmetic mean. `NaN` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    values.mean()
}

/// Sample variance (`n - 1` denominator). `NaN` below two observations.
pub fn variance(values: &[f64]) -> f64 {
    values.variance()
}

/// Median, averaging the two middle values for even lengths.
pub fn median(values: &[f64]) -> f64 {
    let mut data = Data::new(values.to_vec());
    data.median()
}

/// Average ranks (1-based), ties receiving the mean of the ranks they span.
///
/// Also returns the tie group sizes greater than one. Values must not be `NaN`.
pub fn average_ranks(values: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let ranks = Data::new(values.to_vec()).ranks(RankTieBreaker::Average);

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let ties = sorted
        .chunk_by(|a, b| a == b)
        .map(|group| group.len())
        .filter(|&len| len > 1)
        .collect();
    (ranks, ties)
}
