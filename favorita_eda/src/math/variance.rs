//! Levene's test for equality of variances.

use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::math::descriptive::{mean, median};
use crate::{EdaError, EdaResult};

/// Median-centred Levene test (Brown-Forsythe) across `groups`.
///
/// Returns the `W` statistic and its p-value under `F(k - 1, N - k)`. When
/// every group has zero spread around its median the statistic is undefined;
/// the p-value is then 1 if the group spreads agree and 0 otherwise.
pub fn levene(groups: &[&[f64]]) -> EdaResult<(f64, f64)> {
    let k = groups.len();
    let total: usize = groups.iter().map(|g| g.len()).sum();
    if k < 2 || groups.iter().any(|g| g.is_empty()) || total <= k {
        return Err(EdaError::Distribution(format!(
            "Levene's test needs at least two non-empty groups and more observations than groups, got {} groups with {} observations",
            k, total
        )));
    }

    let deviations: Vec<Vec<f64>> = groups
        .iter()
        .map(|g| {
            let centre = median(g);
            g.iter().map(|v| (v - centre).abs()).collect()
        })
        .collect();

    let group_means: Vec<f64> = deviations.iter().map(|z| mean(z)).collect();
    let grand_mean = deviations.iter().flatten().sum::<f64>() / total as f64;

    let between: f64 = deviations
        .iter()
        .zip(&group_means)
        .map(|(z, m)| z.len() as f64 * (m - grand_mean).powi(2))
        .sum();
    let within: f64 = deviations
        .iter()
        .zip(&group_means)
        .map(|(z, m)| z.iter().map(|v| (v - m).powi(2)).sum::<f64>())
        .sum();

    let df_between = (k - 1) as f64;
    let df_within = (total - k) as f64;

    if within == 0.0 {
        let p = if between == 0.0 { 1.0 } else { 0.0 };
        return Ok((f64::NAN, p));
    }

    let statistic = (df_within / df_between) * between / within;
    let f = FisherSnedecor::new(df_between, df_within)
        .map_err(|e| EdaError::Distribution(e.to_string()))?;
    Ok((statistic, f.sf(statistic)))
}
