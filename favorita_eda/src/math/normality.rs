//! Shapiro-Wilk test of normality.
//!
//! Coefficients and the p-value approximation follow Royston (1995),
//! "Remark AS R94", which is valid for 3 <= n <= 5000.

use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;

use crate::{EdaError, EdaResult};

const C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.07119, 4.434685, -2.706056];
const C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
const C3: [f64; 4] = [0.544, -0.39978, 0.025054, -6.714e-4];
const C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
const C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
const C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
const G: [f64; 2] = [-2.273, 0.459];

/// p-value reported when `ln(1 - W)` falls beyond the small-sample bound.
const TINY_P: f64 = 1e-99;

fn poly(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn standard_normal() -> EdaResult<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| EdaError::Distribution(e.to_string()))
}

/// Coefficients for the upper half of the ordered sample, largest first.
fn coefficients(n: usize) -> EdaResult<Vec<f64>> {
    let half = n / 2;
    if n == 3 {
        return Ok(vec![0.5f64.sqrt()]);
    }

    let normal = standard_normal()?;
    let an25 = n as f64 + 0.25;
    // Expected normal order statistics of the lower half (negative).
    let m: Vec<f64> = (1..=half)
        .map(|i| normal.inverse_cdf((i as f64 - 0.375) / an25))
        .collect();
    let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
    let ssumm2 = summ2.sqrt();
    let rsn = 1.0 / (n as f64).sqrt();

    let a1 = poly(&C1, rsn) - m[0] / ssumm2;
    let mut a = vec![0.0; half];
    a[0] = a1;

    let (first, fac) = if n > 5 {
        let a2 = -m[1] / ssumm2 + poly(&C2, rsn);
        a[1] = a2;
        let fac = ((summ2 - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1])
            / (1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2))
            .sqrt();
        (2, fac)
    } else {
        let fac = ((summ2 - 2.0 * m[0] * m[0]) / (1.0 - 2.0 * a1 * a1)).sqrt();
        (1, fac)
    };

    for i in first..half {
        a[i] = -m[i] / fac;
    }
    Ok(a)
}

/// Returns the Shapiro-Wilk statistic `W` and its p-value.
///
/// A constant sample is treated as perfectly normal (`W = 1`, `p = 1`).
pub fn shapiro_wilk(values: &[f64]) -> EdaResult<(f64, f64)> {
    let n = values.len();
    if n < 3 {
        return Err(EdaError::Distribution(format!(
            "Shapiro-Wilk needs at least 3 observations, got {}",
            n
        )));
    }

    let mut x = values.to_vec();
    x.sort_by(|a, b| a.total_cmp(b));
    if x[n - 1] - x[0] <= f64::EPSILON * x[n - 1].abs().max(1.0) {
        return Ok((1.0, 1.0));
    }

    let a = coefficients(n)?;
    let numerator: f64 = a
        .iter()
        .enumerate()
        .map(|(i, ai)| ai * (x[n - 1 - i] - x[i]))
        .sum();
    let mean = x.iter().sum::<f64>() / n as f64;
    let ss: f64 = x.iter().map(|v| (v - mean).powi(2)).sum();
    let w = (numerator * numerator / ss).min(1.0);

    Ok((w, p_value(w, n)?))
}

fn p_value(w: f64, n: usize) -> EdaResult<f64> {
    if n == 3 {
        let p = (6.0 / PI) * (w.sqrt().asin() - PI / 3.0);
        return Ok(p.max(0.0));
    }
    if w >= 1.0 {
        return Ok(1.0);
    }

    let an = n as f64;
    let mut w1 = (1.0 - w).ln();
    let (m, s) = if n <= 11 {
        let gamma = poly(&G, an);
        if w1 >= gamma {
            return Ok(TINY_P);
        }
        w1 = -(gamma - w1).ln();
        (poly(&C3, an), poly(&C4, an).exp())
    } else {
        let ln_n = an.ln();
        (poly(&C5, ln_n), poly(&C6, ln_n).exp())
    };

    Ok(standard_normal()?.sf((w1 - m) / s))
}
