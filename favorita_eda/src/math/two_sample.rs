//! Two-sided two-sample location tests.

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::math::descriptive::{average_ranks, mean, variance};
use crate::{EdaError, EdaResult};

/// Largest group size for which the exact Mann-Whitney distribution is used.
pub const EXACT_MWU_MAX_GROUP: usize = 8;

fn check_sizes(a: &[f64], b: &[f64], min: usize, test: &str) -> EdaResult<()> {
    if a.len() < min || b.len() < min {
        return Err(EdaError::Distribution(format!(
            "{} needs at least {} observations per group, got {} and {}",
            test,
            min,
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

fn t_p_value(t: f64, df: f64) -> EdaResult<f64> {
    let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| EdaError::Distribution(e.to_string()))?;
    Ok((2.0 * dist.sf(t.abs())).min(1.0))
}

/// p-value for a zero standard error: the samples either agree exactly or
/// differ with certainty.
fn degenerate(mean_a: f64, mean_b: f64) -> (f64, f64) {
    if mean_a == mean_b {
        (f64::NAN, 1.0)
    } else {
        (f64::INFINITY.copysign(mean_a - mean_b), 0.0)
    }
}

/// Student's t-test with pooled variance. Returns `(t, p)`.
pub fn student_t(a: &[f64], b: &[f64]) -> EdaResult<(f64, f64)> {
    check_sizes(a, b, 2, "Student's t-test")?;
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (m1, m2) = (mean(a), mean(b));
    let df = n1 + n2 - 2.0;
    let pooled = ((n1 - 1.0) * variance(a) + (n2 - 1.0) * variance(b)) / df;
    let se = (pooled * (1.0 / n1 + 1.0 / n2)).sqrt();
    if se == 0.0 {
        return Ok(degenerate(m1, m2));
    }
    let t = (m1 - m2) / se;
    Ok((t, t_p_value(t, df)?))
}

/// Welch's unequal-variance t-test. Returns `(t, p)`.
pub fn welch_t(a: &[f64], b: &[f64]) -> EdaResult<(f64, f64)> {
    check_sizes(a, b, 2, "Welch's t-test")?;
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (m1, m2) = (mean(a), mean(b));
    let q1 = variance(a) / n1;
    let q2 = variance(b) / n2;
    let se = (q1 + q2).sqrt();
    if se == 0.0 {
        return Ok(degenerate(m1, m2));
    }
    let t = (m1 - m2) / se;
    let df = (q1 + q2).powi(2) / (q1 * q1 / (n1 - 1.0) + q2 * q2 / (n2 - 1.0));
    Ok((t, t_p_value(t, df)?))
}

/// Mann-Whitney U test. Returns `(U, p)` with `U = max(U1, U2)`.
///
/// The exact null distribution is used when either group has at most
/// [`EXACT_MWU_MAX_GROUP`] observations and there are no ties; otherwise the
/// normal approximation with tie and continuity corrections.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> EdaResult<(f64, f64)> {
    check_sizes(a, b, 1, "Mann-Whitney U")?;
    let (n1, n2) = (a.len(), b.len());
    let pooled: Vec<f64> = a.iter().chain(b).copied().collect();
    let (ranks, ties) = average_ranks(&pooled);

    let r1: f64 = ranks[..n1].iter().sum();
    let u1 = r1 - (n1 * (n1 + 1)) as f64 / 2.0;
    let u2 = (n1 * n2) as f64 - u1;
    let u = u1.max(u2);

    let p = if ties.is_empty() && n1.min(n2) <= EXACT_MWU_MAX_GROUP {
        2.0 * exact_sf(u.round() as usize, n1, n2)
    } else {
        2.0 * asymptotic_sf(u, n1, n2, &ties)?
    };
    Ok((u, p.min(1.0)))
}

/// `P(U >= u)` under the null, read from the lower tail `P(U <= mn - u)` of
/// the symmetric distribution.
///
/// The counts are the coefficients of `prod_{i=1..m} (1 - q^(n+i)) / (1 - q^i)`,
/// `m` the smaller group, truncated to degree `mn - u`. Below degree `n + 1`
/// the numerator factors drop out and the counts are built by additions only,
/// so the far tail keeps its relative precision.
fn exact_sf(u: usize, n1: usize, n2: usize) -> f64 {
    let (m, n) = if n1 <= n2 { (n1, n2) } else { (n2, n1) };
    let max_u = m * n;
    if u > max_u {
        return 0.0;
    }

    let tail = max_u - u;
    let mut counts = vec![0.0f64; tail + 1];
    counts[0] = 1.0;
    for i in 1..=m {
        // multiply by (1 - q^(n+i)), truncated to the tail degree
        let shift = n + i;
        for k in (shift..=tail).rev() {
            counts[k] -= counts[k - shift];
        }
        // divide by (1 - q^i)
        for k in i..=tail {
            counts[k] += counts[k - i];
        }
    }

    // C(m + n, m) arrangements
    let total: f64 = (1..=m).map(|i| (n + i) as f64 / i as f64).product();
    (counts.iter().sum::<f64>() / total).min(1.0)
}

fn asymptotic_sf(u: f64, n1: usize, n2: usize, ties: &[usize]) -> EdaResult<f64> {
    let (f1, f2) = (n1 as f64, n2 as f64);
    let n = f1 + f2;
    let mu = f1 * f2 / 2.0;
    let tie_term: f64 = ties
        .iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum::<f64>()
        / (n * (n - 1.0));
    let sigma = (f1 * f2 / 12.0 * ((n + 1.0) - tie_term)).sqrt();
    if !(sigma > 0.0) {
        return Ok(0.5);
    }
    let z = (u - mu - 0.5) / sigma;
    let normal = Normal::new(0.0, 1.0).map_err(|e| EdaError::Distribution(e.to_string()))?;
    Ok(normal.sf(z))
}
