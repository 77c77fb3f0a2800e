//! Two-group hypothesis testing of a target column split by a binary feature.
//!
//! The test is chosen from the shape of the data: Shapiro-Wilk decides whether
//! both groups look normal, Levene decides whether their variances agree, and
//! [`TestProcedure::select`] maps those answers to Student's t, Welch's t or
//! Mann-Whitney U.

use std::fmt;

use getset::Getters;
use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::math::descriptive::{mean, median};
use crate::math::normality::shapiro_wilk;
use crate::math::two_sample::{mann_whitney_u, student_t, welch_t};
use crate::math::variance::levene;
use crate::schema::{require_columns, ColumnKind};
use crate::EdaResult;

/// Significance level used when none is configured.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Fewest observations a group needs before it is tested.
pub const MIN_GROUP_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestType {
    #[serde(rename = "Parametric")]
    Parametric,
    #[serde(rename = "Non-Parametric")]
    NonParametric,
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TestType::Parametric => write!(f, "Parametric"),
            TestType::NonParametric => write!(f, "Non-Parametric"),
        }
    }
}

/// Outcome of the variance-homogeneity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Homogeneity {
    Yes,
    No,
}

impl fmt::Display for Homogeneity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Homogeneity::Yes => write!(f, "Yes"),
            Homogeneity::No => write!(f, "No"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    #[serde(rename = "Reject H0")]
    Reject,
    #[serde(rename = "Fail to Reject H0")]
    FailToReject,
}

impl Decision {
    fn comment(&self) -> &'static str {
        match self {
            Decision::Reject => "A/B groups are not similar",
            Decision::FailToReject => "A/B groups are similar",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Decision::Reject => write!(f, "Reject H0"),
            Decision::FailToReject => write!(f, "Fail to Reject H0"),
        }
    }
}

/// The two-sample test run for a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestProcedure {
    StudentT,
    WelchT,
    MannWhitneyU,
}

impl TestProcedure {
    /// Picks the test from the normality of each group and, for normal data,
    /// the homogeneity of their variances.
    pub fn select(normal_a: bool, normal_b: bool, homogeneous: bool) -> Self {
        match (normal_a, normal_b, homogeneous) {
            (true, true, true) => TestProcedure::StudentT,
            (true, true, false) => TestProcedure::WelchT,
            _ => TestProcedure::MannWhitneyU,
        }
    }

    pub fn test_type(&self) -> TestType {
        match self {
            TestProcedure::StudentT | TestProcedure::WelchT => TestType::Parametric,
            TestProcedure::MannWhitneyU => TestType::NonParametric,
        }
    }

    pub fn homogeneity(&self) -> Option<Homogeneity> {
        match self {
            TestProcedure::StudentT => Some(Homogeneity::Yes),
            TestProcedure::WelchT => Some(Homogeneity::No),
            TestProcedure::MannWhitneyU => None,
        }
    }

    /// Runs the test and returns its two-sided p-value.
    pub fn p_value(&self, a: &[f64], b: &[f64]) -> EdaResult<f64> {
        let (_, p) = match self {
            TestProcedure::StudentT => student_t(a, b)?,
            TestProcedure::WelchT => welch_t(a, b)?,
            TestProcedure::MannWhitneyU => mann_whitney_u(a, b)?,
        };
        Ok(p)
    }
}

/// The result of comparing the target between the two groups of a feature.
#[derive(Debug, Clone, Getters, Serialize)]
#[getset(get = "pub")]
pub struct AbTestVerdict {
    /// Name of the binary feature column.
    feature: String,
    test_type: TestType,
    /// Present only for parametric tests.
    homogeneity: Option<Homogeneity>,
    decision: Decision,
    p_value: f64,
    comment: String,
    /// Statistics of the target where the feature is 1.
    group_a_mean: f64,
    group_a_median: f64,
    group_a_size: usize,
    /// Statistics of the target where the feature is 0.
    group_b_mean: f64,
    group_b_median: f64,
    group_b_size: usize,
}

/// The main entry point for configuring and running one A/B comparison.
#[derive(Debug, Clone)]
pub struct AbTest<'a> {
    df: &'a DataFrame,
    group: String,
    target: String,
    alpha: f64,
}

impl<'a> AbTest<'a> {
    /// Creates a new `AbTest` splitting `target` by the 0/1 column `group`.
    pub fn new(df: &'a DataFrame, group: &str, target: &str) -> Self {
        Self {
            df,
            group: group.to_string(),
            target: target.to_string(),
            alpha: DEFAULT_ALPHA,
        }
    }

    /// Sets the significance level shared by every test in the chain.
    pub fn alpha(&mut self, alpha: f64) -> &mut Self {
        self.alpha = alpha;
        self
    }

    fn split_groups(&self) -> EdaResult<(Vec<f64>, Vec<f64>)> {
        require_columns(
            self.df,
            "features",
            &[
                (self.group.as_str(), ColumnKind::Numeric),
                (self.target.as_str(), ColumnKind::Numeric),
            ],
        )?;

        let groups = self.df.column(&self.group)?.cast(&DataType::Float64)?;
        let values = self.df.column(&self.target)?.cast(&DataType::Float64)?;

        let mut a = Vec::new();
        let mut b = Vec::new();
        for (g, v) in groups.f64()?.into_iter().zip(values.f64()?.into_iter()) {
            let (Some(g), Some(v)) = (g, v) else {
                continue;
            };
            if v.is_nan() {
                continue;
            }
            if g == 1.0 {
                a.push(v);
            } else if g == 0.0 {
                b.push(v);
            }
        }
        Ok((a, b))
    }

    /// Executes the comparison.
    ///
    /// Returns `Ok(None)` when either group has fewer than three observations.
    pub fn run(&self) -> EdaResult<Option<AbTestVerdict>> {
        let (a, b) = self.split_groups()?;
        if a.len() < MIN_GROUP_SIZE || b.len() < MIN_GROUP_SIZE {
            debug!(
                feature = %self.group,
                group_a = a.len(),
                group_b = b.len(),
                "Insufficient data for A/B test"
            );
            return Ok(None);
        }

        let (_, p_normal_a) = shapiro_wilk(&a)?;
        let (_, p_normal_b) = shapiro_wilk(&b)?;
        let normal_a = p_normal_a >= self.alpha;
        let normal_b = p_normal_b >= self.alpha;

        let homogeneous = if normal_a && normal_b {
            let (_, p_levene) = levene(&[&a, &b])?;
            p_levene >= self.alpha
        } else {
            false
        };

        let procedure = TestProcedure::select(normal_a, normal_b, homogeneous);
        let p_value = procedure.p_value(&a, &b)?;
        let decision = if p_value < self.alpha {
            Decision::Reject
        } else {
            Decision::FailToReject
        };

        debug!(
            feature = %self.group,
            procedure = ?procedure,
            p_value,
            "A/B test complete"
        );

        Ok(Some(AbTestVerdict {
            feature: self.group.clone(),
            test_type: procedure.test_type(),
            homogeneity: procedure.homogeneity(),
            decision,
            p_value,
            comment: decision.comment().to_string(),
            group_a_mean: mean(&a),
            group_a_median: median(&a),
            group_a_size: a.len(),
            group_b_mean: mean(&b),
            group_b_median: median(&b),
            group_b_size: b.len(),
        }))
    }
}

/// Compares `target` between the rows where `group` is 1 and where it is 0,
/// at the default significance level.
pub fn compare_groups(
    df: &DataFrame,
    group: &str,
    target: &str,
) -> EdaResult<Option<AbTestVerdict>> {
    AbTest::new(df, group, target).run()
}

/// Runs [`compare_groups`] for every feature in parallel.
///
/// Features without enough data are skipped. Verdicts are sorted by feature.
pub fn screen_features(
    df: &DataFrame,
    features: &[String],
    target: &str,
) -> EdaResult<Vec<AbTestVerdict>> {
    screen_features_with_alpha(df, features, target, DEFAULT_ALPHA)
}

/// [`screen_features`] at a custom significance level.
pub fn screen_features_with_alpha(
    df: &DataFrame,
    features: &[String],
    target: &str,
    alpha: f64,
) -> EdaResult<Vec<AbTestVerdict>> {
    let results: Vec<Option<AbTestVerdict>> = features
        .par_iter()
        .map(|feature| AbTest::new(df, feature, target).alpha(alpha).run())
        .collect::<EdaResult<_>>()?;

    let mut verdicts: Vec<AbTestVerdict> = results.into_iter().flatten().collect();
    verdicts.sort_by(|x, y| x.feature.cmp(&y.feature));
    debug!(
        features = features.len(),
        verdicts = verdicts.len(),
        "Screened features"
    );
    Ok(verdicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EdaError;

    fn frame(groups: &[i8], sales: &[f64]) -> DataFrame {
        df!("flag" => groups, "sales" => sales).unwrap()
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(TestProcedure::select(true, true, true), TestProcedure::StudentT);
        assert_eq!(TestProcedure::select(true, true, false), TestProcedure::WelchT);
        for homogeneous in [true, false] {
            assert_eq!(
                TestProcedure::select(false, true, homogeneous),
                TestProcedure::MannWhitneyU
            );
            assert_eq!(
                TestProcedure::select(true, false, homogeneous),
                TestProcedure::MannWhitneyU
            );
            assert_eq!(
                TestProcedure::select(false, false, homogeneous),
                TestProcedure::MannWhitneyU
            );
        }
        assert_eq!(TestProcedure::MannWhitneyU.homogeneity(), None);
        assert_eq!(TestProcedure::WelchT.test_type(), TestType::Parametric);
    }

    #[test]
    fn test_insufficient_data_boundary() {
        let two = frame(&[1, 1, 0, 0, 0], &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(compare_groups(&two, "flag", "sales").unwrap().is_none());

        let three = frame(&[1, 1, 1, 0, 0, 0], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let verdict = compare_groups(&three, "flag", "sales").unwrap().unwrap();
        assert_eq!(*verdict.group_a_size(), 3);
        assert_eq!(*verdict.group_b_size(), 3);
    }

    #[test]
    fn test_null_targets_are_dropped() {
        let df = df!(
            "flag" => &[1i8, 1, 1, 0, 0, 0],
            "sales" => &[Some(1.0), None, Some(3.0), Some(4.0), Some(5.0), Some(6.0)]
        )
        .unwrap();
        assert!(compare_groups(&df, "flag", "sales").unwrap().is_none());
    }

    #[test]
    fn test_similar_groups_fail_to_reject() {
        let df = frame(
            &[1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0],
            &[
                1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 1.5, 2.5, 3.5, 4.5, 5.5, 6.5, 7.5, 8.5,
            ],
        );
        let verdict = compare_groups(&df, "flag", "sales").unwrap().unwrap();
        assert_eq!(*verdict.decision(), Decision::FailToReject);
        assert_eq!(verdict.comment(), "A/B groups are similar");
        assert_eq!(*verdict.test_type(), TestType::Parametric);
        assert_eq!(*verdict.homogeneity(), Some(Homogeneity::Yes));
        assert!((verdict.group_a_mean() - 4.5).abs() < 1e-12);
        assert!((verdict.group_b_median() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_separated_groups_reject() {
        let df = frame(
            &[1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0],
            &[9.8, 10.1, 10.0, 9.9, 10.2, 10.0, 19.9, 20.1, 20.0, 19.8, 20.2, 20.0],
        );
        let verdict = compare_groups(&df, "flag", "sales").unwrap().unwrap();
        assert_eq!(*verdict.decision(), Decision::Reject);
        assert_eq!(verdict.comment(), "A/B groups are not similar");
        assert!(*verdict.p_value() < 0.05);
    }

    #[test]
    fn test_swapping_labels_is_symmetric() {
        let groups = [1i8, 0, 1, 0, 1, 0, 1, 0, 1, 0, 0, 0];
        let flipped: Vec<i8> = groups.iter().map(|g| 1 - g).collect();
        let sales = [3.0, 8.0, 4.5, 7.0, 2.0, 9.5, 5.0, 6.0, 3.5, 12.0, 7.5, 30.0];

        let forward = compare_groups(&frame(&groups, &sales), "flag", "sales")
            .unwrap()
            .unwrap();
        let backward = compare_groups(&frame(&flipped, &sales), "flag", "sales")
            .unwrap()
            .unwrap();

        assert!((forward.p_value() - backward.p_value()).abs() < 1e-12);
        assert_eq!(forward.test_type(), backward.test_type());
        assert_eq!(forward.group_a_mean(), backward.group_b_mean());
        assert_eq!(forward.group_a_median(), backward.group_b_median());
        assert_eq!(forward.group_b_size(), backward.group_a_size());
        // the outlying 30.0 makes the second group non-normal
        assert_eq!(*forward.test_type(), TestType::NonParametric);
        assert_eq!(*forward.homogeneity(), None);
        assert_eq!(*backward.homogeneity(), None);
    }

    fn labelled(a: &[f64], b: &[f64]) -> DataFrame {
        let groups: Vec<i8> = a.iter().map(|_| 1).chain(b.iter().map(|_| 0)).collect();
        let sales: Vec<f64> = a.iter().chain(b).copied().collect();
        frame(&groups, &sales)
    }

    #[test]
    fn test_unequal_spreads_use_welch() {
        // normal scores at standard deviations 0.5 and 5
        let a = [9.18, 9.48, 9.66, 9.81, 9.94, 10.06, 10.19, 10.34, 10.52, 10.82];
        let b = [7.8, 10.8, 12.6, 14.1, 15.4, 16.6, 17.9, 19.4, 21.2, 24.2];

        let verdict = compare_groups(&labelled(&a, &b), "flag", "sales")
            .unwrap()
            .unwrap();
        assert_eq!(*verdict.test_type(), TestType::Parametric);
        assert_eq!(*verdict.homogeneity(), Some(Homogeneity::No));

        let (_, welch_p) = welch_t(&a, &b).unwrap();
        let (_, student_p) = student_t(&a, &b).unwrap();
        assert!((verdict.p_value() - welch_p).abs() < 1e-12);
        assert!((verdict.p_value() - student_p).abs() > 1e-4);
        assert_eq!(*verdict.decision(), Decision::Reject);
    }

    #[test]
    fn test_skewed_group_uses_mann_whitney() {
        let mut a = vec![1.0; 11];
        a.push(100.0);
        let b = [
            3.27, 3.85, 4.19, 4.45, 4.68, 4.9, 5.1, 5.32, 5.55, 5.81, 6.15, 6.73,
        ];

        let verdict = compare_groups(&labelled(&a, &b), "flag", "sales")
            .unwrap()
            .unwrap();
        assert_eq!(*verdict.test_type(), TestType::NonParametric);
        assert_eq!(*verdict.homogeneity(), None);

        let (_, expected) = mann_whitney_u(&a, &b).unwrap();
        assert!((verdict.p_value() - expected).abs() < 1e-12);
        assert_eq!(*verdict.decision(), Decision::Reject);
        assert!((verdict.group_a_median() - 1.0).abs() < 1e-12);
        assert_eq!(*verdict.group_a_size(), 12);
    }

    #[test]
    fn test_missing_target_is_schema_error() {
        let df = frame(&[1, 0, 1], &[1.0, 2.0, 3.0]);
        let err = compare_groups(&df, "flag", "revenue").unwrap_err();
        assert!(matches!(err, EdaError::InputSchema { .. }));
    }

    #[test]
    fn test_screen_skips_and_sorts() {
        let df = df!(
            "sales" => &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
            "local_b" => &[1i8, 1, 1, 1, 0, 0, 0, 0],
            "events_a" => &[0i8, 1, 0, 1, 0, 1, 0, 1],
            "holiday_rare" => &[1i8, 0, 0, 0, 0, 0, 0, 0]
        )
        .unwrap();
        let features = vec![
            "local_b".to_string(),
            "events_a".to_string(),
            "holiday_rare".to_string(),
        ];

        let verdicts = screen_features(&df, &features, "sales").unwrap();
        let names: Vec<&str> = verdicts.iter().map(|v| v.feature().as_str()).collect();
        assert_eq!(names, vec!["events_a", "local_b"]);
    }
}
