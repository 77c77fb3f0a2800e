//! Holiday calendar reconciliation and A/B screening for the Favorita store
//! sales dataset.
//!
//! The crate turns the raw holiday/event calendar into a wide per-row feature
//! table aligned with the train and test sales records, then screens each
//! calendar-derived indicator for an association with sales using a
//! two-sample hypothesis test chosen from the data's distribution shape.
//!
//! # Example
//!
//! ```ignore
//! use favorita_eda::{screen_features, HolidayReconciler, SalesTables};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tables = SalesTables::new(train, test, stores, holidays);
//!
//!     let reconciled = HolidayReconciler::new(&tables).run()?;
//!     let verdicts = screen_features(
//!         reconciled.frame(),
//!         reconciled.indicator_columns(),
//!         "sales",
//!     )?;
//!
//!     for verdict in &verdicts {
//!         println!("{}: {} (p = {:.4})", verdict.feature(), verdict.decision(), verdict.p_value());
//!     }
//!     Ok(())
//! }
//! ```

use polars::prelude::{DataFrame, PolarsError};
use thiserror::Error;

pub mod ab_test;
pub mod calendar;
pub mod corrections;
pub mod encoder;
pub mod math;
pub mod prepare;
pub mod reconcile;
pub mod schema;

pub use crate::ab_test::{
    compare_groups, screen_features, screen_features_with_alpha, AbTest, AbTestVerdict, Decision,
    Homogeneity, TestProcedure, TestType,
};
pub use crate::calendar::{HolidayKind, HolidayRecord, Locale};
pub use crate::corrections::KnownCorrection;
pub use crate::encoder::one_hot_encode;
pub use crate::reconcile::{HolidayReconciler, ReconciledTable};

/// Error type for the `favorita_eda` library.
#[derive(Error, Debug)]
pub enum EdaError {
    /// A join or pairing step produced a row count that breaks its invariant.
    #[error("Data integrity violation during {stage}: {detail}")]
    DataIntegrity { stage: &'static str, detail: String },

    /// A required column is missing, has the wrong type, or holds an unknown value.
    #[error("Invalid input schema in table '{table}', column '{column}': expected {expected}")]
    InputSchema {
        table: String,
        column: String,
        expected: String,
    },

    /// A probability distribution rejected its parameters.
    #[error("Distribution error: {0}")]
    Distribution(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

pub type EdaResult<T> = Result<T, EdaError>;

/// The raw tables the reconciliation pipeline consumes.
///
/// Loading is the caller's job; the core only ever sees these frames.
#[derive(Debug, Clone)]
pub struct SalesTables {
    pub train: DataFrame,
    pub test: DataFrame,
    pub stores: DataFrame,
    pub holidays: DataFrame,
}

impl SalesTables {
    pub fn new(train: DataFrame, test: DataFrame, stores: DataFrame, holidays: DataFrame) -> Self {
        Self {
            train,
            test,
            stores,
            holidays,
        }
    }
}
