//! The holiday/event reconciliation pipeline.
//!
//! [`HolidayReconciler`] takes the raw sales, store and holiday tables and
//! produces one wide table with a row per sales record and the calendar
//! expressed as indicator columns. Every join is a left join whose row count
//! is checked; any change is reported as [`EdaError::DataIntegrity`].

use std::collections::HashSet;

use chrono::NaiveDate;
use comfy_table::{Cell, Table};
use getset::Getters;
use polars::prelude::*;
use tracing::{debug, info};

use crate::calendar::{
    entries_frame, normalize_records, read_holidays, resolve_transfers, CalendarParts,
};
use crate::corrections::{
    default_corrections, drop_duplicate_events, force_indicators, KnownCorrection,
};
use crate::encoder::one_hot_encode;
use crate::schema::{
    is_indicator_column, require_columns, ColumnKind, CITY, CLUSTER, DATE, EVENTS, FAMILY,
    HOLIDAY_COLUMNS, HOLIDAY_LOCAL, HOLIDAY_NATIONAL, HOLIDAY_REGIONAL, IS_WORK_DAY, ONPROMOTION,
    SALES, STATE, STORE_COLUMNS, STORE_NBR, STORE_TYPE, TEST_COLUMNS, TRAIN_COLUMNS, TYPE,
};
use crate::{EdaError, EdaResult, SalesTables};

/// National holiday descriptions that commemorate independence.
pub const INDEPENDENCE_HOLIDAYS: [&str; 5] = [
    "Batalla de Pichincha",
    "Independencia de Cuenca",
    "Independencia de Guayaquil",
    "Independecia de Guayaquil",
    "Primer Grito de Independencia",
];

/// Canonical label for every football tournament event.
pub const FOOTBALL_EVENT: &str = "Futbol";

const DEFAULT_MAX_TRANSFER_SHIFT_DAYS: i64 = 31;

/// The main entry point for configuring and running the reconciliation.
#[derive(Debug, Clone)]
pub struct HolidayReconciler<'a> {
    tables: &'a SalesTables,
    max_transfer_shift_days: i64,
    corrections: Vec<KnownCorrection>,
}

/// The enriched feature table.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct ReconciledTable {
    /// One row per train and test record.
    frame: DataFrame,
    /// Every `events*`, `holiday*`, `national*` and `local*` column, in frame order.
    indicator_columns: Vec<String>,
}

impl ReconciledTable {
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Prints the shape of the table and how many rows each indicator flags.
    pub fn summary(&self) {
        println!("Holiday Reconciliation Results");
        println!("========================================");
        println!("Rows: {}", self.frame.height());
        println!("Columns: {}", self.frame.width());
        println!("Indicator columns: {}", self.indicator_columns.len());
        println!();

        let mut table = Table::new();
        table.set_header(vec!["Indicator", "Rows flagged"]);
        for name in &self.indicator_columns {
            let flagged = self
                .frame
                .column(name)
                .ok()
                .and_then(|c| c.cast(&DataType::Int64).ok())
                .and_then(|c| c.i64().ok().and_then(|ca| ca.sum()))
                .unwrap_or(0);
            table.add_row(vec![Cell::new(name), Cell::new(flagged)]);
        }
        println!("{}", table);
    }
}

impl<'a> HolidayReconciler<'a> {
    /// Creates a new `HolidayReconciler` over the given tables.
    pub fn new(tables: &'a SalesTables) -> Self {
        Self {
            tables,
            max_transfer_shift_days: DEFAULT_MAX_TRANSFER_SHIFT_DAYS,
            corrections: default_corrections(),
        }
    }

    /// Sets how far, in days, a `Transfer` record may sit from the nominal
    /// date of the holiday it moves. Defaults to 31.
    pub fn max_transfer_shift_days(&mut self, days: i64) -> &mut Self {
        self.max_transfer_shift_days = days;
        self
    }

    /// Replaces the known corrections applied to the event calendar.
    pub fn corrections(&mut self, corrections: Vec<KnownCorrection>) -> &mut Self {
        self.corrections = corrections;
        self
    }

    fn validate(&self) -> EdaResult<()> {
        require_columns(&self.tables.holidays, "holidays", &HOLIDAY_COLUMNS)?;
        require_columns(&self.tables.train, "train", &TRAIN_COLUMNS)?;
        require_columns(&self.tables.test, "test", &TEST_COLUMNS)?;
        if self.tables.test.column(SALES).is_ok() {
            require_columns(&self.tables.test, "test", &[(SALES, ColumnKind::Numeric)])?;
        }
        require_columns(&self.tables.stores, "stores", &STORE_COLUMNS)?;
        Ok(())
    }

    /// Classifies the raw holiday table into its side tables.
    pub fn classify_calendar(&self) -> EdaResult<CalendarParts> {
        require_columns(&self.tables.holidays, "holidays", &HOLIDAY_COLUMNS)?;
        let records = read_holidays(&self.tables.holidays)?;
        let raw = records.len();
        let records = resolve_transfers(records, self.max_transfer_shift_days)?;
        let records = normalize_records(records);
        let parts = CalendarParts::partition(records);
        debug!(
            raw,
            national = parts.national.len(),
            regional = parts.regional.len(),
            local = parts.local.len(),
            events = parts.events.len(),
            work_days = parts.work_days.len(),
            "Classified holiday calendar"
        );
        Ok(parts)
    }

    /// Executes the reconciliation.
    pub fn run(&self) -> EdaResult<ReconciledTable> {
        self.validate()?;

        let calendar = self.classify_calendar()?;
        let facts = self.assemble_facts(&calendar)?;
        let facts = self.merge_events(facts, &calendar)?;
        let facts = derive_features(facts)?;
        let facts = expand_descriptions(facts)?;
        let frame = normalize_types(facts)?;

        let indicator_columns: Vec<String> = frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .filter(|s| is_indicator_column(s))
            .collect();

        info!(
            rows = frame.height(),
            columns = frame.width(),
            indicators = indicator_columns.len(),
            "Reconciled holiday calendar"
        );

        Ok(ReconciledTable {
            frame,
            indicator_columns,
        })
    }

    fn sales_facts(&self) -> EdaResult<DataFrame> {
        let projection = |has_sales: bool| {
            vec![
                col(DATE),
                col(STORE_NBR).cast(DataType::Int64),
                col(FAMILY).cast(DataType::String),
                if has_sales {
                    col(SALES).cast(DataType::Float64)
                } else {
                    lit(NULL).cast(DataType::Float64).alias(SALES)
                },
                col(ONPROMOTION).cast(DataType::Float64),
            ]
        };

        let train = self.tables.train.clone().lazy().select(projection(true));
        let test_has_sales = self.tables.test.column(SALES).is_ok();
        let test = self
            .tables
            .test
            .clone()
            .lazy()
            .select(projection(test_has_sales));

        let facts = concat([train, test], UnionArgs::default())?.collect()?;
        let expected = self.tables.train.height() + self.tables.test.height();
        ensure_height("sales concatenation", expected, facts.height())?;
        Ok(facts)
    }

    fn store_frame(&self) -> EdaResult<DataFrame> {
        let stores = &self.tables.stores;
        let unique = stores
            .column(STORE_NBR)?
            .as_materialized_series()
            .n_unique()?;
        if unique != stores.height() {
            return Err(EdaError::DataIntegrity {
                stage: "store merge",
                detail: format!(
                    "stores has {} rows but only {} distinct store numbers",
                    stores.height(),
                    unique
                ),
            });
        }

        Ok(stores
            .clone()
            .lazy()
            .select([
                col(STORE_NBR).cast(DataType::Int64),
                col(CITY).cast(DataType::String),
                col(STATE).cast(DataType::String),
                col(TYPE).cast(DataType::String).alias(STORE_TYPE),
                col(CLUSTER),
            ])
            .collect()?)
    }

    fn assemble_facts(&self, calendar: &CalendarParts) -> EdaResult<DataFrame> {
        let facts = self.sales_facts()?;
        let facts = left_join_checked("store merge", facts, self.store_frame()?, &[STORE_NBR])?;

        let national = entries_frame(&calendar.national, None, HOLIDAY_NATIONAL)?;
        let facts = left_join_checked("national holiday merge", facts, national, &[DATE])?;

        let regional = entries_frame(&calendar.regional, Some(STATE), HOLIDAY_REGIONAL)?;
        let facts = left_join_checked("regional holiday merge", facts, regional, &[DATE, STATE])?;

        let local = entries_frame(&calendar.local, Some(CITY), HOLIDAY_LOCAL)?;
        let facts = left_join_checked("local holiday merge", facts, local, &[DATE, CITY])?;

        let work_days = work_day_frame(&calendar.work_days)?;
        let facts = left_join_checked("work day merge", facts, work_days, &[DATE])?;

        Ok(facts
            .lazy()
            .with_column(
                col(IS_WORK_DAY)
                    .fill_null(lit(0))
                    .cast(DataType::Int8)
                    .alias(IS_WORK_DAY),
            )
            .collect()?)
    }

    fn merge_events(&self, facts: DataFrame, calendar: &CalendarParts) -> EdaResult<DataFrame> {
        let events: Vec<_> = calendar
            .events
            .iter()
            .cloned()
            .map(|mut e| {
                if e.description.to_lowercase().contains("futbol") {
                    e.description = FOOTBALL_EVENT.to_string();
                }
                e
            })
            .collect();
        let events = drop_duplicate_events(events, &self.corrections);

        let mut seen = HashSet::new();
        if let Some(shared) = events.iter().find(|e| !seen.insert(e.date)) {
            let count = events.iter().filter(|e| e.date == shared.date).count();
            return Err(EdaError::DataIntegrity {
                stage: "event merge",
                detail: format!(
                    "{} event rows share the date {}; add a known correction for it",
                    count, shared.date
                ),
            });
        }

        let events_frame = entries_frame(&events, None, EVENTS)?;
        let (encoded, event_columns) = one_hot_encode(&events_frame, true)?;
        let (encoded, event_columns) = force_indicators(encoded, event_columns, &self.corrections)?;

        let facts = left_join_checked("event merge", facts, encoded, &[DATE])?;

        let fills: Vec<Expr> = event_columns
            .iter()
            .map(|c| col(c.as_str()).fill_null(lit(0)).cast(DataType::Int8))
            .collect();
        Ok(facts.lazy().with_columns(fills).collect()?)
    }
}

fn ensure_height(stage: &'static str, expected: usize, actual: usize) -> EdaResult<()> {
    if expected != actual {
        return Err(EdaError::DataIntegrity {
            stage,
            detail: format!("expected {} rows, found {}", expected, actual),
        });
    }
    Ok(())
}

fn left_join_checked(
    stage: &'static str,
    left: DataFrame,
    right: DataFrame,
    on: &[&str],
) -> EdaResult<DataFrame> {
    let expected = left.height();
    let keys: Vec<Expr> = on.iter().map(|k| col(*k)).collect();
    let joined = left
        .lazy()
        .join(
            right.lazy(),
            keys.clone(),
            keys,
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;
    ensure_height(stage, expected, joined.height())?;
    debug!(stage, rows = joined.height(), "Joined");
    Ok(joined)
}

fn work_day_frame(dates: &[NaiveDate]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(DATE.into(), dates.to_vec()),
        Column::new(IS_WORK_DAY.into(), vec![1i8; dates.len()]),
    ])
}

fn presence(values: &StringChunked) -> Vec<i8> {
    values.into_iter().map(|v| v.is_some() as i8).collect()
}

fn membership(values: &StringChunked, members: &[&str]) -> Vec<i8> {
    values
        .into_iter()
        .map(|v| v.is_some_and(|v| members.contains(&v)) as i8)
        .collect()
}

fn containing(values: &StringChunked, needle: &str) -> Vec<i8> {
    values
        .into_iter()
        .map(|v| v.is_some_and(|v| v.contains(needle)) as i8)
        .collect()
}

/// Adds the presence, independence and keyword indicators derived from the
/// merged holiday descriptions.
fn derive_features(mut facts: DataFrame) -> EdaResult<DataFrame> {
    let national = facts.column(HOLIDAY_NATIONAL)?.str()?.clone();
    let regional = facts.column(HOLIDAY_REGIONAL)?.str()?.clone();
    let local = facts.column(HOLIDAY_LOCAL)?.str()?.clone();

    let derived = [
        ("holiday_national_binary", presence(&national)),
        ("holiday_local_binary", presence(&local)),
        ("holiday_regional_binary", presence(&regional)),
        (
            "national_independence",
            membership(&national, &INDEPENDENCE_HOLIDAYS),
        ),
        ("local_cantonizacio", containing(&local, "Cantonizacio")),
        ("local_fundacion", containing(&local, "Fundacion")),
        ("local_independencia", containing(&local, "Independencia")),
    ];

    for (name, values) in derived {
        facts.with_column(Column::new(name.into(), values))?;
    }
    Ok(facts)
}

/// Replaces the three description columns by their one-hot expansion.
fn expand_descriptions(facts: DataFrame) -> EdaResult<DataFrame> {
    let descriptions = facts.select([HOLIDAY_NATIONAL, HOLIDAY_REGIONAL, HOLIDAY_LOCAL])?;
    let (encoded, generated) = one_hot_encode(&descriptions, true)?;
    debug!(columns = generated.len(), "Expanded holiday descriptions");

    let facts = facts
        .drop(HOLIDAY_NATIONAL)?
        .drop(HOLIDAY_REGIONAL)?
        .drop(HOLIDAY_LOCAL)?;
    Ok(facts.hstack(encoded.get_columns())?)
}

/// Casts calendar indicators to `Int8` and the descriptive text columns to
/// categoricals.
fn normalize_types(facts: DataFrame) -> EdaResult<DataFrame> {
    let mut casts: Vec<Expr> = facts
        .get_column_names()
        .iter()
        .filter(|name| is_indicator_column(name.as_str()) || name.as_str() == IS_WORK_DAY)
        .map(|name| col(name.as_str()).cast(DataType::Int8))
        .collect();

    for name in [FAMILY, CITY, STATE, STORE_TYPE] {
        casts.push(col(name).cast(DataType::Categorical(None, CategoricalOrdering::Physical)));
    }

    Ok(facts.lazy().with_columns(casts).collect()?)
}
