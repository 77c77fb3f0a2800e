//! Known corrections to the event calendar.
//!
//! The source calendar has a handful of rows that are wrong in a way no
//! general rule can detect. Each fix is listed here as a value, tied to the
//! specific date and description it repairs, so the full set can be audited
//! and swapped out by callers working with a different extract.

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::debug;

use crate::calendar::CalendarEntry;
use crate::encoder::indicator_name;
use crate::schema::{DATE, EVENTS};
use crate::EdaResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnownCorrection {
    /// Sets an event indicator to 1 on every event row of `date`, adding the
    /// column when the encoding did not produce it.
    ForceIndicator {
        date: NaiveDate,
        column: String,
        reason: &'static str,
    },
    /// Removes the event row with `description` on `date`, but only while
    /// another event row remains on that date.
    DropDuplicateEvent {
        date: NaiveDate,
        description: String,
        reason: &'static str,
    },
}

/// The corrections that apply to the published Favorita calendar.
pub fn default_corrections() -> Vec<KnownCorrection> {
    let mothers_day_2016 = NaiveDate::from_ymd_opt(2016, 5, 8).unwrap_or_default();
    vec![
        KnownCorrection::ForceIndicator {
            date: mothers_day_2016,
            column: indicator_name(EVENTS, "Dia de la Madre"),
            reason: "Mother's Day 2016 falls on an earthquake relief day and must flag that row too",
        },
        KnownCorrection::DropDuplicateEvent {
            date: mothers_day_2016,
            description: "Dia de la Madre".to_string(),
            reason: "the Mother's Day row is redundant once its flag is carried by the relief row",
        },
    ]
}

/// Applies the row-level corrections to the extracted events.
pub fn drop_duplicate_events(
    events: Vec<CalendarEntry>,
    corrections: &[KnownCorrection],
) -> Vec<CalendarEntry> {
    let mut events = events;
    for correction in corrections {
        if let KnownCorrection::DropDuplicateEvent {
            date,
            description,
            reason,
        } = correction
        {
            let on_date = events.iter().filter(|e| e.date == *date).count();
            if on_date < 2 {
                continue;
            }
            if let Some(position) = events
                .iter()
                .position(|e| e.date == *date && e.description == *description)
            {
                debug!(date = %date, description = %description, reason, "Dropping event row");
                events.remove(position);
            }
        }
    }
    events
}

/// Applies the indicator corrections to the one-hot encoded events frame.
///
/// Returns the corrected frame and the event indicator columns it now holds.
pub fn force_indicators(
    mut encoded: DataFrame,
    mut event_columns: Vec<String>,
    corrections: &[KnownCorrection],
) -> EdaResult<(DataFrame, Vec<String>)> {
    for correction in corrections {
        if let KnownCorrection::ForceIndicator {
            date,
            column,
            reason,
        } = correction
        {
            let dates: Vec<Option<NaiveDate>> = encoded
                .column(DATE)?
                .as_materialized_series()
                .date()?
                .as_date_iter()
                .collect();
            if !dates.iter().any(|d| *d == Some(*date)) {
                continue;
            }

            let current: Vec<i8> = match encoded.column(column) {
                Ok(existing) => existing
                    .cast(&DataType::Int8)?
                    .i8()?
                    .into_iter()
                    .map(|v| v.unwrap_or(0))
                    .collect(),
                Err(_) => {
                    event_columns.push(column.clone());
                    vec![0; encoded.height()]
                }
            };

            let forced: Vec<i8> = current
                .into_iter()
                .zip(&dates)
                .map(|(v, d)| if *d == Some(*date) { 1 } else { v })
                .collect();

            debug!(date = %date, column = %column, reason, "Forcing event indicator");
            encoded.with_column(Column::new(column.as_str().into(), forced))?;
        }
    }
    Ok((encoded, event_columns))
}
