//! Typed holiday calendar and the classification steps that run before any
//! table is joined: transfer resolution, description normalization and the
//! split into work days, events and the three locale tables.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::warn;

use crate::schema::{DATE, DESCRIPTION, LOCALE, LOCALE_NAME, TRANSFERRED, TYPE};
use crate::{EdaError, EdaResult};

/// Prefix the source data puts in front of the description of a `Transfer` record.
pub const TRANSFER_PREFIX: &str = "Traslado ";
/// Prefix of bridge-day descriptions.
pub const BRIDGE_PREFIX: &str = "Puente ";

/// The `type` column of the holiday table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HolidayKind {
    Holiday,
    Transfer,
    Additional,
    Bridge,
    WorkDay,
    Event,
}

impl FromStr for HolidayKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Holiday" => Ok(HolidayKind::Holiday),
            "Transfer" => Ok(HolidayKind::Transfer),
            "Additional" => Ok(HolidayKind::Additional),
            "Bridge" => Ok(HolidayKind::Bridge),
            "Work Day" => Ok(HolidayKind::WorkDay),
            "Event" => Ok(HolidayKind::Event),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for HolidayKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            HolidayKind::Holiday => "Holiday",
            HolidayKind::Transfer => "Transfer",
            HolidayKind::Additional => "Additional",
            HolidayKind::Bridge => "Bridge",
            HolidayKind::WorkDay => "Work Day",
            HolidayKind::Event => "Event",
        };
        write!(f, "{}", label)
    }
}

/// Geographic scope of a holiday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locale {
    National,
    /// Scoped to a state; `locale_name` holds the state.
    Regional,
    /// Scoped to a city; `locale_name` holds the city.
    Local,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "National" => Ok(Locale::National),
            "Regional" => Ok(Locale::Regional),
            "Local" => Ok(Locale::Local),
            other => Err(other.to_string()),
        }
    }
}

/// One row of the holiday/event table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolidayRecord {
    pub date: NaiveDate,
    pub kind: HolidayKind,
    pub locale: Locale,
    pub locale_name: String,
    pub description: String,
    pub transferred: bool,
}

fn schema_error(column: &str, expected: impl Into<String>) -> EdaError {
    EdaError::InputSchema {
        table: "holidays".to_string(),
        column: column.to_string(),
        expected: expected.into(),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn read_flags(df: &DataFrame) -> EdaResult<Vec<bool>> {
    let column = df.column(TRANSFERRED)?;
    match column.dtype() {
        DataType::Boolean => column
            .bool()?
            .into_iter()
            .map(|v| v.ok_or_else(|| schema_error(TRANSFERRED, "no null values")))
            .collect(),
        _ => column
            .str()?
            .into_iter()
            .map(|v| {
                v.and_then(parse_flag)
                    .ok_or_else(|| schema_error(TRANSFERRED, "True or False"))
            })
            .collect(),
    }
}

/// Parses the raw holiday frame into typed records, in row order.
pub fn read_holidays(df: &DataFrame) -> EdaResult<Vec<HolidayRecord>> {
    let dates = df.column(DATE)?.as_materialized_series().date()?.clone();
    let kinds = df.column(TYPE)?.cast(&DataType::String)?;
    let locales = df.column(LOCALE)?.cast(&DataType::String)?;
    let names = df.column(LOCALE_NAME)?.cast(&DataType::String)?;
    let descriptions = df.column(DESCRIPTION)?.cast(&DataType::String)?;
    let flags = read_flags(df)?;

    let mut records = Vec::with_capacity(df.height());
    let rows = dates
        .as_date_iter()
        .zip(kinds.str()?.into_iter())
        .zip(locales.str()?.into_iter())
        .zip(names.str()?.into_iter())
        .zip(descriptions.str()?.into_iter())
        .zip(flags);

    for (((((date, kind), locale), name), description), transferred) in rows {
        let date = date.ok_or_else(|| schema_error(DATE, "no null dates"))?;
        let kind = kind
            .ok_or_else(|| schema_error(TYPE, "a holiday type"))?
            .parse::<HolidayKind>()
            .map_err(|v| schema_error(TYPE, format!("a known holiday type, found '{}'", v)))?;
        let locale = locale
            .ok_or_else(|| schema_error(LOCALE, "a locale"))?
            .parse::<Locale>()
            .map_err(|v| schema_error(LOCALE, format!("a known locale, found '{}'", v)))?;

        records.push(HolidayRecord {
            date,
            kind,
            locale,
            locale_name: name.unwrap_or_default().to_string(),
            description: description.unwrap_or_default().to_string(),
            transferred,
        });
    }

    Ok(records)
}

fn is_transfer_of(transfer: &HolidayRecord, holiday: &HolidayRecord, max_shift_days: i64) -> bool {
    let same_description = transfer.description == holiday.description
        || transfer.description.strip_prefix(TRANSFER_PREFIX) == Some(holiday.description.as_str());
    let shift = (transfer.date - holiday.date).num_days().abs();

    same_description
        && transfer.locale == holiday.locale
        && transfer.locale_name == holiday.locale_name
        && transfer.date != holiday.date
        && shift <= max_shift_days
}

/// Moves every transferred holiday to the date of its `Transfer` record.
///
/// Records that are neither transferred nor `Transfer` pass through in source
/// order; resolved records follow, in the order of the transferred holidays.
/// A transferred holiday must match exactly one `Transfer` record within
/// `max_shift_days`, and every `Transfer` record must be claimed.
pub fn resolve_transfers(
    records: Vec<HolidayRecord>,
    max_shift_days: i64,
) -> EdaResult<Vec<HolidayRecord>> {
    let (transfers, rest): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|r| r.kind == HolidayKind::Transfer);
    let (moved, mut resolved): (Vec<_>, Vec<_>) = rest.into_iter().partition(|r| r.transferred);

    let mut claimed = vec![false; transfers.len()];

    for holiday in &moved {
        let matches: Vec<usize> = transfers
            .iter()
            .enumerate()
            .filter(|(_, t)| is_transfer_of(t, holiday, max_shift_days))
            .map(|(i, _)| i)
            .collect();

        let index = match matches.as_slice() {
            [index] => *index,
            [] => {
                return Err(EdaError::DataIntegrity {
                    stage: "transfer resolution",
                    detail: format!(
                        "no Transfer record found for '{}' ({}) on {}",
                        holiday.description, holiday.locale_name, holiday.date
                    ),
                })
            }
            many => {
                return Err(EdaError::DataIntegrity {
                    stage: "transfer resolution",
                    detail: format!(
                        "{} Transfer records match '{}' ({}) on {}",
                        many.len(),
                        holiday.description,
                        holiday.locale_name,
                        holiday.date
                    ),
                })
            }
        };

        if claimed[index] {
            return Err(EdaError::DataIntegrity {
                stage: "transfer resolution",
                detail: format!(
                    "Transfer record '{}' on {} is claimed by more than one holiday",
                    transfers[index].description, transfers[index].date
                ),
            });
        }
        claimed[index] = true;

        resolved.push(HolidayRecord {
            date: transfers[index].date,
            kind: holiday.kind,
            locale: holiday.locale,
            locale_name: holiday.locale_name.clone(),
            description: holiday.description.clone(),
            transferred: false,
        });
    }

    if let Some(orphan) = transfers
        .iter()
        .zip(&claimed)
        .find_map(|(t, used)| (!used).then_some(t))
    {
        return Err(EdaError::DataIntegrity {
            stage: "transfer resolution",
            detail: format!(
                "Transfer record '{}' on {} has no transferred holiday",
                orphan.description, orphan.date
            ),
        });
    }

    Ok(resolved)
}

/// Strips bridge prefixes, digits, `-` and `+` from a description.
pub fn clean_description(raw: &str) -> String {
    raw.replace(BRIDGE_PREFIX, "")
        .chars()
        .filter(|c| !c.is_ascii_digit() && *c != '-' && *c != '+')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Folds `Additional` and `Bridge` records into ordinary holidays and cleans
/// every description.
pub fn normalize_records(records: Vec<HolidayRecord>) -> Vec<HolidayRecord> {
    records
        .into_iter()
        .map(|mut r| {
            if matches!(r.kind, HolidayKind::Additional | HolidayKind::Bridge) {
                r.kind = HolidayKind::Holiday;
            }
            r.description = clean_description(&r.description);
            r
        })
        .collect()
}

/// A holiday observed on a date, optionally scoped to a state or city.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEntry {
    pub date: NaiveDate,
    pub place: Option<String>,
    pub description: String,
}

/// The classified calendar, ready to be merged onto the sales facts.
#[derive(Debug, Default, Clone)]
pub struct CalendarParts {
    /// Dates that were made working days, unique and sorted.
    pub work_days: Vec<NaiveDate>,
    /// Nationwide events, in pipeline order, not de-duplicated.
    pub events: Vec<CalendarEntry>,
    /// Unique by date.
    pub national: Vec<CalendarEntry>,
    /// Unique by (date, state).
    pub regional: Vec<CalendarEntry>,
    /// Unique by (date, city).
    pub local: Vec<CalendarEntry>,
}

fn push_unique(
    table: &mut Vec<CalendarEntry>,
    seen: &mut HashSet<(NaiveDate, Option<String>)>,
    entry: CalendarEntry,
    label: &str,
) {
    if seen.insert((entry.date, entry.place.clone())) {
        table.push(entry);
        return;
    }
    let kept = table
        .iter()
        .find(|e| e.date == entry.date && e.place == entry.place);
    if let Some(kept) = kept {
        if kept.description != entry.description {
            warn!(
                table = label,
                date = %entry.date,
                kept = %kept.description,
                dropped = %entry.description,
                "Discarding a second holiday on the same key"
            );
        }
    }
}

impl CalendarParts {
    /// Splits normalized records into work days, events and locale tables.
    pub fn partition(records: Vec<HolidayRecord>) -> Self {
        let mut parts = CalendarParts::default();
        let mut seen_national = HashSet::new();
        let mut seen_regional = HashSet::new();
        let mut seen_local = HashSet::new();

        for record in records {
            match record.kind {
                HolidayKind::WorkDay => parts.work_days.push(record.date),
                HolidayKind::Event => parts.events.push(CalendarEntry {
                    date: record.date,
                    place: None,
                    description: record.description,
                }),
                _ => match record.locale {
                    Locale::National => push_unique(
                        &mut parts.national,
                        &mut seen_national,
                        CalendarEntry {
                            date: record.date,
                            place: None,
                            description: record.description,
                        },
                        "national",
                    ),
                    Locale::Regional => push_unique(
                        &mut parts.regional,
                        &mut seen_regional,
                        CalendarEntry {
                            date: record.date,
                            place: Some(record.locale_name),
                            description: record.description,
                        },
                        "regional",
                    ),
                    Locale::Local => push_unique(
                        &mut parts.local,
                        &mut seen_local,
                        CalendarEntry {
                            date: record.date,
                            place: Some(record.locale_name),
                            description: record.description,
                        },
                        "local",
                    ),
                },
            }
        }

        parts.work_days.sort();
        parts.work_days.dedup();
        parts
    }
}

/// Builds a `(date[, place], description)` frame from calendar entries.
pub fn entries_frame(
    entries: &[CalendarEntry],
    place_column: Option<&str>,
    description_column: &str,
) -> PolarsResult<DataFrame> {
    let dates: Vec<NaiveDate> = entries.iter().map(|e| e.date).collect();
    let descriptions: Vec<&str> = entries.iter().map(|e| e.description.as_str()).collect();

    let mut columns = vec![Column::new(DATE.into(), dates)];
    if let Some(place_column) = place_column {
        let places: Vec<&str> = entries
            .iter()
            .map(|e| e.place.as_deref().unwrap_or_default())
            .collect();
        columns.push(Column::new(place_column.into(), places));
    }
    columns.push(Column::new(description_column.into(), descriptions));

    DataFrame::new(columns)
}
