//! Column names of the source tables and up-front schema validation.

use polars::prelude::*;

use crate::{EdaError, EdaResult};

pub const DATE: &str = "date";
pub const STORE_NBR: &str = "store_nbr";
pub const FAMILY: &str = "family";
pub const SALES: &str = "sales";
pub const ONPROMOTION: &str = "onpromotion";

pub const CITY: &str = "city";
pub const STATE: &str = "state";
/// Store type as it appears in `stores.csv`.
pub const TYPE: &str = "type";
/// Store type once merged into the fact table.
pub const STORE_TYPE: &str = "store_type";
pub const CLUSTER: &str = "cluster";

pub const LOCALE: &str = "locale";
pub const LOCALE_NAME: &str = "locale_name";
pub const DESCRIPTION: &str = "description";
pub const TRANSFERRED: &str = "transferred";

pub const HOLIDAY_NATIONAL: &str = "holiday_national";
pub const HOLIDAY_REGIONAL: &str = "holiday_regional";
pub const HOLIDAY_LOCAL: &str = "holiday_local";
pub const EVENTS: &str = "events";
pub const IS_WORK_DAY: &str = "IsWorkDay";

/// Prefixes of the calendar indicator columns in the reconciled table.
pub const INDICATOR_PREFIXES: [&str; 4] = ["events", "holiday", "national", "local"];

/// The semantic type a column must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Date,
    Integer,
    Numeric,
    Text,
    /// A boolean, or the literal strings `True` / `False`.
    Flag,
}

impl ColumnKind {
    fn accepts(&self, dtype: &DataType) -> bool {
        match self {
            ColumnKind::Date => matches!(dtype, DataType::Date),
            ColumnKind::Integer => dtype.is_integer(),
            ColumnKind::Numeric => {
                dtype.is_integer() || dtype.is_float() || matches!(dtype, DataType::Null)
            }
            ColumnKind::Text => matches!(dtype, DataType::String | DataType::Categorical(_, _)),
            ColumnKind::Flag => matches!(dtype, DataType::Boolean | DataType::String),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            ColumnKind::Date => "a date column",
            ColumnKind::Integer => "an integer column",
            ColumnKind::Numeric => "a numeric column",
            ColumnKind::Text => "a text column",
            ColumnKind::Flag => "a boolean column",
        }
    }
}

pub const HOLIDAY_COLUMNS: [(&str, ColumnKind); 6] = [
    (DATE, ColumnKind::Date),
    (TYPE, ColumnKind::Text),
    (LOCALE, ColumnKind::Text),
    (LOCALE_NAME, ColumnKind::Text),
    (DESCRIPTION, ColumnKind::Text),
    (TRANSFERRED, ColumnKind::Flag),
];

pub const TRAIN_COLUMNS: [(&str, ColumnKind); 5] = [
    (DATE, ColumnKind::Date),
    (STORE_NBR, ColumnKind::Integer),
    (FAMILY, ColumnKind::Text),
    (SALES, ColumnKind::Numeric),
    (ONPROMOTION, ColumnKind::Numeric),
];

pub const TEST_COLUMNS: [(&str, ColumnKind); 4] = [
    (DATE, ColumnKind::Date),
    (STORE_NBR, ColumnKind::Integer),
    (FAMILY, ColumnKind::Text),
    (ONPROMOTION, ColumnKind::Numeric),
];

pub const STORE_COLUMNS: [(&str, ColumnKind); 5] = [
    (STORE_NBR, ColumnKind::Integer),
    (CITY, ColumnKind::Text),
    (STATE, ColumnKind::Text),
    (TYPE, ColumnKind::Text),
    (CLUSTER, ColumnKind::Integer),
];

/// Checks that every required column exists with the expected semantic type.
pub fn require_columns(
    df: &DataFrame,
    table: &str,
    required: &[(&str, ColumnKind)],
) -> EdaResult<()> {
    for (name, kind) in required {
        let column = df.column(name).map_err(|_| EdaError::InputSchema {
            table: table.to_string(),
            column: name.to_string(),
            expected: format!("{} (column is missing)", kind.describe()),
        })?;
        if !kind.accepts(column.dtype()) {
            return Err(EdaError::InputSchema {
                table: table.to_string(),
                column: name.to_string(),
                expected: format!("{}, found {}", kind.describe(), column.dtype()),
            });
        }
    }
    Ok(())
}

/// Returns true when `name` is one of the calendar indicator columns.
pub fn is_indicator_column(name: &str) -> bool {
    INDICATOR_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}
