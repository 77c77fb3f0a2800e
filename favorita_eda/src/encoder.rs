//! One-hot encoding of text and categorical columns.

use std::collections::{BTreeSet, HashSet};

use polars::prelude::*;
use tracing::warn;

/// Suffix of the indicator that marks a null source value.
pub const MISSING_SUFFIX: &str = "missing";

/// Builds the indicator column name for a source column and one of its values.
///
/// Whitespace in the result is replaced by underscores so the names can be
/// used as identifiers downstream.
pub fn indicator_name(source: &str, value: &str) -> String {
    format!("{}_{}", source, value)
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

fn is_candidate(dtype: &DataType) -> bool {
    matches!(dtype, DataType::String | DataType::Categorical(_, _))
}

/// Adds an indicator, OR-ing it into an earlier one of the same name.
fn push_indicator(encoded: &mut Vec<(String, Vec<i8>)>, name: String, flags: Vec<i8>) {
    match encoded.iter_mut().find(|(existing, _)| *existing == name) {
        Some((_, merged)) => {
            warn!(column = %name, "Distinct values share an indicator name, merging them");
            for (slot, flag) in merged.iter_mut().zip(flags) {
                *slot |= flag;
            }
        }
        None => encoded.push((name, flags)),
    }
}

/// Expands every text/categorical column of `df` into 0/1 indicator columns.
///
/// One `Int8` column is produced per distinct non-null value, in lexical value
/// order. With `missing_as_category`, an extra `<column>_missing` column flags
/// the null rows; otherwise null rows are 0 in every indicator of that column.
///
/// Values whose indicator names coincide (`"A B"` and `"A_B"`, or a literal
/// `"missing"` next to nulls) share one indicator set on the rows of either.
/// An indicator whose name is taken by a kept column gets a numeric suffix.
///
/// Returns the expanded frame (non-candidate columns first, in their original
/// order, then the indicators) together with the generated column names.
pub fn one_hot_encode(
    df: &DataFrame,
    missing_as_category: bool,
) -> PolarsResult<(DataFrame, Vec<String>)> {
    let candidates: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| is_candidate(c.dtype()))
        .map(|c| c.name().to_string())
        .collect();

    if candidates.is_empty() {
        return Ok((df.clone(), Vec::new()));
    }

    let mut encoded: Vec<(String, Vec<i8>)> = Vec::new();

    for source in &candidates {
        let values = df.column(source)?.cast(&DataType::String)?;
        let values = values.str()?;

        let distinct: BTreeSet<&str> = values.into_iter().flatten().collect();

        for value in &distinct {
            let flags: Vec<i8> = values
                .into_iter()
                .map(|v| (v == Some(*value)) as i8)
                .collect();
            push_indicator(&mut encoded, indicator_name(source, value), flags);
        }

        if missing_as_category {
            let flags: Vec<i8> = values.into_iter().map(|v| v.is_none() as i8).collect();
            push_indicator(&mut encoded, indicator_name(source, MISSING_SUFFIX), flags);
        }
    }

    let mut columns: Vec<Column> = df
        .get_columns()
        .iter()
        .filter(|c| !is_candidate(c.dtype()))
        .cloned()
        .collect();
    let kept: HashSet<String> = columns.iter().map(|c| c.name().to_string()).collect();

    let mut generated = Vec::with_capacity(encoded.len());
    for (name, flags) in encoded {
        let mut unique = name.clone();
        let mut suffix = 1;
        while kept.contains(&unique) {
            unique = format!("{}_{}", name, suffix);
            suffix += 1;
        }
        if unique != name {
            warn!(column = %name, renamed = %unique, "Indicator name taken by a kept column");
        }
        columns.push(Column::new(unique.as_str().into(), flags));
        generated.push(unique);
    }

    Ok((DataFrame::new(columns)?, generated))
}
