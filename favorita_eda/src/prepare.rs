//! Pruning of the training table before reconciliation.
//!
//! Stores that opened part-way through the history report zero sales for every
//! family before their opening date, and some store/family pairs never sell
//! at all. Both are removed here so they don't drag the screening towards
//! "no effect".

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, info};

use crate::schema::{DATE, FAMILY, SALES, STORE_NBR};
use crate::EdaResult;

/// Opening dates of the stores that started trading after the first sales date.
pub const STORE_OPENINGS: [(i64, (i32, u32, u32)); 8] = [
    (52, (2017, 4, 20)),
    (22, (2015, 10, 9)),
    (42, (2015, 8, 21)),
    (21, (2015, 7, 24)),
    (29, (2015, 3, 20)),
    (20, (2015, 2, 13)),
    (53, (2014, 5, 29)),
    (36, (2013, 5, 9)),
];

/// The known openings as `(store_nbr, opening date)` pairs.
pub fn store_openings() -> Vec<(i64, NaiveDate)> {
    STORE_OPENINGS
        .iter()
        .filter_map(|(store, (y, m, d))| NaiveDate::from_ymd_opt(*y, *m, *d).map(|on| (*store, on)))
        .collect()
}

/// Drops every row of a store dated before that store's opening.
pub fn prune_before_opening(
    train: &DataFrame,
    openings: &[(i64, NaiveDate)],
) -> EdaResult<DataFrame> {
    let keep = openings.iter().fold(lit(true), |acc, (store, opened)| {
        let before_opening = col(STORE_NBR)
            .eq(lit(*store))
            .and(col(DATE).lt(lit(*opened)));
        acc.and(before_opening.not())
    });

    let pruned = train.clone().lazy().filter(keep).collect()?;
    info!(
        removed = train.height() - pruned.height(),
        stores = openings.len(),
        "Removed rows dated before store openings"
    );
    Ok(pruned)
}

/// Removes store/family pairs whose total sales are zero.
///
/// Returns the remaining rows and the dropped `(store_nbr, family)` pairs,
/// sorted.
pub fn drop_unsold_families(train: &DataFrame) -> EdaResult<(DataFrame, Vec<(i64, String)>)> {
    let keys = [col(STORE_NBR), col(FAMILY)];

    let unsold = train
        .clone()
        .lazy()
        .group_by(keys.clone())
        .agg([col(SALES).sum().alias("total_sales")])
        .filter(col("total_sales").eq(lit(0)))
        .select(keys.clone())
        .sort_by_exprs(keys.clone(), SortMultipleOptions::default())
        .collect()?;

    let stores = unsold.column(STORE_NBR)?.cast(&DataType::Int64)?;
    let families = unsold.column(FAMILY)?.cast(&DataType::String)?;
    let dropped: Vec<(i64, String)> = stores
        .i64()?
        .into_iter()
        .zip(families.str()?.into_iter())
        .filter_map(|(store, family)| Some((store?, family?.to_string())))
        .collect();

    for (store, family) in &dropped {
        debug!(store, family = %family, "Dropping unsold family");
    }

    let kept = train
        .clone()
        .lazy()
        .join(
            unsold.lazy(),
            keys.clone(),
            keys,
            JoinArgs::new(JoinType::Anti),
        )
        .collect()?;

    info!(
        pairs = dropped.len(),
        removed = train.height() - kept.height(),
        "Removed store/family pairs with no sales"
    );
    Ok((kept, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn train() -> DataFrame {
        df!(
            "date" => &[date(2013, 5, 8), date(2013, 5, 9), date(2013, 5, 8), date(2013, 5, 9)],
            "store_nbr" => &[36i64, 36, 1, 1],
            "family" => &["BOOKS", "BOOKS", "BOOKS", "BREAD"],
            "sales" => &[0.0, 4.0, 0.0, 12.5],
            "onpromotion" => &[0i64, 0, 0, 1]
        )
        .unwrap()
    }

    #[test]
    fn test_openings_are_all_valid_dates() {
        assert_eq!(store_openings().len(), STORE_OPENINGS.len());
    }

    #[test]
    fn test_prune_keeps_opening_day_and_other_stores() {
        let pruned = prune_before_opening(&train(), &store_openings()).unwrap();
        assert_eq!(pruned.height(), 3);

        let stores: Vec<Option<i64>> = pruned
            .column("store_nbr")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(stores, vec![Some(36), Some(1), Some(1)]);
    }

    #[test]
    fn test_prune_without_openings_is_identity() {
        let pruned = prune_before_opening(&train(), &[]).unwrap();
        assert!(pruned.equals(&train()));
    }

    #[test]
    fn test_drop_unsold_families() {
        let (kept, dropped) = drop_unsold_families(&train()).unwrap();
        assert_eq!(dropped, vec![(1, "BOOKS".to_string())]);
        assert_eq!(kept.height(), 3);
    }
}
