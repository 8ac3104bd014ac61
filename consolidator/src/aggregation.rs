// src/aggregation.rs
// -----------------------------------------------------------------------------
// Unweighted grouping of profile-style tables: plain column means per key,
// with the contributing screens kept as a set. This is the descriptive
// aggregation used by profile views and by the normalizer's cross-screen
// averaging step; statistically pooled summaries live in `pooling`.
// -----------------------------------------------------------------------------

use polars::prelude::*;
use tracing::debug;

use crate::schema::{is_numeric_dtype, SCREEN_COL};

/// Group `df` by `by` and reduce every other column:
///
/// * numeric columns → unweighted arithmetic mean (NaN inputs poison the
///   mean for that cell, which is what renderers rely on to mark a cell as
///   untrustworthy),
/// * the `Screen` column → ordered set of distinct contributing screens,
///   kept on the output row for later filtering,
/// * any other column → passed through only when constant within each
///   group; a non-constant passthrough is a data-integrity error and fails
///   loudly here rather than picking a value.
///
/// Groups come out in first-seen order. That matters when `by` includes the
/// `Metric` column: profile consumers render metrics in their original
/// relative order, not alphabetized. Keys with no input rows simply produce
/// no output row.
pub fn aggregate_profiles(df: &DataFrame, by: &[&str]) -> PolarsResult<DataFrame> {
    if !df
        .get_column_names()
        .iter()
        .any(|n| n.as_str() == SCREEN_COL)
    {
        return Err(PolarsError::ComputeError(
            format!("aggregation input is missing the '{SCREEN_COL}' column").into(),
        ));
    }

    let by_exprs: Vec<Expr> = by.iter().map(|&name| col(name)).collect();

    let mut aggs: Vec<Expr> = Vec::new();
    let mut passthrough: Vec<String> = Vec::new();
    for column in df.get_columns() {
        let name = column.name().as_str();
        if by.contains(&name) || name == SCREEN_COL {
            continue;
        }
        if is_numeric_dtype(column.dtype()) {
            aggs.push(col(name).mean().alias(name));
        } else {
            passthrough.push(name.to_string());
            aggs.push(col(name).first().alias(name));
        }
    }
    aggs.push(col(SCREEN_COL).unique_stable().alias(SCREEN_COL));

    if !passthrough.is_empty() {
        ensure_constant_within_groups(df, &by_exprs, &passthrough)?;
    }

    debug!(
        "aggregating {} rows by {:?} ({} passthrough columns)",
        df.height(),
        by,
        passthrough.len()
    );

    df.clone()
        .lazy()
        .group_by_stable(by_exprs)
        .agg(aggs)
        .collect()
}

/// A passthrough column that varies within a group means two source rows
/// disagree about an attribute that should be an invariant of the key; that
/// is an upstream data problem and must be surfaced, not resolved by picking
/// one of the values.
fn ensure_constant_within_groups(
    df: &DataFrame,
    by: &[Expr],
    columns: &[String],
) -> PolarsResult<()> {
    let checks: Vec<Expr> = columns
        .iter()
        .map(|name| col(name.as_str()).n_unique().alias(name.as_str()))
        .collect();
    let counts = df
        .clone()
        .lazy()
        .group_by_stable(by.to_vec())
        .agg(checks)
        .collect()?;

    for name in columns {
        let n_unique = counts.column(name)?.u32()?;
        if n_unique.into_no_null_iter().any(|n| n > 1) {
            return Err(PolarsError::ComputeError(
                format!("passthrough column '{name}' is not constant within a group").into(),
            ));
        }
    }
    Ok(())
}
