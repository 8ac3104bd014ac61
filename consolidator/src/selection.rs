// src/selection.rs
// -----------------------------------------------------------------------------
// Screen selection and pipeline orchestration. Every table operation here
// takes an immutable input frame and returns a fresh one; a selection change
// upstream simply reruns `consolidate` against the new screen set.
// -----------------------------------------------------------------------------

use polars::prelude::*;
use tracing::info;

use crate::aggregation::aggregate_profiles;
use crate::normalization::normalized_effects;
use crate::pooling::pool_summary;
use crate::schema::{SummarySchema, CONTROL_ALIASES, CONTROL_KEY, METRIC_COL, SCREEN_COL};

/// The two derived tables consumers read: the pooled multi-screen summary
/// and the cross-screen-averaged, control-subtracted effect sizes.
#[derive(Debug, Clone)]
pub struct ConsolidatedTables {
    pub pooled: DataFrame,
    pub effects: DataFrame,
}

/// Distinct screen ids in first-seen order.
pub fn distinct_screens(df: &DataFrame) -> PolarsResult<Vec<String>> {
    let screens = df.column(SCREEN_COL)?.str()?;
    let mut seen: Vec<String> = Vec::new();
    for value in screens.into_iter().flatten() {
        if !seen.iter().any(|s| s == value) {
            seen.push(value.to_string());
        }
    }
    Ok(seen)
}

/// Restrict a table to the caller-selected screens. Rows from unselected
/// screens are dropped entirely; all downstream statistics are recomputed
/// from what remains.
pub fn filter_screens(df: &DataFrame, screens: &[String]) -> PolarsResult<DataFrame> {
    let screen_col = df.column(SCREEN_COL)?.str()?;
    let mask: BooleanChunked = screen_col
        .into_iter()
        .map(|v| v.map(|s| screens.iter().any(|sel| sel == s)))
        .collect();
    df.filter(&mask)
}

/// Fold backend spellings of the wild-type strain into the canonical control
/// key so grouping and control lookup see a single genotype.
pub fn canonicalize_control(df: &DataFrame, key: &str) -> PolarsResult<DataFrame> {
    let keys = df.column(key)?.str()?;
    let folded: StringChunked = keys
        .into_iter()
        .map(|v| {
            v.map(|s| {
                if CONTROL_ALIASES.contains(&s) {
                    CONTROL_KEY
                } else {
                    s
                }
            })
        })
        .collect();
    let mut series = folded.into_series();
    series.rename(PlSmallStr::from(key));

    let mut out = df.clone();
    out.with_column(series)?;
    Ok(out)
}

/// End-to-end consolidation for one user selection.
///
/// * `summary` — wide table, one row per `(key, Screen)`, with
///   `{metric}-mean/-sem/-count` columns; pooled across screens.
/// * `profile` — wide table, one row per `(key, Screen)`, one raw-value
///   column per metric; normalized within each screen and then averaged.
///
/// Both tables are filtered to `screens` and have their control aliases
/// folded before anything is computed. The result is a pure function of the
/// inputs; nothing is cached or mutated in place.
pub fn consolidate(
    summary: &DataFrame,
    profile: &DataFrame,
    key: &str,
    screens: &[String],
    control: &str,
) -> PolarsResult<ConsolidatedTables> {
    info!(
        "consolidating {} summary rows and {} profile rows over {} screens",
        summary.height(),
        profile.height(),
        screens.len()
    );

    let summary = canonicalize_control(&filter_screens(summary, screens)?, key)?;
    let profile = canonicalize_control(&filter_screens(profile, screens)?, key)?;

    let schema = SummarySchema::from_dataframe(&summary, key)?;
    let pooled = pool_summary(&summary, key, &schema)?;
    let effects = normalized_effects(&profile, key, control)?;

    info!(
        "consolidated tables: pooled {} genotypes x {} metrics, effects {} genotypes",
        pooled.height(),
        schema.metrics.len(),
        effects.height()
    );

    Ok(ConsolidatedTables { pooled, effects })
}

/// Descriptive profile view: filter a long-form `(key, Metric, Screen)`
/// table to the selected screens and reduce it to unweighted per-key,
/// per-metric means with the contributing screens as a set. Metrics keep
/// their original relative order.
pub fn profile_view(
    profile_long: &DataFrame,
    key: &str,
    screens: &[String],
) -> PolarsResult<DataFrame> {
    let filtered = canonicalize_control(&filter_screens(profile_long, screens)?, key)?;
    aggregate_profiles(&filtered, &[key, METRIC_COL])
}
