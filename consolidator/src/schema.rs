// src/schema.rs
// -----------------------------------------------------------------------------
// Typed view over the summary-table column conventions. The upstream tables
// encode per-metric statistics as `{Metric}-mean` / `{Metric}-sem` /
// `{Metric}-count` columns; everything that needs those columns goes through
// `SummarySchema` so the suffix convention lives in exactly one place.
// -----------------------------------------------------------------------------

use polars::prelude::*;

/// Column holding the screen (experimental batch) id in every input table.
pub const SCREEN_COL: &str = "Screen";

/// Column holding the phenotype metric name in long-form profile tables.
pub const METRIC_COL: &str = "Metric";

/// Canonical wild-type key. Every screen is expected to carry this strain.
pub const CONTROL_KEY: &str = "N2";

/// Backend spellings of the wild-type strain that must be folded into
/// [`CONTROL_KEY`] before any grouping or subtraction happens.
pub const CONTROL_ALIASES: [&str; 2] = ["N2_N2", "N2_XJ1"];

const MEAN_SUFFIX: &str = "-mean";
const SEM_SUFFIX: &str = "-sem";
const COUNT_SUFFIX: &str = "-count";
const CI95_LO_SUFFIX: &str = "-ci95_lo";
const CI95_HI_SUFFIX: &str = "-ci95_hi";

/// True for the dtypes we treat as measurement columns.
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
    )
}

/// One screen's summary statistics for a single genotype/metric pair.
///
/// `count` is carried as `f64` because it arrives via float-typed table
/// columns; a missing count is represented as `0.0` (zero weight), a missing
/// mean or sem as NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenStat {
    pub mean: f64,
    pub sem: f64,
    pub count: f64,
}

/// Cross-screen pooled statistics for a single genotype/metric pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PooledStats {
    pub mean: f64,
    pub sem: f64,
    pub count: f64,
    pub ci95_lo: f64,
    pub ci95_hi: f64,
}

impl PooledStats {
    /// "Insufficient data" marker: every field NaN.
    pub fn nan() -> Self {
        Self {
            mean: f64::NAN,
            sem: f64::NAN,
            count: f64::NAN,
            ci95_lo: f64::NAN,
            ci95_hi: f64::NAN,
        }
    }
}

/// The set of metrics found in a wide summary table, in column order.
///
/// Built once per table; rejects incomplete `mean`/`sem`/`count` triples and
/// columns that match none of the known conventions, so schema drift fails
/// at the boundary instead of producing silently wrong aggregates.
#[derive(Debug, Clone)]
pub struct SummarySchema {
    pub metrics: Vec<String>,
}

impl SummarySchema {
    pub fn from_dataframe(df: &DataFrame, key: &str) -> PolarsResult<Self> {
        let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
        let mut metrics = Vec::new();

        for &name in &names {
            if name == key || name == SCREEN_COL {
                continue;
            }
            if let Some(metric) = name.strip_suffix(MEAN_SUFFIX) {
                for suffix in [SEM_SUFFIX, COUNT_SUFFIX] {
                    let wanted = format!("{metric}{suffix}");
                    if !names.iter().any(|&n| n == wanted) {
                        return Err(PolarsError::ComputeError(
                            format!("summary table is missing '{wanted}' for metric '{metric}'")
                                .into(),
                        ));
                    }
                }
                metrics.push(metric.to_string());
            } else if let Some(metric) = name
                .strip_suffix(SEM_SUFFIX)
                .or_else(|| name.strip_suffix(COUNT_SUFFIX))
                .or_else(|| name.strip_suffix(CI95_LO_SUFFIX))
                .or_else(|| name.strip_suffix(CI95_HI_SUFFIX))
            {
                let wanted = format!("{metric}{MEAN_SUFFIX}");
                if !names.iter().any(|&n| n == wanted) {
                    return Err(PolarsError::ComputeError(
                        format!("summary column '{name}' has no matching '{wanted}'").into(),
                    ));
                }
            } else {
                return Err(PolarsError::ComputeError(
                    format!("unexpected column '{name}' in summary table").into(),
                ));
            }
        }

        if metrics.is_empty() {
            return Err(PolarsError::ComputeError(
                "summary table contains no metric columns".into(),
            ));
        }

        Ok(Self { metrics })
    }

    pub fn mean_col(&self, metric: &str) -> String {
        format!("{metric}{MEAN_SUFFIX}")
    }

    pub fn sem_col(&self, metric: &str) -> String {
        format!("{metric}{SEM_SUFFIX}")
    }

    pub fn count_col(&self, metric: &str) -> String {
        format!("{metric}{COUNT_SUFFIX}")
    }

    pub fn ci95_lo_col(&self, metric: &str) -> String {
        format!("{metric}{CI95_LO_SUFFIX}")
    }

    pub fn ci95_hi_col(&self, metric: &str) -> String {
        format!("{metric}{CI95_HI_SUFFIX}")
    }
}
