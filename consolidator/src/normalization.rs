// src/normalization.rs
// -----------------------------------------------------------------------------
// Per-screen z-scoring and control subtraction. Raw metric values are only
// comparable within a screen, so every statistic here is computed screen by
// screen; cross-screen averaging happens strictly afterwards.
// -----------------------------------------------------------------------------

use polars::prelude::*;
use tracing::{debug, warn};

use crate::aggregation::aggregate_profiles;
use crate::schema::{is_numeric_dtype, SCREEN_COL};
use crate::selection::distinct_screens;

/// Convert a wide raw-value table keyed by `(key, Screen)` into
/// control-subtracted z-scores, screen by screen.
///
/// For each screen and each metric column independently:
///
/// 1. population mean and population standard deviation (ddof = 0) are taken
///    over every genotype present in that screen,
/// 2. values become z-scores; a zero-variance column yields NaN for the whole
///    screen rather than dividing into ±∞,
/// 3. the control genotype's z-score is subtracted from every row, making the
///    control exactly 0; a screen without the control keeps its plain
///    z-scores (pass-through) instead of being dropped or raised on.
///
/// Non-numeric columns other than the key and `Screen` are not metrics and do
/// not survive into the output. Genotypes absent from a screen get no
/// synthetic row and never touch that screen's population statistics.
pub fn normalize_within_screens(
    df: &DataFrame,
    key: &str,
    control: &str,
) -> PolarsResult<DataFrame> {
    let metric_cols: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| {
            let name = c.name().as_str();
            name != key && name != SCREEN_COL && is_numeric_dtype(c.dtype())
        })
        .map(|c| c.name().to_string())
        .collect();

    if metric_cols.is_empty() {
        return Err(PolarsError::ComputeError(
            "raw-value table contains no metric columns".into(),
        ));
    }

    let screens = distinct_screens(df)?;
    let screen_col = df.column(SCREEN_COL)?.str()?.clone();

    let mut result: Option<DataFrame> = None;
    for screen in &screens {
        let mask: BooleanChunked = screen_col
            .into_iter()
            .map(|v| v.map(|s| s == screen))
            .collect();
        let part = df.filter(&mask)?;
        let normalized = normalize_one_screen(&part, key, control, screen, &metric_cols)?;
        result = Some(match result {
            Some(acc) => acc.vstack(&normalized)?,
            None => normalized,
        });
    }

    match result {
        Some(out) => Ok(out),
        // No screens at all: an empty frame with the output shape.
        None => {
            let mut keep: Vec<String> = vec![key.to_string(), SCREEN_COL.to_string()];
            keep.extend(metric_cols);
            Ok(df.select(keep)?.head(Some(0)))
        }
    }
}

fn normalize_one_screen(
    part: &DataFrame,
    key: &str,
    control: &str,
    screen: &str,
    metric_cols: &[String],
) -> PolarsResult<DataFrame> {
    let keys = part.column(key)?.str()?.clone();

    let control_rows: Vec<usize> = keys
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| (v == Some(control)).then_some(i))
        .collect();
    let control_row = match control_rows.as_slice() {
        [] => {
            warn!(
                "screen '{screen}' has no '{control}' row; leaving its z-scores unsubtracted"
            );
            None
        }
        [row] => Some(*row),
        [row, ..] => {
            warn!(
                "screen '{screen}' has {} '{control}' rows; using the first",
                control_rows.len()
            );
            Some(*row)
        }
    };

    let mut columns: Vec<Column> = vec![
        part.column(key)?.clone(),
        part.column(SCREEN_COL)?.clone(),
    ];

    for metric in metric_cols {
        let values = part.column(metric)?.cast(&DataType::Float64)?;
        let values = values.f64()?;

        let mean = values.mean();
        let std = values.std(0);

        let z: Vec<Option<f64>> = match (mean, std) {
            (Some(mu), Some(sd)) if sd > 0.0 => values
                .into_iter()
                .map(|v| v.map(|x| (x - mu) / sd))
                .collect(),
            // Degenerate population: constant column or a single genotype.
            _ => values.into_iter().map(|v| v.map(|_| f64::NAN)).collect(),
        };

        let z = match control_row {
            Some(row) => match z[row] {
                Some(baseline) => z
                    .into_iter()
                    .map(|v| v.map(|x| x - baseline))
                    .collect(),
                None => {
                    warn!(
                        "screen '{screen}' has no '{control}' value for '{metric}'; \
                         leaving that metric unsubtracted"
                    );
                    z
                }
            },
            None => z,
        };

        columns.push(Column::from(Series::new(PlSmallStr::from(metric.as_str()), z)));
    }

    debug!(
        "normalized screen '{screen}': {} genotypes, control {}",
        part.height(),
        if control_row.is_some() { "present" } else { "absent" }
    );

    DataFrame::new(columns)
}

/// Full effect-size table: per-screen normalization followed by an
/// unweighted cross-screen mean per genotype.
///
/// The order is a correctness invariant. Averaging raw values across screens
/// before normalizing would mix incompatible scales, so this function always
/// normalizes first and then hands the z-scored table to the screen-scoped
/// aggregator. NaNs from degenerate screens propagate through the mean.
pub fn normalized_effects(df: &DataFrame, key: &str, control: &str) -> PolarsResult<DataFrame> {
    let normalized = normalize_within_screens(df, key, control)?;
    aggregate_profiles(&normalized, &[key])
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    #[test]
    fn control_row_normalizes_to_exactly_zero() {
        let df = df![
            "Gene" => &["N2", "unc-13", "trp-4"],
            "Screen" => &["PD_Screen", "PD_Screen", "PD_Screen"],
            "Response Speed" => &[1.0, 3.0, 5.0]
        ]
        .unwrap();

        let out = normalize_within_screens(&df, "Gene", "N2").unwrap();
        let speed = out.column("Response Speed").unwrap().f64().unwrap();
        assert_eq!(speed.get(0), Some(0.0));
        // Others are expressed relative to the control, in population-sd units.
        assert!(speed.get(1).unwrap() > 0.0);
        assert!(speed.get(2).unwrap() > speed.get(1).unwrap());
    }

    #[test]
    fn missing_control_passes_z_scores_through() {
        let df = df![
            "Gene" => &["unc-13", "trp-4"],
            "Screen" => &["G_Screen", "G_Screen"],
            "Response Speed" => &[1.0, 3.0]
        ]
        .unwrap();

        let out = normalize_within_screens(&df, "Gene", "N2").unwrap();
        let speed = out.column("Response Speed").unwrap().f64().unwrap();
        // Plain z-scores: mean 2, population std 1.
        assert!((speed.get(0).unwrap() + 1.0).abs() < 1e-9);
        assert!((speed.get(1).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_variance_yields_nan_not_infinity() {
        let df = df![
            "Gene" => &["N2", "unc-13"],
            "Screen" => &["PD_Screen", "PD_Screen"],
            "Response Speed" => &[2.0, 2.0]
        ]
        .unwrap();

        let out = normalize_within_screens(&df, "Gene", "N2").unwrap();
        let speed = out.column("Response Speed").unwrap().f64().unwrap();
        assert!(speed.get(0).unwrap().is_nan());
        assert!(speed.get(1).unwrap().is_nan());
    }

    #[test]
    fn screens_are_normalized_independently() {
        // Same genotypes, wildly different scales per screen; both screens
        // must give unc-13 the same control-relative score.
        let df = df![
            "Gene" => &["N2", "unc-13", "N2", "unc-13"],
            "Screen" => &["A", "A", "B", "B"],
            "Response Speed" => &[1.0, 3.0, 10.0, 10.4]
        ]
        .unwrap();

        let out = normalize_within_screens(&df, "Gene", "N2").unwrap();
        let speed = out.column("Response Speed").unwrap().f64().unwrap();
        // Screen A: mean 2, std 1 -> z = (-1, 1), subtracted -> (0, 2).
        assert!((speed.get(0).unwrap()).abs() < 1e-9);
        assert!((speed.get(1).unwrap() - 2.0).abs() < 1e-9);
        // Screen B: mean 10.2, std 0.2 -> same control-relative score.
        assert!((speed.get(2).unwrap()).abs() < 1e-9);
        assert!((speed.get(3).unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_then_average_differs_from_average_then_normalize() {
        // Three genotypes so the two orderings do not collapse to the same
        // number.
        let df = df![
            "Gene" => &["N2", "unc-13", "trp-4", "N2", "unc-13", "trp-4"],
            "Screen" => &["A", "A", "A", "B", "B", "B"],
            "Response Speed" => &[0.0, 1.0, 5.0, 10.0, 30.0, 12.0]
        ]
        .unwrap();

        let effects = normalized_effects(&df, "Gene", "N2").unwrap();
        let genes = effects.column("Gene").unwrap().str().unwrap();
        let speed = effects.column("Response Speed").unwrap().f64().unwrap();
        let idx = (0..effects.height())
            .find(|&i| genes.get(i) == Some("unc-13"))
            .unwrap();
        let pipeline_score = speed.get(idx).unwrap();

        // Correct result, computed per screen by hand.
        let z = |v: f64, vals: &[f64]| {
            let mu = vals.iter().sum::<f64>() / vals.len() as f64;
            let var = vals.iter().map(|x| (x - mu) * (x - mu)).sum::<f64>() / vals.len() as f64;
            (v - mu) / var.sqrt()
        };
        let a = [0.0, 1.0, 5.0];
        let b = [10.0, 30.0, 12.0];
        let expected =
            ((z(1.0, &a) - z(0.0, &a)) + (z(30.0, &b) - z(10.0, &b))) / 2.0;
        assert!((pipeline_score - expected).abs() < 1e-9);

        // The wrong order: average raw values across screens, then normalize.
        let raw_means = [5.0, 15.5, 8.5]; // N2, unc-13, trp-4
        let wrong = z(15.5, &raw_means) - z(5.0, &raw_means);
        assert!((pipeline_score - wrong).abs() > 0.1);
    }

    #[test]
    fn absent_genotype_gets_no_synthetic_row() {
        // trp-4 was only run in screen A.
        let df = df![
            "Gene" => &["N2", "unc-13", "trp-4", "N2", "unc-13"],
            "Screen" => &["A", "A", "A", "B", "B"],
            "Response Speed" => &[1.0, 3.0, 5.0, 2.0, 4.0]
        ]
        .unwrap();

        let out = normalize_within_screens(&df, "Gene", "N2").unwrap();
        assert_eq!(out.height(), 5);

        // Screen B's population statistics come from its two rows only:
        // mean 3, std 1, so unc-13's subtracted score is exactly 2.
        let speed = out.column("Response Speed").unwrap().f64().unwrap();
        assert!((speed.get(4).unwrap() - 2.0).abs() < 1e-9);

        // And the cross-screen table lists trp-4 with a single screen.
        let effects = normalized_effects(&df, "Gene", "N2").unwrap();
        let genes = effects.column("Gene").unwrap().str().unwrap();
        let screens = effects.column("Screen").unwrap().list().unwrap();
        let idx = (0..effects.height())
            .find(|&i| genes.get(i) == Some("trp-4"))
            .unwrap();
        assert_eq!(screens.get_as_series(idx).unwrap().len(), 1);
    }
}
