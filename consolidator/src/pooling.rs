// src/pooling.rs
// -----------------------------------------------------------------------------
// Cross-screen pooling of per-screen (mean, sem, count) summary triples.
// -----------------------------------------------------------------------------

use std::collections::HashMap;

use polars::prelude::*;
use tracing::debug;

use crate::schema::{PooledStats, ScreenStat, SummarySchema, SCREEN_COL};

/// Combine one genotype's per-screen summary triples into a single pooled
/// triple plus a recomputed 95% confidence interval.
///
/// The sample count acts as a reliability weight for both the mean and the
/// variance term:
///
/// ```text
/// pooled_mean = Σ mean_i·count_i / Σ count_i
/// pooled_sem  = sqrt( Σ sem_i²·count_i / Σ count_i )
/// ci95        = pooled_mean ± 1.96·pooled_sem / sqrt(Σ count_i)
/// ```
///
/// The variance term weights by `count_i` rather than `count_i - 1`; that is
/// what downstream consumers were built against and is kept as-is.
///
/// Screens with `count_i == 0` contribute nothing. If every screen has a zero
/// count the result is all-NaN ("insufficient data", never zero). A NaN mean
/// or sem on a screen that does carry samples poisons the whole pooled output
/// for this metric.
pub fn pool_screen_stats(stats: &[ScreenStat]) -> PooledStats {
    let mut total = 0.0;
    let mut weighted_mean_sum = 0.0;
    let mut weighted_var_sum = 0.0;

    for s in stats {
        if s.count > 0.0 {
            total += s.count;
            weighted_mean_sum += s.mean * s.count;
            weighted_var_sum += s.sem * s.sem * s.count;
        }
    }

    if total == 0.0 {
        return PooledStats::nan();
    }

    // A poisoned sum means at least one contributing screen reported NaN;
    // the whole metric is untrustworthy for this genotype.
    let (mean, sem) = if weighted_mean_sum.is_nan() || weighted_var_sum.is_nan() {
        (f64::NAN, f64::NAN)
    } else {
        (
            weighted_mean_sum / total,
            (weighted_var_sum / total).sqrt(),
        )
    };

    let half_width = 1.96 * sem / total.sqrt();
    PooledStats {
        mean,
        sem,
        count: total,
        ci95_lo: mean - half_width,
        ci95_hi: mean + half_width,
    }
}

/// Pool a wide summary table across the screens it contains.
///
/// Input: one row per `(key, Screen)` with `{metric}-mean/-sem/-count`
/// columns for every metric in `schema`. Output: one row per distinct key (in
/// first-seen order) carrying the pooled triple per metric, recomputed
/// `{metric}-ci95_lo/-ci95_hi` columns, and the set of contributing screens
/// as a list column.
///
/// Missing counts weigh zero (the genotype is simply absent from that
/// screen); a missing mean or sem on a row with samples becomes NaN and
/// propagates per [`pool_screen_stats`].
pub fn pool_summary(df: &DataFrame, key: &str, schema: &SummarySchema) -> PolarsResult<DataFrame> {
    let key_col = df.column(key)?.str()?.clone();
    let screen_col = df.column(SCREEN_COL)?.str()?.clone();

    // Float views of every metric triple, cast once up front.
    let mut mean_cols = Vec::with_capacity(schema.metrics.len());
    let mut sem_cols = Vec::with_capacity(schema.metrics.len());
    let mut count_cols = Vec::with_capacity(schema.metrics.len());
    for metric in &schema.metrics {
        mean_cols.push(
            df.column(&schema.mean_col(metric))?
                .cast(&DataType::Float64)?
                .f64()?
                .clone(),
        );
        sem_cols.push(
            df.column(&schema.sem_col(metric))?
                .cast(&DataType::Float64)?
                .f64()?
                .clone(),
        );
        count_cols.push(
            df.column(&schema.count_col(metric))?
                .cast(&DataType::Float64)?
                .f64()?
                .clone(),
        );
    }

    // Group row indices by genotype, keeping first-seen key order so the
    // output ranking matches the input table.
    let mut key_order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for i in 0..df.height() {
        if let Some(k) = key_col.get(i) {
            groups
                .entry(k)
                .or_insert_with(|| {
                    key_order.push(k);
                    Vec::new()
                })
                .push(i);
        }
    }

    debug!(
        "pooling {} rows into {} genotypes across {} metrics",
        df.height(),
        key_order.len(),
        schema.metrics.len()
    );

    let n_keys = key_order.len();
    let mut pooled: Vec<Vec<PooledStats>> =
        vec![Vec::with_capacity(n_keys); schema.metrics.len()];
    let mut screen_sets: Vec<Series> = Vec::with_capacity(n_keys);

    for k in &key_order {
        let rows = &groups[k];

        for (j, _) in schema.metrics.iter().enumerate() {
            let stats: Vec<ScreenStat> = rows
                .iter()
                .map(|&i| ScreenStat {
                    mean: mean_cols[j].get(i).unwrap_or(f64::NAN),
                    sem: sem_cols[j].get(i).unwrap_or(f64::NAN),
                    count: count_cols[j].get(i).unwrap_or(0.0),
                })
                .collect();
            pooled[j].push(pool_screen_stats(&stats));
        }

        // Distinct contributing screens, first-seen order.
        let mut screens: Vec<&str> = Vec::new();
        for &i in rows {
            if let Some(s) = screen_col.get(i) {
                if !screens.contains(&s) {
                    screens.push(s);
                }
            }
        }
        screen_sets.push(Series::new(PlSmallStr::EMPTY, screens));
    }

    let mut columns: Vec<Column> = Vec::new();
    columns.push(Column::from(Series::new(
        PlSmallStr::from(key),
        key_order.clone(),
    )));
    for (j, metric) in schema.metrics.iter().enumerate() {
        let means: Vec<f64> = pooled[j].iter().map(|p| p.mean).collect();
        let sems: Vec<f64> = pooled[j].iter().map(|p| p.sem).collect();
        let counts: Vec<f64> = pooled[j].iter().map(|p| p.count).collect();
        columns.push(Column::from(Series::new(
            PlSmallStr::from(schema.mean_col(metric)),
            means,
        )));
        columns.push(Column::from(Series::new(
            PlSmallStr::from(schema.sem_col(metric)),
            sems,
        )));
        columns.push(Column::from(Series::new(
            PlSmallStr::from(schema.count_col(metric)),
            counts,
        )));
    }
    // Confidence intervals go after the pooled triples, mirroring the layout
    // consumers already read.
    for (j, metric) in schema.metrics.iter().enumerate() {
        let los: Vec<f64> = pooled[j].iter().map(|p| p.ci95_lo).collect();
        let his: Vec<f64> = pooled[j].iter().map(|p| p.ci95_hi).collect();
        columns.push(Column::from(Series::new(
            PlSmallStr::from(schema.ci95_lo_col(metric)),
            los,
        )));
        columns.push(Column::from(Series::new(
            PlSmallStr::from(schema.ci95_hi_col(metric)),
            his,
        )));
    }
    columns.push(Column::from(Series::new(
        PlSmallStr::from(SCREEN_COL),
        screen_sets,
    )));

    DataFrame::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    fn stat(mean: f64, sem: f64, count: f64) -> ScreenStat {
        ScreenStat { mean, sem, count }
    }

    #[test]
    fn single_screen_pooling_is_identity() {
        let p = pool_screen_stats(&[stat(2.5, 0.4, 25.0)]);
        assert!((p.mean - 2.5).abs() < 1e-12);
        assert!((p.sem - 0.4).abs() < 1e-12);
        assert!((p.count - 25.0).abs() < 1e-12);
        let half = 1.96 * 0.4 / 25.0_f64.sqrt();
        assert!((p.ci95_lo - (2.5 - half)).abs() < 1e-12);
        assert!((p.ci95_hi - (2.5 + half)).abs() < 1e-12);
    }

    #[test]
    fn pooled_count_is_sum_and_mean_is_bounded() {
        let stats = [stat(1.0, 0.1, 10.0), stat(3.0, 0.3, 30.0), stat(2.0, 0.2, 5.0)];
        let p = pool_screen_stats(&stats);
        assert!((p.count - 45.0).abs() < 1e-12);
        assert!(p.mean >= 1.0 && p.mean <= 3.0);
        // Weighted towards the larger screen.
        assert!(p.mean > 2.0);
    }

    #[test]
    fn zero_count_screens_are_excluded() {
        let with_empty = pool_screen_stats(&[
            stat(1.0, 0.1, 10.0),
            stat(f64::NAN, f64::NAN, 0.0),
        ]);
        let without = pool_screen_stats(&[stat(1.0, 0.1, 10.0)]);
        assert!((with_empty.mean - without.mean).abs() < 1e-12);
        assert!((with_empty.sem - without.sem).abs() < 1e-12);
        assert!((with_empty.count - without.count).abs() < 1e-12);
    }

    #[test]
    fn all_zero_counts_yield_nan_everywhere() {
        let p = pool_screen_stats(&[stat(1.0, 0.1, 0.0), stat(2.0, 0.2, 0.0)]);
        assert!(p.mean.is_nan());
        assert!(p.sem.is_nan());
        assert!(p.count.is_nan());
        assert!(p.ci95_lo.is_nan());
        assert!(p.ci95_hi.is_nan());
    }

    #[test]
    fn nan_sem_with_samples_poisons_the_metric() {
        let p = pool_screen_stats(&[stat(1.0, f64::NAN, 10.0), stat(2.0, 0.2, 20.0)]);
        assert!(p.mean.is_nan());
        assert!(p.sem.is_nan());
        assert!(p.ci95_lo.is_nan());
        // Count stays the real sample total.
        assert!((p.count - 30.0).abs() < 1e-12);
    }

    #[test]
    fn table_pooling_combines_screens_per_genotype() {
        let df = df![
            "Gene" => &["unc-13", "unc-13", "N2"],
            "Screen" => &["PD_Screen", "G_Screen", "PD_Screen"],
            "Response Speed-mean" => &[1.0, 3.0, 2.0],
            "Response Speed-sem" => &[0.1, 0.3, 0.2],
            "Response Speed-count" => &[10.0, 30.0, 25.0]
        ]
        .unwrap();
        let schema = SummarySchema::from_dataframe(&df, "Gene").unwrap();

        let pooled = pool_summary(&df, "Gene", &schema).unwrap();
        assert_eq!(pooled.height(), 2);

        // First-seen key order.
        let genes = pooled.column("Gene").unwrap().str().unwrap();
        assert_eq!(genes.get(0), Some("unc-13"));
        assert_eq!(genes.get(1), Some("N2"));

        let means = pooled.column("Response Speed-mean").unwrap().f64().unwrap();
        let expected = (1.0 * 10.0 + 3.0 * 30.0) / 40.0;
        assert!((means.get(0).unwrap() - expected).abs() < 1e-12);
        assert!((means.get(1).unwrap() - 2.0).abs() < 1e-12);

        let counts = pooled.column("Response Speed-count").unwrap().f64().unwrap();
        assert!((counts.get(0).unwrap() - 40.0).abs() < 1e-12);

        let lo = pooled.column("Response Speed-ci95_lo").unwrap().f64().unwrap();
        let hi = pooled.column("Response Speed-ci95_hi").unwrap().f64().unwrap();
        assert!(lo.get(0).unwrap() < means.get(0).unwrap());
        assert!(hi.get(0).unwrap() > means.get(0).unwrap());

        // Contributing-screen sets.
        let screens = pooled.column("Screen").unwrap().list().unwrap();
        assert_eq!(screens.get_as_series(0).unwrap().len(), 2);
        assert_eq!(screens.get_as_series(1).unwrap().len(), 1);
    }

    #[test]
    fn missing_rows_weigh_nothing_in_table_pooling() {
        // unc-13 has a null count in G_Screen: that screen must not bias it.
        let df = df![
            "Gene" => &["unc-13", "unc-13"],
            "Screen" => &["PD_Screen", "G_Screen"],
            "Response Speed-mean" => &[Some(1.0), None],
            "Response Speed-sem" => &[Some(0.1), None],
            "Response Speed-count" => &[Some(10.0), None]
        ]
        .unwrap();
        let schema = SummarySchema::from_dataframe(&df, "Gene").unwrap();

        let pooled = pool_summary(&df, "Gene", &schema).unwrap();
        let means = pooled.column("Response Speed-mean").unwrap().f64().unwrap();
        assert!((means.get(0).unwrap() - 1.0).abs() < 1e-12);
        let counts = pooled.column("Response Speed-count").unwrap().f64().unwrap();
        assert!((counts.get(0).unwrap() - 10.0).abs() < 1e-12);
    }
}
