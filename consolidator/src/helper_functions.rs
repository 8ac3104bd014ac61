use std::env;
use std::path::PathBuf;

use polars::prelude::*;

use crate::schema::SCREEN_COL;

pub fn project_root() -> PathBuf {
    match env::var_os("PROJECT_ROOT") {
        Some(val) => PathBuf::from(val),
        None => {
            // Fall back to current directory if PROJECT_ROOT not set
            env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    }
}

pub fn read_csv(file_path: &str) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(PathBuf::from(file_path)))?
        .finish()
}

pub fn dataframe_to_csv(
    df: &mut DataFrame,
    output_path: &str,
    include_header: bool,
) -> PolarsResult<()> {
    let mut file = std::fs::File::create(output_path)?;
    CsvWriter::new(&mut file)
        .include_header(include_header)
        .with_separator(b',')
        .finish(df)
}

/// CSV cannot hold list columns, so the contributing-screen set is joined
/// into a single comma-separated cell before export. Tables without a
/// list-typed `Screen` column pass through untouched.
pub fn flatten_screen_sets(df: &DataFrame) -> PolarsResult<DataFrame> {
    let has_list_screens = df
        .get_columns()
        .iter()
        .any(|c| c.name().as_str() == SCREEN_COL && matches!(c.dtype(), DataType::List(_)));
    if !has_list_screens {
        return Ok(df.clone());
    }

    let lists = df.column(SCREEN_COL)?.list()?;
    let mut joined: Vec<Option<String>> = Vec::with_capacity(df.height());
    for i in 0..lists.len() {
        match lists.get_as_series(i) {
            Some(s) => {
                let screens = s.str()?.into_iter().flatten().collect::<Vec<_>>().join(",");
                joined.push(Some(screens));
            }
            None => joined.push(None),
        }
    }

    let mut out = df.clone();
    out.with_column(Series::new(PlSmallStr::from(SCREEN_COL), joined))?;
    Ok(out)
}
