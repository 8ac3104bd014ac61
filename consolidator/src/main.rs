use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use consolidator::config::RunConfig;
use consolidator::helper_functions::{
    dataframe_to_csv, flatten_screen_sets, project_root, read_csv,
};
use consolidator::selection::{consolidate, distinct_screens, profile_view};

fn main() -> anyhow::Result<()> {
    // Setup logging and run configuration
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting cross-screen consolidation");

    let config_path = std::env::args().nth(1).unwrap_or_else(|| {
        project_root()
            .join("config.json")
            .to_string_lossy()
            .to_string()
    });
    let config = RunConfig::load(&config_path)?;

    let summary = read_csv(&config.summary_table)
        .with_context(|| format!("reading summary table '{}'", config.summary_table))?;
    let profile = read_csv(&config.profile_table)
        .with_context(|| format!("reading profile table '{}'", config.profile_table))?;

    let screens = if config.screens.is_empty() {
        distinct_screens(&summary)?
    } else {
        config.screens.clone()
    };
    info!("selected screens: {:?}", screens);

    let tables = consolidate(
        &summary,
        &profile,
        &config.key_column,
        &screens,
        &config.control,
    )?;

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating output directory '{}'", config.output_dir))?;

    let pooled_path = format!("{}/pooled.csv", config.output_dir);
    let effects_path = format!("{}/effects.csv", config.output_dir);
    let mut pooled = flatten_screen_sets(&tables.pooled)?;
    let mut effects = flatten_screen_sets(&tables.effects)?;
    dataframe_to_csv(&mut pooled, &pooled_path, true)?;
    dataframe_to_csv(&mut effects, &effects_path, true)?;

    info!("wrote {} pooled rows to {}", pooled.height(), pooled_path);
    info!("wrote {} effect rows to {}", effects.height(), effects_path);

    if let Some(path) = &config.metric_profile_table {
        let profile_long =
            read_csv(path).with_context(|| format!("reading metric profile table '{path}'"))?;
        let view = profile_view(&profile_long, &config.key_column, &screens)?;
        let profiles_path = format!("{}/profiles.csv", config.output_dir);
        let mut view = flatten_screen_sets(&view)?;
        dataframe_to_csv(&mut view, &profiles_path, true)?;
        info!("wrote {} profile rows to {}", view.height(), profiles_path);
    }

    Ok(())
}
