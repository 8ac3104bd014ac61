use std::fs;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::schema::CONTROL_KEY;

/// Run configuration for the batch driver: which table snapshots to load,
/// which screens the user selected, and where the derived tables go.
///
/// An empty `screens` list means "every screen present in the summary
/// table".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// CSV with `{metric}-mean/-sem/-count` columns per `(key, Screen)` row.
    pub summary_table: String,
    /// CSV with one raw metric value column per `(key, Screen)` row.
    pub profile_table: String,
    /// Optional long-form CSV keyed `(key, Metric, Screen)` for the
    /// descriptive profile view.
    #[serde(default)]
    pub metric_profile_table: Option<String>,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default = "default_control")]
    pub control: String,
    #[serde(default)]
    pub screens: Vec<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_key_column() -> String {
    "Gene".to_string()
}

fn default_control() -> String {
    CONTROL_KEY.to_string()
}

fn default_output_dir() -> String {
    "./consolidated".to_string()
}

impl RunConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config file '{path}'"))?;
        let config: RunConfig =
            serde_json::from_str(&text).with_context(|| format!("parsing config file '{path}'"))?;
        Ok(config)
    }
}
