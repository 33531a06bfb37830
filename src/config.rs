use crate::error::Result;
use crate::ingestion::DEFAULT_LABEL_COLUMN;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MAX_RECORDS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Column holding the period label of each row.
    #[serde(default = "default_label_column")]
    pub label_column: String,

    /// Upper bound on rows accepted per audit. `None` disables the check.
    #[serde(default = "default_max_records")]
    pub max_records: Option<usize>,

    /// Additional numeric columns tracked on top of the audit type's catalog.
    #[serde(default)]
    pub extra_fields: Vec<String>,
}

fn default_label_column() -> String {
    DEFAULT_LABEL_COLUMN.to_string()
}

fn default_max_records() -> Option<usize> {
    Some(DEFAULT_MAX_RECORDS)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            label_column: default_label_column(),
            max_records: default_max_records(),
            extra_fields: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}
