//! Extraction configuration.
//!
//! Loaded from a TOML file; every field has a default, so an empty file (or
//! no file) gives the standard layout: batches of 1000 keys, per-partition
//! tables named `sitefile_<p>`, `qw_sample_<p>`, `qw_result_<p>`,
//! `qw_sample_cm_<p>`, `qw_result_cm_<p>`, `qw_val_qual_<p>`, and a shared
//! `parm` catalog.
//!
//! ```toml
//! batch_size = 1000
//! schema = "nwis"
//! plot_medium_codes = ["WS", "WG", "WSQ", "WGQ", "OAQ"]
//! excluded_dqi_codes = ["Q", "X"]
//!
//! [tables]
//! sample = "qw_sample_{partition}"
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::validate_identifier;
use crate::batch::DEFAULT_BATCH_SIZE;
use crate::error::{ExtractError, Result};

const PARTITION_PLACEHOLDER: &str = "{partition}";

/// The source tables an extraction reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Site,
    Sample,
    Result,
    SampleComment,
    ResultComment,
    Qualifier,
    Parameter,
}

impl Table {
    /// Column used as the IN-list key when querying this table.
    pub fn key_column(self) -> &'static str {
        match self {
            Table::Site | Table::Sample => "site_no",
            Table::Result | Table::SampleComment | Table::ResultComment | Table::Qualifier => {
                "record_no"
            }
            Table::Parameter => "parm_cd",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub site: String,
    pub sample: String,
    pub result: String,
    pub sample_comment: String,
    pub result_comment: String,
    pub qualifier: String,
    pub parameter: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            site: "sitefile_{partition}".to_string(),
            sample: "qw_sample_{partition}".to_string(),
            result: "qw_result_{partition}".to_string(),
            sample_comment: "qw_sample_cm_{partition}".to_string(),
            result_comment: "qw_result_cm_{partition}".to_string(),
            qualifier: "qw_val_qual_{partition}".to_string(),
            parameter: "parm".to_string(),
        }
    }
}

impl TableNames {
    fn template(&self, table: Table) -> &str {
        match table {
            Table::Site => &self.site,
            Table::Sample => &self.sample,
            Table::Result => &self.result,
            Table::SampleComment => &self.sample_comment,
            Table::ResultComment => &self.result_comment,
            Table::Qualifier => &self.qualifier,
            Table::Parameter => &self.parameter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Maximum number of keys in one IN list.
    pub batch_size: usize,
    /// Schema (or owner) prefix applied to every table name.
    pub schema: Option<String>,
    pub tables: TableNames,
    /// Medium codes kept in the plot table.
    pub plot_medium_codes: Vec<String>,
    /// DQI codes marking results that are excluded from both tables.
    pub excluded_dqi_codes: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            schema: None,
            tables: TableNames::default(),
            plot_medium_codes: ["WS", "WG", "WSQ", "WGQ", "OAQ"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            excluded_dqi_codes: vec!["Q".to_string(), "X".to_string()],
        }
    }
}

impl ExtractionConfig {
    /// Loads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ExtractError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ExtractionConfig = toml::from_str(content)
            .map_err(|e| ExtractError::Config(format!("failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ExtractError::Config("batch_size must be at least 1".to_string()));
        }
        if let Some(schema) = &self.schema {
            validate_identifier(schema)
                .map_err(|e| ExtractError::Config(format!("schema: {}", e)))?;
        }
        for table in [
            Table::Site,
            Table::Sample,
            Table::Result,
            Table::SampleComment,
            Table::ResultComment,
            Table::Qualifier,
            Table::Parameter,
        ] {
            let probe = self.tables.template(table).replace(PARTITION_PLACEHOLDER, "p");
            validate_identifier(&probe)
                .map_err(|e| ExtractError::Config(format!("table {:?}: {}", table, e)))?;
        }
        Ok(())
    }

    /// Fully qualified table name for one partition.
    pub fn table_name(&self, table: Table, partition: &str) -> String {
        let name = self
            .tables
            .template(table)
            .replace(PARTITION_PLACEHOLDER, partition);
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, name),
            None => name,
        }
    }

    pub fn is_plot_medium(&self, medium_cd: Option<&str>) -> bool {
        medium_cd.is_some_and(|m| {
            self.plot_medium_codes
                .iter()
                .any(|allowed| allowed.trim().eq_ignore_ascii_case(m.trim()))
        })
    }
}
