//! TOML configuration for batch runs
//!
//! Every section is optional. A missing file section falls back to the
//! defaults documented on each field.
//!
//! ```toml
//! [batch]
//! max_workers = 8
//! file_pattern = "*.pdf"
//! report_format = "json"
//!
//! [convert]
//! office_command = "/opt/libreoffice/program/soffice"
//!
//! [metadata]
//! filename_length = 12
//! default_fields = { CustomHashBypass = "1", Department = "Legal" }
//! ```

use anyhow::Context;
use pdftool_core::OfficeConverter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::report::ReportFormat;

/// Service configuration, built once at startup and passed by reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(s).context("Failed to parse TOML configuration")?;
        anyhow::ensure!(config.batch.max_workers > 0, "max_workers must be at least 1");
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Worker pool width (default: 4)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Default discovery pattern (default: "*.pdf")
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
    /// Walk subdirectories (default: true)
    #[serde(default = "default_recursive")]
    pub recursive: bool,
    #[serde(default)]
    pub report_format: ReportFormat,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            file_pattern: default_file_pattern(),
            recursive: default_recursive(),
            report_format: ReportFormat::default(),
        }
    }
}

fn default_max_workers() -> usize {
    4
}

fn default_file_pattern() -> String {
    "*.pdf".to_string()
}

fn default_recursive() -> bool {
    true
}

/// External office converter invocation: `<office_command> <office_args..> <out_dir> <input>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertConfig {
    #[serde(default = "default_office_command")]
    pub office_command: String,
    #[serde(default = "default_office_args")]
    pub office_args: Vec<String>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            office_command: default_office_command(),
            office_args: default_office_args(),
        }
    }
}

impl ConvertConfig {
    pub fn office_converter(&self) -> OfficeConverter {
        OfficeConverter {
            command: self.office_command.clone(),
            args: self.office_args.clone(),
        }
    }
}

fn default_office_command() -> String {
    OfficeConverter::default().command
}

fn default_office_args() -> Vec<String> {
    OfficeConverter::default().args
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Extra Info fields written by `bypass_metadata` (default: CustomHashBypass = "1")
    #[serde(default = "default_fields")]
    pub default_fields: BTreeMap<String, String>,
    /// Length of the random output name suffix (default: 8)
    #[serde(default = "default_filename_length")]
    pub filename_length: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            default_fields: default_fields(),
            filename_length: default_filename_length(),
        }
    }
}

fn default_fields() -> BTreeMap<String, String> {
    BTreeMap::from([("CustomHashBypass".to_string(), "1".to_string())])
}

fn default_filename_length() -> usize {
    8
}
