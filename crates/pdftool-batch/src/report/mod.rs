//! Processing reports
//!
//! A report is written once, next to the batch output, after the run.
//!
//! # Example
//!
//! ```no_run
//! use pdftool_batch::report::{ReportFormat, Reporter};
//! use pdftool_batch::BatchResult;
//!
//! # fn example(result: BatchResult) -> Result<(), pdftool_batch::BatchError> {
//! let reporter = Reporter::new(ReportFormat::Text);
//! print!("{}", reporter.format_results(&result)?);
//! reporter.write_to_dir(&result, &result.output_dir)?;
//! # Ok(())
//! # }
//! ```

mod json;
mod text;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::dispatcher::BatchResult;
use crate::error::BatchError;

pub use json::JsonReporter;
pub use text::TextReporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human-readable summary with one line per file
    #[default]
    Text,
    /// Pretty-printed `BatchResult`
    Json,
}

impl ReportFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            ReportFormat::Text => "processing_report.txt",
            ReportFormat::Json => "processing_report.json",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("Unknown report format: {}", other)),
        }
    }
}

/// Reporter for batch results
pub struct Reporter {
    format: ReportFormat,
}

impl Reporter {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    /// Format results as a string
    pub fn format_results(&self, result: &BatchResult) -> Result<String, BatchError> {
        match self.format {
            ReportFormat::Text => TextReporter::format(result),
            ReportFormat::Json => JsonReporter::format(result, true),
        }
    }

    /// Write results to a file
    pub fn write_to_file<P: AsRef<Path>>(
        &self,
        result: &BatchResult,
        path: P,
    ) -> Result<(), BatchError> {
        let path = path.as_ref();
        let output = self.format_results(result)?;
        fs::write(path, output).map_err(|source| BatchError::Report {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write `processing_report.{txt,json}` into `dir` and return its path.
    pub fn write_to_dir<P: AsRef<Path>>(
        &self,
        result: &BatchResult,
        dir: P,
    ) -> Result<PathBuf, BatchError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| BatchError::OutputDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(self.format.file_name());
        self.write_to_file(result, &path)?;
        Ok(path)
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(ReportFormat::default())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::create_test_result;
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("txt".parse::<ReportFormat>().unwrap(), ReportFormat::Text);
        assert!("html".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_write_to_dir_names_file_by_format() {
        let tmp = TempDir::new().unwrap();
        let result = create_test_result();

        let text = Reporter::new(ReportFormat::Text)
            .write_to_dir(&result, tmp.path())
            .unwrap();
        assert_eq!(text, tmp.path().join("processing_report.txt"));
        assert!(fs::read_to_string(&text).unwrap().contains("Failed: 1"));

        let json = Reporter::new(ReportFormat::Json)
            .write_to_dir(&result, tmp.path().join("nested"))
            .unwrap();
        let parsed: BatchResult =
            serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(parsed, result);
    }
}
