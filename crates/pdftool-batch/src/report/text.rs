//! Plain-text report
//!
//! One numbered line per file, successes before failures.

use std::fmt::Write;

use crate::dispatcher::{output_names, BatchResult};
use crate::error::BatchError;

/// Text format reporter
pub struct TextReporter;

impl TextReporter {
    pub fn format(result: &BatchResult) -> Result<String, BatchError> {
        let mut output = String::new();

        if result.total_files == 0 {
            writeln!(output, "No files processed")?;
            if let Some(error) = &result.error {
                writeln!(output, "{}", error)?;
            }
            return Ok(output);
        }

        let total_secs = result.total_processing_ms() as f64 / 1000.0;
        let average_secs = total_secs / result.total_files as f64;

        writeln!(output)?;
        writeln!(output, "=== BATCH PROCESSING REPORT ===")?;
        writeln!(output, "Operation: {}", result.operation)?;
        writeln!(output, "Started: {}", result.started_at)?;
        writeln!(output, "Total files: {}", result.total_files)?;
        writeln!(output, "Successful: {}", result.success_count)?;
        writeln!(output, "Failed: {}", result.failure_count)?;
        writeln!(output, "Total processing time: {:.2} seconds", total_secs)?;
        writeln!(output, "Average time per file: {:.2} seconds", average_secs)?;
        writeln!(output, "Wall-clock time: {:.2} seconds", result.duration_ms as f64 / 1000.0)?;
        writeln!(output)?;
        writeln!(output, "Output directory: {}", result.output_dir.display())?;
        writeln!(output)?;
        writeln!(output, "DETAILED RESULTS:")?;

        for (i, file) in result.results().enumerate() {
            let secs = file.processing_time_ms as f64 / 1000.0;
            if file.success {
                writeln!(
                    output,
                    "{:2}. ✅ {} -> {} ({:.2}s)",
                    i + 1,
                    file.file_name(),
                    output_names(&file.output_paths),
                    secs
                )?;
            } else {
                writeln!(
                    output,
                    "{:2}. ❌ {} (Error: {}) ({:.2}s)",
                    i + 1,
                    file.file_name(),
                    file.error.as_deref().unwrap_or("unknown error"),
                    secs
                )?;
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::test_support::create_test_result;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_text_report_lines() {
        let output = TextReporter::format(&create_test_result()).unwrap();
        assert!(output.contains("=== BATCH PROCESSING REPORT ==="));
        assert!(output.contains("Total files: 2\nSuccessful: 1\nFailed: 1\n"));
        assert!(output.contains("Total processing time: 0.15 seconds"));
        assert!(output.contains("Average time per file: 0.0"));
        assert!(output.contains(
            " 1. ✅ report.pdf -> report_part_001.pdf, report_part_002.pdf (0.12s)"
        ));
        assert!(output.contains(
            " 2. ❌ broken.pdf (Error: Failed to parse PDF: invalid file header) (0.03s)"
        ));
    }

    #[test]
    fn test_empty_result() {
        let mut result = create_test_result();
        result.total_files = 0;
        result.processed_files.clear();
        result.failed_files.clear();
        result.error = Some("No files found matching the pattern".to_string());

        let output = TextReporter::format(&result).unwrap();
        assert_eq!(
            output,
            "No files processed\nNo files found matching the pattern\n"
        );
    }
}
