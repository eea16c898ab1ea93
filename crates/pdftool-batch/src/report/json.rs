//! JSON reporter for batch results

use crate::dispatcher::BatchResult;
use crate::error::BatchError;

/// JSON format reporter
pub struct JsonReporter;

impl JsonReporter {
    /// Serialize the whole result, optionally pretty-printed.
    pub fn format(result: &BatchResult, pretty: bool) -> Result<String, BatchError> {
        let output = if pretty {
            serde_json::to_string_pretty(result)?
        } else {
            serde_json::to_string(result)?
        };
        Ok(output)
    }
}
