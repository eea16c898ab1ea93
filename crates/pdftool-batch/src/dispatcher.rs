//! Batch execution
//!
//! Runs one operation over every discovered file with a bounded number of
//! workers. A file that fails, for any reason including a panic inside the
//! operation, becomes a failed [`FileResult`]; only setup problems are
//! returned as [`BatchError`].
//!
//! ```text
//!  discover ──► FileTask × N ──► Semaphore(max_workers)
//!                                   │
//!                        spawn_blocking(resolve + execute)
//!                                   │ completion order
//!                                   ▼
//!                ProgressTracker ──► progress channel
//!                                   │
//!                                   ▼
//!                              BatchResult
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pdftool_batch::{BatchJob, BatchProcessor, Config};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let processor = BatchProcessor::new(&Config::default());
//! let job = BatchJob::new("scans", "scans/output", "compress");
//! let result = processor.process_directory(&job, None).await?;
//! println!("{} of {} succeeded", result.success_count, result.total_files);
//! # Ok(())
//! # }
//! ```

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::discovery::FileDiscovery;
use crate::error::{BatchError, OperationError};
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::registry::{Operation, OperationContext};

/// Message used when discovery finds nothing to do.
pub const NO_FILES_FOUND: &str = "No files found matching the pattern";

/// What to run and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Operation name, resolved per file so unknown names fail per file.
    pub operation: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    pub file_pattern: String,
    pub recursive: bool,
}

impl BatchJob {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            operation: operation.into(),
            params: Map::new(),
            file_pattern: "*.pdf".to_string(),
            recursive: true,
        }
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = pattern.into();
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }
}

/// One input file and its default output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl FileTask {
    /// Output defaults to `<output_dir>/<relative dir>/<stem>_processed.pdf`,
    /// where the relative directory is the input's location under
    /// `input_root`. Same-named files in different subdirectories therefore
    /// never share an output path.
    pub fn new(input: PathBuf, input_root: &Path, output_dir: &Path) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let subdir = input
            .parent()
            .and_then(|parent| parent.strip_prefix(input_root).ok())
            .unwrap_or_else(|| Path::new(""));
        let output = output_dir
            .join(subdir)
            .join(format!("{}_processed.pdf", stem));
        Self { input, output }
    }
}

/// Outcome for a single file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    pub file_path: PathBuf,
    pub success: bool,
    /// Every file the operation wrote. Split writes several.
    pub output_paths: Vec<PathBuf>,
    pub error: Option<String>,
    pub processing_time_ms: u64,
}

impl FileResult {
    fn from_outcome(
        file_path: PathBuf,
        outcome: Result<Vec<PathBuf>, OperationError>,
        processing_time_ms: u64,
    ) -> Self {
        match outcome {
            Ok(output_paths) => Self {
                file_path,
                success: true,
                output_paths,
                error: None,
                processing_time_ms,
            },
            Err(e) => Self {
                file_path,
                success: false,
                output_paths: Vec::new(),
                error: Some(e.to_string()),
                processing_time_ms,
            },
        }
    }

    pub fn file_name(&self) -> String {
        display_name(&self.file_path)
    }
}

/// Aggregate of a whole run. Per-file lists are in completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub success: bool,
    pub error: Option<String>,
    pub operation: String,
    pub total_files: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub processed_files: Vec<FileResult>,
    pub failed_files: Vec<FileResult>,
    pub output_dir: PathBuf,
    pub started_at: String,
    pub duration_ms: u64,
}

impl BatchResult {
    fn nothing_to_do(job: &BatchJob, started_at: String) -> Self {
        Self {
            success: false,
            error: Some(NO_FILES_FOUND.to_string()),
            operation: job.operation.clone(),
            total_files: 0,
            success_count: 0,
            failure_count: 0,
            processed_files: Vec::new(),
            failed_files: Vec::new(),
            output_dir: job.output_dir.clone(),
            started_at,
            duration_ms: 0,
        }
    }

    /// Successes first, then failures.
    pub fn results(&self) -> impl Iterator<Item = &FileResult> {
        self.processed_files.iter().chain(&self.failed_files)
    }

    /// Sum of per-file processing times, in milliseconds.
    pub fn total_processing_ms(&self) -> u64 {
        self.results().map(|r| r.processing_time_ms).sum()
    }
}

/// Runs batch jobs with a fixed worker pool.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    max_workers: usize,
    context: Arc<OperationContext>,
}

impl BatchProcessor {
    pub fn new(config: &Config) -> Self {
        Self {
            max_workers: config.batch.max_workers.max(1),
            context: Arc::new(OperationContext::from_config(config)),
        }
    }

    /// Override the pool width. Zero is treated as one.
    pub fn with_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Process every matching file under `job.input_dir`.
    ///
    /// When `progress` is given, a snapshot is sent after each file
    /// completes. A closed channel is logged once and otherwise ignored.
    #[instrument(skip(self, job, progress), fields(operation = %job.operation, input = %job.input_dir.display()))]
    pub async fn process_directory(
        &self,
        job: &BatchJob,
        progress: Option<&UnboundedSender<ProgressSnapshot>>,
    ) -> Result<BatchResult, BatchError> {
        let start_time = Instant::now();
        let started_at = chrono::Utc::now().to_rfc3339();

        let files = FileDiscovery::new(&job.input_dir)
            .pattern(&job.file_pattern)
            .map_err(|source| BatchError::Pattern {
                pattern: job.file_pattern.clone(),
                source,
            })?
            .recursive(job.recursive)
            .exclude(&job.output_dir)
            .find();
        if files.is_empty() {
            warn!(pattern = %job.file_pattern, "{}", NO_FILES_FOUND);
            return Ok(BatchResult::nothing_to_do(job, started_at));
        }

        tokio::fs::create_dir_all(&job.output_dir)
            .await
            .map_err(|source| BatchError::OutputDir {
                path: job.output_dir.clone(),
                source,
            })?;

        info!(
            "Processing {} files with '{}' using {} workers",
            files.len(),
            job.operation,
            self.max_workers
        );

        let tracker = ProgressTracker::new(files.len());
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let params = Arc::new(job.params.clone());

        let tasks: Vec<_> = files
            .into_iter()
            .map(|input| {
                let sem = semaphore.clone();
                let context = self.context.clone();
                let params = params.clone();
                let operation = job.operation.clone();
                let task = FileTask::new(input, &job.input_dir, &job.output_dir);
                async move {
                    let _permit = sem.acquire().await.ok();
                    run_task(task, operation, params, context).await
                }
            })
            .collect();

        let mut completions = stream::iter(tasks).buffer_unordered(self.max_workers);
        let mut processed_files = Vec::new();
        let mut failed_files = Vec::new();
        let mut receiver_gone = false;

        while let Some(result) = completions.next().await {
            tracker.update_progress(&result.file_path, result.success);

            if let Some(sender) = progress {
                if sender.send(tracker.get_progress()).is_err() && !receiver_gone {
                    warn!("Progress receiver closed; continuing without updates");
                    receiver_gone = true;
                }
            }

            if result.success {
                info!(
                    "Processed: {} -> {}",
                    result.file_name(),
                    output_names(&result.output_paths)
                );
                processed_files.push(result);
            } else {
                warn!(
                    "Failed: {} ({})",
                    result.file_name(),
                    result.error.as_deref().unwrap_or("unknown error")
                );
                failed_files.push(result);
            }
        }

        let snapshot = tracker.get_progress();
        let result = BatchResult {
            success: failed_files.is_empty(),
            error: None,
            operation: job.operation.clone(),
            total_files: tracker.total(),
            success_count: processed_files.len(),
            failure_count: failed_files.len(),
            processed_files,
            failed_files,
            output_dir: job.output_dir.clone(),
            started_at,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };
        debug!(processed = snapshot.processed, failed = snapshot.failed, "Tracker final state");
        info!(
            "Batch complete: {}/{} succeeded in {}ms",
            result.success_count, result.total_files, result.duration_ms
        );
        Ok(result)
    }
}

async fn run_task(
    task: FileTask,
    operation: String,
    params: Arc<Map<String, Value>>,
    context: Arc<OperationContext>,
) -> FileResult {
    let start = Instant::now();
    let input = task.input.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        let operation = Operation::resolve(&operation, &params)?;
        operation.execute(&task, &context)
    })
    .await
    .unwrap_or_else(|e| Err(OperationError::Panicked(join_error_message(e))));

    FileResult::from_outcome(input, outcome, start.elapsed().as_millis() as u64)
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn output_names(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| display_name(p))
        .collect::<Vec<_>>()
        .join(", ")
}
