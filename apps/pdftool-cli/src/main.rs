//! pdftool command line
//!
//! Batch processing plus a few single-shot utilities. Logs go to stderr so
//! stdout carries only reports and query output.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pdftool_batch::{
    find_duplicates, BatchJob, BatchProcessor, Config, DuplicateMethod, ProgressSnapshot,
    ReportFormat, Reporter,
};
use pdftool_core::{convert_file, merge_documents, read_info, FileType, OfficeConverter};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pdftool")]
#[command(version, about = "Batch PDF processing: metadata, compression, splitting and more")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one operation over every matching file in a directory
    Batch(BatchArgs),
    /// Merge PDFs, images and office documents into one PDF
    Merge {
        /// Inputs, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Output PDF
        #[arg(short, long)]
        output: PathBuf,
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Find duplicate PDFs
    Duplicates {
        dir: PathBuf,
        /// size, hash or content
        #[arg(long, default_value = "hash")]
        method: DuplicateMethod,
        #[arg(long)]
        no_recursive: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show page count, version and Info fields of a PDF
    Info { file: PathBuf },
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Directory containing input files
    input_dir: PathBuf,

    /// Output directory (default: <input_dir>/output)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Extra metadata fields as a JSON object
    #[arg(short, long)]
    metadata: Option<String>,

    /// Number of worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// compress, watermark, encrypt, split, clean_metadata, convert, bypass_metadata
    #[arg(long, default_value = "bypass_metadata")]
    operation: String,

    /// Operation parameter, repeatable. Values are parsed as JSON when possible.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// File pattern such as "*.pdf" or "*.doc;*.docx"
    #[arg(long)]
    pattern: Option<String>,

    /// Only process the top level of input_dir
    #[arg(long)]
    no_recursive: bool,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// text or json
    #[arg(long)]
    report: Option<ReportFormat>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let outcome = match cli.command {
        Command::Batch(args) => run_batch(args).await,
        Command::Merge {
            files,
            output,
            config,
        } => run_merge(&files, &output, config.as_deref()),
        Command::Duplicates {
            dir,
            method,
            no_recursive,
            json,
        } => run_duplicates(&dir, method, !no_recursive, json),
        Command::Info { file } => run_info(&file),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}

async fn run_batch(args: BatchArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;

    let mut params = Map::new();
    for raw in &args.params {
        let (key, value) = parse_param(raw)?;
        params.insert(key, value);
    }
    if let Some(metadata) = &args.metadata {
        params.insert("metadata".to_string(), Value::Object(parse_metadata(metadata)?));
    }

    let pattern = args
        .pattern
        .clone()
        .or_else(|| convert_pattern(&args.operation, &params))
        .unwrap_or_else(|| config.batch.file_pattern.clone());
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| args.input_dir.join("output"));

    let job = BatchJob::new(&args.input_dir, &output_dir, &args.operation)
        .with_params(params)
        .with_pattern(pattern)
        .with_recursive(config.batch.recursive && !args.no_recursive);

    let mut processor = BatchProcessor::new(&config);
    if let Some(workers) = args.workers {
        processor = processor.with_workers(workers);
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressSnapshot>();
    let printer = tokio::spawn(async move {
        while let Some(snapshot) = rx.recv().await {
            eprintln!("{}", progress_line(&snapshot));
        }
    });

    let result = processor.process_directory(&job, Some(&tx)).await;
    drop(tx);
    if let Err(e) = printer.await {
        tracing::warn!("Progress printer stopped: {}", e);
    }
    let result = result.context("Batch processing failed")?;

    let reporter = Reporter::new(args.report.unwrap_or(config.batch.report_format));
    print!("{}", reporter.format_results(&result)?);
    if result.total_files > 0 {
        let path = reporter.write_to_dir(&result, &output_dir)?;
        tracing::info!("Report saved to {}", path.display());
    }
    Ok(())
}

/// `KEY=VALUE`, with VALUE read as JSON when it parses and as a string otherwise.
fn parse_param(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Invalid --param '{}': expected KEY=VALUE", raw);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid --param '{}': empty key", raw);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// A JSON object whose values become Info field strings.
fn parse_metadata(raw: &str) -> Result<Map<String, Value>> {
    let parsed: Value = serde_json::from_str(raw).context("Invalid metadata JSON")?;
    let Value::Object(fields) = parsed else {
        bail!("Invalid metadata JSON: expected an object");
    };
    Ok(fields
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, Value::String(text))
        })
        .collect())
}

/// Convert jobs default to the extensions of their source type.
fn convert_pattern(operation: &str, params: &Map<String, Value>) -> Option<String> {
    if operation != "convert" {
        return None;
    }
    let file_type: FileType = params.get("file_type")?.as_str()?.parse().ok()?;
    Some(file_type.pattern())
}

fn progress_line(snapshot: &ProgressSnapshot) -> String {
    format!(
        "[{}/{}] {:5.1}% {} (failed: {}, ETA {:.1}s)",
        snapshot.processed,
        snapshot.total,
        snapshot.progress_percent,
        snapshot.current_file,
        snapshot.failed,
        snapshot.estimated_remaining
    )
}

fn run_merge(files: &[PathBuf], output: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let office = config.convert.office_converter();

    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        documents.push(load_merge_input(file, &office)?);
    }

    let merged = merge_documents(documents).context("Merge failed")?;
    fs::write(output, &merged).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Merged {} files into {}", files.len(), output.display());
    Ok(())
}

/// PDF bytes for one merge input. Convertible inputs get their own scratch
/// directory, removed when the conversion finishes.
fn load_merge_input(file: &Path, office: &OfficeConverter) -> Result<Vec<u8>> {
    let Some(file_type) = FileType::from_path(file) else {
        return fs::read(file).with_context(|| format!("Failed to read {}", file.display()));
    };
    let scratch = TempDir::new().context("Failed to create scratch directory")?;
    convert_file(file, file_type, office, scratch.path())
        .with_context(|| format!("Failed to convert {}", file.display()))
}

fn run_duplicates(dir: &Path, method: DuplicateMethod, recursive: bool, json: bool) -> Result<()> {
    let report = find_duplicates(dir, recursive, method);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.groups.is_empty() {
        println!("No duplicates found");
        return Ok(());
    }
    for (i, group) in report.groups.iter().enumerate() {
        println!("Group {} ({}):", i + 1, group.key);
        for file in &group.files {
            println!("  {}", file.display());
        }
    }
    println!(
        "{} duplicate files, {} bytes reclaimable",
        report.duplicate_count(),
        report.reclaimable_bytes()
    );
    Ok(())
}

fn run_info(file: &Path) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let info = read_info(&bytes)?;
    println!("File:      {}", file.display());
    println!("Version:   {}", info.version);
    println!("Pages:     {}", info.page_count);
    println!("Size:      {} bytes", info.size_bytes);
    println!("Encrypted: {}", info.is_encrypted);
    for (key, value) in &info.fields {
        println!("{:<10} {}", format!("{}:", key), value);
    }
    Ok(())
}
