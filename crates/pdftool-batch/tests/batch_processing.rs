//! End-to-end behavior of the batch processor against real files on disk.

mod common;

use common::create_test_pdf;
use pdftool_batch::{
    BatchJob, BatchProcessor, Config, FileDiscovery, ProgressTracker, ReportFormat, Reporter,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write_pdfs(dir: &Path, names: &[&str]) {
    for name in names {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, create_test_pdf(2)).unwrap();
    }
}

fn params(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    value.as_object().cloned().unwrap()
}

fn processor() -> BatchProcessor {
    BatchProcessor::new(&Config::default())
}

#[test]
fn empty_tracker_reports_zero_and_complete() {
    let snapshot = ProgressTracker::new(0).get_progress();
    assert_eq!(snapshot.progress_percent, 0.0);
    assert_eq!(snapshot.processed, 0);
    assert!(snapshot.is_complete);
}

#[test]
fn concurrent_updates_are_never_lost() {
    let tracker = Arc::new(ProgressTracker::new(100));
    std::thread::scope(|scope| {
        for worker in 0..10 {
            let tracker = tracker.clone();
            scope.spawn(move || {
                for i in 0..10 {
                    let name = format!("w{}-{}.pdf", worker, i);
                    tracker.update_progress(Path::new(&name), i % 3 != 0);
                }
            });
        }
    });

    let snapshot = tracker.get_progress();
    assert_eq!(snapshot.processed, 100);
    assert_eq!(snapshot.failed, 40);
    assert_eq!(snapshot.success + snapshot.failed, 100);
    assert!(snapshot.is_complete);
}

#[test]
fn estimate_starts_at_zero_and_never_grows_at_steady_rate() {
    let total = 8;
    let tracker = ProgressTracker::new(total);
    assert_eq!(tracker.get_progress().estimated_remaining, 0.0);

    let mut previous = f64::INFINITY;
    for i in 1..=total {
        tracker.update_progress(Path::new("f.pdf"), true);
        let now = tracker.started_at() + Duration::from_millis(250 * i as u64);
        let estimate = tracker.progress_at(now).estimated_remaining;
        assert!(estimate >= 0.0);
        assert!(estimate <= previous, "{} > {}", estimate, previous);
        previous = estimate;
    }
    assert_eq!(previous, 0.0);
}

#[test]
fn discovery_on_missing_directory_is_empty() {
    assert!(FileDiscovery::new("/no/such/input/dir").find().is_empty());
}

#[test]
fn discovery_respects_recursion() {
    let tmp = TempDir::new().unwrap();
    write_pdfs(tmp.path(), &["top.pdf", "nested/inner.pdf", "nested/deep/bottom.pdf"]);

    let flat = FileDiscovery::new(tmp.path()).recursive(false).find();
    assert_eq!(flat, vec![tmp.path().join("top.pdf")]);

    let all = FileDiscovery::new(tmp.path()).recursive(true).find();
    assert_eq!(all.len(), 3);
    let mut sorted = all.clone();
    sorted.sort();
    assert_eq!(all, sorted);
}

#[tokio::test]
async fn missing_input_directory_reports_no_files() {
    let tmp = TempDir::new().unwrap();
    let job = BatchJob::new(tmp.path().join("absent"), tmp.path().join("out"), "compress");
    let result = processor().process_directory(&job, None).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.total_files, 0);
    assert_eq!(result.failure_count, 0);
    assert!(result.error.unwrap().contains("No files found"));
}

#[tokio::test]
async fn corrupt_file_fails_without_aborting() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("broken.pdf"), b"%PDF-1.4\nthis is not a pdf").unwrap();
    let job = BatchJob::new(tmp.path(), tmp.path().join("out"), "compress");

    let result = processor().process_directory(&job, None).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.total_files, 1);
    assert_eq!(result.success_count, 0);
    assert_eq!(result.failure_count, 1);
    let error = result.failed_files[0].error.as_deref().unwrap();
    assert!(!error.is_empty());
}

#[tokio::test]
async fn unknown_operation_fails_every_file() {
    let tmp = TempDir::new().unwrap();
    write_pdfs(tmp.path(), &["a.pdf", "b.pdf", "c.pdf"]);
    let job = BatchJob::new(tmp.path(), tmp.path().join("out"), "teleport");

    let result = processor().process_directory(&job, None).await.unwrap();
    assert_eq!(result.total_files, 3);
    assert_eq!(result.failure_count, 3);
    assert_eq!(result.success_count, 0);
    for failed in &result.failed_files {
        let error = failed.error.as_deref().unwrap();
        assert!(error.contains("Unsupported operation"), "{}", error);
        assert!(error.contains("teleport"), "{}", error);
    }
}

#[tokio::test]
async fn clean_metadata_round_trip() {
    let tmp = TempDir::new().unwrap();
    let names = ["one.pdf", "two.pdf", "three.pdf", "four.pdf", "five.pdf"];
    write_pdfs(tmp.path(), &names);
    let out = tmp.path().join("out");
    let job = BatchJob::new(tmp.path(), &out, "clean_metadata");

    let result = processor()
        .with_workers(3)
        .process_directory(&job, None)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.success_count, 5);
    assert_eq!(result.failure_count, 0);
    assert_eq!(result.success_count + result.failure_count, result.total_files);

    for name in names {
        let stem = name.trim_end_matches(".pdf");
        let output = out.join(format!("{}_processed.pdf", stem));
        assert!(output.exists(), "missing {}", output.display());
        let info = pdftool_core::read_info(&fs::read(&output).unwrap()).unwrap();
        assert!(!info.fields.contains_key("Title"));
        assert!(!info.fields.contains_key("Author"));
    }
}

#[tokio::test]
async fn split_reports_every_part() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("long.pdf"), create_test_pdf(5)).unwrap();
    let job = BatchJob::new(tmp.path(), tmp.path().join("out"), "split")
        .with_params(params(json!({"pages_per_file": 2})));

    let result = processor().process_directory(&job, None).await.unwrap();
    assert!(result.success);
    let outputs = &result.processed_files[0].output_paths;
    assert_eq!(outputs.len(), 3);
    assert!(outputs.iter().all(|p| p.exists()));
}

#[tokio::test]
async fn invalid_params_fail_per_file() {
    let tmp = TempDir::new().unwrap();
    write_pdfs(tmp.path(), &["a.pdf", "b.pdf"]);
    let job = BatchJob::new(tmp.path(), tmp.path().join("out"), "compress")
        .with_params(params(json!({"mode": "maximum"})));

    let result = processor().process_directory(&job, None).await.unwrap();
    assert_eq!(result.failure_count, 2);
    assert!(result.failed_files[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("Invalid parameters for compress"));
}

#[tokio::test]
async fn mixed_batch_keeps_going_and_writes_report() {
    let tmp = TempDir::new().unwrap();
    write_pdfs(tmp.path(), &["good1.pdf", "good2.pdf"]);
    fs::write(tmp.path().join("bad.pdf"), b"garbage").unwrap();
    let out = tmp.path().join("out");
    let job = BatchJob::new(tmp.path(), &out, "watermark")
        .with_params(params(json!({"text": "COPY"})));

    let result = processor().process_directory(&job, None).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.success_count, 2);
    assert_eq!(result.failure_count, 1);

    let path = Reporter::new(ReportFormat::Text)
        .write_to_dir(&result, &out)
        .unwrap();
    let report = fs::read_to_string(path).unwrap();
    assert!(report.contains("Total files: 3"));
    assert!(report.contains("❌ bad.pdf (Error:"));
    assert!(report.contains("✅ good1.pdf -> good1_processed.pdf"));
}

#[tokio::test]
async fn same_name_in_subdirectories_gets_separate_outputs() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in");
    fs::create_dir_all(input.join("a")).unwrap();
    fs::create_dir_all(input.join("b")).unwrap();
    fs::write(input.join("a/x.pdf"), create_test_pdf(1)).unwrap();
    fs::write(input.join("b/x.pdf"), create_test_pdf(3)).unwrap();
    let out = tmp.path().join("out");
    let job = BatchJob::new(&input, &out, "compress");

    let result = processor().process_directory(&job, None).await.unwrap();
    assert!(result.success);
    assert_eq!(result.success_count, 2);

    let pages = |path: &Path| {
        pdftool_core::read_info(&fs::read(path).unwrap())
            .unwrap()
            .page_count
    };
    assert_eq!(pages(&out.join("a/x_processed.pdf")), 1);
    assert_eq!(pages(&out.join("b/x_processed.pdf")), 3);
}

#[tokio::test]
async fn watermark_page_selection_covers_files_of_different_lengths() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("short.pdf"), create_test_pdf(2)).unwrap();
    fs::write(tmp.path().join("long.pdf"), create_test_pdf(5)).unwrap();
    let job = BatchJob::new(tmp.path(), tmp.path().join("out"), "watermark")
        .with_params(params(json!({"text": "DRAFT", "pages": "2-4"})));

    let result = processor().process_directory(&job, None).await.unwrap();
    assert!(result.success);
    assert_eq!(result.success_count, 2);

    let past_the_end = job
        .clone()
        .with_params(params(json!({"text": "DRAFT", "pages": [3]})));
    let result = processor().process_directory(&past_the_end, None).await.unwrap();
    assert_eq!(result.success_count, 1);
    assert_eq!(result.failed_files[0].file_name(), "short.pdf");
}

#[tokio::test]
async fn bypass_metadata_keeps_non_ascii_title() {
    let tmp = TempDir::new().unwrap();
    write_pdfs(tmp.path(), &["scan.pdf"]);
    let job = BatchJob::new(tmp.path(), tmp.path().join("out"), "bypass_metadata")
        .with_params(params(json!({"custom_title": "Tài liệu"})));

    let result = processor().process_directory(&job, None).await.unwrap();
    assert!(result.success);
    let output = &result.processed_files[0].output_paths[0];
    let info = pdftool_core::read_info(&fs::read(output).unwrap()).unwrap();
    assert_eq!(info.fields.get("Title").map(String::as_str), Some("Tài liệu"));
}
