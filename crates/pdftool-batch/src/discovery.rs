//! Candidate file enumeration for a batch.

use glob::{MatchOptions, Pattern, PatternError};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// File names are matched without regard to case.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Finds files under a directory whose names match a glob list.
///
/// ```no_run
/// use pdftool_batch::discovery::FileDiscovery;
///
/// let files = FileDiscovery::new("scans")
///     .pattern("report_*.pdf;*.png")?
///     .recursive(false)
///     .find();
/// # Ok::<(), glob::PatternError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    root: PathBuf,
    /// Matched against the file name. Empty matches every file.
    patterns: Vec<Pattern>,
    recursive: bool,
    excluded: Vec<PathBuf>,
}

impl FileDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            patterns: parse_pattern("*.pdf").unwrap_or_default(),
            recursive: true,
            excluded: Vec::new(),
        }
    }

    /// Accepts `*.pdf`, `report_*.pdf`, `*.doc;*.docx`, a bare extension
    /// such as `docx`, or `*`.
    pub fn pattern(mut self, pattern: &str) -> Result<Self, PatternError> {
        self.patterns = parse_pattern(pattern)?;
        Ok(self)
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Skip a directory subtree, typically the batch output directory.
    pub fn exclude(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        if let Ok(canonical) = dir.canonicalize() {
            self.excluded.push(canonical);
        }
        self.excluded.push(dir.to_path_buf());
        self
    }

    /// Matching files, sorted. A missing or unreadable root yields an empty list.
    pub fn find(&self) -> Vec<PathBuf> {
        let mut walker = WalkDir::new(&self.root).follow_links(true);
        if !self.recursive {
            walker = walker.max_depth(1);
        }

        let mut files: Vec<PathBuf> = walker
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && self.matches(entry.path()))
            .map(DirEntry::into_path)
            .collect();

        files.sort();
        debug!(root = %self.root.display(), count = files.len(), "Discovered files");
        files
    }

    fn matches(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        path.file_name()
            .map(|name| name.to_string_lossy())
            .is_some_and(|name| {
                self.patterns
                    .iter()
                    .any(|pattern| pattern.matches_with(&name, MATCH_OPTIONS))
            })
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        let path = entry.path();
        if self.excluded.iter().any(|dir| path == dir) {
            return true;
        }
        path.canonicalize()
            .map(|canonical| self.excluded.contains(&canonical))
            .unwrap_or(false)
    }
}

/// Compile a `;`- or `,`-separated glob list. `*` and `*.*` mean any file
/// and yield an empty list. A part without wildcards is an extension, so
/// `docx` and `.docx` both become `*.docx`.
pub fn parse_pattern(pattern: &str) -> Result<Vec<Pattern>, PatternError> {
    let mut patterns = Vec::new();
    for part in pattern.split([';', ',']) {
        let part = part.trim();
        if part == "*" || part == "*.*" {
            return Ok(Vec::new());
        }
        if part.is_empty() {
            continue;
        }
        let has_wildcard = part.contains(['*', '?', '[']);
        let glob = if has_wildcard {
            part.to_string()
        } else {
            format!("*.{}", Pattern::escape(part.trim_start_matches('.')))
        };
        patterns.push(Pattern::new(&glob)?);
    }
    Ok(patterns)
}
