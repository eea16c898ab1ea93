//! Duplicate PDF detection by size, file hash, or page content.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, instrument};

use crate::discovery::FileDiscovery;

const CHUNK_SIZE: usize = 8192;

/// Bytes of first-page content that feed the content hash.
const CONTENT_PREFIX: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateMethod {
    /// Same byte length. Fast, prone to false positives.
    Size,
    /// Same MD5 over the whole file, checked only among same-size files.
    #[default]
    Hash,
    /// Same page count and first-page content, ignoring metadata.
    Content,
}

impl FromStr for DuplicateMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "size" => Ok(DuplicateMethod::Size),
            "hash" => Ok(DuplicateMethod::Hash),
            "content" => Ok(DuplicateMethod::Content),
            other => Err(format!(
                "Method must be 'size', 'hash', or 'content', got '{}'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Size in bytes, or a hex MD5 digest.
    pub key: String,
    pub files: Vec<PathBuf>,
    /// Space freed by keeping only the first file.
    pub reclaimable_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub method: DuplicateMethod,
    pub groups: Vec<DuplicateGroup>,
}

impl DuplicateReport {
    /// Files beyond the first in each group.
    pub fn duplicate_count(&self) -> usize {
        self.groups.iter().map(|g| g.files.len() - 1).sum()
    }

    pub fn reclaimable_bytes(&self) -> u64 {
        self.groups.iter().map(|g| g.reclaimable_bytes).sum()
    }
}

/// Group PDFs under `dir` that look identical by `method`. Files that cannot
/// be read are skipped; groups of one are dropped.
#[instrument(skip(dir), fields(dir = %dir.as_ref().display()))]
pub fn find_duplicates(
    dir: impl AsRef<Path>,
    recursive: bool,
    method: DuplicateMethod,
) -> DuplicateReport {
    let files = FileDiscovery::new(dir.as_ref()).recursive(recursive).find();
    let mut by_size: BTreeMap<u64, Vec<PathBuf>> = BTreeMap::new();
    for path in files {
        if let Ok(meta) = fs::metadata(&path) {
            by_size.entry(meta.len()).or_default().push(path);
        }
    }

    let groups = match method {
        DuplicateMethod::Size => group_by(
            by_size
                .iter()
                .flat_map(|(len, paths)| paths.iter().map(move |path| (len.to_string(), path, *len))),
        ),
        DuplicateMethod::Hash => group_by(
            by_size
                .iter()
                .filter(|(_, paths)| paths.len() > 1)
                .flat_map(|(len, paths)| {
                    paths
                        .iter()
                        .filter_map(move |path| Some((file_hash(path)?, path, *len)))
                }),
        ),
        DuplicateMethod::Content => group_by(by_size.iter().flat_map(|(len, paths)| {
            paths
                .iter()
                .filter_map(move |path| Some((content_hash(path)?, path, *len)))
        })),
    };

    debug!(groups = groups.len(), "Duplicate search finished");
    DuplicateReport { method, groups }
}

fn group_by<'a, I>(entries: I) -> Vec<DuplicateGroup>
where
    I: Iterator<Item = (String, &'a PathBuf, u64)>,
{
    let mut buckets: BTreeMap<String, Vec<(PathBuf, u64)>> = BTreeMap::new();
    for (key, path, len) in entries {
        buckets.entry(key).or_default().push((path.clone(), len));
    }

    buckets
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(key, mut members)| {
            members.sort();
            (key, members)
        })
        .map(|(key, members)| DuplicateGroup {
            key,
            reclaimable_bytes: members.iter().skip(1).map(|(_, len)| len).sum(),
            files: members.into_iter().map(|(path, _)| path).collect(),
        })
        .collect()
}

/// Hex MD5 of the whole file.
pub fn file_hash(path: &Path) -> Option<String> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Cannot hash file");
            return None;
        }
    };
    let mut hasher = Md5::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer).ok()?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Some(format!("{:x}", hasher.finalize()))
}

/// Hex MD5 over the page count and the start of the first page's content.
pub fn content_hash(path: &Path) -> Option<String> {
    let doc = match lopdf::Document::load(path) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Cannot parse for content hash");
            return None;
        }
    };
    let pages = doc.get_pages();

    let mut hasher = Md5::new();
    hasher.update(pages.len().to_string().as_bytes());
    if let Some(first) = pages.values().next() {
        if let Ok(content) = doc.get_page_content(*first) {
            hasher.update(&content[..content.len().min(CONTENT_PREFIX)]);
        }
    }
    Some(format!("{:x}", hasher.finalize()))
}
