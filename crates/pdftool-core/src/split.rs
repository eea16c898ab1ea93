//! PDF Split algorithm
//!
//! Each part is a copy of the source with every other page deleted and
//! unreferenced objects pruned. Parts come either in fixed-size chunks or
//! from explicit page ranges.

use crate::document::{load, save};
use crate::error::PdfToolError;
use lopdf::Document;
use std::collections::HashSet;

/// Split into consecutive parts of `pages_per_file` pages each. The last part
/// holds the remainder.
pub fn split_every(bytes: &[u8], pages_per_file: u32) -> Result<Vec<Vec<u8>>, PdfToolError> {
    if pages_per_file == 0 {
        return Err(PdfToolError::InvalidRange(
            "pages_per_file must be >= 1".into(),
        ));
    }

    let doc = load(bytes)?;
    let page_count = doc.get_pages().len() as u32;
    if page_count == 0 {
        return Err(PdfToolError::OperationError(
            "Document has no pages".into(),
        ));
    }

    chunk_bounds(page_count, pages_per_file)
        .into_iter()
        .map(|(start, end)| extract_pages(&doc, &(start..=end).collect::<Vec<_>>()))
        .collect()
}

/// Split by inclusive 1-indexed page ranges. Invalid ranges are rejected
/// rather than skipped.
pub fn split_ranges(bytes: &[u8], ranges: &[(u32, u32)]) -> Result<Vec<Vec<u8>>, PdfToolError> {
    if ranges.is_empty() {
        return Err(PdfToolError::InvalidRange("No ranges specified".into()));
    }
    for &(start, end) in ranges {
        if start > end {
            return Err(PdfToolError::InvalidRange(format!(
                "Start {} > end {}",
                start, end
            )));
        }
    }

    let doc = load(bytes)?;
    ranges
        .iter()
        .map(|&(start, end)| extract_pages(&doc, &(start..=end).collect::<Vec<_>>()))
        .collect()
}

/// Inclusive (start, end) page bounds for each part.
pub fn chunk_bounds(page_count: u32, pages_per_file: u32) -> Vec<(u32, u32)> {
    if pages_per_file == 0 {
        return Vec::new();
    }
    (1..=page_count)
        .step_by(pages_per_file as usize)
        .map(|start| (start, (start + pages_per_file - 1).min(page_count)))
        .collect()
}

fn extract_pages(doc: &Document, pages: &[u32]) -> Result<Vec<u8>, PdfToolError> {
    if pages.is_empty() {
        return Err(PdfToolError::InvalidRange("No pages specified".into()));
    }

    // Validate page numbers are > 0
    if pages.contains(&0) {
        return Err(PdfToolError::InvalidRange(
            "Page numbers must be >= 1".into(),
        ));
    }

    let page_count = doc.get_pages().len() as u32;

    // Validate all page numbers exist
    for &page in pages {
        if page > page_count {
            return Err(PdfToolError::InvalidRange(format!(
                "Page {} does not exist (document has {} pages)",
                page, page_count
            )));
        }
    }

    let mut new_doc = doc.clone();

    let pages_to_keep: HashSet<u32> = pages.iter().copied().collect();
    let mut pages_to_delete: Vec<u32> = (1..=page_count)
        .filter(|p| !pages_to_keep.contains(p))
        .collect();

    // Delete unwanted pages (must delete in reverse order to maintain indices)
    pages_to_delete.reverse();
    for page_num in pages_to_delete {
        new_doc.delete_pages(&[page_num]);
    }

    // Compress to remove orphaned objects
    new_doc.prune_objects();
    new_doc.compress();

    save(&mut new_doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::test_support::create_test_pdf;
    use lopdf::Document;
    use pretty_assertions::assert_eq;

    fn page_count(bytes: &[u8]) -> usize {
        Document::load_mem(bytes).unwrap().get_pages().len()
    }

    #[test]
    fn test_extract_rejects_empty_zero_and_missing_pages() {
        let doc = load(&create_test_pdf(5, "Split")).unwrap();
        assert!(extract_pages(&doc, &[]).is_err());
        assert!(extract_pages(&doc, &[0]).is_err());
        assert!(extract_pages(&doc, &[10]).is_err());
    }

    #[test]
    fn test_extract_keeps_selected_pages() {
        let doc = load(&create_test_pdf(5, "Split")).unwrap();
        assert_eq!(page_count(&extract_pages(&doc, &[1]).unwrap()), 1);
        assert_eq!(page_count(&extract_pages(&doc, &[1, 3, 5]).unwrap()), 3);
    }

    #[test]
    fn test_chunk_bounds_with_remainder() {
        assert_eq!(chunk_bounds(7, 3), vec![(1, 3), (4, 6), (7, 7)]);
        assert_eq!(chunk_bounds(4, 1), vec![(1, 1), (2, 2), (3, 3), (4, 4)]);
        assert_eq!(chunk_bounds(2, 5), vec![(1, 2)]);
        assert!(chunk_bounds(3, 0).is_empty());
    }

    #[test]
    fn test_split_every_produces_expected_parts() {
        let pdf = create_test_pdf(5, "Every");
        let parts = split_every(&pdf, 2).unwrap();
        let counts: Vec<usize> = parts.iter().map(|p| page_count(p)).collect();
        assert_eq!(counts, vec![2, 2, 1]);
    }

    #[test]
    fn test_split_every_rejects_zero() {
        let pdf = create_test_pdf(2, "Every");
        assert!(split_every(&pdf, 0).is_err());
    }

    #[test]
    fn test_split_ranges() {
        let pdf = create_test_pdf(6, "Ranges");
        let parts = split_ranges(&pdf, &[(1, 2), (4, 6)]).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(page_count(&parts[0]), 2);
        assert_eq!(page_count(&parts[1]), 3);
    }

    #[test]
    fn test_split_ranges_rejects_bad_ranges() {
        let pdf = create_test_pdf(6, "Ranges");
        assert!(split_ranges(&pdf, &[(4, 2)]).is_err());
        assert!(split_ranges(&pdf, &[(5, 9)]).is_err());
        assert!(split_ranges(&pdf, &[]).is_err());
    }
}
