//! PDF operations behind the pdftool batch processor and CLI.
//!
//! Every operation takes the input document as bytes and returns new bytes
//! (or several documents, for splitting). Parsing and writing is done with
//! lopdf. Only [`convert_file`] touches the filesystem, since office formats
//! go through an external converter process.

pub mod compress;
pub mod convert;
pub(crate) mod document;
pub mod encrypt;
pub mod error;
pub mod merge;
pub mod metadata;
pub(crate) mod raster;
pub mod split;
pub mod watermark;

pub use compress::{compress_document, CompressionMode};
pub use convert::{convert_file, epub_to_pdf, image_to_pdf, FileType, OfficeConverter};
pub use encrypt::{encrypt_document, EncryptOptions, EncryptionLevel};
pub use error::PdfToolError;
pub use merge::merge_documents;
pub use metadata::{
    clean_metadata, randomize_metadata, read_info, CleanMode, DocumentInfo, DocumentKind,
    MetadataProfile,
};
pub use split::{split_every, split_ranges};
pub use watermark::{add_text_watermark, parse_hex_color, WatermarkOptions};

/// Parse "1-3, 5, 8-10" into inclusive (start, end) pairs, keeping order.
///
/// Ranges are never expanded, so a selection like "1-4000000000" costs one
/// pair. Callers intersect the pairs with the pages a document actually has.
pub fn parse_range_pairs(input: &str) -> Result<Vec<(u32, u32)>, PdfToolError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (start, end) = part.split_once('-').unwrap_or((part, part));
            let start: u32 = start
                .trim()
                .parse()
                .map_err(|_| PdfToolError::InvalidRange(format!("Invalid start: {}", start)))?;
            let end: u32 = end
                .trim()
                .parse()
                .map_err(|_| PdfToolError::InvalidRange(format!("Invalid end: {}", end)))?;

            if start > end {
                return Err(PdfToolError::InvalidRange(format!(
                    "Start {} > end {}",
                    start, end
                )));
            }
            Ok((start, end))
        })
        .collect()
}
