//! Document Info handling: reading, stripping, and randomizing metadata.
//!
//! Randomization rewrites the Info dictionary with synthetic values and a fresh
//! trailer `/ID`, so the output hashes differently from every earlier copy.

use crate::document::{catalog_id, ensure_info_dict, info_dict, is_encrypted, load, save};
use crate::error::PdfToolError;
use chrono::{DateTime, Utc};
use lopdf::{Document, Object, StringFormat};
use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Standard Info dictionary keys removed by [`clean_metadata`].
pub const STANDARD_FIELDS: [&str; 9] = [
    "Title",
    "Author",
    "Subject",
    "Creator",
    "Producer",
    "Keywords",
    "CreationDate",
    "ModDate",
    "Trapped",
];

/// Two years, the window random timestamps are drawn from.
const TIMESTAMP_WINDOW_SECS: i64 = 63_072_000;

/// What [`clean_metadata`] does to the Info dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanMode {
    /// Remove the standard fields and the XMP stream.
    #[default]
    All,
    /// Reset `CreationDate` and `ModDate` to the current time, keep the rest.
    Dates,
    /// Replace identifying fields with neutral values and drop the XMP stream.
    Anonymize,
}

impl FromStr for CleanMode {
    type Err = PdfToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(CleanMode::All),
            "dates" => Ok(CleanMode::Dates),
            "anonymize" => Ok(CleanMode::Anonymize),
            other => Err(PdfToolError::OperationError(format!(
                "Unknown clean mode: {}",
                other
            ))),
        }
    }
}

/// Values written by [`CleanMode::Anonymize`].
const ANONYMIZED_FIELDS: [(&str, &str); 6] = [
    ("Author", "Anonymous"),
    ("Creator", "pdftool"),
    ("Producer", "pdftool"),
    ("Title", ""),
    ("Subject", ""),
    ("Keywords", ""),
];

/// Strip, re-date or anonymize the document metadata according to `mode`.
pub fn clean_metadata(bytes: &[u8], mode: CleanMode) -> Result<Vec<u8>, PdfToolError> {
    let mut doc = load(bytes)?;
    if mode != CleanMode::All && is_encrypted(&doc) {
        return Err(PdfToolError::OperationError(
            "Cannot rewrite metadata of an encrypted document".into(),
        ));
    }

    match mode {
        CleanMode::All => strip_info(&mut doc),
        CleanMode::Dates => {
            let stamp = pdf_date(Utc::now());
            let fields = BTreeMap::from([
                ("CreationDate".to_string(), stamp.clone()),
                ("ModDate".to_string(), stamp),
            ]);
            set_info_fields(&mut doc, &fields)?;
            return save(&mut doc);
        }
        CleanMode::Anonymize => {
            let fields = ANONYMIZED_FIELDS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            set_info_fields(&mut doc, &fields)?;
        }
    }

    let root = catalog_id(&doc)?;
    if let Ok(catalog) = doc.get_dictionary_mut(root) {
        catalog.remove(b"Metadata");
    }

    doc.prune_objects();
    save(&mut doc)
}

fn strip_info(doc: &mut Document) {
    let info_ref = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };
    let Some(info_id) = info_ref else {
        // Inline or malformed Info: drop it wholesale.
        doc.trailer.remove(b"Info");
        return;
    };
    if let Ok(info) = doc.get_dictionary_mut(info_id) {
        for field in STANDARD_FIELDS {
            info.remove(field.as_bytes());
        }
    }
}

/// Document category used to shape the synthetic metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    #[default]
    Document,
    Book,
    Presentation,
    Academic,
}

impl FromStr for DocumentKind {
    type Err = PdfToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "document" => Ok(DocumentKind::Document),
            "book" => Ok(DocumentKind::Book),
            "presentation" => Ok(DocumentKind::Presentation),
            "academic" => Ok(DocumentKind::Academic),
            other => Err(PdfToolError::OperationError(format!(
                "Unknown document type: {}",
                other
            ))),
        }
    }
}

/// Inputs to [`randomize_metadata`].
#[derive(Debug, Clone, Default)]
pub struct MetadataProfile {
    pub kind: DocumentKind,
    /// Written as `/Title` when present.
    pub title: Option<String>,
    /// Extra fields applied last, overriding generated ones. Keys may carry a
    /// leading `/`.
    pub custom_fields: BTreeMap<String, String>,
}

/// Generate the synthetic Info fields for a document kind.
pub fn generate_fields<R: Rng + ?Sized>(
    kind: DocumentKind,
    now: DateTime<Utc>,
    rng: &mut R,
) -> BTreeMap<String, String> {
    let offset = rng.gen_range(0..=TIMESTAMP_WINDOW_SECS);
    let stamp = DateTime::<Utc>::from_timestamp(now.timestamp() - offset, 0).unwrap_or(now);
    let pdf_date = pdf_date(stamp);

    let mut fields = BTreeMap::new();
    let mut put = |k: &str, v: String| {
        fields.insert(k.to_string(), v);
    };

    put("CustomHashBypass", rng.gen_range(1..=999).to_string());
    put("UploadTimestamp", stamp.timestamp().to_string());
    put("FileID", Alphanumeric.sample_string(rng, 16));
    put("ProcessingDate", stamp.format("%Y-%m-%d").to_string());
    put(
        "Version",
        format!(
            "{}.{}.{}",
            rng.gen_range(1..=9),
            rng.gen_range(0..=9),
            rng.gen_range(0..=9)
        ),
    );
    put("Creator", "Document Creator".into());
    put("Producer", "PDF Producer".into());
    put("CreationDate", pdf_date.clone());
    put("ModDate", pdf_date);
    put("Language", "en-US".into());

    match kind {
        DocumentKind::Document => {
            put("DocumentType", "Document".into());
            put("Category", "General".into());
        }
        DocumentKind::Book => {
            put("DocumentType", "Book".into());
            put("Category", "Literature".into());
            put(
                "ISBN",
                format!(
                    "978-{}-{}",
                    rng.gen_range(100_000_000..=999_999_999u32),
                    rng.gen_range(0..=9)
                ),
            );
        }
        DocumentKind::Presentation => {
            put("DocumentType", "Presentation".into());
            put("Category", "Business".into());
            put("SlideCount", rng.gen_range(10..=50).to_string());
        }
        DocumentKind::Academic => {
            put("DocumentType", "Academic".into());
            put("Category", "Education".into());
            put("Subject", "Research Paper".into());
            put("Keywords", "research, academic, study".into());
        }
    }

    fields
}

/// `D:YYYYMMDDHHmmSSZ`, the PDF date format.
pub fn pdf_date(stamp: DateTime<Utc>) -> String {
    format!("D:{}Z", stamp.format("%Y%m%d%H%M%S"))
}

/// Rewrite the Info dictionary with generated fields and replace the file
/// identifier with random bytes.
pub fn randomize_metadata<R: Rng + ?Sized>(
    bytes: &[u8],
    profile: &MetadataProfile,
    rng: &mut R,
) -> Result<Vec<u8>, PdfToolError> {
    let mut doc = load(bytes)?;
    if is_encrypted(&doc) {
        return Err(PdfToolError::OperationError(
            "Cannot rewrite metadata of an encrypted document".into(),
        ));
    }

    let mut fields = generate_fields(profile.kind, Utc::now(), rng);
    if let Some(title) = &profile.title {
        fields.insert("Title".into(), title.clone());
    }
    for (key, value) in &profile.custom_fields {
        fields.insert(key.trim_start_matches('/').to_string(), value.clone());
    }

    set_info_fields(&mut doc, &fields)?;

    let mut id = [0u8; 16];
    rng.fill(&mut id[..]);
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(id.to_vec(), StringFormat::Hexadecimal),
            Object::String(id.to_vec(), StringFormat::Hexadecimal),
        ]),
    );

    save(&mut doc)
}

/// Write string fields into the Info dictionary, creating it if needed.
pub fn set_info_fields(
    doc: &mut Document,
    fields: &BTreeMap<String, String>,
) -> Result<(), PdfToolError> {
    let info_id = ensure_info_dict(doc);
    let info = doc
        .get_dictionary_mut(info_id)
        .map_err(|e| PdfToolError::OperationError(e.to_string()))?;
    for (key, value) in fields {
        info.set(key.as_bytes().to_vec(), text_string(value));
    }
    Ok(())
}

/// ASCII stays a literal string. Anything else is written as UTF-16BE with a
/// byte order mark, since non-BOM strings are read as PDFDocEncoding.
pub fn text_string(value: &str) -> Object {
    if value.is_ascii() {
        return Object::String(value.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut raw = Vec::with_capacity(2 + value.len() * 2);
    raw.extend_from_slice(&[0xFE, 0xFF]);
    for unit in value.encode_utf16() {
        raw.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(raw, StringFormat::Hexadecimal)
}

/// Summary of a PDF file's structure and Info dictionary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentInfo {
    pub page_count: u32,
    pub is_encrypted: bool,
    pub size_bytes: usize,
    pub version: String,
    /// Info entries rendered as text, keyed without the leading slash.
    pub fields: BTreeMap<String, String>,
}

pub fn read_info(bytes: &[u8]) -> Result<DocumentInfo, PdfToolError> {
    let doc = load(bytes)?;
    let mut fields = BTreeMap::new();

    if let Some(info) = info_dict(&doc) {
        for (key, value) in info.iter() {
            let text = match value {
                Object::String(raw, _) => decode_pdf_string(raw),
                Object::Name(name) => String::from_utf8_lossy(name).into_owned(),
                Object::Integer(i) => i.to_string(),
                Object::Real(f) => f.to_string(),
                Object::Boolean(b) => b.to_string(),
                _ => continue,
            };
            fields.insert(String::from_utf8_lossy(key).into_owned(), text);
        }
    }

    Ok(DocumentInfo {
        page_count: doc.get_pages().len() as u32,
        is_encrypted: is_encrypted(&doc),
        size_bytes: bytes.len(),
        version: doc.version.clone(),
        fields,
    })
}

/// Text strings are either UTF-16BE with a BOM or PDFDocEncoding, which is
/// treated as Latin-1 here.
fn decode_pdf_string(raw: &[u8]) -> String {
    if let Some(body) = raw.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    raw.iter().map(|&b| b as char).collect()
}
