//! Conversion of other document formats to PDF.
//!
//! Images and EPUB books are converted natively. Office documents are handed
//! to an external converter process (LibreOffice by default).

use crate::document::{encode_win_ansi, standard_font, DocumentBuilder, A4};
use crate::error::PdfToolError;
use crate::raster::EmbeddedImage;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, StringFormat};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    Word,
    Excel,
    PowerPoint,
    Png,
    Jpeg,
    Epub,
}

impl FileType {
    /// Lower-case extensions, without the dot.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FileType::Word => &["doc", "docx"],
            FileType::Excel => &["xls", "xlsx"],
            FileType::PowerPoint => &["ppt", "pptx"],
            FileType::Png => &["png"],
            FileType::Jpeg => &["jpg", "jpeg"],
            FileType::Epub => &["epub"],
        }
    }

    /// Discovery pattern such as `*.doc;*.docx`.
    pub fn pattern(self) -> String {
        self.extensions()
            .iter()
            .map(|ext| format!("*.{}", ext))
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        [
            FileType::Word,
            FileType::Excel,
            FileType::PowerPoint,
            FileType::Png,
            FileType::Jpeg,
            FileType::Epub,
        ]
        .into_iter()
        .find(|t| t.extensions().contains(&ext.as_str()))
    }

    pub fn is_office(self) -> bool {
        matches!(self, FileType::Word | FileType::Excel | FileType::PowerPoint)
    }
}

impl FromStr for FileType {
    type Err = PdfToolError;

    /// Accepts the combined labels (`DOC/DOCX`) as well as single extensions.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DOC/DOCX" | "DOC" | "DOCX" => Ok(FileType::Word),
            "XLS/XLSX" | "XLS" | "XLSX" => Ok(FileType::Excel),
            "PPT/PPTX" | "PPT" | "PPTX" => Ok(FileType::PowerPoint),
            "PNG" => Ok(FileType::Png),
            "JPG/JPEG" | "JPG" | "JPEG" => Ok(FileType::Jpeg),
            "EPUB" => Ok(FileType::Epub),
            other => Err(PdfToolError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// A single page sized to the image at 72 dpi.
pub fn image_to_pdf(bytes: &[u8]) -> Result<Vec<u8>, PdfToolError> {
    let image = EmbeddedImage::from_bytes(bytes)?;
    let (width, height) = (image.width as f32, image.height as f32);

    let mut builder = DocumentBuilder::new();
    let image_id = builder.add_object(image.into_xobject());
    let resources = Dictionary::from_iter(vec![(
        "XObject",
        Object::Dictionary(Dictionary::from_iter(vec![(
            "Im0",
            Object::Reference(image_id),
        )])),
    )]);
    let content = format!("q\n{} 0 0 {} 0 0 cm\n/Im0 Do\nQ\n", width, height).into_bytes();
    builder.add_page(width, height, resources, content);
    builder.finish()
}

/// Layout of text pages produced from EPUB books.
#[derive(Debug, Clone, Copy)]
pub struct TextLayout {
    pub page_size: (f32, f32),
    pub margin: f32,
    pub font_size: f32,
    pub leading: f32,
}

impl Default for TextLayout {
    fn default() -> Self {
        Self {
            page_size: A4,
            margin: 50.0,
            font_size: 11.0,
            leading: 15.0,
        }
    }
}

impl TextLayout {
    fn chars_per_line(&self) -> usize {
        // Helvetica averages roughly half an em per glyph.
        let usable = self.page_size.0 - 2.0 * self.margin;
        ((usable / (self.font_size * 0.5)) as usize).max(10)
    }

    fn lines_per_page(&self) -> usize {
        let usable = self.page_size.1 - 2.0 * self.margin;
        ((usable / self.leading) as usize).max(1)
    }
}

/// Render the text of an EPUB's spine, chapter by chapter, as Helvetica text.
/// Images and styling are not carried over.
pub fn epub_to_pdf(bytes: &[u8]) -> Result<Vec<u8>, PdfToolError> {
    let chapters = read_epub_chapters(bytes)?;
    let layout = TextLayout::default();

    let mut lines = Vec::new();
    for (i, paragraphs) in chapters.iter().enumerate() {
        if i > 0 && !lines.is_empty() {
            lines.push(PageBreak::Break);
        }
        for paragraph in paragraphs {
            lines.extend(
                wrap_text(paragraph, layout.chars_per_line())
                    .into_iter()
                    .map(PageBreak::Line),
            );
            lines.push(PageBreak::Line(String::new()));
        }
    }

    if !lines.iter().any(|l| matches!(l, PageBreak::Line(t) if !t.is_empty())) {
        return Err(PdfToolError::Conversion(
            "EPUB contains no readable text".into(),
        ));
    }

    render_text_pages(&lines, &layout)
}

enum PageBreak {
    Line(String),
    Break,
}

fn render_text_pages(lines: &[PageBreak], layout: &TextLayout) -> Result<Vec<u8>, PdfToolError> {
    let mut builder = DocumentBuilder::new();
    let font_id = builder.add_object(standard_font("Helvetica"));
    let resources = || {
        Dictionary::from_iter(vec![(
            "Font",
            Object::Dictionary(Dictionary::from_iter(vec![("F1", Object::Reference(font_id))])),
        )])
    };

    let mut page: Vec<&str> = Vec::new();
    let flush = |page: &mut Vec<&str>, builder: &mut DocumentBuilder| -> Result<(), PdfToolError> {
        if page.iter().all(|l| l.is_empty()) {
            page.clear();
            return Ok(());
        }
        let content = text_page_content(page, layout)?;
        builder.add_page(layout.page_size.0, layout.page_size.1, resources(), content);
        page.clear();
        Ok(())
    };

    for line in lines {
        match line {
            PageBreak::Break => flush(&mut page, &mut builder)?,
            PageBreak::Line(text) => {
                if page.is_empty() && text.is_empty() {
                    continue;
                }
                page.push(text.as_str());
                if page.len() >= layout.lines_per_page() {
                    flush(&mut page, &mut builder)?;
                }
            }
        }
    }
    flush(&mut page, &mut builder)?;

    debug!(pages = builder.page_count(), "Rendered text pages");
    builder.finish()
}

fn text_page_content(lines: &[&str], layout: &TextLayout) -> Result<Vec<u8>, PdfToolError> {
    let top = layout.page_size.1 - layout.margin - layout.font_size;
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Real(layout.font_size)],
        ),
        Operation::new("TL", vec![Object::Real(layout.leading)]),
        Operation::new("Td", vec![Object::Real(layout.margin), Object::Real(top)]),
    ];
    for line in lines {
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(line), StringFormat::Literal)],
        ));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    Content { operations }
        .encode()
        .map_err(|e| PdfToolError::Conversion(format!("Failed to encode page: {}", e)))
}

/// Greedy word wrap. Words longer than a line are hard-split.
pub(crate) fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..width).collect());
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Paragraph text of each spine document, in reading order.
fn read_epub_chapters(bytes: &[u8]) -> Result<Vec<Vec<String>>, PdfToolError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| PdfToolError::Conversion(format!("Invalid EPUB archive: {}", e)))?;

    let container = read_entry(&mut archive, "META-INF/container.xml")?;
    let opf_path = find_rootfile(&container)?;
    let opf = read_entry(&mut archive, &opf_path)?;
    let base = match opf_path.rfind('/') {
        Some(idx) => &opf_path[..=idx],
        None => "",
    };

    let mut chapters = Vec::new();
    for href in spine_hrefs(&opf)? {
        let path = normalize_path(&format!("{}{}", base, href));
        match read_entry(&mut archive, &path) {
            Ok(xhtml) => chapters.push(extract_paragraphs(&xhtml)),
            Err(e) => debug!(path = %path, error = %e, "Skipping missing spine item"),
        }
    }
    info!(chapters = chapters.len(), "Read EPUB spine");
    Ok(chapters)
}

fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<String, PdfToolError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| PdfToolError::Conversion(format!("{}: {}", name, e)))?;
    let mut raw = Vec::new();
    entry.read_to_end(&mut raw)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn xml_error(e: quick_xml::Error) -> PdfToolError {
    PdfToolError::Conversion(format!("Malformed EPUB XML: {}", e))
}

fn attribute(e: &quick_xml::events::BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn find_rootfile(container: &str) -> Result<String, PdfToolError> {
    let mut reader = Reader::from_str(container);
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attribute(&e, b"full-path") {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Err(PdfToolError::Conversion(
        "EPUB container has no rootfile".into(),
    ))
}

/// Manifest hrefs in spine order.
fn spine_hrefs(opf: &str) -> Result<Vec<String>, PdfToolError> {
    let mut reader = Reader::from_str(opf);
    let mut manifest = HashMap::new();
    let mut spine = Vec::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"item" => {
                    if let (Some(id), Some(href)) = (attribute(&e, b"id"), attribute(&e, b"href")) {
                        manifest.insert(id, href);
                    }
                }
                b"itemref" => {
                    if let Some(idref) = attribute(&e, b"idref") {
                        spine.push(idref);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(spine
        .into_iter()
        .filter_map(|id| manifest.get(&id).cloned())
        .collect())
}

/// Resolve `.` and `..` segments; zip entry names never start with `/`.
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

const BLOCK_ELEMENTS: [&[u8]; 16] = [
    b"p", b"div", b"br", b"li", b"tr", b"h1", b"h2", b"h3", b"h4", b"h5", b"h6", b"blockquote",
    b"section", b"pre", b"dt", b"dd",
];

const SKIPPED_ELEMENTS: [&[u8]; 4] = [b"head", b"script", b"style", b"title"];

/// Visible text of an XHTML document, split at block elements.
/// Malformed markup ends extraction early rather than failing.
fn extract_paragraphs(xhtml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xhtml);
    reader.check_end_names(false);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut skip_depth = 0usize;

    let mut push_paragraph = |current: &mut String| {
        let text = current.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            paragraphs.push(text);
        }
        current.clear();
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if SKIPPED_ELEMENTS.contains(&name.as_ref()) {
                    skip_depth += 1;
                } else if BLOCK_ELEMENTS.contains(&name.as_ref()) {
                    push_paragraph(&mut current);
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if SKIPPED_ELEMENTS.contains(&name.as_ref()) {
                    skip_depth = skip_depth.saturating_sub(1);
                } else if BLOCK_ELEMENTS.contains(&name.as_ref()) {
                    push_paragraph(&mut current);
                }
            }
            Ok(Event::Empty(e)) => {
                if BLOCK_ELEMENTS.contains(&e.local_name().as_ref()) {
                    push_paragraph(&mut current);
                }
            }
            Ok(Event::Text(t)) if skip_depth == 0 => {
                // Named HTML entities such as &nbsp; are not XML; keep them raw.
                let text = t
                    .unescape()
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                current.push(' ');
                current.push_str(&text);
            }
            Ok(Event::CData(t)) if skip_depth == 0 => {
                current.push(' ');
                current.push_str(&String::from_utf8_lossy(&t));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!(error = %e, "Stopping at malformed XHTML");
                break;
            }
            _ => {}
        }
    }
    push_paragraph(&mut current);
    paragraphs
}

/// Runs an office suite in headless mode: `<command> <args..> <out_dir> <input>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficeConverter {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for OfficeConverter {
    fn default() -> Self {
        Self {
            command: "soffice".into(),
            args: ["--headless", "--convert-to", "pdf", "--outdir"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl OfficeConverter {
    /// Convert `input` into `out_dir`, returning the PDF the converter wrote.
    pub fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, PdfToolError> {
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(out_dir)
            .arg(input)
            .output()
            .map_err(|e| {
                PdfToolError::Conversion(format!("Failed to run {}: {}", self.command, e))
            })?;

        if !output.status.success() {
            return Err(PdfToolError::Conversion(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stem = input
            .file_stem()
            .ok_or_else(|| PdfToolError::Conversion("Input has no file name".into()))?;
        let produced = out_dir.join(stem).with_extension("pdf");
        if !produced.exists() {
            return Err(PdfToolError::Conversion(format!(
                "{} did not produce {}",
                self.command,
                produced.display()
            )));
        }
        Ok(produced)
    }
}

/// Convert a file of the given type to PDF bytes. Office formats go through
/// `office`, writing an intermediate file into `scratch_dir`.
pub fn convert_file(
    input: &Path,
    file_type: FileType,
    office: &OfficeConverter,
    scratch_dir: &Path,
) -> Result<Vec<u8>, PdfToolError> {
    if file_type.is_office() {
        let produced = office.convert(input, scratch_dir)?;
        let bytes = std::fs::read(&produced)?;
        std::fs::remove_file(&produced)?;
        return Ok(bytes);
    }

    let bytes = std::fs::read(input)?;
    match file_type {
        FileType::Png | FileType::Jpeg => image_to_pdf(&bytes),
        FileType::Epub => epub_to_pdf(&bytes),
        _ => Err(PdfToolError::UnsupportedFormat(format!("{:?}", file_type))),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::epub_bytes;
    use super::*;
    use crate::raster::test_support::{jpeg_bytes, png_bytes};
    use lopdf::Document;
    use pretty_assertions::assert_eq;

    fn all_text(bytes: &[u8]) -> String {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|id| String::from_utf8_lossy(&doc.get_page_content(*id).unwrap()).into_owned())
            .collect()
    }

    #[test]
    fn test_file_type_parsing() {
        assert_eq!("DOC/DOCX".parse::<FileType>().unwrap(), FileType::Word);
        assert_eq!("pptx".parse::<FileType>().unwrap(), FileType::PowerPoint);
        assert_eq!("JPG/JPEG".parse::<FileType>().unwrap(), FileType::Jpeg);
        assert!(matches!(
            "RTF".parse::<FileType>(),
            Err(PdfToolError::UnsupportedFormat(_))
        ));
        assert_eq!(FileType::Word.pattern(), "*.doc;*.docx");
        assert_eq!(FileType::from_path(Path::new("a/B.JPEG")), Some(FileType::Jpeg));
    }

    #[test]
    fn test_png_to_pdf_page_matches_image() {
        let pdf = image_to_pdf(&png_bytes(30, 20)).unwrap();
        let doc = Document::load_mem(&pdf).unwrap();
        let (_, page_id) = doc.get_pages().into_iter().next().unwrap();
        assert_eq!(
            crate::document::page_media_box(&doc, page_id),
            [0.0, 0.0, 30.0, 20.0]
        );
    }

    #[test]
    fn test_jpeg_to_pdf() {
        let pdf = image_to_pdf(&jpeg_bytes(12, 12, 80)).unwrap();
        assert_eq!(Document::load_mem(&pdf).unwrap().get_pages().len(), 1);
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(
            wrap_text("the quick brown fox jumps", 10),
            vec!["the quick", "brown fox", "jumps"]
        );
        assert_eq!(wrap_text("abcdefghijkl", 5), vec!["abcde", "fghij", "kl"]);
        assert!(wrap_text("   ", 5).is_empty());
    }

    #[test]
    fn test_extract_paragraphs_skips_head() {
        let paragraphs = extract_paragraphs(
            "<html><head><title>T</title></head><body><h1>Chapter One</h1><p>It was &amp; is.</p><p>Caf&nbsp;</p></body></html>",
        );
        assert_eq!(paragraphs[0], "Chapter One");
        assert_eq!(paragraphs[1], "It was & is.");
        assert_eq!(paragraphs.len(), 3);
    }

    #[test]
    fn test_epub_to_pdf_renders_chapters_in_spine_order() {
        let epub = epub_bytes(&["<h1>First chapter</h1><p>Hello</p>", "<p>Second chapter</p>"]);
        let pdf = epub_to_pdf(&epub).unwrap();
        let text = all_text(&pdf);
        let first = text.find("First chapter").unwrap();
        let second = text.find("Second chapter").unwrap();
        assert!(first < second);
        assert!(!text.contains("Ignored"));
        // Each chapter starts a new page.
        assert_eq!(Document::load_mem(&pdf).unwrap().get_pages().len(), 2);
    }

    #[test]
    fn test_long_epub_paginates() {
        let body = "<p>word </p>".repeat(200);
        let pdf = epub_to_pdf(&epub_bytes(&[&body])).unwrap();
        assert!(Document::load_mem(&pdf).unwrap().get_pages().len() > 1);
    }

    #[test]
    fn test_epub_without_text_fails() {
        let epub = epub_bytes(&["<p>   </p>"]);
        assert!(matches!(epub_to_pdf(&epub), Err(PdfToolError::Conversion(_))));
        assert!(epub_to_pdf(b"not a zip").is_err());
    }

    #[test]
    fn test_office_converter_reports_missing_binary() {
        let converter = OfficeConverter {
            command: "pdftool-no-such-converter".into(),
            args: vec![],
        };
        let dir = std::env::temp_dir();
        let err = converter
            .convert(Path::new("report.docx"), &dir)
            .unwrap_err();
        assert!(err.to_string().contains("Failed to run"));
    }
}
