//! Text watermarks drawn into the page content stream.

use crate::document::{
    encode_win_ansi, inherited_attribute, load, page_media_box, resolve, save, standard_font,
};
use crate::error::PdfToolError;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

/// Resource name under which the watermark font is registered on each page.
const FONT_KEY: &[u8] = b"PdfToolWm";

/// Approximate Helvetica-Bold advance width, as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.58;

#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkOptions {
    pub text: String,
    /// Inclusive 1-based page ranges. `None` watermarks every page. Pages
    /// the document does not have are skipped.
    pub pages: Option<Vec<(u32, u32)>>,
    pub font_size: f32,
    /// Counter-clockwise, in degrees.
    pub rotation: f32,
    /// RGB components in 0..=1.
    pub color: (f32, f32, f32),
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            text: String::new(),
            pages: None,
            font_size: 40.0,
            rotation: 45.0,
            color: (1.0, 0.0, 0.0),
        }
    }
}

/// Parse `#RRGGBB` (leading `#` optional) into RGB floats.
pub fn parse_hex_color(color: &str) -> Option<(f32, f32, f32)> {
    let hex = color.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .ok()
            .map(|v| v as f32 / 255.0)
    };
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

/// Draw `options.text` centered and rotated on the selected pages.
pub fn add_text_watermark(bytes: &[u8], options: &WatermarkOptions) -> Result<Vec<u8>, PdfToolError> {
    if options.text.trim().is_empty() {
        return Err(PdfToolError::OperationError(
            "Watermark text cannot be empty".into(),
        ));
    }
    if options.font_size <= 0.0 {
        return Err(PdfToolError::OperationError(format!(
            "Invalid font size: {}",
            options.font_size
        )));
    }

    let mut doc = load(bytes)?;
    let pages = doc.get_pages();
    let page_count = pages.len() as u32;

    let targets: Vec<ObjectId> = match &options.pages {
        None => pages.values().copied().collect(),
        Some(ranges) => {
            if ranges.iter().any(|&(start, end)| start == 0 || end > page_count) {
                debug!(page_count, "Selection names pages the document lacks; skipping them");
            }
            let ids: Vec<ObjectId> = pages
                .iter()
                .filter(|(number, _)| {
                    ranges
                        .iter()
                        .any(|&(start, end)| (start..=end).contains(*number))
                })
                .map(|(_, id)| *id)
                .collect();
            if ids.is_empty() {
                return Err(PdfToolError::InvalidRange(format!(
                    "None of the selected pages exist (document has {} pages)",
                    page_count
                )));
            }
            ids
        }
    };

    let font_id = doc.add_object(standard_font("Helvetica-Bold"));
    for page_id in targets {
        stamp_page(&mut doc, page_id, font_id, options)?;
    }

    save(&mut doc)
}

fn stamp_page(
    doc: &mut Document,
    page_id: ObjectId,
    font_id: ObjectId,
    options: &WatermarkOptions,
) -> Result<(), PdfToolError> {
    let [x0, y0, x1, y1] = page_media_box(doc, page_id);
    let center = ((x0 + x1) / 2.0, (y0 + y1) / 2.0);

    let resources = page_resources_with_font(doc, page_id, font_id);
    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let stamp_id = doc.add_object(Stream::new(
        Dictionary::new(),
        watermark_content(options, center)?,
    ));

    let existing = match doc.get_dictionary(page_id).and_then(|page| page.get(b"Contents")) {
        Ok(Object::Array(items)) => items.clone(),
        Ok(contents @ Object::Reference(_)) => vec![contents.clone()],
        _ => Vec::new(),
    };

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(stamp_id));

    let page = doc
        .get_dictionary_mut(page_id)
        .map_err(|e| PdfToolError::OperationError(e.to_string()))?;
    page.set("Contents", Object::Array(contents));
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// The page's effective resources, copied inline, with the watermark font
/// added to `/Font`.
fn page_resources_with_font(doc: &Document, page_id: ObjectId, font_id: ObjectId) -> Dictionary {
    let mut resources = match inherited_attribute(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict,
        _ => Dictionary::new(),
    };

    let mut fonts = match resources.get(b"Font") {
        Ok(fonts) => match resolve(doc, fonts) {
            Object::Dictionary(dict) => dict.clone(),
            _ => Dictionary::new(),
        },
        Err(_) => Dictionary::new(),
    };
    fonts.set(FONT_KEY.to_vec(), Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));
    resources
}

fn watermark_content(options: &WatermarkOptions, center: (f32, f32)) -> Result<Vec<u8>, PdfToolError> {
    let (r, g, b) = options.color;
    let (sin, cos) = options.rotation.to_radians().sin_cos();
    let size = options.font_size;
    let text = encode_win_ansi(&options.text);
    let width = text.len() as f32 * size * AVG_GLYPH_WIDTH;

    let content = Content {
        operations: vec![
            // Closes the q pushed before the original content.
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(FONT_KEY.to_vec()), Object::Real(size)]),
            Operation::new(
                "Tm",
                vec![
                    Object::Real(cos),
                    Object::Real(sin),
                    Object::Real(-sin),
                    Object::Real(cos),
                    Object::Real(center.0),
                    Object::Real(center.1),
                ],
            ),
            Operation::new("Td", vec![Object::Real(-width / 2.0), Object::Real(-size / 3.0)]),
            Operation::new("Tj", vec![Object::String(text, StringFormat::Literal)]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    };
    content
        .encode()
        .map_err(|e| PdfToolError::OperationError(format!("Failed to encode watermark: {}", e)))
}
