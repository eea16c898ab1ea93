//! Shared lopdf plumbing: load/save, the Info dictionary, inherited page
//! attributes and a small builder for documents created from scratch.

use crate::error::PdfToolError;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// US Letter, used when a page has no resolvable MediaBox.
pub const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// A4 in points.
pub const A4: (f32, f32) = (595.0, 842.0);

pub(crate) fn load(bytes: &[u8]) -> Result<Document, PdfToolError> {
    Document::load_mem(bytes).map_err(PdfToolError::parse)
}

pub(crate) fn save(doc: &mut Document) -> Result<Vec<u8>, PdfToolError> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(PdfToolError::save)?;
    Ok(buffer)
}

pub(crate) fn is_encrypted(doc: &Document) -> bool {
    doc.trailer.has(b"Encrypt")
}

/// Numeric value of an Integer or Real object.
pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f),
        _ => None,
    }
}

/// Follow a single level of indirection.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Look up a page attribute, walking up the `/Parent` chain for inheritable
/// keys (Resources, MediaBox, CropBox, Rotate).
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = Some(page_id);
    // Guard against cyclic Parent links in damaged files.
    let mut depth = 0;
    while let Some(id) = current {
        if depth > 64 {
            break;
        }
        depth += 1;
        let dict = doc.get_dictionary(id).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value).clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

pub(crate) fn page_media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let Some(Object::Array(values)) = inherited_attribute(doc, page_id, b"MediaBox") else {
        return DEFAULT_MEDIA_BOX;
    };
    let numbers: Vec<f32> = values
        .iter()
        .filter_map(|v| number(resolve(doc, v)))
        .collect();
    match numbers.as_slice() {
        [x0, y0, x1, y1] => [*x0, *y0, *x1, *y1],
        _ => DEFAULT_MEDIA_BOX,
    }
}

/// Id of the document Info dictionary, creating an empty one when the trailer
/// has none. An inline Info dictionary is promoted to an indirect object.
pub(crate) fn ensure_info_dict(doc: &mut Document) -> ObjectId {
    let (reference, inline) = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => (Some(*id), None),
        Ok(Object::Dictionary(dict)) => (None, Some(dict.clone())),
        _ => (None, None),
    };
    if let Some(id) = reference {
        if doc.get_dictionary(id).is_ok() {
            return id;
        }
    }
    let id = doc.add_object(Object::Dictionary(inline.unwrap_or_else(Dictionary::new)));
    doc.trailer.set("Info", Object::Reference(id));
    id
}

pub(crate) fn info_dict(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

pub(crate) fn catalog_id(doc: &Document) -> Result<ObjectId, PdfToolError> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| PdfToolError::OperationError("No Root in trailer".into()))
}

/// Builds a fresh document one page at a time.
pub(crate) struct DocumentBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn add_object(&mut self, object: impl Into<Object>) -> ObjectId {
        self.doc.add_object(object)
    }

    /// Append a page with the given size, resources and content stream.
    pub fn add_page(&mut self, width: f32, height: f32, resources: Dictionary, content: Vec<u8>) {
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), content));
        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(self.pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(width),
                    Object::Real(height),
                ]),
            ),
            ("Resources", Object::Dictionary(resources)),
            ("Contents", Object::Reference(content_id)),
        ]);
        let page_id = self.doc.add_object(page);
        self.kids.push(Object::Reference(page_id));
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    pub fn finish(mut self) -> Result<Vec<u8>, PdfToolError> {
        let count = self.kids.len() as i64;
        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(count)),
            ("Kids", Object::Array(self.kids)),
        ]);
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(self.pages_id)),
        ]);
        let catalog_id = self.doc.add_object(catalog);
        self.doc.trailer.set("Root", Object::Reference(catalog_id));
        self.doc.compress();
        save(&mut self.doc)
    }
}

/// Font resource dictionary for one of the standard 14 Type1 fonts.
pub(crate) fn standard_font(base_font: &str) -> Dictionary {
    Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(base_font.as_bytes().to_vec())),
        ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
    ])
}

/// Encode text for a WinAnsi simple font. Characters outside Latin-1 become `?`.
pub(crate) fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            0x2018 | 0x2019 => b'\'',
            0x201C | 0x201D => b'"',
            0x2013 | 0x2014 => b'-',
            0x09 => b' ',
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use lopdf::{content::Content, content::Operation, Dictionary, Document, Object, Stream};

    /// A simple PDF with N pages, each showing "<prefix>-Page-N".
    pub fn create_test_pdf(num_pages: u32, prefix: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(super::standard_font("Helvetica"));

        let mut page_ids = Vec::new();
        for i in 0..num_pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new(
                        "Tf",
                        vec![Object::Name(b"F1".to_vec()), Object::Integer(12)],
                    ),
                    Operation::new("Td", vec![Object::Integer(100), Object::Integer(700)]),
                    Operation::new(
                        "Tj",
                        vec![Object::String(
                            format!("{}-Page-{}", prefix, i + 1).into_bytes(),
                            lopdf::StringFormat::Literal,
                        )],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let resources = Dictionary::from_iter(vec![(
                "Font",
                Object::Dictionary(Dictionary::from_iter(vec![(
                    "F1",
                    Object::Reference(font_id),
                )])),
            )]);
            let page = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                (
                    "MediaBox",
                    Object::Array(vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(612),
                        Object::Integer(792),
                    ]),
                ),
                ("Resources", Object::Dictionary(resources)),
                ("Contents", Object::Reference(content_id)),
            ]);
            page_ids.push(doc.add_object(page));
        }

        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(num_pages as i64)),
            (
                "Kids",
                Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
            ),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let info = Dictionary::from_iter(vec![
            (
                "Title",
                Object::String(b"Quarterly Report".to_vec(), lopdf::StringFormat::Literal),
            ),
            (
                "Author",
                Object::String(b"Jane Doe".to_vec(), lopdf::StringFormat::Literal),
            ),
            (
                "Producer",
                Object::String(b"Test Suite".to_vec(), lopdf::StringFormat::Literal),
            ),
        ]);
        let info_id = doc.add_object(info);
        doc.trailer.set("Info", Object::Reference(info_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }
}
