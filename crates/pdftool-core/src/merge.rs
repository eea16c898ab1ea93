//! PDF Merge algorithm
//!
//! Combines multiple PDFs into a single document.

use crate::document::{inherited_attribute, load, save};
use crate::error::PdfToolError;
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;

const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Merge multiple PDFs into one
///
/// The algorithm:
/// 1. If empty, return error
/// 2. If single document, return it as-is
/// 3. Use the first document as the destination
/// 4. For each source document:
///    a. Pin inherited page attributes onto the pages themselves
///    b. Calculate ID offset to avoid conflicts
///    c. Import all objects with remapped IDs
///    d. Append pages to the destination
/// 5. Re-parent pages, drop orphaned objects, compress and return
pub fn merge_documents(documents: Vec<Vec<u8>>) -> Result<Vec<u8>, PdfToolError> {
    let mut documents = documents.into_iter();
    let first = documents
        .next()
        .ok_or_else(|| PdfToolError::OperationError("No documents to merge".into()))?;

    let rest: Vec<Vec<u8>> = documents.collect();
    if rest.is_empty() {
        return Ok(first);
    }

    let mut dest = load(&first)
        .map_err(|e| PdfToolError::ParseError(format!("Failed to load document 0: {}", e)))?;
    let mut dest_max_id = dest.max_id;
    let mut dest_page_refs = get_page_references(&dest);

    for (i, doc_bytes) in rest.iter().enumerate() {
        let mut source = load(doc_bytes).map_err(|e| {
            PdfToolError::ParseError(format!("Failed to load document {}: {}", i + 1, e))
        })?;

        let source_pages = get_page_references(&source);
        pin_inherited_attributes(&mut source, &source_pages);

        // Calculate offset for object IDs to avoid conflicts
        let id_offset = dest_max_id;

        let mut remapped_objects = BTreeMap::new();
        for (old_id, object) in source.objects.into_iter() {
            let new_id = (old_id.0 + id_offset, old_id.1);
            remapped_objects.insert(new_id, remap_object_refs(object, id_offset));
        }
        dest.objects.extend(remapped_objects);

        dest_page_refs.extend(
            source_pages
                .into_iter()
                .map(|old_ref| (old_ref.0 + id_offset, old_ref.1)),
        );

        dest_max_id = (source.max_id + id_offset).max(dest_max_id);
    }

    dest.max_id = dest_max_id;
    update_page_tree(&mut dest, dest_page_refs)?;

    dest.prune_objects();
    dest.compress();
    save(&mut dest)
}

/// Get all page object references from a document, in page order
fn get_page_references(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().values().copied().collect()
}

/// Copy attributes inherited from the source page tree onto each page, since
/// the page will be re-parented under the destination's tree.
fn pin_inherited_attributes(doc: &mut Document, pages: &[ObjectId]) {
    for &page_id in pages {
        let missing: Vec<(&[u8], Object)> = INHERITABLE_KEYS
            .iter()
            .filter(|key| {
                doc.get_dictionary(page_id)
                    .map(|d| !d.has(key))
                    .unwrap_or(false)
            })
            .filter_map(|key| inherited_attribute(doc, page_id, key).map(|v| (*key, v)))
            .collect();

        if let Ok(page) = doc.get_dictionary_mut(page_id) {
            for (key, value) in missing {
                page.set(key.to_vec(), value);
            }
        }
    }
}

/// Recursively remap object references in an object
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

/// Point the destination page tree at the combined page list
fn update_page_tree(doc: &mut Document, page_refs: Vec<ObjectId>) -> Result<(), PdfToolError> {
    let catalog_id = crate::document::catalog_id(doc)?;

    let pages_id = doc
        .get_dictionary(catalog_id)
        .map_err(|_| PdfToolError::OperationError("Invalid catalog".into()))?
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|_| PdfToolError::OperationError("No Pages in catalog".into()))?;

    for &page_id in &page_refs {
        if let Ok(page) = doc.get_dictionary_mut(page_id) {
            page.set("Parent", Object::Reference(pages_id));
        }
    }

    match doc.objects.get_mut(&pages_id) {
        Some(Object::Dictionary(pages_dict)) => {
            let kids = page_refs
                .iter()
                .map(|&id| Object::Reference(id))
                .collect::<Vec<_>>();
            pages_dict.set("Kids", Object::Array(kids));
            pages_dict.set("Count", Object::Integer(page_refs.len() as i64));
            Ok(())
        }
        _ => Err(PdfToolError::OperationError(
            "Invalid pages dictionary".into(),
        )),
    }
}
