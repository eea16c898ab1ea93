//! Batch orchestration for pdftool
//!
//! Discovers files, runs one [`pdftool_core`] operation over each of them on
//! a bounded worker pool, tracks progress and writes a processing report.
//! Failures of individual files are data in the [`BatchResult`]; only setup
//! problems surface as [`BatchError`].

pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod duplicates;
pub mod error;
pub mod progress;
pub mod registry;
pub mod report;

pub use config::Config;
pub use discovery::FileDiscovery;
pub use dispatcher::{BatchJob, BatchProcessor, BatchResult, FileResult, FileTask, NO_FILES_FOUND};
pub use duplicates::{find_duplicates, DuplicateMethod, DuplicateReport};
pub use error::{BatchError, OperationError};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use registry::{Operation, OperationContext, OperationKind};
pub use report::{ReportFormat, Reporter};

#[cfg(test)]
pub(crate) mod test_support {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream, StringFormat};

    /// A PDF with `num_pages` text pages and a populated Info dictionary.
    pub fn create_test_pdf(num_pages: u32) -> Vec<u8> {
        create_titled_pdf(num_pages, "Quarterly Report")
    }

    pub fn create_titled_pdf(num_pages: u32, title: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids = Vec::new();
        for i in 0..num_pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                    Operation::new("Td", vec![Object::Integer(100), Object::Integer(700)]),
                    Operation::new(
                        "Tj",
                        vec![Object::string_literal(format!("Page {}", i + 1))],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => Object::Reference(font_id) },
                },
                "Contents" => Object::Reference(content_id),
            });
            kids.push(Object::Reference(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => num_pages as i64,
                "Kids" => kids,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::String(title.as_bytes().to_vec(), StringFormat::Literal),
            "Author" => Object::string_literal("Jane Doe"),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc.trailer.set("Info", Object::Reference(info_id));

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }
}
