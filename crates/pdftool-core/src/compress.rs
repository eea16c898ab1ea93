//! Size reduction by re-encoding embedded JPEG images.
//!
//! Only `DCTDecode` images in DeviceRGB or DeviceGray are touched. A
//! re-encoded image replaces the original only when it is smaller.

use crate::document::{load, save};
use crate::error::PdfToolError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ColorType;
use lopdf::{Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    /// Keeps quality high, compresses a little.
    Low,
    #[default]
    Medium,
    /// Aggressive: half resolution, heavy quantization.
    High,
}

impl CompressionMode {
    pub fn jpeg_quality(self) -> u8 {
        match self {
            CompressionMode::Low => 90,
            CompressionMode::Medium => 65,
            CompressionMode::High => 40,
        }
    }

    pub fn scale(self) -> f32 {
        match self {
            CompressionMode::Low => 1.0,
            CompressionMode::Medium => 0.7,
            CompressionMode::High => 0.5,
        }
    }
}

impl FromStr for CompressionMode {
    type Err = PdfToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(CompressionMode::Low),
            "medium" => Ok(CompressionMode::Medium),
            "high" => Ok(CompressionMode::High),
            other => Err(PdfToolError::OperationError(format!(
                "Unknown compression mode: {}",
                other
            ))),
        }
    }
}

/// Recompress images, drop unreferenced objects and Flate-compress any
/// unfiltered streams.
pub fn compress_document(bytes: &[u8], mode: CompressionMode) -> Result<Vec<u8>, PdfToolError> {
    let mut doc = load(bytes)?;

    let candidates: Vec<ObjectId> = doc
        .objects
        .iter()
        .filter_map(|(id, object)| match object {
            Object::Stream(stream) if is_recompressible(stream) => Some(*id),
            _ => None,
        })
        .collect();

    let mut replaced = 0usize;
    for id in candidates {
        let Some(Object::Stream(stream)) = doc.objects.get_mut(&id) else {
            continue;
        };
        match recompress(stream, mode) {
            Ok(true) => replaced += 1,
            Ok(false) => {}
            Err(e) => debug!(object = ?id, error = %e, "Skipping image"),
        }
    }
    debug!(replaced, "Recompressed images");

    doc.prune_objects();
    doc.compress();
    save(&mut doc)
}

fn is_recompressible(stream: &Stream) -> bool {
    let dict = &stream.dict;
    let is_image = matches!(dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image");
    let is_dct = match dict.get(b"Filter") {
        Ok(Object::Name(n)) => n == b"DCTDecode",
        Ok(Object::Array(filters)) => {
            filters.len() == 1 && matches!(&filters[0], Object::Name(n) if n == b"DCTDecode")
        }
        _ => false,
    };
    let plain_color = matches!(
        dict.get(b"ColorSpace"),
        Ok(Object::Name(n)) if n == b"DeviceRGB" || n == b"DeviceGray"
    );
    // Masks and decode arrays tie the image to its exact pixel grid.
    let has_mask = dict.has(b"SMask") || dict.has(b"Mask") || dict.has(b"Decode");
    is_image && is_dct && plain_color && !has_mask
}

/// Returns whether the stream was replaced.
fn recompress(stream: &mut Stream, mode: CompressionMode) -> Result<bool, PdfToolError> {
    let img = image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
        .map_err(|e| PdfToolError::Conversion(e.to_string()))?;

    let scale = mode.scale();
    let img = if scale < 1.0 {
        let width = ((img.width() as f32 * scale) as u32).max(1);
        let height = ((img.height() as f32 * scale) as u32).max(1);
        img.resize_exact(width, height, FilterType::CatmullRom)
    } else {
        img
    };

    let gray = matches!(stream.dict.get(b"ColorSpace"), Ok(Object::Name(n)) if n == b"DeviceGray");
    let (pixels, color) = if gray {
        (img.to_luma8().into_raw(), ColorType::L8)
    } else {
        (img.to_rgb8().into_raw(), ColorType::Rgb8)
    };

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, mode.jpeg_quality())
        .encode(&pixels, img.width(), img.height(), color)
        .map_err(|e| PdfToolError::Conversion(e.to_string()))?;

    if encoded.len() >= stream.content.len() {
        return Ok(false);
    }

    stream.dict.set("Width", Object::Integer(img.width() as i64));
    stream.dict.set("Height", Object::Integer(img.height() as i64));
    stream.dict.set("BitsPerComponent", Object::Integer(8));
    stream.dict.remove(b"DecodeParms");
    stream.set_content(encoded);
    Ok(true)
}
