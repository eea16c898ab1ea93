//! Raster images as PDF image XObjects.
//!
//! JPEG data is embedded as-is behind `DCTDecode`; everything else is decoded,
//! flattened to 8-bit RGB or gray and Flate-compressed.

use crate::error::PdfToolError;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{ColorType, DynamicImage};
use lopdf::{Dictionary, Object, Stream};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColorSpace {
    DeviceGray,
    DeviceRGB,
    DeviceCMYK,
}

impl ColorSpace {
    fn pdf_name(self) -> &'static [u8] {
        match self {
            ColorSpace::DeviceGray => b"DeviceGray",
            ColorSpace::DeviceRGB => b"DeviceRGB",
            ColorSpace::DeviceCMYK => b"DeviceCMYK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Dct,
    Flate,
}

#[derive(Debug, Clone)]
pub(crate) struct EmbeddedImage {
    pub width: u32,
    pub height: u32,
    pub color_space: ColorSpace,
    encoding: Encoding,
    data: Vec<u8>,
}

impl EmbeddedImage {
    /// Sniff JPEG or PNG from magic bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, PdfToolError> {
        if data.starts_with(&[0xFF, 0xD8]) {
            return Self::from_jpeg(data.to_vec());
        }
        if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            let img = image::load_from_memory_with_format(data, image::ImageFormat::Png)
                .map_err(|e| PdfToolError::Conversion(format!("Invalid PNG: {}", e)))?;
            return Self::from_decoded(&img);
        }
        Err(PdfToolError::UnsupportedFormat(
            "Expected a JPEG or PNG image".into(),
        ))
    }

    pub fn from_jpeg(data: Vec<u8>) -> Result<Self, PdfToolError> {
        let (width, height, color_space) = parse_jpeg_header(&data)?;
        Ok(Self {
            width,
            height,
            color_space,
            encoding: Encoding::Dct,
            data,
        })
    }

    /// Alpha is dropped; images without color become DeviceGray.
    pub fn from_decoded(img: &DynamicImage) -> Result<Self, PdfToolError> {
        let (color_space, pixels) = match img.color() {
            ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16 => {
                (ColorSpace::DeviceGray, img.to_luma8().into_raw())
            }
            _ => (ColorSpace::DeviceRGB, img.to_rgb8().into_raw()),
        };
        Ok(Self {
            width: img.width(),
            height: img.height(),
            color_space,
            encoding: Encoding::Flate,
            data: deflate(&pixels)?,
        })
    }

    pub fn into_xobject(self) -> Stream {
        let mut dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(self.width as i64)),
            ("Height", Object::Integer(self.height as i64)),
            (
                "ColorSpace",
                Object::Name(self.color_space.pdf_name().to_vec()),
            ),
            ("BitsPerComponent", Object::Integer(8)),
        ]);
        let filter: &[u8] = match self.encoding {
            Encoding::Dct => b"DCTDecode",
            Encoding::Flate => b"FlateDecode",
        };
        dict.set("Filter", Object::Name(filter.to_vec()));
        // Already encoded; keep lopdf from filtering it again.
        Stream::new(dict, self.data).with_compression(false)
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, PdfToolError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Width, height and color space from the first SOF marker.
pub(crate) fn parse_jpeg_header(data: &[u8]) -> Result<(u32, u32, ColorSpace), PdfToolError> {
    let invalid = |msg: &str| PdfToolError::Conversion(format!("Invalid JPEG: {}", msg));
    if !data.starts_with(&[0xFF, 0xD8]) {
        return Err(invalid("missing SOI marker"));
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        pos += 2;

        if marker == 0xFF || marker == 0x00 || (0xD0..=0xD7).contains(&marker) {
            continue;
        }

        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            if pos + 8 > data.len() {
                return Err(invalid("truncated frame header"));
            }
            let height = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as u32;
            let width = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            let color_space = match data[pos + 7] {
                1 => ColorSpace::DeviceGray,
                4 => ColorSpace::DeviceCMYK,
                _ => ColorSpace::DeviceRGB,
            };
            return Ok((width, height, color_space));
        }

        if pos + 2 > data.len() {
            break;
        }
        pos += u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
    }

    Err(invalid("no frame header"))
}


#[cfg(test)]
mod tests {
    use super::test_support::{jpeg_bytes, png_bytes};
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_jpeg_header() {
        let jpeg = jpeg_bytes(40, 24, 80);
        let (w, h, cs) = parse_jpeg_header(&jpeg).unwrap();
        assert_eq!((w, h, cs), (40, 24, ColorSpace::DeviceRGB));
    }

    #[test]
    fn test_jpeg_is_embedded_verbatim() {
        let jpeg = jpeg_bytes(16, 16, 80);
        let stream = EmbeddedImage::from_bytes(&jpeg).unwrap().into_xobject();
        assert_eq!(stream.content, jpeg);
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");
    }

    #[test]
    fn test_png_is_flate_encoded() {
        let image = EmbeddedImage::from_bytes(&png_bytes(10, 5)).unwrap();
        assert_eq!((image.width, image.height), (10, 5));
        let stream = image.into_xobject();
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"FlateDecode");
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(matches!(
            EmbeddedImage::from_bytes(b"GIF89a"),
            Err(PdfToolError::UnsupportedFormat(_))
        ));
    }
}
