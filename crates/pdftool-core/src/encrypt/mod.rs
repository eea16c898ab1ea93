//! Password protection through the PDF standard security handler.
//!
//! Three strengths are offered:
//! - `Low`: RC4 40-bit (V1, R2)
//! - `Medium`: RC4 128-bit (V2, R3)
//! - `High`: AES-128 through an `AESV2` crypt filter (V4, R4)
//!
//! Every string and stream in the document is encrypted with its per-object
//! key. The encryption dictionary and the trailer `/ID` stay in the clear.

mod aes;
mod keys;
mod rc4;

use crate::document::{is_encrypted, load, save};
use crate::error::PdfToolError;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Permission bits that must be set (bits 7-8 and 13-32 for R3+).
const PERMISSION_BASE_R3: u32 = 0xFFFF_F0C0;
const PERMISSION_BASE_R2: u32 = 0xFFFF_FFC0;
const PERMIT_PRINT: u32 = 1 << 2;
const PERMIT_PRINT_HIGH_QUALITY: u32 = 1 << 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl EncryptionLevel {
    fn version(self) -> i64 {
        match self {
            EncryptionLevel::Low => 1,
            EncryptionLevel::Medium => 2,
            EncryptionLevel::High => 4,
        }
    }

    fn revision(self) -> u32 {
        match self {
            EncryptionLevel::Low => 2,
            EncryptionLevel::Medium => 3,
            EncryptionLevel::High => 4,
        }
    }

    fn key_len(self) -> usize {
        match self {
            EncryptionLevel::Low => 5,
            EncryptionLevel::Medium | EncryptionLevel::High => 16,
        }
    }

    fn is_aes(self) -> bool {
        self == EncryptionLevel::High
    }

    fn min_version(self) -> &'static str {
        match self {
            EncryptionLevel::Low => "1.3",
            EncryptionLevel::Medium => "1.4",
            EncryptionLevel::High => "1.6",
        }
    }
}

impl FromStr for EncryptionLevel {
    type Err = PdfToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(EncryptionLevel::Low),
            "MEDIUM" => Ok(EncryptionLevel::Medium),
            "HIGH" => Ok(EncryptionLevel::High),
            other => Err(PdfToolError::Encryption(format!(
                "Unknown encryption level: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EncryptOptions {
    /// Required to open the document.
    pub user_password: String,
    /// Grants full access. Falls back to the user password when absent.
    pub owner_password: Option<String>,
    pub level: EncryptionLevel,
}

/// Encrypt a PDF. Printing stays allowed; modifying, copying and annotating
/// are denied.
pub fn encrypt_document(bytes: &[u8], options: &EncryptOptions) -> Result<Vec<u8>, PdfToolError> {
    let mut doc = load(bytes)?;
    encrypt_in_place(&mut doc, options, &mut rand::thread_rng())?;
    save(&mut doc)
}

pub(crate) fn permissions(level: EncryptionLevel) -> i32 {
    let bits = if level.revision() >= 3 {
        PERMISSION_BASE_R3 | PERMIT_PRINT | PERMIT_PRINT_HIGH_QUALITY
    } else {
        PERMISSION_BASE_R2 | PERMIT_PRINT
    };
    bits as i32
}

fn encrypt_in_place<R: Rng + ?Sized>(
    doc: &mut Document,
    options: &EncryptOptions,
    rng: &mut R,
) -> Result<(), PdfToolError> {
    if is_encrypted(doc) {
        return Err(PdfToolError::Encryption(
            "Document is already encrypted".into(),
        ));
    }
    if options.user_password.is_empty() {
        return Err(PdfToolError::Encryption("Password must not be empty".into()));
    }

    let level = options.level;
    let revision = level.revision();
    let key_len = level.key_len();

    // Streams must be filtered before they are encrypted, never after.
    doc.prune_objects();
    doc.compress();
    if doc.version.as_str() < level.min_version() {
        doc.version = level.min_version().to_string();
    }

    let file_id = ensure_file_id(doc, rng);
    let user = options.user_password.as_bytes();
    let owner = options.owner_password.as_deref().unwrap_or("").as_bytes();
    let p = permissions(level);

    let o = keys::owner_key(owner, user, revision, key_len);
    let key = keys::file_key(user, &o, p, &file_id, revision, key_len);
    let u = keys::user_key(&key, &file_id, revision);

    let ids: Vec<ObjectId> = doc.objects.keys().copied().collect();
    for id in ids {
        let object_key = keys::object_key(&key, id, level.is_aes());
        if let Some(object) = doc.objects.get_mut(&id) {
            encrypt_object(object, &object_key, level, rng)?;
        }
    }

    let encrypt_id = doc.add_object(encryption_dictionary(level, o, u, p));
    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
    Ok(())
}

/// First element of the trailer `/ID`, generating a random pair if absent.
fn ensure_file_id<R: Rng + ?Sized>(doc: &mut Document, rng: &mut R) -> Vec<u8> {
    let existing = match doc.trailer.get(b"ID") {
        Ok(Object::Array(items)) => match items.first() {
            Some(Object::String(bytes, _)) if !bytes.is_empty() => Some(bytes.clone()),
            _ => None,
        },
        _ => None,
    };
    if let Some(id) = existing {
        return id;
    }

    let mut id = [0u8; 16];
    rng.fill(&mut id[..]);
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(id.to_vec(), StringFormat::Hexadecimal),
            Object::String(id.to_vec(), StringFormat::Hexadecimal),
        ]),
    );
    id.to_vec()
}

fn encrypt_object<R: Rng + ?Sized>(
    object: &mut Object,
    key: &[u8],
    level: EncryptionLevel,
    rng: &mut R,
) -> Result<(), PdfToolError> {
    match object {
        Object::String(bytes, format) => {
            *bytes = encrypt_bytes(key, bytes, level, rng)?;
            *format = StringFormat::Hexadecimal;
        }
        Object::Array(items) => {
            for item in items.iter_mut() {
                encrypt_object(item, key, level, rng)?;
            }
        }
        Object::Dictionary(dict) => encrypt_dictionary(dict, key, level, rng)?,
        Object::Stream(stream) => {
            encrypt_dictionary(&mut stream.dict, key, level, rng)?;
            let encrypted = encrypt_bytes(key, &stream.content, level, rng)?;
            stream.set_content(encrypted);
        }
        _ => {}
    }
    Ok(())
}

fn encrypt_dictionary<R: Rng + ?Sized>(
    dict: &mut Dictionary,
    key: &[u8],
    level: EncryptionLevel,
    rng: &mut R,
) -> Result<(), PdfToolError> {
    for (_, value) in dict.iter_mut() {
        encrypt_object(value, key, level, rng)?;
    }
    Ok(())
}

fn encrypt_bytes<R: Rng + ?Sized>(
    key: &[u8],
    data: &[u8],
    level: EncryptionLevel,
    rng: &mut R,
) -> Result<Vec<u8>, PdfToolError> {
    if level.is_aes() {
        let mut iv = [0u8; 16];
        rng.fill(&mut iv);
        aes::aes128_encrypt(key, &iv, data).map_err(PdfToolError::Encryption)
    } else {
        Ok(rc4::rc4_crypt(key, data))
    }
}

fn encryption_dictionary(level: EncryptionLevel, o: Vec<u8>, u: Vec<u8>, p: i32) -> Dictionary {
    let mut dict = Dictionary::from_iter(vec![
        ("Filter", Object::Name(b"Standard".to_vec())),
        ("V", Object::Integer(level.version())),
        ("R", Object::Integer(level.revision() as i64)),
        ("Length", Object::Integer(level.key_len() as i64 * 8)),
        ("O", Object::String(o, StringFormat::Hexadecimal)),
        ("U", Object::String(u, StringFormat::Hexadecimal)),
        ("P", Object::Integer(p as i64)),
    ]);

    if level.is_aes() {
        let std_cf = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"CryptFilter".to_vec())),
            ("CFM", Object::Name(b"AESV2".to_vec())),
            ("AuthEvent", Object::Name(b"DocOpen".to_vec())),
            ("Length", Object::Integer(16)),
        ]);
        dict.set(
            "CF",
            Object::Dictionary(Dictionary::from_iter(vec![(
                "StdCF",
                Object::Dictionary(std_cf),
            )])),
        );
        dict.set("StmF", Object::Name(b"StdCF".to_vec()));
        dict.set("StrF", Object::Name(b"StdCF".to_vec()));
        dict.set("EncryptMetadata", Object::Boolean(true));
    }
    dict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::test_support::create_test_pdf;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn options(level: EncryptionLevel) -> EncryptOptions {
        EncryptOptions {
            user_password: "secret".into(),
            owner_password: None,
            level,
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_permissions_allow_print_only() {
        for level in [EncryptionLevel::Low, EncryptionLevel::Medium, EncryptionLevel::High] {
            let p = permissions(level) as u32;
            assert_ne!(p & PERMIT_PRINT, 0);
            assert_eq!(p & (1 << 3), 0, "modify");
            assert_eq!(p & (1 << 4), 0, "copy");
            assert_eq!(p & (1 << 5), 0, "annotate");
        }
        assert_eq!(permissions(EncryptionLevel::Low), -60);
    }

    #[test]
    fn test_each_level_hides_info_strings() {
        let pdf = create_test_pdf(2, "Encrypt");
        assert!(contains(&pdf, b"Quarterly Report"));

        for level in [EncryptionLevel::Low, EncryptionLevel::Medium, EncryptionLevel::High] {
            let out = encrypt_document(&pdf, &options(level)).unwrap();
            assert!(contains(&out, b"/Encrypt"), "{:?}", level);
            assert!(!contains(&out, b"Quarterly Report"), "{:?}", level);
        }
    }

    #[test]
    fn test_aes_dictionary_shape() {
        let mut doc = Document::load_mem(&create_test_pdf(1, "Aes")).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        encrypt_in_place(&mut doc, &options(EncryptionLevel::High), &mut rng).unwrap();

        let encrypt_id = doc.trailer.get(b"Encrypt").unwrap().as_reference().unwrap();
        let dict = doc.get_dictionary(encrypt_id).unwrap();
        assert_eq!(dict.get(b"V").unwrap().as_i64().unwrap(), 4);
        assert_eq!(dict.get(b"R").unwrap().as_i64().unwrap(), 4);
        assert_eq!(dict.get(b"StmF").unwrap().as_name().unwrap(), b"StdCF");
        assert_eq!(doc.version, "1.6");

        // AES strings are IV + whole blocks.
        let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let title = doc.get_dictionary(info_id).unwrap().get(b"Title").unwrap();
        let Object::String(bytes, _) = title else {
            panic!("title is not a string");
        };
        assert_eq!(bytes.len() % 16, 0);
        assert!(bytes.len() >= 32);
    }

    #[test]
    fn test_rc4_string_decrypts_with_object_key() {
        let mut doc = Document::load_mem(&create_test_pdf(1, "Rc4")).unwrap();
        let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        encrypt_in_place(&mut doc, &options(EncryptionLevel::Medium), &mut rng).unwrap();

        let Ok(Object::Array(ids)) = doc.trailer.get(b"ID") else {
            panic!("missing ID");
        };
        let Object::String(file_id, _) = &ids[0] else {
            panic!("ID is not a string");
        };
        let encrypt_id = doc.trailer.get(b"Encrypt").unwrap().as_reference().unwrap();
        let o = match doc.get_dictionary(encrypt_id).unwrap().get(b"O").unwrap() {
            Object::String(o, _) => o.clone(),
            _ => panic!("O is not a string"),
        };

        let key = keys::file_key(b"secret", &o, permissions(EncryptionLevel::Medium), file_id, 3, 16);
        let object_key = keys::object_key(&key, info_id, false);
        let Object::String(title, _) = doc.get_dictionary(info_id).unwrap().get(b"Title").unwrap() else {
            panic!("title is not a string");
        };
        assert_eq!(rc4::rc4_crypt(&object_key, title), b"Quarterly Report");
    }

    #[test]
    fn test_rejects_already_encrypted() {
        let mut doc = Document::load_mem(&create_test_pdf(1, "Twice")).unwrap();
        doc.trailer.set("Encrypt", Object::Dictionary(Dictionary::new()));
        let mut rng = StdRng::seed_from_u64(3);
        let err = encrypt_in_place(&mut doc, &options(EncryptionLevel::Low), &mut rng).unwrap_err();
        assert!(err.to_string().contains("already encrypted"));
    }

    #[test]
    fn test_rejects_empty_password() {
        let pdf = create_test_pdf(1, "Empty");
        let opts = EncryptOptions {
            user_password: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            encrypt_document(&pdf, &opts),
            Err(PdfToolError::Encryption(_))
        ));
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("medium".parse::<EncryptionLevel>().unwrap(), EncryptionLevel::Medium);
        assert_eq!("HIGH".parse::<EncryptionLevel>().unwrap(), EncryptionLevel::High);
        assert!("extreme".parse::<EncryptionLevel>().is_err());
        assert_eq!(EncryptionLevel::default(), EncryptionLevel::Medium);
    }
}
