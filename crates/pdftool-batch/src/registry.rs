//! Operation registry
//!
//! Maps an operation name arriving from the CLI or a config file onto a
//! closed set of operations with typed parameters. Unknown names and bad
//! parameters are per-file failures, so they resolve inside each task
//! rather than before dispatch.

use pdftool_core::{
    add_text_watermark, clean_metadata, compress_document, convert_file, encrypt_document,
    parse_hex_color, parse_range_pairs, randomize_metadata, split_every, split_ranges, CleanMode,
    CompressionMode, DocumentKind, EncryptOptions, EncryptionLevel, FileType, MetadataProfile,
    OfficeConverter, PdfToolError, WatermarkOptions,
};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::config::Config;
use crate::dispatcher::FileTask;
use crate::error::OperationError;

/// Characters used for randomized output names.
const NAME_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Compress,
    Watermark,
    Encrypt,
    Split,
    CleanMetadata,
    Convert,
    BypassMetadata,
}

impl OperationKind {
    pub const ALL: [OperationKind; 7] = [
        OperationKind::Compress,
        OperationKind::Watermark,
        OperationKind::Encrypt,
        OperationKind::Split,
        OperationKind::CleanMetadata,
        OperationKind::Convert,
        OperationKind::BypassMetadata,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Compress => "compress",
            OperationKind::Watermark => "watermark",
            OperationKind::Encrypt => "encrypt",
            OperationKind::Split => "split",
            OperationKind::CleanMetadata => "clean_metadata",
            OperationKind::Convert => "convert",
            OperationKind::BypassMetadata => "bypass_metadata",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| OperationError::Unsupported(s.to_string()))
    }
}

/// An operation with its parameters already validated.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Compress(CompressParams),
    Watermark(WatermarkParams),
    Encrypt(EncryptParams),
    Split(SplitParams),
    CleanMetadata(CleanParams),
    Convert(ConvertParams),
    BypassMetadata(BypassParams),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompressParams {
    #[serde(default, deserialize_with = "parse_str")]
    pub mode: CompressionMode,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WatermarkParams {
    #[serde(default = "default_watermark_text")]
    pub text: String,
    #[serde(default)]
    pub pages: Option<PageSelection>,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_rotation")]
    pub rotation: f32,
    #[serde(default = "default_color")]
    pub color: String,
}

/// `[1, 3]`, `2` or `"1-3, 5"`. Pages are 1-based; pages a file does not
/// have are skipped, so one selection can cover files of different lengths.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PageSelection {
    List(Vec<u32>),
    Single(u32),
    Ranges(String),
}

impl PageSelection {
    /// Inclusive page ranges, in the order given.
    pub fn to_ranges(&self) -> Result<Vec<(u32, u32)>, PdfToolError> {
        match self {
            PageSelection::List(pages) => Ok(pages.iter().map(|&p| (p, p)).collect()),
            PageSelection::Single(page) => Ok(vec![(*page, *page)]),
            PageSelection::Ranges(ranges) => parse_range_pairs(ranges),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EncryptParams {
    pub password: String,
    #[serde(default)]
    pub owner_password: Option<String>,
    #[serde(default, deserialize_with = "parse_str")]
    pub encryption_level: EncryptionLevel,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SplitParams {
    #[serde(default = "default_pages_per_file")]
    pub pages_per_file: u32,
    /// `"1-3, 4-6"`: one part per range. Takes precedence over
    /// `pages_per_file`.
    #[serde(default)]
    pub ranges: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CleanParams {
    #[serde(default, deserialize_with = "parse_str")]
    pub mode: CleanMode,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConvertParams {
    #[serde(deserialize_with = "parse_str")]
    pub file_type: FileType,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BypassParams {
    #[serde(default, deserialize_with = "parse_str")]
    pub file_type: DocumentKind,
    #[serde(default)]
    pub custom_title: Option<String>,
    /// Extra Info fields, applied over the configured defaults.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Number of differently randomized copies to write.
    #[serde(default = "default_copies")]
    pub copies: u32,
    /// Kinds drawn from at random for each copy when `copies > 1`. Empty
    /// means every kind.
    #[serde(default, deserialize_with = "parse_str_list")]
    pub file_types: Vec<DocumentKind>,
}

fn default_watermark_text() -> String {
    "WATERMARK".to_string()
}

fn default_font_size() -> f32 {
    40.0
}

fn default_rotation() -> f32 {
    45.0
}

fn default_color() -> String {
    "#FF0000".to_string()
}

fn default_pages_per_file() -> u32 {
    1
}

fn default_copies() -> u32 {
    1
}

/// Deserialize an enum through its case-insensitive `FromStr`.
fn parse_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

fn parse_str_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    Vec::<String>::deserialize(deserializer)?
        .iter()
        .map(|s| s.parse().map_err(serde::de::Error::custom))
        .collect()
}

impl Operation {
    /// Resolve an operation name and its raw parameters.
    pub fn resolve(name: &str, params: &Map<String, Value>) -> Result<Self, OperationError> {
        let kind: OperationKind = name.parse()?;
        let operation = match kind {
            OperationKind::Compress => Operation::Compress(decode(kind, params)?),
            OperationKind::Watermark => {
                let params: WatermarkParams = decode(kind, params)?;
                if parse_hex_color(&params.color).is_none() {
                    return Err(invalid(kind, format!("invalid color {:?}", params.color)));
                }
                Operation::Watermark(params)
            }
            OperationKind::Encrypt => {
                let params: EncryptParams = decode(kind, params)?;
                if params.password.is_empty() {
                    return Err(invalid(kind, "password must not be empty"));
                }
                Operation::Encrypt(params)
            }
            OperationKind::Split => {
                let params: SplitParams = decode(kind, params)?;
                if params.pages_per_file == 0 {
                    return Err(invalid(kind, "pages_per_file must be at least 1"));
                }
                if let Some(ranges) = &params.ranges {
                    match parse_range_pairs(ranges) {
                        Ok(pairs) if pairs.is_empty() => {
                            return Err(invalid(kind, "ranges must name at least one page"))
                        }
                        Ok(_) => {}
                        Err(e) => return Err(invalid(kind, e.to_string())),
                    }
                }
                Operation::Split(params)
            }
            OperationKind::CleanMetadata => Operation::CleanMetadata(decode(kind, params)?),
            OperationKind::Convert => Operation::Convert(decode(kind, params)?),
            OperationKind::BypassMetadata => {
                let params: BypassParams = decode(kind, params)?;
                if params.copies == 0 {
                    return Err(invalid(kind, "copies must be at least 1"));
                }
                Operation::BypassMetadata(params)
            }
        };
        Ok(operation)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Compress(_) => OperationKind::Compress,
            Operation::Watermark(_) => OperationKind::Watermark,
            Operation::Encrypt(_) => OperationKind::Encrypt,
            Operation::Split(_) => OperationKind::Split,
            Operation::CleanMetadata(_) => OperationKind::CleanMetadata,
            Operation::Convert(_) => OperationKind::Convert,
            Operation::BypassMetadata(_) => OperationKind::BypassMetadata,
        }
    }

    /// Run the operation on one file and return every path it wrote.
    pub fn execute(
        &self,
        task: &FileTask,
        ctx: &OperationContext,
    ) -> Result<Vec<PathBuf>, OperationError> {
        match self {
            Operation::Compress(params) => {
                let output = compress_document(&read_input(&task.input)?, params.mode)?;
                write_output(&task.output, &output)
            }
            Operation::Watermark(params) => {
                let options = params.options()?;
                let output = add_text_watermark(&read_input(&task.input)?, &options)?;
                write_output(&task.output, &output)
            }
            Operation::Encrypt(params) => {
                let options = EncryptOptions {
                    user_password: params.password.clone(),
                    owner_password: params.owner_password.clone(),
                    level: params.encryption_level,
                };
                let output = encrypt_document(&read_input(&task.input)?, &options)?;
                write_output(&task.output, &output)
            }
            Operation::Split(params) => {
                let input = read_input(&task.input)?;
                let parts = match &params.ranges {
                    Some(ranges) => split_ranges(&input, &parse_range_pairs(ranges)?)?,
                    None => split_every(&input, params.pages_per_file)?,
                };
                let dir = output_dir(task);
                let stem = file_stem(&task.input);
                let mut written = Vec::with_capacity(parts.len());
                for (i, part) in parts.iter().enumerate() {
                    let path = dir.join(format!("{}_part_{:03}.pdf", stem, i + 1));
                    written.extend(write_output(&path, part)?);
                }
                Ok(written)
            }
            Operation::CleanMetadata(params) => {
                let output = clean_metadata(&read_input(&task.input)?, params.mode)?;
                write_output(&task.output, &output)
            }
            Operation::Convert(params) => convert(task, params.file_type, &ctx.office),
            Operation::BypassMetadata(params) => bypass_metadata(task, params, ctx),
        }
    }
}

impl WatermarkParams {
    fn options(&self) -> Result<WatermarkOptions, PdfToolError> {
        let color = parse_hex_color(&self.color).ok_or_else(|| {
            PdfToolError::OperationError(format!("Invalid color: {}", self.color))
        })?;
        Ok(WatermarkOptions {
            text: self.text.clone(),
            pages: self.pages.as_ref().map(PageSelection::to_ranges).transpose()?,
            font_size: self.font_size,
            rotation: self.rotation,
            color,
        })
    }
}

/// Shared, read-only inputs every task may need.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub office: OfficeConverter,
    /// Info fields written by `bypass_metadata` before per-job ones.
    pub default_fields: BTreeMap<String, String>,
    pub filename_length: usize,
}

impl OperationContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            office: config.convert.office_converter(),
            default_fields: config.metadata.default_fields.clone(),
            filename_length: config.metadata.filename_length,
        }
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

fn decode<T: DeserializeOwned>(
    kind: OperationKind,
    params: &Map<String, Value>,
) -> Result<T, OperationError> {
    serde_json::from_value(Value::Object(params.clone())).map_err(|e| invalid(kind, e.to_string()))
}

fn invalid(kind: OperationKind, message: impl Into<String>) -> OperationError {
    OperationError::InvalidParams {
        operation: kind.to_string(),
        message: message.into(),
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>, OperationError> {
    fs::read(path).map_err(|source| OperationError::Input {
        path: path.to_path_buf(),
        source,
    })
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<Vec<PathBuf>, OperationError> {
    let output_error = |source: std::io::Error| OperationError::Output {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(output_error)?;
    }
    fs::write(path, bytes).map_err(output_error)?;
    debug!(output = %path.display(), bytes = bytes.len(), "Wrote output");
    Ok(vec![path.to_path_buf()])
}

fn output_dir(task: &FileTask) -> PathBuf {
    task.output
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

fn convert(
    task: &FileTask,
    file_type: FileType,
    office: &OfficeConverter,
) -> Result<Vec<PathBuf>, OperationError> {
    if FileType::from_path(&task.input) != Some(file_type) {
        return Err(PdfToolError::UnsupportedFormat(format!(
            "{} is not a {:?} file",
            task.input.display(),
            file_type
        ))
        .into());
    }

    // Office converters name their output after the input stem, so each task
    // gets its own scratch directory.
    let scratch = output_dir(task).join(format!(".pdftool-{}", random_name(12)));
    fs::create_dir_all(&scratch).map_err(|source| OperationError::Output {
        path: scratch.clone(),
        source,
    })?;
    let converted = convert_file(&task.input, file_type, office, &scratch);
    if let Err(e) = fs::remove_dir_all(&scratch) {
        debug!(dir = %scratch.display(), error = %e, "Failed to remove scratch directory");
    }
    write_output(&task.output, &converted?)
}

fn bypass_metadata(
    task: &FileTask,
    params: &BypassParams,
    ctx: &OperationContext,
) -> Result<Vec<PathBuf>, OperationError> {
    let title = params
        .custom_title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let mut custom_fields = ctx.default_fields.clone();
    custom_fields.extend(params.metadata.clone());
    let input = read_input(&task.input)?;
    let base = title
        .map(sanitize_file_name)
        .unwrap_or_else(|| file_stem(&task.input));

    let mut rng = rand::thread_rng();
    let mut written = Vec::with_capacity(params.copies as usize);
    for copy in 1..=params.copies {
        let kind = if params.copies == 1 {
            params.file_type
        } else {
            pick_kind(&params.file_types, &mut rng)
        };
        let profile = MetadataProfile {
            kind,
            title: title.map(str::to_string),
            custom_fields: custom_fields.clone(),
        };
        let output = randomize_metadata(&input, &profile, &mut rng)?;

        let name = if params.copies == 1 {
            format!("{}_{}.pdf", base, random_name(ctx.filename_length))
        } else {
            format!("{}_{:02}_{}.pdf", base, copy, random_name(ctx.filename_length))
        };
        written.extend(write_output(&output_dir(task).join(name), &output)?);
    }
    Ok(written)
}

const ALL_KINDS: [DocumentKind; 4] = [
    DocumentKind::Document,
    DocumentKind::Book,
    DocumentKind::Presentation,
    DocumentKind::Academic,
];

fn pick_kind<R: Rng + ?Sized>(kinds: &[DocumentKind], rng: &mut R) -> DocumentKind {
    let pool = if kinds.is_empty() { &ALL_KINDS[..] } else { kinds };
    pool[rng.gen_range(0..pool.len())]
}

/// Lowercase alphanumeric string of `len` characters.
pub fn random_name(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| NAME_CHARSET[rng.gen_range(0..NAME_CHARSET.len())] as char)
        .collect()
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
