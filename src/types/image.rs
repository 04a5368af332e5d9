//! Image payloads attached to messages.
//!
//! An image is either *transient* (encoded bytes held in memory until the next
//! save) or *materialized* (a stable path in the document store).

use std::path::Path;

use base64::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const DEFAULT_MEDIA_TYPE: &str = "image/png";
const DEFAULT_EXTENSION: &str = "png";

/// Provenance of an attached image. Also used as the markup alt text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ImageSource {
    Screenshot,
    External,
    Vault,
    #[default]
    Image,
}

impl ImageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Screenshot => "screenshot",
            Self::External => "external",
            Self::Vault => "vault",
            Self::Image => "image",
        }
    }

    /// Unknown tags degrade to the generic [`ImageSource::Image`].
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "screenshot" => Self::Screenshot,
            "external" => Self::External,
            "vault" => Self::Vault,
            _ => Self::Image,
        }
    }

    pub fn label(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ImageSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ImageSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

/// Inline image bytes waiting to be resolved on the next save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransientImage {
    /// Data URI (`data:<mime>;base64,<data>`) or bare base64.
    pub encoded_bytes: String,
    #[serde(default)]
    pub source: ImageSource,
    #[serde(default)]
    pub file_name: String,
}

impl TransientImage {
    pub fn new(
        encoded_bytes: impl Into<String>,
        source: ImageSource,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            encoded_bytes: encoded_bytes.into(),
            source,
            file_name: file_name.into(),
        }
    }

    pub fn from_bytes(
        bytes: &[u8],
        media_type: &str,
        source: ImageSource,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            encoded_bytes: format!("data:{};base64,{}", media_type, BASE64_STANDARD.encode(bytes)),
            source,
            file_name: file_name.into(),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>, source: ImageSource) -> crate::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(crate::Error::Io)?;
        let media_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::from_bytes(&data, &media_type, source, file_name))
    }

    pub fn is_data_uri(&self) -> bool {
        self.encoded_bytes.starts_with("data:")
    }

    /// Media type from the data URI header, else guessed from the file name.
    pub fn media_type(&self) -> String {
        if let Some(header) = self
            .encoded_bytes
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(',').map(|(h, _)| h))
        {
            let media_type = header.split(';').next().unwrap_or_default().trim();
            if !media_type.is_empty() {
                return media_type.to_string();
            }
        }
        mime_guess::from_path(&self.file_name)
            .first()
            .map(|m| m.essence_str().to_string())
            .filter(|m| m.starts_with("image/"))
            .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string())
    }

    /// The payload as a data URI, wrapping bare base64 when needed.
    pub fn data_uri(&self) -> String {
        if self.is_data_uri() {
            self.encoded_bytes.clone()
        } else {
            format!(
                "data:{};base64,{}",
                self.media_type(),
                self.encoded_bytes.trim()
            )
        }
    }

    pub fn decode_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let data = if self.is_data_uri() {
            self.encoded_bytes
                .split_once(',')
                .map(|(_, data)| data)
                .unwrap_or_default()
        } else {
            self.encoded_bytes.as_str()
        };
        let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
        BASE64_STANDARD.decode(cleaned)
    }

    /// File extension for materialization: from the file name, else the media type.
    pub fn extension(&self) -> String {
        if let Some(ext) = Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
        {
            return ext.to_ascii_lowercase();
        }
        extension_for(&self.media_type())
    }

    pub fn markup(&self) -> String {
        super::markers::image_markup(self.source.label(), &self.data_uri())
    }
}

fn extension_for(media_type: &str) -> String {
    match media_type {
        "image/jpeg" => "jpg".to_string(),
        "image/svg+xml" => "svg".to_string(),
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first())
            .map(|e| e.to_string())
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
    }
}

/// Reference to an image already written to the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedImage {
    pub path: String,
    pub label: String,
}

impl MaterializedImage {
    pub fn new(path: impl Into<String>, source: ImageSource) -> Self {
        Self {
            path: path.into(),
            label: source.label().to_string(),
        }
    }

    pub fn markup(&self) -> String {
        super::markers::image_markup(&self.label, &self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImagePayload {
    Transient(TransientImage),
    Materialized(MaterializedImage),
}

impl ImagePayload {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self, Self::Materialized(_))
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Materialized(m) => Some(&m.path),
            Self::Transient(_) => None,
        }
    }

    pub fn markup(&self) -> String {
        match self {
            Self::Transient(t) => t.markup(),
            Self::Materialized(m) => m.markup(),
        }
    }
}

/// A temp-image table entry as found in a message or a document header.
///
/// Current documents store a JSON object; older ones stored only the encoded
/// data as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredTempImage {
    Structured(TransientImage),
    LegacyBare(String),
}

impl StoredTempImage {
    /// JSON first, bare string otherwise. Never fails.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<TransientImage>(raw) {
            Ok(image) if !image.encoded_bytes.is_empty() => Self::Structured(image),
            _ => Self::LegacyBare(raw.trim().to_string()),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::LegacyBare(_))
    }

    pub fn to_transient(&self, token: &str) -> TransientImage {
        match self {
            Self::Structured(image) => image.clone(),
            Self::LegacyBare(data) => {
                let mut image = TransientImage::new(data.clone(), ImageSource::Image, "");
                image.file_name = format!("pasted-image-{}.{}", token, image.extension());
                image
            }
        }
    }

    /// Header representation; legacy entries are upgraded to the JSON form.
    pub fn to_header_value(&self, token: &str) -> String {
        serde_json::to_string(&self.to_transient(token)).unwrap_or_default()
    }
}

impl From<TransientImage> for StoredTempImage {
    fn from(image: TransientImage) -> Self {
        Self::Structured(image)
    }
}
