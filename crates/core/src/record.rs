//! Upload records and the descriptors that flow into them.

use crate::{FlashError, FlashResult};
use flash_types::{Basename, NonEmptyText};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::PathBuf;

/// Crop transform applied to an upload.
///
/// The core never interprets the transform: it is an ordered mapping of string keys to YAML
/// values (`{w: 100, h: 100}`, `{rotate: 90}`) that is stored and handed back verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CropDescriptor(Mapping);

impl CropDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(Value::String(key.to_owned()), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses `key=value` pairs separated by commas, e.g. `x=0,y=0,w=100,h=100`.
    ///
    /// Each value is read as a YAML scalar, so `100` becomes a number and `true` a boolean.
    pub fn parse_pairs(input: &str) -> FlashResult<Self> {
        let mut crop = Self::new();
        for pair in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, raw) = pair.split_once('=').ok_or_else(|| {
                FlashError::InvalidInput(format!("crop entry '{pair}' is not key=value"))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(FlashError::InvalidInput(format!(
                    "crop entry '{pair}' has an empty key"
                )));
            }
            let value: Value = serde_yaml::from_str(raw.trim()).map_err(|e| {
                FlashError::InvalidInput(format!("crop value for '{key}' is not a scalar: {e}"))
            })?;
            crop = crop.with(key, value);
        }

        if crop.is_empty() {
            return Err(FlashError::InvalidInput("crop descriptor is empty".into()));
        }
        Ok(crop)
    }
}

/// One staged version of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Display filename
    pub name: NonEmptyText,

    /// MIME type as declared by the client
    #[serde(rename = "type")]
    pub mime_type: String,

    /// File inside the session directory holding this version's bytes.
    ///
    /// `None` only for an original placeholder recorded when a file was cropped before any
    /// bytes for it had been staged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmp_name: Option<Basename>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropDescriptor>,
}

impl UploadRecord {
    pub fn stored(name: NonEmptyText, mime_type: impl Into<String>, tmp_name: Basename) -> Self {
        Self {
            name,
            mime_type: mime_type.into(),
            tmp_name: Some(tmp_name),
            crop: None,
        }
    }

    pub fn placeholder(
        name: NonEmptyText,
        mime_type: impl Into<String>,
        crop: CropDescriptor,
    ) -> Self {
        Self {
            name,
            mime_type: mime_type.into(),
            tmp_name: None,
            crop: Some(crop),
        }
    }
}

/// An upload as received from the transport layer, before adoption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingUpload {
    /// Where the transport layer left the bytes
    pub tmp_path: PathBuf,
    /// Filename declared by the client
    pub filename: String,
    pub mime_type: String,
}

impl IncomingUpload {
    pub fn new(
        tmp_path: impl Into<PathBuf>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            tmp_path: tmp_path.into(),
            filename: filename.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// A current record as presented by the legacy flattened view, with `tmp_name` resolved to a
/// full path inside the session directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyUpload {
    pub name: NonEmptyText,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub tmp_name: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropDescriptor>,
}
