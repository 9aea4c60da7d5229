//! Parsing of base64 `data:` URIs.

use crate::error::{DekovizError, Result};
use crate::image::types::ImageFile;
use base64::Engine;
use std::str::FromStr;

/// A decoded `data:<mime>;base64,<body>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    /// MIME type from the header segment.
    pub mime_type: String,
    /// Decoded body.
    pub data: Vec<u8>,
}

impl DataUri {
    /// Parses a data URI.
    ///
    /// The header must name a MIME type (`type/subtype`) followed by at least
    /// one `;` parameter, and the body must be base64.
    pub fn parse(uri: &str) -> Result<Self> {
        let (header, body) = uri
            .split_once(',')
            .ok_or_else(|| DekovizError::InvalidDataUri("missing ',' separator".into()))?;

        let header = header
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| DekovizError::InvalidDataUri("missing 'data:' scheme".into()))?;

        let (mime_type, params) = header
            .split_once(';')
            .ok_or_else(|| DekovizError::InvalidDataUri("missing MIME type".into()))?;

        let mime_type = mime_type.trim();
        if mime_type.is_empty() || !mime_type.contains('/') {
            return Err(DekovizError::InvalidDataUri("missing MIME type".into()));
        }

        if !params.split(';').any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(DekovizError::InvalidDataUri(
                "only base64-encoded bodies are supported".into(),
            ));
        }

        let data = decode_base64_lenient(body).map_err(|e| DekovizError::Decode(e.to_string()))?;

        Ok(Self {
            mime_type: mime_type.to_string(),
            data,
        })
    }

    /// Converts the URI into a named file.
    pub fn into_file(self, name: impl Into<String>) -> ImageFile {
        ImageFile::new(name, self.mime_type, self.data)
    }
}

impl FromStr for DataUri {
    type Err = DekovizError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Decodes base64 that may contain whitespace or lack padding.
fn decode_base64_lenient(input: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let cleaned: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    if let Ok(data) = base64::engine::general_purpose::STANDARD.decode(&cleaned) {
        return Ok(data);
    }

    base64::engine::general_purpose::STANDARD_NO_PAD.decode(&cleaned)
}
