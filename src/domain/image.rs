use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use strum::{Display, EnumString};
use thiserror::Error;

const DATA_URL_PREFIX: &str = "data:image/";
const ACCEPTED_SUBTYPES: [&str; 5] = ["png", "jpeg", "jpg", "gif", "webp"];

#[derive(Error, Debug, PartialEq)]
pub enum ImageError {
    #[error("Screenshot is required")]
    Missing,
    #[error("Unsupported data URL: {0}")]
    UnsupportedDataUrl(String),
    #[error("Payload is not valid base64")]
    InvalidBase64,
    #[error("Payload is not a recognizable image")]
    UnrecognizedFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum ImageFormat {
    #[strum(serialize = "image/png")]
    Png,
    #[strum(serialize = "image/jpeg")]
    Jpeg,
    #[strum(serialize = "image/gif")]
    Gif,
    #[strum(serialize = "image/webp")]
    Webp,
}

impl ImageFormat {
    /// Identifies the format from the file signature.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }

    pub fn media_type(&self) -> String {
        self.to_string()
    }
}

/// A validated screenshot payload: base64 data without the data-URL prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenshotImage {
    pub format: ImageFormat,
    pub data: String,
}

impl ScreenshotImage {
    pub fn parse(raw: &str) -> Result<Self, ImageError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ImageError::Missing);
        }

        let data = match raw.strip_prefix(DATA_URL_PREFIX) {
            Some(rest) => strip_data_url_header(rest)?,
            None => raw,
        };

        let bytes = BASE64.decode(data).map_err(|_| ImageError::InvalidBase64)?;
        let format = ImageFormat::sniff(&bytes).ok_or(ImageError::UnrecognizedFormat)?;

        Ok(Self {
            format,
            data: data.to_string(),
        })
    }
}

fn strip_data_url_header(rest: &str) -> Result<&str, ImageError> {
    let (subtype, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| ImageError::UnsupportedDataUrl(truncate(rest)))?;

    if !ACCEPTED_SUBTYPES.contains(&subtype) {
        return Err(ImageError::UnsupportedDataUrl(subtype.to_string()));
    }
    Ok(payload)
}

fn truncate(s: &str) -> String {
    s.chars().take(32).collect()
}
