//! Accepted source formats
//!
//! Uploads are classified by their leading byte signature only. The table
//! below is the single place that decides what may be stored and what each
//! format can do; anything not listed is `Unsupported`.

use image::ImageFormat;

use crate::core::error::{Result, VaultError};

/// Classification of an uploaded byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Unsupported,
}

struct Capability {
    image_format: ImageFormat,
    source: SourceFormat,
    mime_type: &'static str,
    may_animate: bool,
}

const CAPABILITIES: &[Capability] = &[
    Capability {
        image_format: ImageFormat::Jpeg,
        source: SourceFormat::Jpeg,
        mime_type: "image/jpeg",
        may_animate: false,
    },
    Capability {
        image_format: ImageFormat::Png,
        source: SourceFormat::Png,
        mime_type: "image/png",
        may_animate: true,
    },
    Capability {
        image_format: ImageFormat::Gif,
        source: SourceFormat::Gif,
        mime_type: "image/gif",
        may_animate: true,
    },
    Capability {
        image_format: ImageFormat::Bmp,
        source: SourceFormat::Bmp,
        mime_type: "image/bmp",
        may_animate: false,
    },
];

impl SourceFormat {
    /// Classify bytes by signature
    pub fn sniff(bytes: &[u8]) -> Self {
        image::guess_format(bytes)
            .ok()
            .and_then(|detected| CAPABILITIES.iter().find(|c| c.image_format == detected))
            .map(|c| c.source)
            .unwrap_or(SourceFormat::Unsupported)
    }

    /// Classify bytes, refusing anything outside the table
    pub fn require(bytes: &[u8]) -> Result<Self> {
        match Self::sniff(bytes) {
            SourceFormat::Unsupported => Err(VaultError::InvalidContentType {
                detected: describe(bytes),
            }),
            format => Ok(format),
        }
    }

    fn capability(&self) -> Option<&'static Capability> {
        CAPABILITIES.iter().find(|c| c.source == *self)
    }

    pub fn is_supported(&self) -> bool {
        self.capability().is_some()
    }

    pub fn image_format(&self) -> Option<ImageFormat> {
        self.capability().map(|c| c.image_format)
    }

    pub fn mime_type(&self) -> &'static str {
        self.capability()
            .map(|c| c.mime_type)
            .unwrap_or("application/octet-stream")
    }

    /// Whether the container can hold more than one frame
    pub fn may_animate(&self) -> bool {
        self.capability().map(|c| c.may_animate).unwrap_or(false)
    }
}

/// Best-effort name for a rejected signature
fn describe(bytes: &[u8]) -> String {
    match image::guess_format(bytes) {
        Ok(format) => format.to_mime_type().to_string(),
        Err(_) => "unknown".to_string(),
    }
}
