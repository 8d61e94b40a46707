//! Accepted upload media types.

use crate::error::ScanError;

/// Media types the service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Jpeg,
    Png,
    Heif,
    Webp,
    Tiff,
    Pdf,
}

impl MediaKind {
    /// Parse a MIME type. Parameters (`; charset=...`) and case are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/heic" | "image/heif" | "image/heic-sequence" | "image/heif-sequence" => {
                Some(Self::Heif)
            }
            "image/webp" => Some(Self::Webp),
            "image/tiff" | "image/x-tiff" => Some(Self::Tiff),
            "application/pdf" | "application/x-pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Guess from a file name extension.
    pub fn from_filename(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jpe" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "heic" | "heif" => Some(Self::Heif),
            "webp" => Some(Self::Webp),
            "tif" | "tiff" => Some(Self::Tiff),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Resolve the kind of an upload from its declared content type, falling
    /// back to the file name when the client sent no useful type.
    pub fn resolve(content_type: Option<&str>, filename: Option<&str>) -> Result<Self, ScanError> {
        let declared = content_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty() && !ct.eq_ignore_ascii_case("application/octet-stream"));

        match declared {
            Some(ct) => {
                Self::from_mime(ct).ok_or_else(|| ScanError::UnsupportedMediaType(ct.to_string()))
            }
            None => filename.and_then(Self::from_filename).ok_or_else(|| {
                ScanError::UnsupportedMediaType(
                    filename.unwrap_or("<unnamed upload>").to_string(),
                )
            }),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Heif => "heic",
            Self::Webp => "webp",
            Self::Tiff => "tiff",
            Self::Pdf => "pdf",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Heif => "image/heic",
            Self::Webp => "image/webp",
            Self::Tiff => "image/tiff",
            Self::Pdf => "application/pdf",
        }
    }

    /// Decoder format for the raster kinds the `image` crate can read.
    pub fn image_format(&self) -> Option<image::ImageFormat> {
        match self {
            Self::Jpeg => Some(image::ImageFormat::Jpeg),
            Self::Png => Some(image::ImageFormat::Png),
            Self::Webp => Some(image::ImageFormat::WebP),
            Self::Tiff => Some(image::ImageFormat::Tiff),
            Self::Heif | Self::Pdf => None,
        }
    }
}
