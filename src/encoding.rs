//! Still image encoding.
//!
//! [`ImageEncoder`] turns a [`GeneratedFrame`] into file bytes. The default
//! [`ImageCrateEncoder`] uses the [`image`] crate's codecs.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};

use crate::error::StillframeError;
use crate::media::GeneratedFrame;

/// Output image container for exported frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    /// Lossless PNG. This is the default.
    #[default]
    Png,
    /// Lossy JPEG; quality comes from [`EncodingSpec::jpeg_quality`].
    Jpeg,
    /// Uncompressed BMP.
    Bmp,
    /// TIFF.
    Tiff,
    /// Lossless WebP.
    WebP,
}

impl OutputFormat {
    /// File extension, without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Bmp => "bmp",
            OutputFormat::Tiff => "tiff",
            OutputFormat::WebP => "webp",
        }
    }

    /// Parse a format name or extension (`png`, `jpg`, `jpeg`, `bmp`,
    /// `tif`, `tiff`, `webp`), case-insensitively.
    pub fn from_extension(value: &str) -> Option<Self> {
        match value.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(OutputFormat::Png),
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            "bmp" => Some(OutputFormat::Bmp),
            "tif" | "tiff" => Some(OutputFormat::Tiff),
            "webp" => Some(OutputFormat::WebP),
            _ => None,
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Bmp => ImageFormat::Bmp,
            OutputFormat::Tiff => ImageFormat::Tiff,
            OutputFormat::WebP => ImageFormat::WebP,
        }
    }
}

/// How exported frames are encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct EncodingSpec {
    /// Output container.
    pub format: OutputFormat,
    /// JPEG quality, 1–100. Ignored by other formats.
    pub jpeg_quality: u8,
}

impl Default for EncodingSpec {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            jpeg_quality: 90,
        }
    }
}

impl EncodingSpec {
    /// Encoding in `format` with default quality.
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// Set the JPEG quality. Clamped to 1–100.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// File extension for this encoding.
    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }
}

/// Converts a decoded frame into encoded bytes.
pub trait ImageEncoder: Send + Sync {
    /// Encode `frame` according to `spec`.
    fn encode(&self, frame: &GeneratedFrame, spec: &EncodingSpec)
    -> Result<Vec<u8>, StillframeError>;
}

/// [`ImageEncoder`] backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateEncoder;

impl ImageEncoder for ImageCrateEncoder {
    fn encode(
        &self,
        frame: &GeneratedFrame,
        spec: &EncodingSpec,
    ) -> Result<Vec<u8>, StillframeError> {
        let mut bytes = Vec::new();
        match spec.format {
            OutputFormat::Jpeg => {
                // JPEG has no alpha channel.
                let rgb = DynamicImage::ImageRgb8(frame.image.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut bytes, spec.jpeg_quality);
                rgb.write_with_encoder(encoder)?;
            }
            OutputFormat::WebP => {
                let rgba = DynamicImage::ImageRgba8(frame.image.to_rgba8());
                rgba.write_to(&mut Cursor::new(&mut bytes), ImageFormat::WebP)?;
            }
            format => {
                frame
                    .image
                    .write_to(&mut Cursor::new(&mut bytes), format.image_format())?;
            }
        }
        Ok(bytes)
    }
}
