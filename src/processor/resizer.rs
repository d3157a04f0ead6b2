use std::io::Cursor;

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use serde::Deserialize;

use crate::errors::TransformError;

/// Prefix prepended to the key of every resized object.
pub const RESIZED_PREFIX: &str = "resized-";

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResizeConfig {
    #[serde(default = "default_max_dimension")]
    /// The longest side of a resized image.
    ///
    /// Defaults to `100`.
    pub max_dimension: u32,

    #[serde(default = "default_jpeg_quality")]
    /// Quality used when re-encoding JPEGs, from 1 to 100.
    ///
    /// Defaults to `90`.
    pub jpeg_quality: u8,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl ResizeConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_dimension == 0 {
            anyhow::bail!("resize.max_dimension must be at least 1");
        }
        Ok(())
    }
}

const fn default_max_dimension() -> u32 {
    100
}

const fn default_jpeg_quality() -> u8 {
    90
}

/// The image types the resizer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    /// Infers the kind from the extension of an object key.
    pub fn from_key(key: &str) -> Result<Self, TransformError> {
        let (_, extension) = key.rsplit_once('.').ok_or_else(|| {
            TransformError::UnsupportedImageType(format!(
                "Unable to infer image type for key {}",
                key
            ))
        })?;

        match extension.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            _ => Err(TransformError::UnsupportedImageType(format!(
                "Skipping non-image {}",
                key
            ))),
        }
    }

    pub fn content_type(&self) -> mime::Mime {
        match self {
            Self::Png => mime::IMAGE_PNG,
            Self::Jpeg => mime::IMAGE_JPEG,
        }
    }

    fn output_format(&self, cfg: &ResizeConfig) -> ImageOutputFormat {
        match self {
            Self::Png => ImageOutputFormat::Png,
            Self::Jpeg => ImageOutputFormat::Jpeg(cfg.jpeg_quality.clamp(1, 100)),
        }
    }
}

pub struct ResizedImage {
    pub key: String,
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

#[inline]
pub fn resized_key(key: &str) -> String {
    format!("{}{}", RESIZED_PREFIX, key)
}

/// Scales `(width, height)` so the longest side becomes `max_dimension`.
///
/// Small images are scaled up as well. Each side is floored and kept at
/// least one pixel, a limit of zero is treated as one.
pub fn scaled_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let max_dimension = max_dimension.max(1);
    let max = max_dimension as f32;
    let scale = (max / width as f32).min(max / height as f32);

    let new_width = (scale * width as f32) as u32;
    let new_height = (scale * height as f32) as u32;

    (new_width.clamp(1, max_dimension), new_height.clamp(1, max_dimension))
}

/// Decodes `data`, scales it to fit `cfg.max_dimension` and re-encodes it in
/// the format implied by `key`.
pub fn resize(key: &str, data: &[u8], cfg: &ResizeConfig) -> Result<ResizedImage, TransformError> {
    let kind = ImageKind::from_key(key)?;

    if cfg.max_dimension == 0 {
        return Err(TransformError::EncodeError("max_dimension must be at least 1".to_string()));
    }

    let source = image::load_from_memory(data)
        .map_err(|e| TransformError::DecodeError(e.to_string()))?;

    if source.width() == 0 || source.height() == 0 {
        return Err(TransformError::DecodeError("image has no pixels".to_string()));
    }

    let (width, height) = scaled_dimensions(source.width(), source.height(), cfg.max_dimension);
    let rendered = render(&source, width, height);

    let mut buff = Cursor::new(Vec::new());
    rendered
        .write_to(&mut buff, kind.output_format(cfg))
        .map_err(|e| TransformError::EncodeError(e.to_string()))?;

    Ok(ResizedImage {
        key: resized_key(key),
        kind,
        width,
        height,
        data: Bytes::from(buff.into_inner()),
    })
}

/// Bilinear scale onto an opaque white canvas of exactly the target size.
fn render(source: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let scaled = imageops::resize(&source.to_rgba8(), width, height, FilterType::Triangle);

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut canvas, &scaled, 0, 0);

    DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
}
