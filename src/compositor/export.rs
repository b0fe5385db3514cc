//! Encoders for the composited raster

use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{Result, StudioError};

/// JPEG quality used for lossy export
pub const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
    Bmp,
    Gif,
    /// Uncompressed RGBA dump, row-major, no header
    Raw,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Bmp => "bmp",
            ExportFormat::Gif => "gif",
            ExportFormat::Raw => "rgba",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Bmp => "image/bmp",
            ExportFormat::Gif => "image/gif",
            ExportFormat::Raw => "application/octet-stream",
        }
    }

    /// Guess from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(ExportFormat::Png),
            "jpeg" | "jpg" => Ok(ExportFormat::Jpeg),
            "bmp" => Ok(ExportFormat::Bmp),
            "gif" => Ok(ExportFormat::Gif),
            "raw" | "rgba" => Ok(ExportFormat::Raw),
            _ => Err(StudioError::InvalidParameter {
                param: "format".to_string(),
                value: s.to_string(),
                expected: "png, jpeg, bmp, gif or raw".to_string(),
            }),
        }
    }
}

/// Encode a raster in the requested format
pub fn encode(raster: &RgbaImage, format: ExportFormat) -> Result<Vec<u8>> {
    let output = match format {
        ExportFormat::Raw => return Ok(raster.as_raw().clone()),
        ExportFormat::Png => ImageOutputFormat::Png,
        ExportFormat::Jpeg => ImageOutputFormat::Jpeg(JPEG_QUALITY),
        ExportFormat::Bmp => ImageOutputFormat::Bmp,
        ExportFormat::Gif => ImageOutputFormat::Gif,
    };

    let image = match format {
        // JPEG has no alpha channel
        ExportFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(raster.clone()).to_rgb8()),
        _ => DynamicImage::ImageRgba8(raster.clone()),
    };

    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, output).map_err(|e| StudioError::Encode {
        reason: format!("{} export failed: {}", format, e),
    })?;
    Ok(buffer.into_inner())
}

/// Encode and write to disk, returning the number of bytes written
pub fn export_to_file(raster: &RgbaImage, format: ExportFormat, path: &Path) -> Result<usize> {
    let bytes = encode(raster, format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &bytes)?;
    info!(path = %path.display(), format = %format, bytes = bytes.len(), "exported composition");
    Ok(bytes.len())
}

/// SHA-256 over dimensions and pixels, hex encoded
pub fn raster_digest(raster: &RgbaImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raster.width().to_le_bytes());
    hasher.update(raster.height().to_le_bytes());
    hasher.update(raster.as_raw());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::tempdir;
    use test_case::test_case;

    fn sample() -> RgbaImage {
        RgbaImage::from_fn(4, 3, |x, y| Rgba([x as u8 * 60, y as u8 * 80, 128, 255]))
    }

    #[test_case("png", ExportFormat::Png)]
    #[test_case("JPG", ExportFormat::Jpeg)]
    #[test_case("jpeg", ExportFormat::Jpeg)]
    #[test_case("bmp", ExportFormat::Bmp)]
    #[test_case("gif", ExportFormat::Gif)]
    #[test_case("raw", ExportFormat::Raw)]
    fn test_format_parse(input: &str, expected: ExportFormat) {
        assert_eq!(input.parse::<ExportFormat>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!("tiff".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_raw_dump_is_pixels() {
        let raster = sample();
        let bytes = encode(&raster, ExportFormat::Raw).unwrap();
        assert_eq!(bytes.len(), 4 * 3 * 4);
        assert_eq!(&bytes[..4], &[0, 0, 128, 255]);
    }

    #[test]
    fn test_png_is_lossless() {
        let raster = sample();
        let bytes = encode(&raster, ExportFormat::Png).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, raster);
    }

    #[test]
    fn test_lossy_and_indexed_formats_decode() {
        for format in [ExportFormat::Jpeg, ExportFormat::Bmp, ExportFormat::Gif] {
            let bytes = encode(&sample(), format).unwrap();
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (4, 3), "{}", format);
        }
    }

    #[test]
    fn test_export_to_file_creates_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("composition.png");
        let written = export_to_file(&sample(), ExportFormat::Png, &path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, written);
        assert_eq!(ExportFormat::from_path(&path), Some(ExportFormat::Png));
    }

    #[test]
    fn test_digest_tracks_content() {
        let a = sample();
        let mut b = sample();
        assert_eq!(raster_digest(&a), raster_digest(&b));
        b.put_pixel(0, 0, Rgba([1, 1, 1, 1]));
        assert_ne!(raster_digest(&a), raster_digest(&b));
        let digest = raster_digest(&a);
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
