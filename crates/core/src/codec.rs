use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDateTime;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};

use crate::domain::{ImageInfo, Orientation};
use crate::enhance;
use crate::error::{Error, Result};
use crate::files::FileStore;

/// Decodes image files into pixels and encodes pixels back to files.
///
/// Implementations must write through a temp file + rename so an
/// interrupted encode never replaces the destination with partial data.
pub trait ImageCodec: Send + Sync {
    /// Decode the stored pixels. With `respect_orientation` the file's
    /// embedded EXIF orientation is applied to the result.
    fn decode(&self, path: &Path, respect_orientation: bool) -> Result<DynamicImage>;

    /// Encode `image` to `path`, picking the format from the extension.
    fn encode(&self, image: &DynamicImage, path: &Path) -> Result<()>;

    /// Read dimensions, orientation and exposure time without decoding pixels.
    fn probe(&self, path: &Path) -> Result<ImageInfo>;

    /// Automatic tonal adjustment.
    fn enhance(&self, image: &DynamicImage) -> DynamicImage {
        enhance::auto_enhance(image)
    }
}

/// Whether `path` has an extension the default codec can round-trip.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            matches!(
                e.to_ascii_lowercase().as_str(),
                "jpg" | "jpeg" | "png" | "tif" | "tiff" | "webp"
            )
        })
}

/// `ImageCodec` backed by the `image` crate, with EXIF read by `kamadak-exif`.
#[derive(Debug, Clone)]
pub struct RasterCodec {
    jpeg_quality: u8,
    files: FileStore,
}

impl RasterCodec {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
            files: FileStore,
        }
    }
}

impl Default for RasterCodec {
    fn default() -> Self {
        Self::new(90)
    }
}

impl ImageCodec for RasterCodec {
    fn decode(&self, path: &Path, respect_orientation: bool) -> Result<DynamicImage> {
        let image = image::open(path)?;
        if respect_orientation {
            Ok(read_exif(path).orientation.apply(image))
        } else {
            Ok(image)
        }
    }

    fn encode(&self, image: &DynamicImage, path: &Path) -> Result<()> {
        let format =
            ImageFormat::from_path(path).map_err(|_| Error::UnsupportedFormat(path.to_path_buf()))?;
        self.files.write_atomic(path, |out| {
            if format == ImageFormat::Jpeg {
                // JPEG carries neither alpha nor 16-bit channels
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(out, self.jpeg_quality))?;
            } else {
                image.write_to(out, format)?;
            }
            Ok(())
        })
    }

    fn probe(&self, path: &Path) -> Result<ImageInfo> {
        let (width, height) = image::image_dimensions(path)?;
        let exif = read_exif(path);
        Ok(ImageInfo {
            width,
            height,
            orientation: exif.orientation,
            exposure: exif.exposure,
        })
    }
}

struct ExifFacts {
    orientation: Orientation,
    exposure: Option<NaiveDateTime>,
}

/// Orientation and capture time from EXIF. Missing or unreadable EXIF
/// yields an upright orientation and no exposure time.
fn read_exif(path: &Path) -> ExifFacts {
    let read = || -> Option<exif::Exif> {
        let file = std::fs::File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        exif::Reader::new().read_from_container(&mut reader).ok()
    };
    let Some(exif) = read() else {
        return ExifFacts {
            orientation: Orientation::Zero,
            exposure: None,
        };
    };

    let orientation = exif
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .map(Orientation::from_exif)
        .unwrap_or_default();

    let exposure = [exif::Tag::DateTimeOriginal, exif::Tag::DateTime]
        .iter()
        .filter_map(|tag| exif.get_field(*tag, exif::In::PRIMARY))
        .find_map(|f| parse_exif_datetime(&f.display_value().to_string()));

    ExifFacts {
        orientation,
        exposure,
    }
}

/// Accepts both "2024-01-15 12:00:00" (display_value) and "2024:01:15 12:00:00" (raw).
fn parse_exif_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim().trim_matches('"');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y:%m:%d %H:%M:%S"))
        .ok()
}
