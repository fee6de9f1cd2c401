use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Display orientation of a photo: the camera's EXIF orientation composed
/// with user rotations. Mirrored EXIF orientations are folded onto their
/// rotation component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Zero,
    Cw90,
    Cw180,
    Cw270,
}

impl Orientation {
    pub fn rotated_right(self) -> Self {
        match self {
            Self::Zero => Self::Cw90,
            Self::Cw90 => Self::Cw180,
            Self::Cw180 => Self::Cw270,
            Self::Cw270 => Self::Zero,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::Zero => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }

    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Self::Zero),
            90 => Some(Self::Cw90),
            180 => Some(Self::Cw180),
            270 => Some(Self::Cw270),
            _ => None,
        }
    }

    /// Map an EXIF orientation tag (1-8). Unknown values read as `Zero`.
    ///
    /// 1/2: upright, 3/4: 180°, 5/6: 90° CW, 7/8: 270° CW.
    pub fn from_exif(value: u32) -> Self {
        match value {
            3 | 4 => Self::Cw180,
            5 | 6 => Self::Cw90,
            7 | 8 => Self::Cw270,
            _ => Self::Zero,
        }
    }

    pub fn to_exif(self) -> u32 {
        match self {
            Self::Zero => 1,
            Self::Cw90 => 6,
            Self::Cw180 => 3,
            Self::Cw270 => 8,
        }
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Cw90 | Self::Cw270)
    }

    /// Rotate stored pixels into display orientation.
    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Self::Zero => image,
            Self::Cw90 => image.rotate90(),
            Self::Cw180 => image.rotate180(),
            Self::Cw270 => image.rotate270(),
        }
    }

    /// Display dimensions for stored dimensions `(width, height)`.
    pub fn oriented_size(self, (width, height): (u32, u32)) -> (u32, u32) {
        if self.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Fixed-point denominator for normalized crop coordinates. Integer
/// coordinates keep rotation exact: four right turns give back the same
/// rectangle bit for bit.
pub const CROP_UNIT: u32 = 1_000_000;

/// Crop rectangle in normalized coordinates, origin top-left, stored as
/// multiples of `1 / CROP_UNIT`. Always non-empty and inside the unit square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl CropRect {
    pub const FULL: Self = Self {
        x: 0,
        y: 0,
        width: CROP_UNIT,
        height: CROP_UNIT,
    };

    /// Build from fractions of the image size. Coordinates are clamped to
    /// `[0, 1]`; a rectangle with no area left after clamping is rejected.
    pub fn from_normalized(x: f64, y: f64, width: f64, height: f64) -> Option<Self> {
        if ![x, y, width, height].iter().all(|v| v.is_finite()) {
            return None;
        }
        let to_units = |v: f64| (v.clamp(0.0, 1.0) * CROP_UNIT as f64).round() as u32;
        let left = to_units(x);
        let top = to_units(y);
        let right = to_units(x + width);
        let bottom = to_units(y + height);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }

    pub fn x(&self) -> f64 {
        self.x as f64 / CROP_UNIT as f64
    }

    pub fn y(&self) -> f64 {
        self.y as f64 / CROP_UNIT as f64
    }

    pub fn width(&self) -> f64 {
        self.width as f64 / CROP_UNIT as f64
    }

    pub fn height(&self) -> f64 {
        self.height as f64 / CROP_UNIT as f64
    }

    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }

    /// The same physical region after the image turns 90° clockwise:
    /// `(x, y, w, h)` becomes `(1 - y - h, x, h, w)`.
    pub fn rotated_right(&self) -> Self {
        Self {
            x: CROP_UNIT - self.y - self.height,
            y: self.x,
            width: self.height,
            height: self.width,
        }
    }

    /// Pixel rectangle `(x, y, width, height)` inside an image of the given
    /// size. Never empty, never out of bounds.
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let scale = |units: u32, extent: u32| -> u32 {
            ((units as u64 * extent as u64 + CROP_UNIT as u64 / 2) / CROP_UNIT as u64) as u32
        };
        let left = scale(self.x, image_width).min(image_width.saturating_sub(1));
        let top = scale(self.y, image_height).min(image_height.saturating_sub(1));
        let right = scale(self.x + self.width, image_width).clamp(left + 1, image_width.max(1));
        let bottom = scale(self.y + self.height, image_height).clamp(top + 1, image_height.max(1));
        (left, top, right - left, bottom - top)
    }
}

impl Default for CropRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// Header-level facts about an image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
    pub exposure: Option<NaiveDateTime>,
}

/// One persisted metadata row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRow {
    pub id: i64,
    pub filename: PathBuf,
    /// `None` marks a row written by an older schema.
    pub timestamp: Option<DateTime<Utc>>,
    pub exposure_time: Option<DateTime<Utc>>,
    pub original_orientation: Orientation,
    pub orientation: Orientation,
    pub filesize: u64,
    pub size: Option<(u32, u32)>,
}

/// Library-level notifications, consumed by the preview cache and any UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    Added { id: i64 },
    Removed { id: i64 },
    Changed { id: i64, revision: u64 },
}
