use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use fast_image_resize::{self as fir, images::Image as FirImage};
use image::{DynamicImage, RgbImage};

use crate::codec::ImageCodec;
use crate::error::{Error, Result};
use crate::files::{EditLayout, FileStore};
use crate::photo::Photo;

/// Longest edge of a preview unless configured otherwise.
pub const DEFAULT_MAX_EDGE: u32 = 360;

/// Bounded-resolution renditions of photos, one JPEG per library file.
///
/// Previews are tagged with the edit revision they were rendered at. A
/// preview with no recorded revision (written by an earlier process) is
/// trusted only if it is newer than the photo's backing file.
pub struct PreviewCache {
    layout: EditLayout,
    max_edge: u32,
    codec: Arc<dyn ImageCodec>,
    files: FileStore,
    revisions: HashMap<PathBuf, u64>,
}

impl PreviewCache {
    /// `max_edge` is clamped to `1..=DEFAULT_MAX_EDGE`.
    pub fn new(layout: &EditLayout, max_edge: u32, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            layout: layout.clone(),
            max_edge: max_edge.clamp(1, DEFAULT_MAX_EDGE),
            codec,
            files: FileStore,
            revisions: HashMap::new(),
        }
    }

    pub fn max_edge(&self) -> u32 {
        self.max_edge
    }

    /// Return the preview for `photo`, regenerating it first if it is
    /// missing or stale.
    pub fn preview_file_for(&mut self, photo: &Photo) -> Result<PathBuf> {
        let file = self.layout.preview_for(photo.path());
        if self.is_stale(photo) {
            self.generate(photo, &file)?;
        }
        Ok(file)
    }

    pub fn is_stale(&self, photo: &Photo) -> bool {
        let file = self.layout.preview_for(photo.path());
        if !self.files.exists(&file) {
            return true;
        }
        match self.revisions.get(photo.path()) {
            Some(&revision) => revision != photo.edit_revision(),
            None => match (modified(&file), modified(photo.identity())) {
                (Some(preview), Some(backing)) => preview < backing,
                _ => true,
            },
        }
    }

    /// A photo joined the library.
    pub fn on_media_added(&mut self, photo: &Photo) -> Result<PathBuf> {
        self.preview_file_for(photo)
    }

    /// A photo left the library: drop its preview. Returns whether a cached
    /// file was deleted.
    pub fn on_media_removed(&mut self, path: &Path) -> Result<bool> {
        self.revisions.remove(path);
        self.files.remove(&self.layout.preview_for(path))
    }

    /// Forget the cached preview for `path` so the next access regenerates
    /// it. Used when an edit is persisted in a way a later process could not
    /// detect from file times alone (rotation).
    pub fn invalidate(&mut self, path: &Path) {
        self.revisions.remove(path);
        if let Err(err) = self.files.remove(&self.layout.preview_for(path)) {
            tracing::warn!(photo = %path.display(), error = %err, "failed to drop preview");
        }
    }

    fn generate(&mut self, photo: &Photo, file: &Path) -> Result<()> {
        let rendered = photo.render()?;
        let preview = downscale(&rendered, self.max_edge)?;
        self.codec.encode(&preview, file)?;
        self.revisions
            .insert(photo.path().to_path_buf(), photo.edit_revision());
        tracing::debug!(
            photo = %photo.path().display(),
            revision = photo.edit_revision(),
            width = preview.width(),
            height = preview.height(),
            "generated preview"
        );
        Ok(())
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Fit `(width, height)` inside a `max_edge` square keeping the aspect
/// ratio. Never upscales and never returns a zero dimension.
pub fn bounded_size(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_edge {
        return (width.max(1), height.max(1));
    }
    let scale = |v: u32| ((v as u64 * max_edge as u64 + longest as u64 / 2) / longest as u64).max(1) as u32;
    (scale(width), scale(height))
}

/// Resize to fit `max_edge` with fast_image_resize. Output is RGB8.
pub fn downscale(image: &DynamicImage, max_edge: u32) -> Result<DynamicImage> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let (dst_width, dst_height) = bounded_size(width, height, max_edge);
    if (dst_width, dst_height) == (width, height) {
        return Ok(DynamicImage::ImageRgb8(rgb));
    }

    let src = FirImage::from_vec_u8(width, height, rgb.into_raw(), fir::PixelType::U8x3)
        .map_err(|e| Error::Resize(e.to_string()))?;
    let mut dst = FirImage::new(dst_width, dst_height, fir::PixelType::U8x3);
    fir::Resizer::new()
        .resize(&src, &mut dst, None)
        .map_err(|e| Error::Resize(e.to_string()))?;

    let buffer = RgbImage::from_raw(dst_width, dst_height, dst.into_vec())
        .ok_or_else(|| Error::Resize("resized buffer has the wrong length".to_string()))?;
    Ok(DynamicImage::ImageRgb8(buffer))
}
