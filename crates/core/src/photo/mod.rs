mod save_point;

pub use save_point::{EditKind, SavePoint};

use std::cell::{Cell, OnceCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use image::DynamicImage;

use crate::codec::ImageCodec;
use crate::domain::{CropRect, Orientation};
use crate::error::{Error, Result};
use crate::files::{EditLayout, FileStore};

/// One managed image file and its non-destructive editing state.
///
/// The library file at `path` is the photo's stable key. Before the first
/// edit that writes it, a pristine copy is kept under the layout's
/// originals directory. Destructive edits push a [`SavePoint`] holding a
/// snapshot of the backing file so they can be reverted exactly.
///
/// Decoded metadata (dimensions, exposure time) is cached on the assumption
/// that nothing else writes the photo's files. A host that modifies them
/// behind the photo's back must reopen it.
pub struct Photo {
    path: PathBuf,
    layout: EditLayout,
    files: FileStore,
    codec: Arc<dyn ImageCodec>,
    original_file: PathBuf,
    identity: PathBuf,
    natural_orientation: Orientation,
    orientation: Orientation,
    crop: Option<CropRect>,
    edit_revision: u64,
    is_enhanced: bool,
    /// The library file was rewritten after the enhanced variant was derived
    /// from it (an enhanced crop was reverted).
    library_diverged: bool,
    save_points: Vec<SavePoint>,
    stored_size: Cell<Option<(u32, u32)>>,
    exposure: OnceCell<Option<NaiveDateTime>>,
}

impl std::fmt::Debug for Photo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Photo")
            .field("path", &self.path)
            .field("identity", &self.identity)
            .field("orientation", &self.orientation)
            .field("crop", &self.crop)
            .field("edit_revision", &self.edit_revision)
            .field("is_enhanced", &self.is_enhanced)
            .field("save_points", &self.save_points.len())
            .finish_non_exhaustive()
    }
}

impl Photo {
    /// Open a photo, recovering any editing state left on disk by an
    /// earlier session: a preserved original, an enhanced variant, and the
    /// save-point stack.
    pub fn open(path: &Path, layout: &EditLayout, codec: Arc<dyn ImageCodec>) -> Result<Self> {
        let files = FileStore;
        if !files.exists(path) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("photo does not exist: {}", path.display()),
            )));
        }

        let preserved = layout.original_for(path);
        let original_file = if files.exists(&preserved) {
            preserved
        } else {
            path.to_path_buf()
        };
        let natural_orientation = codec.probe(&original_file)?.orientation;
        let orientation = codec.probe(path)?.orientation;

        let enhanced = layout.enhanced_for(path);
        let is_enhanced = files.exists(&enhanced);
        let identity = if is_enhanced {
            enhanced
        } else {
            path.to_path_buf()
        };

        // A revert renames the snapshot in, keeping its older mtime
        let library_diverged = is_enhanced && modified(path) > modified(&identity);

        let save_points = save_point::load_stack(&layout.save_points_for(path))?;
        if !save_points.is_empty() {
            tracing::debug!(
                photo = %path.display(),
                count = save_points.len(),
                "recovered save points"
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            layout: layout.clone(),
            files,
            codec,
            original_file,
            identity,
            natural_orientation,
            orientation,
            crop: None,
            edit_revision: 0,
            is_enhanced,
            library_diverged,
            save_points,
            stored_size: Cell::new(None),
            exposure: OnceCell::new(),
        })
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// The library file this photo was discovered as.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file currently holding the photo's rendered content.
    pub fn identity(&self) -> &Path {
        &self.identity
    }

    pub fn original_file(&self) -> &Path {
        &self.original_file
    }

    /// The enhanced variant, if enhancement is applied and not reverted.
    pub fn enhanced_file(&self) -> Option<&Path> {
        self.is_enhanced.then_some(self.identity.as_path())
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Orientation of the original file as shot.
    pub fn natural_orientation(&self) -> Orientation {
        self.natural_orientation
    }

    /// Pending (not yet baked) crop, `None` for full frame.
    pub fn crop_rectangle(&self) -> Option<CropRect> {
        self.crop
    }

    pub fn edit_revision(&self) -> u64 {
        self.edit_revision
    }

    pub fn is_enhanced(&self) -> bool {
        self.is_enhanced
    }

    pub fn save_points(&self) -> &[SavePoint] {
        &self.save_points
    }

    /// Capture time from the original file's EXIF, read once.
    pub fn exposure_date_time(&self) -> Option<NaiveDateTime> {
        *self.exposure.get_or_init(|| {
            self.codec
                .probe(&self.original_file)
                .ok()
                .and_then(|info| info.exposure)
        })
    }

    /// Rendered dimensions: backing file, then orientation, then pending crop.
    pub fn size(&self) -> Result<(u32, u32)> {
        let stored = match self.stored_size.get() {
            Some(size) => size,
            None => {
                let info = self.codec.probe(&self.identity)?;
                let size = (info.width, info.height);
                self.stored_size.set(Some(size));
                size
            }
        };
        let (width, height) = self.orientation.oriented_size(stored);
        Ok(match self.crop {
            Some(rect) => {
                let (_, _, w, h) = rect.to_pixels(width, height);
                (w, h)
            }
            None => (width, height),
        })
    }

    /// Decode the pixels as they should be displayed.
    pub fn render(&self) -> Result<DynamicImage> {
        let stored = self.codec.decode(&self.identity, false)?;
        self.stored_size.set(Some((stored.width(), stored.height())));
        let oriented = self.orientation.apply(stored);
        Ok(match self.crop {
            Some(rect) => {
                let (x, y, w, h) = rect.to_pixels(oriented.width(), oriented.height());
                oriented.crop_imm(x, y, w, h)
            }
            None => oriented,
        })
    }

    // ── Edits ────────────────────────────────────────────────────────

    /// Turn the photo 90° clockwise. Orientation-only: no file is written
    /// and no save point is pushed.
    pub fn rotate_right(&mut self) {
        self.orientation = self.orientation.rotated_right();
        self.crop = self.crop.map(|rect| rect.rotated_right());
        self.bump_revision("rotate");
    }

    /// The rectangle an interactive crop should start from.
    pub fn prepare_for_cropping(&self) -> CropRect {
        self.crop.unwrap_or(CropRect::FULL)
    }

    /// Set or clear a pending crop applied at render time.
    pub fn set_crop_rectangle(&mut self, rect: Option<CropRect>) {
        let rect = rect.filter(|r| !r.is_full());
        if rect != self.crop {
            self.crop = rect;
            self.bump_revision("set crop");
        }
    }

    /// Crop to a rectangle given as fractions of the displayed image.
    /// Coordinates are clamped to the image; returns `Ok(false)` without
    /// touching anything when no area is left.
    pub fn crop(&mut self, x: f64, y: f64, width: f64, height: f64) -> Result<bool> {
        match CropRect::from_normalized(x, y, width, height) {
            Some(rect) => self.crop_rect(rect).map(|()| true),
            None => {
                tracing::debug!(photo = %self.path.display(), "rejected empty crop");
                Ok(false)
            }
        }
    }

    /// Bake `rect` into the library file. Orientation is baked too, so the
    /// photo is upright with no pending crop afterwards.
    pub fn crop_rect(&mut self, rect: CropRect) -> Result<()> {
        let oriented = self
            .orientation
            .apply(self.codec.decode(&self.identity, false)?);
        let (x, y, w, h) = rect.to_pixels(oriented.width(), oriented.height());
        let cropped = oriented.crop_imm(x, y, w, h);

        self.push_save_point(EditKind::Crop)?;
        let preserved = match self.preserve_original() {
            Ok(preserved) => preserved,
            Err(err) => {
                self.rollback_save_point();
                return Err(err);
            }
        };
        if let Err(err) = self.codec.encode(&cropped, &self.path) {
            self.rollback_save_point();
            if preserved {
                self.rollback_preserved_original();
            }
            return Err(err);
        }

        if self.is_enhanced {
            // The snapshot just taken holds the enhanced pixels
            self.remove_quietly(&self.layout.enhanced_for(&self.path));
        }
        self.identity = self.path.clone();
        self.is_enhanced = false;
        self.library_diverged = false;
        self.orientation = Orientation::Zero;
        self.crop = None;
        self.backing_changed();
        self.bump_revision("crop");
        Ok(())
    }

    /// Apply the automatic tonal adjustment, writing the enhanced variant.
    ///
    /// An enhanced photo is re-derived from its pre-enhance pixels instead of
    /// stacking adjustments, and right after an enhance no second save point
    /// is pushed. Those pixels are in the library file, which an enhance
    /// never writes. After a reverted crop left its output there, the
    /// pre-enhance snapshot is used instead.
    pub fn auto_enhance(&mut self) -> Result<()> {
        let reenhance = self.is_enhanced
            && self
                .save_points
                .last()
                .is_some_and(|sp| sp.kind == EditKind::Enhance);
        let source_file = match self.save_points.last() {
            _ if self.is_enhanced && !self.library_diverged => self.path.clone(),
            Some(sp) if reenhance => sp.snapshot_file.clone(),
            _ => self.identity.clone(),
        };

        let source = self.codec.decode(&source_file, false)?;
        let enhanced = self.codec.enhance(&source);

        if !reenhance {
            self.push_save_point(EditKind::Enhance)?;
        }
        let target = self.layout.enhanced_for(&self.path);
        if let Err(err) = self.codec.encode(&enhanced, &target) {
            if !reenhance {
                self.rollback_save_point();
            }
            return Err(err);
        }

        self.identity = target;
        self.is_enhanced = true;
        self.stored_size.set(Some((enhanced.width(), enhanced.height())));
        self.bump_revision("enhance");
        Ok(())
    }

    /// Undo the most recent crop or enhance. Returns `Ok(false)` when there
    /// is nothing to undo.
    pub fn revert_to_last_save_point(&mut self) -> Result<bool> {
        let Some(save_point) = self.save_points.last().cloned() else {
            return Ok(false);
        };
        if !self.files.exists(&save_point.snapshot_file) {
            return Err(Error::SnapshotMissing(save_point.snapshot_file));
        }

        let target = if save_point.enhance_performed {
            self.layout.enhanced_for(&self.path)
        } else {
            self.path.clone()
        };
        if target == self.original_file {
            // Never written since the snapshot, so the bytes already match
            self.files.remove(&save_point.snapshot_file)?;
        } else {
            self.files.rename(&save_point.snapshot_file, &target)?;
        }
        self.save_points.pop();

        if !save_point.enhance_performed && self.is_enhanced {
            self.remove_quietly(&self.layout.enhanced_for(&self.path));
        }
        if !save_point.enhance_performed {
            self.library_diverged = false;
        } else if save_point.kind == EditKind::Crop {
            // The library file keeps the crop output
            self.library_diverged = true;
        }
        self.identity = target;
        self.is_enhanced = save_point.enhance_performed;
        self.orientation = save_point.orientation;
        self.crop = save_point.crop;
        self.backing_changed();
        self.bump_revision("revert to save point");
        self.prune_save_point_dir();
        Ok(true)
    }

    /// Accept the most recent edit: drop its snapshot without restoring it.
    /// Returns `Ok(false)` when the stack is empty.
    pub fn discard_last_save_point(&mut self) -> Result<bool> {
        let Some(save_point) = self.save_points.last() else {
            return Ok(false);
        };
        self.files.remove(&save_point.snapshot_file)?;
        self.save_points.pop();
        self.prune_save_point_dir();
        Ok(true)
    }

    /// Accept every pending edit. Returns how many save points were dropped.
    pub fn discard_save_points(&mut self) -> Result<usize> {
        let mut count = 0;
        while self.discard_last_save_point()? {
            count += 1;
        }
        Ok(count)
    }

    /// Throw away every edit and restore the original file.
    ///
    /// Fails with [`Error::OriginalMissing`] if the original is gone; the
    /// photo is then unrecoverable and should be surfaced to the library
    /// owner.
    pub fn revert_to_original(&mut self) -> Result<()> {
        if !self.files.exists(&self.original_file) {
            tracing::error!(photo = %self.path.display(), "original file is missing");
            return Err(Error::OriginalMissing(self.original_file.clone()));
        }

        if self.original_file != self.path {
            self.files.rename(&self.original_file, &self.path)?;
            self.original_file = self.path.clone();
        }

        for save_point in self.save_points.drain(..) {
            if let Err(err) = self.files.remove(&save_point.snapshot_file) {
                tracing::warn!(
                    file = %save_point.snapshot_file.display(),
                    error = %err,
                    "failed to delete snapshot"
                );
            }
        }
        self.prune_save_point_dir();
        self.remove_quietly(&self.layout.enhanced_for(&self.path));

        self.identity = self.path.clone();
        self.is_enhanced = false;
        self.library_diverged = false;
        self.orientation = self.natural_orientation;
        self.crop = None;
        self.backing_changed();
        self.bump_revision("revert to original");
        Ok(())
    }

    /// Delete every file belonging to this photo, including the library
    /// file itself. Used after the photo has been removed from the library.
    pub fn delete_files(self) -> Result<()> {
        Self::discard_edit_state(&self.layout, &self.path)?;
        self.files.remove(&self.path)?;
        tracing::info!(photo = %self.path.display(), "deleted photo files");
        Ok(())
    }

    /// Delete the editing state kept for the library file `path`: snapshots,
    /// enhanced variant and preserved original. The library file itself is
    /// left alone. A later file with the same name then opens fresh.
    pub fn discard_edit_state(layout: &EditLayout, path: &Path) -> Result<()> {
        let files = FileStore;
        let dir = layout.save_points_for(path);
        if dir.is_dir() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    files.remove(&entry.path())?;
                }
            }
            fs::remove_dir(&dir)?;
        }
        let enhanced = files.remove(&layout.enhanced_for(path))?;
        let original = files.remove(&layout.original_for(path))?;
        tracing::debug!(photo = %path.display(), enhanced, original, "discarded edit state");
        Ok(())
    }

    /// Restore orientation persisted by an earlier session.
    pub(crate) fn restore_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }

    // ── Internals ────────────────────────────────────────────────────

    fn bump_revision(&mut self, op: &str) {
        self.edit_revision += 1;
        tracing::debug!(
            photo = %self.path.display(),
            revision = self.edit_revision,
            save_points = self.save_points.len(),
            op,
            "photo edited"
        );
    }

    fn backing_changed(&mut self) {
        self.stored_size.set(None);
        self.exposure = OnceCell::new();
    }

    /// Keep a pristine copy of the library file before it is first written.
    /// Returns whether the copy was made by this call.
    fn preserve_original(&mut self) -> Result<bool> {
        if self.original_file != self.path {
            return Ok(false);
        }
        let preserved = self.layout.original_for(&self.path);
        self.files.copy(&self.path, &preserved)?;
        tracing::debug!(photo = %self.path.display(), "preserved original");
        self.original_file = preserved;
        Ok(true)
    }

    /// Undo a preservation whose edit failed; the library file is untouched.
    fn rollback_preserved_original(&mut self) {
        self.remove_quietly(&self.original_file);
        self.original_file = self.path.clone();
    }

    fn push_save_point(&mut self, kind: EditKind) -> Result<()> {
        let extension = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = save_point::snapshot_name(
            self.save_points.len(),
            kind,
            self.orientation,
            self.is_enhanced,
            &extension,
        );
        let snapshot_file = self.layout.save_points_for(&self.path).join(name);
        self.files.copy(&self.identity, &snapshot_file)?;
        self.save_points.push(SavePoint {
            snapshot_file,
            enhance_performed: self.is_enhanced,
            kind,
            orientation: self.orientation,
            crop: self.crop,
        });
        Ok(())
    }

    /// Undo a push whose edit failed.
    fn rollback_save_point(&mut self) {
        if let Some(save_point) = self.save_points.pop() {
            self.remove_quietly(&save_point.snapshot_file);
        }
        self.prune_save_point_dir();
    }

    fn remove_quietly(&self, path: &Path) {
        if let Err(err) = self.files.remove(path) {
            tracing::warn!(file = %path.display(), error = %err, "failed to delete file");
        }
    }

    fn prune_save_point_dir(&self) {
        if self.save_points.is_empty() {
            // Fails harmlessly when the directory is missing or not empty
            let _ = fs::remove_dir(self.layout.save_points_for(&self.path));
        }
    }
}

fn modified(path: &Path) -> Option<std::time::SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
