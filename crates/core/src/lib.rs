pub mod codec;
pub mod config;
pub mod domain;
pub mod enhance;
pub mod error;
pub mod files;
pub mod metadata;
pub mod photo;
pub mod preview;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use codec::{ImageCodec, RasterCodec};
use config::LibraryConfig;
use domain::{CropRect, MediaEvent};
use error::{Error, Result};
use files::EditLayout;
use metadata::{FileCheck, FileVerification, MetadataStore, ReconcileReport};
use photo::Photo;
use preview::PreviewCache;

/// Callback for reporting scan progress.
pub enum ScanProgress {
    /// Discovery finished; this many supported files will be looked at.
    Start { file_count: usize },
    /// A file has been loaded (or skipped because it is already loaded).
    FileProcessed { path: PathBuf },
}

/// Outcome of a [`Library::scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Photos loaded into memory by this scan.
    pub loaded: usize,
    /// Ids of photos that were new to the library.
    pub added: Vec<i64>,
    /// Files that could not be opened.
    pub failed: Vec<PathBuf>,
}

/// A directory of photos with its metadata store, preview cache and edit
/// state. The main entry point of the crate.
///
/// All photos are owned here; callers edit them through the id-based
/// methods so the store and the preview cache stay in step with each edit.
pub struct Library {
    root: PathBuf,
    layout: EditLayout,
    store: MetadataStore,
    previews: PreviewCache,
    codec: Arc<dyn ImageCodec>,
    config: LibraryConfig,
    photos: BTreeMap<i64, Photo>,
    ids: HashMap<PathBuf, i64>,
    events: Vec<MediaEvent>,
}

impl Library {
    /// Open the library rooted at `root`, creating its state directory on
    /// first use. Photos are not loaded until [`scan`](Self::scan).
    pub fn open(root: &Path) -> Result<Self> {
        Self::open_inner(root, None)
    }

    /// Open with a caller-supplied codec instead of the default one.
    pub fn open_with_codec(root: &Path, codec: Arc<dyn ImageCodec>) -> Result<Self> {
        Self::open_inner(root, Some(codec))
    }

    fn open_inner(root: &Path, codec: Option<Arc<dyn ImageCodec>>) -> Result<Self> {
        if !root.exists() {
            return Err(Error::LibraryNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(Error::LibraryNotDirectory(root.to_path_buf()));
        }
        let root = root.canonicalize()?;
        let layout = EditLayout::new(&root);
        layout.create_dirs()?;

        let store = MetadataStore::open(&layout.database())?;
        let config = LibraryConfig::load(&store)?;
        let codec =
            codec.unwrap_or_else(|| Arc::new(RasterCodec::new(config.jpeg_quality)));
        let previews = PreviewCache::new(&layout, config.preview_max_edge, codec.clone());

        let mut library = Self {
            root,
            layout,
            store,
            previews,
            codec,
            config,
            photos: BTreeMap::new(),
            ids: HashMap::new(),
            events: Vec::new(),
        };
        if library.config.verify_on_open {
            library.reconcile();
        }
        tracing::info!(
            root = %library.root.display(),
            rows = library.store.count_rows(),
            "opened library"
        );
        Ok(library)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> &EditLayout {
        &self.layout
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// Validate and persist a setting. Codec settings apply from the next
    /// open; a new preview size applies to previews generated from now on.
    pub fn set_config(&mut self, key: &str, value: &str) -> Result<()> {
        self.config.set(&self.store, key, value)?;
        if self.previews.max_edge() != self.config.preview_max_edge {
            self.previews =
                PreviewCache::new(&self.layout, self.config.preview_max_edge, self.codec.clone());
        }
        Ok(())
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Load every supported image directly inside the library root.
    ///
    /// Files without a metadata row get one, emit [`MediaEvent::Added`] and
    /// have their preview generated. Files that fail to open are reported
    /// and skipped.
    pub fn scan(&mut self, mut progress_cb: Option<&mut dyn FnMut(ScanProgress)>) -> Result<ScanReport> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if entry.file_type().is_file() && !hidden && codec::is_supported(entry.path()) {
                paths.push(entry.into_path());
            }
        }

        if let Some(ref mut cb) = progress_cb {
            cb(ScanProgress::Start {
                file_count: paths.len(),
            });
        }

        let mut report = ScanReport::default();
        for path in paths {
            if self.id_for(&path).is_none() {
                match self.load(&path) {
                    Ok((id, added)) => {
                        report.loaded += 1;
                        if added {
                            report.added.push(id);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(file = %path.display(), error = %err, "skipping unreadable photo");
                        report.failed.push(path.clone());
                    }
                }
            }
            if let Some(ref mut cb) = progress_cb {
                cb(ScanProgress::FileProcessed { path });
            }
        }

        tracing::info!(
            loaded = report.loaded,
            added = report.added.len(),
            failed = report.failed.len(),
            "scan complete"
        );
        Ok(report)
    }

    /// Open one photo and bring its metadata row up to date. Returns its id
    /// and whether the row was created.
    fn load(&mut self, path: &Path) -> Result<(i64, bool)> {
        let mut photo = Photo::open(path, &self.layout, self.codec.clone())?;
        let file = fs::metadata(path)?;
        let timestamp = DateTime::<Utc>::from(file.modified()?);
        let exposure = photo.exposure_date_time().map(|t| t.and_utc());

        let (id, added) = match self.store.id_for_file(path) {
            Some(id) => {
                if self.store.needs_migration(id) {
                    tracing::debug!(id, file = %path.display(), "repopulating legacy row");
                    self.store.update_row(
                        id,
                        path,
                        timestamp,
                        exposure,
                        photo.natural_orientation(),
                        file.len(),
                    );
                    self.store.set_orientation(id, photo.orientation());
                }
                if let Some(orientation) = self.store.get_orientation(id) {
                    photo.restore_orientation(orientation);
                }
                (id, false)
            }
            None => {
                let id = self
                    .store
                    .create_row(path, timestamp, exposure, photo.natural_orientation(), file.len())
                    .ok_or_else(|| Error::MetadataWrite(path.to_path_buf()))?;
                self.store.set_orientation(id, photo.orientation());
                (id, true)
            }
        };

        if self.store.get_size(id).is_none() {
            self.store.set_size(id, photo.size()?);
        }
        if added {
            if let Err(err) = self.previews.on_media_added(&photo) {
                tracing::warn!(id, error = %err, "failed to generate preview");
            }
            self.events.push(MediaEvent::Added { id });
        }
        self.ids.insert(path.to_path_buf(), id);
        self.photos.insert(id, photo);
        Ok((id, added))
    }

    // ── Photos ───────────────────────────────────────────────────────

    pub fn photo(&self, id: i64) -> Result<&Photo> {
        self.photos.get(&id).ok_or(Error::PhotoNotFound(id))
    }

    /// Loaded photos in id order.
    pub fn photos(&self) -> impl Iterator<Item = (i64, &Photo)> {
        self.photos.iter().map(|(id, photo)| (*id, photo))
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    /// Id of the loaded photo whose library file is `path`.
    pub fn id_for(&self, path: &Path) -> Option<i64> {
        self.ids.get(path).copied()
    }

    /// Drop a photo from the library and hand it back; its files stay on
    /// disk until [`Photo::delete_files`] is called.
    pub fn remove(&mut self, id: i64) -> Result<Photo> {
        let photo = self.photos.remove(&id).ok_or(Error::PhotoNotFound(id))?;
        self.ids.remove(photo.path());
        self.store.remove_row(id);
        self.forget_preview(id, photo.path());
        self.events.push(MediaEvent::Removed { id });
        Ok(photo)
    }

    // ── Editing ──────────────────────────────────────────────────────

    pub fn rotate_right(&mut self, id: i64) -> Result<()> {
        self.edit(id, |photo| {
            photo.rotate_right();
            Ok(())
        })
    }

    pub fn set_crop_rectangle(&mut self, id: i64, rect: Option<CropRect>) -> Result<()> {
        self.edit(id, |photo| {
            photo.set_crop_rectangle(rect);
            Ok(())
        })
    }

    pub fn crop(&mut self, id: i64, x: f64, y: f64, width: f64, height: f64) -> Result<bool> {
        self.edit(id, |photo| photo.crop(x, y, width, height))
    }

    pub fn auto_enhance(&mut self, id: i64) -> Result<()> {
        self.edit(id, Photo::auto_enhance)
    }

    pub fn revert_to_last_save_point(&mut self, id: i64) -> Result<bool> {
        self.edit(id, Photo::revert_to_last_save_point)
    }

    pub fn discard_last_save_point(&mut self, id: i64) -> Result<bool> {
        self.edit(id, Photo::discard_last_save_point)
    }

    pub fn discard_save_points(&mut self, id: i64) -> Result<usize> {
        self.edit(id, Photo::discard_save_points)
    }

    pub fn revert_to_original(&mut self, id: i64) -> Result<()> {
        self.edit(id, Photo::revert_to_original)
    }

    /// Run `op` on a photo, then persist whatever it changed.
    fn edit<T>(&mut self, id: i64, op: impl FnOnce(&mut Photo) -> Result<T>) -> Result<T> {
        let photo = self.photos.get_mut(&id).ok_or(Error::PhotoNotFound(id))?;
        let before = photo.edit_revision();
        let out = op(photo)?;
        if photo.edit_revision() != before {
            self.sync(id);
        }
        Ok(out)
    }

    /// Write an edited photo's state to the store, drop its stale preview
    /// and announce the change.
    fn sync(&mut self, id: i64) {
        let Some(photo) = self.photos.get(&id) else {
            return;
        };

        self.store.set_orientation(id, photo.orientation());
        match photo.size() {
            Ok(size) => self.store.set_size(id, size),
            Err(err) => tracing::warn!(id, error = %err, "could not read edited size"),
        }
        match fs::metadata(photo.path()).and_then(|m| Ok((m.modified()?, m.len()))) {
            Ok((modified, len)) => self.store.update_row(
                id,
                photo.path(),
                DateTime::<Utc>::from(modified),
                photo.exposure_date_time().map(|t| t.and_utc()),
                photo.natural_orientation(),
                len,
            ),
            Err(err) => tracing::warn!(id, error = %err, "could not stat edited photo"),
        }

        // Revision tags do not survive the process, so drop the file too
        self.previews.invalidate(photo.path());
        self.events.push(MediaEvent::Changed {
            id,
            revision: photo.edit_revision(),
        });
    }

    // ── Verification ─────────────────────────────────────────────────

    /// Drop every photo whose file has disappeared from disk.
    pub fn reconcile(&mut self) -> ReconcileReport {
        let report = self.store.reconcile_with_disk();
        for check in &report.removed {
            self.drop_missing(check.id, &check.filename);
        }
        report
    }

    /// Start an interruptible verification pass. Hand the checks of missing
    /// files to [`forget`](Self::forget) when done (or when stopping early).
    pub fn verify_files(&self) -> FileVerification {
        self.store.verify_files()
    }

    /// Remove rows (and loaded photos) for files found missing. Returns the
    /// number of rows deleted.
    pub fn forget(&mut self, missing: &[FileCheck]) -> usize {
        let ids: Vec<i64> = missing.iter().map(|check| check.id).collect();
        let removed = self.store.remove_rows(&ids);
        if removed > 0 {
            for check in missing {
                self.drop_missing(check.id, &check.filename);
            }
        }
        removed
    }

    /// Forget a photo whose file is gone, along with its edit state, so a
    /// later file reusing the name does not inherit it.
    fn drop_missing(&mut self, id: i64, path: &Path) {
        self.photos.remove(&id);
        self.ids.remove(path);
        self.forget_preview(id, path);
        if let Err(err) = Photo::discard_edit_state(&self.layout, path) {
            tracing::warn!(id, file = %path.display(), error = %err, "failed to discard edit state");
        }
        self.events.push(MediaEvent::Removed { id });
    }

    fn forget_preview(&mut self, id: i64, path: &Path) {
        if let Err(err) = self.previews.on_media_removed(path) {
            tracing::warn!(id, error = %err, "failed to delete preview");
        }
    }

    // ── Previews ─────────────────────────────────────────────────────

    /// The photo's preview, regenerated first if stale.
    pub fn preview(&mut self, id: i64) -> Result<PathBuf> {
        let photo = self.photos.get(&id).ok_or(Error::PhotoNotFound(id))?;
        self.previews.preview_file_for(photo)
    }

    /// Bring every loaded photo's preview up to date, one photo per step.
    /// Dropping the iterator early keeps the previews already written.
    pub fn warm_previews(&mut self) -> WarmPreviews<'_> {
        WarmPreviews {
            ids: self.photos.keys().copied().collect::<Vec<_>>().into_iter(),
            photos: &self.photos,
            previews: &mut self.previews,
        }
    }

    /// Events produced since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<MediaEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Iterator returned by [`Library::warm_previews`].
pub struct WarmPreviews<'a> {
    ids: std::vec::IntoIter<i64>,
    photos: &'a BTreeMap<i64, Photo>,
    previews: &'a mut PreviewCache,
}

impl Iterator for WarmPreviews<'_> {
    type Item = (i64, Result<PathBuf>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        let photo = self.photos.get(&id)?;
        Some((id, self.previews.preview_file_for(photo)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for WarmPreviews<'_> {}
