use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::DynamicImage;
use keepsake_core::codec::{ImageCodec, RasterCodec};
use keepsake_core::domain::{ImageInfo, MediaEvent, Orientation};
use keepsake_core::error::{Error, Result};
use keepsake_core::{Library, ScanProgress};

/// A PNG whose pixels encode their own coordinates, seeded by `seed`.
fn create_png(path: &Path, width: u32, height: u32, seed: u8) {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            seed.wrapping_add((x * 5) as u8),
            seed.wrapping_add((y * 9) as u8),
            ((x + y) * 3) as u8,
        ])
    });
    img.save(path).unwrap();
}

/// Open a library over a temp dir holding `names` as 40x20 PNGs, scanned.
fn library_with(names: &[&str]) -> (tempfile::TempDir, Library) {
    let tmp = tempfile::tempdir().unwrap();
    for (i, name) in names.iter().enumerate() {
        create_png(&tmp.path().join(name), 40, 20, i as u8 * 40);
    }
    let mut library = Library::open(tmp.path()).unwrap();
    library.scan(None).unwrap();
    (tmp, library)
}

fn id_of(library: &Library, name: &str) -> i64 {
    library.id_for(&library.root().join(name)).unwrap()
}

fn pixels(library: &Library, id: i64) -> image::RgbImage {
    library.photo(id).unwrap().render().unwrap().to_rgb8()
}

/// Counts decodes so tests can tell cache hits from regenerations.
#[derive(Default)]
struct CountingCodec {
    inner: RasterCodec,
    decodes: AtomicUsize,
}

impl ImageCodec for CountingCodec {
    fn decode(&self, path: &Path, respect_orientation: bool) -> Result<DynamicImage> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(path, respect_orientation)
    }
    fn encode(&self, image: &DynamicImage, path: &Path) -> Result<()> {
        self.inner.encode(image, path)
    }
    fn probe(&self, path: &Path) -> Result<ImageInfo> {
        self.inner.probe(path)
    }
}

// ── Library::open ────────────────────────────────────────────────

#[test]
fn test_open_creates_state_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let library = Library::open(tmp.path()).unwrap();
    assert!(library.layout().database().exists());
    assert!(library.layout().previews_dir().is_dir());
    assert!(library.is_empty());
}

#[test]
fn test_open_nonexistent_path() {
    let err = Library::open(Path::new("/nonexistent/pictures")).err().unwrap();
    assert!(matches!(err, Error::LibraryNotFound(_)));
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn test_open_file_not_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("file.txt");
    fs::write(&file, b"not a dir").unwrap();
    let err = Library::open(&file).err().unwrap();
    assert!(err.to_string().contains("not a directory"));
}

// ── Scan ─────────────────────────────────────────────────────────

#[test]
fn test_scan_adds_supported_files_only() {
    let tmp = tempfile::tempdir().unwrap();
    create_png(&tmp.path().join("a.png"), 40, 20, 0);
    create_png(&tmp.path().join("b.png"), 30, 30, 50);
    fs::write(tmp.path().join("notes.txt"), b"hello").unwrap();
    fs::create_dir(tmp.path().join("nested")).unwrap();
    create_png(&tmp.path().join("nested/c.png"), 10, 10, 0);

    let mut library = Library::open(tmp.path()).unwrap();
    let report = library.scan(None).unwrap();

    assert_eq!(report.loaded, 2);
    assert_eq!(report.added.len(), 2);
    assert!(report.failed.is_empty());
    assert_eq!(library.len(), 2);

    let events = library.take_events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| matches!(e, MediaEvent::Added { .. })));
    assert!(library.take_events().is_empty());

    let a = id_of(&library, "a.png");
    assert_eq!(library.store().get_size(a), Some((40, 20)));
    assert!(library.store().get_file_timestamp(a).is_some());
    assert_eq!(library.store().get_orientation(a), Some(Orientation::Zero));

    // Previews are generated for new photos
    let preview = library.layout().preview_for(library.photo(a).unwrap().path());
    assert!(preview.exists());
}

#[test]
fn test_rescan_is_noop() {
    let (_tmp, mut library) = library_with(&["a.png", "b.png"]);
    library.take_events();

    let report = library.scan(None).unwrap();
    assert_eq!(report.loaded, 0);
    assert!(report.added.is_empty());
    assert!(library.take_events().is_empty());
}

#[test]
fn test_scan_reports_progress() {
    let tmp = tempfile::tempdir().unwrap();
    create_png(&tmp.path().join("a.png"), 8, 8, 0);
    create_png(&tmp.path().join("b.png"), 8, 8, 1);
    let mut library = Library::open(tmp.path()).unwrap();

    let mut started = None;
    let mut processed = Vec::new();
    let mut cb = |p: ScanProgress| match p {
        ScanProgress::Start { file_count } => started = Some(file_count),
        ScanProgress::FileProcessed { path } => processed.push(path),
    };
    library.scan(Some(&mut cb)).unwrap();

    assert_eq!(started, Some(2));
    assert_eq!(processed.len(), 2);
}

#[test]
fn test_scan_skips_unreadable_file() {
    let tmp = tempfile::tempdir().unwrap();
    create_png(&tmp.path().join("good.png"), 8, 8, 0);
    fs::write(tmp.path().join("broken.jpg"), b"not really a jpeg").unwrap();

    let mut library = Library::open(tmp.path()).unwrap();
    let report = library.scan(None).unwrap();
    assert_eq!(report.loaded, 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].ends_with("broken.jpg"));
}

#[test]
fn test_scan_repopulates_legacy_rows() {
    let tmp = tempfile::tempdir().unwrap();
    create_png(&tmp.path().join("old.png"), 40, 20, 0);
    let root = tmp.path().canonicalize().unwrap();
    let old = root.join("old.png");

    // A database from before timestamps and sizes were recorded
    let state = root.join(".keepsake");
    fs::create_dir_all(&state).unwrap();
    {
        let conn = rusqlite::Connection::open(state.join("library.sqlite")).unwrap();
        conn.execute_batch(
            "CREATE TABLE media (id INTEGER PRIMARY KEY AUTOINCREMENT, filename TEXT NOT NULL UNIQUE);",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO media (filename) VALUES (?1)",
            [old.to_string_lossy().as_ref()],
        )
        .unwrap();
    }

    let mut library = Library::open(&root).unwrap();
    let id = library.store().id_for_file(&old).unwrap();
    assert!(library.store().needs_migration(id));

    let report = library.scan(None).unwrap();
    assert!(report.added.is_empty(), "existing row is reused");
    assert!(!library.store().needs_migration(id));
    assert_eq!(library.store().get_size(id), Some((40, 20)));
    assert_eq!(library.id_for(&old), Some(id));
}

// ── Editing ──────────────────────────────────────────────────────

#[test]
fn test_rotate_crop_revert_revisions() {
    let (_tmp, mut library) = library_with(&["a.png"]);
    let id = id_of(&library, "a.png");
    library.take_events();

    library.rotate_right(id).unwrap();
    assert_eq!(library.photo(id).unwrap().edit_revision(), 1);
    assert_eq!(library.photo(id).unwrap().save_points().len(), 0);
    assert_eq!(library.store().get_orientation(id), Some(Orientation::Cw90));
    assert_eq!(library.store().get_size(id), Some((20, 40)));

    assert!(library.crop(id, 0.0, 0.0, 1.0, 0.5).unwrap());
    let photo = library.photo(id).unwrap();
    assert_eq!(photo.edit_revision(), 2);
    assert_eq!(photo.save_points().len(), 1);
    assert_eq!(library.store().get_size(id), Some((20, 20)));
    assert_eq!(library.store().get_orientation(id), Some(Orientation::Zero));

    assert!(library.revert_to_last_save_point(id).unwrap());
    let photo = library.photo(id).unwrap();
    assert_eq!(photo.edit_revision(), 3);
    assert!(photo.save_points().is_empty());
    assert_eq!(photo.orientation(), Orientation::Cw90);
    assert_eq!(library.store().get_size(id), Some((20, 40)));

    let revisions: Vec<u64> = library
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            MediaEvent::Changed { id: changed, revision } if changed == id => Some(revision),
            _ => None,
        })
        .collect();
    assert_eq!(revisions, vec![1, 2, 3]);
}

#[test]
fn test_noop_edits_emit_nothing() {
    let (_tmp, mut library) = library_with(&["a.png"]);
    let id = id_of(&library, "a.png");
    library.take_events();

    assert!(!library.crop(id, 0.2, 0.2, 0.0, 0.0).unwrap());
    assert!(!library.revert_to_last_save_point(id).unwrap());
    assert!(!library.discard_last_save_point(id).unwrap());
    assert_eq!(library.photo(id).unwrap().edit_revision(), 0);
    assert!(library.take_events().is_empty());
}

#[test]
fn test_unknown_id_is_not_found() {
    let (_tmp, mut library) = library_with(&["a.png"]);
    assert!(matches!(library.rotate_right(999), Err(Error::PhotoNotFound(999))));
    assert!(library.photo(999).is_err());
    assert!(library.preview(999).is_err());
}

#[test]
fn test_enhance_twice_then_revert() {
    let (_tmp, mut library) = library_with(&["a.png"]);
    let id = id_of(&library, "a.png");
    let path = library.photo(id).unwrap().path().to_path_buf();
    let original = fs::read(&path).unwrap();

    library.auto_enhance(id).unwrap();
    library.auto_enhance(id).unwrap();
    let photo = library.photo(id).unwrap();
    assert!(photo.is_enhanced());
    assert_eq!(photo.save_points().len(), 1);
    assert_eq!(photo.edit_revision(), 2);
    assert_eq!(photo.identity(), library.layout().enhanced_for(&path));

    assert!(library.revert_to_last_save_point(id).unwrap());
    let photo = library.photo(id).unwrap();
    assert!(!photo.is_enhanced());
    assert_eq!(photo.identity(), path);
    assert_eq!(fs::read(&path).unwrap(), original);
}

#[test]
fn test_commit_keeps_edit_and_drops_snapshots() {
    let (_tmp, mut library) = library_with(&["a.png"]);
    let id = id_of(&library, "a.png");
    library.crop(id, 0.0, 0.0, 0.5, 0.5).unwrap();
    library.auto_enhance(id).unwrap();

    assert_eq!(library.discard_save_points(id).unwrap(), 2);
    let photo = library.photo(id).unwrap();
    assert!(photo.save_points().is_empty());
    assert!(photo.is_enhanced());
    assert_eq!(photo.size().unwrap(), (20, 10));
    assert!(!library.revert_to_last_save_point(id).unwrap());
}

/// Replays a deterministic pseudo-random edit sequence; `revert_to_original`
/// must always land on the original bytes.
#[test]
fn test_revert_to_original_after_any_history() {
    for seed in 1..=6u32 {
        let (_tmp, mut library) = library_with(&["a.png"]);
        let id = id_of(&library, "a.png");
        let path = library.photo(id).unwrap().path().to_path_buf();
        let original = fs::read(&path).unwrap();

        let mut state = seed;
        for _ in 0..8 {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            match (state >> 16) % 5 {
                0 => library.rotate_right(id).unwrap(),
                1 => {
                    library.crop(id, 0.1, 0.2, 0.7, 0.6).unwrap();
                }
                2 => library.auto_enhance(id).unwrap(),
                3 => {
                    library.revert_to_last_save_point(id).unwrap();
                }
                _ => {
                    library.discard_last_save_point(id).unwrap();
                }
            }
        }

        library.revert_to_original(id).unwrap();
        let photo = library.photo(id).unwrap();
        assert_eq!(fs::read(&path).unwrap(), original, "seed {seed}");
        assert!(photo.save_points().is_empty());
        assert!(!photo.is_enhanced());
        assert_eq!(photo.crop_rectangle(), None);
        assert_eq!(photo.orientation(), photo.natural_orientation());
        assert_eq!(library.store().get_size(id), Some((40, 20)));
    }
}

/// Each revert restores exactly the state captured before the matching edit.
#[test]
fn test_reverts_unwind_stack_in_order() {
    let (_tmp, mut library) = library_with(&["a.png"]);
    let id = id_of(&library, "a.png");

    let snapshot = |library: &Library| {
        let photo = library.photo(id).unwrap();
        (pixels(library, id), photo.orientation(), photo.is_enhanced())
    };

    let mut before = Vec::new();
    library.rotate_right(id).unwrap();
    before.push(snapshot(&library));
    library.crop(id, 0.1, 0.1, 0.8, 0.6).unwrap();
    before.push(snapshot(&library));
    library.auto_enhance(id).unwrap();
    library.rotate_right(id).unwrap();
    before.push(snapshot(&library));
    library.crop(id, 0.0, 0.25, 1.0, 0.5).unwrap();
    before.push(snapshot(&library));
    library.auto_enhance(id).unwrap();

    assert_eq!(library.photo(id).unwrap().save_points().len(), 4);
    while let Some(expected) = before.pop() {
        assert!(library.revert_to_last_save_point(id).unwrap());
        assert_eq!(snapshot(&library), expected);
    }
    assert!(!library.revert_to_last_save_point(id).unwrap());
}

#[test]
fn test_missing_original_is_fatal() {
    let (_tmp, mut library) = library_with(&["a.png"]);
    let id = id_of(&library, "a.png");
    library.crop(id, 0.0, 0.0, 0.5, 0.5).unwrap();
    let preserved = library.photo(id).unwrap().original_file().to_path_buf();
    fs::remove_file(preserved).unwrap();

    let err = library.revert_to_original(id).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(library.photo(id).unwrap().save_points().len(), 1);
}

// ── Restart ──────────────────────────────────────────────────────

#[test]
fn test_reopen_restores_edit_state() {
    let tmp = tempfile::tempdir().unwrap();
    create_png(&tmp.path().join("a.png"), 40, 20, 0);
    {
        let mut library = Library::open(tmp.path()).unwrap();
        library.scan(None).unwrap();
        let id = id_of(&library, "a.png");
        library.rotate_right(id).unwrap();
        library.crop(id, 0.0, 0.0, 1.0, 0.5).unwrap();
        library.rotate_right(id).unwrap();
    }

    let mut library = Library::open(tmp.path()).unwrap();
    let report = library.scan(None).unwrap();
    assert!(report.added.is_empty());
    let id = id_of(&library, "a.png");
    let photo = library.photo(id).unwrap();
    assert_eq!(photo.orientation(), Orientation::Cw90);
    assert_eq!(photo.save_points().len(), 1);
    assert_eq!(photo.edit_revision(), 0);

    assert!(library.revert_to_last_save_point(id).unwrap());
    let photo = library.photo(id).unwrap();
    assert_eq!(photo.orientation(), Orientation::Cw90);
    assert_eq!(photo.size().unwrap(), (20, 40));
}

#[test]
fn test_config_persists_across_open() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let mut library = Library::open(tmp.path()).unwrap();
        library.set_config("preview_max_edge", "16").unwrap();
        assert!(library.set_config("jpeg_quality", "0").is_err());
        let err = library.set_config("preview_max_edge", "1200").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }
    let library = Library::open(tmp.path()).unwrap();
    assert_eq!(library.config().preview_max_edge, 16);
    assert_eq!(library.config().jpeg_quality, 90);
}

// ── Verification ─────────────────────────────────────────────────

#[test]
fn test_reconcile_drops_missing_files() {
    let (_tmp, mut library) = library_with(&["a.png", "b.png", "c.png"]);
    let b = id_of(&library, "b.png");
    let b_path = library.photo(b).unwrap().path().to_path_buf();
    let b_preview = library.layout().preview_for(&b_path);
    assert!(b_preview.exists());
    library.take_events();

    fs::remove_file(&b_path).unwrap();
    let report = library.reconcile();

    assert_eq!(report.checked, 3);
    assert_eq!(report.removed_ids(), vec![b]);
    assert_eq!(library.len(), 2);
    assert!(library.photo(b).is_err());
    assert_eq!(library.store().count_rows(), 2);
    assert!(!b_preview.exists());
    assert_eq!(library.take_events(), vec![MediaEvent::Removed { id: b }]);
}

#[test]
fn test_reused_file_name_starts_fresh() {
    let tmp = tempfile::tempdir().unwrap();
    create_png(&tmp.path().join("IMG_0001.png"), 40, 20, 0);
    let path = {
        let mut library = Library::open(tmp.path()).unwrap();
        library.scan(None).unwrap();
        let id = id_of(&library, "IMG_0001.png");
        library.crop(id, 0.0, 0.0, 0.5, 0.5).unwrap();
        library.auto_enhance(id).unwrap();
        library.photo(id).unwrap().path().to_path_buf()
    };
    fs::remove_file(&path).unwrap();

    {
        let library = Library::open(tmp.path()).unwrap();
        assert_eq!(library.store().count_rows(), 0);
        assert!(!library.layout().original_for(&path).exists());
        assert!(!library.layout().enhanced_for(&path).exists());
        assert!(!library.layout().save_points_for(&path).exists());
    }

    // A new shot that happens to reuse the camera's file name
    create_png(&path, 64, 64, 7);
    let bytes = fs::read(&path).unwrap();
    let mut library = Library::open(tmp.path()).unwrap();
    library.scan(None).unwrap();
    let id = id_of(&library, "IMG_0001.png");

    let photo = library.photo(id).unwrap();
    assert!(!photo.is_enhanced());
    assert!(photo.save_points().is_empty());
    assert_eq!(photo.identity(), path);
    assert_eq!(photo.original_file(), path);
    assert_eq!(photo.size().unwrap(), (64, 64));

    library.revert_to_original(id).unwrap();
    assert_eq!(fs::read(&path).unwrap(), bytes);
    assert_eq!(library.photo(id).unwrap().size().unwrap(), (64, 64));
}

#[test]
fn test_forget_discards_edit_state() {
    let (_tmp, mut library) = library_with(&["a.png", "b.png"]);
    let a = id_of(&library, "a.png");
    library.crop(a, 0.0, 0.0, 0.5, 0.5).unwrap();
    let path = library.photo(a).unwrap().path().to_path_buf();
    fs::remove_file(&path).unwrap();

    let missing: Vec<_> = library.verify_files().filter(|c| !c.exists).collect();
    assert_eq!(library.forget(&missing), 1);
    assert_eq!(library.id_for(&path), None);
    assert!(!library.layout().original_for(&path).exists());
    assert!(!library.layout().save_points_for(&path).exists());
}

#[test]
fn test_open_reconciles_when_configured() {
    let tmp = tempfile::tempdir().unwrap();
    create_png(&tmp.path().join("a.png"), 8, 8, 0);
    create_png(&tmp.path().join("b.png"), 8, 8, 1);
    {
        let mut library = Library::open(tmp.path()).unwrap();
        library.scan(None).unwrap();
    }
    fs::remove_file(tmp.path().join("a.png")).unwrap();

    let library = Library::open(tmp.path()).unwrap();
    assert_eq!(library.store().count_rows(), 1);
}

#[test]
fn test_interrupted_verification_keeps_progress() {
    let (_tmp, mut library) = library_with(&["a.png", "b.png", "c.png"]);
    for name in ["a.png", "c.png"] {
        fs::remove_file(library.root().join(name)).unwrap();
    }

    // Stop after two units of work
    let missing: Vec<_> = library.verify_files().take(2).filter(|c| !c.exists).collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(library.forget(&missing), 1);
    assert_eq!(library.store().count_rows(), 2);

    // A later pass picks up the rest
    let missing: Vec<_> = library.verify_files().filter(|c| !c.exists).collect();
    assert_eq!(library.forget(&missing), 1);
    assert_eq!(library.len(), 1);
}

#[test]
fn test_remove_then_delete_files() {
    let (_tmp, mut library) = library_with(&["a.png"]);
    let id = id_of(&library, "a.png");
    library.crop(id, 0.0, 0.0, 0.5, 0.5).unwrap();
    let path: PathBuf = library.photo(id).unwrap().path().to_path_buf();
    library.take_events();

    let photo = library.remove(id).unwrap();
    assert_eq!(library.take_events(), vec![MediaEvent::Removed { id }]);
    assert_eq!(library.id_for(&path), None);
    assert!(library.store().get_row(id).is_none());
    assert!(!library.layout().preview_for(&path).exists());

    photo.delete_files().unwrap();
    assert!(!path.exists());
    assert!(!library.layout().original_for(&path).exists());
}

// ── Previews ─────────────────────────────────────────────────────

#[test]
fn test_preview_cached_until_edit() {
    let tmp = tempfile::tempdir().unwrap();
    create_png(&tmp.path().join("big.png"), 720, 480, 0);
    let codec = Arc::new(CountingCodec::default());
    let mut library = Library::open_with_codec(tmp.path(), codec.clone()).unwrap();
    library.scan(None).unwrap();
    let id = id_of(&library, "big.png");
    assert_eq!(codec.decodes.load(Ordering::SeqCst), 1, "preview made on add");

    let first = library.preview(id).unwrap();
    let second = library.preview(id).unwrap();
    assert_eq!(first, second);
    assert_eq!(codec.decodes.load(Ordering::SeqCst), 1);
    assert_eq!(image::image_dimensions(&first).unwrap(), (360, 240));

    library.rotate_right(id).unwrap();
    let third = library.preview(id).unwrap();
    assert_eq!(third, first);
    assert_eq!(codec.decodes.load(Ordering::SeqCst), 2);
    assert_eq!(image::image_dimensions(&third).unwrap(), (240, 360));
}

#[test]
fn test_warm_previews_can_stop_early() {
    let (_tmp, mut library) = library_with(&["a.png", "b.png", "c.png"]);
    let ids: Vec<i64> = library.photos().map(|(id, _)| id).collect();
    for &id in &ids {
        library.rotate_right(id).unwrap();
    }

    let mut warm = library.warm_previews();
    assert_eq!(warm.len(), 3);
    let (first, result) = warm.next().unwrap();
    assert!(result.unwrap().exists());
    drop(warm);

    let done = library
        .photos()
        .filter(|(_, photo)| library.layout().preview_for(photo.path()).exists())
        .count();
    assert_eq!(done, 1);
    assert_eq!(first, ids[0]);

    assert!(library.warm_previews().all(|(_, result)| result.is_ok()));
}
