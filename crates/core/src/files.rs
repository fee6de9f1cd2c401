use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::Result;

/// Name of the hidden directory holding all editing state under a library root.
pub const STATE_DIR: &str = ".keepsake";

/// Directory scheme for editing state, relative to the library root:
///
/// ```text
/// <root>/.keepsake/library.sqlite
/// <root>/.keepsake/originals/<filename>
/// <root>/.keepsake/savepoints/<filename>/<NNNN>-<kind>-<deg>[-e].<ext>
/// <root>/.keepsake/enhanced/<filename>
/// <root>/.keepsake/previews/<filename>.preview.jpg
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditLayout {
    state_dir: PathBuf,
}

impl EditLayout {
    pub fn new(library_root: &Path) -> Self {
        Self {
            state_dir: library_root.join(STATE_DIR),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn database(&self) -> PathBuf {
        self.state_dir.join("library.sqlite")
    }

    pub fn originals_dir(&self) -> PathBuf {
        self.state_dir.join("originals")
    }

    pub fn save_points_dir(&self) -> PathBuf {
        self.state_dir.join("savepoints")
    }

    pub fn enhanced_dir(&self) -> PathBuf {
        self.state_dir.join("enhanced")
    }

    pub fn previews_dir(&self) -> PathBuf {
        self.state_dir.join("previews")
    }

    pub fn original_for(&self, photo: &Path) -> PathBuf {
        self.originals_dir().join(file_name(photo))
    }

    pub fn save_points_for(&self, photo: &Path) -> PathBuf {
        self.save_points_dir().join(file_name(photo))
    }

    pub fn enhanced_for(&self, photo: &Path) -> PathBuf {
        self.enhanced_dir().join(file_name(photo))
    }

    pub fn preview_for(&self, photo: &Path) -> PathBuf {
        let mut name = file_name(photo).to_os_string();
        name.push(".preview.jpg");
        self.previews_dir().join(name)
    }

    /// Create every directory of the scheme.
    pub fn create_dirs(&self) -> Result<()> {
        for dir in [
            self.originals_dir(),
            self.save_points_dir(),
            self.enhanced_dir(),
            self.previews_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> &std::ffi::OsStr {
    path.file_name().unwrap_or(path.as_os_str())
}

/// File operations used for snapshotting and restoring image variants.
///
/// Every write lands in a temporary file next to the destination and is
/// renamed into place, so a crash never leaves a half-written file under a
/// name that looks valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStore;

impl FileStore {
    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Copy `src` to `dst`, replacing `dst` atomically.
    pub fn copy(&self, src: &Path, dst: &Path) -> Result<()> {
        let mut reader = fs::File::open(src)?;
        self.write_atomic(dst, |out| {
            io::copy(&mut reader, out)?;
            Ok(())
        })
    }

    /// Move `src` onto `dst`. Falls back to copy + remove when a rename is
    /// not possible (different filesystems).
    pub fn rename(&self, src: &Path, dst: &Path) -> Result<()> {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::rename(src, dst) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(err.into()),
            Err(_) => {
                self.copy(src, dst)?;
                fs::remove_file(src)?;
                Ok(())
            }
        }
    }

    /// Delete a file. Returns `Ok(false)` if it was already gone.
    pub fn remove(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Run `write` against a temp file in `dst`'s directory, then rename the
    /// temp file over `dst`.
    pub fn write_atomic<F>(&self, dst: &Path, write: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<&mut fs::File>) -> Result<()>,
    {
        let dir = dst.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            write(&mut out)?;
            out.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(dst)?;
        Ok(())
    }
}
