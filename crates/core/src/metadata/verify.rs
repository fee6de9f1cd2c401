use std::path::PathBuf;

/// Outcome of checking one metadata row against the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCheck {
    pub id: i64,
    pub filename: PathBuf,
    pub exists: bool,
}

/// Lazy per-row verification pass over a snapshot of the metadata table.
///
/// Each `next()` stats exactly one file, so the host decides how much work
/// to do between UI updates and may stop at any point. Rows are read up
/// front; starting over means asking the store for a new pass.
#[derive(Debug)]
pub struct FileVerification {
    rows: std::vec::IntoIter<(i64, PathBuf)>,
}

impl FileVerification {
    pub(crate) fn new(rows: Vec<(i64, PathBuf)>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

impl Iterator for FileVerification {
    type Item = FileCheck;

    fn next(&mut self) -> Option<FileCheck> {
        let (id, filename) = self.rows.next()?;
        let exists = filename.is_file();
        Some(FileCheck {
            id,
            filename,
            exists,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for FileVerification {}

/// Summary of a completed reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    /// Rows that were deleted, with the file each one pointed at.
    pub removed: Vec<FileCheck>,
}

impl ReconcileReport {
    pub fn removed_ids(&self) -> Vec<i64> {
        self.removed.iter().map(|check| check.id).collect()
    }
}
