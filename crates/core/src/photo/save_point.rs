use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{CropRect, Orientation};
use crate::error::Result;

/// The edit a save point was taken for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditKind {
    Crop,
    Enhance,
}

impl EditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crop => "crop",
            Self::Enhance => "enhance",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "crop" => Some(Self::Crop),
            "enhance" => Some(Self::Enhance),
            _ => None,
        }
    }
}

impl std::fmt::Display for EditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a photo's backing file taken right before a destructive edit.
/// The snapshot file is owned by this entry alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePoint {
    pub snapshot_file: PathBuf,
    /// Whether the snapshotted backing file was the enhanced variant.
    pub enhance_performed: bool,
    pub kind: EditKind,
    pub orientation: Orientation,
    /// Pending crop at the time of the snapshot. Not encoded in the file
    /// name, so always `None` for stacks rebuilt from disk.
    pub crop: Option<CropRect>,
}

/// File name for the snapshot at `index`: `NNNN-<kind>-<degrees>[-e].<ext>`.
pub(crate) fn snapshot_name(
    index: usize,
    kind: EditKind,
    orientation: Orientation,
    enhanced: bool,
    extension: &str,
) -> String {
    let flag = if enhanced { "-e" } else { "" };
    format!(
        "{index:04}-{kind}-{deg}{flag}.{extension}",
        deg = orientation.degrees()
    )
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ParsedName {
    pub index: usize,
    pub kind: EditKind,
    pub orientation: Orientation,
    pub enhanced: bool,
}

pub(crate) fn parse_snapshot_name(name: &str) -> Option<ParsedName> {
    let (stem, _ext) = name.rsplit_once('.')?;
    let mut parts = stem.split('-');
    let index_str = parts.next()?;
    if index_str.len() != 4 {
        return None;
    }
    let index = index_str.parse().ok()?;
    let kind = EditKind::parse(parts.next()?)?;
    let orientation = Orientation::from_degrees(parts.next()?.parse().ok()?)?;
    let enhanced = match parts.next() {
        None => false,
        Some("e") => true,
        Some(_) => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(ParsedName {
        index,
        kind,
        orientation,
        enhanced,
    })
}

/// Rebuild a save-point stack from a photo's snapshot directory.
///
/// Entries must form the contiguous sequence `0000, 0001, ...`; anything
/// past the first gap is ignored along with names that do not parse.
pub(crate) fn load_stack(dir: &Path) -> Result<Vec<SavePoint>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut found: Vec<(ParsedName, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            // Leftover temp file from an interrupted snapshot
            continue;
        }
        match parse_snapshot_name(&name) {
            Some(parsed) => found.push((parsed, entry.path())),
            None => tracing::warn!(file = %entry.path().display(), "ignoring unrecognised snapshot"),
        }
    }
    found.sort_by_key(|(parsed, _)| parsed.index);

    let mut stack = Vec::with_capacity(found.len());
    for (expected, (parsed, path)) in found.into_iter().enumerate() {
        if parsed.index != expected {
            tracing::warn!(
                dir = %dir.display(),
                expected,
                found = parsed.index,
                "gap in save point sequence, ignoring later snapshots"
            );
            break;
        }
        stack.push(SavePoint {
            snapshot_file: path,
            enhance_performed: parsed.enhanced,
            kind: parsed.kind,
            orientation: parsed.orientation,
            crop: None,
        });
    }
    Ok(stack)
}
