use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("resize error: {0}")]
    Resize(String),

    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("library path does not exist: {}", .0.display())]
    LibraryNotFound(PathBuf),

    #[error("library path is not a directory: {}", .0.display())]
    LibraryNotDirectory(PathBuf),

    #[error("photo not found: {0}")]
    PhotoNotFound(i64),

    #[error("unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("original file is missing: {}", .0.display())]
    OriginalMissing(PathBuf),

    #[error("save point snapshot is missing: {}", .0.display())]
    SnapshotMissing(PathBuf),

    #[error("could not record metadata for {}", .0.display())]
    MetadataWrite(PathBuf),

    #[error("invalid config value for `{key}`: {message}")]
    InvalidConfig { key: String, message: String },
}

impl Error {
    /// True when the photo this error came from can no longer be edited and
    /// should be handed to whoever owns library integrity.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::OriginalMissing(_))
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Io(err.error)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
