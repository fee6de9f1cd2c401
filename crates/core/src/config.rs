use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metadata::MetadataStore;
use crate::preview::DEFAULT_MAX_EDGE;

/// Per-library settings, stored as key/value rows in the metadata database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Longest edge of cached previews, in pixels.
    pub preview_max_edge: u32,
    /// Quality used when writing JPEG files (1-100).
    pub jpeg_quality: u8,
    /// Drop metadata rows for missing files when the library is opened.
    pub verify_on_open: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            preview_max_edge: DEFAULT_MAX_EDGE,
            jpeg_quality: 90,
            verify_on_open: true,
        }
    }
}

impl LibraryConfig {
    pub const KEYS: &'static [&'static str] = &["preview_max_edge", "jpeg_quality", "verify_on_open"];

    /// Read every known key from `store`, falling back to the default for
    /// keys that are unset or hold a value that no longer parses.
    pub fn load(store: &MetadataStore) -> Result<Self> {
        let mut config = Self::default();
        for key in Self::KEYS {
            if let Some(value) = store.get_config(key)? {
                if let Err(err) = config.apply(key, &value) {
                    tracing::warn!(error = %err, "ignoring stored config value");
                }
            }
        }
        Ok(config)
    }

    /// Validate and persist one setting.
    pub fn set(&mut self, store: &MetadataStore, key: &str, value: &str) -> Result<()> {
        self.apply(key, value)?;
        store.set_config(key, value.trim())
    }

    pub fn get(&self, key: &str) -> Result<String> {
        match key {
            "preview_max_edge" => Ok(self.preview_max_edge.to_string()),
            "jpeg_quality" => Ok(self.jpeg_quality.to_string()),
            "verify_on_open" => Ok(self.verify_on_open.to_string()),
            _ => Err(unknown_key(key)),
        }
    }

    /// Every setting as `(key, value)` pairs, in a stable order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        Self::KEYS
            .iter()
            .filter_map(|key| self.get(key).ok().map(|value| (*key, value)))
            .collect()
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "preview_max_edge" => {
                let edge: u32 = parse(key, value)?;
                if !(1..=DEFAULT_MAX_EDGE).contains(&edge) {
                    return Err(invalid(key, &format!("must be between 1 and {DEFAULT_MAX_EDGE}")));
                }
                self.preview_max_edge = edge;
            }
            "jpeg_quality" => {
                let quality: u8 = parse(key, value)?;
                if !(1..=100).contains(&quality) {
                    return Err(invalid(key, "must be between 1 and 100"));
                }
                self.jpeg_quality = quality;
            }
            "verify_on_open" => self.verify_on_open = parse(key, value)?,
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| invalid(key, &e.to_string()))
}

fn invalid(key: &str, message: &str) -> Error {
    Error::InvalidConfig {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn unknown_key(key: &str) -> Error {
    invalid(key, "unknown setting")
}
