pub mod config;
pub mod edit;
pub mod library;
pub mod ls;
pub mod preview;

use anyhow::Result;
use keepsake_core::Library;

/// Load the library's photos without reporting progress. Every command that
/// addresses photos by id needs them in memory first.
pub(crate) fn load(library: &mut Library) -> Result<()> {
    let report = library.scan(None)?;
    for path in &report.failed {
        eprintln!("  warning: could not open {}", path.display());
    }
    Ok(())
}
