use anyhow::{bail, Result};
use keepsake_core::Library;

pub fn rotate(library: &mut Library, id: i64) -> Result<()> {
    super::load(library)?;
    library.rotate_right(id)?;
    println!("Rotated photo {id} to {}", library.photo(id)?.orientation());
    Ok(())
}

pub fn crop(library: &mut Library, id: i64, x: f64, y: f64, width: f64, height: f64) -> Result<()> {
    super::load(library)?;
    if !library.crop(id, x, y, width, height)? {
        bail!("crop rectangle leaves no area");
    }
    let (w, h) = library.photo(id)?.size()?;
    println!("Cropped photo {id} to {w}×{h}");
    Ok(())
}

pub fn enhance(library: &mut Library, id: i64) -> Result<()> {
    super::load(library)?;
    library.auto_enhance(id)?;
    println!("Enhanced photo {id}");
    Ok(())
}

pub fn undo(library: &mut Library, id: i64) -> Result<()> {
    super::load(library)?;
    if library.revert_to_last_save_point(id)? {
        let left = library.photo(id)?.save_points().len();
        println!("Undid last edit of photo {id} ({left} more to undo)");
    } else {
        println!("Nothing to undo for photo {id}");
    }
    Ok(())
}

pub fn commit(library: &mut Library, id: i64, all: bool) -> Result<()> {
    super::load(library)?;
    let count = if all {
        library.discard_save_points(id)?
    } else {
        usize::from(library.discard_last_save_point(id)?)
    };
    println!("Committed {count} edit(s) of photo {id}");
    Ok(())
}

pub fn revert(library: &mut Library, id: i64) -> Result<()> {
    super::load(library)?;
    match library.revert_to_original(id) {
        Ok(()) => {
            println!("Restored original of photo {id}");
            Ok(())
        }
        Err(err) if err.is_fatal() => {
            bail!("photo {id} cannot be restored and needs attention: {err}")
        }
        Err(err) => Err(err.into()),
    }
}
