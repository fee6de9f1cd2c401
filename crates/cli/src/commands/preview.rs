use anyhow::Result;
use indicatif::ProgressBar;
use keepsake_core::Library;

use super::library::{active_style, done_style};

pub fn show(library: &mut Library, id: i64) -> Result<()> {
    super::load(library)?;
    let file = library.preview(id)?;
    println!("{}", file.display());
    Ok(())
}

pub fn warm(library: &mut Library) -> Result<()> {
    super::load(library)?;

    let previews = library.warm_previews();
    let pb = ProgressBar::new(previews.len() as u64);
    pb.set_style(active_style());
    pb.set_prefix("previews");

    let mut failed = 0;
    for (id, result) in previews {
        if let Err(err) = result {
            pb.println(format!("  photo {id}: {err}"));
            failed += 1;
        }
        pb.inc(1);
    }

    pb.set_style(done_style());
    pb.set_prefix("done");
    pb.finish_with_message(format!("{failed} failed"));
    Ok(())
}
