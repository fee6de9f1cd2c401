use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use keepsake_core::{Library, ScanProgress};

pub(crate) fn active_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {bar:30.cyan/blue} {spinner:.green} {pos:>5}/{len:<5} {prefix:.dim} {msg}",
    )
    .unwrap()
    .progress_chars("━╸─")
}

pub(crate) fn done_style() -> ProgressStyle {
    ProgressStyle::with_template("  {bar:30.green} {prefix:.green} {msg:.dim}").unwrap()
}

pub fn scan(library: &mut Library) -> Result<()> {
    let pb = ProgressBar::new(0);
    pb.set_style(active_style());
    pb.set_prefix("scanning");

    let report = library.scan(Some(&mut |progress| match progress {
        ScanProgress::Start { file_count } => pb.set_length(file_count as u64),
        ScanProgress::FileProcessed { path } => {
            if let Some(name) = path.file_name() {
                pb.set_message(name.to_string_lossy().to_string());
            }
            pb.inc(1);
        }
    }))?;

    pb.set_style(done_style());
    pb.set_prefix("done");
    pb.finish_with_message(format!(
        "{} photos, {} new",
        library.len(),
        report.added.len()
    ));

    for path in &report.failed {
        println!("  could not open {}", path.display());
    }
    Ok(())
}

/// Check every row against disk, one file per step, then drop the rows of
/// missing files in one batch.
pub fn verify(library: &mut Library) -> Result<()> {
    super::load(library)?;

    let pass = library.verify_files();
    let pb = ProgressBar::new(pass.len() as u64);
    pb.set_style(active_style());
    pb.set_prefix("verifying");

    let mut missing = Vec::new();
    for check in pass {
        if !check.exists {
            pb.println(format!("  missing: {}", check.filename.display()));
            missing.push(check);
        }
        pb.inc(1);
    }

    let removed = library.forget(&missing);
    pb.set_style(done_style());
    pb.set_prefix("done");
    pb.finish_with_message(format!("{removed} missing photos removed"));
    Ok(())
}
