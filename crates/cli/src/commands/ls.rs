use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use keepsake_core::photo::Photo;
use keepsake_core::Library;

pub fn run(library: &mut Library) -> Result<()> {
    super::load(library)?;

    if library.is_empty() {
        println!("No photos in {}", library.root().display());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID"),
        Cell::new("File"),
        Cell::new("Size"),
        Cell::new("Rotation"),
        Cell::new("Taken"),
        Cell::new("Edits"),
    ]);

    for (id, photo) in library.photos() {
        let size = library
            .store()
            .get_size(id)
            .map(|(w, h)| format!("{w}×{h}"))
            .unwrap_or_else(|| "?".to_string());
        let taken = library
            .store()
            .get_exposure_timestamp(id)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();

        table.add_row(vec![
            Cell::new(id),
            Cell::new(file_name(photo)),
            Cell::new(size),
            Cell::new(photo.orientation().to_string()),
            Cell::new(taken),
            edits_cell(photo),
        ]);
    }

    println!("{table}");
    Ok(())
}

pub fn show(library: &mut Library, id: i64) -> Result<()> {
    super::load(library)?;
    let photo = library.photo(id)?;
    let (width, height) = photo.size()?;

    println!("  Photo {id}: {}", file_name(photo));
    println!("  -----");
    println!("  Path:        {}", photo.path().display());
    println!("  Showing:     {}", photo.identity().display());
    println!("  Original:    {}", photo.original_file().display());
    println!("  Size:        {width}×{height}");
    println!("  Rotation:    {}", photo.orientation());
    println!("  Enhanced:    {}", if photo.is_enhanced() { "yes" } else { "no" });
    if let Some(taken) = photo.exposure_date_time() {
        println!("  Taken:       {}", taken.format("%Y-%m-%d %H:%M:%S"));
    }

    if photo.save_points().is_empty() {
        println!("  Undo:        nothing to undo");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("#"),
        Cell::new("Edit"),
        Cell::new("Rotation before"),
        Cell::new("Enhanced before"),
    ]);
    for (i, save_point) in photo.save_points().iter().enumerate().rev() {
        table.add_row(vec![
            Cell::new(i),
            Cell::new(save_point.kind),
            Cell::new(save_point.orientation.to_string()),
            Cell::new(if save_point.enhance_performed { "yes" } else { "" }),
        ]);
    }
    println!();
    println!("{table}");
    Ok(())
}

fn file_name(photo: &Photo) -> String {
    photo
        .path()
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn edits_cell(photo: &Photo) -> Cell {
    let pending = photo.save_points().len();
    let mut label = match pending {
        0 => String::new(),
        1 => "1 undoable".to_string(),
        n => format!("{n} undoable"),
    };
    if photo.is_enhanced() {
        if !label.is_empty() {
            label.push_str(", ");
        }
        label.push_str("enhanced");
    }
    if pending > 0 {
        Cell::new(label).fg(Color::Yellow)
    } else {
        Cell::new(label)
    }
}
