use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use keepsake_core::Library;

pub fn list(library: &Library) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![Cell::new("Key"), Cell::new("Value")]);
    for (key, value) in library.config().entries() {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }
    println!("{table}");
}

pub fn get(library: &Library, key: &str) -> Result<()> {
    println!("{}", library.config().get(key)?);
    Ok(())
}

pub fn set(library: &mut Library, key: &str, value: &str) -> Result<()> {
    library.set_config(key, value)?;
    println!("{key} = {}", library.config().get(key)?);
    Ok(())
}
