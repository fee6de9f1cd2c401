mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use keepsake_core::Library;
use tracing_subscriber::EnvFilter;

/// Keepsake: non-destructive photo editing with undo
#[derive(Parser)]
#[command(name = "keepsake", version, about)]
struct Cli {
    /// Path to the photo library directory
    #[arg(long, default_value_t = default_library_path())]
    library: String,

    /// Log edit operations (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover new photos in the library directory
    Scan,
    /// List all photos
    Ls,
    /// Show details and edit history of a photo
    Show {
        /// Photo ID
        id: i64,
    },
    /// Rotate a photo 90° clockwise
    Rotate {
        /// Photo ID
        id: i64,
    },
    /// Crop a photo to a rectangle given as fractions of the displayed image
    Crop {
        /// Photo ID
        id: i64,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    /// Apply the automatic tonal adjustment
    Enhance {
        /// Photo ID
        id: i64,
    },
    /// Undo the most recent crop or enhance
    Undo {
        /// Photo ID
        id: i64,
    },
    /// Accept the most recent edit, dropping its undo snapshot
    Commit {
        /// Photo ID
        id: i64,
        /// Accept every pending edit
        #[arg(long)]
        all: bool,
    },
    /// Throw away every edit and restore the original file
    Revert {
        /// Photo ID
        id: i64,
    },
    /// Print the path of a photo's preview, regenerating it if needed
    Preview {
        /// Photo ID
        id: i64,
    },
    /// Bring every photo's preview up to date
    Previews,
    /// Drop photos whose files have disappeared
    Verify,
    /// Read or change library settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// List every setting
    List,
    /// Show one setting
    Get {
        key: String,
    },
    /// Change one setting
    Set {
        key: String,
        value: String,
    },
}

fn default_library_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join("Pictures")
        .to_string_lossy()
        .to_string()
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut library = Library::open(&PathBuf::from(&cli.library))?;

    match cli.command {
        Commands::Scan => commands::library::scan(&mut library)?,
        Commands::Ls => commands::ls::run(&mut library)?,
        Commands::Show { id } => commands::ls::show(&mut library, id)?,
        Commands::Rotate { id } => commands::edit::rotate(&mut library, id)?,
        Commands::Crop {
            id,
            x,
            y,
            width,
            height,
        } => commands::edit::crop(&mut library, id, x, y, width, height)?,
        Commands::Enhance { id } => commands::edit::enhance(&mut library, id)?,
        Commands::Undo { id } => commands::edit::undo(&mut library, id)?,
        Commands::Commit { id, all } => commands::edit::commit(&mut library, id, all)?,
        Commands::Revert { id } => commands::edit::revert(&mut library, id)?,
        Commands::Preview { id } => commands::preview::show(&mut library, id)?,
        Commands::Previews => commands::preview::warm(&mut library)?,
        Commands::Verify => commands::library::verify(&mut library)?,
        Commands::Config { action } => match action {
            None | Some(ConfigAction::List) => commands::config::list(&library),
            Some(ConfigAction::Get { key }) => commands::config::get(&library, &key)?,
            Some(ConfigAction::Set { key, value }) => {
                commands::config::set(&mut library, &key, &value)?
            }
        },
    }

    Ok(())
}
