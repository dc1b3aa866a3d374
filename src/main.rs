//! CLI entry point for the `ffx-mail` tool.
//!
//! Control log level with RUST_LOG:
//!   RUST_LOG=debug ffx-mail run disk.E01
//!   RUST_LOG=ffx_mail_lib::image=trace ffx-mail extract disk.E01

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::error;

use ffx_mail_lib::config::load_config;
use ffx_mail_lib::{logging, FfxResult, Session};

#[derive(Parser)]
#[command(
    name = "ffx-mail",
    about = "Extract Outlook OST/PST stores from disk images and build a sorted e-mail timeline",
    version
)]
struct Cli {
    /// Directory holding the per-image bundles and the merged CSV
    #[arg(long, global = true)]
    output_root: Option<PathBuf>,

    /// JSON configuration file (default: ./ffx-mail.json, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose diagnostics (file:line, thread IDs, debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every OST/PST store out of the given images
    Extract {
        /// E01 (first segment) or raw images
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Write one CSV per extracted store
    Normalize {
        /// Emit delivery times as UTC+9 wall-clock seconds
        #[arg(long = "utc9")]
        utc9: bool,
        /// Additional store files to normalize, each into its own bundle
        #[arg(long = "store")]
        stores: Vec<PathBuf>,
    },
    /// Merge every per-store CSV into one file sorted by delivery time
    Merge,
    /// extract, normalize and merge in one go
    Run {
        #[arg(long = "utc9")]
        utc9: bool,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

fn execute(cli: Cli) -> FfxResult<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(root) = cli.output_root {
        config.output_root = root;
    }
    if let Commands::Normalize { utc9: true, .. } | Commands::Run { utc9: true, .. } = cli.command {
        config.utc_plus_nine = true;
    }

    let session = Session::new(config);
    match cli.command {
        Commands::Extract { images } => session.extract_images(&images).map(|_| ()),
        Commands::Normalize { stores, .. } => session.normalize_all(&stores).map(|_| ()),
        Commands::Merge => session.merge().map(|_| ()),
        Commands::Run { images, .. } => session.run(&images).map(|_| ()),
    }
}

fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        logging::init_verbose();
    } else {
        logging::init();
    }

    if let Err(e) = execute(cli) {
        error!(error = %e, fatal = e.is_fatal(), "Run aborted");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
