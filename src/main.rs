//! # Adaptive Locator CLI (`aloc`)
//!
//! Saves element fingerprints from HTML files and finds those elements
//! again after the markup changes.
//!
//! ## Usage
//!
//! ```bash
//! aloc --config ./config/aloc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `aloc save <file> <locator>` | Fingerprint the first element the locator matches |
//! | `aloc locate <file> <locator>` | Literal lookup, relocating on a miss |
//! | `aloc list` | Stored locators per domain |
//! | `aloc show <locator> --domain D` | Print one stored fingerprint |
//! | `aloc domains` | Domains present in the store |
//!
//! ## Examples
//!
//! ```bash
//! # Remember the product card on today's page
//! aloc save page-v1.html ".product-card" --url https://shop.example/p/1
//!
//! # Next week the class is gone; find the card anyway
//! aloc locate page-v2.html ".product-card" --url https://shop.example/p/1 --explain
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=debug` to see candidate counts.

mod config;
mod file_store;
mod fingerprints;
mod locate;
mod markup;
mod selector;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Adaptive Locator CLI: find the same element after a page changes.
#[derive(Parser)]
#[command(
    name = "aloc",
    about = "Adaptive Locator — keep finding the same element after a page changes shape",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/aloc.toml`. Built-in defaults apply when the
    /// file does not exist.
    #[arg(long, global = true, default_value = "./config/aloc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint the first element matching a locator.
    Save {
        /// HTML file to read.
        file: PathBuf,
        /// CSS-subset locator.
        locator: String,
        /// URL the document came from; its host is the default domain.
        #[arg(long)]
        url: Option<String>,
        /// Domain key, overriding the URL host.
        #[arg(long)]
        domain: Option<String>,
    },

    /// Find the elements a locator refers to, relocating if it no longer matches.
    Locate {
        /// HTML file to read.
        file: PathBuf,
        /// CSS-subset locator.
        locator: String,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        domain: Option<String>,
        /// `literal` or `adaptive` (defaults to `[adaptive].mode`).
        #[arg(long)]
        mode: Option<String>,
        /// Minimum relocation score, overriding `[scoring].threshold`.
        #[arg(long)]
        threshold: Option<f64>,
        /// Refresh the stored fingerprint on a literal hit.
        #[arg(long)]
        save: bool,
        /// Show the ranked relocation candidates.
        #[arg(long)]
        explain: bool,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List stored locators.
    List {
        /// Only this domain.
        #[arg(long)]
        domain: Option<String>,
    },

    /// Print one stored fingerprint as JSON.
    Show {
        locator: String,
        #[arg(long)]
        domain: String,
        /// Include superseded versions.
        #[arg(long)]
        history: bool,
    },

    /// List domains present in the store.
    Domains,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_minimal(&cli.config)?;

    match cli.command {
        Commands::Save {
            file,
            locator,
            url,
            domain,
        } => {
            locate::run_save(&cfg, &file, &locator, url.as_deref(), domain.as_deref())?;
        }
        Commands::Locate {
            file,
            locator,
            url,
            domain,
            mode,
            threshold,
            save,
            explain,
            json,
        } => {
            let args = locate::LocateArgs {
                file: &file,
                locator: &locator,
                url: url.as_deref(),
                domain: domain.as_deref(),
                mode: mode.as_deref(),
                threshold,
                save,
                explain,
            };
            locate::run_locate(&cfg, &args, json)?;
        }
        Commands::List { domain } => {
            fingerprints::run_list(&cfg, domain.as_deref())?;
        }
        Commands::Show {
            locator,
            domain,
            history,
        } => {
            fingerprints::run_show(&cfg, &domain, &locator, history)?;
        }
        Commands::Domains => {
            fingerprints::run_domains(&cfg)?;
        }
    }

    Ok(())
}
