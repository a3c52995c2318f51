//! toydb shell.
//!
//! ```bash
//! toydb users.db
//! tdb > insert 1 alice alice@example.com
//! Executed.
//! tdb > select
//! (1, alice, alice@example.com)
//! Executed.
//! tdb > .exit
//! ```

mod repl;
mod session;
mod settings;
mod statement;

use anyhow::{Context, Result};
use clap::Parser;
use repl::Repl;
use session::Session;
use settings::Settings;
use std::path::PathBuf;
use std::process::ExitCode;
use storage::Table;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "toydb", version, about = "Single-table row store shell")]
struct Args {
    /// Table file; created if it does not exist
    db_path: PathBuf,

    /// Settings file (TOML)
    #[arg(short, long, env = "TOYDB_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let settings = Settings::load(args.config.as_deref())?;
    init_tracing(&settings.log_level);

    let table = Table::open_with_config(&args.db_path, &settings.storage)
        .with_context(|| format!("failed to open {}", args.db_path.display()))?;
    tracing::info!(
        path = %args.db_path.display(),
        max_pages = settings.storage.max_pages,
        "table opened"
    );

    Repl::new(Session::new(table))?.run()
}

/// Logs go to stderr so they never mix with query output. `RUST_LOG` wins
/// over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
