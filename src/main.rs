//! Binary entrypoint for the statekeep CLI.
//!
//! Commands:
//! - `start [--bind <addr>] [--data-dir <dir>]` - serve the HTTP state API
//! - `init` - write a starter `config.toml` and create the data directory
//! - `inspect <user> [--offset <n>] [--raw]` - print a user's stored history
//!
//! See the library crate docs for module-level details: `statekeep::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use statekeep::config::Config;
use statekeep::http::{self, StateQuery};
use statekeep::storage::SnapshotStore;

#[derive(Parser)]
#[command(name = "statekeep")]
#[command(about = "Bounded snapshot history for browser game saves")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Start {
        /// Listen address, e.g. 0.0.0.0:8787
        #[arg(short, long)]
        bind: Option<String>,

        /// Directory holding per-user documents
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
    /// Write a default configuration file
    Init,
    /// Show a user's stored snapshots
    Inspect {
        /// User identifier as sent by the game client
        user: String,

        /// Print the resolved snapshot at this offset instead of the listing
        #[arg(short, long)]
        offset: Option<usize>,

        /// Print the whole stored document
        #[arg(long)]
        raw: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(&None, cli.verbose);
            info!("Initializing new statekeep configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);

            let cfg = Config::default();
            tokio::fs::create_dir_all(&cfg.storage.data_dir).await?;
            info!("Data directory ready at {}", cfg.storage.data_dir.display());
        }
        Commands::Start { bind, data_dir } => {
            let mut config = Config::load_or_default(&cli.config).await?;
            config.apply_env()?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(dir) = data_dir {
                config.storage.data_dir = dir;
            }
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting statekeep v{}", env!("CARGO_PKG_VERSION"));
            http::server::serve(&config).await?;
        }
        Commands::Inspect { user, offset, raw } => {
            let mut config = Config::load_or_default(&cli.config).await?;
            config.apply_env()?;
            init_logging(&Some(config.clone()), cli.verbose);
            config.reconcile();
            let store = SnapshotStore::new(config.storage.clone()).await?;

            let payload = match (raw, offset) {
                (false, None) => serde_json::to_value(http::list_snapshots(&store, &user).await)?,
                (raw, offset) => {
                    let query = StateQuery { offset: offset.unwrap_or(0), raw, allow_empty: false };
                    serde_json::to_value(http::get_state(&store, &user, query).await)?
                }
            };
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| std::fs::OpenOptions::new().create(true).append(true).open(path).ok());

    if let Some(f) = log_file {
        let file = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Foreground runs echo to the console as well; redirected runs only hit the file
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
