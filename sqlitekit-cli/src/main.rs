//! Command-line front end for `sqlitekit-db`.
//!
//! ```bash
//! # print rows as JSON lines
//! sqlitekit query app.db "SELECT id, name FROM users"
//!
//! # run a script
//! sqlitekit exec app.db "CREATE TABLE t (x); INSERT INTO t VALUES (1);"
//!
//! # online copy, 64 pages at a time
//! RUST_LOG=info sqlitekit backup app.db app-copy.db --pages 64
//! ```

mod commands;
mod render;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sqlitekit_db::OpenOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Query, modify and back up `SQLite` databases.
#[derive(Debug, Parser)]
#[command(name = "sqlitekit", author, version, about, long_about = None)]
struct Cli {
    /// Open databases read-only.
    #[arg(long, global = true, env = "SQLITEKIT_READ_ONLY")]
    read_only: bool,

    /// How long to wait on a locked database, in milliseconds.
    #[arg(
        long,
        global = true,
        env = "SQLITEKIT_BUSY_TIMEOUT_MS",
        default_value_t = 5_000
    )]
    busy_timeout_ms: u64,

    /// Increase log verbosity (-v debug, -vv trace with statement timings).
    /// `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a query and print each row as a JSON object.
    Query {
        /// Database file.
        db: PathBuf,
        /// A single SQL statement.
        sql: String,
    },
    /// Run one or more statements and print the number of changed rows.
    Exec {
        /// Database file.
        db: PathBuf,
        /// SQL statements separated by semicolons.
        sql: String,
    },
    /// Copy a database page by page.
    Backup {
        /// Database to copy from.
        source: PathBuf,
        /// Database to overwrite.
        destination: PathBuf,
        /// Pages copied per step; negative copies everything at once.
        #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
        pages: i32,
        /// Pause between steps, and before retrying a locked step.
        #[arg(long, default_value_t = 10)]
        pause_ms: u64,
    },
}

impl Cli {
    fn open_options(&self) -> OpenOptions {
        let options = if self.read_only {
            OpenOptions::read_only()
        } else {
            OpenOptions::default()
        };
        options
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .with_profile(self.verbose >= 2)
    }

    const fn default_log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info,sqlitekit_db=debug,sqlitekit=debug",
            _ => "debug,sqlitekit_db=trace,sqlitekit=trace",
        }
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.default_log_filter());

    let options = cli.open_options();
    let mut stdout = std::io::stdout().lock();
    match &cli.command {
        Command::Query { db, sql } => commands::query(db, sql, &options, &mut stdout),
        Command::Exec { db, sql } => commands::exec(db, sql, &options, &mut stdout),
        Command::Backup {
            source,
            destination,
            pages,
            pause_ms,
        } => commands::backup(
            source,
            destination,
            &options,
            *pages,
            Duration::from_millis(*pause_ms),
        ),
    }
}
