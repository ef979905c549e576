use clap::Args;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_SQLITE_PATH: &str = "session_data.db";

/// Storage backend selection parameters
///
/// PostgreSQL is used when a connection string is present, unless `use_sqlite` forces the
/// SQLite backend. When PostgreSQL cannot be reached at startup the server falls back to the
/// SQLite file at `sqlite_path`, unless `no_fallback` is set.
#[derive(Args, Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// PostgreSQL connection string
    ///
    /// # Command Line
    /// Use `--postgres-url <URL>` or the `POSTGRES_URL` environment variable
    #[arg(long, env = "POSTGRES_URL")]
    pub postgres_url: Option<String>,

    /// Force the SQLite backend even when a PostgreSQL connection string is configured
    #[arg(long, env = "USE_SQLITE")]
    pub use_sqlite: bool,

    /// Location of the SQLite database file, created if missing
    #[arg(long, env = "SQLITE_PATH", default_value = DEFAULT_SQLITE_PATH)]
    pub sqlite_path: PathBuf,

    /// Refuse to start instead of falling back to SQLite when PostgreSQL is unreachable
    #[arg(long, env = "NO_FALLBACK")]
    pub no_fallback: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            use_sqlite: false,
            sqlite_path: PathBuf::from(DEFAULT_SQLITE_PATH),
            no_fallback: false,
        }
    }
}
