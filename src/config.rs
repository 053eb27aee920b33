// Typed configuration (`[CONFIG]`, spec.md §6): `{server, redis, database}`,
// loaded from a JSON file and overridable by environment variables and CLI
// flags. Grounded on `dpc-rostra`'s and `rerun-io-rerun`'s use of `clap`
// (`derive`, `env`) for CLI parsing, layered over `serde_json` the way the
// teacher layers `serde`/`sqlx` for its own typed state.
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use crate::error::CoreError;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Accepted for shape-compatibility with the original's Redis-backed cache
/// (spec.md §6); currently unused since our cache adapter is in-process
/// (see `SPEC_FULL.md` §9's Open Question resolution).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub password: Option<String>,
}

/// `name` configures the SQLite file path; `host`/`port`/`user`/`password`
/// are accepted and ignored, kept only for config-shape compatibility with
/// spec.md §6 as written (these fields matter for the original's Postgres
/// backend, not for SQLite).
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_database_name")]
    pub name: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            name: default_database_name(),
            user: None,
            password: None,
        }
    }
}

fn default_database_name() -> String {
    "feed_aggregator.db".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Process bootstrap CLI flags (`[BOOTSTRAP]`). An operator can override the
/// config file path, the bind address, and the worker count without editing
/// the config file.
#[derive(Debug, Parser)]
#[command(name = "feed-aggregator", about = "Activity-feed aggregation service")]
pub struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, env = "CONFIG_FILE", default_value = "config.json")]
    pub config: PathBuf,

    /// Overrides `server.host` from the config file.
    #[arg(long, env = "SERVER_HOST")]
    pub host: Option<String>,

    /// Overrides `server.port` from the config file.
    #[arg(long, env = "SERVER_PORT")]
    pub port: Option<u16>,

    /// Overrides `database.name` (the SQLite file path) from the config file.
    #[arg(long, env = "DATABASE_FILE")]
    pub database_file: Option<String>,

    /// Number of task-queue workers (spec.md §5: "N defaults to 1; 2-5 typical").
    #[arg(long, env = "QUEUE_WORKERS", default_value_t = 1)]
    pub workers: usize,
}

impl Config {
    /// Loads the config file if present (defaulting otherwise), then applies
    /// CLI/env overrides on top.
    pub fn load(cli: &Cli) -> Result<Self, CoreError> {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|error| CoreError::InvalidPayload(format!("invalid config file: {error}")))?,
            Err(_) => Config::default(),
        };

        if let Some(host) = &cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(database_file) = &cli.database_file {
            config.database.name = database_file.clone();
        }

        Ok(config)
    }
}
