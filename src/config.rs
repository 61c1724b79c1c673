//! Configuration surface.
//!
//! Loaded once at startup from a TOML file and treated as read-only for
//! the remainder of the process.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub name: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_port() -> u16 {
    5432
}

impl DatabaseConfig {
    /// builds a libpq-style connection string; `DB_PASSWORD` in the
    /// environment overrides any password baked into the config file so
    /// secrets need not live on disk.
    pub fn connection_string(&self) -> String {
        let password = std::env::var("DB_PASSWORD").unwrap_or_else(|_| self.password.clone());
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.name, self.user, password
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityConfig {
    pub directory: PathBuf,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub snapshot_dir: PathBuf,
    #[serde(default)]
    pub entities: HashMap<String, EntityConfig>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
    #[serde(default = "default_parallel_parsers")]
    pub parallel_parsers: usize,
    #[serde(default)]
    pub use_unlogged_tables: bool,
    pub limit: Option<usize>,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_batch_size() -> usize {
    crate::DEFAULT_BATCH_SIZE
}

fn default_progress_interval() -> usize {
    100_000
}

/// mirrors the teacher's worker pool, which sizes itself to the visible
/// core count rather than a hardcoded constant.
fn default_parallel_parsers() -> usize {
    num_cpus::get().min(4)
}

fn default_state_file() -> PathBuf {
    PathBuf::from("state.json")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_max_retries() -> u32 {
    5
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))?;
        for (name, entity) in config.entities.iter() {
            if !entity.directory.exists() {
                log::warn!(
                    "configured directory for entity '{name}' does not exist: {}",
                    entity.directory.display()
                );
            }
        }
        if config.limit.is_some() {
            log::info!("test mode: per-file record limit = {:?}", config.limit);
        }
        Ok(config)
    }

    pub fn entity_dir(&self, name: &str) -> Option<&Path> {
        self.entities.get(name).map(|e| e.directory.as_path())
    }

    pub fn authors_enabled(&self) -> bool {
        self.entities.get("authors").map(|e| e.enabled).unwrap_or(false)
    }
}
