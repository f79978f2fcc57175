use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::NaiveDateTime;
use courier_dispatch::{
    DispatchOptions, HistoryStore, JsonLinesHistoryStore, MemoryHistoryStore, MessageJob,
    RelayConfig,
    content::{Contact, JobBuilder, Template},
};
use serde::{Deserialize, de::DeserializeOwned};

/// Environment variable naming the configuration file.
pub const CONFIG_VAR: &str = "COURIER_CONFIG";

const DEFAULT_PATHS: [&str; 2] = ["./courier.config.ron", "/etc/courier/courier.config.ron"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HistoryConfig {
    /// JSON-lines file the history is appended to. Without one the history
    /// is only kept in memory for the run.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl HistoryConfig {
    pub fn store(&self) -> Arc<dyn HistoryStore> {
        match &self.path {
            Some(path) => Arc::new(JsonLinesHistoryStore::new(path)),
            None => Arc::new(MemoryHistoryStore::new()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub relay: RelayConfig,
    #[serde(default)]
    pub dispatch: DispatchOptions,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Config {
    /// Read and parse a RON configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a valid configuration.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
        })?;

        ron::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config in {}: {}", path.display(), e))
    }
}

/// Find the configuration file using the following precedence:
/// 1. an explicit path (the `--config` flag)
/// 2. `COURIER_CONFIG` environment variable
/// 3. ./courier.config.ron (current working directory)
/// 4. /etc/courier/courier.config.ron (system-wide config)
///
/// # Errors
///
/// Fails when a path given explicitly does not exist, or when nothing is found.
pub fn find_config_file(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    let defaults = DEFAULT_PATHS.map(PathBuf::from);
    locate(explicit, std::env::var(CONFIG_VAR).ok(), &defaults)
}

fn locate(
    explicit: Option<&Path>,
    env_path: Option<String>,
    defaults: &[PathBuf],
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("Config file does not exist: {}", path.display());
    }

    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_VAR} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = defaults.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = defaults
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_VAR} environment variable\n{paths_tried}"
    )
}

/// Parse a data file, as JSON when the extension says so and RON otherwise.
///
/// # Errors
///
/// Fails if the file cannot be read or does not hold a `T`.
pub fn read_data<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid JSON in {}: {}", path.display(), e))
    } else {
        ron::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid RON in {}: {}", path.display(), e))
    }
}

/// Where a batch's jobs come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    /// A file of ready-made jobs.
    Jobs(PathBuf),
    /// A template rendered once per contact.
    Template { template: PathBuf, contacts: PathBuf },
}

impl JobSource {
    /// # Errors
    ///
    /// Fails if a file cannot be read, or a contact has no email address.
    pub fn load(&self, now: NaiveDateTime) -> anyhow::Result<Vec<MessageJob>> {
        match self {
            Self::Jobs(path) => read_data(path),
            Self::Template { template, contacts } => {
                let template: Template = read_data(template)?;
                let contacts: Vec<Contact> = read_data(contacts)?;
                Ok(JobBuilder::new(&template, now).build_all(&contacts)?)
            }
        }
    }
}
