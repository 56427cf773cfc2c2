use serde::Deserialize;

use crate::accounting::GroupBy;
use crate::history_repo::HistoryBackend;
use crate::models::EntityKind;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub accounting: AccountingConfig,
    pub storage: StorageConfig,
    /// Optional read-only status API.
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SourceKind {
    /// MikroTik RouterOS API over TCP.
    #[serde(rename = "routeros")]
    RouterOs,
    /// This host's own interfaces.
    #[serde(rename = "local")]
    Local,
}

#[derive(Clone, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    #[serde(default)]
    pub entities: EntityKind,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Bound on one whole source query (connect + login + print).
    #[serde(default = "default_source_timeout_ms")]
    pub timeout_ms: u64,
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("kind", &self.kind)
            .field("entities", &self.entities)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

fn default_api_port() -> u16 {
    8728
}

fn default_source_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountingConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Cron expression (sec min hour dom mon dow), local time. Overrides poll_interval_secs.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Defaults to source_address for connections and entity for interfaces.
    #[serde(default)]
    pub group_by: Option<GroupBy>,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            schedule: None,
            top_n: default_top_n(),
            group_by: None,
        }
    }
}

impl AccountingConfig {
    pub fn group_by_for(&self, kind: EntityKind) -> GroupBy {
        self.group_by.unwrap_or(match kind {
            EntityKind::Interfaces => GroupBy::Entity,
            EntityKind::Connections => GroupBy::SourceAddress,
        })
    }
}

fn default_poll_interval_secs() -> u64 {
    3600
}

fn default_top_n() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub history_path: String,
    #[serde(default)]
    pub history_backend: HistoryBackend,
    pub snapshot_path: String,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl AppConfig {
    /// Read `$CONFIG_FILE` (default config.toml), apply `API_*` environment overrides, validate.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path, e))?;
        let mut config: AppConfig = toml::from_str(&s)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests). No environment overrides.
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Device connection settings from `API_HOST`, `API_PORT`, `API_USERNAME`, `API_PASSWORD`
    /// (the .env convention of existing deployments) win over the file.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(host) = lookup("API_HOST") {
            self.source.host = host;
        }
        if let Some(port) = lookup("API_PORT") {
            self.source.port = port
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("API_PORT {:?} is not a port: {}", port, e))?;
        }
        if let Some(username) = lookup("API_USERNAME") {
            self.source.username = username;
        }
        if let Some(password) = lookup("API_PASSWORD") {
            self.source.password = Some(password);
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.source.timeout_ms > 0,
            "source.timeout_ms must be > 0, got {}",
            self.source.timeout_ms
        );
        match self.source.kind {
            SourceKind::RouterOs => {
                anyhow::ensure!(
                    !self.source.host.is_empty(),
                    "source.host must be non-empty for routeros (or set API_HOST)"
                );
                anyhow::ensure!(
                    self.source.port > 0,
                    "source.port must be between 1 and 65535, got {}",
                    self.source.port
                );
                anyhow::ensure!(
                    !self.source.username.is_empty(),
                    "source.username must be non-empty for routeros (or set API_USERNAME)"
                );
                anyhow::ensure!(
                    self.source.password.is_some(),
                    "source.password must be set for routeros (or set API_PASSWORD)"
                );
            }
            SourceKind::Local => {
                anyhow::ensure!(
                    self.source.entities == EntityKind::Interfaces,
                    "source.entities = \"connections\" requires kind = \"routeros\""
                );
            }
        }
        anyhow::ensure!(
            self.accounting.poll_interval_secs > 0,
            "accounting.poll_interval_secs must be > 0, got {}",
            self.accounting.poll_interval_secs
        );
        anyhow::ensure!(
            self.accounting.top_n > 0,
            "accounting.top_n must be > 0, got {}",
            self.accounting.top_n
        );
        if let Some(ref expr) = self.accounting.schedule {
            if let Err(e) = expr.parse::<cron::Schedule>() {
                anyhow::bail!(
                    "accounting.schedule {:?} is not a valid cron expression: {}",
                    expr,
                    e
                );
            }
        }
        anyhow::ensure!(
            !self.storage.history_path.is_empty(),
            "storage.history_path must be non-empty"
        );
        anyhow::ensure!(
            !self.storage.snapshot_path.is_empty(),
            "storage.snapshot_path must be non-empty"
        );
        anyhow::ensure!(
            self.storage.history_path != self.storage.snapshot_path,
            "storage.history_path and storage.snapshot_path must differ"
        );
        anyhow::ensure!(
            self.storage.write_timeout_ms > 0,
            "storage.write_timeout_ms must be > 0, got {}",
            self.storage.write_timeout_ms
        );
        if let Some(ref server) = self.server {
            anyhow::ensure!(
                server.port > 0,
                "server.port must be between 1 and 65535, got {}",
                server.port
            );
        }
        Ok(())
    }
}
