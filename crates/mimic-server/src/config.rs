use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Warehouse validations
        if self.warehouse.project_id.trim().is_empty() {
            return Err("warehouse.project_id must not be empty".into());
        }
        if self.warehouse.dataset_id.trim().is_empty() {
            return Err("warehouse.dataset_id must not be empty".into());
        }
        if self.warehouse.location.trim().is_empty() {
            return Err("warehouse.location must not be empty".into());
        }
        if self.warehouse.backend == WarehouseBackend::Bigquery {
            if self.warehouse.bigquery.endpoint.trim().is_empty() {
                return Err("warehouse.backend=bigquery requires warehouse.bigquery.endpoint".into());
            }
            if self.warehouse.bigquery.request_timeout_ms == 0 {
                return Err("warehouse.bigquery.request_timeout_ms must be > 0".into());
            }
        }
        // Query validations
        if self.query.redeem_timeout_ms == 0 {
            return Err("query.redeem_timeout_ms must be > 0".into());
        }
        if self.query.write_poll_interval_ms == 0 {
            return Err("query.write_poll_interval_ms must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn redeem_timeout(&self) -> Duration {
        Duration::from_millis(self.query.redeem_timeout_ms)
    }

    pub fn write_poll_interval(&self) -> Duration {
        Duration::from_millis(self.query.write_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// Engine the record service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackend {
    /// In-process engine; data lives as long as the server.
    #[default]
    Memory,
    /// Google BigQuery over its REST API.
    Bigquery,
}

impl WarehouseBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarehouseBackend::Memory => "memory",
            WarehouseBackend::Bigquery => "bigquery",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default)]
    pub backend: WarehouseBackend,
    /// Project that owns the dataset and runs the jobs.
    #[serde(default = "default_project_id")]
    pub project_id: String,
    /// Dataset holding PATIENTS, ADMISSIONS, QUESTIONS and ANSWERS.
    #[serde(default = "default_dataset_id")]
    pub dataset_id: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default)]
    pub bigquery: BigQueryConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

fn default_project_id() -> String {
    "barbara2-451412".into()
}
fn default_dataset_id() -> String {
    "MIMIC".into()
}
fn default_location() -> String {
    "US".into()
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            backend: WarehouseBackend::default(),
            project_id: default_project_id(),
            dataset_id: default_dataset_id(),
            location: default_location(),
            bigquery: BigQueryConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigQueryConfig {
    #[serde(default = "default_bigquery_endpoint")]
    pub endpoint: String,
    /// OAuth2 access token; requests are sent unauthenticated when unset.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_bigquery_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_bigquery_endpoint() -> String {
    mimic_db_bigquery::DEFAULT_ENDPOINT.into()
}
fn default_bigquery_request_timeout() -> u64 {
    60_000
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_bigquery_endpoint(),
            access_token: None,
            request_timeout_ms: default_bigquery_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Simulated running time of every job.
    #[serde(default)]
    pub execution_delay_ms: u64,
    /// How long a finished job stays redeemable.
    #[serde(default = "default_job_retention")]
    pub job_retention_secs: u64,
}

fn default_job_retention() -> u64 {
    3600
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            execution_delay_ms: 0,
            job_retention_secs: default_job_retention(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Upper bound for one redemption attempt.
    #[serde(default = "default_redeem_timeout")]
    pub redeem_timeout_ms: u64,
    /// Length of each wait while a write job runs.
    #[serde(default = "default_write_poll_interval")]
    pub write_poll_interval_ms: u64,
}

fn default_redeem_timeout() -> u64 {
    30_000
}
fn default_write_poll_interval() -> u64 {
    1_000
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            redeem_timeout_ms: default_redeem_timeout(),
            write_poll_interval_ms: default_write_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, relative to the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "mimic.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., MIMIC__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("MIMIC")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
