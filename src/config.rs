//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `server.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - HttpConfig: Where the ingestion server binds.
//!     - DatabaseConfig: TimescaleDB connection settings and retry pacing.
//!     - LivenessConfig: Staleness threshold for /status.
//!     - LoggingConfig: Log level and per-reading log toggle.
//!     - SimulatorConfig: Target and pacing for the sensor simulator.
//!
//! every section carries defaults, so a file only needs the keys it changes.
//!
//! ==============================================================================

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SENSOR_INGEST_CONFIG";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8000 }
    }
}

impl HttpConfig {
    /// host may be a name ("localhost") or an IP literal; resolved at bind time
    pub fn bind_target(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

/// Which storage backend the server writes through.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    pub name: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub application_name: String,
    /// fixed pause between connection attempts
    pub retry_delay_seconds: u64,
    /// `None` retries forever
    pub max_connect_attempts: Option<u32>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Postgres,
            name: "tr2_banco".to_string(),
            user: "admin".to_string(),
            password: "1234".to_string(),
            host: "localhost".to_string(),
            port: 5433,
            application_name: "sensor-ingest".to_string(),
            retry_delay_seconds: 5,
            max_connect_attempts: None,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
            .application_name(&self.application_name)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LivenessConfig {
    /// 30 minutes
    pub max_age_seconds: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self { max_age_seconds: 1800 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulatorConfig {
    pub target_url: String,
    pub sensor_id: String,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            target_url: "http://localhost:8000/sensor".to_string(),
            sensor_id: "sensor_simulado".to_string(),
            interval_seconds: 300,
            timeout_seconds: 10,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load with default fallback
    ///
    /// `SENSOR_INGEST_CONFIG` wins when set; a broken file named there is an
    /// error rather than a silent fallback.
    pub fn load_or_default() -> anyhow::Result<Self> {
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            let config = Self::load(&explicit)?;
            println!("[CONFIG] Loaded from {}", explicit);
            return Ok(config);
        }

        let paths = [
            PathBuf::from("config").join("server.toml"),
            PathBuf::from("..").join("config").join("server.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Ok(Self::default())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│          SERVER CONFIGURATION           │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Bind: {}:{}", self.server.host, self.server.port);
        println!("│ Storage: {:?}", self.database.backend);
        if self.database.backend == StorageBackend::Postgres {
            println!(
                "│ Database: {}@{}:{}/{}",
                self.database.user, self.database.host, self.database.port, self.database.name
            );
        }
        println!("│ Liveness Threshold: {}s", self.liveness.max_age_seconds);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}
