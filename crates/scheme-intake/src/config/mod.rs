use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::intake::{RetryPolicy, VerificationPolicy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub verification: VerificationConfig,
    pub drafts: DraftConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let storage = StorageConfig {
            profiles_db: path_var("USERS_DB_PATH", "data/users.db"),
            schemes_db: path_var("SCHEMES_DB_PATH", "data/schemes.db"),
            applications_db: path_var("APPLICATION_DB_PATH", "data/applications.db"),
            render_dir: path_var("APPLICATION_RENDER_DIR", "data/applications"),
            write_retries: number_var("STORE_WRITE_RETRIES", 3)?,
        };

        let verification = VerificationConfig {
            max_rd_attempts: number_var("RD_MAX_ATTEMPTS", 5)?,
        };

        let drafts = DraftConfig {
            idle_ttl_secs: number_var("APP_DRAFT_TTL", 1800)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            storage,
            verification,
            drafts,
        })
    }
}

fn path_var(name: &str, default: &str) -> PathBuf {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

/// Unsigned widths accepted from the environment.
trait EnvNumber: TryFrom<u64> {
    const MAX: u64;
}

impl EnvNumber for u8 {
    const MAX: u64 = u8::MAX as u64;
}

impl EnvNumber for u32 {
    const MAX: u64 = u32::MAX as u64;
}

impl EnvNumber for u64 {
    const MAX: u64 = u64::MAX;
}

fn number_var<T: EnvNumber>(name: &'static str, default: T) -> Result<T, ConfigError> {
    let raw = match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(default),
    };
    raw.trim()
        .parse::<u64>()
        .ok()
        .and_then(|value| T::try_from(value).ok())
        .ok_or(ConfigError::InvalidNumber {
            name,
            value: raw,
            max: T::MAX,
        })
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Database locations and the rendered-artifact directory.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub profiles_db: PathBuf,
    pub schemes_db: PathBuf,
    pub applications_db: PathBuf,
    pub render_dir: PathBuf,
    pub write_retries: u32,
}

impl StorageConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.write_retries)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VerificationConfig {
    /// Zero disables the cap.
    pub max_rd_attempts: u8,
}

impl VerificationConfig {
    pub fn policy(&self) -> VerificationPolicy {
        VerificationPolicy::new(self.max_rd_attempts)
    }
}

/// Lifetime of unfinished application drafts.
#[derive(Debug, Clone, Copy)]
pub struct DraftConfig {
    /// Seconds a draft may sit idle; zero keeps drafts until confirmed or cancelled.
    pub idle_ttl_secs: u64,
}

impl DraftConfig {
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_ttl_secs > 0).then(|| Duration::from_secs(self.idle_ttl_secs))
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber {
        name: &'static str,
        value: String,
        max: u64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name, value, max } => {
                write!(f, "{name} must be an integer between 0 and {max}, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
