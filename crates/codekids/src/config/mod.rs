use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const DEFAULT_SUCCESS_RESET_MS: u64 = 3_000;
const DEFAULT_VERIFICATION_TTL_HOURS: i64 = 72;
const GENERATED_SECRET_LEN: usize = 48;

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub registration: RegistrationConfig,
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
        let log_format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );

        let success_reset_ms = match env::var("APP_SUCCESS_RESET_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidSuccessReset)?,
            Err(_) => DEFAULT_SUCCESS_RESET_MS,
        };

        let verification = VerificationConfig::from_env(environment)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            registration: RegistrationConfig {
                success_display: Duration::from_millis(success_reset_ms),
                verification,
            },
        })
    }
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Knobs for the submission and verification workflow.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// How long the confirmation state stays on screen before the form resets.
    pub success_display: Duration,
    pub verification: VerificationConfig,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            success_display: Duration::from_millis(DEFAULT_SUCCESS_RESET_MS),
            verification: VerificationConfig::default(),
        }
    }
}

/// Which kind of link the confirmation flow accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    /// Signed, expiring, single-use tokens.
    SignedToken,
    /// Bare `?email=` links. Anyone who knows an address can verify it.
    EmailLink,
}

impl VerificationMode {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "signed_token" | "token" => Ok(Self::SignedToken),
            "email_link" | "email" => Ok(Self::EmailLink),
            _ => Err(ConfigError::InvalidVerificationMode(value.to_string())),
        }
    }
}

#[derive(Clone)]
pub struct VerificationConfig {
    pub mode: VerificationMode,
    pub secret: String,
    pub token_ttl: chrono::Duration,
    pub public_url: String,
}

impl fmt::Debug for VerificationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationConfig")
            .field("mode", &self.mode)
            .field("secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("public_url", &self.public_url)
            .finish()
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            mode: VerificationMode::SignedToken,
            secret: nanoid::nanoid!(GENERATED_SECRET_LEN),
            token_ttl: chrono::Duration::hours(DEFAULT_VERIFICATION_TTL_HOURS),
            public_url: "http://localhost:3000".to_string(),
        }
    }
}

impl VerificationConfig {
    fn from_env(environment: AppEnvironment) -> Result<Self, ConfigError> {
        let mode = match env::var("APP_VERIFICATION_MODE") {
            Ok(raw) => VerificationMode::parse(&raw)?,
            Err(_) => VerificationMode::SignedToken,
        };

        let secret = match env::var("APP_VERIFICATION_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if environment == AppEnvironment::Production
                && mode == VerificationMode::SignedToken =>
            {
                return Err(ConfigError::MissingVerificationSecret);
            }
            // Links issued with a generated secret stop working on restart.
            _ => nanoid::nanoid!(GENERATED_SECRET_LEN),
        };

        let ttl_hours = match env::var("APP_VERIFICATION_TTL_HOURS") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|hours| *hours > 0)
                .ok_or(ConfigError::InvalidVerificationTtl)?,
            Err(_) => DEFAULT_VERIFICATION_TTL_HOURS,
        };

        let public_url = env::var("APP_PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            mode,
            secret,
            token_ttl: chrono::Duration::hours(ttl_hours),
            public_url,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidSuccessReset,
    InvalidVerificationMode(String),
    InvalidVerificationTtl,
    MissingVerificationSecret,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidSuccessReset => {
                write!(f, "APP_SUCCESS_RESET_MS must be a whole number of milliseconds")
            }
            ConfigError::InvalidVerificationMode(value) => write!(
                f,
                "APP_VERIFICATION_MODE '{value}' must be 'signed_token' or 'email_link'"
            ),
            ConfigError::InvalidVerificationTtl => {
                write!(f, "APP_VERIFICATION_TTL_HOURS must be a positive integer")
            }
            ConfigError::MissingVerificationSecret => write!(
                f,
                "APP_VERIFICATION_SECRET is required in production when signed tokens are enabled"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
