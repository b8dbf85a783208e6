/// Configuration management for the authentication gate
use crate::{
    cache::CacheConfig,
    error::{GateError, GateResult},
    lockout::LockoutThreshold,
    token::parse_algorithm,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub token: TokenConfig,
    pub cache: CacheConfig,
    pub activity: ActivityConfig,
    pub lockout: LockoutConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Put internal rejection reasons into error responses (trusted deployments only)
    pub debug_reasons: bool,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

/// Token verification configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
    pub algorithm: String,
    pub issuer: String,
    pub audience: String,
    /// Allowed clock skew in seconds
    pub leeway_secs: u64,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

/// Activity debounce configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Minimum seconds between two persisted touches of one session
    pub debounce_secs: i64,
    /// Map size that triggers a sweep of stale entries
    pub max_entries: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            debounce_secs: 60,
            max_entries: 1000,
        }
    }
}

/// Account lockout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutConfig {
    pub thresholds: Vec<LockoutThreshold>,
    /// Idle minutes before one failure is forgiven
    pub decay_window_minutes: i64,
    /// Seconds between decay sweeps
    pub sweep_interval_secs: u64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![
                LockoutThreshold::new(5, 5),
                LockoutThreshold::new(7, 15),
                LockoutThreshold::new(10, 60),
            ],
            decay_window_minutes: 15,
            sweep_interval_secs: 900,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_required(name: &str) -> GateResult<String> {
    env::var(name).map_err(|_| GateError::Validation(format!("{} is required", name)))
}

/// Parse `attempts:minutes` pairs separated by commas
pub fn parse_thresholds(raw: &str) -> GateResult<Vec<LockoutThreshold>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (attempts, minutes) = pair.split_once(':').ok_or_else(|| {
                GateError::Validation(format!("Invalid lockout threshold: {}", pair))
            })?;
            let attempts = attempts.trim().parse().map_err(|_| {
                GateError::Validation(format!("Invalid lockout attempts: {}", pair))
            })?;
            let minutes = minutes.trim().parse().map_err(|_| {
                GateError::Validation(format!("Invalid lockout minutes: {}", pair))
            })?;
            Ok(LockoutThreshold::new(attempts, minutes))
        })
        .collect()
}

impl GateConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> GateResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("AUTHGATE_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("AUTHGATE_PORT")
            .unwrap_or_else(|_| "2590".to_string())
            .parse()
            .map_err(|_| GateError::Validation("Invalid port number".to_string()))?;
        let debug_reasons = env_parse("AUTHGATE_DEBUG_REASONS", false);

        let database_path: PathBuf = env::var("AUTHGATE_DATABASE_PATH")
            .unwrap_or_else(|_| "./data/authgate.sqlite".to_string())
            .into();

        let token = TokenConfig {
            secret: env_required("AUTHGATE_JWT_SECRET")?,
            algorithm: env::var("AUTHGATE_JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
            issuer: env_required("AUTHGATE_JWT_ISSUER")?,
            audience: env_required("AUTHGATE_JWT_AUDIENCE")?,
            leeway_secs: env_parse("AUTHGATE_JWT_LEEWAY", 0),
        };

        let activity_defaults = ActivityConfig::default();
        let activity = ActivityConfig {
            debounce_secs: env_parse("AUTHGATE_ACTIVITY_DEBOUNCE", activity_defaults.debounce_secs),
            max_entries: env_parse("AUTHGATE_ACTIVITY_MAX_ENTRIES", activity_defaults.max_entries),
        };

        let lockout_defaults = LockoutConfig::default();
        let thresholds = match env::var("AUTHGATE_LOCKOUT_THRESHOLDS") {
            Ok(raw) => parse_thresholds(&raw)?,
            Err(_) => lockout_defaults.thresholds,
        };
        let lockout = LockoutConfig {
            thresholds,
            decay_window_minutes: env_parse(
                "AUTHGATE_LOCKOUT_DECAY_MINUTES",
                lockout_defaults.decay_window_minutes,
            ),
            sweep_interval_secs: env_parse(
                "AUTHGATE_DECAY_SWEEP_INTERVAL",
                lockout_defaults.sweep_interval_secs,
            ),
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(GateConfig {
            service: ServiceConfig {
                hostname,
                port,
                debug_reasons,
            },
            storage: StorageConfig { database_path },
            token,
            cache: CacheConfig::from_env(),
            activity,
            lockout,
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> GateResult<()> {
        if self.service.hostname.is_empty() {
            return Err(GateError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.token.secret.len() < 32 {
            return Err(GateError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }
        if self.token.issuer.is_empty() || self.token.audience.is_empty() {
            return Err(GateError::Validation(
                "JWT issuer and audience cannot be empty".to_string(),
            ));
        }
        parse_algorithm(&self.token.algorithm)?;

        if self.cache.validity_ttl == 0
            || self.cache.snapshot_ttl == 0
            || self.cache.combined_ttl == 0
        {
            return Err(GateError::Validation("Cache TTLs must be positive".to_string()));
        }

        if self.activity.debounce_secs <= 0 {
            return Err(GateError::Validation(
                "Activity debounce must be positive".to_string(),
            ));
        }

        if self.lockout.thresholds.is_empty() {
            return Err(GateError::Validation(
                "At least one lockout threshold is required".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for threshold in &self.lockout.thresholds {
            if threshold.attempts <= 0 || threshold.lockout_minutes <= 0 {
                return Err(GateError::Validation(format!(
                    "Lockout threshold {}:{} must be positive",
                    threshold.attempts, threshold.lockout_minutes
                )));
            }
            if !seen.insert(threshold.attempts) {
                return Err(GateError::Validation(format!(
                    "Duplicate lockout threshold for {} attempts",
                    threshold.attempts
                )));
            }
        }
        if self.lockout.decay_window_minutes <= 0 || self.lockout.sweep_interval_secs == 0 {
            return Err(GateError::Validation(
                "Lockout decay window and sweep interval must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GateConfig {
        GateConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".into(),
                port: 2590,
                debug_reasons: false,
            },
            storage: StorageConfig {
                database_path: "./data/test.sqlite".into(),
            },
            token: TokenConfig {
                secret: "x".repeat(32),
                algorithm: "HS256".into(),
                issuer: "issuer".into(),
                audience: "audience".into(),
                leeway_secs: 0,
            },
            cache: CacheConfig::default(),
            activity: ActivityConfig::default(),
            lockout: LockoutConfig::default(),
            logging: LoggingConfig {
                level: "info".into(),
            },
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut cfg = config();
        cfg.token.secret = "short".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_asymmetric_algorithm_rejected() {
        let mut cfg = config();
        cfg.token.algorithm = "ES256".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_parse_thresholds() {
        let parsed = parse_thresholds("5:5, 7:15,10:60").unwrap();
        assert_eq!(
            parsed,
            vec![
                LockoutThreshold::new(5, 5),
                LockoutThreshold::new(7, 15),
                LockoutThreshold::new(10, 60),
            ]
        );
        assert!(parse_thresholds("5-5").is_err());
        assert!(parse_thresholds("five:5").is_err());
    }

    #[test]
    fn test_duplicate_thresholds_rejected() {
        let mut cfg = config();
        cfg.lockout.thresholds = vec![LockoutThreshold::new(5, 5), LockoutThreshold::new(5, 10)];
        assert!(cfg.validate().is_err());

        cfg.lockout.thresholds.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_token_config_debug_redacts_secret() {
        let rendered = format!("{:?}", config().token);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&"x".repeat(32)));
    }
}
