//! Layered configuration (spec §6): compiled-in defaults, overridden by an
//! optional `scheduler.toml`, overridden again by `SCHEDULER_*` environment
//! variables. Each layer only needs to set what it wants to change — the
//! same `#[serde(default)]`-per-field shape the teacher uses for
//! `.shipper.toml`, since a config file that has to restate every field to
//! change one is the kind of thing that breaks silently on upgrade.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use scheduler_auth::{AuthConfig, AuthMode};
use scheduler_retry::BackoffConfig;
use scheduler_webhook::TriggerConfig;

/// Root configuration for the service (spec §6 configuration table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub service_name: String,
    pub store_base_dir: Option<String>,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub execution: TriggerConfig,
    #[serde(default)]
    pub retry: BackoffConfig,
    pub log_level: String,
}

/// `AuthConfig` lives in `scheduler-auth` without a `Default` impl (an
/// `AuthMode` always needs a caller-supplied choice); this wraps it with one
/// so the whole `SchedulerConfig` can derive `Default` for the defaults
/// layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSection {
    pub mode: AuthMode,
    pub verification_token: Option<String>,
    pub expected_audience: Option<String>,
    pub expected_issuer: Option<String>,
    pub expected_service_account_email: Option<String>,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            mode: AuthMode::Token,
            verification_token: None,
            expected_audience: None,
            expected_issuer: None,
            expected_service_account_email: None,
        }
    }
}

impl From<AuthSection> for AuthConfig {
    fn from(s: AuthSection) -> Self {
        AuthConfig {
            mode: s.mode,
            verification_token: s.verification_token,
            expected_audience: s.expected_audience,
            expected_issuer: s.expected_issuer,
            expected_service_account_email: s.expected_service_account_email,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            service_name: "scheduler".to_string(),
            store_base_dir: None,
            auth: AuthSection::default(),
            execution: TriggerConfig::default(),
            retry: BackoffConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Start from [`SchedulerConfig::default`], merge an optional
    /// `scheduler.toml` at `path` (if it exists), then apply `SCHEDULER_*`
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SCHEDULER_SERVICE_NAME") {
            self.service_name = v;
        }
        if let Ok(v) = std::env::var("SCHEDULER_STORE_BASE_DIR") {
            self.store_base_dir = Some(v);
        }
        if let Ok(v) = std::env::var("SCHEDULER_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("SCHEDULER_VERIFICATION_TOKEN") {
            self.auth.verification_token = Some(v);
        }
        if let Ok(v) = std::env::var("SCHEDULER_AUTH_MODE") {
            self.auth.mode = match v.as_str() {
                "identity_token" => AuthMode::IdentityToken,
                "none" => AuthMode::None,
                _ => AuthMode::Token,
            };
        }
        if let Ok(v) = std::env::var("SCHEDULER_EXPECTED_AUDIENCE") {
            self.auth.expected_audience = Some(v);
        }
        if let Ok(v) = std::env::var("SCHEDULER_EXPECTED_ISSUER") {
            self.auth.expected_issuer = Some(v);
        }
        if let Ok(v) = std::env::var("SCHEDULER_EXPECTED_SERVICE_ACCOUNT_EMAIL") {
            self.auth.expected_service_account_email = Some(v);
        }
        if let Ok(v) = std::env::var("SCHEDULER_EXECUTION_ENABLED") {
            self.execution.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("SCHEDULER_EXECUTION_URL") {
            self.execution.url = Some(v);
        }
        if let Ok(v) = std::env::var("SCHEDULER_EXECUTION_SIGNING_SECRET") {
            self.execution.signing_secret = Some(v);
        }
    }

    /// Basic sanity checks the way `ShipperConfig::validate` does — catch
    /// self-contradictory config at startup instead of at first request.
    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            anyhow::bail!("service_name must not be empty");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be greater than 0");
        }
        if self.auth.mode == AuthMode::Token && self.auth.verification_token.is_none() {
            anyhow::bail!("auth.mode is \"token\" but no verification_token is configured");
        }
        if self.execution.enabled && self.execution.url.is_none() {
            anyhow::bail!("execution.enabled is true but no execution.url is configured");
        }
        Ok(())
    }
}
