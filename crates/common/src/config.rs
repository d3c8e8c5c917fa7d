//! Harness configuration
//!
//! Connection settings come from the environment (optionally seeded from an
//! env file such as `.env.test`); harness tuning comes from an optional TOML
//! file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};

/// Project URL of the Supabase instance
pub const SUPABASE_URL_VAR: &str = "NEXT_PUBLIC_SUPABASE_URL";

/// Service-role key used for administrative calls
pub const SERVICE_ROLE_KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";

/// Override for the env file location
pub const ENV_FILE_VAR: &str = "SEEDBED_ENV_FILE";

/// Override for the application under test
pub const APP_URL_VAR: &str = "SEEDBED_APP_URL";

pub const DEFAULT_ENV_FILE: &str = ".env.test";
pub const DEFAULT_APP_URL: &str = "http://localhost:2000";

/// Connection settings for the administrative backend client
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Base project URL, e.g. `http://127.0.0.1:54321`
    pub url: Url,

    /// Service-role key; bypasses row level security
    pub service_role_key: String,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url.as_str())
            .field("service_role_key", &"<redacted>")
            .finish()
    }
}

impl SupabaseConfig {
    /// Build a config from explicit values
    pub fn new(url: &str, service_role_key: impl Into<String>) -> Result<Self> {
        let service_role_key = service_role_key.into();
        if service_role_key.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "{SERVICE_ROLE_KEY_VAR} must not be empty"
            )));
        }

        Ok(Self {
            url: Url::parse(url.trim())?,
            service_role_key,
        })
    }

    /// Load the env file named by `SEEDBED_ENV_FILE` (default `.env.test`)
    /// and read the connection settings
    pub fn from_env() -> Result<Self> {
        let env_file = std::env::var(ENV_FILE_VAR).unwrap_or_else(|_| DEFAULT_ENV_FILE.to_string());
        Self::from_env_file(Path::new(&env_file))
    }

    /// Load `env_file` (if present) and read the connection settings
    pub fn from_env_file(env_file: &Path) -> Result<Self> {
        load_env_file(env_file);
        Self::from_lookup(&env_file.display().to_string(), |name| std::env::var(name).ok())
    }

    /// Read the connection settings through an arbitrary variable lookup.
    ///
    /// `env_file` is only used to make the error message actionable.
    pub fn from_lookup<F>(env_file: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        match (present(SUPABASE_URL_VAR), present(SERVICE_ROLE_KEY_VAR)) {
            (Some(url), Some(key)) => Self::new(&url, key),
            _ => Err(Error::Configuration(format!(
                "Missing Supabase environment variables. \
                 Ensure {SUPABASE_URL_VAR} and {SERVICE_ROLE_KEY_VAR} are set in {env_file}"
            ))),
        }
    }
}

/// Seed the process environment from an env file.
///
/// Variables already set win. A missing file is normal (CI sets variables
/// directly); a malformed one is reported and otherwise ignored.
pub fn load_env_file(path: &Path) {
    if !path.exists() {
        debug!("No env file at {}", path.display());
        return;
    }

    match dotenvy::from_path(path) {
        Ok(()) => debug!("Loaded environment from {}", path.display()),
        Err(e) => warn!("Failed to load env file {}: {}", path.display(), e),
    }
}

/// Harness tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Application under test
    pub app_url: String,

    /// Env file holding the Supabase credentials, used when neither
    /// `--env-file` nor `SEEDBED_ENV_FILE` names one
    pub env_file: PathBuf,

    /// Per-test timeout
    pub test_timeout_ms: u64,

    /// Extra attempts for failed or timed-out tests
    pub retries: u32,

    pub setup: SetupTimeouts,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            app_url: std::env::var(APP_URL_VAR).unwrap_or_else(|_| DEFAULT_APP_URL.to_string()),
            env_file: PathBuf::from(DEFAULT_ENV_FILE),
            test_timeout_ms: 30_000,
            retries: 0,
            setup: SetupTimeouts::default(),
        }
    }
}

impl HarnessConfig {
    /// Load from a TOML file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No harness config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.test_timeout_ms)
    }
}

/// Timeouts for the local Supabase lifecycle commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupTimeouts {
    pub start_timeout_secs: u64,
    pub migrate_timeout_secs: u64,
    pub app_ready_timeout_secs: u64,
}

impl Default for SetupTimeouts {
    fn default() -> Self {
        Self {
            start_timeout_secs: 120,
            migrate_timeout_secs: 60,
            app_ready_timeout_secs: 120,
        }
    }
}
