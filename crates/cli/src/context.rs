//! Settings shared by every command

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use seedbed_backend::SupabaseAdmin;
use seedbed_common::config::load_env_file;
use seedbed_common::{HarnessConfig, SupabaseConfig};

/// Resolved global options
#[derive(Debug, Clone)]
pub struct Context {
    pub env_file: PathBuf,
    pub harness: HarnessConfig,
}

impl Context {
    /// Load the harness config and seed the environment from the env file.
    ///
    /// An explicit `env_file` wins over the one named in the harness config.
    pub fn load(env_file: Option<&Path>, config: &Path) -> Result<Self> {
        let harness = HarnessConfig::load(config)
            .with_context(|| format!("Failed to load {}", config.display()))?;
        let env_file = env_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| harness.env_file.clone());
        load_env_file(&env_file);

        Ok(Self { env_file, harness })
    }

    /// Administrative client for the configured project
    pub fn admin(&self) -> Result<SupabaseAdmin> {
        let env_file = self.env_file.display().to_string();
        let config = SupabaseConfig::from_lookup(&env_file, |name| std::env::var(name).ok())?;
        tracing::debug!("Using Supabase at {}", config.url);
        Ok(SupabaseAdmin::new(&config)?)
    }
}
