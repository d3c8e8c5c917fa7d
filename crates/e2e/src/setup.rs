//! Global setup and teardown of the local Supabase stack
//!
//! Tests own their data, so setup never resets the database: it only makes
//! sure Docker is up, Supabase is running and pending migrations are applied.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use seedbed_common::HarnessConfig;

use crate::error::{E2eError, E2eResult};

/// Marker printed by `supabase status` when the stack is up
const RUNNING_MARKER: &str = "API URL";

/// How to reach the tools that manage the local stack
#[derive(Debug, Clone)]
pub struct SetupConfig {
    /// Docker executable used for the liveness check
    pub docker: String,

    /// Command prefix for the Supabase CLI
    pub supabase_cli: Vec<String>,

    /// Directory holding the `supabase/` project (None = current dir)
    pub project_dir: Option<PathBuf>,

    pub status_timeout: Duration,
    pub start_timeout: Duration,
    pub migrate_timeout: Duration,
    pub stop_timeout: Duration,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self::from(&HarnessConfig::default())
    }
}

impl From<&HarnessConfig> for SetupConfig {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            docker: "docker".to_string(),
            supabase_cli: vec!["npx".to_string(), "supabase".to_string()],
            project_dir: None,
            status_timeout: Duration::from_secs(30),
            start_timeout: Duration::from_secs(config.setup.start_timeout_secs),
            migrate_timeout: Duration::from_secs(config.setup.migrate_timeout_secs),
            stop_timeout: Duration::from_secs(60),
        }
    }
}

/// Captured result of a finished command
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    stdout: String,
}

/// Make sure Supabase is running with every migration applied
pub async fn global_setup(config: &SetupConfig) -> E2eResult<()> {
    info!("E2E setup starting");

    let docker = run_command(config, &config.docker, &["info"], config.status_timeout).await;
    match docker {
        Ok(out) if out.success => debug!("Docker is running"),
        Ok(_) => return Err(E2eError::DockerUnavailable),
        Err(e) => {
            debug!("docker info failed: {}", e);
            return Err(E2eError::DockerUnavailable);
        }
    }

    let status = supabase(config, &["status"], config.status_timeout).await?;
    if supabase_is_running(status.success, &status.stdout) {
        info!("Supabase is already running, applying pending migrations");
        require_success(
            "supabase migration up",
            supabase(config, &["migration", "up"], config.migrate_timeout).await?,
        )?;
    } else {
        info!("Starting local Supabase");
        require_success(
            "supabase start",
            supabase(config, &["start"], config.start_timeout).await?,
        )?;
    }

    info!("E2E setup complete");
    Ok(())
}

/// Finish a run. Supabase is left running for inspection unless `stop` is set.
pub async fn global_teardown(config: &SetupConfig, stop: bool) -> E2eResult<()> {
    info!("E2E teardown starting");

    if stop {
        require_success(
            "supabase stop",
            supabase(config, &["stop"], config.stop_timeout).await?,
        )?;
        info!("Local Supabase stopped");
    } else {
        info!("Leaving local Supabase running");
    }

    Ok(())
}

/// Whether `supabase status` reported a running stack
pub fn supabase_is_running(success: bool, stdout: &str) -> bool {
    success && stdout.contains(RUNNING_MARKER)
}

/// Poll `url` until it answers with a success status
pub async fn wait_for_app(url: &str, timeout_duration: Duration) -> E2eResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    while start.elapsed() < timeout_duration {
        attempts += 1;

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Application is ready at {}", url);
                return Ok(());
            }
            Ok(resp) => {
                warn!("Readiness check returned {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for application at {}...", url);
                }
                if !e.is_connect() {
                    warn!("Readiness check error: {}", e);
                }
            }
        }

        sleep(Duration::from_millis(250)).await;
    }

    Err(E2eError::AppUnavailable {
        url: url.to_string(),
        attempts,
    })
}

async fn supabase(
    config: &SetupConfig,
    args: &[&str],
    limit: Duration,
) -> E2eResult<CommandOutput> {
    let (program, prefix) = config.supabase_cli.split_first().ok_or_else(|| {
        E2eError::Configuration("Supabase CLI command is empty".to_string())
    })?;

    let mut full: Vec<&str> = prefix.iter().map(String::as_str).collect();
    full.extend_from_slice(args);
    run_command(config, program, &full, limit).await
}

async fn run_command(
    config: &SetupConfig,
    program: &str,
    args: &[&str],
    limit: Duration,
) -> E2eResult<CommandOutput> {
    let cmdline = format!("{} {}", program, args.join(" "));
    debug!("Running: {}", cmdline);

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &config.project_dir {
        cmd.current_dir(dir);
    }

    let child = cmd.spawn().map_err(|e| E2eError::SetupCommand {
        command: cmdline.clone(),
        reason: e.to_string(),
    })?;

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => return Err(E2eError::Timeout(cmdline)),
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        debug!("{} stderr: {}", cmdline, stderr.trim());
    }

    Ok(CommandOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    })
}

fn require_success(command: &str, output: CommandOutput) -> E2eResult<()> {
    if output.success {
        Ok(())
    } else {
        Err(E2eError::SetupCommand {
            command: command.to_string(),
            reason: "exited with a non-zero status".to_string(),
        })
    }
}
