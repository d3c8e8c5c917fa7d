//! Seedbed CLI - Main Entry Point
//!
//! Brings the local Supabase stack up or down and inspects or removes test
//! users.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use seedbed_cli::commands::{setup, users};
use seedbed_cli::context::Context;
use seedbed_common::config::ENV_FILE_VAR;

/// Seedbed - test data lifecycle for Supabase-backed E2E suites
#[derive(Parser)]
#[command(name = "seedbed")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Env file holding the Supabase credentials [default: from the harness
    /// config, else .env.test]
    #[arg(long, env = ENV_FILE_VAR, global = true)]
    env_file: Option<PathBuf>,

    /// Harness config file
    #[arg(long, default_value = "seedbed.toml", global = true)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure Docker and local Supabase are up with migrations applied
    Setup(setup::SetupArgs),

    /// Finish a run, optionally stopping local Supabase
    Teardown(setup::TeardownArgs),

    /// Inspect and manage auth users
    #[command(subcommand)]
    Users(users::UsersCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; --debug wins over RUST_LOG
    let filter = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let ctx = Context::load(cli.env_file.as_deref(), &cli.config)?;

    match cli.command {
        Commands::Setup(args) => setup::setup(args, &ctx).await?,
        Commands::Teardown(args) => setup::teardown(args, &ctx).await?,
        Commands::Users(cmd) => {
            let admin = ctx.admin()?;
            users::execute(cmd, &admin).await?
        }
    }

    Ok(())
}
