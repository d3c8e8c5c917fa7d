//! Local stack lifecycle commands

use anyhow::Result;
use clap::Args;
use std::time::Duration;

use seedbed_e2e::{global_setup, global_teardown, wait_for_app, SetupConfig};

use crate::context::Context;
use crate::output::{print_info, print_success};

#[derive(Args, Debug)]
pub struct SetupArgs {
    /// Also wait for the application under test to answer
    #[arg(long)]
    pub wait_for_app: bool,
}

#[derive(Args, Debug)]
pub struct TeardownArgs {
    /// Stop local Supabase instead of leaving it running
    #[arg(long)]
    pub stop: bool,
}

pub async fn setup(args: SetupArgs, ctx: &Context) -> Result<()> {
    print_info("E2E setup starting...");
    global_setup(&SetupConfig::from(&ctx.harness)).await?;

    if args.wait_for_app {
        let timeout = Duration::from_secs(ctx.harness.setup.app_ready_timeout_secs);
        wait_for_app(&ctx.harness.app_url, timeout).await?;
        print_success(&format!("Application ready at {}", ctx.harness.app_url));
    }

    print_success("E2E setup complete");
    print_info("Each test creates and cleans up its own data");
    Ok(())
}

pub async fn teardown(args: TeardownArgs, ctx: &Context) -> Result<()> {
    global_teardown(&SetupConfig::from(&ctx.harness), args.stop).await?;

    if args.stop {
        print_success("Local Supabase stopped");
    } else {
        print_success("E2E teardown complete");
        print_info("Run `seedbed teardown --stop` to stop local Supabase");
    }
    Ok(())
}
