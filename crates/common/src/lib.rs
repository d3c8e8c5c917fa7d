//! Seedbed Common Library
//!
//! Shared types, configuration and errors used by the backend client, the
//! test harness and the operator CLI.

pub mod config;
pub mod error;
pub mod types;

pub use config::{HarnessConfig, SetupTimeouts, SupabaseConfig};
pub use error::{Error, Result};
pub use types::*;

/// Seedbed version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Domain used for every generated test email address
pub const TEST_EMAIL_DOMAIN: &str = "test.local";
