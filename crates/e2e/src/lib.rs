//! Seedbed E2E harness
//!
//! Every test gets its own [`TestDataFactory`]. Whatever the factory creates
//! (auth users, table rows, arbitrary resources registered through
//! `on_cleanup`) is torn down in reverse order once the test ends, whether it
//! passed, failed, panicked or timed out. Cleanup problems are logged and
//! never change the test's outcome.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TestRunner                              │
//! │    ├── run_with_test_data(backend, limits, body)            │
//! │    │     ├── TestDataFactory::new(backend)                  │
//! │    │     ├── body(factory)   (timeout / cancel / panic)     │
//! │    │     └── factory.cleanup()   callbacks LIFO, users LIFO │
//! │    └── Reporter::{on_begin, on_test_end, on_end}            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  AdminBackend (seedbed-backend)                             │
//! │    ├── SupabaseAdmin   Auth admin API + PostgREST           │
//! │    └── InMemoryBackend                                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  setup: docker info → supabase status → start | migrate     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod factory;
pub mod fixture;
pub mod reporter;
pub mod runner;
pub mod setup;

pub use error::{E2eError, E2eResult};
pub use factory::{CleanupWarning, CreateUserOptions, TestDataFactory};
pub use fixture::{run_with_test_data, with_test_data, BodyOutcome, Fixtures, Limits};
pub use reporter::{
    JsonReporter, ListReporter, Reporter, RunResult, RunSummary, SummaryReporter, TestInfo,
    TestOutcome,
};
pub use runner::{RunnerConfig, TestCase, TestRunner};
pub use setup::{global_setup, global_teardown, wait_for_app, SetupConfig};

/// Install a test-friendly tracing subscriber.
///
/// Honors `RUST_LOG` (default `warn`, so cleanup warnings show up). Safe to
/// call from every test.
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
