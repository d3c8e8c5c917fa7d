//! Test runner that injects a fresh data factory into every test and drives
//! the registered reporters

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use seedbed_backend::AdminBackend;
use seedbed_common::{HarnessConfig, RunStatus, TestStatus};

use crate::factory::{panic_message, TestDataFactory};
use crate::fixture::{run_with_test_data, BodyOutcome, Limits};
use crate::reporter::{Reporter, RunResult, TestInfo, TestOutcome};

type TestBody =
    Arc<dyn Fn(TestDataFactory) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A named test with its body
#[derive(Clone)]
pub struct TestCase {
    pub info: TestInfo,
    pub skip: bool,
    body: TestBody,
}

impl TestCase {
    pub fn new<F, Fut>(title: impl Into<String>, file: impl Into<String>, body: F) -> Self
    where
        F: Fn(TestDataFactory) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            info: TestInfo {
                title: title.into(),
                file: file.into(),
            },
            skip: false,
            body: Arc::new(move |data| body(data).boxed()),
        }
    }

    /// Report the test as skipped without running it
    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Deadline for a single attempt
    pub test_timeout: Duration,

    /// Extra attempts for failed or timed-out tests
    pub retries: u32,

    /// Only run tests whose title contains this text
    pub filter: Option<String>,

    /// Budget for the whole run; remaining tests are not started once spent
    pub global_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            test_timeout: Duration::from_secs(30),
            retries: 0,
            filter: None,
            global_timeout: None,
        }
    }
}

impl From<&HarnessConfig> for RunnerConfig {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            test_timeout: config.test_timeout(),
            retries: config.retries,
            filter: None,
            global_timeout: None,
        }
    }
}

/// Runs registered tests one after another
pub struct TestRunner {
    backend: Arc<dyn AdminBackend>,
    config: RunnerConfig,
    cases: Vec<TestCase>,
    reporters: Vec<Box<dyn Reporter>>,
    cancel: CancellationToken,
}

impl TestRunner {
    pub fn new(backend: Arc<dyn AdminBackend>) -> Self {
        Self::with_config(backend, RunnerConfig::default())
    }

    pub fn with_config(backend: Arc<dyn AdminBackend>, config: RunnerConfig) -> Self {
        Self {
            backend,
            config,
            cases: Vec::new(),
            reporters: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn add(&mut self, case: TestCase) -> &mut Self {
        self.cases.push(case);
        self
    }

    pub fn add_reporter(&mut self, reporter: Box<dyn Reporter>) -> &mut Self {
        self.reporters.push(reporter);
        self
    }

    /// Token that interrupts the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every selected test and return the aggregate result
    pub async fn run(&mut self) -> RunResult {
        let start = Instant::now();
        let selected: Vec<&TestCase> = self
            .cases
            .iter()
            .filter(|c| match &self.config.filter {
                Some(filter) => c.info.title.contains(filter.as_str()),
                None => true,
            })
            .collect();

        for reporter in self.reporters.iter_mut() {
            reporter.on_begin(selected.len());
        }

        let mut result = RunResult {
            status: RunStatus::Passed,
            passed: 0,
            failed: 0,
            skipped: 0,
            timed_out: 0,
            interrupted: 0,
            duration_ms: 0,
        };

        let mut out_of_time = false;
        for case in selected {
            if let Some(limit) = self.config.global_timeout {
                if start.elapsed() >= limit {
                    warn!("Run exceeded its {}ms budget", limit.as_millis());
                    out_of_time = true;
                    break;
                }
            }

            let outcome = if case.skip {
                TestOutcome {
                    status: TestStatus::Skipped,
                    duration: Duration::ZERO,
                    error: None,
                    retry: 0,
                }
            } else {
                self.run_with_retries(case).await
            };

            match outcome.status {
                TestStatus::Passed => result.passed += 1,
                TestStatus::Failed => result.failed += 1,
                TestStatus::Skipped => result.skipped += 1,
                TestStatus::TimedOut => result.timed_out += 1,
                TestStatus::Interrupted => result.interrupted += 1,
            }

            for reporter in self.reporters.iter_mut() {
                reporter.on_test_end(&case.info, &outcome);
            }

            if outcome.status == TestStatus::Interrupted {
                warn!("Run interrupted during '{}'", case.info.title);
                break;
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        result.status = if result.interrupted > 0 {
            RunStatus::Interrupted
        } else if out_of_time {
            RunStatus::TimedOut
        } else if result.failed + result.timed_out > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Passed
        };

        for reporter in self.reporters.iter_mut() {
            reporter.on_end(&result);
        }

        result
    }

    async fn run_with_retries(&self, case: &TestCase) -> TestOutcome {
        let mut retry = 0;
        loop {
            let outcome = self.run_attempt(case, retry).await;
            let retryable = matches!(outcome.status, TestStatus::Failed | TestStatus::TimedOut);
            if retryable && retry < self.config.retries {
                retry += 1;
                info!(
                    "Retrying '{}' ({}/{})",
                    case.info.title, retry, self.config.retries
                );
                continue;
            }
            return outcome;
        }
    }

    async fn run_attempt(&self, case: &TestCase, retry: u32) -> TestOutcome {
        debug!("Running test: {}", case.info.title);
        let started = Instant::now();
        let limits = Limits {
            timeout: Some(self.config.test_timeout),
            cancel: Some(self.cancel.clone()),
        };

        let body = Arc::clone(&case.body);
        let outcome =
            run_with_test_data(Arc::clone(&self.backend), &limits, move |data| body(data)).await;
        let duration = started.elapsed();

        let (status, error) = match outcome {
            BodyOutcome::Completed(Ok(())) => (TestStatus::Passed, None),
            BodyOutcome::Completed(Err(e)) => (TestStatus::Failed, Some(format!("{e:#}"))),
            BodyOutcome::Panicked(payload) => {
                (TestStatus::Failed, Some(panic_message(payload.as_ref())))
            }
            BodyOutcome::TimedOut(limit) => (
                TestStatus::TimedOut,
                Some(format!("Test timeout of {}ms exceeded", limit.as_millis())),
            ),
            BodyOutcome::Cancelled => (TestStatus::Interrupted, Some("run cancelled".to_string())),
        };

        TestOutcome {
            status,
            duration,
            error,
            retry,
        }
    }
}
