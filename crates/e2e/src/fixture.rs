//! Per-test fixtures
//!
//! A test body receives a fresh [`TestDataFactory`]; the fixture runs the
//! factory's cleanup once the body is done, whether it returned, failed,
//! panicked, timed out or was cancelled.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use seedbed_backend::{AdminBackend, SupabaseAdmin};
use seedbed_common::SupabaseConfig;

use crate::error::E2eResult;
use crate::factory::TestDataFactory;

/// How a guarded test body ended
pub enum BodyOutcome<T> {
    Completed(T),
    Panicked(Box<dyn Any + Send>),
    TimedOut(Duration),
    Cancelled,
}

impl<T> std::fmt::Debug for BodyOutcome<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyOutcome::Completed(_) => write!(f, "Completed"),
            BodyOutcome::Panicked(_) => write!(f, "Panicked"),
            BodyOutcome::TimedOut(d) => write!(f, "TimedOut({d:?})"),
            BodyOutcome::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Optional bounds on a test body
#[derive(Debug, Clone, Default)]
pub struct Limits {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

/// Run `body` with a fresh factory, then clean up.
///
/// A panic in the body is re-raised after cleanup has finished.
pub async fn with_test_data<F, Fut, T>(backend: Arc<dyn AdminBackend>, body: F) -> T
where
    F: FnOnce(TestDataFactory) -> Fut,
    Fut: Future<Output = T>,
{
    match run_with_test_data(backend, &Limits::default(), body).await {
        BodyOutcome::Completed(value) => value,
        BodyOutcome::Panicked(payload) => std::panic::resume_unwind(payload),
        BodyOutcome::TimedOut(_) | BodyOutcome::Cancelled => {
            unreachable!("no deadline or cancellation configured")
        }
    }
}

/// Run `body` with a fresh factory under `limits`, then clean up.
///
/// When the deadline passes or the token fires, the body future is dropped
/// at its current await point and cleanup still runs.
pub async fn run_with_test_data<F, Fut, T>(
    backend: Arc<dyn AdminBackend>,
    limits: &Limits,
    body: F,
) -> BodyOutcome<T>
where
    F: FnOnce(TestDataFactory) -> Fut,
    Fut: Future<Output = T>,
{
    let factory = TestDataFactory::new(backend);
    let handle = factory.clone();

    let guarded = async move {
        match std::panic::catch_unwind(AssertUnwindSafe(move || body(handle))) {
            Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
            Err(payload) => Err(payload),
        }
    };

    let deadline = async {
        match limits.timeout {
            Some(timeout) => {
                tokio::time::sleep(timeout).await;
                timeout
            }
            None => std::future::pending().await,
        }
    };

    let cancelled = async {
        match &limits.cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };

    let outcome = tokio::select! {
        biased;
        _ = cancelled => BodyOutcome::Cancelled,
        result = guarded => match result {
            Ok(value) => BodyOutcome::Completed(value),
            Err(payload) => BodyOutcome::Panicked(payload),
        },
        timeout = deadline => BodyOutcome::TimedOut(timeout),
    };

    debug!("Test body finished ({:?}), cleaning up", outcome);
    factory.cleanup().await;
    outcome
}

/// What a suite needs to hand out test data
#[derive(Clone)]
pub struct Fixtures {
    backend: Arc<dyn AdminBackend>,
}

impl Fixtures {
    pub fn new(backend: Arc<dyn AdminBackend>) -> Self {
        Self { backend }
    }

    /// Connect to the Supabase project named by the environment
    pub fn from_env() -> E2eResult<Self> {
        let config = SupabaseConfig::from_env()?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &SupabaseConfig) -> E2eResult<Self> {
        let admin = SupabaseAdmin::new(config)?;
        Ok(Self::new(Arc::new(admin)))
    }

    /// Administrative client, for assertions that bypass the factory
    pub fn admin(&self) -> Arc<dyn AdminBackend> {
        Arc::clone(&self.backend)
    }

    /// A factory that the caller is responsible for cleaning up
    pub fn test_data(&self) -> TestDataFactory {
        TestDataFactory::new(self.admin())
    }

    /// Run `body` with its own factory and automatic cleanup
    pub async fn run<F, Fut, T>(&self, body: F) -> T
    where
        F: FnOnce(TestDataFactory) -> Fut,
        Fut: Future<Output = T>,
    {
        with_test_data(self.admin(), body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedbed_backend::InMemoryBackend;
    use crate::factory::CreateUserOptions;

    #[tokio::test]
    async fn test_cleanup_runs_after_success() {
        let backend = Arc::new(InMemoryBackend::new());

        let id = with_test_data(backend.clone(), |data| async move {
            data.create_user(CreateUserOptions::new()).await.unwrap().id
        })
        .await;

        assert!(!id.is_empty());
        assert!(backend.users().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_runs_after_timeout() {
        let backend = Arc::new(InMemoryBackend::new());
        let limits = Limits {
            timeout: Some(Duration::from_millis(50)),
            cancel: None,
        };

        let outcome = run_with_test_data(backend.clone(), &limits, |data| async move {
            data.create_user(CreateUserOptions::new()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;

        assert!(matches!(outcome, BodyOutcome::TimedOut(_)));
        assert!(backend.users().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_body_is_cleaned_up() {
        let backend = Arc::new(InMemoryBackend::new());
        let token = CancellationToken::new();
        let limits = Limits {
            timeout: None,
            cancel: Some(token.clone()),
        };

        let outcome = run_with_test_data(backend.clone(), &limits, |data| async move {
            data.create_user(CreateUserOptions::new()).await.unwrap();
            token.cancel();
            std::future::pending::<()>().await;
        })
        .await;

        assert!(matches!(outcome, BodyOutcome::Cancelled));
        assert!(backend.users().is_empty());
    }

    #[tokio::test]
    async fn test_fixtures_hand_out_manual_factory() {
        let backend = Arc::new(InMemoryBackend::new());
        let fixtures = Fixtures::new(backend.clone());

        let data = fixtures.test_data();
        data.create_user(CreateUserOptions::new()).await.unwrap();
        assert_eq!(fixtures.admin().list_users(Default::default()).await.unwrap().len(), 1);

        data.cleanup().await;
        assert!(backend.users().is_empty());
    }
}
