//! Test data factory
//!
//! Each test gets its own [`TestDataFactory`]. Everything created through it
//! is tracked and removed by [`TestDataFactory::cleanup`], which the fixture
//! calls once the test body has finished, whatever its outcome.
//!
//! Cleanup runs in two phases. Registered callbacks (row deletions and custom
//! actions) run newest first, then tracked users are deleted newest first.
//! Rows that reference a user are therefore gone before the user is. A
//! failing step is logged as a [`CleanupWarning`] and never stops the steps
//! after it.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use seedbed_backend::{AdminBackend, Filter};
use seedbed_common::{filter_value, NewUser, Row, TrackedResource, User, TEST_EMAIL_DOMAIN};

use crate::error::{E2eError, E2eResult};

/// Prefix used when a test does not choose its own email
pub const DEFAULT_EMAIL_PREFIX: &str = "test";

/// Primary key column assumed by [`TestDataFactory::create_record`]
pub const DEFAULT_KEY_COLUMN: &str = "id";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

type CleanupFuture = BoxFuture<'static, anyhow::Result<()>>;
type CleanupFn = Box<dyn FnOnce() -> CleanupFuture + Send>;

/// A teardown step that failed. Reported through the log only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    pub resource: String,
    pub reason: String,
}

impl CleanupWarning {
    fn emit(&self) {
        warn!(resource = %self.resource, "Cleanup failed: {}", self.reason);
    }
}

impl std::fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cleanup of {} failed: {}", self.resource, self.reason)
    }
}

/// Options for [`TestDataFactory::create_user`]
#[derive(Debug, Clone, Default)]
pub struct CreateUserOptions {
    pub email: Option<String>,
    pub password: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl CreateUserOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Add a single metadata entry
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

struct CleanupEntry {
    label: String,
    resource: Option<TrackedResource>,
    action: CleanupFn,
}

#[derive(Default)]
struct Tracker {
    /// User ids in creation order
    users: Vec<String>,

    /// Cleanup callbacks in registration order
    callbacks: Vec<CleanupEntry>,
}

/// Creates backend fixtures for one test and removes them afterwards.
///
/// Cloning yields another handle to the same tracker.
#[derive(Clone)]
pub struct TestDataFactory {
    backend: Arc<dyn AdminBackend>,
    tracker: Arc<Mutex<Tracker>>,
}

impl TestDataFactory {
    pub fn new(backend: Arc<dyn AdminBackend>) -> Self {
        Self {
            backend,
            tracker: Arc::new(Mutex::new(Tracker::default())),
        }
    }

    /// The backend this factory writes to
    pub fn backend(&self) -> &Arc<dyn AdminBackend> {
        &self.backend
    }

    pub fn generate_email(&self, prefix: &str) -> String {
        generate_email(prefix)
    }

    pub fn generate_password(&self) -> String {
        generate_password()
    }

    /// Create a confirmed auth user and track it for deletion
    pub async fn create_user(&self, options: CreateUserOptions) -> E2eResult<User> {
        let request = NewUser {
            email: options
                .email
                .unwrap_or_else(|| generate_email(DEFAULT_EMAIL_PREFIX)),
            password: options.password.unwrap_or_else(generate_password),
            email_confirm: true,
            user_metadata: options.metadata,
        };

        let user = self
            .backend
            .create_user(&request)
            .await
            .map_err(|e| E2eError::ResourceCreation {
                resource: "test user".to_string(),
                message: e.message(),
            })?
            .ok_or_else(|| E2eError::MissingEntity("User creation returned no user".to_string()))?;

        self.tracker.lock().users.push(user.id.clone());
        debug!("Created test user {} ({})", user.id, request.email);
        Ok(user)
    }

    /// Insert a row keyed by `id` and register its deletion
    pub async fn create_record<T: Serialize>(&self, table: &str, data: &T) -> E2eResult<Row> {
        self.create_record_keyed(table, DEFAULT_KEY_COLUMN, data).await
    }

    /// Insert a row and register a deletion filtered on `key_column`.
    ///
    /// The inserted row is read back. A row without a usable key is reported
    /// as a creation failure, and its deletion is registered by matching its
    /// other columns.
    pub async fn create_record_keyed<T: Serialize>(
        &self,
        table: &str,
        key_column: &str,
        data: &T,
    ) -> E2eResult<Row> {
        let creation_error = |message: String| E2eError::ResourceCreation {
            resource: format!("record in {table}"),
            message,
        };

        let row = match serde_json::to_value(data) {
            Ok(Value::Object(row)) => row,
            Ok(_) => return Err(creation_error("record data must be a JSON object".to_string())),
            Err(e) => return Err(creation_error(e.to_string())),
        };

        let record = self
            .backend
            .insert(table, &row)
            .await
            .map_err(|e| creation_error(e.message()))?
            .into_iter()
            .next()
            .ok_or_else(|| creation_error("insert returned no row".to_string()))?;

        let Some(key) = record.get(key_column).and_then(filter_value) else {
            self.track_unkeyed(table, &record);
            return Err(creation_error(format!("inserted row has no usable '{key_column}'")));
        };

        self.push_delete(
            table,
            format!("{table} row {key}"),
            TrackedResource::row(table, key.clone()),
            Filter::eq(key_column, key),
        );
        Ok(record)
    }

    /// Register a deletion matching every scalar column of a row that came
    /// back without its key. A row with no scalar column is reported as
    /// leaked.
    fn track_unkeyed(&self, table: &str, record: &Row) {
        let mut columns = record
            .iter()
            .filter_map(|(column, value)| filter_value(value).map(|v| (column.as_str(), v)));

        let Some((column, value)) = columns.next() else {
            CleanupWarning {
                resource: format!("{table} row"),
                reason: "inserted row has no scalar column to match; it was leaked".to_string(),
            }
            .emit();
            return;
        };

        let filter = columns.fold(Filter::eq(column, value), |filter, (column, value)| {
            filter.and(column, value)
        });
        self.push_delete(
            table,
            format!("{table} row where {filter}"),
            TrackedResource::row(table, filter.to_string()),
            filter,
        );
    }

    fn push_delete(&self, table: &str, label: String, resource: TrackedResource, filter: Filter) {
        let backend = Arc::clone(&self.backend);
        let target = table.to_string();
        self.push_cleanup(
            label,
            Some(resource),
            Box::new(move || {
                async move {
                    backend
                        .delete(&target, &filter)
                        .await
                        .map_err(anyhow::Error::from)
                }
                .boxed()
            }),
        );
    }

    /// Register an arbitrary teardown action
    pub fn on_cleanup<F, Fut>(&self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let index = self.tracker.lock().callbacks.len();
        self.push_cleanup(
            format!("cleanup callback #{index}"),
            None,
            Box::new(move || callback().boxed()),
        );
    }

    fn push_cleanup(&self, label: String, resource: Option<TrackedResource>, action: CleanupFn) {
        self.tracker.lock().callbacks.push(CleanupEntry {
            label,
            resource,
            action,
        });
    }

    /// Resources currently awaiting cleanup: users first, then rows, each in
    /// creation order
    pub fn tracked(&self) -> Vec<TrackedResource> {
        let tracker = self.tracker.lock();
        tracker
            .users
            .iter()
            .map(|id| TrackedResource::user(id.clone()))
            .chain(tracker.callbacks.iter().filter_map(|c| c.resource.clone()))
            .collect()
    }

    /// Number of callbacks plus users that `cleanup` would process
    pub fn pending_cleanups(&self) -> usize {
        let tracker = self.tracker.lock();
        tracker.users.len() + tracker.callbacks.len()
    }

    /// Undo everything this factory created.
    ///
    /// Never fails. Each batch is detached from the tracker before it runs,
    /// so a second call (or a reentrant one from inside a callback) finds
    /// nothing left to do. Callbacks registered while cleanup is running are
    /// picked up by the same pass.
    pub async fn cleanup(&self) {
        let mut warnings = 0usize;

        loop {
            let batch = std::mem::take(&mut self.tracker.lock().callbacks);
            if batch.is_empty() {
                break;
            }
            for entry in batch.into_iter().rev() {
                if let Err(reason) = run_guarded(entry.action).await {
                    warnings += 1;
                    CleanupWarning {
                        resource: entry.label,
                        reason,
                    }
                    .emit();
                }
            }
        }

        loop {
            let batch = std::mem::take(&mut self.tracker.lock().users);
            if batch.is_empty() {
                break;
            }
            for id in batch.into_iter().rev() {
                match self.backend.delete_user(&id).await {
                    Ok(()) => debug!("Deleted test user {}", id),
                    Err(e) => {
                        warnings += 1;
                        CleanupWarning {
                            resource: format!("test user {id}"),
                            reason: e.to_string(),
                        }
                        .emit();
                    }
                }
            }
        }

        if warnings > 0 {
            debug!("Cleanup finished with {} warning(s)", warnings);
        }
    }
}

/// Run one cleanup action, turning errors and panics into a message
async fn run_guarded(action: CleanupFn) -> Result<(), String> {
    let future = std::panic::catch_unwind(AssertUnwindSafe(action))
        .map_err(|panic| panic_message(panic.as_ref()))?;

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// `{prefix}-{unix millis}-{6 base36 chars}@test.local`
pub fn generate_email(prefix: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp_millis();
    format!("{prefix}-{timestamp}-{}@{TEST_EMAIL_DOMAIN}", random_base36(6))
}

/// `TestPass_{8 base36 chars}!`
pub fn generate_password() -> String {
    format!("TestPass_{}!", random_base36(8))
}
