//! In-process backend that records every call
//!
//! Behaves like a tiny Supabase: users get UUIDs, rows without an `id`
//! get a serial one, deletes honour equality filters. One-shot faults can be
//! armed to exercise error paths.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use seedbed_common::{filter_value, NewUser, Row, User};

use crate::error::{BackendError, BackendResult};
use crate::{AdminBackend, Filter, ListUsers};

/// A call observed by the backend, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CreateUser { email: String },
    DeleteUser { id: String },
    ListUsers,
    Insert { table: String },
    Delete { table: String, filter: Filter },
    Select { table: String },
}

impl BackendCall {
    /// Table touched by this call, if any
    pub fn table(&self) -> Option<&str> {
        match self {
            BackendCall::Insert { table }
            | BackendCall::Delete { table, .. }
            | BackendCall::Select { table } => Some(table),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Faults {
    create_user: Option<String>,
    omit_created_user: bool,
    insert: Option<String>,
    delete: Option<String>,
    delete_user: HashSet<String>,
}

#[derive(Default)]
struct State {
    users: Vec<User>,
    tables: HashMap<String, Vec<Row>>,
    calls: Vec<BackendCall>,
    faults: Faults,
    next_row_id: u64,
}

#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn users(&self) -> Vec<User> {
        self.state.lock().users.clone()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Reject the next create-user call with `message`
    pub fn fail_next_create_user(&self, message: impl Into<String>) {
        self.state.lock().faults.create_user = Some(message.into());
    }

    /// Answer the next create-user call with success but no user
    pub fn omit_next_created_user(&self) {
        self.state.lock().faults.omit_created_user = true;
    }

    pub fn fail_next_insert(&self, message: impl Into<String>) {
        self.state.lock().faults.insert = Some(message.into());
    }

    pub fn fail_next_delete(&self, message: impl Into<String>) {
        self.state.lock().faults.delete = Some(message.into());
    }

    /// Make every deletion of this user fail
    pub fn fail_delete_user(&self, id: impl Into<String>) {
        self.state.lock().faults.delete_user.insert(id.into());
    }

    fn api_error(status: StatusCode, message: impl Into<String>) -> BackendError {
        BackendError::Api {
            status,
            message: message.into(),
        }
    }
}

fn matches(row: &Row, filter: &Filter) -> bool {
    filter.conditions().iter().all(|(column, value)| {
        row.get(column)
            .and_then(filter_value)
            .is_some_and(|v| v == *value)
    })
}

#[async_trait]
impl AdminBackend for InMemoryBackend {
    async fn create_user(&self, user: &NewUser) -> BackendResult<Option<User>> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::CreateUser {
            email: user.email.clone(),
        });

        if let Some(message) = state.faults.create_user.take() {
            return Err(Self::api_error(StatusCode::BAD_REQUEST, message));
        }
        if std::mem::take(&mut state.faults.omit_created_user) {
            return Ok(None);
        }
        if state
            .users
            .iter()
            .any(|u| u.email.as_deref() == Some(user.email.as_str()))
        {
            return Err(Self::api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "A user with this email address has already been registered",
            ));
        }

        let created = User {
            id: Uuid::new_v4().to_string(),
            email: Some(user.email.clone()),
            user_metadata: user.user_metadata.clone().unwrap_or_default(),
            created_at: None,
        };
        state.users.push(created.clone());
        Ok(Some(created))
    }

    async fn delete_user(&self, id: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::DeleteUser { id: id.to_string() });

        if state.faults.delete_user.contains(id) {
            return Err(Self::api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error deleting user {id}"),
            ));
        }

        let before = state.users.len();
        state.users.retain(|u| u.id != id);
        if state.users.len() == before {
            return Err(Self::api_error(StatusCode::NOT_FOUND, "User not found"));
        }
        Ok(())
    }

    async fn list_users(&self, page: ListUsers) -> BackendResult<Vec<User>> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::ListUsers);

        let per_page = page.per_page.max(1) as usize;
        let skip = page.page.saturating_sub(1) as usize * per_page;
        Ok(state.users.iter().skip(skip).take(per_page).cloned().collect())
    }

    async fn insert(&self, table: &str, row: &Row) -> BackendResult<Vec<Row>> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Insert {
            table: table.to_string(),
        });

        if let Some(message) = state.faults.insert.take() {
            return Err(Self::api_error(StatusCode::BAD_REQUEST, message));
        }

        let mut stored = row.clone();
        if !stored.contains_key("id") {
            state.next_row_id += 1;
            stored.insert("id".to_string(), Value::from(state.next_row_id));
        }
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(stored.clone());
        Ok(vec![stored])
    }

    async fn delete(&self, table: &str, filter: &Filter) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Delete {
            table: table.to_string(),
            filter: filter.clone(),
        });

        if let Some(message) = state.faults.delete.take() {
            return Err(Self::api_error(StatusCode::INTERNAL_SERVER_ERROR, message));
        }

        // PostgREST answers 2xx even when nothing matched
        if let Some(rows) = state.tables.get_mut(table) {
            rows.retain(|row| !matches(row, filter));
        }
        Ok(())
    }

    async fn select(&self, table: &str, filter: Option<&Filter>) -> BackendResult<Vec<Row>> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Select {
            table: table.to_string(),
        });

        let rows = state.tables.get(table).cloned().unwrap_or_default();
        Ok(match filter {
            Some(filter) => rows.into_iter().filter(|r| matches(r, filter)).collect(),
            None => rows,
        })
    }
}
