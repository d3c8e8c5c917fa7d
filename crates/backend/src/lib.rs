//! Administrative access to a Supabase project
//!
//! The harness talks to the backend only through [`AdminBackend`]. The
//! production implementation is [`SupabaseAdmin`], which speaks to the Auth
//! admin API and PostgREST with the service-role key. [`InMemoryBackend`]
//! records every call and is what the harness's own tests run against.

use async_trait::async_trait;
use seedbed_common::{NewUser, Row, User};

pub mod error;
pub mod memory;
pub mod supabase;

pub use error::{BackendError, BackendResult};
pub use memory::{BackendCall, InMemoryBackend};
pub use supabase::SupabaseAdmin;

/// Conjunction of column equality conditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<(String, String)>,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            conditions: vec![(column.into(), value.into())],
        }
    }

    /// Add another condition that must hold as well
    pub fn and(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    /// `(column, value)` pairs in the order they were added
    pub fn conditions(&self) -> &[(String, String)] {
        &self.conditions
    }

    /// PostgREST query pairs, e.g. `[("id", "eq.42")]`
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.conditions
            .iter()
            .map(|(column, value)| (column.clone(), format!("eq.{value}")))
            .collect()
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (column, value)) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{column}=eq.{value}")?;
        }
        Ok(())
    }
}

/// Page selector for listing users
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListUsers {
    /// 1-based page number
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListUsers {
    fn default() -> Self {
        Self { page: 1, per_page: 50 }
    }
}

/// Operations the harness needs from the backend.
///
/// Implementations receive ready credentials; connection setup is not part
/// of this contract.
#[async_trait]
pub trait AdminBackend: Send + Sync {
    /// Create a confirmed user. `Ok(None)` means the call succeeded but no
    /// user came back.
    async fn create_user(&self, user: &NewUser) -> BackendResult<Option<User>>;

    async fn delete_user(&self, id: &str) -> BackendResult<()>;

    async fn list_users(&self, page: ListUsers) -> BackendResult<Vec<User>>;

    /// Insert a row and return the stored representation
    async fn insert(&self, table: &str, row: &Row) -> BackendResult<Vec<Row>>;

    async fn delete(&self, table: &str, filter: &Filter) -> BackendResult<()>;

    async fn select(&self, table: &str, filter: Option<&Filter>) -> BackendResult<Vec<Row>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_rendering() {
        let filter = Filter::eq("id", "42");
        assert_eq!(filter.to_string(), "id=eq.42");
        assert_eq!(
            filter.query_pairs(),
            vec![("id".to_string(), "eq.42".to_string())]
        );
    }

    #[test]
    fn test_combined_filter_rendering() {
        let filter = Filter::eq("id", "7").and("bio", "x");
        assert_eq!(filter.to_string(), "id=eq.7&bio=eq.x");
        assert_eq!(filter.conditions().len(), 2);
        assert_eq!(filter.query_pairs()[1], ("bio".to_string(), "eq.x".to_string()));
    }
}
