//! Core types for Seedbed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A table row as exchanged with PostgREST
pub type Row = Map<String, Value>;

/// An auth user as returned by the admin API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,

    #[serde(default)]
    pub email: Option<String>,

    /// Arbitrary metadata supplied at creation time
    #[serde(default)]
    pub user_metadata: Map<String, Value>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Payload for the admin create-user call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,

    /// Skip the confirmation mail; test users are usable immediately
    pub email_confirm: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<Map<String, Value>>,
}

/// Kind of backend resource tracked for cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    User,
    TableRow,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::User => write!(f, "user"),
            ResourceType::TableRow => write!(f, "table-row"),
        }
    }
}

/// Handle to something created during a test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedResource {
    pub resource_type: ResourceType,
    pub identifier: String,

    /// Only set for table rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
}

impl TrackedResource {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            resource_type: ResourceType::User,
            identifier: id.into(),
            table_name: None,
        }
    }

    pub fn row(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: ResourceType::TableRow,
            identifier: id.into(),
            table_name: Some(table.into()),
        }
    }
}

impl std::fmt::Display for TrackedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.table_name {
            Some(table) => write!(f, "{} {}/{}", self.resource_type, table, self.identifier),
            None => write!(f, "{} {}", self.resource_type, self.identifier),
        }
    }
}

/// Terminal status of a single test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    TimedOut,
    Interrupted,
}

impl TestStatus {
    /// Glyph shown next to the test title in the summary
    pub fn glyph(&self) -> &'static str {
        match self {
            TestStatus::Passed => "✅",
            TestStatus::Failed => "❌",
            TestStatus::Skipped => "⏭️",
            TestStatus::TimedOut => "⏰",
            TestStatus::Interrupted => "🛑",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Skipped => "SKIPPED",
            TestStatus::TimedOut => "TIMEOUT",
            TestStatus::Interrupted => "INTERRUPTED",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Passed,
    Failed,
    TimedOut,
    Interrupted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Passed => write!(f, "PASSED"),
            RunStatus::Failed => write!(f, "FAILED"),
            RunStatus::TimedOut => write!(f, "TIMEDOUT"),
            RunStatus::Interrupted => write!(f, "INTERRUPTED"),
        }
    }
}

/// Render a primary key value as a PostgREST filter operand.
///
/// Strings are used verbatim, numbers through their JSON text. Anything else
/// cannot address a row.
pub fn filter_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(TestStatus::Passed, "PASSED")]
    #[test_case(TestStatus::Failed, "FAILED")]
    #[test_case(TestStatus::Skipped, "SKIPPED")]
    #[test_case(TestStatus::TimedOut, "TIMEOUT")]
    #[test_case(TestStatus::Interrupted, "INTERRUPTED")]
    fn test_status_labels(status: TestStatus, label: &str) {
        assert_eq!(status.label(), label);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let json = serde_json::to_string(&TestStatus::TimedOut).unwrap();
        assert_eq!(json, "\"timedOut\"");
    }

    #[test]
    fn test_user_ignores_unknown_fields() {
        let user: User = serde_json::from_value(json!({
            "id": "u-1",
            "email": "a@test.local",
            "aud": "authenticated",
            "role": "authenticated",
            "user_metadata": {"role": "tester"}
        }))
        .unwrap();

        assert_eq!(user.id, "u-1");
        assert_eq!(user.user_metadata.get("role"), Some(&json!("tester")));
        assert!(user.created_at.is_none());
    }

    #[test]
    fn test_new_user_omits_missing_metadata() {
        let new_user = NewUser {
            email: "a@test.local".into(),
            password: "pw".into(),
            email_confirm: true,
            user_metadata: None,
        };
        let value = serde_json::to_value(&new_user).unwrap();
        assert!(value.get("user_metadata").is_none());
    }

    #[test_case(json!("abc"), Some("abc"))]
    #[test_case(json!(42), Some("42"))]
    #[test_case(json!(""), None)]
    #[test_case(json!(null), None)]
    #[test_case(json!({"nested": 1}), None)]
    fn test_filter_value(value: Value, expected: Option<&str>) {
        assert_eq!(filter_value(&value).as_deref(), expected);
    }

    #[test]
    fn test_tracked_resource_display() {
        assert_eq!(TrackedResource::user("u1").to_string(), "user u1");
        assert_eq!(
            TrackedResource::row("widgets", "7").to_string(),
            "table-row widgets/7"
        );
    }
}
