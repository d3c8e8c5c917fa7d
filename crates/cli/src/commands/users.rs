//! Test user commands

use anyhow::{bail, Result};
use clap::Subcommand;
use colored::Colorize;
use serde::Serialize;
use serde_json::{Map, Value};

use seedbed_backend::{AdminBackend, ListUsers};
use seedbed_common::{NewUser, User, TEST_EMAIL_DOMAIN};
use seedbed_e2e::factory::{generate_email, generate_password, DEFAULT_EMAIL_PREFIX};

use crate::output::{
    print_error, print_item, print_list, print_success, print_warning, OutputFormat, TableDisplay,
};

#[derive(Subcommand, Debug)]
pub enum UsersCommands {
    /// List auth users
    List {
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Users per page
        #[arg(long, default_value = "50")]
        per_page: u32,

        /// Page to show (1-based)
        #[arg(long, default_value = "1")]
        page: u32,
    },

    /// Create a confirmed user that is NOT cleaned up automatically
    Create {
        /// Email prefix
        #[arg(long, default_value = DEFAULT_EMAIL_PREFIX)]
        prefix: String,

        /// Metadata entry, repeatable (key=value)
        #[arg(long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, Value)>,
    },

    /// Delete users left behind by interrupted runs
    Purge {
        /// Email domain that marks test users
        #[arg(long, default_value = TEST_EMAIL_DOMAIN)]
        domain: String,

        /// Only show what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

/// User display wrapper for serialization
#[derive(Debug, Serialize)]
pub struct UserDisplay {
    pub id: String,
    pub email: String,
    pub created_at: String,
    pub metadata: Map<String, Value>,
}

impl From<User> for UserDisplay {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email.unwrap_or_default(),
            created_at: user
                .created_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            metadata: user.user_metadata,
        }
    }
}

impl TableDisplay for UserDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Email", "Created", "Metadata"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.email.clone(),
            self.created_at.clone(),
            if self.metadata.is_empty() {
                "-".to_string()
            } else {
                Value::Object(self.metadata.clone()).to_string()
            },
        ]
    }
}

/// Parse `key=value`; the value is taken as JSON when it parses, else as text
pub fn parse_meta(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected key=value, got '{raw}'");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("metadata key must not be empty");
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// What a purge found and removed
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub matched: Vec<String>,
    pub deleted: usize,
    pub failed: usize,
}

/// Every user, following pages until a short one
pub async fn all_users(backend: &dyn AdminBackend, per_page: u32) -> Result<Vec<User>> {
    let per_page = per_page.max(1);
    let mut users = Vec::new();
    let mut page = 1;

    loop {
        let batch = backend.list_users(ListUsers { page, per_page }).await?;
        let done = (batch.len() as u32) < per_page;
        users.extend(batch);
        if done {
            return Ok(users);
        }
        page += 1;
    }
}

/// Delete users whose email ends with `@{domain}`
pub async fn purge(backend: &dyn AdminBackend, domain: &str, dry_run: bool) -> Result<PurgeReport> {
    let suffix = format!("@{}", domain.trim_start_matches('@'));
    let targets: Vec<User> = all_users(backend, 100)
        .await?
        .into_iter()
        .filter(|u| u.email.as_deref().is_some_and(|e| e.ends_with(&suffix)))
        .collect();

    let mut report = PurgeReport {
        matched: targets.iter().map(|u| u.id.clone()).collect(),
        ..PurgeReport::default()
    };
    if dry_run {
        return Ok(report);
    }

    for user in targets {
        match backend.delete_user(&user.id).await {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                report.failed += 1;
                print_error(&format!(
                    "Failed to delete {}: {}",
                    user.email.unwrap_or(user.id),
                    e
                ));
            }
        }
    }

    Ok(report)
}

pub async fn execute(cmd: UsersCommands, backend: &dyn AdminBackend) -> Result<()> {
    match cmd {
        UsersCommands::List {
            format,
            per_page,
            page,
        } => {
            let users = backend.list_users(ListUsers { page, per_page }).await?;
            let displays: Vec<UserDisplay> = users.into_iter().map(UserDisplay::from).collect();
            print_list(&displays, format);
        }

        UsersCommands::Create { prefix, meta } => {
            let password = generate_password();
            let request = NewUser {
                email: generate_email(&prefix),
                password: password.clone(),
                email_confirm: true,
                user_metadata: if meta.is_empty() {
                    None
                } else {
                    Some(meta.into_iter().collect())
                },
            };

            let Some(user) = backend.create_user(&request).await? else {
                bail!("User creation returned no user");
            };
            print_success(&format!("User '{}' created", request.email));
            print_item(&UserDisplay::from(user), OutputFormat::Table);
            println!("  {} {}", "Password:".bold(), password);
        }

        UsersCommands::Purge { domain, dry_run } => {
            let report = purge(backend, &domain, dry_run).await?;

            if report.matched.is_empty() {
                print_success(&format!("No users with @{} emails", domain));
            } else if dry_run {
                print_warning(&format!(
                    "{} user(s) would be deleted (dry run)",
                    report.matched.len()
                ));
                for id in &report.matched {
                    println!("  {}", id.dimmed());
                }
            } else {
                let line = format!(
                    "Deleted {} of {} user(s)",
                    report.deleted,
                    report.matched.len()
                );
                if report.failed > 0 {
                    println!("{}", line.yellow());
                    bail!("{} user(s) could not be deleted", report.failed);
                }
                print_success(&line);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedbed_backend::InMemoryBackend;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("role=tester", "role", json!("tester"))]
    #[test_case("level=3", "level", json!(3))]
    #[test_case("admin=true", "admin", json!(true))]
    #[test_case("note=a=b", "note", json!("a=b"))]
    fn test_parse_meta(raw: &str, key: &str, value: Value) {
        assert_eq!(parse_meta(raw).unwrap(), (key.to_string(), value));
    }

    #[test_case("novalue")]
    #[test_case("=x")]
    fn test_parse_meta_rejects(raw: &str) {
        assert!(parse_meta(raw).is_err());
    }

    async fn add_user(backend: &InMemoryBackend, email: &str) -> User {
        backend
            .create_user(&NewUser {
                email: email.to_string(),
                password: "pw".to_string(),
                email_confirm: true,
                user_metadata: None,
            })
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_users_follows_pages() {
        let backend = InMemoryBackend::new();
        for i in 0..5 {
            add_user(&backend, &format!("u{i}@test.local")).await;
        }

        let users = all_users(&backend, 2).await.unwrap();
        assert_eq!(users.len(), 5);
    }

    #[tokio::test]
    async fn test_purge_only_touches_domain() {
        let backend = InMemoryBackend::new();
        let stale = add_user(&backend, "test-1-abc@test.local").await;
        let real = add_user(&backend, "someone@example.com").await;

        let report = purge(&backend, "test.local", false).await.unwrap();

        assert_eq!(report.matched, vec![stale.id]);
        assert_eq!(report.deleted, 1);
        let remaining: Vec<String> = backend.users().into_iter().map(|u| u.id).collect();
        assert_eq!(remaining, vec![real.id]);
    }

    #[tokio::test]
    async fn test_purge_dry_run_deletes_nothing() {
        let backend = InMemoryBackend::new();
        add_user(&backend, "test-1-abc@test.local").await;

        let report = purge(&backend, "@test.local", true).await.unwrap();

        assert_eq!(report.matched.len(), 1);
        assert_eq!(report.deleted, 0);
        assert_eq!(backend.users().len(), 1);
    }

    #[tokio::test]
    async fn test_purge_counts_failures() {
        let backend = InMemoryBackend::new();
        let stuck = add_user(&backend, "a@test.local").await;
        add_user(&backend, "b@test.local").await;
        backend.fail_delete_user(stuck.id.clone());

        let report = purge(&backend, "test.local", false).await.unwrap();

        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 1);
    }
}
