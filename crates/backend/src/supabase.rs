//! HTTP client for the Supabase Auth admin API and PostgREST

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use seedbed_common::{NewUser, Row, SupabaseConfig, User};

use crate::error::{BackendError, BackendResult};
use crate::{AdminBackend, Filter, ListUsers};

const ADMIN_USERS_PATH: &str = "auth/v1/admin/users";
const REST_PATH: &str = "rest/v1/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Service-role client for a Supabase project
#[derive(Clone)]
pub struct SupabaseAdmin {
    base: Url,
    service_role_key: String,
    client: Client,
}

impl std::fmt::Debug for SupabaseAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseAdmin")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl SupabaseAdmin {
    pub fn new(config: &SupabaseConfig) -> BackendResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        // Url::join drops the last segment unless the base ends with '/'
        let mut base = config.url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            service_role_key: config.service_role_key.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .header(ACCEPT, "application/json")
    }

    fn users_url(&self, id: Option<&str>) -> BackendResult<Url> {
        let mut url = self.base.join(ADMIN_USERS_PATH)?;
        if let Some(id) = id {
            url.path_segments_mut()
                .map_err(|_| BackendError::Unavailable(format!("cannot address user {id}")))?
                .push(id);
        }
        Ok(url)
    }

    fn table_url(&self, table: &str) -> BackendResult<Url> {
        let mut url = self.base.join(REST_PATH)?;
        url.path_segments_mut()
            .map_err(|_| BackendError::Unavailable(format!("cannot address table {table}")))?
            .pop_if_empty()
            .push(table);
        Ok(url)
    }

    /// Send a request and return the body of a successful response
    async fn send(&self, request: RequestBuilder) -> BackendResult<String> {
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await?;
        debug!("{} -> {}", url, status);

        if status.is_success() {
            Ok(body)
        } else {
            Err(BackendError::from_response(status, &body))
        }
    }
}

/// Extract the created user from an admin create-user response.
///
/// The admin endpoint answers with the user object itself; some proxies wrap
/// it as `{"user": ...}`. An empty body or a null user means no entity.
fn parse_created_user(body: &str) -> BackendResult<Option<User>> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let mut value: Value = serde_json::from_str(body)?;
    let user = if value.get("user").is_some() {
        value["user"].take()
    } else {
        value
    };

    if user.get("id").is_some() {
        Ok(Some(serde_json::from_value(user)?))
    } else {
        Ok(None)
    }
}

fn parse_rows(body: &str) -> BackendResult<Vec<Row>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(body)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(BackendError::from))
            .collect(),
        Value::Object(row) => Ok(vec![row]),
        _ => Ok(Vec::new()),
    }
}

#[derive(serde::Deserialize)]
struct UsersPage {
    #[serde(default)]
    users: Vec<User>,
}

#[async_trait]
impl AdminBackend for SupabaseAdmin {
    async fn create_user(&self, user: &NewUser) -> BackendResult<Option<User>> {
        debug!("Creating auth user {}", user.email);
        let request = self
            .request(Method::POST, self.users_url(None)?)
            .json(user);
        let body = self.send(request).await?;
        parse_created_user(&body)
    }

    async fn delete_user(&self, id: &str) -> BackendResult<()> {
        debug!("Deleting auth user {}", id);
        let request = self.request(Method::DELETE, self.users_url(Some(id))?);
        self.send(request).await?;
        Ok(())
    }

    async fn list_users(&self, page: ListUsers) -> BackendResult<Vec<User>> {
        let request = self
            .request(Method::GET, self.users_url(None)?)
            .query(&[("page", page.page), ("per_page", page.per_page)]);
        let body = self.send(request).await?;

        match serde_json::from_str::<Value>(&body)? {
            Value::Array(items) => Ok(serde_json::from_value(Value::Array(items))?),
            other => Ok(serde_json::from_value::<UsersPage>(other)?.users),
        }
    }

    async fn insert(&self, table: &str, row: &Row) -> BackendResult<Vec<Row>> {
        debug!("Inserting into {}", table);
        let request = self
            .request(Method::POST, self.table_url(table)?)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header("Prefer", "return=representation")
            .json(row);
        let body = self.send(request).await?;
        parse_rows(&body)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> BackendResult<()> {
        debug!("Deleting from {} where {}", table, filter);
        let request = self
            .request(Method::DELETE, self.table_url(table)?)
            .query(&filter.query_pairs());
        self.send(request).await?;
        Ok(())
    }

    async fn select(&self, table: &str, filter: Option<&Filter>) -> BackendResult<Vec<Row>> {
        let mut query = vec![("select".to_string(), "*".to_string())];
        if let Some(filter) = filter {
            query.extend(filter.query_pairs());
        }

        let request = self
            .request(Method::GET, self.table_url(table)?)
            .query(&query);
        let body = self.send(request).await?;
        parse_rows(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const KEY: &str = "service-role-key";

    fn client_for(server: &Server) -> SupabaseAdmin {
        let config = SupabaseConfig::new(&server.url(), KEY).unwrap();
        SupabaseAdmin::new(&config).unwrap()
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password: "TestPass_abc!".to_string(),
            email_confirm: true,
            user_metadata: None,
        }
    }

    #[tokio::test]
    async fn create_user_success() -> BackendResult<()> {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/v1/admin/users")
            .match_header("apikey", KEY)
            .match_header("authorization", format!("Bearer {KEY}").as_str())
            .match_body(Matcher::PartialJson(json!({
                "email": "a@test.local",
                "email_confirm": true
            })))
            .with_status(200)
            .with_body(r#"{"id":"u-1","email":"a@test.local","user_metadata":{}}"#)
            .create_async()
            .await;

        let user = client_for(&server)
            .create_user(&new_user("a@test.local"))
            .await?
            .expect("user returned");

        assert_eq!(user.id, "u-1");
        assert_eq!(user.email.as_deref(), Some("a@test.local"));
        m.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn create_user_rejected() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/auth/v1/admin/users")
            .with_status(422)
            .with_body(
                r#"{"code":422,"msg":"A user with this email address has already been registered"}"#,
            )
            .create_async()
            .await;

        let err = client_for(&server)
            .create_user(&new_user("dup@test.local"))
            .await
            .unwrap_err();

        match err {
            BackendError::Api { status, message } => {
                assert_eq!(status, 422);
                assert!(message.contains("already been registered"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn create_user_without_entity() -> BackendResult<()> {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/auth/v1/admin/users")
            .with_status(200)
            .with_body(r#"{"user":null}"#)
            .create_async()
            .await;

        let user = client_for(&server).create_user(&new_user("a@test.local")).await?;
        assert!(user.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn delete_user_addresses_id() -> BackendResult<()> {
        let mut server = Server::new_async().await;
        let m = server
            .mock("DELETE", "/auth/v1/admin/users/u-9")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        client_for(&server).delete_user("u-9").await?;
        m.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn list_users_reads_page() -> BackendResult<()> {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/auth/v1/admin/users")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "2".into()),
                Matcher::UrlEncoded("per_page".into(), "10".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"aud":"authenticated","users":[{"id":"a"},{"id":"b","email":"b@test.local"}]}"#,
            )
            .create_async()
            .await;

        let users = client_for(&server)
            .list_users(ListUsers { page: 2, per_page: 10 })
            .await?;

        assert_eq!(users.len(), 2);
        assert_eq!(users[1].email.as_deref(), Some("b@test.local"));
        Ok(())
    }

    #[tokio::test]
    async fn insert_returns_representation() -> BackendResult<()> {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/rest/v1/widgets")
            .match_header("prefer", "return=representation")
            .match_body(Matcher::Json(json!({"name": "x"})))
            .with_status(201)
            .with_body(r#"[{"id":7,"name":"x"}]"#)
            .create_async()
            .await;

        let mut row = Row::new();
        row.insert("name".into(), json!("x"));
        let rows = client_for(&server).insert("widgets", &row).await?;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&json!(7)));
        m.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn delete_sends_equality_filter() -> BackendResult<()> {
        let mut server = Server::new_async().await;
        let m = server
            .mock("DELETE", "/rest/v1/widgets")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.7".into()))
            .with_status(204)
            .create_async()
            .await;

        client_for(&server)
            .delete("widgets", &Filter::eq("id", "7"))
            .await?;
        m.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn delete_sends_every_condition() -> BackendResult<()> {
        let mut server = Server::new_async().await;
        let m = server
            .mock("DELETE", "/rest/v1/profiles")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "eq.3".into()),
                Matcher::UrlEncoded("bio".into(), "eq.x".into()),
            ]))
            .with_status(204)
            .create_async()
            .await;

        client_for(&server)
            .delete("profiles", &Filter::eq("id", "3").and("bio", "x"))
            .await?;
        m.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn select_reports_postgrest_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/rest/v1/missing")
            .match_query(Matcher::UrlEncoded("select".into(), "*".into()))
            .with_status(404)
            .with_body(r#"{"code":"42P01","message":"relation \"public.missing\" does not exist"}"#)
            .create_async()
            .await;

        let err = client_for(&server).select("missing", None).await.unwrap_err();
        assert!(err.message().contains("does not exist"));
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let config = SupabaseConfig::new("https://demo.supabase.co/project", KEY).unwrap();
        let client = SupabaseAdmin::new(&config).unwrap();
        assert_eq!(client.base_url().as_str(), "https://demo.supabase.co/project/");
        assert_eq!(
            client.table_url("widgets").unwrap().as_str(),
            "https://demo.supabase.co/project/rest/v1/widgets"
        );
    }

    #[test]
    fn parse_created_user_variants() {
        assert!(parse_created_user("").unwrap().is_none());
        assert!(parse_created_user("null").unwrap().is_none());
        assert!(parse_created_user(r#"{"user":{"id":"x"}}"#).unwrap().is_some());
        assert!(parse_created_user(r#"{"id":"x"}"#).unwrap().is_some());
        assert!(parse_created_user(r#"{"ok":true}"#).unwrap().is_none());
    }
}
