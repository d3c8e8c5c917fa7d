//! Tests against a running Supabase project
//!
//! Requires NEXT_PUBLIC_SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY (or a
//! `.env.test` providing them) and a `widgets` table with an `id` key.
//!
//! Run with: cargo test --package seedbed-e2e --test live_supabase -- --ignored

use serde_json::json;

use seedbed_backend::{Filter, ListUsers};
use seedbed_e2e::{CreateUserOptions, Fixtures};

fn fixtures() -> Fixtures {
    seedbed_e2e::init_test_logging();
    Fixtures::from_env().expect("Supabase environment variables must be set")
}

#[tokio::test]
#[ignore]
async fn test_user_roundtrip_is_cleaned_up() {
    let fixtures = fixtures();
    let admin = fixtures.admin();

    let email = fixtures
        .run(|data| async move {
            let user = data
                .create_user(CreateUserOptions::new().meta("role", "tester"))
                .await
                .unwrap();
            assert_eq!(user.user_metadata["role"], "tester");
            user.email.unwrap()
        })
        .await;

    let users = admin
        .list_users(ListUsers {
            page: 1,
            per_page: 1000,
        })
        .await
        .unwrap();
    assert!(users.iter().all(|u| u.email.as_deref() != Some(email.as_str())));
}

#[tokio::test]
#[ignore]
async fn test_widget_row_is_cleaned_up() {
    let fixtures = fixtures();
    let admin = fixtures.admin();

    let id = fixtures
        .run(|data| async move {
            let row = data
                .create_record("widgets", &json!({"name": "x"}))
                .await
                .unwrap();
            seedbed_common::filter_value(&row["id"]).unwrap()
        })
        .await;

    let rows = admin
        .select("widgets", Some(&Filter::eq("id", id)))
        .await
        .unwrap();
    assert!(rows.is_empty());
}
