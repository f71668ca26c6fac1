mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, expect_json, TestApp};
use portal::enums::Role;

#[tokio::test]
async fn every_role_lists_forms() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (_, worker) = app
        .user_with_token("Ion", "ion@x.ro", Role::Worker)
        .await?;
    app.insert_form("Cerere concediu de odihnă").await?;

    let response = app.get("/api/formulare", Some(&worker)).await?;
    let body = expect_json(response, StatusCode::OK).await?;
    assert_eq!(body["forms"][0]["title"], "Cerere concediu de odihnă");
    assert!(body["forms"][0]["createdAt"].is_string());

    app.cleanup().await?;
    Ok(())
}
