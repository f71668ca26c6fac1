mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, expect_json, TestApp};
use portal::enums::Role;
use serde_json::{json, Value};

fn titles(body: &Value) -> Vec<String> {
    let mut titles: Vec<String> = body["documents"]
        .as_array()
        .map(|docs| {
            docs.iter()
                .filter_map(|doc| doc["title"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    titles.sort();
    titles
}

fn document(title: &str, category: &str, user_ids: &[uuid::Uuid]) -> Value {
    json!({
        "title": title,
        "description": format!("{title} pentru angajați"),
        "fileUrl": format!("https://files.test/{title}.pdf"),
        "fileType": "application/pdf",
        "category": category,
        "userIds": user_ids,
    })
}

#[tokio::test]
async fn restricted_documents_are_hidden_from_other_workers() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (_, admin) = app.user_with_token("Admin", "admin@x.ro", Role::Admin).await?;
    let (_, manager) = app
        .user_with_token("Manager", "manager@x.ro", Role::Manager)
        .await?;
    let mihai = app
        .insert_user("Mihai", "mihai@x.ro", "parola", Role::Worker)
        .await?;

    let response = app
        .post_json(
            "/api/users",
            &json!({
                "name": "Ana",
                "email": "ana@x.ro",
                "password": "parola-ana",
                "role": "WORKER"
            }),
            Some(&admin),
        )
        .await?;
    expect_json(response, StatusCode::CREATED).await?;
    let ana = app.login_token("ana@x.ro", "parola-ana").await?;

    let response = app
        .post_json("/api/documente", &document("Regulament", "HR", &[]), Some(&manager))
        .await?;
    let body = expect_json(response, StatusCode::CREATED).await?;
    assert_eq!(body["message"], "Document încărcat cu succes");
    assert_eq!(body["document"]["uploader"]["email"], "manager@x.ro");

    let response = app.get("/api/documente", Some(&ana)).await?;
    let body = expect_json(response, StatusCode::OK).await?;
    assert_eq!(titles(&body), vec!["Regulament"]);
    assert!(body["documents"][0].get("accessUserIds").is_none());

    let response = app
        .post_json(
            "/api/documente",
            &document("Contract Mihai", "HR", &[mihai]),
            Some(&manager),
        )
        .await?;
    let body = expect_json(response, StatusCode::CREATED).await?;
    let restricted_id = body["document"]["id"].as_str().unwrap_or_default().to_string();

    let response = app.get("/api/documente", Some(&ana)).await?;
    let body = expect_json(response, StatusCode::OK).await?;
    assert_eq!(titles(&body), vec!["Regulament"]);

    let response = app
        .get(&format!("/api/documente/{restricted_id}"), Some(&ana))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let mihai_token = app.login_token("mihai@x.ro", "parola").await?;
    let response = app.get("/api/documente", Some(&mihai_token)).await?;
    let body = expect_json(response, StatusCode::OK).await?;
    assert_eq!(titles(&body), vec!["Contract Mihai", "Regulament"]);

    let response = app
        .get(&format!("/api/documente/{restricted_id}"), Some(&mihai_token))
        .await?;
    let body = expect_json(response, StatusCode::OK).await?;
    assert_eq!(body["document"]["title"], "Contract Mihai");

    for token in [&admin, &manager] {
        let response = app.get("/api/documente", Some(token)).await?;
        let body = expect_json(response, StatusCode::OK).await?;
        assert_eq!(titles(&body), vec!["Contract Mihai", "Regulament"]);
    }

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn staff_see_grants_and_category_filter_applies() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (_, admin) = app.user_with_token("Admin", "admin@x.ro", Role::Admin).await?;
    let mihai = app
        .insert_user("Mihai", "mihai@x.ro", "parola", Role::Worker)
        .await?;

    // Repeated ids produce a single grant.
    let response = app
        .post_json(
            "/api/documente",
            &document("Fluturaș", "HR", &[mihai, mihai]),
            Some(&admin),
        )
        .await?;
    let body = expect_json(response, StatusCode::CREATED).await?;
    assert_eq!(body["document"]["accessUserIds"], json!([mihai]));

    let response = app
        .post_json(
            "/api/documente",
            &document("Cerere concediu", "FORM", &[]),
            Some(&admin),
        )
        .await?;
    expect_json(response, StatusCode::CREATED).await?;

    let response = app.get("/api/documente?category=FORM", Some(&admin)).await?;
    let body = expect_json(response, StatusCode::OK).await?;
    assert_eq!(titles(&body), vec!["Cerere concediu"]);
    assert_eq!(body["documents"][0]["category"], "FORM");

    let response = app.get("/api/documente?category=hr", Some(&admin)).await?;
    let body = expect_json(response, StatusCode::OK).await?;
    assert_eq!(titles(&body), vec!["Fluturaș"]);
    assert_eq!(body["documents"][0]["accessUserIds"], json!([mihai]));

    let response = app.get("/api/documente?category=SECRET", Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn invalid_documents_leave_nothing_behind() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let (_, admin) = app.user_with_token("Admin", "admin@x.ro", Role::Admin).await?;
    let (_, manager) = app
        .user_with_token("Manager", "manager@x.ro", Role::Manager)
        .await?;
    let (_, worker) = app
        .user_with_token("Worker", "worker@x.ro", Role::Worker)
        .await?;

    let response = app
        .post_json(
            "/api/documente",
            &json!({ "title": "Fără fișier", "category": "HR" }),
            Some(&admin),
        )
        .await?;
    let body = expect_json(response, StatusCode::BAD_REQUEST).await?;
    assert_eq!(
        body["message"],
        "Titlul, URL-ul fișierului, tipul fișierului și categoria sunt obligatorii"
    );

    let response = app
        .post_json(
            "/api/documente",
            &document("Fantomă", "OTHER", &[uuid::Uuid::new_v4()]),
            Some(&admin),
        )
        .await?;
    let body = expect_json(response, StatusCode::BAD_REQUEST).await?;
    assert_eq!(body["message"], "Unul sau mai mulți utilizatori nu există");

    let mut bad_grant = document("Grant invalid", "OTHER", &[]);
    bad_grant["userIds"] = json!(["nope"]);
    let response = app
        .post_json("/api/documente", &bad_grant, Some(&manager))
        .await?;
    let body = expect_json(response, StatusCode::BAD_REQUEST).await?;
    assert_eq!(body["message"], "Datele trimise nu au formatul așteptat");

    let response = app
        .post_json("/api/documente", &document("Al meu", "OTHER", &[]), Some(&worker))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The role check wins over a body that would not parse.
    let response = app
        .post_raw("/api/documente", r#"{"title":5}"#, Some(&worker))
        .await?;
    let body = expect_json(response, StatusCode::FORBIDDEN).await?;
    assert!(body["message"].is_string());
    let response = app
        .post_raw("/api/documente", "{", Some(&worker))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.get("/api/documente", Some(&admin)).await?;
    let body = expect_json(response, StatusCode::OK).await?;
    assert!(titles(&body).is_empty());

    app.cleanup().await?;
    Ok(())
}
