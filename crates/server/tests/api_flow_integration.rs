use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use zsk_server::{
    auth::jwt::JwtService,
    config::ServerConfig,
    db::{
        migrations::run_migrations,
        pool::{create_sqlite_pool, PoolConfig},
    },
    server::build_app,
    state::{AppState, UploadSettings},
};

const SECRET: &str = "zsk_integration_secret_that_is_long_enough";

async fn app(dir: &tempfile::TempDir) -> Router {
    let url = format!("sqlite://{}", dir.path().join("zsk.db").display());
    let pool = create_sqlite_pool(&url, PoolConfig::default()).await.expect("pool");
    run_migrations(&pool).await.expect("migrations");

    let mut config = ServerConfig::from_env();
    config.cors_origins = None;
    config.max_body_bytes = 1024 * 1024;

    let state = AppState::new(
        pool,
        JwtService::new(SECRET).expect("jwt"),
        UploadSettings {
            dir: dir.path().join("uploads"),
            public_origin: "http://localhost:3000".to_owned(),
        },
    );
    build_app(state, &config)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>, bearer: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header("authorization", format!("Bearer {bearer}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn register(app: &Router, username: &str) -> String {
    let body = json!({ "username": username, "password": "pw-123456", "email": format!("{username}@zsk.dev") });
    let (status, session) = call(app, "POST", "/api/auth/register", Some(body), None).await;
    assert_eq!(status, StatusCode::OK, "register {username}: {session}");
    session["token"].as_str().expect("token").to_owned()
}

#[tokio::test]
async fn shared_document_flow() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(&dir).await;
    let owner = register(&app, "owner").await;
    let reader = register(&app, "reader").await;

    let (status, doc) = call(
        &app,
        "POST",
        "/api/docs",
        Some(json!({ "title": "Plan", "category": "work", "tags": ["q1"] })),
        Some(&owner),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = doc["id"].as_str().expect("id").to_owned();

    let (status, listed) = call(&app, "GET", "/api/docs", None, Some(&reader)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([]));

    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/docs/{id}/share"),
        Some(json!({ "userName": "reader", "level": "write" })),
        Some(&owner),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, updated) = call(
        &app,
        "PUT",
        &format!("/api/docs/{id}"),
        Some(json!({ "title": "Plan v2" })),
        Some(&reader),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Plan v2");
    assert_eq!(updated["tags"], json!(["q1"]));

    let (_, categories) = call(&app, "GET", "/api/categories", None, None).await;
    assert_eq!(categories, json!(["work"]));
}

#[tokio::test]
async fn first_admin_claim_is_single_use() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(&dir).await;
    let first = register(&app, "first").await;
    let second = register(&app, "second").await;

    let (status, _) = call(&app, "POST", "/api/admin/bootstrap", None, Some(&first)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, me) = call(&app, "GET", "/api/auth/me", None, Some(&first)).await;
    assert_eq!(me["role"], "admin");

    let (status, body) = call(&app, "POST", "/api/admin/bootstrap", None, Some(&second)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}
