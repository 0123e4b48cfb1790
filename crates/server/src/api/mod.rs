pub mod admin;
pub mod auth;
pub mod bookmarks;
pub mod categories;
pub mod documents;
pub mod uploads;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::{db::pool::check_pool_health, state::AppState};

/// Every `/api` route plus static upload serving.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .with_state(state.clone())
        .merge(auth::router(state.clone()))
        .merge(documents::router(state.clone()))
        .merge(categories::router(state.clone()))
        .merge(bookmarks::router(state.clone()))
        .merge(admin::router(state.clone()))
        .merge(uploads::router(state))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let store_ok = match check_pool_health(&state.pool).await {
        Ok(()) => true,
        Err(error) => {
            tracing::warn!(error = ?error, "health check could not reach the store");
            false
        }
    };
    Json(json!({ "ok": true, "storeOk": store_ok }))
}

/// Text value of `key`; absent, null and non-string values read as "".
pub(crate) fn text_of(body: &serde_json::Map<String, Value>, key: &str) -> String {
    body.get(key).and_then(Value::as_str).unwrap_or_default().to_owned()
}

/// JavaScript-style truthiness, used where a missing-or-empty value falls back.
pub(crate) fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}
