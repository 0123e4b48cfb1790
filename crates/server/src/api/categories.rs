// Category endpoints. Categories are names; documents reference them by
// string, so rename and delete rewrite documents in the same transaction.
//
// Routes (no authentication):
//   GET    /api/categories                  - explicit and referenced names, sorted
//   POST   /api/categories                  - create
//   PUT    /api/categories/rename           - rename and rewrite documents
//   DELETE /api/categories/{name}?moveTo=   - delete and move documents

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::{SqliteConnection, SqliteExecutor};
use zsk_common::clock;

use crate::{
    error::ApiError,
    state::AppState,
    validation::{required_text, ValidatedJson},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        // A category literally named "rename" is still deletable.
        .route("/api/categories/rename", put(rename_category).delete(delete_rename_category))
        .route("/api/categories/{name}", delete(delete_category))
        .with_state(state)
}

/// Every category name, explicit or referenced by a document, sorted and de-duplicated.
async fn category_names<'e, E>(executor: E) -> Result<Vec<String>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_scalar(
        "SELECT name FROM categories WHERE name <> '' \
         UNION SELECT category FROM documents WHERE category <> '' \
         ORDER BY 1",
    )
    .fetch_all(executor)
    .await
}

async fn category_exists(conn: &mut SqliteConnection, name: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM categories WHERE name = ?) \
         OR EXISTS (SELECT 1 FROM documents WHERE category = ?)",
    )
    .bind(name)
    .bind(name)
    .fetch_one(conn)
    .await
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(category_names(&state.pool).await?))
}

#[derive(Deserialize)]
struct CreateCategoryRequest {
    name: Option<String>,
}

async fn create_category(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateCategoryRequest>,
) -> Result<Json<Value>, ApiError> {
    let name = required_text(payload.name.as_deref(), "name")?;

    let inserted = sqlx::query("INSERT INTO categories (name) VALUES (?) ON CONFLICT (name) DO NOTHING")
        .bind(&name)
        .execute(&state.pool)
        .await?
        .rows_affected();
    if inserted == 0 {
        return Err(ApiError::conflict("category already exists"));
    }

    tracing::info!(category = %name, "category created");
    Ok(Json(json!({ "ok": true, "categories": category_names(&state.pool).await? })))
}

#[derive(Deserialize)]
struct RenameCategoryRequest {
    from: Option<String>,
    to: Option<String>,
}

async fn rename_category(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RenameCategoryRequest>,
) -> Result<Json<Value>, ApiError> {
    let from = required_text(payload.from.as_deref(), "from")?;
    let to = required_text(payload.to.as_deref(), "to")?;

    let mut tx = state.pool.begin().await?;
    if !category_exists(&mut tx, &from).await? {
        return Err(ApiError::not_found("category not found"));
    }
    if category_exists(&mut tx, &to).await? {
        return Err(ApiError::conflict("target category already exists"));
    }

    let renamed = sqlx::query("UPDATE categories SET name = ? WHERE name = ?")
        .bind(&to)
        .bind(&from)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if renamed == 0 {
        sqlx::query("INSERT INTO categories (name) VALUES (?)").bind(&to).execute(&mut *tx).await?;
    }

    let updated = sqlx::query("UPDATE documents SET category = ?, updated_at = ? WHERE category = ?")
        .bind(&to)
        .bind(clock::now_timestamp())
        .bind(&from)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let categories = category_names(&mut *tx).await?;
    tx.commit().await?;

    tracing::info!(from = %from, to = %to, updated, "category renamed");
    Ok(Json(json!({ "ok": true, "updated": updated, "categories": categories })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteCategoryQuery {
    move_to: Option<String>,
}

async fn delete_category(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DeleteCategoryQuery>,
) -> Result<Json<Value>, ApiError> {
    remove_category(&state, name, query.move_to).await
}

async fn delete_rename_category(
    State(state): State<AppState>,
    Query(query): Query<DeleteCategoryQuery>,
) -> Result<Json<Value>, ApiError> {
    remove_category(&state, "rename".to_owned(), query.move_to).await
}

async fn remove_category(
    state: &AppState,
    name: String,
    move_to: Option<String>,
) -> Result<Json<Value>, ApiError> {
    if name.is_empty() {
        return Err(ApiError::validation("category name is required"));
    }
    let move_to = move_to.as_deref().map(str::trim).unwrap_or_default().to_owned();

    let mut tx = state.pool.begin().await?;
    sqlx::query("DELETE FROM categories WHERE name = ?").bind(&name).execute(&mut *tx).await?;
    let updated = sqlx::query("UPDATE documents SET category = ?, updated_at = ? WHERE category = ?")
        .bind(&move_to)
        .bind(clock::now_timestamp())
        .bind(&name)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if !move_to.is_empty() {
        sqlx::query("INSERT INTO categories (name) VALUES (?) ON CONFLICT (name) DO NOTHING")
            .bind(&move_to)
            .execute(&mut *tx)
            .await?;
    }
    let categories = category_names(&mut *tx).await?;
    tx.commit().await?;

    tracing::info!(category = %name, move_to = %move_to, updated, "category deleted");
    Ok(Json(json!({ "ok": true, "updated": updated, "categories": categories })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::router;
    use crate::{
        api::test_http::*,
        state::{test_support::*, AppState},
    };

    async fn setup() -> (AppState, axum::Router) {
        let state = test_state().await;
        let app = router(state.clone());
        (state, app)
    }

    async fn insert_doc(state: &AppState, id: &str, category: &str) {
        sqlx::query("INSERT INTO documents (id, category, created_at, updated_at) VALUES (?, ?, '', '')")
            .bind(id)
            .bind(category)
            .execute(&state.pool)
            .await
            .unwrap();
    }

    async fn category_of(state: &AppState, id: &str) -> String {
        sqlx::query_scalar("SELECT category FROM documents WHERE id = ?")
            .bind(id)
            .fetch_one(&state.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn list_is_the_sorted_union_of_explicit_and_referenced_names() {
        let (state, app) = setup().await;
        insert_doc(&state, "1", "work").await;
        insert_doc(&state, "2", "").await;
        insert_doc(&state, "3", "alpha").await;
        send(&app, json_request("POST", "/api/categories", json!({ "name": "work" }), None)).await;
        send(&app, json_request("POST", "/api/categories", json!({ "name": " misc " }), None)).await;

        let (status, list) = send(&app, empty_request("GET", "/api/categories", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list, json!(["alpha", "misc", "work"]));
    }

    #[tokio::test]
    async fn create_rejects_blank_and_duplicate_names() {
        let (_, app) = setup().await;
        let (status, _) =
            send(&app, json_request("POST", "/api/categories", json!({ "name": "  " }), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            send(&app, json_request("POST", "/api/categories", json!({ "name": "a" }), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["categories"], json!(["a"]));

        let (status, _) =
            send(&app, json_request("POST", "/api/categories", json!({ "name": "a" }), None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn rename_rewrites_referencing_documents() {
        let (state, app) = setup().await;
        send(&app, json_request("POST", "/api/categories", json!({ "name": "A" }), None)).await;
        insert_doc(&state, "1", "A").await;
        insert_doc(&state, "2", "A").await;
        insert_doc(&state, "3", "C").await;

        let body = json!({ "from": "A", "to": "B" });
        let (status, result) =
            send(&app, json_request("PUT", "/api/categories/rename", body, None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["updated"], 2);
        assert_eq!(result["categories"], json!(["B", "C"]));
        assert_eq!(category_of(&state, "1").await, "B");
        assert_eq!(category_of(&state, "3").await, "C");
    }

    #[tokio::test]
    async fn rename_onto_existing_category_conflicts_without_rewriting() {
        let (state, app) = setup().await;
        send(&app, json_request("POST", "/api/categories", json!({ "name": "A" }), None)).await;
        send(&app, json_request("POST", "/api/categories", json!({ "name": "B" }), None)).await;
        insert_doc(&state, "1", "A").await;

        let body = json!({ "from": "A", "to": "B" });
        let (status, _) = send(&app, json_request("PUT", "/api/categories/rename", body, None)).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(category_of(&state, "1").await, "A");
    }

    #[tokio::test]
    async fn rename_validates_payload_and_source() {
        let (state, app) = setup().await;
        let (status, _) = send(
            &app,
            json_request("PUT", "/api/categories/rename", json!({ "from": "A" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = json!({ "from": "missing", "to": "B" });
        let (status, _) = send(&app, json_request("PUT", "/api/categories/rename", body, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Referenced only by a document still counts as existing.
        insert_doc(&state, "1", "implicit").await;
        let body = json!({ "from": "implicit", "to": "explicit" });
        let (status, result) =
            send(&app, json_request("PUT", "/api/categories/rename", body, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["categories"], json!(["explicit"]));
    }

    #[tokio::test]
    async fn delete_with_empty_move_to_clears_document_categories() {
        let (state, app) = setup().await;
        send(&app, json_request("POST", "/api/categories", json!({ "name": "A" }), None)).await;
        insert_doc(&state, "1", "A").await;

        let (status, result) =
            send(&app, empty_request("DELETE", "/api/categories/A?moveTo=", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["updated"], 1);
        assert_eq!(category_of(&state, "1").await, "");

        let (_, list) = send(&app, empty_request("GET", "/api/categories", None)).await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn delete_moves_documents_and_creates_target() {
        let (state, app) = setup().await;
        insert_doc(&state, "1", "old name").await;

        let (status, result) = send(
            &app,
            empty_request("DELETE", "/api/categories/old%20name?moveTo=%20archive%20", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["categories"], json!(["archive"]));
        assert_eq!(category_of(&state, "1").await, "archive");
    }

    #[tokio::test]
    async fn category_named_rename_can_be_deleted() {
        let (_, app) = setup().await;
        send(&app, json_request("POST", "/api/categories", json!({ "name": "rename" }), None)).await;

        let (status, result) =
            send(&app, empty_request("DELETE", "/api/categories/rename", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["categories"], json!([]));
    }
}
