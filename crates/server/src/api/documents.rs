// Document endpoints. All routes require a bearer token.
//
// Routes:
//   GET    /api/docs                  - documents owned by or shared with the caller
//   POST   /api/docs                  - create
//   PUT    /api/docs/{id}             - partial update (owner or write grant)
//   DELETE /api/docs/{id}             - delete (owner or admin), missing is a no-op
//   POST   /api/docs/copy/{id}        - duplicate under a fresh id
//   POST   /api/docs/batch-delete     - delete many
//   POST   /api/docs/import           - bulk JSON or single markdown import
//   POST   /api/docs/{id}/share       - grant read/write access to another user
//   POST   /api/docs/claim-legacy     - adopt owner-less documents
//   POST   /api/docs/delete-legacy    - drop owner-less documents

use axum::{
    extract::{Extension, Path, State},
    middleware,
    routing::{post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};
use zsk_common::{
    clock,
    fields::{decode_blocks, encode_blocks, encode_tags, CodeSnippet, TagsField},
    types::{AccessLevel, Document},
};

use super::{is_truthy, text_of};
use crate::{
    auth::middleware::{require_bearer_auth, AuthenticatedUser},
    db::users,
    error::ApiError,
    state::AppState,
    validation::{optional_text, ValidatedJson},
};

const DEFAULT_TITLE: &str = "Untitled document";
const IMPORTED_TITLE: &str = "Imported document";
const IMPORTED_MARKDOWN_TITLE: &str = "Imported markdown";
const COPY_SUFFIX: &str = " - copy";

const SELECT_DOCUMENT: &str = "SELECT id, title, category, alias, tags, rich_text, markdown, \
     blocks, code, owner_id, created_at, updated_at FROM documents";

// ── Rows ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
struct DocumentRow {
    id: String,
    title: String,
    category: String,
    alias: String,
    tags: Option<String>,
    rich_text: String,
    markdown: String,
    blocks: Option<String>,
    code: Option<String>,
    owner_id: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl DocumentRow {
    fn into_document(self) -> Document {
        Document {
            tags: TagsField::decode(self.tags.as_deref()).into_tags(),
            blocks: decode_blocks(self.blocks.as_deref()),
            code: CodeSnippet::decode(self.code.as_deref()),
            id: self.id,
            title: self.title,
            category: self.category,
            alias: self.alias,
            rich_text: self.rich_text,
            markdown: self.markdown,
            owner_id: self.owner_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn is_owned_by(&self, user: &AuthenticatedUser) -> bool {
        self.owner_id == Some(user.id)
    }
}

/// Column values for a row about to be inserted; structured fields already encoded.
#[derive(Debug, Clone)]
struct NewDocument {
    title: String,
    category: String,
    alias: String,
    tags: String,
    rich_text: String,
    markdown: String,
    blocks: String,
    code: String,
}

impl NewDocument {
    /// Build from a client payload, `default_title` standing in for a blank title.
    ///
    /// With `arrays_only`, non-array tags/blocks are dropped; otherwise any
    /// non-null value is stored as given.
    fn from_payload(body: &Map<String, Value>, default_title: &str, arrays_only: bool) -> Self {
        let list_field = |key: &str, encode: fn(Option<&Value>) -> String| match body.get(key) {
            Some(value) if value.is_array() || (!arrays_only && !value.is_null()) => {
                encode(Some(value))
            }
            _ => encode(None),
        };

        let code = match body.get("code") {
            code if is_truthy(code) => CodeSnippet::encode_value(code),
            _ => CodeSnippet::default().to_storage_string(),
        };

        Self {
            title: text_or(body, "title", default_title),
            category: text_of(body, "category"),
            alias: text_of(body, "alias"),
            tags: list_field("tags", encode_tags),
            rich_text: text_of(body, "richText"),
            markdown: text_of(body, "markdown"),
            blocks: list_field("blocks", encode_blocks),
            code,
        }
    }

    fn markdown_import(body: &Map<String, Value>, markdown: &str) -> Self {
        Self {
            title: text_or(body, "title", IMPORTED_MARKDOWN_TITLE),
            category: text_of(body, "category"),
            alias: text_of(body, "alias"),
            tags: match body.get("tags") {
                Some(tags) if !tags.is_null() => encode_tags(Some(tags)),
                _ => encode_tags(None),
            },
            rich_text: String::new(),
            markdown: markdown.to_owned(),
            blocks: encode_blocks(None),
            code: CodeSnippet::new("markdown", markdown).to_storage_string(),
        }
    }

    fn copy_of(source: &DocumentRow) -> Self {
        Self {
            title: format!("{}{COPY_SUFFIX}", source.title),
            category: source.category.clone(),
            alias: String::new(),
            tags: source.tags.clone().unwrap_or_else(|| encode_tags(None)),
            rich_text: source.rich_text.clone(),
            markdown: source.markdown.clone(),
            blocks: source.blocks.clone().unwrap_or_else(|| encode_blocks(None)),
            code: source.code.clone().unwrap_or_else(|| CodeSnippet::default().to_storage_string()),
        }
    }
}

fn text_or(body: &Map<String, Value>, key: &str, default: &str) -> String {
    match body.get(key).and_then(Value::as_str) {
        Some(text) if !text.is_empty() => text.to_owned(),
        _ => default.to_owned(),
    }
}

// ── Router ─────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/docs", post(create_document).get(list_documents))
        .route("/api/docs/{id}", put(update_document).delete(delete_document))
        .route("/api/docs/copy/{id}", post(copy_document))
        .route("/api/docs/batch-delete", post(batch_delete))
        .route("/api/docs/import", post(import_documents))
        .route("/api/docs/{id}/share", post(share_document))
        .route("/api/docs/claim-legacy", post(claim_legacy))
        .route("/api/docs/delete-legacy", post(delete_legacy))
        .with_state(state.clone())
        .route_layer(middleware::from_fn_with_state(state, require_bearer_auth))
}

// ── Handlers ───────────────────────────────────────────────────────

async fn list_documents(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let rows = sqlx::query_as::<_, DocumentRow>(&format!(
        "{SELECT_DOCUMENT} WHERE owner_id = ? \
         OR EXISTS (SELECT 1 FROM document_access a WHERE a.doc_id = documents.id AND a.user_id = ?) \
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(user.id)
    .bind(user.id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(DocumentRow::into_document).collect()))
}

async fn create_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidatedJson(body): ValidatedJson<Map<String, Value>>,
) -> Result<Json<Document>, ApiError> {
    let new_document = NewDocument::from_payload(&body, DEFAULT_TITLE, true);

    let lease = state.document_ids.lease(&state.pool, 1).await?;
    let id = lease.first().to_owned();
    insert_document(&state.pool, &id, &new_document, Some(user.id)).await?;
    drop(lease);

    tracing::info!(doc_id = %id, user_id = user.id, "document created");
    Ok(Json(fetch_document(&state.pool, &id).await?.into_document()))
}

async fn update_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<Map<String, Value>>,
) -> Result<Json<Document>, ApiError> {
    let Some(row) = find_document(&state.pool, &id).await? else {
        return Err(ApiError::not_found("document not found"));
    };
    if !row.is_owned_by(&user) && !has_write_grant(&state.pool, &id, user.id).await? {
        return Err(ApiError::forbidden());
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE documents SET updated_at = ");
    query.push_bind(clock::now_timestamp());

    for (key, column) in [
        ("title", "title"),
        ("category", "category"),
        ("alias", "alias"),
        ("richText", "rich_text"),
        ("markdown", "markdown"),
    ] {
        if body.contains_key(key) {
            query.push(format!(", {column} = ")).push_bind(text_of(&body, key));
        }
    }
    if let Some(tags) = body.get("tags") {
        query.push(", tags = ").push_bind(encode_tags(Some(tags)));
    }
    if let Some(blocks) = body.get("blocks") {
        query.push(", blocks = ").push_bind(encode_blocks(Some(blocks)));
    }
    if let Some(code) = body.get("code") {
        query.push(", code = ").push_bind(CodeSnippet::encode_value(Some(code)));
    }

    query.push(" WHERE id = ").push_bind(id.clone());
    query.build().execute(&state.pool).await?;

    Ok(Json(fetch_document(&state.pool, &id).await?.into_document()))
}

async fn delete_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let Some(row) = find_document(&state.pool, &id).await? else {
        return Ok(Json(json!({ "ok": true })));
    };
    if !row.is_owned_by(&user) && !user.is_admin() {
        return Err(ApiError::forbidden());
    }

    sqlx::query("DELETE FROM documents WHERE id = ?").bind(&id).execute(&state.pool).await?;
    tracing::info!(doc_id = %id, user_id = user.id, "document deleted");
    Ok(Json(json!({ "ok": true })))
}

async fn copy_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    let Some(source) = find_document(&state.pool, &id).await? else {
        return Err(ApiError::not_found("document not found"));
    };
    if !source.is_owned_by(&user) && !user.is_admin() {
        return Err(ApiError::forbidden());
    }

    let copy = NewDocument::copy_of(&source);
    let lease = state.document_ids.lease(&state.pool, 1).await?;
    let copy_id = lease.first().to_owned();
    insert_document(&state.pool, &copy_id, &copy, source.owner_id).await?;
    drop(lease);

    tracing::info!(source = %id, doc_id = %copy_id, "document copied");
    Ok(Json(fetch_document(&state.pool, &copy_id).await?.into_document()))
}

#[derive(Deserialize)]
struct BatchDeleteRequest {
    #[serde(default)]
    ids: Value,
}

async fn batch_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidatedJson(payload): ValidatedJson<BatchDeleteRequest>,
) -> Result<Json<Value>, ApiError> {
    let ids: Vec<&str> = payload
        .ids
        .as_array()
        .map(|ids| ids.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if ids.is_empty() {
        return Ok(Json(json!({ "ok": true, "deleted": 0 })));
    }

    // One bound JSON array keeps long id lists under SQLite's variable limit.
    let ids_json = serde_json::to_string(&ids).map_err(ApiError::internal)?;
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("DELETE FROM documents WHERE id IN (SELECT value FROM json_each(");
    query.push_bind(ids_json).push("))");
    if !user.is_admin() {
        query.push(" AND owner_id = ").push_bind(user.id);
    }

    let deleted = query.build().execute(&state.pool).await?.rows_affected();
    tracing::info!(user_id = user.id, requested = ids.len(), deleted, "batch delete");
    Ok(Json(json!({ "ok": true, "deleted": deleted })))
}

async fn import_documents(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidatedJson(payload): ValidatedJson<Value>,
) -> Result<Json<Value>, ApiError> {
    match payload {
        Value::Array(items) => {
            let empty = Map::new();
            let documents: Vec<NewDocument> = items
                .iter()
                .map(|item| {
                    NewDocument::from_payload(item.as_object().unwrap_or(&empty), IMPORTED_TITLE, false)
                })
                .collect();
            if documents.is_empty() {
                return Ok(Json(json!({ "count": 0 })));
            }

            let lease = state.document_ids.lease(&state.pool, documents.len()).await?;
            let mut tx = state.pool.begin().await?;
            for (id, document) in lease.ids().iter().zip(&documents) {
                insert_document(&mut *tx, id, document, Some(user.id)).await?;
            }
            tx.commit().await?;
            drop(lease);

            tracing::info!(user_id = user.id, count = documents.len(), "documents imported");
            Ok(Json(json!({ "count": documents.len() })))
        }
        Value::Object(body) => {
            let markdown = match body.get("markdown") {
                Some(Value::String(markdown)) if !markdown.is_empty() => markdown.clone(),
                _ => return Err(ApiError::validation("invalid import payload")),
            };

            let document = NewDocument::markdown_import(&body, &markdown);
            let lease = state.document_ids.lease(&state.pool, 1).await?;
            let id = lease.first().to_owned();
            insert_document(&state.pool, &id, &document, Some(user.id)).await?;
            drop(lease);

            let created = fetch_document(&state.pool, &id).await?.into_document();
            Ok(Json(serde_json::to_value(created).map_err(ApiError::internal)?))
        }
        _ => Err(ApiError::validation("invalid import payload")),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareRequest {
    user_email: Option<String>,
    user_name: Option<String>,
    level: Option<String>,
}

async fn share_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    ValidatedJson(payload): ValidatedJson<ShareRequest>,
) -> Result<Json<Value>, ApiError> {
    let level = match payload.level.as_deref() {
        None => AccessLevel::Read,
        Some(level) => level.parse::<AccessLevel>().map_err(|e| ApiError::validation(e.to_string()))?,
    };

    let Some(row) = find_document(&state.pool, &id).await? else {
        return Err(ApiError::not_found("document not found"));
    };
    if !row.is_owned_by(&user) && !user.is_admin() {
        return Err(ApiError::forbidden());
    }

    let mut target = None;
    if let Some(email) = optional_text(payload.user_email.as_deref()) {
        target = users::find_by_email(&state.pool, &email).await?;
    }
    if target.is_none() {
        if let Some(username) = optional_text(payload.user_name.as_deref()) {
            target = users::find_by_username(&state.pool, &username).await?;
        }
    }
    let Some(target) = target else {
        return Err(ApiError::not_found("user not found"));
    };

    sqlx::query(
        "INSERT INTO document_access (doc_id, user_id, level) VALUES (?, ?, ?) \
         ON CONFLICT (doc_id, user_id) DO UPDATE SET level = excluded.level",
    )
    .bind(&id)
    .bind(target.id)
    .bind(level.as_str())
    .execute(&state.pool)
    .await?;

    tracing::info!(doc_id = %id, grantee = target.id, level = %level, "document shared");
    Ok(Json(json!({ "ok": true })))
}

async fn claim_legacy(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Value>, ApiError> {
    let count = sqlx::query("UPDATE documents SET owner_id = ? WHERE owner_id IS NULL")
        .bind(user.id)
        .execute(&state.pool)
        .await?
        .rows_affected();

    tracing::info!(user_id = user.id, count, "legacy documents claimed");
    Ok(Json(json!({ "count": count })))
}

async fn delete_legacy(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Value>, ApiError> {
    let deleted = sqlx::query("DELETE FROM documents WHERE owner_id IS NULL")
        .execute(&state.pool)
        .await?
        .rows_affected();

    tracing::info!(user_id = user.id, deleted, "legacy documents deleted");
    Ok(Json(json!({ "deleted": deleted })))
}

// ── Queries ────────────────────────────────────────────────────────

async fn find_document(pool: &SqlitePool, id: &str) -> Result<Option<DocumentRow>, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(&format!("{SELECT_DOCUMENT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

async fn fetch_document(pool: &SqlitePool, id: &str) -> Result<DocumentRow, ApiError> {
    find_document(pool, id).await?.ok_or_else(|| ApiError::not_found("document not found"))
}

async fn has_write_grant(pool: &SqlitePool, doc_id: &str, user_id: i64) -> Result<bool, sqlx::Error> {
    let level: Option<String> =
        sqlx::query_scalar("SELECT level FROM document_access WHERE doc_id = ? AND user_id = ?")
            .bind(doc_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    Ok(level.as_deref() == Some(AccessLevel::Write.as_str()))
}

async fn insert_document<'e, E>(
    executor: E,
    id: &str,
    document: &NewDocument,
    owner_id: Option<i64>,
) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = clock::now_timestamp();
    sqlx::query(
        "INSERT INTO documents (id, title, category, alias, tags, rich_text, markdown, blocks, \
         code, owner_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&document.title)
    .bind(&document.category)
    .bind(&document.alias)
    .bind(&document.tags)
    .bind(&document.rich_text)
    .bind(&document.markdown)
    .bind(&document.blocks)
    .bind(&document.code)
    .bind(owner_id)
    .bind(&now)
    .bind(&now)
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use zsk_common::types::Role;

    use super::router;
    use crate::{
        api::test_http::*,
        state::{test_support::*, AppState},
    };

    async fn setup() -> (AppState, axum::Router, String, String) {
        let state = test_state().await;
        let (_, alice) = seed_user(&state, "alice", Role::User).await;
        let (_, bob) = seed_user(&state, "bob", Role::User).await;
        let app = router(state.clone());
        (state, app, alice, bob)
    }

    async fn create(app: &axum::Router, bearer: &str, body: serde_json::Value) -> serde_json::Value {
        let (status, doc) = send(app, json_request("POST", "/api/docs", body, Some(bearer))).await;
        assert_eq!(status, StatusCode::OK, "create failed: {doc}");
        doc
    }

    #[tokio::test]
    async fn routes_require_bearer_auth() {
        let (_, app, _, _) = setup().await;
        let (status, body) = send(&app, empty_request("GET", "/api/docs", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "AUTH_INVALID_TOKEN");
    }

    #[tokio::test]
    async fn create_applies_defaults_and_decodes_fields() {
        let (_, app, alice, _) = setup().await;
        let doc = create(&app, &alice, json!({ "tags": "not-an-array", "blocks": [{"type": "p"}] })).await;

        assert_eq!(doc["title"], "Untitled document");
        assert_eq!(doc["tags"], json!([]));
        assert_eq!(doc["blocks"], json!([{"type": "p"}]));
        assert_eq!(doc["code"], json!({"language": "javascript", "value": ""}));
        assert_eq!(doc["category"], "");
        assert_eq!(doc["id"].as_str().unwrap().len(), 10);
        assert!(doc["id"].as_str().unwrap().ends_with("01"));
    }

    #[tokio::test]
    async fn sequential_creates_get_consecutive_ids() {
        let (_, app, alice, _) = setup().await;
        let first = create(&app, &alice, json!({ "title": "a" })).await;
        let second = create(&app, &alice, json!({ "title": "b" })).await;

        let first: u64 = first["id"].as_str().unwrap().parse().unwrap();
        let second: u64 = second["id"].as_str().unwrap().parse().unwrap();
        assert_eq!(second, first + 1);
    }

    #[tokio::test]
    async fn list_shows_owned_and_shared_documents_only() {
        let (_, app, alice, bob) = setup().await;
        let mine = create(&app, &alice, json!({ "title": "mine" })).await;
        let theirs = create(&app, &bob, json!({ "title": "theirs" })).await;
        create(&app, &bob, json!({ "title": "private" })).await;

        let uri = format!("/api/docs/{}/share", theirs["id"].as_str().unwrap());
        let (status, _) =
            send(&app, json_request("POST", &uri, json!({ "userName": "alice" }), Some(&bob))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, list) = send(&app, empty_request("GET", "/api/docs", Some(&alice))).await;
        let titles: Vec<&str> =
            list.as_array().unwrap().iter().map(|d| d["title"].as_str().unwrap()).collect();
        assert_eq!(titles.len(), 2);
        assert!(titles.contains(&"mine"));
        assert!(titles.contains(&"theirs"));
        assert!(mine["ownerId"].as_i64().is_some());
    }

    #[tokio::test]
    async fn update_is_partial_and_requires_write_access() {
        let (_, app, alice, bob) = setup().await;
        let doc = create(&app, &alice, json!({ "title": "t", "markdown": "# keep" })).await;
        let uri = format!("/api/docs/{}", doc["id"].as_str().unwrap());

        let (status, _) =
            send(&app, json_request("PUT", &uri, json!({ "title": "x" }), Some(&bob))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let share = format!("{uri}/share");
        let grant = json!({ "userEmail": "BOB@example.com", "level": "read" });
        send(&app, json_request("POST", &share, grant, Some(&alice))).await;
        let (status, _) =
            send(&app, json_request("PUT", &uri, json!({ "title": "x" }), Some(&bob))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let grant = json!({ "userName": "bob", "level": "write" });
        send(&app, json_request("POST", &share, grant, Some(&alice))).await;
        let body = json!({ "title": "renamed", "tags": ["x", "y"], "code": {"language": "rust", "value": "fn"} });
        let (status, updated) = send(&app, json_request("PUT", &uri, body, Some(&bob))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "renamed");
        assert_eq!(updated["markdown"], "# keep");
        assert_eq!(updated["tags"], json!(["x", "y"]));
        assert_eq!(updated["code"]["language"], "rust");
    }

    #[tokio::test]
    async fn update_of_missing_document_is_not_found() {
        let (_, app, alice, _) = setup().await;
        let (status, _) =
            send(&app, json_request("PUT", "/api/docs/1999010101", json!({}), Some(&alice))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stored_legacy_encodings_are_decoded_on_read() {
        let (state, app, alice, _) = setup().await;
        let doc = create(&app, &alice, json!({})).await;
        sqlx::query("UPDATE documents SET tags = ?, blocks = ?, code = ? WHERE id = ?")
            .bind(r#""foo, bar；baz""#)
            .bind(r#""[1,2]""#)
            .bind("not json")
            .bind(doc["id"].as_str().unwrap())
            .execute(&state.pool)
            .await
            .unwrap();

        let (_, list) = send(&app, empty_request("GET", "/api/docs", Some(&alice))).await;
        assert_eq!(list[0]["tags"], json!(["foo", "bar", "baz"]));
        assert_eq!(list[0]["blocks"], json!([1, 2]));
        assert_eq!(list[0]["code"], json!({"language": "javascript", "value": ""}));
    }

    #[tokio::test]
    async fn delete_is_owner_or_admin_and_idempotent() {
        let (state, app, alice, bob) = setup().await;
        let (_, admin) = seed_user(&state, "root", Role::Admin).await;
        let doc = create(&app, &alice, json!({})).await;
        let uri = format!("/api/docs/{}", doc["id"].as_str().unwrap());

        let (status, _) = send(&app, empty_request("DELETE", &uri, Some(&bob))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, empty_request("DELETE", &uri, Some(&admin))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));

        let (status, _) = send(&app, empty_request("DELETE", &uri, Some(&bob))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn copy_gets_fresh_id_and_suffix() {
        let (_, app, alice, bob) = setup().await;
        let doc = create(&app, &alice, json!({ "title": "Notes", "alias": "n", "tags": ["a"] })).await;
        let uri = format!("/api/docs/copy/{}", doc["id"].as_str().unwrap());

        let (status, _) = send(&app, empty_request("POST", &uri, Some(&bob))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, copy) = send(&app, empty_request("POST", &uri, Some(&alice))).await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(copy["id"], doc["id"]);
        assert_eq!(copy["title"], "Notes - copy");
        assert_eq!(copy["alias"], "");
        assert_eq!(copy["tags"], json!(["a"]));
        assert_eq!(copy["ownerId"], doc["ownerId"]);

        let (status, _) =
            send(&app, empty_request("POST", "/api/docs/copy/1999010101", Some(&alice))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn batch_delete_limits_non_admins_to_their_own() {
        let (_, app, alice, bob) = setup().await;
        let a = create(&app, &alice, json!({})).await;
        let b = create(&app, &bob, json!({})).await;

        let ids = json!({ "ids": [a["id"], b["id"]] });
        let (status, body) =
            send(&app, json_request("POST", "/api/docs/batch-delete", ids, Some(&alice))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 1);

        let (_, list) = send(&app, empty_request("GET", "/api/docs", Some(&bob))).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batch_delete_accepts_more_ids_than_sqlite_variables() {
        let (_, app, alice, _) = setup().await;
        let a = create(&app, &alice, json!({})).await;

        let mut ids: Vec<serde_json::Value> =
            (0..40_000).map(|n| json!(format!("1999{n:06}"))).collect();
        ids.push(a["id"].clone());
        let (status, body) = send(
            &app,
            json_request("POST", "/api/docs/batch-delete", json!({ "ids": ids }), Some(&alice)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 1);
    }

    #[tokio::test]
    async fn import_array_allocates_consecutive_ids() {
        let (_, app, alice, _) = setup().await;
        create(&app, &alice, json!({})).await;
        let payload = json!([{ "title": "one", "tags": ["t"] }, { "markdown": "# two" }, 3]);

        let (status, body) =
            send(&app, json_request("POST", "/api/docs/import", payload, Some(&alice))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "count": 3 }));

        let (_, list) = send(&app, empty_request("GET", "/api/docs", Some(&alice))).await;
        let mut ids: Vec<u64> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap().parse().unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids.len(), 4);
        assert!(ids.windows(2).all(|pair| pair[1] == pair[0] + 1));
        assert!(list.as_array().unwrap().iter().any(|d| d["title"] == "Imported document"));
    }

    #[tokio::test]
    async fn import_markdown_object_and_invalid_payloads() {
        let (_, app, alice, _) = setup().await;
        let payload = json!({ "markdown": "# Hello" });
        let (status, doc) =
            send(&app, json_request("POST", "/api/docs/import", payload, Some(&alice))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["title"], "Imported markdown");
        assert_eq!(doc["code"], json!({ "language": "markdown", "value": "# Hello" }));
        assert_eq!(doc["blocks"], json!([]));

        for invalid in [json!({ "title": "no markdown" }), json!("text"), json!(5)] {
            let (status, _) =
                send(&app, json_request("POST", "/api/docs/import", invalid, Some(&alice))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn share_validates_level_and_target() {
        let (_, app, alice, _) = setup().await;
        let doc = create(&app, &alice, json!({})).await;
        let uri = format!("/api/docs/{}/share", doc["id"].as_str().unwrap());

        let (status, _) = send(
            &app,
            json_request("POST", &uri, json!({ "userName": "bob", "level": "owner" }), Some(&alice)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            send(&app, json_request("POST", &uri, json!({ "userName": "nobody" }), Some(&alice)))
                .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn legacy_documents_can_be_claimed_or_deleted() {
        let (state, app, alice, _) = setup().await;
        for id in ["2000010101", "2000010102"] {
            sqlx::query("INSERT INTO documents (id, created_at, updated_at) VALUES (?, '', '')")
                .bind(id)
                .execute(&state.pool)
                .await
                .unwrap();
        }

        let (_, body) = send(&app, empty_request("POST", "/api/docs/claim-legacy", Some(&alice))).await;
        assert_eq!(body, json!({ "count": 2 }));

        sqlx::query("UPDATE documents SET owner_id = NULL WHERE id = '2000010101'")
            .execute(&state.pool)
            .await
            .unwrap();
        let (_, body) =
            send(&app, empty_request("POST", "/api/docs/delete-legacy", Some(&alice))).await;
        assert_eq!(body, json!({ "deleted": 1 }));
    }
}
