// Bookmark endpoints (no authentication). Urls are unique case-insensitively
// after trimming; the `url_key` column enforces it.

use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Map, Value};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};
use zsk_common::{
    clock,
    fields::{encode_tags, TagsField},
    types::Bookmark,
};

use super::text_of;
use crate::{
    error::ApiError,
    state::AppState,
    validation::{optional_text, ValidatedJson},
};

const SELECT_BOOKMARK: &str =
    "SELECT id, url, title, bookmark_group, tags, created_at, updated_at FROM bookmarks";

#[derive(Debug, Clone, sqlx::FromRow)]
struct BookmarkRow {
    id: String,
    url: String,
    title: String,
    bookmark_group: String,
    tags: Option<String>,
    created_at: String,
    updated_at: Option<String>,
}

impl BookmarkRow {
    fn into_bookmark(self) -> Bookmark {
        Bookmark {
            tags: TagsField::decode(self.tags.as_deref()).into_tags(),
            id: self.id,
            url: self.url,
            title: self.title,
            group: self.bookmark_group,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

struct NewBookmark {
    url: String,
    title: String,
    group: String,
    tags: String,
}

impl NewBookmark {
    /// `None` when the payload carries no usable url.
    fn from_payload(body: &Map<String, Value>) -> Option<Self> {
        let url = optional_text(body.get("url").and_then(Value::as_str))?;
        Some(Self {
            url,
            title: text_of(body, "title"),
            group: text_of(body, "group"),
            tags: encode_tags(body.get("tags").filter(|tags| !tags.is_null())),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/bookmarks", get(list_bookmarks).post(create_bookmark))
        .route("/api/bookmarks/export", get(list_bookmarks))
        .route("/api/bookmarks/import", post(import_bookmarks))
        .route("/api/bookmarks/{id}", put(update_bookmark).delete(delete_bookmark))
        .with_state(state)
}

async fn list_bookmarks(State(state): State<AppState>) -> Result<Json<Vec<Bookmark>>, ApiError> {
    let rows = sqlx::query_as::<_, BookmarkRow>(&format!(
        "{SELECT_BOOKMARK} ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(BookmarkRow::into_bookmark).collect()))
}

async fn create_bookmark(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<Map<String, Value>>,
) -> Result<Json<Bookmark>, ApiError> {
    let Some(bookmark) = NewBookmark::from_payload(&body) else {
        return Err(ApiError::validation("invalid url"));
    };
    if url_key_taken(&state.pool, &Bookmark::url_key(&bookmark.url), None).await? {
        return Err(ApiError::conflict("bookmark already exists"));
    }

    let lease = state.bookmark_ids.lease(&state.pool, 1).await?;
    let id = lease.first().to_owned();
    insert_bookmark(&state.pool, &id, &bookmark).await?;
    drop(lease);

    tracing::info!(bookmark_id = %id, "bookmark created");
    Ok(Json(fetch_bookmark(&state.pool, &id).await?.into_bookmark()))
}

async fn update_bookmark(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<Map<String, Value>>,
) -> Result<Json<Bookmark>, ApiError> {
    let Some(current) = find_bookmark(&state.pool, &id).await? else {
        return Err(ApiError::not_found("bookmark not found"));
    };

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE bookmarks SET title = ");
    query.push_bind(text_of(&body, "title"));
    query.push(", bookmark_group = ").push_bind(text_of(&body, "group"));
    query.push(", updated_at = ").push_bind(clock::now_timestamp());

    if body.contains_key("url") {
        let Some(url) = optional_text(body.get("url").and_then(Value::as_str)) else {
            return Err(ApiError::validation("invalid url"));
        };
        let key = Bookmark::url_key(&url);
        if key != Bookmark::url_key(&current.url)
            && url_key_taken(&state.pool, &key, Some(&id)).await?
        {
            return Err(ApiError::conflict("bookmark already exists"));
        }
        query.push(", url = ").push_bind(url);
        query.push(", url_key = ").push_bind(key);
    }
    if let Some(tags) = body.get("tags") {
        query.push(", tags = ").push_bind(encode_tags(Some(tags)));
    }

    query.push(" WHERE id = ").push_bind(id.clone());
    query.build().execute(&state.pool).await?;

    Ok(Json(fetch_bookmark(&state.pool, &id).await?.into_bookmark()))
}

async fn delete_bookmark(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    sqlx::query("DELETE FROM bookmarks WHERE id = ?").bind(&id).execute(&state.pool).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn import_bookmarks(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<Value>,
) -> Result<Json<Value>, ApiError> {
    let Value::Array(items) = payload else {
        return Err(ApiError::validation("invalid import payload"));
    };

    let existing: Vec<String> =
        sqlx::query_scalar("SELECT url_key FROM bookmarks").fetch_all(&state.pool).await?;
    let mut seen: HashSet<String> = existing.into_iter().collect();

    let fresh: Vec<NewBookmark> = items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(NewBookmark::from_payload)
        .filter(|bookmark| seen.insert(Bookmark::url_key(&bookmark.url)))
        .collect();
    if fresh.is_empty() {
        return Ok(Json(json!({ "count": 0 })));
    }

    let lease = state.bookmark_ids.lease(&state.pool, fresh.len()).await?;
    let mut tx = state.pool.begin().await?;
    for (id, bookmark) in lease.ids().iter().zip(&fresh) {
        insert_bookmark(&mut *tx, id, bookmark).await?;
    }
    tx.commit().await?;
    drop(lease);

    tracing::info!(received = items.len(), imported = fresh.len(), "bookmarks imported");
    Ok(Json(json!({ "count": fresh.len() })))
}

async fn find_bookmark(pool: &SqlitePool, id: &str) -> Result<Option<BookmarkRow>, sqlx::Error> {
    sqlx::query_as::<_, BookmarkRow>(&format!("{SELECT_BOOKMARK} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

async fn fetch_bookmark(pool: &SqlitePool, id: &str) -> Result<BookmarkRow, ApiError> {
    find_bookmark(pool, id).await?.ok_or_else(|| ApiError::not_found("bookmark not found"))
}

async fn url_key_taken(
    pool: &SqlitePool,
    key: &str,
    except_id: Option<&str>,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM bookmarks WHERE url_key = ? AND id IS NOT ?)")
        .bind(key)
        .bind(except_id)
        .fetch_one(pool)
        .await
}

async fn insert_bookmark<'e, E>(executor: E, id: &str, bookmark: &NewBookmark) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO bookmarks (id, url, url_key, title, bookmark_group, tags, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&bookmark.url)
    .bind(Bookmark::url_key(&bookmark.url))
    .bind(&bookmark.title)
    .bind(&bookmark.group)
    .bind(&bookmark.tags)
    .bind(clock::now_timestamp())
    .execute(executor)
    .await?;
    Ok(())
}
