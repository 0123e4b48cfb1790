use axum::{
    extract::State,
    http::header,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::middleware::{require_bearer_auth, AuthenticatedUser},
    backup::{self, RestoreError},
    db::users,
    error::ApiError,
    state::AppState,
    validation::ValidatedJson,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/admin/bootstrap", post(bootstrap))
        .route("/api/admin/backup", get(download_backup))
        .route("/api/admin/restore", post(restore))
        .with_state(state.clone())
        .route_layer(middleware::from_fn_with_state(state, require_bearer_auth))
}

fn require_admin(user: &AuthenticatedUser) -> Result<(), ApiError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}

/// First-admin claim: the caller is promoted only while no admin exists.
async fn bootstrap(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Value>, ApiError> {
    if !users::promote_first_admin(&state.pool, user.id).await? {
        return Err(ApiError::conflict("an admin already exists"));
    }

    tracing::info!(user_id = user.id, username = %user.username, "first admin claimed");
    Ok(Json(json!({ "ok": true })))
}

async fn download_backup(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Response, ApiError> {
    require_admin(&user)?;
    let archive =
        backup::create_backup(&state.pool, &state.uploads.dir).await.map_err(ApiError::internal)?;

    tracing::info!(user_id = user.id, bytes = archive.bytes.len(), "backup created");
    let disposition = format!("attachment; filename=\"{}\"", archive.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive.bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestoreRequest {
    zip_base64: Option<String>,
}

async fn restore(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    ValidatedJson(body): ValidatedJson<RestoreRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    let Some(encoded) = body.zip_base64.filter(|encoded| !encoded.is_empty()) else {
        return Err(ApiError::validation("zipBase64 is required"));
    };
    let archive = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|error| ApiError::validation(format!("archive is not valid base64: {error}")))?;

    let report = backup::restore_backup(
        archive,
        state.database_path.as_deref().cloned(),
        state.uploads.dir.clone(),
    )
    .await
    .map_err(|error| match error {
        RestoreError::InvalidArchive(_) | RestoreError::UnsafePath(_) => {
            ApiError::validation(error.to_string())
        }
        RestoreError::Io(_) => ApiError::internal(error),
    })?;

    tracing::info!(
        user_id = user.id,
        database_staged = report.database_staged,
        uploads_restored = report.uploads_restored,
        "backup restored"
    );
    Ok(Json(json!({
        "ok": true,
        "restartRecommended": report.database_staged,
        "uploadsRestored": report.uploads_restored,
    })))
}
