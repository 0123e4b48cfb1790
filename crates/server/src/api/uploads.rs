// Image uploads arrive as data URLs and are written below the uploads
// directory in per-day folders; `/uploads` serves them back.

use std::{path::Path, sync::OnceLock};

use anyhow::Context;
use axum::{extract::State, routing::post, Json, Router};
use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use zsk_common::{clock, ids};

use crate::{error::ApiError, state::AppState, validation::ValidatedJson};

const DEFAULT_EXTENSION: &str = ".png";
const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 6;

/// Browsers emit both padded and unpadded payloads.
const DATA_URL_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn router(state: AppState) -> Router {
    let files = ServeDir::new(&state.uploads.dir);
    Router::new()
        .route("/api/upload-image", post(upload_image))
        .with_state(state)
        .nest_service("/uploads", files)
}

#[derive(Debug, Deserialize)]
struct UploadRequest {
    data: Option<String>,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    url: String,
}

fn data_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^data:(image/[a-zA-Z0-9.+-]+);base64,(.+)$")
            .expect("data url pattern should compile")
    })
}

fn extension_from_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\.(png|jpg|jpeg|gif|webp|svg)$").expect("name pattern should compile")
    })
}

/// A decoded data URL.
#[derive(Debug, PartialEq, Eq)]
struct ImagePayload {
    mime: String,
    bytes: Vec<u8>,
}

fn parse_data_url(data: &str) -> Option<ImagePayload> {
    let captures = data_url_pattern().captures(data)?;
    let bytes = DATA_URL_BASE64.decode(captures[2].trim()).ok()?;
    Some(ImagePayload { mime: captures[1].to_owned(), bytes })
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some(".png"),
        "image/jpeg" => Some(".jpg"),
        "image/gif" => Some(".gif"),
        "image/webp" => Some(".webp"),
        "image/svg+xml" => Some(".svg"),
        _ => None,
    }
}

/// Mime type first, then the client's file name, then `.png`.
fn choose_extension(mime: &str, name: &str) -> String {
    if let Some(ext) = extension_for_mime(mime) {
        return ext.to_owned();
    }
    extension_from_name_pattern()
        .captures(name)
        .map(|captures| format!(".{}", captures[1].to_ascii_lowercase()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_owned())
}

/// `{millis}-{six base36 chars}{ext}`.
fn unique_file_name(ext: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| char::from(SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())]))
        .collect();
    format!("{}-{suffix}{ext}", chrono::Utc::now().timestamp_millis())
}

async fn store_image(dir: &Path, file_name: &str, bytes: &[u8]) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create upload directory {}", dir.display()))?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("failed to write upload {}", path.display()))
}

async fn upload_image(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    let Some(data) = body.data.filter(|data| !data.is_empty()) else {
        return Err(ApiError::validation("invalid image data"));
    };
    let Some(image) = parse_data_url(&data) else {
        return Err(ApiError::validation("invalid data url"));
    };

    let day = ids::day_prefix(clock::today());
    let file_name = unique_file_name(&choose_extension(&image.mime, &body.name));
    store_image(&state.uploads.dir.join(&day), &file_name, &image.bytes)
        .await
        .map_err(ApiError::internal)?;

    tracing::info!(file = %file_name, bytes = image.bytes.len(), mime = %image.mime, "image stored");
    Ok(Json(UploadResponse { url: format!("{}/uploads/{day}/{file_name}", state.uploads.public_origin) }))
}
