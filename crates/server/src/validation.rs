// Request body extraction and small field validators.
//
// - `ValidatedJson<T>` extractor: serde + structured VALIDATION_FAILED errors.
// - `required_text` / `optional_text` for the trimmed-string checks every
//   endpoint repeats.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::{ApiError, ErrorCode};

/// A JSON body extractor that returns a structured `ApiError` on failure.
///
/// Use this instead of `axum::Json<T>` in handlers to get consistent
/// VALIDATION_FAILED error responses instead of plain-text Axum rejections.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Err(ApiError::from_code(ErrorCode::PayloadTooLarge).into_response())
            }
            Err(rejection) => {
                let (message, details) = classify_json_rejection(&rejection);
                Err(ApiError::validation(message).with_details(details).into_response())
            }
        }
    }
}

fn classify_json_rejection(rejection: &JsonRejection) -> (String, serde_json::Value) {
    match rejection {
        JsonRejection::JsonDataError(e) => {
            (format!("invalid JSON payload: {e}"), json!({ "kind": "data_error" }))
        }
        JsonRejection::JsonSyntaxError(e) => {
            (format!("malformed JSON: {e}"), json!({ "kind": "syntax_error" }))
        }
        JsonRejection::MissingJsonContentType(_) => (
            "expected Content-Type: application/json".to_string(),
            json!({ "kind": "missing_content_type" }),
        ),
        JsonRejection::BytesRejection(e) => {
            (format!("request body error: {e}"), json!({ "kind": "body_error" }))
        }
        other => (format!("request body error: {other}"), json!({ "kind": "unknown" })),
    }
}

/// Trimmed, non-empty value of a required text field.
pub fn required_text(value: Option<&str>, field: &'static str) -> Result<String, ApiError> {
    optional_text(value).ok_or_else(|| {
        ApiError::validation(format!("{field} is required")).with_details(json!({ "field": field }))
    })
}

/// Trimmed value of an optional text field; blank counts as absent.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(ToOwned::to_owned)
}
