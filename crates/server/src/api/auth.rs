// Account endpoints. Everything except `/api/auth/me` is reachable without a
// token.

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use zsk_common::{clock, types::UserProfile};

use crate::{
    auth::{
        middleware::{require_bearer_auth, AuthenticatedUser},
        password::{hash_password, verify_password},
    },
    db::users::{self, NewUser, UserRow},
    error::{ApiError, ErrorCode},
    state::AppState,
    validation::{optional_text, required_text, ValidatedJson},
};

// ── Router ──────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/auth/me", get(me))
        .with_state(state.clone())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_auth));

    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/reset-by-email", post(reset_by_email))
        .route("/api/auth/forgot", post(forgot))
        .with_state(state)
        .merge(protected)
}

// ── Payloads ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    username: Option<String>,
    password: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetByEmailRequest {
    username: Option<String>,
    email: Option<String>,
    new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForgotRequest {
    identifier: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    token: String,
    user: UserProfile,
}

/// Passwords are taken verbatim; only emptiness is rejected.
fn required_password(value: Option<String>, field: &'static str) -> Result<String, ApiError> {
    value.filter(|password| !password.is_empty()).ok_or_else(|| {
        ApiError::validation(format!("{field} is required")).with_details(json!({ "field": field }))
    })
}

fn session_for(state: &AppState, user: &UserRow) -> Result<SessionResponse, ApiError> {
    let token = state.jwt.issue(user.id, user.role()).map_err(ApiError::internal)?;
    Ok(SessionResponse { token, user: user.profile() })
}

// ── Handlers ────────────────────────────────────────────────────────

async fn register(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RegisterRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let username = required_text(body.username.as_deref(), "username")?;
    let password = required_password(body.password, "password")?;
    let email = optional_text(body.email.as_deref());
    let name = body.name.unwrap_or_default();

    if users::find_by_username(&state.pool, &username).await?.is_some() {
        return Err(ApiError::conflict("username already exists"));
    }
    if let Some(email) = email.as_deref() {
        if users::find_by_email(&state.pool, email).await?.is_some() {
            return Err(ApiError::conflict("email already in use"));
        }
    }

    let password_hash = hash_password(password).await.map_err(ApiError::internal)?;
    let user = users::insert(
        &state.pool,
        NewUser {
            username: &username,
            email: email.as_deref(),
            password_hash: &password_hash,
            name: &name,
            created_at: &clock::now_timestamp(),
        },
    )
    .await?;

    tracing::info!(user_id = user.id, username = %user.username, "account registered");
    Ok(Json(session_for(&state, &user)?))
}

async fn login(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let invalid = || ApiError::new(ErrorCode::AuthInvalidCredentials, "invalid credentials");

    let (Some(username), Some(password)) = (body.username, body.password) else {
        return Err(invalid());
    };
    let Some(user) = users::find_by_username(&state.pool, username.trim()).await? else {
        return Err(invalid());
    };
    if !verify_password(password, user.password_hash.clone()).await.map_err(ApiError::internal)? {
        tracing::debug!(user_id = user.id, "login rejected");
        return Err(invalid());
    }

    Ok(Json(session_for(&state, &user)?))
}

async fn reset_by_email(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<ResetByEmailRequest>,
) -> Result<Json<Value>, ApiError> {
    let username = required_text(body.username.as_deref(), "username")?;
    let email = required_text(body.email.as_deref(), "email")?;
    let new_password = required_password(body.new_password, "newPassword")?;

    let Some(user) = users::find_by_username(&state.pool, &username).await? else {
        return Err(ApiError::not_found("user not found"));
    };
    let email_matches =
        user.email.as_deref().is_some_and(|stored| stored.to_lowercase() == email.to_lowercase());
    if !email_matches {
        return Err(ApiError::validation("email does not match the account"));
    }

    let password_hash = hash_password(new_password).await.map_err(ApiError::internal)?;
    users::update_password(&state.pool, user.id, &password_hash).await?;

    tracing::info!(user_id = user.id, "password reset by email");
    Ok(Json(json!({ "ok": true })))
}

/// Acknowledges a reset request. No mail is sent.
async fn forgot(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<ForgotRequest>,
) -> Result<Json<Value>, ApiError> {
    let identifier = required_text(body.identifier.as_deref(), "identifier")?;
    let Some(user) = users::find_by_identifier(&state.pool, &identifier).await? else {
        return Err(ApiError::not_found("user not found"));
    };

    tracing::info!(user_id = user.id, "password reset requested");
    Ok(Json(json!({ "ok": true, "message": "request received" })))
}

async fn me(Extension(user): Extension<AuthenticatedUser>) -> Json<UserProfile> {
    Json(user.profile())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use zsk_common::types::Role;

    use super::router;
    use crate::{api::test_http::*, state::test_support::*};

    #[tokio::test]
    async fn register_returns_a_usable_session() {
        let app = router(test_state().await);
        let body = json!({ "username": "ada", "password": "secret", "name": "Ada" });
        let (status, session) =
            send(&app, json_request("POST", "/api/auth/register", body, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["user"]["username"], "ada");
        assert_eq!(session["user"]["role"], "user");

        let bearer = format!("Bearer {}", session["token"].as_str().unwrap());
        let (status, me) = send(&app, empty_request("GET", "/api/auth/me", Some(&bearer))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me, session["user"]);
    }

    #[tokio::test]
    async fn register_validates_and_rejects_duplicates() {
        let state = test_state().await;
        seed_user(&state, "taken", Role::User).await;
        let app = router(state);

        let (status, body) = send(
            &app,
            json_request("POST", "/api/auth/register", json!({ "username": "x" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["field"], "password");

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/api/auth/register",
                json!({ "username": "taken", "password": "pw" }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/api/auth/register",
                json!({ "username": "other", "password": "pw", "email": "TAKEN@example.com" }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn login_checks_the_password() {
        let state = test_state().await;
        seed_user(&state, "ada", Role::User).await;
        let app = router(state);

        let good = json!({ "username": "ada", "password": "password123" });
        let (status, session) = send(&app, json_request("POST", "/api/auth/login", good, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(session["token"].is_string());

        for body in [
            json!({ "username": "ada", "password": "nope" }),
            json!({ "username": "ghost", "password": "password123" }),
            json!({}),
        ] {
            let (status, error) = send(&app, json_request("POST", "/api/auth/login", body, None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(error["error"]["code"], "AUTH_INVALID_CREDENTIALS");
        }
    }

    #[tokio::test]
    async fn reset_by_email_requires_the_bound_address() {
        let state = test_state().await;
        seed_user(&state, "ada", Role::User).await;
        let app = router(state);

        let cases = [
            (json!({ "username": "ada", "email": "ada@example.com" }), StatusCode::BAD_REQUEST),
            (
                json!({ "username": "ghost", "email": "a@b.c", "newPassword": "n" }),
                StatusCode::NOT_FOUND,
            ),
            (
                json!({ "username": "ada", "email": "eve@example.com", "newPassword": "n" }),
                StatusCode::BAD_REQUEST,
            ),
            (
                json!({ "username": "ada", "email": "ADA@Example.com", "newPassword": "fresh-pass" }),
                StatusCode::OK,
            ),
        ];
        for (body, expected) in cases {
            let (status, _) =
                send(&app, json_request("POST", "/api/auth/reset-by-email", body, None)).await;
            assert_eq!(status, expected);
        }

        let login = json!({ "username": "ada", "password": "fresh-pass" });
        let (status, _) = send(&app, json_request("POST", "/api/auth/login", login, None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn forgot_matches_username_or_email() {
        let state = test_state().await;
        seed_user(&state, "ada", Role::User).await;
        let app = router(state);

        for identifier in ["ada", "ADA@example.com"] {
            let body = json!({ "identifier": identifier });
            let (status, ack) = send(&app, json_request("POST", "/api/auth/forgot", body, None)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(ack["ok"], true);
        }

        let (status, _) = send(
            &app,
            json_request("POST", "/api/auth/forgot", json!({ "identifier": "ghost" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            send(&app, json_request("POST", "/api/auth/forgot", json!({}), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn me_requires_a_token() {
        let app = router(test_state().await);
        let (status, _) = send(&app, empty_request("GET", "/api/auth/me", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
