use crate::{
    db::users,
    error::{ApiError, ErrorCode},
    state::AppState,
};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use zsk_common::types::{Role, UserProfile};

/// The caller, as currently stored. Roles come from the row, not the token,
/// so promotions take effect without logging in again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }
}

pub async fn require_bearer_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
    {
        Some(token) => token,
        None => return unauthorized_response("missing bearer token"),
    };

    let subject = match state.jwt.validate(token) {
        Ok(subject) => subject,
        Err(_) => return unauthorized_response("invalid bearer token"),
    };

    let user = match users::find_by_id(&state.pool, subject.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return unauthorized_response("account no longer exists"),
        Err(error) => return ApiError::from(error).into_response(),
    };

    request.extensions_mut().insert(AuthenticatedUser {
        id: user.id,
        role: user.role(),
        username: user.username,
        name: user.name,
    });

    next.run(request).await
}

fn extract_bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    Some(token)
}

fn unauthorized_response(message: &'static str) -> Response {
    ApiError::new(ErrorCode::AuthInvalidToken, message).into_response()
}
