use anyhow::{anyhow, bail, Context};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use zsk_common::types::Role;

pub const SESSION_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    role: Role,
    iat: i64,
    exp: i64,
}

/// Identity carried by a valid bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: i64,
    pub role: Role,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.len() < 32 {
            bail!("jwt secret must be at least 32 characters long");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn issue(&self, user_id: i64, role: Role) -> anyhow::Result<String> {
        self.issue_at(user_id, role, current_unix_timestamp()?)
    }

    fn issue_at(&self, user_id: i64, role: Role, issued_at: i64) -> anyhow::Result<String> {
        let claims = SessionClaims {
            sub: user_id.to_string(),
            role,
            iat: issued_at,
            exp: issued_at + SESSION_TOKEN_TTL_SECONDS,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode session token")
    }

    pub fn validate(&self, token: &str) -> anyhow::Result<TokenSubject> {
        let claims = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .context("failed to decode session token")?
            .claims;

        let user_id = claims
            .sub
            .parse::<i64>()
            .with_context(|| format!("session token subject '{}' is not a user id", claims.sub))?;

        Ok(TokenSubject { user_id, role: claims.role })
    }
}

fn current_unix_timestamp() -> anyhow::Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|error| anyhow!("system clock is before unix epoch: {error}"))?;

    i64::try_from(duration.as_secs()).context("unix timestamp overflow")
}
