use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use anyhow::anyhow;
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use platform_api::ApiError;
use products_crm::Caller;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "crm_session";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_ttl_minutes: i64,
}

impl AuthConfig {
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.jwt_secret.as_bytes())
    }

    pub fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.jwt_secret.as_bytes())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

pub fn issue_token(user_id: Uuid, config: &AuthConfig) -> anyhow::Result<String> {
    let now = Utc::now();
    let exp = TimeDelta::try_minutes(config.session_ttl_minutes)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            anyhow!(
                "session ttl of {} minutes is out of range",
                config.session_ttl_minutes
            )
        })?;
    let claims = SessionClaims {
        sub: user_id,
        exp: exp.timestamp() as usize,
        iat: now.timestamp() as usize,
    };
    Ok(jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &config.encoding_key(),
    )?)
}

pub fn decode_token(
    token: &str,
    config: &AuthConfig,
) -> jsonwebtoken::errors::Result<SessionClaims> {
    jsonwebtoken::decode::<SessionClaims>(token, &config.decoding_key(), &Validation::default())
        .map(|data| data.claims)
}

/// Bearer header first, then the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(text) = value.to_str() {
            if let Some(rest) = text.strip_prefix("Bearer ") {
                return Some(rest.trim().to_string());
            }
        }
    }
    let cookie = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(SESSION_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .map(|value| value.trim().to_string())
    })
}

/// Resolves the caller from request headers; `None` when missing or invalid.
pub fn authenticate(config: &AuthConfig, headers: &HeaderMap) -> Option<Caller> {
    let token = extract_token(headers)?;
    match decode_token(&token, config) {
        Ok(claims) => Some(Caller::new(claims.sub)),
        Err(err) => {
            debug!(error = %err, "rejecting session token");
            None
        }
    }
}

/// Extractor that rejects unauthenticated requests with 401.
#[derive(Clone, Copy, Debug)]
pub struct AuthenticatedCaller(pub Caller);

impl<S> FromRequestParts<S> for AuthenticatedCaller
where
    Arc<AuthConfig>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<AuthConfig>::from_ref(state);
        authenticate(&config, &parts.headers)
            .map(AuthenticatedCaller)
            .ok_or(ApiError::Unauthorized)
    }
}
