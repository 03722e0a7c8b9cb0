use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, header::WWW_AUTHENTICATE, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;

use super::helpers::{TokenValidationError, extract_bearer_token, validate_token};
use crate::server::AppState;
use crate::types::{Session, Token};

/// Extractor that requires an end-user session token.
pub struct RequireSession(pub Session);

/// Extractor for routes that answer unauthenticated callers themselves.
/// A missing or unusable token yields `None`.
pub struct MaybeSession(pub Option<Session>);

/// Extractor that requires the trusted token held by internal callers.
pub struct RequireTrusted(pub Token);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    NotTrusted,
    NotSession,
    InternalError,
}

impl From<TokenValidationError> for AuthError {
    fn from(e: TokenValidationError) -> Self {
        match e {
            TokenValidationError::InvalidScheme => AuthError::InvalidScheme,
            TokenValidationError::InvalidToken => AuthError::InvalidToken,
            TokenValidationError::TokenExpired => AuthError::TokenExpired,
            TokenValidationError::InternalError => AuthError::InternalError,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::NotTrusted => (StatusCode::FORBIDDEN, "Trusted caller required"),
            AuthError::NotSession => (
                StatusCode::FORBIDDEN,
                "Session token required for this operation",
            ),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"nameward\""),
            );
        }

        response
    }
}

fn token_session(token: Token) -> Option<Session> {
    if token.is_trusted {
        return None;
    }
    token.subject.map(|subject| Session {
        subject,
        email: token.email,
    })
}

impl FromRequestParts<Arc<AppState>> for RequireSession {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_and_validate_token(parts, state)?;
        token_session(token)
            .map(RequireSession)
            .ok_or(AuthError::NotSession)
    }
}

impl FromRequestParts<Arc<AppState>> for MaybeSession {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match extract_and_validate_token(parts, state) {
            Ok(token) => Ok(MaybeSession(token_session(token))),
            Err(AuthError::InternalError) => Err(AuthError::InternalError),
            Err(_) => Ok(MaybeSession(None)),
        }
    }
}

impl FromRequestParts<Arc<AppState>> for RequireTrusted {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_and_validate_token(parts, state)?;

        if !token.is_trusted {
            return Err(AuthError::NotTrusted);
        }

        Ok(RequireTrusted(token))
    }
}

fn extract_and_validate_token(parts: &Parts, state: &Arc<AppState>) -> Result<Token, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let raw_token = extract_bearer_token(auth_header)?.ok_or(AuthError::MissingAuth)?;

    Ok(validate_token(state.store(), raw_token, Utc::now())?)
}
