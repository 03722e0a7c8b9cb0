use chrono::{DateTime, Utc};

use super::{TokenGenerator, parse_token};
use crate::store::SqliteStore;
use crate::types::Token;

#[derive(Debug, PartialEq, Eq)]
pub enum TokenValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    InternalError,
}

/// Pulls the raw token out of an `Authorization: Bearer` header.
/// Returns `Ok(None)` when no header is present.
pub fn extract_bearer_token(
    auth_header: Option<&str>,
) -> Result<Option<&str>, TokenValidationError> {
    match auth_header {
        None => Ok(None),
        Some(header) => header
            .strip_prefix("Bearer ")
            .map(|token| Some(token.trim()))
            .ok_or(TokenValidationError::InvalidScheme),
    }
}

/// Validates a raw token against the store and stamps its last use.
pub fn validate_token(
    store: &SqliteStore,
    raw_token: &str,
    now: DateTime<Utc>,
) -> Result<Token, TokenValidationError> {
    let (lookup, _secret) =
        parse_token(raw_token).map_err(|_| TokenValidationError::InvalidToken)?;

    let token = store
        .query(|store| store.get_token_by_lookup(lookup))
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;

    let generator = TokenGenerator::new();
    if !generator
        .verify(raw_token, &token.token_hash)
        .map_err(|_| TokenValidationError::InternalError)?
    {
        return Err(TokenValidationError::InvalidToken);
    }

    if token.expires_at.is_some_and(|expires_at| expires_at <= now) {
        return Err(TokenValidationError::TokenExpired);
    }

    if let Err(e) = store.mutation(|store| store.update_token_last_used(&token.id, now)) {
        tracing::warn!("Failed to update token last_used_at: {e}");
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::auth::TokenGrant;

    fn minted(store: &SqliteStore, grant: TokenGrant, now: DateTime<Utc>) -> (Token, String) {
        let (token, raw) = TokenGenerator::new().issue(grant, now).unwrap();
        store.mutation(|s| s.create_token(&token)).unwrap();
        (token, raw)
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token(None), Ok(None));
        assert_eq!(extract_bearer_token(Some("Bearer abc")), Ok(Some("abc")));
        assert_eq!(
            extract_bearer_token(Some("Basic abc")),
            Err(TokenValidationError::InvalidScheme)
        );
    }

    #[test]
    fn test_validate_token_stamps_last_use() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        let (token, raw) = minted(&store, TokenGrant::Trusted, now);

        let validated = validate_token(&store, &raw, now).unwrap();
        assert_eq!(validated.id, token.id);

        let stored = store
            .query(|s| s.get_token_by_lookup(&token.token_lookup))
            .unwrap()
            .unwrap();
        assert!(stored.last_used_at.is_some());
    }

    #[test]
    fn test_validate_token_rejects_expired_and_unknown() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        let grant = TokenGrant::Session {
            subject: "s".to_string(),
            email: None,
            expires_at: Some(now + Duration::minutes(5)),
        };
        let (_, raw) = minted(&store, grant, now);

        assert_eq!(
            validate_token(&store, &raw, now + Duration::minutes(5)).unwrap_err(),
            TokenValidationError::TokenExpired
        );
        assert_eq!(
            validate_token(&store, "nameward_00000000_000000000000000000000000", now)
                .unwrap_err(),
            TokenValidationError::InvalidToken
        );
    }
}
