use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::Token;

const ARGON2_MEMORY: u32 = 64 * 1024; // 64KB
const ARGON2_ITERATIONS: u32 = 1;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_OUTPUT_LEN: usize = 32;

const TOKEN_PREFIX: &str = "nameward";
const LOOKUP_LENGTH: usize = 8;
const SECRET_BYTES: usize = 12;
const SECRET_LENGTH: usize = SECRET_BYTES * 2;

/// Who a minted token speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    /// Internal callers: the signup flow, auth provider, scheduler, bootstrap.
    Trusted,
    /// An end-user session vouched for by the auth provider.
    Session {
        subject: String,
        email: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    },
}

pub struct TokenGenerator {
    argon2: Argon2<'static>,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator {
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(
            ARGON2_MEMORY,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(ARGON2_OUTPUT_LEN),
        )
        .expect("invalid argon2 params");

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Mints a token with the format `nameward_<lookup>_<secret>`.
    /// Returns the stored record and the raw token, which is never persisted.
    pub fn issue(&self, grant: TokenGrant, now: DateTime<Utc>) -> Result<(Token, String)> {
        let lookup = generate_lookup();
        let raw_token = format!("{TOKEN_PREFIX}_{lookup}_{}", generate_secret());
        let token_hash = self.hash(&raw_token)?;

        let (is_trusted, subject, email, expires_at) = match grant {
            TokenGrant::Trusted => (true, None, None, None),
            TokenGrant::Session {
                subject,
                email,
                expires_at,
            } => (false, Some(subject), email, expires_at),
        };

        let token = Token {
            id: Uuid::new_v4().to_string(),
            token_hash,
            token_lookup: lookup,
            is_trusted,
            subject,
            email,
            created_at: now,
            expires_at,
            last_used_at: None,
        };
        Ok((token, raw_token))
    }

    /// Hashes a raw token using Argon2id
    pub fn hash(&self, token: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(token.as_bytes(), &salt)
            .map_err(|e| Error::Config(format!("failed to hash token: {e}")))?;
        Ok(hash.to_string())
    }

    /// Verifies a raw token against a stored hash
    pub fn verify(&self, token: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("invalid hash format: {e}")))?;

        match self.argon2.verify_password(token.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Config(format!("failed to verify token: {e}"))),
        }
    }
}

fn generate_lookup() -> String {
    Uuid::new_v4().simple().to_string()[..LOOKUP_LENGTH].to_string()
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Splits a raw token into its lookup and secret parts.
pub fn parse_token(token: &str) -> Result<(&str, &str)> {
    let rest = token
        .strip_prefix(TOKEN_PREFIX)
        .and_then(|rest| rest.strip_prefix('_'))
        .ok_or(Error::InvalidTokenFormat)?;
    let (lookup, secret) = rest.split_once('_').ok_or(Error::InvalidTokenFormat)?;

    if lookup.len() != LOOKUP_LENGTH || secret.len() != SECRET_LENGTH || secret.contains('_') {
        return Err(Error::InvalidTokenFormat);
    }
    Ok((lookup, secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_grant() -> TokenGrant {
        TokenGrant::Session {
            subject: "subject-1".to_string(),
            email: Some("a@example.com".to_string()),
            expires_at: None,
        }
    }

    #[test]
    fn test_issued_token_format() {
        let generator = TokenGenerator::new();
        let (token, raw) = generator.issue(session_grant(), Utc::now()).unwrap();

        let parts: Vec<&str> = raw.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "nameward");
        assert_eq!(parts[1], token.token_lookup);
        assert_eq!(parts[2].len(), SECRET_LENGTH);
        assert_eq!(token.subject.as_deref(), Some("subject-1"));
        assert!(!token.is_trusted);
    }

    #[test]
    fn test_trusted_grant_has_no_subject() {
        let generator = TokenGenerator::new();
        let (token, _) = generator.issue(TokenGrant::Trusted, Utc::now()).unwrap();
        assert!(token.is_trusted);
        assert!(token.subject.is_none());
    }

    #[test]
    fn test_verification() {
        let generator = TokenGenerator::new();
        let (token, raw) = generator.issue(TokenGrant::Trusted, Utc::now()).unwrap();

        assert!(token.token_hash.starts_with("$argon2id$"));
        assert!(generator.verify(&raw, &token.token_hash).unwrap());

        let wrong = format!("{}00000", &raw[..raw.len() - 5]);
        assert!(!generator.verify(&wrong, &token.token_hash).unwrap());
    }

    #[test]
    fn test_parse_token() {
        let (lookup, secret) = parse_token("nameward_12345678_123456789012345678901234").unwrap();
        assert_eq!(lookup, "12345678");
        assert_eq!(secret, "123456789012345678901234");

        assert!(parse_token("other_12345678_123456789012345678901234").is_err());
        assert!(parse_token("nameward_12345678").is_err());
        assert!(parse_token("nameward_1234_123456789012345678901234").is_err());
    }
}
