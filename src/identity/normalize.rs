use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};
use crate::types::{NormalizedEmail, NormalizedUsername};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 32;
const MAX_EMAIL_LEN: usize = 254;
/// Roughly 5 MB of binary once decoded.
pub const MAX_IMAGE_BASE64_LEN: usize = 7_000_000;
const FALLBACK_USERNAME: &str = "user";

fn is_valid_handle(value: &str, allow_upper: bool) -> bool {
    (MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&value.len())
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase() || (allow_upper && c.is_ascii_uppercase()))
}

/// Trims `display` and validates it as a handle, deriving the lowercase key.
pub fn normalize_username(display: &str) -> Result<NormalizedUsername> {
    let display = display.trim();
    if !is_valid_handle(display, true) {
        return Err(Error::validation(format!(
            "Username must be {MIN_USERNAME_LEN}-{MAX_USERNAME_LEN} letters or numbers"
        )));
    }

    let lower = display.to_ascii_lowercase();
    if !is_valid_handle(&lower, false) {
        return Err(Error::validation("Username must be lowercase letters or numbers"));
    }

    Ok(NormalizedUsername {
        lower,
        display: display.to_string(),
    })
}

fn sanitize_candidate(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_USERNAME_LEN)
        .collect()
}

/// Derives a handle from the local part of an email, dropping any `+tag`.
pub fn username_from_email(email: &str) -> Result<NormalizedUsername> {
    let local = email.trim().split('@').next().unwrap_or_default();
    let untagged = local.split('+').next().unwrap_or_default();
    let candidate = sanitize_candidate(untagged);

    if candidate.len() < MIN_USERNAME_LEN {
        return normalize_username(FALLBACK_USERNAME);
    }
    normalize_username(&candidate)
}

/// Derives a handle from a provider-reported display name, if enough of it survives.
#[must_use]
pub fn username_from_name(name: &str) -> Option<NormalizedUsername> {
    let candidate = sanitize_candidate(name);
    if candidate.len() < MIN_USERNAME_LEN {
        return None;
    }
    normalize_username(&candidate).ok()
}

pub fn normalize_email(email: &str) -> Result<NormalizedEmail> {
    let original = email.trim();
    let invalid = || Error::validation("Invalid email address");

    if original.is_empty() || original.len() > MAX_EMAIL_LEN {
        return Err(invalid());
    }
    if original.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid());
    }

    let (local, domain) = original.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }

    Ok(NormalizedEmail {
        original: original.to_string(),
        lower: original.to_lowercase(),
    })
}

/// Bounds and decodes an optional avatar payload.
pub fn validate_image_base64(image: Option<&str>) -> Result<Option<String>> {
    let Some(image) = image.map(str::trim).filter(|image| !image.is_empty()) else {
        return Ok(None);
    };

    if image.len() > MAX_IMAGE_BASE64_LEN {
        return Err(Error::validation("Image is too large"));
    }
    STANDARD
        .decode(image)
        .map_err(|_| Error::validation("Image must be base64 encoded"))?;

    Ok(Some(image.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_username_trims_and_lowers() {
        let name = normalize_username("  AlexSmith ").unwrap();
        assert_eq!(name.lower, "alexsmith");
        assert_eq!(name.display, "AlexSmith");
    }

    #[test]
    fn test_normalize_username_rejects_bad_input() {
        assert!(normalize_username("ab").is_err());
        assert!(normalize_username(&"a".repeat(33)).is_err());
        assert!(normalize_username("alex_smith").is_err());
        assert!(normalize_username("alex smith").is_err());
        assert!(normalize_username("ålex").is_err());
    }

    #[test]
    fn test_normalize_username_length_bounds() {
        assert!(normalize_username("abc").is_ok());
        assert!(normalize_username(&"a".repeat(32)).is_ok());
    }

    #[test]
    fn test_username_from_email_strips_tag_and_symbols() {
        let name = username_from_email("Jane.Doe+news@example.com").unwrap();
        assert_eq!(name.display, "JaneDoe");
        assert_eq!(name.lower, "janedoe");
    }

    #[test]
    fn test_username_from_email_falls_back_to_user() {
        let name = username_from_email("a.b@example.com").unwrap();
        assert_eq!(name.lower, "user");
        let name = username_from_email("+x@example.com").unwrap();
        assert_eq!(name.lower, "user");
    }

    #[test]
    fn test_username_from_email_truncates_long_local_part() {
        let email = format!("{}@example.com", "b".repeat(40));
        let name = username_from_email(&email).unwrap();
        assert_eq!(name.lower.len(), MAX_USERNAME_LEN);
    }

    #[test]
    fn test_username_from_name() {
        assert_eq!(
            username_from_name("Ada Lovelace").map(|n| n.display),
            Some("AdaLovelace".to_string())
        );
        assert_eq!(username_from_name("J."), None);
    }

    #[test]
    fn test_normalize_email() {
        let email = normalize_email(" PendingUser@Example.com ").unwrap();
        assert_eq!(email.original, "PendingUser@Example.com");
        assert_eq!(email.lower, "pendinguser@example.com");

        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("user@localhost").is_err());
        assert!(normalize_email("user@exa mple.com").is_err());
        assert!(normalize_email("user@@example.com").is_err());
    }

    #[test]
    fn test_validate_image_base64() {
        assert_eq!(validate_image_base64(None).unwrap(), None);
        assert_eq!(validate_image_base64(Some("")).unwrap(), None);
        assert_eq!(
            validate_image_base64(Some("aGVsbG8=")).unwrap(),
            Some("aGVsbG8=".to_string())
        );
        assert!(validate_image_base64(Some("not base64!")).is_err());

        let oversized = "A".repeat(MAX_IMAGE_BASE64_LEN + 4);
        assert!(validate_image_base64(Some(&oversized)).is_err());
    }
}
