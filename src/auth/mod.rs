mod helpers;
mod middleware;
mod token;

pub use helpers::{TokenValidationError, extract_bearer_token, validate_token};
pub use middleware::{AuthError, MaybeSession, RequireSession, RequireTrusted};
pub use token::{TokenGenerator, TokenGrant, parse_token};
