use serde::{Deserialize, Serialize};

/// A validated handle: `lower` is the uniqueness key, `display` keeps the case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedUsername {
    #[serde(rename = "usernameLower")]
    pub lower: String,
    #[serde(rename = "usernameDisplay")]
    pub display: String,
}

/// A validated email: `original` is trimmed, `lower` is the uniqueness key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEmail {
    pub original: String,
    pub lower: String,
}
