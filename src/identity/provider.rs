use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};

/// What the auth provider reports about one of its users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderUser {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Lookup port into the external auth provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns `None` when the provider does not know `subject`.
    async fn lookup_user(&self, subject: &str) -> Result<Option<ProviderUser>>;
}

/// Provider for deployments where sessions carry everything we need.
pub struct SessionOnlyProvider;

#[async_trait]
impl IdentityProvider for SessionOnlyProvider {
    async fn lookup_user(&self, _subject: &str) -> Result<Option<ProviderUser>> {
        Ok(None)
    }
}

/// Looks users up at `GET {base_url}/users/{subject}`.
pub struct HttpIdentityProvider {
    base_url: Url,
    headers: HeaderMap,
    client: Client,
}

impl HttpIdentityProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| Error::Config(format!("invalid provider base_url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config("provider base_url cannot be a base".to_string()));
        }

        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| Error::Config("invalid provider api_key".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Provider(e.to_string()))?;

        Ok(Self {
            base_url,
            headers,
            client,
        })
    }

    fn user_url(&self, subject: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config("provider base_url cannot be a base".to_string()))?
            .pop_if_empty()
            .push("users")
            .push(subject);
        Ok(url)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn lookup_user(&self, subject: &str) -> Result<Option<ProviderUser>> {
        let response = self
            .client
            .get(self.user_url(subject)?)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| Error::Provider(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<ProviderUser>()
                .await
                .map(Some)
                .map_err(|e| Error::Provider(e.to_string())),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(Error::Provider(format!("user lookup failed: status {status}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(base_url: &str) -> HttpIdentityProvider {
        HttpIdentityProvider::new(&ProviderConfig {
            base_url: base_url.to_string(),
            api_key: Some("secret".to_string()),
            timeout_seconds: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_user_url_encodes_subject() {
        let provider = provider("https://auth.example.com/api/");
        let url = provider.user_url("user/with space").unwrap();
        assert_eq!(
            url.as_str(),
            "https://auth.example.com/api/users/user%2Fwith%20space"
        );
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let result = HttpIdentityProvider::new(&ProviderConfig {
            base_url: "not a url".to_string(),
            api_key: None,
            timeout_seconds: 1,
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_api_key_becomes_bearer_header() {
        let provider = provider("https://auth.example.com");
        assert_eq!(
            provider.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Bearer secret")
        );
    }

    #[tokio::test]
    async fn test_session_only_provider_knows_nobody() {
        assert_eq!(SessionOnlyProvider.lookup_user("anyone").await.unwrap(), None);
    }
}
