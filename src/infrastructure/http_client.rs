//! HTTP client for the meal-planning backend
//!
//! Wraps reqwest with a request rate limit, bearer-token injection from
//! the [`TokenStore`] and session-expiry handling: a 401 clears the stored
//! tokens and is broadcast as [`SessionEvent::Expired`].

use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::config::ApiConfig;
use super::error::ApiError;
use super::token_store::TokenStore;
use crate::domain::SessionEvent;

const SESSION_EVENT_CAPACITY: usize = 16;

/// Backend API client shared by every job
pub struct ApiClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    session_events: broadcast::Sender<SessionEvent>,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        url::Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidConfig(format!("base_url {}: {e}", config.base_url)))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|_| ApiError::InvalidConfig("invalid user agent".to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()?;

        let quota = Quota::per_second(NonZeroU32::new(config.max_requests_per_second).ok_or_else(
            || ApiError::InvalidConfig("max_requests_per_second must be greater than 0".to_string()),
        )?);
        let (session_events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
            session_events,
            config,
        })
    }

    /// Session expiry notifications
    pub fn subscribe_session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_events.subscribe()
    }

    pub const fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.client.get(self.url_for(path));
        self.send_json(request, path).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let request = self.client.post(self.url_for(path)).json(body);
        self.send_json(request, path).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        path: &str,
    ) -> Result<T, ApiError> {
        self.rate_limiter.until_ready().await;

        let request = match self.tokens.get_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        tracing::debug!("API request: {}", path);
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.expire_session(path);
            return Err(ApiError::SessionExpired {
                path: path.to_string(),
            });
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                path: path.to_string(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    fn expire_session(&self, path: &str) {
        tracing::warn!("🔒 Session expired (401 from {}), clearing stored tokens", path);
        if let Err(e) = self.tokens.clear_tokens() {
            tracing::warn!("Failed to clear tokens after 401: {}", e);
        }
        // no receivers is fine
        let _ = self.session_events.send(SessionEvent::Expired {
            path: path.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::token_store::InMemoryTokenStore;

    fn client_with(config: ApiConfig) -> Result<ApiClient, ApiError> {
        ApiClient::new(config, Arc::new(InMemoryTokenStore::new()))
    }

    #[tokio::test]
    async fn test_api_client_creation() {
        let client = client_with(ApiConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_zero_rate_limit_is_rejected() {
        let config = ApiConfig {
            max_requests_per_second: 0,
            ..Default::default()
        };
        assert!(matches!(client_with(config), Err(ApiError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_invalid_base_url_is_rejected() {
        let config = ApiConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(client_with(config), Err(ApiError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_url_joining() {
        let config = ApiConfig {
            base_url: "https://api.example.com/api/".to_string(),
            ..Default::default()
        };
        let client = client_with(config).unwrap();
        assert_eq!(client.url_for("/meal-plans/7"), "https://api.example.com/api/meal-plans/7");
        assert_eq!(client.url_for("meal-plans/7"), "https://api.example.com/api/meal-plans/7");
    }

    #[tokio::test]
    async fn test_expire_session_clears_tokens_and_broadcasts() {
        let tokens = Arc::new(InMemoryTokenStore::with_tokens(
            crate::infrastructure::token_store::TokenPair {
                access: "stale".into(),
                refresh: None,
            },
        ));
        let client = ApiClient::new(ApiConfig::default(), tokens.clone()).unwrap();
        let mut events = client.subscribe_session_events();

        client.expire_session("/meal-plans/3");

        assert!(tokens.get_token().is_none());
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Expired {
                path: "/meal-plans/3".into()
            }
        );
    }
}
