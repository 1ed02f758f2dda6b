use std::sync::{Arc, RwLock};

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::envelope::decode_data;
use crate::error::ApiError;

/// Hook fired when the server invalidates the session (401).
pub type SessionExpiredHook = Arc<dyn Fn() + Send + Sync>;

/// HTTP client for the dashboard API.
///
/// Holds the bearer token for the current session in memory. Cheap to share
/// behind an `Arc`; all interior state is lock-protected.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
    session_expired: RwLock<Option<SessionExpiredHook>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: RwLock::new(None),
            session_expired: RwLock::new(None),
        }
    }

    /// Install the bearer token attached to every subsequent request.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().expect("token lock poisoned") = Some(token.into());
    }

    pub fn clear_token(&self) {
        *self.token.write().expect("token lock poisoned") = None;
    }

    pub fn has_token(&self) -> bool {
        self.token.read().expect("token lock poisoned").is_some()
    }

    /// Register the hook invoked on any 401 response, after the token has
    /// been cleared. The navigation layer uses this to return to login.
    pub fn on_session_expired(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self
            .session_expired
            .write()
            .expect("session hook lock poisoned") = Some(Arc::new(hook));
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(Method::GET, path, None::<&()>).await
    }

    pub(crate) async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub(crate) async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(Method::POST, path, None::<&()>).await
    }

    pub(crate) async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    pub(crate) async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send::<serde_json::Value, ()>(Method::DELETE, path, None)
            .await?;
        Ok(())
    }

    async fn send<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, path, "dispatching api request");

        let mut request = self.http.request(method, &url);
        if let Some(token) = self.token.read().expect("token lock poisoned").as_deref() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        // 401 bypasses the per-call error path entirely: the session is torn
        // down here, once, at the transport boundary.
        if status == StatusCode::UNAUTHORIZED {
            warn!(path, "session rejected by server, clearing token");
            self.expire_session();
            return Err(ApiError::Unauthorized);
        }

        let bytes = response.bytes().await?;
        let data = decode_data(status.as_u16(), &bytes)?;
        serde_json::from_value(data).map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn expire_session(&self) {
        self.clear_token();
        let hook = self
            .session_expired
            .read()
            .expect("session hook lock poisoned")
            .clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let client = ApiClient::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn token_lifecycle() {
        let client = ApiClient::new("http://localhost:3000");
        assert!(!client.has_token());

        client.set_token("jwt");
        assert!(client.has_token());

        client.clear_token();
        assert!(!client.has_token());
    }
}
