//! Authorized JSON client for the school backend.

use crate::session::SessionStore;
use anyhow::{anyhow, Context, Result};
use common::auth::{BackendErrorBody, RefreshTokenRequest, RefreshTokenResponse};
use reqwest::{Method, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Non-success answer of the backend, carrying its `{message}` when present
#[derive(Debug, Error)]
#[error("{message} (status {status})")]
pub struct BackendError {
    pub status: StatusCode,
    pub message: String,
}

impl BackendError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
    }
}

/// Status of a failed backend call, if the failure came from the backend itself
pub fn backend_status(error: &anyhow::Error) -> Option<StatusCode> {
    error.downcast_ref::<BackendError>().map(|e| e.status)
}

pub struct BackendHttp {
    base: Url,
    client: reqwest::Client,
    session: Arc<dyn SessionStore>,
}

impl BackendHttp {
    pub fn new(base: Url, timeout: Duration, session: Arc<dyn SessionStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base: with_trailing_slash(base),
            client,
            session,
        })
    }

    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .context("invalid backend endpoint")
    }

    /// POST without bearer token (login, token refresh)
    #[instrument(skip(self, body))]
    pub async fn post_public<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {} failed", path))?;
        let resp = check_status(resp).await?;
        resp.json()
            .await
            .with_context(|| format!("failed to parse response of {}", path))
    }

    pub async fn get_authorized<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.send_authorized(Method::GET, path, None).await?;
        resp.json()
            .await
            .with_context(|| format!("failed to parse response of {}", path))
    }

    pub async fn post_authorized<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body).context("failed to encode request body")?;
        let resp = self.send_authorized(Method::POST, path, Some(body)).await?;
        resp.json()
            .await
            .with_context(|| format!("failed to parse response of {}", path))
    }

    /// Send with the stored bearer token. A `401` triggers one token refresh
    /// and one retry of the same request.
    #[instrument(skip(self, method, body), fields(method = %method))]
    async fn send_authorized(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let url = self.endpoint(path)?;
        let token = self.session.token().await;

        let resp = self
            .request(method.clone(), url.clone(), token.as_deref(), body.as_ref())
            .send()
            .await
            .with_context(|| format!("request to {} failed", path))?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            return check_status(resp).await;
        }

        debug!(path, "access token rejected, refreshing");
        let refreshed = match self.refresh_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                return check_status(resp).await;
            }
        };

        let resp = self
            .request(method, url, Some(&refreshed), body.as_ref())
            .send()
            .await
            .with_context(|| format!("retried request to {} failed", path))?;
        check_status(resp).await
    }

    fn request(
        &self,
        method: Method,
        url: Url,
        token: Option<&str>,
        body: Option<&serde_json::Value>,
    ) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
    }

    /// Exchange the stored token for a fresh one and store it
    pub async fn refresh_token(&self) -> Result<String> {
        let current = self
            .session
            .token()
            .await
            .ok_or_else(|| anyhow!("no access token to refresh"))?;

        let response: RefreshTokenResponse = self
            .post_public(
                "auth/refreshToken",
                &RefreshTokenRequest {
                    access_token: current,
                },
            )
            .await?;

        self.session.set_token(response.refresh_token.clone()).await;
        Ok(response.refresh_token)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<BackendErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or_else(|_| {
            if text.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                text
            }
        });

    Err(BackendError { status, message }.into())
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let http = BackendHttp::new(
            Url::parse("http://backend.local/api").unwrap(),
            Duration::from_secs(1),
            Arc::new(crate::session::MemorySessionStore::new()),
        )
        .unwrap();

        assert_eq!(
            http.endpoint("/users/data").unwrap().as_str(),
            "http://backend.local/api/users/data"
        );
        assert_eq!(
            http.endpoint("school/users/12/faults").unwrap().as_str(),
            "http://backend.local/api/school/users/12/faults"
        );
    }

    #[test]
    fn test_backend_status_downcast() {
        let error: anyhow::Error = BackendError {
            status: StatusCode::UNAUTHORIZED,
            message: "expired".to_string(),
        }
        .into();
        let error = error.context("loading lessons");

        assert_eq!(backend_status(&error), Some(StatusCode::UNAUTHORIZED));
        assert!(backend_status(&anyhow!("offline")).is_none());
    }
}
