use crate::http::{BackendError, BackendHttp};
use anyhow::Result;
use common::{
    auth::{CheckTokenResponse, LoginRequest, LoginResponse},
    validation::validate_login,
};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct AuthClient {
    http: Arc<BackendHttp>,
}

impl AuthClient {
    pub fn new(http: Arc<BackendHttp>) -> Self {
        Self { http }
    }

    /// Validate the credentials, log in and store the access token.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        validate_login(email, password)?;

        let response: LoginResponse = self
            .http
            .post_public(
                "auth/login",
                &LoginRequest {
                    email: email.trim().to_string(),
                    password: password.to_string(),
                },
            )
            .await?;

        self.http.session().set_token(response.access_token).await;
        info!("logged in");
        Ok(())
    }

    /// Whether the backend still accepts the stored token. A rejected token is
    /// `false`; network problems are errors.
    pub async fn check_token(&self) -> Result<bool> {
        if self.http.session().token().await.is_none() {
            return Ok(false);
        }

        let result: Result<CheckTokenResponse> = self
            .http
            .post_authorized("auth/checkToken", &serde_json::json!({}))
            .await;

        match result {
            Ok(response) => Ok(response.exists),
            Err(e)
                if e
                    .downcast_ref::<BackendError>()
                    .is_some_and(BackendError::is_unauthorized) =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn logout(&self) {
        self.http.session().clear().await;
        info!("logged out");
    }
}
