use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, Response};
use tracing::{debug, error, info};
use url::Url;

use crate::models::{
    BackendErrorBody, CodeExchangeRequest, EnvConfig, RefreshRequest, TokenResponse,
};
use crate::{SessionError, Settings};

/// The confidential half of the PKCE flow, reached over HTTP.
///
/// Returned futures own everything they need so the token manager can run a
/// refresh on a spawned task.
pub trait AuthBackend: Send + Sync {
    /// `GET /env`
    fn load_env(&self) -> BoxFuture<'static, Result<EnvConfig, SessionError>>;

    /// `POST /auth/token`. Non-success statuses map to [`SessionError::ExchangeError`].
    fn exchange_code(
        &self,
        request: CodeExchangeRequest,
    ) -> BoxFuture<'static, Result<TokenResponse, SessionError>>;

    /// `POST /auth/refresh`. Non-success statuses map to [`SessionError::RefreshError`].
    fn refresh(
        &self,
        request: RefreshRequest,
    ) -> BoxFuture<'static, Result<TokenResponse, SessionError>>;
}

/// [`AuthBackend`] talking to the companion token proxy.
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    client: Client,
    base_url: Url,
}

impl HttpAuthBackend {
    pub fn new(base_url: &str, client: Client) -> Result<Self, SessionError> {
        let base_url = Url::parse(base_url)?;
        Ok(Self { client, base_url })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, SessionError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        Self::new(&settings.backend_url, client)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn error_body(response: Response) -> (u16, String) {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let body: BackendErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = if body.error.is_none() && body.error_description.is_none() {
            text
        } else {
            body.message()
        };
        (status, message)
    }
}

impl AuthBackend for HttpAuthBackend {
    fn load_env(&self) -> BoxFuture<'static, Result<EnvConfig, SessionError>> {
        let client = self.client.clone();
        let url = self.base_url.join("env");
        async move {
            let url = url?;
            debug!(%url, "Fetching runtime configuration");
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| SessionError::ConfigurationUnavailable(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                error!(%status, "Runtime configuration request failed");
                return Err(SessionError::ConfigurationUnavailable(format!(
                    "GET /env returned {}",
                    status
                )));
            }

            response
                .json::<EnvConfig>()
                .await
                .map_err(|e| SessionError::ConfigurationUnavailable(e.to_string()))
        }
        .boxed()
    }

    fn exchange_code(
        &self,
        request: CodeExchangeRequest,
    ) -> BoxFuture<'static, Result<TokenResponse, SessionError>> {
        let client = self.client.clone();
        let url = self.base_url.join("auth/token");
        async move {
            let response = client.post(url?).json(&request).send().await?;

            if !response.status().is_success() {
                let (status, message) = Self::error_body(response).await;
                error!(status, %message, "Code exchange rejected by backend");
                return Err(SessionError::ExchangeError(format!(
                    "HTTP {}: {}",
                    status, message
                )));
            }

            let body = response.json::<TokenResponse>().await?;
            info!("Code exchange successful");
            Ok(body)
        }
        .boxed()
    }

    fn refresh(
        &self,
        request: RefreshRequest,
    ) -> BoxFuture<'static, Result<TokenResponse, SessionError>> {
        let client = self.client.clone();
        let url = self.base_url.join("auth/refresh");
        async move {
            let response = client.post(url?).json(&request).send().await?;

            if !response.status().is_success() {
                let (status, message) = Self::error_body(response).await;
                error!(status, %message, "Token refresh rejected by backend");
                return Err(SessionError::RefreshError(format!(
                    "HTTP {}: {}",
                    status, message
                )));
            }

            let body = response.json::<TokenResponse>().await?;
            debug!(rotated = body.refresh_token.is_some(), "Token refresh successful");
            Ok(body)
        }
        .boxed()
    }
}
