//! HTTP client facade.
//!
//! # Design
//! `ApiClient` is the single path from the controllers to the network. It
//! adds the bearer token from the injected `Session`, bounds every request
//! with one fixed timeout, and reacts to 401 by invalidating the session and
//! redirecting to sign-in before handing the error back to the caller. It
//! never retries; retry policy belongs to callers.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::client::{server_message, ProminisClient};
use crate::config::{ClientConfig, DEFAULT_TIMEOUT_MS};
use crate::error::{ApiError, ConfigError};
use crate::http::{HttpRequest, HttpResponse};
use crate::page::Page;
use crate::routes::{LogNavigator, Navigator};
use crate::session::{FileTokenStore, Session};
use crate::transport::{ReqwestTransport, Transport};

pub struct ApiClient {
    endpoints: ProminisClient,
    transport: Arc<dyn Transport>,
    session: Session,
    navigator: Arc<dyn Navigator>,
    timeout: Duration,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.endpoints.base_url())
            .field("timeout", &self.timeout)
            .field("session", &self.session)
            .finish()
    }
}

impl ApiClient {
    pub fn new(endpoints: ProminisClient, transport: Arc<dyn Transport>, session: Session) -> Self {
        Self {
            endpoints,
            transport,
            session,
            navigator: Arc::new(LogNavigator),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Build a reqwest-backed client. The session persists its token under
    /// `config.token_dir` when set, in memory otherwise.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let transport = ReqwestTransport::new().map_err(|e| ConfigError::Transport(e.to_string()))?;
        let session = match &config.token_dir {
            Some(dir) => Session::new(FileTokenStore::new(dir)),
            None => Session::in_memory(),
        };
        Ok(Self::new(ProminisClient::new(&config.base_url), Arc::new(transport), session)
            .with_timeout(config.timeout()))
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoints(&self) -> &ProminisClient {
        &self.endpoints
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` with credentials attached. Returns any non-401
    /// response as data; 401 becomes `ApiError::Unauthorized` after the
    /// session has been cleared.
    #[tracing::instrument(skip_all, fields(method = request.method.as_str(), url = %request.url))]
    pub async fn execute(&self, mut request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let sent = self.session.token();
        if let Some(token) = &sent {
            request.set_header("authorization", format!("Bearer {token}"));
        }

        let response = match tokio::time::timeout(self.timeout, self.transport.execute(request)).await {
            Ok(result) => result.inspect_err(|e| tracing::warn!(error = %e, "transport failure"))?,
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "request timed out");
                return Err(ApiError::Timeout);
            }
        };
        tracing::debug!(status = response.status, "response received");

        if response.status == 401 {
            self.handle_unauthorized(sent.as_deref());
            return Err(ApiError::Unauthorized {
                message: server_message(&response.body),
            });
        }
        Ok(response)
    }

    fn handle_unauthorized(&self, sent: Option<&str>) {
        if self.session.invalidate(sent) {
            tracing::warn!("received 401, credentials cleared");
            self.navigator.redirect_to_login();
        }
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, ApiError> {
        let response = self.execute(request).await?;
        self.endpoints.parse_json(response)
    }

    pub async fn send_page<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<Page<T>, ApiError> {
        let response = self.execute(request).await?;
        self.endpoints.parse_page(response)
    }

    pub async fn send_empty(&self, request: HttpRequest) -> Result<(), ApiError> {
        let response = self.execute(request).await?;
        self.endpoints.parse_empty(response)
    }

    pub async fn send_bytes(&self, request: HttpRequest) -> Result<Vec<u8>, ApiError> {
        let response = self.execute(request).await?;
        self.endpoints.parse_bytes(response)
    }
}
