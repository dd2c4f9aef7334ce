use anyhow::Context;
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{
    AuthManager, Credential, CredentialSource, DisabledRefresh, EndReason, FileSource,
    HttpRefresher, TokenRefresher,
};
use crate::config::{join_url, Config};
use crate::error::ApiError;

/// Immutable description of a request, before credentials are attached
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, ApiError> {
        let body = serde_json::to_vec(value)
            .map_err(|e| ApiError::InvalidRequest(format!("body is not serializable: {}", e)))?;
        Ok(self
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .body(body))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// Result of executing a request. A raw 401 is never surfaced.
#[derive(Debug)]
pub enum Outcome {
    /// 1xx-3xx response, body untouched
    Success(Response),
    /// Session invalid and unrecoverable; it has already been torn down
    AuthExpired,
    /// Transport-level failure
    NetworkFailure(reqwest::Error),
    /// 4xx/5xx response other than an auth failure, propagated verbatim
    ServerError { status: StatusCode, body: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Convert into the error taxonomy used by leaf consumers
    pub fn into_result(self) -> Result<Response, ApiError> {
        match self {
            Outcome::Success(response) => Ok(response),
            Outcome::AuthExpired => Err(ApiError::AuthExpired),
            Outcome::NetworkFailure(e) => Err(ApiError::Network(e)),
            Outcome::ServerError { status, body } => Err(ApiError::from_status(status, &body)),
        }
    }

    async fn from_response(response: Response) -> Self {
        match classify(response.status()) {
            StatusClass::Success => Outcome::Success(response),
            // `execute` resolves 401s before getting here
            StatusClass::Unauthorized => Outcome::AuthExpired,
            StatusClass::Error => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                tracing::debug!(status = %status, "Backend returned error response");
                Outcome::ServerError { status, body }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusClass {
    Success,
    Unauthorized,
    Error,
}

pub(crate) fn classify(status: StatusCode) -> StatusClass {
    if status == StatusCode::UNAUTHORIZED {
        StatusClass::Unauthorized
    } else if status.is_client_error() || status.is_server_error() {
        StatusClass::Error
    } else {
        StatusClass::Success
    }
}

/// Session-aware HTTP client.
///
/// Attaches the live bearer token, turns a 401 into at most one coordinated
/// refresh plus one retry, and tears the session down when that fails.
/// Imposes no timeout of its own: configure one on the `reqwest::Client` or
/// wrap [`SessionClient::execute`] in `tokio::time::timeout`.
pub struct SessionClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Authentication manager
    auth_manager: Arc<AuthManager>,

    /// Base for relative endpoint paths
    base_url: Url,
}

impl SessionClient {
    pub fn new(client: Client, auth_manager: Arc<AuthManager>, base_url: Url) -> Self {
        Self {
            client,
            auth_manager,
            base_url,
        }
    }

    /// Build the client, credential source and refresher described by `config`
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.http_max_connections)
            .connect_timeout(Duration::from_secs(config.http_connect_timeout))
            .timeout(Duration::from_secs(config.http_request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        let refresher: Arc<dyn TokenRefresher> = match config.refresh_url()? {
            Some(url) => {
                tracing::debug!(url = %url, "Token refresh enabled");
                Arc::new(HttpRefresher::new(client.clone(), url))
            }
            None => {
                tracing::debug!("No refresh endpoint configured; expiry ends the session");
                Arc::new(DisabledRefresh)
            }
        };

        let source: Arc<dyn CredentialSource> =
            Arc::new(FileSource::new(config.session_file.clone()));

        let auth_manager = Arc::new(AuthManager::new(
            client.clone(),
            Some(source),
            refresher,
            config.login_url()?,
        ));

        Ok(Self::new(client, auth_manager, config.base_url.clone()))
    }

    /// The authentication manager behind this client
    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth_manager
    }

    /// Resolve an endpoint path against the base URL
    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        join_url(&self.base_url, path).map_err(|e| ApiError::InvalidRequest(format!("{:#}", e)))
    }

    /// Execute a request with the current credential.
    ///
    /// On a 401 the request waits for the shared refresh and is re-sent once
    /// with the refreshed credential. A second 401, or a failed refresh, ends
    /// the session and yields [`Outcome::AuthExpired`]. Network failures and
    /// 5xx responses are never retried here.
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Outcome {
        let credential = self.auth_manager.current();

        let response = match self.send(descriptor, credential.as_ref(), 1).await {
            Ok(response) => response,
            Err(e) => return Outcome::NetworkFailure(e),
        };

        if classify(response.status()) != StatusClass::Unauthorized {
            return Outcome::from_response(response).await;
        }

        tracing::info!(
            method = %descriptor.method(),
            url = %descriptor.url(),
            "Received 401, refreshing credential"
        );

        let stale = credential.as_ref().map(|c| c.access_token.as_str());
        let refreshed = match self.auth_manager.refresh(stale).await {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(url = %descriptor.url(), "Cannot recover session: {}", e);
                return Outcome::AuthExpired;
            }
        };

        let response = match self.send(descriptor, Some(&refreshed), 2).await {
            Ok(response) => response,
            Err(e) => return Outcome::NetworkFailure(e),
        };

        if classify(response.status()) == StatusClass::Unauthorized {
            tracing::warn!(
                url = %descriptor.url(),
                "Refreshed credential rejected, ending session"
            );
            self.auth_manager
                .end_if_current(&refreshed.access_token, EndReason::Rejected);
            return Outcome::AuthExpired;
        }

        Outcome::from_response(response).await
    }

    /// Send one attempt of `descriptor` with `credential` attached
    async fn send(
        &self,
        descriptor: &RequestDescriptor,
        credential: Option<&Credential>,
        attempt: u32,
    ) -> Result<Response, reqwest::Error> {
        let mut headers = descriptor.headers().clone();
        if headers.remove(header::AUTHORIZATION).is_some() {
            tracing::debug!("Dropping caller-supplied Authorization header");
        }

        let mut builder = self
            .client
            .request(descriptor.method().clone(), descriptor.url().clone())
            .headers(headers);
        if let Some(credential) = credential {
            builder = builder.bearer_auth(&credential.access_token);
        }
        if let Some(body) = descriptor.body_bytes() {
            builder = builder.body(body.clone());
        }

        tracing::debug!(
            method = %descriptor.method(),
            url = %descriptor.url(),
            attempt = attempt,
            authenticated = credential.is_some(),
            "Sending HTTP request"
        );

        let result = builder.send().await;

        match result {
            Ok(ref response) => {
                tracing::debug!(status = %response.status(), attempt = attempt, "Received HTTP response");
            }
            Err(ref e) => {
                // Categorize the error for better debugging
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection_failed"
                } else if e.is_request() {
                    "request_error"
                } else if e.is_body() {
                    "body_error"
                } else {
                    "unknown"
                };

                tracing::warn!(
                    error_kind = error_kind,
                    error = %e,
                    url = %descriptor.url(),
                    attempt = attempt,
                    "HTTP request error"
                );
            }
        }

        result
    }
}
