//! Blocking HTTP client shared by feature layers and services.
//!
//! Store traits are synchronous, so [`PortalClient`] owns a current-thread
//! Tokio runtime and blocks on each request. Called from inside a
//! multi-threaded runtime it borrows that runtime's handle through
//! [`tokio::task::block_in_place`] instead.

use std::future::Future;
use std::time::Duration;

use gisbatch_core::StoreError;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use url::Url;

use super::esri::{decode_response, parse_error};
use super::layer::{FeatureLayer, FeatureService};
use super::urls::{ServiceUrlError, admin_url, parse_resource_url};

/// Default user agent for portal requests.
pub const DEFAULT_USER_AGENT: &str = "gisbatch/0.1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors raised while building a [`PortalClient`].
#[derive(Debug, Error)]
pub enum ClientBuildError {
    /// The HTTP client could not be configured.
    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),
    /// The Tokio runtime could not be started.
    #[error("failed to build Tokio runtime")]
    Runtime(#[source] std::io::Error),
}

/// Configuration for [`PortalClient`].
#[derive(Clone)]
pub struct PortalClientConfig {
    /// Pre-issued portal token sent with every request.
    pub token: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl std::fmt::Debug for PortalClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalClientConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for PortalClientConfig {
    fn default() -> Self {
        Self {
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl PortalClientConfig {
    /// Attach a portal token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Blocking client for feature service REST endpoints.
pub struct PortalClient {
    client: Client,
    config: PortalClientConfig,
    runtime: Runtime,
}

impl std::fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalClient")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish()
    }
}

impl PortalClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or Tokio runtime fails to build.
    pub fn new(config: PortalClientConfig) -> Result<Self, ClientBuildError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(ClientBuildError::HttpClient)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ClientBuildError::Runtime)?;
        Ok(Self {
            client,
            config,
            runtime,
        })
    }

    /// Handle for the layer or table at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceUrlError`] when `url` is not usable.
    pub fn layer(&self, url: &str) -> Result<FeatureLayer<'_>, ServiceUrlError> {
        Ok(FeatureLayer::new(self, parse_resource_url(url)?))
    }

    /// Handle for the feature service at `url`, used to toggle tracking.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceUrlError`] when `url` is not a REST services URL.
    pub fn service(&self, url: &str) -> Result<FeatureService<'_>, ServiceUrlError> {
        let service = parse_resource_url(url)?;
        let admin = admin_url(&service)?;
        Ok(FeatureService::new(self, service, admin))
    }

    /// `GET url?f=json` decoded into `T`.
    pub(crate) fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, StoreError> {
        let request = self
            .client
            .get(url.clone())
            .query(&self.common_params(Vec::new()));
        let value = self.block_on(self.send_json(request, url))?;
        decode_response(value)
    }

    /// `POST url` with form `params` decoded into `T`.
    pub(crate) fn post_form<T: DeserializeOwned>(
        &self,
        url: &Url,
        params: Vec<(&'static str, String)>,
    ) -> Result<T, StoreError> {
        let request = self
            .client
            .post(url.clone())
            .form(&self.common_params(params));
        let value = self.block_on(self.send_json(request, url))?;
        decode_response(value)
    }

    /// Append `f=json` and the token, if any.
    pub(crate) fn common_params(
        &self,
        mut params: Vec<(&'static str, String)>,
    ) -> Vec<(&'static str, String)> {
        params.push(("f", "json".to_owned()));
        if let Some(token) = &self.config.token {
            params.push(("token", token.clone()));
        }
        params
    }

    async fn send_json(&self, request: RequestBuilder, url: &Url) -> Result<Value, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(err, url))?
            .error_for_status()
            .map_err(|err| self.convert_reqwest_error(err, url))?;
        let body = response
            .bytes()
            .await
            .map_err(|err| self.convert_reqwest_error(err, url))?;
        serde_json::from_slice(&body).map_err(parse_error)
    }

    /// Map a transport error, dropping the request URL from its message.
    ///
    /// GET requests carry the token in the query string.
    fn convert_reqwest_error(&self, raw: reqwest::Error, url: &Url) -> StoreError {
        let error = raw.without_url();
        if error.is_timeout() {
            return StoreError::Timeout {
                url: url.to_string(),
                timeout_secs: self.config.timeout.as_secs(),
            };
        }

        if let Some(status) = error.status() {
            return StoreError::Http {
                url: url.to_string(),
                status: status.as_u16(),
                message: error.to_string(),
            };
        }

        StoreError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        // block_in_place needs a multi-threaded runtime; anything else falls
        // back to the owned runtime.
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            _ => self.runtime.block_on(future),
        }
    }
}
