//! # HTTP Gateway
//!
//! The only path from the app to the backend. Every call is augmented with
//! session and device context on the way out and classified into a
//! [`GatewayError`] on the way back.
//!
//! ## Request Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         send(&ApiRequest)                               │
//! │                                                                         │
//! │  1. AUGMENT                                                            │
//! │     Authorization: Bearer <token>      (when authenticated)            │
//! │     X-Device-ID / -Type / -OS / -IP    (when identity resolves)        │
//! │     X-App-Version                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  2. SEND (timeout from config, default 10 s)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  3. CLASSIFY                                                           │
//! │     2xx ──────────────────────────────► Ok(ApiResponse)                │
//! │     401, first for this request ──────► clear token, AuthExpired       │
//! │     other status ─────────────────────► ServerError{body.message}      │
//! │     no response (timeout, refused) ───► ConnectivityError              │
//! │     could not build / decode ─────────► LocalError                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  4. Every failure: exactly one publish::<ApiError>(user_message)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 401 Handling
//! An [`ApiRequest`] carries a flag shared by all its clones. The first 401
//! sets it and expires the session; a later 401 for the same logical
//! request (for example inside `retry_request`) is classified as an
//! ordinary server error, so the session is never expired twice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn, Instrument};
use url::Url;
use uuid::Uuid;

use imutis_core::{headers, ResolvedIdentity};

use crate::config::ClientConfig;
use crate::device::DeviceIdentityService;
use crate::error::{ClientError, ClientResult, GatewayError, GatewayResult};
use crate::events::{ApiError, EventBus};
use crate::token::TokenStore;

// =============================================================================
// Settings
// =============================================================================

/// Connection settings for the gateway.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub base_url: String,
    pub timeout: Duration,
}

impl From<&ClientConfig> for GatewaySettings {
    fn from(config: &ClientConfig) -> Self {
        GatewaySettings {
            base_url: config.api.base_url.clone(),
            timeout: config.request_timeout(),
        }
    }
}

// =============================================================================
// Request / Response
// =============================================================================

/// One logical backend call.
///
/// Clones share the 401 flag, so resending a clone counts as the same
/// logical request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    auth_retried: Arc<AtomicBool>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            auth_retried: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attaches a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Decodes the body as JSON.
    ///
    /// Doesn't publish on failure; the typed helpers on [`HttpGateway`] do.
    pub fn json<T: DeserializeOwned>(&self) -> GatewayResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| GatewayError::local(format!("Invalid response body: {}", e)))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Authenticated, device-identified HTTP client for the backend.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: Url,
    tokens: TokenStore,
    identity: Option<DeviceIdentityService>,
    events: EventBus,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("base_url", &self.base_url.as_str())
            .field("device_headers", &self.identity.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpGateway {
    /// Creates a gateway.
    ///
    /// Without an identity service, requests go out without device headers.
    pub fn new(
        settings: GatewaySettings,
        tokens: TokenStore,
        identity: Option<DeviceIdentityService>,
        events: EventBus,
    ) -> ClientResult<Self> {
        let mut base_url = Url::parse(&settings.base_url)?;
        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            return Err(ClientError::InvalidUrl(settings.base_url));
        }
        // Url::join replaces the last segment unless the base ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .default_headers(default_headers)
            .build()?;

        info!(
            base_url = %base_url,
            timeout_ms = settings.timeout.as_millis() as u64,
            "Gateway created"
        );

        Ok(HttpGateway {
            client,
            base_url,
            tokens,
            identity,
            events,
        })
    }

    // =========================================================================
    // Session
    // =========================================================================

    pub async fn set_auth_token(&self, token: impl Into<String>) {
        self.tokens.set(token.into()).await;
    }

    pub async fn clear_auth_token(&self) {
        self.tokens.clear().await;
    }

    /// Read access to the token store.
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Sends `request` and classifies the outcome.
    pub async fn send(&self, request: &ApiRequest) -> GatewayResult<ApiResponse> {
        let request_id = Uuid::new_v4();
        let span = tracing::debug_span!(
            "gateway",
            %request_id,
            method = %request.method,
            path = %request.path
        );

        async {
            let outcome = self.dispatch(request).await;
            match outcome {
                Ok(response) => {
                    debug!(status = response.status, bytes = response.body.len(), "Request succeeded");
                    Ok(response)
                }
                Err(err) => Err(self.fail(err)),
            }
        }
        .instrument(span)
        .await
    }

    /// Augments, sends and classifies. Never publishes.
    async fn dispatch(&self, request: &ApiRequest) -> GatewayResult<ApiResponse> {
        let url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| GatewayError::local(format!("Invalid request path: {}", e)))?;

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(self.context_headers().await);

        if let Some(token) = self.tokens.current().await {
            builder = builder.bearer_auth(token);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify_transport)?;
        let status = response.status();
        let headers = response.headers().clone();

        if status.is_success() {
            let body = response.bytes().await.map_err(classify_transport)?;
            return Ok(ApiResponse {
                status: status.as_u16(),
                headers,
                body: body.to_vec(),
            });
        }

        if status == StatusCode::UNAUTHORIZED
            && !request.auth_retried.swap(true, Ordering::SeqCst)
        {
            let had_token = self.tokens.clear().await;
            warn!(had_token, "Session rejected by backend");
            return Err(GatewayError::AuthExpired);
        }

        // Error bodies are best effort: an unreadable body still yields a
        // server error with the generic message.
        let body = response.bytes().await.unwrap_or_default();
        Err(GatewayError::server(status.as_u16(), error_message(&body)))
    }

    /// Publishes the failure and hands it back.
    fn fail(&self, err: GatewayError) -> GatewayError {
        let message = err.user_message();
        warn!(error = %message, status = ?err.status(), "Request failed");
        self.events.publish::<ApiError>(message);
        err
    }

    /// Device headers for this call. Empty when identity can't be resolved.
    async fn context_headers(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        let Some(service) = &self.identity else {
            return map;
        };

        match service.get_identity().await {
            Ok(resolved) => {
                for (name, value) in device_headers(&resolved) {
                    match (
                        HeaderName::from_bytes(name.as_bytes()),
                        HeaderValue::from_str(&value),
                    ) {
                        (Ok(name), Ok(value)) => {
                            map.insert(name, value);
                        }
                        _ => warn!(header = name, "Skipping unencodable device header"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "Sending without device headers"),
        }
        map
    }

    // =========================================================================
    // Typed Helpers
    // =========================================================================

    /// `GET path`, decoding the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> GatewayResult<T> {
        let response = self.send(&ApiRequest::get(path)).await?;
        self.decode(&response)
    }

    /// `POST path` with a JSON body, decoding the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> GatewayResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::post(path).json(self.encode(body)?);
        let response = self.send(&request).await?;
        self.decode(&response)
    }

    /// `PUT path` with a JSON body, decoding the JSON response.
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> GatewayResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::put(path).json(self.encode(body)?);
        let response = self.send(&request).await?;
        self.decode(&response)
    }

    /// `DELETE path`, ignoring any response body.
    pub async fn delete(&self, path: &str) -> GatewayResult<()> {
        self.send(&ApiRequest::delete(path)).await.map(|_| ())
    }

    fn encode<B: Serialize + ?Sized>(&self, body: &B) -> GatewayResult<serde_json::Value> {
        serde_json::to_value(body)
            .map_err(|e| self.fail(GatewayError::local(format!("Invalid request body: {}", e))))
    }

    fn decode<T: DeserializeOwned>(&self, response: &ApiResponse) -> GatewayResult<T> {
        response.json().map_err(|e| self.fail(e))
    }
}

// =============================================================================
// Classification Helpers
// =============================================================================

fn device_headers(resolved: &ResolvedIdentity) -> [(&'static str, String); 5] {
    let identity = &resolved.identity;
    [
        (headers::DEVICE_ID, identity.id.clone()),
        (headers::DEVICE_TYPE, identity.kind.to_string()),
        (headers::DEVICE_OS, identity.os_label()),
        (headers::DEVICE_IP, resolved.current_address.clone()),
        (headers::APP_VERSION, identity.app_version.clone()),
    ]
}

/// Maps a reqwest error that produced no usable response.
fn classify_transport(err: reqwest::Error) -> GatewayError {
    if err.is_builder() {
        GatewayError::local(err.to_string())
    } else if err.is_decode() {
        GatewayError::local(format!("Invalid response body: {}", err))
    } else {
        debug!(
            timeout = err.is_timeout(),
            connect = err.is_connect(),
            error = %err,
            "No response from backend"
        );
        GatewayError::ConnectivityError
    }
}

/// Extracts `message` from a JSON error body.
fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

// =============================================================================
// Unit Tests
// =============================================================================
