//! Transport Module
//!
//! One request, one response, one classified outcome. No retries, no backoff.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ApiError, ErrorBody};
use crate::token::TokenStore;

pub const LOGIN_PATH: &str = "/api/v1/login";

const UNAUTHORIZED_MESSAGE: &str = "Unauthorized. Please login again.";
const BAD_LOGIN_MESSAGE: &str = "Invalid username or password";

/// HTTP transport for the monitoring backend
pub struct Transport {
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<TokenStore>,
    revocations: watch::Sender<u64>,
}

impl Transport {
    /// Create a transport for `base_url`. `timeout` of `None` leaves hang
    /// behaviour to the network stack.
    pub fn new(
        base_url: &str,
        timeout: Option<Duration>,
        tokens: Arc<TokenStore>,
    ) -> reqwest::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let (revocations, _) = watch::channel(0);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: builder.build()?,
            tokens,
            revocations,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Receiver that ticks once each time a 401 ends the session.
    ///
    /// Concurrent requests failing with the same token produce a single tick,
    /// so a caller redirecting to login on `changed()` does it once.
    pub fn revocations(&self) -> watch::Receiver<u64> {
        self.revocations.subscribe()
    }

    /// Number of sessions ended by a 401 so far
    pub fn revocation_count(&self) -> u64 {
        *self.revocations.borrow()
    }

    /// Exchange credentials for a bearer token.
    ///
    /// Never attaches a stored token and never revokes one: any non-2xx here is
    /// a refused login, not an ended session.
    pub async fn exchange_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, ApiError> {
        let url = format!("{}{}", self.base_url, LOGIN_PATH);

        debug!("Exchanging credentials at: {}", url);

        let response = self.client
            .post(&url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let message = ErrorBody::message_from(&body)
                .unwrap_or_else(|| BAD_LOGIN_MESSAGE.to_string());
            return Err(ApiError::InvalidCredentials(message));
        }

        let data = response.json::<LoginResponse>().await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        if data.access_token.is_empty() {
            return Err(ApiError::InvalidCredentials(
                "No access token received from server".into(),
            ));
        }

        info!("Credentials accepted");
        Ok(data)
    }

    /// Issue `request` with the current token and classify the response
    pub async fn send(&self, request: Request) -> Result<Reply, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);

        // Captured once; a concurrent clear does not affect this request.
        let token = self.tokens.get();

        debug!("{} {}", request.method, request.path);

        let mut builder = self.client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(token) = &token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body.to_vec(),
            Err(e) if status.is_success() => {
                return Err(ApiError::Parse(format!("incomplete response body: {}", e)));
            }
            Err(e) => {
                warn!("Discarding unreadable {} body: {}", status, e);
                Vec::new()
            }
        };

        if status == StatusCode::UNAUTHORIZED {
            self.revoke(token.as_deref());
            let message = ErrorBody::message_from(&body)
                .unwrap_or_else(|| UNAUTHORIZED_MESSAGE.to_string());
            return Err(ApiError::Unauthorized(message));
        }

        classify(status, body)
    }

    /// Send and decode a JSON body
    pub async fn fetch<T: DeserializeOwned>(&self, request: Request) -> Result<T, ApiError> {
        self.send(request).await?.json()
    }

    /// Send and discard any body
    pub async fn execute(&self, request: Request) -> Result<(), ApiError> {
        self.send(request).await.map(|_| ())
    }

    fn revoke(&self, sent_with: Option<&str>) {
        let Some(token) = sent_with else {
            return;
        };

        if self.tokens.clear_if(token) {
            warn!("Session rejected by server");
            self.revocations.send_modify(|count| *count += 1);
        }
    }
}

/// Classify a non-401 response
pub(crate) fn classify(status: StatusCode, body: Vec<u8>) -> Result<Reply, ApiError> {
    if status.is_success() {
        if status == StatusCode::NO_CONTENT || body.is_empty() {
            return Ok(Reply::Empty);
        }
        return Ok(Reply::Body(body));
    }

    let message = ErrorBody::message_from(&body)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    Err(match status {
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        s if s.is_client_error() => ApiError::Rejected { status: s.as_u16(), message },
        s => ApiError::Server { status: s.as_u16(), message },
    })
}

/// A single request to issue through [`Transport::send`]
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Option<serde_json::Value>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
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

    pub fn query(mut self, name: &'static str, value: impl ToString) -> Self {
        self.query.push((name, value.to_string()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    /// Attach a JSON body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Parse(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Successful response
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Body(Vec<u8>),
    Empty,
}

impl Reply {
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        match self {
            Reply::Body(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| ApiError::Parse(e.to_string()))
            }
            Reply::Empty => Err(ApiError::Parse("expected a response body".into())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_classification() {
        let reply = classify(StatusCode::OK, br#"{"site_id":1}"#.to_vec()).unwrap();
        assert!(matches!(reply, Reply::Body(_)));

        assert_eq!(classify(StatusCode::NO_CONTENT, Vec::new()).unwrap(), Reply::Empty);
        assert_eq!(classify(StatusCode::OK, Vec::new()).unwrap(), Reply::Empty);
    }

    #[test]
    fn test_error_classification() {
        let err = classify(StatusCode::NOT_FOUND, br#"{"detail":"Camera not found"}"#.to_vec())
            .unwrap_err();
        assert_eq!(err, ApiError::NotFound("Camera not found".into()));

        let err = classify(StatusCode::UNPROCESSABLE_ENTITY, b"oops".to_vec()).unwrap_err();
        assert_eq!(err, ApiError::Rejected { status: 422, message: "HTTP 422".into() });

        let err = classify(StatusCode::BAD_GATEWAY, b"<html/>".to_vec()).unwrap_err();
        assert_eq!(err, ApiError::Server { status: 502, message: "HTTP 502".into() });
    }

    #[test]
    fn test_empty_reply_is_not_json() {
        let err = Reply::Empty.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
    }

    #[test]
    fn test_request_builder() {
        let request = Request::get("/api/v1/cameras")
            .query("skip", 0)
            .query("limit", 100);
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.path(), "/api/v1/cameras");
        assert_eq!(request.query.len(), 2);
    }

    /// Serve one response whose body stops short of its content-length
    async fn truncating_backend(status_line: &'static str) -> Transport {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "{}\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{{\"site",
                status_line
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let tokens = Arc::new(TokenStore::ephemeral());
        Transport::new(&format!("http://{}", addr), None, tokens).unwrap()
    }

    #[tokio::test]
    async fn test_cut_off_body_after_status() {
        let transport = truncating_backend("HTTP/1.1 200 OK").await;
        let err = transport.send(Request::get("/api/v1/cameras/sites")).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Parse);

        let transport = truncating_backend("HTTP/1.1 500 Internal Server Error").await;
        let err = transport.send(Request::get("/api/v1/cameras/sites")).await.unwrap_err();
        assert_eq!(err, ApiError::Server { status: 500, message: "HTTP 500".into() });
    }
}
