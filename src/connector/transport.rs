use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Url;

use super::{ConnectorError, Result};

pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn basic_auth_header(&self) -> String {
        let creds = format!("{}:{}", self.username, self.password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        format!("Basic {encoded}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

/// An authenticated HTTP connection to the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<HttpResponse, TransportError>;

    /// Release the connection. Called once when the owning session ends.
    fn close(&self) {}
}

/// Opens a transport bound to a set of credentials.
pub trait TransportFactory: Send + Sync {
    fn open(&self, credentials: &Credentials) -> Result<Box<dyn Transport>>;
}

/// A transport scoped to one connector operation, closed when dropped.
pub struct Session {
    transport: Box<dyn Transport>,
    operation: &'static str,
}

impl Session {
    pub fn open(
        factory: &dyn TransportFactory,
        credentials: &Credentials,
        operation: &'static str,
    ) -> Result<Self> {
        let transport = factory.open(credentials)?;
        tracing::debug!(operation, "session opened");
        Ok(Self {
            transport,
            operation,
        })
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.transport.close();
        tracing::debug!(operation = self.operation, "session closed");
    }
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url) -> Result<HttpResponse, TransportError> {
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

/// Builds a fresh reqwest client with Basic auth headers for every session.
#[derive(Debug, Default)]
pub struct ReqwestTransportFactory;

impl TransportFactory for ReqwestTransportFactory {
    fn open(&self, credentials: &Credentials) -> Result<Box<dyn Transport>> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&credentials.basic_auth_header()).map_err(|e| {
            ConnectorError::Transport {
                url: String::new(),
                source: Box::new(e),
            }
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConnectorError::Transport {
                url: String::new(),
                source: Box::new(e),
            })?;
        Ok(Box::new(ReqwestTransport { client }))
    }
}
