//! In-memory transport used by the connector tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use super::transport::{Credentials, HttpResponse, Transport, TransportError, TransportFactory};
use super::Result;

#[derive(Clone)]
struct Route {
    pattern: String,
    response: HttpResponse,
}

/// Answers requests whose decoded URL contains a registered pattern.
/// When several patterns match, the longest one wins.
#[derive(Clone, Default)]
pub struct MockTransport {
    routes: Arc<Vec<Route>>,
    requests: Arc<Mutex<Vec<String>>>,
    stats: SessionStats,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, pattern: &str, body: Value) -> Self {
        self.route_raw(pattern, 200, "OK", &body.to_string())
    }

    pub fn route_status(self, pattern: &str, status: u16, reason: &str) -> Self {
        self.route_raw(pattern, status, reason, "")
    }

    pub fn route_raw(mut self, pattern: &str, status: u16, reason: &str, body: &str) -> Self {
        let mut routes = self.routes.as_ref().clone();
        routes.push(Route {
            pattern: pattern.to_string(),
            response: HttpResponse {
                status,
                reason: reason.to_string(),
                body: body.to_string(),
            },
        });
        self.routes = Arc::new(routes);
        self
    }

    /// Decoded URLs of every request made so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &Url) -> Result<HttpResponse, TransportError> {
        let decoded = urlencoding::decode(url.as_str())?.into_owned();
        self.requests.lock().unwrap().push(decoded.clone());
        self.routes
            .iter()
            .filter(|r| decoded.contains(&r.pattern))
            .max_by_key(|r| r.pattern.len())
            .map(|r| r.response.clone())
            .ok_or_else(|| format!("no route for {decoded}").into())
    }

    fn close(&self) {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct SessionStats {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl SessionStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Hands out clones of one [`MockTransport`] and counts sessions.
#[derive(Clone, Default)]
pub struct MockTransportFactory {
    transport: MockTransport,
    credentials: Arc<Mutex<Vec<String>>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(transport: MockTransport) -> Self {
        Self {
            transport,
            credentials: Arc::default(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.transport.stats.clone()
    }

    pub fn transport(&self) -> &MockTransport {
        &self.transport
    }

    /// Usernames the factory was asked to open sessions for.
    pub fn usernames(&self) -> Vec<String> {
        self.credentials.lock().unwrap().clone()
    }
}

impl TransportFactory for MockTransportFactory {
    fn open(&self, credentials: &Credentials) -> Result<Box<dyn Transport>> {
        self.transport.stats.opened.fetch_add(1, Ordering::SeqCst);
        self.credentials
            .lock()
            .unwrap()
            .push(credentials.username.clone());
        Ok(Box::new(self.transport.clone()))
    }
}
