//! In-memory resolver and transport for driving connections in tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::discovery::{ResolvedEndpoint, Resolver};
use crate::error::{DiscoveryError, TransportError};
use crate::transport::{Connector, Transport};

pub const STREAM_BASE: &str = "ws://cloud.test/signalk/v1/stream";

/// Resolves every URL to `STREAM_BASE` (or a configured stream base), or
/// fails with a configured status.
#[derive(Default)]
pub struct MockResolver {
    failure: Mutex<Option<u16>>,
    stream_base: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl MockResolver {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn status(code: u16) -> Arc<Self> {
        let resolver = Self::default();
        resolver.set_status(Some(code));
        Arc::new(resolver)
    }

    pub fn stream_base(base: &str) -> Arc<Self> {
        let resolver = Self::default();
        *resolver.stream_base.lock().unwrap() = Some(base.to_string());
        Arc::new(resolver)
    }

    pub fn set_status(&self, code: Option<u16>) {
        *self.failure.lock().unwrap() = code;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn resolve(&self, _base_url: &str) -> Result<ResolvedEndpoint, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *self.failure.lock().unwrap() {
            Some(code) => Err(DiscoveryError::Status(code)),
            None => Ok(ResolvedEndpoint {
                stream_base: self
                    .stream_base
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| STREAM_BASE.to_string()),
                http_url: Some("http://cloud.test/signalk/v1/api/".to_string()),
            }),
        }
    }
}

/// Records everything sent and lets the test play the remote side.
#[derive(Default)]
pub struct MockConnector {
    sent: Arc<Mutex<Vec<String>>>,
    remote: Mutex<Option<mpsc::UnboundedSender<String>>>,
    urls: Mutex<Vec<Url>>,
    credentials: Mutex<Vec<Option<String>>>,
    closes: Arc<AtomicUsize>,
    fail_sends: Arc<AtomicBool>,
    fail_connects: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connects(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.urls.lock().unwrap().clone()
    }

    pub fn credentials(&self) -> Vec<Option<String>> {
        self.credentials.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    /// Sent messages that are deltas.
    pub fn sent_deltas(&self) -> Vec<Value> {
        self.sent().into_iter().filter(|m| m.get("updates").is_some()).collect()
    }

    pub fn sent_with(&self, key: &str) -> Vec<Value> {
        self.sent().into_iter().filter(|m| m.get(key).is_some()).collect()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Refuse every connect attempt while set.
    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Deliver a message from the remote side of the latest connection.
    pub fn push(&self, text: &str) {
        if let Some(remote) = self.remote.lock().unwrap().as_ref() {
            let _ = remote.send(text.to_string());
        }
    }

    /// Close the latest connection from the remote side.
    pub fn hang_up(&self) {
        self.remote.lock().unwrap().take();
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        url: &Url,
        credential: Option<&str>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        self.urls.lock().unwrap().push(url.clone());
        self.credentials
            .lock()
            .unwrap()
            .push(credential.map(String::from));
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectTimeout(url.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.remote.lock().unwrap() = Some(tx);

        Ok(Box::new(MockTransport {
            sent: self.sent.clone(),
            inbound: rx,
            closes: self.closes.clone(),
            fail_sends: self.fail_sends.clone(),
        }))
    }
}

pub struct MockTransport {
    sent: Arc<Mutex<Vec<String>>>,
    inbound: mpsc::UnboundedReceiver<String>,
    closes: Arc<AtomicUsize>,
    fail_sends: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn next_message(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
