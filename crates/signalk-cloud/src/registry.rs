//! Configured endpoints and the tasks running them.

use std::collections::BTreeMap;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{EndpointConfig, RelayConfig};
use crate::discovery::normalize_base_url;

/// Handle to a running endpoint task.
#[derive(Debug)]
pub struct EndpointTask {
    pub cancel: CancellationToken,
    pub handle: JoinHandle<()>,
}

#[derive(Debug)]
struct EndpointEntry {
    config: EndpointConfig,
    task: Option<EndpointTask>,
}

/// Endpoints keyed by normalized base URL, so `ws://host` and `http://host`
/// are the same server.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    entries: BTreeMap<String, EndpointEntry>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every configured endpoint; later duplicates are dropped.
    pub fn from_config(config: &RelayConfig) -> Self {
        let mut registry = Self::new();
        for endpoint in &config.endpoints {
            if !registry.insert(endpoint.clone()) {
                warn!(url = %endpoint.url, "Ignoring duplicate endpoint");
            }
        }
        registry
    }

    /// Add an endpoint. Returns false if its URL is already registered.
    pub fn insert(&mut self, config: EndpointConfig) -> bool {
        let key = normalize_base_url(&config.url);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, EndpointEntry { config, task: None });
        true
    }

    pub fn get(&self, url: &str) -> Option<&EndpointConfig> {
        self.entries
            .get(&normalize_base_url(url))
            .map(|entry| &entry.config)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointConfig> {
        self.entries.values().map(|entry| &entry.config)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &EndpointConfig> {
        self.iter().filter(|config| config.enabled)
    }

    /// Record the task running `url`. Returns false for unknown endpoints.
    pub fn attach(&mut self, url: &str, task: EndpointTask) -> bool {
        match self.entries.get_mut(&normalize_base_url(url)) {
            Some(entry) => {
                entry.task = Some(task);
                true
            }
            None => false,
        }
    }

    /// Take every task handle, leaving the endpoints registered.
    pub fn detach_all(&mut self) -> Vec<EndpointTask> {
        self.entries
            .values_mut()
            .filter_map(|entry| entry.task.take())
            .collect()
    }

    /// Number of endpoint tasks still running.
    pub fn running(&self) -> usize {
        self.entries
            .values()
            .filter_map(|entry| entry.task.as_ref())
            .filter(|task| !task.handle.is_finished())
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(url: &str, enabled: bool) -> EndpointConfig {
        EndpointConfig {
            enabled,
            ..EndpointConfig::new(url)
        }
    }

    #[test]
    fn test_duplicates_keep_first() {
        let mut first = endpoint("ws://cloud.signalk.org", true);
        first.credential = Some("first".to_string());
        let config = RelayConfig {
            endpoints: vec![first, endpoint("http://cloud.signalk.org/", true), endpoint("http://b", false)],
        };

        let registry = EndpointRegistry::from_config(&config);
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get("http://cloud.signalk.org").unwrap().credential.as_deref(),
            Some("first")
        );
        let enabled: Vec<_> = registry.enabled().map(|c| c.url.as_str()).collect();
        assert_eq!(enabled, vec!["ws://cloud.signalk.org"]);
    }

    #[tokio::test]
    async fn test_attach_and_detach() {
        let mut registry = EndpointRegistry::new();
        registry.insert(endpoint("http://a", true));

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { token.cancelled().await });
        assert!(registry.attach("http://a", EndpointTask { cancel, handle }));
        assert_eq!(registry.running(), 1);

        let unknown = EndpointTask {
            cancel: CancellationToken::new(),
            handle: tokio::spawn(async {}),
        };
        assert!(!registry.attach("http://zzz", unknown));

        let tasks = registry.detach_all();
        assert_eq!(tasks.len(), 1);
        assert_eq!(registry.running(), 0);
        for task in tasks {
            task.cancel.cancel();
            task.handle.await.unwrap();
        }
        assert!(registry.detach_all().is_empty());
        assert_eq!(registry.len(), 1);
    }
}
