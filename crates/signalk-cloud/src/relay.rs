//! The relay: one task per enabled endpoint.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::connection::{Connection, RelayContext};
use crate::error::RelayError;
use crate::registry::{EndpointRegistry, EndpointTask};
use crate::status::EndpointStatus;

pub struct CloudRelay {
    ctx: Arc<RelayContext>,
    registry: EndpointRegistry,
}

impl CloudRelay {
    pub fn new(ctx: RelayContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            registry: EndpointRegistry::new(),
        }
    }

    pub fn context(&self) -> &Arc<RelayContext> {
        &self.ctx
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Register `config` and spawn a task for every enabled endpoint.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, config: &RelayConfig) {
        for task in self.registry.detach_all() {
            task.cancel.cancel();
        }
        self.registry = EndpointRegistry::from_config(config);

        if self.registry.is_empty() {
            warn!("No cloud endpoints configured");
        }
        for endpoint in self.registry.iter().filter(|e| !e.enabled) {
            debug!(url = %endpoint.url, "Endpoint disabled");
        }

        let endpoints: Vec<_> = self.registry.enabled().cloned().collect();
        for endpoint in endpoints {
            let url = endpoint.url.clone();
            let cancel = CancellationToken::new();
            let connection = Connection::new(endpoint, self.ctx.clone());
            let handle = tokio::spawn(connection.run(cancel.clone()));
            self.registry.attach(&url, EndpointTask { cancel, handle });
        }
        info!(
            endpoints = self.registry.len(),
            running = self.registry.running(),
            "Cloud relay started"
        );
    }

    /// Stop every endpoint and wait for its task to finish. Idempotent.
    pub async fn stop(&mut self) {
        let tasks = self.registry.detach_all();
        if tasks.is_empty() {
            return;
        }

        for task in &tasks {
            task.cancel.cancel();
        }
        for task in tasks {
            if let Err(e) = task.handle.await {
                error!("Endpoint task failed: {}", e);
            }
        }
        info!("Cloud relay stopped");
    }

    /// Stop everything and start again from `config`.
    pub async fn reload(&mut self, config: &RelayConfig) {
        self.stop().await;
        for (url, _) in self.ctx.status.all() {
            if config.endpoints.iter().all(|e| e.url != url) {
                self.ctx.status.remove(&url);
            }
        }
        self.start(config);
    }

    /// Reload from the configuration store.
    pub async fn reload_from_storage(&mut self) -> Result<(), RelayError> {
        let config = RelayConfig::load(self.ctx.storage.as_ref())?;
        self.reload(&config).await;
        Ok(())
    }

    /// Number of endpoint tasks still running.
    pub fn running(&self) -> usize {
        self.registry.running()
    }

    /// Latest status of every endpoint, by URL.
    pub fn status(&self) -> Vec<(String, EndpointStatus)> {
        self.ctx.status.all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::config::{EndpointConfig, PLUGIN_ID};
    use crate::testing::{MockConnector, MockResolver};
    use serde_json::json;
    use signalk_core::{ConfigStorage, MemoryConfigStorage};
    use std::time::Duration;

    const SELF: &str = "vessels.urn:mrn:signalk:uuid:self";

    fn relay(connector: Arc<MockConnector>, storage: MemoryConfigStorage) -> CloudRelay {
        CloudRelay::new(RelayContext::with_network(
            Arc::new(MemoryBus::new(SELF)),
            Arc::new(storage),
            MockResolver::ok(),
            connector,
        ))
    }

    fn endpoint(url: &str, enabled: bool) -> EndpointConfig {
        EndpointConfig {
            enabled,
            credential: Some("t".to_string()),
            ..EndpointConfig::new(url)
        }
    }

    async fn wait_for(check: impl Fn() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_only_enabled_endpoints() {
        let connector = MockConnector::new();
        let mut relay = relay(connector.clone(), MemoryConfigStorage::new());
        let config = RelayConfig {
            endpoints: vec![endpoint("http://a", true), endpoint("http://b", false)],
        };

        relay.start(&config);
        assert_eq!(relay.registry().len(), 2);
        wait_for(|| connector.connects() == 1).await;
        assert_eq!(relay.running(), 1);

        let status = relay.status();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].0, "http://a");

        relay.stop().await;
        relay.stop().await;
        assert_eq!(relay.running(), 0);
        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_from_storage() {
        let connector = MockConnector::new();
        let storage = MemoryConfigStorage::with_plugin_config(
            PLUGIN_ID,
            json!({"url": "http://a", "jwtToken": "t"}),
        );
        let mut relay = relay(connector.clone(), storage);

        relay.reload_from_storage().await.unwrap();
        wait_for(|| connector.connects() == 1).await;

        relay
            .context()
            .storage
            .save_plugin_config(PLUGIN_ID, &json!({"endpoints": [{"url": "http://c", "jwtToken": "t"}]}))
            .unwrap();
        relay.reload_from_storage().await.unwrap();
        wait_for(|| connector.connects() == 2).await;

        assert_eq!(connector.closes(), 1);
        assert!(relay.registry().get("http://c").is_some());
        assert!(relay.registry().get("http://a").is_none());
        let urls: Vec<_> = relay.status().into_iter().map(|(url, _)| url).collect();
        assert_eq!(urls, vec!["http://c"]);

        relay.stop().await;
    }
}
