//! SignalK cloud relay.
//!
//! Relays deltas between a local SignalK bus and one or more remote cloud
//! servers over WebSocket, in both directions:
//!
//! - local self-vessel changes are sent upstream, with their sources stripped
//! - nearby vessels reported by the cloud are injected into the local bus,
//!   tagged with a `cloud:` source so they are never sent back
//! - static vessel attributes are pushed in one batched delta on connect and
//!   on a coarse interval
//!
//! Each endpoint runs as its own tokio task that owns its connection state.
//! Failures never leave an endpoint: they are reported on its status line and
//! answered with a reconnect attempt after a fixed delay.

pub mod bus;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod forwarder;
pub mod position;
pub mod provenance;
pub mod registry;
pub mod relay;
pub mod snapshot;
pub mod status;
pub mod subscription;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use bus::{LocalBus, MemoryBus, Unsubscribe};
pub use config::{DataPolicy, EndpointConfig, RelayConfig, PLUGIN_ID, RETRY_DELAY};
pub use connection::{Connection, ConnectionState, Phase, RelayContext};
pub use discovery::{HttpResolver, ResolvedEndpoint, Resolver};
pub use error::{BusError, DiscoveryError, RelayError, TransportError};
pub use position::SharedPosition;
pub use provenance::{Provenance, CLOUD_TAG};
pub use registry::EndpointRegistry;
pub use relay::CloudRelay;
pub use status::{EndpointStatus, StatusBoard, StatusLevel};
pub use transport::{Connector, Transport, WsConnector};
