//! Error types for the cloud relay.
//!
//! Every error here is endpoint-local: it is reported on that endpoint's
//! status line and, for discovery and transport failures, answered with a
//! retry. None of them stop the relay.

use signalk_core::ConfigError;
use signalk_protocol::CodecError;
use thiserror::Error;

/// Failure resolving a base URL to stream/HTTP endpoints.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Error connecting to cloud server {0}")]
    Request(#[from] reqwest::Error),

    #[error("Bad status code from cloud server {0}")]
    Status(u16),

    #[error("Invalid discovery document: {0}")]
    Malformed(String),

    #[error("Discovery document has no {0} endpoint")]
    MissingEndpoint(&'static str),
}

/// Failure opening or using a stream connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid stream url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid credential header: {0}")]
    InvalidCredential(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("Connection closed")]
    Closed,
}

/// Error raised by a local bus implementation.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Invalid subscription pattern: {0}")]
    Pattern(#[from] signalk_core::PatternError),

    #[error("Local bus is shut down")]
    Closed,
}

/// Anything that can go wrong on one endpoint.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(#[from] CodecError),

    #[error("Local bus: {0}")]
    Bus(#[from] BusError),

    #[error("Configuration: {0}")]
    Config(#[from] ConfigError),
}
