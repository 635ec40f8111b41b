//! Protocol message types.
//!
//! This module defines the messages a cloud relay deals with:
//! - Discovery: the `/signalk` endpoint document
//! - Relay → remote: Delta, geo-scoped subscribe, device access request
//! - Remote → relay: Delta, access request response
//! - Relay → local bus: subscribe request
//!
//! Messages are serialized as JSON over WebSocket text frames.

use serde::{Deserialize, Serialize};
use signalk_core::{Delta, Position};

// ============================================================================
// Subscriptions
// ============================================================================

/// Subscription request message with a plain string context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub context: String,
    pub subscribe: Vec<Subscription>,
}

/// One path to subscribe to and its sample period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub path: String,
    /// Sample period in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
}

impl Subscription {
    pub fn every(path: impl Into<String>, period_ms: u64) -> Self {
        Self {
            path: path.into(),
            period: Some(period_ms),
        }
    }
}

/// Pseudo-context selecting every vessel within `radius` meters of `position`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoContext {
    pub radius: f64,
    pub position: Position,
}

/// Subscription request scoped to a geographic area.
///
/// # Example
/// ```json
/// {
///   "context": {"radius": 5000, "position": {"latitude": 60.15, "longitude": 24.95}},
///   "subscribe": [{"path": "*", "period": 30000}]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSubscribeRequest {
    pub context: GeoContext,
    pub subscribe: Vec<Subscription>,
}

// ============================================================================
// Discovery Endpoint
// ============================================================================

/// Discovery response for `/signalk` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub endpoints: DiscoveryEndpoints,
}

/// Endpoints advertised in discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryEndpoints {
    pub v1: DiscoveryV1,
}

/// Version 1 API endpoints.
///
/// Servers advertise the secure or the plain variant of each endpoint,
/// sometimes both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryV1 {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "signalk-http", skip_serializing_if = "Option::is_none")]
    pub signalk_http: Option<String>,
    #[serde(rename = "signalk-https", skip_serializing_if = "Option::is_none")]
    pub signalk_https: Option<String>,
    #[serde(rename = "signalk-ws", skip_serializing_if = "Option::is_none")]
    pub signalk_ws: Option<String>,
    #[serde(rename = "signalk-wss", skip_serializing_if = "Option::is_none")]
    pub signalk_wss: Option<String>,
}

impl DiscoveryV1 {
    /// Streaming endpoint, secure variant first.
    pub fn stream_endpoint(&self) -> Option<&str> {
        self.signalk_wss.as_deref().or(self.signalk_ws.as_deref())
    }

    /// REST endpoint, secure variant first.
    pub fn http_endpoint(&self) -> Option<&str> {
        self.signalk_https.as_deref().or(self.signalk_http.as_deref())
    }
}

// ============================================================================
// Device Access Requests
// ============================================================================

/// Device access request sent by a client without a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequestMessage {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(rename = "accessRequest")]
    pub access_request: DeviceAccessRequest,
}

impl AccessRequestMessage {
    /// Create a request with a fresh request id.
    pub fn new(client_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            access_request: DeviceAccessRequest {
                client_id: client_id.into(),
                description: description.into(),
                permissions: "readwrite".to_string(),
            },
        }
    }
}

/// Body of a device access request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAccessRequest {
    pub client_id: String,
    pub description: String,
    pub permissions: String,
}

/// Server reply to an access request.
///
/// Only `accessRequest` is mandatory; the request/state envelope is present
/// when the reply arrives over the stream as a request response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessResponse {
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "statusCode", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "accessRequest")]
    pub access_request: AccessGrant,
}

/// Result part of an access request reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<String>,
}

/// What an access reply means for the client.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessOutcome {
    Granted(String),
    Denied(String),
    Pending,
}

impl AccessResponse {
    pub fn outcome(&self) -> AccessOutcome {
        let grant = &self.access_request;
        if let Some(token) = grant.token.as_deref().filter(|t| !t.is_empty()) {
            return AccessOutcome::Granted(token.to_string());
        }
        if grant.permission.as_deref() == Some("DENIED") || self.status_code == Some(403) {
            let reason = self
                .message
                .clone()
                .unwrap_or_else(|| "access request denied".to_string());
            return AccessOutcome::Denied(reason);
        }
        AccessOutcome::Pending
    }
}

// ============================================================================
// Unified Inbound Enum
// ============================================================================

/// Messages that can be received from a remote server.
///
/// Uses untagged deserialization - the message type is determined by
/// examining which fields are present. Anything that is neither an access
/// reply nor carries an update list (hello, request acknowledgements) lands
/// in `Other`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    Access(AccessResponse),
    Delta(Delta),
    Other(serde_json::Value),
}
