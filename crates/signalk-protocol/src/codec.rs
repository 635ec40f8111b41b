//! JSON codec for SignalK stream and discovery messages.
//!
//! SignalK uses JSON messages over WebSocket text frames. This module provides
//! encoding and decoding utilities for the protocol messages.

use crate::messages::{DiscoveryResponse, InboundMessage};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON (de)serialization failed.
    #[error("Invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),

    /// Received a binary frame that is not UTF-8 text.
    #[error("Expected text frame, received binary")]
    BinaryFrame,
}

/// Encode any outbound message to a JSON string for transmission.
pub fn encode_message<T: Serialize>(msg: &T) -> Result<String, CodecError> {
    serde_json::to_string(msg).map_err(CodecError::from)
}

/// Decode a message received from a remote server.
pub fn decode_inbound(text: &str) -> Result<InboundMessage, CodecError> {
    serde_json::from_str(text).map_err(CodecError::from)
}

/// Text carried in a binary frame. Only UTF-8 payloads are accepted.
pub fn binary_frame_text(data: Vec<u8>) -> Result<String, CodecError> {
    String::from_utf8(data).map_err(|_| CodecError::BinaryFrame)
}

/// Decode the body of a `/signalk` discovery response.
pub fn decode_discovery(text: &str) -> Result<DiscoveryResponse, CodecError> {
    serde_json::from_str(text).map_err(CodecError::from)
}
