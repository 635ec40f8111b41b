//! # signalk-protocol
//!
//! SignalK protocol message types and codec.
//!
//! This crate defines the discovery document, the stream messages a cloud
//! relay exchanges with a remote server, and the subscribe requests it makes
//! of the local bus.

pub mod codec;
pub mod messages;

pub use codec::*;
pub use messages::*;
