//! # signalk-core
//!
//! Core SignalK data model and store implementation.
//!
//! This crate provides:
//! - Data model types (Delta, Update, Source, Position)
//! - Path and context pattern matching
//! - In-memory store implementation
//! - Configuration storage abstraction (file-backed and in-memory)
//!
//! This crate is intentionally runtime-agnostic and contains no async code.

pub mod config;
pub mod model;
pub mod path;
pub mod store;

pub use config::{ConfigError, ConfigStorage, FileConfigStorage, MemoryConfigStorage};
pub use model::*;
pub use path::{PathPattern, PatternError};
pub use store::{MemoryStore, SignalKStore};
