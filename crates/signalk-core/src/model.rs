//! SignalK data model types.
//!
//! These types represent the SignalK structures the relay moves around:
//! - Delta messages and their updates
//! - Source tracking (`$source` reference or embedded `source` object)
//! - WGS84 positions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shorthand context for the local vessel.
pub const SELF_CONTEXT: &str = "vessels.self";

/// A SignalK delta message containing one or more updates.
///
/// Deltas are the primary mechanism for transmitting changes in SignalK.
/// They contain a context (which vessel/object) and a list of updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// The context path (e.g., "vessels.urn:mrn:signalk:uuid:...")
    /// If None, defaults to "vessels.self"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// The list of updates in this delta
    pub updates: Vec<Update>,
}

impl Delta {
    /// Create a delta for a context with a single update.
    pub fn single(context: impl Into<String>, update: Update) -> Self {
        Self {
            context: Some(context.into()),
            updates: vec![update],
        }
    }

    /// The context, falling back to `vessels.self` when absent.
    pub fn context_or_self(&self) -> &str {
        self.context.as_deref().unwrap_or(SELF_CONTEXT)
    }
}

/// A single update within a delta, containing values from one source at one timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Reference to source in /sources (e.g., "nmea0183.GP")
    #[serde(rename = "$source", skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,

    /// Embedded source object (alternative to $source)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,

    /// ISO 8601 timestamp (UTC)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// The path-value pairs in this update
    #[serde(default)]
    pub values: Vec<PathValue>,

    /// Metadata updates (separate from values)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Vec<PathMeta>>,
}

impl Update {
    /// Create an update carrying only values.
    pub fn with_values(values: Vec<PathValue>) -> Self {
        Self {
            values,
            ..Default::default()
        }
    }

    /// The label identifying where this update came from.
    ///
    /// The embedded `source.label` wins over `$source` when both are present.
    pub fn source_label(&self) -> Option<&str> {
        self.source
            .as_ref()
            .map(|s| s.label.as_str())
            .or(self.source_ref.as_deref())
    }

    /// Find the value for an exact path.
    pub fn value_of(&self, path: &str) -> Option<&Value> {
        self.values.iter().find(|pv| pv.path == path).map(|pv| &pv.value)
    }
}

/// A single path-value pair within an update.
///
/// An empty path addresses the context root; its value is an object merged
/// into the root (used for `name`, `mmsi` and friends).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathValue {
    /// The SignalK path (e.g., "navigation.speedOverGround")
    pub path: String,

    /// The value at this path
    pub value: Value,
}

impl PathValue {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// Metadata for a path. The relay passes it through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMeta {
    pub path: String,
    pub value: Value,
}

/// Source information describing where data originated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Label identifying the source bus (e.g., "N2K-1", "serial-COM1")
    #[serde(default)]
    pub label: String,

    /// Type of source (e.g., "NMEA0183", "NMEA2000", "signalk")
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,

    /// Protocol specific fields (talker, pgn, src, canName, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Source {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source_type: None,
            extra: Map::new(),
        }
    }
}

/// Position in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
        }
    }

    /// Read a position from a raw or store-wrapped (`{"value": {...}}`) value.
    ///
    /// Returns None unless both latitude and longitude are numbers.
    pub fn from_value(value: &Value) -> Option<Self> {
        let inner = match value.get("value") {
            Some(wrapped) if wrapped.is_object() => wrapped,
            _ => value,
        };
        Some(Self {
            latitude: inner.get("latitude")?.as_f64()?,
            longitude: inner.get("longitude")?.as_f64()?,
            altitude: inner.get("altitude").and_then(Value::as_f64),
        })
    }
}
