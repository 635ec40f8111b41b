//! Relay configuration.
//!
//! The persisted plugin configuration is JSON in the shape the SignalK admin
//! UI writes:
//!
//! ```json
//! { "enabled": true, "configuration": { "endpoints": [ { "url": "https://cloud.signalk.org", "jwtToken": "..." } ] } }
//! ```
//!
//! The `enabled`/`configuration` envelope is optional, and a single endpoint
//! object in place of the `endpoints` list is accepted for configurations
//! written before multiple endpoints were supported.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use signalk_core::{ConfigError, ConfigStorage};

/// Plugin identity, used for config storage and as the provider id for
/// deltas handed to the local bus.
pub const PLUGIN_ID: &str = "signalk-cloud";

/// Fixed delay between reconnect attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Floor for the outward update period, in seconds.
pub const MIN_UPDATE_PERIOD_SECS: f64 = 10.0;

/// Floor for the static snapshot period, in minutes.
pub const MIN_STATIC_PERIOD_MINUTES: f64 = 5.0;

/// Ceiling for every configured period: one week, in seconds.
pub const MAX_PERIOD_SECS: f64 = 604_800.0;

/// Which local data is sent to an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataPolicy {
    #[serde(rename = "nav", alias = "navigation")]
    Navigation,
    #[default]
    #[serde(rename = "nav+environment", alias = "navigation+environment")]
    NavigationEnvironment,
    #[serde(rename = "all")]
    All,
}

impl DataPolicy {
    /// Local path patterns covered by this policy.
    pub fn paths(self) -> &'static [&'static str] {
        match self {
            DataPolicy::Navigation => &["navigation.*"],
            DataPolicy::NavigationEnvironment => &["navigation.*", "environment.*"],
            DataPolicy::All => &["*"],
        }
    }
}

/// Settings for one remote cloud server. The base URL is its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bearer token; may be issued later through an access request.
    #[serde(
        rename = "jwtToken",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub credential: Option<String>,

    /// Seconds between outward updates.
    #[serde(default = "default_update_period")]
    pub server_update_period: f64,

    /// Minutes between static snapshots.
    #[serde(default = "default_static_period")]
    pub static_update_period: f64,

    #[serde(default)]
    pub data_to_send: DataPolicy,

    /// Seconds between inward updates.
    #[serde(default = "default_update_period")]
    pub client_update_period: f64,

    /// Radius in meters of other vessels to fetch.
    #[serde(default = "default_radius")]
    pub other_vessels_radius: f64,

    #[serde(default = "default_true")]
    pub fetch_other_vessels: bool,
}

fn default_true() -> bool {
    true
}

fn default_update_period() -> f64 {
    30.0
}

fn default_static_period() -> f64 {
    5.0
}

fn default_radius() -> f64 {
    5000.0
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Seconds to a duration within `floor..=MAX_PERIOD_SECS`. NaN becomes `floor`.
fn seconds_at_least(value: f64, floor: f64) -> Duration {
    let seconds = if value.is_nan() {
        floor
    } else {
        value.clamp(floor, MAX_PERIOD_SECS)
    };
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::from_secs(MAX_PERIOD_SECS as u64))
}

impl EndpointConfig {
    /// An enabled endpoint with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            enabled: true,
            credential: None,
            server_update_period: default_update_period(),
            static_update_period: default_static_period(),
            data_to_send: DataPolicy::default(),
            client_update_period: default_update_period(),
            other_vessels_radius: default_radius(),
            fetch_other_vessels: true,
        }
    }

    /// Outward period, never below ten seconds.
    pub fn outward_period(&self) -> Duration {
        seconds_at_least(self.server_update_period, MIN_UPDATE_PERIOD_SECS)
    }

    /// Inward period as configured.
    pub fn inward_period(&self) -> Duration {
        seconds_at_least(self.client_update_period, 0.0)
    }

    /// Static snapshot period, never below five minutes.
    pub fn static_period(&self) -> Duration {
        seconds_at_least(self.static_update_period * 60.0, MIN_STATIC_PERIOD_MINUTES * 60.0)
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }
}

/// The full relay configuration: every configured endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

/// The configuration object inside an optional `{enabled, configuration}` envelope.
fn configuration_of(value: &Value) -> &Value {
    value.get("configuration").unwrap_or(value)
}

fn configuration_of_mut(value: &mut Value) -> &mut Value {
    if value.get("configuration").is_some() {
        &mut value["configuration"]
    } else {
        value
    }
}

impl RelayConfig {
    pub fn single(endpoint: EndpointConfig) -> Self {
        Self {
            endpoints: vec![endpoint],
        }
    }

    /// Parse any of the accepted configuration shapes.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        if value.get("enabled") == Some(&Value::Bool(false)) && value.get("configuration").is_some() {
            return Ok(Self::default());
        }

        let config = configuration_of(value);
        let parsed = match config {
            Value::Null => Ok(Self::default()),
            Value::Object(map) if map.contains_key("endpoints") => {
                serde_json::from_value::<RelayConfig>(config.clone())
            }
            Value::Object(map) if map.contains_key("url") => {
                serde_json::from_value::<EndpointConfig>(config.clone()).map(Self::single)
            }
            Value::Object(_) => Ok(Self::default()),
            _ => {
                return Err(ConfigError::InvalidData(
                    "expected an endpoint list or an endpoint with a url".to_string(),
                ))
            }
        };
        parsed.map_err(|e| ConfigError::InvalidData(e.to_string()))
    }

    /// Load from storage; a missing configuration means no endpoints.
    pub fn load(storage: &dyn ConfigStorage) -> Result<Self, ConfigError> {
        match storage.load_plugin_config(PLUGIN_ID) {
            Ok(value) => Self::from_value(&value),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}

/// Store a newly issued credential for the endpoint with `url`.
///
/// Edits the persisted document in place so the rest of it keeps its shape.
pub fn persist_credential(
    storage: &dyn ConfigStorage,
    url: &str,
    token: &str,
) -> Result<(), ConfigError> {
    let mut document = storage.load_plugin_config(PLUGIN_ID)?;
    let config = configuration_of_mut(&mut document);

    let entry = if config.get("endpoints").is_some() {
        config
            .get_mut("endpoints")
            .and_then(Value::as_array_mut)
            .and_then(|endpoints| {
                endpoints
                    .iter_mut()
                    .find(|e| e.get("url").and_then(Value::as_str) == Some(url))
            })
    } else if config.get("url").and_then(Value::as_str) == Some(url) {
        Some(config)
    } else {
        None
    };

    match entry.and_then(Value::as_object_mut) {
        Some(endpoint) => {
            endpoint.insert("jwtToken".to_string(), Value::String(token.to_string()));
        }
        None => return Err(ConfigError::NotFound(format!("endpoint {url}"))),
    }

    storage.save_plugin_config(PLUGIN_ID, &document)
}
