//! Static vessel attributes, batched into a single delta.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use signalk_core::{Delta, PathValue, Update};

use crate::bus::LocalBus;

/// Self paths republished on the static interval.
pub const STATIC_KEYS: &[&str] = &[
    "name",
    "mmsi",
    "uuid",
    "url",
    "flag",
    "port",
    "design.aisShipType",
    "design.draft",
    "design.length",
    "design.beam",
    "design.keel",
    "design.airHeight",
    "design.rigging",
    "sensors.gps.fromCenter",
    "sensors.gps.fromBow",
];

/// Strip the `{"value": ..}` envelope the store puts around leaf values.
fn unwrap_value(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("value") => {
            map.remove("value").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Collect the static attributes into one delta with exactly one update.
///
/// The first value is the server identity at the context root. Top-level
/// attributes such as `name` are sent as `{"path": "", "value": {"name": ..}}`;
/// nested ones keep their path. Attributes the bus does not know are skipped.
pub fn static_snapshot(
    bus: &dyn LocalBus,
    self_context: &str,
    server_name: &str,
    server_version: &str,
) -> Delta {
    let mut values = vec![PathValue::new(
        "",
        json!({ "serverName": server_name, "serverVersion": server_version }),
    )];

    for key in STATIC_KEYS {
        let Some(value) = bus.get_self_path(key).map(unwrap_value) else {
            continue;
        };

        if key.contains('.') {
            values.push(PathValue::new(*key, value));
        } else {
            let mut root = Map::new();
            root.insert((*key).to_string(), value);
            values.push(PathValue::new("", Value::Object(root)));
        }
    }

    let update = Update {
        timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        ..Update::with_values(values)
    };
    Delta::single(self_context, update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use signalk_core::SELF_CONTEXT;

    const SELF: &str = "vessels.urn:mrn:signalk:uuid:self";

    #[test]
    fn test_empty_bus_sends_identity_only() {
        let bus = MemoryBus::new(SELF);
        let delta = static_snapshot(&bus, SELF, "signalk-rs", "0.1.0");

        assert_eq!(delta.context.as_deref(), Some(SELF));
        assert_eq!(delta.updates.len(), 1);
        assert_eq!(
            delta.updates[0].values,
            vec![PathValue::new("", json!({"serverName": "signalk-rs", "serverVersion": "0.1.0"}))]
        );
    }

    #[test]
    fn test_attributes_are_unwrapped_and_batched() {
        let bus = MemoryBus::new(SELF);
        bus.handle_message(
            "test",
            Delta::single(
                SELF_CONTEXT,
                Update::with_values(vec![
                    PathValue::new("", json!({"name": "Freya", "mmsi": "230099999"})),
                    PathValue::new("design.length", json!({"overall": 12.2})),
                    PathValue::new("sensors.gps.fromBow", json!(3.5)),
                    PathValue::new("navigation.speedOverGround", json!(3.2)),
                ]),
            ),
        );

        let delta = static_snapshot(&bus, SELF, "signalk-rs", "0.1.0");
        assert_eq!(delta.updates.len(), 1);

        let values = &delta.updates[0].values;
        assert_eq!(values.len(), 5);
        assert!(values.contains(&PathValue::new("", json!({"name": "Freya"}))));
        assert!(values.contains(&PathValue::new("", json!({"mmsi": "230099999"}))));
        assert!(values.contains(&PathValue::new("design.length", json!({"overall": 12.2}))));
        assert!(values.contains(&PathValue::new("sensors.gps.fromBow", json!(3.5))));
        assert!(values.iter().all(|pv| pv.path != "navigation.speedOverGround"));
        assert!(delta.updates[0].timestamp.is_some());
    }
}
