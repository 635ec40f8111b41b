//! SignalK data store.
//!
//! The store keeps the latest value for every context/path it has seen, in
//! the nested JSON shape of the SignalK full data model.

use crate::model::{Delta, SELF_CONTEXT};
use serde_json::{json, Map, Value};

/// Trait for SignalK data storage implementations.
pub trait SignalKStore: Send + Sync {
    /// Apply a delta to the store, merging values into the tree.
    fn apply_delta(&mut self, delta: &Delta);

    /// Get value at an absolute path (e.g., "vessels.self.navigation.position").
    fn get_path(&self, path: &str) -> Option<Value>;

    /// Get value relative to self vessel (e.g., "navigation.position").
    fn get_self_path(&self, path: &str) -> Option<Value>;

    /// Get the self vessel context ("vessels.urn:...").
    fn self_urn(&self) -> &str;
}

/// In-memory SignalK store implementation.
///
/// Leaf values are stored wrapped as `{"value", "$source", "timestamp"}`.
/// Values delivered with an empty path are merged into the context root
/// unwrapped, the way `name` or `mmsi` live in the full model.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    data: Value,
    self_urn: String,
}

impl MemoryStore {
    /// Create a new empty store.
    ///
    /// `self_urn` is the full self context, e.g.
    /// "vessels.urn:mrn:signalk:uuid:c0d79334-4e25-4245-8892-54e8ccc8021d".
    pub fn new(self_urn: &str) -> Self {
        let urn_key = self_urn.strip_prefix("vessels.").unwrap_or(self_urn);

        Self {
            data: json!({
                "version": "1.7.0",
                "self": self_urn,
                "vessels": { urn_key: {} },
            }),
            self_urn: self_urn.to_string(),
        }
    }

    /// Resolve "vessels.self" to the actual vessel context.
    pub fn resolve_context<'a>(&'a self, context: &'a str) -> &'a str {
        if context == SELF_CONTEXT {
            &self.self_urn
        } else {
            context
        }
    }

    /// Get the full data model as JSON.
    pub fn full_model(&self) -> &Value {
        &self.data
    }

    fn node_mut(&mut self, path: &str) -> &mut Map<String, Value> {
        let mut current = &mut self.data;
        for segment in path.split('.') {
            let map = ensure_object(current);
            current = map.entry(segment.to_string()).or_insert_with(|| json!({}));
        }
        ensure_object(current)
    }

    fn set_leaf(&mut self, context: &str, path: &str, value: Value) {
        let (parent, leaf) = match path.rsplit_once('.') {
            Some((parent, leaf)) => (format!("{context}.{parent}"), leaf),
            None => (context.to_string(), path),
        };
        self.node_mut(&parent).insert(leaf.to_string(), value);
    }

    fn get_path_value(&self, path: &str) -> Option<Value> {
        path.split('.')
            .try_fold(&self.data, |node, segment| node.as_object()?.get(segment))
            .cloned()
    }
}

/// Replace a non-object node with an empty object so children can be added.
fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            *other = Value::Object(Map::new());
            ensure_object(other)
        }
    }
}

impl SignalKStore for MemoryStore {
    fn apply_delta(&mut self, delta: &Delta) {
        let context = self.resolve_context(delta.context_or_self()).to_string();

        for update in &delta.updates {
            for pv in &update.values {
                if pv.path.is_empty() {
                    if let Value::Object(fields) = &pv.value {
                        let root = self.node_mut(&context);
                        for (key, value) in fields {
                            root.insert(key.clone(), value.clone());
                        }
                    }
                    continue;
                }

                let wrapped = json!({
                    "value": pv.value,
                    "$source": update.source_label(),
                    "timestamp": update.timestamp,
                });
                self.set_leaf(&context, &pv.path, wrapped);
            }
        }
    }

    fn get_path(&self, path: &str) -> Option<Value> {
        self.get_path_value(path)
    }

    fn get_self_path(&self, path: &str) -> Option<Value> {
        self.get_path_value(&format!("{}.{}", self.self_urn, path))
    }

    fn self_urn(&self) -> &str {
        &self.self_urn
    }
}
