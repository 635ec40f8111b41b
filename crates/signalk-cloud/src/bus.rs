//! Local SignalK bus interface and an in-process implementation.
//!
//! The relay only needs four things from the server it runs in: the self
//! context, current values by path, filtered change notifications, and a way
//! to inject deltas. `MemoryBus` provides them on top of `MemoryStore`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::Value;
use signalk_core::{Delta, MemoryStore, PathPattern, SignalKStore, Update, SELF_CONTEXT};
use signalk_protocol::SubscribeRequest;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::BusError;

/// Cancels one local subscription when called.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

/// What the relay needs from the local SignalK server.
pub trait LocalBus: Send + Sync {
    /// Fully qualified self context, e.g. `vessels.urn:mrn:signalk:uuid:...`.
    fn self_context(&self) -> String;

    /// Current value of a self-vessel path, possibly wrapped as `{"value": ...}`.
    fn get_self_path(&self, path: &str) -> Option<Value>;

    /// Deliver matching deltas to `sink` until the pushed unsubscribe handle
    /// is called or the receiver is dropped.
    fn subscribe(
        &self,
        request: &SubscribeRequest,
        unsubscribes: &mut Vec<Unsubscribe>,
        sink: mpsc::UnboundedSender<Delta>,
    ) -> Result<(), BusError>;

    /// Inject a delta produced by `provider_id`.
    fn handle_message(&self, provider_id: &str, delta: Delta);
}

struct PathSubscription {
    pattern: PathPattern,
    period: Duration,
}

struct Subscriber {
    id: u64,
    context: PathPattern,
    paths: Vec<PathSubscription>,
    last_sent: HashMap<String, Instant>,
    sink: mpsc::UnboundedSender<Delta>,
}

impl Subscriber {
    /// The part of `delta` this subscriber wants right now.
    fn filter(&mut self, context: &str, delta: &Delta, now: Instant) -> Option<Delta> {
        if !self.context.matches(context) {
            return None;
        }

        let mut updates = Vec::new();
        for update in &delta.updates {
            let values: Vec<_> = update
                .values
                .iter()
                .filter(|pv| self.admit(&pv.path, now))
                .cloned()
                .collect();

            if !values.is_empty() {
                updates.push(Update {
                    values,
                    meta: None,
                    ..update.clone()
                });
            }
        }

        if updates.is_empty() {
            None
        } else {
            Some(Delta {
                context: Some(context.to_string()),
                updates,
            })
        }
    }

    fn admit(&mut self, path: &str, now: Instant) -> bool {
        let Some(period) = self
            .paths
            .iter()
            .find(|p| p.pattern.matches(path))
            .map(|p| p.period)
        else {
            return false;
        };

        match self.last_sent.get(path) {
            Some(last) if now.duration_since(*last) < period => false,
            _ => {
                self.last_sent.insert(path.to_string(), now);
                true
            }
        }
    }
}

struct BusInner {
    store: MemoryStore,
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

/// In-process bus over a `MemoryStore`.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Mutex<BusInner>>,
}

impl MemoryBus {
    /// `self_urn` is the full self context, `vessels.urn:...`.
    pub fn new(self_urn: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                store: MemoryStore::new(self_urn),
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the full data model.
    pub fn full_model(&self) -> Value {
        self.lock().store.full_model().clone()
    }

    /// Value at an absolute path such as `vessels.urn:x.navigation.position`.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        self.lock().store.get_path(path)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl LocalBus for MemoryBus {
    fn self_context(&self) -> String {
        self.lock().store.self_urn().to_string()
    }

    fn get_self_path(&self, path: &str) -> Option<Value> {
        self.lock().store.get_self_path(path)
    }

    fn subscribe(
        &self,
        request: &SubscribeRequest,
        unsubscribes: &mut Vec<Unsubscribe>,
        sink: mpsc::UnboundedSender<Delta>,
    ) -> Result<(), BusError> {
        let mut inner = self.lock();

        let context = inner.store.resolve_context(&request.context).to_string();
        let context = PathPattern::new(&context)?;
        let paths = request
            .subscribe
            .iter()
            .map(|s| {
                Ok(PathSubscription {
                    pattern: PathPattern::new(&s.path)?,
                    period: Duration::from_millis(s.period.unwrap_or(0)),
                })
            })
            .collect::<Result<Vec<_>, BusError>>()?;

        let id = inner.next_id;
        inner.next_id += 1;
        debug!(context = %context, paths = paths.len(), id, "Local subscription added");
        inner.subscribers.push(Subscriber {
            id,
            context,
            paths,
            last_sent: HashMap::new(),
            sink,
        });

        let weak: Weak<Mutex<BusInner>> = Arc::downgrade(&self.inner);
        unsubscribes.push(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                inner.subscribers.retain(|s| s.id != id);
                trace!(id, "Local subscription removed");
            }
        }));
        Ok(())
    }

    fn handle_message(&self, provider_id: &str, mut delta: Delta) {
        for update in &mut delta.updates {
            if update.source.is_none() && update.source_ref.is_none() {
                update.source_ref = Some(provider_id.to_string());
            }
        }

        let mut inner = self.lock();
        inner.store.apply_delta(&delta);

        let context = inner
            .store
            .resolve_context(delta.context.as_deref().unwrap_or(SELF_CONTEXT))
            .to_string();
        let now = Instant::now();

        inner.subscribers.retain_mut(|subscriber| {
            if subscriber.sink.is_closed() {
                return false;
            }
            match subscriber.filter(&context, &delta, now) {
                Some(filtered) => subscriber.sink.send(filtered).is_ok(),
                None => true,
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use signalk_core::{PathValue, Source};
    use signalk_protocol::Subscription;

    const SELF: &str = "vessels.urn:mrn:signalk:uuid:self";

    fn request(context: &str, paths: &[(&str, u64)]) -> SubscribeRequest {
        SubscribeRequest {
            context: context.to_string(),
            subscribe: paths.iter().map(|(p, ms)| Subscription::every(*p, *ms)).collect(),
        }
    }

    fn delta(context: &str, values: Vec<(&str, Value)>) -> Delta {
        Delta {
            context: Some(context.to_string()),
            updates: vec![Update::with_values(
                values.into_iter().map(|(p, v)| PathValue::new(p, v)).collect(),
            )],
        }
    }

    #[test]
    fn test_handle_message_stores_with_provider_source() {
        let bus = MemoryBus::new(SELF);
        bus.handle_message("demo", delta(SELF_CONTEXT, vec![("navigation.speedOverGround", json!(4.2))]));

        let stored = bus.get_self_path("navigation.speedOverGround").unwrap();
        assert_eq!(stored["value"], json!(4.2));
        assert_eq!(stored["$source"], json!("demo"));
        assert_eq!(bus.self_context(), SELF);
    }

    #[tokio::test]
    async fn test_subscription_filters_context_and_paths() {
        let bus = MemoryBus::new(SELF);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut unsubscribes = Vec::new();
        bus.subscribe(&request(SELF_CONTEXT, &[("navigation.*", 0)]), &mut unsubscribes, tx)
            .unwrap();

        bus.handle_message(
            "demo",
            delta(
                SELF_CONTEXT,
                vec![
                    ("navigation.courseOverGroundTrue", json!(1.1)),
                    ("environment.wind.speedApparent", json!(5.0)),
                ],
            ),
        );
        bus.handle_message("demo", delta("vessels.urn:other", vec![("navigation.x", json!(1))]));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.context.as_deref(), Some(SELF));
        assert_eq!(received.updates.len(), 1);
        assert_eq!(received.updates[0].values.len(), 1);
        assert_eq!(received.updates[0].values[0].path, "navigation.courseOverGroundTrue");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sources_are_delivered() {
        let bus = MemoryBus::new(SELF);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut unsubscribes = Vec::new();
        bus.subscribe(&request(SELF_CONTEXT, &[("*", 0)]), &mut unsubscribes, tx).unwrap();

        let mut tagged = delta(SELF_CONTEXT, vec![("navigation.position", json!({"latitude": 1.0, "longitude": 2.0}))]);
        tagged.updates[0].source = Some(Source::labelled("cloud:ais"));
        bus.handle_message("signalk-cloud", tagged);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.updates[0].source_label(), Some("cloud:ais"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_period_throttles_per_path() {
        let bus = MemoryBus::new(SELF);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut unsubscribes = Vec::new();
        bus.subscribe(&request(SELF_CONTEXT, &[("navigation.*", 10_000)]), &mut unsubscribes, tx)
            .unwrap();

        let sog = || delta(SELF_CONTEXT, vec![("navigation.speedOverGround", json!(1.0))]);
        bus.handle_message("demo", sog());
        bus.handle_message("demo", sog());
        tokio::time::advance(Duration::from_secs(11)).await;
        bus.handle_message("demo", sog());

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_and_dropped_receivers() {
        let bus = MemoryBus::new(SELF);
        let mut unsubscribes = Vec::new();

        let (tx1, _rx1) = mpsc::unbounded_channel();
        bus.subscribe(&request(SELF_CONTEXT, &[("*", 0)]), &mut unsubscribes, tx1).unwrap();
        let (tx2, rx2) = mpsc::unbounded_channel();
        bus.subscribe(&request(SELF_CONTEXT, &[("*", 0)]), &mut unsubscribes, tx2).unwrap();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx2);
        bus.handle_message("demo", delta(SELF_CONTEXT, vec![("navigation.x", json!(1))]));
        assert_eq!(bus.subscriber_count(), 1);

        for unsubscribe in unsubscribes.drain(..) {
            unsubscribe();
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let bus = MemoryBus::new(SELF);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut unsubscribes = Vec::new();
        let result = bus.subscribe(&request(SELF_CONTEXT, &[("navigation..x", 0)]), &mut unsubscribes, tx);
        assert!(matches!(result, Err(BusError::Pattern(_))));
        assert!(unsubscribes.is_empty());
    }
}
