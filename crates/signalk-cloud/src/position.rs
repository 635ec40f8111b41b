//! The vessel's last known position, shared by all endpoints.

use std::sync::{Arc, PoisonError, RwLock};

use signalk_core::Position;

/// Last known self position. Any endpoint may update it; the value always
/// comes from the same local source, so the last writer wins.
#[derive(Debug, Clone, Default)]
pub struct SharedPosition {
    inner: Arc<RwLock<Option<Position>>>,
}

impl SharedPosition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Position> {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, position: Position) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(position);
    }
}
