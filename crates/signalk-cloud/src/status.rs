//! Per-endpoint status lines.
//!
//! Each endpoint has exactly one current status, overwritten by every event.
//! No history is kept; the log carries that.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Normal,
    Error,
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLevel::Normal => f.write_str("normal"),
            StatusLevel::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointStatus {
    pub level: StatusLevel,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

impl EndpointStatus {
    pub fn is_error(&self) -> bool {
        self.level == StatusLevel::Error
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.message)
    }
}

/// Latest status per endpoint URL, shared by all endpoint tasks.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    entries: Arc<RwLock<HashMap<String, EndpointStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, level: StatusLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            StatusLevel::Normal => info!(endpoint = %url, "{}", message),
            StatusLevel::Error => warn!(endpoint = %url, "{}", message),
        }

        let status = EndpointStatus {
            level,
            message,
            updated_at: Utc::now(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), status);
    }

    pub fn normal(&self, url: &str, message: impl Into<String>) {
        self.set(url, StatusLevel::Normal, message);
    }

    pub fn error(&self, url: &str, message: impl Into<String>) {
        self.set(url, StatusLevel::Error, message);
    }

    pub fn get(&self, url: &str) -> Option<EndpointStatus> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    /// All statuses, sorted by endpoint URL.
    pub fn all(&self) -> Vec<(String, EndpointStatus)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn remove(&self, url: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
    }
}
