//! Platform abstraction layer
//!
//! The stores only talk to the host through these capabilities:
//! - `KeyValueStore` / `ExternalChanges`: durable storage and cross-tab writes
//! - `EventSink`: host-level broadcast events
//! - `Page`: badge elements, body classes and the effect timer
//!
//! `memory` backs tests and the native binary; `web` wraps the browser APIs.

use serde_json::Value;
use thiserror::Error;

pub mod memory;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use memory::{HeadlessPage, LogSink, MemoryStorage, NodeId, RecordingSink};

/// Failure reported by a platform backend
///
/// Stores log these and carry on; none of them reach store callers.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("storage is unavailable")]
    StorageUnavailable,
    #[error("failed to read `{key}`: {reason}")]
    Read { key: String, reason: String },
    #[error("failed to write `{key}`: {reason}")]
    Write { key: String, reason: String },
    #[error("failed to dispatch `{event}`: {reason}")]
    Dispatch { event: String, reason: String },
    #[error("document operation failed: {0}")]
    Dom(String),
    #[error("timer could not be scheduled: {0}")]
    Timer(String),
}

/// Durable string key-value storage
pub trait KeyValueStore {
    fn read(&self, key: &str) -> Result<Option<String>, PlatformError>;
    fn write(&self, key: &str, value: &str) -> Result<(), PlatformError>;
}

/// A write to storage made by another context (tab/window)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    /// Key that changed; `None` when the whole storage area was cleared
    pub key: Option<String>,
}

impl StorageChange {
    /// Whether this change can affect `key`
    pub fn touches(&self, key: &str) -> bool {
        self.key.as_deref().is_none_or(|changed| changed == key)
    }
}

/// Source of external storage change notifications
pub trait ExternalChanges {
    fn watch(&self, on_change: Box<dyn FnMut(&StorageChange)>);
}

/// Host-level broadcast of named events with a JSON payload
pub trait EventSink {
    fn publish(&self, event: &str, detail: &Value) -> Result<(), PlatformError>;
}

/// Handle to a scheduled effect timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub i64);

/// Document surface used by the sanity store
pub trait Page {
    type Element: Clone;

    /// Resolve a selector against the whole document
    fn query(&self, selector: &str) -> Option<Self::Element>;

    /// Find an existing badge element inside `mount`
    fn find_badge(&self, mount: &Self::Element) -> Option<Self::Element>;

    /// Create a badge element as a child of `mount`
    fn create_badge(&self, mount: &Self::Element) -> Result<Self::Element, PlatformError>;

    fn set_text(&self, element: &Self::Element, text: &str);

    fn add_body_class(&self, class: &str) -> Result<(), PlatformError>;

    fn remove_body_class(&self, class: &str) -> Result<(), PlatformError>;

    /// Remove `class` from the body after `delay_ms`
    fn schedule_class_removal(&self, class: &str, delay_ms: u32) -> Result<TimerId, PlatformError>;

    fn cancel_timer(&self, timer: TimerId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_change_touches() {
        let change = StorageChange {
            key: Some("a".to_string()),
        };
        assert!(change.touches("a"));
        assert!(!change.touches("b"));

        // A full clear touches every key
        let cleared = StorageChange { key: None };
        assert!(cleared.touches("a"));
    }
}
