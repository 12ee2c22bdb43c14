//! Item list persistence
//!
//! The inventory is stored as a single JSON array of strings under one key.
//! Anything unreadable loads as an empty list; failed writes are logged and
//! the in-memory state stays authoritative.

use crate::platform::KeyValueStore;

/// Encode items as a JSON array
pub fn encode_items(items: &[String]) -> String {
    // A slice of strings always serializes
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a JSON array of strings, dropping duplicates (first occurrence wins)
pub fn decode_items(json: &str) -> Result<Vec<String>, serde_json::Error> {
    let raw: Vec<String> = serde_json::from_str(json)?;
    let mut items: Vec<String> = Vec::with_capacity(raw.len());
    for item in raw {
        if !items.contains(&item) {
            items.push(item);
        }
    }
    Ok(items)
}

/// Load the item list stored under `key`
pub fn load_items(storage: &dyn KeyValueStore, key: &str) -> Vec<String> {
    let json = match storage.read(key) {
        Ok(Some(json)) => json,
        Ok(None) => return Vec::new(),
        Err(err) => {
            log::warn!("Inventory read failed, starting empty: {err}");
            return Vec::new();
        }
    };

    match decode_items(&json) {
        Ok(items) => {
            log::debug!("Loaded {} inventory items", items.len());
            items
        }
        Err(err) => {
            log::warn!("Stored inventory is malformed, resetting: {err}");
            Vec::new()
        }
    }
}

/// Save the item list under `key`; returns whether the write stuck
pub fn save_items(storage: &dyn KeyValueStore, key: &str, items: &[String]) -> bool {
    match storage.write(key, &encode_items(items)) {
        Ok(()) => true,
        Err(err) => {
            log::warn!("Inventory not persisted ({} items): {err}", items.len());
            false
        }
    }
}
