//! Inventory store
//!
//! A set of item identifiers (insertion ordered) persisted as a JSON array
//! under one storage key. Other tabs writing the same key trigger a reload,
//! so every open window converges on the last write.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;

use crate::consts::{INVENTORY_CHANGE_EVENT, INVENTORY_KEY, INVENTORY_USE_EVENT};
use crate::listeners::{ListenerResult, Listeners, Subscription};
use crate::persistence::{load_items, save_items};
use crate::platform::{EventSink, ExternalChanges, KeyValueStore, StorageChange};

/// Shared item set
pub struct InventoryStore {
    items: RefCell<Vec<String>>,
    key: String,
    storage: Box<dyn KeyValueStore>,
    sink: Option<Box<dyn EventSink>>,
    changed: Listeners<[String]>,
    used: Listeners<str>,
    revision: Cell<u64>,
}

impl InventoryStore {
    /// Open the inventory stored under the default key
    pub fn new(storage: Box<dyn KeyValueStore>) -> Self {
        Self::with_key(storage, INVENTORY_KEY)
    }

    /// Open the inventory stored under `key`
    pub fn with_key(storage: Box<dyn KeyValueStore>, key: &str) -> Self {
        let items = load_items(storage.as_ref(), key);
        log::info!("Inventory opened with {} items", items.len());
        Self {
            items: RefCell::new(items),
            key: key.to_string(),
            storage,
            sink: None,
            changed: Listeners::new(),
            used: Listeners::new(),
            revision: Cell::new(0),
        }
    }

    /// Broadcast change/use events through `sink`
    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Reload whenever another context writes our key
    pub fn attach(store: &Rc<Self>, feed: &dyn ExternalChanges) {
        let weak = Rc::downgrade(store);
        feed.watch(Box::new(move |change: &StorageChange| {
            if let Some(store) = weak.upgrade() {
                store.handle_external_change(change);
            }
        }));
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Add an item; empty names are ignored
    ///
    /// Change listeners fire even when the item was already held.
    pub fn add(&self, name: &str) {
        if name.is_empty() {
            return;
        }
        {
            let mut items = self.items.borrow_mut();
            if !items.iter().any(|i| i == name) {
                items.push(name.to_string());
            }
        }
        self.persist_and_notify();
    }

    pub fn remove(&self, name: &str) {
        self.items.borrow_mut().retain(|i| i != name);
        self.persist_and_notify();
    }

    pub fn has(&self, name: &str) -> bool {
        self.items.borrow().iter().any(|i| i == name)
    }

    /// Items in insertion order
    pub fn list(&self) -> Vec<String> {
        self.items.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.items.borrow_mut().clear();
        self.persist_and_notify();
    }

    /// Announce that a held item was used; absent items are ignored
    pub fn use_item(&self, name: &str) {
        if !self.has(name) {
            log::debug!("Ignoring use of absent item `{name}`");
            return;
        }

        self.used.emit("inventory use", name);
        self.broadcast(INVENTORY_USE_EVENT, &json!({ "item": name }));
    }

    /// Register a change listener; it runs once right away with the list
    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&[String]) -> ListenerResult + 'static,
    {
        let snapshot = self.list();
        self.changed
            .add_primed("inventory change", callback, snapshot.as_slice())
    }

    /// Alias of [`InventoryStore::on_change`]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&[String]) -> ListenerResult + 'static,
    {
        self.on_change(callback)
    }

    /// Register a use listener
    pub fn on_use<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&str) -> ListenerResult + 'static,
    {
        self.used.add(callback)
    }

    /// Replace the in-memory set with what storage holds, then notify
    pub fn reload(&self) {
        let items = load_items(self.storage.as_ref(), &self.key);
        *self.items.borrow_mut() = items;
        self.notify_change();
    }

    /// React to a write made by another context
    pub fn handle_external_change(&self, change: &StorageChange) {
        if !change.touches(&self.key) {
            return;
        }
        log::debug!("Inventory changed in another context, reloading");
        self.reload();
    }

    fn persist_and_notify(&self) {
        let snapshot = self.list();
        save_items(self.storage.as_ref(), &self.key, &snapshot);
        self.notify_with(&snapshot);
    }

    fn notify_change(&self) {
        let snapshot = self.list();
        self.notify_with(&snapshot);
    }

    fn notify_with(&self, snapshot: &[String]) {
        let revision = self.revision.get().wrapping_add(1);
        self.revision.set(revision);

        self.changed.emit("inventory change", snapshot);
        // A listener changed the set and its own notify broadcast the newer list
        if self.revision.get() != revision {
            return;
        }
        self.broadcast(INVENTORY_CHANGE_EVENT, &json!(snapshot));
    }

    fn broadcast(&self, event: &str, detail: &serde_json::Value) {
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.publish(event, detail) {
                log::debug!("Inventory broadcast dropped: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::decode_items;
    use crate::platform::{MemoryStorage, RecordingSink};

    fn open(storage: &MemoryStorage) -> InventoryStore {
        InventoryStore::new(Box::new(storage.clone()))
    }

    #[test]
    fn test_add_has_remove() {
        let inv = open(&MemoryStorage::new());
        inv.add("x");
        assert!(inv.has("x"));
        inv.remove("x");
        assert!(!inv.has("x"));
    }

    #[test]
    fn test_set_semantics() {
        let inv = open(&MemoryStorage::new());
        inv.add("key");
        inv.add("key");
        inv.add("lamp");
        assert_eq!(inv.list(), vec!["key", "lamp"]);
    }

    #[test]
    fn test_empty_name_ignored() {
        let storage = MemoryStorage::new();
        let inv = open(&storage);
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        inv.on_change(move |_| {
            c.set(c.get() + 1);
            Ok(())
        });

        inv.add("");
        assert!(inv.is_empty());
        assert_eq!(calls.get(), 1);
        assert_eq!(storage.get_raw(INVENTORY_KEY), None);
    }

    #[test]
    fn test_duplicate_add_still_notifies() {
        let inv = open(&MemoryStorage::new());
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        inv.on_change(move |_| {
            c.set(c.get() + 1);
            Ok(())
        });

        inv.add("key");
        inv.add("key");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_remove_absent_still_persists_and_notifies() {
        let storage = MemoryStorage::new();
        let inv = open(&storage);
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        inv.on_change(move |_| {
            c.set(c.get() + 1);
            Ok(())
        });

        inv.remove("ghost");
        assert_eq!(calls.get(), 2);
        assert_eq!(storage.get_raw(INVENTORY_KEY).as_deref(), Some("[]"));
    }

    #[test]
    fn test_clear_empties() {
        let inv = open(&MemoryStorage::new());
        inv.add("a");
        inv.add("b");
        inv.clear();
        assert!(inv.list().is_empty());
    }

    #[test]
    fn test_every_mutation_persists() {
        let storage = MemoryStorage::new();
        let inv = open(&storage);
        inv.add("a");
        inv.add("b");
        inv.remove("a");

        let stored = storage.get_raw(INVENTORY_KEY).unwrap();
        assert_eq!(decode_items(&stored).unwrap(), vec!["b"]);
    }

    #[test]
    fn test_use_only_fires_for_held_items() {
        let sink = RecordingSink::new();
        let inv = open(&MemoryStorage::new()).with_sink(Box::new(sink.clone()));
        let used = Rc::new(RefCell::new(Vec::new()));
        let u = Rc::clone(&used);
        inv.on_use(move |item| {
            u.borrow_mut().push(item.to_string());
            Ok(())
        });
        // on_use does not prime
        assert!(used.borrow().is_empty());

        inv.use_item("absent-item");
        assert!(used.borrow().is_empty());

        inv.add("present-item");
        inv.use_item("present-item");
        assert_eq!(*used.borrow(), vec!["present-item"]);
        assert_eq!(
            sink.payloads(INVENTORY_USE_EVENT),
            vec![json!({ "item": "present-item" })]
        );
        // Using does not consume
        assert!(inv.has("present-item"));
    }

    #[test]
    fn test_change_broadcast_carries_list() {
        let sink = RecordingSink::new();
        let inv = open(&MemoryStorage::new()).with_sink(Box::new(sink.clone()));
        inv.add("a");
        inv.add("b");
        assert_eq!(
            sink.payloads(INVENTORY_CHANGE_EVENT),
            vec![json!(["a"]), json!(["a", "b"])]
        );
    }

    #[test]
    fn test_write_failure_keeps_memory_state() {
        let storage = MemoryStorage::new();
        storage.set_fail_writes(true);
        let inv = open(&storage);
        inv.add("key");
        assert!(inv.has("key"));
        assert_eq!(storage.get_raw(INVENTORY_KEY), None);
    }

    #[test]
    fn test_malformed_storage_loads_empty() {
        let storage = MemoryStorage::new();
        storage.set_external(INVENTORY_KEY, "{not an array");
        let inv = open(&storage);
        assert!(inv.is_empty());
    }

    #[test]
    fn test_custom_key() {
        let storage = MemoryStorage::new();
        let inv = InventoryStore::with_key(Box::new(storage.clone()), "save.slot2");
        inv.add("rope");
        assert!(storage.get_raw("save.slot2").is_some());
        assert_eq!(storage.get_raw(INVENTORY_KEY), None);
        assert_eq!(inv.key(), "save.slot2");
    }

    #[test]
    fn test_listener_can_mutate_store() {
        let sink = RecordingSink::new();
        let inv = Rc::new(open(&MemoryStorage::new()).with_sink(Box::new(sink.clone())));
        let weak = Rc::downgrade(&inv);
        inv.on_change(move |items| {
            // Picking up the lantern also grants its oil
            if items.iter().any(|i| i == "lantern") && !items.iter().any(|i| i == "oil") {
                if let Some(inv) = weak.upgrade() {
                    inv.add("oil");
                }
            }
            Ok(())
        });

        inv.add("lantern");
        assert_eq!(inv.list(), vec!["lantern", "oil"]);
        // The last broadcast carries the list the store ends up holding
        assert_eq!(
            sink.payloads(INVENTORY_CHANGE_EVENT).last(),
            Some(&json!(["lantern", "oil"]))
        );
    }
}
