//! In-memory platform backends
//!
//! Used by the native binary and the test-suite. `MemoryStorage` handles
//! share one map, and each handle acts as a separate tab: a write from one
//! handle is reported to the watchers of every other handle, like the
//! browser `storage` event.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use super::{
    EventSink, ExternalChanges, KeyValueStore, Page, PlatformError, StorageChange, TimerId,
};
use crate::consts::{BADGE_ATTRIBUTE, BADGE_CLASS};

type Watcher = Rc<RefCell<Box<dyn FnMut(&StorageChange)>>>;

/// Origin used by [`MemoryStorage::set_external`]; never handed to a tab
const EXTERNAL_ORIGIN: u32 = 0;

#[derive(Default)]
struct SharedStorage {
    entries: HashMap<String, String>,
    watchers: Vec<(u32, Watcher)>,
    next_origin: u32,
    fail_writes: bool,
}

/// Shared key-value map with per-tab handles
#[derive(Clone)]
pub struct MemoryStorage {
    shared: Rc<RefCell<SharedStorage>>,
    origin: u32,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create an empty storage area and its first tab handle
    pub fn new() -> Self {
        let shared = Rc::new(RefCell::new(SharedStorage {
            next_origin: EXTERNAL_ORIGIN + 1,
            ..Default::default()
        }));
        Self::handle(shared)
    }

    /// Another tab sharing the same storage area
    pub fn tab(&self) -> Self {
        Self::handle(Rc::clone(&self.shared))
    }

    fn handle(shared: Rc<RefCell<SharedStorage>>) -> Self {
        let origin = {
            let mut s = shared.borrow_mut();
            let origin = s.next_origin;
            s.next_origin += 1;
            origin
        };
        Self { shared, origin }
    }

    /// Make subsequent writes fail (quota exceeded, private mode, ...)
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.borrow_mut().fail_writes = fail;
    }

    /// Raw stored value
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.shared.borrow().entries.get(key).cloned()
    }

    /// Write as an outside party, notifying every tab
    pub fn set_external(&self, key: &str, value: &str) {
        self.shared
            .borrow_mut()
            .entries
            .insert(key.to_string(), value.to_string());
        self.notify_from(
            EXTERNAL_ORIGIN,
            &StorageChange {
                key: Some(key.to_string()),
            },
        );
    }

    /// Clear the whole area as an outside party
    pub fn clear_external(&self) {
        self.shared.borrow_mut().entries.clear();
        self.notify_from(EXTERNAL_ORIGIN, &StorageChange { key: None });
    }

    fn notify_from(&self, origin: u32, change: &StorageChange) {
        let watchers: Vec<Watcher> = self
            .shared
            .borrow()
            .watchers
            .iter()
            .filter(|(owner, _)| *owner != origin)
            .map(|(_, w)| Rc::clone(w))
            .collect();

        for watcher in watchers {
            match watcher.try_borrow_mut() {
                Ok(mut watcher) => (*watcher)(change),
                Err(_) => log::warn!("storage watcher re-entered, change dropped"),
            }
        }
    }
}

impl KeyValueStore for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, PlatformError> {
        Ok(self.get_raw(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PlatformError> {
        {
            let mut shared = self.shared.borrow_mut();
            if shared.fail_writes {
                return Err(PlatformError::Write {
                    key: key.to_string(),
                    reason: "quota exceeded".to_string(),
                });
            }
            shared.entries.insert(key.to_string(), value.to_string());
        }
        self.notify_from(
            self.origin,
            &StorageChange {
                key: Some(key.to_string()),
            },
        );
        Ok(())
    }
}

impl ExternalChanges for MemoryStorage {
    fn watch(&self, on_change: Box<dyn FnMut(&StorageChange)>) {
        let watcher: Watcher = Rc::new(RefCell::new(on_change));
        self.shared.borrow_mut().watchers.push((self.origin, watcher));
    }
}

/// Event sink that records every published event
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Rc<RefCell<Vec<(String, Value)>>>,
    failing: Rc<Cell<bool>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every publish while set
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.borrow().clone()
    }

    /// Payloads published under `event`, oldest first
    pub fn payloads(&self, event: &str) -> Vec<Value> {
        self.events
            .borrow()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, detail)| detail.clone())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: &str, detail: &Value) -> Result<(), PlatformError> {
        if self.failing.get() {
            return Err(PlatformError::Dispatch {
                event: event.to_string(),
                reason: "sink rejected event".to_string(),
            });
        }
        self.events
            .borrow_mut()
            .push((event.to_string(), detail.clone()));
        Ok(())
    }
}

/// Event sink that writes every event to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: &str, detail: &Value) -> Result<(), PlatformError> {
        log::info!("{event} {detail}");
        Ok(())
    }
}

/// Node handle inside a [`HeadlessPage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Default)]
struct HeadlessNode {
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<String>,
    parent: Option<NodeId>,
    text: String,
}

impl PageState {
    fn is_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.nodes.get(node.0).and_then(|n| n.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes.get(parent.0).and_then(|n| n.parent);
        }
        false
    }
}

#[derive(Debug)]
struct PendingTimer {
    id: TimerId,
    class: String,
    due_ms: u64,
}

#[derive(Debug, Default)]
struct PageState {
    nodes: Vec<HeadlessNode>,
    body_classes: Vec<String>,
    timers: Vec<PendingTimer>,
    now_ms: u64,
    next_timer: i64,
    fail_timers: bool,
}

/// Minimal document model with a manual clock
///
/// Selectors support `#id` and `.class` only.
#[derive(Clone, Default)]
pub struct HeadlessPage {
    state: Rc<RefCell<PageState>>,
}

impl HeadlessPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element under `parent` (or the document root)
    pub fn append(
        &self,
        parent: Option<NodeId>,
        id: Option<&str>,
        class: Option<&str>,
    ) -> NodeId {
        let mut state = self.state.borrow_mut();
        state.nodes.push(HeadlessNode {
            id: id.map(str::to_string),
            classes: class.map(|c| vec![c.to_string()]).unwrap_or_default(),
            attributes: Vec::new(),
            parent,
            text: String::new(),
        });
        NodeId(state.nodes.len() - 1)
    }

    /// Mark `node` with a valueless attribute
    pub fn set_attribute(&self, node: NodeId, name: &str) {
        if let Some(node) = self.state.borrow_mut().nodes.get_mut(node.0) {
            node.attributes.push(name.to_string());
        }
    }

    pub fn text(&self, node: NodeId) -> String {
        self.state
            .borrow()
            .nodes
            .get(node.0)
            .map(|n| n.text.clone())
            .unwrap_or_default()
    }

    /// Direct children of `parent` carrying `class`
    pub fn children_with_class(&self, parent: NodeId, class: &str) -> Vec<NodeId> {
        self.state
            .borrow()
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent == Some(parent) && n.classes.iter().any(|c| c == class))
            .map(|(i, _)| NodeId(i))
            .collect()
    }

    pub fn body_has_class(&self, class: &str) -> bool {
        self.state.borrow().body_classes.iter().any(|c| c == class)
    }

    /// Reject every timer while set
    pub fn set_fail_timers(&self, fail: bool) {
        self.state.borrow_mut().fail_timers = fail;
    }

    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Move the clock forward, firing every timer that comes due
    pub fn advance(&self, ms: u64) {
        let mut state = self.state.borrow_mut();
        state.now_ms += ms;
        let now = state.now_ms;

        let (due, pending): (Vec<_>, Vec<_>) =
            state.timers.drain(..).partition(|t| t.due_ms <= now);
        state.timers = pending;
        for timer in due {
            state.body_classes.retain(|c| *c != timer.class);
        }
    }
}

impl Page for HeadlessPage {
    type Element = NodeId;

    fn query(&self, selector: &str) -> Option<NodeId> {
        let state = self.state.borrow();
        let position = if let Some(id) = selector.strip_prefix('#') {
            state.nodes.iter().position(|n| n.id.as_deref() == Some(id))
        } else if let Some(class) = selector.strip_prefix('.') {
            state
                .nodes
                .iter()
                .position(|n| n.classes.iter().any(|c| c == class))
        } else {
            None
        };
        position.map(NodeId)
    }

    fn find_badge(&self, mount: &NodeId) -> Option<NodeId> {
        let state = self.state.borrow();
        state
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| {
                n.classes.iter().any(|c| c == BADGE_CLASS)
                    || n.attributes.iter().any(|a| a == BADGE_ATTRIBUTE)
            })
            .map(|(i, _)| NodeId(i))
            .find(|node| state.is_descendant(*node, *mount))
    }

    fn create_badge(&self, mount: &NodeId) -> Result<NodeId, PlatformError> {
        if mount.0 >= self.state.borrow().nodes.len() {
            return Err(PlatformError::Dom(format!("no node {}", mount.0)));
        }
        Ok(self.append(Some(*mount), None, Some(BADGE_CLASS)))
    }

    fn set_text(&self, element: &NodeId, text: &str) {
        if let Some(node) = self.state.borrow_mut().nodes.get_mut(element.0) {
            node.text = text.to_string();
        }
    }

    fn add_body_class(&self, class: &str) -> Result<(), PlatformError> {
        let mut state = self.state.borrow_mut();
        if !state.body_classes.iter().any(|c| c == class) {
            state.body_classes.push(class.to_string());
        }
        Ok(())
    }

    fn remove_body_class(&self, class: &str) -> Result<(), PlatformError> {
        self.state.borrow_mut().body_classes.retain(|c| c != class);
        Ok(())
    }

    fn schedule_class_removal(&self, class: &str, delay_ms: u32) -> Result<TimerId, PlatformError> {
        let mut state = self.state.borrow_mut();
        if state.fail_timers {
            return Err(PlatformError::Timer("timers disabled".to_string()));
        }
        state.next_timer += 1;
        let id = TimerId(state.next_timer);
        let due_ms = state.now_ms + u64::from(delay_ms);
        state.timers.push(PendingTimer {
            id,
            class: class.to_string(),
            due_ms,
        });
        Ok(id)
    }

    fn cancel_timer(&self, timer: TimerId) {
        self.state.borrow_mut().timers.retain(|t| t.id != timer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tabs_see_each_others_writes() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.tab();

        let seen_by_a = Rc::new(RefCell::new(Vec::new()));
        let seen_by_b = Rc::new(RefCell::new(Vec::new()));
        let sa = Rc::clone(&seen_by_a);
        tab_a.watch(Box::new(move |c| sa.borrow_mut().push(c.clone())));
        let sb = Rc::clone(&seen_by_b);
        tab_b.watch(Box::new(move |c| sb.borrow_mut().push(c.clone())));

        tab_a.write("k", "1").unwrap();

        assert_eq!(tab_b.read("k").unwrap().as_deref(), Some("1"));
        // Writer does not hear its own change
        assert!(seen_by_a.borrow().is_empty());
        assert_eq!(seen_by_b.borrow().len(), 1);
    }

    #[test]
    fn test_external_clear_reaches_every_tab() {
        let tab_a = MemoryStorage::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        tab_a.watch(Box::new(move |change| {
            assert!(change.key.is_none());
            c.set(c.get() + 1);
        }));

        tab_a.clear_external();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_failing_writes() {
        let storage = MemoryStorage::new();
        storage.set_fail_writes(true);
        assert!(storage.write("k", "v").is_err());
        assert_eq!(storage.get_raw("k"), None);
    }

    #[test]
    fn test_headless_timers() {
        let page = HeadlessPage::new();
        page.add_body_class("shake").unwrap();
        let timer = page.schedule_class_removal("shake", 100).unwrap();
        assert_eq!(page.pending_timers(), 1);

        page.advance(99);
        assert!(page.body_has_class("shake"));
        page.advance(1);
        assert!(!page.body_has_class("shake"));
        assert_eq!(page.pending_timers(), 0);

        // Cancelling a fired timer is harmless
        page.cancel_timer(timer);
    }

    #[test]
    fn test_headless_selectors() {
        let page = HeadlessPage::new();
        let hud = page.append(None, Some("hud"), None);
        let panel = page.append(Some(hud), None, Some("panel"));

        assert_eq!(page.query("#hud"), Some(hud));
        assert_eq!(page.query(".panel"), Some(panel));
        assert_eq!(page.query("div"), None);
    }

    #[test]
    fn test_find_badge_searches_descendants() {
        let page = HeadlessPage::new();
        let hud = page.append(None, Some("hud"), None);
        let row = page.append(Some(hud), None, Some("row"));
        let stray = page.append(None, None, Some(BADGE_CLASS));
        assert_eq!(page.find_badge(&hud), None);

        let marked = page.append(Some(row), None, None);
        page.set_attribute(marked, BADGE_ATTRIBUTE);
        assert_eq!(page.find_badge(&hud), Some(marked));
        // Badges outside the mount never match
        assert_ne!(page.find_badge(&hud), Some(stray));
    }

    #[test]
    fn test_recording_sink_failure() {
        let sink = RecordingSink::new();
        sink.set_failing(true);
        assert!(sink.publish("x", &Value::Null).is_err());
        sink.set_failing(false);
        sink.publish("x", &Value::from(1)).unwrap();
        assert_eq!(sink.payloads("x"), vec![Value::from(1)]);
    }
}
