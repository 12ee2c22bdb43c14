//! Browser backends (wasm32)
//!
//! - `LocalStorage`: `window.localStorage`
//! - `StorageEvents`: the `storage` event other tabs trigger
//! - `DomEvents`: `CustomEvent`s dispatched on `window`
//! - `DomPage`: `document`, body classes and `setTimeout`

use serde_json::Value;
use wasm_bindgen::prelude::*;
use web_sys::{CustomEvent, CustomEventInit, Document, Element, StorageEvent, Window};

use super::{
    EventSink, ExternalChanges, KeyValueStore, Page, PlatformError, StorageChange, TimerId,
};
use crate::consts::{BADGE_ATTRIBUTE, BADGE_CLASS};

fn js_reason(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}

fn window() -> Result<Window, PlatformError> {
    web_sys::window().ok_or_else(|| PlatformError::Dom("no window".to_string()))
}

/// `window.localStorage`
#[derive(Clone)]
pub struct LocalStorage {
    storage: web_sys::Storage,
}

impl LocalStorage {
    /// `None` when storage is disabled (private mode, sandboxed iframe)
    pub fn open() -> Option<Self> {
        let storage = web_sys::window()?.local_storage().ok()??;
        Some(Self { storage })
    }
}

impl KeyValueStore for LocalStorage {
    fn read(&self, key: &str) -> Result<Option<String>, PlatformError> {
        self.storage.get_item(key).map_err(|e| PlatformError::Read {
            key: key.to_string(),
            reason: js_reason(&e),
        })
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PlatformError> {
        self.storage
            .set_item(key, value)
            .map_err(|e| PlatformError::Write {
                key: key.to_string(),
                reason: js_reason(&e),
            })
    }
}

/// Storage stand-in used when LocalStorage is unavailable
pub struct NoStorage;

impl KeyValueStore for NoStorage {
    fn read(&self, _key: &str) -> Result<Option<String>, PlatformError> {
        Err(PlatformError::StorageUnavailable)
    }

    fn write(&self, _key: &str, _value: &str) -> Result<(), PlatformError> {
        Err(PlatformError::StorageUnavailable)
    }
}

/// Listens for `storage` events on `window`
///
/// Browsers only fire these for writes made by other documents.
pub struct StorageEvents;

impl ExternalChanges for StorageEvents {
    fn watch(&self, mut on_change: Box<dyn FnMut(&StorageChange)>) {
        let Some(window) = web_sys::window() else {
            log::warn!("No window, cross-tab sync disabled");
            return;
        };

        let closure = Closure::<dyn FnMut(_)>::new(move |event: StorageEvent| {
            on_change(&StorageChange { key: event.key() });
        });
        if let Err(err) =
            window.add_event_listener_with_callback("storage", closure.as_ref().unchecked_ref())
        {
            log::warn!("Cross-tab sync disabled: {}", js_reason(&err));
        }
        // Lives for the page lifetime
        closure.forget();
    }
}

/// Dispatches `CustomEvent`s on `window`
pub struct DomEvents;

impl EventSink for DomEvents {
    fn publish(&self, event: &str, detail: &Value) -> Result<(), PlatformError> {
        let dispatch_err = |reason: String| PlatformError::Dispatch {
            event: event.to_string(),
            reason,
        };

        let detail = js_sys::JSON::parse(&detail.to_string())
            .map_err(|e| dispatch_err(js_reason(&e)))?;
        let init = CustomEventInit::new();
        init.set_detail(&detail);
        let custom = CustomEvent::new_with_event_init_dict(event, &init)
            .map_err(|e| dispatch_err(js_reason(&e)))?;

        window()?
            .dispatch_event(&custom)
            .map(|_| ())
            .map_err(|e| dispatch_err(js_reason(&e)))
    }
}

/// The live document
#[derive(Clone)]
pub struct DomPage {
    window: Window,
    document: Document,
}

impl DomPage {
    pub fn new() -> Result<Self, PlatformError> {
        let window = window()?;
        let document = window
            .document()
            .ok_or_else(|| PlatformError::Dom("no document".to_string()))?;
        Ok(Self { window, document })
    }

    fn body_classes(&self) -> Result<web_sys::DomTokenList, PlatformError> {
        self.document
            .body()
            .map(|body| body.class_list())
            .ok_or_else(|| PlatformError::Dom("no body".to_string()))
    }
}

impl Page for DomPage {
    type Element = Element;

    fn query(&self, selector: &str) -> Option<Element> {
        self.document.query_selector(selector).ok().flatten()
    }

    fn find_badge(&self, mount: &Element) -> Option<Element> {
        mount
            .query_selector(&format!(".{BADGE_CLASS}, [{BADGE_ATTRIBUTE}]"))
            .ok()
            .flatten()
    }

    fn create_badge(&self, mount: &Element) -> Result<Element, PlatformError> {
        let badge = self
            .document
            .create_element("span")
            .map_err(|e| PlatformError::Dom(js_reason(&e)))?;
        badge.set_class_name(BADGE_CLASS);
        let _ = badge.set_attribute("aria-live", "polite");
        mount
            .append_child(&badge)
            .map_err(|e| PlatformError::Dom(js_reason(&e)))?;
        Ok(badge)
    }

    fn set_text(&self, element: &Element, text: &str) {
        element.set_text_content(Some(text));
    }

    fn add_body_class(&self, class: &str) -> Result<(), PlatformError> {
        self.body_classes()?
            .add_1(class)
            .map_err(|e| PlatformError::Dom(js_reason(&e)))
    }

    fn remove_body_class(&self, class: &str) -> Result<(), PlatformError> {
        self.body_classes()?
            .remove_1(class)
            .map_err(|e| PlatformError::Dom(js_reason(&e)))
    }

    fn schedule_class_removal(&self, class: &str, delay_ms: u32) -> Result<TimerId, PlatformError> {
        let page = self.clone();
        let class = class.to_string();
        let callback = Closure::once_into_js(move || {
            let _ = page.remove_body_class(&class);
        });

        let delay = i32::try_from(delay_ms).unwrap_or(i32::MAX);
        self.window
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                callback.unchecked_ref(),
                delay,
            )
            .map(|handle| TimerId(i64::from(handle)))
            .map_err(|e| PlatformError::Timer(js_reason(&e)))
    }

    fn cancel_timer(&self, timer: TimerId) {
        if let Ok(handle) = i32::try_from(timer.0) {
            self.window.clear_timeout_with_handle(handle);
        }
    }
}
