//! JavaScript surface (wasm32)
//!
//! `Sanity` and `Inventory` classes wired to the live document, LocalStorage
//! and `CustomEvent` broadcasting. A JS callback that throws is reported as a
//! listener error and the remaining callbacks still run.

use std::rc::Rc;

use js_sys::{Array, Function, Promise, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, future_to_promise};
use web_sys::Element;

use crate::inventory::InventoryStore;
use crate::listeners::{ListenerResult, Subscription};
use crate::platform::web::{DomEvents, DomPage, LocalStorage, NoStorage, StorageEvents};
use crate::platform::KeyValueStore;
use crate::sanity::{MountTarget, SanityOptions, SanityStore};
use crate::settings::Settings;

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    let settings = Settings::load();
    if console_log::init_with_level(settings.log_level()).is_err() {
        web_sys::console::warn_1(&"lucid-state: logger already installed".into());
    }
    log::info!("Lucid state ready");
}

/// Persist a settings object (partial objects keep defaults); returns whether it was saved
#[wasm_bindgen(js_name = saveSettings)]
pub fn save_settings(settings: JsValue) -> Result<bool, JsValue> {
    let json = js_sys::JSON::stringify(&settings)?;
    Ok(Settings::from_json(&String::from(json)).save())
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn js_reason(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}

/// `Number(value)` semantics; NaN is clamped to 0 by the store
fn coerce_number(value: &JsValue) -> f64 {
    value
        .as_f64()
        .unwrap_or_else(|| js_sys::Number::new(value).value_of())
}

/// Truthy values as `String(value)`; falsy values are `None`
fn coerce_name(value: &JsValue) -> Option<String> {
    if !value.is_truthy() {
        return None;
    }
    value
        .as_string()
        .or_else(|| value.as_f64().map(|n| n.to_string()))
        .or_else(|| value.as_bool().map(|b| b.to_string()))
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Object>()
                .map(|object| String::from(object.to_string()))
        })
}

fn call_js(callback: &Function, arg: &JsValue) -> ListenerResult {
    callback
        .call1(&JsValue::NULL, arg)
        .map(|_| ())
        .map_err(|err| js_reason(&err).into())
}

/// JS function that detaches `subscription` the first time it is called
fn unsubscribe_fn(subscription: Subscription) -> Function {
    let mut subscription = Some(subscription);
    Closure::<dyn FnMut()>::new(move || {
        if let Some(subscription) = subscription.take() {
            subscription.unsubscribe();
        }
    })
    .into_js_value()
    .unchecked_into()
}

fn items_array(items: &[String]) -> Array {
    items.iter().map(|item| JsValue::from_str(item)).collect()
}

/// Sanity meter exposed to JavaScript
#[wasm_bindgen]
pub struct Sanity {
    store: Rc<SanityStore<DomPage>>,
}

#[wasm_bindgen]
impl Sanity {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<Sanity, JsValue> {
        let settings = Settings::load();
        let page = DomPage::new().map_err(js_error)?;
        let store = SanityStore::new(page)
            .with_sink(Box::new(DomEvents))
            .with_effect_duration(settings.effect_duration_ms)
            .with_defaults(settings.sanity_options());
        Ok(Sanity {
            store: Rc::new(store),
        })
    }

    /// `init({ start?, mount? })`; `mount` is a selector or an element
    pub fn init(&self, options: JsValue) {
        let mut parsed: SanityOptions<Element> = SanityOptions::default();
        if options.is_object() {
            if let Ok(start) = Reflect::get(&options, &"start".into()) {
                if !start.is_undefined() && !start.is_null() {
                    parsed.start = Some(coerce_number(&start));
                }
            }
            if let Ok(mount) = Reflect::get(&options, &"mount".into()) {
                if let Some(selector) = mount.as_string() {
                    parsed.mount = Some(MountTarget::Selector(selector));
                } else if let Ok(element) = mount.dyn_into::<Element>() {
                    parsed.mount = Some(MountTarget::Element(element));
                }
            }
        }
        self.store.init(parsed);
    }

    pub fn get(&self) -> u8 {
        self.store.get()
    }

    pub fn set(&self, value: JsValue) {
        self.store.set(coerce_number(&value));
    }

    pub fn add(&self, delta: JsValue) {
        self.store.add(coerce_number(&delta));
    }

    pub fn change(&self, delta: JsValue) {
        self.store.change(coerce_number(&delta));
    }

    /// Tier name (`lucid` .. `broken`)
    pub fn tier(&self) -> String {
        self.store.tier().as_str().to_string()
    }

    pub fn subscribe(&self, callback: Function) -> Function {
        let subscription = self
            .store
            .subscribe(move |value| call_js(&callback, &JsValue::from(*value)));
        unsubscribe_fn(subscription)
    }

    #[wasm_bindgen(js_name = onChange)]
    pub fn on_change(&self, callback: Function) -> Function {
        self.subscribe(callback)
    }

    #[wasm_bindgen(js_name = addEventListener)]
    pub fn add_event_listener(&self, kind: String, callback: Function) -> Function {
        let subscription = self
            .store
            .add_event_listener(&kind, move |value| call_js(&callback, &JsValue::from(*value)));
        unsubscribe_fn(subscription)
    }

    pub fn effect(&self, name: String, ms: Option<u32>) {
        self.store.effect(&name, ms);
    }

    /// Wrap `render(text)` so its input is corrupted by the current tier
    ///
    /// The returned function always yields a `Promise`.
    #[wasm_bindgen(js_name = wrapTypeText)]
    pub fn wrap_type_text(&self, render: Function) -> Function {
        let wrapper = Rc::new(self.store.wrap_type_text(move |text: String| {
            let result = render.call1(&JsValue::NULL, &JsValue::from_str(&text));
            async move {
                let value = result?;
                JsFuture::from(Promise::resolve(&value)).await
            }
        }));

        Closure::<dyn FnMut(String) -> Promise>::new(move |text: String| {
            let wrapper = Rc::clone(&wrapper);
            future_to_promise(async move { wrapper.call(&text).await })
        })
        .into_js_value()
        .unchecked_into()
    }
}

/// Inventory exposed to JavaScript
#[wasm_bindgen]
pub struct Inventory {
    store: Rc<InventoryStore>,
}

#[wasm_bindgen]
impl Inventory {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Inventory {
        let settings = Settings::load();
        let storage: Box<dyn KeyValueStore> = match LocalStorage::open() {
            Some(storage) => Box::new(storage),
            None => {
                log::warn!("LocalStorage unavailable, inventory will not persist");
                Box::new(NoStorage)
            }
        };

        let store = Rc::new(
            InventoryStore::with_key(storage, &settings.inventory_key)
                .with_sink(Box::new(DomEvents)),
        );
        InventoryStore::attach(&store, &StorageEvents);
        Inventory { store }
    }

    pub fn add(&self, name: JsValue) {
        if let Some(name) = coerce_name(&name) {
            self.store.add(&name);
        }
    }

    pub fn remove(&self, name: JsValue) {
        let name = coerce_name(&name).unwrap_or_default();
        self.store.remove(&name);
    }

    pub fn has(&self, name: JsValue) -> bool {
        coerce_name(&name).is_some_and(|name| self.store.has(&name))
    }

    pub fn list(&self) -> Array {
        items_array(&self.store.list())
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    #[wasm_bindgen(js_name = "use")]
    pub fn use_item(&self, name: JsValue) {
        if let Some(name) = coerce_name(&name) {
            self.store.use_item(&name);
        }
    }

    #[wasm_bindgen(js_name = onChange)]
    pub fn on_change(&self, callback: Function) -> Function {
        let subscription = self
            .store
            .on_change(move |items| call_js(&callback, &items_array(items)));
        unsubscribe_fn(subscription)
    }

    #[wasm_bindgen(js_name = onUse)]
    pub fn on_use(&self, callback: Function) -> Function {
        let subscription = self
            .store
            .on_use(move |item| call_js(&callback, &JsValue::from_str(item)));
        unsubscribe_fn(subscription)
    }

    pub fn subscribe(&self, callback: Function) -> Function {
        self.on_change(callback)
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}
