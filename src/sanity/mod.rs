//! Sanity meter
//!
//! A bounded value in [0, 100] with subscribers, an optional badge element
//! mirroring it as `value/100`, body-class effects and a text wrapper whose
//! corruption grows as the value drops.
//!
//! Every operation takes `&self` and no interior borrow is held while
//! callbacks run, so subscribers may read or change the meter themselves.

pub mod glitch;

use std::cell::{Cell, RefCell};
use std::future::Future;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde_json::json;

use crate::clamp_sanity;
use crate::consts::{EFFECT_DURATION_MS, SANITY_CHANGE_EVENT, SANITY_DEFAULT, SANITY_MAX};
use crate::listeners::{ListenerResult, Listeners, Subscription};
use crate::platform::{EventSink, Page, TimerId};

pub use glitch::{SanityLevel, Tier, TypeTextWrapper, glitch_text};

/// Where the badge should live
#[derive(Debug, Clone, PartialEq)]
pub enum MountTarget<E> {
    /// Resolved with `Page::query`
    Selector(String),
    /// An element the caller already holds
    Element(E),
}

/// Options accepted by [`SanityStore::init`]
///
/// Absent fields keep whatever an earlier `init` configured.
#[derive(Debug, Clone)]
pub struct SanityOptions<E> {
    pub start: Option<f64>,
    pub mount: Option<MountTarget<E>>,
}

impl<E> Default for SanityOptions<E> {
    fn default() -> Self {
        Self {
            start: None,
            mount: None,
        }
    }
}

impl<E> SanityOptions<E> {
    pub fn start(value: f64) -> Self {
        Self {
            start: Some(value),
            mount: None,
        }
    }

    pub fn with_mount(mut self, mount: MountTarget<E>) -> Self {
        self.mount = Some(mount);
        self
    }
}

/// Merged configuration from all `init` calls
#[derive(Debug, Clone)]
struct SanityConfig<E> {
    start: f64,
    mount: Option<MountTarget<E>>,
}

#[derive(Debug)]
struct PendingEffect {
    class: String,
    timer: TimerId,
}

/// The sanity meter
pub struct SanityStore<P: Page> {
    level: SanityLevel,
    config: RefCell<SanityConfig<P::Element>>,
    subscribers: Listeners<u8>,
    revision: Cell<u64>,
    badge: RefCell<Option<P::Element>>,
    effect: RefCell<Option<PendingEffect>>,
    effect_duration_ms: u32,
    rng: RefCell<Pcg32>,
    page: P,
    sink: Option<Box<dyn EventSink>>,
}

impl<P: Page> SanityStore<P> {
    /// Create a store at full sanity, seeded from system entropy
    pub fn new(page: P) -> Self {
        Self::with_seed(page, rand::rng().random())
    }

    /// Create a store whose glitch wrappers are reproducible
    pub fn with_seed(page: P, seed: u64) -> Self {
        Self {
            level: SanityLevel::new(SANITY_DEFAULT),
            config: RefCell::new(SanityConfig {
                start: f64::from(SANITY_DEFAULT),
                mount: None,
            }),
            subscribers: Listeners::new(),
            revision: Cell::new(0),
            badge: RefCell::new(None),
            effect: RefCell::new(None),
            effect_duration_ms: EFFECT_DURATION_MS,
            rng: RefCell::new(Pcg32::seed_from_u64(seed)),
            page,
            sink: None,
        }
    }

    /// Broadcast `sanity:change` through `sink`
    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Default duration for [`SanityStore::effect`]
    pub fn with_effect_duration(mut self, duration_ms: u32) -> Self {
        self.effect_duration_ms = duration_ms;
        self
    }

    /// Seed the configuration `init` merges into, without touching the value
    pub fn with_defaults(mut self, options: SanityOptions<P::Element>) -> Self {
        let config = self.config.get_mut();
        if let Some(start) = options.start {
            config.start = start;
        }
        if options.mount.is_some() {
            config.mount = options.mount;
        }
        self
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// Shared read-only handle to the current value
    pub fn level(&self) -> SanityLevel {
        self.level.clone()
    }

    /// Merge options, reset to the configured start, bind the badge, notify
    pub fn init(&self, options: SanityOptions<P::Element>) {
        let (start, mount) = {
            let mut config = self.config.borrow_mut();
            if let Some(start) = options.start {
                config.start = start;
            }
            if let Some(mount) = options.mount {
                config.mount = Some(mount);
            }
            (config.start, config.mount.clone())
        };

        self.level.replace(clamp_sanity(start));

        if let Some(mount) = mount {
            self.bind_badge(&mount);
        }

        log::info!("Sanity initialized at {}", self.get());
        self.notify();
    }

    fn bind_badge(&self, mount: &MountTarget<P::Element>) {
        let element = match mount {
            MountTarget::Selector(selector) => match self.page.query(selector) {
                Some(element) => element,
                None => {
                    log::warn!("Sanity badge mount `{selector}` not found");
                    return;
                }
            },
            MountTarget::Element(element) => element.clone(),
        };

        let badge = match self.page.find_badge(&element) {
            Some(existing) => existing,
            None => match self.page.create_badge(&element) {
                Ok(created) => created,
                Err(err) => {
                    log::warn!("Sanity badge could not be created: {err}");
                    return;
                }
            },
        };
        *self.badge.borrow_mut() = Some(badge);
    }

    /// Current clamped value
    pub fn get(&self) -> u8 {
        self.level.get()
    }

    pub fn tier(&self) -> Tier {
        self.level.tier()
    }

    /// Set the value; NaN counts as 0 and the result is clamped
    pub fn set(&self, value: f64) {
        let next = clamp_sanity(value);
        if self.level.replace(next) == next {
            return;
        }
        self.notify();
    }

    /// Move the value by `delta`
    pub fn add(&self, delta: f64) {
        let delta = if delta.is_nan() { 0.0 } else { delta };
        self.set(f64::from(self.get()) + delta);
    }

    /// Alias of [`SanityStore::add`]
    pub fn change(&self, delta: f64) {
        self.add(delta);
    }

    /// Register a callback; it runs once right away with the current value
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&u8) -> ListenerResult + 'static,
    {
        self.subscribers
            .add_primed("sanity", callback, &self.get())
    }

    /// Alias of [`SanityStore::subscribe`]
    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&u8) -> ListenerResult + 'static,
    {
        self.subscribe(callback)
    }

    /// DOM-style registration; only `"change"` is supported
    pub fn add_event_listener<F>(&self, kind: &str, callback: F) -> Subscription
    where
        F: FnMut(&u8) -> ListenerResult + 'static,
    {
        if kind != "change" {
            log::debug!("Sanity has no `{kind}` event");
            return Subscription::noop();
        }
        self.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Add body class `name` for `duration_ms` (store default when `None`)
    ///
    /// Supersedes any effect still pending.
    pub fn effect(&self, name: &str, duration_ms: Option<u32>) {
        if name.is_empty() {
            return;
        }
        let duration_ms = duration_ms.unwrap_or(self.effect_duration_ms);

        let previous = self.effect.borrow_mut().take();
        if let Some(previous) = previous {
            self.page.cancel_timer(previous.timer);
            if previous.class != name {
                if let Err(err) = self.page.remove_body_class(&previous.class) {
                    log::debug!("Could not clear effect `{}`: {err}", previous.class);
                }
            }
        }

        if let Err(err) = self.page.add_body_class(name) {
            log::warn!("Effect `{name}` not applied: {err}");
            return;
        }

        match self.page.schedule_class_removal(name, duration_ms) {
            Ok(timer) => {
                *self.effect.borrow_mut() = Some(PendingEffect {
                    class: name.to_string(),
                    timer,
                });
            }
            Err(err) => {
                log::warn!("Effect `{name}` timer failed, removing now: {err}");
                if let Err(err) = self.page.remove_body_class(name) {
                    log::debug!("Could not clear effect `{name}`: {err}");
                }
            }
        }
    }

    /// Wrap an async render function with sanity-driven corruption
    pub fn wrap_type_text<F, Fut>(&self, render: F) -> TypeTextWrapper<F>
    where
        F: Fn(String) -> Fut,
        Fut: Future,
    {
        let seed = self.rng.borrow_mut().random();
        TypeTextWrapper::new(self.level.clone(), seed, render)
    }

    fn notify(&self) {
        let revision = self.revision.get().wrapping_add(1);
        self.revision.set(revision);
        let value = self.get();

        let failed = self.subscribers.emit("sanity", &value);
        if failed > 0 {
            log::debug!("{failed} sanity subscriber(s) failed");
        }

        // A subscriber moved the meter; the nested notify already published it
        if self.revision.get() != revision {
            return;
        }

        if let Some(sink) = &self.sink {
            if let Err(err) = sink.publish(SANITY_CHANGE_EVENT, &json!(value)) {
                log::debug!("Sanity broadcast dropped: {err}");
            }
        }

        let badge = self.badge.borrow().clone();
        if let Some(badge) = badge {
            self.page
                .set_text(&badge, &format!("{value}/{SANITY_MAX}"));
        }
    }
}
