//! Lucid State native runner
//!
//! The browser build is driven from JavaScript through the exported `Sanity`
//! and `Inventory` classes. Natively this plays a short scripted scene against
//! the headless backends, including a second "tab" sharing storage, which is
//! handy for eyeballing the logs.

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use std::rc::Rc;

    use lucid_state::platform::{HeadlessPage, LogSink, MemoryStorage};
    use lucid_state::{InventoryStore, MountTarget, SanityOptions, SanityStore, Settings};

    let settings = Settings::load();
    env_logger::Builder::new()
        .filter_level(settings.log_level().to_level_filter())
        .parse_default_env()
        .init();

    log::info!("Lucid State (native) starting...");

    // Sanity
    let page = HeadlessPage::new();
    let hud = page.append(None, Some("hud"), None);
    let sanity = SanityStore::new(page)
        .with_sink(Box::new(LogSink))
        .with_effect_duration(settings.effect_duration_ms)
        .with_defaults(settings.sanity_options());
    sanity.init(SanityOptions::default().with_mount(MountTarget::Element(hud)));

    sanity.subscribe(|value| {
        log::info!("sanity -> {value}");
        Ok(())
    });

    let narrate = sanity.wrap_type_text(|line: String| async move { line });
    for delta in [-15.0, -25.0, -30.0, -20.0] {
        sanity.add(delta);
        sanity.effect("sanity-hit", None);
        let line = pollster::block_on(narrate.call("The corridor folds back on itself."));
        log::info!("[{}] {line}", sanity.tier().as_str());
    }

    // Inventory, two tabs over one storage area
    let storage = MemoryStorage::new();
    let tab_a = Rc::new(
        InventoryStore::with_key(Box::new(storage.clone()), &settings.inventory_key)
            .with_sink(Box::new(LogSink)),
    );
    let other_tab = storage.tab();
    let tab_b = Rc::new(InventoryStore::with_key(
        Box::new(other_tab.clone()),
        &settings.inventory_key,
    ));
    InventoryStore::attach(&tab_a, &storage);
    InventoryStore::attach(&tab_b, &other_tab);

    tab_b.on_change(|items| {
        log::info!("tab B sees {items:?}");
        Ok(())
    });
    tab_a.on_use(|item| {
        log::info!("used {item}");
        Ok(())
    });

    tab_a.add("brass key");
    tab_a.add("lantern");
    tab_a.use_item("brass key");
    tab_a.use_item("rope");

    log::info!("Done: tab A {:?}, tab B {:?}", tab_a.list(), tab_b.list());
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // Entry point is `bindings::start`, run by wasm-bindgen on load
}
