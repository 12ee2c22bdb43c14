//! Lucid State - client-side state for a browser narrative game
//!
//! Core modules:
//! - `sanity`: Bounded sanity meter, badge mirroring, body effects, glitch text
//! - `inventory`: Item set persisted to storage and synced across tabs
//! - `listeners`: Callback fan-out with isolated failures
//! - `platform`: Storage/event/document capabilities (headless and browser)
//! - `persistence`: Stored item list format
//! - `settings`: Store configuration

pub mod inventory;
pub mod listeners;
pub mod persistence;
pub mod platform;
pub mod sanity;
pub mod settings;

#[cfg(target_arch = "wasm32")]
pub mod bindings;

pub use inventory::InventoryStore;
pub use listeners::{ListenerError, ListenerResult, Listeners, Subscription};
pub use sanity::{MountTarget, SanityLevel, SanityOptions, SanityStore, Tier, TypeTextWrapper};
pub use settings::Settings;

/// Store configuration constants
pub mod consts {
    /// Sanity bounds
    pub const SANITY_MIN: u8 = 0;
    pub const SANITY_MAX: u8 = 100;
    /// Value a fresh store starts with
    pub const SANITY_DEFAULT: u8 = 100;

    /// Default lifetime of a body effect class (ms)
    pub const EFFECT_DURATION_MS: u32 = 450;

    /// Class marking the sanity badge element
    pub const BADGE_CLASS: &str = "sanity-badge";
    /// Marks a page-provided element as the badge
    pub const BADGE_ATTRIBUTE: &str = "data-sanity-badge";

    /// Storage key holding the inventory JSON array
    pub const INVENTORY_KEY: &str = "lucid.inventory";

    /// Host-level broadcast event names
    pub const SANITY_CHANGE_EVENT: &str = "sanity:change";
    pub const INVENTORY_CHANGE_EVENT: &str = "inventory:change";
    pub const INVENTORY_USE_EVENT: &str = "inventory:use";
}

/// Coerce a raw number to a sanity value
///
/// NaN becomes 0, everything else is rounded and clamped to the meter bounds.
#[inline]
pub fn clamp_sanity(raw: f64) -> u8 {
    use consts::{SANITY_MAX, SANITY_MIN};
    if raw.is_nan() {
        return SANITY_MIN;
    }
    raw.round()
        .clamp(f64::from(SANITY_MIN), f64::from(SANITY_MAX)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_sanity() {
        assert_eq!(clamp_sanity(50.0), 50);
        assert_eq!(clamp_sanity(-20.0), 0);
        assert_eq!(clamp_sanity(1000.0), 100);
        assert_eq!(clamp_sanity(f64::NAN), 0);
        assert_eq!(clamp_sanity(f64::INFINITY), 100);
        assert_eq!(clamp_sanity(f64::NEG_INFINITY), 0);
        assert_eq!(clamp_sanity(49.6), 50);
    }
}
