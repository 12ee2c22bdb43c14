//! Property tests for the meter bounds, tiers and inventory set semantics

use proptest::prelude::*;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use lucid_state::platform::{HeadlessPage, MemoryStorage};
use lucid_state::sanity::glitch_text;
use lucid_state::{InventoryStore, SanityStore, Tier};

proptest! {
    #[test]
    fn set_and_add_stay_in_bounds(
        start in -500.0f64..500.0,
        deltas in prop::collection::vec(-300.0f64..300.0, 0..20),
    ) {
        let sanity = SanityStore::with_seed(HeadlessPage::new(), 0);
        sanity.set(start);
        prop_assert!(sanity.get() <= 100);
        for delta in deltas {
            sanity.add(delta);
            prop_assert!(sanity.get() <= 100);
        }
    }

    #[test]
    fn intensity_is_monotone(a in 0u8..=100, b in 0u8..=100) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let low_tier = Tier::from_value(low);
        let high_tier = Tier::from_value(high);
        prop_assert!(low_tier.intensity() >= high_tier.intensity());
        if high >= 60 {
            prop_assert_eq!(high_tier.intensity(), 0.0);
        } else {
            prop_assert!(high_tier.intensity() > 0.0);
        }
    }

    #[test]
    fn zero_intensity_never_mutates(text in ".{0,80}", seed in any::<u64>()) {
        let mut rng = Pcg32::seed_from_u64(seed);
        prop_assert_eq!(glitch_text(&text, 0.0, &mut rng), text);
    }

    #[test]
    fn glitch_keeps_ineligible_chars(text in "[ \n\t]{0,40}", seed in any::<u64>()) {
        let mut rng = Pcg32::seed_from_u64(seed);
        let out = glitch_text(&text, 0.14, &mut rng);
        prop_assert!(out.starts_with(&text));
        prop_assert!(out.chars().count() <= text.chars().count() + 1);
    }

    #[test]
    fn inventory_matches_model_set(ops in prop::collection::vec((any::<bool>(), "[a-d]"), 0..40)) {
        let storage = MemoryStorage::new();
        let inv = InventoryStore::new(Box::new(storage.clone()));
        let mut model: Vec<String> = Vec::new();

        for (insert, name) in ops {
            if insert {
                inv.add(&name);
                if !model.contains(&name) {
                    model.push(name);
                }
            } else {
                inv.remove(&name);
                model.retain(|m| *m != name);
            }
        }
        prop_assert_eq!(inv.list(), model.clone());

        // A fresh context sees the same set
        let reopened = InventoryStore::new(Box::new(storage));
        prop_assert_eq!(reopened.list(), model);
    }
}
