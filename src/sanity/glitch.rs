//! Sanity tiers and text corruption
//!
//! The tier is a step function of the sanity value; its intensity is the
//! per-character probability of a distortion.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Punctuation eligible for corruption (letters and digits always are)
pub const GLITCH_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"', '-'];

/// Block glyphs used by the replacement distortion
pub const GLITCH_GLYPHS: [char; 2] = ['▒', '█'];

const MIDDLE_DOT: char = '·';
const TILDE: char = '~';
const THIN_SPACE: char = '\u{2009}';
const ZERO_WIDTH_JOINER: char = '\u{200D}';

/// Severity band derived from the sanity value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// 80 and above
    Lucid,
    /// 60-79
    Uneasy,
    /// 40-59
    Shaken,
    /// 20-39
    Fraying,
    /// Below 20
    Broken,
}

impl Tier {
    pub fn from_value(value: u8) -> Self {
        match value {
            80.. => Tier::Lucid,
            60..=79 => Tier::Uneasy,
            40..=59 => Tier::Shaken,
            20..=39 => Tier::Fraying,
            _ => Tier::Broken,
        }
    }

    /// Probability that an eligible character is distorted
    pub fn intensity(&self) -> f64 {
        match self {
            Tier::Lucid | Tier::Uneasy => 0.0,
            Tier::Shaken => 0.03,
            Tier::Fraying => 0.08,
            Tier::Broken => 0.14,
        }
    }

    /// 1-based tier number
    pub fn index(&self) -> u8 {
        match self {
            Tier::Lucid => 1,
            Tier::Uneasy => 2,
            Tier::Shaken => 3,
            Tier::Fraying => 4,
            Tier::Broken => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Lucid => "lucid",
            Tier::Uneasy => "uneasy",
            Tier::Shaken => "shaken",
            Tier::Fraying => "fraying",
            Tier::Broken => "broken",
        }
    }
}

/// Read-only view of a store's current value
///
/// Cloned into wrappers so they follow the meter without holding the store.
#[derive(Debug, Clone)]
pub struct SanityLevel(Rc<Cell<u8>>);

impl SanityLevel {
    pub(crate) fn new(value: u8) -> Self {
        Self(Rc::new(Cell::new(value)))
    }

    pub(crate) fn replace(&self, value: u8) -> u8 {
        self.0.replace(value)
    }

    pub fn get(&self) -> u8 {
        self.0.get()
    }

    pub fn tier(&self) -> Tier {
        Tier::from_value(self.get())
    }
}

/// Whether `c` can be distorted
pub fn is_glitchable(c: char) -> bool {
    c.is_alphanumeric() || GLITCH_PUNCTUATION.contains(&c)
}

/// Corrupt `text` at the given intensity
pub fn glitch_text<R: Rng + ?Sized>(text: &str, intensity: f64, rng: &mut R) -> String {
    if intensity <= 0.0 {
        return text.to_string();
    }
    let intensity = intensity.min(1.0);

    let mut out = String::with_capacity(text.len() + text.len() / 4);
    for c in text.chars() {
        if !is_glitchable(c) || !rng.random_bool(intensity) {
            out.push(c);
            continue;
        }
        match rng.random_range(0..5) {
            0 => {
                out.push(c);
                out.push(c);
            }
            1 => out.push(GLITCH_GLYPHS[rng.random_range(0..GLITCH_GLYPHS.len())]),
            2 => out.push(MIDDLE_DOT),
            3 => out.push(TILDE),
            _ => {
                out.push(c);
                out.push(THIN_SPACE);
            }
        }
    }

    if rng.random_bool(intensity / 2.0) {
        out.push(ZERO_WIDTH_JOINER);
    }
    out
}

/// Async render function wrapped with sanity-driven corruption
///
/// Created by `SanityStore::wrap_type_text`. The intensity is read at call
/// time, so one wrapper tracks the meter for its whole life.
pub struct TypeTextWrapper<F> {
    level: SanityLevel,
    rng: RefCell<Pcg32>,
    render: F,
}

impl<F, Fut> TypeTextWrapper<F>
where
    F: Fn(String) -> Fut,
    Fut: Future,
{
    pub(crate) fn new(level: SanityLevel, seed: u64, render: F) -> Self {
        Self {
            level,
            rng: RefCell::new(Pcg32::seed_from_u64(seed)),
            render,
        }
    }

    /// Corrupt `text` for the current tier without rendering it
    pub fn mutate(&self, text: &str) -> String {
        let intensity = self.level.tier().intensity();
        glitch_text(text, intensity, &mut *self.rng.borrow_mut())
    }

    /// Corrupt `text` and forward it to the wrapped render function
    pub async fn call(&self, text: &str) -> Fut::Output {
        let mutated = self.mutate(text);
        (self.render)(mutated).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(Tier::from_value(100), Tier::Lucid);
        assert_eq!(Tier::from_value(80), Tier::Lucid);
        assert_eq!(Tier::from_value(79), Tier::Uneasy);
        assert_eq!(Tier::from_value(60), Tier::Uneasy);
        assert_eq!(Tier::from_value(59), Tier::Shaken);
        assert_eq!(Tier::from_value(40), Tier::Shaken);
        assert_eq!(Tier::from_value(39), Tier::Fraying);
        assert_eq!(Tier::from_value(20), Tier::Fraying);
        assert_eq!(Tier::from_value(19), Tier::Broken);
        assert_eq!(Tier::from_value(0), Tier::Broken);
    }

    #[test]
    fn test_intensity_steps() {
        let values: Vec<f64> = [100u8, 70, 50, 30, 10]
            .iter()
            .map(|v| Tier::from_value(*v).intensity())
            .collect();
        assert_eq!(values, vec![0.0, 0.0, 0.03, 0.08, 0.14]);
    }

    #[test]
    fn test_zero_intensity_is_identity() {
        let mut rng = Pcg32::seed_from_u64(1);
        let text = "The door was never locked.";
        assert_eq!(glitch_text(text, 0.0, &mut rng), text);
    }

    #[test]
    fn test_full_intensity_touches_every_eligible_char() {
        let mut rng = Pcg32::seed_from_u64(7);
        let out = glitch_text("abc", 1.0, &mut rng);
        // Every letter was distorted, so none survives as a lone original
        assert_ne!(out, "abc");
        assert!(out.chars().count() >= 3);
    }

    #[test]
    fn test_ineligible_chars_survive() {
        let mut rng = Pcg32::seed_from_u64(3);
        let text = "   \n\t   ";
        let out = glitch_text(text, 1.0, &mut rng);
        assert!(out.starts_with(text));
        // Only a trailing joiner may be added
        assert!(out.len() == text.len() || out.ends_with(ZERO_WIDTH_JOINER));
    }

    #[test]
    fn test_same_seed_same_glitch() {
        let text = "I remember the lighthouse.";
        let a = glitch_text(text, 0.14, &mut Pcg32::seed_from_u64(99));
        let b = glitch_text(text, 0.14, &mut Pcg32::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn test_wrapper_follows_level() {
        let level = SanityLevel::new(100);
        let wrapper = TypeTextWrapper::new(level.clone(), 5, |s: String| async move { s });

        let text = "whispers in the walls, again and again and again";
        assert_eq!(pollster::block_on(wrapper.call(text)), text);

        level.replace(0);
        let mut changed = false;
        for _ in 0..20 {
            if wrapper.mutate(text) != text {
                changed = true;
                break;
            }
        }
        assert!(changed);
    }
}
