//! Text formatting used when names and text values are compared in memory.
//!
//! The SQL backend never goes through a [`Formatter`]: server-side filtering
//! only supports exact matches.

use std::borrow::Cow;

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::store::Behavior;

pub trait Formatter {
    fn format<'a>(&self, raw: &'a str) -> Cow<'a, str>;
}

/// Two strings are equal when their formatted forms are.
pub fn are_equal(formatter: &dyn Formatter, a: &str, b: &str) -> bool {
    formatter.format(a) == formatter.format(b)
}

/// Leaves text untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl Formatter for Verbatim {
    fn format<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(raw)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Normalizer {
    pub ignore_case: bool,
    pub ignore_diacritics: bool,
}

impl Normalizer {
    pub fn new(ignore_case: bool, ignore_diacritics: bool) -> Self {
        Self {
            ignore_case,
            ignore_diacritics,
        }
    }
}

impl From<&Behavior> for Normalizer {
    fn from(behavior: &Behavior) -> Self {
        Self::new(behavior.ignore_case, behavior.ignore_diacritics)
    }
}

impl Formatter for Normalizer {
    fn format<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        let mut text = Cow::Borrowed(raw);
        if self.ignore_diacritics && !text.is_ascii() {
            text = Cow::Owned(text.nfd().filter(|c| !is_combining_mark(*c)).nfc().collect());
        }
        if self.ignore_case && text.chars().any(char::is_uppercase) {
            text = Cow::Owned(text.to_lowercase());
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbatim_is_exact() {
        assert!(are_equal(&Verbatim, "Ação", "Ação"));
        assert!(!are_equal(&Verbatim, "Ação", "acao"));
    }

    #[test]
    fn case_folding_only() {
        let normalizer = Normalizer::new(true, false);
        assert!(are_equal(&normalizer, "GUARDA", "guarda"));
        assert!(!are_equal(&normalizer, "Ação", "acao"));
        assert!(matches!(normalizer.format("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn diacritics_only() {
        let normalizer = Normalizer::new(false, true);
        assert_eq!(normalizer.format("São Paulo"), "Sao Paulo");
        assert!(are_equal(&normalizer, "coração", "coracao"));
        assert!(!are_equal(&normalizer, "Coração", "coracao"));
    }

    #[test]
    fn both_flags() {
        let normalizer = Normalizer::new(true, true);
        assert!(are_equal(&normalizer, "ÉLAN", "elan"));
    }
}
