//! Post-OCR cleanup: deterministic fixes for known recognition errors.
//!
//! The one artefact corrected today is a dollar sign read as the letter `S`
//! right before a price: `S10` → `$10`, `Stwelve` → `$twelve`. The match is
//! case-insensitive and anchored on word boundaries on both sides, so `S`
//! inside a longer token (`USame`, `Stenography`) is left alone.
//!
//! Spelled-out prices come from an explicit [`PriceWords`] vocabulary rather
//! than a number-word parser. It is knowingly incomplete; add words to the
//! config to widen coverage.

use crate::config::PriceWords;
use crate::error::MenuError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Rewrites `S<numeral|price-word>` to `$<numeral|price-word>`.
#[derive(Debug, Clone)]
pub struct PriceCorrector {
    pattern: Regex,
}

impl PriceCorrector {
    /// Build a corrector for `words` (numerals are always matched).
    pub fn new(words: &PriceWords) -> Result<Self, MenuError> {
        let mut alternatives: Vec<String> = words.iter().map(regex::escape).collect();
        // Longest first so a word is never shadowed by its own prefix.
        alternatives.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let body = if alternatives.is_empty() {
            r"\d+".to_string()
        } else {
            format!(r"\d+|(?:{})", alternatives.join("|"))
        };
        let pattern = Regex::new(&format!(r"(?i)\bS({body})\b"))
            .map_err(|e| MenuError::InvalidConfig(format!("price words: {e}")))?;
        Ok(Self { pattern })
    }

    /// Apply the correction to every match in `text`.
    pub fn correct<'t>(&self, text: &'t str) -> Cow<'t, str> {
        // `$$` is a literal dollar in the replacement syntax.
        self.pattern.replace_all(text, "$$${1}")
    }
}

static DEFAULT_CORRECTOR: Lazy<PriceCorrector> =
    Lazy::new(|| PriceCorrector::new(&PriceWords::default()).unwrap());

/// Normalise OCR text with the default price vocabulary.
pub fn normalize(text: &str) -> String {
    clean_ocr_text(text, &DEFAULT_CORRECTOR)
}

/// Run every cleanup rule over one page of OCR output.
pub fn clean_ocr_text(text: &str, corrector: &PriceCorrector) -> String {
    corrector.correct(text).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeral_after_s() {
        assert_eq!(normalize("Total: S10"), "Total: $10");
    }

    #[test]
    fn price_word_case_insensitive() {
        assert_eq!(normalize("Price: Stwelve"), "Price: $twelve");
        assert_eq!(normalize("Price: STWENTY"), "Price: $TWENTY");
        assert_eq!(normalize("house red s15"), "house red $15");
    }

    #[test]
    fn s_inside_token_is_untouched() {
        assert_eq!(normalize("USame"), "USame");
        assert_eq!(normalize("Transformer"), "Transformer");
        assert_eq!(normalize("Stenography"), "Stenography");
        assert_eq!(normalize("S10am brunch"), "S10am brunch");
    }

    #[test]
    fn every_match_is_rewritten() {
        assert_eq!(
            normalize("Pale Ale S13\nStout S10\nSpritz Sfifteen"),
            "Pale Ale $13\nStout $10\nSpritz $fifteen"
        );
    }

    #[test]
    fn decimal_prices() {
        assert_eq!(normalize("Cider S9.50"), "Cider $9.50");
    }

    #[test]
    fn unknown_price_word_left_alone() {
        assert_eq!(normalize("Shot Seleven"), "Shot Seleven");
    }

    #[test]
    fn custom_vocabulary() {
        let mut words = PriceWords::default();
        words.insert("eleven");
        let c = PriceCorrector::new(&words).unwrap();
        assert_eq!(c.correct("Shot Seleven"), "Shot $eleven");
    }

    #[test]
    fn empty_vocabulary_still_fixes_numerals() {
        let c = PriceCorrector::new(&PriceWords::empty()).unwrap();
        assert_eq!(c.correct("S7 or Sten"), "$7 or Sten");
    }

    #[test]
    fn untouched_text_is_borrowed() {
        assert!(matches!(DEFAULT_CORRECTOR.correct("no prices here"), Cow::Borrowed(_)));
    }
}
