//! Text normalization and stemming used by the context search and keyword detection

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref NON_WORD_REGEX: Regex = Regex::new(r"\W+").unwrap();
}

/// Minimum stem length kept by `extract_stems`
const MIN_STEM_LEN: usize = 3;

/// Words this short are never stemmed
const MAX_UNSTEMMED_LEN: usize = 3;

/// Folded form of the Portuguese "-ções" plural
const ABSTRACT_PLURAL_SUFFIX: &str = "coes";
const ABSTRACT_SINGULAR_SUFFIX: &str = "cao";

/// Text helpers shared by the retrieval pipeline
pub struct TextUtils;

impl TextUtils {
    /// Fold accents (NFD, combining marks dropped) and lowercase
    pub fn normalize(text: &str) -> String {
        text.nfd()
            .filter(|c| !is_combining_mark(*c))
            .collect::<String>()
            .to_lowercase()
    }

    /// Crude suffix stripper tuned for Portuguese plurals.
    ///
    /// Short words pass through, the "-ções" plural collapses to "-cao", and any
    /// other trailing `s` is dropped. Because `s` is checked first an `-es` plural
    /// only loses its final `s` ("classes" -> "classe").
    pub fn stem(word: &str) -> String {
        let normalized = Self::normalize(word);
        if normalized.chars().count() <= MAX_UNSTEMMED_LEN {
            return normalized;
        }
        if let Some(root) = normalized.strip_suffix(ABSTRACT_PLURAL_SUFFIX) {
            return format!("{}{}", root, ABSTRACT_SINGULAR_SUFFIX);
        }
        if let Some(root) = normalized.strip_suffix('s') {
            return root.to_string();
        }
        normalized
    }

    /// Split on non-word characters, stem every token and keep stems longer than two chars
    pub fn extract_stems(text: &str) -> HashSet<String> {
        let normalized = Self::normalize(text);
        NON_WORD_REGEX
            .split(&normalized)
            .filter(|token| !token.is_empty())
            .map(Self::stem)
            .filter(|stem| stem.chars().count() >= MIN_STEM_LEN)
            .collect()
    }

    /// Stem each tag as a whole (multi-word tags stay multi-word)
    pub fn stem_tags<'a, I>(tags: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        tags.into_iter()
            .map(|tag| Self::stem(tag.trim()))
            .filter(|stem| !stem.is_empty())
            .collect()
    }

    /// True when the text is empty or only whitespace
    pub fn is_blank(text: &str) -> bool {
        text.trim().is_empty()
    }

    /// Truncate to at most `max_chars` characters without splitting a code point
    pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
        match text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => &text[..byte_idx],
            None => text,
        }
    }
}
