//! Utilities module - Text normalization, stemming and fuzzy matching

pub mod fuzzy;
pub mod text_utils;

pub use fuzzy::{is_similar, levenshtein};
pub use text_utils::TextUtils;
