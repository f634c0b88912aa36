// src/normalize.rs
//! Canonicalization helpers applied to every free-text value before it is
//! used as a lookup key. Catalog keys and incoming row text must go through
//! the same functions, or resolution silently degrades.

/// Canonicalizes a free-text value: lowercases, collapses internal
/// whitespace runs to a single space, and trims.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `Option`-aware variant; absent values normalize to the empty string,
/// mirroring how the legacy exports leave cells blank.
pub fn normalize_opt(value: Option<&str>) -> String {
    value.map(normalize).unwrap_or_default()
}

/// Strips a phone value down to its ASCII digits. The result feeds the
/// blind-index token derivation, so formatting noise ("+91 98-76...") must
/// never survive.
pub fn phone_digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}
