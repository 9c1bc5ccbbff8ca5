// crates/conflux-core/src/redaction.rs
// ============================================================================
// Module: Conflux Redaction Codec
// Description: Display-safe masking of secrets and detection of masked forms.
// Purpose: Expose configuration externally without leaking secret material.
// Dependencies: none
// ============================================================================

//! ## Overview
//! A secret is shown in one of two forms: `env.NAME` when it came from the
//! environment, or a fixed-width mask otherwise. The mask keeps the first and
//! last four characters of secrets longer than eight characters and hides
//! shorter secrets entirely.
//!
//! [`is_redacted`] is lossy: a genuine 32-character secret whose middle is all
//! asterisks (or a short secret made only of asterisks) is indistinguishable
//! from a mask. This is an accepted limitation.
//! Lengths are counted in characters, not bytes.

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix marking an environment reference.
pub const ENV_PREFIX: &str = "env.";
/// Mask character.
pub const MASK_CHAR: char = '*';
/// Secrets at or below this length are fully masked.
pub const SHORT_SECRET_LENGTH: usize = 8;
/// Visible characters kept at each end of a long secret.
const VISIBLE_EDGE: usize = 4;
/// Mask characters between the visible edges.
const MASK_WIDTH: usize = 24;
/// Total length of a long-secret mask.
pub const REDACTED_LENGTH: usize = VISIBLE_EDGE * 2 + MASK_WIDTH;

// ============================================================================
// SECTION: Value Forms
// ============================================================================

/// Classification of a configuration value as seen at an API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueForm<'a> {
    /// Empty string.
    Empty,
    /// Environment reference, carrying the variable name.
    EnvReference(&'a str),
    /// Masked display value.
    Masked,
    /// Anything else; treated as a literal secret.
    Plain,
}

/// Classifies a value.
#[must_use]
pub fn classify(value: &str) -> ValueForm<'_> {
    if value.is_empty() {
        return ValueForm::Empty;
    }
    if let Some(name) = value.strip_prefix(ENV_PREFIX) {
        return ValueForm::EnvReference(name);
    }
    if is_mask(value) { ValueForm::Masked } else { ValueForm::Plain }
}

// ============================================================================
// SECTION: Codec
// ============================================================================

/// Masks a secret for display.
#[must_use]
pub fn redact(value: &str) -> String {
    let length = value.chars().count();
    if length == 0 {
        return String::new();
    }
    if length <= SHORT_SECRET_LENGTH {
        return MASK_CHAR.to_string().repeat(length);
    }
    let head: String = value.chars().take(VISIBLE_EDGE).collect();
    let tail: String = value.chars().skip(length - VISIBLE_EDGE).collect();
    let mut out = String::with_capacity(REDACTED_LENGTH);
    out.push_str(&head);
    out.extend(std::iter::repeat_n(MASK_CHAR, MASK_WIDTH));
    out.push_str(&tail);
    out
}

/// Returns true when a value is in a display form rather than a live secret.
#[must_use]
pub fn is_redacted(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    value.starts_with(ENV_PREFIX) || is_mask(value)
}

/// Returns the display form of an environment reference.
#[must_use]
pub fn env_reference(env_var: &str) -> String {
    format!("{ENV_PREFIX}{env_var}")
}

/// Returns true for either mask shape: all asterisks up to the short-secret
/// length, or the fixed-width long-secret mask.
fn is_mask(value: &str) -> bool {
    let chars: Vec<char> = value.chars().collect();
    match chars.len() {
        0 => false,
        1..=SHORT_SECRET_LENGTH => chars.iter().all(|c| *c == MASK_CHAR),
        REDACTED_LENGTH => {
            chars[VISIBLE_EDGE .. VISIBLE_EDGE + MASK_WIDTH].iter().all(|c| *c == MASK_CHAR)
        }
        _ => false,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
