//! Display-name normalization.
//!
//! A name is "protected" when its normalized form matches a registered
//! name or alias. The rule is trim + Unicode case-fold; nothing cleverer,
//! because the registry sweep and the event-path detector must compute
//! exactly the same string or impersonation alerts would flap.

/// Normalize a display name for protected-name comparison.
///
/// Returns the trimmed, lowercased form. An all-whitespace input
/// normalizes to the empty string, which never matches anything.
pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}
