//! Name and value comparison honouring the configured case sensitivity.

/// Compare two strings, folding case unless `case_sensitive` is set.
///
/// Case folding is full Unicode lower-casing, not ASCII-only.
pub fn equals(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a == b || a.to_lowercase() == b.to_lowercase()
    }
}
