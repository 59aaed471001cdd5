//! Key Pattern Matching
//!
//! Glob matching over cache keys where `*` matches any substring.

/// Wildcard character recognised in key patterns.
pub const WILDCARD: char = '*';

/// Returns true if `key` matches `pattern` in full.
///
/// A pattern without a wildcard only matches the identical key.
pub fn matches(pattern: &str, key: &str) -> bool {
    if !pattern.contains(WILDCARD) {
        return pattern == key;
    }

    let segments: Vec<&str> = pattern.split(WILDCARD).collect();
    let (first, rest) = match segments.split_first() {
        Some(split) => split,
        None => return false,
    };
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return false,
    };

    let mut remaining = match key.strip_prefix(first) {
        Some(remaining) => remaining,
        None => return false,
    };

    // Leftmost match is sufficient for `*`-only globs
    for segment in middle {
        match remaining.find(segment) {
            Some(idx) => remaining = &remaining[idx + segment.len()..],
            None => return false,
        }
    }

    remaining.ends_with(last)
}

/// Number of wildcards in a pattern.
pub fn wildcard_count(pattern: &str) -> usize {
    pattern.matches(WILDCARD).count()
}

/// Replaces the first wildcard of `template` with `id`.
pub fn substitute(template: &str, id: &str) -> String {
    template.replacen(WILDCARD, id, 1)
}
