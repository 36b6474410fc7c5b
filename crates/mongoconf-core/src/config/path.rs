//! Configuration key paths
//!
//! Keys are flat strings whose hierarchy is expressed with `:`, e.g.
//! `logging:level:default`. Ordering follows the segment-wise comparer used by
//! the host configuration system rather than plain string order, so `a:10`
//! sorts after `a:9`.

use std::cmp::Ordering;

/// Delimiter between path segments
pub const KEY_DELIMITER: &str = ":";

/// Case-insensitive equality of two keys
pub fn keys_equal(a: &str, b: &str) -> bool {
    compare_ignore_case(a, b) == Ordering::Equal
}

/// Compare two keys segment by segment
///
/// Empty segments are ignored. Two integer segments compare numerically, an
/// integer segment sorts before a non-integer one, anything else compares
/// case-insensitively. When all shared segments are equal the key with fewer
/// segments comes first.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    let a_parts: Vec<&str> = a.split(KEY_DELIMITER).filter(|s| !s.is_empty()).collect();
    let b_parts: Vec<&str> = b.split(KEY_DELIMITER).filter(|s| !s.is_empty()).collect();

    for (x, y) in a_parts.iter().zip(b_parts.iter()) {
        let result = match (x.parse::<i64>(), y.parse::<i64>()) {
            (Ok(xv), Ok(yv)) => xv.cmp(&yv),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => compare_ignore_case(x, y),
        };
        if result != Ordering::Equal {
            return result;
        }
    }

    a_parts.len().cmp(&b_parts.len())
}

/// Next segment of `key` after `prefix`, if `key` starts with `prefix`
/// (case-insensitive)
pub(crate) fn child_segment<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    if key.len() < prefix.len() || !key.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, rest) = key.split_at(prefix.len());
    if !keys_equal(head, prefix) {
        return None;
    }
    Some(match rest.find(KEY_DELIMITER) {
        Some(pos) => &rest[..pos],
        None => rest,
    })
}

/// Merge a layer's own child segments with the ones reported by earlier layers
///
/// The result is sorted with [`compare_keys`] and deduplicated
/// case-insensitively; the first spelling seen wins.
pub fn merge_child_keys<I>(own: I, earlier_keys: &[String]) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut keys: Vec<String> = own.into_iter().chain(earlier_keys.iter().cloned()).collect();
    keys.sort_by(|a, b| compare_keys(a, b));
    keys.dedup_by(|later, earlier| keys_equal(later, earlier));
    keys
}

/// The `parent:` prefix used to find children, empty for the root
pub(crate) fn child_prefix(parent_path: Option<&str>) -> String {
    match parent_path {
        Some(parent) => format!("{}{}", parent, KEY_DELIMITER),
        None => String::new(),
    }
}

fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_uppercase)
        .cmp(b.chars().flat_map(char::to_uppercase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_keys_numeric_segments() {
        assert_eq!(compare_keys("a:9", "a:10"), Ordering::Less);
        assert_eq!(compare_keys("10", "9"), Ordering::Greater);
        // Integers sort before names
        assert_eq!(compare_keys("1", "a"), Ordering::Less);
        assert_eq!(compare_keys("a", "1"), Ordering::Greater);
    }

    #[test]
    fn test_compare_keys_case_insensitive() {
        assert_eq!(compare_keys("Alpha", "alpha"), Ordering::Equal);
        assert_eq!(compare_keys("alpha", "BETA"), Ordering::Less);
    }

    #[test]
    fn test_compare_keys_segment_count() {
        assert_eq!(compare_keys("a", "a:b"), Ordering::Less);
        assert_eq!(compare_keys("a::b", "a:b"), Ordering::Equal);
        // Not plain string order: ':' would otherwise sort before letters
        assert_eq!(compare_keys("a:z", "ab"), Ordering::Less);
    }

    #[test]
    fn test_child_segment() {
        assert_eq!(child_segment("a:b", "a:"), Some("b"));
        assert_eq!(child_segment("A:c:d", "a:"), Some("c"));
        assert_eq!(child_segment("x", "a:"), None);
        assert_eq!(child_segment("a", "a:"), None);
        assert_eq!(child_segment("x:y", ""), Some("x"));
    }

    #[test]
    fn test_merge_child_keys_dedups_and_sorts() {
        let merged = merge_child_keys(
            vec!["c".to_string(), "b".to_string(), "c".to_string()],
            &["B".to_string(), "10".to_string(), "2".to_string()],
        );
        assert_eq!(merged, vec!["2", "10", "b", "c"]);
    }
}
