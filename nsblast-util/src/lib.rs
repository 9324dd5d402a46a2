//! Validation helpers shared across the server and its tooling.
//!
//! Grounded on `goat-lib`'s validators module in the teacher repo: a small
//! crate of `lazy_static` regexes kept separate from the main binary so
//! they can be reused (and unit tested) without dragging in the full
//! dependency graph.

use regex::Regex;
use std::sync::LazyLock;

/// A single DNS label: 1-63 bytes, conventional hostname charset.
/// nsblast doesn't enforce hostname-only charsets on rdata, but the
/// REST surface uses this to sanity check fqdns supplied by operators.
pub static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$").expect("valid regex"));

/// CAA tag charset per RFC 8659: ASCII alphanumeric only.
pub static CAA_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("valid regex"));

/// `priority weight target` as used in a SRV/URI record's text form.
pub static PRIORITY_WEIGHT_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<priority>\d+)\s+(?P<weight>\d+)\s+(?P<target>.*)$").expect("valid regex")
});

/// True if every label in `fqdn` is a syntactically valid DNS label and the
/// total length (including separators) fits within 255 octets.
pub fn is_valid_fqdn(fqdn: &str) -> bool {
    let trimmed = fqdn.strip_suffix('.').unwrap_or(fqdn);
    if trimmed.is_empty() {
        // the root is valid
        return fqdn == ".";
    }
    if fqdn.len() > 255 {
        return false;
    }
    trimmed.split('.').all(|label| LABEL.is_match(label))
}

/// Lowercase and strip a single trailing dot, the normal form used as a
/// storage key's logical fqdn throughout the engine.
pub fn normalize_fqdn(fqdn: &str) -> String {
    fqdn.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_fqdns() {
        assert!(is_valid_fqdn("example.com"));
        assert!(is_valid_fqdn("www.example.com."));
        assert!(is_valid_fqdn("a.b.c.example.com"));
        assert!(is_valid_fqdn("."));
    }

    #[test]
    fn invalid_fqdns() {
        assert!(!is_valid_fqdn(""));
        assert!(!is_valid_fqdn(".example.com"));
        assert!(!is_valid_fqdn("-example.com"));
        assert!(!is_valid_fqdn("exa_mple.com".replace('_', " ").as_str()));
    }

    #[test]
    fn normalize() {
        assert_eq!(normalize_fqdn("WWW.Example.COM."), "www.example.com");
    }
}
