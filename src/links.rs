//! Canonicalization and acceptance rules for incoming post/Space links.
//!
//! Both steps are intentionally textual: `normalize` rewrites every `x.com`
//! occurrence (including ones inside paths or query strings) and `is_valid`
//! only anchors the start of the string, so trailing garbage after an
//! accepted prefix still passes.

use std::sync::LazyLock;

use regex::{Regex, RegexSet};

const ALTERNATE_DOMAIN: &str = "x.com";
const CANONICAL_DOMAIN: &str = "twitter.com";
const SCHEMES: [&str; 2] = ["http://", "https://"];

static ACCEPTED_LINKS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^https?://(www\.)?(twitter\.com|x\.com)/i/spaces/[a-zA-Z0-9]+",
        r"^https?://(www\.)?(twitter\.com|x\.com)/.+/status/\d+",
        r"^https?://t\.co/.+",
    ])
    .expect("accepted link patterns must compile")
});

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern must compile")
});

pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();

    let with_scheme = match SCHEMES.iter().find(|scheme| has_prefix_ignore_case(trimmed, scheme)) {
        Some(scheme) => format!("{scheme}{}", &trimmed[scheme.len()..]),
        None => format!("https://{trimmed}"),
    };

    with_scheme.replace(ALTERNATE_DOMAIN, CANONICAL_DOMAIN)
}

pub fn is_valid(url: &str) -> bool {
    ACCEPTED_LINKS.is_match(url)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

fn has_prefix_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_scheme_and_canonical_domain() {
        assert_eq!(normalize("x.com/foo"), "https://twitter.com/foo");
    }

    #[test]
    fn normalize_trims_and_lowercases_scheme() {
        assert_eq!(
            normalize(" HTTPS://x.com/i/spaces/abc "),
            "https://twitter.com/i/spaces/abc"
        );
        assert_eq!(normalize("http://twitter.com/a"), "http://twitter.com/a");
    }

    #[test]
    fn normalize_rewrites_alternate_domain_anywhere() {
        assert_eq!(
            normalize("https://x.com/a?next=x.com"),
            "https://twitter.com/a?next=twitter.com"
        );
        assert_eq!(normalize("box.com/path"), "https://botwitter.com/path");
    }

    #[test]
    fn accepts_space_status_and_short_links() {
        assert!(is_valid("https://twitter.com/i/spaces/abc123"));
        assert!(is_valid("http://www.x.com/i/spaces/1YqKDqWqdPLsV"));
        assert!(is_valid("https://twitter.com/someone/status/1234567890"));
        assert!(is_valid("https://t.co/anything"));
    }

    #[test]
    fn rejects_foreign_or_incomplete_links() {
        assert!(!is_valid("https://example.com/i/spaces/abc"));
        assert!(!is_valid("https://twitter.com/i/spaces/"));
        assert!(!is_valid("https://twitter.com/someone"));
        assert!(!is_valid("https://t.co/"));
        assert!(!is_valid("ftp://twitter.com/i/spaces/abc"));
    }

    #[test]
    fn validation_is_prefix_anchored_only() {
        assert!(is_valid("https://twitter.com/i/spaces/abc!!garbage"));
        assert!(!is_valid("see https://twitter.com/i/spaces/abc"));
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("listener@example.org"));
        assert!(!is_valid_email("listener@example"));
        assert!(!is_valid_email("two words@example.org"));
        assert!(!is_valid_email(""));
    }
}
