//! Email address validation.
//!
//! The pattern is a direct port of the original's ICU regex. `regex` has no
//! Unicode-script classes, so this loses ICU's broader support for
//! non-ASCII local/domain parts; for the ASCII-range addresses this server
//! expects to see, the accepted set is identical.

use std::sync::LazyLock;

use regex::Regex;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#,
    )
    .expect("email regex is a fixed, valid pattern")
});

/// Reports whether `candidate` looks like a valid email address.
pub fn is_email(candidate: &str) -> bool {
    EMAIL_RE.is_match(candidate)
}
