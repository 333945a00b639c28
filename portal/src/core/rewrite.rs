//! Regex find/replace primitives used by every higher-level rewrite.
//!
//! Replacement text is always inserted literally: `$1` in a replacement is not
//! a capture reference, which matters for JSON payloads and shell snippets.

use std::borrow::Cow;

use regex::{NoExpand, Regex};

/// Separator placed before text appended by [`replace_or_append`].
pub const APPEND_SEPARATOR: &str = "\r\n";

/// Replace every match of `pattern`, or append `replacement` as a new trailing line
/// when nothing matches.
pub fn replace_or_append(content: &str, pattern: &Regex, replacement: &str) -> String {
    if pattern.is_match(content) {
        return pattern
            .replace_all(content, NoExpand(replacement))
            .into_owned();
    }
    let mut buf = String::with_capacity(content.len() + APPEND_SEPARATOR.len() + replacement.len());
    buf.push_str(content);
    buf.push_str(APPEND_SEPARATOR);
    buf.push_str(replacement);
    buf
}

/// Replace every match of `pattern`; content without a match is returned borrowed and unchanged.
pub fn replace_if_match<'a>(content: &'a str, pattern: &Regex, replacement: &str) -> Cow<'a, str> {
    pattern.replace_all(content, NoExpand(replacement))
}

/// Replace only the first match of `pattern`; later matches are left as they are.
pub fn replace_first<'a>(content: &'a str, pattern: &Regex, replacement: &str) -> Cow<'a, str> {
    pattern.replacen(content, 1, NoExpand(replacement))
}
