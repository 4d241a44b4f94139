//! `application/x-www-form-urlencoded` helpers shared by the query string and
//! form body operations.

use regex::Regex;
use url::form_urlencoded;

/// `(key, value)` pairs of a form-encoded string, decoded. Empty segments are
/// skipped and a bare key has an empty value.
pub(crate) fn parse_pairs(encoded: &[u8]) -> impl Iterator<Item = (String, String)> + '_ {
    form_urlencoded::parse(encoded).map(|(key, value)| (key.into_owned(), value.into_owned()))
}

/// Escape a value for use inside a query string or form body; space becomes `+`.
pub(crate) fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Pattern matching the first `key=value` pair of a form-encoded string.
/// Group 1 is the leading separator (empty at the start of the string).
pub(crate) fn pair_pattern(key: &str) -> String {
    format!(r"(^|&){}=[^&]*", regex::escape(key))
}

/// Rewrite the value of the first `key=...` pair in `encoded`.
///
/// Returns `None` when the key does not occur; missing keys are never added.
pub(crate) fn replace_first(encoded: &str, key: &str, escaped_value: &str) -> Option<String> {
    let re = Regex::new(&pair_pattern(key)).ok()?;
    if !re.is_match(encoded) {
        return None;
    }
    let replaced = re.replacen(encoded, 1, |caps: &regex::Captures<'_>| {
        format!("{}{key}={escaped_value}", &caps[1])
    });
    Some(replaced.into_owned())
}

/// Byte-level twin of [`replace_first`] for request bodies.
pub(crate) fn replace_first_bytes(body: &[u8], key: &str, escaped_value: &str) -> Option<Vec<u8>> {
    let re = regex::bytes::Regex::new(&pair_pattern(key)).ok()?;
    if !re.is_match(body) {
        return None;
    }
    let replaced = re.replacen(body, 1, |caps: &regex::bytes::Captures<'_>| {
        let mut pair = caps[1].to_vec();
        pair.extend_from_slice(key.as_bytes());
        pair.push(b'=');
        pair.extend_from_slice(escaped_value.as_bytes());
        pair
    });
    Some(replaced.into_owned())
}
