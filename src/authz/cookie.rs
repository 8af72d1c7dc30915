//! Session credential extraction from the `cookie` request header
//!
//! The parser works on the raw header string and never fails: segments that
//! are not well-formed `name=value` pairs are skipped.

use std::collections::HashMap;

use super::types::Credential;

const COOKIE_HEADER: &str = "cookie";

/// Iterate over the well-formed `name=value` pairs of a `Cookie` header.
///
/// Surrounding whitespace is trimmed and a double-quoted value is unquoted.
pub fn parse_cookie_header(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.split(';').filter_map(|segment| {
        let (name, value) = segment.trim().split_once('=')?;
        let name = name.trim();
        if !is_token(name) {
            return None;
        }
        let value = unquote(value.trim());
        value.bytes().all(is_cookie_value_byte).then_some((name, value))
    })
}

/// Extract the named session cookie from a check request's header map.
///
/// Returns `None` if there is no `cookie` header, it is empty, or it has no
/// non-empty entry called `cookie_name`. The first matching entry wins.
pub fn extract_credential(
    headers: &HashMap<String, String>,
    cookie_name: &str,
) -> Option<Credential> {
    let raw = cookie_header(headers)?;
    parse_cookie_header(raw)
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
        .map(Credential::new)
}

fn cookie_header(headers: &HashMap<String, String>) -> Option<&str> {
    headers
        .get(COOKIE_HEADER)
        .or_else(|| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(COOKIE_HEADER))
                .map(|(_, value)| value)
        })
        .map(String::as_str)
        .filter(|raw| !raw.trim().is_empty())
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

// RFC 7230 token characters.
fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}

fn is_cookie_value_byte(b: u8) -> bool {
    (0x20..0x7f).contains(&b) && b != b'"' && b != b';' && b != b'\\'
}
