//! Helpers for picking apart the text returned by [`crate::transport::Transport::send`].
//!
//! Replies arrive exactly as the module emitted them, e.g.
//! `"\r\n+CSQ: 17,99\r\n\r\nOK\r\n"`.

pub const OK: &str = "OK";
pub const ERROR: &str = "ERROR";

/// Whether `reply` carries a final result code.
pub fn is_terminated(reply: &[u8]) -> bool {
    find(reply, OK.as_bytes()).is_some() || find(reply, ERROR.as_bytes()).is_some()
}

/// Offset of the first occurrence of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Comma separated values following the last occurrence of `prefix`.
///
/// Returns an empty list if the reply reports an error or lacks the prefix.
pub fn values<'a>(reply: &'a str, prefix: &str) -> Vec<&'a str> {
    if reply.contains(ERROR) {
        return Vec::new();
    }

    let Some(start) = reply.rfind(prefix) else {
        return Vec::new();
    };

    let rest = &reply[start + prefix.len()..];
    let line = rest.split(['\r', '\n']).next().unwrap_or_default().trim();
    if line.is_empty() {
        return Vec::new();
    }

    line.split(',').map(str::trim).collect()
}

/// Non-empty lines of a reply ending in `OK`, without the `OK` itself.
pub fn lines(reply: &str) -> Option<Vec<&str>> {
    if !reply.contains("OK\r\n") {
        return None;
    }

    Some(
        reply
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && *l != OK)
            .collect(),
    )
}

/// First information line of a reply ending in `OK`, e.g. the IMSI for `AT+CIMI`.
pub fn first_line(reply: &str) -> Option<&str> {
    lines(reply).and_then(|l| l.first().copied())
}

/// Strip one pair of surrounding double quotes, if present.
pub fn unquote(field: &str) -> &str {
    let field = field.trim();
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn final_result_codes() {
        assert!(is_terminated(b"\r\n+CSQ: 17,99\r\n\r\nOK\r\n"));
        assert!(is_terminated(b"\r\n+CME ERROR: 10\r\n"));
        assert!(!is_terminated(b"\r\n+CSQ: 17,99\r\n"));
        assert_eq!(find(b"abcabc", b"ca"), Some(2));
        assert_eq!(find(b"ab", b"abc"), None);
        assert_eq!(find(b"ab", b""), Some(0));
    }

    #[test]
    fn values_after_prefix() {
        let reply = "\r\n+CSQ: 17,99\r\n\r\nOK\r\n";
        assert_eq!(values(reply, "+CSQ:"), ["17", "99"]);

        let reply = "AT+COPS?\r\n+COPS: 0,0,\"AT&T\",7\r\nOK\r\n";
        assert_eq!(values(reply, "+COPS:"), ["0", "0", "\"AT&T\"", "7"]);
    }

    #[test]
    fn values_on_error_or_missing_prefix() {
        assert!(values("\r\n+CME ERROR: 10\r\n", "+CSQ:").is_empty());
        assert!(values("\r\nOK\r\n", "+CSQ:").is_empty());
    }

    #[test]
    fn lines_require_ok() {
        let reply = "\r\n310170123456789\r\n\r\nOK\r\n";
        assert_eq!(lines(reply), Some(vec!["310170123456789"]));
        assert_eq!(first_line(reply), Some("310170123456789"));
        assert_eq!(lines("\r\nERROR\r\n"), None);
        assert_eq!(first_line("\r\nOK\r\n"), None);
    }

    #[test]
    fn unquoting() {
        assert_eq!(unquote(" \"0101\" "), "0101");
        assert_eq!(unquote("0101"), "0101");
        assert_eq!(unquote("\"0101"), "\"0101");
    }
}
