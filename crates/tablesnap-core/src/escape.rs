//! File-name escaping for database and table names
//!
//! Names are arbitrary strings; backups store them as path components.
//! [`escape_for_file_name`] keeps ASCII letters, digits and `_` and encodes
//! every other byte as `%XX`. [`unescape_for_file_name`] is its inverse.

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Make a name safe to use as a single path component
pub fn escape_for_file_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for &byte in name.as_bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' {
            escaped.push(byte as char);
        } else {
            escaped.push('%');
            escaped.push(HEX[(byte >> 4) as usize] as char);
            escaped.push(HEX[(byte & 0x0F) as usize] as char);
        }
    }
    escaped
}

/// Restore a name produced by [`escape_for_file_name`].
///
/// Malformed escape sequences are kept verbatim. Returns `None` if the decoded
/// bytes are not valid UTF-8.
pub fn unescape_for_file_name(escaped: &str) -> Option<String> {
    let bytes = escaped.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                decoded.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(decoded).ok()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_unchanged() {
        assert_eq!(escape_for_file_name("events_2024"), "events_2024");
    }

    #[test]
    fn test_special_characters_escaped() {
        assert_eq!(escape_for_file_name("a.b"), "a%2Eb");
        assert_eq!(escape_for_file_name("../etc"), "%2E%2E%2Fetc");
        assert_eq!(escape_for_file_name("with space"), "with%20space");
    }

    #[test]
    fn test_unicode_round_trip() {
        let name = "таблица/数据";
        let escaped = escape_for_file_name(name);
        assert!(escaped.is_ascii());
        assert!(!escaped.contains('/'));
        assert_eq!(unescape_for_file_name(&escaped).as_deref(), Some(name));
    }

    #[test]
    fn test_malformed_sequences_kept() {
        assert_eq!(unescape_for_file_name("100%").as_deref(), Some("100%"));
        assert_eq!(unescape_for_file_name("%zz").as_deref(), Some("%zz"));
    }
}
