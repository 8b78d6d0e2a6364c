//! Decoding primitives for share-link payloads.
//!
//! Base64 handling here is deliberately strict. Share links travel through
//! chats and clipboards, so the input is first filtered down to the Base64
//! alphabet (whitespace and stray control bytes are dropped silently), but
//! after that cleanup the payload must be exact: a length that is not a
//! multiple of four, or any byte the standard alphabet cannot account for,
//! is a hard [`ParseError::InvalidEncoding`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::trace;

use super::ParseError;

// ============================================================================
// Base64
// ============================================================================

/// Decodes a Base64 payload into UTF-8 text.
///
/// Characters outside `[A-Za-z0-9+/=]` are filtered out before decoding, so
/// copy/paste line breaks do not break a link. The cleaned input must have a
/// length that is a multiple of 4; trailing `=` padding determines the output
/// length. Decoded bytes must form valid UTF-8 — downstream consumers treat
/// the payload as text (usually JSON), never as arbitrary binary.
pub fn decode_base64(content: &str) -> Result<String, ParseError> {
    let cleaned: String = content
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        .collect();

    if !cleaned.len().is_multiple_of(4) {
        return Err(ParseError::invalid_encoding(
            format!("Base64 length {} is not a multiple of 4", cleaned.len()),
            content,
        ));
    }

    trace!("Decoding {} cleaned Base64 bytes", cleaned.len());

    let decoded = STANDARD.decode(cleaned.as_bytes()).map_err(|e| {
        ParseError::invalid_encoding(format!("Base64 decode failed: {e}"), content)
    })?;

    String::from_utf8(decoded).map_err(|_| {
        ParseError::invalid_encoding("decoded payload is not valid UTF-8", content)
    })
}

// ============================================================================
// Percent Decoding
// ============================================================================

/// Percent-decodes a URI component, mapping `+` to space.
///
/// The result is truncated at `max_len` bytes without splitting a multi-byte
/// character. Malformed `%` sequences pass through verbatim rather than
/// failing the whole component.
pub fn decode_uri_component(input: &str, max_len: usize) -> String {
    let plussed = input.replace('+', " ");
    let decoded = urlencoding::decode(&plussed)
        .map(|c| c.into_owned())
        .unwrap_or(plussed);
    truncate_at_char_boundary(decoded, max_len)
}

fn truncate_at_char_boundary(mut s: String, max_len: usize) -> String {
    if s.len() <= max_len {
        return s;
    }
    let mut cut = max_len;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Base64 Tests
    // ========================================================================

    #[test]
    fn test_decode_base64_standard() {
        assert_eq!(decode_base64("aGVsbG8gd29ybGQ=").unwrap(), "hello world");
    }

    #[test]
    fn test_decode_base64_filters_whitespace() {
        assert_eq!(decode_base64("aGVs\nbG8g\nd29y\nbGQ=").unwrap(), "hello world");
        assert_eq!(decode_base64("  aGVsbG8gd29ybGQ=  ").unwrap(), "hello world");
        assert_eq!(decode_base64("aGVs\tbG8g\td29ybGQ=").unwrap(), "hello world");
    }

    #[test]
    fn test_decode_base64_rejects_bad_length() {
        // After filtering, "abc" has length 3
        let err = decode_base64("abc").unwrap_err();
        assert!(matches!(err, ParseError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_decode_base64_two_padding_chars() {
        assert_eq!(decode_base64("YQ==").unwrap(), "a");
    }

    #[test]
    fn test_decode_base64_one_padding_char() {
        assert_eq!(decode_base64("YWI=").unwrap(), "ab");
    }

    #[test]
    fn test_decode_base64_no_padding() {
        assert_eq!(decode_base64("YWJj").unwrap(), "abc");
    }

    #[test]
    fn test_decode_base64_rejects_misplaced_padding() {
        assert!(decode_base64("YW==Zm9v").is_err());
    }

    #[test]
    fn test_decode_base64_rejects_non_utf8_payload() {
        // 0xFF 0xFE is not UTF-8
        let encoded = STANDARD.encode([0xFFu8, 0xFE, 0x00, 0x01]);
        let err = decode_base64(&encoded).unwrap_err();
        assert!(matches!(err, ParseError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_decode_base64_accepts_multibyte_utf8() {
        // A well-formed multi-byte sequence must survive the UTF-8 check
        let encoded = STANDARD.encode("节点名称 🚀");
        assert_eq!(decode_base64(&encoded).unwrap(), "节点名称 🚀");
    }

    #[test]
    fn test_decode_base64_empty() {
        assert_eq!(decode_base64("").unwrap(), "");
    }

    #[test]
    fn test_decode_base64_round_trip() {
        for original in ["", "a", "ab", "abc", "hello world", "ss://user@host:1#tag"] {
            let encoded = STANDARD.encode(original);
            assert_eq!(decode_base64(&encoded).unwrap(), original);
        }
    }

    // ========================================================================
    // Percent Decoding Tests
    // ========================================================================

    #[test]
    fn test_decode_uri_component_percent() {
        assert_eq!(decode_uri_component("a%20b", 64), "a b");
        assert_eq!(decode_uri_component("%2Fws", 64), "/ws");
    }

    #[test]
    fn test_decode_uri_component_plus_is_space() {
        assert_eq!(decode_uri_component("a+b+c", 64), "a b c");
    }

    #[test]
    fn test_decode_uri_component_malformed_passthrough() {
        assert_eq!(decode_uri_component("50%", 64), "50%");
        assert_eq!(decode_uri_component("%zz", 64), "%zz");
    }

    #[test]
    fn test_decode_uri_component_truncates() {
        assert_eq!(decode_uri_component("abcdef", 3), "abc");
    }

    #[test]
    fn test_decode_uri_component_truncation_respects_utf8() {
        // "é" is two bytes; a cut in the middle must back off
        let out = decode_uri_component("é", 1);
        assert!(out.is_empty());
    }
}
