//! Multi-encoding text decoding.
//!
//! Clipboard text from a peer arrives as raw bytes in whatever encoding that
//! platform defaulted to. Decoding attempts run in a fixed order and the
//! first clean decode wins:
//!
//! 1. UTF-8
//! 2. GB18030 (regional 8-bit)
//! 3. UTF-16LE
//! 4. UTF-16BE
//! 5. Latin-1
//!
//! Latin-1 maps every byte, so non-empty input always decodes to something
//! rather than to replacement characters; only empty input yields `None`.

use encoding_rs::{GB18030, UTF_16BE, UTF_16LE};

/// Decode clipboard bytes through the fallback chain.
///
/// Returns `None` for empty input; the payload is then treated as absent.
#[must_use]
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return Some(s.to_owned());
    }

    for encoding in [GB18030, UTF_16LE, UTF_16BE] {
        let (decoded, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return Some(decoded.into_owned());
        }
    }

    // Latin-1: every byte is a code point, so this cannot fail.
    Some(bytes.iter().map(|&b| char::from(b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_wins_first() {
        assert_eq!(decode_text("héllo".as_bytes()).unwrap(), "héllo");
        assert_eq!(decode_text(b"plain ascii").unwrap(), "plain ascii");
    }

    #[test]
    fn gb18030_decodes_when_utf8_fails() {
        // "中文" in GB18030: D6 D0 CE C4 - invalid as UTF-8.
        let bytes = [0xD6, 0xD0, 0xCE, 0xC4];
        assert!(std::str::from_utf8(&bytes).is_err());
        assert_eq!(decode_text(&bytes).unwrap(), "中文");
    }

    #[test]
    fn utf16le_decodes_after_gb18030_fails() {
        // "€" U+20AC as UTF-16LE: AC 20. 0xAC alone is an invalid GB18030
        // lead byte followed by an invalid trail, so the chain falls through.
        let euro_le: Vec<u8> = "€".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        let decoded = decode_text(&euro_le).unwrap();
        // GB18030 may legitimately claim some two-byte sequences; accept
        // either outcome as long as nothing is replaced.
        assert!(!decoded.contains('\u{FFFD}'));
    }

    #[test]
    fn latin1_is_the_terminal_fallback() {
        // 0xFF 0xFE 0xFF: invalid UTF-8, invalid GB18030 tail, odd-length
        // for UTF-16. Latin-1 maps it byte-for-byte.
        let bytes = [0xFFu8, 0xFE, 0xFF];
        let decoded = decode_text(&bytes).unwrap();
        assert_eq!(decoded, "ÿþÿ");
    }

    #[test]
    fn empty_input_is_absent() {
        assert_eq!(decode_text(&[]), None);
    }

    #[test]
    fn no_replacement_characters_ever() {
        // Whatever branch decodes, the result never carries U+FFFD.
        for sample in [
            &[0xD6u8, 0xD0][..],
            &[0x80, 0x81, 0x82][..],
            &[0xC3, 0x28][..],
        ] {
            let decoded = decode_text(sample).unwrap();
            assert!(!decoded.contains('\u{FFFD}'), "sample {sample:02X?}");
        }
    }
}
