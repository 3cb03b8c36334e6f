//! Clipboard payload modeling.
//!
//! A payload may carry text, an image, and html at the same time (copying
//! from a browser typically yields text + html). For user-facing
//! notifications exactly one kind is primary: text beats image beats html.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::encoding::decode_text;

/// The kind picked for user-facing notification of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Plain text.
    Text,
    /// Image (carried base64-encoded).
    Image,
    /// HTML fragment.
    Html,
}

/// A clipboard payload as relayed between peers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardPayload {
    /// Plain-text representation, if any.
    pub text: Option<String>,
    /// Base64-encoded image bytes, if any.
    pub image_base64: Option<String>,
    /// HTML representation, if any.
    pub html: Option<String>,
}

impl ClipboardPayload {
    /// Payload carrying only text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Payload carrying an image, encoding the bytes as base64.
    #[must_use]
    pub fn image(bytes: &[u8]) -> Self {
        Self {
            image_base64: Some(BASE64.encode(bytes)),
            ..Self::default()
        }
    }

    /// True when no kind is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.image_base64.is_none() && self.html.is_none()
    }

    /// The primary kind for notification purposes, if any.
    ///
    /// Precedence: text, then image, then html. Text+html co-presence is
    /// normal and resolves to text.
    #[must_use]
    pub fn primary_kind(&self) -> Option<PayloadKind> {
        if self.text.is_some() {
            Some(PayloadKind::Text)
        } else if self.image_base64.is_some() {
            Some(PayloadKind::Image)
        } else if self.html.is_some() {
            Some(PayloadKind::Html)
        } else {
            None
        }
    }

    /// Decode the image back to raw bytes.
    ///
    /// Returns `None` when there is no image or the base64 is damaged.
    #[must_use]
    pub fn image_bytes(&self) -> Option<Vec<u8>> {
        self.image_base64
            .as_deref()
            .and_then(|b64| BASE64.decode(b64).ok())
    }
}

/// An inbound clipboard frame before text decoding.
///
/// Text and html arrive as raw bytes in the sending platform's encoding;
/// the image is already base64 and passes through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawClipboardFrame {
    /// Raw text bytes, encoding unknown.
    pub text: Option<Vec<u8>>,
    /// Base64-encoded image.
    pub image_base64: Option<String>,
    /// Raw html bytes, encoding unknown.
    pub html: Option<Vec<u8>>,
}

impl RawClipboardFrame {
    /// Decode into a payload via the encoding fallback chain.
    ///
    /// A field whose bytes cannot be decoded is treated as absent, never as
    /// an error.
    #[must_use]
    pub fn decode(&self) -> ClipboardPayload {
        ClipboardPayload {
            text: self.text.as_deref().and_then(decode_text),
            image_base64: self.image_base64.clone().filter(|s| !s.is_empty()),
            html: self.html.as_deref().and_then(decode_text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_kind_precedence() {
        let both = ClipboardPayload {
            text: Some("hi".into()),
            image_base64: None,
            html: Some("<b>hi</b>".into()),
        };
        assert_eq!(both.primary_kind(), Some(PayloadKind::Text));

        let image_and_html = ClipboardPayload {
            text: None,
            image_base64: Some("aGk=".into()),
            html: Some("<b>hi</b>".into()),
        };
        assert_eq!(image_and_html.primary_kind(), Some(PayloadKind::Image));

        assert_eq!(ClipboardPayload::default().primary_kind(), None);
    }

    #[test]
    fn image_roundtrips_through_base64() {
        let payload = ClipboardPayload::image(&[1, 2, 3, 255]);
        assert_eq!(payload.image_bytes().unwrap(), vec![1, 2, 3, 255]);
        assert_eq!(payload.primary_kind(), Some(PayloadKind::Image));
    }

    #[test]
    fn damaged_base64_reads_as_no_image() {
        let payload = ClipboardPayload {
            image_base64: Some("!!not base64!!".into()),
            ..ClipboardPayload::default()
        };
        assert_eq!(payload.image_bytes(), None);
    }

    #[test]
    fn raw_frame_decodes_regional_text() {
        let frame = RawClipboardFrame {
            text: Some(vec![0xD6, 0xD0, 0xCE, 0xC4]),
            image_base64: None,
            html: None,
        };
        let payload = frame.decode();
        assert_eq!(payload.text.as_deref(), Some("中文"));
    }

    #[test]
    fn empty_fields_stay_absent() {
        let frame = RawClipboardFrame {
            text: Some(vec![]),
            image_base64: Some(String::new()),
            html: None,
        };
        let payload = frame.decode();
        assert!(payload.is_empty());
    }
}
