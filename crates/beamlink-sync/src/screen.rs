//! Screen/display descriptor exchange.
//!
//! During authorization the peer asks for the local display configuration
//! (keyed by a peer index) and expects the last-known descriptor back. The
//! descriptor is immutable once sent; a local screen-configuration change
//! replaces it wholesale.

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Local display configuration offered for screen-casting authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenDescriptor {
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Target frame rate.
    pub framerate: u32,
    /// Display kind discriminant (platform defined).
    pub kind: u32,
    /// Human-readable display name.
    pub display_name: String,
}

/// Holder of the last-known local [`ScreenDescriptor`].
#[derive(Debug, Default)]
pub struct ScreenStore {
    current: RwLock<Option<ScreenDescriptor>>,
}

impl ScreenStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the descriptor wholesale.
    pub fn replace(&self, descriptor: ScreenDescriptor) {
        debug!(
            "screen descriptor now {}x{}@{} ('{}')",
            descriptor.width, descriptor.height, descriptor.framerate, descriptor.display_name
        );
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(descriptor);
    }

    /// Current descriptor, if one was ever set.
    #[must_use]
    pub fn current(&self) -> Option<ScreenDescriptor> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Serialize the descriptor for a peer's auth-data request.
    ///
    /// Returns an empty string when no descriptor is available yet; the
    /// request must not block or fail on a cold start.
    #[must_use]
    pub fn descriptor_json(&self, peer_index: u32) -> String {
        match self.current() {
            Some(descriptor) => {
                debug!("answering auth-data request for peer index {peer_index}");
                serde_json::to_string(&descriptor).unwrap_or_default()
            }
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> ScreenDescriptor {
        ScreenDescriptor {
            width: 2560,
            height: 1440,
            framerate: 60,
            kind: 1,
            display_name: name.into(),
        }
    }

    #[test]
    fn empty_store_answers_empty_string() {
        let store = ScreenStore::new();
        assert_eq!(store.descriptor_json(0), "");
        assert_eq!(store.current(), None);
    }

    #[test]
    fn replace_is_wholesale() {
        let store = ScreenStore::new();
        store.replace(descriptor("Main"));
        store.replace(descriptor("External"));

        let current = store.current().unwrap();
        assert_eq!(current.display_name, "External");

        let json = store.descriptor_json(3);
        let parsed: ScreenDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, current);
    }
}
