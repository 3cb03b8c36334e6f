//! FFI error codes and string handling.

use std::ffi::CString;
use std::os::raw::c_char;

use beamlink_core::NodeError;
use beamlink_sync::SyncError;

/// Status codes returned by FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamlinkErrorCode {
    /// Operation succeeded.
    Success = 0,
    /// A pointer or argument was null or malformed.
    InvalidArgument = 1,
    /// The async runtime could not be created or driven.
    Runtime = 2,
    /// Discovery layer failure.
    Discovery = 3,
    /// Transfer layer failure.
    Transfer = 4,
    /// Clipboard/screen sync refused the operation.
    Sync = 5,
    /// Operation requires explicit user confirmation.
    ConfirmationRequired = 6,
    /// Anything else.
    Internal = 7,
}

/// An error ready to cross the FFI boundary.
#[derive(Debug)]
pub struct BeamlinkError {
    code: BeamlinkErrorCode,
    message: String,
}

impl BeamlinkError {
    /// Invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            code: BeamlinkErrorCode::InvalidArgument,
            message: message.into(),
        }
    }

    /// Runtime error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            code: BeamlinkErrorCode::Runtime,
            message: message.into(),
        }
    }

    /// Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: BeamlinkErrorCode::Internal,
            message: message.into(),
        }
    }

    /// Numeric status code.
    #[must_use]
    pub fn code(&self) -> BeamlinkErrorCode {
        self.code
    }

    /// Leak the message as a C string for the caller to free with
    /// [`beamlink_string_free`].
    #[must_use]
    pub fn to_c_string(&self) -> *mut c_char {
        string_to_c(&self.message)
    }
}

impl From<NodeError> for BeamlinkError {
    fn from(e: NodeError) -> Self {
        let code = match &e {
            NodeError::Discovery(_) => BeamlinkErrorCode::Discovery,
            NodeError::Transfer(_) | NodeError::Io(_) => BeamlinkErrorCode::Transfer,
            NodeError::Sync(_) => BeamlinkErrorCode::Sync,
            NodeError::ConfirmationRequired(_) => BeamlinkErrorCode::ConfirmationRequired,
            NodeError::UnknownPeer(_) | NodeError::InvalidState(_) => {
                BeamlinkErrorCode::InvalidArgument
            }
            NodeError::NotRunning => BeamlinkErrorCode::Internal,
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}

impl From<SyncError> for BeamlinkError {
    fn from(e: SyncError) -> Self {
        Self {
            code: BeamlinkErrorCode::Sync,
            message: e.to_string(),
        }
    }
}

/// Convert a Rust string to a heap C string, mapping interior NULs to a
/// replacement so the conversion cannot fail.
pub(crate) fn string_to_c(s: &str) -> *mut c_char {
    let sanitized;
    let source = if s.contains('\0') {
        sanitized = s.replace('\0', "\u{FFFD}");
        sanitized.as_str()
    } else {
        s
    };
    CString::new(source).unwrap_or_default().into_raw()
}

/// Free a string returned by any beamlink FFI function.
///
/// # Safety
///
/// - `s` must be a pointer returned by a beamlink FFI function, or null
/// - `s` must not be used after this call
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}
