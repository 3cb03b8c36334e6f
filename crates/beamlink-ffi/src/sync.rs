//! Clipboard and screen-descriptor FFI.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};

use beamlink_sync::{ClipboardPayload, RawClipboardFrame, ScreenDescriptor};

use crate::error::{BeamlinkErrorCode, string_to_c};
use crate::service::handle_ref;
use crate::{BeamlinkNode, ffi_try};

unsafe fn opt_owned(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

unsafe fn opt_bytes(ptr: *const u8, len: usize) -> Option<Vec<u8>> {
    if ptr.is_null() || len == 0 {
        return None;
    }
    Some(unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec())
}

/// Push a local clipboard change to the peer.
///
/// Any of the three kinds may be null; at least one must be present.
/// Refused outside a connected session.
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - Non-null strings must be valid NUL-terminated UTF-8
/// - `error_out` must be null or a valid pointer to receive an error string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_push_clipboard(
    node: *mut BeamlinkNode,
    text: *const c_char,
    image_base64: *const c_char,
    html: *const c_char,
    error_out: *mut *mut c_char,
) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let payload = ClipboardPayload {
        text: unsafe { opt_owned(text) },
        image_base64: unsafe { opt_owned(image_base64) },
        html: unsafe { opt_owned(html) },
    };
    ffi_try!(handle.node.push_clipboard(payload), error_out);
    BeamlinkErrorCode::Success as c_int
}

/// Hand an inbound clipboard frame from the peer to the node.
///
/// Text and html arrive as raw bytes in the peer's encoding and run
/// through the decode fallback chain; the image passes through as base64.
/// Undecodable or empty content is treated as absent.
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - `text`/`html`, when non-null, must point to `text_len`/`html_len`
///   readable bytes
/// - `image_base64` must be null or valid NUL-terminated UTF-8
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_accept_clipboard_frame(
    node: *mut BeamlinkNode,
    text: *const u8,
    text_len: usize,
    image_base64: *const c_char,
    html: *const u8,
    html_len: usize,
) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let frame = RawClipboardFrame {
        text: unsafe { opt_bytes(text, text_len) },
        image_base64: unsafe { opt_owned(image_base64) },
        html: unsafe { opt_bytes(html, html_len) },
    };
    handle.node.accept_clipboard_frame(&frame);
    BeamlinkErrorCode::Success as c_int
}

/// Replace the local screen descriptor with the given JSON payload.
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - `json_payload` must be valid NUL-terminated UTF-8
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_set_screen_descriptor(
    node: *mut BeamlinkNode,
    json_payload: *const c_char,
) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let Some(json) = (unsafe { opt_owned(json_payload) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let Ok(descriptor) = serde_json::from_str::<ScreenDescriptor>(&json) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    handle.node.set_screen_descriptor(descriptor);
    BeamlinkErrorCode::Success as c_int
}

/// Answer a peer's auth-data request: the local screen descriptor as a
/// NUL-terminated JSON buffer, or an empty string when none is set yet.
/// Never null for a valid handle.
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - The return must be released with `beamlink_string_free()`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_auth_data(
    node: *mut BeamlinkNode,
    peer_index: u32,
) -> *mut c_char {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return std::ptr::null_mut();
    };
    string_to_c(&handle.node.auth_data_requested(peer_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{beamlink_apply_status, beamlink_node_free, beamlink_node_new};
    use std::ffi::CString;
    use std::ptr;

    #[test]
    fn clipboard_is_gated_until_connected() {
        unsafe {
            let node = beamlink_node_new(
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                0,
                ptr::null_mut(),
            );
            let text = CString::new("hello").unwrap();

            assert_eq!(
                beamlink_push_clipboard(
                    node,
                    text.as_ptr(),
                    ptr::null(),
                    ptr::null(),
                    ptr::null_mut()
                ),
                BeamlinkErrorCode::Sync as c_int
            );

            beamlink_apply_status(node, 7);
            assert_eq!(
                beamlink_push_clipboard(
                    node,
                    text.as_ptr(),
                    ptr::null(),
                    ptr::null(),
                    ptr::null_mut()
                ),
                BeamlinkErrorCode::Success as c_int
            );

            beamlink_node_free(node);
        }
    }

    #[test]
    fn auth_data_empty_then_populated() {
        unsafe {
            let node = beamlink_node_new(
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                0,
                ptr::null_mut(),
            );

            let empty = beamlink_auth_data(node, 0);
            assert_eq!(CStr::from_ptr(empty).to_str().unwrap(), "");
            crate::error::beamlink_string_free(empty);

            let json = CString::new(
                r#"{"width":1920,"height":1080,"framerate":60,"kind":0,"display_name":"Built-in"}"#,
            )
            .unwrap();
            assert_eq!(
                beamlink_set_screen_descriptor(node, json.as_ptr()),
                BeamlinkErrorCode::Success as c_int
            );

            let populated = beamlink_auth_data(node, 1);
            assert!(
                CStr::from_ptr(populated)
                    .to_str()
                    .unwrap()
                    .contains("Built-in")
            );
            crate::error::beamlink_string_free(populated);

            beamlink_node_free(node);
        }
    }
}
