//! File transfer FFI.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;

use beamlink_files::DropStatus;

use crate::error::{BeamlinkErrorCode, string_to_c};
use crate::service::handle_ref;
use crate::{BeamlinkNode, ffi_try};

/// Request a multi-file drop to an attached client.
///
/// `json_file_list` is a JSON array of absolute file paths. The return
/// value is the wire admission code, not an FFI error code:
///
/// - 1 = accepted (`timestamp_out` receives the session id)
/// - 2 = invalid parameters
/// - 3 = sending already in progress
/// - 4 = receiving already in progress
/// - 5 = engine not initialized
///
/// A rejected request produces no progress callbacks.
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - `peer_id` and `json_file_list` must be valid NUL-terminated UTF-8
/// - `timestamp_out` must be null or a valid pointer
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_request_multi_file_drop(
    node: *mut BeamlinkNode,
    peer_id: *const c_char,
    json_file_list: *const c_char,
    timestamp_out: *mut u64,
) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return i32::from(DropStatus::NotInitialized.code());
    };
    let (Some(peer_id), Some(json)) = (unsafe { cstr(peer_id) }, unsafe { cstr(json_file_list) })
    else {
        return i32::from(DropStatus::InvalidParams.code());
    };
    let Ok(paths) = serde_json::from_str::<Vec<PathBuf>>(json) else {
        return i32::from(DropStatus::InvalidParams.code());
    };

    let _guard = handle.runtime.enter();
    match handle.node.request_drop(paths, peer_id) {
        Ok(timestamp) => {
            if !timestamp_out.is_null() {
                unsafe { *timestamp_out = timestamp };
            }
            i32::from(DropStatus::Accepted.code())
        }
        Err(status) => i32::from(status.code()),
    }
}

/// Best-effort cancellation of a transfer session.
///
/// Returns success when a cancellable session was found; the session then
/// surfaces an error-coded progress event (5520) once the stream actually
/// stops.
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - `ip_port` and `peer_id` must be valid NUL-terminated UTF-8
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_request_cancel_transfer(
    node: *mut BeamlinkNode,
    ip_port: *const c_char,
    peer_id: *const c_char,
    timestamp: u64,
) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let (Some(endpoint), Some(peer_id)) = (unsafe { cstr(ip_port) }, unsafe { cstr(peer_id) })
    else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    if handle.node.cancel_transfer(endpoint, peer_id, timestamp) {
        BeamlinkErrorCode::Success as c_int
    } else {
        BeamlinkErrorCode::InvalidArgument as c_int
    }
}

/// Delete a finished session record (local only; the peer is not
/// signalled).
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - `error_out` must be null or a valid pointer to receive an error string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_delete_session(
    node: *mut BeamlinkNode,
    timestamp: u64,
    error_out: *mut *mut c_char,
) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    ffi_try!(handle.node.delete_session(timestamp), error_out);
    BeamlinkErrorCode::Success as c_int
}

/// Path of the received file for a completed single-file session, or null.
///
/// Multi-file sessions answer null: only single-file sessions can be
/// opened.
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - A non-null return must be released with `beamlink_string_free()`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_session_file_path(
    node: *mut BeamlinkNode,
    timestamp: u64,
) -> *mut c_char {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return std::ptr::null_mut();
    };
    match handle.node.open_session_file(timestamp) {
        Ok(path) => string_to_c(&path.to_string_lossy()),
        Err(_) => std::ptr::null_mut(),
    }
}

/// All transfer sessions as a JSON array, newest first.
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - The return must be released with `beamlink_string_free()`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_list_sessions(node: *mut BeamlinkNode) -> *mut c_char {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return std::ptr::null_mut();
    };
    let sessions = handle.node.sessions();
    let summaries: Vec<_> = sessions
        .iter()
        .map(|s| {
            serde_json::json!({
                "timestamp": s.timestamp,
                "sender_ip": s.sender_ip.to_string(),
                "sender_id": s.sender_id,
                "sender_device_name": s.sender_device_name,
                "current_file_name": s.current_file_name,
                "received_file_count": s.received_file_count,
                "total_file_count": s.total_file_count,
                "total_size": s.total_size,
                "received_size": s.received_size,
                "finished": s.finish_ms.is_some(),
                "error_code": s.error_code,
            })
        })
        .collect();
    let json = serde_json::to_string(&summaries).unwrap_or_else(|_| "[]".to_owned());
    string_to_c(&json)
}

unsafe fn cstr<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{beamlink_node_free, beamlink_node_new};
    use std::ffi::CString;
    use std::ptr;

    #[test]
    fn drop_request_codes_surface_via_ffi() {
        unsafe {
            let node = beamlink_node_new(
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                0,
                ptr::null_mut(),
            );

            let peer = CString::new("nobody").unwrap();
            let files = CString::new(r#"["/tmp/does-not-matter.bin"]"#).unwrap();
            let mut timestamp = 0u64;
            // Node never connected: gate answers code 5.
            let code = beamlink_request_multi_file_drop(
                node,
                peer.as_ptr(),
                files.as_ptr(),
                &mut timestamp,
            );
            assert_eq!(code, 5);

            let bad_json = CString::new("nope").unwrap();
            let code =
                beamlink_request_multi_file_drop(node, peer.as_ptr(), bad_json.as_ptr(), &mut timestamp);
            assert_eq!(code, 2);

            beamlink_node_free(node);
        }
    }

    #[test]
    fn cancel_unknown_session_is_invalid() {
        unsafe {
            let node = beamlink_node_new(
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                0,
                ptr::null_mut(),
            );
            let endpoint = CString::new("10.0.0.5:4000").unwrap();
            let peer = CString::new("peer-a").unwrap();
            assert_eq!(
                beamlink_request_cancel_transfer(node, endpoint.as_ptr(), peer.as_ptr(), 99),
                BeamlinkErrorCode::InvalidArgument as c_int
            );
            beamlink_node_free(node);
        }
    }

    #[test]
    fn session_path_for_unknown_session_is_null() {
        unsafe {
            let node = beamlink_node_new(
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                0,
                ptr::null_mut(),
            );
            assert!(beamlink_session_file_path(node, 1234).is_null());
            beamlink_node_free(node);
        }
    }
}
