//! Node lifecycle, status, discovery, and client-list FFI.

use std::ffi::CStr;
use std::net::Ipv4Addr;
use std::os::raw::{c_char, c_int};
use std::sync::Arc;

use tokio::runtime::Runtime;

use beamlink_core::node::NodeConfig;
use beamlink_core::{ClientInfo, LinkNode, LinkStatus};

use crate::callbacks::{CallbackTable, spawn_dispatch};
use crate::error::{BeamlinkError, BeamlinkErrorCode};
use crate::{BeamlinkNode, NodeHandle, ffi_try, ffi_try_ptr};

unsafe fn opt_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

pub(crate) unsafe fn handle_ref<'a>(node: *mut BeamlinkNode) -> Option<&'a NodeHandle> {
    if node.is_null() {
        None
    } else {
        Some(unsafe { &*(node as *const NodeHandle) })
    }
}

/// Create a node.
///
/// - `device_name` - name shown to peers (null uses a default)
/// - `device_id` - stable peer id (null or empty generates one)
/// - `monitor_name` - advertised display name (null uses a default)
/// - `listen_host` - IPv4 address to advertise (null autodetects)
/// - `listen_port` - transfer listen port (0 picks an ephemeral port)
///
/// # Safety
///
/// - String arguments must be null or valid NUL-terminated UTF-8
/// - `error_out` must be null or a valid pointer to receive an error string
/// - The returned handle must be released with `beamlink_node_free()`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_node_new(
    device_name: *const c_char,
    device_id: *const c_char,
    monitor_name: *const c_char,
    listen_host: *const c_char,
    listen_port: u16,
    error_out: *mut *mut c_char,
) -> *mut BeamlinkNode {
    let mut config = NodeConfig::default();
    if let Some(name) = unsafe { opt_str(device_name) } {
        config.device_name = name.to_owned();
    }
    if let Some(id) = unsafe { opt_str(device_id) } {
        if !id.is_empty() {
            config.device_id = id.to_owned();
        }
    }
    if let Some(monitor) = unsafe { opt_str(monitor_name) } {
        config.monitor_name = monitor.to_owned();
    }
    if let Some(host) = unsafe { opt_str(listen_host) } {
        let parsed = ffi_try_ptr!(
            host.parse::<Ipv4Addr>()
                .map_err(|e| BeamlinkError::invalid_argument(format!("listen_host: {e}"))),
            error_out
        );
        config.listen_ip = Some(parsed);
    }
    config.listen_port = listen_port;

    let runtime = ffi_try_ptr!(
        Runtime::new().map_err(|e| BeamlinkError::runtime(e.to_string())),
        error_out
    );

    let node = LinkNode::new(config);
    let handle = Box::new(NodeHandle {
        node,
        runtime: Arc::new(runtime),
        callbacks: Arc::new(CallbackTable::default()),
    });
    Box::into_raw(handle) as *mut BeamlinkNode
}

/// Free a node handle, stopping the node if it is running.
///
/// # Safety
///
/// - `node` must be a valid handle from `beamlink_node_new()` or null
/// - `node` must not be used after this call
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_node_free(node: *mut BeamlinkNode) {
    if node.is_null() {
        return;
    }
    let handle = unsafe { Box::from_raw(node as *mut NodeHandle) };
    handle.node.stop();
    drop(handle);
}

/// Start the service: storage, transfer listener, event dispatch, mDNS
/// advertisement.
///
/// Idempotent: calling it on a running node refreshes the advertised
/// listen address without a restart.
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - `error_out` must be null or a valid pointer to receive an error string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_service_start(
    node: *mut BeamlinkNode,
    error_out: *mut *mut c_char,
) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };

    let was_running = handle.node.is_running();
    let node_clone = handle.node.clone();
    let runtime = Arc::clone(&handle.runtime);
    ffi_try!(
        runtime.block_on(async move { node_clone.start().await }),
        error_out
    );

    if !was_running {
        spawn_dispatch(handle);
    }
    BeamlinkErrorCode::Success as c_int
}

/// Stop the service.
///
/// # Safety
///
/// - `node` must be a valid node handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_service_stop(node: *mut BeamlinkNode) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    handle.node.stop();
    BeamlinkErrorCode::Success as c_int
}

/// Feed an authoritative session-status update (wire code) into the node.
///
/// # Safety
///
/// - `node` must be a valid node handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_apply_status(node: *mut BeamlinkNode, status: u8) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let Some(status) = LinkStatus::from_code(status) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let _guard = handle.runtime.enter();
    handle.node.apply_status(status);
    BeamlinkErrorCode::Success as c_int
}

/// Start browsing for peers (unfiltered).
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - `error_out` must be null or a valid pointer to receive an error string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_browse_peers(
    node: *mut BeamlinkNode,
    error_out: *mut *mut c_char,
) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let _guard = handle.runtime.enter();
    ffi_try!(handle.node.start_discovery(None), error_out);
    BeamlinkErrorCode::Success as c_int
}

/// Stop browsing and clear the discovered-peer list.
///
/// # Safety
///
/// - `node` must be a valid node handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_clear_peer_list(node: *mut BeamlinkNode) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    handle.node.stop_discovery();
    BeamlinkErrorCode::Success as c_int
}

/// Confirm a discovered peer by instance name.
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - `instance_name` must be valid NUL-terminated UTF-8
/// - `error_out` must be null or a valid pointer to receive an error string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_confirm_peer(
    node: *mut BeamlinkNode,
    instance_name: *const c_char,
    error_out: *mut *mut c_char,
) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let Some(name) = (unsafe { opt_str(instance_name) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let _guard = handle.runtime.enter();
    ffi_try!(handle.node.confirm_peer(name), error_out);
    BeamlinkErrorCode::Success as c_int
}

/// User-forced return to discovery, dropping the current session and the
/// persisted auto-reconnect preference.
///
/// `confirmed` must be non-zero: the caller is expected to have warned the
/// user that this disconnects the current session.
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - `error_out` must be null or a valid pointer to receive an error string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_force_research(
    node: *mut BeamlinkNode,
    confirmed: c_int,
    error_out: *mut *mut c_char,
) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let _guard = handle.runtime.enter();
    ffi_try!(handle.node.force_research(confirmed != 0), error_out);
    BeamlinkErrorCode::Success as c_int
}

/// Apply a single-client status update. `active` non-zero upserts, zero
/// removes by `(ip, id)`.
///
/// `json_client` carries a `ClientInfo` object.
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - `json_client` must be valid NUL-terminated UTF-8
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_apply_client_update(
    node: *mut BeamlinkNode,
    json_client: *const c_char,
    active: c_int,
) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let Some(json) = (unsafe { opt_str(json_client) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let Ok(info) = serde_json::from_str::<ClientInfo>(json) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    handle.node.apply_client_update(info, active != 0);
    BeamlinkErrorCode::Success as c_int
}

/// Replace the client registry with a full snapshot (JSON array of
/// `ClientInfo`). A snapshot with the same ordered `(ip, id)` sequence
/// produces no change event.
///
/// # Safety
///
/// - `node` must be a valid node handle
/// - `json_list` must be valid NUL-terminated UTF-8
#[unsafe(no_mangle)]
pub unsafe extern "C" fn beamlink_apply_client_snapshot(
    node: *mut BeamlinkNode,
    json_list: *const c_char,
) -> c_int {
    let Some(handle) = (unsafe { handle_ref(node) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let Some(json) = (unsafe { opt_str(json_list) }) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    let Ok(list) = serde_json::from_str::<Vec<ClientInfo>>(json) else {
        return BeamlinkErrorCode::InvalidArgument as c_int;
    };
    handle.node.apply_client_snapshot(list);
    BeamlinkErrorCode::Success as c_int
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    #[test]
    fn node_lifecycle_via_ffi() {
        unsafe {
            let name = CString::new("ffi-test").unwrap();
            let node = beamlink_node_new(
                name.as_ptr(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                0,
                ptr::null_mut(),
            );
            assert!(!node.is_null());

            // Unknown status code is rejected.
            assert_eq!(
                beamlink_apply_status(node, 42),
                BeamlinkErrorCode::InvalidArgument as c_int
            );
            assert_eq!(
                beamlink_apply_status(node, 7),
                BeamlinkErrorCode::Success as c_int
            );

            beamlink_node_free(node);
        }
    }

    #[test]
    fn null_node_is_invalid_argument() {
        unsafe {
            assert_eq!(
                beamlink_service_stop(ptr::null_mut()),
                BeamlinkErrorCode::InvalidArgument as c_int
            );
            assert_eq!(
                beamlink_clear_peer_list(ptr::null_mut()),
                BeamlinkErrorCode::InvalidArgument as c_int
            );
        }
    }

    #[test]
    fn client_updates_via_json() {
        unsafe {
            let node = beamlink_node_new(
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                0,
                ptr::null_mut(),
            );

            let client = CString::new(
                r#"{"id":"A","ip":"10.0.0.5","name":"Den PC","device_type":"desktop","source_kind":"Cast","source_port":40123,"version":"1"}"#,
            )
            .unwrap();
            assert_eq!(
                beamlink_apply_client_update(node, client.as_ptr(), 1),
                BeamlinkErrorCode::Success as c_int
            );

            let bad = CString::new("not json").unwrap();
            assert_eq!(
                beamlink_apply_client_update(node, bad.as_ptr(), 1),
                BeamlinkErrorCode::InvalidArgument as c_int
            );

            beamlink_node_free(node);
        }
    }
}
