//! C callback registration and event dispatch.
//!
//! The UI layer registers plain C function pointers; a runtime task started
//! by `beamlink_service_start` subscribes to the node's event channel and
//! fans events out to whichever callbacks are registered. String arguments
//! are only valid for the duration of the callback.

use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::sync::Mutex;

use tracing::warn;

use beamlink_core::LinkEvent;
use beamlink_sync::ClipboardPayload;

use crate::{BeamlinkNode, NodeHandle};

/// Session status changed. Receives the wire status code.
pub type StatusCallback = unsafe extern "C" fn(status: u8);

/// Client list changed. Receives the full list as a JSON array.
pub type ClientListCallback = unsafe extern "C" fn(json_list: *const c_char);

/// Discovery resolved a peer.
pub type BrowseResultCallback = unsafe extern "C" fn(
    instance_name: *const c_char,
    ip: *const c_char,
    port: u16,
    monitor_name: *const c_char,
    version: *const c_char,
);

/// A peer was confirmed; the link layer should connect to `ip:port`.
pub type ConnectRequestCallback =
    unsafe extern "C" fn(instance_name: *const c_char, ip: *const c_char, port: u16);

/// Multi-file transfer progress.
pub type ProgressCallback = unsafe extern "C" fn(
    sender_ip: *const c_char,
    sender_id: *const c_char,
    sender_name: *const c_char,
    file_name: *const c_char,
    received_files: u32,
    total_files: u32,
    current_file_size: u64,
    total_size: u64,
    received_size: u64,
    timestamp: u64,
);

/// A transfer ended with an error code (5520 = cancelled by user).
pub type TransferFailedCallback = unsafe extern "C" fn(timestamp: u64, code: u32);

/// The peer asked for the local screen descriptor.
pub type AuthDataRequestCallback = unsafe extern "C" fn(peer_index: u32);

/// The peer pushed a clipboard payload. Absent kinds are null.
pub type ClipboardCallback = unsafe extern "C" fn(
    text: *const c_char,
    image_base64: *const c_char,
    html: *const c_char,
);

/// Registered callback set.
#[derive(Default)]
pub struct CallbackTable {
    status: Mutex<Option<StatusCallback>>,
    client_list: Mutex<Option<ClientListCallback>>,
    browse_result: Mutex<Option<BrowseResultCallback>>,
    connect_request: Mutex<Option<ConnectRequestCallback>>,
    progress: Mutex<Option<ProgressCallback>>,
    transfer_failed: Mutex<Option<TransferFailedCallback>>,
    auth_data: Mutex<Option<AuthDataRequestCallback>>,
    clipboard: Mutex<Option<ClipboardCallback>>,
}

impl CallbackTable {
    fn get<T: Copy>(slot: &Mutex<Option<T>>) -> Option<T> {
        *slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set<T>(slot: &Mutex<Option<T>>, value: Option<T>) {
        *slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = value;
    }
}

/// Spawn the event pump that dispatches node events to the table.
pub(crate) fn spawn_dispatch(handle: &NodeHandle) {
    let node = handle.node.clone();
    let callbacks = std::sync::Arc::clone(&handle.callbacks);
    handle.runtime.spawn(async move {
        let mut events = node.subscribe();
        loop {
            match events.recv().await {
                Ok(event) => dispatch(&callbacks, event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("callback dispatch lagged, {n} event(s) dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn dispatch(callbacks: &CallbackTable, event: LinkEvent) {
    match event {
        LinkEvent::StatusChanged(status) => {
            if let Some(cb) = CallbackTable::get(&callbacks.status) {
                unsafe { cb(status.code()) };
            }
        }
        LinkEvent::ClientListChanged(list) => {
            if let Some(cb) = CallbackTable::get(&callbacks.client_list) {
                let json = serde_json::to_string(&list).unwrap_or_else(|_| "[]".to_owned());
                with_cstr(&json, |ptr| unsafe { cb(ptr) });
            }
        }
        LinkEvent::PeerFound(candidate) => {
            if let Some(cb) = CallbackTable::get(&callbacks.browse_result) {
                with_cstrs(
                    &[
                        &candidate.instance_name,
                        &candidate.ip.to_string(),
                        &candidate.monitor_name,
                        &candidate.version,
                    ],
                    |ptrs| unsafe { cb(ptrs[0], ptrs[1], candidate.port, ptrs[2], ptrs[3]) },
                );
            }
        }
        LinkEvent::ConnectRequested(candidate) => {
            if let Some(cb) = CallbackTable::get(&callbacks.connect_request) {
                with_cstrs(
                    &[&candidate.instance_name, &candidate.ip.to_string()],
                    |ptrs| unsafe { cb(ptrs[0], ptrs[1], candidate.port) },
                );
            }
        }
        LinkEvent::TransferProgress(p) => {
            if let Some(cb) = CallbackTable::get(&callbacks.progress) {
                with_cstrs(
                    &[
                        &p.sender_ip.to_string(),
                        &p.sender_id,
                        &p.sender_device_name,
                        &p.current_file_name,
                    ],
                    |ptrs| unsafe {
                        cb(
                            ptrs[0],
                            ptrs[1],
                            ptrs[2],
                            ptrs[3],
                            p.received_file_count,
                            p.total_file_count,
                            p.current_file_size,
                            p.total_size,
                            p.received_size,
                            p.timestamp,
                        )
                    },
                );
            }
        }
        LinkEvent::TransferCompleted(_) => {
            // Completion is visible to C as the final progress event; the
            // session record stays queryable through the node API.
        }
        LinkEvent::TransferFailed { timestamp, code } => {
            if let Some(cb) = CallbackTable::get(&callbacks.transfer_failed) {
                unsafe { cb(timestamp, code) };
            }
        }
        LinkEvent::ClipboardReceived(payload) => {
            if let Some(cb) = CallbackTable::get(&callbacks.clipboard) {
                dispatch_clipboard(cb, &payload);
            }
        }
        LinkEvent::ClipboardOutbound(_) => {
            // Outbound payloads are shipped by the link layer, which drives
            // the node from Rust; no C callback is involved.
        }
        LinkEvent::AuthDataRequested { peer_index } => {
            if let Some(cb) = CallbackTable::get(&callbacks.auth_data) {
                unsafe { cb(peer_index) };
            }
        }
    }
}

fn dispatch_clipboard(cb: ClipboardCallback, payload: &ClipboardPayload) {
    let text = payload.text.as_deref().map(make_cstring);
    let image = payload.image_base64.as_deref().map(make_cstring);
    let html = payload.html.as_deref().map(make_cstring);

    let as_ptr = |o: &Option<CString>| o.as_ref().map_or(std::ptr::null(), |c| c.as_ptr());
    unsafe { cb(as_ptr(&text), as_ptr(&image), as_ptr(&html)) };
}

fn make_cstring(s: &str) -> CString {
    CString::new(s.replace('\0', "\u{FFFD}")).unwrap_or_default()
}

fn with_cstr(s: &str, f: impl FnOnce(*const c_char)) {
    let c = make_cstring(s);
    f(c.as_ptr());
}

fn with_cstrs(strings: &[&str], f: impl FnOnce(&[*const c_char])) {
    let owned: Vec<CString> = strings.iter().map(|s| make_cstring(s)).collect();
    let ptrs: Vec<*const c_char> = owned.iter().map(|c| c.as_ptr()).collect();
    f(&ptrs);
}

macro_rules! callback_setter {
    ($(#[$doc:meta])* $fn_name:ident, $slot:ident, $ty:ty) => {
        $(#[$doc])*
        ///
        /// Passing null unregisters the callback.
        ///
        /// # Safety
        ///
        /// - `node` must be a valid node handle
        /// - `callback`, when non-null, must stay callable for the life of
        ///   the node
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $fn_name(
            node: *mut BeamlinkNode,
            callback: Option<$ty>,
        ) -> c_int {
            if node.is_null() {
                return crate::error::BeamlinkErrorCode::InvalidArgument as c_int;
            }
            let handle = unsafe { &*(node as *const NodeHandle) };
            CallbackTable::set(&handle.callbacks.$slot, callback);
            crate::error::BeamlinkErrorCode::Success as c_int
        }
    };
}

callback_setter!(
    /// Register the session-status callback.
    beamlink_set_status_callback,
    status,
    StatusCallback
);
callback_setter!(
    /// Register the client-list callback.
    beamlink_set_client_list_callback,
    client_list,
    ClientListCallback
);
callback_setter!(
    /// Register the browse-result callback.
    beamlink_set_browse_result_callback,
    browse_result,
    BrowseResultCallback
);
callback_setter!(
    /// Register the connect-request callback.
    beamlink_set_connect_request_callback,
    connect_request,
    ConnectRequestCallback
);
callback_setter!(
    /// Register the multi-file progress callback.
    beamlink_set_progress_callback,
    progress,
    ProgressCallback
);
callback_setter!(
    /// Register the transfer-failed callback.
    beamlink_set_transfer_failed_callback,
    transfer_failed,
    TransferFailedCallback
);
callback_setter!(
    /// Register the auth-data-request callback.
    beamlink_set_auth_data_callback,
    auth_data,
    AuthDataRequestCallback
);
callback_setter!(
    /// Register the clipboard-received callback.
    beamlink_set_clipboard_callback,
    clipboard,
    ClipboardCallback
);
