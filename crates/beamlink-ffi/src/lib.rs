//! C-compatible FFI bindings for the beamlink session core.
//!
//! Every function takes an opaque node handle created by
//! [`service::beamlink_node_new`]. Status codes come back as `c_int`
//! (0 = success); functions with an `error_out` parameter additionally
//! write a heap-allocated error string the caller must release with
//! [`error::beamlink_string_free`].
//!
//! Events are push, not poll: register C function pointers via the
//! `beamlink_set_*_callback` functions and they fire from a runtime task
//! after `beamlink_service_start`.

#![warn(clippy::all)]
#![allow(clippy::missing_safety_doc)] // every extern fn carries its own Safety section

pub mod callbacks;
pub mod error;
pub mod service;
pub mod sync;
pub mod transfer;

use std::sync::Arc;

use tokio::runtime::Runtime;

use beamlink_core::LinkNode;

use crate::callbacks::CallbackTable;

/// Opaque node handle exposed to C.
pub enum BeamlinkNode {}

/// Internal handle backing [`BeamlinkNode`].
pub(crate) struct NodeHandle {
    pub(crate) node: LinkNode,
    pub(crate) runtime: Arc<Runtime>,
    pub(crate) callbacks: Arc<CallbackTable>,
}

/// Evaluate a `Result`; on error, populate `error_out` and return the
/// error's status code.
macro_rules! ffi_try {
    ($expr:expr, $error_out:expr) => {
        match $expr {
            Ok(value) => value,
            Err(e) => {
                let err = crate::error::BeamlinkError::from(e);
                if !$error_out.is_null() {
                    unsafe { *$error_out = err.to_c_string() };
                }
                return err.code() as std::os::raw::c_int;
            }
        }
    };
}

/// Evaluate a `Result` in a pointer-returning function; on error, populate
/// `error_out` and return null.
macro_rules! ffi_try_ptr {
    ($expr:expr, $error_out:expr) => {
        match $expr {
            Ok(value) => value,
            Err(e) => {
                let err = crate::error::BeamlinkError::from(e);
                if !$error_out.is_null() {
                    unsafe { *$error_out = err.to_c_string() };
                }
                return std::ptr::null_mut();
            }
        }
    };
}

pub(crate) use ffi_try;
pub(crate) use ffi_try_ptr;
