//! Transfer session records and progress accounting.
//!
//! Every progress event carries a millisecond `timestamp` that identifies
//! the batch it belongs to; the first event for an unknown timestamp creates
//! the session record, later ones mutate it. Byte and file counters never
//! move backwards, and completion is marked exactly once even when further
//! events repeat the final byte counts.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Error code attached to a session cancelled by the user.
pub const ERROR_CANCELLED: u32 = 5520;

/// Error code attached to a session that failed for any other reason
/// (socket drop, hash mismatch, declined batch).
pub const ERROR_TRANSFER_FAILED: u32 = 5500;

/// Wire status codes answered to a drop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DropStatus {
    /// Request accepted; a session was created.
    Accepted = 1,
    /// File list was empty, unreadable, or otherwise invalid.
    InvalidParams = 2,
    /// An outbound transfer is already in flight.
    SendBusy = 3,
    /// An inbound transfer is already in flight.
    ReceiveBusy = 4,
    /// The engine has not been initialized yet.
    NotInitialized = 5,
}

impl DropStatus {
    /// Numeric wire code.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire code; unknown codes map to `None`.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Accepted),
            2 => Some(Self::InvalidParams),
            3 => Some(Self::SendBusy),
            4 => Some(Self::ReceiveBusy),
            5 => Some(Self::NotInitialized),
            _ => None,
        }
    }
}

/// One progress observation for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Sender's IPv4 address.
    pub sender_ip: Ipv4Addr,
    /// Sender's peer id.
    pub sender_id: String,
    /// Sender's device name.
    pub sender_device_name: String,
    /// Name of the file currently streaming.
    pub current_file_name: String,
    /// Files fully received so far.
    pub received_file_count: u32,
    /// Total files in the batch.
    pub total_file_count: u32,
    /// Size of the file currently streaming.
    pub current_file_size: u64,
    /// Total bytes in the batch.
    pub total_size: u64,
    /// Bytes received so far across the batch.
    pub received_size: u64,
    /// Batch id: milliseconds since the Unix epoch at batch creation.
    pub timestamp: u64,
}

impl TransferProgress {
    /// Completed fraction in `[0, 1]`. A zero-byte batch reports 0 rather
    /// than dividing by zero.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            (self.received_size as f64 / self.total_size as f64).clamp(0.0, 1.0)
        }
    }
}

/// Mutable record of one batch, owned by the engine.
///
/// Consumers receive clones; the engine is the only writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSession {
    /// Batch id (see [`TransferProgress::timestamp`]).
    pub timestamp: u64,
    /// Sender's IPv4 address.
    pub sender_ip: Ipv4Addr,
    /// Sender's peer id.
    pub sender_id: String,
    /// Sender's device name.
    pub sender_device_name: String,
    /// Name of the file currently (or last) streaming.
    pub current_file_name: String,
    /// Files fully received so far.
    pub received_file_count: u32,
    /// Total files in the batch.
    pub total_file_count: u32,
    /// Size of the current file.
    pub current_file_size: u64,
    /// Total bytes in the batch.
    pub total_size: u64,
    /// Bytes received so far.
    pub received_size: u64,
    /// Session creation time (ms since epoch).
    pub start_ms: u64,
    /// Completion time, stamped exactly once.
    pub finish_ms: Option<u64>,
    /// Terminal error code, if the session failed or was cancelled.
    pub error_code: Option<u32>,
    /// Where the first received file landed (receive side only).
    pub first_file_path: Option<PathBuf>,
}

impl TransferSession {
    /// Create a session from its first progress observation.
    #[must_use]
    pub fn from_progress(progress: &TransferProgress, now_ms: u64) -> Self {
        Self {
            timestamp: progress.timestamp,
            sender_ip: progress.sender_ip,
            sender_id: progress.sender_id.clone(),
            sender_device_name: progress.sender_device_name.clone(),
            current_file_name: progress.current_file_name.clone(),
            received_file_count: progress.received_file_count,
            total_file_count: progress.total_file_count,
            current_file_size: progress.current_file_size,
            total_size: progress.total_size,
            received_size: progress.received_size,
            start_ms: now_ms,
            finish_ms: None,
            error_code: None,
            first_file_path: None,
        }
    }

    /// Fold a progress observation into the record.
    ///
    /// Counters are monotonic: an observation with smaller byte or file
    /// counts than already recorded updates only the current-file fields.
    /// Returns `true` when this observation completed the session; repeat
    /// observations at the final counts return `false` and leave
    /// `finish_ms` untouched.
    pub fn apply_progress(&mut self, progress: &TransferProgress, now_ms: u64) -> bool {
        if self.is_terminal() && self.finish_ms.is_some() {
            return false;
        }

        self.current_file_name = progress.current_file_name.clone();
        self.current_file_size = progress.current_file_size;
        self.total_file_count = self.total_file_count.max(progress.total_file_count);
        self.total_size = self.total_size.max(progress.total_size);
        self.received_file_count = self.received_file_count.max(progress.received_file_count);
        self.received_size = self.received_size.max(progress.received_size);

        if self.error_code.is_none() && self.finish_ms.is_none() && self.all_bytes_arrived() {
            self.finish_ms = Some(now_ms);
            return true;
        }
        false
    }

    // A zero-byte batch (only empty files) completes on file counts instead.
    fn all_bytes_arrived(&self) -> bool {
        if self.total_size > 0 {
            self.received_size >= self.total_size
        } else {
            self.total_file_count > 0 && self.received_file_count >= self.total_file_count
        }
    }

    /// Attach a terminal error code. A session that already completed or
    /// failed keeps its original outcome.
    pub fn mark_error(&mut self, code: u32, now_ms: u64) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.error_code = Some(code);
        self.finish_ms = Some(now_ms);
        true
    }

    /// Completed fraction in `[0, 1]`; 0 when the batch size is zero.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            (self.received_size as f64 / self.total_size as f64).clamp(0.0, 1.0)
        }
    }

    /// All bytes arrived and no error was recorded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error_code.is_none() && self.all_bytes_arrived()
    }

    /// Completed, failed, or cancelled.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.error_code.is_some() || self.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(timestamp: u64, received: u64, total: u64) -> TransferProgress {
        TransferProgress {
            sender_ip: Ipv4Addr::new(10, 0, 0, 5),
            sender_id: "peer-a".into(),
            sender_device_name: "Den PC".into(),
            current_file_name: "a.bin".into(),
            received_file_count: 0,
            total_file_count: 1,
            current_file_size: total,
            total_size: total,
            received_size: received,
            timestamp,
        }
    }

    #[test]
    fn zero_total_reports_zero_fraction() {
        assert_eq!(progress(1, 0, 0).fraction(), 0.0);
        let session = TransferSession::from_progress(&progress(1, 0, 0), 10);
        assert_eq!(session.fraction(), 0.0);
    }

    #[test]
    fn completion_is_stamped_exactly_once() {
        let mut session = TransferSession::from_progress(&progress(7, 50, 100), 10);
        assert!(!session.is_complete());

        assert!(session.apply_progress(&progress(7, 100, 100), 20));
        assert_eq!(session.finish_ms, Some(20));
        assert!(session.is_complete());

        // A repeated final observation must not re-stamp.
        assert!(!session.apply_progress(&progress(7, 100, 100), 99));
        assert_eq!(session.finish_ms, Some(20));
    }

    #[test]
    fn counters_never_regress() {
        let mut session = TransferSession::from_progress(&progress(7, 80, 100), 10);
        session.apply_progress(&progress(7, 30, 100), 11);
        assert_eq!(session.received_size, 80);
    }

    #[test]
    fn error_is_terminal_and_sticky() {
        let mut session = TransferSession::from_progress(&progress(7, 10, 100), 10);
        assert!(session.mark_error(ERROR_CANCELLED, 15));
        assert_eq!(session.error_code, Some(ERROR_CANCELLED));
        assert!(session.is_terminal());
        assert!(!session.is_complete());

        // Neither a second error nor late progress changes the outcome.
        assert!(!session.mark_error(1, 16));
        assert!(!session.apply_progress(&progress(7, 100, 100), 17));
        assert_eq!(session.error_code, Some(ERROR_CANCELLED));
    }

    #[test]
    fn completed_session_ignores_late_error() {
        let mut session = TransferSession::from_progress(&progress(7, 100, 100), 10);
        assert!(session.apply_progress(&progress(7, 100, 100), 10) || session.is_complete());
        assert!(!session.mark_error(ERROR_CANCELLED, 11));
        assert_eq!(session.error_code, None);
    }

    #[test]
    fn drop_status_codes_roundtrip() {
        for status in [
            DropStatus::Accepted,
            DropStatus::InvalidParams,
            DropStatus::SendBusy,
            DropStatus::ReceiveBusy,
            DropStatus::NotInitialized,
        ] {
            assert_eq!(DropStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(DropStatus::from_code(0), None);
        assert_eq!(DropStatus::from_code(99), None);
    }
}
