//! Batch streaming protocol.
//!
//! A batch moves over one TCP connection:
//!
//! ```text
//! Sender                              Receiver
//!     |-- BatchOffer (json frame) ------->|
//!     |<------ BatchReceipt (accept) -----|
//!     |-- file 0 bytes ------------------>|
//!     |-- file 1 bytes ------------------>|
//!     |-- ...                             |
//!     |<------ BatchReceipt (final) ------|
//! ```
//!
//! Control frames are a u32 big-endian length followed by JSON. File content
//! is raw bytes, streamed in chunk-sized writes; the receiver knows every
//! file's size and BLAKE3 hash from the offer.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::chunker::{HashingReader, VerifyingWriter, hash_file, sanitize_file_name};
use crate::error::{Result, TransferError};
use crate::session::TransferProgress;
use crate::FileEntry;

/// Upper bound on a control frame, to stop a hostile peer from forcing a
/// huge allocation.
const MAX_FRAME_LEN: u32 = 1024 * 1024;

/// Batch offer: everything the receiver needs to admit and verify a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOffer {
    /// Batch id, milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Sender's peer id.
    pub sender_id: String,
    /// Sender's device name.
    pub sender_name: String,
    /// Files in streaming order.
    pub files: Vec<FileEntry>,
}

impl BatchOffer {
    /// Total bytes across the batch.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Accept/decline answer to an offer, also sent again after the last file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    /// Batch id being answered.
    pub timestamp: u64,
    /// Whether the batch was (or remained) accepted.
    pub accepted: bool,
    /// Decline or failure reason, when not accepted.
    pub reason: Option<String>,
}

/// Identity the sending side stamps on its own progress events.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    /// Local IPv4 address.
    pub ip: Ipv4Addr,
    /// Local peer id.
    pub id: String,
    /// Local device name.
    pub device_name: String,
}

/// Write one length-prefixed JSON frame.
///
/// # Errors
///
/// Returns an error if encoding or the socket write fails.
pub async fn write_frame<W, T>(stream: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value)?;
    if body.len() as u64 > u64::from(MAX_FRAME_LEN) {
        return Err(TransferError::Protocol("frame too large".into()));
    }
    stream.write_all(&(body.len() as u32).to_be_bytes()).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one length-prefixed JSON frame.
///
/// # Errors
///
/// Returns an error if the socket read fails, the length exceeds the frame
/// bound, or the body is not valid JSON for `T`.
pub async fn read_frame<R, T>(stream: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(TransferError::Protocol(format!(
            "frame length {len} exceeds limit"
        )));
    }
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Build an offer by stat-ing and hashing the given files.
///
/// # Errors
///
/// Returns an error if any path is unreadable or is not a regular file.
pub fn offer_from_paths(
    paths: &[PathBuf],
    timestamp: u64,
    sender_id: &str,
    sender_name: &str,
) -> Result<BatchOffer> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(TransferError::Protocol(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(sanitize_file_name)
            .unwrap_or_else(|| "unnamed".to_owned());
        files.push(FileEntry {
            name,
            size: meta.len(),
            hash: hash_file(path)?,
        });
    }
    Ok(BatchOffer {
        timestamp,
        sender_id: sender_id.to_owned(),
        sender_name: sender_name.to_owned(),
        files,
    })
}

/// Stream a batch to a connected peer.
///
/// Emits a progress event per chunk plus one final event per file. Checks
/// `cancel` between chunks and gives up with [`TransferError::Cancelled`]
/// when it is set.
///
/// # Errors
///
/// Returns an error if the peer declines, the socket fails, a file changes
/// under us mid-stream, or the transfer is cancelled.
pub async fn send_batch<S>(
    stream: &mut S,
    offer: &BatchOffer,
    paths: &[PathBuf],
    identity: &LocalIdentity,
    chunk_size: usize,
    cancel: &AtomicBool,
    on_progress: &mut (dyn FnMut(TransferProgress) + Send),
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug_assert_eq!(offer.files.len(), paths.len());

    write_frame(stream, offer).await?;
    let receipt: BatchReceipt = read_frame(stream).await?;
    if !receipt.accepted {
        return Err(TransferError::Declined(
            receipt.reason.unwrap_or_else(|| "no reason given".into()),
        ));
    }

    let total_size = offer.total_size();
    let total_files = offer.files.len() as u32;
    let mut sent_size: u64 = 0;

    for (index, (entry, path)) in offer.files.iter().zip(paths).enumerate() {
        let mut reader = HashingReader::open(path, chunk_size)?;
        if reader.total_size() != entry.size {
            return Err(TransferError::Protocol(format!(
                "'{}' changed size since the offer",
                entry.name
            )));
        }

        while let Some(chunk) = reader.read_chunk()? {
            if cancel.load(Ordering::Relaxed) {
                return Err(TransferError::Cancelled);
            }
            stream.write_all(&chunk).await?;
            sent_size += chunk.len() as u64;

            on_progress(progress_event(
                offer,
                identity,
                entry,
                index as u32,
                total_files,
                total_size,
                sent_size,
            ));
        }

        // Empty files produce no chunk; still announce the file as done.
        on_progress(progress_event(
            offer,
            identity,
            entry,
            index as u32 + 1,
            total_files,
            total_size,
            sent_size,
        ));
    }
    stream.flush().await?;

    let final_receipt: BatchReceipt = read_frame(stream).await?;
    if !final_receipt.accepted {
        return Err(TransferError::Declined(
            final_receipt.reason.unwrap_or_else(|| "receive failed".into()),
        ));
    }
    Ok(())
}

/// Decline an already-read offer.
///
/// # Errors
///
/// Returns an error if the receipt cannot be written.
pub async fn decline<S>(stream: &mut S, offer: &BatchOffer, reason: &str) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    write_frame(
        stream,
        &BatchReceipt {
            timestamp: offer.timestamp,
            accepted: false,
            reason: Some(reason.to_owned()),
        },
    )
    .await
}

/// Accept an already-read offer and receive every file into `dest_dir`.
///
/// Progress events are stamped with the sender identity from the offer and
/// the peer's socket address. `on_file` fires once per file, after its hash
/// verifies and before its final progress event, so callers can record the
/// landing path before any completion becomes observable. Returns the paths
/// the files landed at, in batch order.
///
/// # Errors
///
/// Returns an error on socket failure, hash mismatch, or cancellation. The
/// final receipt tells the sender which of those happened.
pub async fn receive_accepted<S>(
    stream: &mut S,
    offer: &BatchOffer,
    peer_ip: Ipv4Addr,
    dest_dir: &Path,
    chunk_size: usize,
    cancel: &AtomicBool,
    on_progress: &mut (dyn FnMut(TransferProgress) + Send),
    on_file: &mut (dyn FnMut(usize, &Path) + Send),
) -> Result<Vec<PathBuf>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_frame(
        stream,
        &BatchReceipt {
            timestamp: offer.timestamp,
            accepted: true,
            reason: None,
        },
    )
    .await?;

    let identity = LocalIdentity {
        ip: peer_ip,
        id: offer.sender_id.clone(),
        device_name: offer.sender_name.clone(),
    };
    let total_size = offer.total_size();
    let total_files = offer.files.len() as u32;
    let mut received_size: u64 = 0;
    let mut received_paths = Vec::with_capacity(offer.files.len());

    let outcome = async {
        for (index, entry) in offer.files.iter().enumerate() {
            let dest = unique_dest_path(dest_dir, &sanitize_file_name(&entry.name));
            let mut writer = VerifyingWriter::create(&dest, entry.size)?;

            let mut remaining = entry.size;
            let mut buffer = vec![0u8; chunk_size];
            while remaining > 0 {
                if cancel.load(Ordering::Relaxed) {
                    return Err(TransferError::Cancelled);
                }
                let want = remaining.min(chunk_size as u64) as usize;
                stream.read_exact(&mut buffer[..want]).await?;
                writer.write_chunk(&buffer[..want])?;
                remaining -= want as u64;
                received_size += want as u64;

                on_progress(progress_event(
                    offer,
                    &identity,
                    entry,
                    index as u32,
                    total_files,
                    total_size,
                    received_size,
                ));
            }

            writer.finalize(&entry.name, &entry.hash)?;
            debug!("received '{}' -> {}", entry.name, dest.display());
            on_file(index, &dest);
            received_paths.push(dest);

            on_progress(progress_event(
                offer,
                &identity,
                entry,
                index as u32 + 1,
                total_files,
                total_size,
                received_size,
            ));
        }
        Ok(())
    }
    .await;

    match outcome {
        Ok(()) => {
            write_frame(
                stream,
                &BatchReceipt {
                    timestamp: offer.timestamp,
                    accepted: true,
                    reason: None,
                },
            )
            .await?;
            Ok(received_paths)
        }
        Err(e) => {
            // Best effort: the socket may already be gone.
            let _ = write_frame(
                stream,
                &BatchReceipt {
                    timestamp: offer.timestamp,
                    accepted: false,
                    reason: Some(e.to_string()),
                },
            )
            .await;
            Err(e)
        }
    }
}

fn progress_event(
    offer: &BatchOffer,
    identity: &LocalIdentity,
    current: &FileEntry,
    received_files: u32,
    total_files: u32,
    total_size: u64,
    received_size: u64,
) -> TransferProgress {
    TransferProgress {
        sender_ip: identity.ip,
        sender_id: identity.id.clone(),
        sender_device_name: identity.device_name.clone(),
        current_file_name: current.name.clone(),
        received_file_count: received_files.min(total_files),
        total_file_count: total_files,
        current_file_size: current.size,
        total_size,
        received_size,
        timestamp: offer.timestamp,
    }
}

/// Pick a destination path that does not clobber an existing file.
fn unique_dest_path(dir: &Path, name: &str) -> PathBuf {
    let first = dir.join(name);
    if !first.exists() {
        return first;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s.to_owned(), format!(".{e}")),
        _ => (name.to_owned(), String::new()),
    };
    for n in 1u32.. {
        let candidate = dir.join(format!("{stem}-{n}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("u32 exhausted finding a unique file name");
}
