//! Chunked file reading and writing with running BLAKE3 hashes.
//!
//! Batches stream sequentially, so the reader and writer here are sequential
//! too: the reader hands out chunks in file order while folding them into a
//! hash, and the writer appends chunks while folding them into a hash that is
//! checked against the offer on finalize.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use crate::DEFAULT_CHUNK_SIZE;
use crate::error::{Result, TransferError};

/// Sequential chunk reader with a running whole-file hash.
pub struct HashingReader {
    file: File,
    chunk_size: usize,
    total_size: u64,
    read_so_far: u64,
    hasher: blake3::Hasher,
}

impl HashingReader {
    /// Open a file for chunked reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its metadata read.
    pub fn open<P: AsRef<Path>>(path: P, chunk_size: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        let total_size = file.metadata()?.len();

        Ok(Self {
            file,
            chunk_size,
            total_size,
            read_so_far: 0,
            hasher: blake3::Hasher::new(),
        })
    }

    /// Open with the default chunk size.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its metadata read.
    pub fn with_default_size<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::open(path, DEFAULT_CHUNK_SIZE)
    }

    /// Total file size in bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Bytes handed out so far.
    #[must_use]
    pub fn read_so_far(&self) -> u64 {
        self.read_so_far
    }

    /// Read the next chunk, or `None` at end of file.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the file fails.
    pub fn read_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.read_so_far >= self.total_size {
            return Ok(None);
        }

        let remaining = self.total_size - self.read_so_far;
        let chunk_len = remaining.min(self.chunk_size as u64) as usize;
        let mut buffer = vec![0u8; chunk_len];
        self.file.read_exact(&mut buffer)?;

        self.hasher.update(&buffer);
        self.read_so_far += chunk_len as u64;

        Ok(Some(buffer))
    }

    /// Finish and return the lowercase hex hash of everything read.
    #[must_use]
    pub fn finish_hash(self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

/// Hash a whole file without keeping its content.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn hash_file<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let mut reader = HashingReader::with_default_size(path)?;
    while reader.read_chunk()?.is_some() {}
    Ok(reader.finish_hash())
}

/// Sequential chunk writer that verifies size and hash on finalize.
pub struct VerifyingWriter {
    file: File,
    expected_size: u64,
    written: u64,
    hasher: blake3::Hasher,
}

impl VerifyingWriter {
    /// Create (truncate) the destination file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, expected_size: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file,
            expected_size,
            written: 0,
            hasher: blake3::Hasher::new(),
        })
    }

    /// Append a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk would exceed the expected size or the
    /// write fails.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        let next = self.written + data.len() as u64;
        if next > self.expected_size {
            return Err(TransferError::Protocol(format!(
                "received {next} bytes, expected {}",
                self.expected_size
            )));
        }

        self.file.write_all(data)?;
        self.hasher.update(data);
        self.written = next;
        Ok(())
    }

    /// Bytes written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Whether all expected bytes have arrived.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.written == self.expected_size
    }

    /// Sync, verify size and hash, and close.
    ///
    /// `expected_hash` is the lowercase hex BLAKE3 hash from the batch offer.
    ///
    /// # Errors
    ///
    /// Returns an error if bytes are missing, the hash disagrees, or syncing
    /// fails. The file name is only used for the error message.
    pub fn finalize(mut self, file_name: &str, expected_hash: &str) -> Result<()> {
        if !self.is_complete() {
            return Err(TransferError::Protocol(format!(
                "incomplete file '{file_name}': {}/{} bytes",
                self.written, self.expected_size
            )));
        }

        let actual = self.hasher.finalize().to_hex().to_string();
        if !expected_hash.is_empty() && actual != expected_hash {
            return Err(TransferError::HashMismatch(file_name.to_owned()));
        }

        self.file.sync_all()?;
        Ok(())
    }
}

/// Strip path components from a peer-supplied file name.
///
/// Batch offers carry bare names; anything that looks like a path is reduced
/// to its final component so a peer cannot write outside the download
/// directory.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let stripped = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim_matches(['.', ' '].as_slice());
    if stripped.is_empty() {
        "unnamed".to_owned()
    } else {
        stripped.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn reader_chunks_and_hashes() {
        let mut temp = NamedTempFile::new().unwrap();
        let data = vec![0x5A; DEFAULT_CHUNK_SIZE + 100];
        temp.write_all(&data).unwrap();
        temp.flush().unwrap();

        let mut reader = HashingReader::with_default_size(temp.path()).unwrap();
        assert_eq!(reader.total_size(), data.len() as u64);

        let first = reader.read_chunk().unwrap().unwrap();
        assert_eq!(first.len(), DEFAULT_CHUNK_SIZE);
        let second = reader.read_chunk().unwrap().unwrap();
        assert_eq!(second.len(), 100);
        assert!(reader.read_chunk().unwrap().is_none());

        assert_eq!(reader.finish_hash(), blake3::hash(&data).to_hex().to_string());
    }

    #[test]
    fn writer_roundtrip_verifies_hash() {
        let data = b"hello beamlink".to_vec();
        let expected = blake3::hash(&data).to_hex().to_string();

        let out = NamedTempFile::new().unwrap();
        let mut writer = VerifyingWriter::create(out.path(), data.len() as u64).unwrap();
        writer.write_chunk(&data[..5]).unwrap();
        writer.write_chunk(&data[5..]).unwrap();
        assert!(writer.is_complete());
        writer.finalize("hello.txt", &expected).unwrap();

        assert_eq!(std::fs::read(out.path()).unwrap(), data);
    }

    #[test]
    fn writer_rejects_wrong_hash() {
        let out = NamedTempFile::new().unwrap();
        let mut writer = VerifyingWriter::create(out.path(), 3).unwrap();
        writer.write_chunk(b"abc").unwrap();

        let err = writer.finalize("abc.bin", &"00".repeat(32)).unwrap_err();
        assert!(matches!(err, TransferError::HashMismatch(_)));
    }

    #[test]
    fn writer_rejects_overflow() {
        let out = NamedTempFile::new().unwrap();
        let mut writer = VerifyingWriter::create(out.path(), 2).unwrap();
        let err = writer.write_chunk(b"abc").unwrap_err();
        assert!(matches!(err, TransferError::Protocol(_)));
    }

    #[test]
    fn empty_file_hashes() {
        let temp = NamedTempFile::new().unwrap();
        let mut reader = HashingReader::with_default_size(temp.path()).unwrap();
        assert!(reader.read_chunk().unwrap().is_none());
        assert_eq!(
            reader.finish_hash(),
            blake3::hash(b"").to_hex().to_string()
        );
    }

    #[test]
    fn sanitize_strips_paths_and_dots() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\x\\doc.txt"), "doc.txt");
        assert_eq!(sanitize_file_name("..."), "unnamed");
        assert_eq!(sanitize_file_name(""), "unnamed");
    }
}
