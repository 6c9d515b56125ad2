// File:    transfer.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: A bounded-buffer pump with exact offset and remainder accounting, shared by key generation, checksums and raw copies.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

//! The chunked transfer engine.
//!
//! Every chunk opens its file or device, seeks to the chunk offset, performs
//! one read or write and closes the handle again. Nothing is held open across
//! chunks, so a path that is swapped or remounted between chunks is picked up
//! on the next one, and every failure can be reported with the exact offset
//! it happened at.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;

use crate::cancel::CancelToken;
use crate::error::{OtpError, Result};

/// Accounting for one chunked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferState {
    /// Offset the next chunk starts at.
    pub offset: u64,
    /// Bytes moved so far.
    pub transferred: u64,
    /// Bytes still to move; zero for open-ended reads.
    pub remaining: u64,
    /// Size of the chunk just moved.
    pub chunk_size: usize,
}

/// One planned chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Absolute offset of the chunk.
    pub offset: u64,
    /// Length of the chunk in bytes.
    pub len: usize,
}

/// Splits `total` bytes into consecutive chunks of at most `chunk_size` bytes.
///
/// The last chunk is sized exactly to what remains. A total of zero yields no
/// chunks.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    total: u64,
    chunk_size: u64,
    offset: u64,
}

impl ChunkPlan {
    /// Plans a transfer; a zero `chunk_size` is treated as one byte.
    #[must_use]
    pub fn new(total: u64, chunk_size: usize) -> Self {
        Self {
            total,
            chunk_size: (chunk_size as u64).max(1),
            offset: 0,
        }
    }

    /// The chunk size actually used: `chunk_size` clamped to `total`.
    #[must_use]
    pub fn effective_chunk_size(&self) -> u64 {
        if self.total > 0 && self.total < self.chunk_size {
            self.total
        } else {
            self.chunk_size
        }
    }
}

impl Iterator for ChunkPlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let remainder = self.total - self.offset;
        if remainder == 0 {
            return None;
        }
        let len = remainder.min(self.chunk_size);
        let chunk = Chunk {
            offset: self.offset,
            len: len as usize,
        };
        self.offset += len;
        Some(chunk)
    }
}

/// Opens `path`, seeks to `offset`, fills as much of `buf` as the source
/// provides and closes the handle. Returns the number of bytes read; zero
/// means end of stream.
///
/// # Errors
///
/// Returns any error from opening, seeking or reading.
pub fn read_at(path: &Path, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Opens `path` for create and write, seeks to `offset`, writes all of `buf`,
/// flushes it to the device and closes the handle.
///
/// # Errors
///
/// Returns any error from opening, seeking, writing or syncing.
pub fn write_at(path: &Path, offset: u64, buf: &[u8]) -> io::Result<usize> {
    let mut file = OpenOptions::new().create(true).write(true).truncate(false).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)?;
    file.sync_data()?;
    Ok(buf.len())
}

/// Size of a regular file or block device, found by seeking to its end.
///
/// # Errors
///
/// Returns an error if the path cannot be opened or sought.
pub fn stream_len(path: &Path) -> io::Result<u64> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(0))
}

/// A bounded-buffer pump.
#[derive(Debug, Clone)]
pub struct ChunkedTransfer {
    chunk_size: usize,
    cancel: Option<CancelToken>,
}

impl ChunkedTransfer {
    /// Creates an engine moving at most `chunk_size` bytes per chunk.
    #[must_use]
    pub const fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            cancel: None,
        }
    }

    /// Checks `token` before every chunk and stops with [`OtpError::Cancelled`] once it is raised.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn check_cancel(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(OtpError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Writes exactly `total` bytes to `dest`, asking `produce` for each chunk.
    ///
    /// `produce` receives the chunk length and must return that many bytes.
    /// `on_chunk` sees the accounting after every chunk. The first failure
    /// aborts the transfer without retry, leaving what was written so far.
    ///
    /// # Errors
    ///
    /// Returns [`OtpError::Transfer`] with the failing offset, or
    /// [`OtpError::Cancelled`].
    pub fn generate<P, O>(
        &self,
        dest: &Path,
        total: u64,
        mut produce: P,
        mut on_chunk: O,
    ) -> Result<TransferState>
    where
        P: FnMut(usize) -> io::Result<Vec<u8>>,
        O: FnMut(&TransferState),
    {
        let plan = ChunkPlan::new(total, self.chunk_size);
        debug!(
            "generating {total} bytes into '{}' in chunks of {}",
            dest.display(),
            plan.effective_chunk_size()
        );
        let mut state = TransferState {
            remaining: total,
            ..TransferState::default()
        };
        for chunk in plan {
            self.check_cancel()?;
            let bytes = produce(chunk.len).map_err(|e| OtpError::transfer(dest, chunk.offset, e))?;
            let written = write_at(dest, state.offset, &bytes)
                .map_err(|e| OtpError::transfer(dest, state.offset, e))?;
            state.advance(written);
            on_chunk(&state);
        }
        Ok(state)
    }

    /// Reads `src` from the start until a read returns no bytes, handing every
    /// chunk to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`OtpError::Transfer`] with the failing offset; `sink` has seen
    /// every byte read before the failure.
    pub fn consume<S>(&self, src: &Path, mut sink: S) -> Result<TransferState>
    where
        S: FnMut(&[u8]),
    {
        let mut buffer = vec![0u8; self.chunk_size.max(1)];
        let mut state = TransferState::default();
        loop {
            self.check_cancel()?;
            let read = read_at(src, state.offset, &mut buffer)
                .map_err(|e| OtpError::transfer(src, state.offset, e))?;
            if read == 0 {
                break;
            }
            sink(&buffer[..read]);
            state.advance(read);
        }
        Ok(state)
    }

    /// Copies the first `total` bytes of `src` onto `dst` at the same offsets.
    ///
    /// # Errors
    ///
    /// Returns [`OtpError::Transfer`] naming the path and offset that failed,
    /// including a source that ends before `total` bytes.
    pub fn copy<O>(
        &self,
        src: &Path,
        dst: &Path,
        total: u64,
        mut on_chunk: O,
    ) -> Result<TransferState>
    where
        O: FnMut(&TransferState),
    {
        let mut state = TransferState {
            remaining: total,
            ..TransferState::default()
        };
        for chunk in ChunkPlan::new(total, self.chunk_size) {
            self.check_cancel()?;
            let mut buffer = vec![0u8; chunk.len];
            let read = read_at(src, chunk.offset, &mut buffer)
                .map_err(|e| OtpError::transfer(src, chunk.offset, e))?;
            if read < chunk.len {
                return Err(OtpError::transfer(
                    src,
                    chunk.offset + read as u64,
                    io::Error::new(io::ErrorKind::UnexpectedEof, "source ended early"),
                ));
            }
            let written = write_at(dst, chunk.offset, &buffer)
                .map_err(|e| OtpError::transfer(dst, chunk.offset, e))?;
            state.advance(written);
            on_chunk(&state);
        }
        Ok(state)
    }
}

impl TransferState {
    fn advance(&mut self, bytes: usize) {
        let bytes = bytes as u64;
        self.offset += bytes;
        self.transferred += bytes;
        self.remaining = self.remaining.saturating_sub(bytes);
        self.chunk_size = bytes as usize;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn plan_of_zero_is_empty() {
        assert_eq!(ChunkPlan::new(0, 1024).count(), 0);
    }

    #[test]
    fn plan_clamps_to_total() {
        let plan = ChunkPlan::new(10, 1024);
        assert_eq!(plan.effective_chunk_size(), 10);
        assert_eq!(plan.collect::<Vec<_>>(), vec![Chunk { offset: 0, len: 10 }]);
    }

    proptest! {
        #[test]
        fn plan_covers_total_exactly(total in 0u64..100_000, chunk in 1usize..5_000) {
            let chunks: Vec<_> = ChunkPlan::new(total, chunk).collect();
            let mut expected_offset = 0u64;
            for c in &chunks {
                prop_assert_eq!(c.offset, expected_offset);
                prop_assert!(c.len > 0 && c.len <= chunk);
                expected_offset += c.len as u64;
            }
            prop_assert_eq!(expected_offset, total);
            if let Some(last) = chunks.last() {
                let tail = total % chunk as u64;
                let expected = if tail == 0 { chunk as u64 } else { tail };
                prop_assert_eq!(last.len as u64, expected);
            }
        }
    }

    #[test]
    fn generate_writes_exact_size_with_increasing_offsets() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let mut states = Vec::new();
        let state = ChunkedTransfer::new(7)
            .generate(&dest, 30, |len| Ok(vec![0xAB; len]), |s| states.push(*s))
            .unwrap();
        assert_eq!(state.transferred, 30);
        assert_eq!(state.remaining, 0);
        assert_eq!(fs::metadata(&dest).unwrap().len(), 30);
        let sizes: Vec<_> = states.iter().map(|s| s.chunk_size).collect();
        assert_eq!(sizes, vec![7, 7, 7, 7, 2]);
        assert!(states.windows(2).all(|w| w[0].offset < w[1].offset));
    }

    #[test]
    fn generate_reports_offset_of_failure() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let mut calls = 0;
        let err = ChunkedTransfer::new(4)
            .generate(
                &dest,
                12,
                |len| {
                    calls += 1;
                    if calls == 3 {
                        Err(io::Error::other("entropy gone"))
                    } else {
                        Ok(vec![1; len])
                    }
                },
                |_| {},
            )
            .unwrap_err();
        match err {
            OtpError::Transfer { offset, .. } => assert_eq!(offset, 8),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::metadata(&dest).unwrap().len(), 8);
    }

    #[test]
    fn consume_reads_until_end() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("in.bin");
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        fs::write(&src, &data).unwrap();
        let mut seen = Vec::new();
        let state = ChunkedTransfer::new(64)
            .consume(&src, |bytes| seen.extend_from_slice(bytes))
            .unwrap();
        assert_eq!(state.transferred, 1000);
        assert_eq!(seen, data);
    }

    #[test]
    fn consume_missing_source_fails_at_zero() {
        let dir = tempdir().unwrap();
        let err = ChunkedTransfer::new(64)
            .consume(&dir.path().join("missing"), |_| {})
            .unwrap_err();
        assert!(matches!(err, OtpError::Transfer { offset: 0, .. }));
    }

    #[test]
    fn cancelled_transfer_stops_before_next_chunk() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let token = CancelToken::new();
        let trigger = token.clone();
        let err = ChunkedTransfer::new(4)
            .with_cancel(token)
            .generate(&dest, 16, |len| Ok(vec![0; len]), |_| trigger.cancel())
            .unwrap_err();
        assert!(matches!(err, OtpError::Cancelled));
        assert_eq!(fs::metadata(&dest).unwrap().len(), 4);
    }

    #[test]
    fn copy_rejects_short_source() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::write(&src, [9u8; 10]).unwrap();
        let err = ChunkedTransfer::new(4).copy(&src, &dst, 12, |_| {}).unwrap_err();
        assert!(matches!(err, OtpError::Transfer { offset: 10, .. }));
        let state = ChunkedTransfer::new(4).copy(&src, &dst, 10, |_| {}).unwrap();
        assert_eq!(state.transferred, 10);
        assert_eq!(fs::read(&dst).unwrap(), vec![9u8; 10]);
    }
}
