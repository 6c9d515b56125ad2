// File:    checksum.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Streaming SHA-256 checksums of key files and key devices of any size.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::path::Path;

use log::error;
use sha2::{Digest, Sha256};

use crate::error::OtpError;
use crate::transfer::ChunkedTransfer;

/// Name of the digest algorithm, as printed to the operator.
pub const HASH_ALGORITHM_NAME: &str = "SHA-256";

/// The outcome of a streaming checksum.
///
/// When reading fails the digest covers only the bytes read before the
/// failure, and `error` says why it stopped.
#[derive(Debug)]
pub struct Checksum {
    /// The raw digest.
    pub digest: Vec<u8>,
    /// Bytes fed into the digest.
    pub bytes: u64,
    /// The read failure that cut the checksum short, if any.
    pub error: Option<OtpError>,
}

impl Checksum {
    /// Whether the whole source was digested.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// The digest as lowercase hex, one space between bytes.
    #[must_use]
    pub fn to_hex(&self) -> String {
        grouped_hex(&self.digest)
    }
}

/// Renders bytes as lowercase hex pairs separated by single spaces.
#[must_use]
pub fn grouped_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| hex::encode([*b])).collect::<Vec<_>>().join(" ")
}

/// Digests `path` from the start until end of stream, `chunk_size` bytes at a time.
///
/// A read failure is logged and ends the loop; no read is retried.
#[must_use]
pub fn key_checksum(path: &Path, chunk_size: usize) -> Checksum {
    digest_observed(path, chunk_size, |_| {})
}

/// As [`key_checksum`]; `after_chunk` sees the running byte count.
fn digest_observed<O>(path: &Path, chunk_size: usize, mut after_chunk: O) -> Checksum
where
    O: FnMut(u64),
{
    let mut hasher = Sha256::new();
    let mut digested = 0u64;
    let result = ChunkedTransfer::new(chunk_size).consume(path, |bytes| {
        hasher.update(bytes);
        digested += bytes.len() as u64;
        after_chunk(digested);
    });
    let digest = hasher.finalize().to_vec();
    match result {
        Ok(state) => Checksum {
            digest,
            bytes: state.transferred,
            error: None,
        },
        Err(err) => {
            error!("{err}");
            let bytes = match &err {
                OtpError::Transfer { offset, .. } => *offset,
                _ => 0,
            };
            Checksum {
                digest,
                bytes,
                error: Some(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::tempdir;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn empty_source_gives_empty_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();
        let sum = key_checksum(&path, 1024);
        assert!(sum.is_complete());
        assert_eq!(sum.bytes, 0);
        assert_eq!(hex::encode(&sum.digest), EMPTY_SHA256);
    }

    #[test]
    fn hex_is_grouped_per_byte() {
        assert_eq!(grouped_hex(&[0x00, 0xab, 0x10]), "00 ab 10");
    }

    #[test]
    fn missing_source_reports_partial_digest() {
        let dir = tempdir().unwrap();
        let sum = key_checksum(&dir.path().join("missing"), 1024);
        assert!(!sum.is_complete());
        assert_eq!(hex::encode(&sum.digest), EMPTY_SHA256);
    }

    #[test]
    fn failure_midway_keeps_digest_of_bytes_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vanishing");
        let data: Vec<u8> = (0..=255).collect();
        fs::write(&path, &data).unwrap();

        let sum = digest_observed(&path, 100, |digested| {
            if digested == 100 {
                fs::remove_file(&path).unwrap();
            }
        });
        assert!(!sum.is_complete());
        assert_eq!(sum.bytes, 100);
        assert_eq!(sum.digest, Sha256::digest(&data[..100]).to_vec());
        assert!(matches!(sum.error, Some(OtpError::Transfer { offset: 100, .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]
        #[test]
        fn digest_is_chunk_size_invariant(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            chunk in 1usize..700,
        ) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("key");
            fs::write(&path, &data).unwrap();
            let whole = key_checksum(&path, data.len().max(1));
            let pieces = key_checksum(&path, chunk);
            prop_assert_eq!(&whole.digest, &pieces.digest);
            prop_assert_eq!(whole.bytes, data.len() as u64);
            prop_assert_eq!(pieces.digest, Sha256::digest(&data).to_vec());
        }
    }
}
