// File:    pad_generator.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Provides functionality for generating high-quality one-time pad key files for cryptographic use.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use log::{debug, info};
use rand::{TryRngCore, rngs::OsRng};

use crate::config::DEFAULT_BUFFER_SIZE;
use crate::crypto::{Direction, combine};
use crate::error::{OtpError, Result};
use crate::transfer::{ChunkedTransfer, TransferState};

/// Generates a new one-time pad key file of exactly `size` bytes.
///
/// Each chunk is the combination of two independent chunks from the operating
/// system's random source, passed through the same combine primitive used
/// for encryption. Chunks are 1 MiB, or `size` when smaller.
///
/// # Arguments
///
/// * `path` - The path where the key file will be created. It must not exist.
/// * `size` - The size of the key in bytes. Zero creates an empty file.
///
/// # Errors
///
/// Returns an error if `path` already exists (a dangling symlink counts), if
/// it cannot be created, or if a chunk cannot be generated or written. A
/// failed chunk aborts without retry and leaves the partial file in place.
pub fn generate_pad(path: &Path, size: u64) -> Result<TransferState> {
    generate_pad_with_chunk(path, size, DEFAULT_BUFFER_SIZE)
}

/// [`generate_pad`] with an explicit chunk size.
///
/// # Errors
///
/// See [`generate_pad`].
pub fn generate_pad_with_chunk(path: &Path, size: u64, chunk_size: usize) -> Result<TransferState> {
    if fs::symlink_metadata(path).is_ok() {
        return Err(OtpError::AlreadyExists(path.to_path_buf()));
    }
    OpenOptions::new().write(true).create_new(true).open(path)?;
    info!("Creating OTP key file '{}' ({size} bytes)", path.display());

    let mut rng = OsRng;
    ChunkedTransfer::new(chunk_size).generate(
        path,
        size,
        |len| {
            let mut first = vec![0u8; len];
            let mut second = vec![0u8; len];
            // Use the failable `try_fill_bytes` and map the error to an `io::Error`.
            rng.try_fill_bytes(&mut first).map_err(io::Error::other)?;
            rng.try_fill_bytes(&mut second).map_err(io::Error::other)?;
            Ok(combine(&first, &second, Direction::Encrypt))
        },
        |state| debug!("key file: {} of {size} bytes written", state.transferred),
    )
}
