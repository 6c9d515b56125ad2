// File:    crypto.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Handles the core cryptographic operations: the one-time pad combine primitive, the password mask and the MAC header.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

//! This module contains the core cryptographic operations.
//!
//! # otpcrypt v1 header
//!
//! With MAC enabled every encrypted file starts with a 48 byte header:
//!
//! | bytes    | content                                             |
//! |----------|-----------------------------------------------------|
//! | 0..8     | `OTPCRYPT`                                          |
//! | 8        | format version, `0x01`                              |
//! | 9..16    | reserved, zero                                      |
//! | 16..48   | [`TOKEN`] combined with key bytes `0..32`           |
//!
//! The payload follows, combined with key bytes `32..32 + n`. Without MAC the
//! payload is combined with key bytes `0..n` and nothing is prepended.

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Magic bytes opening every MAC header.
pub const MAGIC: &[u8; 8] = b"OTPCRYPT";
/// Header format version.
pub const FORMAT_VERSION: u8 = 1;
/// Plain authentication token; encrypted with the first key bytes in the header.
pub const TOKEN: &[u8; TOKEN_LEN] = b"otpcrypt message authentication.";
/// Length of the authentication token, and of the key prefix it consumes.
pub const TOKEN_LEN: usize = 32;
/// Total header length.
pub const MAC_SIZE: usize = 48;

const TOKEN_OFFSET: usize = MAC_SIZE - TOKEN_LEN;

/// Which way bytes are being transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Plaintext to ciphertext.
    Encrypt,
    /// Ciphertext to plaintext.
    Decrypt,
}

impl Direction {
    /// `true` for [`Direction::Encrypt`].
    #[must_use]
    pub const fn is_forward(self) -> bool {
        matches!(self, Self::Encrypt)
    }
}

/// Performs a simple XOR operation between two byte slices.
///
/// # Panics
///
/// Panics if the slices are not of equal length.
#[must_use]
pub fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    assert_eq!(
        a.len(),
        b.len(),
        "Input slices must have the same length for XOR operation."
    );
    a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()
}

/// Combines a data buffer with an equal-length key buffer.
///
/// Both directions apply the same operation, so combining twice with the same
/// key restores the input.
///
/// # Panics
///
/// Panics if the buffers are not of equal length.
#[must_use]
pub fn combine(data: &[u8], key: &[u8], direction: Direction) -> Vec<u8> {
    match direction {
        Direction::Encrypt | Direction::Decrypt => xor(data, key),
    }
}

/// A password folded into the key stream.
///
/// Every key byte at absolute key offset `i` is XORed with
/// `sha256(password)[i % 32]` before use.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PasswordMask([u8; 32]);

impl PasswordMask {
    /// Derives the mask from a password.
    #[must_use]
    pub fn new(password: &[u8]) -> Self {
        Self(Sha256::digest(password).into())
    }

    /// Applies the mask in place to key bytes read from `key_offset`.
    pub fn apply(&self, key_offset: u64, key: &mut [u8]) {
        let len = self.0.len() as u64;
        for (byte, pos) in key.iter_mut().zip(key_offset..) {
            *byte ^= self.0[(pos % len) as usize];
        }
    }
}

impl std::fmt::Debug for PasswordMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordMask(..)")
    }
}

/// The result of looking for a MAC header in the leading bytes of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    /// No recognised header; the content looks like plaintext.
    Absent,
    /// A header whose token verifies against the key.
    Matching,
    /// A header encrypted with a different key or password.
    Mismatch,
}

/// Builds the header for a key whose (masked) first [`TOKEN_LEN`] bytes are `key_prefix`.
#[must_use]
pub fn build_header(key_prefix: &[u8; TOKEN_LEN]) -> [u8; MAC_SIZE] {
    let mut header = [0u8; MAC_SIZE];
    header[..MAGIC.len()].copy_from_slice(MAGIC);
    header[MAGIC.len()] = FORMAT_VERSION;
    header[TOKEN_OFFSET..].copy_from_slice(&combine(TOKEN, key_prefix, Direction::Encrypt));
    header
}

/// Whether `leading` starts with a recognised header, regardless of key.
#[must_use]
pub fn has_header(leading: &[u8]) -> bool {
    leading.len() >= MAC_SIZE
        && &leading[..MAGIC.len()] == MAGIC
        && leading[MAGIC.len()] == FORMAT_VERSION
}

/// Checks the leading bytes of a file against the masked key prefix.
#[must_use]
pub fn inspect_header(leading: &[u8], key_prefix: Option<&[u8]>) -> HeaderStatus {
    if !has_header(leading) {
        return HeaderStatus::Absent;
    }
    match key_prefix {
        Some(prefix) if prefix.len() == TOKEN_LEN => {
            let token = combine(&leading[TOKEN_OFFSET..MAC_SIZE], prefix, Direction::Decrypt);
            if token.as_slice() == TOKEN {
                HeaderStatus::Matching
            } else {
                HeaderStatus::Mismatch
            }
        }
        _ => HeaderStatus::Mismatch,
    }
}
