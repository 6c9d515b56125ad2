// File:    fcpath.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Classifies a single file, directory, symlink or device, and decides whether it can serve as a key or a target.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::fmt;
use std::fs::{self, File, FileType, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::config::Configuration;
use crate::crypto::{self, HeaderStatus, MAC_SIZE, PasswordMask, TOKEN_LEN};
use crate::transfer::{read_at, stream_len};

/// Bytes compared when deciding whether a device already holds a key.
const CLONE_PROBE_LEN: u64 = 4096;
const PROC_MOUNTS: &str = "/proc/mounts";

/// What a path turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// A symlink that is not being followed.
    Symlink,
    /// A block or character device that may be written.
    Device,
    /// A device that is mounted or not writable.
    DeviceProtected,
    /// Missing, or a node type this tool does not handle.
    Invalid,
}

impl PathKind {
    /// Devices of either kind.
    #[must_use]
    pub const fn is_device(self) -> bool {
        matches!(self, Self::Device | Self::DeviceProtected)
    }
}

/// One classified filesystem or device node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FCPath {
    /// The path as found.
    pub path: PathBuf,
    /// The node's kind.
    pub kind: PathKind,
    /// Size in bytes; for devices the size of the device.
    pub size: u64,
    /// Whether anything exists at the path.
    pub exists: bool,
    /// Whether it can be opened for reading.
    pub readable: bool,
    /// Whether it can be opened for writing.
    pub writable: bool,
    /// Passes every key check.
    pub is_valid_key: bool,
    /// Can be encrypted with the current key.
    pub is_encryptable: bool,
    /// Can be decrypted with the current key.
    pub is_decryptable: bool,
    /// Carries a MAC header made with the current key, or is a device holding the key already.
    pub has_matching_key: bool,
    /// Carries a recognised MAC header, whatever the key.
    pub is_encrypted: bool,
}

impl FCPath {
    /// Inspects `path` without judging eligibility.
    ///
    /// Symlinks are reported as [`PathKind::Symlink`] unless `follow_symlinks`
    /// is set, in which case the link target is inspected.
    #[must_use]
    pub fn inspect(path: &Path, follow_symlinks: bool) -> Self {
        let mut fc = Self::missing(path);
        let Ok(link_meta) = fs::symlink_metadata(path) else {
            return fc;
        };
        fc.exists = true;

        let meta = if link_meta.file_type().is_symlink() {
            if !follow_symlinks {
                fc.kind = PathKind::Symlink;
                return fc;
            }
            match fs::metadata(path) {
                Ok(meta) => meta,
                Err(_) => {
                    fc.exists = false;
                    return fc;
                }
            }
        } else {
            link_meta
        };

        let file_type = meta.file_type();
        fc.readable = File::open(path).is_ok();
        fc.writable = !file_type.is_dir() && OpenOptions::new().write(true).open(path).is_ok();
        if file_type.is_dir() {
            fc.kind = PathKind::Directory;
        } else if file_type.is_file() {
            fc.kind = PathKind::File;
            fc.size = meta.len();
        } else if is_device(&file_type) {
            fc.size = stream_len(path).unwrap_or(0);
            fc.kind = if fc.writable && !is_mounted(path) {
                PathKind::Device
            } else {
                PathKind::DeviceProtected
            };
        }
        fc
    }

    fn missing(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: PathKind::Invalid,
            size: 0,
            exists: false,
            readable: false,
            writable: false,
            is_valid_key: false,
            is_encryptable: false,
            is_decryptable: false,
            has_matching_key: false,
            is_encrypted: false,
        }
    }

    /// Inspects `path` as a key and records whether it passes every key check.
    #[must_use]
    pub fn key(path: &Path, config: &Configuration) -> Self {
        let mut fc = Self::inspect(path, config.symlink);
        fc.is_valid_key = key_checks(&fc, config).is_empty();
        fc
    }

    /// Inspects `path` as a target and judges it against `key`.
    #[must_use]
    pub fn target(path: &Path, key: Option<&KeyDescriptor>, config: &Configuration) -> Self {
        let mut fc = Self::inspect(path, config.symlink);
        if let Some(key) = key.filter(|k| k.fcpath.is_valid_key) {
            match fc.kind {
                PathKind::File if fc.readable => judge_file(&mut fc, key, config),
                PathKind::Device | PathKind::DeviceProtected => {
                    fc.has_matching_key = device_matches_key(&fc, &key.fcpath);
                }
                _ => {}
            }
        }
        fc
    }
}

fn judge_file(fc: &mut FCPath, key: &KeyDescriptor, config: &Configuration) {
    let mut leading = [0u8; MAC_SIZE];
    let read = read_at(&fc.path, 0, &mut leading).unwrap_or(0);
    let leading = &leading[..read];

    if config.mac_disabled {
        fc.is_encrypted = crypto::has_header(leading);
        let covered = key.covers(0, fc.size);
        fc.is_encryptable = fc.writable && fc.size >= config.min_key_size && covered;
        fc.is_decryptable = fc.writable && fc.size >= 1 && covered;
        return;
    }

    let prefix = key.prefix().ok();
    let status = crypto::inspect_header(leading, prefix.as_ref().map(<[u8; TOKEN_LEN]>::as_slice));
    fc.is_encrypted = status != HeaderStatus::Absent;
    fc.has_matching_key = status == HeaderStatus::Matching;
    fc.is_encryptable = fc.writable
        && status == HeaderStatus::Absent
        && fc.size >= config.min_key_size
        && key.covers(TOKEN_LEN as u64, fc.size);
    fc.is_decryptable = fc.writable
        && fc.has_matching_key
        && key.covers(TOKEN_LEN as u64, fc.size.saturating_sub(MAC_SIZE as u64));
    if !fc.is_encryptable && !fc.is_encrypted && !key.covers(TOKEN_LEN as u64, fc.size) {
        debug!(
            "'{}' ({} bytes) is larger than the key can cover",
            fc.path.display(),
            fc.size
        );
    }
}

fn device_matches_key(device: &FCPath, key: &FCPath) -> bool {
    if same_path(&device.path, &key.path) {
        return true;
    }
    let len = CLONE_PROBE_LEN.min(device.size).min(key.size) as usize;
    if len == 0 || !device.readable || !key.readable {
        return false;
    }
    let mut a = vec![0u8; len];
    let mut b = vec![0u8; len];
    matches!(
        (read_at(&device.path, 0, &mut a), read_at(&key.path, 0, &mut b)),
        (Ok(x), Ok(y)) if x == len && y == len && a == b
    )
}

/// Compares two paths after resolving them, falling back to a literal comparison.
#[must_use]
pub fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(unix)]
fn is_device(file_type: &FileType) -> bool {
    use std::os::unix::fs::FileTypeExt;
    file_type.is_block_device() || file_type.is_char_device()
}

#[cfg(not(unix))]
fn is_device(_file_type: &FileType) -> bool {
    false
}

/// Whether the device, or a partition of it, appears as a mount source.
fn is_mounted(device: &Path) -> bool {
    let Ok(mounts) = fs::read_to_string(PROC_MOUNTS) else {
        return false;
    };
    let device = fs::canonicalize(device).unwrap_or_else(|_| device.to_path_buf());
    mounted_in(&mounts, &device.to_string_lossy(), |source| {
        fs::canonicalize(source).map_or_else(
            |_| source.to_owned(),
            |p| p.to_string_lossy().into_owned(),
        )
    })
}

/// Whether `device` or one of its partitions is a mount source in `table`,
/// a `/proc/mounts` style listing. `resolve` turns each source into the form
/// `device` is given in.
fn mounted_in<R>(table: &str, device: &str, resolve: R) -> bool
where
    R: Fn(&str) -> String,
{
    table
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|source| source.starts_with('/'))
        .any(|source| names_device_or_partition(&resolve(source), device))
}

/// `sda` owns `sda1`; a name ending in a digit takes a `p` first, as in `nvme0n1p2`.
fn names_device_or_partition(source: &str, device: &str) -> bool {
    let Some(rest) = source.strip_prefix(device) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    let number = if device.ends_with(|c: char| c.is_ascii_digit()) {
        rest.strip_prefix('p')
    } else {
        Some(rest)
    };
    number.is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// One failed key check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCheck {
    /// Nothing exists at the key path.
    Missing,
    /// The key is a directory.
    Directory,
    /// The key is a symlink and symlinks are not allowed.
    Symlink,
    /// The key is neither a file nor a device.
    Unsupported,
    /// The key cannot be opened for reading.
    Unreadable,
    /// The key is smaller than the minimum key size.
    BelowMinimum(u64),
    /// The key cannot even hold the MAC token.
    BelowMacSize(u64),
}

impl fmt::Display for KeyCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("[key does not exist]"),
            Self::Directory => f.write_str("[is dir]"),
            Self::Symlink => f.write_str("[is symlink] try: \"--symlink\" option"),
            Self::Unsupported => f.write_str("[not a file or device]"),
            Self::Unreadable => f.write_str("[not readable]"),
            Self::BelowMinimum(min) => write!(f, "[size < {min}] try: \"--no-key-size\" option"),
            Self::BelowMacSize(mac) => write!(
                f,
                "[size < {mac}] try: \"--disable-MAC\" option if you know what you are doing !!!"
            ),
        }
    }
}

/// Every key check `key` fails; empty when the key is valid.
#[must_use]
pub fn key_checks(key: &FCPath, config: &Configuration) -> Vec<KeyCheck> {
    if !key.exists {
        return vec![KeyCheck::Missing];
    }
    let mut failures = Vec::new();
    match key.kind {
        PathKind::Directory => failures.push(KeyCheck::Directory),
        PathKind::Symlink => failures.push(KeyCheck::Symlink),
        PathKind::Invalid => failures.push(KeyCheck::Unsupported),
        PathKind::File | PathKind::Device | PathKind::DeviceProtected => {
            if !key.readable {
                failures.push(KeyCheck::Unreadable);
            }
            if key.size < config.min_key_size {
                failures.push(KeyCheck::BelowMinimum(config.min_key_size));
            }
            if !config.mac_disabled && key.size < config.mac_size {
                failures.push(KeyCheck::BelowMacSize(config.mac_size));
            }
        }
    }
    failures
}

/// A validated key and the optional password folded into it.
#[derive(Debug, Clone)]
pub struct KeyDescriptor {
    /// The classified key.
    pub fcpath: FCPath,
    mask: Option<PasswordMask>,
}

impl KeyDescriptor {
    /// Wraps a classified key; an empty password counts as none.
    #[must_use]
    pub fn new(fcpath: FCPath, password: Option<&[u8]>) -> Self {
        Self {
            fcpath,
            mask: password.filter(|p| !p.is_empty()).map(PasswordMask::new),
        }
    }

    /// Whether key bytes `offset..offset + len` exist.
    #[must_use]
    pub fn covers(&self, offset: u64, len: u64) -> bool {
        offset.checked_add(len).is_some_and(|end| end <= self.fcpath.size)
    }

    /// Reads `len` key bytes from `offset` with the password mask applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be read, or ends before `offset + len`.
    pub fn read_masked(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let read = read_at(&self.fcpath.path, offset, &mut buf)?;
        if read < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("key ends at offset {}", offset + read as u64),
            ));
        }
        if let Some(mask) = &self.mask {
            mask.apply(offset, &mut buf);
        }
        Ok(buf)
    }

    /// The masked key bytes that encrypt the MAC token.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is shorter than the token.
    pub fn prefix(&self) -> io::Result<[u8; TOKEN_LEN]> {
        let bytes = self.read_masked(0, TOKEN_LEN)?;
        let mut prefix = [0u8; TOKEN_LEN];
        prefix.copy_from_slice(&bytes);
        Ok(prefix)
    }
}
