// File:    cipher.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Stream-based encryption and decryption of a selection of files with a one-time pad key.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::ffi::OsString;
use std::fs::{self, Metadata, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::cancel::CancelToken;
use crate::config::Configuration;
use crate::crypto::{self, Direction, HeaderStatus, MAC_SIZE, TOKEN_LEN};
use crate::error::{OtpError, Result};
use crate::fcpath::{FCPath, KeyDescriptor};
use crate::selection::WorkList;
use crate::transfer::{ChunkPlan, ChunkedTransfer, read_at, write_at};

const TMP_SUFFIX: &str = ".otpcrypt.tmp";

/// Progress of a running transform.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// The file being transformed.
    pub path: &'a Path,
    /// Payload bytes of this file done so far.
    pub file_done: u64,
    /// Payload bytes of this file in total.
    pub file_total: u64,
    /// Files finished before this one.
    pub files_done: usize,
    /// Files in the selection.
    pub files_total: usize,
}

/// What a transform did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformReport {
    /// Files transformed successfully.
    pub processed: usize,
    /// Files that failed and were left untouched.
    pub failed: usize,
    /// Payload bytes transformed.
    pub bytes: u64,
    /// Whether the stop flag ended the run early.
    pub cancelled: bool,
}

/// The bulk transform the dispatcher drives.
pub trait BulkTransform {
    /// Transforms every entry of `selection` in `direction` with `key`.
    ///
    /// Implementations check `cancel` between chunks and report through
    /// `on_progress`. A failing file is reported and skipped; the run goes on.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that affect the whole run.
    fn transform(
        &self,
        selection: &WorkList,
        key: &KeyDescriptor,
        direction: Direction,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(&Progress<'_>),
    ) -> Result<TransformReport>;
}

/// The otpcrypt v1 cipher; see [`crate::crypto`] for the file format.
///
/// Output goes to a temporary sibling that replaces the target only once it
/// is complete, so an interrupted run never leaves a half-transformed file.
#[derive(Debug, Clone)]
pub struct OtpCipher {
    config: Configuration,
}

impl OtpCipher {
    /// A cipher using `config` for chunk size, MAC mode, dry run and printing.
    #[must_use]
    pub const fn new(config: Configuration) -> Self {
        Self { config }
    }

    fn transform_file(
        &self,
        fc: &FCPath,
        key: &KeyDescriptor,
        direction: Direction,
        cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(u64, u64),
    ) -> Result<u64> {
        let target = fc.path.as_path();
        let layout = self.layout(fc, key, direction)?;

        if self.config.dry_run {
            info!(
                "[dry] would {} '{}' ({} bytes)",
                verb(direction),
                target.display(),
                layout.payload_len
            );
            return Ok(layout.payload_len);
        }

        let real = fs::canonicalize(target)?;
        let tmp = tmp_path(&real);
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => OtpError::AlreadyExists(tmp.clone()),
                _ => OtpError::transfer(&tmp, 0, e),
            })?;
        let written = self.write_output(&real, &tmp, &layout, key, direction, cancel, on_chunk);
        if let Err(err) = written {
            discard(&tmp);
            return Err(err);
        }
        self.replace(&real, &tmp)?;
        Ok(layout.payload_len)
    }

    /// Puts the finished output in place of `target`.
    ///
    /// A file with more than one name is overwritten through its inode so that
    /// every name sees the new content; any other file has the output renamed
    /// over it.
    fn replace(&self, target: &Path, tmp: &Path) -> Result<()> {
        let meta = fs::metadata(target)?;
        if link_count(&meta) > 1 {
            let len = fs::metadata(tmp)?.len();
            let written = ChunkedTransfer::new(self.config.buffer_size)
                .copy(tmp, target, len, |_| {})
                .and_then(|_| {
                    OpenOptions::new()
                        .write(true)
                        .open(target)
                        .and_then(|file| file.set_len(len))
                        .map_err(|e| OtpError::transfer(target, len, e))
                });
            if let Err(err) = written {
                error!("Complete output of '{}' kept in '{}'", target.display(), tmp.display());
                return Err(err);
            }
            discard(tmp);
            return Ok(());
        }
        fs::set_permissions(tmp, meta.permissions())
            .and_then(|()| fs::rename(tmp, target))
            .map_err(|e| {
                discard(tmp);
                OtpError::transfer(target, 0, e)
            })
    }

    fn layout(&self, fc: &FCPath, key: &KeyDescriptor, direction: Direction) -> Result<Layout> {
        let mac_size = MAC_SIZE as u64;
        let layout = match (self.config.mac_disabled, direction) {
            (true, _) => Layout {
                header: None,
                input_offset: 0,
                key_offset: 0,
                payload_len: fc.size,
            },
            (false, Direction::Encrypt) => Layout {
                header: Some(crypto::build_header(&key.prefix()?)),
                input_offset: 0,
                key_offset: TOKEN_LEN as u64,
                payload_len: fc.size,
            },
            (false, Direction::Decrypt) => {
                let mut leading = [0u8; MAC_SIZE];
                let read = read_at(&fc.path, 0, &mut leading)?;
                let prefix = key.prefix()?;
                let status = crypto::inspect_header(&leading[..read], Some(&prefix));
                if status != HeaderStatus::Matching {
                    return Err(OtpError::Refused(format!(
                        "'{}' was not encrypted with this key / password",
                        fc.path.display()
                    )));
                }
                Layout {
                    header: None,
                    input_offset: mac_size,
                    key_offset: TOKEN_LEN as u64,
                    payload_len: fc.size.saturating_sub(mac_size),
                }
            }
        };
        if !key.covers(layout.key_offset, layout.payload_len) {
            return Err(OtpError::Refused(format!(
                "key '{}' is too small for '{}'",
                key.fcpath.path.display(),
                fc.path.display()
            )));
        }
        Ok(layout)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_output(
        &self,
        target: &Path,
        tmp: &Path,
        layout: &Layout,
        key: &KeyDescriptor,
        direction: Direction,
        cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(u64, u64),
    ) -> Result<()> {
        let mut out_offset = 0u64;
        if let Some(header) = &layout.header {
            write_at(tmp, 0, header).map_err(|e| OtpError::transfer(tmp, 0, e))?;
            out_offset = header.len() as u64;
        }
        let mut done = 0u64;
        for chunk in ChunkPlan::new(layout.payload_len, self.config.buffer_size) {
            if cancel.is_cancelled() {
                return Err(OtpError::Cancelled);
            }
            let in_offset = layout.input_offset + chunk.offset;
            let mut data = vec![0u8; chunk.len];
            let read = read_at(target, in_offset, &mut data)
                .map_err(|e| OtpError::transfer(target, in_offset, e))?;
            if read < chunk.len {
                let shrank = io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "target shrank while transforming",
                );
                return Err(OtpError::transfer(target, in_offset + read as u64, shrank));
            }
            let key_offset = layout.key_offset + chunk.offset;
            let key_bytes = key
                .read_masked(key_offset, chunk.len)
                .map_err(|e| OtpError::transfer(&key.fcpath.path, key_offset, e))?;
            let out = crypto::combine(&data, &key_bytes, direction);
            if self.config.print {
                print_bytes(&data, &key_bytes, &out);
            }
            let at = out_offset + chunk.offset;
            write_at(tmp, at, &out).map_err(|e| OtpError::transfer(tmp, at, e))?;
            done += chunk.len as u64;
            on_chunk(done, layout.payload_len);
        }
        Ok(())
    }
}

impl BulkTransform for OtpCipher {
    fn transform(
        &self,
        selection: &WorkList,
        key: &KeyDescriptor,
        direction: Direction,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(&Progress<'_>),
    ) -> Result<TransformReport> {
        let mut report = TransformReport::default();
        let files_total = selection.len();
        for (files_done, fc) in selection.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let mut on_chunk = |file_done: u64, file_total: u64| {
                on_progress(&Progress {
                    path: &fc.path,
                    file_done,
                    file_total,
                    files_done,
                    files_total,
                });
            };
            match self.transform_file(fc, key, direction, cancel, &mut on_chunk) {
                Ok(bytes) => {
                    report.processed += 1;
                    report.bytes += bytes;
                    info!("{} '{}'", past_tense(direction), fc.path.display());
                }
                Err(OtpError::Cancelled) => {
                    report.cancelled = true;
                    warn!("Stopped while processing '{}'; file left unchanged", fc.path.display());
                    break;
                }
                Err(err) => {
                    report.failed += 1;
                    error!("{err}");
                }
            }
        }
        Ok(report)
    }
}

struct Layout {
    header: Option<[u8; MAC_SIZE]>,
    input_offset: u64,
    key_offset: u64,
    payload_len: u64,
}

fn discard(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp) {
        warn!("Could not remove '{}': {e}", tmp.display());
    }
}

#[cfg(unix)]
fn link_count(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.nlink()
}

#[cfg(not(unix))]
const fn link_count(_meta: &Metadata) -> u64 {
    1
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map_or_else(OsString::new, ToOwned::to_owned);
    name.push(TMP_SUFFIX);
    target.with_file_name(name)
}

const fn verb(direction: Direction) -> &'static str {
    match direction {
        Direction::Encrypt => "encrypt",
        Direction::Decrypt => "decrypt",
    }
}

const fn past_tense(direction: Direction) -> &'static str {
    match direction {
        Direction::Encrypt => "Encrypted",
        Direction::Decrypt => "Decrypted",
    }
}

fn print_bytes(data: &[u8], key: &[u8], out: &[u8]) {
    for ((d, k), o) in data.iter().zip(key).zip(out) {
        let shown = if d.is_ascii_graphic() { char::from(*d) } else { '.' };
        info!("in {d:08b} {d:02x} {shown}  key {k:08b} {k:02x}  out {o:08b} {o:02x}");
    }
}
