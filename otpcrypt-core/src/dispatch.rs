// File:    dispatch.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Runs the resolved mode against the selection and reports the outcome.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::path::Path;

use log::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::checksum::{HASH_ALGORITHM_NAME, key_checksum};
use crate::cipher::{BulkTransform, Progress};
use crate::config::{Configuration, DEFAULT_BUFFER_SIZE};
use crate::crypto::Direction;
use crate::device::DeviceManager;
use crate::error::{OtpError, Result};
use crate::fcpath::{FCPath, KeyDescriptor};
use crate::mode::Mode;
use crate::pad_generator::generate_pad_with_chunk;
use crate::selection::{
    WorkList, clone_key_targets, create_key_targets, decryptable, delete_gpt_targets, encryptable,
    print_gpt_targets,
};

/// How a dispatched mode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The work was done.
    Completed,
    /// Nothing in the selection qualified; the statistics were reported.
    NothingToDo,
    /// The operation was refused for the operator's safety.
    Refused,
    /// The stop flag ended the work early.
    Cancelled,
    /// Some files could not be transformed; the count is attached.
    Failed(usize),
}

impl Outcome {
    /// The process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Completed | Self::NothingToDo | Self::Refused => 0,
            Self::Cancelled | Self::Failed(_) => 1,
        }
    }
}

/// Everything a mode needs besides the configuration.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// The mode to run.
    pub mode: Mode,
    /// The validated key, for modes reading one.
    pub key: Option<&'a KeyDescriptor>,
    /// The key file to create, for `--create-keyfile`.
    pub key_file: Option<&'a Path>,
    /// The classified targets.
    pub selection: &'a WorkList,
}

/// Executes modes using a bulk transform and a device manager.
#[derive(Debug)]
pub struct ModeDispatcher<T, D> {
    config: Configuration,
    cipher: T,
    devices: D,
    cancel: CancelToken,
}

impl<T: BulkTransform, D: DeviceManager> ModeDispatcher<T, D> {
    /// A dispatcher whose long-running work observes `cancel`.
    #[must_use]
    pub const fn new(config: Configuration, cipher: T, devices: D, cancel: CancelToken) -> Self {
        Self {
            config,
            cipher,
            devices,
            cancel,
        }
    }

    /// Runs `invocation.mode`.
    ///
    /// # Errors
    ///
    /// Returns [`OtpError::Usage`] when a parameter the mode needs is absent,
    /// and propagates transfer and I/O failures.
    pub fn dispatch(&self, invocation: &Invocation<'_>) -> Result<Outcome> {
        debug!("dispatching {}", invocation.mode);
        let selection = invocation.selection;
        match invocation.mode {
            Mode::Encrypt => self.encrypt(selection, require_key(invocation)?),
            Mode::Decrypt => self.decrypt(selection, require_key(invocation)?),
            Mode::CreateKeyDevice => self.create_key_device(selection, require_key(invocation)?),
            Mode::CloneKeyDevice => self.clone_key_device(selection, require_key(invocation)?),
            Mode::PrintGpt => self.print_gpt(selection),
            Mode::DeleteGpt => self.delete_gpt(selection),
            Mode::KeyChecksum => self.key_checksum(&require_key(invocation)?.fcpath),
            Mode::CreateKeyFile => {
                let path = invocation.key_file.ok_or_else(|| {
                    OtpError::Usage("--create-keyfile needs -K <keyfile>".to_owned())
                })?;
                self.create_key_file(path)
            }
            Mode::None => Err(OtpError::Usage("no mode given".to_owned())),
        }
    }

    fn encrypt(&self, selection: &WorkList, key: &KeyDescriptor) -> Result<Outcome> {
        if self.config.mac_disabled {
            warn!(
                "Message authentication disabled: encrypted files carry no header, \
                 so a wrong key cannot be detected and encrypting twice decrypts!"
            );
        }
        let list = selection.filter(encryptable);
        if list.is_empty() {
            return Ok(nothing_to_do(selection));
        }
        self.transform(&list, key, Direction::Encrypt)
    }

    fn decrypt(&self, selection: &WorkList, key: &KeyDescriptor) -> Result<Outcome> {
        if self.config.mac_disabled {
            warn!(
                "Decryption refused with --disable-MAC; \
                 encrypt again with the same key to reverse a raw encryption"
            );
            return Ok(Outcome::Refused);
        }
        let list = selection.filter(decryptable);
        if list.is_empty() {
            let outcome = nothing_to_do(selection);
            if selection.stats().encrypted > 0 {
                warn!("Wrong key / password?");
            }
            return Ok(outcome);
        }
        self.transform(&list, key, Direction::Decrypt)
    }

    fn transform(
        &self,
        list: &WorkList,
        key: &KeyDescriptor,
        direction: Direction,
    ) -> Result<Outcome> {
        let _running = self.cancel.start();
        let report = self.cipher.transform(list, key, direction, &self.cancel, &mut log_progress)?;
        info!(
            "Finished: {} processed, {} failed, {} bytes",
            report.processed, report.failed, report.bytes
        );
        Ok(if report.cancelled {
            Outcome::Cancelled
        } else if report.failed > 0 {
            Outcome::Failed(report.failed)
        } else {
            Outcome::Completed
        })
    }

    fn create_key_device(&self, selection: &WorkList, key: &KeyDescriptor) -> Result<Outcome> {
        let targets = create_key_targets(selection, &key.fcpath);
        let Some(device) = targets.first() else {
            return Ok(refuse_or_report(selection, "Create Key Device"));
        };
        let _running = self.cancel.start();
        cancellable(self.devices.create_key_device(&key.fcpath, device).map(|state| {
            info!("Key device '{}' created ({} bytes)", device.path.display(), state.transferred);
        }))
    }

    fn clone_key_device(&self, selection: &WorkList, key: &KeyDescriptor) -> Result<Outcome> {
        let targets = clone_key_targets(selection, &key.fcpath);
        let Some(device) = targets.first() else {
            return Ok(refuse_or_report(selection, "Clone Key Device"));
        };
        let _running = self.cancel.start();
        cancellable(self.devices.clone_key_device(&key.fcpath, device).map(|state| {
            info!("Key device '{}' cloned ({} bytes)", device.path.display(), state.transferred);
        }))
    }

    fn print_gpt(&self, selection: &WorkList) -> Result<Outcome> {
        let targets = print_gpt_targets(selection);
        let Some(device) = targets.first() else {
            return Ok(nothing_to_do(selection));
        };
        match self.devices.print_gpt(device)? {
            Some(header) => {
                info!("GUID Partition Table of '{}':", device.path.display());
                for line in header.to_string().lines() {
                    info!("{line}");
                }
            }
            None => warn!("No GUID Partition Table found on '{}'", device.path.display()),
        }
        Ok(Outcome::Completed)
    }

    fn delete_gpt(&self, selection: &WorkList) -> Result<Outcome> {
        let targets = delete_gpt_targets(selection);
        let Some(device) = targets.first() else {
            return Ok(refuse_or_report(selection, "Delete GPT"));
        };
        let _running = self.cancel.start();
        cancellable(self.devices.delete_gpt(device).map(|_| ()))
    }

    fn key_checksum(&self, key: &FCPath) -> Result<Outcome> {
        info!("Calculating {HASH_ALGORITHM_NAME} checksum of key: '{}'", key.path.display());
        let sum = key_checksum(&key.path, self.config.buffer_size);
        let label = if sum.is_complete() { "" } else { " (incomplete)" };
        info!("{}", sum.to_hex());
        info!("{} bytes{label}", sum.bytes);
        sum.error.map_or(Ok(Outcome::Completed), Err)
    }

    fn create_key_file(&self, path: &Path) -> Result<Outcome> {
        if self.config.dry_run {
            info!(
                "[dry] would create OTP key file '{}' ({} bytes)",
                path.display(),
                self.config.key_file_size
            );
            return Ok(Outcome::Completed);
        }
        let state = generate_pad_with_chunk(path, self.config.key_file_size, DEFAULT_BUFFER_SIZE)?;
        info!("OTP key file '{}' created ({} bytes)", path.display(), state.transferred);
        Ok(Outcome::Completed)
    }
}

fn require_key<'a>(invocation: &Invocation<'a>) -> Result<&'a KeyDescriptor> {
    invocation
        .key
        .ok_or_else(|| OtpError::Usage(format!("{} needs -k <keyfile>", invocation.mode.flag())))
}

fn nothing_to_do(selection: &WorkList) -> Outcome {
    warn!("Nothing to do");
    for line in selection.render_stats().lines() {
        info!("{line}");
    }
    Outcome::NothingToDo
}

fn refuse_or_report(selection: &WorkList, action: &str) -> Outcome {
    if selection.stats().protected_devices > 0 {
        warn!("{action}: device is mounted or read-only; refusing to write to it");
        Outcome::Refused
    } else {
        nothing_to_do(selection)
    }
}

fn cancellable(result: Result<()>) -> Result<Outcome> {
    match result {
        Ok(()) => Ok(Outcome::Completed),
        Err(OtpError::Cancelled) => Ok(Outcome::Cancelled),
        Err(err) => Err(err),
    }
}

fn log_progress(progress: &Progress<'_>) {
    debug!(
        "[{}/{}] '{}': {} of {} bytes",
        progress.files_done + 1,
        progress.files_total,
        progress.path.display(),
        progress.file_done,
        progress.file_total
    );
}
