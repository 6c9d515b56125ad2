// File:    device.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Raw key devices: writing and cloning keys onto devices, and reading or wiping their GUID partition tables.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::fmt;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::{OtpError, Result};
use crate::fcpath::FCPath;
use crate::transfer::{ChunkPlan, ChunkedTransfer, TransferState, read_at, write_at};

/// Logical block size assumed for partition tables.
pub const SECTOR_SIZE: u64 = 512;
/// Sectors covered by the protective MBR, the GPT header and its entry array.
pub const GPT_SECTORS: u64 = 34;
/// Sectors covered by the backup entry array and backup header.
pub const BACKUP_GPT_SECTORS: u64 = 33;

const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";

/// Operations on raw devices.
pub trait DeviceManager {
    /// Copies the key file onto `device` from offset 0.
    ///
    /// # Errors
    ///
    /// Returns an error if either side cannot be read or written.
    fn create_key_device(&self, key: &FCPath, device: &FCPath) -> Result<TransferState>;

    /// Copies the key device `source` onto `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if `device` is smaller than `source`, or on I/O failure.
    fn clone_key_device(&self, source: &FCPath, device: &FCPath) -> Result<TransferState>;

    /// Reads the primary GPT header; `None` when the device has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be read.
    fn print_gpt(&self, device: &FCPath) -> Result<Option<GptHeader>>;

    /// Zeroes the primary and backup partition tables. Returns the bytes cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be written.
    fn delete_gpt(&self, device: &FCPath) -> Result<u64>;
}

/// The fields of a GPT header worth showing to an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptHeader {
    /// Revision, e.g. `0x00010000` for 1.0.
    pub revision: u32,
    /// Header size in bytes.
    pub header_size: u32,
    /// LBA of this header.
    pub current_lba: u64,
    /// LBA of the other header.
    pub backup_lba: u64,
    /// First LBA usable by partitions.
    pub first_usable_lba: u64,
    /// Last LBA usable by partitions.
    pub last_usable_lba: u64,
    /// The disk GUID.
    pub disk_guid: Uuid,
    /// Starting LBA of the partition entry array.
    pub entries_lba: u64,
    /// Number of partition entries.
    pub entry_count: u32,
    /// Size of one partition entry.
    pub entry_size: u32,
}

impl GptHeader {
    /// Decodes a header from the start of LBA 1; `None` without the `EFI PART` signature.
    #[must_use]
    pub fn parse(sector: &[u8]) -> Option<Self> {
        if sector.len() < 92 || &sector[..8] != GPT_SIGNATURE {
            return None;
        }
        let u32_at = |at: usize| {
            u32::from_le_bytes([sector[at], sector[at + 1], sector[at + 2], sector[at + 3]])
        };
        let u64_at = |at: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&sector[at..at + 8]);
            u64::from_le_bytes(bytes)
        };
        let mut guid = [0u8; 16];
        guid.copy_from_slice(&sector[56..72]);
        Some(Self {
            revision: u32_at(8),
            header_size: u32_at(12),
            current_lba: u64_at(24),
            backup_lba: u64_at(32),
            first_usable_lba: u64_at(40),
            last_usable_lba: u64_at(48),
            disk_guid: Uuid::from_bytes_le(guid),
            entries_lba: u64_at(72),
            entry_count: u32_at(80),
            entry_size: u32_at(84),
        })
    }
}

impl fmt::Display for GptHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Signature:          EFI PART")?;
        writeln!(f, "Revision:           {}.{}", self.revision >> 16, self.revision & 0xffff)?;
        writeln!(f, "Header size:        {}", self.header_size)?;
        writeln!(f, "Current LBA:        {}", self.current_lba)?;
        writeln!(f, "Backup LBA:         {}", self.backup_lba)?;
        writeln!(f, "First usable LBA:   {}", self.first_usable_lba)?;
        writeln!(f, "Last usable LBA:    {}", self.last_usable_lba)?;
        writeln!(f, "Disk GUID:          {}", self.disk_guid)?;
        writeln!(
            f,
            "Partition entries:  {} x {} bytes at LBA {}",
            self.entry_count, self.entry_size, self.entries_lba
        )
    }
}

/// Device manager working on the raw bytes of a device.
#[derive(Debug, Clone)]
pub struct RawDeviceManager {
    buffer_size: usize,
    cancel: CancelToken,
}

impl RawDeviceManager {
    /// Moves data in chunks of `buffer_size`, stopping when `cancel` is raised.
    #[must_use]
    pub const fn new(buffer_size: usize, cancel: CancelToken) -> Self {
        Self { buffer_size, cancel }
    }

    fn engine(&self) -> ChunkedTransfer {
        ChunkedTransfer::new(self.buffer_size).with_cancel(self.cancel.clone())
    }

    fn copy(&self, source: &FCPath, device: &FCPath, total: u64) -> Result<TransferState> {
        self.engine().copy(&source.path, &device.path, total, |state| {
            debug!(
                "'{}': {} bytes written, {} to go",
                device.path.display(),
                state.transferred,
                state.remaining
            );
        })
    }

    fn zero_range(&self, device: &FCPath, start: u64, len: u64) -> Result<u64> {
        let chunk_size = self.buffer_size.max(1).min(usize::try_from(len).unwrap_or(usize::MAX));
        let zeros = vec![0u8; chunk_size];
        let mut cleared = 0;
        for chunk in ChunkPlan::new(len, zeros.len()) {
            if self.cancel.is_cancelled() {
                return Err(OtpError::Cancelled);
            }
            let at = start + chunk.offset;
            write_at(&device.path, at, &zeros[..chunk.len])
                .map_err(|e| OtpError::transfer(&device.path, at, e))?;
            cleared += chunk.len as u64;
        }
        Ok(cleared)
    }
}

impl DeviceManager for RawDeviceManager {
    fn create_key_device(&self, key: &FCPath, device: &FCPath) -> Result<TransferState> {
        let total = key.size.min(device.size);
        if total < key.size {
            warn!(
                "Key '{}' ({} bytes) is larger than device '{}' ({} bytes); \
                 writing the first {total} bytes",
                key.path.display(),
                key.size,
                device.path.display(),
                device.size
            );
        }
        info!("Writing key '{}' to device '{}'", key.path.display(), device.path.display());
        self.copy(key, device, total)
    }

    fn clone_key_device(&self, source: &FCPath, device: &FCPath) -> Result<TransferState> {
        if device.size < source.size {
            return Err(OtpError::InvalidTarget {
                path: device.path.clone(),
                reason: format!(
                    "device is smaller ({} bytes) than key device ({} bytes)",
                    device.size, source.size
                ),
            });
        }
        info!("Cloning key device '{}' to '{}'", source.path.display(), device.path.display());
        self.copy(source, device, source.size)
    }

    fn print_gpt(&self, device: &FCPath) -> Result<Option<GptHeader>> {
        let mut sector = [0u8; SECTOR_SIZE as usize];
        let read = read_at(&device.path, SECTOR_SIZE, &mut sector)
            .map_err(|e| OtpError::transfer(&device.path, SECTOR_SIZE, e))?;
        Ok(GptHeader::parse(&sector[..read]))
    }

    fn delete_gpt(&self, device: &FCPath) -> Result<u64> {
        let primary = (GPT_SECTORS * SECTOR_SIZE).min(device.size);
        let mut cleared = self.zero_range(device, 0, primary)?;
        let backup_start = device
            .size
            .saturating_sub(BACKUP_GPT_SECTORS * SECTOR_SIZE)
            .max(primary);
        cleared += self.zero_range(device, backup_start, device.size - backup_start)?;
        info!("Deleted partition tables on '{}' ({cleared} bytes zeroed)", device.path.display());
        Ok(cleared)
    }
}
