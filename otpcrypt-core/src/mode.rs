// File:    mode.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: The operating modes and the parameters each one needs.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::fmt;

/// The single operation an invocation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Encrypt targets with a key.
    Encrypt,
    /// Decrypt targets with a key.
    Decrypt,
    /// Write a key file onto a raw device.
    CreateKeyDevice,
    /// Generate a new OTP key file.
    CreateKeyFile,
    /// Copy a key device onto another device.
    CloneKeyDevice,
    /// Print the checksum of a key.
    KeyChecksum,
    /// Print a device's GUID partition table header.
    PrintGpt,
    /// Wipe a device's GUID partition table.
    DeleteGpt,
    /// No mode was given.
    #[default]
    None,
}

impl Mode {
    #[cfg(test)]
    const ALL: [Self; 8] = [
        Self::Encrypt,
        Self::Decrypt,
        Self::CreateKeyDevice,
        Self::CreateKeyFile,
        Self::CloneKeyDevice,
        Self::KeyChecksum,
        Self::PrintGpt,
        Self::DeleteGpt,
    ];

    /// Whether the mode reads a key given with `-k`.
    #[must_use]
    pub const fn needs_key(self) -> bool {
        matches!(
            self,
            Self::Encrypt
                | Self::Decrypt
                | Self::CreateKeyDevice
                | Self::CloneKeyDevice
                | Self::KeyChecksum
        )
    }

    /// Whether the mode operates on targets given with `-t` or `-b`.
    #[must_use]
    pub const fn needs_target(self) -> bool {
        matches!(
            self,
            Self::Encrypt
                | Self::Decrypt
                | Self::CreateKeyDevice
                | Self::CloneKeyDevice
                | Self::PrintGpt
                | Self::DeleteGpt
        )
    }

    /// The long command-line flag selecting this mode.
    #[must_use]
    pub const fn flag(self) -> &'static str {
        match self {
            Self::Encrypt => "--encrypt",
            Self::Decrypt => "--decrypt",
            Self::CreateKeyDevice => "--create-keydev",
            Self::CreateKeyFile => "--create-keyfile",
            Self::CloneKeyDevice => "--clone-keydev",
            Self::KeyChecksum => "--key-chksum",
            Self::PrintGpt => "--print-gpt",
            Self::DeleteGpt => "--delete-gpt",
            Self::None => "",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::CreateKeyDevice => "create key device",
            Self::CreateKeyFile => "create key file",
            Self::CloneKeyDevice => "clone key device",
            Self::KeyChecksum => "key checksum",
            Self::PrintGpt => "print GPT",
            Self::DeleteGpt => "delete GPT",
            Self::None => "none",
        };
        f.write_str(name)
    }
}
