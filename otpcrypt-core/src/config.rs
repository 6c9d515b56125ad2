// File:    config.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Per-invocation configuration, defaults and the log directory location.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::env;
use std::path::PathBuf;

use serde::Serialize;

use crate::crypto::MAC_SIZE;

/// Default I/O buffer size for every chunked operation (1 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;
/// Default minimum key size in bytes.
pub const KEY_SIZE_MIN: u64 = 1024;
/// Default size of a generated OTP key file (100 MiB).
pub const DEFAULT_KEY_FILE_SIZE: u64 = 100 * 1024 * 1024;
/// Environment variable overriding the log directory.
pub const HOME_ENV: &str = "OTPCRYPT_HOME";

const LOG_DIR_NAME: &str = ".otpcrypt";

/// Settings fixed once the command line has been resolved.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Configuration {
    /// Chunk size for reads and writes.
    pub buffer_size: usize,
    /// Follow symlinks and accept a symlinked key.
    pub symlink: bool,
    /// Report what would happen without writing.
    pub dry_run: bool,
    /// Extra diagnostics.
    pub verbose: bool,
    /// Log every transformed byte.
    pub print: bool,
    /// Encrypt without the authentication header.
    pub mac_disabled: bool,
    /// Smallest acceptable key, and smallest encryptable target.
    pub min_key_size: u64,
    /// Size of the MAC header; the key must be at least this large when MAC is on.
    pub mac_size: u64,
    /// Size of a key file created with `--create-keyfile`.
    pub key_file_size: u64,
    /// Where the log and error files are written.
    pub log_dir: Option<PathBuf>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            symlink: false,
            dry_run: false,
            verbose: false,
            print: false,
            mac_disabled: false,
            min_key_size: KEY_SIZE_MIN,
            mac_size: MAC_SIZE as u64,
            key_file_size: DEFAULT_KEY_FILE_SIZE,
            log_dir: default_log_dir(),
        }
    }
}

impl Configuration {
    /// Renders the configuration as pretty JSON for the verbose runtime dump.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// `$OTPCRYPT_HOME`, else `$HOME/.otpcrypt`.
#[must_use]
pub fn default_log_dir() -> Option<PathBuf> {
    if let Some(dir) = env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(|home| PathBuf::from(home).join(LOG_DIR_NAME))
}
