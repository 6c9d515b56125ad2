// File:    error.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Error taxonomy for usage, validation, transfer and refusal failures.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::path::PathBuf;

use thiserror::Error;

use crate::fcpath::KeyCheck;

/// Errors produced by the otpcrypt core.
#[derive(Error, Debug)]
pub enum OtpError {
    /// Malformed or missing command-line input.
    #[error("{0}")]
    Usage(String),

    /// The key failed one or more eligibility checks.
    #[error("Key parameter: -k \"{}\" Invalid:{}", path.display(), render_checks(failures))]
    InvalidKey {
        /// The key path as given by the operator.
        path: PathBuf,
        /// Every check that failed.
        failures: Vec<KeyCheck>,
    },

    /// A target failed validation before selection building.
    #[error("Target parameter: -t \"{}\" {reason}", path.display())]
    InvalidTarget {
        /// The offending target path.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// An I/O failure in the middle of a chunked operation.
    #[error("transfer failed on \"{}\" at offset {offset}: {source}", path.display())]
    Transfer {
        /// The file or device being read or written.
        path: PathBuf,
        /// The byte offset of the failing chunk.
        offset: u64,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A file that must be created already exists.
    #[error("file: \"{}\" exists! Aborted!", .0.display())]
    AlreadyExists(PathBuf),

    /// An operation was cancelled through the stop flag.
    #[error("operation cancelled by the operator")]
    Cancelled,

    /// The operator asked for something unsafe; the action was not taken.
    #[error("{0}")]
    Refused(String),

    /// An invalid include/exclude glob.
    #[error("invalid wildcard pattern: {0}")]
    Glob(#[from] glob::PatternError),

    /// An invalid filename regular expression.
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    /// A configuration dump could not be serialised.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A plain I/O error outside a chunked transfer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for otpcrypt operations.
pub type Result<T> = std::result::Result<T, OtpError>;

fn render_checks(failures: &[KeyCheck]) -> String {
    failures.iter().map(|f| format!(" {f}")).collect()
}

impl OtpError {
    /// Wraps an I/O error raised by a chunk at `offset` of `path`.
    pub fn transfer(path: impl Into<PathBuf>, offset: u64, source: std::io::Error) -> Self {
        Self::Transfer {
            path: path.into(),
            offset,
            source,
        }
    }

    /// Whether this error belongs on the interactive usage path.
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}
