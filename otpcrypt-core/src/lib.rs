// File:    lib.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: The main library crate for otpcrypt-core, orchestrating target selection, key material and the encryption workflow.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

//! # otpcrypt Core Library
//!
//! This library provides the core functionality of the `otpcrypt` one-time pad
//! tool: classification of targets and keys, the selection work-list, the
//! chunked transfer engine used for key generation and checksums, the bulk
//! cipher, raw key-device operations and the mode dispatcher tying them
//! together.

/// Cooperative cancellation shared between the dispatcher and a shutdown observer.
pub mod cancel;
/// Streaming key checksums.
pub mod checksum;
/// The bulk one-time pad transform over a selection of files.
pub mod cipher;
/// Per-invocation configuration and defaults.
pub mod config;
/// The combine primitive and the MAC header format.
pub mod crypto;
/// Raw key-device and GUID partition table operations.
pub mod device;
/// Executes a resolved mode against a selection.
pub mod dispatch;
/// Error types shared across the crate.
pub mod error;
/// Classification of a single filesystem or device node.
pub mod fcpath;
/// Operating modes and their requirements.
pub mod mode;
/// Utilities for generating new one-time pad key files.
pub mod pad_generator;
/// Target selection and the classified work-list.
pub mod selection;
/// The bounded-buffer chunked transfer engine.
pub mod transfer;

pub use error::{OtpError, Result};
