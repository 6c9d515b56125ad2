// File:    main.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: The otpcrypt command line: resolves the mode, validates key and targets and dispatches.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

//! `otpcrypt` encrypts and decrypts files with one-time pad keys, creates key
//! files and raw key devices, and inspects or wipes device partition tables.

use std::env;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

use log::{debug, error, warn};
use otpcrypt_core::cancel::CancelToken;
use otpcrypt_core::cipher::OtpCipher;
use otpcrypt_core::config::{Configuration, default_log_dir};
use otpcrypt_core::device::RawDeviceManager;
use otpcrypt_core::dispatch::{Invocation, ModeDispatcher};
use otpcrypt_core::fcpath::{FCPath, KeyCheck, KeyDescriptor, key_checks};
use otpcrypt_core::mode::Mode;
use otpcrypt_core::selection::SelectionBuilder;
use otpcrypt_core::{OtpError, Result};

use resolver::{Command, Resolved};

mod help;
mod logging;
mod prompt;
mod resolver;
mod shutdown;

fn main() -> ExitCode {
    let command = resolver::resolve(resolver::normalise(env::args_os().skip(1)));
    let (verbose, log_dir) = match &command {
        Ok(Command::Run(resolved)) => (resolved.config.verbose, resolved.config.log_dir.clone()),
        _ => (false, default_log_dir()),
    };
    if let Err(e) = logging::init(verbose, log_dir.as_deref()) {
        eprintln!("Could not initialise logging: {e}");
    }

    let code = match command.and_then(execute) {
        Ok(code) => code,
        Err(err) if err.is_usage() => {
            warn!("{err}");
            prompt::offer_usage(prompt::USAGE_PROMPT_TIMEOUT);
            1
        }
        Err(err) => {
            error!("{err}");
            1
        }
    };
    logging::flush();
    ExitCode::from(code)
}

fn execute(command: Command) -> Result<u8> {
    match command {
        Command::Help => println!("{}", help::usage()),
        Command::Examples => println!("{}", help::examples()),
        Command::Version => println!("otpcrypt {}", help::VERSION),
        Command::License => println!("{}", help::license()),
        Command::Run(resolved) => return run(*resolved),
    }
    Ok(0)
}

fn run(resolved: Resolved) -> Result<u8> {
    let Resolved {
        mode,
        config,
        key,
        key_file,
        mut targets,
        batch,
        pattern,
        password,
        password_prompt,
    } = resolved;
    debug!("mode {mode}, configuration {}", config.to_json()?);

    for target in &targets {
        if fs::symlink_metadata(target).is_err() {
            return Err(OtpError::InvalidTarget {
                path: target.clone(),
                reason: "does not exist".to_owned(),
            });
        }
    }
    if let Some(batch) = &batch {
        targets.extend(resolver::read_batch(batch)?);
    }
    if mode.needs_target() && targets.is_empty() {
        return Err(OtpError::Usage(format!("{} has no valid targets", mode.flag())));
    }

    let key = match &key {
        Some(path) if mode.needs_key() => Some(validate_key(path, mode, &config)?),
        _ => None,
    };
    let password = if password_prompt && key.is_some() {
        Some(prompt::read_password()?)
    } else {
        password
    };
    let key = key.map(|fc| KeyDescriptor::new(fc, password.as_ref().map(|p| p.as_bytes())));
    drop(password);

    let selection = SelectionBuilder::new(&config)
        .key(key.as_ref())
        .pattern(pattern)
        .build(&targets);

    let cancel = CancelToken::new();
    shutdown::install(cancel.clone())?;
    let dispatcher = ModeDispatcher::new(
        config.clone(),
        OtpCipher::new(config.clone()),
        RawDeviceManager::new(config.buffer_size, cancel.clone()),
        cancel,
    );
    let outcome = dispatcher.dispatch(&Invocation {
        mode,
        key: key.as_ref(),
        key_file: key_file.as_deref(),
        selection: &selection,
    })?;
    debug!("outcome {outcome:?}");
    Ok(outcome.exit_code())
}

/// Classifies the key and fails with every check it does not pass.
///
/// A checksum reads any readable key, whatever its size.
fn validate_key(path: &Path, mode: Mode, config: &Configuration) -> Result<FCPath> {
    let key = FCPath::key(path, config);
    let mut failures = key_checks(&key, config);
    if mode == Mode::KeyChecksum {
        failures.retain(|check| {
            !matches!(
                check,
                KeyCheck::BelowMinimum(_) | KeyCheck::BelowMacSize(_)
            )
        });
    }
    if failures.is_empty() {
        Ok(key)
    } else {
        Err(OtpError::InvalidKey {
            path: path.to_path_buf(),
            failures,
        })
    }
}
