// File:    logging.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Console logging through env_logger, mirrored into the otpcrypt log and error files.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use env_logger::{Builder, Env, Target};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

const LOG_FILE: &str = "otpcrypt.log";
const ERR_FILE: &str = "otpcrypt.err";

struct TeeLogger {
    console: env_logger::Logger,
    log_file: Option<PathBuf>,
    err_file: Option<PathBuf>,
    file_failed: AtomicBool,
}

impl TeeLogger {
    fn append(&self, path: &Path, line: &str) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| {
                writeln!(file, "{line}")?;
                file.sync_data()
            });
        if let Err(e) = result {
            if !self.file_failed.swap(true, Ordering::SeqCst) {
                eprintln!("Could not write log file '{}': {e}", path.display());
            }
        }
    }
}

impl Log for TeeLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.console.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.console.matches(record) {
            return;
        }
        self.console.log(record);
        if self.file_failed.load(Ordering::SeqCst) {
            return;
        }
        let line = format!("{:<5} {}", record.level(), record.args());
        if let Some(path) = &self.log_file {
            self.append(path, &line);
        }
        if record.level() <= Level::Warn {
            if let Some(path) = &self.err_file {
                self.append(path, &line);
            }
        }
    }

    fn flush(&self) {
        self.console.flush();
    }
}

/// Installs the global logger.
///
/// Console output goes to stdout: info lines as plain text, everything else
/// prefixed with its level. `RUST_LOG` overrides the default level, which is
/// `debug` when `verbose` is set and `info` otherwise. Every line is also
/// appended to `otpcrypt.log` in `log_dir`, and warnings and errors to
/// `otpcrypt.err`.
pub(crate) fn init(verbose: bool, log_dir: Option<&Path>) -> Result<(), SetLoggerError> {
    let default_level = if verbose { "debug" } else { "info" };
    let console = Builder::from_env(Env::default().default_filter_or(default_level))
        .target(Target::Stdout)
        .format(|buf, record| {
            if record.level() == Level::Info {
                writeln!(buf, "{}", record.args())
            } else {
                writeln!(buf, "{}: {}", record.level(), record.args())
            }
        })
        .build();

    let dir = log_dir.and_then(|dir| match fs::create_dir_all(dir) {
        Ok(()) => Some(dir),
        Err(e) => {
            eprintln!(
                "Could not create log directory '{}': {e}; file logging disabled",
                dir.display()
            );
            None
        }
    });

    let max_level: LevelFilter = console.filter();
    let logger = TeeLogger {
        console,
        log_file: dir.map(|d| d.join(LOG_FILE)),
        err_file: dir.map(|d| d.join(ERR_FILE)),
        file_failed: AtomicBool::new(false),
    };
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max_level);
    Ok(())
}

/// Flushes the console; the files are synced on every line.
pub(crate) fn flush() {
    log::logger().flush();
    if let Err(e) = io::stdout().flush() {
        eprintln!("Could not flush stdout: {e}");
    }
}
