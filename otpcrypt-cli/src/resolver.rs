// File:    resolver.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Turns the command line into one mode, its configuration and its parameters.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use log::warn;
use zeroize::Zeroizing;

use otpcrypt_core::config::{
    self, Configuration, DEFAULT_BUFFER_SIZE, DEFAULT_KEY_FILE_SIZE, KEY_SIZE_MIN,
};
use otpcrypt_core::mode::Mode;
use otpcrypt_core::selection::Pattern;
use otpcrypt_core::{OtpError, Result};

#[derive(Parser, Debug)]
#[command(name = "otpcrypt", disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    #[arg(long)]
    encrypt: bool,
    #[arg(long)]
    decrypt: bool,
    #[arg(long = "create-keydev")]
    create_keydev: bool,
    #[arg(long = "create-keyfile")]
    create_keyfile: bool,
    #[arg(long = "clone-keydev")]
    clone_keydev: bool,
    #[arg(long = "key-chksum")]
    key_chksum: bool,
    #[arg(long = "print-gpt")]
    print_gpt: bool,
    #[arg(long = "delete-gpt")]
    delete_gpt: bool,

    #[arg(short = 'k', long = "key")]
    key: Option<PathBuf>,
    #[arg(short = 'K', long = "keyfile")]
    key_file: Option<PathBuf>,
    #[arg(short = 't', long = "target")]
    targets: Vec<PathBuf>,
    #[arg(short = 'b', long = "batch")]
    batch: Option<PathBuf>,
    #[arg(short = 'S', long = "key-size")]
    key_size: Option<u64>,
    #[arg(short = 's', long = "buffer-size")]
    buffer_kib: Option<usize>,
    #[arg(short = 'w')]
    include: Option<String>,
    #[arg(short = 'W')]
    exclude: Option<String>,
    #[arg(short = 'r')]
    regex: Option<String>,

    #[arg(long = "disable-MAC")]
    disable_mac: bool,
    #[arg(long = "no-key-size")]
    no_key_size: bool,
    #[arg(long)]
    dry: bool,
    #[arg(short = 'l', long)]
    symlink: bool,
    #[arg(short = 'v', long)]
    verbose: bool,
    #[arg(long)]
    print: bool,
    #[arg(short = 'p', long)]
    password: Option<String>,
    #[arg(long = "password-prompt")]
    password_prompt: bool,

    #[arg(short = 'h', long)]
    help: bool,
    #[arg(long)]
    examples: bool,
    #[arg(long)]
    version: bool,
    #[arg(long)]
    license: bool,
}

/// What the invocation asks for.
#[derive(Debug)]
pub(crate) enum Command {
    Help,
    Examples,
    Version,
    License,
    Run(Box<Resolved>),
}

/// A mode with everything it needs, before touching the filesystem.
#[derive(Debug)]
pub(crate) struct Resolved {
    pub(crate) mode: Mode,
    pub(crate) config: Configuration,
    pub(crate) key: Option<PathBuf>,
    pub(crate) key_file: Option<PathBuf>,
    pub(crate) targets: Vec<PathBuf>,
    pub(crate) batch: Option<PathBuf>,
    pub(crate) pattern: Pattern,
    pub(crate) password: Option<Zeroizing<String>>,
    pub(crate) password_prompt: bool,
}

/// Rewrites `-pp` to its long form; clap short options are single characters.
pub(crate) fn normalise<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| if arg == "-pp" { OsString::from("--password-prompt") } else { arg })
        .collect()
}

/// Resolves the arguments following the program name.
///
/// # Errors
///
/// Returns [`OtpError::Usage`] for anything the operator has to correct, and
/// a pattern error for an invalid wildcard or regular expression.
pub(crate) fn resolve(args: Vec<OsString>) -> Result<Command> {
    let matches = Cli::command()
        .no_binary_name(true)
        .try_get_matches_from(args)
        .map_err(|e| OtpError::Usage(first_line(&e.to_string())))?;
    let mut cli = Cli::from_arg_matches(&matches)
        .map_err(|e| OtpError::Usage(first_line(&e.to_string())))?;

    if cli.help {
        return Ok(Command::Help);
    }
    if cli.examples {
        return Ok(Command::Examples);
    }
    if cli.version {
        return Ok(Command::Version);
    }
    if cli.license {
        return Ok(Command::License);
    }

    let mode = first_mode(&matches, &cli);
    if mode == Mode::None {
        return Err(OtpError::Usage(
            "Missing mode: one of --encrypt, --decrypt, --create-keyfile, --create-keydev, \
             --clone-keydev, --key-chksum, --print-gpt, --delete-gpt"
                .to_owned(),
        ));
    }
    if mode.needs_key() && cli.key.is_none() {
        return Err(OtpError::Usage(format!("Missing parameter: {} needs -k <key>", mode.flag())));
    }
    if mode.needs_target() && cli.targets.is_empty() && cli.batch.is_none() {
        return Err(OtpError::Usage(format!(
            "Missing parameter: {} needs -t <target> or -b <batchfile>",
            mode.flag()
        )));
    }
    if mode == Mode::CreateKeyFile && cli.key_file.is_none() {
        return Err(OtpError::Usage(
            "Missing parameter: --create-keyfile needs -K <keyfile>".to_owned(),
        ));
    }
    if cli.disable_mac && mode == Mode::Decrypt {
        return Err(OtpError::Usage(
            "--disable-MAC cannot be used with --decrypt; encrypt again with the same key instead"
                .to_owned(),
        ));
    }
    if cli.disable_mac && mode != Mode::Encrypt {
        return Err(OtpError::Usage(format!("--disable-MAC cannot be used with {}", mode.flag())));
    }
    let buffer_size = match cli.buffer_kib {
        Some(0) => return Err(OtpError::Usage("-s <KiB> must be at least 1".to_owned())),
        Some(kib) => kib
            .checked_mul(1024)
            .ok_or_else(|| OtpError::Usage(format!("-s {kib} is too large")))?,
        None => DEFAULT_BUFFER_SIZE,
    };

    let config = Configuration {
        buffer_size,
        symlink: cli.symlink,
        dry_run: cli.dry,
        verbose: cli.verbose,
        print: cli.print,
        mac_disabled: cli.disable_mac,
        min_key_size: if cli.no_key_size || cli.disable_mac { 1 } else { KEY_SIZE_MIN },
        key_file_size: cli.key_size.unwrap_or(DEFAULT_KEY_FILE_SIZE),
        log_dir: config::default_log_dir(),
        ..Configuration::default()
    };

    Ok(Command::Run(Box::new(Resolved {
        mode,
        pattern: last_pattern(&matches, &cli)?,
        config,
        key: cli.key.take(),
        key_file: cli.key_file.take(),
        targets: std::mem::take(&mut cli.targets),
        batch: cli.batch.take(),
        password: cli.password.take().map(Zeroizing::new),
        password_prompt: cli.password_prompt,
    })))
}

/// Reads a batch file: one target per line, blank lines ignored.
///
/// Lines that do not name an existing regular file are reported and skipped.
///
/// # Errors
///
/// Returns an error if the batch file itself cannot be read.
pub(crate) fn read_batch(path: &Path) -> Result<Vec<PathBuf>> {
    let content = fs::read_to_string(path).map_err(|e| OtpError::InvalidTarget {
        path: path.to_path_buf(),
        reason: format!("batch file unreadable: {e}"),
    })?;
    let mut targets = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let target = PathBuf::from(line);
        if fs::metadata(&target).is_ok_and(|m| m.is_file()) {
            targets.push(target);
        } else {
            warn!(
                "Batch file \"{}\" line {}: \"{line}\" is not a file; skipped",
                path.display(),
                number + 1
            );
        }
    }
    if targets.is_empty() {
        warn!("Batch file \"{}\" contains no valid targets", path.display());
    }
    Ok(targets)
}

fn first_mode(matches: &ArgMatches, cli: &Cli) -> Mode {
    let flags = [
        (cli.encrypt, "encrypt", Mode::Encrypt),
        (cli.decrypt, "decrypt", Mode::Decrypt),
        (cli.create_keydev, "create_keydev", Mode::CreateKeyDevice),
        (cli.create_keyfile, "create_keyfile", Mode::CreateKeyFile),
        (cli.clone_keydev, "clone_keydev", Mode::CloneKeyDevice),
        (cli.key_chksum, "key_chksum", Mode::KeyChecksum),
        (cli.print_gpt, "print_gpt", Mode::PrintGpt),
        (cli.delete_gpt, "delete_gpt", Mode::DeleteGpt),
    ];
    flags
        .into_iter()
        .filter(|(set, _, _)| *set)
        .filter_map(|(_, id, mode)| matches.index_of(id).map(|index| (index, mode)))
        .min_by_key(|(index, _)| *index)
        .map_or(Mode::None, |(_, mode)| mode)
}

fn last_pattern(matches: &ArgMatches, cli: &Cli) -> Result<Pattern> {
    let candidates = [
        (matches.index_of("include"), cli.include.as_deref(), 0),
        (matches.index_of("exclude"), cli.exclude.as_deref(), 1),
        (matches.index_of("regex"), cli.regex.as_deref(), 2),
    ];
    let last = candidates
        .into_iter()
        .filter_map(|(index, value, kind)| Some((index?, value?, kind)))
        .max_by_key(|(index, _, _)| *index);
    match last {
        Some((_, glob, 0)) => Pattern::glob(glob, false),
        Some((_, glob, 1)) => Pattern::glob(glob, true),
        Some((_, regex, _)) => Pattern::regex(regex),
        None => Ok(Pattern::Any),
    }
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().trim_start_matches("error: ").to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<OsString> {
        normalise(line.split_whitespace().map(OsString::from))
    }

    fn run(line: &str) -> Resolved {
        match resolve(args(line)).unwrap() {
            Command::Run(resolved) => *resolved,
            other => panic!("expected a run, got {other:?}"),
        }
    }

    fn usage_error(line: &str) -> String {
        match resolve(args(line)) {
            Err(OtpError::Usage(message)) => message,
            other => panic!("expected a usage error, got {other:?}"),
        }
    }

    #[test]
    fn first_mode_wins() {
        assert_eq!(run("--encrypt --decrypt -k key -t file").mode, Mode::Encrypt);
        assert_eq!(run("--decrypt -k key --encrypt -t file").mode, Mode::Decrypt);
        assert_eq!(run("--print-gpt --delete-gpt -t /dev/null").mode, Mode::PrintGpt);
    }

    #[test]
    fn password_prompt_short_form() {
        let resolved = run("--encrypt -pp -k key -t file");
        assert!(resolved.password_prompt);
        assert!(resolved.password.is_none());
    }

    #[test]
    fn inline_password_is_kept() {
        let resolved = run("--encrypt -p secret -k key -t file");
        assert_eq!(resolved.password.as_deref().map(String::as_str), Some("secret"));
    }

    #[test]
    fn missing_parameters_are_usage_errors() {
        assert!(usage_error("-k key -t file").starts_with("Missing mode"));
        assert!(usage_error("--encrypt -t file").contains("-k <key>"));
        assert!(usage_error("--encrypt -k key").contains("-t <target>"));
        assert!(usage_error("--create-keyfile").contains("-K <keyfile>"));
        assert!(usage_error("--key-chksum").contains("-k <key>"));
    }

    #[test]
    fn malformed_input_is_a_usage_error() {
        usage_error("--encrypt -k key -t file --bogus");
        usage_error("--encrypt -k key -t file -s many");
        usage_error("--encrypt -k key -t file -s 0");
        usage_error("--encrypt -k");
    }

    #[test]
    fn disable_mac_only_with_encrypt() {
        let message = usage_error("--key-chksum --disable-MAC -k key");
        assert!(message.contains("--disable-MAC"));
        let message = usage_error("--decrypt --disable-MAC -k key -t file");
        assert!(message.starts_with("--disable-MAC cannot be used with --decrypt"));
        let resolved = run("--encrypt --disable-MAC -k key -t file");
        assert!(resolved.config.mac_disabled);
        assert_eq!(resolved.config.min_key_size, 1);
    }

    #[test]
    fn sizes_and_flags_reach_the_configuration() {
        let resolved =
            run("--create-keyfile -K new.key -S 0 -s 4 --dry -v --print -l --no-key-size");
        assert_eq!(resolved.config.key_file_size, 0);
        assert_eq!(resolved.config.buffer_size, 4096);
        let config = &resolved.config;
        assert!(config.dry_run && config.verbose && config.print && config.symlink);
        assert_eq!(resolved.config.min_key_size, 1);
        assert_eq!(resolved.key_file, Some(PathBuf::from("new.key")));
    }

    #[test]
    fn targets_accumulate() {
        let resolved = run("--encrypt -k key -t a -t b -t c");
        assert_eq!(
            resolved.targets,
            vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
        );
    }

    #[test]
    fn batch_file_stands_in_for_targets() {
        let resolved = run("--encrypt -k key -b list.txt");
        assert_eq!(resolved.batch, Some(PathBuf::from("list.txt")));
    }

    #[test]
    fn last_filter_wins() {
        let resolved = run("--encrypt -k key -t dir -w *.txt -r ^a");
        assert!(matches!(resolved.pattern, Pattern::Regex(_)));
        let resolved = run("--encrypt -k key -t dir -r ^a -W *.bit");
        assert!(matches!(resolved.pattern, Pattern::Glob { negate: true, .. }));
    }

    #[test]
    fn informational_flags_need_no_mode() {
        assert!(matches!(resolve(args("-h")), Ok(Command::Help)));
        assert!(matches!(resolve(args("--examples")), Ok(Command::Examples)));
        assert!(matches!(resolve(args("--version")), Ok(Command::Version)));
        assert!(matches!(resolve(args("--license")), Ok(Command::License)));
    }

    #[test]
    fn batch_skips_lines_that_are_not_files() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.txt");
        fs::write(&real, b"x").unwrap();
        let batch = dir.path().join("batch.txt");
        let content = format!(
            "{}\n\n{}\n{}\n",
            real.display(),
            dir.path().display(),
            dir.path().join("gone").display()
        );
        fs::write(&batch, content).unwrap();
        assert_eq!(read_batch(&batch).unwrap(), vec![real]);
    }
}
