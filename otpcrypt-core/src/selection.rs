// File:    selection.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Walks the operator's targets, filters them by pattern and builds the classified work-list with its counters.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::config::Configuration;
use crate::error::Result;
use crate::fcpath::{FCPath, KeyDescriptor, PathKind, same_path};

/// Filename filter applied to files found inside target directories.
#[derive(Debug, Clone, Default)]
pub enum Pattern {
    /// Every file.
    #[default]
    Any,
    /// A wildcard; `negate` turns it into an exclude filter.
    Glob {
        /// The compiled wildcard.
        pattern: glob::Pattern,
        /// Exclude matches instead of including them.
        negate: bool,
    },
    /// A regular expression over the file name.
    Regex(Regex),
}

impl Pattern {
    /// Compiles an include (`negate == false`) or exclude wildcard.
    ///
    /// # Errors
    ///
    /// Returns an error if the wildcard is malformed.
    pub fn glob(pattern: &str, negate: bool) -> Result<Self> {
        Ok(Self::Glob {
            pattern: glob::Pattern::new(pattern)?,
            negate,
        })
    }

    /// Compiles a filename regular expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is malformed.
    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    /// Whether the file at `path` passes the filter; only its name is matched.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        match self {
            Self::Any => true,
            Self::Glob { pattern, negate } => pattern.matches(&name) != *negate,
            Self::Regex(re) => re.is_match(&name),
        }
    }
}

/// Aggregate counters of a [`WorkList`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionStats {
    /// Regular files.
    pub files: usize,
    /// Directories.
    pub directories: usize,
    /// Symlinks that were not followed.
    pub symlinks: usize,
    /// Entries that could be encrypted.
    pub encryptable: usize,
    /// Entries that could be decrypted.
    pub decryptable: usize,
    /// Writable, unmounted devices.
    pub valid_devices: usize,
    /// Mounted or read-only devices.
    pub protected_devices: usize,
    /// Entries carrying the current key.
    pub matching_key: usize,
    /// Entries carrying any MAC header.
    pub encrypted: usize,
    /// Bytes over all files and devices.
    pub total_bytes: u64,
    /// Bytes over encryptable entries.
    pub encryptable_bytes: u64,
    /// Bytes over decryptable entries.
    pub decryptable_bytes: u64,
}

impl SelectionStats {
    fn record(&mut self, fc: &FCPath) {
        match fc.kind {
            PathKind::File => self.files += 1,
            PathKind::Directory => self.directories += 1,
            PathKind::Symlink => self.symlinks += 1,
            PathKind::Device => self.valid_devices += 1,
            PathKind::DeviceProtected => self.protected_devices += 1,
            PathKind::Invalid => {}
        }
        if fc.kind == PathKind::File || fc.kind.is_device() {
            self.total_bytes += fc.size;
        }
        if fc.is_encryptable {
            self.encryptable += 1;
            self.encryptable_bytes += fc.size;
        }
        if fc.is_decryptable {
            self.decryptable += 1;
            self.decryptable_bytes += fc.size;
        }
        if fc.has_matching_key {
            self.matching_key += 1;
        }
        if fc.is_encrypted {
            self.encrypted += 1;
        }
    }
}

/// An ordered, append-only list of classified entries.
///
/// The counters are updated on every [`WorkList::push`], so they always equal
/// the number of entries satisfying each predicate.
#[derive(Debug, Clone, Default)]
pub struct WorkList {
    entries: Vec<FCPath>,
    stats: SelectionStats,
}

impl WorkList {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and updates the counters.
    pub fn push(&mut self, fc: FCPath) {
        self.stats.record(&fc);
        self.entries.push(fc);
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first entry, if any.
    #[must_use]
    pub fn first(&self) -> Option<&FCPath> {
        self.entries.first()
    }

    /// Iterates over the entries in order.
    pub fn iter(&self) -> std::slice::Iter<'_, FCPath> {
        self.entries.iter()
    }

    /// The aggregate counters.
    #[must_use]
    pub const fn stats(&self) -> &SelectionStats {
        &self.stats
    }

    /// A new list holding the entries that satisfy `predicate`.
    #[must_use]
    pub fn filter<P>(&self, predicate: P) -> Self
    where
        P: Fn(&FCPath) -> bool,
    {
        self.iter().filter(|fc| predicate(fc)).cloned().collect()
    }

    /// The counters as an operator-facing report.
    #[must_use]
    pub fn render_stats(&self) -> String {
        let s = &self.stats;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Found:        {} files, {} dirs, {} symlinks, {} devices ({} protected)",
            s.files,
            s.directories,
            s.symlinks,
            s.valid_devices + s.protected_devices,
            s.protected_devices
        );
        let _ = writeln!(
            out,
            "Encryptable:  {} files ({})",
            s.encryptable,
            human_size(s.encryptable_bytes)
        );
        let _ = writeln!(
            out,
            "Decryptable:  {} files ({})",
            s.decryptable,
            human_size(s.decryptable_bytes)
        );
        let _ = writeln!(
            out,
            "Encrypted:    {} files ({} with matching key)",
            s.encrypted, s.matching_key
        );
        let _ = writeln!(out, "Total:        {}", human_size(s.total_bytes));
        out
    }
}

impl FromIterator<FCPath> for WorkList {
    fn from_iter<I: IntoIterator<Item = FCPath>>(iter: I) -> Self {
        let mut list = Self::new();
        for fc in iter {
            list.push(fc);
        }
        list
    }
}

impl<'a> IntoIterator for &'a WorkList {
    type Item = &'a FCPath;
    type IntoIter = std::slice::Iter<'a, FCPath>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Entries that can be encrypted.
#[must_use]
pub const fn encryptable(fc: &FCPath) -> bool {
    fc.is_encryptable
}

/// Entries that can be decrypted.
#[must_use]
pub const fn decryptable(fc: &FCPath) -> bool {
    fc.is_decryptable
}

/// Writable, unmounted devices.
#[must_use]
pub fn writable_device(fc: &FCPath) -> bool {
    fc.kind == PathKind::Device
}

/// Mounted or read-only devices.
#[must_use]
pub fn protected_device(fc: &FCPath) -> bool {
    fc.kind == PathKind::DeviceProtected
}

/// Devices a key file can be written to; empty unless the key is a file.
#[must_use]
pub fn create_key_targets(list: &WorkList, key: &FCPath) -> WorkList {
    if key.kind == PathKind::File {
        list.filter(writable_device)
    } else {
        WorkList::new()
    }
}

/// Devices a key device can be cloned onto: not the source itself and not
/// already holding the key. Empty unless the key is a device.
#[must_use]
pub fn clone_key_targets(list: &WorkList, key: &FCPath) -> WorkList {
    if key.kind.is_device() {
        list.filter(|fc| {
            writable_device(fc) && !fc.has_matching_key && !same_path(&fc.path, &key.path)
        })
    } else {
        WorkList::new()
    }
}

/// Devices whose partition table can be printed.
#[must_use]
pub fn print_gpt_targets(list: &WorkList) -> WorkList {
    list.filter(|fc| fc.kind.is_device())
}

/// Devices whose partition table may be deleted.
#[must_use]
pub fn delete_gpt_targets(list: &WorkList) -> WorkList {
    list.filter(writable_device)
}

/// Builds a [`WorkList`] from operator-given roots.
#[derive(Debug)]
pub struct SelectionBuilder<'a> {
    config: &'a Configuration,
    key: Option<&'a KeyDescriptor>,
    pattern: Pattern,
}

impl<'a> SelectionBuilder<'a> {
    /// A builder with no key and no filter.
    #[must_use]
    pub const fn new(config: &'a Configuration) -> Self {
        Self {
            config,
            key: None,
            pattern: Pattern::Any,
        }
    }

    /// Judges targets against `key`, and keeps the key itself out of the list.
    #[must_use]
    pub const fn key(mut self, key: Option<&'a KeyDescriptor>) -> Self {
        self.key = key;
        self
    }

    /// Filters files found inside directories.
    #[must_use]
    pub fn pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Walks every root and classifies what it finds.
    ///
    /// Directories are walked recursively; the filter only applies to what is
    /// found inside them, never to a root itself. Unreadable directory entries
    /// are logged and skipped. Each path appears at most once.
    #[must_use]
    pub fn build(&self, roots: &[PathBuf]) -> WorkList {
        let mut list = WorkList::new();
        let mut seen = HashSet::new();
        for root in roots {
            let root_fc = FCPath::inspect(root, self.config.symlink);
            if root_fc.kind != PathKind::Directory {
                self.add(&mut list, &mut seen, root);
                continue;
            }
            for entry in WalkDir::new(root).follow_links(self.config.symlink) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Skipping unreadable entry: {e}");
                        continue;
                    }
                };
                if entry.file_type().is_dir() || self.pattern.matches(entry.path()) {
                    self.add(&mut list, &mut seen, entry.path());
                } else {
                    debug!("filtered out: {}", entry.path().display());
                }
            }
        }
        list
    }

    fn add(&self, list: &mut WorkList, seen: &mut HashSet<PathBuf>, path: &Path) {
        if let Some(key) = self.key {
            if same_path(path, &key.fcpath.path) {
                debug!("skipping the key itself: {}", path.display());
                return;
            }
        }
        if !seen.insert(path.to_path_buf()) {
            return;
        }
        list.push(FCPath::target(path, self.key, self.config));
    }
}

/// Formats a byte count with binary units, e.g. `1.5 MiB`.
#[must_use]
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn config() -> Configuration {
        Configuration {
            log_dir: None,
            ..Configuration::default()
        }
    }

    fn key_in(dir: &Path, size: usize, config: &Configuration) -> KeyDescriptor {
        let path = dir.join("key.bin");
        fs::write(&path, vec![0x5au8; size]).unwrap();
        KeyDescriptor::new(FCPath::key(&path, config), None)
    }

    #[test]
    fn small_files_need_no_key_size_flag() {
        let dir = tempdir().unwrap();
        let targets = dir.path().join("targets");
        fs::create_dir(&targets).unwrap();
        fs::write(targets.join("small.txt"), b"tiny").unwrap();
        fs::write(targets.join("big.txt"), vec![b'x'; 2048]).unwrap();

        let strict = config();
        let key = key_in(dir.path(), 8192, &strict);
        let list = SelectionBuilder::new(&strict).key(Some(&key)).build(&[targets.clone()]);
        assert_eq!(list.stats().encryptable, 1);
        assert!(list.filter(encryptable).iter().all(|fc| fc.path.ends_with("big.txt")));

        let relaxed = Configuration { min_key_size: 1, ..config() };
        let key = key_in(dir.path(), 8192, &relaxed);
        let list = SelectionBuilder::new(&relaxed).key(Some(&key)).build(&[targets]);
        assert_eq!(list.stats().encryptable, 2);
    }

    #[test]
    fn counters_match_predicates() {
        let dir = tempdir().unwrap();
        let config = Configuration { min_key_size: 1, ..config() };
        let key = key_in(dir.path(), 4096, &config);
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("a"), b"aaaa").unwrap();
        fs::write(sub.join("b"), b"").unwrap();
        let list = SelectionBuilder::new(&config)
            .key(Some(&key))
            .build(&[dir.path().to_path_buf()]);
        let stats = list.stats();
        assert_eq!(stats.encryptable, list.iter().filter(|f| encryptable(f)).count());
        assert_eq!(stats.decryptable, list.iter().filter(|f| decryptable(f)).count());
        assert_eq!(stats.files, 2);
        assert_eq!(stats.directories, 2);
        assert!(list.iter().all(|fc| !fc.path.ends_with("key.bin")));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_walked_only_when_allowed() {
        let dir = tempdir().unwrap();
        let outside = dir.path().join("outside");
        let root = dir.path().join("root");
        fs::create_dir(&outside).unwrap();
        fs::create_dir(&root).unwrap();
        fs::write(outside.join("far.txt"), b"far").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let list = SelectionBuilder::new(&config()).build(&[root.clone()]);
        assert!(list.iter().any(|fc| fc.path == root.join("link") && fc.kind == PathKind::Symlink));
        assert!(list.iter().all(|fc| !fc.path.ends_with("far.txt")));

        let following = Configuration { symlink: true, ..config() };
        let list = SelectionBuilder::new(&following).build(&[root.clone()]);
        let far = root.join("link").join("far.txt");
        assert!(list.iter().any(|fc| fc.path == far && fc.kind == PathKind::File));
        assert_eq!(list.stats().symlinks, 0);
    }

    #[test]
    fn glob_include_and_exclude() {
        let include = Pattern::glob("*.bit", false).unwrap();
        let exclude = Pattern::glob("*.bit", true).unwrap();
        assert!(include.matches(Path::new("/a/b/file.bit")));
        assert!(!include.matches(Path::new("/a/b/file.txt")));
        assert!(!exclude.matches(Path::new("file.bit")));
        assert!(exclude.matches(Path::new("file.txt")));
        assert!(Pattern::glob("[", false).is_err());
    }

    #[test]
    fn regex_filters_inside_directories_only() {
        let dir = tempdir().unwrap();
        let config = Configuration { min_key_size: 1, ..config() };
        fs::write(dir.path().join("keep.bit"), b"1").unwrap();
        fs::write(dir.path().join("drop.txt"), b"2").unwrap();
        let lone = dir.path().join("lone.txt");
        fs::write(&lone, b"3").unwrap();
        let builder = SelectionBuilder::new(&config).pattern(Pattern::regex(r"^.*\.bit$").unwrap());
        let files: Vec<_> = builder
            .build(&[dir.path().to_path_buf(), lone.clone()])
            .filter(|fc| fc.kind == PathKind::File)
            .iter()
            .map(|fc| fc.path.clone())
            .collect();
        assert_eq!(files, vec![dir.path().join("keep.bit"), lone]);
    }

    #[test]
    fn device_sublists_need_matching_key_kind() {
        let dir = tempdir().unwrap();
        let config = config();
        let key = key_in(dir.path(), 4096, &config);
        let list = WorkList::new();
        assert!(create_key_targets(&list, &key.fcpath).is_empty());
        assert!(clone_key_targets(&list, &key.fcpath).is_empty());
        assert!(print_gpt_targets(&list).is_empty());
    }

    #[test]
    fn human_sizes() {
        assert_eq!(human_size(12), "12 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(100 * 1024 * 1024), "100.0 MiB");
    }
}
