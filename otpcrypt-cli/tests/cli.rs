#![allow(missing_docs)]
use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::{TempDir, tempdir};

fn otpcrypt(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("otpcrypt").expect("Failed to find otpcrypt binary");
    cmd.env("OTPCRYPT_HOME", home).env_remove("RUST_LOG");
    cmd
}

fn workspace() -> (TempDir, TempDir) {
    (
        tempdir().expect("Failed to create temp dir"),
        tempdir().expect("Failed to create home dir"),
    )
}

#[test]
fn test_missing_key_is_reported() {
    let (dir, home) = workspace();
    let target = dir.path().join("target.txt");
    fs::write(&target, b"data").unwrap();

    otpcrypt(home.path())
        .arg("--encrypt")
        .arg("-k")
        .arg(dir.path().join("nokey"))
        .arg("-t")
        .arg(&target)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[key does not exist]"));
    assert_eq!(fs::read(&target).unwrap(), b"data");
}

#[test]
fn test_small_key_names_every_failed_check() {
    let (dir, home) = workspace();
    let key = dir.path().join("key.bin");
    let target = dir.path().join("target.txt");
    fs::write(&key, [1u8; 16]).unwrap();
    fs::write(&target, b"data").unwrap();

    otpcrypt(home.path())
        .arg("--encrypt")
        .arg("-k")
        .arg(&key)
        .arg("-t")
        .arg(&target)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[size < 1024] try: \"--no-key-size\" option"))
        .stdout(predicate::str::contains("[size < 48] try: \"--disable-MAC\""));
}

#[test]
fn test_create_empty_keyfile() {
    let (dir, home) = workspace();
    let key = dir.path().join("empty.key");

    otpcrypt(home.path())
        .arg("--create-keyfile")
        .arg("-K")
        .arg(&key)
        .arg("-S")
        .arg("0")
        .assert()
        .success();
    assert_eq!(fs::metadata(&key).unwrap().len(), 0);
}

#[test]
fn test_create_keyfile_refuses_existing_file() {
    let (dir, home) = workspace();
    let key = dir.path().join("taken.key");
    fs::write(&key, b"keep").unwrap();

    otpcrypt(home.path())
        .arg("--create-keyfile")
        .arg("-K")
        .arg(&key)
        .arg("-S")
        .arg("64")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("exists! Aborted!"));
    assert_eq!(fs::read(&key).unwrap(), b"keep");
}

#[test]
fn test_two_byte_key_restores_one_byte_target() {
    let (dir, home) = workspace();
    let key = dir.path().join("key.bin");
    let target = dir.path().join("one.bin");
    fs::write(&key, [0x01, 0x02]).unwrap();
    fs::write(&target, [0x05]).unwrap();

    for expected in [[0x04], [0x05]] {
        otpcrypt(home.path())
            .arg("--encrypt")
            .arg("--disable-MAC")
            .arg("-k")
            .arg(&key)
            .arg("-t")
            .arg(&target)
            .assert()
            .success();
        assert_eq!(fs::read(&target).unwrap(), expected);
    }
}

#[test]
fn test_encrypt_decrypt_roundtrip_with_password() {
    let (dir, home) = workspace();
    let key = dir.path().join("pad.key");
    let target = dir.path().join("letter.txt");
    let content = "This is a test file for one-time pad encryption.";
    fs::write(&target, content).unwrap();

    otpcrypt(home.path())
        .arg("--create-keyfile")
        .arg("-K")
        .arg(&key)
        .arg("-S")
        .arg("4096")
        .assert()
        .success();

    otpcrypt(home.path())
        .args(["--encrypt", "--no-key-size", "-p", "secret", "-k"])
        .arg(&key)
        .arg("-t")
        .arg(&target)
        .assert()
        .success();
    let encrypted = fs::read(&target).unwrap();
    assert!(encrypted.starts_with(b"OTPCRYPT"));
    assert_eq!(encrypted.len(), content.len() + 48);

    otpcrypt(home.path())
        .args(["--decrypt", "--no-key-size", "-p", "wrong", "-k"])
        .arg(&key)
        .arg("-t")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrong key / password?"));
    assert_eq!(fs::read(&target).unwrap(), encrypted);

    otpcrypt(home.path())
        .args(["--decrypt", "--no-key-size", "-p", "secret", "-k"])
        .arg(&key)
        .arg("-t")
        .arg(&target)
        .assert()
        .success();
    assert_eq!(fs::read_to_string(&target).unwrap(), content);
}

#[test]
fn test_first_mode_wins() {
    let (dir, home) = workspace();
    let key = dir.path().join("key.bin");
    let target = dir.path().join("plain.txt");
    fs::write(&key, vec![0x5a; 2048]).unwrap();
    fs::write(&target, b"plain text").unwrap();

    otpcrypt(home.path())
        .args(["--encrypt", "--decrypt", "--no-key-size", "-k"])
        .arg(&key)
        .arg("-t")
        .arg(&target)
        .assert()
        .success();
    assert!(fs::read(&target).unwrap().starts_with(b"OTPCRYPT"));
}

#[test]
fn test_target_below_minimum_is_left_alone() {
    let (dir, home) = workspace();
    let key = dir.path().join("key.bin");
    let target = dir.path().join("small.txt");
    fs::write(&key, vec![0x11; 2048]).unwrap();
    fs::write(&target, b"tiny").unwrap();

    otpcrypt(home.path())
        .arg("--encrypt")
        .arg("-k")
        .arg(&key)
        .arg("-t")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to do"));
    assert_eq!(fs::read(&target).unwrap(), b"tiny");
}

#[test]
fn test_decrypt_without_mac_is_a_usage_error() {
    let (dir, home) = workspace();
    let key = dir.path().join("key.bin");
    let target = dir.path().join("raw.bin");
    fs::write(&key, [0x0f; 8]).unwrap();
    fs::write(&target, [0xf0; 4]).unwrap();

    otpcrypt(home.path())
        .args(["--decrypt", "--disable-MAC", "-k"])
        .arg(&key)
        .arg("-t")
        .arg(&target)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("--disable-MAC cannot be used with --decrypt"));
    assert_eq!(fs::read(&target).unwrap(), [0xf0; 4]);
}

#[cfg(unix)]
#[test]
fn test_symlinked_target_encrypts_the_linked_file() {
    let (dir, home) = workspace();
    let key = dir.path().join("key.bin");
    let real = dir.path().join("real.txt");
    let link = dir.path().join("link.txt");
    fs::write(&key, vec![0x33; 4096]).unwrap();
    fs::write(&real, vec![b'r'; 1500]).unwrap();
    std::os::unix::fs::symlink(&real, &link).unwrap();

    otpcrypt(home.path())
        .args(["--encrypt", "-l", "-k"])
        .arg(&key)
        .arg("-t")
        .arg(&link)
        .assert()
        .success();
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert!(fs::read(&real).unwrap().starts_with(b"OTPCRYPT"));
}

#[cfg(unix)]
#[test]
fn test_hard_linked_target_is_encrypted_under_every_name() {
    let (dir, home) = workspace();
    let key = dir.path().join("key.bin");
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&key, vec![0x44; 4096]).unwrap();
    fs::write(&a, vec![b'a'; 1500]).unwrap();
    fs::hard_link(&a, &b).unwrap();

    otpcrypt(home.path())
        .arg("--encrypt")
        .arg("-k")
        .arg(&key)
        .arg("-t")
        .arg(&a)
        .assert()
        .success();
    assert!(fs::read(&b).unwrap().starts_with(b"OTPCRYPT"));
    assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
}

#[test]
fn test_key_checksum() {
    let (dir, home) = workspace();
    let key = dir.path().join("abc.key");
    fs::write(&key, b"abc").unwrap();

    otpcrypt(home.path())
        .arg("--key-chksum")
        .arg("-k")
        .arg(&key)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "ba 78 16 bf 8f 01 cf ea 41 41 40 de 5d ae 22 23 b0 03 61 a3 96 17 7a 9c b4 10 ff 61 f2 00 15 ad",
        ));
}

#[test]
fn test_directory_target_with_wildcard() {
    let (dir, home) = workspace();
    let key = dir.path().join("key.bin");
    let docs = dir.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(&key, vec![0x42; 2048]).unwrap();
    fs::write(docs.join("a.doc"), b"first document").unwrap();
    fs::write(docs.join("b.txt"), b"plain notes").unwrap();

    otpcrypt(home.path())
        .args(["--encrypt", "--no-key-size", "-w", "*.doc", "-k"])
        .arg(&key)
        .arg("-t")
        .arg(&docs)
        .assert()
        .success();
    assert!(fs::read(docs.join("a.doc")).unwrap().starts_with(b"OTPCRYPT"));
    assert_eq!(fs::read(docs.join("b.txt")).unwrap(), b"plain notes");
}

#[test]
fn test_missing_mode_offers_manual() {
    let (_dir, home) = workspace();
    otpcrypt(home.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Would you like to see the User Manual (n/Y)?"));
}

#[test]
fn test_help_and_version() {
    let (_dir, home) = workspace();
    otpcrypt(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--create-keyfile"));
    otpcrypt(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_log_and_error_files_are_written() {
    let (dir, home) = workspace();
    let target = dir.path().join("target.txt");
    fs::write(&target, b"data").unwrap();

    otpcrypt(home.path())
        .arg("--encrypt")
        .arg("-k")
        .arg(dir.path().join("nokey"))
        .arg("-t")
        .arg(&target)
        .assert()
        .code(1);
    let log = fs::read_to_string(home.path().join("otpcrypt.log")).unwrap();
    let err = fs::read_to_string(home.path().join("otpcrypt.err")).unwrap();
    assert!(log.contains("[key does not exist]"));
    assert!(err.contains("[key does not exist]"));
}
