// File:    help.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Usage, examples, version and license texts of the otpcrypt command line.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

pub(crate) const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = r#"Usage:  otpcrypt [-h] [-v] [--print] [--dry] [-l] [--no-key-size] [--disable-MAC]
                [-s <KiB>] [-p <pwd> | -pp] MODE -k <key> (-t <target> ... | -b <batchfile>)
                [-w <glob> | -W <glob> | -r <regex>]

Modes (the first one given wins):
            --encrypt            Encrypt targets with the key.
            --decrypt            Decrypt targets with the key.
            --create-keyfile     Create an OTP key file: -K <keyfile> [-S <bytes>].
            --create-keydev      Write key file -k onto raw device -t.
            --clone-keydev       Copy key device -k onto raw device -t.
            --key-chksum         Print the SHA-256 checksum of key -k.
            --print-gpt          Print the GUID partition table header of device -t.
            --delete-gpt         Zero the GUID partition tables of device -t.

Parameters:
            -k <key>             Key file or key device.
            -K <keyfile>         Key file to create.
            -t <target>          File, directory or device; may be repeated.
            -b <batchfile>       File listing one target per line.
            -S <bytes>           Size of the key file to create (default 100 MiB).
            -s <KiB>             Read and write buffer size (default 1024).
            -w <glob>            Only files whose name matches the wildcard.
            -W <glob>            Only files whose name does not match the wildcard.
            -r <regex>           Only files whose name matches the regular expression.
            -p <pwd>             Password mixed into the key.
            -pp                  Prompt for the password.

Options:
            -h, --help           Show this help.
            --examples           Show examples.
            --version            Show the version.
            --license            Show the license.
            -v, --verbose        Extra diagnostics.
            -l, --symlink        Follow symlinks; allow a symlinked key.
            --dry                Show what would happen without writing.
            --print              Log every transformed byte.
            --no-key-size        Accept keys and targets smaller than 1024 bytes.
            --disable-MAC        Encrypt without the authentication header (encrypt only).
"#;

const EXAMPLES: &str = r#"Examples:

    Create a 1 GiB key file:
        otpcrypt --create-keyfile -K mykey.bin -S 1073741824

    Encrypt a file:
        otpcrypt --encrypt -k mykey.bin -t myfile.txt

    Decrypt a file:
        otpcrypt --decrypt -k mykey.bin -t myfile.txt

    Encrypt every .doc file below a directory, asking for a password:
        otpcrypt --encrypt -pp -k mykey.bin -t mydir -w '*.doc'

    Encrypt everything except .bit files listed in a batch file:
        otpcrypt --encrypt -k mykey.bin -b targets.txt -W '*.bit'

    Show the checksum of a key:
        otpcrypt --key-chksum -k mykey.bin

    Write a key file onto a USB stick and clone it:
        otpcrypt --create-keydev -k mykey.bin -t /dev/sdb
        otpcrypt --clone-keydev -k /dev/sdb -t /dev/sdc

    Inspect or wipe the partition table of a device:
        otpcrypt --print-gpt -t /dev/sdb
        otpcrypt --delete-gpt -t /dev/sdb
"#;

const LICENSE: &str = "otpcrypt is licensed under the terms of the GNU Affero General Public License v3.
See the LICENSE.md file in the project root for full license information.";

pub(crate) const fn usage() -> &'static str {
    USAGE
}

pub(crate) const fn examples() -> &'static str {
    EXAMPLES
}

pub(crate) const fn license() -> &'static str {
    LICENSE
}
