// File:    prompt.rs
// Author:  apezoo
// Date:    2026-10-18
//
// Description: Interactive operator input: the usage prompt after a usage error and the password prompt.
//
// License:
// This project is licensed under the terms of the GNU AGPLv3 license.
// See the LICENSE.md file in the project root for full license information.

use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::debug;
use zeroize::Zeroizing;

use crate::help;

/// How long the usage prompt waits for an answer.
pub(crate) const USAGE_PROMPT_TIMEOUT: Duration = Duration::from_secs(3);

/// Offers the usage text and shows it on `y` or an empty answer.
///
/// The answer is read on its own thread; without an answer within `timeout`
/// the prompt gives up. The reader thread is left behind, blocked on stdin.
pub(crate) fn offer_usage(timeout: Duration) {
    print!("Would you like to see the User Manual (n/Y)? ");
    if let Err(e) = io::stdout().flush() {
        debug!("could not flush prompt: {e}");
    }

    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new().name("usage-prompt".to_owned()).spawn(move || {
        let mut line = String::new();
        let answer = match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_owned()),
        };
        // The receiver is gone once the prompt has timed out.
        tx.send(answer).ok();
    });
    if let Err(e) = spawned {
        debug!("could not start usage prompt: {e}");
        println!();
        return;
    }

    match rx.recv_timeout(timeout) {
        Ok(Some(answer)) if wants_usage(&answer) => println!("\n{}", help::usage()),
        Ok(_) => {}
        Err(_) => println!(),
    }
}

fn wants_usage(answer: &str) -> bool {
    answer.is_empty() || answer.eq_ignore_ascii_case("y")
}

/// Reads a password from the terminal without echoing it.
///
/// # Errors
///
/// Returns an error if the terminal cannot be read.
pub(crate) fn read_password() -> io::Result<Zeroizing<String>> {
    rpassword::prompt_password("Password: ").map(Zeroizing::new)
}
