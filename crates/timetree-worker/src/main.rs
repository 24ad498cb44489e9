//! `tally-worker`: serves the tally simpack over stdin/stdout.
//!
//! Spawned by `ProcessCruncherType`; reads newline-delimited JSON
//! commands and writes state events until retired or its stdin closes.

use std::process::ExitCode;

use timetree_crunch::serve_stdio;
use timetree_test_utils::TallySimpack;

fn main() -> ExitCode {
    match serve_stdio(TallySimpack) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tally-worker: {e}");
            ExitCode::FAILURE
        }
    }
}
