//! # media-archiver CLI
//!
//! Command-line interface for the media archiver.
//!
//! ## Usage
//! ```bash
//! media-archiver organize /Volumes/CARD ~/Archive
//! media-archiver organize /Volumes/CARD ~/Archive --duplicates skip --output json
//! media-archiver inventory ~/Archive/.media-inventory.jsonl
//! ```

mod cli;

use std::process::ExitCode;

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            cli::print_fatal(&e);
            ExitCode::FAILURE
        }
    }
}
