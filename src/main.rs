//! blockmark CLI entry point
//!
//! Parses arguments and dispatches through `cli::run`, which writes the
//! JSON envelope. Exits non-zero on failure.

use blockmark::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
