//! Morphic command-line entry point

use std::process::ExitCode;

fn main() -> ExitCode {
    morphic_cli::main()
}
