#![deny(unsafe_code)]

use std::{env, io, process::ExitCode};

fn main() -> ExitCode {
    let mut stderr = io::stderr().lock();
    cli::run_with(env::args_os(), &mut stderr)
}
