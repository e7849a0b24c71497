use std::process::ExitCode;

use clap::Parser;

fn main() -> miette::Result<ExitCode> {
    livejs_run::Cli::parse().run()
}
