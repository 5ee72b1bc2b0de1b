//! debloat-engine CLI entry point

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use debloat_engine::cli::{Cli, Command};
use debloat_engine::commands::{
    run_remediate, run_report, run_scan_command, run_tools, CommandContext,
};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn run() -> debloat_engine::Result<String> {
    let cli = Cli::parse();
    let ctx = CommandContext::new(cli.root.clone(), cli.verbose)?;

    match &cli.command {
        Command::Scan(args) => run_scan_command(args, &ctx),
        Command::Remediate(args) => run_remediate(args, &ctx),
        Command::Report(args) => run_report(args, &ctx),
        Command::Tools => run_tools(&ctx),
    }
}
