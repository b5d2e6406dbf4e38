use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use multiauth::{config, logging, usage};

#[derive(Parser)]
#[command(
    name = "account-usage",
    version,
    about = "Show quota usage for every OpenCode multi-account entry",
    long_about = "\
Print the session and weekly quota usage recorded for each account in \
~/.local/share/opencode/auth.json.\n\
\n\
Set AUTH_FILE to read a different file."
)]
struct Cli {
    /// Log each step to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("\n  {} {:#}\n", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    usage::report(&config::report_auth_file()?)
}
