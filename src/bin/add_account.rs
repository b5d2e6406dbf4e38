use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use multiauth::{accounts, logging};

#[derive(Parser)]
#[command(
    name = "add-account",
    version,
    about = "Add an Anthropic account to OpenCode's multi-account store",
    long_about = "\
Run the Anthropic OAuth login for one more account and save its tokens \
under the given name.\n\
\n\
Open the printed URL, log in, then paste the callback URL (or the code \
shown on the page) back here. Re-using a name replaces that account.\n\
\n\
Accounts are stored in ~/.local/share/opencode/auth.json.",
    after_help = "Example: add-account max-5x"
)]
struct Cli {
    /// Name to store the account under (e.g. max-5x)
    account_name: String,

    /// Log each step to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("\n  {} {}\n", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    accounts::add(&cli.account_name)
}
