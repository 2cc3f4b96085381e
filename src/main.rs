use clap::Parser;
use tidy::cli::{Cli, run_cli};
use tidy::output::OutputFormatter;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run_cli(&cli) {
        OutputFormatter::error(&format!("Error: {}", e));
        std::process::exit(e.exit_code());
    }
}
