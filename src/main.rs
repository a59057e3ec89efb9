use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use claude_context_monitor::app::{self, Paths};
use claude_context_monitor::cli::{Cli, Commands};
use claude_context_monitor::config;
use claude_context_monitor::util::{setup_file_tracing, setup_tracing};

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("claude-context-monitor error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<u8> {
    let cli = Cli::parse();
    let paths = Paths::resolve(&cli);

    match cli.command {
        Some(Commands::Hook { debug_log }) => {
            if debug_log {
                setup_file_tracing(&config::hook_log_path(&paths.root));
            }
            Ok(app::run_hook(&paths.state_file))
        }
        Some(Commands::Once) => {
            setup_tracing();
            let config = app::load_config(&paths)?;
            app::print_once(&paths, &config, cli.no_color)
        }
        Some(Commands::Doctor) => {
            setup_tracing();
            let config = app::load_config(&paths)?;
            app::doctor(&paths, &config)
        }
        None => {
            setup_tracing();
            let config = app::load_config(&paths)?;
            app::run_watch(&paths, &config, cli.no_color)?;
            Ok(0)
        }
    }
}
