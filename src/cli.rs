use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "claude-context-monitor",
    version,
    about = "Live dashboard of Claude Code context usage, file access and tool activity"
)]
pub struct Cli {
    /// State file written by the hook (defaults to <project>/.cache/monitor/claude_context_state.json).
    #[arg(long, global = true, value_name = "PATH")]
    pub state_file: Option<PathBuf>,

    /// Plain markers and no ANSI colors.
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a single snapshot to stdout and exit.
    Once,
    /// Merge a hook event read from stdin into the state file.
    Hook {
        /// Append diagnostics to .cache/monitor/hook_debug.log.
        #[arg(long)]
        debug_log: bool,
    },
    /// Check paths and file readability.
    Doctor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_watch() {
        let cli = Cli::parse_from(["claude-context-monitor"]);
        assert!(cli.command.is_none());
        assert!(!cli.no_color);
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::parse_from([
            "claude-context-monitor",
            "hook",
            "--debug-log",
            "--state-file",
            "/tmp/state.json",
        ]);
        assert!(matches!(cli.command, Some(Commands::Hook { debug_log: true })));
        assert_eq!(cli.state_file, Some(PathBuf::from("/tmp/state.json")));
    }
}
