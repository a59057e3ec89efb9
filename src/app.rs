use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::debug;

use crate::cli::Cli;
use crate::config::{self, MonitorConfig};
use crate::hook;
use crate::monitor::{self, StateWatcher, ViewSettings};
use crate::render;
use crate::state::{StateError, read_state};
use crate::transcript::read_transcript;
use crate::usage::latest_usage;
use crate::util::resolve_user_path;

/// Paths resolved once at startup.
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: PathBuf,
    pub state_file: PathBuf,
}

impl Paths {
    pub fn resolve(cli: &Cli) -> Self {
        let root = config::project_root();
        let state_file = cli
            .state_file
            .as_ref()
            .map(|path| resolve_user_path(&path.to_string_lossy()))
            .unwrap_or_else(|| config::state_file_path(&root));
        Self { root, state_file }
    }
}

pub fn load_config(paths: &Paths) -> Result<MonitorConfig> {
    MonitorConfig::load_or_init(&config::config_path(&paths.root))
}

fn color_for(config: &MonitorConfig, cli_no_color: bool) -> bool {
    !cli_no_color && render::color_enabled(config.display.color)
}

pub fn run_watch(paths: &Paths, config: &MonitorConfig, no_color: bool) -> Result<()> {
    let stop = install_stop_signal()?;
    let runtime = config.runtime_settings();
    let settings = ViewSettings::from_config(
        config,
        Some(runtime.poll_interval),
        color_for(config, no_color),
    );
    let mut watcher = StateWatcher::new(paths.state_file.clone());
    let mut out = io::stdout();

    write!(out, "{}", render::render_waiting(watcher.state_path()))?;
    out.flush()?;

    let result = monitor::run_loop(&mut watcher, &settings, &runtime, &stop, &mut out);
    let _ = render::restore_cursor(&mut out);
    println!("\n\nMonitoring stopped.");
    result
}

pub fn print_once(paths: &Paths, config: &MonitorConfig, no_color: bool) -> Result<u8> {
    let settings = ViewSettings::from_config(config, None, color_for(config, no_color));
    match monitor::load_frame(&paths.state_file, &settings) {
        Ok(frame) => {
            print!("{frame}");
            Ok(0)
        }
        Err(StateError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            println!(
                "No state file at {} yet; is the hook installed?",
                paths.state_file.display()
            );
            Ok(1)
        }
        Err(err) => Err(err).context("failed to load session state"),
    }
}

/// Always succeeds from the host's point of view.
pub fn run_hook(state_file: &Path) -> u8 {
    let stdin = io::stdin();
    match hook::run(stdin.lock(), state_file) {
        Ok(state) => debug!(session = state.session_id(), "hook completed"),
        Err(err) => debug!(error = %err, "hook update skipped"),
    }
    0
}

pub fn doctor(paths: &Paths, config: &MonitorConfig) -> Result<u8> {
    let mut issues = 0u8;

    println!("claude-context-monitor doctor");
    println!("project_root: {}", paths.root.display());
    println!("state_file: {}", paths.state_file.display());
    println!("config: {}", config::config_path(&paths.root).display());
    println!(
        "budget: max {} | autocompact buffer {} | overhead ~{} (estimate)",
        config.budget.max_tokens,
        config.budget.autocompact_buffer,
        config.budget.system_overhead()
    );

    if paths.root.join(".claude").is_dir() {
        println!("[OK] .claude directory found.");
    } else {
        println!("[INFO] no .claude directory above the working directory; using it as root.");
    }

    let state = match read_state(&paths.state_file) {
        Ok(state) => {
            println!("[OK] state file readable (session {}).", state.session_id());
            Some(state)
        }
        Err(StateError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            issues += 1;
            println!("[WARN] state file missing; run the hook at least once.");
            None
        }
        Err(err) => {
            issues += 1;
            println!("[WARN] {err:#}");
            None
        }
    };

    if let Some(state) = state {
        match state.transcript_path() {
            None => println!("[INFO] state file does not name a transcript yet."),
            Some(path) if !path.exists() => {
                issues += 1;
                println!("[WARN] transcript {} does not exist.", path.display());
            }
            Some(path) => match read_transcript(Some(path)) {
                Ok(entries) => {
                    let usage = if latest_usage(&entries).is_some() {
                        "available"
                    } else {
                        "not reported yet"
                    };
                    println!(
                        "[OK] transcript readable ({} entries, usage {usage}).",
                        entries.len()
                    );
                }
                Err(err) => {
                    issues += 1;
                    println!("[WARN] {err:#}");
                }
            },
        }
    }

    if issues == 0 {
        println!("Doctor: healthy");
        Ok(0)
    } else {
        println!("Doctor: {issues} issue(s) found");
        Ok(1)
    }
}

fn install_stop_signal() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Relaxed);
    })
    .context("failed to install Ctrl+C handler")?;
    Ok(stop)
}
