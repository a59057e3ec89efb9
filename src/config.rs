use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::resolve_user_path;

const CONFIG_SCHEMA_VERSION: u32 = 1;
const DEFAULT_POLL_MILLIS: u64 = 500;
const DEFAULT_RETRY_BACKOFF_MILLIS: u64 = 100;
const DEFAULT_MAX_RETRIES: u32 = 5;

pub const MONITOR_DIR: [&str; 2] = [".cache", "monitor"];
pub const STATE_FILE_NAME: &str = "claude_context_state.json";
pub const CONFIG_FILE_NAME: &str = "monitor_config.json";
pub const HOOK_LOG_FILE_NAME: &str = "hook_debug.log";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MonitorConfig {
    pub schema_version: u32,
    pub budget: ContextBudget,
    pub display: DisplayConfig,
    pub poll: PollConfig,
}

/// Context-window constants. The overhead split is a fixed estimate of the
/// cached system prompt and tool schemas, not a measurement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextBudget {
    pub max_tokens: u64,
    pub autocompact_buffer: u64,
    pub system_prompt_tokens: u64,
    pub system_tools_tokens: u64,
    pub low_space_percent: u8,
}

impl ContextBudget {
    pub fn system_overhead(&self) -> u64 {
        self.system_prompt_tokens
            .saturating_add(self.system_tools_tokens)
    }

    pub fn safe_max(&self) -> u64 {
        self.max_tokens.saturating_sub(self.autocompact_buffer)
    }
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_tokens: 200_000,
            autocompact_buffer: 45_000,
            system_prompt_tokens: 2_400,
            system_tools_tokens: 13_300,
            low_space_percent: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    pub bar_width: usize,
    pub max_files: usize,
    pub max_tools: usize,
    pub session_id_width: usize,
    pub color: ColorMode,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            bar_width: 50,
            max_files: 15,
            max_tools: 10,
            session_id_width: 36,
            color: ColorMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub retry_backoff_ms: u64,
    pub max_retries: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_MILLIS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MILLIS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub poll_interval: Duration,
    pub retry_backoff: Duration,
    pub max_retries: u32,
}

impl MonitorConfig {
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }

        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let mut parsed: MonitorConfig = serde_json::from_str(&raw)
                .with_context(|| format!("invalid JSON in {}", path.display()))?;
            if parsed.normalize_and_migrate() {
                parsed.save(path)?;
            }
            Ok(parsed)
        } else {
            let mut cfg = MonitorConfig::default();
            cfg.normalize_and_migrate();
            cfg.save(path)?;
            Ok(cfg)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }

        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            poll_interval: Duration::from_millis(env_u64(
                "CLAUDE_MONITOR_POLL_MS",
                self.poll.interval_ms,
            )),
            retry_backoff: Duration::from_millis(self.poll.retry_backoff_ms),
            max_retries: self.poll.max_retries,
        }
    }

    fn normalize_and_migrate(&mut self) -> bool {
        let mut changed = false;

        if self.schema_version < CONFIG_SCHEMA_VERSION {
            self.schema_version = CONFIG_SCHEMA_VERSION;
            changed = true;
        }

        let budget_defaults = ContextBudget::default();
        if self.budget.max_tokens == 0 || self.budget.autocompact_buffer >= self.budget.max_tokens
        {
            self.budget.max_tokens = budget_defaults.max_tokens;
            self.budget.autocompact_buffer = budget_defaults.autocompact_buffer;
            changed = true;
        }
        if self.budget.autocompact_buffer == 0 {
            self.budget.autocompact_buffer = budget_defaults.autocompact_buffer;
            changed = true;
        }
        for overhead in [
            &mut self.budget.system_prompt_tokens,
            &mut self.budget.system_tools_tokens,
        ] {
            if *overhead > self.budget.max_tokens {
                *overhead = self.budget.max_tokens;
                changed = true;
            }
        }
        if self.budget.low_space_percent > 100 {
            self.budget.low_space_percent = budget_defaults.low_space_percent;
            changed = true;
        }

        let display_defaults = DisplayConfig::default();
        for (value, default) in [
            (&mut self.display.bar_width, display_defaults.bar_width),
            (&mut self.display.max_files, display_defaults.max_files),
            (&mut self.display.max_tools, display_defaults.max_tools),
            (
                &mut self.display.session_id_width,
                display_defaults.session_id_width,
            ),
        ] {
            if *value == 0 {
                *value = default;
                changed = true;
            }
        }

        if self.poll.interval_ms == 0 {
            self.poll.interval_ms = DEFAULT_POLL_MILLIS;
            changed = true;
        }
        if self.poll.retry_backoff_ms == 0 {
            self.poll.retry_backoff_ms = DEFAULT_RETRY_BACKOFF_MILLIS;
            changed = true;
        }

        changed
    }
}

/// Nearest ancestor of `start` holding a `.claude` directory, else `start`.
pub fn find_project_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|candidate| candidate.join(".claude").exists())
        .unwrap_or(start)
        .to_path_buf()
}

pub fn project_root() -> PathBuf {
    if let Some(custom) = env_path("CLAUDE_MONITOR_ROOT") {
        return custom;
    }
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_project_root(&cwd)
}

pub fn monitor_dir(root: &Path) -> PathBuf {
    MONITOR_DIR
        .iter()
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

pub fn state_file_path(root: &Path) -> PathBuf {
    env_path("CLAUDE_MONITOR_STATE_FILE").unwrap_or_else(|| monitor_dir(root).join(STATE_FILE_NAME))
}

pub fn config_path(root: &Path) -> PathBuf {
    monitor_dir(root).join(CONFIG_FILE_NAME)
}

pub fn hook_log_path(root: &Path) -> PathBuf {
    monitor_dir(root).join(HOOK_LOG_FILE_NAME)
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(|value| resolve_user_path(&value))
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
