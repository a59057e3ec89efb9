use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use anyhow::Result;
use tracing::{debug, warn};

use crate::activity::{ActivitySummary, extract_activity};
use crate::config::{ContextBudget, DisplayConfig, MonitorConfig, RuntimeSettings};
use crate::render::{self, DashboardView};
use crate::state::{SessionState, StateError, read_state, state_modified};
use crate::transcript::read_transcript;
use crate::usage::{ContextAccounting, estimate_context};
use crate::util::now_local;

const STOP_CHECK_SLICE: Duration = Duration::from_millis(50);

/// Everything the renderer needs besides the data itself.
#[derive(Debug, Clone)]
pub struct ViewSettings {
    pub budget: ContextBudget,
    pub display: DisplayConfig,
    pub refresh: Option<Duration>,
    pub color: bool,
}

impl ViewSettings {
    pub fn from_config(config: &MonitorConfig, refresh: Option<Duration>, color: bool) -> Self {
        Self {
            budget: config.budget,
            display: config.display.clone(),
            refresh,
            color,
        }
    }
}

/// One fully derived view of the session, rebuilt from disk on every change.
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub state: SessionState,
    pub accounting: Option<ContextAccounting>,
    pub activity: ActivitySummary,
}

impl DashboardSnapshot {
    pub fn build(state: SessionState, budget: &ContextBudget) -> Self {
        let entries = match read_transcript(state.transcript_path()) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "transcript unreadable; showing empty activity");
                Vec::new()
            }
        };

        Self {
            accounting: estimate_context(&entries, budget),
            activity: extract_activity(&entries),
            state,
        }
    }

    pub fn render(&self, settings: &ViewSettings) -> String {
        render::render_dashboard(&DashboardView {
            state: &self.state,
            accounting: self.accounting.as_ref(),
            activity: &self.activity,
            display: &settings.display,
            low_space_percent: settings.budget.low_space_percent,
            refresh: settings.refresh,
            color: settings.color,
        })
    }
}

/// Reads the state file, stamps it, and renders one frame.
pub fn load_frame(state_path: &Path, settings: &ViewSettings) -> Result<String, StateError> {
    let mut state = read_state(state_path)?;
    state.timestamp = Some(now_local());
    Ok(DashboardSnapshot::build(state, &settings.budget).render(settings))
}

#[derive(Debug)]
pub enum TickOutcome {
    Unchanged,
    Rendered(String),
    /// The state file changed but could not be decoded; retry soon.
    Retry(StateError),
}

#[derive(Debug)]
pub struct StateWatcher {
    state_path: PathBuf,
    last_modified: Option<SystemTime>,
    failed_attempts: u32,
}

impl StateWatcher {
    pub fn new(state_path: PathBuf) -> Self {
        Self {
            state_path,
            last_modified: None,
            failed_attempts: 0,
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn tick(&mut self, settings: &ViewSettings) -> TickOutcome {
        self.tick_with(settings, now_local)
    }

    /// One poll step. `stamp` supplies the "last updated" text.
    pub fn tick_with(
        &mut self,
        settings: &ViewSettings,
        stamp: impl FnOnce() -> String,
    ) -> TickOutcome {
        let Some(modified) = state_modified(&self.state_path) else {
            return TickOutcome::Unchanged;
        };
        if self.last_modified == Some(modified) {
            return TickOutcome::Unchanged;
        }

        match read_state(&self.state_path) {
            Ok(mut state) => {
                state.timestamp = Some(stamp());
                let frame = DashboardSnapshot::build(state, &settings.budget).render(settings);
                self.last_modified = Some(modified);
                self.failed_attempts = 0;
                TickOutcome::Rendered(frame)
            }
            Err(err) => {
                self.failed_attempts = self.failed_attempts.saturating_add(1);
                TickOutcome::Retry(err)
            }
        }
    }
}

/// Polls until `stop` is raised. Frames are drawn strictly one after another.
pub fn run_loop(
    watcher: &mut StateWatcher,
    settings: &ViewSettings,
    runtime: &RuntimeSettings,
    stop: &AtomicBool,
    out: &mut impl Write,
) -> Result<()> {
    while !stop.load(Ordering::Relaxed) {
        match watcher.tick(settings) {
            TickOutcome::Rendered(frame) => render::draw(out, &frame)?,
            TickOutcome::Unchanged => {}
            TickOutcome::Retry(err) => {
                let attempts = watcher.failed_attempts();
                debug!(error = %err, attempt = attempts, "state file not readable yet");
                let first_slow_retry = if err.is_transient() {
                    runtime.max_retries.saturating_add(1)
                } else {
                    1
                };
                if attempts == first_slow_retry {
                    warn!(
                        path = %watcher.state_path().display(),
                        error = %err,
                        "state file keeps failing to load; retrying at poll interval"
                    );
                }
                sleep_unless_stopped(retry_delay(&err, attempts, runtime), stop);
                continue;
            }
        }
        sleep_unless_stopped(runtime.poll_interval, stop);
    }
    Ok(())
}

/// Torn writes get the short backoff for the first `max_retries` attempts;
/// anything else waits a full poll interval.
pub fn retry_delay(err: &StateError, attempts: u32, runtime: &RuntimeSettings) -> Duration {
    if err.is_transient() && attempts <= runtime.max_retries {
        runtime.retry_backoff
    } else {
        runtime.poll_interval
    }
}

fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(STOP_CHECK_SLICE.min(deadline - now));
    }
}
