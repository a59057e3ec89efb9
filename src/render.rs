use std::fmt::Write as _;
use std::io::{IsTerminal, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::execute;
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};

use crate::activity::{ActivitySummary, FileAccess, FileOperation};
use crate::config::{ColorMode, DisplayConfig};
use crate::state::SessionState;
use crate::usage::ContextAccounting;
use crate::util::{format_thousands, format_tokens, human_interval, percent_of, truncate_chars};

const RULE_WIDTH: usize = 80;
const BREAKDOWN_RULE_WIDTH: usize = 60;
const TITLE: &str = "CLAUDE CODE CONTEXT MONITOR";
const FILLED: &str = "█";
const EMPTY: &str = "░";

pub struct DashboardView<'a> {
    pub state: &'a SessionState,
    pub accounting: Option<&'a ContextAccounting>,
    pub activity: &'a ActivitySummary,
    pub display: &'a DisplayConfig,
    pub low_space_percent: u8,
    /// Live refresh interval; `None` for a one-shot snapshot.
    pub refresh: Option<Duration>,
    pub color: bool,
}

/// Fixed split of the bar into a safe and a danger segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarLayout {
    pub safe_width: usize,
    pub danger_width: usize,
    safe_tokens: u64,
    danger_tokens: u64,
}

impl BarLayout {
    pub fn new(safe_tokens: u64, danger_tokens: u64, width: usize) -> Self {
        let total = safe_tokens.saturating_add(danger_tokens);
        let safe_width = if total == 0 {
            width
        } else {
            let scaled = (safe_tokens as f64 / total as f64) * width as f64;
            (scaled.round() as usize).min(width)
        };
        Self {
            safe_width,
            danger_width: width - safe_width,
            safe_tokens,
            danger_tokens,
        }
    }

    pub fn width(&self) -> usize {
        self.safe_width + self.danger_width
    }

    /// Filled cells in the (safe, danger) segments for `used` tokens.
    pub fn fill(&self, used: u64) -> (usize, usize) {
        let total = self.safe_tokens.saturating_add(self.danger_tokens);
        if total == 0 {
            return (0, 0);
        }
        if used <= self.safe_tokens {
            let filled = (used as f64 / total as f64 * self.width() as f64) as usize;
            return (filled.min(self.safe_width), 0);
        }

        let danger_used = used - self.safe_tokens;
        let danger_filled = if self.danger_tokens == 0 {
            self.danger_width
        } else {
            (danger_used as f64 / self.danger_tokens as f64 * self.danger_width as f64) as usize
        };
        (self.safe_width, danger_filled.min(self.danger_width))
    }
}

pub fn color_enabled(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
        }
    }
}

pub fn progress_bar(layout: &BarLayout, used: u64, color: bool) -> String {
    let (safe_filled, danger_filled) = layout.fill(used);
    let safe = format!(
        "{}{}",
        FILLED.repeat(safe_filled),
        EMPTY.repeat(layout.safe_width - safe_filled)
    );
    let danger = format!(
        "{}{}",
        FILLED.repeat(danger_filled),
        EMPTY.repeat(layout.danger_width - danger_filled)
    );
    if color {
        format!("[{}{}]", safe.green(), danger.red())
    } else {
        format!("[{safe}{danger}]")
    }
}

pub fn render_dashboard(view: &DashboardView<'_>) -> String {
    let mut out = String::with_capacity(4096);
    let heavy = "=".repeat(RULE_WIDTH);

    push(&mut out, &heavy);
    push(&mut out, &format!("  {TITLE}"));
    push(&mut out, &heavy);
    push(&mut out, "");

    render_header(&mut out, view);

    if let Some(accounting) = view.accounting {
        render_context_section(&mut out, view, accounting);
    }

    render_statistics(&mut out, view);

    if let Some(accounting) = view.accounting {
        section(&mut out, "LAST REQUEST");
        push(
            &mut out,
            &kv_line("Input Tokens:", &format_tokens(accounting.last_request.input)),
        );
        push(
            &mut out,
            &kv_line("Cache Read:", &format_tokens(accounting.last_request.cache_read)),
        );
        push(
            &mut out,
            &kv_line("Output Tokens:", &format_tokens(accounting.last_request.output)),
        );
        push(&mut out, "");
    }

    render_files(&mut out, view);
    render_tools(&mut out, view);

    push(&mut out, &heavy);
    match view.refresh {
        Some(interval) => push(
            &mut out,
            &format!(
                "Press Ctrl+C to exit | Refreshes every {}",
                human_interval(interval)
            ),
        ),
        None => push(&mut out, &format!("Snapshot taken {}", view.state.timestamp())),
    }
    push(&mut out, &heavy);
    out
}

pub fn render_waiting(state_path: &Path) -> String {
    let mut out = String::new();
    push(&mut out, "Claude Code Context Monitor");
    push(
        &mut out,
        &format!("Monitoring state file: {}", state_path.display()),
    );
    push(&mut out, "Waiting for context updates...");
    push(&mut out, "");
    out
}

/// Clears the screen and writes one full frame.
pub fn draw(out: &mut impl Write, frame: &str) -> Result<()> {
    execute!(out, MoveTo(0, 0), Clear(ClearType::All), Hide)?;
    out.write_all(frame.as_bytes())?;
    out.flush()?;
    Ok(())
}

pub fn restore_cursor(out: &mut impl Write) -> Result<()> {
    execute!(out, Show)?;
    Ok(())
}

fn render_header(out: &mut String, view: &DashboardView<'_>) {
    let state = view.state;
    push(
        out,
        &kv_line(
            "Session ID:",
            truncate_chars(state.session_id(), view.display.session_id_width),
        ),
    );
    push(out, &kv_line("Working Directory:", state.cwd()));
    push(out, &kv_line("Permission Mode:", state.permission_mode()));
    push(out, &kv_line("Last Updated:", state.timestamp()));
    push(out, "");

    push(out, &kv_line("Last Event:", state.last_event_name()));
    if let Some(tool) = state.last_tool() {
        push(out, &kv_line("Last Tool:", tool));
    }
    push(out, "");
}

fn render_context_section(out: &mut String, view: &DashboardView<'_>, ctx: &ContextAccounting) {
    section(out, "CONTEXT WINDOW USAGE");

    let layout = BarLayout::new(ctx.safe_max, ctx.autocompact_buffer, view.display.bar_width);
    push(
        out,
        &format!(
            "{} {:.1}%",
            progress_bar(&layout, ctx.total_used, view.color),
            ctx.safe_percent()
        ),
    );
    push(out, "");

    if ctx.in_danger_zone {
        let text = format!(
            "WARNING: IN DANGER ZONE! ({} tokens over safe limit)",
            format_tokens(ctx.over_limit())
        );
        push(out, &warning(&text, WarningLevel::Danger, view.color));
        push(out, "");
    } else if ctx.is_low_on_space(view.low_space_percent) {
        let text = format!(
            "WARNING: Low safe space! Only {} tokens remaining ({:.1}%)",
            format_thousands(ctx.safe_remaining),
            ctx.safe_remaining_percent()
        );
        push(out, &warning(&text, WarningLevel::Low, view.color));
        push(out, "");
    }

    push(
        out,
        &format!(
            "Total Used:       {} / {} tokens",
            format_tokens(ctx.total_used),
            format_tokens(ctx.max_tokens)
        ),
    );
    push(out, "");

    let max = ctx.max_tokens as f64;
    for (label, tokens) in [
        ("System Prompt:", ctx.system_prompt),
        ("System Tools:", ctx.system_tools),
        ("Context:", ctx.message_tokens),
    ] {
        push(
            out,
            &format!(
                "  {label:<22}~{:>6} tokens ({:>4.1}%)",
                format_tokens(tokens),
                percent_of(tokens as f64, max)
            ),
        );
    }
    push(out, &format!("  {}", "─".repeat(BREAKDOWN_RULE_WIDTH)));

    if ctx.in_danger_zone {
        let line = format!(
            "Safe Space:            {:>6} tokens (EXCEEDED by {})",
            0,
            format_tokens(ctx.over_limit())
        );
        push(out, &format!("  {}", paint_red(&line, view.color)));
    } else {
        push(
            out,
            &format!(
                "  Safe Space:            {:>6} tokens ({:>4.1}% remaining)",
                format_thousands(ctx.safe_remaining),
                ctx.safe_remaining_percent()
            ),
        );
    }

    let marker = if view.color { "⚠" } else { "!!!" };
    let line = format!(
        "Danger Zone:           {:>6} tokens ({:>4.1}%) {marker}",
        format_tokens(ctx.autocompact_buffer),
        percent_of(ctx.autocompact_buffer as f64, max)
    );
    push(out, &format!("  {}", paint_red(&line, view.color)));
    push(out, "");
}

fn render_statistics(out: &mut String, view: &DashboardView<'_>) {
    let activity = view.activity;
    section(out, "SESSION STATISTICS");
    push(
        out,
        &kv_line("Total Messages:", &activity.message_count.to_string()),
    );
    push(out, &kv_line("Tools Used:", &activity.tools.len().to_string()));
    push(
        out,
        &kv_line("Files Accessed:", &activity.files.len().to_string()),
    );
    push(out, "");
}

fn render_files(out: &mut String, view: &DashboardView<'_>) {
    let files = &view.activity.files;
    if files.is_empty() {
        return;
    }

    section(
        out,
        &format!(
            "FILES ACCESSED ({}) | {} in context",
            files.len(),
            view.activity.in_context_count()
        ),
    );

    let limit = view.display.max_files;
    for (idx, access) in files.iter().take(limit).enumerate() {
        push(out, &file_line(idx + 1, access, view));
    }
    if files.len() > limit {
        push(out, &format!("    ... and {} more", files.len() - limit));
    }
    push(out, "");
}

fn file_line(number: usize, access: &FileAccess, view: &DashboardView<'_>) -> String {
    let path = display_path(&access.path, view.state.cwd_prefix());
    let note = if access.operation.is_in_context() {
        " (in context)"
    } else {
        ""
    };
    format!(
        "{number:>2}. {} {path}{note}",
        operation_marker(access.operation, view.color)
    )
}

fn render_tools(out: &mut String, view: &DashboardView<'_>) {
    if view.activity.tools.is_empty() {
        return;
    }

    section(out, "TOOL USAGE SUMMARY");
    for (name, count) in view.activity.tool_counts(view.display.max_tools) {
        push(out, &format!("  {name:<20} {count:>3}x"));
    }
    push(out, "");
}

/// Path relative to `cwd` when `cwd` is a textual prefix of it.
pub fn display_path<'a>(path: &'a str, cwd: Option<&str>) -> &'a str {
    match cwd.and_then(|cwd| path.strip_prefix(cwd)) {
        Some(rest) => rest.trim_start_matches(['/', '\\']),
        None => path,
    }
}

pub fn operation_marker(operation: FileOperation, color: bool) -> &'static str {
    match (operation, color) {
        (FileOperation::Read, true) => "📖",
        (FileOperation::Edit, true) => "✏️",
        (FileOperation::Write, true) => "➕",
        (FileOperation::NotebookEdit, true) => "📓",
        (FileOperation::Read, false) => "[R]",
        (FileOperation::Edit, false) => "[E]",
        (FileOperation::Write, false) => "[W]",
        (FileOperation::NotebookEdit, false) => "[N]",
    }
}

#[derive(Debug, Clone, Copy)]
enum WarningLevel {
    Danger,
    Low,
}

fn warning(text: &str, level: WarningLevel, color: bool) -> String {
    if !color {
        return format!("!!! {text}");
    }
    let line = format!("⚠ {text}");
    match level {
        WarningLevel::Danger => line.red().bold().to_string(),
        WarningLevel::Low => line.yellow().bold().to_string(),
    }
}

fn paint_red(text: &str, color: bool) -> String {
    if color {
        text.red().to_string()
    } else {
        text.to_string()
    }
}

fn section(out: &mut String, title: &str) {
    let rule = "-".repeat(RULE_WIDTH);
    push(out, &rule);
    push(out, title);
    push(out, &rule);
}

fn kv_line(label: &str, value: &str) -> String {
    format!("{label:<18}{value}")
}

fn push(out: &mut String, line: &str) {
    let _ = writeln!(out, "{line}");
}
