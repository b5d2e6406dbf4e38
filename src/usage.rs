use anyhow::Result;
use chrono::{Local, TimeZone};
use colored::Colorize;
use std::{fmt::Display, path::Path};

use crate::store::{self, AuthFile, MultiAccounts, UsageSnapshot, WindowStat};

/// One bar unit per two percentage points.
pub const BAR_WIDTH: usize = 50;

const FULL: &str = "█";
const HALF: &str = "▌";

const RESET_FORMAT: &str = "%b %-d, %-I:%M %p %Z";

// ── Formatting ────────────────────────────────────────────────────────────────

pub fn percent(utilization: f64) -> i64 {
    (utilization * 100.0).round() as i64
}

/// Fixed-width bar with half-unit resolution for odd percentages.
pub fn progress_bar(utilization: f64) -> String {
    let pct = percent(utilization).clamp(0, 100) as usize;
    let filled = pct / 2;
    let half = pct % 2 == 1;
    let empty = BAR_WIDTH - filled - usize::from(half);

    format!(
        "{}{}{}",
        FULL.repeat(filled),
        if half { HALF } else { "" },
        " ".repeat(empty)
    )
}

pub fn format_reset(reset: Option<i64>) -> String {
    format_reset_in(reset, &Local)
}

pub fn format_reset_in<Tz>(reset: Option<i64>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    reset
        .filter(|&secs| secs != 0)
        .and_then(|secs| tz.timestamp_opt(secs, 0).single())
        .map(|at| at.format(RESET_FORMAT).to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

impl UsageSnapshot {
    /// Report windows in display order.
    pub fn windows(&self) -> [(&'static str, Option<&WindowStat>); 3] {
        [
            ("Current session", self.session_5h.as_ref()),
            ("Current week (all models)", self.weekly_7d.as_ref()),
            ("Current week (Sonnet only)", self.weekly_7d_sonnet.as_ref()),
        ]
    }
}

/// Body lines for one account, without the account header.
pub fn render_usage<Tz>(usage: Option<&UsageSnapshot>, tz: &Tz) -> Vec<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let Some(usage) = usage else {
        return vec!["  No usage data yet (will populate on first API request)".to_string()];
    };

    let mut lines = Vec::new();
    for (i, (label, window)) in usage.windows().into_iter().enumerate() {
        let utilization = window.and_then(|w| w.utilization).unwrap_or(0.0);
        let reset = window.and_then(|w| w.reset);

        if i > 0 {
            lines.push(String::new());
        }
        lines.push(format!("  {label}"));
        lines.push(format!(
            "  {}  {}% used",
            progress_bar(utilization),
            percent(utilization)
        ));
        lines.push(format!("  Resets {}", format_reset_in(reset, tz)));
    }
    lines
}

// ── Report ────────────────────────────────────────────────────────────────────

/// The account list to render, `None` when the store has no `anthropic`
/// or `multiAccounts` subtree or the list is empty.
pub fn configured_accounts(store: &AuthFile) -> Option<&MultiAccounts> {
    store.multi_accounts().filter(|m| !m.accounts.is_empty())
}

/// Unlike enrollment, which salvages what it can, the report refuses a store
/// it cannot read or decode.
pub fn report(path: &Path) -> Result<()> {
    let store = store::load_strict(path)?;

    let Some(multi) = configured_accounts(&store) else {
        println!("{}", "No multi-account configuration found".dimmed());
        return Ok(());
    };

    for account in &multi.accounts {
        let usage = multi.usage_for(&account.name)?;
        tracing::debug!(account = %account.name, has_usage = usage.is_some(), "rendering");

        println!("\n{} {}", "Account:".bold(), account.name.cyan().bold());
        for line in render_usage(usage.as_ref(), &Local) {
            println!("{line}");
        }
    }

    Ok(())
}
