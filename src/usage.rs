//! Context-window accounting derived from the latest assistant usage record.
//!
//! Everything here is an estimate. Only `total_used` comes straight from the
//! transcript; the system prompt / tool split is a fixed heuristic from
//! [`ContextBudget`] and will drift when the real prompt size changes, so it is
//! not expected to reconcile with the total.

use serde_json::Value;

use crate::config::ContextBudget;
use crate::transcript::{EntryKind, TranscriptEntry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageRecord {
    pub input_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageRecord {
    pub fn from_value(value: &Value) -> Self {
        Self {
            input_tokens: uint_at(value, "input_tokens").unwrap_or(0),
            cache_read_input_tokens: uint_at(value, "cache_read_input_tokens").unwrap_or(0),
            output_tokens: uint_at(value, "output_tokens").unwrap_or(0),
        }
    }

    pub fn total_input(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.cache_read_input_tokens)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastRequest {
    pub input: u64,
    pub cache_read: u64,
    pub output: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextAccounting {
    pub total_used: u64,
    pub max_tokens: u64,
    pub safe_max: u64,
    pub safe_remaining: i64,
    pub autocompact_buffer: u64,
    pub in_danger_zone: bool,
    /// Approximate: `total_used` minus the assumed system overhead.
    pub message_tokens: u64,
    /// Approximate, from configuration.
    pub system_prompt: u64,
    /// Approximate, from configuration.
    pub system_tools: u64,
    pub last_request: LastRequest,
}

impl ContextAccounting {
    pub fn from_usage(usage: &UsageRecord, budget: &ContextBudget) -> Self {
        let total_input = usage.total_input();
        let overhead = budget.system_overhead();
        let message_tokens = if total_input > overhead {
            total_input - overhead
        } else {
            total_input
        };
        let safe_max = budget.safe_max();

        Self {
            total_used: total_input,
            max_tokens: budget.max_tokens,
            safe_max,
            safe_remaining: signed(safe_max) - signed(total_input),
            autocompact_buffer: budget.autocompact_buffer,
            in_danger_zone: total_input > safe_max,
            message_tokens,
            system_prompt: budget.system_prompt_tokens,
            system_tools: budget.system_tools_tokens,
            last_request: LastRequest {
                input: usage.input_tokens,
                cache_read: usage.cache_read_input_tokens,
                output: usage.output_tokens,
            },
        }
    }

    /// Tokens beyond the safe budget; zero while safe.
    pub fn over_limit(&self) -> u64 {
        self.total_used.saturating_sub(self.safe_max)
    }

    /// Share of the safe budget consumed, pinned at 100 once in danger.
    pub fn safe_percent(&self) -> f64 {
        if self.in_danger_zone || self.safe_max == 0 {
            return 100.0;
        }
        self.total_used as f64 / self.safe_max as f64 * 100.0
    }

    pub fn safe_remaining_percent(&self) -> f64 {
        if self.safe_max == 0 {
            return 0.0;
        }
        self.safe_remaining as f64 / self.safe_max as f64 * 100.0
    }

    pub fn is_low_on_space(&self, threshold_percent: u8) -> bool {
        !self.in_danger_zone
            && self.safe_remaining as f64
                <= self.safe_max as f64 * f64::from(threshold_percent) / 100.0
    }
}

/// Usage of the most recent assistant entry that carries one.
pub fn latest_usage(entries: &[TranscriptEntry]) -> Option<&UsageRecord> {
    entries
        .iter()
        .rev()
        .filter(|entry| entry.kind == EntryKind::Assistant)
        .find_map(|entry| entry.usage.as_ref())
}

/// `None` when no assistant turn has reported usage yet.
pub fn estimate_context(
    entries: &[TranscriptEntry],
    budget: &ContextBudget,
) -> Option<ContextAccounting> {
    latest_usage(entries).map(|usage| ContextAccounting::from_usage(usage, budget))
}

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn uint_at(value: &Value, key: &str) -> Option<u64> {
    let cursor = value.get(key)?;
    cursor
        .as_u64()
        .or_else(|| cursor.as_i64().and_then(|n| (n >= 0).then_some(n as u64)))
        .or_else(|| {
            cursor
                .as_f64()
                .filter(|n| n.is_finite() && *n >= 0.0)
                .map(|n| n as u64)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(input: u64, cache_read: u64, output: u64) -> TranscriptEntry {
        TranscriptEntry {
            kind: EntryKind::Assistant,
            usage: Some(UsageRecord {
                input_tokens: input,
                cache_read_input_tokens: cache_read,
                output_tokens: output,
            }),
            tool_uses: Vec::new(),
        }
    }

    fn bare(kind: EntryKind) -> TranscriptEntry {
        TranscriptEntry {
            kind,
            usage: None,
            tool_uses: Vec::new(),
        }
    }

    #[test]
    fn uses_most_recent_assistant_usage() {
        let entries = vec![
            assistant(1_000, 0, 50),
            bare(EntryKind::User),
            assistant(5_000, 10_000, 200),
            bare(EntryKind::User),
        ];

        let accounting =
            estimate_context(&entries, &ContextBudget::default()).expect("accounting");
        assert_eq!(accounting.total_used, 15_000);
        assert_eq!(accounting.safe_max, 155_000);
        assert_eq!(accounting.safe_remaining, 140_000);
        assert!(!accounting.in_danger_zone);
        assert_eq!(
            accounting.last_request,
            LastRequest {
                input: 5_000,
                cache_read: 10_000,
                output: 200
            }
        );
    }

    #[test]
    fn later_smaller_usage_wins_over_earlier_larger() {
        let entries = vec![assistant(150_000, 20_000, 10), assistant(100, 0, 1)];
        let accounting =
            estimate_context(&entries, &ContextBudget::default()).expect("accounting");
        assert_eq!(accounting.total_used, 100);
    }

    #[test]
    fn assistant_without_usage_is_skipped() {
        let entries = vec![assistant(2_000, 0, 5), bare(EntryKind::Assistant)];
        assert_eq!(
            latest_usage(&entries).map(UsageRecord::total_input),
            Some(2_000)
        );
    }

    #[test]
    fn usage_on_non_assistant_entry_is_ignored() {
        let mut user = assistant(9_999, 0, 0);
        user.kind = EntryKind::User;
        assert!(latest_usage(&[user]).is_none());
    }

    #[test]
    fn no_usage_means_no_accounting() {
        let entries = vec![bare(EntryKind::User), bare(EntryKind::Assistant)];
        assert!(estimate_context(&entries, &ContextBudget::default()).is_none());
        assert!(estimate_context(&[], &ContextBudget::default()).is_none());
    }

    #[test]
    fn message_tokens_never_go_negative() {
        let budget = ContextBudget::default();
        let small = ContextAccounting::from_usage(
            &UsageRecord {
                input_tokens: 3_000,
                ..UsageRecord::default()
            },
            &budget,
        );
        assert_eq!(small.message_tokens, 3_000);

        let large = ContextAccounting::from_usage(
            &UsageRecord {
                input_tokens: 700,
                cache_read_input_tokens: 20_000,
                output_tokens: 0,
            },
            &budget,
        );
        assert_eq!(large.message_tokens, 5_000);
    }

    #[test]
    fn danger_zone_iff_over_safe_max() {
        let budget = ContextBudget::default();
        for used in [0u64, 154_999, 155_000, 155_001, 160_000, 250_000] {
            let accounting = ContextAccounting::from_usage(
                &UsageRecord {
                    input_tokens: used,
                    ..UsageRecord::default()
                },
                &budget,
            );
            assert_eq!(accounting.in_danger_zone, used > 155_000, "used={used}");
            assert_eq!(
                accounting.safe_remaining < 0,
                accounting.in_danger_zone,
                "used={used}"
            );
        }
    }

    #[test]
    fn danger_fill_for_160k() {
        let accounting = ContextAccounting::from_usage(
            &UsageRecord {
                input_tokens: 160_000,
                ..UsageRecord::default()
            },
            &ContextBudget::default(),
        );
        assert!(accounting.in_danger_zone);
        assert_eq!(accounting.over_limit(), 5_000);
        assert_eq!(accounting.safe_percent(), 100.0);
    }

    #[test]
    fn low_space_threshold() {
        let budget = ContextBudget::default();
        let at = |used: u64| {
            ContextAccounting::from_usage(
                &UsageRecord {
                    input_tokens: used,
                    ..UsageRecord::default()
                },
                &budget,
            )
        };
        // 15% of 155,000 is 23,250 remaining.
        assert!(!at(131_749).is_low_on_space(15));
        assert!(at(131_750).is_low_on_space(15));
        assert!(!at(170_000).is_low_on_space(15));
    }

    #[test]
    fn usage_counters_tolerate_missing_and_odd_numbers() {
        let record = UsageRecord::from_value(&serde_json::json!({
            "input_tokens": 10,
            "output_tokens": 3.0,
            "cache_read_input_tokens": -4
        }));
        assert_eq!(record.input_tokens, 10);
        assert_eq!(record.output_tokens, 3);
        assert_eq!(record.cache_read_input_tokens, 0);
    }
}
