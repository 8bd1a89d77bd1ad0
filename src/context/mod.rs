//! Context budgeter: assembles a token-bounded, importance-aware slice of
//! prior turns for the generation call.

use crate::config::ContextConfig;
use regex::Regex;
use std::sync::OnceLock;

/// One prior turn handed to (or withheld from) the generation collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEntry {
    pub speaker: String,
    pub text: String,
    pub timestamp_ms: i64,
    pub estimated_tokens: u32,
    /// Trigger keyword present, is a question, or exceeds the length
    /// threshold — kept preferentially when compressing.
    pub important: bool,
}

fn technical_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // URLs, code punctuation, bracket-heavy content.
        Regex::new(r#"https?://|```|[{}<>\[\]();]=?.*[{}<>\[\]();]|::|->"#)
            .expect("hardcoded pattern compiles")
    })
}

fn is_symbol_char(c: char) -> bool {
    matches!(u32::from(c),
        0x2190..=0x2BFF        // arrows, misc symbols, dingbats
        | 0x1F000..=0x1FAFF    // emoji blocks
        | 0xFE0F               // variation selector
    )
}

pub struct ContextBudgeter {
    config: ContextConfig,
    triggers: Vec<String>,
}

impl ContextBudgeter {
    pub fn new(config: ContextConfig, trigger_keywords: &[String]) -> Self {
        Self {
            config,
            triggers: trigger_keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// Estimate model tokens for `text`: characters times a per-script ratio,
    /// bumped for technical-looking content, plus a flat addend per
    /// emoji/symbol character.
    pub fn estimate_tokens(&self, text: &str) -> u32 {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }

        let non_latin = text
            .chars()
            .filter(|c| c.is_alphabetic() && !c.is_ascii())
            .count();
        // Non-Latin scripts cost more per character.
        let ratio = if non_latin * 3 >= chars {
            self.config.dense_tokens_per_char
        } else {
            self.config.tokens_per_char
        };

        let mut estimate = chars as f64 * ratio;
        if technical_pattern().is_match(text) {
            estimate *= self.config.technical_multiplier;
        }

        let symbols = text.chars().filter(|&c| is_symbol_char(c)).count() as u32;
        (estimate.ceil() as u32).max(1) + symbols * self.config.symbol_token_cost
    }

    /// Build a [`ContextEntry`] with token estimate and importance flag.
    pub fn entry(&self, speaker: &str, text: &str, timestamp_ms: i64) -> ContextEntry {
        let lower = text.to_lowercase();
        let important = self.triggers.iter().any(|k| !k.is_empty() && lower.contains(k.as_str()))
            || text.contains('?')
            || text.chars().count() >= self.config.important_length;
        ContextEntry {
            speaker: speaker.to_string(),
            text: text.to_string(),
            timestamp_ms,
            estimated_tokens: self.estimate_tokens(text),
            important,
        }
    }

    /// Select a chronological slice of `history` whose estimated tokens fit
    /// `budget_tokens`. Below budget the history passes through unchanged.
    /// Over budget: keep up to the cap of most recent important entries
    /// first, fill the remainder with the most recent regular entries, and
    /// re-sort chronologically.
    pub fn build(&self, history: &[ContextEntry], budget_tokens: u32) -> Vec<ContextEntry> {
        let total: u64 = history.iter().map(|e| u64::from(e.estimated_tokens)).sum();
        if total <= u64::from(budget_tokens) {
            return history.to_vec();
        }

        let mut budget = i64::from(budget_tokens);
        let mut kept: Vec<ContextEntry> = Vec::new();

        // Most recent important entries first, up to the configured cap. If
        // the important entries alone exceed the budget, only as many of the
        // most recent ones as fit survive.
        let mut important_kept = 0usize;
        for entry in history.iter().rev().filter(|e| e.important) {
            if important_kept >= self.config.max_important_entries {
                break;
            }
            let cost = i64::from(entry.estimated_tokens);
            if cost <= budget {
                budget -= cost;
                important_kept += 1;
                kept.push(entry.clone());
            }
        }

        // Fill what is left with the most recent regular entries.
        for entry in history.iter().rev().filter(|e| !e.important) {
            let cost = i64::from(entry.estimated_tokens);
            if cost <= budget {
                budget -= cost;
                kept.push(entry.clone());
            }
        }

        kept.sort_by_key(|e| e.timestamp_ms);
        kept
    }
}
