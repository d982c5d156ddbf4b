//! Token estimation and budget enforcement.
//!
//! Uses a character-based heuristic: ~4 characters per token on the
//! whitespace-collapsed text, plus a fixed per-message overhead for role and
//! formatting markers. The estimate is deliberately not a real tokenizer: it
//! only has to be deterministic and monotonic in text length so that
//! compression converges.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use weft_config::EngineConfig;
use weft_core::message::Turn;
use weft_core::provider::{CompletionProvider, CompletionRequest};

/// Tokens always kept free for the model's answer.
pub const RESERVED_FOR_RESPONSE: usize = 1000;
/// Turns kept verbatim when older ones are summarized.
pub const KEEP_RECENT: usize = 5;
/// Floor for the halved `KEEP_RECENT` on the second compression attempt.
pub const MIN_KEEP_RECENT: usize = 2;
/// Fraction of the usable budget at which compression is considered.
pub const SUMMARY_TRIGGER_RATIO: f32 = 0.7;
/// Context window assumed for models missing from the limit table.
pub const DEFAULT_MODEL_LIMIT: usize = 8192;
/// Role/formatting overhead charged per message.
pub const MESSAGE_OVERHEAD: usize = 10;

pub const SUMMARY_PREFIX: &str = "Previous conversation summary:\n";

const SUMMARY_INSTRUCTION: &str = "\
Summarize the following conversation in at most 200 words. Preserve the main \
topics discussed, every decision that was made, and any context needed to \
continue the conversation. Write plain prose without preamble.";

const FALLBACK_SUMMARY_TURNS: usize = 10;
const FALLBACK_CLIP_CHARS: usize = 100;

/// Known context-window sizes. Lookups try the exact name, then the longest
/// entry that prefixes the model name.
const MODEL_LIMITS: &[(&str, usize)] = &[
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4.1", 128_000),
    ("gpt-4-32k", 32_768),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo", 16_385),
    ("gpt-3.5-turbo-16k", 16_385),
    ("claude-3", 200_000),
    ("claude-sonnet-4", 200_000),
];

/// Estimate the token count for a string.
///
/// Heuristic: ceil(chars / 4) over the trimmed text with every whitespace
/// run collapsed to a single space.
pub fn estimate_tokens(text: &str) -> usize {
    let mut chars = 0usize;
    for (i, word) in text.split_whitespace().enumerate() {
        if i > 0 {
            chars += 1;
        }
        chars += word.chars().count();
    }
    chars.div_ceil(4)
}

/// Estimate tokens for a single turn including per-message overhead.
pub fn estimate_turn_tokens(turn: &Turn) -> usize {
    estimate_tokens(&turn.content) + MESSAGE_OVERHEAD
}

/// Estimate tokens for a slice of turns.
pub fn count_turns(turns: &[Turn]) -> usize {
    turns.iter().map(estimate_turn_tokens).sum()
}

/// Token usage of a message list against a model's window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenStats {
    pub current_tokens: usize,
    /// The model's full context window
    pub max_tokens: usize,
    /// `current_tokens` as a percentage of the usable budget
    /// (window minus the response reserve). Above 100 means over budget.
    pub usage_percentage: f32,
}

/// What `prepare` did to the turn list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Already within budget
    Unchanged,
    /// Too few turns to summarize; oldest turns dropped
    Truncated,
    /// Older turns replaced by a provider-written summary
    Summarized,
    /// Older turns replaced by the heuristic pseudo-summary
    FallbackSummary,
}

/// Output of [`TokenBudgetManager::prepare`].
#[derive(Debug, Clone)]
pub struct Prepared {
    pub turns: Vec<Turn>,
    pub compression: Compression,
}

/// Classifies message lists against model limits and compresses them.
pub struct TokenBudgetManager {
    summarizer: Arc<dyn CompletionProvider>,
    summary_model: Option<String>,
    reserved_for_response: usize,
    keep_recent: usize,
    summary_trigger_ratio: f32,
    summarization_timeout: Duration,
    model_limits: HashMap<String, usize>,
}

impl TokenBudgetManager {
    /// Create a manager with the default limits and a 5 s summarization timeout.
    pub fn new(summarizer: Arc<dyn CompletionProvider>) -> Self {
        Self {
            summarizer,
            summary_model: None,
            reserved_for_response: RESERVED_FOR_RESPONSE,
            keep_recent: KEEP_RECENT,
            summary_trigger_ratio: SUMMARY_TRIGGER_RATIO,
            summarization_timeout: Duration::from_secs(5),
            model_limits: HashMap::new(),
        }
    }

    pub fn from_config(summarizer: Arc<dyn CompletionProvider>, config: &EngineConfig) -> Self {
        Self {
            summarizer,
            summary_model: config.summary_model.clone(),
            reserved_for_response: config.budget.reserved_for_response,
            keep_recent: config.budget.keep_recent.max(MIN_KEEP_RECENT),
            summary_trigger_ratio: config.budget.summary_trigger_ratio,
            summarization_timeout: config.budget.summarization_timeout(),
            model_limits: config.budget.model_limits.clone(),
        }
    }

    /// Add or override the context window of a model.
    pub fn with_model_limit(mut self, model: impl Into<String>, limit: usize) -> Self {
        self.model_limits.insert(model.into(), limit);
        self
    }

    pub fn with_summarization_timeout(mut self, timeout: Duration) -> Self {
        self.summarization_timeout = timeout;
        self
    }

    /// Context window of `model`. Unknown models get [`DEFAULT_MODEL_LIMIT`].
    pub fn limit_for(&self, model: &str) -> usize {
        if let Some(limit) = self.model_limits.get(model) {
            return *limit;
        }
        if let Some((_, limit)) = MODEL_LIMITS.iter().find(|(name, _)| *name == model) {
            return *limit;
        }
        MODEL_LIMITS
            .iter()
            .filter(|(name, _)| model.starts_with(name))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, limit)| *limit)
            .unwrap_or(DEFAULT_MODEL_LIMIT)
    }

    /// Tokens a prompt may use for `model`.
    pub fn usable_budget(&self, model: &str) -> usize {
        self.limit_for(model)
            .saturating_sub(self.reserved_for_response)
    }

    pub fn stats(&self, turns: &[Turn], model: &str) -> TokenStats {
        let current_tokens = count_turns(turns);
        let usable = self.usable_budget(model).max(1);
        TokenStats {
            current_tokens,
            max_tokens: self.limit_for(model),
            usage_percentage: current_tokens as f32 / usable as f32 * 100.0,
        }
    }

    /// Whether usage has reached the summary trigger (70% of the usable
    /// budget by default). The caller decides whether to call `prepare`.
    pub fn should_compress(&self, turns: &[Turn], model: &str) -> bool {
        let threshold = self.usable_budget(model) as f32 * self.summary_trigger_ratio;
        count_turns(turns) as f32 >= threshold
    }

    /// Fit `turns` into the usable budget of `model`.
    ///
    /// Never fails. The result can still be over budget after the single
    /// retry with a halved recent window; it never costs more tokens than
    /// the input.
    pub async fn prepare(&self, turns: &[Turn], model: &str) -> Prepared {
        let budget = self.usable_budget(model);
        let tokens_before = count_turns(turns);
        if tokens_before <= budget {
            return Prepared {
                turns: turns.to_vec(),
                compression: Compression::Unchanged,
            };
        }

        let (system_prompt, rest) = match turns.split_first() {
            Some((first, rest)) if first.is_system() => (Some(first), rest),
            _ => (None, turns),
        };

        let conversational = rest.iter().filter(|t| !t.is_system()).count();
        if conversational <= self.keep_recent + 1 {
            debug!(
                tokens_before,
                budget, "Too few turns to summarize, truncating oldest"
            );
            return Prepared {
                turns: reassemble(system_prompt, None, tail(rest, self.keep_recent)),
                compression: Compression::Truncated,
            };
        }

        let (middle, _) = rest.split_at(rest.len() - self.keep_recent);
        let (summary, compression) = self.summarize(middle, model).await;

        let mut keep = self.keep_recent;
        let mut out = reassemble(system_prompt, Some(&summary), tail(rest, keep));

        if count_turns(&out) > budget {
            keep = (self.keep_recent / 2).max(MIN_KEEP_RECENT);
            debug!(keep, "Still over budget after summarizing, shrinking recent window");
            out = reassemble(system_prompt, Some(&summary), tail(rest, keep));
        }

        if count_turns(&out) > tokens_before {
            warn!("Summary outgrew the turns it replaced, dropping it");
            out = reassemble(system_prompt, None, tail(rest, keep));
        }

        debug!(
            tokens_before,
            tokens_after = count_turns(&out),
            budget,
            "Compressed conversation"
        );

        Prepared {
            turns: out,
            compression,
        }
    }

    /// Summarize `middle` with one completion call, falling back to the
    /// pseudo-summary on error, timeout, or an empty answer.
    async fn summarize(&self, middle: &[Turn], model: &str) -> (String, Compression) {
        let transcript = middle
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n");

        let mut request = CompletionRequest::new(vec![
            Turn::system(SUMMARY_INSTRUCTION),
            Turn::user(transcript),
        ]);
        request.model = Some(self.summary_model.as_deref().unwrap_or(model).to_string());
        request.temperature = Some(0.3);
        request.max_tokens = Some(400);

        let provider = self.summarizer.name().to_string();
        match tokio::time::timeout(self.summarization_timeout, self.summarizer.complete(request))
            .await
        {
            Ok(Ok(completion)) if !completion.content.trim().is_empty() => {
                (completion.content.trim().to_string(), Compression::Summarized)
            }
            Ok(Ok(_)) => {
                warn!(%provider, "Summarizer returned empty text, using fallback summary");
                (fallback_summary(middle), Compression::FallbackSummary)
            }
            Ok(Err(e)) => {
                warn!(%provider, error = %e, "Summarization failed, using fallback summary");
                (fallback_summary(middle), Compression::FallbackSummary)
            }
            Err(_) => {
                warn!(
                    %provider,
                    timeout_ms = self.summarization_timeout.as_millis() as u64,
                    "Summarization timed out, using fallback summary"
                );
                (fallback_summary(middle), Compression::FallbackSummary)
            }
        }
    }
}

/// Heuristic summary: the last ten turns, each clipped to 100 characters.
pub fn fallback_summary(middle: &[Turn]) -> String {
    tail(middle, FALLBACK_SUMMARY_TURNS)
        .iter()
        .map(|t| {
            let clipped: String = t.content.chars().take(FALLBACK_CLIP_CHARS).collect();
            format!("{}: {}", t.role, clipped)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn tail(turns: &[Turn], n: usize) -> &[Turn] {
    &turns[turns.len().saturating_sub(n)..]
}

fn reassemble(system_prompt: Option<&Turn>, summary: Option<&str>, recent: &[Turn]) -> Vec<Turn> {
    let mut out = Vec::with_capacity(recent.len() + 2);
    out.extend(system_prompt.cloned());
    if let Some(summary) = summary {
        out.push(Turn::system(format!("{SUMMARY_PREFIX}{summary}")));
    }
    out.extend_from_slice(recent);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingProvider, ScriptedSummarizer, SlowProvider};

    fn manager(summarizer: Arc<dyn CompletionProvider>) -> TokenBudgetManager {
        TokenBudgetManager::new(summarizer)
    }

    /// A turn costing exactly `tokens` (content tokens + overhead).
    fn sized_turn(tokens: usize) -> Turn {
        Turn::user("a".repeat((tokens - MESSAGE_OVERHEAD) * 4))
    }

    fn conversation(system: &str, turns: usize, tokens_each: usize) -> Vec<Turn> {
        let mut out = vec![Turn::system(system)];
        out.extend((0..turns).map(|_| sized_turn(tokens_each)));
        out
    }

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("   \n\t "), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn whitespace_runs_collapse() {
        // "a b c" = 5 chars either way
        assert_eq!(estimate_tokens("  a \n\n b\t\tc  "), estimate_tokens("a b c"));
    }

    #[test]
    fn estimate_is_monotonic_in_length() {
        let mut previous = 0;
        for len in 0..64 {
            let tokens = estimate_tokens(&"x".repeat(len));
            assert!(tokens >= previous);
            previous = tokens;
        }
    }

    #[test]
    fn turn_includes_overhead() {
        assert_eq!(estimate_turn_tokens(&Turn::user("test")), 11);
        let turns = vec![Turn::user("hello"), Turn::assistant("world")];
        assert_eq!(count_turns(&turns), 24);
    }

    #[test]
    fn limit_table_lookup() {
        let m = manager(Arc::new(ScriptedSummarizer::new("s")));
        assert_eq!(m.limit_for("gpt-4o"), 128_000);
        assert_eq!(m.limit_for("gpt-4"), 8_192);
        assert_eq!(m.limit_for("gpt-3.5-turbo"), 16_385);
        assert_eq!(m.limit_for("gpt-4o-2024-08-06"), 128_000);
        assert_eq!(m.limit_for("gpt-4-0613"), 8_192);
        assert_eq!(m.limit_for("mystery-model"), DEFAULT_MODEL_LIMIT);
    }

    #[test]
    fn configured_limits_override_table() {
        let m = manager(Arc::new(ScriptedSummarizer::new("s")))
            .with_model_limit("gpt-4", 32_000)
            .with_model_limit("local-llama", 4_096);
        assert_eq!(m.limit_for("gpt-4"), 32_000);
        assert_eq!(m.limit_for("local-llama"), 4_096);
        assert_eq!(m.usable_budget("local-llama"), 3_096);
    }

    #[test]
    fn should_compress_at_seventy_percent() {
        let m = manager(Arc::new(ScriptedSummarizer::new("s"))).with_model_limit("small", 2_000);
        // usable = 1000, trigger at 700
        let below = vec![sized_turn(690)];
        let at = vec![sized_turn(700)];
        assert!(!m.should_compress(&below, "small"));
        assert!(m.should_compress(&at, "small"));
    }

    #[test]
    fn stats_report_usage_of_usable_budget() {
        let m = manager(Arc::new(ScriptedSummarizer::new("s"))).with_model_limit("small", 2_000);
        let stats = m.stats(&[sized_turn(500)], "small");
        assert_eq!(stats.current_tokens, 500);
        assert_eq!(stats.max_tokens, 2_000);
        assert!((stats.usage_percentage - 50.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn prepare_within_budget_is_unchanged() {
        let summarizer = Arc::new(ScriptedSummarizer::new("unused"));
        let m = manager(summarizer.clone());
        let turns = conversation("You are helpful.", 20, 50);

        let prepared = m.prepare(&turns, "gpt-4").await;
        assert_eq!(prepared.compression, Compression::Unchanged);
        assert_eq!(prepared.turns, turns);
        assert_eq!(summarizer.calls(), 0);
    }

    #[tokio::test]
    async fn few_turns_truncate_without_summarizing() {
        let summarizer = Arc::new(ScriptedSummarizer::new("unused"));
        let m = manager(summarizer.clone()).with_model_limit("small", 2_000);
        // 6 turns of 300 = 1800 > 1000, but 6 <= KEEP_RECENT + 1
        let turns = conversation("sys", 6, 300);

        let prepared = m.prepare(&turns, "small").await;
        assert_eq!(prepared.compression, Compression::Truncated);
        assert_eq!(summarizer.calls(), 0);
        assert_eq!(prepared.turns.len(), 1 + KEEP_RECENT);
        assert_eq!(prepared.turns[0], Turn::system("sys"));
    }

    #[tokio::test]
    async fn long_conversation_is_summarized() {
        let summarizer = Arc::new(ScriptedSummarizer::new("They discussed Rust lifetimes."));
        let m = manager(summarizer.clone());
        let mut turns = conversation("You are helpful.", 500, 300);
        turns.push(Turn::user("What about async?"));

        let prepared = m.prepare(&turns, "gpt-4").await;
        assert_eq!(prepared.compression, Compression::Summarized);
        assert_eq!(summarizer.calls(), 1);

        let out = &prepared.turns;
        assert_eq!(out.len(), 2 + KEEP_RECENT);
        assert_eq!(out[0], Turn::system("You are helpful."));
        assert_eq!(
            out[1],
            Turn::system(format!("{SUMMARY_PREFIX}They discussed Rust lifetimes."))
        );
        assert_eq!(out.last().unwrap(), &Turn::user("What about async?"));
        assert!(count_turns(out) <= m.usable_budget("gpt-4"));
    }

    #[tokio::test]
    async fn summarization_request_carries_instruction_and_transcript() {
        let summarizer = Arc::new(ScriptedSummarizer::new("summary"));
        let m = manager(summarizer.clone());
        let mut turns = vec![Turn::system("sys")];
        turns.extend((0..40).map(|i| Turn::user(format!("question {i} {}", "x".repeat(1200)))));

        m.prepare(&turns, "gpt-4").await;
        let request = summarizer.last_request().unwrap();
        assert!(request.messages[0].content.contains("200 words"));
        assert!(request.messages[1].content.starts_with("user: question 0"));
        assert_eq!(request.model.as_deref(), Some("gpt-4"));
    }

    #[tokio::test]
    async fn provider_failure_uses_fallback_summary() {
        let m = manager(Arc::new(FailingProvider));
        let mut turns = vec![Turn::system("sys")];
        turns.extend((0..40).map(|i| Turn::user(format!("m{i} {}", "y".repeat(1200)))));

        let prepared = m.prepare(&turns, "gpt-4").await;
        assert_eq!(prepared.compression, Compression::FallbackSummary);

        let summary = &prepared.turns[1].content;
        assert!(summary.starts_with(SUMMARY_PREFIX));
        // last ten middle turns: m25..m34
        assert!(summary.contains("user: m25 "));
        assert!(summary.contains("user: m34 "));
        assert!(!summary.contains("user: m24 "));
        for line in summary.trim_start_matches(SUMMARY_PREFIX).lines() {
            assert!(line.chars().count() <= "user: ".len() + FALLBACK_CLIP_CHARS);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_into_fallback() {
        let m = manager(Arc::new(SlowProvider::new(Duration::from_secs(60))))
            .with_summarization_timeout(Duration::from_secs(5));
        let turns = conversation("sys", 40, 300);

        let prepared = m.prepare(&turns, "gpt-4").await;
        assert_eq!(prepared.compression, Compression::FallbackSummary);
    }

    #[tokio::test]
    async fn halves_recent_window_when_still_over_budget() {
        let m = manager(Arc::new(ScriptedSummarizer::new("short summary")))
            .with_model_limit("tiny", 2_000);
        // usable 1000; keeping 5 x 410 tokens cannot fit, keeping 2 can
        let turns = conversation("You are helpful.", 10, 410);

        let prepared = m.prepare(&turns, "tiny").await;
        assert_eq!(prepared.turns.len(), 2 + MIN_KEEP_RECENT);
        assert!(count_turns(&prepared.turns) <= m.usable_budget("tiny"));
    }

    #[tokio::test]
    async fn retry_ceiling_accepts_over_budget_but_never_grows() {
        let m = manager(Arc::new(ScriptedSummarizer::new("short summary")))
            .with_model_limit("tiny", 1_500);
        let turns = conversation("You are helpful.", 10, 410);

        let prepared = m.prepare(&turns, "tiny").await;
        let stats = m.stats(&prepared.turns, "tiny");
        assert!(stats.usage_percentage > 100.0);
        assert!(stats.current_tokens <= count_turns(&turns));
        assert_eq!(prepared.turns.len(), 2 + MIN_KEEP_RECENT);
    }

    #[tokio::test]
    async fn oversized_summary_is_dropped() {
        let huge = "z".repeat(40_000);
        let m = manager(Arc::new(ScriptedSummarizer::new(&huge))).with_model_limit("tiny", 2_000);
        let turns = conversation("sys", 8, 200);

        let prepared = m.prepare(&turns, "tiny").await;
        assert!(count_turns(&prepared.turns) <= count_turns(&turns));
        assert!(prepared.turns.iter().all(|t| !t.content.starts_with(SUMMARY_PREFIX)));
    }

    #[tokio::test]
    async fn budget_invariant_holds_across_sizes() {
        let m = manager(Arc::new(ScriptedSummarizer::new("short summary")))
            .with_model_limit("tiny", 2_000);
        for model in ["tiny", "gpt-4"] {
            let budget = m.usable_budget(model);
            for turns in 1..40 {
                for size in [15, 60, 250, 900] {
                    let input = conversation("You are helpful.", turns, size);
                    let before = count_turns(&input);
                    let prepared = m.prepare(&input, model).await;
                    let after = count_turns(&prepared.turns);
                    let case = format!("{model}: {turns} turns of {size}");

                    assert_eq!(prepared.turns[0], input[0], "{case}");
                    if before <= budget {
                        assert_eq!(prepared.compression, Compression::Unchanged, "{case}");
                        assert_eq!(prepared.turns, input, "{case}");
                        continue;
                    }

                    assert!(after <= before, "{case}: {after} > {before}");
                    if after > budget {
                        // only allowed once the recent window is at its floor
                        let recent = prepared.turns.iter().filter(|t| !t.is_system()).count();
                        assert!(
                            prepared.compression == Compression::Truncated
                                || recent <= MIN_KEEP_RECENT,
                            "{case}: {after} over {budget} with {recent} recent turns"
                        );
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn stored_system_notes_are_folded_into_the_summary() {
        let summarizer = Arc::new(ScriptedSummarizer::new("short summary"));
        let m = manager(summarizer.clone()).with_model_limit("tiny", 2_000);
        let mut turns = conversation("You are helpful.", 10, 150);
        turns.insert(2, Turn::system("Note: user is on the enterprise plan"));

        let prepared = m.prepare(&turns, "tiny").await;
        assert_eq!(prepared.compression, Compression::Summarized);
        assert_eq!(prepared.turns[0].content, "You are helpful.");
        assert!(prepared.turns[1].content.starts_with(SUMMARY_PREFIX));

        let request = summarizer.last_request().unwrap();
        assert!(
            request.messages[1]
                .content
                .contains("system: Note: user is on the enterprise plan")
        );
    }
}
