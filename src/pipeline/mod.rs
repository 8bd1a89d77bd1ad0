//! Message pipeline: verdict → context → cache → generation → outcome.
//!
//! The engine owns every stateful gate plus the per-conversation history
//! ring. One instance is shared across all channel handlers; every method
//! takes the event timestamp instead of reading the clock, so the whole
//! pipeline is deterministic under test.

use crate::cache::ResponseCache;
use crate::channels::MessageEvent;
use crate::config::Config;
use crate::context::{ContextBudgeter, ContextEntry};
use crate::decision::{DecisionEngine, RandomSource, Verdict};
use crate::engagement::EngagementScorer;
use crate::gating::{ActivityTracker, RateLimiter, SpamDetector};
use crate::providers::{GenerateRequest, Generator};
use crate::store::StateStore;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;

/// Conversations with no traffic for this long get dropped by the state
/// sweep along with their history.
const HISTORY_IDLE_MS: i64 = 6 * 3_600_000;

/// What the pipeline decided to emit for one message or tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Reply { text: String, cached: bool },
    /// Scripted cool-down line during spam suppression.
    Deescalate { text: String },
    /// Scripted line after a generation failure, probability-gated.
    Apology { text: String },
    Silent { verdict: Verdict },
}

impl Outcome {
    /// The text to actually send, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Outcome::Reply { text, .. }
            | Outcome::Deescalate { text }
            | Outcome::Apology { text } => Some(text),
            Outcome::Silent { .. } => None,
        }
    }
}

pub struct Engine {
    decision: DecisionEngine,
    limiter: Arc<RateLimiter>,
    spam: Arc<SpamDetector>,
    activity: Arc<ActivityTracker>,
    budgeter: ContextBudgeter,
    cache: Option<Arc<ResponseCache>>,
    generator: Arc<dyn Generator>,
    rng: Arc<dyn RandomSource>,
    history: StateStore<VecDeque<ContextEntry>>,
    persona_name: String,
    deescalation_replies: Vec<String>,
    apology_replies: Vec<String>,
    apology_chance: f64,
    error_suppression_threshold: usize,
    history_turns: usize,
    token_budget: u32,
    max_output_chars: usize,
}

impl Engine {
    pub fn new(
        config: &Config,
        generator: Arc<dyn Generator>,
        cache: Option<Arc<ResponseCache>>,
        rng: Arc<dyn RandomSource>,
    ) -> Self {
        let capacity = config.reliability.state_capacity;
        let limiter = Arc::new(RateLimiter::new(
            config.gating.rate_per_conversation_per_minute,
            config.gating.rate_global_per_minute,
            capacity,
        ));
        let spam = Arc::new(SpamDetector::new(
            config.gating.spam_threshold_per_minute,
            config.gating.spam_cooldown_secs,
            capacity,
        ));
        let activity = Arc::new(ActivityTracker::new(
            config.gating.max_replies_per_hour,
            config.gating.min_silence_minutes,
            capacity,
        ));
        let scorer = EngagementScorer::new(
            config.engagement.clone(),
            &config.persona.trigger_keywords,
        );
        let decision = DecisionEngine::new(
            limiter.clone(),
            spam.clone(),
            activity.clone(),
            scorer,
            rng.clone(),
            config.gating.clone(),
            config.engagement.high_threshold,
        );

        Self {
            decision,
            limiter,
            spam,
            activity,
            budgeter: ContextBudgeter::new(
                config.context.clone(),
                &config.persona.trigger_keywords,
            ),
            cache,
            generator,
            rng,
            history: StateStore::new(capacity),
            persona_name: config.persona.name.clone(),
            deescalation_replies: config.persona.deescalation_replies.clone(),
            apology_replies: config.persona.apology_replies.clone(),
            apology_chance: config.gating.apology_chance,
            error_suppression_threshold: config.gating.error_suppression_threshold,
            history_turns: config.context.history_turns,
            token_budget: config.context.token_budget,
            max_output_chars: config.generator.max_output_chars,
        }
    }

    /// Run one inbound message through the full gate stack.
    pub async fn handle_message(&self, event: &MessageEvent) -> Outcome {
        let now_ms = event.timestamp_ms;
        let verdict = self.decision.evaluate(event, now_ms);

        // History records everything that arrives, suppressed or not; the
        // budgeter decides later what survives compression.
        let entry = self.budgeter.entry(&event.user_id, &event.text, now_ms);
        self.push_history(&event.conversation_id, entry);

        match verdict {
            Verdict::SuppressedSpam { deescalate: true } => Outcome::Deescalate {
                text: self.pick_reply(&self.deescalation_replies),
            },
            Verdict::ShouldRespond { score } => {
                self.respond(&event.conversation_id, &event.text, &score.style, now_ms)
                    .await
            }
            verdict => Outcome::Silent { verdict },
        }
    }

    /// Run one spontaneous tick for a conversation.
    pub async fn handle_tick(&self, conversation_id: &str, now_ms: i64) -> Outcome {
        let verdict = self.decision.evaluate_tick(conversation_id, now_ms);
        if verdict != Verdict::Spontaneous {
            return Outcome::Silent { verdict };
        }

        let prompt = "Pick up the conversation again with something new to say.";
        let transcript = self.render_transcript(conversation_id);
        let request = GenerateRequest {
            prompt: prompt.to_string(),
            transcript,
            style: "casual".to_string(),
            max_output_chars: self.max_output_chars,
        };

        // Spontaneous replies are context-shaped one-offs; the cache would
        // never hit, so skip it.
        match self.generator.generate(&request).await {
            Ok(response) => {
                let entry = self
                    .budgeter
                    .entry(&self.persona_name, &response.text, now_ms);
                self.push_history(conversation_id, entry);
                Outcome::Reply {
                    text: response.text,
                    cached: false,
                }
            }
            Err(err) => {
                tracing::error!(conversation_id, error = %err, "spontaneous generation failed");
                self.limiter.record_error(conversation_id, now_ms);
                Outcome::Silent {
                    verdict: Verdict::Idle,
                }
            }
        }
    }

    async fn respond(
        &self,
        conversation_id: &str,
        prompt: &str,
        style: &str,
        now_ms: i64,
    ) -> Outcome {
        let window = self.context_window(conversation_id);
        let context_hash = context_fingerprint(&window);

        if let Some(cache) = &self.cache {
            match cache.lookup(prompt, &context_hash, style, now_ms) {
                Ok(Some(text)) => {
                    let entry = self.budgeter.entry(&self.persona_name, &text, now_ms);
                    self.push_history(conversation_id, entry);
                    return Outcome::Reply { text, cached: true };
                }
                Ok(None) => {}
                // Cache trouble degrades to a miss, never to silence.
                Err(err) => {
                    tracing::warn!(error = %err, "cache lookup failed, generating fresh");
                }
            }
        }

        let request = GenerateRequest {
            prompt: prompt.to_string(),
            transcript: render_entries(&window),
            style: style.to_string(),
            max_output_chars: self.max_output_chars,
        };

        match self.generator.generate(&request).await {
            Ok(response) => {
                if let Some(cache) = &self.cache {
                    if let Err(err) =
                        cache.store(prompt, &context_hash, style, &response.text, now_ms)
                    {
                        tracing::warn!(error = %err, "cache store failed");
                    }
                }
                let entry = self
                    .budgeter
                    .entry(&self.persona_name, &response.text, now_ms);
                self.push_history(conversation_id, entry);
                Outcome::Reply {
                    text: response.text,
                    cached: false,
                }
            }
            Err(err) => {
                tracing::error!(conversation_id, error = %err, "generation failed");
                self.limiter.record_error(conversation_id, now_ms);
                let suppressed = self.limiter.should_suppress_errors(
                    conversation_id,
                    self.error_suppression_threshold,
                    now_ms,
                );
                if !suppressed && self.rng.roll() < self.apology_chance {
                    return Outcome::Apology {
                        text: self.pick_reply(&self.apology_replies),
                    };
                }
                Outcome::Silent {
                    verdict: Verdict::Idle,
                }
            }
        }
    }

    /// Conversations that currently have any recorded history, for the
    /// spontaneous ticker. The bot never speaks first in a conversation it
    /// has not seen.
    pub fn active_conversations(&self) -> Vec<String> {
        self.history.keys()
    }

    /// Drop idle per-key state across all gates and the history ring.
    pub fn sweep_state(&self, now_ms: i64) -> usize {
        let mut dropped = self.limiter.sweep_idle(now_ms);
        dropped += self.spam.sweep_idle(now_ms);
        dropped += self.activity.sweep_idle(now_ms);
        dropped += self.history.sweep(|entries| {
            entries
                .back()
                .is_some_and(|e| now_ms - e.timestamp_ms < HISTORY_IDLE_MS)
        });
        dropped
    }

    fn push_history(&self, conversation_id: &str, entry: ContextEntry) {
        let max = self.history_turns;
        self.history.mutate(conversation_id, |entries| {
            entries.push_back(entry);
            while entries.len() > max {
                entries.pop_front();
            }
        });
    }

    /// Budget-compressed snapshot of the conversation history.
    fn context_window(&self, conversation_id: &str) -> Vec<ContextEntry> {
        let snapshot: Vec<ContextEntry> = self
            .history
            .get(conversation_id, |entries| {
                entries.iter().cloned().collect()
            })
            .unwrap_or_default();
        self.budgeter.build(&snapshot, self.token_budget)
    }

    fn render_transcript(&self, conversation_id: &str) -> String {
        render_entries(&self.context_window(conversation_id))
    }

    /// Uniform draw over a scripted reply list.
    fn pick_reply(&self, replies: &[String]) -> String {
        if replies.is_empty() {
            return String::new();
        }
        let idx = (self.rng.roll() * replies.len() as f64) as usize;
        replies[idx.min(replies.len() - 1)].clone()
    }
}

fn render_entries(entries: &[ContextEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.speaker, e.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fingerprint of the compressed context window; part of the exact cache key
/// so a changed window never serves a stale reply.
fn context_fingerprint(entries: &[ContextEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.speaker.as_bytes());
        hasher.update([0x1f]);
        hasher.update(entry.text.as_bytes());
        hasher.update([0x1e]);
    }
    format!("{:064x}", hasher.finalize())
}
