//! Response decision engine: folds the rate limiter, spam detector,
//! engagement scorer and bot-activity gates into one verdict per message.
//!
//! Every probability roll in the system goes through the injectable
//! [`RandomSource`] here, so tests can script outcomes deterministically.

mod rng;

pub use rng::{RandomSource, ScriptedRandom, ThreadRandom};

use crate::channels::MessageEvent;
use crate::config::GatingConfig;
use crate::engagement::{EngagementScorer, ScoreBreakdown};
use crate::gating::{ActivityTracker, RateLimiter, SpamDetector};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Idle,
    ShouldRespond { score: ScoreBreakdown },
    Spontaneous,
    /// The conversation is cooling down. `deescalate` carves out the small
    /// configured chance of a short scripted reply instead of full silence —
    /// it never changes the verdict itself.
    SuppressedSpam { deescalate: bool },
    /// Never emits anything, not even the scripted reply.
    SuppressedRateLimit,
}

pub struct DecisionEngine {
    limiter: Arc<RateLimiter>,
    spam: Arc<SpamDetector>,
    activity: Arc<ActivityTracker>,
    scorer: EngagementScorer,
    rng: Arc<dyn RandomSource>,
    gating: GatingConfig,
    high_threshold: i32,
}

impl DecisionEngine {
    pub fn new(
        limiter: Arc<RateLimiter>,
        spam: Arc<SpamDetector>,
        activity: Arc<ActivityTracker>,
        scorer: EngagementScorer,
        rng: Arc<dyn RandomSource>,
        gating: GatingConfig,
        high_threshold: i32,
    ) -> Self {
        Self {
            limiter,
            spam,
            activity,
            scorer,
            rng,
            gating,
            high_threshold,
        }
    }

    pub fn scorer(&self) -> &EngagementScorer {
        &self.scorer
    }

    /// Evaluate one inbound message, in strict priority order: spam →
    /// rate limit → trigger/direct reply → engagement gate → idle.
    ///
    /// On `ShouldRespond` the bot-activity slot has already been claimed, so
    /// concurrent evaluations for the same conversation cannot both pass the
    /// hourly-cap gate for a single slot.
    pub fn evaluate(&self, event: &MessageEvent, now_ms: i64) -> Verdict {
        let conversation = event.conversation_id.as_str();

        // 1. Spam. Observing the message updates the user's cadence; the
        //    conversation-level check covers cooldowns tripped by anyone.
        let during_cooldown = self.spam.observe(conversation, &event.user_id, now_ms);
        if during_cooldown || self.spam.is_spam_active(conversation, now_ms) {
            let deescalate = self.rng.roll() < self.gating.spam_reply_chance;
            return Verdict::SuppressedSpam { deescalate };
        }

        // 2. Rate limit. A denial is final — no scripted carve-out here.
        if !self.limiter.try_acquire(conversation, now_ms) {
            return Verdict::SuppressedRateLimit;
        }

        let score = self.scorer.score(&event.text);

        // 3. Direct address bypasses the probability gates but stays subject
        //    to the hourly cap.
        if score.trigger_hits > 0 || event.is_reply_to_bot {
            if self.activity.try_claim_reply(conversation, now_ms) {
                return Verdict::ShouldRespond { score };
            }
            tracing::debug!(conversation, "hourly reply cap reached, staying quiet");
            return Verdict::Idle;
        }

        // 4. High engagement replies with the category's configured chance.
        if score.engagement >= self.high_threshold
            && self.rng.roll() < score.reply_chance
            && self.activity.try_claim_reply(conversation, now_ms)
        {
            return Verdict::ShouldRespond { score };
        }

        Verdict::Idle
    }

    /// Evaluate a periodic tick for a conversation (step 5 of the priority
    /// order): autonomous mode, minimum silence and a spontaneous draw.
    pub fn evaluate_tick(&self, conversation_id: &str, now_ms: i64) -> Verdict {
        if !self.gating.autonomous_enabled {
            return Verdict::Idle;
        }
        if self.spam.is_spam_active(conversation_id, now_ms) {
            return Verdict::SuppressedSpam { deescalate: false };
        }
        if !self.limiter.try_acquire(conversation_id, now_ms) {
            return Verdict::SuppressedRateLimit;
        }
        if self.rng.roll() < self.gating.spontaneous_chance
            && self.activity.try_claim_spontaneous(conversation_id, now_ms)
        {
            return Verdict::Spontaneous;
        }
        Verdict::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngagementConfig;

    fn event(conversation: &str, user: &str, text: &str) -> MessageEvent {
        MessageEvent {
            conversation_id: conversation.into(),
            user_id: user.into(),
            text: text.into(),
            timestamp_ms: 0,
            is_reply_to_bot: false,
        }
    }

    fn engine(gating: GatingConfig, rng: Arc<dyn RandomSource>) -> DecisionEngine {
        let capacity = 64;
        DecisionEngine::new(
            Arc::new(RateLimiter::new(
                gating.rate_per_conversation_per_minute,
                gating.rate_global_per_minute,
                capacity,
            )),
            Arc::new(SpamDetector::new(
                gating.spam_threshold_per_minute,
                gating.spam_cooldown_secs,
                capacity,
            )),
            Arc::new(ActivityTracker::new(
                gating.max_replies_per_hour,
                gating.min_silence_minutes,
                capacity,
            )),
            EngagementScorer::new(
                EngagementConfig::default(),
                &["purrsona".to_string()],
            ),
            rng,
            gating,
            EngagementConfig::default().high_threshold,
        )
    }

    #[test]
    fn trigger_keyword_always_responds() {
        // Zero engagement luck: rolls that would fail every probability gate.
        let rng = Arc::new(ScriptedRandom::always(0.99));
        let engine = engine(GatingConfig::default(), rng);
        let verdict = engine.evaluate(&event("c", "u", "hey purrsona"), 0);
        assert!(matches!(verdict, Verdict::ShouldRespond { .. }));
    }

    #[test]
    fn direct_reply_to_bot_responds() {
        let rng = Arc::new(ScriptedRandom::always(0.99));
        let engine = engine(GatingConfig::default(), rng);
        let mut msg = event("c", "u", "sure, tell me more");
        msg.is_reply_to_bot = true;
        assert!(matches!(
            engine.evaluate(&msg, 0),
            Verdict::ShouldRespond { .. }
        ));
    }

    #[test]
    fn spam_suppression_beats_trigger() {
        let rng = Arc::new(ScriptedRandom::always(0.99));
        let mut gating = GatingConfig::default();
        gating.spam_threshold_per_minute = 2;
        let engine = engine(gating, rng);
        engine.evaluate(&event("c", "u", "one"), 0);
        engine.evaluate(&event("c", "u", "two"), 1000);
        // Cooldown active; even a direct address is suppressed.
        let verdict = engine.evaluate(&event("c", "u", "purrsona help"), 2000);
        assert!(matches!(verdict, Verdict::SuppressedSpam { .. }));
    }

    #[test]
    fn spam_carveout_rolls_deescalation() {
        let mut gating = GatingConfig::default();
        gating.spam_threshold_per_minute = 1;
        gating.spam_reply_chance = 0.5;
        let engine = engine(gating, Arc::new(ScriptedRandom::always(0.1)));
        engine.evaluate(&event("c", "u", "one"), 0);
        let verdict = engine.evaluate(&event("c", "u", "two"), 1000);
        assert_eq!(verdict, Verdict::SuppressedSpam { deescalate: true });
    }

    #[test]
    fn rate_limit_denial_never_deescalates() {
        let mut gating = GatingConfig::default();
        gating.rate_per_conversation_per_minute = 1;
        let engine = engine(gating, Arc::new(ScriptedRandom::always(0.0)));
        assert!(matches!(
            engine.evaluate(&event("c", "u", "purrsona hi"), 0),
            Verdict::ShouldRespond { .. }
        ));
        let verdict = engine.evaluate(&event("c", "u", "purrsona again"), 1000);
        assert_eq!(verdict, Verdict::SuppressedRateLimit);
    }

    #[test]
    fn hourly_cap_quiets_trigger_path() {
        let mut gating = GatingConfig::default();
        gating.max_replies_per_hour = 1;
        let engine = engine(gating, Arc::new(ScriptedRandom::always(0.99)));
        assert!(matches!(
            engine.evaluate(&event("c", "u", "purrsona one"), 0),
            Verdict::ShouldRespond { .. }
        ));
        assert_eq!(
            engine.evaluate(&event("c", "u", "purrsona two"), 1000),
            Verdict::Idle
        );
    }

    #[test]
    fn high_engagement_gated_by_category_chance() {
        let gating = GatingConfig::default();
        // First roll passes the gate, second fails it.
        let engine = engine(gating, Arc::new(ScriptedRandom::new(vec![0.0, 0.99])));
        let text = "why does this rust code bug crash the server? error everywhere";
        assert!(matches!(
            engine.evaluate(&event("c1", "u", text), 0),
            Verdict::ShouldRespond { .. }
        ));
        assert_eq!(engine.evaluate(&event("c2", "u", text), 1000), Verdict::Idle);
    }

    #[test]
    fn low_engagement_is_idle() {
        let engine = engine(GatingConfig::default(), Arc::new(ScriptedRandom::always(0.0)));
        assert_eq!(engine.evaluate(&event("c", "u", "ok"), 0), Verdict::Idle);
    }

    #[test]
    fn tick_requires_autonomous_mode() {
        let engine = engine(GatingConfig::default(), Arc::new(ScriptedRandom::always(0.0)));
        assert_eq!(engine.evaluate_tick("c", 0), Verdict::Idle);
    }

    #[test]
    fn tick_fires_spontaneous_when_gates_pass() {
        let mut gating = GatingConfig::default();
        gating.autonomous_enabled = true;
        gating.spontaneous_chance = 0.5;
        gating.min_silence_minutes = 0;
        let engine = engine(gating, Arc::new(ScriptedRandom::always(0.1)));
        assert_eq!(engine.evaluate_tick("c", 0), Verdict::Spontaneous);
    }

    #[test]
    fn tick_respects_min_silence() {
        let mut gating = GatingConfig::default();
        gating.autonomous_enabled = true;
        gating.spontaneous_chance = 1.0;
        gating.min_silence_minutes = 45;
        let engine = engine(gating, Arc::new(ScriptedRandom::always(0.1)));
        assert_eq!(engine.evaluate_tick("c", 0), Verdict::Spontaneous);
        assert_eq!(engine.evaluate_tick("c", 60_000), Verdict::Idle);
    }
}
