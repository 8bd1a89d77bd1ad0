//! End-to-end gating behavior through the full pipeline: rate limiting,
//! spam suppression and trigger priority, with a scripted generator so no
//! network is involved.

use async_trait::async_trait;
use purrsona::channels::MessageEvent;
use purrsona::config::Config;
use purrsona::decision::{ScriptedRandom, Verdict};
use purrsona::pipeline::{Engine, Outcome};
use purrsona::providers::{GenerateRequest, GenerateResponse, Generator};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

struct CountingGenerator {
    calls: AtomicU32,
}

impl CountingGenerator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for CountingGenerator {
    fn name(&self) -> &str {
        "counting"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GenerateResponse {
            text: format!("reply to: {}", request.prompt),
        })
    }
}

fn base_config() -> Config {
    let mut config = Config::default();
    config.cache.enabled = false;
    config
}

fn message(conversation: &str, user: &str, text: &str, timestamp_ms: i64) -> MessageEvent {
    MessageEvent {
        conversation_id: conversation.into(),
        user_id: user.into(),
        text: text.into(),
        timestamp_ms,
        is_reply_to_bot: false,
    }
}

#[tokio::test]
async fn rate_limiter_denies_beyond_conversation_budget() {
    let mut config = base_config();
    config.gating.rate_per_conversation_per_minute = 3;
    config.gating.rate_global_per_minute = 60;
    // Generous spam threshold so only the rate limiter is in play.
    config.gating.spam_threshold_per_minute = 100;

    let generator = CountingGenerator::new();
    let engine = Engine::new(
        &config,
        generator.clone(),
        None,
        Arc::new(ScriptedRandom::always(0.99)),
    );

    let mut replies = 0;
    let mut denied = 0;
    for i in 0..10 {
        let event = message("room", "alice", "purrsona ping", i64::from(i) * 5_000);
        match engine.handle_message(&event).await {
            Outcome::Reply { .. } => replies += 1,
            Outcome::Silent {
                verdict: Verdict::SuppressedRateLimit,
            } => denied += 1,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(replies, 3);
    assert_eq!(denied, 7);
    // Denied messages never reach the generator.
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn sixth_message_in_a_minute_trips_spam_cooldown() {
    let mut config = base_config();
    config.gating.spam_threshold_per_minute = 5;
    config.gating.spam_cooldown_secs = 120;
    config.gating.spam_reply_chance = 0.0;
    // Wide rate budget so spam detection is the only gate in play.
    config.gating.rate_per_conversation_per_minute = 50;
    config.gating.rate_global_per_minute = 100;

    let generator = CountingGenerator::new();
    let engine = Engine::new(
        &config,
        generator.clone(),
        None,
        Arc::new(ScriptedRandom::always(0.99)),
    );

    for i in 0..5 {
        let outcome = engine
            .handle_message(&message("room", "bob", "hi", i64::from(i) * 1_000))
            .await;
        assert!(
            !matches!(
                outcome,
                Outcome::Silent {
                    verdict: Verdict::SuppressedSpam { .. }
                }
            ),
            "message {i} should not be spam-suppressed"
        );
    }

    // The 6th message within the minute exceeds the threshold.
    let sixth = engine.handle_message(&message("room", "bob", "hi", 5_000)).await;
    assert!(matches!(
        sixth,
        Outcome::Silent {
            verdict: Verdict::SuppressedSpam { .. }
        }
    ));

    // Even a direct address stays suppressed for the whole cooldown.
    let during = engine
        .handle_message(&message("room", "bob", "purrsona help", 60_000))
        .await;
    assert!(matches!(
        during,
        Outcome::Silent {
            verdict: Verdict::SuppressedSpam { .. }
        }
    ));
    assert_eq!(generator.calls(), 0);

    // After the cooldown lapses with no traffic, the bot answers again.
    let after = engine
        .handle_message(&message("room", "bob", "purrsona help", 300_000))
        .await;
    assert!(matches!(after, Outcome::Reply { .. }));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn trigger_keyword_overrides_low_engagement() {
    let config = base_config();
    let generator = CountingGenerator::new();
    let engine = Engine::new(
        &config,
        generator.clone(),
        None,
        // Rolls that would fail every probability gate.
        Arc::new(ScriptedRandom::always(0.99)),
    );

    let plain = engine.handle_message(&message("room", "cara", "ok", 0)).await;
    assert!(matches!(plain, Outcome::Silent { verdict: Verdict::Idle }));

    let addressed = engine
        .handle_message(&message("room", "cara", "purrsona ok", 1_000))
        .await;
    assert!(matches!(addressed, Outcome::Reply { .. }));
}

#[tokio::test]
async fn one_spammer_silences_the_conversation_for_everyone() {
    let mut config = base_config();
    config.gating.spam_threshold_per_minute = 2;
    config.gating.spam_reply_chance = 0.0;

    let generator = CountingGenerator::new();
    let engine = Engine::new(
        &config,
        generator.clone(),
        None,
        Arc::new(ScriptedRandom::always(0.99)),
    );

    for i in 0..3 {
        engine
            .handle_message(&message("room", "spammer", "spam", i64::from(i) * 500))
            .await;
    }

    // A well-behaved user addressing the bot during the cooldown gets nothing.
    let outcome = engine
        .handle_message(&message("room", "quiet", "purrsona hello", 2_000))
        .await;
    assert!(matches!(
        outcome,
        Outcome::Silent {
            verdict: Verdict::SuppressedSpam { .. }
        }
    ));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn conversations_gate_independently() {
    let mut config = base_config();
    config.gating.rate_per_conversation_per_minute = 1;
    config.gating.rate_global_per_minute = 10;

    let generator = CountingGenerator::new();
    let engine = Engine::new(
        &config,
        generator.clone(),
        None,
        Arc::new(ScriptedRandom::always(0.99)),
    );

    assert!(matches!(
        engine.handle_message(&message("a", "u", "purrsona one", 0)).await,
        Outcome::Reply { .. }
    ));
    assert!(matches!(
        engine.handle_message(&message("a", "u", "purrsona two", 1_000)).await,
        Outcome::Silent {
            verdict: Verdict::SuppressedRateLimit
        }
    ));
    // A different conversation still has its own budget.
    assert!(matches!(
        engine.handle_message(&message("b", "u", "purrsona three", 2_000)).await,
        Outcome::Reply { .. }
    ));
}
