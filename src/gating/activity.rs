use super::window::SlidingWindow;
use crate::store::StateStore;

const BURST_WINDOW_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * 60_000;

/// Per (conversation, user) spam state: NORMAL → COOLDOWN → NORMAL.
///
/// Once `cooldown_until_ms` is set it is cleared only by time passing —
/// further traffic during the cooldown neither extends nor resets it, and is
/// not even recorded, so a fresh burst is required to trip the detector again.
#[derive(Debug, Clone, Default)]
struct SpamState {
    window: SlidingWindow,
    /// `None` until a burst arms the cooldown; a raw zero would read as an
    /// active cooldown for messages timestamped at the epoch.
    cooldown_until_ms: Option<i64>,
}

/// Tracks per-user message cadence and raises a time-boxed cooldown on bursts.
pub struct SpamDetector {
    threshold: usize,
    cooldown_ms: i64,
    users: StateStore<SpamState>,
    /// Latest cooldown deadline per conversation: the whole conversation
    /// reports "spam active" while any of its users is cooling down.
    conversations: StateStore<i64>,
}

impl SpamDetector {
    pub fn new(threshold: usize, cooldown_secs: u64, state_capacity: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown_ms: (cooldown_secs as i64) * 1000,
            users: StateStore::new(state_capacity),
            conversations: StateStore::new(state_capacity),
        }
    }

    fn user_key(conversation_id: &str, user_id: &str) -> String {
        format!("{conversation_id}\u{1}{user_id}")
    }

    /// Record one inbound message and report whether it arrived during an
    /// active cooldown. Up to `threshold` messages per minute pass; the
    /// message that exceeds the threshold starts the cooldown and is itself
    /// suppressed, as is everything after it until the cooldown expires on
    /// its own. Traffic during a cooldown is not recorded, so it cannot
    /// extend the deadline.
    pub fn observe(&self, conversation_id: &str, user_id: &str, now_ms: i64) -> bool {
        let key = Self::user_key(conversation_id, user_id);
        let (suppressed, tripped_until) = self.users.mutate(&key, |state| {
            if state.cooldown_until_ms.is_some_and(|until| now_ms <= until) {
                return (true, None);
            }
            state.window.record(BURST_WINDOW_MS, now_ms);
            if state.window.count(BURST_WINDOW_MS, now_ms) > self.threshold {
                let until = now_ms + self.cooldown_ms;
                state.cooldown_until_ms = Some(until);
                (true, Some(until))
            } else {
                (false, None)
            }
        });

        if let Some(until) = tripped_until {
            tracing::info!(
                conversation = conversation_id,
                user = user_id,
                cooldown_secs = self.cooldown_ms / 1000,
                "message burst detected, cooling down"
            );
            self.conversations.mutate(conversation_id, |deadline| {
                *deadline = (*deadline).max(until);
            });
        }
        suppressed
    }

    /// Whether the conversation is currently spam-suppressed.
    pub fn is_spam_active(&self, conversation_id: &str, now_ms: i64) -> bool {
        self.conversations
            .get(conversation_id, |&deadline| now_ms <= deadline)
            .unwrap_or(false)
    }

    pub fn sweep_idle(&self, now_ms: i64) -> usize {
        self.conversations.sweep(|&deadline| now_ms <= deadline)
            + self.users.sweep(|state| {
                state.cooldown_until_ms.is_some_and(|until| now_ms <= until)
                    || !state.window.is_idle(BURST_WINDOW_MS, now_ms)
            })
    }
}

/// The bot's own reply cadence, tracked independently of user traffic:
/// hourly cap for all replies, minimum silence for unprompted ones.
#[derive(Debug, Clone, Default)]
struct BotActivity {
    replies: SlidingWindow,
    last_spontaneous_ms: Option<i64>,
}

pub struct ActivityTracker {
    max_replies_per_hour: usize,
    min_silence_ms: i64,
    state: StateStore<BotActivity>,
}

impl ActivityTracker {
    pub fn new(max_replies_per_hour: usize, min_silence_minutes: u64, state_capacity: usize) -> Self {
        Self {
            max_replies_per_hour: max_replies_per_hour.max(1),
            min_silence_ms: (min_silence_minutes as i64) * 60_000,
            state: StateStore::new(state_capacity),
        }
    }

    /// Claim one reply slot under the hourly cap. Check and record happen
    /// under one lock, so two concurrent evaluations for the same
    /// conversation cannot both take the last slot.
    pub fn try_claim_reply(&self, conversation_id: &str, now_ms: i64) -> bool {
        self.state.mutate(conversation_id, |activity| {
            activity
                .replies
                .try_acquire(self.max_replies_per_hour, HOUR_MS, now_ms)
        })
    }

    /// Claim a spontaneous slot: minimum silence since the last unprompted
    /// reply, plus a slot under the hourly cap, atomically.
    pub fn try_claim_spontaneous(&self, conversation_id: &str, now_ms: i64) -> bool {
        self.state.mutate(conversation_id, |activity| {
            let silent_enough = activity
                .last_spontaneous_ms
                .is_none_or(|last| now_ms - last >= self.min_silence_ms);
            if !silent_enough {
                return false;
            }
            if !activity
                .replies
                .try_acquire(self.max_replies_per_hour, HOUR_MS, now_ms)
            {
                return false;
            }
            activity.last_spontaneous_ms = Some(now_ms);
            true
        })
    }

    pub fn replies_in_last_hour(&self, conversation_id: &str, now_ms: i64) -> usize {
        self.state
            .get(conversation_id, |activity| activity.replies.clone())
            .map(|mut window| window.count(HOUR_MS, now_ms))
            .unwrap_or(0)
    }

    pub fn sweep_idle(&self, now_ms: i64) -> usize {
        self.state
            .sweep(|activity| !activity.replies.is_idle(HOUR_MS, now_ms))
    }
}
