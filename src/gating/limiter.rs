use super::window::SlidingWindow;
use crate::store::StateStore;
use parking_lot::Mutex;

const REPLY_WINDOW_MS: i64 = 60_000;
const ERROR_WINDOW_MS: i64 = 5 * 60_000;

/// Admits or denies outbound replies per conversation and globally, and
/// tracks recent error volume so a persistently failing conversation can be
/// muted instead of spammed with apologies.
///
/// A denial is a normal return value, never an error. The limiter is
/// advisory, not transactional: the conversation scope is checked and
/// consumed first, then the global scope; when the global scope denies, the
/// conversation slot is not rolled back.
pub struct RateLimiter {
    per_conversation: usize,
    global_limit: usize,
    conversations: StateStore<SlidingWindow>,
    global: Mutex<SlidingWindow>,
    errors: StateStore<SlidingWindow>,
}

impl RateLimiter {
    pub fn new(per_conversation: usize, global_limit: usize, state_capacity: usize) -> Self {
        Self {
            per_conversation,
            global_limit,
            conversations: StateStore::new(state_capacity),
            global: Mutex::new(SlidingWindow::new()),
            errors: StateStore::new(state_capacity),
        }
    }

    /// Admit one outbound reply for `conversation_id` iff both scopes admit.
    pub fn try_acquire(&self, conversation_id: &str, now_ms: i64) -> bool {
        let conversation_ok = self.conversations.mutate(conversation_id, |window| {
            window.try_acquire(self.per_conversation, REPLY_WINDOW_MS, now_ms)
        });
        if !conversation_ok {
            tracing::debug!(conversation = conversation_id, "reply denied: conversation rate");
            return false;
        }

        let global_ok = self
            .global
            .lock()
            .try_acquire(self.global_limit, REPLY_WINDOW_MS, now_ms);
        if !global_ok {
            tracing::debug!(conversation = conversation_id, "reply denied: global rate");
        }
        global_ok
    }

    /// Note one failed generation for the conversation's 5-minute error window.
    pub fn record_error(&self, conversation_id: &str, now_ms: i64) {
        self.errors.mutate(conversation_id, |window| {
            window.record(ERROR_WINDOW_MS, now_ms);
        });
    }

    /// True once the conversation's recent-error count reaches `max_errors` —
    /// time to go fully silent rather than noisy.
    pub fn should_suppress_errors(
        &self,
        conversation_id: &str,
        max_errors: usize,
        now_ms: i64,
    ) -> bool {
        self.errors
            .get(conversation_id, |window| window.clone())
            .map(|mut window| window.count(ERROR_WINDOW_MS, now_ms))
            .is_some_and(|count| count >= max_errors)
    }

    /// Evict windows with no activity in their trailing interval.
    pub fn sweep_idle(&self, now_ms: i64) -> usize {
        self.conversations
            .sweep(|window| !window.is_idle(REPLY_WINDOW_MS, now_ms))
            + self
                .errors
                .sweep(|window| !window.is_idle(ERROR_WINDOW_MS, now_ms))
    }
}
