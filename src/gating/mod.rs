mod activity;
mod limiter;
mod window;

pub use activity::{ActivityTracker, SpamDetector};
pub use limiter::RateLimiter;
pub use window::SlidingWindow;
