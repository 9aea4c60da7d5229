//! Rotating status messages shown while a run is in flight.

use std::time::Duration;
use tokio::task::JoinHandle;

/// Messages shown while waiting on the image service, in rotation order.
pub const PROGRESS_MESSAGES: [&str; 5] = [
    "Crafting your custom design...",
    "Applying the finishing touches...",
    "Rendering photorealistic details...",
    "Consulting with our virtual designers...",
    "Measuring twice, rendering once...",
];

/// How long each message stays up.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(3);

/// Endless iterator over [`PROGRESS_MESSAGES`].
#[derive(Debug, Clone, Default)]
pub struct ProgressMessages {
    next: usize,
}

impl ProgressMessages {
    /// Starts at the first message.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Iterator for ProgressMessages {
    type Item = &'static str;

    fn next(&mut self) -> Option<Self::Item> {
        let message = PROGRESS_MESSAGES[self.next];
        self.next = (self.next + 1) % PROGRESS_MESSAGES.len();
        Some(message)
    }
}

/// Feeds progress messages to a callback on a timer until dropped.
#[must_use = "the ticker stops as soon as it is dropped"]
pub struct ProgressTicker {
    handle: JoinHandle<()>,
}

impl ProgressTicker {
    /// Starts ticking at [`PROGRESS_INTERVAL`]. The first message is emitted
    /// immediately.
    pub fn start<F>(on_message: F) -> Self
    where
        F: FnMut(&'static str) + Send + 'static,
    {
        Self::with_interval(PROGRESS_INTERVAL, on_message)
    }

    /// Starts ticking at a custom period.
    pub fn with_interval<F>(period: Duration, mut on_message: F) -> Self
    where
        F: FnMut(&'static str) + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            for message in ProgressMessages::new() {
                interval.tick().await;
                on_message(message);
            }
        });
        Self { handle }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
