//! Incremental reveal of a reply that has already fully arrived.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use vedas_core::config::ChatConfig;

/// Reveals text one character per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingPresenter {
    interval: Duration,
}

impl Default for TypingPresenter {
    fn default() -> Self {
        Self::new(Duration::from_millis(20))
    }
}

impl TypingPresenter {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(Duration::from_millis(config.typing_interval_ms))
    }

    /// Every prefix of `text` that ends on a character boundary, shortest
    /// first. A text of N characters yields N prefixes, the last being `text`.
    pub fn prefixes(text: &str) -> impl Iterator<Item = &str> + '_ {
        text.char_indices()
            .map(move |(start, c)| &text[..start + c.len_utf8()])
    }

    /// Emit each prefix of `text` to `on_frame`, one per interval.
    ///
    /// `on_frame` returns `false` to stop early. Returns `true` when the full
    /// text was emitted. A zero interval emits every frame without waiting.
    pub async fn reveal<F>(&self, text: &str, mut on_frame: F) -> bool
    where
        F: FnMut(&str) -> bool,
    {
        if self.interval.is_zero() {
            return Self::prefixes(text).all(|frame| on_frame(frame));
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        for frame in Self::prefixes(text) {
            ticker.tick().await;
            if !on_frame(frame) {
                return false;
            }
        }
        true
    }
}
