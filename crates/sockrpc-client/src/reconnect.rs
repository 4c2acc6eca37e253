//! Reconnect attempt accounting.

use std::time::Duration;

use crate::config::ReconnectOptions;

/// What to do after the connection was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Automatic reconnection is turned off
    Disabled,
    /// Try again after `delay`; `attempt` counts from 1
    Retry { attempt: u32, delay: Duration },
    /// The attempt budget is spent
    Exhausted { attempts: u32 },
}

/// Counts consecutive reconnect attempts against [`ReconnectOptions`].
///
/// The count resets only when a connection actually opens, so a flapping
/// endpoint that keeps refusing still runs out of attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    options: ReconnectOptions,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(options: ReconnectOptions) -> Self {
        Self {
            options,
            attempts: 0,
        }
    }

    pub fn options(&self) -> &ReconnectOptions {
        &self.options
    }

    /// Attempts made since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.options.max_attempts, Some(max) if self.attempts >= max)
    }

    /// Decides on the next attempt and counts it.
    pub fn next_attempt(&mut self) -> ReconnectDecision {
        if !self.options.auto_reconnect {
            return ReconnectDecision::Disabled;
        }
        if self.is_exhausted() {
            return ReconnectDecision::Exhausted {
                attempts: self.attempts,
            };
        }
        self.attempts = self.attempts.saturating_add(1);
        ReconnectDecision::Retry {
            attempt: self.attempts,
            delay: self.options.delay,
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
