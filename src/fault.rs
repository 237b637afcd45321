//! Power-loss injection: the write/erase countdown.
//!
//! Every media write or erase decrements the countdown. The call that brings
//! it to exactly zero does not reach the media; it reports [`PowerLoss`] and
//! the invocation in flight is abandoned.
//!
//! # Crash Point Numbering
//!
//! Crash points are **1-indexed**: a countdown armed with `1` cuts power on
//! the first write or erase, `2` on the second, and so on. A countdown of
//! zero or less never fires; it keeps counting down, so after a run started
//! at zero `-countdown()` is the number of writes and erases performed.

use crate::error::PowerLoss;

/// Observable state of the injector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultState {
    /// Countdown is zero or negative; nothing will fire.
    Disarmed,
    /// Power will be cut when the countdown reaches zero.
    Armed,
    /// Power was cut during the current invocation.
    Fired,
}

/// Snapshot taken when an invocation starts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    ops: u64,
}

/// The countdown plus bookkeeping about past firings.
#[derive(Debug, Default)]
pub struct FaultInjector {
    countdown: i32,
    fired: u32,
    ops: u64,
    /// Latched from the firing call until the next checkpoint.
    tripped: bool,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the countdown for the next invocation.
    pub fn arm(&mut self, countdown: i32) {
        self.countdown = countdown;
    }

    /// Current countdown value. Left untouched by a firing.
    pub fn countdown(&self) -> i32 {
        self.countdown
    }

    /// How many times power has been cut over the injector's lifetime.
    pub fn fired_count(&self) -> u32 {
        self.fired
    }

    /// Total writes and erases observed, including the ones that fired.
    pub fn ops(&self) -> u64 {
        self.ops
    }

    pub fn state(&self) -> FaultState {
        if self.tripped {
            FaultState::Fired
        } else if self.countdown > 0 {
            FaultState::Armed
        } else {
            FaultState::Disarmed
        }
    }

    /// Gate for one write or erase.
    ///
    /// Once fired, every further call in the same invocation fails as well:
    /// a powered-down device takes no more writes.
    pub fn tick(&mut self) -> Result<(), PowerLoss> {
        if self.tripped {
            return Err(PowerLoss);
        }

        self.ops += 1;
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown == 0 {
            self.fired += 1;
            self.tripped = true;
            log::info!("power cut at flash operation {}", self.ops);
            return Err(PowerLoss);
        }
        Ok(())
    }

    pub(crate) fn checkpoint(&mut self) -> Checkpoint {
        self.tripped = false;
        Checkpoint { ops: self.ops }
    }

    /// Whether power was cut since `checkpoint`, and how many writes and
    /// erases the invocation issued.
    pub(crate) fn settle(&mut self, checkpoint: Checkpoint) -> (bool, u64) {
        let fired = self.tripped;
        self.tripped = false;
        (fired, self.ops - checkpoint.ops)
    }
}
