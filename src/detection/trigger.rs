//! Save policy with trailing capture.
//!
//! A score above the trigger threshold saves the frame and arms a
//! countdown so that the frames following the event are kept too, even
//! once the scene has settled.

/// Countdown deciding which frames are persisted.
#[derive(Debug, Clone)]
pub struct SaveCountdown {
    remaining: u32,
    length: u32,
    threshold: f64,
}

impl SaveCountdown {
    /// Creates an idle countdown.
    ///
    /// `length` counts the triggering frame, so a single trigger saves
    /// `length` frames in total.
    pub fn new(threshold: f64, length: u32) -> Self {
        Self {
            remaining: 0,
            length,
            threshold,
        }
    }

    /// Feeds one score and returns true if the frame should be saved.
    pub fn observe(&mut self, score: f64) -> bool {
        let triggered = score > self.threshold;
        if triggered {
            self.remaining = self.length;
        }

        if triggered || self.remaining > 0 {
            self.remaining = self.remaining.saturating_sub(1);
            true
        } else {
            false
        }
    }

    /// Frames still to be saved without a new trigger.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}
