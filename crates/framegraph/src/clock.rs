//! Playback clock driven by host timestamps

use std::time::Duration;

/// Tracks elapsed playback time with pause and restart
///
/// The host passes its own monotonic timestamp on every tick; the clock never reads
/// the system time itself, which keeps replays deterministic.
#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    /// Host timestamp that corresponds to elapsed time zero
    origin: Option<Duration>,
    /// Elapsed time frozen at the moment of pausing
    paused_at: Option<Duration>,
    restart_pending: bool,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.paused_at.is_none()
    }

    /// Elapsed time at host timestamp `now`
    ///
    /// The first call establishes the origin.
    pub fn elapsed(&mut self, now: Duration) -> Duration {
        if let Some(paused) = self.paused_at {
            return paused;
        }
        let origin = match self.origin {
            Some(origin) if !self.restart_pending => origin,
            _ => {
                self.restart_pending = false;
                self.origin = Some(now);
                now
            }
        };
        now.saturating_sub(origin)
    }

    /// Freezes elapsed time at its value for `now`
    pub fn pause(&mut self, now: Duration) {
        if self.paused_at.is_none() {
            self.paused_at = Some(self.elapsed(now));
        }
    }

    /// Resumes from the frozen elapsed time
    pub fn resume(&mut self, now: Duration) {
        if let Some(paused) = self.paused_at.take() {
            self.origin = Some(now.saturating_sub(paused));
            self.restart_pending = false;
        }
    }

    /// Resets elapsed time to zero at the next tick
    pub fn restart(&mut self) {
        self.restart_pending = true;
        if self.paused_at.is_some() {
            self.paused_at = Some(Duration::ZERO);
        }
    }
}
