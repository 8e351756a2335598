//! BOLT 1 ping/pong liveness.
//!
//! The session owns one [`PingPong`] collaborator and consults it from its
//! event loop: `deadline` bounds how long a read may block, `poll` fires the
//! periodic probe, and `on_pong` enforces the reply-size contract.

use std::time::{Duration, Instant};

use crate::bolt::{Ping, Pong};

/// A ping whose `num_pong_bytes` is at or above this value asks the peer not
/// to reply (BOLT 1).
pub const PONG_DECLINE_THRESHOLD: u16 = 65532;

/// What the liveness timer wants done at a given instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessCheck {
    /// Nothing due.
    Idle,
    /// Send this ping to the peer.
    SendPing(Ping),
    /// The outstanding ping went unanswered for too long.
    TimedOut,
}

/// A pong that violates the reply contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PongFault {
    /// No ping was outstanding.
    Unsolicited,
    /// The reply size does not match the outstanding ping's request.
    SizeMismatch { expected: usize, actual: usize },
}

/// Periodic liveness probing with at most one ping in flight.
pub struct PingPong {
    interval: Duration,
    timeout: Duration,
    /// `num_pong_bytes` of the in-flight ping, if any.
    outstanding: Option<u16>,
    sent_at: Option<Instant>,
    next_tick: Option<Instant>,
}

impl PingPong {
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            outstanding: None,
            sent_at: None,
            next_tick: None,
        }
    }

    /// Arms the timer; the first probe fires one interval from `now`.
    pub fn start(&mut self, now: Instant) {
        self.outstanding = None;
        self.sent_at = None;
        self.next_tick = Some(now + self.interval);
    }

    /// Disarms the timer and forgets any outstanding ping.
    pub fn stop(&mut self) {
        self.outstanding = None;
        self.sent_at = None;
        self.next_tick = None;
    }

    /// The next instant at which [`poll`](Self::poll) may act.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match (self.sent_at, self.next_tick) {
            (Some(sent), _) => Some(sent + self.timeout),
            (None, tick) => tick,
        }
    }

    /// Advances the timer: fires a probe when due, or reports a timeout when
    /// the outstanding ping has outlived its grace period.
    pub fn poll(&mut self, now: Instant) -> LivenessCheck {
        if let Some(sent) = self.sent_at {
            if now >= sent + self.timeout {
                return LivenessCheck::TimedOut;
            }
            return LivenessCheck::Idle;
        }

        match self.next_tick {
            Some(tick) if now >= tick => {
                let ping = Ping::new(1);
                self.record_sent(&ping, now);
                self.next_tick = Some(now + self.interval);
                LivenessCheck::SendPing(ping)
            }
            _ => LivenessCheck::Idle,
        }
    }

    /// Notes a ping handed to the transport.
    ///
    /// Pings at or above [`PONG_DECLINE_THRESHOLD`] decline a reply and do
    /// not arm the outstanding flag.
    pub fn record_sent(&mut self, ping: &Ping, now: Instant) {
        if ping.num_pong_bytes < PONG_DECLINE_THRESHOLD {
            self.outstanding = Some(ping.num_pong_bytes);
            self.sent_at = Some(now);
        }
    }

    /// Validates a received pong against the outstanding ping.
    ///
    /// # Errors
    ///
    /// Returns a fault if no ping is outstanding or the reply size differs
    /// from the requested `num_pong_bytes`.
    pub fn on_pong(&mut self, pong: &Pong) -> Result<(), PongFault> {
        self.sent_at = None;
        match self.outstanding.take() {
            None => Err(PongFault::Unsolicited),
            Some(expected) if pong.ignored.len() != usize::from(expected) => {
                Err(PongFault::SizeMismatch {
                    expected: usize::from(expected),
                    actual: pong.ignored.len(),
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// Builds the mandatory reply to a received ping, if one is due.
    ///
    /// Replies carry exactly `num_pong_bytes` zero bytes; pings at or above
    /// the decline threshold get no reply.
    #[must_use]
    pub fn answer(ping: &Ping) -> Option<Pong> {
        (ping.num_pong_bytes < PONG_DECLINE_THRESHOLD).then(|| Pong::respond_to(ping))
    }
}
