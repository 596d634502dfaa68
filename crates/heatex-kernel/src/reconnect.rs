//! [`ReconnectController`] – realtime channel lifecycle state machine.
//!
//! ```text
//!            connect()                 opened
//!   Idle ──────────────▶ Connecting ──────────▶ Open
//!    ▲                    │    ▲                 │
//!    │ normal close       │    │ retry due       │ abnormal close
//!    │◀───────────────────┤    │ (mode still     │ (budget left)
//!    │                    ▼    │  realtime)      ▼
//!    │                 AwaitingRetry ◀───────────┘
//!    │
//!    │ teardown() from any state         abnormal close, budget spent
//!    └──────────────────────────────────────────────────▶ Failed
//! ```
//!
//! The controller never sleeps or opens sockets.  It hands out a generation
//! number for every connection attempt; the runtime tags transport events and
//! retry timers with that number and the controller ignores anything that
//! does not match the current attempt.  That is what makes
//! [`teardown`][ReconnectController::teardown] final: a late `opened` or
//! `closed` from the discarded attempt changes nothing.

use std::time::Duration;

use heatex_types::ChannelState;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;

/// Close code used by a clean, intentional shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Why the channel closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed on purpose by either side.
    Normal,
    /// Dropped, errored, or closed with a non-normal code.  `None` when the
    /// transport failed before any close code was available.
    Abnormal(Option<u16>),
}

impl CloseReason {
    /// Classify a WebSocket close code.
    pub fn from_code(code: u16) -> Self {
        if code == NORMAL_CLOSURE {
            CloseReason::Normal
        } else {
            CloseReason::Abnormal(Some(code))
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            CloseReason::Normal => Some(NORMAL_CLOSURE),
            CloseReason::Abnormal(code) => *code,
        }
    }
}

/// What the runtime must do after a closure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloseOutcome {
    /// The event belonged to a discarded attempt.
    Stale,
    /// Normal closure; the controller is back in `Idle`.
    Disconnected,
    /// Schedule a retry after `delay`.  `attempt` is the 1-based number of
    /// the retry that will run.
    RetryScheduled { delay: Duration, attempt: u32 },
    /// Budget spent; the controller is in `Failed`.
    Exhausted,
}

/// What the runtime must do when a retry timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The timer belonged to a discarded attempt.
    Stale,
    /// The realtime mode was left while waiting; the controller is `Idle`.
    Abandoned,
    /// Open a new connection tagged with this generation.
    Reconnect(u64),
}

/// Owns the reconnect counters and the channel state.
#[derive(Debug)]
pub struct ReconnectController {
    policy: BackoffPolicy,
    state: ChannelState,
    attempt_count: u32,
    generation: u64,
    pending_retry: bool,
}

impl ReconnectController {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            state: ChannelState::Idle,
            attempt_count: 0,
            generation: 0,
            pending_retry: false,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    pub fn has_pending_retry(&self) -> bool {
        self.pending_retry
    }

    /// Generation of the current (or most recent) connection attempt.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// `true` when `generation` is the attempt the controller is tracking.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.state != ChannelState::Idle
    }

    /// Start a connection attempt.
    ///
    /// Allowed from `Idle` and `AwaitingRetry` (which abandons the pending
    /// retry).  Returns `None` when an attempt is already in flight or open,
    /// and from `Failed`, which only [`manual_reconnect`][Self::manual_reconnect]
    /// leaves.
    pub fn connect(&mut self) -> Option<u64> {
        match self.state {
            ChannelState::Idle | ChannelState::AwaitingRetry => Some(self.begin_attempt()),
            ChannelState::Connecting | ChannelState::Open => {
                debug!(state = %self.state, "connect ignored: attempt already active");
                None
            }
            ChannelState::Failed => {
                debug!("connect ignored: channel failed, manual reconnect required");
                None
            }
        }
    }

    /// Operator-requested reconnect: resets the budget and starts a fresh
    /// attempt from any state, discarding whatever was in flight.
    pub fn manual_reconnect(&mut self) -> u64 {
        info!(previous = %self.state, "manual reconnect");
        self.attempt_count = 0;
        self.begin_attempt()
    }

    /// The transport reports the channel is established.
    pub fn on_open(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state != ChannelState::Connecting {
            debug!(generation, current = self.generation, "stale open ignored");
            return false;
        }
        self.state = ChannelState::Open;
        self.attempt_count = 0;
        self.pending_retry = false;
        info!(generation, "realtime channel open");
        true
    }

    /// The transport reports the channel closed.
    pub fn on_closed(&mut self, generation: u64, reason: CloseReason) -> CloseOutcome {
        let active = matches!(self.state, ChannelState::Connecting | ChannelState::Open);
        if generation != self.generation || !active {
            debug!(generation, current = self.generation, "stale close ignored");
            return CloseOutcome::Stale;
        }

        match reason {
            CloseReason::Normal => {
                self.state = ChannelState::Idle;
                self.attempt_count = 0;
                self.pending_retry = false;
                info!(generation, "realtime channel closed normally");
                CloseOutcome::Disconnected
            }
            CloseReason::Abnormal(code) if self.policy.allows_retry(self.attempt_count) => {
                let delay = self.policy.delay_for(self.attempt_count);
                self.attempt_count += 1;
                self.state = ChannelState::AwaitingRetry;
                self.pending_retry = true;
                warn!(
                    generation,
                    code = ?code,
                    attempt = self.attempt_count,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "realtime channel lost, retry scheduled"
                );
                CloseOutcome::RetryScheduled {
                    delay,
                    attempt: self.attempt_count,
                }
            }
            CloseReason::Abnormal(code) => {
                self.state = ChannelState::Failed;
                self.pending_retry = false;
                warn!(
                    generation,
                    code = ?code,
                    attempts = self.attempt_count,
                    "realtime channel failed: max reconnect attempts reached"
                );
                CloseOutcome::Exhausted
            }
        }
    }

    /// Negotiation failed, whether the service was unreachable or
    /// misconfigured.  Goes straight to `Failed` without touching the
    /// attempt budget.
    pub fn on_negotiation_rejected(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.state != ChannelState::Connecting {
            return false;
        }
        self.state = ChannelState::Failed;
        self.pending_retry = false;
        warn!(generation, "realtime channel negotiation rejected");
        true
    }

    /// The retry timer for `generation` fired.  `still_selected` is whether
    /// the realtime mode is active *now*.
    pub fn on_retry_due(&mut self, generation: u64, still_selected: bool) -> RetryDecision {
        if generation != self.generation || self.state != ChannelState::AwaitingRetry {
            return RetryDecision::Stale;
        }
        self.pending_retry = false;
        if !still_selected {
            self.state = ChannelState::Idle;
            self.attempt_count = 0;
            debug!(generation, "retry abandoned: realtime mode no longer selected");
            return RetryDecision::Abandoned;
        }
        RetryDecision::Reconnect(self.begin_attempt())
    }

    /// Return to `Idle` from any state.  Returns `true` if a retry was
    /// pending and must be cancelled by the caller.
    pub fn teardown(&mut self) -> bool {
        let had_pending = self.pending_retry;
        if self.state != ChannelState::Idle {
            debug!(previous = %self.state, "realtime channel torn down");
        }
        self.state = ChannelState::Idle;
        self.attempt_count = 0;
        self.pending_retry = false;
        // Invalidate every event still in flight for the old attempt.
        self.generation += 1;
        had_pending
    }

    fn begin_attempt(&mut self) -> u64 {
        self.generation += 1;
        self.state = ChannelState::Connecting;
        self.pending_retry = false;
        debug!(generation = self.generation, attempt = self.attempt_count, "connecting");
        self.generation
    }
}

impl Default for ReconnectController {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}
