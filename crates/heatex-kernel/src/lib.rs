//! `heatex-kernel` – Channel Lifecycle Regulation
//!
//! Owns the rules that govern the realtime channel.  Nothing in here touches
//! the network or a clock; the runtime feeds events in and carries out the
//! actions the kernel decides on.
//!
//! # Modules
//!
//! - [`backoff`] – [`BackoffPolicy`][backoff::BackoffPolicy]: exponential
//!   retry delays with a ceiling and a bounded attempt budget.
//! - [`reconnect`] – [`ReconnectController`][reconnect::ReconnectController]:
//!   the `Idle → Connecting → Open → AwaitingRetry → Failed` state machine.
//!   Every connection attempt is tagged with a generation number so events
//!   from a torn-down attempt are recognised and dropped.

pub mod backoff;
pub mod reconnect;

pub use backoff::BackoffPolicy;
pub use reconnect::{CloseOutcome, CloseReason, ReconnectController, RetryDecision};
