//! Visible status labels.
//!
//! | Mode / channel state | Label |
//! |---|---|
//! | Simulator | `Mode: Simulator Only` |
//! | Database | `Mode: Database (Simulator → DB → UI)` |
//! | Realtime, connecting | `Mode: Realtime Channel - Connecting...` |
//! | Realtime, open | `Mode: Realtime Channel - Connected` |
//! | Realtime, closed normally | `Mode: Realtime Channel - Disconnected` |
//! | Realtime, lost (1006) | `Mode: Realtime Channel - Connection Lost (attempting reconnect 2/5)` |
//! | Realtime, other close code | `Mode: Realtime Channel - Error (1011)` |
//! | Realtime, budget spent | `Mode: Realtime Channel - Connection Failed (max attempts reached)` |
//! | Realtime, negotiation failed | `Mode: Realtime Channel - Connection Failed: <reason>` |

use heatex_kernel::CloseReason;
use heatex_kernel::reconnect::ABNORMAL_CLOSURE;
use heatex_types::{ChannelState, DataSourceMode};

const REALTIME_PREFIX: &str = "Mode: Realtime Channel";

/// What the last channel event was, beyond the bare state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelDetail {
    pub last_close: Option<CloseReason>,
    /// Set when negotiation failed; holds the reason shown to the operator.
    pub failure: Option<String>,
}

/// Inputs the label depends on.
#[derive(Debug, Clone, Copy)]
pub struct StatusInputs<'a> {
    pub mode: DataSourceMode,
    pub state: ChannelState,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub detail: &'a ChannelDetail,
}

pub fn status_label(inputs: StatusInputs<'_>) -> String {
    match inputs.mode {
        DataSourceMode::Simulator => "Mode: Simulator Only".to_string(),
        DataSourceMode::DatabaseRoundTrip => "Mode: Database (Simulator → DB → UI)".to_string(),
        DataSourceMode::RealtimeChannel => {
            format!("{REALTIME_PREFIX} - {}", realtime_suffix(inputs))
        }
    }
}

fn realtime_suffix(inputs: StatusInputs<'_>) -> String {
    match inputs.state {
        ChannelState::Idle => "Disconnected".to_string(),
        ChannelState::Connecting => "Connecting...".to_string(),
        ChannelState::Open => "Connected".to_string(),
        ChannelState::AwaitingRetry => match inputs.detail.last_close {
            Some(CloseReason::Abnormal(Some(code))) if code != ABNORMAL_CLOSURE => {
                format!("Error ({code})")
            }
            _ => format!(
                "Connection Lost (attempting reconnect {}/{})",
                inputs.attempt_count, inputs.max_attempts
            ),
        },
        ChannelState::Failed => match &inputs.detail.failure {
            Some(reason) => format!("Connection Failed: {reason}"),
            None => "Connection Failed (max attempts reached)".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realtime(state: ChannelState, attempt_count: u32, detail: &ChannelDetail) -> String {
        status_label(StatusInputs {
            mode: DataSourceMode::RealtimeChannel,
            state,
            attempt_count,
            max_attempts: 5,
            detail,
        })
    }

    #[test]
    fn polled_modes_ignore_channel_state() {
        let detail = ChannelDetail::default();
        for state in [ChannelState::Idle, ChannelState::Failed] {
            let inputs = StatusInputs {
                mode: DataSourceMode::Simulator,
                state,
                attempt_count: 3,
                max_attempts: 5,
                detail: &detail,
            };
            assert_eq!(status_label(inputs), "Mode: Simulator Only");
            let inputs = StatusInputs {
                mode: DataSourceMode::DatabaseRoundTrip,
                ..inputs
            };
            assert_eq!(status_label(inputs), "Mode: Database (Simulator → DB → UI)");
        }
    }

    #[test]
    fn connecting_and_connected() {
        let detail = ChannelDetail::default();
        assert_eq!(
            realtime(ChannelState::Connecting, 0, &detail),
            "Mode: Realtime Channel - Connecting..."
        );
        assert_eq!(realtime(ChannelState::Open, 0, &detail), "Mode: Realtime Channel - Connected");
        assert_eq!(realtime(ChannelState::Idle, 0, &detail), "Mode: Realtime Channel - Disconnected");
    }

    #[test]
    fn abnormal_1006_reports_attempt() {
        let detail = ChannelDetail {
            last_close: Some(CloseReason::Abnormal(Some(1006))),
            failure: None,
        };
        assert_eq!(
            realtime(ChannelState::AwaitingRetry, 2, &detail),
            "Mode: Realtime Channel - Connection Lost (attempting reconnect 2/5)"
        );
    }

    #[test]
    fn transport_failure_without_code_reports_attempt() {
        let detail = ChannelDetail {
            last_close: Some(CloseReason::Abnormal(None)),
            failure: None,
        };
        assert!(realtime(ChannelState::AwaitingRetry, 1, &detail).contains("attempting reconnect 1/5"));
    }

    #[test]
    fn other_close_codes_are_reported() {
        let detail = ChannelDetail {
            last_close: Some(CloseReason::Abnormal(Some(1011))),
            failure: None,
        };
        assert_eq!(
            realtime(ChannelState::AwaitingRetry, 1, &detail),
            "Mode: Realtime Channel - Error (1011)"
        );
    }

    #[test]
    fn failure_labels() {
        let exhausted = ChannelDetail::default();
        assert_eq!(
            realtime(ChannelState::Failed, 5, &exhausted),
            "Mode: Realtime Channel - Connection Failed (max attempts reached)"
        );
        let rejected = ChannelDetail {
            last_close: None,
            failure: Some("hub name not configured".into()),
        };
        assert_eq!(
            realtime(ChannelState::Failed, 0, &rejected),
            "Mode: Realtime Channel - Connection Failed: hub name not configured"
        );
    }
}
