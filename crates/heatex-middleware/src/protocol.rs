//! Realtime push-message decoding.
//!
//! The only shape the dashboard interprets:
//!
//! ```json
//! { "type": "temperature_message",
//!   "data": { "temp1": 5.2, "temp2": 18.1, "temp3": 20.4, "temp4": 7.9 } }
//! ```
//!
//! Publishers sometimes send the envelope as a JSON *string* containing the
//! JSON above; such frames are decoded a second time.  Temperatures may be
//! numbers or numeric strings.  A message of any other `type` is
//! [`PushMessage::Other`]; a temperature message missing one of the four
//! values or with an unparsable value is a [`DashboardError::Protocol`],
//! never a partial reading.

use heatex_types::{DashboardError, Reading};
use serde_json::Value;

/// `type` tag of the temperature broadcast.
pub const TEMPERATURE_MESSAGE: &str = "temperature_message";

/// Outcome of decoding one inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    Temperature(Reading),
    /// Well-formed but of a kind the dashboard ignores; carries the `type`
    /// tag when present.
    Other(String),
}

/// Decode an inbound text frame.
///
/// # Errors
///
/// [`DashboardError::Protocol`] when the frame is not JSON or is a
/// temperature message with an invalid body.
pub fn parse_push_message(text: &str) -> Result<PushMessage, DashboardError> {
    let raw: Value = serde_json::from_str(text)
        .map_err(|e| DashboardError::Protocol(format!("not JSON: {e}")))?;
    let message = match raw {
        Value::String(inner) => serde_json::from_str::<Value>(&inner)
            .map_err(|e| DashboardError::Protocol(format!("inner payload not JSON: {e}")))?,
        other => other,
    };

    let kind = message.get("type").and_then(Value::as_str).unwrap_or_default();
    if kind != TEMPERATURE_MESSAGE {
        return Ok(PushMessage::Other(kind.to_string()));
    }
    let data = message
        .get("data")
        .filter(|d| d.is_object())
        .ok_or_else(|| DashboardError::Protocol("temperature message without data".to_string()))?;

    let mut temps = [0.0_f64; 4];
    for (slot, key) in temps.iter_mut().zip(["temp1", "temp2", "temp3", "temp4"]) {
        *slot = data
            .get(key)
            .and_then(temperature_value)
            .ok_or_else(|| DashboardError::Protocol(format!("missing or invalid {key}")))?;
    }
    let [t1, t2, t3, t4] = temps;
    Ok(PushMessage::Temperature(Reading::new(t1, t2, t3, t4)))
}

fn temperature_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_numeric_temperatures() {
        let text = json!({
            "type": "temperature_message",
            "data": { "temp1": 5.5, "temp2": 18, "temp3": 20.25, "temp4": 8.0 }
        })
        .to_string();
        assert_eq!(
            parse_push_message(&text),
            Ok(PushMessage::Temperature(Reading::new(5.5, 18.0, 20.25, 8.0)))
        );
    }

    #[test]
    fn parses_string_temperatures() {
        let text = r#"{"type":"temperature_message","data":{"temp1":"4.0","temp2":" 17.5","temp3":"21","temp4":"9"}}"#;
        assert_eq!(
            parse_push_message(text),
            Ok(PushMessage::Temperature(Reading::new(4.0, 17.5, 21.0, 9.0)))
        );
    }

    #[test]
    fn decodes_double_encoded_payload() {
        let inner = json!({
            "type": "temperature_message",
            "data": { "temp1": 1, "temp2": 2, "temp3": 3, "temp4": 4 }
        })
        .to_string();
        let outer = serde_json::to_string(&inner).unwrap();
        assert_eq!(
            parse_push_message(&outer),
            Ok(PushMessage::Temperature(Reading::new(1.0, 2.0, 3.0, 4.0)))
        );
    }

    #[test]
    fn other_types_are_ignored() {
        let text = r#"{"type":"system","event":"connected"}"#;
        assert_eq!(parse_push_message(text), Ok(PushMessage::Other("system".to_string())));
        assert_eq!(parse_push_message("[1,2,3]"), Ok(PushMessage::Other(String::new())));
    }

    #[test]
    fn missing_temperature_is_protocol_error() {
        let text = r#"{"type":"temperature_message","data":{"temp1":1,"temp2":2,"temp3":3}}"#;
        assert!(matches!(parse_push_message(text), Err(DashboardError::Protocol(m)) if m.contains("temp4")));
    }

    #[test]
    fn non_numeric_temperature_is_protocol_error() {
        let text = r#"{"type":"temperature_message","data":{"temp1":"warm","temp2":2,"temp3":3,"temp4":4}}"#;
        assert!(matches!(parse_push_message(text), Err(DashboardError::Protocol(_))));
    }

    #[test]
    fn temperature_message_without_data_is_protocol_error() {
        let text = r#"{"type":"temperature_message"}"#;
        assert_eq!(
            parse_push_message(text),
            Err(DashboardError::Protocol("temperature message without data".to_string()))
        );
    }

    #[test]
    fn garbage_is_protocol_error() {
        assert!(matches!(parse_push_message("not json"), Err(DashboardError::Protocol(_))));
        assert!(matches!(parse_push_message("\"{oops\""), Err(DashboardError::Protocol(_))));
    }
}
