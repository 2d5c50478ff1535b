//! SSE wire framing.
//!
//! Existing display pages parse these bytes directly, so the layout must not
//! drift:
//!
//! ```text
//! event: connected
//! id: 0
//! data: {"message":"SSE connected"}
//!
//! data: {"action":"broadcast","type":"display-change","data":{...},"timestamp":1700000000000}
//!
//! id: 7
//! data: {"action":"broadcast","type":"bracket-update","data":{...},"timestamp":1700000000123}
//!
//! : heartbeat
//!
//! ```

use crate::event::{Event, EventId};
use serde::Serialize;

const CONNECTED_DATA: &str = r#"{"message":"SSE connected"}"#;

/// Every record is tagged as a broadcast so viewers can tell it apart from
/// other message kinds they may share a handler with.
const RECORD_ACTION: &str = "broadcast";

#[derive(Serialize)]
struct WireRecord<'a, P> {
    action: &'static str,
    #[serde(flatten)]
    payload: &'a P,
    timestamp: i64,
}

fn record_json<P: Serialize>(payload: &P, timestamp: i64) -> serde_json::Result<String> {
    serde_json::to_string(&WireRecord {
        action: RECORD_ACTION,
        payload,
        timestamp,
    })
}

/// One unit written to a viewer's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// First frame of every session. `id` is the client's last-seen id, or 0.
    Connected { id: EventId },
    /// Out-of-band current state, deliberately without an `id:` line so it
    /// does not move the client's last-seen id.
    Snapshot { json: String },
    /// A sequenced bus event.
    Record { id: EventId, json: String },
    /// Keepalive comment.
    Heartbeat,
}

impl Frame {
    pub fn connected(last_seen: Option<EventId>) -> Self {
        Frame::Connected {
            id: last_seen.unwrap_or(0),
        }
    }

    pub fn snapshot<P: Serialize>(payload: &P, timestamp: i64) -> serde_json::Result<Self> {
        Ok(Frame::Snapshot {
            json: record_json(payload, timestamp)?,
        })
    }

    pub fn record<P: Serialize>(event: &Event<P>) -> serde_json::Result<Self> {
        Ok(Frame::Record {
            id: event.id(),
            json: record_json(event.payload(), event.timestamp())?,
        })
    }

    pub fn heartbeat() -> Self {
        Frame::Heartbeat
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Connected { .. } => "connected",
            Frame::Snapshot { .. } => "snapshot",
            Frame::Record { .. } => "record",
            Frame::Heartbeat => "heartbeat",
        }
    }

    /// The exact bytes to write, including the blank-line terminator.
    pub fn encode(&self) -> String {
        match self {
            Frame::Connected { id } => {
                format!("event: connected\nid: {id}\ndata: {CONNECTED_DATA}\n\n")
            }
            Frame::Snapshot { json } => format!("data: {json}\n\n"),
            Frame::Record { id, json } => format!("id: {id}\ndata: {json}\n\n"),
            Frame::Heartbeat => ": heartbeat\n\n".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::StateEvent;
    use serde_json::json;

    #[test]
    fn connected_frame_layout() {
        assert_eq!(
            Frame::connected(None).encode(),
            "event: connected\nid: 0\ndata: {\"message\":\"SSE connected\"}\n\n"
        );
        assert_eq!(
            Frame::connected(Some(41)).encode(),
            "event: connected\nid: 41\ndata: {\"message\":\"SSE connected\"}\n\n"
        );
    }

    #[test]
    fn heartbeat_is_a_comment_line() {
        assert_eq!(Frame::heartbeat().encode(), ": heartbeat\n\n");
    }

    #[test]
    fn record_frame_has_id_then_flattened_payload() {
        let event = Event::new(
            7,
            1_700_000_000_123,
            StateEvent::DisplayChange {
                display_id: "bracket".into(),
            },
        );
        let frame = Frame::record(&event).unwrap();
        assert_eq!(
            frame.encode(),
            "id: 7\ndata: {\"action\":\"broadcast\",\"type\":\"display-change\",\
             \"data\":{\"displayId\":\"bracket\"},\"timestamp\":1700000000123}\n\n"
        );
    }

    #[test]
    fn snapshot_frame_has_no_id_line() {
        let frame = Frame::snapshot(
            &StateEvent::BracketUpdate {
                bracket: json!({"rounds": []}),
            },
            5,
        )
        .unwrap();
        let encoded = frame.encode();
        assert!(encoded.starts_with("data: {"));
        assert!(!encoded.contains("id: "));
        assert!(encoded.ends_with("\n\n"));

        let body: serde_json::Value =
            serde_json::from_str(encoded.trim_start_matches("data: ").trim_end()).unwrap();
        assert_eq!(
            body,
            json!({
                "action": "broadcast",
                "type": "bracket-update",
                "data": {"bracket": {"rounds": []}},
                "timestamp": 5
            })
        );
    }

    #[test]
    fn multiline_payload_stays_on_one_data_line() {
        let event = Event::new(1, 0, StateEvent::CustomMessage(json!({"message": "a\nb"})));
        let encoded = Frame::record(&event).unwrap().encode();
        assert_eq!(encoded.matches('\n').count(), 3);
    }

    #[test]
    fn payload_that_is_not_an_object_fails_to_encode() {
        let event = Event::new(1, 0, 42u32);
        assert!(Frame::record(&event).is_err());
    }
}
