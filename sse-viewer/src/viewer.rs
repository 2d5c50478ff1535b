use anyhow::Result;
use colored::*;
use eventsource_client::{self as es, Client};
use futures_util::stream::StreamExt;
use log::*;
use serde_json::Value;
use std::time::Duration;

use crate::backoff::Backoff;

/// How a single connection attempt ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Disconnect {
    /// Nothing (not even a heartbeat) arrived within the watchdog window.
    Stalled,
    /// The server closed the stream.
    Ended,
    /// Connecting or reading failed.
    Failed(String),
}

pub struct Viewer {
    events_url: String,
    highest_seen: Option<u64>,
    watchdog: Duration,
    backoff: Backoff,
}

impl Viewer {
    pub fn new(
        base_url: &str,
        last_event_id: Option<u64>,
        watchdog: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            events_url: format!("{}/api/events", base_url.trim_end_matches('/')),
            highest_seen: last_event_id,
            watchdog,
            backoff: Backoff::new(max_backoff),
        }
    }

    /// Connect, print events, reconnect with backoff. Runs until cancelled.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let reason = self.connect_once().await?;
            let delay = self.backoff.next_delay();
            match &reason {
                Disconnect::Stalled => println!(
                    "{} No data for {:?}, reconnecting in {:?}",
                    "!".yellow(),
                    self.watchdog,
                    delay
                ),
                Disconnect::Ended => {
                    println!("{} Stream closed, reconnecting in {:?}", "→".blue(), delay)
                }
                Disconnect::Failed(e) => {
                    println!("{} {e}, reconnecting in {:?}", "✗".red(), delay)
                }
            }
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_once(&mut self) -> Result<Disconnect> {
        let mut builder = es::ClientBuilder::for_url(&self.events_url)?
            .reconnect(es::ReconnectOptions::reconnect(false).build());
        if let Some(id) = self.highest_seen {
            builder = builder.header("Last-Event-ID", &id.to_string())?;
        }
        let client = builder.build();

        info!(
            "Connecting to {} (last event id: {:?})",
            self.events_url, self.highest_seen
        );
        let mut stream = client.stream();
        let mut opened = false;

        loop {
            let item = match tokio::time::timeout(self.watchdog, stream.next()).await {
                Ok(item) => item,
                Err(_) => return Ok(Disconnect::Stalled),
            };

            match item {
                Some(Ok(es::SSE::Event(event))) => {
                    if !opened {
                        opened = true;
                        self.backoff.reset();
                    }
                    self.on_event(event);
                }
                Some(Ok(es::SSE::Comment(comment))) => {
                    if !opened {
                        opened = true;
                        self.backoff.reset();
                    }
                    debug!("comment: {}", comment.trim());
                }
                Some(Err(e)) => return Ok(Disconnect::Failed(format!("{e:?}"))),
                None => return Ok(Disconnect::Ended),
            }
        }
    }

    fn on_event(&mut self, event: es::Event) {
        let id = event.id.as_deref().and_then(|id| id.trim().parse::<u64>().ok());

        if event.event_type == "connected" {
            self.on_connected(id.unwrap_or(0));
        } else if let Some(line) = self.on_record(id, &event.data) {
            println!("{line}");
        }
    }

    fn on_connected(&mut self, resumed_after: u64) {
        let highest_seen = resume_from(self.highest_seen, resumed_after);
        if highest_seen != self.highest_seen {
            info!(
                "Server resumed after id {resumed_after}, below our last id {:?}; it restarted",
                self.highest_seen
            );
            self.highest_seen = highest_seen;
        }
        println!(
            "{} Connected (resuming after id {})",
            "✓".green(),
            resumed_after
        );
    }

    /// The line to print for a data frame, or `None` when it was already seen.
    fn on_record(&mut self, id: Option<u64>, data: &str) -> Option<String> {
        if !is_newer(self.highest_seen, id) {
            debug!("Skipping already seen event {:?}", id);
            return None;
        }
        if let Some(id) = id {
            self.highest_seen = Some(id);
        }

        let label = match id {
            Some(id) => format!("#{id}"),
            None => "snapshot".to_string(),
        };
        Some(format!("{} {}", label.bright_white().bold(), describe(data)))
    }
}

/// Records carry ids and are shown once; id-less frames (state snapshots) are
/// always shown.
pub fn is_newer(highest_seen: Option<u64>, id: Option<u64>) -> bool {
    match (highest_seen, id) {
        (_, None) => true,
        (None, Some(_)) => true,
        (Some(highest), Some(id)) => id > highest,
    }
}

/// Where to continue after the server's `connected` frame.
///
/// The server echoes the last-seen id it accepted. A lower value means it
/// restarted and numbers events from 1 again, so our old high-water mark would
/// hide every new event.
pub fn resume_from(highest_seen: Option<u64>, resumed_after: u64) -> Option<u64> {
    match highest_seen {
        Some(highest) if resumed_after < highest => (resumed_after > 0).then_some(resumed_after),
        other => other,
    }
}

/// One-line summary: the event type followed by its data.
pub fn describe(data: &str) -> String {
    match serde_json::from_str::<Value>(data) {
        Ok(value) => {
            let kind = value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let payload = value.get("data").cloned().unwrap_or(Value::Null);
            format!("{} {}", kind.cyan(), payload)
        }
        Err(_) => data.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_newer_records_are_shown() {
        assert!(is_newer(None, Some(1)));
        assert!(is_newer(Some(4), Some(5)));
        assert!(!is_newer(Some(5), Some(5)));
        assert!(!is_newer(Some(5), Some(3)));
    }

    #[test]
    fn snapshots_are_always_shown() {
        assert!(is_newer(Some(9), None));
        assert!(is_newer(None, None));
    }

    #[test]
    fn connected_frame_from_a_restarted_server_lowers_the_high_water_mark() {
        assert_eq!(resume_from(Some(150), 0), None);
        assert_eq!(resume_from(Some(150), 40), Some(40));
        assert_eq!(resume_from(Some(150), 150), Some(150));
        assert_eq!(resume_from(None, 0), None);
    }

    #[test]
    fn events_after_a_server_restart_are_shown() {
        colored::control::set_override(false);
        let mut viewer = Viewer::new(
            "http://localhost:4000",
            Some(150),
            Duration::from_secs(25),
            Duration::from_secs(30),
        );

        assert_eq!(viewer.on_record(Some(1), "{}"), None);

        viewer.on_connected(0);
        assert_eq!(viewer.highest_seen, None);

        let line = viewer.on_record(Some(1), r#"{"type":"display-change","data":{}}"#);
        assert_eq!(line.as_deref(), Some("#1 display-change {}"));
        assert_eq!(viewer.highest_seen, Some(1));
        assert_eq!(viewer.on_record(Some(1), "{}"), None);
    }

    #[test]
    fn describe_shows_type_and_data() {
        colored::control::set_override(false);
        let line = describe(
            r#"{"action":"broadcast","type":"display-change","data":{"displayId":"bracket"},"timestamp":1}"#,
        );
        assert_eq!(line, r#"display-change {"displayId":"bracket"}"#);
        assert_eq!(describe("plain text"), "plain text");
    }

    #[test]
    fn events_url_is_derived_from_the_base_url() {
        let viewer = Viewer::new(
            "http://localhost:4000/",
            Some(7),
            Duration::from_secs(25),
            Duration::from_secs(30),
        );
        assert_eq!(viewer.events_url, "http://localhost:4000/api/events");
        assert_eq!(viewer.highest_seen, Some(7));
    }
}
