//! Per-run conversation log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Sent,
    Received,
    Failure,
    Scenario,
}

impl EventKind {
    fn as_str(&self) -> &'static str {
        match self {
            EventKind::Sent => "sent",
            EventKind::Received => "received",
            EventKind::Failure => "failure",
            EventKind::Scenario => "scenario",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub at: DateTime<Utc>,
    pub kind: EventKind,
    pub text: String,
}

/// Ordered record of what was sent and received during one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationLog {
    events: Vec<LogEvent>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: EventKind, text: impl Into<String>) {
        self.events.push(LogEvent {
            at: Utc::now(),
            kind,
            text: text.into(),
        });
    }

    pub fn sent(&mut self, text: impl Into<String>) {
        self.record(EventKind::Sent, text);
    }

    pub fn received(&mut self, text: impl Into<String>) {
        self.record(EventKind::Received, text);
    }

    pub fn failure(&mut self, text: impl Into<String>) {
        self.record(EventKind::Failure, text);
    }

    pub fn scenario(&mut self, text: impl Into<String>) {
        self.record(EventKind::Scenario, text);
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    /// Texts of the events of one kind, in order
    pub fn texts(&self, kind: EventKind) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.text.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl fmt::Display for ConversationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in &self.events {
            let marker = match event.kind {
                EventKind::Sent => "→",
                EventKind::Received => "←",
                EventKind::Failure => "✗",
                EventKind::Scenario => "#",
            };
            writeln!(
                f,
                "{} {} {}",
                event.at.format("%H:%M:%S%.3f"),
                marker,
                event.text
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_keeps_order_and_kinds() {
        let mut log = ConversationLog::new();
        log.scenario("create_crop");
        log.sent("crear cultivo");
        log.received("Nombre del cultivo.");
        log.failure("no response");

        assert_eq!(log.len(), 4);
        assert_eq!(log.texts(EventKind::Sent), vec!["crear cultivo"]);
        assert_eq!(log.events()[2].kind, EventKind::Received);

        let rendered = log.to_string();
        assert_eq!(rendered.lines().count(), 4);
        assert!(rendered.contains("→ crear cultivo"));
    }

    #[test]
    fn test_log_serializes_as_event_list() {
        let mut log = ConversationLog::new();
        log.sent("hola");

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json[0]["kind"], "sent");
        assert_eq!(json[0]["text"], "hola");
    }
}
