//! Status events reported while scripts run

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

/// Kind of status update, with its numeric wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    TestStart,
    TestEnd,
    CaseStart,
    CaseEnd,
    #[serde(rename = "KW_LINE_START")]
    LineStart,
    #[serde(rename = "KW_LINE_END")]
    LineEnd,
    Error,
}

impl StatusKind {
    pub fn code(&self) -> u16 {
        match self {
            Self::TestStart => 1,
            Self::TestEnd => 2,
            Self::CaseStart => 101,
            Self::CaseEnd => 102,
            Self::LineStart => 201,
            Self::LineEnd => 202,
            Self::Error => 500,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::TestStart => "TEST_START",
            Self::TestEnd => "TEST_END",
            Self::CaseStart => "CASE_START",
            Self::CaseEnd => "CASE_END",
            Self::LineStart => "KW_LINE_START",
            Self::LineEnd => "KW_LINE_END",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One status update
#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub kind: StatusKind,
    pub device_id: String,
    pub case_id: u64,
    /// 0 for events not tied to a line
    pub line_number: usize,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(kind: StatusKind, device_id: impl Into<String>, case_id: u64) -> Self {
        Self {
            kind,
            device_id: device_id.into(),
            case_id,
            line_number: 0,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn at_line(mut self, line_number: usize) -> Self {
        self.line_number = line_number;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == StatusKind::Error
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} case_id={} line_number={} message: {}",
            self.kind,
            self.case_id,
            self.line_number,
            self.message.as_deref().unwrap_or("")
        )
    }
}

/// Receives status updates. Called inline from the executing task, so
/// implementations must not block.
pub trait StatusListener: Send + Sync {
    fn update(&self, event: StatusEvent);
}

impl StatusListener for mpsc::UnboundedSender<StatusEvent> {
    fn update(&self, event: StatusEvent) {
        // Receiver gone means nobody is watching any more.
        let _ = self.send(event);
    }
}

/// Listener that keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<StatusEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<StatusKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    pub fn errors(&self) -> Vec<StatusEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.is_error())
            .cloned()
            .collect()
    }
}

impl StatusListener for EventLog {
    fn update(&self, event: StatusEvent) {
        self.events.lock().push(event);
    }
}
