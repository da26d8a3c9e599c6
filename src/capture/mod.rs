//! Captured execution events shared by both engines.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Log,
    Warning,
    Error,
    PlotRendered,
    AnimationFrameError,
}

impl EventKind {
    /// Kinds rendered as failures and fed to autofix.
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error | Self::AnimationFrameError)
    }
}

/// One observed occurrence during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub seq: u64,
    pub timestamp_ms: u64,
    pub kind: EventKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl CapturedEvent {
    /// Payload plus traceback, as handed to the error classifier and autofix.
    pub fn full_text(&self) -> String {
        match &self.traceback {
            Some(tb) if !tb.is_empty() => format!("{}\n{}", self.text, tb),
            _ => self.text.clone(),
        }
    }
}

/// Append-only event sequence for one execution.
///
/// Sequence ids keep increasing across `clear()`, so an event from an older run can never
/// be confused with one from the current run.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<CapturedEvent>,
    next_seq: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: EventKind, text: impl Into<String>) -> &CapturedEvent {
        self.push_with_traceback(kind, text, None)
    }

    pub fn push_with_traceback(
        &mut self,
        kind: EventKind,
        text: impl Into<String>,
        traceback: Option<String>,
    ) -> &CapturedEvent {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(CapturedEvent {
            seq,
            timestamp_ms: now_ms(),
            kind,
            text: text.into(),
            traceback,
        });
        &self.events[self.events.len() - 1]
    }

    pub fn log(&mut self, text: impl Into<String>) {
        self.push(EventKind::Log, text);
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        self.push(EventKind::Warning, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(EventKind::Error, text);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn events(&self) -> &[CapturedEvent] {
        &self.events
    }

    /// Events with a sequence id at or after `seq`.
    pub fn since(&self, seq: u64) -> &[CapturedEvent] {
        let start = self.events.partition_point(|e| e.seq < seq);
        &self.events[start..]
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn errors(&self) -> impl Iterator<Item = &CapturedEvent> {
        self.events.iter().filter(|e| e.kind.is_error())
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn last_error(&self) -> Option<&CapturedEvent> {
        self.events.iter().rev().find(|e| e.kind.is_error())
    }

    /// Every error-type event joined in arrival order, tracebacks included.
    pub fn error_context(&self) -> String {
        self.errors()
            .map(CapturedEvent::full_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
