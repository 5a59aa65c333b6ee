//! # Propagation Trace
//!
//! An append-only audit log of everything a call chain did. Every frame entry,
//! cleanup, handler decision and pop is recorded, so tests and operators can
//! see each step a failure took without depending on log output.

use crate::failure::{Failure, FailureId};
use crate::frame::{CallFrame, FrameState};
use serde::{Deserialize, Serialize};

/// One step of a call chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    /// A frame was pushed and started running
    Entered { frame: CallFrame },
    /// A frame moved to propagating a failure
    Propagating {
        frame: CallFrame,
        failure: FailureId,
        kind: String,
        message: String,
    },
    /// A cleanup action completed
    CleanupRan { frame: CallFrame, label: String },
    /// A cleanup action raised; `failure` is the failure it raised
    CleanupFailed {
        frame: CallFrame,
        label: String,
        failure: FailureId,
        kind: String,
    },
    /// A cleanup action was abandoned after an earlier one failed
    CleanupSkipped { frame: CallFrame, label: String },
    /// A handler accepted the failure; `handler` is its registration index
    Handled {
        frame: CallFrame,
        handler: usize,
        matcher: String,
        failure: FailureId,
    },
    /// A handler raised instead of recovering
    HandlerFailed {
        frame: CallFrame,
        handler: usize,
        failure: FailureId,
        kind: String,
    },
    /// A frame left the stack
    Popped { frame: CallFrame, state: FrameState },
    /// A failure reached the root of the chain
    Unhandled { failure: FailureId, kind: String },
}

impl TraceEvent {
    pub(crate) fn propagating(frame: &CallFrame, failure: &Failure) -> Self {
        TraceEvent::Propagating {
            frame: frame.clone(),
            failure: failure.id(),
            kind: failure.kind().name().to_string(),
            message: failure.message().to_string(),
        }
    }

    /// The frame the event happened in (None for `Unhandled`)
    pub fn frame(&self) -> Option<&CallFrame> {
        match self {
            TraceEvent::Entered { frame }
            | TraceEvent::Propagating { frame, .. }
            | TraceEvent::CleanupRan { frame, .. }
            | TraceEvent::CleanupFailed { frame, .. }
            | TraceEvent::CleanupSkipped { frame, .. }
            | TraceEvent::Handled { frame, .. }
            | TraceEvent::HandlerFailed { frame, .. }
            | TraceEvent::Popped { frame, .. } => Some(frame),
            TraceEvent::Unhandled { .. } => None,
        }
    }
}

/// Recorded events of one chain, oldest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    events: Vec<TraceEvent>,
    #[serde(skip)]
    disabled: bool,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// A trace that drops everything it is given
    pub fn disabled() -> Self {
        Self {
            events: Vec::new(),
            disabled: true,
        }
    }

    pub(crate) fn record(&mut self, event: TraceEvent) {
        if !self.disabled {
            self.events.push(event);
        }
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Labels of cleanups that completed in frames named `frame`, in run order
    pub fn cleanups_ran(&self, frame: &str) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::CleanupRan { frame: f, label } if f.name() == frame => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Names of frames that propagated a failure, in order
    pub fn propagated_through(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Propagating { frame, .. } => Some(frame.name()),
                _ => None,
            })
            .collect()
    }

    /// Compact one-line-per-event rendering
    pub fn render(&self) -> String {
        let mut out = String::new();
        for event in &self.events {
            let line = match event {
                TraceEvent::Entered { frame } => format!("enter    {}", frame),
                TraceEvent::Propagating { frame, kind, message, .. } => {
                    format!("raise    {} {}: {}", frame, kind, message)
                }
                TraceEvent::CleanupRan { frame, label } => format!("cleanup  {} {}", frame, label),
                TraceEvent::CleanupFailed { frame, label, kind, .. } => {
                    format!("cleanup! {} {} raised {}", frame, label, kind)
                }
                TraceEvent::CleanupSkipped { frame, label } => format!("skip     {} {}", frame, label),
                TraceEvent::Handled { frame, handler, matcher, .. } => {
                    format!("handle   {} handler[{}] {}", frame, handler, matcher)
                }
                TraceEvent::HandlerFailed { frame, handler, kind, .. } => {
                    format!("handle!  {} handler[{}] raised {}", frame, handler, kind)
                }
                TraceEvent::Popped { frame, state } => format!("pop      {} ({:?})", frame, state),
                TraceEvent::Unhandled { failure, kind } => format!("UNHANDLED {} {}", kind, failure),
            };
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(name: &str, order: u64) -> CallFrame {
        CallFrame::new(name, order)
    }

    #[test]
    fn test_disabled_trace_records_nothing() {
        let mut trace = Trace::disabled();
        trace.record(TraceEvent::Entered { frame: frame("F1", 0) });
        assert!(trace.is_empty());
    }

    #[test]
    fn test_cleanups_ran_filters_by_frame() {
        let mut trace = Trace::new();
        trace.record(TraceEvent::CleanupRan { frame: frame("F2", 1), label: "close".into() });
        trace.record(TraceEvent::CleanupRan { frame: frame("F1", 0), label: "unlock".into() });
        trace.record(TraceEvent::CleanupRan { frame: frame("F2", 1), label: "flush".into() });

        assert_eq!(trace.cleanups_ran("F2"), vec!["close", "flush"]);
        assert_eq!(trace.cleanups_ran("F1"), vec!["unlock"]);
        assert_eq!(trace.len(), 3);
    }

    #[test]
    fn test_serializes_tagged() {
        let event = TraceEvent::Popped { frame: frame("F1", 0), state: FrameState::Returning };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "popped");
        assert_eq!(json["state"], "returning");
        assert_eq!(json["frame"]["name"], "F1");
        assert_eq!(event.frame().map(|f| f.name()), Some("F1"));
    }

    #[test]
    fn test_render() {
        let mut trace = Trace::new();
        trace.record(TraceEvent::Entered { frame: frame("F1", 0) });
        trace.record(TraceEvent::Popped { frame: frame("F1", 0), state: FrameState::Returning });
        assert_eq!(trace.render(), "enter    F1#0\npop      F1#0 (Returning)\n");
    }
}
