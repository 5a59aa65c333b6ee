//! # Call Frames
//!
//! The explicit stack a call chain unwinds through. Frames live in an arena
//! indexed by push order, so index `i` is always the caller of `i + 1` and the
//! innermost frame is the last element. The native Rust call stack is never
//! consulted for ordering.

use crate::failure::Failure;
use crate::handler::{CleanupAction, Handler};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of frames on one chain (prevents runaway recursion)
pub const MAX_CALL_DEPTH: usize = 256;

/// Identifier of a unit of work on a call chain.
///
/// `entry_order` is the chain-wide sequence number assigned at push time, so
/// two frames with the same name stay distinguishable in an origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallFrame {
    name: String,
    entry_order: u64,
}

impl CallFrame {
    pub fn new(name: impl Into<String>, entry_order: u64) -> Self {
        Self {
            name: name.into(),
            entry_order,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_order(&self) -> u64 {
        self.entry_order
    }
}

impl fmt::Display for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.entry_order)
    }
}

/// Lifecycle of an active frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameState {
    Running,
    Returning,
    Propagating,
    /// A matching handler is running on behalf of the frame
    Handling,
}

/// A frame on the active stack with everything scoped to it
pub(crate) struct FrameRecord {
    pub(crate) frame: CallFrame,
    pub(crate) state: FrameState,
    pub(crate) cleanups: Vec<CleanupAction>,
    pub(crate) handlers: Vec<Handler>,
    /// Cleanups registered so far, used to label anonymous ones
    pub(crate) cleanup_count: usize,
    /// Failures delivered by callees, not yet settled against this frame
    pub(crate) pending: Vec<Failure>,
}

impl FrameRecord {
    fn new(frame: CallFrame) -> Self {
        Self {
            frame,
            state: FrameState::Running,
            cleanups: Vec::new(),
            handlers: Vec::new(),
            cleanup_count: 0,
            pending: Vec::new(),
        }
    }
}

/// Arena of active frames, owned by exactly one call chain
pub(crate) struct FrameStack {
    records: Vec<FrameRecord>,
    next_entry: u64,
    max_depth: usize,
}

impl FrameStack {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            records: Vec::with_capacity(16),
            next_entry: 0,
            max_depth,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.records.len() >= self.max_depth
    }

    /// Push a new running frame, returning its arena index.
    ///
    /// Callers check `is_full` first; the depth limit is a modeled failure,
    /// not a library error.
    pub(crate) fn push(&mut self, name: impl Into<String>) -> usize {
        let frame = CallFrame::new(name, self.next_entry);
        self.next_entry += 1;
        self.records.push(FrameRecord::new(frame));
        self.records.len() - 1
    }

    /// Pop the innermost frame, which must be `index`
    pub(crate) fn pop(&mut self, index: usize) -> Option<FrameRecord> {
        debug_assert_eq!(index + 1, self.records.len(), "only the innermost frame pops");
        self.records.pop()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&FrameRecord> {
        self.records.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut FrameRecord> {
        self.records.get_mut(index)
    }

    /// Frame identifiers, innermost first
    pub(crate) fn origin(&self) -> Vec<CallFrame> {
        self.records.iter().rev().map(|r| r.frame.clone()).collect()
    }
}

/// Render an origin sequence as `inner <- outer` for log lines
pub fn render_origin(origin: &[CallFrame]) -> String {
    origin
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(" <- ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_order() {
        let mut stack = FrameStack::new(MAX_CALL_DEPTH);
        let outer = stack.push("F1");
        let inner = stack.push("F2");

        assert_eq!((outer, inner), (0, 1));
        assert_eq!(stack.len(), 2);
        let origin: Vec<_> = stack.origin().iter().map(|f| f.to_string()).collect();
        assert_eq!(origin, vec!["F2#1", "F1#0"]);

        let popped = stack.pop(inner).unwrap();
        assert_eq!(popped.frame.name(), "F2");
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_entry_order_is_monotonic() {
        let mut stack = FrameStack::new(MAX_CALL_DEPTH);
        let a = stack.push("work");
        stack.pop(a);
        let b = stack.push("work");

        assert_eq!(a, b);
        assert_eq!(stack.get(b).unwrap().frame.entry_order(), 1);
    }

    #[test]
    fn test_is_full() {
        let mut stack = FrameStack::new(2);
        stack.push("a");
        assert!(!stack.is_full());
        stack.push("b");
        assert!(stack.is_full());
    }

    #[test]
    fn test_new_frame_is_running() {
        let mut stack = FrameStack::new(4);
        let index = stack.push("F1");
        let record = stack.get_mut(index).unwrap();
        assert_eq!(record.state, FrameState::Running);
        assert!(record.cleanups.is_empty());
        assert!(record.handlers.is_empty());
    }

    #[test]
    fn test_render_origin() {
        let origin = vec![CallFrame::new("F2", 1), CallFrame::new("F1", 0)];
        assert_eq!(render_origin(&origin), "F2#1 <- F1#0");
    }
}
