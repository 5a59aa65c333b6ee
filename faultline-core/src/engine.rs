//! # Propagation Engine
//!
//! Runs host work as a chain of frames and unwinds failures through it.
//!
//! ## Frame lifecycle
//!
//! ```text
//! Running ──ok──▶ Returning ──cleanups──▶ Popped (value to caller)
//!    │
//!    └─err──▶ Propagating ──cleanups──▶ handlers ──match, ok──▶ Returning ──▶ Popped
//!                                          │
//!                                          ├─match, err──▶ Popped (new failure to caller)
//!                                          └─no match────▶ Popped (same failure to caller)
//! ```
//!
//! Cleanups for a frame always finish before its handlers are consulted, so a
//! handler never sees a frame with resources still held. A failure raised by a
//! handler is only matched against the caller's handlers, never retried in the
//! frame that raised it.
//!
//! A failure returned by [`Scope::call`] belongs to the calling frame whether
//! or not its body passes the `Err` along. Discarding it and returning `Ok`
//! still moves the frame to Propagating with that failure.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use faultline_core::{CallChain, Taxonomy};
//! use faultline_core::taxonomy::names;
//! use serde_json::json;
//!
//! let taxonomy = Arc::new(Taxonomy::standard());
//! let io = taxonomy.require(names::IO_FAILURE).unwrap();
//! let missing = taxonomy.require(names::FILE_NOT_FOUND).unwrap();
//!
//! let mut chain = CallChain::new(taxonomy);
//! let value = chain.run("load_config", |scope| {
//!     scope.catch(&io, |_, _failure| Ok(json!("defaults")));
//!     scope.call("read_file", |scope| {
//!         scope.defer(|_| Ok(()));
//!         Err(scope.raise(&missing, "app.toml not found"))
//!     })
//! });
//! assert_eq!(value.unwrap(), json!("defaults"));
//! ```

use crate::failure::{Context, Failure};
use crate::frame::{CallFrame, FrameStack, FrameState, MAX_CALL_DEPTH};
use crate::handler::{CleanupAction, Handler, Matcher};
use crate::report::UnhandledFailure;
use crate::taxonomy::{FailureKind, Taxonomy};
use crate::trace::{Trace, TraceEvent};
use serde_json::Value;
use std::sync::Arc;

/// What a unit of work produces: a value for the caller, or a failure
pub type Outcome = std::result::Result<Value, Failure>;

/// Per-chain settings
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Maximum number of simultaneously active frames
    pub max_depth: usize,
    /// Whether to keep an audit trace of every step
    pub record_trace: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_depth: MAX_CALL_DEPTH,
            record_trace: true,
        }
    }
}

/// One independent call chain.
///
/// A chain owns its frame stack outright; run one chain per request or
/// thread. Only the taxonomy is shared between chains.
pub struct CallChain {
    taxonomy: Arc<Taxonomy>,
    stack: FrameStack,
    trace: Trace,
    config: ChainConfig,
}

impl CallChain {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Self::with_config(taxonomy, ChainConfig::default())
    }

    pub fn with_config(taxonomy: Arc<Taxonomy>, config: ChainConfig) -> Self {
        let trace = if config.record_trace {
            Trace::new()
        } else {
            Trace::disabled()
        };
        Self {
            taxonomy,
            stack: FrameStack::new(config.max_depth),
            trace,
            config,
        }
    }

    pub fn taxonomy(&self) -> &Arc<Taxonomy> {
        &self.taxonomy
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Number of active frames
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Hand over the recorded trace, leaving an empty one behind
    pub fn take_trace(&mut self) -> Trace {
        let fresh = if self.config.record_trace {
            Trace::new()
        } else {
            Trace::disabled()
        };
        std::mem::replace(&mut self.trace, fresh)
    }

    /// Run `body` as the outermost frame of the chain.
    ///
    /// A failure that nothing handles escalates to the caller of `run` as an
    /// [`UnhandledFailure`] carrying the full cause and origin chains.
    pub fn run<F>(&mut self, name: &str, body: F) -> Result<Value, UnhandledFailure>
    where
        F: FnOnce(&mut Scope<'_>) -> Outcome,
    {
        debug_assert_eq!(self.stack.len(), 0, "run starts an empty chain");
        match self.invoke(name, body) {
            Ok(value) => Ok(value),
            Err(failure) => {
                let class = self.taxonomy.classify(failure.kind());
                self.trace.record(TraceEvent::Unhandled {
                    failure: failure.id(),
                    kind: failure.kind().name().to_string(),
                });
                let unhandled = UnhandledFailure::new(failure, class);
                tracing::error!("{}", unhandled.report());
                Err(unhandled)
            }
        }
    }

    // =========================================================================
    // Frame lifecycle
    // =========================================================================

    /// Run `body` as a new frame and hand its outcome to the caller.
    ///
    /// A failure is also recorded as pending on the calling frame, so the
    /// caller propagates it even if its body drops the `Err`.
    fn invoke<F>(&mut self, name: &str, body: F) -> Outcome
    where
        F: FnOnce(&mut Scope<'_>) -> Outcome,
    {
        let outcome = self.enter(name, body);
        if let Err(failure) = &outcome {
            let caller = self.stack.len().checked_sub(1);
            if let Some(record) = caller.and_then(|index| self.stack.get_mut(index)) {
                record.pending.push(failure.clone());
            }
        }
        outcome
    }

    fn enter<F>(&mut self, name: &str, body: F) -> Outcome
    where
        F: FnOnce(&mut Scope<'_>) -> Outcome,
    {
        if self.stack.is_full() {
            let max = self.config.max_depth;
            let mut context = Context::new();
            context.put("frame".to_string(), name.to_string());
            context.put("max_depth".to_string(), max.to_string());
            let kind = self.taxonomy.call_depth_exceeded().clone();
            return Err(Failure::new(
                kind,
                format!("call depth exceeded max {}", max),
                context,
                self.stack.origin(),
            ));
        }

        let index = self.stack.push(name);
        let frame = self.frame_at(index);
        tracing::debug!(frame = %frame, "enter");
        self.trace.record(TraceEvent::Entered { frame });

        let result = body(&mut Scope { chain: self, index });
        self.complete(index, result)
    }

    fn complete(&mut self, index: usize, result: Outcome) -> Outcome {
        match self.settle(index, result) {
            Ok(value) => {
                self.set_state(index, FrameState::Returning);
                if let Some(failure) = self.run_cleanups(index, None) {
                    return self.dispatch(index, failure);
                }
                self.pop(index);
                Ok(value)
            }
            Err(failure) => {
                self.set_state(index, FrameState::Propagating);
                let frame = self.frame_at(index);
                tracing::debug!(frame = %frame, failure = %failure, "propagating");
                self.trace.record(TraceEvent::propagating(&frame, &failure));

                let failure = self.run_cleanups(index, Some(&failure)).unwrap_or(failure);
                self.dispatch(index, failure)
            }
        }
    }

    /// Offer a propagating failure to the frame's handlers, first match wins
    fn dispatch(&mut self, index: usize, failure: Failure) -> Outcome {
        let handlers = match self.stack.get_mut(index) {
            Some(record) => std::mem::take(&mut record.handlers),
            None => Vec::new(),
        };
        let taxonomy = Arc::clone(&self.taxonomy);
        let found = handlers
            .into_iter()
            .enumerate()
            .find(|(_, h)| h.matcher.accepts(&taxonomy, failure.kind()));

        let Some((position, Handler { matcher, action })) = found else {
            let frame = self.frame_at(index);
            tracing::warn!(frame = %frame, failure = %failure, "failure crossed frame unhandled");
            self.pop(index);
            return Err(failure);
        };

        let frame = self.frame_at(index);
        self.trace.record(TraceEvent::Handled {
            frame: frame.clone(),
            handler: position,
            matcher: matcher.to_string(),
            failure: failure.id(),
        });
        self.set_state(index, FrameState::Handling);

        let result = action(&mut Scope { chain: self, index }, failure);
        match self.settle(index, result) {
            Ok(value) => {
                self.set_state(index, FrameState::Returning);
                if let Some(failure) = self.run_cleanups(index, None) {
                    self.pop(index);
                    return Err(failure);
                }
                tracing::info!(frame = %frame, handler = position, "failure handled");
                self.pop(index);
                Ok(value)
            }
            Err(raised) => {
                tracing::debug!(frame = %frame, handler = position, failure = %raised, "handler raised");
                self.trace.record(TraceEvent::HandlerFailed {
                    frame: frame.clone(),
                    handler: position,
                    failure: raised.id(),
                    kind: raised.kind().name().to_string(),
                });
                self.set_state(index, FrameState::Propagating);
                self.trace.record(TraceEvent::propagating(&frame, &raised));

                let raised = self.run_cleanups(index, Some(&raised)).unwrap_or(raised);
                self.pop(index);
                Err(raised)
            }
        }
    }

    /// Run the frame's pending cleanups, most recently registered first.
    ///
    /// Returns the replacement failure if a cleanup raised; the remaining
    /// cleanups of the frame are then abandoned.
    fn run_cleanups(&mut self, index: usize, in_flight: Option<&Failure>) -> Option<Failure> {
        loop {
            let cleanup = self.stack.get_mut(index)?.cleanups.pop()?;
            let CleanupAction { label, action } = cleanup;
            let frame = self.frame_at(index);

            let result = action(&mut Scope { chain: self, index });
            match self.settle(index, result) {
                Ok(()) => {
                    tracing::debug!(frame = %frame, label = %label, "cleanup ran");
                    self.trace.record(TraceEvent::CleanupRan { frame, label });
                }
                Err(raised) => {
                    tracing::warn!(frame = %frame, label = %label, failure = %raised, "cleanup failed");
                    self.trace.record(TraceEvent::CleanupFailed {
                        frame: frame.clone(),
                        label: label.clone(),
                        failure: raised.id(),
                        kind: raised.kind().name().to_string(),
                    });

                    let skipped = match self.stack.get_mut(index) {
                        Some(record) => std::mem::take(&mut record.cleanups),
                        None => Vec::new(),
                    };
                    for abandoned in skipped.into_iter().rev() {
                        self.trace.record(TraceEvent::CleanupSkipped {
                            frame: frame.clone(),
                            label: abandoned.label,
                        });
                    }

                    let replacement = self.cleanup_failure(&label, raised, in_flight);
                    self.set_state(index, FrameState::Propagating);
                    self.trace.record(TraceEvent::propagating(&frame, &replacement));
                    return Some(replacement);
                }
            }
        }
    }

    /// Reconcile what a body, handler or cleanup returned with the failures
    /// its callees delivered.
    ///
    /// `Ok` with a pending failure becomes that failure. Pending failures not
    /// already carried by the returned one, through its cause chain or its
    /// suppressed list, are attached as suppressed.
    fn settle<T>(&mut self, index: usize, result: Result<T, Failure>) -> Result<T, Failure> {
        let pending = match self.stack.get_mut(index) {
            Some(record) => std::mem::take(&mut record.pending),
            None => return result,
        };
        let mut pending = pending.into_iter();

        let mut failure = match result {
            Ok(value) => match pending.next() {
                Some(first) => {
                    let frame = self.frame_at(index);
                    tracing::warn!(frame = %frame, failure = %first, "callee failure ignored by caller");
                    first
                }
                None => return Ok(value),
            },
            Err(failure) => failure,
        };

        for other in pending {
            let carried = failure.chain().any(|f| f.is(&other))
                || failure.suppressed().iter().any(|f| f.is(&other));
            if !carried {
                failure = failure.with_suppressed(other);
            }
        }
        Err(failure)
    }

    /// Build the `CleanupFailure` that replaces whatever was in flight.
    ///
    /// With a failure in flight, it becomes the cause and the cleanup's own
    /// failure is kept as suppressed. Otherwise the cleanup's failure is the
    /// cause.
    fn cleanup_failure(&self, label: &str, raised: Failure, in_flight: Option<&Failure>) -> Failure {
        let kind = self.taxonomy.cleanup_failure().clone();
        let mut context = Context::new();
        context.put("cleanup".to_string(), label.to_string());
        context.put("cleanup_kind".to_string(), raised.kind().name().to_string());
        context.put("cleanup_message".to_string(), raised.message().to_string());
        let origin = self.stack.origin();

        match in_flight {
            Some(original) => Failure::wrap(
                original,
                kind,
                format!("cleanup '{}' failed while unwinding {}", label, original.kind()),
                &context,
                origin,
            )
            .with_suppressed(raised),
            None => Failure::wrap(&raised, kind, format!("cleanup '{}' failed", label), &context, origin),
        }
    }

    fn pop(&mut self, index: usize) {
        if let Some(record) = self.stack.pop(index) {
            debug_assert!(record.cleanups.is_empty(), "frame popped with pending cleanups");
            tracing::debug!(frame = %record.frame, state = ?record.state, "pop");
            self.trace.record(TraceEvent::Popped {
                frame: record.frame,
                state: record.state,
            });
        }
    }

    fn set_state(&mut self, index: usize, state: FrameState) {
        if let Some(record) = self.stack.get_mut(index) {
            record.state = state;
        }
    }

    fn frame_at(&self, index: usize) -> CallFrame {
        self.stack
            .get(index)
            .map(|r| r.frame.clone())
            .unwrap_or_else(|| CallFrame::new("<popped>", u64::MAX))
    }
}

// =============================================================================
// Scope - the host's view of its own frame
// =============================================================================

/// Handle given to a frame's body, handlers and cleanups.
///
/// Registrations go to the scope's own frame. Nested work is started with
/// [`Scope::call`], which borrows the scope until the callee returns.
pub struct Scope<'c> {
    chain: &'c mut CallChain,
    index: usize,
}

impl Scope<'_> {
    /// The frame this scope belongs to
    pub fn frame(&self) -> CallFrame {
        self.chain.frame_at(self.index)
    }

    /// Active frames, innermost first
    pub fn frames(&self) -> Vec<CallFrame> {
        self.chain.stack.origin()
    }

    /// Current state of this scope's frame
    pub fn state(&self) -> Option<FrameState> {
        self.chain.stack.get(self.index).map(|r| r.state)
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.chain.taxonomy
    }

    /// Run `body` as a callee frame
    pub fn call<F>(&mut self, name: &str, body: F) -> Outcome
    where
        F: FnOnce(&mut Scope<'_>) -> Outcome,
    {
        self.chain.invoke(name, body)
    }

    /// Register a cleanup with a generated label
    pub fn defer<F>(&mut self, action: F)
    where
        F: FnOnce(&mut Scope<'_>) -> Result<(), Failure> + 'static,
    {
        let label = match self.chain.stack.get(self.index) {
            Some(record) => format!("cleanup#{}", record.cleanup_count),
            None => "cleanup".to_string(),
        };
        self.defer_named(label, action);
    }

    /// Register a labelled cleanup
    pub fn defer_named<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce(&mut Scope<'_>) -> Result<(), Failure> + 'static,
    {
        if let Some(record) = self.chain.stack.get_mut(self.index) {
            record.cleanup_count += 1;
            record.cleanups.push(CleanupAction {
                label: label.into(),
                action: Box::new(action),
            });
        }
    }

    /// Register a handler. Handlers are tried in registration order.
    pub fn on<F>(&mut self, matcher: Matcher, action: F)
    where
        F: FnOnce(&mut Scope<'_>, Failure) -> Outcome + 'static,
    {
        if let Some(record) = self.chain.stack.get_mut(self.index) {
            record.handlers.push(Handler {
                matcher,
                action: Box::new(action),
            });
        }
    }

    /// Handle `kind` and everything below it
    pub fn catch<F>(&mut self, kind: &FailureKind, action: F)
    where
        F: FnOnce(&mut Scope<'_>, Failure) -> Outcome + 'static,
    {
        self.on(Matcher::descendant(kind), action);
    }

    /// Handle exactly `kind`
    pub fn catch_exact<F>(&mut self, kind: &FailureKind, action: F)
    where
        F: FnOnce(&mut Scope<'_>, Failure) -> Outcome + 'static,
    {
        self.on(Matcher::exact(kind), action);
    }

    // =========================================================================
    // Failure construction
    // =========================================================================

    /// Create a failure whose origin is the current frame sequence
    pub fn new_failure(&self, kind: &FailureKind, message: impl Into<String>, context: Context) -> Failure {
        Failure::new(kind.clone(), message, context, self.chain.stack.origin())
    }

    /// Create a failure with no diagnostic context
    pub fn raise(&self, kind: &FailureKind, message: impl Into<String>) -> Failure {
        self.new_failure(kind, message, Context::new())
    }

    /// Re-classify `failure`, keeping it as the cause
    pub fn wrap(&self, failure: &Failure, kind: &FailureKind, message: impl Into<String>) -> Failure {
        self.wrap_with(failure, kind, message, &Context::new())
    }

    /// Re-classify `failure` and lay `context` over the inherited context
    pub fn wrap_with(
        &self,
        failure: &Failure,
        kind: &FailureKind,
        message: impl Into<String>,
        context: &Context,
    ) -> Failure {
        Failure::wrap(failure, kind.clone(), message, context, self.chain.stack.origin())
    }
}
