//! # Failures
//!
//! A `Failure` is one reported problem: a kind, a message, ordered diagnostic
//! context, the frames active when it was created, and optionally the failure
//! it was wrapped around.
//!
//! Failures are immutable. Wrapping builds a new failure whose `cause` is the
//! original; the original is shared, never edited. Identity is by construction:
//! two failures with identical text are different events, while clones of one
//! failure share its `FailureId`.

use crate::error::{self, Result};
use crate::frame::{render_origin, CallFrame};
use crate::taxonomy::FailureKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_FAILURE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identity of a constructed failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailureId(u64);

impl FailureId {
    fn next() -> Self {
        FailureId(NEXT_FAILURE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FailureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failure-{}", self.0)
    }
}

// =============================================================================
// Context
// =============================================================================

/// Ordered key/value diagnostics attached to a failure.
///
/// Keys keep the slot of their first insertion; writing an existing key
/// replaces its value in place (last write wins). Keys must be non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    entries: Vec<(String, String)>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from pairs in order, later duplicates overwriting earlier ones
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut context = Self::new();
        for (key, value) in pairs {
            context.insert(key, value)?;
        }
        Ok(context)
    }

    /// Insert or overwrite a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Option<String>> {
        let key = key.into();
        let value = value.into();
        if key.is_empty() {
            return Err(error::empty_context_key(value));
        }
        Ok(self.put(key, value))
    }

    /// Chainable `insert`
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Insert a key already known to be non-empty
    pub(crate) fn put(&mut self, key: String, value: String) -> Option<String> {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Apply `other` on top of `self`; `other` wins on key collisions
    pub fn overlay(&mut self, other: &Context) {
        for (key, value) in &other.entries {
            self.put(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// =============================================================================
// Failure
// =============================================================================

struct FailureInner {
    id: FailureId,
    kind: FailureKind,
    message: String,
    cause: Option<Failure>,
    context: Context,
    origin: Vec<CallFrame>,
    suppressed: Vec<Failure>,
}

/// An instance of a reported problem.
///
/// Deliberately not `PartialEq`: compare identities with [`Failure::is`] or
/// [`Failure::id`].
#[derive(Clone)]
pub struct Failure {
    inner: Arc<FailureInner>,
}

impl Failure {
    /// Create a fresh failure. `origin` lists frames innermost first.
    pub(crate) fn new(
        kind: FailureKind,
        message: impl Into<String>,
        context: Context,
        origin: Vec<CallFrame>,
    ) -> Self {
        Self::build(kind, message.into(), None, context, origin, Vec::new())
    }

    /// Create a failure caused by `cause`.
    ///
    /// The cause's context is inherited and `context` is laid over it, so the
    /// new failure wins on collisions. `cause` itself is left untouched.
    pub(crate) fn wrap(
        cause: &Failure,
        kind: FailureKind,
        message: impl Into<String>,
        context: &Context,
        origin: Vec<CallFrame>,
    ) -> Self {
        let mut merged = cause.context().clone();
        merged.overlay(context);
        Self::build(kind, message.into(), Some(cause.clone()), merged, origin, Vec::new())
    }

    /// Copy of `self` under a new identity with an extra suppressed failure
    pub(crate) fn with_suppressed(self, suppressed: Failure) -> Self {
        let inner = &self.inner;
        let mut list = inner.suppressed.clone();
        list.push(suppressed);
        Self::build(
            inner.kind.clone(),
            inner.message.clone(),
            inner.cause.clone(),
            inner.context.clone(),
            inner.origin.clone(),
            list,
        )
    }

    fn build(
        kind: FailureKind,
        message: String,
        cause: Option<Failure>,
        context: Context,
        origin: Vec<CallFrame>,
        suppressed: Vec<Failure>,
    ) -> Self {
        Self {
            inner: Arc::new(FailureInner {
                id: FailureId::next(),
                kind,
                message,
                cause,
                context,
                origin,
                suppressed,
            }),
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn id(&self) -> FailureId {
        self.inner.id
    }

    pub fn kind(&self) -> &FailureKind {
        &self.inner.kind
    }

    pub fn message(&self) -> &str {
        &self.inner.message
    }

    pub fn cause(&self) -> Option<&Failure> {
        self.inner.cause.as_ref()
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// Frames active at creation, innermost first
    pub fn origin(&self) -> &[CallFrame] {
        &self.inner.origin
    }

    /// Frame names of the origin, innermost first
    pub fn origin_names(&self) -> Vec<&str> {
        self.inner.origin.iter().map(|f| f.name()).collect()
    }

    /// Failures raised alongside this one that are not part of its cause chain
    pub fn suppressed(&self) -> &[Failure] {
        &self.inner.suppressed
    }

    /// True if both handles refer to the same constructed failure
    pub fn is(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// This failure followed by its causes, outermost first
    pub fn chain(&self) -> impl Iterator<Item = &Failure> {
        std::iter::successors(Some(self), |f| f.cause())
    }

    /// The innermost cause (self if there is none)
    pub fn root_cause(&self) -> &Failure {
        self.chain().last().unwrap_or(self)
    }
}

// =============================================================================
// Display - compact, single-line format for logs
// =============================================================================

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        if let Some(frame) = self.origin().first() {
            write!(f, " at {}", frame)?;
        }

        if !self.context().is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message().is_empty() {
            write!(f, " => {}", self.message())?;
        }

        Ok(())
    }
}

// =============================================================================
// Debug - verbose, multi-line format for debugging
// =============================================================================

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.kind(), self.id())?;

        if !self.message().is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message())?;
        }

        if !self.origin().is_empty() {
            writeln!(f, "    Origin: {}", render_origin(self.origin()))?;
        }

        if !self.context().is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in self.context().iter() {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(cause) = self.cause() {
            writeln!(f)?;
            writeln!(f, "    Caused by: {}", cause)?;
        }

        Ok(())
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause().map(|c| c as &(dyn std::error::Error + 'static))
    }
}
