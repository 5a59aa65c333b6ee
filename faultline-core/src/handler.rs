//! # Handlers and Cleanup Actions
//!
//! Both are registered on the frame that is currently running and die with it.
//!
//! Handlers are tried in registration order and the first whose matcher
//! accepts the failure wins. Specificity is NOT considered: a broad handler
//! registered before a narrow one shadows it. Register the most specific
//! handlers first.

use crate::engine::{Outcome, Scope};
use crate::failure::Failure;
use crate::taxonomy::{FailureKind, Taxonomy};
use std::fmt;

pub(crate) type HandlerFn = Box<dyn FnOnce(&mut Scope<'_>, Failure) -> Outcome>;
pub(crate) type CleanupFn = Box<dyn FnOnce(&mut Scope<'_>) -> Result<(), Failure>>;

/// Which failure kinds a handler accepts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Matcher {
    /// Only this exact kind
    Exact(FailureKind),
    /// This kind or anything below it in the taxonomy
    KindOrDescendant(FailureKind),
}

impl Matcher {
    pub fn exact(kind: &FailureKind) -> Self {
        Matcher::Exact(kind.clone())
    }

    pub fn descendant(kind: &FailureKind) -> Self {
        Matcher::KindOrDescendant(kind.clone())
    }

    /// The kind this matcher was declared with
    pub fn kind(&self) -> &FailureKind {
        match self {
            Matcher::Exact(kind) | Matcher::KindOrDescendant(kind) => kind,
        }
    }

    pub fn accepts(&self, taxonomy: &Taxonomy, kind: &FailureKind) -> bool {
        match self {
            Matcher::Exact(expected) => expected == kind,
            Matcher::KindOrDescendant(ancestor) => taxonomy.is_a(kind, ancestor),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Exact(kind) => write!(f, "={}", kind),
            Matcher::KindOrDescendant(kind) => write!(f, "{}+", kind),
        }
    }
}

/// A matcher paired with the action to run on a match
pub(crate) struct Handler {
    pub(crate) matcher: Matcher,
    pub(crate) action: HandlerFn,
}

/// A deferred action run exactly once when its frame exits
pub(crate) struct CleanupAction {
    pub(crate) label: String,
    pub(crate) action: CleanupFn,
}
