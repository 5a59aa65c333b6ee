//! # faultline
//!
//! A failure taxonomy and a propagation engine for call chains.
//!
//! ## Core Concepts
//! - **Taxonomy**: Rooted hierarchy of failure kinds, each recoverable or fatal
//! - **Failure**: A kind plus message, context, origin frames and an optional cause
//! - **Call chain**: Frames with LIFO cleanups and ordered handlers
//! - **Trace**: Audit log of every cleanup, handler decision and pop
//! - **Scenario**: JSON-described call trees run through a real chain

pub mod taxonomy;
pub mod failure;
pub mod frame;
pub mod handler;
pub mod trace;
pub mod engine;
pub mod report;
pub mod scenario;
pub mod error;

pub use taxonomy::{Class, FailureKind, Taxonomy, MAX_KIND_DEPTH};
pub use failure::{Context, Failure, FailureId};
pub use frame::{CallFrame, FrameState, MAX_CALL_DEPTH};
pub use handler::Matcher;
pub use trace::{Trace, TraceEvent};
pub use engine::{CallChain, ChainConfig, Outcome, Scope};
pub use report::{FailureSummary, UnhandledFailure, UnhandledSummary};
pub use scenario::{Plan, Scenario, ScenarioOutcome, ScenarioReport};
pub use error::{Error, ErrorKind, Result};
