//! # Scenarios
//!
//! A JSON description of a call tree, run through a real [`CallChain`].
//! Each frame is a list of steps executed in order:
//!
//! - `defer`: register a cleanup (optionally one that raises)
//! - `catch`: register a handler with an action
//! - `call`: run a nested frame
//! - `raise`: fail the frame
//! - `return`: finish the frame with a value
//!
//! ```json
//! {
//!   "name": "config-fallback",
//!   "kinds": [{ "name": "ConfigMissing", "parent": "FileNotFound" }],
//!   "frame": {
//!     "name": "F1",
//!     "steps": [
//!       { "op": "catch", "kind": "IOFailure", "then": { "action": "recover", "value": "defaults" } },
//!       { "op": "call", "name": "F2", "steps": [
//!           { "op": "defer", "label": "close" },
//!           { "op": "raise", "kind": "ConfigMissing", "message": "app.toml" }
//!       ] }
//!     ]
//!   }
//! }
//! ```
//!
//! Scenarios are compiled against a taxonomy before they run, so a typo in a
//! kind name is reported up front instead of surfacing mid-chain.

use crate::engine::{CallChain, ChainConfig, Outcome, Scope};
use crate::error::{self, Error, Result};
use crate::failure::{Context, Failure};
use crate::handler::Matcher;
use crate::report::UnhandledSummary;
use crate::taxonomy::{Class, FailureKind, Taxonomy};
use crate::trace::Trace;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// Document model
// =============================================================================

/// A scenario document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Kinds to register before running, parents first
    #[serde(default)]
    pub kinds: Vec<KindDecl>,
    /// The outermost frame
    pub frame: FrameSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindDecl {
    pub name: String,
    /// Parent kind name; absent means directly under the root
    #[serde(default)]
    pub parent: Option<String>,
    /// Explicit class; absent means inherited
    #[serde(default)]
    pub class: Option<Class>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSpec {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Defer {
        label: String,
        /// Failure the cleanup raises when it runs
        #[serde(default)]
        raise: Option<RaiseSpec>,
    },
    Catch {
        kind: String,
        /// Match only this exact kind instead of the kind and its descendants
        #[serde(default)]
        exact: bool,
        then: HandlerAction,
    },
    Call(FrameSpec),
    Raise(RaiseSpec),
    Return {
        #[serde(default)]
        value: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaiseSpec {
    pub kind: String,
    #[serde(default)]
    pub message: String,
    /// Ordered pairs; a repeated key overwrites the earlier value
    #[serde(default)]
    pub context: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HandlerAction {
    /// Stop propagation and return `value` from the frame
    Recover {
        #[serde(default)]
        value: Value,
    },
    /// Propagate the same failure to the caller
    Rethrow,
    /// Propagate a brand-new failure to the caller
    Raise(RaiseSpec),
    /// Propagate a new failure caused by the handled one
    Wrap {
        kind: String,
        #[serde(default)]
        message: String,
    },
}

impl Scenario {
    /// Parse a scenario from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(error::serialization_error)
    }

    /// Load a scenario from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| error::io_error(path, e))?;
        Self::from_json(&text).map_err(|e| e.with_context("path", path.display().to_string()))
    }

    /// Register the declared kinds.
    ///
    /// A declaration identical to an already registered kind is a no-op, so
    /// several scenarios may declare the same kind. A conflicting declaration
    /// fails with `DuplicateKind`. Each registration is atomic; declarations
    /// before a failing one stay registered.
    pub fn install(&self, taxonomy: &Taxonomy) -> Result<()> {
        for decl in &self.kinds {
            if let Some(existing) = taxonomy.lookup(&decl.name) {
                if declaration_matches(taxonomy, &existing, decl) {
                    continue;
                }
                return Err(error::duplicate_kind(&decl.name)
                    .with_operation("scenario::install")
                    .with_context("scenario", self.name.clone()));
            }

            let parent = match &decl.parent {
                Some(name) => Some(
                    taxonomy
                        .lookup(name)
                        .ok_or_else(|| error::unknown_parent(&decl.name, name))?,
                ),
                None => None,
            };
            match decl.class {
                Some(class) => taxonomy.register_classified(&decl.name, parent.as_ref(), class)?,
                None => taxonomy.register(&decl.name, parent.as_ref())?,
            };
        }
        Ok(())
    }

    /// Resolve every kind name and validate the frame tree
    pub fn compile(&self, taxonomy: &Taxonomy) -> Result<Plan> {
        let frame = compile_frame(&self.frame, taxonomy)
            .map_err(|e| e.with_context("scenario", self.name.clone()))?;
        Ok(Plan {
            name: self.name.clone(),
            frame,
        })
    }

    /// Install, compile and run on a fresh chain
    pub fn run(&self, taxonomy: Arc<Taxonomy>) -> Result<ScenarioReport> {
        self.install(&taxonomy)?;
        let plan = self.compile(&taxonomy)?;
        Ok(plan.run(taxonomy, ChainConfig::default()))
    }
}

fn declaration_matches(taxonomy: &Taxonomy, existing: &FailureKind, decl: &KindDecl) -> bool {
    let parent = taxonomy.parent(existing);
    let parent_matches = match (&decl.parent, parent) {
        (Some(expected), Some(actual)) => actual.name() == expected,
        (None, Some(actual)) => &actual == taxonomy.root(),
        (_, None) => false,
    };
    let class_matches = decl.class.map_or(true, |c| taxonomy.classify(existing) == c);
    parent_matches && class_matches
}

// =============================================================================
// Compiled plan
// =============================================================================

/// A scenario with every kind resolved, ready to run any number of times
#[derive(Debug, Clone)]
pub struct Plan {
    name: String,
    frame: CompiledFrame,
}

#[derive(Debug, Clone)]
struct CompiledFrame {
    name: String,
    steps: Vec<CompiledStep>,
}

#[derive(Debug, Clone)]
enum CompiledStep {
    Defer { label: String, raise: Option<CompiledRaise> },
    Catch { matcher: Matcher, then: CompiledAction },
    Call(CompiledFrame),
    Raise(CompiledRaise),
    Return(Value),
}

#[derive(Debug, Clone)]
struct CompiledRaise {
    kind: FailureKind,
    message: String,
    context: Context,
}

#[derive(Debug, Clone)]
enum CompiledAction {
    Recover(Value),
    Rethrow,
    Raise(CompiledRaise),
    Wrap { kind: FailureKind, message: String },
}

fn compile_frame(frame: &FrameSpec, taxonomy: &Taxonomy) -> Result<CompiledFrame> {
    if frame.name.is_empty() {
        return Err(error::scenario_invalid("frame names must be non-empty"));
    }

    let mut steps = Vec::with_capacity(frame.steps.len());
    for (position, step) in frame.steps.iter().enumerate() {
        let terminal = matches!(step, Step::Raise(_) | Step::Return { .. });
        if terminal && position + 1 != frame.steps.len() {
            return Err(error::scenario_invalid(format!(
                "step {} of frame '{}' ends the frame but is followed by more steps",
                position, frame.name
            ))
            .with_context("frame", frame.name.clone()));
        }

        let compiled = match step {
            Step::Defer { label, raise } => CompiledStep::Defer {
                label: label.clone(),
                raise: raise.as_ref().map(|r| compile_raise(r, taxonomy)).transpose()?,
            },
            Step::Catch { kind, exact, then } => {
                let kind = taxonomy.require(kind)?;
                let matcher = if *exact {
                    Matcher::exact(&kind)
                } else {
                    Matcher::descendant(&kind)
                };
                CompiledStep::Catch {
                    matcher,
                    then: compile_action(then, taxonomy)?,
                }
            }
            Step::Call(frame) => CompiledStep::Call(compile_frame(frame, taxonomy)?),
            Step::Raise(raise) => CompiledStep::Raise(compile_raise(raise, taxonomy)?),
            Step::Return { value } => CompiledStep::Return(value.clone()),
        };
        steps.push(compiled);
    }

    Ok(CompiledFrame {
        name: frame.name.clone(),
        steps,
    })
}

fn compile_raise(raise: &RaiseSpec, taxonomy: &Taxonomy) -> Result<CompiledRaise> {
    Ok(CompiledRaise {
        kind: taxonomy.require(&raise.kind)?,
        message: raise.message.clone(),
        context: Context::from_pairs(raise.context.iter().cloned())?,
    })
}

fn compile_action(action: &HandlerAction, taxonomy: &Taxonomy) -> Result<CompiledAction> {
    Ok(match action {
        HandlerAction::Recover { value } => CompiledAction::Recover(value.clone()),
        HandlerAction::Rethrow => CompiledAction::Rethrow,
        HandlerAction::Raise(raise) => CompiledAction::Raise(compile_raise(raise, taxonomy)?),
        HandlerAction::Wrap { kind, message } => CompiledAction::Wrap {
            kind: taxonomy.require(kind)?,
            message: message.clone(),
        },
    })
}

impl CompiledRaise {
    fn raise(&self, scope: &Scope<'_>) -> Failure {
        scope.new_failure(&self.kind, self.message.clone(), self.context.clone())
    }
}

impl CompiledAction {
    fn apply(self, scope: &mut Scope<'_>, failure: Failure) -> Outcome {
        match self {
            CompiledAction::Recover(value) => Ok(value),
            CompiledAction::Rethrow => Err(failure),
            CompiledAction::Raise(raise) => Err(raise.raise(scope)),
            CompiledAction::Wrap { kind, message } => Err(scope.wrap(&failure, &kind, message)),
        }
    }
}

fn execute(scope: &mut Scope<'_>, steps: &[CompiledStep]) -> Outcome {
    let mut last = Value::Null;
    for step in steps {
        match step {
            CompiledStep::Defer { label, raise } => {
                let raise = raise.clone();
                scope.defer_named(label.clone(), move |scope| match raise {
                    Some(raise) => Err(raise.raise(scope)),
                    None => Ok(()),
                });
            }
            CompiledStep::Catch { matcher, then } => {
                let then = then.clone();
                scope.on(matcher.clone(), move |scope, failure| then.apply(scope, failure));
            }
            CompiledStep::Call(frame) => {
                last = scope.call(&frame.name, |scope| execute(scope, &frame.steps))?;
            }
            CompiledStep::Raise(raise) => return Err(raise.raise(scope)),
            CompiledStep::Return(value) => return Ok(value.clone()),
        }
    }
    Ok(last)
}

impl Plan {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the plan on a fresh chain
    pub fn run(&self, taxonomy: Arc<Taxonomy>, config: ChainConfig) -> ScenarioReport {
        let mut chain = CallChain::with_config(taxonomy, config);
        let frame = &self.frame;
        let result = chain.run(&frame.name, |scope| execute(scope, &frame.steps));

        let outcome = match result {
            Ok(value) => ScenarioOutcome::Returned { value },
            Err(unhandled) => ScenarioOutcome::Unhandled {
                report: unhandled.report(),
                failure: unhandled.summary(),
            },
        };
        ScenarioReport {
            scenario: self.name.clone(),
            outcome,
            trace: chain.take_trace(),
        }
    }
}

// =============================================================================
// Report
// =============================================================================

/// How a scenario's chain ended
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Returned { value: Value },
    Unhandled { failure: UnhandledSummary, report: String },
}

/// Result of running one scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub outcome: ScenarioOutcome,
    pub trace: Trace,
}

impl ScenarioReport {
    pub fn is_unhandled(&self) -> bool {
        matches!(self.outcome, ScenarioOutcome::Unhandled { .. })
    }

    /// Human-readable summary: outcome followed by the trace
    pub fn render(&self) -> String {
        let mut out = format!("== {} ==\n", self.scenario);
        match &self.outcome {
            ScenarioOutcome::Returned { value } => out.push_str(&format!("returned {}\n", value)),
            ScenarioOutcome::Unhandled { report, .. } => out.push_str(report),
        }
        out.push_str("-- trace --\n");
        out.push_str(&self.trace.render());
        out
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::serialization_failed(e.to_string())
                .with_operation("scenario::report")
                .set_source(e)
        })
    }
}
