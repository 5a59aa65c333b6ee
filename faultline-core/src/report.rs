//! # Unhandled Failure Reports
//!
//! What a chain surfaces when a failure reaches its root. The report always
//! carries the whole causal chain (innermost cause first) and the whole origin
//! frame sequence, never just the outermost message.

use crate::failure::{Failure, FailureId};
use crate::taxonomy::Class;
use serde::Serialize;
use std::fmt;

/// A failure that escalated past the outermost frame of a chain
pub struct UnhandledFailure {
    failure: Failure,
    class: Class,
}

impl UnhandledFailure {
    pub(crate) fn new(failure: Failure, class: Class) -> Self {
        Self { failure, class }
    }

    pub fn failure(&self) -> &Failure {
        &self.failure
    }

    pub fn into_failure(self) -> Failure {
        self.failure
    }

    /// Class of the escalated failure's kind
    pub fn class(&self) -> Class {
        self.class
    }

    /// Causes innermost first, ending with the escalated failure itself
    pub fn causes_innermost_first(&self) -> Vec<&Failure> {
        let mut causes: Vec<_> = self.failure.chain().collect();
        causes.reverse();
        causes
    }

    /// Multi-line diagnostic report
    pub fn report(&self) -> String {
        let mut out = format!(
            "unhandled {} failure: {}: {}\n",
            self.class,
            self.failure.kind(),
            self.failure.message()
        );

        out.push_str("cause chain (innermost first):\n");
        for (depth, failure) in self.causes_innermost_first().into_iter().enumerate() {
            out.push_str(&format!(
                "  {}: {}: {} [{}]\n",
                depth,
                failure.kind(),
                failure.message(),
                failure.id()
            ));
            for (key, value) in failure.context().iter() {
                out.push_str(&format!("       {} = {}\n", key, value));
            }
            if let Some(frame) = failure.origin().first() {
                out.push_str(&format!("       raised in {}\n", frame));
            }
        }

        out.push_str("origin (innermost first):\n");
        for frame in self.failure.origin() {
            out.push_str(&format!("  at {}\n", frame));
        }

        if !self.failure.suppressed().is_empty() {
            out.push_str("suppressed:\n");
            for failure in self.failure.suppressed() {
                out.push_str(&format!("  {}\n", failure));
            }
        }

        out
    }

    /// Serializable form of the report
    pub fn summary(&self) -> UnhandledSummary {
        UnhandledSummary {
            class: self.class,
            causes: self
                .causes_innermost_first()
                .into_iter()
                .map(FailureSummary::from)
                .collect(),
            origin: self.failure.origin().iter().map(|f| f.to_string()).collect(),
            suppressed: self.failure.suppressed().iter().map(FailureSummary::from).collect(),
        }
    }
}

impl fmt::Display for UnhandledFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.report())
    }
}

impl fmt::Debug for UnhandledFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnhandledFailure ({}) {:?}", self.class, self.failure)
    }
}

impl std::error::Error for UnhandledFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.failure)
    }
}

/// One failure flattened for output
#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub id: FailureId,
    pub kind: String,
    pub message: String,
    pub context: Vec<(String, String)>,
    pub origin: Vec<String>,
}

impl From<&Failure> for FailureSummary {
    fn from(failure: &Failure) -> Self {
        Self {
            id: failure.id(),
            kind: failure.kind().name().to_string(),
            message: failure.message().to_string(),
            context: failure
                .context()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            origin: failure.origin().iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Serializable [`UnhandledFailure`]
#[derive(Debug, Clone, Serialize)]
pub struct UnhandledSummary {
    pub class: Class,
    /// Innermost cause first; the last entry is the escalated failure
    pub causes: Vec<FailureSummary>,
    pub origin: Vec<String>,
    pub suppressed: Vec<FailureSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CallChain;
    use crate::failure::Context;
    use crate::taxonomy::{names, Taxonomy};
    use std::sync::Arc;

    fn escalate() -> UnhandledFailure {
        let taxonomy = Arc::new(Taxonomy::standard());
        let fnf = taxonomy.require(names::FILE_NOT_FOUND).unwrap();
        let state = taxonomy.require(names::STATE_VIOLATION).unwrap();
        let mut chain = CallChain::new(taxonomy);

        chain
            .run("service", |scope| {
                scope.call("load_config", |scope| {
                    let failure = scope.call("read_file", |scope| {
                        let context = Context::new().with("path", "/etc/app.toml").unwrap();
                        Err(scope.new_failure(&fnf, "no such file", context))
                    });
                    let failure = failure.unwrap_err();
                    Err(scope.wrap(&failure, &state, "service cannot start without config"))
                })
            })
            .unwrap_err()
    }

    #[test]
    fn test_report_lists_innermost_cause_first() {
        let unhandled = escalate();
        let report = unhandled.report();

        assert!(report.starts_with("unhandled fatal failure: StateViolation"));
        let inner = report.find("0: FileNotFound: no such file").unwrap();
        let outer = report.find("1: StateViolation").unwrap();
        assert!(inner < outer);
        assert!(report.contains("path = /etc/app.toml"));
        assert!(report.contains("raised in read_file#2"));
        assert_eq!(unhandled.to_string(), report);
    }

    #[test]
    fn test_report_lists_full_origin() {
        let unhandled = escalate();
        let report = unhandled.report();

        let origin_section = report.split("origin (innermost first):\n").nth(1).unwrap();
        let frames: Vec<_> = origin_section.lines().collect();
        assert_eq!(frames, vec!["  at load_config#1", "  at service#0"]);
    }

    #[test]
    fn test_summary_serializes() {
        let unhandled = escalate();
        let json = serde_json::to_value(unhandled.summary()).unwrap();

        assert_eq!(json["class"], "fatal");
        assert_eq!(json["causes"][0]["kind"], "FileNotFound");
        assert_eq!(json["causes"][0]["origin"][0], "read_file#2");
        assert_eq!(json["causes"][1]["kind"], "StateViolation");
        assert_eq!(json["origin"][1], "service#0");
    }

    #[test]
    fn test_error_source_is_failure() {
        let unhandled = escalate();
        let source = std::error::Error::source(&unhandled).unwrap();
        assert!(source.to_string().starts_with("StateViolation"));
    }
}
