//! The main Error type for faultline

use crate::ErrorKind;
use std::fmt;

/// The error type for every fallible faultline operation.
///
/// This error type provides:
/// - `kind`: What type of error occurred
/// - `message`: Human-readable description
/// - `operation`: What operation caused the error
/// - `context`: Key-value pairs for debugging
/// - `source`: The underlying error (if any)
///
/// # Example
///
/// ```rust
/// use faultline_error::{Error, ErrorKind};
///
/// let err = Error::new(ErrorKind::UnknownParent, "parent 'IOFailure' is not registered")
///     .with_operation("taxonomy::register")
///     .with_context("kind", "FileNotFound")
///     .with_context("parent", "IOFailure");
///
/// assert_eq!(err.kind(), ErrorKind::UnknownParent);
/// assert!(err.kind().is_registration());
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the operation that caused this error
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Get the context key-value pairs
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Look up a context value by key (first match)
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the source error (if any)
    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    // =========================================================================
    // Builders (chainable)
    // =========================================================================

    /// Set the operation that caused this error.
    ///
    /// If an operation was already set, the previous one is moved to context
    /// as "called" to preserve the call chain.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set the source error.
    ///
    /// # Panics (debug only)
    /// Panics in debug mode if source was already set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }
}

// =============================================================================
// Display - compact, single-line format for logs
// =============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }

        if !self.context.is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

// =============================================================================
// Debug - verbose, multi-line format for debugging
// =============================================================================

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} at {}", self.kind, self.operation)?;

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "    Source: {:?}", source)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::IoFailed, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    /// Create an Unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Create a DuplicateKind error
    pub fn duplicate_kind(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorKind::DuplicateKind, format!("kind '{}' already registered", name))
            .with_context("kind", name)
    }

    /// Create an UnknownParent error
    pub fn unknown_parent(kind: impl Into<String>, parent: impl Into<String>) -> Self {
        let parent = parent.into();
        Self::new(ErrorKind::UnknownParent, format!("parent '{}' is not registered", parent))
            .with_context("kind", kind.into())
            .with_context("parent", parent)
    }

    /// Create a HierarchyTooDeep error
    pub fn hierarchy_too_deep(kind: impl Into<String>, max: usize) -> Self {
        Self::new(ErrorKind::HierarchyTooDeep, format!("kind depth exceeds max {}", max))
            .with_context("kind", kind.into())
            .with_context("max_depth", max.to_string())
    }

    /// Create an InvalidKindName error
    pub fn invalid_kind_name(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidKindName, "kind names must be non-empty")
            .with_context("kind", name.into())
    }

    /// Create an UnknownKind error
    pub fn unknown_kind(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorKind::UnknownKind, format!("kind '{}' is not registered", name))
            .with_context("kind", name)
    }

    /// Create an EmptyContextKey error
    pub fn empty_context_key(value: impl Into<String>) -> Self {
        Self::new(ErrorKind::EmptyContextKey, "context keys must be non-empty")
            .with_context("value", value.into())
    }

    /// Create a ScenarioInvalid error
    pub fn scenario_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ScenarioInvalid, message)
    }

    /// Create a SerializationFailed error
    pub fn serialization_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SerializationFailed, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::new(ErrorKind::DuplicateKind, "kind 'X' already registered");
        assert_eq!(err.kind(), ErrorKind::DuplicateKind);
        assert_eq!(err.message(), "kind 'X' already registered");
        assert_eq!(err.operation(), "");
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::new(ErrorKind::UnknownParent, "missing parent")
            .with_operation("taxonomy::register")
            .with_context("kind", "FileNotFound")
            .with_context("parent", "IOFailure");

        assert_eq!(err.operation(), "taxonomy::register");
        assert_eq!(err.context().len(), 2);
        assert_eq!(err.context()[0], ("kind", "FileNotFound".to_string()));
        assert_eq!(err.context_value("parent"), Some("IOFailure"));
        assert_eq!(err.context_value("missing"), None);
    }

    #[test]
    fn test_operation_chaining() {
        let err = Error::new(ErrorKind::IoFailed, "read failed")
            .with_operation("scenario::from_file")
            .with_operation("cli::run");

        assert_eq!(err.operation(), "cli::run");
        assert_eq!(err.context().len(), 1);
        assert_eq!(err.context()[0], ("called", "scenario::from_file".to_string()));
    }

    #[test]
    fn test_display() {
        let err = Error::duplicate_kind("IOFailure").with_operation("taxonomy::register");

        let display = format!("{}", err);
        assert!(display.starts_with("DuplicateKind at taxonomy::register"));
        assert!(display.contains("kind: IOFailure"));
        assert!(display.contains("already registered"));
    }

    #[test]
    fn test_debug_is_multiline() {
        let err = Error::unknown_parent("FileNotFound", "IOFailure");
        let debug = format!("{:?}", err);
        assert!(debug.contains("Message: parent 'IOFailure' is not registered"));
        assert!(debug.contains("        parent: IOFailure"));
    }

    #[test]
    fn test_convenience_constructors() {
        let err = Error::hierarchy_too_deep("Leaf", 8);
        assert_eq!(err.kind(), ErrorKind::HierarchyTooDeep);
        assert_eq!(err.context_value("max_depth"), Some("8"));

        let err = Error::unknown_kind("Nope");
        assert_eq!(err.kind(), ErrorKind::UnknownKind);
        assert!(err.message().contains("Nope"));

        let err = Error::empty_context_key("E42");
        assert_eq!(err.kind(), ErrorKind::EmptyContextKey);

        let err = Error::invalid_kind_name("");
        assert_eq!(err.kind(), ErrorKind::InvalidKindName);
        assert_eq!(err.context_value("kind"), Some(""));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "scenario.json missing");
        let err: Error = io_err.into();

        assert_eq!(err.kind(), ErrorKind::IoFailed);
        assert_eq!(err.operation(), "io");
        assert!(err.source_ref().is_some());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_set_source_from_serde() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::serialization_failed("bad scenario").set_source(parse_err);

        assert!(err.source_ref().is_some());
        assert!(format!("{:?}", err).contains("Source:"));
    }
}
