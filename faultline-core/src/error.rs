//! Core error types
//!
//! Re-exports faultline-error and provides core-specific conveniences.

pub use faultline_error::{Error, ErrorKind, Result};

/// Create a DuplicateKind error
pub fn duplicate_kind(name: impl Into<String>) -> Error {
    Error::duplicate_kind(name).with_operation("taxonomy::register")
}

/// Create an UnknownParent error
pub fn unknown_parent(kind: impl Into<String>, parent: impl Into<String>) -> Error {
    Error::unknown_parent(kind, parent).with_operation("taxonomy::register")
}

/// Create a HierarchyTooDeep error
pub fn hierarchy_too_deep(kind: impl Into<String>, max: usize) -> Error {
    Error::hierarchy_too_deep(kind, max).with_operation("taxonomy::register")
}

/// Create an InvalidKindName error
pub fn invalid_kind_name(name: impl Into<String>) -> Error {
    Error::invalid_kind_name(name).with_operation("taxonomy::register")
}

/// Create an UnknownKind error
pub fn unknown_kind(name: impl Into<String>) -> Error {
    Error::unknown_kind(name).with_operation("taxonomy::lookup")
}

/// Create an EmptyContextKey error
pub fn empty_context_key(value: impl Into<String>) -> Error {
    Error::empty_context_key(value).with_operation("context::insert")
}

/// Create a ScenarioInvalid error
pub fn scenario_invalid(message: impl Into<String>) -> Error {
    Error::scenario_invalid(message).with_operation("scenario::compile")
}

/// Create a SerializationFailed error wrapping a serde error
pub fn serialization_error(err: serde_json::Error) -> Error {
    Error::serialization_failed(err.to_string())
        .with_operation("scenario::parse")
        .set_source(err)
}

/// Create an IoFailed error for a path
pub fn io_error(path: &std::path::Path, err: std::io::Error) -> Error {
    Error::from(err)
        .with_operation("scenario::from_file")
        .with_context("path", path.display().to_string())
}
