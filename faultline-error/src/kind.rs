//! Error kinds for faultline operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to tell a malformed request (fix the input)
/// apart from an environment problem (file missing, bad JSON).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    // =========================================================================
    // Taxonomy errors
    // =========================================================================
    /// A kind with the same name is already registered
    DuplicateKind,

    /// The parent kind given at registration is not registered
    UnknownParent,

    /// Registering the kind would exceed the maximum hierarchy depth
    HierarchyTooDeep,

    /// A kind name was empty
    InvalidKindName,

    /// A kind name could not be resolved
    UnknownKind,

    // =========================================================================
    // Failure construction errors
    // =========================================================================
    /// A diagnostic context key was empty
    EmptyContextKey,

    // =========================================================================
    // Scenario errors
    // =========================================================================
    /// A scenario document is structurally valid JSON but semantically wrong
    ScenarioInvalid,

    /// Serialization/deserialization failed
    SerializationFailed,

    /// IO operation failed
    IoFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unexpected => "Unexpected",

            ErrorKind::DuplicateKind => "DuplicateKind",
            ErrorKind::UnknownParent => "UnknownParent",
            ErrorKind::HierarchyTooDeep => "HierarchyTooDeep",
            ErrorKind::InvalidKindName => "InvalidKindName",
            ErrorKind::UnknownKind => "UnknownKind",

            ErrorKind::EmptyContextKey => "EmptyContextKey",

            ErrorKind::ScenarioInvalid => "ScenarioInvalid",
            ErrorKind::SerializationFailed => "SerializationFailed",
            ErrorKind::IoFailed => "IoFailed",
        }
    }

    /// Whether the error comes from malformed taxonomy registration.
    ///
    /// These are fatal to the registration call only; the taxonomy is left
    /// untouched and the process may continue.
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            ErrorKind::DuplicateKind
                | ErrorKind::UnknownParent
                | ErrorKind::HierarchyTooDeep
                | ErrorKind::InvalidKindName
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::DuplicateKind.to_string(), "DuplicateKind");
        assert_eq!(ErrorKind::EmptyContextKey.to_string(), "EmptyContextKey");
    }

    #[test]
    fn test_is_registration() {
        assert!(ErrorKind::DuplicateKind.is_registration());
        assert!(ErrorKind::UnknownParent.is_registration());
        assert!(ErrorKind::HierarchyTooDeep.is_registration());
        assert!(ErrorKind::InvalidKindName.is_registration());
        assert!(!ErrorKind::UnknownKind.is_registration());
        assert!(!ErrorKind::IoFailed.is_registration());
    }
}
