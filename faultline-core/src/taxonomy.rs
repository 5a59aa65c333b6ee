//! # Failure Taxonomy
//!
//! A rooted hierarchy of failure kinds. Every kind has exactly one parent
//! except the root `AnyFailure`, and each kind is either recoverable or fatal.
//!
//! Kinds are registered append-only and a parent must exist before its child,
//! so the parent graph is a tree by construction: a registration that would
//! close a loop can only name itself or an unregistered kind as parent, and
//! both are rejected before anything is written.
//!
//! The registry is process-wide and read-mostly. Registration takes the write
//! lock (single writer); `is_a` and `classify` take the read lock and may run
//! from any number of call chains at once.

use crate::error::{self, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Maximum depth of the kind hierarchy (root is depth 0)
pub const MAX_KIND_DEPTH: usize = 8;

const ROOT_ID: u32 = 0;

/// Names of the kinds every taxonomy starts with, plus the standard set.
pub mod names {
    pub const ANY_FAILURE: &str = "AnyFailure";
    pub const CLEANUP_FAILURE: &str = "CleanupFailure";
    pub const CALL_DEPTH_EXCEEDED: &str = "CallDepthExceeded";

    pub const IO_FAILURE: &str = "IOFailure";
    pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFound";
    pub const FILE_NOT_FOUND: &str = "FileNotFound";
    pub const PERMISSION_DENIED: &str = "PermissionDenied";
    pub const STREAM_CORRUPTED: &str = "StreamCorrupted";
    pub const INVALID_ARGUMENT: &str = "InvalidArgument";
    pub const STATE_VIOLATION: &str = "StateViolation";
    pub const OUT_OF_CAPACITY: &str = "OutOfCapacity";
}

/// (name, parent, explicit class), parents listed before children
const STANDARD_KINDS: &[(&str, &str, Option<Class>)] = &[
    (names::IO_FAILURE, names::ANY_FAILURE, None),
    (names::RESOURCE_NOT_FOUND, names::IO_FAILURE, None),
    (names::FILE_NOT_FOUND, names::RESOURCE_NOT_FOUND, None),
    (names::PERMISSION_DENIED, names::IO_FAILURE, None),
    (names::STREAM_CORRUPTED, names::IO_FAILURE, None),
    (names::INVALID_ARGUMENT, names::ANY_FAILURE, None),
    (names::STATE_VIOLATION, names::ANY_FAILURE, Some(Class::Fatal)),
    (names::OUT_OF_CAPACITY, names::ANY_FAILURE, Some(Class::Fatal)),
];

/// Whether a caller can meaningfully continue after handling a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Class {
    /// The caller may handle the failure and carry on
    #[default]
    Recoverable,
    /// The caller should not attempt to continue locally
    Fatal,
}

impl Class {
    /// Get class as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Class::Recoverable => "recoverable",
            Class::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered failure kind.
///
/// Cheap to clone and immutable. A handle is only meaningful for the taxonomy
/// that issued it; handles from another taxonomy are treated as unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FailureKind {
    id: u32,
    name: Arc<str>,
}

impl FailureKind {
    /// Kind name as registered
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registration sequence number (root is 0)
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug)]
struct Entry {
    kind: FailureKind,
    parent: Option<u32>,
    class: Option<Class>,
    depth: usize,
}

#[derive(Debug, Default)]
struct Registry {
    entries: Vec<Entry>,
    by_name: HashMap<Arc<str>, u32>,
}

impl Registry {
    /// Append an entry; all validation has already happened
    fn push(&mut self, name: &str, parent: Option<u32>, class: Option<Class>) -> FailureKind {
        let id = self.entries.len() as u32;
        let name: Arc<str> = Arc::from(name);
        let depth = parent.map_or(0, |p| self.entries[p as usize].depth + 1);
        let kind = FailureKind { id, name: name.clone() };
        self.entries.push(Entry {
            kind: kind.clone(),
            parent,
            class,
            depth,
        });
        self.by_name.insert(name, id);
        kind
    }

    /// Find the entry for a handle issued by this registry
    fn resolve(&self, kind: &FailureKind) -> Option<&Entry> {
        self.entries
            .get(kind.id as usize)
            .filter(|entry| entry.kind.name == kind.name)
    }

    /// Walk from `id` to the root, yielding each entry (self first)
    fn chain(&self, id: u32) -> impl Iterator<Item = &Entry> {
        let mut next = Some(id);
        std::iter::from_fn(move || {
            let entry = self.entries.get(next? as usize)?;
            next = entry.parent;
            Some(entry)
        })
        .take(MAX_KIND_DEPTH + 1)
    }
}

/// Process-wide registry of failure kinds
#[derive(Debug)]
pub struct Taxonomy {
    registry: RwLock<Registry>,
    root: FailureKind,
    cleanup_failure: FailureKind,
    call_depth_exceeded: FailureKind,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::new()
    }
}

impl Taxonomy {
    /// Create a taxonomy holding only the built-in kinds
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let root = registry.push(names::ANY_FAILURE, None, Some(Class::Recoverable));
        let cleanup_failure = registry.push(names::CLEANUP_FAILURE, Some(ROOT_ID), Some(Class::Fatal));
        let call_depth_exceeded =
            registry.push(names::CALL_DEPTH_EXCEEDED, Some(ROOT_ID), Some(Class::Fatal));

        Self {
            registry: RwLock::new(registry),
            root,
            cleanup_failure,
            call_depth_exceeded,
        }
    }

    /// Create a taxonomy with the built-in kinds and the standard hierarchy
    pub fn standard() -> Self {
        let taxonomy = Self::new();
        {
            let mut registry = taxonomy.write();
            for (name, parent, class) in STANDARD_KINDS {
                let parent = registry.by_name.get(*parent).copied().unwrap_or(ROOT_ID);
                registry.push(name, Some(parent), *class);
            }
        }
        taxonomy
    }

    /// The shared process-wide standard taxonomy
    pub fn global() -> Arc<Taxonomy> {
        static GLOBAL: OnceLock<Arc<Taxonomy>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Taxonomy::standard())).clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a kind whose class is inherited from its parent.
    ///
    /// `parent = None` attaches the kind directly under `AnyFailure`.
    pub fn register(&self, name: &str, parent: Option<&FailureKind>) -> Result<FailureKind> {
        self.insert(name, parent, None)
    }

    /// Register a kind with an explicit class, overriding the inherited one
    pub fn register_classified(
        &self,
        name: &str,
        parent: Option<&FailureKind>,
        class: Class,
    ) -> Result<FailureKind> {
        self.insert(name, parent, Some(class))
    }

    fn insert(&self, name: &str, parent: Option<&FailureKind>, class: Option<Class>) -> Result<FailureKind> {
        if name.is_empty() {
            return Err(error::invalid_kind_name(name));
        }

        let mut registry = self.write();
        if registry.by_name.contains_key(name) {
            return Err(error::duplicate_kind(name));
        }

        let parent_id = match parent {
            Some(parent) => match registry.resolve(parent) {
                Some(entry) => entry.kind.id,
                None => return Err(error::unknown_parent(name, parent.name())),
            },
            None => ROOT_ID,
        };

        let depth = registry.entries[parent_id as usize].depth + 1;
        if depth > MAX_KIND_DEPTH {
            return Err(error::hierarchy_too_deep(name, MAX_KIND_DEPTH));
        }
        debug_assert!(registry.chain(parent_id).all(|entry| entry.kind.name() != name));

        let kind = registry.push(name, Some(parent_id), class);
        tracing::debug!(kind = %kind, parent = parent_id, "registered failure kind");
        Ok(kind)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// True iff `ancestor` equals `kind` or lies on `kind`'s parent chain
    pub fn is_a(&self, kind: &FailureKind, ancestor: &FailureKind) -> bool {
        let registry = self.read();
        let (Some(entry), Some(target)) = (registry.resolve(kind), registry.resolve(ancestor)) else {
            return false;
        };
        let target = target.kind.id;
        let found = registry.chain(entry.kind.id).any(|e| e.kind.id == target);
        found
    }

    /// The class of a kind: the nearest explicit class on its parent chain.
    ///
    /// Unknown handles classify as `Recoverable`, same as a bare root.
    pub fn classify(&self, kind: &FailureKind) -> Class {
        let registry = self.read();
        let Some(entry) = registry.resolve(kind) else {
            return Class::default();
        };
        let class = registry
            .chain(entry.kind.id)
            .find_map(|e| e.class)
            .unwrap_or_default();
        class
    }

    /// Look up a kind by name
    pub fn lookup(&self, name: &str) -> Option<FailureKind> {
        let registry = self.read();
        let id = *registry.by_name.get(name)?;
        Some(registry.entries[id as usize].kind.clone())
    }

    /// Look up a kind by name, failing with `UnknownKind`
    pub fn require(&self, name: &str) -> Result<FailureKind> {
        self.lookup(name).ok_or_else(|| error::unknown_kind(name))
    }

    /// The root kind `AnyFailure`
    pub fn root(&self) -> &FailureKind {
        &self.root
    }

    /// The synthetic kind used when a cleanup action fails
    pub fn cleanup_failure(&self) -> &FailureKind {
        &self.cleanup_failure
    }

    /// The kind raised when a call chain exceeds its depth limit
    pub fn call_depth_exceeded(&self) -> &FailureKind {
        &self.call_depth_exceeded
    }

    /// Parent of a kind (None for the root or unknown handles)
    pub fn parent(&self, kind: &FailureKind) -> Option<FailureKind> {
        let registry = self.read();
        let parent = registry.resolve(kind)?.parent?;
        Some(registry.entries[parent as usize].kind.clone())
    }

    /// Ancestors of a kind, nearest first, ending at the root
    pub fn ancestors(&self, kind: &FailureKind) -> Vec<FailureKind> {
        let registry = self.read();
        let Some(entry) = registry.resolve(kind) else {
            return Vec::new();
        };
        registry
            .chain(entry.kind.id)
            .skip(1)
            .map(|e| e.kind.clone())
            .collect()
    }

    /// Depth of a kind (root is 0)
    pub fn depth(&self, kind: &FailureKind) -> Option<usize> {
        self.read().resolve(kind).map(|e| e.depth)
    }

    /// All kinds in registration order
    pub fn kinds(&self) -> Vec<FailureKind> {
        self.read().entries.iter().map(|e| e.kind.clone()).collect()
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Always false: the root is registered on construction
    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Render the hierarchy as an indented tree with effective classes
    pub fn render_tree(&self) -> String {
        let registry = self.read();
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for entry in &registry.entries {
            if let Some(parent) = entry.parent {
                children.entry(parent).or_default().push(entry.kind.id);
            }
        }

        let mut out = String::new();
        let mut pending = vec![ROOT_ID];
        while let Some(id) = pending.pop() {
            let entry = &registry.entries[id as usize];
            let class = registry
                .chain(id)
                .find_map(|e| e.class)
                .unwrap_or_default();
            let marker = if entry.class.is_some() { "" } else { ", inherited" };
            out.push_str(&format!(
                "{}{} ({}{})\n",
                "  ".repeat(entry.depth),
                entry.kind.name,
                class,
                marker
            ));
            if let Some(kids) = children.get(&id) {
                pending.extend(kids.iter().rev());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn io_hierarchy() -> (Taxonomy, FailureKind, FailureKind) {
        let taxonomy = Taxonomy::new();
        let io = taxonomy.register("IOFailure", None).unwrap();
        let fnf = taxonomy.register("FileNotFound", Some(&io)).unwrap();
        (taxonomy, io, fnf)
    }

    #[test]
    fn test_is_a_reflexive_and_rooted() {
        let taxonomy = Taxonomy::standard();
        let root = taxonomy.root().clone();
        for kind in taxonomy.kinds() {
            assert!(taxonomy.is_a(&kind, &kind), "{} is-a itself", kind);
            assert!(taxonomy.is_a(&kind, &root), "{} is-a root", kind);
        }
    }

    #[test]
    fn test_is_a_follows_parent_chain() {
        let (taxonomy, io, fnf) = io_hierarchy();
        assert!(taxonomy.is_a(&fnf, &io));
        assert!(!taxonomy.is_a(&io, &fnf));

        let other = taxonomy.register("InvalidArgument", None).unwrap();
        assert!(!taxonomy.is_a(&fnf, &other));
        assert!(!taxonomy.is_a(&other, &io));
    }

    #[test]
    fn test_none_parent_attaches_to_root() {
        let (taxonomy, io, _) = io_hierarchy();
        assert_eq!(taxonomy.parent(&io).as_ref(), Some(taxonomy.root()));
        assert_eq!(taxonomy.depth(&io), Some(1));
        assert_eq!(taxonomy.parent(taxonomy.root()), None);
    }

    #[test]
    fn test_duplicate_kind() {
        let (taxonomy, io, _) = io_hierarchy();
        let before = taxonomy.len();

        let err = taxonomy.register("FileNotFound", Some(&io)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKind);
        assert_eq!(taxonomy.len(), before);

        let err = taxonomy.register("AnyFailure", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKind);
    }

    #[test]
    fn test_unknown_parent_from_foreign_taxonomy() {
        let (taxonomy, _, _) = io_hierarchy();
        let foreign = Taxonomy::new();
        let stranger = foreign.register("Stranger", None).unwrap();
        let before = taxonomy.len();

        let err = taxonomy.register("Child", Some(&stranger)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownParent);
        assert_eq!(err.operation(), "taxonomy::register");
        assert_eq!(taxonomy.len(), before);
        assert!(taxonomy.lookup("Child").is_none());
    }

    #[test]
    fn test_self_parent_is_rejected_without_mutation() {
        // A kind cannot name itself as parent: the handle does not exist yet.
        let taxonomy = Taxonomy::new();
        let phantom = FailureKind { id: 3, name: Arc::from("Loop") };
        let before = taxonomy.len();

        let err = taxonomy.register("Loop", Some(&phantom)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownParent);
        assert_eq!(taxonomy.len(), before);
        assert!(taxonomy.lookup("Loop").is_none());
    }

    #[test]
    fn test_hierarchy_depth_bounded() {
        let taxonomy = Taxonomy::new();
        let mut parent = taxonomy.root().clone();
        for level in 1..=MAX_KIND_DEPTH {
            parent = taxonomy.register(&format!("Level{}", level), Some(&parent)).unwrap();
        }
        assert_eq!(taxonomy.depth(&parent), Some(MAX_KIND_DEPTH));

        let before = taxonomy.len();
        let err = taxonomy.register("TooDeep", Some(&parent)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HierarchyTooDeep);
        assert_eq!(taxonomy.len(), before);
        assert!(taxonomy.is_a(&parent, taxonomy.root()));
    }

    #[test]
    fn test_empty_name_rejected() {
        let taxonomy = Taxonomy::new();
        let before = taxonomy.len();
        let err = taxonomy.register("", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKindName);
        assert!(err.kind().is_registration());
        assert_eq!(err.operation(), "taxonomy::register");
        assert_eq!(taxonomy.len(), before);
    }

    #[test]
    fn test_classify_inherits_and_overrides() {
        let taxonomy = Taxonomy::new();
        let io = taxonomy.register_classified("IOFailure", None, Class::Fatal).unwrap();
        let fnf = taxonomy.register("FileNotFound", Some(&io)).unwrap();
        let retry = taxonomy
            .register_classified("Interrupted", Some(&io), Class::Recoverable)
            .unwrap();
        let plain = taxonomy.register("InvalidArgument", None).unwrap();

        assert_eq!(taxonomy.classify(&io), Class::Fatal);
        assert_eq!(taxonomy.classify(&fnf), Class::Fatal);
        assert_eq!(taxonomy.classify(&retry), Class::Recoverable);
        assert_eq!(taxonomy.classify(&plain), Class::Recoverable);
    }

    #[test]
    fn test_builtin_kinds() {
        let taxonomy = Taxonomy::new();
        assert_eq!(taxonomy.root().name(), names::ANY_FAILURE);
        assert_eq!(taxonomy.classify(taxonomy.cleanup_failure()), Class::Fatal);
        assert_eq!(taxonomy.classify(taxonomy.call_depth_exceeded()), Class::Fatal);
        assert_eq!(taxonomy.len(), 3);
    }

    #[test]
    fn test_standard_hierarchy() {
        let taxonomy = Taxonomy::standard();
        let fnf = taxonomy.require(names::FILE_NOT_FOUND).unwrap();
        let io = taxonomy.require(names::IO_FAILURE).unwrap();
        let state = taxonomy.require(names::STATE_VIOLATION).unwrap();

        assert!(taxonomy.is_a(&fnf, &io));
        let ancestors: Vec<_> = taxonomy
            .ancestors(&fnf)
            .iter()
            .map(|k| k.name().to_string())
            .collect();
        assert_eq!(ancestors, vec!["ResourceNotFound", "IOFailure", "AnyFailure"]);
        assert_eq!(taxonomy.classify(&state), Class::Fatal);
        assert_eq!(taxonomy.classify(&fnf), Class::Recoverable);

        let err = taxonomy.require("Nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownKind);
    }

    #[test]
    fn test_render_tree() {
        let (taxonomy, _, _) = io_hierarchy();
        let tree = taxonomy.render_tree();
        let lines: Vec<_> = tree.lines().collect();
        assert_eq!(lines[0], "AnyFailure (recoverable)");
        assert!(lines.contains(&"  CleanupFailure (fatal)"));
        assert!(lines.contains(&"    FileNotFound (recoverable, inherited)"));
    }

    #[test]
    fn test_global_is_shared() {
        let a = Taxonomy::global();
        let b = Taxonomy::global();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.lookup(names::FILE_NOT_FOUND).is_some());
    }

    #[test]
    fn test_concurrent_readers() {
        let taxonomy = Arc::new(Taxonomy::standard());
        let fnf = taxonomy.require(names::FILE_NOT_FOUND).unwrap();
        let io = taxonomy.require(names::IO_FAILURE).unwrap();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        assert!(taxonomy.is_a(&fnf, &io));
                    }
                });
            }
            s.spawn(|| {
                for i in 0..50 {
                    taxonomy.register(&format!("Extra{}", i), Some(&io)).unwrap();
                }
            });
        });

        assert!(taxonomy.lookup("Extra49").is_some());
    }
}
