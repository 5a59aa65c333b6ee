//! # faultline-error
//!
//! Errors produced by faultline itself, as opposed to the failures it models.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what went wrong (e.g., DuplicateKind, UnknownParent)
//! - **Error Context**: Assist in locating the cause with ordered key/value pairs
//! - **Error Source**: Wrap underlying io/serde errors without leaking raw types
//!
//! A modeled `Failure` travelling through a call chain is data, not an `Error`.
//! An `Error` means the caller asked the library to do something malformed:
//! register a kind twice, attach an empty context key, load a broken scenario.
//!
//! ## Usage
//!
//! ```rust
//! use faultline_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::DuplicateKind, "kind 'IOFailure' already registered")
//!         .with_operation("taxonomy::register")
//!         .with_context("kind", "IOFailure"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All fallible library functions return `Result<T, faultline_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Registration errors are reported synchronously and leave no partial state

mod error;
mod kind;

pub use error::Error;
pub use kind::ErrorKind;

/// Result type alias using faultline Error
pub type Result<T> = std::result::Result<T, Error>;
