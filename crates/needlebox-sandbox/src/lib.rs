//! Sandbox: capability-restricted execution of policy snippets.
//!
//! A snippet is admitted (length, kind allow-list, static capability scan),
//! parsed into a small statement language, and interpreted with a fixed set
//! of text operations over a read-only context. Every execution yields a
//! tagged [`ExecutionResult`]; nothing escapes as a panic or error.
//!
//! # Modules
//!
//! - [`action`]      `Action` and `ActionKind`
//! - [`admission`]   `admit()`: length, kind, then capability scan
//! - [`scan`]        `scan_for_violation()` over raw source text
//! - [`lexer`] / [`parser`]  snippet grammar
//! - [`interpreter`] / [`builtins`]  evaluation and the operation catalog
//! - [`execution`]   `SandboxConfig`, `Deadline`, `ExecutionResult`
//! - [`executor`]    `SandboxExecutor::execute()`
//! - [`error`]       `SandboxError` / `SandboxResult`

pub mod action;
pub mod admission;
pub mod builtins;
pub mod error;
pub mod execution;
pub mod executor;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod scan;
pub mod value;

pub use action::{Action, ActionKind};
pub use admission::{admit, AdmissionVerdict};
pub use builtins::{is_builtin, OpClass, BUILTINS};
pub use error::{SandboxError, SandboxResult};
pub use execution::{Deadline, ExecutionResult, ExecutionStatus, SandboxConfig};
pub use executor::SandboxExecutor;
pub use scan::{scan_for_violation, CapabilityHit};
pub use value::{MatchValue, Value};
