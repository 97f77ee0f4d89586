//! Error types for registration, rebuild, and dispatch.
//!
//! Each phase of the engine has its own error surface:
//!
//! - [`RegistrationError`] - reported immediately by `declare_method` and
//!   `add_override`
//! - [`RebuildError`] - a rebuild found fatal configuration problems and left
//!   the previously installed tables in place
//! - [`CallError`] - a single dispatch call could not be completed

use thiserror::Error;

use crate::dispatch::report::RebuildReport;

/// Errors reported immediately by registration calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A method with the same key and an identical slot list already exists.
    /// The same key with a different slot list is a distinct method.
    #[error("method `{key}` is already declared with this signature")]
    DuplicateMethod { key: String },

    /// A signature names a class that was never declared.
    #[error("class `{name}` has not been declared")]
    UnknownClass { name: String },

    /// A signature has no virtual slot, so nothing could ever be dispatched.
    #[error("method `{key}` declares no virtual parameter slot")]
    NoVirtualSlots { key: String },

    /// The method handle does not belong to this registry.
    #[error("unknown method handle #{raw}")]
    UnknownMethod { raw: u32 },

    /// An override supplies the wrong number of parameter classes.
    #[error("override for `{method}` supplies {found} parameter classes, expected {expected}")]
    OverrideArity {
        method: String,
        expected: usize,
        found: usize,
    },

    /// An override parameter class id is outside the registry.
    #[error("override for `{method}` names unknown class id {class} in slot {slot}")]
    OverrideClassRange {
        method: String,
        slot: usize,
        class: u32,
    },
}

/// Result alias for registration calls.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// Errors reported by individual dispatch calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The installed tables do not cover this method. Either no rebuild has
    /// run yet, or the method was declared after the last one.
    #[error("method `{method}` is not covered by the installed tables; run rebuild() first")]
    RebuildRequired { method: String },

    /// The argument slice does not match the method's slot count.
    #[error("method `{method}` takes {expected} arguments, got {found}")]
    WrongArity {
        method: String,
        expected: usize,
        found: usize,
    },

    /// A virtual slot received a plain argument.
    #[error("argument {slot} of `{method}` occupies a virtual slot and must implement Instance")]
    ExpectedVirtualArg { method: String, slot: usize },

    /// A virtual argument reported a class id the hierarchy never issued.
    #[error("argument {slot} of `{method}` has unregistered runtime class id {class}")]
    UnregisteredRuntimeClass {
        method: String,
        slot: usize,
        class: u32,
    },

    /// Two or more maximally specific overrides; no order is invented.
    #[error("ambiguous call to `{method}` for ({}): {}", .tuple.join(", "), .candidates.join(" vs "))]
    AmbiguousCall {
        method: String,
        tuple: Vec<String>,
        candidates: Vec<String>,
    },

    /// No override applies to the argument tuple.
    #[error("no applicable override for `{method}` on ({})", .tuple.join(", "))]
    NoApplicableOverride { method: String, tuple: Vec<String> },

    /// An override called past the end of its chain.
    #[error("no further override after the least specific one for `{method}`")]
    NoNextOverride { method: String },

    /// An override returned a value of the wrong type, or the caller asked
    /// for a result type the method does not declare.
    #[error("result of `{method}` does not have the declared type `{expected}`")]
    ResultType {
        method: String,
        expected: &'static str,
    },
}

/// Result alias for dispatch calls.
pub type CallResult<T> = Result<T, CallError>;

/// Fatal rebuild outcome. The collected report names every problem found;
/// the previously installed tables remain in effect.
#[derive(Debug, Clone, Error)]
pub enum RebuildError {
    #[error("rebuild aborted with {} configuration problem(s)", .report.problems.len())]
    Config { report: RebuildReport },
}

impl RebuildError {
    /// The full diagnostics collected before the rebuild gave up.
    pub fn report(&self) -> &RebuildReport {
        match self {
            RebuildError::Config { report } => report,
        }
    }
}
