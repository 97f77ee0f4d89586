//! Open multiple dispatch over runtime class hierarchies.
//!
//! Ordinary virtual calls pick an implementation from the runtime type of
//! one receiver. This crate picks from the runtime classes of *several*
//! arguments at once: methods declare which parameter slots are virtual,
//! overrides specialize those slots, and each call selects the most
//! specific applicable override for the full argument tuple.
//!
//! - batched class registration, with reflexive transitive closures
//!   computed over the whole hierarchy at rebuild time
//! - methods keyed by name, mixing virtual and plain parameter slots
//! - override selection by per-slot specificity; ties are reported as
//!   ambiguities, never resolved by an arbitrary pick
//! - a [`Next`] handle in every override for calling the next most
//!   specific override of the same tuple
//! - explicit rebuilds that compile the registries into an immutable
//!   snapshot, leaving the previous snapshot untouched on failure
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐    ┌──────────┐    rebuild    ┌────────────────┐
//! │ Hierarchy │    │  Method  │──────────────►│ CompiledTables │
//! │ Registry  │───►│ Registry │               │  (immutable)   │
//! └───────────┘    └──────────┘               └───────┬────────┘
//!                                                     │ dispatch
//!                                                     ▼
//!                                            selected override chain
//! ```
//!
//! # Example
//!
//! ```
//! use prong::{Arg, ClassBatch, ClassId, Dispatcher, Instance, MethodSig, override_fn};
//! use std::any::Any;
//!
//! struct Pet {
//!     class: ClassId,
//! }
//!
//! impl Instance for Pet {
//!     fn class_id(&self) -> ClassId {
//!         self.class
//!     }
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = Dispatcher::new();
//! engine.declare_classes(
//!     ClassBatch::new()
//!         .class("Animal")
//!         .subclass("Dog", &["Animal"]),
//! );
//!
//! let kick = engine.declare_method(
//!     "kick",
//!     MethodSig::returning::<String>().virtual_param("Animal"),
//! )?;
//! let dog = engine.class_id("Dog").ok_or("missing class")?;
//! engine.add_override(kick, &[dog], override_fn(|_, _| {
//!     Box::new("bark".to_string())
//! }))?;
//! engine.rebuild()?;
//!
//! let rex = Pet { class: dog };
//! let sound: String = engine.call(kick, &[Arg::Virtual(&rex)])?;
//! assert_eq!(sound, "bark");
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod error;
pub mod hierarchy;
pub mod method;
pub mod runtime;

pub use dispatch::report::{CallHazard, ConfigProblem, RebuildReport, RebuildStats};
pub use dispatch::table::{TablePolicy, EAGER_TUPLE_LIMIT};
pub use error::{CallError, CallResult, RebuildError, RegistrationError, RegistrationResult};
pub use hierarchy::{ClassBatch, ClassClosures, ClassId, CycleReport, HierarchyRegistry};
pub use method::{MethodId, MethodRegistry, MethodSig, OverrideId, ParamSlot};
pub use runtime::{override_fn, Arg, CallArgs, Dispatcher, Instance, Next, OverrideFn};
