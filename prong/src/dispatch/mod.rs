//! Dispatch table construction and override selection.
//!
//! # Module Structure
//!
//! - [`specificity`]: the partial order on overrides and per-tuple
//!   resolution into chains
//! - [`table`]: the rebuild pass that compiles registries into immutable
//!   [`table::CompiledTables`]
//! - [`report`]: configuration problems, call hazards, and rebuild
//!   statistics collected along the way

pub mod report;
pub mod specificity;
pub mod table;

pub use report::{CallHazard, ConfigProblem, RebuildReport, RebuildStats};
pub use specificity::{ChainEnd, Resolution, SpecificityResolver};
pub use table::{CompiledTables, TablePolicy, EAGER_TUPLE_LIMIT};
