//! Rebuild diagnostics: configuration problems, call hazards, statistics.
//!
//! A rebuild never stops at the first finding. Everything diagnosable is
//! collected into one [`RebuildReport`]: fatal [`ConfigProblem`]s abort the
//! rebuild as a whole, non-fatal [`CallHazard`]s describe argument tuples
//! that will error if they are ever dispatched. Hazards are only known for
//! eagerly compiled methods; lazily compiled methods surface the same
//! conditions as call errors instead.

use std::fmt;

/// A fatal configuration problem. Any of these aborts the rebuild and
/// leaves the previously installed tables in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigProblem {
    /// Classes forming an inheritance loop.
    CyclicHierarchy { members: Vec<String> },
    /// An override parameter class outside the declared bound of its slot.
    OverrideOutOfBounds {
        method: String,
        slot: usize,
        declared: String,
        found: String,
    },
}

impl fmt::Display for ConfigProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigProblem::CyclicHierarchy { members } => {
                write!(f, "inheritance cycle: {}", members.join(" -> "))?;
                if let Some(first) = members.first() {
                    write!(f, " -> {first}")?;
                }
                Ok(())
            }
            ConfigProblem::OverrideOutOfBounds {
                method,
                slot,
                declared,
                found,
            } => write!(
                f,
                "override of `{method}` slot {slot}: `{found}` is not a descendant of the declared `{declared}`"
            ),
        }
    }
}

/// A non-fatal finding about one eagerly enumerated argument tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallHazard {
    /// Dispatching this tuple will report an ambiguity.
    Ambiguous {
        method: String,
        tuple: Vec<String>,
        candidates: Vec<String>,
    },
    /// Dispatching this tuple will find no applicable override.
    Uncovered { method: String, tuple: Vec<String> },
}

impl fmt::Display for CallHazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallHazard::Ambiguous {
                method,
                tuple,
                candidates,
            } => write!(
                f,
                "`{method}` is ambiguous for ({}): {}",
                tuple.join(", "),
                candidates.join(" vs ")
            ),
            CallHazard::Uncovered { method, tuple } => write!(
                f,
                "`{method}` has no applicable override for ({})",
                tuple.join(", ")
            ),
        }
    }
}

/// Counters from one rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub classes: usize,
    pub edges: usize,
    pub methods: usize,
    pub overrides: usize,
    /// Methods whose dispatchable domain was enumerated up front.
    pub eager_methods: usize,
    /// Methods resolved on demand through the memoizing cache.
    pub lazy_methods: usize,
    /// Argument tuples compiled eagerly, error outcomes included.
    pub eager_entries: usize,
}

/// Everything one rebuild had to say.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub problems: Vec<ConfigProblem>,
    pub hazards: Vec<CallHazard>,
    pub stats: RebuildStats,
}

impl RebuildReport {
    /// No problems and no hazards.
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty() && self.hazards.is_empty()
    }

    /// Whether the rebuild had to abort.
    pub fn is_fatal(&self) -> bool {
        !self.problems.is_empty()
    }
}

impl fmt::Display for RebuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(
            f,
            "rebuild: {} classes, {} edges, {} methods, {} overrides",
            s.classes, s.edges, s.methods, s.overrides
        )?;
        writeln!(
            f,
            "tables: {} eager ({} entries), {} lazy",
            s.eager_methods, s.eager_entries, s.lazy_methods
        )?;
        if !self.problems.is_empty() {
            writeln!(f, "{} configuration problem(s):", self.problems.len())?;
            for problem in &self.problems {
                writeln!(f, "  {problem}")?;
            }
        }
        if !self.hazards.is_empty() {
            writeln!(f, "{} call hazard(s):", self.hazards.len())?;
            for hazard in &self.hazards {
                writeln!(f, "  {hazard}")?;
            }
        }
        Ok(())
    }
}
