//! Dispatch table compilation and the per-method lookup path.
//!
//! One rebuild produces one immutable [`CompiledTables`] snapshot from the
//! current registries. The snapshot owns everything dispatch needs: the
//! class closures, per-method override entries, and the resolved cells per
//! argument tuple. Installing a snapshot is a wholesale pointer swap; old
//! snapshots are never mutated, so readers that entered through the
//! previous one finish on it undisturbed.
//!
//! # Table policy
//!
//! The dispatchable domain of a method is the product of the descendant
//! sets of its declared bounds. Methods whose domain holds at most
//! [`EAGER_TUPLE_LIMIT`] tuples are compiled eagerly: every tuple gets a
//! cell up front, and ambiguous or uncovered tuples are recorded in the
//! rebuild report as call hazards. Larger domains are compiled lazily: the
//! first dispatch of a tuple resolves it and memoizes the cell, and the
//! same findings surface as call errors. Either way a resolved cell never
//! changes until the next rebuild, and repeated lookups are O(1).

use std::any::TypeId;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::dispatch::report::{CallHazard, ConfigProblem, RebuildReport};
use crate::dispatch::specificity::{Resolution, SpecificityResolver};
use crate::error::RebuildError;
use crate::hierarchy::{ClassClosures, ClassId, HierarchyRegistry};
use crate::method::{MethodId, MethodRegistry, OverrideId, ParamSlot};
use crate::runtime::OverrideFn;

/// Largest dispatchable domain that is still enumerated eagerly.
pub const EAGER_TUPLE_LIMIT: usize = 4096;

/// How one method's table was populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TablePolicy {
    /// Full domain enumerated at rebuild time.
    Eager,
    /// Tuples resolved and memoized on first dispatch.
    Lazy,
}

/// One override as the dispatch path sees it.
pub(crate) struct CompiledOverride {
    pub(crate) source: OverrideId,
    pub(crate) entry: OverrideFn,
}

/// Everything dispatch needs to serve one method.
pub(crate) struct CompiledMethod {
    pub(crate) key: String,
    pub(crate) slots: Box<[ParamSlot]>,
    pub(crate) virtual_slots: Box<[usize]>,
    pub(crate) result: TypeId,
    pub(crate) result_name: &'static str,
    pub(crate) overrides: Box<[CompiledOverride]>,
    /// Parameter tuples, parallel to `overrides`; resolver input.
    pub(crate) param_tuples: Box<[Box<[ClassId]>]>,
    pub(crate) policy: TablePolicy,
    eager: FxHashMap<Box<[ClassId]>, Arc<Resolution>>,
    /// Cold-path memo. The only structure mutated during steady-state
    /// dispatch; a lost insert race keeps the first cell.
    lazy: RwLock<FxHashMap<Box<[ClassId]>, Arc<Resolution>>>,
}

impl CompiledMethod {
    /// Resolve one argument tuple to its cell.
    ///
    /// Eager entries are a plain map hit. Anything else goes through the
    /// memoizing cache: read, resolve outside the lock on a miss, then
    /// insert-or-keep-first so concurrent first lookups converge on one
    /// cell.
    pub(crate) fn lookup(&self, closures: &ClassClosures, tuple: &[ClassId]) -> Arc<Resolution> {
        if let Some(cell) = self.eager.get(tuple) {
            return Arc::clone(cell);
        }

        {
            let cache = self.lazy.read();
            if let Some(cell) = cache.get(tuple) {
                return Arc::clone(cell);
            }
        }

        let resolver = SpecificityResolver::new(closures);
        let cell = Arc::new(resolver.resolve_tuple(&self.param_tuples, tuple));
        trace!(method = %self.key, ?tuple, "memoized cold dispatch tuple");

        let mut cache = self.lazy.write();
        Arc::clone(cache.entry(tuple.into()).or_insert(cell))
    }
}

/// One rebuild's immutable output.
pub struct CompiledTables {
    epoch: u64,
    pub(crate) closures: ClassClosures,
    pub(crate) class_names: Box<[String]>,
    pub(crate) methods: Box<[CompiledMethod]>,
}

impl std::fmt::Debug for CompiledTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Override entries are `dyn Fn`, so the methods can only be counted.
        f.debug_struct("CompiledTables")
            .field("epoch", &self.epoch)
            .field("class_names", &self.class_names)
            .field("methods", &self.methods.len())
            .finish()
    }
}

impl CompiledTables {
    /// Which rebuild produced this snapshot.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn method(&self, id: MethodId) -> Option<&CompiledMethod> {
        self.methods.get(id.index())
    }

    pub(crate) fn class_name(&self, id: ClassId) -> &str {
        self.class_names
            .get(id.index())
            .map(String::as_str)
            .unwrap_or("?")
    }
}

pub(crate) fn render_tuple(names: &[String], tuple: &[ClassId]) -> Vec<String> {
    tuple
        .iter()
        .map(|&id| {
            names
                .get(id.index())
                .cloned()
                .unwrap_or_else(|| format!("class#{}", id.to_raw()))
        })
        .collect()
}

pub(crate) fn render_override(key: &str, names: &[String], params: &[ClassId]) -> String {
    format!("{key}({})", render_tuple(names, params).join(", "))
}

fn name_of(hierarchy: &HierarchyRegistry, id: ClassId) -> String {
    hierarchy
        .class_name(id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("class#{}", id.to_raw()))
}

/// Compile a snapshot from the current registries.
///
/// Collects every diagnosable problem before deciding the outcome: all
/// cycles, then all covariance violations. Any fatal problem aborts with
/// the full report; otherwise the snapshot and its report are returned
/// together.
pub(crate) fn compile(
    hierarchy: &HierarchyRegistry,
    methods: &MethodRegistry,
    epoch: u64,
) -> Result<(CompiledTables, RebuildReport), RebuildError> {
    let mut report = RebuildReport::default();
    report.stats.classes = hierarchy.len();
    report.stats.edges = hierarchy.edge_count();
    report.stats.methods = methods.len();
    report.stats.overrides = methods.override_count();

    let closures = match hierarchy.compute_closures() {
        Ok(closures) => closures,
        Err(cycles) => {
            for cycle in cycles {
                report.problems.push(ConfigProblem::CyclicHierarchy {
                    members: cycle
                        .members
                        .iter()
                        .map(|&id| name_of(hierarchy, id))
                        .collect(),
                });
            }
            debug!(epoch, problems = report.problems.len(), "rebuild aborted");
            return Err(RebuildError::Config { report });
        }
    };

    for (_, override_spec) in methods.overrides() {
        let Some(spec) = methods.method(override_spec.method) else {
            continue;
        };
        for (position, &param) in override_spec.params.iter().enumerate() {
            let slot = spec.virtual_slots[position];
            let ParamSlot::Virtual(bound) = spec.slots[slot] else {
                continue;
            };
            if !closures.is_descendant(param, bound) {
                report.problems.push(ConfigProblem::OverrideOutOfBounds {
                    method: methods.key_str(spec).to_string(),
                    slot,
                    declared: name_of(hierarchy, bound),
                    found: name_of(hierarchy, param),
                });
            }
        }
    }
    if !report.problems.is_empty() {
        debug!(epoch, problems = report.problems.len(), "rebuild aborted");
        return Err(RebuildError::Config { report });
    }

    let class_names: Box<[String]> = hierarchy
        .classes()
        .map(|(_, name)| name.to_string())
        .collect();

    let mut compiled_methods = Vec::with_capacity(methods.len());
    for (_, spec) in methods.specs() {
        let key = methods.key_str(spec).to_string();

        let mut overrides = Vec::with_capacity(spec.overrides.len());
        let mut param_tuples: Vec<Box<[ClassId]>> = Vec::with_capacity(spec.overrides.len());
        for &override_id in &spec.overrides {
            let Some(override_spec) = methods.override_spec(override_id) else {
                continue;
            };
            overrides.push(CompiledOverride {
                source: override_id,
                entry: Arc::clone(&override_spec.entry),
            });
            param_tuples.push(override_spec.params.clone());
        }

        let bounds: Vec<ClassId> = spec
            .slots
            .iter()
            .filter_map(|slot| match slot {
                ParamSlot::Virtual(bound) => Some(*bound),
                ParamSlot::Plain => None,
            })
            .collect();
        let domains: Vec<&[ClassId]> = bounds
            .iter()
            .map(|&bound| closures.descendants(bound))
            .collect();
        let domain_size = domains
            .iter()
            .fold(1usize, |acc, domain| acc.saturating_mul(domain.len()));
        let policy = if domain_size <= EAGER_TUPLE_LIMIT {
            TablePolicy::Eager
        } else {
            TablePolicy::Lazy
        };

        let mut eager = FxHashMap::default();
        match policy {
            TablePolicy::Eager => {
                let resolver = SpecificityResolver::new(&closures);
                for tuple in TupleDomain::new(&domains) {
                    let resolution = resolver.resolve_tuple(&param_tuples, &tuple);
                    match &resolution {
                        Resolution::Ambiguous { candidates } => {
                            report.hazards.push(CallHazard::Ambiguous {
                                method: key.clone(),
                                tuple: render_tuple(&class_names, &tuple),
                                candidates: candidates
                                    .iter()
                                    .map(|&c| {
                                        render_override(
                                            &key,
                                            &class_names,
                                            &param_tuples[c as usize],
                                        )
                                    })
                                    .collect(),
                            });
                        }
                        Resolution::NoApplicable => {
                            report.hazards.push(CallHazard::Uncovered {
                                method: key.clone(),
                                tuple: render_tuple(&class_names, &tuple),
                            });
                        }
                        Resolution::Selected { .. } => {}
                    }
                    eager.insert(tuple, Arc::new(resolution));
                }
                report.stats.eager_methods += 1;
                report.stats.eager_entries += eager.len();
            }
            TablePolicy::Lazy => {
                report.stats.lazy_methods += 1;
            }
        }

        compiled_methods.push(CompiledMethod {
            key,
            slots: spec.slots.clone(),
            virtual_slots: spec.virtual_slots.clone(),
            result: spec.result,
            result_name: spec.result_name,
            overrides: overrides.into_boxed_slice(),
            param_tuples: param_tuples.into_boxed_slice(),
            policy,
            eager,
            lazy: RwLock::new(FxHashMap::default()),
        });
    }

    debug!(
        epoch,
        classes = report.stats.classes,
        methods = report.stats.methods,
        eager_entries = report.stats.eager_entries,
        hazards = report.hazards.len(),
        "dispatch tables rebuilt"
    );

    Ok((
        CompiledTables {
            epoch,
            closures,
            class_names,
            methods: compiled_methods.into_boxed_slice(),
        },
        report,
    ))
}

/// Odometer over the cartesian product of the slot domains.
struct TupleDomain<'a> {
    domains: &'a [&'a [ClassId]],
    next: Option<Vec<usize>>,
}

impl<'a> TupleDomain<'a> {
    fn new(domains: &'a [&'a [ClassId]]) -> Self {
        let start = if domains.iter().all(|domain| !domain.is_empty()) {
            Some(vec![0; domains.len()])
        } else {
            None
        };
        TupleDomain {
            domains,
            next: start,
        }
    }
}

impl Iterator for TupleDomain<'_> {
    type Item = Box<[ClassId]>;

    fn next(&mut self) -> Option<Box<[ClassId]>> {
        let mut indexes = self.next.take()?;
        let tuple: Box<[ClassId]> = indexes
            .iter()
            .zip(self.domains)
            .map(|(&i, domain)| domain[i])
            .collect();

        // Advance with the last slot cycling fastest.
        let mut position = indexes.len();
        loop {
            if position == 0 {
                break;
            }
            position -= 1;
            indexes[position] += 1;
            if indexes[position] < self.domains[position].len() {
                self.next = Some(indexes);
                break;
            }
            indexes[position] = 0;
        }

        Some(tuple)
    }
}
