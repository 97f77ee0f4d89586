//! Dispatch runtime: the [`Dispatcher`] facade and the call surface.
//!
//! A [`Dispatcher`] owns both registries and the currently installed table
//! snapshot. Registration and [`Dispatcher::rebuild`] take `&mut self`, so
//! the single-writer contract is enforced by the borrow checker; dispatch
//! takes `&self` and can run from any number of threads over the immutable
//! snapshot. A successful rebuild swaps the snapshot wholesale, and calls
//! that entered through the previous one finish on it.
//!
//! Virtual arguments identify their runtime class through the [`Instance`]
//! trait. Override bodies receive the full argument list as [`CallArgs`]
//! plus a [`Next`] handle for the rest of this tuple's chain; the handle
//! replaces any hidden per-override storage for "call the next most
//! specific override".

use std::any::Any;
use std::sync::Arc;

use crate::dispatch::report::RebuildReport;
use crate::dispatch::specificity::{ChainEnd, Resolution};
use crate::dispatch::table::{self, CompiledMethod, CompiledTables};
use crate::error::{CallError, CallResult, RebuildError, RegistrationResult};
use crate::hierarchy::{ClassBatch, ClassId, HierarchyRegistry};
use crate::method::{MethodId, MethodRegistry, MethodSig, OverrideId};

/// An object that can occupy a virtual slot.
///
/// `class_id` must be O(1), side-effect-free, and stable for the object's
/// lifetime. The engine bounds-checks the returned id on every call, so a
/// stale or foreign id is reported instead of silently misdispatched.
pub trait Instance {
    /// The runtime class this object belongs to.
    fn class_id(&self) -> ClassId;
    /// Downcast hook for override bodies.
    fn as_any(&self) -> &dyn Any;
}

/// One call argument, matching one slot of the method signature.
#[derive(Clone, Copy)]
pub enum Arg<'a> {
    /// Participates in dispatch.
    Virtual(&'a dyn Instance),
    /// Forwarded to the selected override untouched.
    Plain(&'a dyn Any),
}

/// The shape shared by every override entry point.
pub type OverrideFn = Arc<dyn Fn(&CallArgs<'_>, Next<'_>) -> Box<dyn Any> + Send + Sync>;

/// Wrap a closure or function as an override entry point.
pub fn override_fn<F>(body: F) -> OverrideFn
where
    F: Fn(&CallArgs<'_>, Next<'_>) -> Box<dyn Any> + Send + Sync + 'static,
{
    Arc::new(body)
}

/// View over one call's arguments, in slot order.
pub struct CallArgs<'a> {
    args: &'a [Arg<'a>],
}

impl<'a> CallArgs<'a> {
    pub(crate) fn new(args: &'a [Arg<'a>]) -> Self {
        CallArgs { args }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// The raw argument in a slot.
    pub fn arg(&self, slot: usize) -> Option<&'a Arg<'a>> {
        self.args.get(slot)
    }

    /// The virtual argument in a slot, if the slot holds one.
    pub fn instance(&self, slot: usize) -> Option<&'a dyn Instance> {
        match self.args.get(slot)? {
            Arg::Virtual(instance) => Some(*instance),
            Arg::Plain(_) => None,
        }
    }

    /// Downcast the argument in a slot to a concrete type. Works for both
    /// virtual and plain arguments.
    pub fn downcast<T: Any>(&self, slot: usize) -> Option<&'a T> {
        match self.args.get(slot)? {
            Arg::Virtual(instance) => instance.as_any().downcast_ref(),
            Arg::Plain(value) => value.downcast_ref(),
        }
    }
}

/// Handle to the rest of the current tuple's override chain.
///
/// Passed into every override invocation. Calling it runs the next most
/// specific override for the same argument tuple; past the end it reports
/// the sentinel [`CallError::NoNextOverride`], or the recorded ambiguity
/// if the chain could not be linearized further.
pub struct Next<'a> {
    tables: &'a CompiledTables,
    method: &'a CompiledMethod,
    tuple: &'a [ClassId],
    rest: &'a [u32],
    end: &'a ChainEnd,
}

impl<'a> Next<'a> {
    /// Whether another override exists below the current one.
    pub fn is_available(&self) -> bool {
        !self.rest.is_empty()
    }

    /// Invoke the next most specific override with the given arguments.
    pub fn call(&self, args: &CallArgs<'_>) -> CallResult<Box<dyn Any>> {
        match self.rest.split_first() {
            Some((&head, rest)) => {
                invoke(self.tables, self.method, self.tuple, head, rest, self.end, args)
            }
            None => match self.end {
                ChainEnd::Exhausted => Err(CallError::NoNextOverride {
                    method: self.method.key.clone(),
                }),
                ChainEnd::Ambiguous(candidates) => {
                    Err(ambiguous_error(self.tables, self.method, self.tuple, candidates))
                }
            },
        }
    }
}

fn ambiguous_error(
    tables: &CompiledTables,
    method: &CompiledMethod,
    tuple: &[ClassId],
    candidates: &[u32],
) -> CallError {
    CallError::AmbiguousCall {
        method: method.key.clone(),
        tuple: table::render_tuple(&tables.class_names, tuple),
        candidates: candidates
            .iter()
            .map(|&c| {
                table::render_override(
                    &method.key,
                    &tables.class_names,
                    &method.param_tuples[c as usize],
                )
            })
            .collect(),
    }
}

fn invoke(
    tables: &CompiledTables,
    method: &CompiledMethod,
    tuple: &[ClassId],
    head: u32,
    rest: &[u32],
    end: &ChainEnd,
    args: &CallArgs<'_>,
) -> CallResult<Box<dyn Any>> {
    let selected = &method.overrides[head as usize];
    let next = Next {
        tables,
        method,
        tuple,
        rest,
        end,
    };
    let output = (selected.entry)(args, next);
    if output.as_ref().type_id() != method.result {
        return Err(CallError::ResultType {
            method: method.key.clone(),
            expected: method.result_name,
        });
    }
    Ok(output)
}

/// Owner of the registries and the installed dispatch tables.
#[derive(Default)]
pub struct Dispatcher {
    hierarchy: HierarchyRegistry,
    methods: MethodRegistry,
    tables: Option<Arc<CompiledTables>>,
    epoch: u64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    /// Register a batch of classes and edges. See [`ClassBatch`].
    pub fn declare_classes(&mut self, batch: ClassBatch) {
        self.hierarchy.declare_classes(batch);
    }

    /// Declare a method under a key. The same key may carry several
    /// methods as long as their slot lists differ.
    pub fn declare_method(&mut self, key: &str, sig: MethodSig) -> RegistrationResult<MethodId> {
        self.methods.declare(&self.hierarchy, key, sig)
    }

    /// Attach an override to a method, one parameter class per virtual
    /// slot. The override only becomes dispatchable at the next rebuild.
    pub fn add_override(
        &mut self,
        method: MethodId,
        params: &[ClassId],
        entry: OverrideFn,
    ) -> RegistrationResult<OverrideId> {
        self.methods.add_override(&self.hierarchy, method, params, entry)
    }

    /// Look up a class by name.
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.hierarchy.class_id(name)
    }

    /// The declared key of a method.
    pub fn method_name(&self, id: MethodId) -> Option<&str> {
        self.methods.method_name(id)
    }

    /// Read access to the class registry.
    pub fn hierarchy(&self) -> &HierarchyRegistry {
        &self.hierarchy
    }

    /// Read access to the method registry.
    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    /// How many rebuilds have been installed. Zero before the first one.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Recompile the dispatch tables from the current registries.
    ///
    /// Safe to repeat at any time; an unchanged configuration produces an
    /// equivalent snapshot. On fatal configuration problems the previous
    /// tables stay installed and the full report is returned as the error.
    pub fn rebuild(&mut self) -> Result<RebuildReport, RebuildError> {
        let epoch = self.epoch + 1;
        let (tables, report) = table::compile(&self.hierarchy, &self.methods, epoch)?;
        self.tables = Some(Arc::new(tables));
        self.epoch = epoch;
        Ok(report)
    }

    /// Dispatch a call through the installed tables.
    ///
    /// The result is the selected override's return value, type-checked
    /// against the method's declared result.
    pub fn dispatch(&self, method: MethodId, args: &[Arg<'_>]) -> CallResult<Box<dyn Any>> {
        let tables = match &self.tables {
            Some(tables) => Arc::clone(tables),
            None => {
                return Err(CallError::RebuildRequired {
                    method: self.method_display(method),
                })
            }
        };
        let compiled = match tables.method(method) {
            Some(compiled) => compiled,
            None => {
                return Err(CallError::RebuildRequired {
                    method: self.method_display(method),
                })
            }
        };

        if args.len() != compiled.slots.len() {
            return Err(CallError::WrongArity {
                method: compiled.key.clone(),
                expected: compiled.slots.len(),
                found: args.len(),
            });
        }

        let mut tuple = Vec::with_capacity(compiled.virtual_slots.len());
        for &slot in compiled.virtual_slots.iter() {
            match &args[slot] {
                Arg::Virtual(instance) => {
                    let class = instance.class_id();
                    if !tables.closures.contains(class) {
                        return Err(CallError::UnregisteredRuntimeClass {
                            method: compiled.key.clone(),
                            slot,
                            class: class.to_raw(),
                        });
                    }
                    tuple.push(class);
                }
                Arg::Plain(_) => {
                    return Err(CallError::ExpectedVirtualArg {
                        method: compiled.key.clone(),
                        slot,
                    });
                }
            }
        }

        let cell = compiled.lookup(&tables.closures, &tuple);
        let call_args = CallArgs::new(args);
        match cell.as_ref() {
            Resolution::Selected { chain, end } => {
                invoke(&tables, compiled, &tuple, chain[0], &chain[1..], end, &call_args)
            }
            Resolution::Ambiguous { candidates } => {
                Err(ambiguous_error(&tables, compiled, &tuple, candidates))
            }
            Resolution::NoApplicable => Err(CallError::NoApplicableOverride {
                method: compiled.key.clone(),
                tuple: table::render_tuple(&tables.class_names, &tuple),
            }),
        }
    }

    /// Dispatch and downcast the result to the declared type.
    pub fn call<R: Any>(&self, method: MethodId, args: &[Arg<'_>]) -> CallResult<R> {
        let output = self.dispatch(method, args)?;
        match output.downcast::<R>() {
            Ok(value) => Ok(*value),
            Err(_) => Err(CallError::ResultType {
                method: self.method_display(method),
                expected: self
                    .methods
                    .method(method)
                    .map(|spec| spec.result_name)
                    .unwrap_or("?"),
            }),
        }
    }

    fn method_display(&self, id: MethodId) -> String {
        self.methods
            .method_name(id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("method#{}", id.to_raw()))
    }
}
