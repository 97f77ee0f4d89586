//! Method registry: declared methods, their signatures, and overrides.
//!
//! A method is identified by a key plus its slot list. The same key may be
//! declared more than once as long as the slot lists differ; an identical
//! redeclaration is rejected. Each method carries an explicit result type
//! so call sites and override bodies can be checked against it without any
//! inference from call shapes.
//!
//! Overrides attach an entry point to a tuple of parameter classes, one per
//! virtual slot. Registration validates arity and id range immediately; the
//! covariance check against the declared bounds is deferred to the rebuild,
//! where violations are collected into the report instead of failing one at
//! a time.

use std::any::TypeId;
use std::fmt;

use rustc_hash::FxHashMap;
use string_interner::{DefaultStringInterner, DefaultSymbol};

use crate::error::{RegistrationError, RegistrationResult};
use crate::hierarchy::{ClassId, HierarchyRegistry};
use crate::runtime::OverrideFn;

/// Handle to a declared method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(u32);

impl MethodId {
    pub fn to_raw(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a registered override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverrideId(u32);

impl OverrideId {
    pub fn to_raw(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One parameter slot of a method signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSlot {
    /// Dispatched slot. The id is the declared upper bound; overrides must
    /// stay within its descendants.
    Virtual(ClassId),
    /// Forwarded to the selected override untouched.
    Plain,
}

enum SlotDecl {
    Virtual(String),
    Plain,
}

/// Builder for a method signature: result type first, then slots in order.
pub struct MethodSig {
    slots: Vec<SlotDecl>,
    result: TypeId,
    result_name: &'static str,
}

impl MethodSig {
    /// Start a signature with the declared result type.
    pub fn returning<R: 'static>() -> Self {
        MethodSig {
            slots: Vec::new(),
            result: TypeId::of::<R>(),
            result_name: std::any::type_name::<R>(),
        }
    }

    /// Append a virtual slot bounded by the named class.
    pub fn virtual_param(mut self, class: &str) -> Self {
        self.slots.push(SlotDecl::Virtual(class.to_string()));
        self
    }

    /// Append a pass-through slot.
    pub fn plain_param(mut self) -> Self {
        self.slots.push(SlotDecl::Plain);
        self
    }
}

/// A declared method.
#[derive(Debug)]
pub(crate) struct MethodSpec {
    pub(crate) key: DefaultSymbol,
    pub(crate) slots: Box<[ParamSlot]>,
    /// Indexes of the virtual slots, in slot order.
    pub(crate) virtual_slots: Box<[usize]>,
    pub(crate) result: TypeId,
    pub(crate) result_name: &'static str,
    pub(crate) overrides: Vec<OverrideId>,
}

/// A registered override: parameter classes plus the entry point.
pub(crate) struct Override {
    pub(crate) method: MethodId,
    pub(crate) params: Box<[ClassId]>,
    pub(crate) entry: OverrideFn,
}

impl fmt::Debug for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Override")
            .field("method", &self.method)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Registry of declared methods and their overrides.
#[derive(Debug, Default)]
pub struct MethodRegistry {
    interner: DefaultStringInterner,
    methods: Vec<MethodSpec>,
    by_key: FxHashMap<DefaultSymbol, Vec<MethodId>>,
    overrides: Vec<Override>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        MethodRegistry::default()
    }

    /// Declare a method, resolving slot class names against the hierarchy.
    pub(crate) fn declare(
        &mut self,
        hierarchy: &HierarchyRegistry,
        key: &str,
        sig: MethodSig,
    ) -> RegistrationResult<MethodId> {
        let mut slots = Vec::with_capacity(sig.slots.len());
        let mut virtual_slots = Vec::new();
        for (index, decl) in sig.slots.iter().enumerate() {
            match decl {
                SlotDecl::Virtual(name) => {
                    let class = hierarchy.class_id(name).ok_or_else(|| {
                        RegistrationError::UnknownClass { name: name.clone() }
                    })?;
                    virtual_slots.push(index);
                    slots.push(ParamSlot::Virtual(class));
                }
                SlotDecl::Plain => slots.push(ParamSlot::Plain),
            }
        }
        if virtual_slots.is_empty() {
            return Err(RegistrationError::NoVirtualSlots {
                key: key.to_string(),
            });
        }

        let sym = self.interner.get_or_intern(key);
        let slots = slots.into_boxed_slice();
        if let Some(ids) = self.by_key.get(&sym) {
            if ids
                .iter()
                .any(|id| self.methods[id.index()].slots == slots)
            {
                return Err(RegistrationError::DuplicateMethod {
                    key: key.to_string(),
                });
            }
        }

        let id = MethodId(self.methods.len() as u32);
        self.methods.push(MethodSpec {
            key: sym,
            slots,
            virtual_slots: virtual_slots.into_boxed_slice(),
            result: sig.result,
            result_name: sig.result_name,
            overrides: Vec::new(),
        });
        self.by_key.entry(sym).or_default().push(id);
        Ok(id)
    }

    /// Attach an override to a method.
    pub(crate) fn add_override(
        &mut self,
        hierarchy: &HierarchyRegistry,
        method: MethodId,
        params: &[ClassId],
        entry: OverrideFn,
    ) -> RegistrationResult<OverrideId> {
        let spec = self.methods.get(method.index()).ok_or(
            RegistrationError::UnknownMethod {
                raw: method.to_raw(),
            },
        )?;
        let key = self.key_str(spec).to_string();

        if params.len() != spec.virtual_slots.len() {
            return Err(RegistrationError::OverrideArity {
                method: key,
                expected: spec.virtual_slots.len(),
                found: params.len(),
            });
        }
        for (slot, &class) in params.iter().enumerate() {
            if !hierarchy.contains(class) {
                return Err(RegistrationError::OverrideClassRange {
                    method: key,
                    slot,
                    class: class.to_raw(),
                });
            }
        }

        let id = OverrideId(self.overrides.len() as u32);
        self.overrides.push(Override {
            method,
            params: params.into(),
            entry,
        });
        self.methods[method.index()].overrides.push(id);
        Ok(id)
    }

    pub(crate) fn method(&self, id: MethodId) -> Option<&MethodSpec> {
        self.methods.get(id.index())
    }

    /// The declared key of a method.
    pub fn method_name(&self, id: MethodId) -> Option<&str> {
        let spec = self.methods.get(id.index())?;
        self.interner.resolve(spec.key)
    }

    pub(crate) fn key_str(&self, spec: &MethodSpec) -> &str {
        self.interner.resolve(spec.key).unwrap_or("?")
    }

    pub(crate) fn specs(&self) -> impl Iterator<Item = (MethodId, &MethodSpec)> {
        self.methods
            .iter()
            .enumerate()
            .map(|(i, spec)| (MethodId(i as u32), spec))
    }

    pub(crate) fn override_spec(&self, id: OverrideId) -> Option<&Override> {
        self.overrides.get(id.index())
    }

    pub(crate) fn overrides(&self) -> impl Iterator<Item = (OverrideId, &Override)> {
        self.overrides
            .iter()
            .enumerate()
            .map(|(i, ov)| (OverrideId(i as u32), ov))
    }

    /// Number of declared methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Number of registered overrides across all methods.
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}
