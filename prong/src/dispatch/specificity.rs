//! Override selection: applicability, the specificity partial order, and
//! per-tuple linearization into next chains.
//!
//! # Algorithm Overview
//!
//! 1. **Filter applicable**: keep overrides whose parameter classes are
//!    reflexive ancestors of the tuple's classes, slot by slot
//! 2. **Find maximal**: an override is maximal if no other applicable
//!    override is strictly more specific
//! 3. **Select or reject**: a unique maximal element wins; several maximal
//!    elements are an ambiguity, never an arbitrary pick
//! 4. **Linearize**: repeat the extraction on the remainder to build the
//!    next chain for this exact tuple
//!
//! Specificity is a partial order: override A is more specific than B when
//! every slot of A is a descendant-or-equal of the matching slot of B and
//! at least one slot is strictly more derived. Unrelated slot classes make
//! the pair incomparable.

use crate::hierarchy::{ClassClosures, ClassId};

/// Outcome of resolving one argument tuple against a method's overrides.
///
/// Indexes refer to positions in the override slice handed to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A unique most specific override, followed by the rest of its chain
    /// in strictly decreasing specificity.
    Selected { chain: Vec<u32>, end: ChainEnd },
    /// Two or more maximal overrides tied at the head.
    Ambiguous { candidates: Vec<u32> },
    /// Nothing applicable.
    NoApplicable,
}

/// How a next chain terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEnd {
    /// The applicable set was exhausted; stepping past the end is the
    /// sentinel "no next" case.
    Exhausted,
    /// The remainder had no unique maximal element; stepping here reports
    /// an ambiguity instead of inventing an order.
    Ambiguous(Vec<u32>),
}

/// Applicability and specificity queries over one rebuild's closures.
pub struct SpecificityResolver<'a> {
    closures: &'a ClassClosures,
}

impl<'a> SpecificityResolver<'a> {
    pub fn new(closures: &'a ClassClosures) -> Self {
        SpecificityResolver { closures }
    }

    /// Check if an override applies to the given argument tuple.
    ///
    /// Every parameter class must be the tuple class itself or one of its
    /// transitive bases.
    pub fn is_applicable(&self, params: &[ClassId], tuple: &[ClassId]) -> bool {
        params.len() == tuple.len()
            && params
                .iter()
                .zip(tuple)
                .all(|(param, arg)| self.closures.is_ancestor(*param, *arg))
    }

    /// Check if parameter tuple `a` is more specific than `b`.
    ///
    /// `a` is more specific than `b` if:
    /// - every slot of `a` is at least as derived as the slot of `b`
    /// - at least one slot of `a` is strictly more derived
    pub fn is_more_specific(&self, a: &[ClassId], b: &[ClassId]) -> bool {
        if a.len() != b.len() {
            return false;
        }

        let mut all_at_least = true;
        let mut some_strictly = false;

        for (pa, pb) in a.iter().zip(b) {
            if !self.closures.is_descendant(*pa, *pb) {
                all_at_least = false;
                break;
            }
            if pa != pb {
                some_strictly = true;
            }
        }

        all_at_least && some_strictly
    }

    /// Indexes of the overrides applicable to the tuple, in input order.
    pub fn applicable(&self, params: &[Box<[ClassId]>], tuple: &[ClassId]) -> Vec<u32> {
        params
            .iter()
            .enumerate()
            .filter(|(_, p)| self.is_applicable(p, tuple))
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// The maximal elements of `candidates` under the specificity order.
    ///
    /// An override is maximal if no other candidate is strictly more
    /// specific.
    pub fn find_maximal(&self, params: &[Box<[ClassId]>], candidates: &[u32]) -> Vec<u32> {
        let mut maximal = Vec::new();

        for &candidate in candidates {
            let dominated = candidates.iter().any(|&other| {
                other != candidate
                    && self.is_more_specific(
                        &params[other as usize],
                        &params[candidate as usize],
                    )
            });

            if !dominated {
                maximal.push(candidate);
            }
        }

        maximal
    }

    /// Linearize the applicable set for one tuple into a next chain.
    ///
    /// The unique maximal element is extracted repeatedly. A tie at the
    /// first step is a head ambiguity; a tie later truncates the chain
    /// with [`ChainEnd::Ambiguous`].
    pub fn resolve_tuple(&self, params: &[Box<[ClassId]>], tuple: &[ClassId]) -> Resolution {
        let mut remaining = self.applicable(params, tuple);
        if remaining.is_empty() {
            return Resolution::NoApplicable;
        }

        let mut chain = Vec::new();
        while !remaining.is_empty() {
            let maximal = self.find_maximal(params, &remaining);
            if maximal.len() != 1 {
                if chain.is_empty() {
                    return Resolution::Ambiguous { candidates: maximal };
                }
                return Resolution::Selected {
                    chain,
                    end: ChainEnd::Ambiguous(maximal),
                };
            }
            let winner = maximal[0];
            chain.push(winner);
            remaining.retain(|&c| c != winner);
        }

        Resolution::Selected {
            chain,
            end: ChainEnd::Exhausted,
        }
    }
}
