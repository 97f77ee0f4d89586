//! Property tests for hierarchy closures and override resolution.
//!
//! Random DAGs are generated with every base index strictly below the
//! derived index, so they are acyclic by construction. Closures are
//! checked against an independent reachability oracle, and resolution
//! outcomes are checked against the specificity order itself.

use std::collections::BTreeSet;

use proptest::prelude::*;

use prong::dispatch::{ChainEnd, Resolution, SpecificityResolver};
use prong::{ClassBatch, ClassId, HierarchyRegistry};

/// Direct-base indexes per class, each strictly below its own index.
fn arb_edges() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(any::<prop::sample::Index>(), 0..3), 1..20)
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, bases)| {
                    if i == 0 {
                        return Vec::new();
                    }
                    let mut out: Vec<usize> = bases.into_iter().map(|ix| ix.index(i)).collect();
                    out.sort_unstable();
                    out.dedup();
                    out
                })
                .collect()
        })
}

fn build_batch(edges: &[Vec<usize>]) -> ClassBatch {
    let names: Vec<String> = (0..edges.len()).map(|i| format!("C{i}")).collect();
    let mut batch = ClassBatch::new();
    for (i, bases) in edges.iter().enumerate() {
        let base_names: Vec<&str> = bases.iter().map(|&j| names[j].as_str()).collect();
        batch = batch.subclass(&names[i], &base_names);
    }
    batch
}

fn build_registry(edges: &[Vec<usize>]) -> HierarchyRegistry {
    let mut registry = HierarchyRegistry::new();
    registry.declare_classes(build_batch(edges));
    registry
}

/// Reflexive reachability over the raw edges, ascending.
fn oracle_ancestors(edges: &[Vec<usize>], start: usize) -> Vec<u32> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![start];
    while let Some(k) = stack.pop() {
        if seen.insert(k) {
            for &base in &edges[k] {
                stack.push(base);
            }
        }
    }
    seen.into_iter().map(|k| k as u32).collect()
}

proptest! {
    #[test]
    fn prop_closures_match_a_reachability_oracle(edges in arb_edges()) {
        let registry = build_registry(&edges);
        let closures = registry.compute_closures().unwrap();
        prop_assert_eq!(closures.class_count(), edges.len());
        for i in 0..edges.len() {
            let id = ClassId::from_raw(i as u32);
            let got: Vec<u32> = closures.ancestors(id).iter().map(|c| c.to_raw()).collect();
            prop_assert_eq!(got, oracle_ancestors(&edges, i));
        }
    }

    #[test]
    fn prop_descendants_invert_ancestors(edges in arb_edges()) {
        let registry = build_registry(&edges);
        let closures = registry.compute_closures().unwrap();
        for i in 0..edges.len() {
            let class = ClassId::from_raw(i as u32);
            for &anc in closures.ancestors(class) {
                prop_assert!(closures.descendants(anc).contains(&class));
                prop_assert!(closures.is_descendant(class, anc));
            }
            for &desc in closures.descendants(class) {
                prop_assert!(closures.ancestors(desc).contains(&class));
            }
        }
    }

    #[test]
    fn prop_redeclaring_the_same_batch_changes_nothing(edges in arb_edges()) {
        let mut registry = build_registry(&edges);
        let classes = registry.len();
        let edge_count = registry.edge_count();
        registry.declare_classes(build_batch(&edges));
        prop_assert_eq!(registry.len(), classes);
        prop_assert_eq!(registry.edge_count(), edge_count);
    }

    #[test]
    fn prop_resolution_respects_the_specificity_order(
        edges in arb_edges(),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 1..6),
        subject in any::<prop::sample::Index>(),
    ) {
        let registry = build_registry(&edges);
        let closures = registry.compute_closures().unwrap();
        let n = edges.len();
        let params: Vec<Box<[ClassId]>> = picks
            .iter()
            .map(|ix| vec![ClassId::from_raw(ix.index(n) as u32)].into_boxed_slice())
            .collect();
        let tuple = [ClassId::from_raw(subject.index(n) as u32)];
        let resolver = SpecificityResolver::new(&closures);
        let applicable = resolver.applicable(&params, &tuple);

        match resolver.resolve_tuple(&params, &tuple) {
            Resolution::Selected { chain, end } => {
                // The head is the unique maximum: strictly more specific
                // than every other applicable candidate.
                prop_assert!(applicable.contains(&chain[0]));
                for &c in &applicable {
                    if c != chain[0] {
                        prop_assert!(resolver.is_more_specific(
                            &params[chain[0] as usize],
                            &params[c as usize],
                        ));
                    }
                }
                // The chain itself strictly decreases.
                for pair in chain.windows(2) {
                    prop_assert!(resolver.is_more_specific(
                        &params[pair[0] as usize],
                        &params[pair[1] as usize],
                    ));
                }
                if let ChainEnd::Ambiguous(rest) = end {
                    prop_assert!(rest.len() >= 2);
                }
            }
            Resolution::Ambiguous { candidates } => {
                prop_assert!(candidates.len() >= 2);
                for &a in &candidates {
                    for &b in &candidates {
                        if a != b {
                            prop_assert!(!resolver.is_more_specific(
                                &params[a as usize],
                                &params[b as usize],
                            ));
                        }
                    }
                }
            }
            Resolution::NoApplicable => {
                prop_assert!(applicable.is_empty());
            }
        }
    }
}
