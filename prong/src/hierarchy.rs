//! Class hierarchy registry: names, direct-base edges, and closures.
//!
//! Classes are declared in batches. A batch lists class names together with
//! the direct-base edges visible among them; any name mentioned in a batch,
//! whether as a class or as a base, counts as declared. Edges can only
//! connect names mentioned in the same batch, so a base and its derived
//! class must co-occur in at least one batch for the edge to exist. Batches
//! are additive and idempotent: re-declaring a known class is a no-op and
//! new edges accumulate.
//!
//! Declaration performs no graph validation. The registry stores raw edges
//! until [`HierarchyRegistry::compute_closures`] runs as part of a rebuild,
//! which detects cycles and produces the reflexive ancestor and descendant
//! sets dispatch works with. Closure computation is quadratic in the worst
//! case, which is acceptable at rebuild frequency.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use string_interner::{DefaultStringInterner, DefaultSymbol};

/// Identifies a registered class.
///
/// Ids are dense indexes assigned in first-mention order. The raw value is
/// exposed so an external object model can tag its instances; every engine
/// entry point bounds-checks raw ids before trusting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    /// Reconstruct an id from its raw value.
    pub fn from_raw(raw: u32) -> Self {
        ClassId(raw)
    }

    /// The raw value backing this id.
    pub fn to_raw(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One registration batch: classes plus the direct-base edges among them.
///
/// Builder order is preserved, so id assignment is deterministic for a
/// given declaration sequence.
#[derive(Debug, Clone, Default)]
pub struct ClassBatch {
    entries: IndexMap<String, Vec<String>>,
}

impl ClassBatch {
    pub fn new() -> Self {
        ClassBatch::default()
    }

    /// Mention a class with no bases visible in this batch.
    pub fn class(mut self, name: &str) -> Self {
        self.entries.entry(name.to_string()).or_default();
        self
    }

    /// Mention a class derived from the given bases. The bases count as
    /// mentioned in this batch as well.
    pub fn subclass(mut self, name: &str, bases: &[&str]) -> Self {
        for base in bases {
            self.entries.entry(base.to_string()).or_default();
        }
        let entry = self.entries.entry(name.to_string()).or_default();
        for base in bases {
            entry.push(base.to_string());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
struct ClassNode {
    name: DefaultSymbol,
    /// Direct bases, deduplicated, in first-declaration order.
    direct_bases: Vec<ClassId>,
    /// Inverse of `direct_bases`, maintained for the topological walk.
    direct_derived: Vec<ClassId>,
}

/// Registry of declared classes and their raw inheritance edges.
#[derive(Debug, Default)]
pub struct HierarchyRegistry {
    interner: DefaultStringInterner,
    nodes: Vec<ClassNode>,
    by_name: FxHashMap<DefaultSymbol, ClassId>,
}

impl HierarchyRegistry {
    pub fn new() -> Self {
        HierarchyRegistry::default()
    }

    /// Register every class and edge mentioned in the batch.
    ///
    /// Unknown names allocate new ids in mention order; known names keep
    /// their ids. Edges already present are ignored.
    pub fn declare_classes(&mut self, batch: ClassBatch) {
        for (name, bases) in batch.entries {
            let id = self.intern_class(&name);
            for base in bases {
                let base_id = self.intern_class(&base);
                if !self.nodes[id.index()].direct_bases.contains(&base_id) {
                    self.nodes[id.index()].direct_bases.push(base_id);
                    self.nodes[base_id.index()].direct_derived.push(id);
                }
            }
        }
    }

    fn intern_class(&mut self, name: &str) -> ClassId {
        let sym = self.interner.get_or_intern(name);
        if let Some(&id) = self.by_name.get(&sym) {
            return id;
        }
        let id = ClassId(self.nodes.len() as u32);
        self.nodes.push(ClassNode {
            name: sym,
            direct_bases: Vec::new(),
            direct_derived: Vec::new(),
        });
        self.by_name.insert(sym, id);
        id
    }

    /// Look up a class by name.
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        let sym = self.interner.get(name)?;
        self.by_name.get(&sym).copied()
    }

    /// The declared name of a class.
    pub fn class_name(&self, id: ClassId) -> Option<&str> {
        let node = self.nodes.get(id.index())?;
        self.interner.resolve(node.name)
    }

    /// Iterate declared classes in id order.
    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &str)> {
        self.nodes.iter().enumerate().map(|(i, node)| {
            let name = self.interner.resolve(node.name).unwrap_or("?");
            (ClassId(i as u32), name)
        })
    }

    /// Number of declared classes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the id was issued by this registry.
    pub fn contains(&self, id: ClassId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Number of direct-base edges across all classes.
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.direct_bases.len()).sum()
    }

    /// Direct bases of a class, in declaration order.
    pub fn direct_bases(&self, id: ClassId) -> &[ClassId] {
        self.nodes
            .get(id.index())
            .map(|n| n.direct_bases.as_slice())
            .unwrap_or(&[])
    }

    /// Recompute the reflexive ancestor and descendant sets for every class.
    ///
    /// Runs a topological pass over the raw edges. If the graph has cycles,
    /// one report per cyclic component names every class involved and no
    /// closures are produced. Nothing is cached between calls; each rebuild
    /// starts from the raw edges.
    pub fn compute_closures(&self) -> Result<ClassClosures, Vec<CycleReport>> {
        let n = self.nodes.len();
        let mut remaining_bases: Vec<usize> =
            self.nodes.iter().map(|node| node.direct_bases.len()).collect();

        let mut queue: VecDeque<ClassId> = (0..n)
            .filter(|&i| remaining_bases[i] == 0)
            .map(|i| ClassId(i as u32))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for &derived in &self.nodes[id.index()].direct_derived {
                remaining_bases[derived.index()] -= 1;
                if remaining_bases[derived.index()] == 0 {
                    queue.push_back(derived);
                }
            }
        }

        if order.len() < n {
            return Err(self.collect_cycles(&remaining_bases));
        }

        // Bases come before derived classes in `order`, so one pass suffices.
        let mut ancestor_sets: Vec<FxHashSet<ClassId>> = vec![FxHashSet::default(); n];
        for &id in &order {
            let mut set = FxHashSet::default();
            set.insert(id);
            for &base in &self.nodes[id.index()].direct_bases {
                for &anc in &ancestor_sets[base.index()] {
                    set.insert(anc);
                }
            }
            ancestor_sets[id.index()] = set;
        }

        let ancestors: Vec<Box<[ClassId]>> = ancestor_sets
            .iter()
            .map(|set| {
                let mut v: Vec<ClassId> = set.iter().copied().collect();
                v.sort_unstable();
                v.into_boxed_slice()
            })
            .collect();

        // Iterating ids in ascending order keeps each descendant list sorted.
        let mut descendant_lists: Vec<Vec<ClassId>> = vec![Vec::new(); n];
        for i in 0..n {
            let id = ClassId(i as u32);
            for &anc in ancestors[i].iter() {
                descendant_lists[anc.index()].push(id);
            }
        }
        let descendants = descendant_lists
            .into_iter()
            .map(Vec::into_boxed_slice)
            .collect();

        Ok(ClassClosures {
            ancestors,
            descendants,
        })
    }

    /// Group the classes left stuck after the topological pass into
    /// strongly connected components and report each component that
    /// contains a loop.
    ///
    /// A class can be stuck either because it sits on a cycle or because
    /// one of its ancestors does. Components keep the two apart: every
    /// cyclic class lands in a looped component, while a class that merely
    /// derives from a cyclic one forms a loop-free singleton and is not
    /// reported.
    fn collect_cycles(&self, remaining_bases: &[usize]) -> Vec<CycleReport> {
        let stuck: FxHashSet<ClassId> = (0..self.nodes.len())
            .filter(|&i| remaining_bases[i] > 0)
            .map(|i| ClassId(i as u32))
            .collect();

        // Kosaraju over the stuck subgraph: a postorder pass along base
        // edges, then component collection along derived edges in reverse
        // postorder. Every cycle lies wholly inside the stuck set.
        let mut finished: Vec<ClassId> = Vec::with_capacity(stuck.len());
        let mut visited: FxHashSet<ClassId> = FxHashSet::default();
        for i in 0..self.nodes.len() {
            let root = ClassId(i as u32);
            if !stuck.contains(&root) || !visited.insert(root) {
                continue;
            }
            let mut stack: Vec<(ClassId, usize)> = vec![(root, 0)];
            while let Some(&(id, cursor)) = stack.last() {
                match self.nodes[id.index()].direct_bases.get(cursor) {
                    Some(&base) => {
                        if let Some(top) = stack.last_mut() {
                            top.1 += 1;
                        }
                        if stuck.contains(&base) && visited.insert(base) {
                            stack.push((base, 0));
                        }
                    }
                    None => {
                        finished.push(id);
                        stack.pop();
                    }
                }
            }
        }

        let mut assigned: FxHashSet<ClassId> = FxHashSet::default();
        let mut cycles = Vec::new();
        for &root in finished.iter().rev() {
            if !assigned.insert(root) {
                continue;
            }
            let mut members = Vec::new();
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                members.push(id);
                for &derived in &self.nodes[id.index()].direct_derived {
                    if stuck.contains(&derived) && assigned.insert(derived) {
                        stack.push(derived);
                    }
                }
            }
            let self_loop =
                members.len() == 1 && self.nodes[root.index()].direct_bases.contains(&root);
            if members.len() > 1 || self_loop {
                members.sort_unstable();
                cycles.push(CycleReport { members });
            }
        }

        cycles
    }
}

/// One cyclic component of the hierarchy. Every member lies on at least
/// one inheritance loop inside the component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// The component's classes, sorted by id.
    pub members: Vec<ClassId>,
}

/// Reflexive ancestor and descendant sets for every class, produced by one
/// closure computation and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct ClassClosures {
    /// Sorted, per class: the class itself plus everything it derives from.
    ancestors: Vec<Box<[ClassId]>>,
    /// Sorted, per class: the class itself plus everything deriving from it.
    descendants: Vec<Box<[ClassId]>>,
}

impl ClassClosures {
    /// Number of classes covered by this closure set.
    pub fn class_count(&self) -> usize {
        self.ancestors.len()
    }

    /// Whether the id falls inside this closure set.
    pub fn contains(&self, id: ClassId) -> bool {
        id.index() < self.ancestors.len()
    }

    /// Whether `ancestor` is `of` itself or one of its transitive bases.
    pub fn is_ancestor(&self, ancestor: ClassId, of: ClassId) -> bool {
        match self.ancestors.get(of.index()) {
            Some(set) => set.binary_search(&ancestor).is_ok(),
            None => false,
        }
    }

    /// Whether `descendant` is `of` itself or one of its transitive
    /// derived classes.
    pub fn is_descendant(&self, descendant: ClassId, of: ClassId) -> bool {
        self.is_ancestor(of, descendant)
    }

    /// The sorted reflexive ancestor set of a class.
    pub fn ancestors(&self, id: ClassId) -> &[ClassId] {
        self.ancestors
            .get(id.index())
            .map(|s| &**s)
            .unwrap_or(&[])
    }

    /// The sorted reflexive descendant set of a class.
    pub fn descendants(&self, id: ClassId) -> &[ClassId] {
        self.descendants
            .get(id.index())
            .map(|s| &**s)
            .unwrap_or(&[])
    }
}
