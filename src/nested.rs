//! Exact-mode nested feature filter.
//!
//! Filtering runs in two passes over one record:
//!
//! 1. **Decide.** The feature tree is flattened into an arena addressed by
//!    stable node ids. A recursive walk, bounded by [`MAX_DEPTH`], marks
//!    every node that matches the attribute table as [`Retain::Whole`] and
//!    every ancestor of such a node as [`Retain::Path`].
//! 2. **Materialize.** Marked top-level nodes are copied out. Whole nodes
//!    keep their full subtree; path nodes keep only marked children.
//!
//! Strand and position bounds are then applied to the surviving top-level
//! features only.

use crate::feature::{Feature, Record};
use crate::selection::{passes, AttributeFilterTable, SelectionCriteria};
use log::warn;
use rustc_hash::FxHashMap;
use std::fmt;

/// Index of a node in a [`FeatureArena`].
pub type NodeId = usize;

/// Levels inspected by the attribute pass: parent, child, grandchild.
pub const MAX_DEPTH: usize = 3;

struct Node<'a> {
    feature: &'a Feature,
    children: Vec<NodeId>,
}

/// Borrowed view of a record's feature tree with stable node ids.
pub struct FeatureArena<'a> {
    nodes: Vec<Node<'a>>,
    roots: Vec<NodeId>,
}

impl<'a> FeatureArena<'a> {
    pub fn from_record(record: &'a Record) -> Self {
        let mut arena = Self {
            nodes: Vec::with_capacity(record.feature_count()),
            roots: Vec::with_capacity(record.features.len()),
        };
        for feature in &record.features {
            let id = arena.push(feature);
            arena.roots.push(id);
        }
        arena
    }

    fn push(&mut self, feature: &'a Feature) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            feature,
            children: Vec::with_capacity(feature.children.len()),
        });
        for child in &feature.children {
            let child_id = self.push(child);
            self.nodes[id].children.push(child_id);
        }
        id
    }

    /// Top-level node ids in record order.
    #[inline]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    #[inline]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    #[inline]
    pub fn feature(&self, id: NodeId) -> &'a Feature {
        self.nodes[id].feature
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Why a node survives the attribute pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retain {
    /// The node matched; its subtree is kept as-is.
    Whole,
    /// A descendant matched; only marked children are kept.
    Path,
}

/// Retention decisions for one arena.
#[derive(Debug, Default)]
pub struct RetentionMarks {
    marks: FxHashMap<NodeId, Retain>,
}

impl RetentionMarks {
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<Retain> {
        self.marks.get(&id).copied()
    }

    #[inline]
    pub fn is_retained(&self, id: NodeId) -> bool {
        self.marks.contains_key(&id)
    }

    /// Whole wins over Path.
    fn mark(&mut self, id: NodeId, retain: Retain) {
        let slot = self.marks.entry(id).or_insert(retain);
        if retain == Retain::Whole {
            *slot = Retain::Whole;
        }
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

/// Decide which nodes the attribute table retains.
pub fn mark_attribute_matches(
    arena: &FeatureArena<'_>,
    table: &AttributeFilterTable,
) -> RetentionMarks {
    let mut marks = RetentionMarks::default();
    for &root in arena.roots() {
        mark_subtree(arena, root, MAX_DEPTH, table, &mut marks);
    }
    marks
}

/// Returns true when the node or a descendant within `depth` levels matched.
fn mark_subtree(
    arena: &FeatureArena<'_>,
    id: NodeId,
    depth: usize,
    table: &AttributeFilterTable,
    marks: &mut RetentionMarks,
) -> bool {
    if table.matches(arena.feature(id)) {
        marks.mark(id, Retain::Whole);
        return true;
    }
    if depth <= 1 {
        return false;
    }

    // Every child is visited so that all matching branches get marked.
    let mut found = false;
    for &child in arena.children(id) {
        found |= mark_subtree(arena, child, depth - 1, table, marks);
    }
    if found {
        marks.mark(id, Retain::Path);
    }
    found
}

/// Copy a marked node out of the arena.
fn materialize(arena: &FeatureArena<'_>, id: NodeId, marks: &RetentionMarks) -> Option<Feature> {
    match marks.get(id)? {
        Retain::Whole => Some(arena.feature(id).clone()),
        Retain::Path => {
            let mut feature = without_children(arena.feature(id));
            feature.children = arena
                .children(id)
                .iter()
                .filter_map(|&child| materialize(arena, child, marks))
                .collect();
            Some(feature)
        }
    }
}

fn without_children(feature: &Feature) -> Feature {
    Feature {
        seqid: feature.seqid.clone(),
        source: feature.source.clone(),
        kind: feature.kind.clone(),
        location: feature.location.clone(),
        score: feature.score.clone(),
        strand: feature.strand,
        phase: feature.phase.clone(),
        attributes: feature.attributes.clone(),
        children: Vec::new(),
    }
}

/// Counters accumulated across filtered records.
#[derive(Debug, Clone, Default)]
pub struct FilterStats {
    /// Records seen
    pub records: usize,
    /// Top-level features seen
    pub features_in: usize,
    /// Top-level features surviving the attribute pass
    pub attribute_survivors: usize,
    /// Top-level features written
    pub features_out: usize,
    /// Features dropped because their coordinates were unreadable
    pub malformed: usize,
}

impl fmt::Display for FilterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Records: {}, Features in: {}, After attributes: {}, Kept: {}, Malformed: {}",
            self.records,
            self.features_in,
            self.attribute_survivors,
            self.features_out,
            self.malformed
        )
    }
}

/// Nested feature filter over whole records.
#[derive(Debug, Clone, Default)]
pub struct NestedFeatureFilter {
    pub criteria: SelectionCriteria,
}

impl NestedFeatureFilter {
    pub fn new(criteria: SelectionCriteria) -> Self {
        Self { criteria }
    }

    /// Filter one record.
    pub fn filter(&self, record: &Record) -> Record {
        let mut stats = FilterStats::default();
        self.filter_counted(record, &mut stats)
    }

    /// Filter one record, updating `stats`.
    pub fn filter_counted(&self, record: &Record, stats: &mut FilterStats) -> Record {
        stats.records += 1;
        stats.features_in += record.features.len();

        let survivors: Vec<Feature> = match &self.criteria.attributes {
            Some(table) => {
                let arena = FeatureArena::from_record(record);
                let marks = mark_attribute_matches(&arena, table);
                arena
                    .roots()
                    .iter()
                    .filter_map(|&root| materialize(&arena, root, &marks))
                    .collect()
            }
            None => record.features.clone(),
        };
        stats.attribute_survivors += survivors.len();

        let features: Vec<Feature> = survivors
            .into_iter()
            .filter(|feature| match passes(feature, &self.criteria) {
                Ok(keep) => keep,
                Err(e) => {
                    warn!("Skipping feature on {}: {}", record.id, e);
                    stats.malformed += 1;
                    false
                }
            })
            .collect();
        stats.features_out += features.len();

        Record {
            id: record.id.clone(),
            features,
            sequence: record.sequence.clone(),
            declared_len: record.declared_len,
        }
    }

    /// Filter records in order.
    pub fn filter_all(&self, records: &[Record]) -> (Vec<Record>, FilterStats) {
        let mut stats = FilterStats::default();
        let filtered = records
            .iter()
            .map(|record| self.filter_counted(record, &mut stats))
            .collect();
        (filtered, stats)
    }
}
