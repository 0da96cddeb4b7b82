//! Neurotransmission consistency across taxonomy levels.
//!
//! A taxonomy node is consistent when some elementary neurotransmitter is
//! present in the signal of every cluster beneath it. Compound signals such
//! as `Glut-GABA` are treated as sets of dash-delimited parts.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::{GraphQuery, NodePattern, Row};
use crate::pipeline::mapping::Tabular;
use crate::source::CLUSTER_NODE_LABELS;

/// Taxonomy levels that are checked.
pub const PARENT_LEVELS: [&str; 3] = ["class", "subclass", "supertype"];
/// Leaf level carrying the signal.
pub const LEAF_LEVEL: &str = "cluster";
/// Cluster property holding the neurotransmitter combination.
pub const SIGNAL_PROPERTY: &str = "nt_type_combo_label";
/// Child-to-parent relation.
pub const SUBCLUSTER_OF: &str = "subcluster_of";

/// Query returning every (taxonomy node, leaf cluster) pair within three
/// levels, for leaves that carry a signal.
#[must_use]
pub fn hierarchy_query() -> GraphQuery {
    GraphQuery::descendants(
        NodePattern::labels(CLUSTER_NODE_LABELS).with_any_of(PARENT_LEVELS),
        NodePattern::labels(CLUSTER_NODE_LABELS.into_iter().chain([LEAF_LEVEL])),
        SUBCLUSTER_OF,
        1..=3,
        Some(SIGNAL_PROPERTY.to_string()),
    )
}

/// One leaf cluster under one taxonomy node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyMember {
    /// Taxonomy node curie.
    pub parent_curie: String,
    /// Taxonomy node label.
    pub parent_label: String,
    /// Taxonomy node's graph labels.
    pub parent_labelset: Vec<String>,
    /// Leaf cluster curie.
    pub child_curie: String,
    /// Leaf signal, e.g. `Glut-GABA`.
    pub signal: String,
}

impl HierarchyMember {
    /// Reads a row of [`hierarchy_query`]. A list-valued `signal` reads as
    /// its first element. Rows without string fields are skipped.
    #[must_use]
    pub fn from_row(row: &Row) -> Option<Self> {
        let text = |key: &str| row.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let parent_labelset = row
            .get("ancestor_labels")
            .and_then(|v| v.as_array())
            .map(|labels| labels.iter().filter_map(|l| l.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        Some(Self {
            parent_curie: text("ancestor_curie")?,
            parent_label: text("ancestor_label").unwrap_or_default(),
            parent_labelset,
            child_curie: text("descendant_curie")?,
            signal: match row.get("signal")? {
                Value::Array(items) => items.first()?.as_str()?.to_string(),
                other => other.as_str()?.to_string(),
            },
        })
    }
}

/// Consistency verdict for one taxonomy node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConsistency {
    /// Taxonomy node curie.
    pub parent_curie: String,
    /// Taxonomy node label.
    pub parent_label: String,
    /// Taxonomy node's graph labels.
    pub parent_labelset: Vec<String>,
    /// Distinct qualifying children.
    pub cluster_count: usize,
    /// Some elementary value is shared by every child.
    pub is_consistent: bool,
    /// Values shared by every child, sorted.
    pub consistent_values: Vec<String>,
    /// Distinct child signals, sorted.
    pub patterns: Vec<String>,
    /// Number of distinct child signals.
    pub pattern_variety: usize,
}

impl Tabular for NodeConsistency {
    const NAME: &'static str = "neurotransmission_consistency";
    const COLUMNS: &'static [&'static str] = &[
        "parent_curie",
        "parent_label",
        "parent_labelset",
        "cluster_count",
        "is_consistent",
        "consistent_values",
        "patterns",
        "pattern_variety",
    ];
}

/// Splits a compound signal into its elementary values.
#[must_use]
pub fn elementary_values(signal: &str) -> BTreeSet<&str> {
    signal.split('-').map(str::trim).filter(|v| !v.is_empty()).collect()
}

/// Aggregates members per taxonomy node.
///
/// Children are deduplicated by curie (first occurrence wins). Nodes with at
/// most one child are skipped. Output is sorted by node label, then curie.
#[must_use]
pub fn aggregate_consistency(members: &[HierarchyMember]) -> Vec<NodeConsistency> {
    let mut order: Vec<&str> = Vec::new();
    let mut children: HashMap<&str, Vec<&HierarchyMember>> = HashMap::new();
    let mut seen: HashSet<(&str, &str)> = HashSet::new();

    for m in members {
        if !seen.insert((m.parent_curie.as_str(), m.child_curie.as_str())) {
            continue;
        }
        children
            .entry(m.parent_curie.as_str())
            .or_insert_with(|| {
                order.push(m.parent_curie.as_str());
                Vec::new()
            })
            .push(m);
    }

    let mut out: Vec<NodeConsistency> = order
        .into_iter()
        .filter_map(|parent| {
            let kids = children.get(parent)?;
            if kids.len() <= 1 {
                return None;
            }
            let mut shared = elementary_values(&kids[0].signal);
            for kid in &kids[1..] {
                let values = elementary_values(&kid.signal);
                shared.retain(|v| values.contains(v));
            }
            let patterns: BTreeSet<&str> = kids.iter().map(|k| k.signal.as_str()).collect();
            Some(NodeConsistency {
                parent_curie: parent.to_string(),
                parent_label: kids[0].parent_label.clone(),
                parent_labelset: kids[0].parent_labelset.clone(),
                cluster_count: kids.len(),
                is_consistent: !shared.is_empty(),
                consistent_values: shared.into_iter().map(str::to_string).collect(),
                pattern_variety: patterns.len(),
                patterns: patterns.into_iter().map(str::to_string).collect(),
            })
        })
        .collect();
    out.sort_by(|a, b| {
        a.parent_label
            .cmp(&b.parent_label)
            .then_with(|| a.parent_curie.cmp(&b.parent_curie))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(parent: &str, child: &str, signal: &str) -> HierarchyMember {
        HierarchyMember {
            parent_curie: format!("WMB:{parent}"),
            parent_label: parent.to_string(),
            parent_labelset: vec!["Cell_cluster".to_string(), "class".to_string()],
            child_curie: format!("WMB:{child}"),
            signal: signal.to_string(),
        }
    }

    #[test]
    fn shared_value_is_consistent() {
        let out = aggregate_consistency(&[member("p", "a", "A-B"), member("p", "b", "A-C")]);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_consistent);
        assert_eq!(out[0].consistent_values, vec!["A"]);
        assert_eq!(out[0].patterns, vec!["A-B", "A-C"]);
        assert_eq!(out[0].pattern_variety, 2);
    }

    #[test]
    fn disjoint_values_are_inconsistent() {
        let out = aggregate_consistency(&[member("p", "a", "A-B"), member("p", "b", "C-D")]);
        assert!(!out[0].is_consistent);
        assert!(out[0].consistent_values.is_empty());
    }

    #[test]
    fn order_and_duplicates_do_not_matter() {
        let out = aggregate_consistency(&[
            member("p", "a", "B-A-A"),
            member("p", "b", "A-B"),
            member("p", "c", "B-A"),
        ]);
        assert_eq!(out[0].consistent_values, vec!["A", "B"]);
        assert_eq!(out[0].cluster_count, 3);
        assert_eq!(out[0].pattern_variety, 3);
    }

    #[test]
    fn single_child_nodes_skipped_and_children_deduplicated() {
        let out = aggregate_consistency(&[
            member("solo", "a", "Glut"),
            member("dup", "a", "Glut"),
            member("dup", "a", "Glut"),
            member("pair", "a", "Glut"),
            member("pair", "b", "Glut-GABA"),
        ]);
        let parents: Vec<_> = out.iter().map(|n| n.parent_label.as_str()).collect();
        assert_eq!(parents, vec!["pair"]);
        assert_eq!(out[0].consistent_values, vec!["Glut"]);
    }

    #[test]
    fn rows_without_signal_are_dropped() {
        let mut row = Row::new();
        row.insert("ancestor_curie".to_string(), "WMB:p".into());
        row.insert("descendant_curie".to_string(), "WMB:a".into());
        assert!(HierarchyMember::from_row(&row).is_none());

        row.insert("signal".to_string(), "Glut".into());
        row.insert("ancestor_labels".to_string(), serde_json::json!(["Cell_cluster", "class"]));
        let m = HierarchyMember::from_row(&row).unwrap();
        assert_eq!(m.parent_labelset, vec!["Cell_cluster", "class"]);
        assert_eq!(m.parent_label, "");
    }

    #[test]
    fn list_valued_signal_reads_first_element() {
        let mut row = Row::new();
        row.insert("ancestor_curie".to_string(), "WMB:p".into());
        row.insert("descendant_curie".to_string(), "WMB:a".into());
        row.insert("signal".to_string(), serde_json::json!(["Glut-GABA", "Glut"]));
        assert_eq!(HierarchyMember::from_row(&row).unwrap().signal, "Glut-GABA");

        row.insert("signal".to_string(), serde_json::json!([]));
        assert!(HierarchyMember::from_row(&row).is_none());
    }
}
