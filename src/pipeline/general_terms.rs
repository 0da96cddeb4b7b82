//! Most general taxonomy term carrying a mapping.
//!
//! For each resolved anatomical or gene entity and each top-level class, the
//! shallowest cluster in that class's branch whose label maps to the entity,
//! reported once per exemplar cell of that cluster.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::graph::{GraphQuery, NodePattern, Row};
use crate::pipeline::consistency::SUBCLUSTER_OF;
use crate::pipeline::mapping::{Tabular, TokenMapping};
use crate::source::CLUSTER_NODE_LABELS;
use crate::token::SimplifiedType;

/// Deepest branch level searched below a class.
pub const MAX_BRANCH_DEPTH: usize = 10;
/// Cell-to-cluster exemplar relation.
pub const HAS_EXEMPLAR_DATA: &str = "has_exemplar_data";
/// Graph label of exemplar cells.
pub const EXEMPLAR_NODE_LABEL: &str = "Cell";

/// Query returning every (class, cluster) pair within the branch depth,
/// including each class paired with itself at depth 0.
#[must_use]
pub fn branch_query() -> GraphQuery {
    GraphQuery::descendants(
        NodePattern::labels(CLUSTER_NODE_LABELS.into_iter().chain(["class"])),
        NodePattern::labels(CLUSTER_NODE_LABELS),
        SUBCLUSTER_OF,
        0..=MAX_BRANCH_DEPTH,
        None,
    )
}

/// Query returning every (cluster, exemplar cell) pair.
#[must_use]
pub fn exemplar_query() -> GraphQuery {
    GraphQuery::Linked {
        target: NodePattern::labels(CLUSTER_NODE_LABELS),
        relation: HAS_EXEMPLAR_DATA.to_string(),
        source: NodePattern::labels([EXEMPLAR_NODE_LABEL]),
    }
}

/// A cluster at some depth below a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchMember {
    /// Class curie.
    pub class_curie: String,
    /// Class label.
    pub class_label: String,
    /// Cluster curie.
    pub cluster_curie: String,
    /// Cluster label.
    pub cluster_label: String,
    /// Cluster's graph labels.
    pub cluster_labelset: Vec<String>,
    /// Path length from the class.
    pub depth: usize,
}

impl BranchMember {
    /// Reads a row of [`branch_query`].
    #[must_use]
    pub fn from_row(row: &Row) -> Option<Self> {
        let text = |key: &str| row.get(key).and_then(|v| v.as_str()).map(str::to_string);
        Some(Self {
            class_curie: text("ancestor_curie")?,
            class_label: text("ancestor_label").unwrap_or_default(),
            cluster_curie: text("descendant_curie")?,
            cluster_label: text("descendant_label").unwrap_or_default(),
            cluster_labelset: row
                .get("descendant_labels")
                .and_then(|v| v.as_array())
                .map(|labels| labels.iter().filter_map(|l| l.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
            depth: usize::try_from(row.get("depth")?.as_u64()?).ok()?,
        })
    }
}

/// An exemplar cell attached to a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exemplar {
    /// Cluster curie.
    pub cluster_curie: String,
    /// Cell curie.
    pub cell_curie: String,
    /// Cell label.
    pub cell_label: Option<String>,
}

impl Exemplar {
    /// Reads a row of [`exemplar_query`].
    #[must_use]
    pub fn from_row(row: &Row) -> Option<Self> {
        let text = |key: &str| row.get(key).and_then(|v| v.as_str()).map(str::to_string);
        Some(Self {
            cluster_curie: text("target_curie")?,
            cell_curie: text("source_curie")?,
            cell_label: text("source_label"),
        })
    }
}

/// The shallowest cluster in a class branch mapped to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralTerm {
    /// Class curie.
    pub class_curie: String,
    /// Class label.
    pub class_label: String,
    /// Chosen cluster curie.
    pub cluster_curie: String,
    /// Chosen cluster label.
    pub cluster_label: String,
    /// Chosen cluster's graph labels.
    pub labelset: Vec<String>,
    /// Path length from the class.
    pub depth: usize,
    /// Exemplar cell curie.
    pub cell_curie: String,
    /// Exemplar cell label.
    pub cell_label: Option<String>,
    /// Entity curie.
    pub mapping_curie: String,
    /// Entity label.
    pub mapping_label: Option<String>,
    /// `anatomical` or `gene`.
    pub mapping_type: SimplifiedType,
}

impl Tabular for GeneralTerm {
    const NAME: &'static str = "most_general_terms";
    const COLUMNS: &'static [&'static str] = &[
        "class_curie",
        "class_label",
        "cluster_curie",
        "cluster_label",
        "labelset",
        "depth",
        "cell_curie",
        "cell_label",
        "mapping_curie",
        "mapping_label",
        "mapping_type",
    ];
}

struct Entity<'a> {
    curie: &'a str,
    label: Option<&'a str>,
    clusters: HashSet<&'a str>,
}

fn entities_of(mappings: &[TokenMapping], ty: SimplifiedType) -> Vec<Entity<'_>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<Entity<'_>> = Vec::new();
    for m in mappings.iter().filter(|m| m.simplified_type() == ty && m.is_found()) {
        let Some(curie) = m.resolution.entity_id.as_deref() else {
            continue;
        };
        let i = *index.entry(curie).or_insert_with(|| {
            out.push(Entity {
                curie,
                label: m.resolution.entity_label.as_deref(),
                clusters: HashSet::new(),
            });
            out.len() - 1
        });
        out[i].clusters.insert(m.cluster_id.as_str());
    }
    out
}

/// Finds the most general term per (entity, class).
///
/// Anatomical entities come first, then genes; each in first-resolved
/// order, with classes in the order they appear in `branches`. Depth ties
/// go to the earlier branch row. The chosen cluster yields one term per
/// exemplar cell and none if it has no exemplar.
#[must_use]
pub fn most_general_terms(
    branches: &[BranchMember],
    exemplars: &[Exemplar],
    mappings: &[TokenMapping],
) -> Vec<GeneralTerm> {
    let mut cells: HashMap<&str, Vec<&Exemplar>> = HashMap::new();
    for e in exemplars {
        cells.entry(e.cluster_curie.as_str()).or_default().push(e);
    }

    let mut class_order: Vec<&str> = Vec::new();
    let mut by_class: HashMap<&str, Vec<&BranchMember>> = HashMap::new();
    for b in branches {
        by_class
            .entry(b.class_curie.as_str())
            .or_insert_with(|| {
                class_order.push(b.class_curie.as_str());
                Vec::new()
            })
            .push(b);
    }

    let mut out = Vec::new();
    for ty in [SimplifiedType::Anatomical, SimplifiedType::Gene] {
        for entity in entities_of(mappings, ty) {
            for class in &class_order {
                let best = by_class[class]
                    .iter()
                    .filter(|b| entity.clusters.contains(b.cluster_curie.as_str()))
                    .min_by_key(|b| b.depth);
                let Some(b) = best else {
                    continue;
                };
                for cell in cells.get(b.cluster_curie.as_str()).into_iter().flatten() {
                    out.push(GeneralTerm {
                        class_curie: b.class_curie.clone(),
                        class_label: b.class_label.clone(),
                        cluster_curie: b.cluster_curie.clone(),
                        cluster_label: b.cluster_label.clone(),
                        labelset: b.cluster_labelset.clone(),
                        depth: b.depth,
                        cell_curie: cell.cell_curie.clone(),
                        cell_label: cell.cell_label.clone(),
                        mapping_curie: entity.curie.to_string(),
                        mapping_label: entity.label.map(str::to_string),
                        mapping_type: ty,
                    });
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolutionResult;
    use crate::token::{ParsedToken, TokenDescriptor};

    fn branch(class: &str, cluster: &str, depth: usize) -> BranchMember {
        BranchMember {
            class_curie: format!("WMB:{class}"),
            class_label: class.to_string(),
            cluster_curie: format!("WMB:{cluster}"),
            cluster_label: cluster.to_string(),
            cluster_labelset: vec!["Cell_cluster".to_string(), "WMB".to_string()],
            depth,
        }
    }

    fn exemplar(cluster: &str, cell: &str) -> Exemplar {
        Exemplar {
            cluster_curie: format!("WMB:{cluster}"),
            cell_curie: format!("CL:{cell}"),
            cell_label: Some(format!("{cell} cell")),
        }
    }

    fn mapped(cluster: &str, ty: SimplifiedType, entity: &str) -> TokenMapping {
        TokenMapping {
            cluster_id: format!("WMB:{cluster}"),
            cluster_label: cluster.to_string(),
            token: ParsedToken {
                descriptor: TokenDescriptor {
                    token_text: entity.to_string(),
                    simplified_type: ty,
                    raw_type: ty.as_str().to_string(),
                    display_name: entity.to_string(),
                    primary_identifier: Some(entity.to_string()),
                    secondary_identifier: None,
                    tertiary_identifier: None,
                },
                position: 1,
                original_part: entity.to_string(),
            },
            resolution: ResolutionResult::found(entity, Some(format!("{entity} label")), "curie"),
        }
    }

    #[test]
    fn picks_shallowest_cluster_per_class() {
        let branches = vec![
            branch("c1", "c1", 0),
            branch("c1", "s1", 1),
            branch("c1", "k1", 2),
            branch("c1", "k2", 2),
            branch("c2", "c2", 0),
            branch("c2", "k3", 1),
        ];
        let exemplars = vec![exemplar("s1", "s1"), exemplar("k1", "k1"), exemplar("k3", "k3")];
        let mappings = vec![
            mapped("k1", SimplifiedType::Gene, "ensembl:1"),
            mapped("s1", SimplifiedType::Anatomical, "MBA:1"),
            mapped("k2", SimplifiedType::Anatomical, "MBA:1"),
            mapped("k3", SimplifiedType::Anatomical, "MBA:1"),
            mapped("k1", SimplifiedType::Neurotransmission, "CL:1"),
        ];

        let terms = most_general_terms(&branches, &exemplars, &mappings);
        let got: Vec<_> = terms
            .iter()
            .map(|t| (t.mapping_curie.as_str(), t.class_label.as_str(), t.cluster_label.as_str(), t.depth))
            .collect();
        assert_eq!(
            got,
            vec![
                ("MBA:1", "c1", "s1", 1),
                ("MBA:1", "c2", "k3", 1),
                ("ensembl:1", "c1", "k1", 2),
            ]
        );
        assert_eq!(terms[0].mapping_type, SimplifiedType::Anatomical);
        assert_eq!(terms[0].cell_curie, "CL:s1");
        assert_eq!(terms[0].labelset, vec!["Cell_cluster", "WMB"]);
        assert_eq!(terms[2].mapping_label.as_deref(), Some("ensembl:1 label"));
        assert_eq!(terms[2].cell_label.as_deref(), Some("k1 cell"));
    }

    #[test]
    fn one_term_per_exemplar_and_none_without() {
        let branches = vec![branch("c1", "s1", 1), branch("c1", "k1", 2), branch("c2", "k2", 1)];
        let exemplars = vec![exemplar("s1", "a"), exemplar("s1", "b"), exemplar("k1", "c")];
        let mappings = vec![
            mapped("s1", SimplifiedType::Gene, "ensembl:1"),
            mapped("k1", SimplifiedType::Gene, "ensembl:1"),
            mapped("k2", SimplifiedType::Gene, "ensembl:1"),
        ];

        let terms = most_general_terms(&branches, &exemplars, &mappings);
        let got: Vec<_> = terms
            .iter()
            .map(|t| (t.cluster_curie.as_str(), t.cell_curie.as_str()))
            .collect();
        // k1 is deeper than s1, so its exemplar is not used; k2 has none.
        assert_eq!(got, vec![("WMB:s1", "CL:a"), ("WMB:s1", "CL:b")]);
    }

    #[test]
    fn unresolved_mappings_ignored() {
        let mut m = mapped("k1", SimplifiedType::Gene, "ensembl:1");
        m.resolution = ResolutionResult::not_found();
        assert!(most_general_terms(&[branch("c1", "k1", 1)], &[exemplar("k1", "a")], &[m]).is_empty());
    }

    #[test]
    fn branch_and_exemplar_rows_parse() {
        let row: Row = serde_json::from_value(serde_json::json!({
            "ancestor_curie": "WMB:c1",
            "ancestor_label": "01 IT",
            "descendant_curie": "WMB:k1",
            "descendant_label": "0001 IT",
            "descendant_labels": ["Cell_cluster", "WMB", "cluster"],
            "depth": 2
        }))
        .unwrap();
        let b = BranchMember::from_row(&row).unwrap();
        assert_eq!(b.class_label, "01 IT");
        assert_eq!(b.cluster_curie, "WMB:k1");
        assert_eq!(b.cluster_labelset, vec!["Cell_cluster", "WMB", "cluster"]);
        assert_eq!(b.depth, 2);

        let row: Row = serde_json::from_value(serde_json::json!({
            "target_curie": "WMB:k1",
            "source_curie": "CL:1",
            "source_label": null
        }))
        .unwrap();
        let e = Exemplar::from_row(&row).unwrap();
        assert_eq!(e.cell_curie, "CL:1");
        assert!(e.cell_label.is_none());
    }
}
