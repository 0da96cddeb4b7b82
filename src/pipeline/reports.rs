//! Aggregate reports over the flat mapping.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::pipeline::mapping::{Tabular, TokenMapping};
use crate::source::ClusterLabel;
use crate::token::SimplifiedType;

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Groups items by key, keeping first-encountered key order.
fn group_by<'a, T, K, F>(items: &'a [T], key: F) -> Vec<(K, Vec<&'a T>)>
where
    K: std::hash::Hash + Eq + Clone,
    F: Fn(&T) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<&T>)> = Vec::new();
    for item in items {
        let k = key(item);
        match index.get(&k) {
            Some(&i) => groups[i].1.push(item),
            None => {
                index.insert(k.clone(), groups.len());
                groups.push((k, vec![item]));
            }
        }
    }
    groups
}

fn distinct_clusters(rows: &[&TokenMapping]) -> usize {
    rows.iter().map(|m| m.cluster_id.as_str()).collect::<HashSet<_>>().len()
}

/// Token counts for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterComposition {
    /// Cluster curie.
    pub cluster_id: String,
    /// Raw cluster label.
    pub cluster_label: String,
    /// All tokens.
    pub total_tokens: usize,
    /// Tokens that resolved.
    pub matched_tokens: usize,
    /// Known-type tokens that did not resolve.
    pub unmatched_tokens: usize,
    /// Unknown-type tokens.
    pub unknown_tokens: usize,
    /// Gene tokens.
    pub gene_tokens: usize,
    /// Anatomical tokens.
    pub anatomical_tokens: usize,
    /// Cell type tokens.
    pub cell_type_tokens: usize,
    /// Neurotransmission tokens.
    pub neurotransmission_tokens: usize,
    /// `matched / total`, 0 for an empty cluster.
    pub match_rate: f64,
}

impl Tabular for ClusterComposition {
    const NAME: &'static str = "cluster_composition";
    const COLUMNS: &'static [&'static str] = &[
        "cluster_id",
        "cluster_label",
        "total_tokens",
        "matched_tokens",
        "unmatched_tokens",
        "unknown_tokens",
        "gene_tokens",
        "anatomical_tokens",
        "cell_type_tokens",
        "neurotransmission_tokens",
        "match_rate",
    ];
}

impl ClusterComposition {
    fn empty(cluster: &ClusterLabel) -> Self {
        Self {
            cluster_id: cluster.cluster_id.clone(),
            cluster_label: cluster.label.clone(),
            total_tokens: 0,
            matched_tokens: 0,
            unmatched_tokens: 0,
            unknown_tokens: 0,
            gene_tokens: 0,
            anatomical_tokens: 0,
            cell_type_tokens: 0,
            neurotransmission_tokens: 0,
            match_rate: 0.0,
        }
    }

    fn add(&mut self, mapping: &TokenMapping) {
        self.total_tokens += 1;
        match mapping.simplified_type() {
            SimplifiedType::Gene => self.gene_tokens += 1,
            SimplifiedType::Anatomical => self.anatomical_tokens += 1,
            SimplifiedType::CellType => self.cell_type_tokens += 1,
            SimplifiedType::Neurotransmission => self.neurotransmission_tokens += 1,
            SimplifiedType::Unknown => self.unknown_tokens += 1,
        }
        if mapping.is_found() {
            self.matched_tokens += 1;
        } else if !mapping.simplified_type().is_unknown() {
            self.unmatched_tokens += 1;
        }
        self.match_rate = ratio(self.matched_tokens, self.total_tokens);
    }
}

/// Per-cluster composition, one entry per cluster (including clusters with
/// no tokens), sorted by cluster label.
#[must_use]
pub fn cluster_compositions(clusters: &[ClusterLabel], mappings: &[TokenMapping]) -> Vec<ClusterComposition> {
    let mut by_cluster: HashMap<&str, Vec<&TokenMapping>> = HashMap::new();
    for m in mappings {
        by_cluster.entry(m.cluster_id.as_str()).or_default().push(m);
    }

    let mut seen = HashSet::new();
    let mut out: Vec<ClusterComposition> = clusters
        .iter()
        .filter(|c| seen.insert(c.cluster_id.as_str()))
        .map(|cluster| {
            let mut composition = ClusterComposition::empty(cluster);
            for m in by_cluster.get(cluster.cluster_id.as_str()).into_iter().flatten() {
                composition.add(m);
            }
            composition
        })
        .collect();
    out.sort_by(|a, b| a.cluster_label.cmp(&b.cluster_label));
    out
}

/// Usage statistics for one token text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Token text.
    pub token_text: String,
    /// Token type.
    pub token_type: SimplifiedType,
    /// Display name.
    pub token_name: String,
    /// Identifier of the first occurrence.
    pub primary_identifier: Option<String>,
    /// Occurrences across all clusters.
    pub usage_count: usize,
    /// Distinct clusters using the token.
    pub cluster_count: usize,
    /// Resolution outcome.
    pub kg_entity_found: bool,
    /// Resolved entity id.
    pub kg_entity_curie: Option<String>,
    /// Resolved entity label.
    pub kg_entity_label: Option<String>,
    /// Strategy that matched.
    pub match_method: Option<String>,
}

impl Tabular for TokenUsage {
    const NAME: &'static str = "token_usage";
    const COLUMNS: &'static [&'static str] = &[
        "token_text",
        "token_type",
        "token_name",
        "primary_identifier",
        "usage_count",
        "cluster_count",
        "kg_entity_found",
        "kg_entity_curie",
        "kg_entity_label",
        "match_method",
    ];
}

/// Per-token usage, sorted by usage count (descending) then token text.
#[must_use]
pub fn token_usage(mappings: &[TokenMapping]) -> Vec<TokenUsage> {
    let mut out: Vec<TokenUsage> = group_by(mappings, |m| m.token_text().to_string())
        .into_iter()
        .map(|(token_text, rows)| {
            let first = rows[0];
            let d = &first.token.descriptor;
            TokenUsage {
                token_text,
                token_type: d.simplified_type,
                token_name: d.display_name.clone(),
                primary_identifier: d.primary_identifier.clone(),
                usage_count: rows.len(),
                cluster_count: distinct_clusters(&rows),
                kg_entity_found: first.resolution.found,
                kg_entity_curie: first.resolution.entity_id.clone(),
                kg_entity_label: first.resolution.entity_label.clone(),
                match_method: first.resolution.method.clone(),
            }
        })
        .collect();
    out.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then_with(|| a.token_text.cmp(&b.token_text)));
    out
}

/// Why a token is a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// Not in the dictionary.
    UnknownToken,
    /// In the dictionary but not found in the graph.
    KgNotFound,
}

/// A token that is unknown or did not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemToken {
    /// Token text.
    pub token_text: String,
    /// Issue bucket.
    pub issue_type: IssueType,
    /// Token type.
    pub token_type: SimplifiedType,
    /// Identifier of the first occurrence.
    pub primary_identifier: Option<String>,
    /// Problem occurrences.
    pub usage_count: usize,
    /// Distinct clusters affected.
    pub cluster_count: usize,
    /// Distinct cluster labels, first-encountered order.
    pub example_clusters: Vec<String>,
}

impl Tabular for ProblemToken {
    const NAME: &'static str = "problem_tokens";
    const COLUMNS: &'static [&'static str] = &[
        "token_text",
        "issue_type",
        "token_type",
        "primary_identifier",
        "usage_count",
        "cluster_count",
        "example_clusters",
    ];
}

/// Problem tokens grouped by text, sorted by usage count (descending) then
/// token text.
///
/// `example_clusters` holds up to `example_limit` distinct cluster labels in
/// first-seen order. A token repeated within one label lists that label once,
/// so examples are per cluster rather than per occurrence.
#[must_use]
pub fn problem_tokens(mappings: &[TokenMapping], example_limit: usize) -> Vec<ProblemToken> {
    let problems: Vec<TokenMapping> = mappings.iter().filter(|m| m.is_problem()).cloned().collect();
    let mut out: Vec<ProblemToken> = group_by(&problems, |m| m.token_text().to_string())
        .into_iter()
        .map(|(token_text, rows)| {
            let first = rows[0];
            let issue_type = if first.simplified_type().is_unknown() {
                IssueType::UnknownToken
            } else {
                IssueType::KgNotFound
            };
            let mut example_clusters: Vec<String> = Vec::new();
            for m in &rows {
                if example_clusters.len() == example_limit {
                    break;
                }
                if !example_clusters.contains(&m.cluster_label) {
                    example_clusters.push(m.cluster_label.clone());
                }
            }
            ProblemToken {
                token_text,
                issue_type,
                token_type: first.simplified_type(),
                primary_identifier: first.token.descriptor.primary_identifier.clone(),
                usage_count: rows.len(),
                cluster_count: distinct_clusters(&rows),
                example_clusters,
            }
        })
        .collect();
    out.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then_with(|| a.token_text.cmp(&b.token_text)));
    out
}

/// Match statistics for one token type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSummary {
    /// Token type.
    pub token_type: SimplifiedType,
    /// Mapping rows of this type.
    pub total_mappings: usize,
    /// Rows that resolved.
    pub successful_matches: usize,
    /// `successful / total * 100`.
    pub match_percentage: f64,
    /// Distinct token texts.
    pub unique_tokens: usize,
}

impl Tabular for TypeSummary {
    const NAME: &'static str = "matching_summary";
    const COLUMNS: &'static [&'static str] = &[
        "token_type",
        "total_mappings",
        "successful_matches",
        "match_percentage",
        "unique_tokens",
    ];
}

/// Overall and per-type match statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    /// All mapping rows.
    pub total_mappings: usize,
    /// Rows that resolved.
    pub found: usize,
    /// Rows with a known type.
    pub eligible: usize,
    /// `found / eligible * 100`, 0 when nothing is eligible.
    pub match_percentage: f64,
    /// One entry per type present, first-encountered order.
    pub per_type: Vec<TypeSummary>,
}

impl MatchSummary {
    /// Computes the summary.
    #[must_use]
    pub fn from_mappings(mappings: &[TokenMapping]) -> Self {
        let found = mappings.iter().filter(|m| m.is_found()).count();
        let eligible = mappings.iter().filter(|m| !m.simplified_type().is_unknown()).count();
        let per_type = group_by(mappings, TokenMapping::simplified_type)
            .into_iter()
            .map(|(token_type, rows)| {
                let successful_matches = rows.iter().filter(|m| m.is_found()).count();
                TypeSummary {
                    token_type,
                    total_mappings: rows.len(),
                    successful_matches,
                    match_percentage: ratio(successful_matches, rows.len()) * 100.0,
                    unique_tokens: rows.iter().map(|m| m.token_text()).collect::<HashSet<_>>().len(),
                }
            })
            .collect();
        Self {
            total_mappings: mappings.len(),
            found,
            eligible,
            match_percentage: ratio(found, eligible) * 100.0,
            per_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolutionResult;
    use crate::token::{ParsedToken, TokenDescriptor};

    fn row(cluster: &str, text: &str, ty: SimplifiedType, found: bool) -> TokenMapping {
        let descriptor = if ty.is_unknown() {
            TokenDescriptor::unknown(text)
        } else {
            TokenDescriptor {
                token_text: text.to_string(),
                simplified_type: ty,
                raw_type: ty.as_str().to_string(),
                display_name: format!("{text} name"),
                primary_identifier: Some(format!("ID:{text}")),
                secondary_identifier: None,
                tertiary_identifier: None,
            }
        };
        TokenMapping {
            cluster_id: format!("WMB:{cluster}"),
            cluster_label: format!("{cluster} label"),
            token: ParsedToken {
                descriptor,
                position: 1,
                original_part: text.to_string(),
            },
            resolution: if found {
                ResolutionResult::found(format!("KG:{text}"), None, "gene_curie_match")
            } else {
                ResolutionResult::not_found()
            },
        }
    }

    fn fixture() -> (Vec<ClusterLabel>, Vec<TokenMapping>) {
        let clusters = vec![
            ClusterLabel::new("WMB:2", "2 label"),
            ClusterLabel::new("WMB:1", "1 label"),
            ClusterLabel::new("WMB:3", "3 label"),
        ];
        let mappings = vec![
            row("1", "Sst", SimplifiedType::Gene, true),
            row("1", "Foo", SimplifiedType::Unknown, false),
            row("1", "ACB", SimplifiedType::Anatomical, false),
            row("2", "Sst", SimplifiedType::Gene, true),
            row("2", "Foo", SimplifiedType::Unknown, false),
            row("2", "Gaba", SimplifiedType::Neurotransmission, true),
            row("2", "Foo", SimplifiedType::Unknown, false),
        ];
        (clusters, mappings)
    }

    #[test]
    fn composition_counts_add_up() {
        let (clusters, mappings) = fixture();
        let comps = cluster_compositions(&clusters, &mappings);
        let labels: Vec<_> = comps.iter().map(|c| c.cluster_label.as_str()).collect();
        assert_eq!(labels, vec!["1 label", "2 label", "3 label"]);

        for c in &comps {
            assert_eq!(c.matched_tokens + c.unmatched_tokens + c.unknown_tokens, c.total_tokens);
        }
        let c1 = &comps[0];
        assert_eq!((c1.total_tokens, c1.matched_tokens, c1.unmatched_tokens, c1.unknown_tokens), (3, 1, 1, 1));
        assert_eq!(c1.anatomical_tokens, 1);
        assert!((c1.match_rate - 1.0 / 3.0).abs() < 1e-9);

        let empty = &comps[2];
        assert_eq!(empty.total_tokens, 0);
        assert!(empty.match_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn usage_sorted_by_count_then_text() {
        let (_, mappings) = fixture();
        let usage = token_usage(&mappings);
        let order: Vec<_> = usage.iter().map(|u| (u.token_text.as_str(), u.usage_count)).collect();
        assert_eq!(order, vec![("Foo", 3), ("Sst", 2), ("ACB", 1), ("Gaba", 1)]);
        assert_eq!(usage[0].cluster_count, 2);
        assert!(usage[1].kg_entity_found);
        assert_eq!(usage[1].kg_entity_curie.as_deref(), Some("KG:Sst"));
    }

    #[test]
    fn problem_tokens_bucket_and_examples() {
        let (_, mappings) = fixture();
        let problems = problem_tokens(&mappings, 3);
        assert_eq!(problems.len(), 2);

        assert_eq!(problems[0].token_text, "Foo");
        assert_eq!(problems[0].issue_type, IssueType::UnknownToken);
        assert_eq!(problems[0].usage_count, 3);
        assert_eq!(problems[0].cluster_count, 2);
        // Three occurrences in two clusters: each label listed once.
        assert_eq!(problems[0].example_clusters, vec!["1 label", "2 label"]);

        assert_eq!(problems[1].token_text, "ACB");
        assert_eq!(problems[1].issue_type, IssueType::KgNotFound);
    }

    #[test]
    fn example_limit_caps_examples() {
        let mappings: Vec<_> = (0..5).map(|i| row(&i.to_string(), "Foo", SimplifiedType::Unknown, false)).collect();
        let problems = problem_tokens(&mappings, 3);
        assert_eq!(problems[0].example_clusters, vec!["0 label", "1 label", "2 label"]);
        assert_eq!(problems[0].usage_count, 5);
    }

    #[test]
    fn summary_percentages() {
        let (_, mappings) = fixture();
        let summary = MatchSummary::from_mappings(&mappings);
        assert_eq!(summary.total_mappings, 7);
        assert_eq!(summary.found, 3);
        assert_eq!(summary.eligible, 4);
        assert!((summary.match_percentage - 75.0).abs() < 1e-9);

        let types: Vec<_> = summary.per_type.iter().map(|t| t.token_type).collect();
        assert_eq!(
            types,
            vec![
                SimplifiedType::Gene,
                SimplifiedType::Unknown,
                SimplifiedType::Anatomical,
                SimplifiedType::Neurotransmission
            ]
        );
        let unknown = &summary.per_type[1];
        assert_eq!((unknown.total_mappings, unknown.unique_tokens), (3, 1));
        assert!(unknown.match_percentage.abs() < f64::EPSILON);
    }

    #[test]
    fn zero_matches_report_zeros() {
        let summary = MatchSummary::from_mappings(&[]);
        assert_eq!(summary.found, 0);
        assert!(summary.match_percentage.abs() < f64::EPSILON);
        assert!(summary.per_type.is_empty());
    }
}
