//! Mapping pipeline.
//!
//! One run: fetch labels, tokenize, flatten to (cluster, token) rows, resolve
//! every distinct key exactly once, broadcast the results, then aggregate.
//! The resolution memo is complete before any row is built.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::dictionary::TokenDictionary;
use crate::error::{LabelMapError, LabelMapResult};
use crate::graph::GraphQueryExecutor;
use crate::resolver::{EntityResolver, ResolutionKey, ResolutionResult};
use crate::source::{ClusterLabel, ClusterLabelSource};
use crate::tokenizer::{LabelDiagnostic, LabelTokenizer};

pub mod consistency;
pub mod general_terms;
mod mapping;
mod reports;

pub use consistency::{aggregate_consistency, HierarchyMember, NodeConsistency};
pub use general_terms::{most_general_terms, BranchMember, Exemplar, GeneralTerm};
pub use mapping::{MappingRecord, Relation, Tabular, TokenMapping};
pub use reports::{
    cluster_compositions, problem_tokens, token_usage, ClusterComposition, IssueType, MatchSummary, ProblemToken,
    TokenUsage, TypeSummary,
};

/// Unique identifier for a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(uuid::Uuid);

impl RunId {
    /// Creates a new random run id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything one run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Run identifier.
    pub run_id: RunId,
    /// When the run finished.
    pub generated_at: DateTime<Utc>,
    /// Fingerprint of the dictionary used.
    pub dictionary_fingerprint: String,
    /// Clusters read from the source.
    pub clusters: Vec<ClusterLabel>,
    /// Flat (cluster, token) mapping.
    pub mappings: Vec<TokenMapping>,
    /// Per-cluster composition.
    pub compositions: Vec<ClusterComposition>,
    /// Per-token usage.
    pub token_usage: Vec<TokenUsage>,
    /// Unknown or unresolved tokens.
    pub problem_tokens: Vec<ProblemToken>,
    /// Overall and per-type match statistics.
    pub summary: MatchSummary,
    /// Labels that produced no tokens.
    pub diagnostics: Vec<LabelDiagnostic>,
}

impl PipelineOutput {
    /// The flat mapping and aggregate relations, in a fixed order.
    ///
    /// # Errors
    /// `Internal` if a record fails to serialize.
    pub fn relations(&self) -> LabelMapResult<Vec<Relation>> {
        let records: Vec<MappingRecord<'_>> = self.mappings.iter().map(MappingRecord::from).collect();
        Ok(vec![
            Relation::from_records(&records)?,
            Relation::from_records(&self.compositions)?,
            Relation::from_records(&self.token_usage)?,
            Relation::from_records(&self.problem_tokens)?,
            Relation::from_records(&self.summary.per_type)?,
        ])
    }
}

/// Runs the label-to-entity mapping.
pub struct MappingPipeline {
    tokenizer: LabelTokenizer,
    resolver: EntityResolver,
    executor: Arc<dyn GraphQueryExecutor>,
    config: PipelineConfig,
}

impl fmt::Debug for MappingPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingPipeline")
            .field("dictionary_entries", &self.tokenizer.dictionary().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MappingPipeline {
    /// Creates a pipeline.
    ///
    /// # Errors
    /// `Config` if the configuration is invalid.
    pub fn new(
        dictionary: Arc<TokenDictionary>,
        executor: Arc<dyn GraphQueryExecutor>,
        config: PipelineConfig,
    ) -> LabelMapResult<Self> {
        config.validate()?;
        Ok(Self {
            tokenizer: LabelTokenizer::new(dictionary),
            resolver: EntityResolver::new(Arc::clone(&executor)),
            executor,
            config,
        })
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the pipeline over every label from `source`.
    ///
    /// # Errors
    /// `Query` if the label source fails. Lookup failures never surface here.
    pub fn run(&self, source: &dyn ClusterLabelSource) -> LabelMapResult<PipelineOutput> {
        let clusters = source.fetch_labels()?;
        log::info!("Fetched {} cluster labels", clusters.len());

        let mut diagnostics = Vec::new();
        let mut tokenized = Vec::with_capacity(clusters.len());
        for cluster in &clusters {
            let mut label = self.tokenizer.tokenize(&cluster.label);
            if let Some(d) = label.diagnostic.take() {
                diagnostics.push(d);
            }
            tokenized.push((cluster, label.tokens));
        }

        let mut seen = HashSet::new();
        let keys: Vec<ResolutionKey> = tokenized
            .iter()
            .flat_map(|(_, tokens)| tokens.iter().map(ResolutionKey::for_token))
            .filter(|k| seen.insert(k.clone()))
            .collect();
        let occurrences: usize = tokenized.iter().map(|(_, t)| t.len()).sum();
        log::info!(
            "Tokenized {} labels into {} tokens ({} distinct keys, {} labels skipped)",
            clusters.len(),
            occurrences,
            keys.len(),
            diagnostics.len()
        );

        let memo = self.resolver.resolve_all(&keys, self.config.resolve_workers).into_map();

        let mut mappings = Vec::with_capacity(occurrences);
        for (cluster, tokens) in tokenized {
            for token in tokens {
                let resolution = memo
                    .get(&ResolutionKey::for_token(&token))
                    .cloned()
                    .ok_or_else(|| LabelMapError::internal(format!("unresolved key for token '{}'", token.token_text())))?;
                mappings.push(TokenMapping {
                    cluster_id: cluster.cluster_id.clone(),
                    cluster_label: cluster.label.clone(),
                    token,
                    resolution,
                });
            }
        }

        let summary = MatchSummary::from_mappings(&mappings);
        log::info!(
            "Resolved {}/{} known-type tokens ({:.1}%)",
            summary.found,
            summary.eligible,
            summary.match_percentage
        );

        Ok(PipelineOutput {
            run_id: RunId::new(),
            generated_at: Utc::now(),
            dictionary_fingerprint: self.tokenizer.dictionary().fingerprint(),
            compositions: cluster_compositions(&clusters, &mappings),
            token_usage: token_usage(&mappings),
            problem_tokens: problem_tokens(&mappings, self.config.example_limit),
            summary,
            clusters,
            mappings,
            diagnostics,
        })
    }

    /// Resolves a single key, bypassing the memo.
    #[must_use]
    pub fn resolve(&self, key: &ResolutionKey) -> ResolutionResult {
        self.resolver.resolve(key)
    }

    /// Neurotransmission consistency per taxonomy node.
    ///
    /// # Errors
    /// `Query` if the hierarchy query fails.
    pub fn consistency_report(&self) -> LabelMapResult<Vec<NodeConsistency>> {
        let rows = self.executor.execute(&consistency::hierarchy_query())?;
        let members: Vec<_> = rows.iter().filter_map(HierarchyMember::from_row).collect();
        let report = aggregate_consistency(&members);
        log::info!(
            "{}/{} taxonomy nodes have consistent neurotransmission",
            report.iter().filter(|n| n.is_consistent).count(),
            report.len()
        );
        Ok(report)
    }

    /// Most general cluster per (entity, class) for resolved anatomical and
    /// gene mappings, with the chosen cluster's exemplar cells.
    ///
    /// # Errors
    /// `Query` if the branch or exemplar query fails.
    pub fn general_terms_report(&self, mappings: &[TokenMapping]) -> LabelMapResult<Vec<GeneralTerm>> {
        let rows = self.executor.execute(&general_terms::branch_query())?;
        let branches: Vec<_> = rows.iter().filter_map(BranchMember::from_row).collect();
        let rows = self.executor.execute(&general_terms::exemplar_query())?;
        let exemplars: Vec<_> = rows.iter().filter_map(Exemplar::from_row).collect();
        let terms = most_general_terms(&branches, &exemplars, mappings);
        log::info!("Found {} most general terms", terms.len());
        Ok(terms)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::QueryError;
    use crate::graph::{GraphQuery, InMemoryGraph, Row};
    use crate::token::{SimplifiedType, TokenDescriptor};

    fn entry(token: &str, ty: SimplifiedType, id: &str) -> TokenDescriptor {
        TokenDescriptor {
            token_text: token.to_string(),
            simplified_type: ty,
            raw_type: ty.as_str().to_string(),
            display_name: token.to_string(),
            primary_identifier: Some(id.to_string()),
            secondary_identifier: None,
            tertiary_identifier: None,
        }
    }

    fn dictionary() -> Arc<TokenDictionary> {
        Arc::new(TokenDictionary::from_descriptors([
            entry("Sst", SimplifiedType::Gene, "ENSEMBL:1"),
            entry("ACB", SimplifiedType::Anatomical, "MBA:56"),
            entry("Gaba", SimplifiedType::Neurotransmission, "CL:0000617"),
        ]))
    }

    fn graph() -> InMemoryGraph {
        let g = InMemoryGraph::new();
        g.add_node(["Gene"], json!({"curie": "ensembl:1", "label": "Sst"})).unwrap();
        g.add_node(["MBA"], json!({"curie": "MBA:56", "label": "ACB"})).unwrap();
        g
    }

    struct FailingSource;

    impl ClusterLabelSource for FailingSource {
        fn fetch_labels(&self) -> Result<Vec<ClusterLabel>, QueryError> {
            Err(QueryError::transport("connection refused"))
        }
    }

    #[test]
    fn rows_share_one_resolution_per_key() {
        let pipeline = MappingPipeline::new(dictionary(), Arc::new(graph()), PipelineConfig::default()).unwrap();
        let source = vec![
            ClusterLabel::new("WMB:1", "1 ACB Sst Gaba"),
            ClusterLabel::new("WMB:2", "2 Sst Foo_4"),
            ClusterLabel::new("WMB:3", "no ordinal"),
        ];
        let out = pipeline.run(&source).unwrap();

        assert_eq!(out.clusters.len(), 3);
        assert_eq!(out.mappings.len(), 5);
        assert_eq!(out.diagnostics.len(), 1);

        let sst: Vec<_> = out.mappings.iter().filter(|m| m.token_text() == "Sst").collect();
        assert_eq!(sst.len(), 2);
        assert_eq!(sst[0].resolution, sst[1].resolution);
        assert!(sst[0].resolution.found);

        // Gaba has no Cell entity in the graph.
        assert_eq!(out.summary.found, 3);
        assert_eq!(out.summary.eligible, 4);
        assert_eq!(out.compositions.len(), 3);
        assert_eq!(out.problem_tokens.len(), 2);
        assert_eq!(out.dictionary_fingerprint, dictionary().fingerprint());
    }

    #[test]
    fn relations_in_fixed_order() {
        let pipeline = MappingPipeline::new(dictionary(), Arc::new(graph()), PipelineConfig::default()).unwrap();
        let out = pipeline.run(&vec![ClusterLabel::new("WMB:1", "1 Sst")]).unwrap();
        let names: Vec<_> = out.relations().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![
                "cluster_token_mapping",
                "cluster_composition",
                "token_usage",
                "problem_tokens",
                "matching_summary"
            ]
        );
    }

    #[test]
    fn source_failure_is_fatal() {
        let pipeline = MappingPipeline::new(dictionary(), Arc::new(graph()), PipelineConfig::default()).unwrap();
        let err = pipeline.run(&FailingSource).unwrap_err();
        assert!(err.is_query());
    }

    #[test]
    fn invalid_config_rejected() {
        let config = PipelineConfig {
            resolve_workers: 0,
            ..PipelineConfig::default()
        };
        let err = MappingPipeline::new(dictionary(), Arc::new(graph()), config).unwrap_err();
        assert!(matches!(err, LabelMapError::Config(_)));
    }

    #[test]
    fn hierarchy_reports_read_the_graph() {
        let g = graph();
        let class = g
            .add_node(["Cell_cluster", "WMB", "class"], json!({"curie": "WMB:c1", "label": "01 IT"}))
            .unwrap();
        let k1 = g
            .add_node(
                ["Cell_cluster", "WMB", "cluster"],
                json!({"curie": "WMB:1", "label": "1 ACB Sst", "nt_type_combo_label": ["Glut-GABA"]}),
            )
            .unwrap();
        let k2 = g
            .add_node(
                ["Cell_cluster", "WMB", "cluster"],
                json!({"curie": "WMB:2", "label": "2 Sst", "nt_type_combo_label": ["Glut"]}),
            )
            .unwrap();
        g.add_edge(k1, "subcluster_of", class).unwrap();
        g.add_edge(k2, "subcluster_of", class).unwrap();
        let cell = g
            .add_node(["Cell"], json!({"curie": "CL:x1", "label": "exemplar 1"}))
            .unwrap();
        g.add_edge(cell, "has_exemplar_data", k1).unwrap();
        let g = Arc::new(g);

        let pipeline = MappingPipeline::new(dictionary(), g.clone(), PipelineConfig::default()).unwrap();
        let report = pipeline.consistency_report().unwrap();
        assert_eq!(report.len(), 1);
        assert!(report[0].is_consistent);
        assert_eq!(report[0].consistent_values, vec!["Glut"]);

        let out = pipeline.run(&crate::source::GraphClusterSource::new(g)).unwrap();
        let terms = pipeline.general_terms_report(&out.mappings).unwrap();
        let got: Vec<_> = terms
            .iter()
            .map(|t| (t.mapping_curie.as_str(), t.cluster_curie.as_str(), t.depth))
            .collect();
        assert_eq!(got, vec![("MBA:56", "WMB:1", 1), ("ensembl:1", "WMB:1", 1)]);
        assert!(terms.iter().all(|t| t.cell_curie == "CL:x1"));
    }

    struct CountingGraph {
        inner: InMemoryGraph,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl GraphQueryExecutor for CountingGraph {
        fn execute(&self, query: &GraphQuery) -> Result<Vec<Row>, QueryError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.execute(query)
        }
    }

    #[test]
    fn lookups_bounded_by_distinct_keys() {
        let counting = Arc::new(CountingGraph {
            inner: graph(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let pipeline = MappingPipeline::new(dictionary(), counting.clone(), PipelineConfig::default()).unwrap();
        let source: Vec<_> = (0..50).map(|i| ClusterLabel::new(format!("WMB:{i}"), format!("{i} Sst ACB"))).collect();
        let out = pipeline.run(&source).unwrap();
        assert_eq!(out.mappings.len(), 100);
        // One successful lookup each for Sst and ACB.
        assert_eq!(counting.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
