//! Cluster label sources.
//!
//! The pipeline pulls the full set of (cluster id, label) pairs once per run
//! from a [`ClusterLabelSource`]. The graph-backed source lists every
//! `Cell_cluster:WMB` node; a `Vec<ClusterLabel>` serves fixtures and
//! pre-fetched label sets.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::graph::{GraphQuery, GraphQueryExecutor, NodePattern, Row};

/// Node labels that identify taxonomy clusters.
pub const CLUSTER_NODE_LABELS: [&str; 2] = ["Cell_cluster", "WMB"];

/// A cluster identifier and its raw label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterLabel {
    /// Cluster curie.
    pub cluster_id: String,
    /// Raw label, e.g. `5 SI-MA-ACB Sst Chat Gaba_1`.
    pub label: String,
}

impl ClusterLabel {
    /// Creates a cluster label.
    pub fn new(cluster_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            label: label.into(),
        }
    }
}

/// Supplies cluster labels to the pipeline.
pub trait ClusterLabelSource {
    /// Fetches every cluster label, ordered by label.
    ///
    /// # Errors
    /// Any failure here aborts the run.
    fn fetch_labels(&self) -> Result<Vec<ClusterLabel>, QueryError>;
}

impl ClusterLabelSource for Vec<ClusterLabel> {
    fn fetch_labels(&self) -> Result<Vec<ClusterLabel>, QueryError> {
        let mut labels = self.clone();
        labels.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(labels)
    }
}

/// Lists taxonomy clusters from the graph store.
pub struct GraphClusterSource {
    executor: Arc<dyn GraphQueryExecutor>,
}

impl GraphClusterSource {
    /// Creates a source reading through `executor`.
    pub fn new(executor: Arc<dyn GraphQueryExecutor>) -> Self {
        Self { executor }
    }

    fn row_to_label(row: &Row) -> Option<ClusterLabel> {
        let cluster_id = row.get("curie")?.as_str()?;
        let label = row.get("label")?.as_str()?;
        Some(ClusterLabel::new(cluster_id, label))
    }
}

impl ClusterLabelSource for GraphClusterSource {
    fn fetch_labels(&self) -> Result<Vec<ClusterLabel>, QueryError> {
        let rows = self.executor.execute(&GraphQuery::ListNodes {
            pattern: NodePattern::labels(CLUSTER_NODE_LABELS),
        })?;
        let total = rows.len();
        let labels: Vec<_> = rows.iter().filter_map(Self::row_to_label).collect();
        if labels.len() < total {
            log::warn!(
                "Ignoring {} cluster nodes without a string curie or label",
                total - labels.len()
            );
        }
        Ok(labels)
    }
}
