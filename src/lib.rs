//! # labelmap - Cell-cluster label curation
//!
//! labelmap decomposes biological cell-cluster labels into typed lexical
//! tokens, resolves each token to an entity in a knowledge graph, and
//! aggregates the outcome into quality reports.
//!
//! ## Core Concepts
//!
//! - **TokenDictionary**: exact lookup from token text to a typed descriptor
//! - **LabelTokenizer**: label grammar, hyphen precedence, positions
//! - **EntityResolver**: ordered per-type lookup strategies, memoized per key
//! - **MappingPipeline**: fetch, tokenize, resolve once, broadcast, aggregate
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use labelmap::{GraphClusterSource, MappingPipeline, PipelineConfig, TokenDictionary};
//!
//! let load = TokenDictionary::from_csv_path("tokens.csv")?;
//! let graph: Arc<dyn labelmap::GraphQueryExecutor> = connect()?;
//! let pipeline = MappingPipeline::new(Arc::new(load.dictionary), Arc::clone(&graph), PipelineConfig::default())?;
//! let output = pipeline.run(&GraphClusterSource::new(graph))?;
//! for relation in output.relations()? {
//!     write(&relation)?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Token model
pub mod dictionary;
pub mod error;
pub mod token;
pub mod tokenizer;

// Graph access and resolution
pub mod graph;
pub mod resolver;
pub mod source;

// Pipeline
pub mod config;
pub mod pipeline;

pub use config::PipelineConfig;
pub use dictionary::{DictionaryLoad, QuarantineReason, QuarantinedRow, TokenDictionary};
pub use error::{ConfigError, DictionaryError, LabelMapError, LabelMapResult, QueryError};
pub use graph::{
    Comparison, ConnectionConfig, GraphQuery, GraphQueryExecutor, GraphSession, InMemoryGraph, NodePattern, QueryRuntime,
    QueryRuntimeConfig, Row,
};
pub use pipeline::{
    ClusterComposition, GeneralTerm, IssueType, MappingPipeline, MatchSummary, NodeConsistency, PipelineOutput,
    ProblemToken, Relation, RunId, TokenMapping, TokenUsage, TypeSummary,
};
pub use resolver::{EntityResolver, ResolutionKey, ResolutionMemo, ResolutionResult};
pub use source::{ClusterLabel, ClusterLabelSource, GraphClusterSource};
pub use token::{ParsedToken, SimplifiedType, TokenDescriptor};
pub use tokenizer::{LabelDiagnostic, LabelTokenizer, SegmentKind, TokenizedLabel};
