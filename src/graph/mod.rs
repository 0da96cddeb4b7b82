//! Knowledge-graph access.
//!
//! The graph store is an external collaborator. Everything in this crate that
//! talks to it goes through [`GraphQueryExecutor`]; implementations decide
//! how a [`GraphQuery`] reaches the store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::QueryError;

mod memory;
mod query;
mod runtime;

pub use memory::{InMemoryGraph, NodeHandle};
pub use query::{Comparison, GraphQuery, NodePattern};
pub use runtime::{QueryRuntime, QueryRuntimeConfig};

/// One result row: column name → value.
pub type Row = Map<String, Value>;

/// Executes declarative queries against the graph store.
///
/// Implementations must be safe to call from several threads at once.
pub trait GraphQueryExecutor: Send + Sync {
    /// Runs a query and returns its rows in order.
    fn execute(&self, query: &GraphQuery) -> Result<Vec<Row>, QueryError>;
}

impl<E: GraphQueryExecutor + ?Sized> GraphQueryExecutor for Arc<E> {
    fn execute(&self, query: &GraphQuery) -> Result<Vec<Row>, QueryError> {
        (**self).execute(query)
    }
}

/// A single connection to the graph store.
///
/// Sessions are owned by exactly one worker at a time, so they may keep
/// per-connection state.
pub trait GraphSession: Send {
    /// Runs a query on this session.
    fn run(&mut self, query: &GraphQuery) -> Result<Vec<Row>, QueryError>;
}

impl<E: GraphQueryExecutor + ?Sized> GraphSession for Arc<E> {
    fn run(&mut self, query: &GraphQuery) -> Result<Vec<Row>, QueryError> {
        self.execute(query)
    }
}

/// Connection settings for a graph store.
///
/// Opaque to this crate: passed through to whatever opens sessions. There
/// are deliberately no defaults.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Endpoint URI, e.g. `bolt://host:7687`.
    pub uri: String,
    /// User name.
    #[serde(default)]
    pub user: Option<String>,
    /// Password.
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}
