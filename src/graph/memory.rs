//! In-memory property graph.
//!
//! A thread-safe reference executor for [`GraphQuery`]. It is intended for
//! embedded usage and tests, and mirrors the row shapes a Bolt-backed
//! executor returns.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::RwLock;

use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::graph::query::{Comparison, GraphQuery, NodePattern};
use crate::graph::{GraphQueryExecutor, Row};

/// Handle to a node inserted into an [`InMemoryGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(usize);

#[derive(Debug, Clone)]
struct Node {
    labels: BTreeSet<String>,
    properties: Map<String, Value>,
}

impl Node {
    fn matches(&self, pattern: &NodePattern) -> bool {
        pattern.matches(self.labels.iter().map(String::as_str))
    }

    fn str_prop(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    fn text_prop(&self, key: &str) -> Value {
        self.properties.get(key).cloned().unwrap_or(Value::Null)
    }

    fn label_list(&self) -> Value {
        Value::Array(self.labels.iter().cloned().map(Value::String).collect())
    }
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: Vec<Node>,
    /// relation → parent → children
    incoming: HashMap<String, HashMap<usize, Vec<usize>>>,
}

fn lock_err(context: &'static str) -> QueryError {
    QueryError::transport(format!("poisoned lock: {context}"))
}

/// Thread-safe in-memory graph.
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    state: RwLock<GraphState>,
}

impl InMemoryGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with labels and properties.
    ///
    /// # Errors
    /// Returns an error if the internal lock is poisoned.
    pub fn add_node<I, S>(&self, labels: I, properties: Value) -> Result<NodeHandle, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let properties = match properties {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(QueryError::malformed(format!(
                    "node properties must be an object, got {other}"
                )))
            }
        };
        let mut state = self.state.write().map_err(|_| lock_err("graph.add_node"))?;
        state.nodes.push(Node {
            labels: labels.into_iter().map(Into::into).collect(),
            properties,
        });
        Ok(NodeHandle(state.nodes.len() - 1))
    }

    /// Adds a directed relation `from -[relation]-> to`.
    ///
    /// # Errors
    /// Returns an error if either handle is unknown.
    pub fn add_edge(&self, from: NodeHandle, relation: &str, to: NodeHandle) -> Result<(), QueryError> {
        let mut state = self.state.write().map_err(|_| lock_err("graph.add_edge"))?;
        let len = state.nodes.len();
        if from.0 >= len || to.0 >= len {
            return Err(QueryError::malformed("edge endpoint does not exist"));
        }
        state
            .incoming
            .entry(relation.to_string())
            .or_default()
            .entry(to.0)
            .or_default()
            .push(from.0);
        Ok(())
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.state.read().map(|s| s.nodes.len()).unwrap_or(0)
    }
}

fn curie_label_row(node: &Node) -> Row {
    let mut row = Map::new();
    row.insert("curie".to_string(), node.text_prop("curie"));
    row.insert("label".to_string(), node.text_prop("label"));
    row
}

fn signal_value(node: &Node, property: &str) -> Option<Value> {
    // List-valued signals report their first element.
    match node.properties.get(property)? {
        Value::Null => None,
        Value::Array(items) => items.first().filter(|v| !v.is_null()).cloned(),
        other => Some(other.clone()),
    }
}

fn find_node(
    state: &GraphState,
    pattern: &NodePattern,
    property: &str,
    comparison: Comparison,
    value: &str,
) -> Vec<Row> {
    state
        .nodes
        .iter()
        .filter(|n| n.matches(pattern))
        .find(|n| {
            n.str_prop(property).is_some_and(|p| match comparison {
                Comparison::Equals => p == value,
                Comparison::Contains => p.contains(value),
            })
        })
        .map(curie_label_row)
        .into_iter()
        .collect()
}

fn list_nodes(state: &GraphState, pattern: &NodePattern) -> Vec<Row> {
    let mut nodes: Vec<&Node> = state.nodes.iter().filter(|n| n.matches(pattern)).collect();
    nodes.sort_by(|a, b| a.str_prop("label").cmp(&b.str_prop("label")));
    nodes.into_iter().map(curie_label_row).collect()
}

fn descendants(
    state: &GraphState,
    ancestor: &NodePattern,
    descendant: &NodePattern,
    relation: &str,
    min_depth: usize,
    max_depth: usize,
    signal_property: Option<&str>,
) -> Vec<Row> {
    let children = state.incoming.get(relation);
    let mut rows = Vec::new();

    for (a_idx, a) in state.nodes.iter().enumerate() {
        if !a.matches(ancestor) {
            continue;
        }

        // Breadth-first, so the first visit of a node is its shortest depth.
        let mut depth_of: HashMap<usize, usize> = HashMap::from([(a_idx, 0)]);
        let mut order = vec![a_idx];
        let mut queue = VecDeque::from([a_idx]);
        while let Some(current) = queue.pop_front() {
            let depth = depth_of[&current];
            if depth >= max_depth {
                continue;
            }
            let Some(kids) = children.and_then(|c| c.get(&current)) else {
                continue;
            };
            for &kid in kids {
                if !depth_of.contains_key(&kid) {
                    depth_of.insert(kid, depth + 1);
                    order.push(kid);
                    queue.push_back(kid);
                }
            }
        }

        for d_idx in order {
            let depth = depth_of[&d_idx];
            if depth < min_depth {
                continue;
            }
            let d = &state.nodes[d_idx];
            if !d.matches(descendant) {
                continue;
            }
            let signal = match signal_property {
                Some(prop) => match signal_value(d, prop) {
                    Some(v) => Some(v),
                    None => continue,
                },
                None => None,
            };

            let mut row = Map::new();
            row.insert("ancestor_curie".to_string(), a.text_prop("curie"));
            row.insert("ancestor_label".to_string(), a.text_prop("label"));
            row.insert("ancestor_labels".to_string(), a.label_list());
            row.insert("descendant_curie".to_string(), d.text_prop("curie"));
            row.insert("descendant_label".to_string(), d.text_prop("label"));
            row.insert("descendant_labels".to_string(), d.label_list());
            row.insert("depth".to_string(), Value::from(depth));
            if let Some(signal) = signal {
                row.insert("signal".to_string(), signal);
            }
            rows.push(row);
        }
    }

    rows
}

fn linked(state: &GraphState, target: &NodePattern, relation: &str, source: &NodePattern) -> Vec<Row> {
    let Some(sources_of) = state.incoming.get(relation) else {
        return Vec::new();
    };
    let mut rows: Vec<Row> = Vec::new();
    for (t_idx, t) in state.nodes.iter().enumerate() {
        if !t.matches(target) {
            continue;
        }
        for &s_idx in sources_of.get(&t_idx).into_iter().flatten() {
            let s = &state.nodes[s_idx];
            if !s.matches(source) {
                continue;
            }
            let mut row = Map::new();
            row.insert("target_curie".to_string(), t.text_prop("curie"));
            row.insert("source_curie".to_string(), s.text_prop("curie"));
            row.insert("source_label".to_string(), s.text_prop("label"));
            rows.push(row);
        }
    }
    let key = |row: &Row, col: &str| row.get(col).and_then(Value::as_str).map(str::to_string);
    rows.sort_by(|a, b| {
        (key(a, "target_curie"), key(a, "source_curie")).cmp(&(key(b, "target_curie"), key(b, "source_curie")))
    });
    rows
}

impl GraphQueryExecutor for InMemoryGraph {
    fn execute(&self, query: &GraphQuery) -> Result<Vec<Row>, QueryError> {
        // Same identifier rules as a Bolt-backed executor.
        query.to_cypher()?;

        let state = self.state.read().map_err(|_| lock_err("graph.execute"))?;
        let rows = match query {
            GraphQuery::FindNode {
                pattern,
                property,
                comparison,
                value,
            } => find_node(&state, pattern, property, *comparison, value),
            GraphQuery::ListNodes { pattern } => list_nodes(&state, pattern),
            GraphQuery::Descendants {
                ancestor,
                descendant,
                relation,
                min_depth,
                max_depth,
                signal_property,
            } => {
                if min_depth > max_depth {
                    return Err(QueryError::malformed(format!(
                        "empty depth range {min_depth}..{max_depth}"
                    )));
                }
                descendants(
                    &state,
                    ancestor,
                    descendant,
                    relation,
                    *min_depth,
                    *max_depth,
                    signal_property.as_deref(),
                )
            }
            GraphQuery::Linked {
                target,
                relation,
                source,
            } => linked(&state, target, relation, source),
        };
        Ok(rows)
    }
}
