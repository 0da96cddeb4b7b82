//! Declarative graph queries.
//!
//! A [`GraphQuery`] describes *what* to fetch; executors decide *how*. The
//! in-memory executor evaluates the structured form directly, while a
//! Bolt-backed executor sends [`GraphQuery::to_cypher`] with its parameters.
//! Values are always passed as parameters, never spliced into the statement.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::QueryError;

/// A node pattern: every label in `all_of` and, when non-empty, at least one
/// label in `any_of`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NodePattern {
    /// Labels the node must carry.
    pub all_of: Vec<String>,
    /// Labels of which the node must carry at least one.
    #[serde(default)]
    pub any_of: Vec<String>,
}

impl NodePattern {
    /// Pattern requiring all the given labels.
    pub fn labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            all_of: labels.into_iter().map(Into::into).collect(),
            any_of: Vec::new(),
        }
    }

    /// Adds alternative labels of which at least one must match.
    #[must_use]
    pub fn with_any_of<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.any_of = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Tests a node's label set against this pattern.
    #[must_use]
    pub fn matches<'a>(&self, mut labels: impl Iterator<Item = &'a str> + Clone) -> bool {
        self.all_of.iter().all(|l| labels.clone().any(|n| n == l))
            && (self.any_of.is_empty() || labels.any(|n| self.any_of.iter().any(|l| l == n)))
    }

    fn render(&self, var: &str) -> Result<(String, Option<String>), QueryError> {
        let mut head = String::from(var);
        for label in &self.all_of {
            head.push(':');
            head.push_str(&quote_identifier(label)?);
        }
        let any = if self.any_of.is_empty() {
            None
        } else {
            let parts = self
                .any_of
                .iter()
                .map(|l| quote_identifier(l).map(|q| format!("{var}:{q}")))
                .collect::<Result<Vec<_>, _>>()?;
            Some(format!("({})", parts.join(" OR ")))
        };
        Ok((head, any))
    }
}

/// How a property value is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Exact string equality.
    Equals,
    /// Substring containment.
    Contains,
}

/// A declarative query against the knowledge graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphQuery {
    /// First node matching a property predicate.
    ///
    /// Rows: `curie`, `label`. At most one row.
    FindNode {
        /// Node pattern.
        pattern: NodePattern,
        /// Property to compare.
        property: String,
        /// Comparison operator.
        comparison: Comparison,
        /// Value to compare against.
        value: String,
    },

    /// Every node matching a pattern, ordered by label.
    ///
    /// Rows: `curie`, `label`.
    ListNodes {
        /// Node pattern.
        pattern: NodePattern,
    },

    /// Ancestor/descendant pairs joined by a relation path.
    ///
    /// Rows: `ancestor_curie`, `ancestor_label`, `ancestor_labels`,
    /// `descendant_curie`, `descendant_label`, `descendant_labels`, `depth`
    /// and, when `signal_property` is set, `signal` (the first element of a
    /// list-valued property). One row per pair, at the shortest depth.
    Descendants {
        /// Pattern for the ancestor end.
        ancestor: NodePattern,
        /// Pattern for the descendant end.
        descendant: NodePattern,
        /// Relation type pointing from child to parent.
        relation: String,
        /// Minimum path length.
        min_depth: usize,
        /// Maximum path length.
        max_depth: usize,
        /// Descendant property to return; descendants without it are skipped.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal_property: Option<String>,
    },

    /// Nodes linked into a target by a relation, `(source)-[relation]->(target)`.
    ///
    /// Rows: `target_curie`, `source_curie`, `source_label`, ordered by
    /// target curie then source curie.
    Linked {
        /// Pattern for the target end.
        target: NodePattern,
        /// Relation type pointing from source to target.
        relation: String,
        /// Pattern for the source end.
        source: NodePattern,
    },
}

impl GraphQuery {
    /// Builds a single-node lookup.
    pub fn find_node(
        pattern: NodePattern,
        property: impl Into<String>,
        comparison: Comparison,
        value: impl Into<String>,
    ) -> Self {
        Self::FindNode {
            pattern,
            property: property.into(),
            comparison,
            value: value.into(),
        }
    }

    /// Builds a descendant traversal.
    pub fn descendants(
        ancestor: NodePattern,
        descendant: NodePattern,
        relation: impl Into<String>,
        depth: RangeInclusive<usize>,
        signal_property: Option<String>,
    ) -> Self {
        Self::Descendants {
            ancestor,
            descendant,
            relation: relation.into(),
            min_depth: *depth.start(),
            max_depth: *depth.end(),
            signal_property,
        }
    }

    /// Renders the query as a Cypher statement plus parameters.
    ///
    /// # Errors
    /// `Malformed` if a label, property or relation name is empty or
    /// contains a backtick.
    pub fn to_cypher(&self) -> Result<(String, Map<String, Value>), QueryError> {
        let mut params = Map::new();
        let text = match self {
            Self::FindNode {
                pattern,
                property,
                comparison,
                value,
            } => {
                let (head, any) = pattern.render("n")?;
                let op = match comparison {
                    Comparison::Equals => "=",
                    Comparison::Contains => "CONTAINS",
                };
                let mut predicate = format!("n.{} {op} $value", quote_identifier(property)?);
                if let Some(any) = any {
                    predicate = format!("{any} AND {predicate}");
                }
                params.insert("value".to_string(), Value::String(value.clone()));
                format!("MATCH ({head}) WHERE {predicate} RETURN n.curie AS curie, n.label AS label LIMIT 1")
            }
            Self::ListNodes { pattern } => {
                let (head, any) = pattern.render("n")?;
                let filter = any.map(|a| format!(" WHERE {a}")).unwrap_or_default();
                format!("MATCH ({head}){filter} RETURN n.curie AS curie, n.label AS label ORDER BY n.label")
            }
            Self::Descendants {
                ancestor,
                descendant,
                relation,
                min_depth,
                max_depth,
                signal_property,
            } => {
                let (a_head, a_any) = ancestor.render("a")?;
                let (d_head, d_any) = descendant.render("d")?;
                let rel = quote_identifier(relation)?;
                let mut filters: Vec<String> = a_any.into_iter().chain(d_any).collect();
                let mut returns = String::from(
                    "a.curie AS ancestor_curie, a.label AS ancestor_label, labels(a) AS ancestor_labels, \
                     d.curie AS descendant_curie, d.label AS descendant_label, labels(d) AS descendant_labels, \
                     min(length(p)) AS depth",
                );
                if let Some(prop) = signal_property {
                    let prop = quote_identifier(prop)?;
                    filters.push(format!("d.{prop} IS NOT NULL"));
                    // Signal properties are lists; rows carry the first element.
                    returns.push_str(&format!(", d.{prop}[0] AS signal"));
                }
                let filter = if filters.is_empty() {
                    String::new()
                } else {
                    format!(" WHERE {}", filters.join(" AND "))
                };
                format!(
                    "MATCH p = ({a_head})<-[:{rel}*{min_depth}..{max_depth}]-({d_head}){filter} RETURN {returns}"
                )
            }
            Self::Linked {
                target,
                relation,
                source,
            } => {
                let (t_head, t_any) = target.render("t")?;
                let (s_head, s_any) = source.render("s")?;
                let rel = quote_identifier(relation)?;
                let filters: Vec<String> = t_any.into_iter().chain(s_any).collect();
                let filter = if filters.is_empty() {
                    String::new()
                } else {
                    format!(" WHERE {}", filters.join(" AND "))
                };
                format!(
                    "MATCH ({t_head})<-[:{rel}]-({s_head}){filter} \
                     RETURN t.curie AS target_curie, s.curie AS source_curie, s.label AS source_label \
                     ORDER BY target_curie, source_curie"
                )
            }
        };
        Ok((text, params))
    }
}

fn quote_identifier(name: &str) -> Result<String, QueryError> {
    if name.is_empty() || name.contains('`') {
        return Err(QueryError::malformed(format!("invalid identifier '{name}'")));
    }
    if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name.to_string())
    } else {
        Ok(format!("`{name}`"))
    }
}
