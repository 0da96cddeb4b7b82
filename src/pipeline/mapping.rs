//! Flat mapping rows and the generic relation shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LabelMapError, LabelMapResult};
use crate::resolver::ResolutionResult;
use crate::token::{ParsedToken, SimplifiedType};

/// One (cluster, token) pair with its resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMapping {
    /// Cluster curie.
    pub cluster_id: String,
    /// Raw cluster label.
    pub cluster_label: String,
    /// Parsed token.
    pub token: ParsedToken,
    /// Resolution shared by every row with the same key.
    pub resolution: ResolutionResult,
}

impl TokenMapping {
    /// Token text.
    #[must_use]
    pub fn token_text(&self) -> &str {
        self.token.token_text()
    }

    /// Token type.
    #[must_use]
    pub const fn simplified_type(&self) -> SimplifiedType {
        self.token.simplified_type()
    }

    /// Returns true if the token resolved.
    #[must_use]
    pub const fn is_found(&self) -> bool {
        self.resolution.found
    }

    /// Unknown type, or known type that did not resolve.
    #[must_use]
    pub const fn is_problem(&self) -> bool {
        self.simplified_type().is_unknown() || !self.resolution.found
    }
}

/// A named record type that can be laid out as a relation.
pub trait Tabular: Serialize {
    /// Relation name.
    const NAME: &'static str;
    /// Column order. Every column is a field of the serialized record.
    const COLUMNS: &'static [&'static str];
}

/// Serialization-agnostic table: ordered columns and rows keyed by column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Relation name.
    pub name: String,
    /// Column order.
    pub columns: Vec<String>,
    /// Rows; each holds exactly the declared columns.
    pub rows: Vec<Map<String, Value>>,
}

impl Relation {
    /// Lays out records of a [`Tabular`] type.
    ///
    /// # Errors
    /// `Internal` if a record does not serialize to an object.
    pub fn from_records<'a, T, I>(records: I) -> LabelMapResult<Self>
    where
        T: Tabular + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let rows = records
            .into_iter()
            .map(|record| project::<T>(serde_json::to_value(record)))
            .collect::<LabelMapResult<Vec<_>>>()?;
        Ok(Self {
            name: T::NAME.to_string(),
            columns: T::COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            rows,
        })
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the relation has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, in row order.
    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows.iter().map(move |row| row.get(name).unwrap_or(&Value::Null))
    }
}

fn project<T: Tabular>(value: serde_json::Result<Value>) -> LabelMapResult<Map<String, Value>> {
    let value = value.map_err(|e| LabelMapError::internal(format!("{}: {e}", T::NAME)))?;
    let Value::Object(mut fields) = value else {
        return Err(LabelMapError::internal(format!("{}: record is not an object", T::NAME)));
    };
    Ok(T::COLUMNS
        .iter()
        .map(|c| ((*c).to_string(), fields.remove(*c).unwrap_or(Value::Null)))
        .collect())
}

/// Flattened view of a [`TokenMapping`] for the mapping relation.
#[derive(Debug, Serialize)]
pub struct MappingRecord<'a> {
    cluster_id: &'a str,
    cluster_label: &'a str,
    token_position: usize,
    token_text: &'a str,
    token_simplified_type: SimplifiedType,
    token_type: &'a str,
    token_name: &'a str,
    primary_identifier: Option<&'a str>,
    secondary_identifier: Option<&'a str>,
    tertiary_identifier: Option<&'a str>,
    original_part: &'a str,
    kg_entity_found: bool,
    kg_entity_curie: Option<&'a str>,
    kg_entity_label: Option<&'a str>,
    match_method: Option<&'a str>,
}

impl<'a> From<&'a TokenMapping> for MappingRecord<'a> {
    fn from(m: &'a TokenMapping) -> Self {
        let d = &m.token.descriptor;
        Self {
            cluster_id: &m.cluster_id,
            cluster_label: &m.cluster_label,
            token_position: m.token.position,
            token_text: &d.token_text,
            token_simplified_type: d.simplified_type,
            token_type: &d.raw_type,
            token_name: &d.display_name,
            primary_identifier: d.primary_identifier.as_deref(),
            secondary_identifier: d.secondary_identifier.as_deref(),
            tertiary_identifier: d.tertiary_identifier.as_deref(),
            original_part: &m.token.original_part,
            kg_entity_found: m.resolution.found,
            kg_entity_curie: m.resolution.entity_id.as_deref(),
            kg_entity_label: m.resolution.entity_label.as_deref(),
            match_method: m.resolution.method.as_deref(),
        }
    }
}

impl Tabular for MappingRecord<'_> {
    const NAME: &'static str = "cluster_token_mapping";
    const COLUMNS: &'static [&'static str] = &[
        "cluster_id",
        "cluster_label",
        "token_position",
        "token_text",
        "token_simplified_type",
        "token_type",
        "token_name",
        "primary_identifier",
        "secondary_identifier",
        "tertiary_identifier",
        "original_part",
        "kg_entity_found",
        "kg_entity_curie",
        "kg_entity_label",
        "match_method",
    ];
}
