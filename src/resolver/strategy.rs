//! Lookup strategy tables.
//!
//! Each strategy is a named, pure function from a [`LookupKey`] to the
//! query it would run (or `None` when the key has no usable shape for it).
//! Tables are ordered; the resolver stops at the first strategy that finds
//! an entity.

use crate::graph::{Comparison, GraphQuery, NodePattern};
use crate::token::SimplifiedType;

/// Node label for genes.
pub const GENE_KIND: &str = "Gene";
/// Node label for anatomical regions.
pub const ANATOMICAL_KIND: &str = "MBA";
/// Node label for cell types and neurotransmission.
pub const CELL_KIND: &str = "Cell";
/// Generic fallback node label.
pub const FALLBACK_KIND: &str = "Class";

/// Inputs available to a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupKey<'a> {
    /// Identifier from the token dictionary.
    pub identifier: &'a str,
    /// Literal token text from the label.
    pub token_text: &'a str,
}

/// One named lookup step.
#[derive(Clone, Copy)]
pub struct Strategy {
    /// Provenance name recorded on a match.
    pub name: &'static str,
    /// Builds the query for a key.
    pub build: fn(&LookupKey<'_>) -> Option<GraphQuery>,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy").field("name", &self.name).finish()
    }
}

/// `ENSEMBL:` prefixes are stored lowercase in the graph.
#[must_use]
pub fn canonical_identifier(identifier: &str) -> String {
    match identifier.strip_prefix("ENSEMBL:") {
        Some(rest) => format!("ensembl:{rest}"),
        None => identifier.to_string(),
    }
}

/// Short form replaces the prefix separator: `MBA:56` → `MBA_56`.
#[must_use]
pub fn short_form(identifier: &str) -> Option<String> {
    identifier.contains(':').then(|| identifier.replace(':', "_"))
}

fn exact(kind: &str, property: &str, value: impl Into<String>) -> GraphQuery {
    GraphQuery::find_node(NodePattern::labels([kind]), property, Comparison::Equals, value)
}

fn canonical_curie(kind: &str, key: &LookupKey<'_>) -> Option<GraphQuery> {
    let canonical = canonical_identifier(key.identifier);
    // Identical to the raw identifier: the plain curie strategy covers it.
    (canonical != key.identifier).then(|| exact(kind, "curie", canonical))
}

fn curie(kind: &str, key: &LookupKey<'_>) -> Option<GraphQuery> {
    Some(exact(kind, "curie", key.identifier))
}

fn id(kind: &str, key: &LookupKey<'_>) -> Option<GraphQuery> {
    Some(exact(kind, "id", key.identifier))
}

fn iri(kind: &str, key: &LookupKey<'_>) -> Option<GraphQuery> {
    Some(exact(kind, "iri", key.identifier))
}

fn short(kind: &str, key: &LookupKey<'_>) -> Option<GraphQuery> {
    short_form(key.identifier).map(|sf| exact(kind, "short_form", sf))
}

fn symbol(key: &LookupKey<'_>) -> Option<GraphQuery> {
    (!key.token_text.is_empty()).then(|| {
        GraphQuery::find_node(
            NodePattern::labels([GENE_KIND]),
            "label",
            Comparison::Contains,
            key.token_text,
        )
    })
}

macro_rules! strategy {
    ($name:literal, $f:ident, $kind:expr) => {
        Strategy {
            name: $name,
            build: |key| $f($kind, key),
        }
    };
}

/// Gene lookups, ending with a label substring match on the token text.
pub static GENE_STRATEGIES: [Strategy; 10] = [
    strategy!("gene_canonical_curie_match", canonical_curie, GENE_KIND),
    strategy!("gene_curie_match", curie, GENE_KIND),
    strategy!("gene_id_match", id, GENE_KIND),
    strategy!("gene_iri_match", iri, GENE_KIND),
    strategy!("gene_short_form_match", short, GENE_KIND),
    strategy!("gene_class_canonical_curie_match", canonical_curie, FALLBACK_KIND),
    strategy!("gene_class_curie_match", curie, FALLBACK_KIND),
    strategy!("gene_class_id_match", id, FALLBACK_KIND),
    strategy!("gene_class_short_form_match", short, FALLBACK_KIND),
    Strategy {
        name: "gene_symbol_match",
        build: symbol,
    },
];

/// Anatomical lookups. No literal-text fallback.
pub static ANATOMICAL_STRATEGIES: [Strategy; 6] = [
    strategy!("anatomical_curie_match", curie, ANATOMICAL_KIND),
    strategy!("anatomical_id_match", id, ANATOMICAL_KIND),
    strategy!("anatomical_short_form_match", short, ANATOMICAL_KIND),
    strategy!("anatomical_class_curie_match", curie, FALLBACK_KIND),
    strategy!("anatomical_class_id_match", id, FALLBACK_KIND),
    strategy!("anatomical_class_short_form_match", short, FALLBACK_KIND),
];

/// Cell type and neurotransmission lookups. No literal-text fallback.
pub static CELL_STRATEGIES: [Strategy; 7] = [
    strategy!("cell_curie_match", curie, CELL_KIND),
    strategy!("cell_id_match", id, CELL_KIND),
    strategy!("cell_iri_match", iri, CELL_KIND),
    strategy!("cell_short_form_match", short, CELL_KIND),
    strategy!("cell_class_curie_match", curie, FALLBACK_KIND),
    strategy!("cell_class_id_match", id, FALLBACK_KIND),
    strategy!("cell_class_short_form_match", short, FALLBACK_KIND),
];

/// Returns the ordered strategy table for a token type.
#[must_use]
pub fn strategies_for(simplified_type: SimplifiedType) -> &'static [Strategy] {
    match simplified_type {
        SimplifiedType::Gene => &GENE_STRATEGIES,
        SimplifiedType::Anatomical => &ANATOMICAL_STRATEGIES,
        SimplifiedType::CellType | SimplifiedType::Neurotransmission => &CELL_STRATEGIES,
        SimplifiedType::Unknown => &[],
    }
}
