//! Token types.
//!
//! A cluster label decomposes into an ordered sequence of [`ParsedToken`]s,
//! each carrying the [`TokenDescriptor`] found in the token dictionary (or a
//! synthesized unknown descriptor when the text is not in the dictionary).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Coarse token category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimplifiedType {
    /// Gene symbol
    Gene,
    /// Anatomical region
    Anatomical,
    /// Cell type word
    CellType,
    /// Neurotransmitter usage
    Neurotransmission,
    /// Text not found in the dictionary
    Unknown,
}

impl SimplifiedType {
    /// All variants in reporting order.
    pub const ALL: [Self; 5] = [
        Self::Gene,
        Self::Anatomical,
        Self::CellType,
        Self::Neurotransmission,
        Self::Unknown,
    ];

    /// Returns the canonical snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gene => "gene",
            Self::Anatomical => "anatomical",
            Self::CellType => "cell_type",
            Self::Neurotransmission => "neurotransmission",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true for the unknown category.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for SimplifiedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a simplified type name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSimplifiedType(pub String);

impl fmt::Display for UnknownSimplifiedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised simplified type '{}'", self.0)
    }
}

impl std::error::Error for UnknownSimplifiedType {}

impl FromStr for SimplifiedType {
    type Err = UnknownSimplifiedType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Source tables spell the cell category with a space.
        match s.trim() {
            "gene" => Ok(Self::Gene),
            "anatomical" => Ok(Self::Anatomical),
            "cell_type" | "cell type" => Ok(Self::CellType),
            "neurotransmission" => Ok(Self::Neurotransmission),
            "unknown" => Ok(Self::Unknown),
            other => Err(UnknownSimplifiedType(other.to_string())),
        }
    }
}

/// Dictionary entry describing one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    /// Literal token text (dictionary key)
    pub token_text: String,
    /// Coarse category
    pub simplified_type: SimplifiedType,
    /// Fine-grained type as written in the source table
    pub raw_type: String,
    /// Human readable name
    pub display_name: String,
    /// Identifier used for entity resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_identifier: Option<String>,
    /// Secondary identifier, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_identifier: Option<String>,
    /// Tertiary identifier, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tertiary_identifier: Option<String>,
}

impl TokenDescriptor {
    /// Synthesizes the descriptor for text absent from the dictionary.
    ///
    /// # Examples
    ///
    /// ```
    /// use labelmap::{SimplifiedType, TokenDescriptor};
    ///
    /// let d = TokenDescriptor::unknown("Xyz");
    /// assert_eq!(d.simplified_type, SimplifiedType::Unknown);
    /// assert_eq!(d.display_name, "Unknown token: Xyz");
    /// assert!(d.primary_identifier.is_none());
    /// ```
    #[must_use]
    pub fn unknown(text: impl Into<String>) -> Self {
        let token_text = text.into();
        Self {
            display_name: format!("Unknown token: {token_text}"),
            token_text,
            simplified_type: SimplifiedType::Unknown,
            raw_type: SimplifiedType::Unknown.as_str().to_string(),
            primary_identifier: None,
            secondary_identifier: None,
            tertiary_identifier: None,
        }
    }

    /// Returns true if this token is of unknown type.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        self.simplified_type.is_unknown()
    }
}

/// A token positioned within one cluster label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedToken {
    /// Descriptor for the token text
    pub descriptor: TokenDescriptor,
    /// 1-based position within the label
    pub position: usize,
    /// Whitespace-delimited segment the token was split from
    pub original_part: String,
}

impl ParsedToken {
    /// Returns the token text.
    #[must_use]
    pub fn token_text(&self) -> &str {
        &self.descriptor.token_text
    }

    /// Returns the simplified type.
    #[must_use]
    pub const fn simplified_type(&self) -> SimplifiedType {
        self.descriptor.simplified_type
    }
}
