//! Cluster label tokenizer.
//!
//! Labels follow the grammar
//!
//! ```text
//! <count> <anatomical...>[-<anatomical...>] <cell-type words> <gene words> <neurotransmitter...>[_<suffix>]
//! ```
//!
//! Hyphens are overloaded: they join anatomical regions (`SI-MA-ACB`),
//! neurotransmitter combinations (`Glut-Gaba`) and appear inside gene
//! symbols (`Nkx2-1`). Hyphenated segments are classified with a fixed
//! precedence, see [`SegmentKind`].

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dictionary::TokenDictionary;
use crate::token::{ParsedToken, SimplifiedType, TokenDescriptor};

/// Substrings that mark a hyphenated segment as a neurotransmitter compound.
pub const NEUROTRANSMITTER_MARKERS: [&str; 10] = [
    "Gaba", "GABA", "Gly", "Glut", "Dopa", "Chol", "Sero", "Hist", "Nora", "Glyc",
];

const ORDINAL_PATTERN: &str = r"^(\d+)\s+";
const SUFFIX_PATTERN: &str = r"_(\d+)$";
const HYPHENATED_GENE_PATTERN: &str = r"^[A-Z][a-z0-9]+-[0-9]+$";

/// How a whitespace-delimited segment is turned into tokens.
///
/// For hyphenated segments the variants are listed in precedence order:
/// the first that applies wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// No hyphen: one token.
    Word,
    /// Whole segment is a dictionary key: one token, never split.
    DictionaryCompound,
    /// Gene symbol shape such as `Nkx2-1`: one token.
    HyphenatedGene,
    /// Neurotransmitter combination: split on `-`.
    NeurotransmitterCompound,
    /// Multi-region anatomical name: split on `-`.
    AnatomicalCompound,
}

impl SegmentKind {
    /// Returns true if the segment is split into sub-parts.
    #[must_use]
    pub const fn splits(&self) -> bool {
        matches!(self, Self::NeurotransmitterCompound | Self::AnatomicalCompound)
    }
}

/// Why a label produced no tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LabelDiagnostic {
    /// The label does not start with an integer followed by whitespace.
    MissingOrdinal {
        /// Offending label
        label: String,
    },
    /// The ordinal was present but nothing followed it.
    NoTokens {
        /// Offending label
        label: String,
    },
}

impl LabelDiagnostic {
    /// Returns the label the diagnostic refers to.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::MissingOrdinal { label } | Self::NoTokens { label } => label,
        }
    }
}

impl fmt::Display for LabelDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingOrdinal { label } => write!(f, "no leading ordinal in label '{label}'"),
            Self::NoTokens { label } => write!(f, "no tokens after ordinal in label '{label}'"),
        }
    }
}

/// Result of tokenizing one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedLabel {
    /// Leading ordinal, when present.
    pub ordinal: Option<u64>,
    /// Tokens in label order.
    pub tokens: Vec<ParsedToken>,
    /// Set when `tokens` is empty.
    pub diagnostic: Option<LabelDiagnostic>,
}

impl TokenizedLabel {
    fn rejected(ordinal: Option<u64>, diagnostic: LabelDiagnostic) -> Self {
        log::warn!("Skipping cluster label: {diagnostic}");
        Self {
            ordinal,
            tokens: Vec::new(),
            diagnostic: Some(diagnostic),
        }
    }
}

/// Parses cluster labels into typed tokens.
#[derive(Debug, Clone)]
pub struct LabelTokenizer {
    dictionary: Arc<TokenDictionary>,
    ordinal: Regex,
    suffix: Regex,
    hyphenated_gene: Regex,
}

impl LabelTokenizer {
    /// Creates a tokenizer backed by the given dictionary.
    #[must_use]
    pub fn new(dictionary: Arc<TokenDictionary>) -> Self {
        Self {
            dictionary,
            ordinal: compile(ORDINAL_PATTERN),
            suffix: compile(SUFFIX_PATTERN),
            hyphenated_gene: compile(HYPHENATED_GENE_PATTERN),
        }
    }

    /// Returns the dictionary this tokenizer resolves against.
    #[must_use]
    pub fn dictionary(&self) -> &TokenDictionary {
        &self.dictionary
    }

    /// Decides how a segment is tokenized.
    ///
    /// A whole-dictionary hit always wins over the gene-shape and
    /// neurotransmitter heuristics.
    #[must_use]
    pub fn classify_segment(&self, segment: &str) -> SegmentKind {
        if !segment.contains('-') {
            return SegmentKind::Word;
        }
        if self.dictionary.contains(segment) {
            return SegmentKind::DictionaryCompound;
        }
        if self.hyphenated_gene.is_match(segment) {
            return SegmentKind::HyphenatedGene;
        }
        if is_neurotransmitter_compound(segment) {
            return SegmentKind::NeurotransmitterCompound;
        }
        SegmentKind::AnatomicalCompound
    }

    /// Tokenizes one cluster label.
    ///
    /// Never fails: a label without a leading ordinal, or with nothing after
    /// it, yields an empty token list and a diagnostic.
    #[must_use]
    pub fn tokenize(&self, label: &str) -> TokenizedLabel {
        let trimmed = label.trim();

        let Some(caps) = self.ordinal.captures(trimmed) else {
            return TokenizedLabel::rejected(
                None,
                LabelDiagnostic::MissingOrdinal {
                    label: label.to_string(),
                },
            );
        };
        // Digit runs too long for u64 still count as an ordinal.
        let ordinal = caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok());
        let body_start = caps.get(0).map_or(0, |m| m.end());
        let mut body = &trimmed[body_start..];

        if let Some(m) = self.suffix.find(body) {
            body = &body[..m.start()];
        }

        let mut tokens = Vec::new();
        for segment in body.split_whitespace() {
            let kind = self.classify_segment(segment);
            if kind.splits() {
                for part in segment.split('-').filter(|p| !p.is_empty()) {
                    self.push(&mut tokens, part, segment);
                }
            } else {
                self.push(&mut tokens, segment, segment);
            }
        }

        if tokens.is_empty() {
            return TokenizedLabel::rejected(
                ordinal,
                LabelDiagnostic::NoTokens {
                    label: label.to_string(),
                },
            );
        }

        TokenizedLabel {
            ordinal,
            tokens,
            diagnostic: None,
        }
    }

    fn push(&self, tokens: &mut Vec<ParsedToken>, text: &str, original_part: &str) {
        let descriptor = self
            .dictionary
            .get(text)
            .cloned()
            .unwrap_or_else(|| TokenDescriptor::unknown(text));
        tokens.push(ParsedToken {
            descriptor,
            position: tokens.len() + 1,
            original_part: original_part.to_string(),
        });
    }
}

/// Returns true if the segment contains a known neurotransmitter marker.
#[must_use]
pub fn is_neurotransmitter_compound(segment: &str) -> bool {
    NEUROTRANSMITTER_MARKERS.iter().any(|m| segment.contains(m))
}

fn compile(pattern: &str) -> Regex {
    // Patterns are compile-time constants covered by tests.
    Regex::new(pattern).expect("static tokenizer pattern must compile")
}

/// Counts tokens per simplified type.
#[must_use]
pub fn count_by_type(tokens: &[ParsedToken]) -> [(SimplifiedType, usize); 5] {
    SimplifiedType::ALL.map(|ty| (ty, tokens.iter().filter(|t| t.simplified_type() == ty).count()))
}
