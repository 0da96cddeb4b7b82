//! Token dictionary.
//!
//! Exact-match, case-sensitive lookup from literal token text to its
//! [`TokenDescriptor`]. The dictionary is built once from a tabular source
//! and shared read-only afterwards.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::DictionaryError;
use crate::token::{SimplifiedType, TokenDescriptor};

/// Columns that must be present in the source table.
pub const REQUIRED_COLUMNS: [&str; 4] = ["token", "simplified_type", "type", "name"];

/// Cell values treated as absent.
const NULL_SENTINELS: [&str; 5] = ["nan", "NaN", "None", "null", "NULL"];

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    simplified_type: Option<String>,
    #[serde(default, rename = "type")]
    raw_type: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    primary_identifier: Option<String>,
    #[serde(default)]
    secondary_identifier: Option<String>,
    #[serde(default)]
    tertiary_identifier: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !NULL_SENTINELS.contains(&v.as_str()))
}

/// Why a source row was not loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineReason {
    /// A required value was empty.
    MissingField(&'static str),
    /// The simplified type was not recognised.
    UnrecognisedType(String),
    /// An `unknown` row carried a primary identifier.
    UnknownWithIdentifier,
}

impl fmt::Display for QuarantineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing required value '{field}'"),
            Self::UnrecognisedType(ty) => write!(f, "unrecognised simplified type '{ty}'"),
            Self::UnknownWithIdentifier => write!(f, "unknown token carries a primary identifier"),
        }
    }
}

/// A source row rejected by the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantinedRow {
    /// 1-based line number in the source (header is line 1).
    pub line: u64,
    /// Token text, when present.
    pub token: Option<String>,
    /// Rejection reason.
    pub reason: QuarantineReason,
}

impl RawRow {
    fn into_descriptor(self) -> Result<TokenDescriptor, (Option<String>, QuarantineReason)> {
        let token = clean(self.token);
        let Some(token_text) = token.clone() else {
            return Err((None, QuarantineReason::MissingField("token")));
        };
        let Some(simplified) = clean(self.simplified_type) else {
            return Err((token, QuarantineReason::MissingField("simplified_type")));
        };
        let simplified_type = match simplified.parse::<SimplifiedType>() {
            Ok(ty) => ty,
            Err(e) => return Err((token, QuarantineReason::UnrecognisedType(e.0))),
        };
        let Some(raw_type) = clean(self.raw_type) else {
            return Err((token, QuarantineReason::MissingField("type")));
        };
        let Some(display_name) = clean(self.name) else {
            return Err((token, QuarantineReason::MissingField("name")));
        };
        let primary_identifier = clean(self.primary_identifier);
        if simplified_type.is_unknown() && primary_identifier.is_some() {
            return Err((token, QuarantineReason::UnknownWithIdentifier));
        }

        Ok(TokenDescriptor {
            token_text,
            simplified_type,
            raw_type,
            display_name,
            primary_identifier,
            secondary_identifier: clean(self.secondary_identifier),
            tertiary_identifier: clean(self.tertiary_identifier),
        })
    }
}

/// Static token text → descriptor lookup.
#[derive(Debug, Clone, Default)]
pub struct TokenDictionary {
    entries: HashMap<String, TokenDescriptor>,
}

/// Result of loading a dictionary: the entries plus any rejected rows.
#[derive(Debug, Clone)]
pub struct DictionaryLoad {
    /// Loaded dictionary.
    pub dictionary: TokenDictionary,
    /// Rows that were not loaded.
    pub quarantined: Vec<QuarantinedRow>,
}

impl TokenDictionary {
    /// Creates an empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a dictionary from descriptors. Later entries replace earlier
    /// ones with the same token text.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = TokenDescriptor>) -> Self {
        let mut dict = Self::new();
        for d in descriptors {
            dict.insert(d);
        }
        dict
    }

    /// Inserts a descriptor, returning the one it replaced.
    pub fn insert(&mut self, descriptor: TokenDescriptor) -> Option<TokenDescriptor> {
        self.entries.insert(descriptor.token_text.clone(), descriptor)
    }

    /// Loads a dictionary from a CSV file.
    ///
    /// # Errors
    /// - `Missing` if the file does not exist
    /// - `MissingColumn` if a required column is absent
    /// - `Io` / `Csv` for unreadable or malformed input
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<DictionaryLoad, DictionaryError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DictionaryError::Missing {
                path: path.to_path_buf(),
            });
        }
        let file = std::fs::File::open(path).map_err(|source| DictionaryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let load = Self::from_csv_reader(file)?;
        log::info!(
            "Loaded {} tokens from {} ({} quarantined)",
            load.dictionary.len(),
            path.display(),
            load.quarantined.len()
        );
        Ok(load)
    }

    /// Loads a dictionary from any CSV reader.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<DictionaryLoad, DictionaryError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(DictionaryError::MissingColumn {
                    column: column.to_string(),
                });
            }
        }

        let mut dictionary = Self::new();
        let mut quarantined = Vec::new();

        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, csv::Position::line);
            let raw: RawRow = record.deserialize(Some(&headers))?;
            match raw.into_descriptor() {
                Ok(descriptor) => {
                    if let Some(previous) = dictionary.insert(descriptor) {
                        log::warn!(
                            "Duplicate dictionary token '{}' at line {line}; later row wins",
                            previous.token_text
                        );
                    }
                }
                Err((token, reason)) => {
                    log::warn!("Quarantined dictionary row at line {line}: {reason}");
                    quarantined.push(QuarantinedRow { line, token, reason });
                }
            }
        }

        Ok(DictionaryLoad {
            dictionary,
            quarantined,
        })
    }

    /// Looks up a token by its literal text.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<&TokenDescriptor> {
        self.entries.get(token)
    }

    /// Returns true if the token text is a dictionary key.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.entries.contains_key(token)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the dictionary has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stable BLAKE3 digest of the dictionary contents (hex).
    ///
    /// Independent of load order.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let sorted: BTreeMap<&str, &TokenDescriptor> =
            self.entries.iter().map(|(k, v)| (k.as_str(), v)).collect();
        let mut hasher = blake3::Hasher::new();
        for (key, d) in sorted {
            for field in [
                Some(key),
                Some(d.simplified_type.as_str()),
                Some(d.raw_type.as_str()),
                Some(d.display_name.as_str()),
                d.primary_identifier.as_deref(),
                d.secondary_identifier.as_deref(),
                d.tertiary_identifier.as_deref(),
            ] {
                hasher.update(field.unwrap_or("").as_bytes());
                hasher.update(&[0x1f]);
            }
            hasher.update(&[0x1e]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "token,simplified_type,type,name,primary_identifier,secondary_identifier,tertiary_identifier\n";

    fn load(body: &str) -> DictionaryLoad {
        let csv = format!("{HEADER}{body}");
        TokenDictionary::from_csv_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn loads_typed_rows() {
        let load = load(
            "Sst,gene,gene,somatostatin,ENSEMBL:ENSMUSG00000004366,,\n\
             ACB,anatomical,MBA region,Nucleus accumbens,MBA:56,ACB,\n\
             Gaba,neurotransmission,neurotransmitter,GABAergic,CL:0000617,,\n",
        );
        assert!(load.quarantined.is_empty());
        let dict = load.dictionary;
        assert_eq!(dict.len(), 3);

        let sst = dict.get("Sst").unwrap();
        assert_eq!(sst.simplified_type, SimplifiedType::Gene);
        assert_eq!(sst.primary_identifier.as_deref(), Some("ENSEMBL:ENSMUSG00000004366"));
        assert!(sst.secondary_identifier.is_none());

        let acb = dict.get("ACB").unwrap();
        assert_eq!(acb.raw_type, "MBA region");
        assert_eq!(acb.secondary_identifier.as_deref(), Some("ACB"));
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let dict = load("Sst,gene,gene,somatostatin,ENSEMBL:1,,\n").dictionary;
        assert!(dict.contains("Sst"));
        assert!(!dict.contains("sst"));
        assert!(!dict.contains("SST"));
    }

    #[test]
    fn null_sentinels_become_absent() {
        let dict = load("Chat,gene,gene,choline acetyltransferase,nan,None,\n").dictionary;
        let chat = dict.get("Chat").unwrap();
        assert!(chat.primary_identifier.is_none());
        assert!(chat.secondary_identifier.is_none());
    }

    #[test]
    fn quarantines_incomplete_rows() {
        let load = load(
            ",gene,gene,nameless,ENSEMBL:1,,\n\
             Foo,,gene,foo,ENSEMBL:2,,\n\
             Bar,protein,gene,bar,ENSEMBL:3,,\n\
             Baz,unknown,unknown,baz,X:1,,\n\
             Qux,gene,gene,,ENSEMBL:4,,\n\
             Ok,gene,gene,ok,ENSEMBL:5,,\n",
        );
        assert_eq!(load.dictionary.len(), 1);
        assert!(load.dictionary.contains("Ok"));

        let reasons: Vec<_> = load.quarantined.iter().map(|q| q.reason.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                QuarantineReason::MissingField("token"),
                QuarantineReason::MissingField("simplified_type"),
                QuarantineReason::UnrecognisedType("protein".to_string()),
                QuarantineReason::UnknownWithIdentifier,
                QuarantineReason::MissingField("name"),
            ]
        );
        assert_eq!(load.quarantined[0].line, 2);
        assert_eq!(load.quarantined[1].token.as_deref(), Some("Foo"));
    }

    #[test]
    fn duplicate_token_last_wins() {
        let dict = load(
            "Sst,gene,gene,first,ENSEMBL:1,,\n\
             Sst,gene,gene,second,ENSEMBL:2,,\n",
        )
        .dictionary;
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get("Sst").unwrap().display_name, "second");
    }

    #[test]
    fn optional_columns_may_be_absent() {
        let csv = "token,simplified_type,type,name,primary_identifier\nSst,gene,gene,s,ENSEMBL:1\n";
        let load = TokenDictionary::from_csv_reader(csv.as_bytes()).unwrap();
        assert_eq!(load.dictionary.len(), 1);
        assert!(load.dictionary.get("Sst").unwrap().tertiary_identifier.is_none());
    }

    #[test]
    fn missing_required_column_is_error() {
        let csv = "token,type,name\nSst,gene,s\n";
        let err = TokenDictionary::from_csv_reader(csv.as_bytes()).unwrap_err();
        let DictionaryError::MissingColumn { column } = err else {
            panic!("expected MissingColumn, got {err:?}");
        };
        assert_eq!(column, "simplified_type");
    }

    #[test]
    fn missing_file_is_error() {
        let err = TokenDictionary::from_csv_path("/nonexistent/tokens.csv").unwrap_err();
        assert!(matches!(err, DictionaryError::Missing { .. }));
    }

    #[test]
    fn fingerprint_ignores_insertion_order() {
        let a = TokenDescriptor::unknown("A");
        let b = TokenDescriptor::unknown("B");
        let d1 = TokenDictionary::from_descriptors([a.clone(), b.clone()]);
        let d2 = TokenDictionary::from_descriptors([b, a]);
        assert_eq!(d1.fingerprint(), d2.fingerprint());
        assert_ne!(d1.fingerprint(), TokenDictionary::new().fingerprint());
    }
}
