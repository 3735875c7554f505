//! Table identifier normalization.
//!
//! Ordering clients have written table identifiers in many shapes over time:
//! `"5"`, `5`, `"Table 5 "`, `"table%205"`, `null`, `"N/A"`. Settlement must
//! find every open order that belongs to the table the cashier picked, so the
//! raw identifier is resolved into a [`MatchPredicate`] that can be evaluated
//! in memory or rendered as a MongoDB filter.

use mongodb::bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::TableIdentifier;

/// Stored field holding the table identifier on order documents.
pub const TABLE_FIELD: &str = "tableNumber";

/// Placeholder strings clients send when no table was chosen. Case-sensitive.
pub const DEFAULT_MISSING_SENTINELS: &[&str] = &[
    "null",
    "undefined",
    "N/A",
    "Unknown",
    "Not Provided",
    "not provided",
    "None",
    "-",
];

/// How a raw table identifier selects open orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchPredicate {
    /// Case-insensitive, whitespace-tolerant match on a named table.
    /// `key` is trimmed, lowercased and has inner whitespace collapsed.
    Named { key: String, numeric: Option<f64> },
    /// Orders placed without a usable table identifier.
    Missing { sentinels: Vec<String> },
}

impl MatchPredicate {
    /// Evaluate the predicate against a stored identifier.
    pub fn matches(&self, stored: Option<&TableIdentifier>) -> bool {
        match (self, stored) {
            (MatchPredicate::Named { key, .. }, Some(TableIdentifier::Text(text))) => {
                fold(text) == *key
            }
            (MatchPredicate::Named { numeric, .. }, Some(TableIdentifier::Number(n))) => {
                numeric.is_some_and(|value| value == *n)
            }
            (MatchPredicate::Named { .. }, None) => false,
            (MatchPredicate::Missing { .. }, None) => true,
            (MatchPredicate::Missing { sentinels }, Some(TableIdentifier::Text(text))) => {
                let trimmed = text.trim();
                trimmed.is_empty() || sentinels.iter().any(|s| s == trimmed)
            }
            (MatchPredicate::Missing { .. }, Some(TableIdentifier::Number(_))) => false,
        }
    }

    /// MongoDB filter selecting the same documents as [`MatchPredicate::matches`].
    pub fn to_filter(&self) -> Document {
        match self {
            MatchPredicate::Named { key, numeric } => {
                let words: Vec<String> = key.split(' ').map(regex::escape).collect();
                let pattern = format!(r"^\s*{}\s*$", words.join(r"\s+"));

                let mut clauses = vec![Bson::Document(
                    doc! { TABLE_FIELD: { "$regex": pattern, "$options": "i" } },
                )];
                if let Some(n) = numeric {
                    clauses.push(Bson::Document(doc! { TABLE_FIELD: *n }));
                }
                doc! { "$or": clauses }
            }
            MatchPredicate::Missing { sentinels } => {
                let alternatives: Vec<String> =
                    sentinels.iter().map(|s| regex::escape(s)).collect();
                let pattern = if alternatives.is_empty() {
                    r"^\s*$".to_string()
                } else {
                    format!(r"^\s*(?:{})?\s*$", alternatives.join("|"))
                };
                // `null` also matches documents where the field is absent.
                doc! {
                    "$or": [
                        { TABLE_FIELD: Bson::Null },
                        { TABLE_FIELD: { "$regex": pattern } },
                    ]
                }
            }
        }
    }

    /// Identifier recorded on the invoice for the matched orders.
    ///
    /// When every matched order spelled the table the same way (after
    /// trimming) that spelling wins; otherwise the folded key is used.
    pub fn canonical_label<'a, I>(&self, stored: I) -> Option<String>
    where
        I: IntoIterator<Item = Option<&'a TableIdentifier>>,
    {
        let key = match self {
            MatchPredicate::Missing { .. } => return None,
            MatchPredicate::Named { key, .. } => key,
        };

        let mut spellings: Vec<String> = stored
            .into_iter()
            .flatten()
            .map(|identifier| match identifier {
                TableIdentifier::Text(text) => text.trim().to_string(),
                number => number.to_string(),
            })
            .collect();
        spellings.sort();
        spellings.dedup();

        match spellings.as_slice() {
            [only] => Some(only.clone()),
            _ => Some(key.clone()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, MatchPredicate::Missing { .. })
    }
}

impl fmt::Display for MatchPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPredicate::Named { key, .. } => write!(f, "{}", key),
            MatchPredicate::Missing { .. } => write!(f, "<no table>"),
        }
    }
}

/// Resolves raw table identifiers using a configured sentinel set.
#[derive(Debug, Clone)]
pub struct IdentifierNormalizer {
    sentinels: Vec<String>,
}

impl Default for IdentifierNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MISSING_SENTINELS.iter().copied())
    }
}

impl IdentifierNormalizer {
    pub fn new<I, S>(sentinels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sentinels: Vec<String> = sentinels
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        sentinels.sort();
        sentinels.dedup();
        Self { sentinels }
    }

    pub fn sentinels(&self) -> &[String] {
        &self.sentinels
    }

    /// Resolve a raw identifier. Never fails: anything unusable selects the
    /// orders that have no table.
    pub fn normalize(&self, raw: Option<&str>) -> MatchPredicate {
        let cleaned = raw.map(clean).unwrap_or_default();

        if cleaned.is_empty() || self.sentinels.iter().any(|s| *s == cleaned) {
            return MatchPredicate::Missing {
                sentinels: self.sentinels.clone(),
            };
        }

        let numeric = cleaned.parse::<f64>().ok().filter(|n| n.is_finite());

        MatchPredicate::Named {
            key: fold(&cleaned),
            numeric,
        }
    }
}

/// Percent-decode and trim. Invalid UTF-8 after decoding is replaced lossily.
fn clean(raw: &str) -> String {
    let decoded = urlencoding::decode_binary(raw.as_bytes());
    String::from_utf8_lossy(&decoded).trim().to_string()
}

fn fold(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
