//! Set-overlap similarity between entity records.
//!
//! Every record is reduced to a [`Comparable`] view with four fields:
//! category, functionality phrases, members (props / methods / returns /
//! fields) and tags. Two scoring strategies run over that view:
//!
//! | Strategy | Used by | Formula |
//! |----------|---------|---------|
//! | [`SimilarityStrategy::FieldAverage`] | registry, gateway | mean of sub-scores over fields present on both sides |
//! | [`SimilarityStrategy::Weighted`] | catalog | `Σ weight × sub-score`, absent fields contribute 0 |
//!
//! Sub-scores:
//!
//! - **category**: `1.0` if equal (case-sensitive), else `0.0`.
//! - **functionality**: phrases are split on non-word characters and
//!   lower-cased; Jaccard of the token sets.
//! - **members** and **tags**: Jaccard of the raw string sets (case-sensitive).
//!
//! The two strategies disagree: the same pair can be a
//! registry duplicate and a catalog near-miss. Weighted scores are not
//! renormalised, so they top out at the sum of the weights.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;

use crate::models::{EntityMetadata, EntityRecord};

/// The comparable fields of one record.
#[derive(Debug, Clone, Copy, Default)]
pub struct Comparable<'a> {
    pub category: Option<&'a str>,
    pub functionality: &'a [String],
    pub members: &'a [String],
    pub tags: &'a [String],
}

impl<'a> Comparable<'a> {
    pub fn from_record(record: &'a EntityRecord) -> Self {
        Self::from_metadata(&record.metadata)
    }

    pub fn from_metadata(metadata: &'a EntityMetadata) -> Self {
        Self {
            category: metadata.category(),
            functionality: metadata.functionality(),
            members: metadata.members(),
            tags: &[],
        }
    }
}

/// Per-field weights for [`SimilarityStrategy::Weighted`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityWeights {
    #[serde(default)]
    pub category: f64,
    #[serde(default)]
    pub tags: f64,
    #[serde(default)]
    pub functionality: f64,
    #[serde(default)]
    pub members: f64,
}

impl SimilarityWeights {
    /// The catalog's blend: category 30%, tags 20%, functionality 30%.
    pub const CATALOG: SimilarityWeights = SimilarityWeights {
        category: 0.3,
        tags: 0.2,
        functionality: 0.3,
        members: 0.0,
    };

    pub fn total(&self) -> f64 {
        self.category + self.tags + self.functionality + self.members
    }
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self::CATALOG
    }
}

/// How sub-scores are combined into one similarity value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimilarityStrategy {
    /// Unweighted mean over fields present on both records.
    FieldAverage,
    /// Fixed-weight blend; absent fields score 0.
    Weighted(SimilarityWeights),
}

impl SimilarityStrategy {
    pub fn score(&self, a: &Comparable<'_>, b: &Comparable<'_>) -> f64 {
        let subs = SubScores::compute(a, b);
        match self {
            SimilarityStrategy::FieldAverage => {
                let present: Vec<f64> = [subs.category, subs.functionality, subs.members, subs.tags]
                    .into_iter()
                    .flatten()
                    .collect();
                if present.is_empty() {
                    0.0
                } else {
                    present.iter().sum::<f64>() / present.len() as f64
                }
            }
            SimilarityStrategy::Weighted(w) => {
                w.category * subs.category.unwrap_or(0.0)
                    + w.tags * subs.tags.unwrap_or(0.0)
                    + w.functionality * subs.functionality.unwrap_or(0.0)
                    + w.members * subs.members.unwrap_or(0.0)
            }
        }
    }
}

/// Sub-scores for each field; `None` when the field is absent on either side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SubScores {
    pub category: Option<f64>,
    pub functionality: Option<f64>,
    pub members: Option<f64>,
    pub tags: Option<f64>,
}

impl SubScores {
    pub fn compute(a: &Comparable<'_>, b: &Comparable<'_>) -> Self {
        let category = match (non_blank(a.category), non_blank(b.category)) {
            (Some(x), Some(y)) => Some(if x == y { 1.0 } else { 0.0 }),
            _ => None,
        };

        let ta = tokenize(a.functionality);
        let tb = tokenize(b.functionality);
        let functionality = if ta.is_empty() || tb.is_empty() {
            None
        } else {
            Some(jaccard(&ta, &tb))
        };

        Self {
            category,
            functionality,
            members: list_overlap(a.members, b.members),
            tags: list_overlap(a.tags, b.tags),
        }
    }
}

/// Registry similarity between two records (unweighted field average).
///
/// Returns `0.0` when the records share no comparable field.
pub fn similarity(a: &EntityRecord, b: &EntityRecord) -> f64 {
    SimilarityStrategy::FieldAverage.score(&Comparable::from_record(a), &Comparable::from_record(b))
}

/// Split phrases on non-word characters and lower-case the tokens.
///
/// Word characters are alphanumerics and `_`.
pub fn tokenize(phrases: &[String]) -> HashSet<String> {
    phrases
        .iter()
        .flat_map(|p| p.split(|c: char| !(c.is_alphanumeric() || c == '_')))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Intersection size over union size. Two empty sets score `0.0`.
pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn list_overlap(a: &[String], b: &[String]) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let sa: HashSet<&str> = a.iter().map(String::as_str).collect();
    let sb: HashSet<&str> = b.iter().map(String::as_str).collect();
    Some(jaccard(&sa, &sb))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
