//! Search-oriented catalog of known entities.
//!
//! The catalog is a denormalized index that lives next to the
//! [`ComponentRegistry`](crate::registry::ComponentRegistry) but is not
//! kept in sync with it: entries can be added, removed, exported,
//! imported and cleared on their own. It never takes part in the
//! allow/block decision.
//!
//! # Relevance
//!
//! | Match | Points |
//! |-------|--------|
//! | name equals query | 100 |
//! | name contains query | 50 (only when not an exact match) |
//! | description contains query | +20 |
//! | each search term containing query | +10 |
//!
//! Results are sorted by relevance with a stable sort, so ties keep
//! insertion order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::{EntityKind, EntityRecord};
use crate::similarity::{tokenize, Comparable, SimilarityStrategy, SimilarityWeights};

pub const DEFAULT_SIMILAR_THRESHOLD: f64 = 0.7;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CatalogError {
    #[error("unsupported catalog snapshot version {0}")]
    SnapshotVersion(u32),
}

/// A catalog entry: entity fields plus search decoration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub kind: EntityKind,
    pub category: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub functionality: Vec<String>,
    #[serde(default)]
    pub members: Vec<String>,
    pub file_path: Option<String>,
    #[serde(default)]
    pub search_terms: Vec<String>,
    pub added_at: DateTime<Utc>,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
            category: None,
            description: None,
            tags: Vec::new(),
            functionality: Vec::new(),
            members: Vec::new(),
            file_path: None,
            search_terms: Vec::new(),
            added_at: Utc::now(),
        }
    }

    /// Build an entry from a registry record.
    pub fn from_record(record: &EntityRecord, tags: Vec<String>) -> Self {
        let meta = &record.metadata;
        Self {
            category: meta.category().map(str::to_string),
            description: meta.description().map(str::to_string),
            tags,
            functionality: meta.functionality().to_vec(),
            members: meta.members().to_vec(),
            file_path: meta.file_path().map(str::to_string),
            ..Self::new(record.name.clone(), record.kind())
        }
        .with_search_terms()
    }

    /// Recompute `search_terms` from the entry's own fields.
    pub fn with_search_terms(mut self) -> Self {
        let mut terms: Vec<String> = Vec::new();
        let mut push = |term: String| {
            if !term.is_empty() && !terms.contains(&term) {
                terms.push(term);
            }
        };

        push(self.name.to_lowercase());
        for word in split_identifier(&self.name) {
            push(word);
        }
        if let Some(category) = &self.category {
            push(category.to_lowercase());
        }
        for tag in &self.tags {
            push(tag.to_lowercase());
        }
        let mut tokens: Vec<String> = tokenize(&self.functionality).into_iter().collect();
        tokens.sort();
        for token in tokens {
            push(token);
        }

        self.search_terms = terms;
        self
    }

    fn comparable(&self) -> Comparable<'_> {
        Comparable {
            category: self.category.as_deref(),
            functionality: &self.functionality,
            members: &self.members,
            tags: &self.tags,
        }
    }

    fn haystack(&self) -> String {
        let mut parts: Vec<&str> = vec![self.name.as_str()];
        if let Some(d) = &self.description {
            parts.push(d);
        }
        if let Some(c) = &self.category {
            parts.push(c);
        }
        parts.extend(self.tags.iter().map(String::as_str));
        parts.extend(self.search_terms.iter().map(String::as_str));
        parts.join(" ").to_lowercase()
    }
}

/// Filters and mode for [`ComponentCatalog::search`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchOptions {
    #[serde(default)]
    pub category: Option<String>,
    /// Every listed tag must be present on the entry.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<EntityKind>,
    #[serde(default)]
    pub fuzzy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogHit {
    pub relevance: u32,
    pub entry: CatalogEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarEntry {
    pub name: String,
    pub kind: EntityKind,
    pub file_path: Option<String>,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub version: u32,
    pub entries: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub total: usize,
    pub by_kind: BTreeMap<EntityKind, usize>,
    pub by_category: BTreeMap<String, usize>,
}

pub struct ComponentCatalog {
    entries: Vec<CatalogEntry>,
    weights: SimilarityWeights,
}

impl ComponentCatalog {
    pub fn new(weights: SimilarityWeights) -> Self {
        Self {
            entries: Vec::new(),
            weights,
        }
    }

    /// Add an entry. An entry with the same kind and name is replaced in
    /// place and keeps its position.
    pub fn add(&mut self, entry: CatalogEntry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.kind == entry.kind && e.name == entry.name)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Remove entries named `name`, optionally restricted to one kind.
    /// Returns how many were removed.
    pub fn remove(&mut self, name: &str, kind: Option<EntityKind>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.name == name && kind.map(|k| k == e.kind).unwrap_or(true)));
        before - self.entries.len()
    }

    /// First entry named `name`, in insertion order.
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Linear search: filters first, then text match, then relevance sort.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<CatalogHit> {
        let q = query.trim().to_lowercase();

        let mut hits: Vec<CatalogHit> = self
            .entries
            .iter()
            .filter(|e| passes_filters(e, options))
            .filter(|e| q.is_empty() || text_matches(e, &q, options.fuzzy))
            .map(|e| CatalogHit {
                relevance: relevance(e, &q),
                entry: e.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.relevance.cmp(&a.relevance));
        hits
    }

    /// Entries whose weighted similarity to `name` is at least `threshold`,
    /// best first. Unknown names have no similar entries.
    pub fn get_similar(&self, name: &str, threshold: f64) -> Vec<SimilarEntry> {
        let Some(target) = self.get(name) else {
            return Vec::new();
        };
        let strategy = SimilarityStrategy::Weighted(self.weights);
        let base = target.comparable();

        let mut similar: Vec<SimilarEntry> = self
            .entries
            .iter()
            .filter(|e| !(e.name == target.name && e.kind == target.kind))
            .filter_map(|e| {
                let score = strategy.score(&base, &e.comparable());
                (score >= threshold).then(|| SimilarEntry {
                    name: e.name.clone(),
                    kind: e.kind,
                    file_path: e.file_path.clone(),
                    score,
                })
            })
            .collect();
        similar.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        similar
    }

    pub fn stats(&self) -> CatalogStats {
        let mut by_kind: BTreeMap<EntityKind, usize> = BTreeMap::new();
        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
        for e in &self.entries {
            *by_kind.entry(e.kind).or_default() += 1;
            let category = e
                .category
                .clone()
                .unwrap_or_else(|| "uncategorized".to_string());
            *by_category.entry(category).or_default() += 1;
        }
        CatalogStats {
            total: self.entries.len(),
            by_kind,
            by_category,
        }
    }

    pub fn export(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            version: SNAPSHOT_VERSION,
            entries: self.entries.clone(),
        }
    }

    pub fn check_import(&self, snapshot: &CatalogSnapshot) -> Result<(), CatalogError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CatalogError::SnapshotVersion(snapshot.version));
        }
        Ok(())
    }

    /// Merge a snapshot into the catalog using [`add`](Self::add) semantics.
    pub fn import(&mut self, snapshot: CatalogSnapshot) -> Result<usize, CatalogError> {
        self.check_import(&snapshot)?;
        let count = snapshot.entries.len();
        for entry in snapshot.entries {
            self.add(entry);
        }
        Ok(count)
    }
}

impl Default for ComponentCatalog {
    fn default() -> Self {
        Self::new(SimilarityWeights::CATALOG)
    }
}

fn passes_filters(entry: &CatalogEntry, options: &SearchOptions) -> bool {
    if let Some(category) = &options.category {
        if entry.category.as_deref() != Some(category.as_str()) {
            return false;
        }
    }
    if let Some(kind) = options.kind {
        if entry.kind != kind {
            return false;
        }
    }
    options.tags.iter().all(|t| entry.tags.contains(t))
}

fn text_matches(entry: &CatalogEntry, q: &str, fuzzy: bool) -> bool {
    let haystack = entry.haystack();
    if fuzzy {
        q.split_whitespace().any(|w| haystack.contains(w))
            || fuzzy_match(q, &entry.name.to_lowercase())
    } else {
        haystack.contains(q)
    }
}

fn relevance(entry: &CatalogEntry, q: &str) -> u32 {
    if q.is_empty() {
        return 0;
    }
    let name = entry.name.to_lowercase();
    let mut score = if name == q {
        100
    } else if name.contains(q) {
        50
    } else {
        0
    };
    if entry
        .description
        .as_deref()
        .map(|d| d.to_lowercase().contains(q))
        .unwrap_or(false)
    {
        score += 20;
    }
    score += 10 * entry.search_terms.iter().filter(|t| t.contains(q)).count() as u32;
    score
}

/// Subsequence match: every non-whitespace character of `pattern` appears
/// in `text` in order, not necessarily contiguously.
pub fn fuzzy_match(pattern: &str, text: &str) -> bool {
    let mut chars = text.chars();
    pattern
        .chars()
        .filter(|c| !c.is_whitespace())
        .all(|p| chars.any(|t| t == p))
}

/// Split a camelCase / PascalCase / snake_case identifier into lower-case words.
pub fn split_identifier(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
