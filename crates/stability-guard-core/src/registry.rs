//! Authoritative in-memory registry of known entities.
//!
//! Entities are partitioned by [`EntityKind`]; names are unique within a
//! kind. Registration runs its checks in a fixed order:
//!
//! 1. locked registry → [`RegistryError::Locked`]
//! 2. missing required metadata → [`RegistryError::Validation`]
//! 3. existing `(kind, name)` → [`RegistryError::DuplicateName`]
//! 4. similarity `>= rejection_threshold` to any same-kind entry →
//!    [`RegistryError::FunctionalDuplicate`]
//!
//! Matches between `warning_threshold` and `rejection_threshold` are
//! accepted and returned as warnings on the [`Registration`].
//!
//! Watchers observe every mutation. A failing watcher is logged and
//! otherwise ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::{EntityKind, EntityMetadata, EntityRecord};
use crate::similarity::{Comparable, SimilarityStrategy};

pub const DEFAULT_REJECTION_THRESHOLD: f64 = 0.9;
pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.8;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("{kind} '{name}' is missing required fields: {}", .missing.join(", "))]
    Validation {
        kind: EntityKind,
        name: String,
        missing: Vec<&'static str>,
    },

    #[error("{kind} '{name}' is already registered")]
    DuplicateName { kind: EntityKind, name: String },

    #[error("{kind} '{name}' duplicates '{existing}' (similarity {score:.2})")]
    FunctionalDuplicate {
        kind: EntityKind,
        name: String,
        existing: String,
        score: f64,
    },

    #[error("registry is locked")]
    Locked,

    #[error("unsupported registry snapshot version {0}")]
    SnapshotVersion(u32),
}

/// Similarity thresholds for registration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistryConfig {
    pub rejection_threshold: f64,
    pub warning_threshold: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            rejection_threshold: DEFAULT_REJECTION_THRESHOLD,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }
}

/// An existing entity that resembles a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarMatch {
    pub name: String,
    pub kind: EntityKind,
    pub file_path: Option<String>,
    pub score: f64,
}

/// A successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub record: EntityRecord,
    /// Functional-duplicate warnings below the rejection threshold.
    pub warnings: Vec<SimilarMatch>,
}

/// A mutation observed by watchers.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Registered(EntityRecord),
    Removed(EntityRecord),
    Imported { count: usize },
    Cleared,
    Locked,
    Unlocked,
}

impl RegistryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::Registered(_) => "registered",
            RegistryEvent::Removed(_) => "removed",
            RegistryEvent::Imported { .. } => "imported",
            RegistryEvent::Cleared => "cleared",
            RegistryEvent::Locked => "locked",
            RegistryEvent::Unlocked => "unlocked",
        }
    }
}

pub type Watcher = Box<dyn Fn(&RegistryEvent) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by [`ComponentRegistry::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherId(u64);

/// Serializable registry contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: u32,
    pub entries: Vec<EntityRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub by_kind: BTreeMap<EntityKind, usize>,
    pub locked: bool,
}

pub struct ComponentRegistry {
    config: RegistryConfig,
    entries: BTreeMap<EntityKind, BTreeMap<String, EntityRecord>>,
    locked: bool,
    watchers: Vec<(WatcherId, Watcher)>,
    next_watcher: u64,
}

impl ComponentRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
            locked: false,
            watchers: Vec::new(),
            next_watcher: 0,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a new entity. See the module docs for the check order.
    pub fn register(
        &mut self,
        name: &str,
        metadata: EntityMetadata,
    ) -> Result<Registration, RegistryError> {
        self.admit(name, &metadata)?;

        let matches = self.find_similar(name, &metadata, self.config.warning_threshold);
        if let Some(top) = matches
            .iter()
            .find(|m| m.score >= self.config.rejection_threshold)
        {
            return Err(RegistryError::FunctionalDuplicate {
                kind: metadata.kind(),
                name: name.to_string(),
                existing: top.name.clone(),
                score: top.score,
            });
        }

        let record = EntityRecord::new(name, metadata);
        self.insert(record.clone());
        self.notify(&RegistryEvent::Registered(record.clone()));

        Ok(Registration {
            record,
            warnings: matches,
        })
    }

    /// Insert an entity that already exists in the codebase.
    ///
    /// Runs the lock, validation and name checks but skips the similarity
    /// check. Used for declarations found by a source scan.
    pub fn record_existing(&mut self, record: EntityRecord) -> Result<(), RegistryError> {
        self.admit(&record.name, &record.metadata)?;
        self.insert(record.clone());
        self.notify(&RegistryEvent::Registered(record));
        Ok(())
    }

    fn admit(&self, name: &str, metadata: &EntityMetadata) -> Result<(), RegistryError> {
        if self.locked {
            return Err(RegistryError::Locked);
        }

        let kind = metadata.kind();
        let mut missing = metadata.missing_required();
        if name.trim().is_empty() {
            missing.insert(0, "name");
        }
        if !missing.is_empty() {
            return Err(RegistryError::Validation {
                kind,
                name: name.to_string(),
                missing,
            });
        }

        if self.contains(kind, name) {
            return Err(RegistryError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }

        Ok(())
    }

    fn insert(&mut self, record: EntityRecord) {
        self.entries
            .entry(record.kind())
            .or_default()
            .insert(record.name.clone(), record);
    }

    pub fn get(&self, kind: EntityKind, name: &str) -> Option<&EntityRecord> {
        self.entries.get(&kind).and_then(|m| m.get(name))
    }

    pub fn contains(&self, kind: EntityKind, name: &str) -> bool {
        self.get(kind, name).is_some()
    }

    /// Remove an entity. Removal is refused while locked.
    pub fn remove(
        &mut self,
        kind: EntityKind,
        name: &str,
    ) -> Result<Option<EntityRecord>, RegistryError> {
        if self.locked {
            return Err(RegistryError::Locked);
        }
        let removed = self.entries.get_mut(&kind).and_then(|m| m.remove(name));
        if let Some(record) = &removed {
            self.notify(&RegistryEvent::Removed(record.clone()));
        }
        Ok(removed)
    }

    /// All entities of one kind, ordered by name.
    pub fn list(&self, kind: EntityKind) -> Vec<&EntityRecord> {
        self.entries
            .get(&kind)
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    /// All entities, ordered by kind then name.
    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entries.values().flat_map(|m| m.values())
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Same-kind entities scoring `>= threshold` against the candidate,
    /// best first. An entry named `name` is never its own match.
    pub fn find_similar(
        &self,
        name: &str,
        metadata: &EntityMetadata,
        threshold: f64,
    ) -> Vec<SimilarMatch> {
        self.find_similar_to(
            metadata.kind(),
            name,
            &Comparable::from_metadata(metadata),
            threshold,
        )
    }

    /// Like [`find_similar`](Self::find_similar) for a bare comparable view.
    pub fn find_similar_to(
        &self,
        kind: EntityKind,
        name: &str,
        candidate: &Comparable<'_>,
        threshold: f64,
    ) -> Vec<SimilarMatch> {
        let mut matches: Vec<SimilarMatch> = self
            .list(kind)
            .into_iter()
            .filter(|r| r.name != name)
            .filter_map(|r| {
                let score =
                    SimilarityStrategy::FieldAverage.score(candidate, &Comparable::from_record(r));
                (score >= threshold).then(|| SimilarMatch {
                    name: r.name.clone(),
                    kind: r.kind(),
                    file_path: r.metadata.file_path().map(str::to_string),
                    score,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches
    }

    pub fn lock(&mut self) {
        if !self.locked {
            self.locked = true;
            self.notify(&RegistryEvent::Locked);
        }
    }

    pub fn unlock(&mut self) {
        if self.locked {
            self.locked = false;
            self.notify(&RegistryEvent::Unlocked);
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn watch(&mut self, watcher: Watcher) -> WatcherId {
        let id = WatcherId(self.next_watcher);
        self.next_watcher += 1;
        self.watchers.push((id, watcher));
        id
    }

    pub fn unwatch(&mut self, id: WatcherId) -> bool {
        let before = self.watchers.len();
        self.watchers.retain(|(w, _)| *w != id);
        self.watchers.len() != before
    }

    /// Drop every entity. Refused while locked.
    pub fn clear(&mut self) -> Result<(), RegistryError> {
        if self.locked {
            return Err(RegistryError::Locked);
        }
        self.entries.clear();
        self.notify(&RegistryEvent::Cleared);
        Ok(())
    }

    pub fn stats(&self) -> RegistryStats {
        let by_kind = EntityKind::ALL
            .iter()
            .map(|k| (*k, self.entries.get(k).map(BTreeMap::len).unwrap_or(0)))
            .collect();
        RegistryStats {
            total: self.len(),
            by_kind,
            locked: self.locked,
        }
    }

    pub fn export(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            version: SNAPSHOT_VERSION,
            entries: self.iter().cloned().collect(),
        }
    }

    /// Run every check [`import`](Self::import) would run, without
    /// inserting anything.
    pub fn check_import(&self, snapshot: &RegistrySnapshot) -> Result<(), RegistryError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RegistryError::SnapshotVersion(snapshot.version));
        }
        let mut seen = std::collections::HashSet::new();
        for record in &snapshot.entries {
            self.admit(&record.name, &record.metadata)?;
            if !seen.insert((record.kind(), record.name.as_str())) {
                return Err(RegistryError::DuplicateName {
                    kind: record.kind(),
                    name: record.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Load a snapshot. Every record is checked before any is inserted, so
    /// a failing import leaves the registry untouched.
    pub fn import(&mut self, snapshot: RegistrySnapshot) -> Result<usize, RegistryError> {
        self.check_import(&snapshot)?;

        let count = snapshot.entries.len();
        for record in snapshot.entries {
            self.insert(record);
        }
        self.notify(&RegistryEvent::Imported { count });
        Ok(count)
    }

    fn notify(&self, event: &RegistryEvent) {
        for (id, watcher) in &self.watchers {
            if let Err(e) = watcher(event) {
                log::warn!(
                    "registry watcher {:?} failed on '{}' event: {}",
                    id,
                    event.name(),
                    e
                );
            }
        }
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
