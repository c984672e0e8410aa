//! Per-process guard state.
//!
//! [`StabilityGuard`] owns everything a running `sguard` needs: the
//! registry, the catalog, the detectors and the audit sink. It is built
//! once from [`Config`] and shared behind an `Arc`; there are no globals.
//!
//! Registry and catalog sit behind `std::sync::RwLock`. Guards are always
//! dropped before any `.await`, so the audit write in
//! [`StabilityGuard::analyze`] happens with no lock held.
//!
//! Successful registrations are mirrored into the catalog. The catalog is
//! never consulted by the gateway.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use stability_guard_core::catalog::{
    CatalogEntry, CatalogHit, CatalogSnapshot, CatalogStats, ComponentCatalog, SearchOptions,
    SimilarEntry,
};
use stability_guard_core::detector::{MockDataDetector, MockDataReport, SourceFile};
use stability_guard_core::gateway::{
    CreationRequest, Decision, Gateway, GatewayConfig, SchemaTables, TypeSafetyChecker,
    TypeSafetyReport,
};
use stability_guard_core::models::{EntityMetadata, EntityRecord};
use stability_guard_core::registry::{
    ComponentRegistry, Registration, RegistryError, RegistrySnapshot, RegistryStats, SimilarMatch,
};
use stability_guard_core::scanner::DeclarationScanner;

use crate::audit::{self, AuditSink, AuditStatus, NullSink};
use crate::config::Config;

/// A gateway decision plus the outcome of its audit write.
#[derive(Debug, Clone, Serialize)]
pub struct GuardedDecision {
    #[serde(flatten)]
    pub decision: Decision,
    pub audit: AuditStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct GuardStats {
    pub registry: RegistryStats,
    pub catalog: CatalogStats,
}

/// Registry and catalog contents in one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardSnapshot {
    pub registry: RegistrySnapshot,
    pub catalog: CatalogSnapshot,
}

/// Dry-run view of a registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationCheck {
    pub valid: bool,
    pub missing_fields: Vec<&'static str>,
    pub duplicate_name: bool,
    pub would_reject: bool,
    pub similar: Vec<SimilarMatch>,
}

/// Code-level checks with no registry involvement.
#[derive(Debug, Clone, Serialize)]
pub struct CodeReport {
    pub mock_data: MockDataReport,
    pub type_safety: TypeSafetyReport,
}

pub struct StabilityGuard {
    registry: RwLock<ComponentRegistry>,
    catalog: RwLock<ComponentCatalog>,
    detector: MockDataDetector,
    type_checker: TypeSafetyChecker,
    scanner: DeclarationScanner,
    gateway: GatewayConfig,
    schema: SchemaTables,
    similar_threshold: f64,
    audit: Arc<dyn AuditSink>,
}

impl StabilityGuard {
    pub fn new(config: &Config, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            registry: RwLock::new(ComponentRegistry::new(config.registry.thresholds())),
            catalog: RwLock::new(ComponentCatalog::new(config.catalog.weights)),
            detector: MockDataDetector::new(),
            type_checker: TypeSafetyChecker::new(),
            scanner: DeclarationScanner::new(),
            gateway: config.gateway,
            schema: config.schema.tables.clone(),
            similar_threshold: config.catalog.similar_threshold,
            audit,
        }
    }

    /// Guard with auditing disabled.
    pub fn in_memory(config: &Config) -> Self {
        Self::new(config, Arc::new(NullSink))
    }

    /// Build the audit sink and load `[registry].snapshot` if configured.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let sink = audit::sink_from_config(&config.audit).await?;
        log::info!("audit sink: {}", sink.name());
        let guard = Self::new(config, sink);
        if let Some(path) = &config.registry.snapshot {
            if path.exists() {
                let count = guard.load_snapshot(path)?;
                log::info!("loaded {} entities from {}", count, path.display());
            } else {
                log::warn!("registry snapshot {} not found, starting empty", path.display());
            }
        }
        Ok(guard)
    }

    fn registry(&self) -> RwLockReadGuard<'_, ComponentRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_mut(&self) -> RwLockWriteGuard<'_, ComponentRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn catalog(&self) -> RwLockReadGuard<'_, ComponentCatalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn catalog_mut(&self) -> RwLockWriteGuard<'_, ComponentCatalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn scanner(&self) -> &DeclarationScanner {
        &self.scanner
    }

    pub fn detector(&self) -> &MockDataDetector {
        &self.detector
    }

    pub fn similar_threshold(&self) -> f64 {
        self.similar_threshold
    }

    pub fn rejection_threshold(&self) -> f64 {
        self.registry().config().rejection_threshold
    }

    /// Register a new entity and mirror it into the catalog.
    pub fn register(
        &self,
        name: &str,
        metadata: EntityMetadata,
        tags: Vec<String>,
    ) -> Result<Registration, RegistryError> {
        let registration = self.registry_mut().register(name, metadata)?;
        self.catalog_mut()
            .add(CatalogEntry::from_record(&registration.record, tags));
        log::info!(
            "registered {} '{}' ({} warning(s))",
            registration.record.kind(),
            registration.record.name,
            registration.warnings.len()
        );
        Ok(registration)
    }

    /// Record an entity found in the codebase, skipping the similarity check.
    pub fn record_existing(&self, record: EntityRecord) -> Result<(), RegistryError> {
        let entry = CatalogEntry::from_record(&record, Vec::new());
        self.registry_mut().record_existing(record)?;
        self.catalog_mut().add(entry);
        Ok(())
    }

    pub fn check_registration(&self, name: &str, metadata: &EntityMetadata) -> RegistrationCheck {
        let registry = self.registry();
        let missing_fields = metadata.missing_required();
        let duplicate_name = registry.contains(metadata.kind(), name);
        let similar =
            registry.find_similar(name, metadata, registry.config().warning_threshold);
        let would_reject = similar
            .iter()
            .any(|m| m.score >= registry.config().rejection_threshold);
        RegistrationCheck {
            valid: missing_fields.is_empty()
                && !duplicate_name
                && !would_reject
                && !registry.is_locked(),
            missing_fields,
            duplicate_name,
            would_reject,
            similar,
        }
    }

    /// Same-kind registry entries at or above `threshold`.
    pub fn find_similar(
        &self,
        name: &str,
        metadata: &EntityMetadata,
        threshold: f64,
    ) -> Vec<SimilarMatch> {
        self.registry().find_similar(name, metadata, threshold)
    }

    /// Run the gateway without auditing.
    pub fn evaluate(&self, request: &CreationRequest) -> Decision {
        let registry = self.registry();
        Gateway {
            registry: &*registry,
            detector: &self.detector,
            type_checker: &self.type_checker,
            schema: &self.schema,
            config: &self.gateway,
        }
        .evaluate(request)
    }

    /// Run the gateway, then write the audit row.
    pub async fn analyze(&self, request: &CreationRequest) -> GuardedDecision {
        let decision = self.evaluate(request);
        let audit = audit::record_decision(self.audit.as_ref(), &decision).await;
        GuardedDecision { decision, audit }
    }

    pub fn validate_code(&self, path: &str, code: &str) -> CodeReport {
        CodeReport {
            mock_data: self.detector.analyze_text(path, code),
            type_safety: self.type_checker.check(code),
        }
    }

    pub fn analyze_files(&self, files: &[SourceFile]) -> MockDataReport {
        self.detector.analyze(files)
    }

    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<CatalogHit> {
        self.catalog().search(query, options)
    }

    /// Catalog neighbours of `name`; `None` uses `[catalog].similar_threshold`.
    pub fn similar(&self, name: &str, threshold: Option<f64>) -> Vec<SimilarEntry> {
        self.catalog()
            .get_similar(name, threshold.unwrap_or(self.similar_threshold))
    }

    pub fn stats(&self) -> GuardStats {
        GuardStats {
            registry: self.registry().stats(),
            catalog: self.catalog().stats(),
        }
    }

    pub fn export(&self) -> GuardSnapshot {
        GuardSnapshot {
            registry: self.registry().export(),
            catalog: self.catalog().export(),
        }
    }

    /// Import a snapshot. Both halves are checked before either store
    /// changes, so a rejected snapshot leaves the guard as it was.
    pub fn import(&self, snapshot: GuardSnapshot) -> Result<usize> {
        let mut registry = self.registry_mut();
        let mut catalog = self.catalog_mut();
        registry
            .check_import(&snapshot.registry)
            .context("Failed to import registry snapshot")?;
        catalog
            .check_import(&snapshot.catalog)
            .context("Failed to import catalog snapshot")?;

        let count = registry
            .import(snapshot.registry)
            .context("Failed to import registry snapshot")?;
        catalog
            .import(snapshot.catalog)
            .context("Failed to import catalog snapshot")?;
        Ok(count)
    }

    pub fn load_snapshot(&self, path: &Path) -> Result<usize> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        let snapshot: GuardSnapshot = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?;
        self.import(snapshot)
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.export())?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stability_guard_core::gateway::RequestKind;
    use stability_guard_core::models::ComponentMeta;

    fn user_card() -> EntityMetadata {
        EntityMetadata::Component(ComponentMeta {
            file_path: Some("src/components/UserCard.tsx".into()),
            category: Some("ui".into()),
            functionality: vec!["display user info".into()],
            props: vec!["user".into(), "onClick".into()],
            description: Some("Card showing a user".into()),
        })
    }

    #[test]
    fn test_register_mirrors_catalog() {
        let guard = StabilityGuard::in_memory(&Config::minimal());
        guard
            .register("UserCard", user_card(), vec!["card".into()])
            .unwrap();
        let hits = guard.search("user", &SearchOptions::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.tags, vec!["card".to_string()]);

        let stats = guard.stats();
        assert_eq!(stats.registry.total, 1);
        assert_eq!(stats.catalog.total, 1);
    }

    #[test]
    fn test_rejected_registration_leaves_catalog_alone() {
        let guard = StabilityGuard::in_memory(&Config::minimal());
        guard.register("UserCard", user_card(), vec![]).unwrap();
        let err = guard
            .register("UserCardV2", user_card(), vec![])
            .unwrap_err();
        assert!(matches!(err, RegistryError::FunctionalDuplicate { .. }));
        assert_eq!(guard.stats().catalog.total, 1);
    }

    #[test]
    fn test_check_registration_is_dry_run() {
        let guard = StabilityGuard::in_memory(&Config::minimal());
        guard.register("UserCard", user_card(), vec![]).unwrap();
        let check = guard.check_registration("UserCardV2", &user_card());
        assert!(!check.valid);
        assert!(check.would_reject);
        assert!(!check.duplicate_name);
        assert_eq!(guard.stats().registry.total, 1);
    }

    #[tokio::test]
    async fn test_analyze_reports_skipped_audit() {
        let guard = StabilityGuard::in_memory(&Config::minimal());
        guard.register("UserCard", user_card(), vec![]).unwrap();
        let result = guard
            .analyze(&CreationRequest::new(RequestKind::Component, "UserCard"))
            .await;
        assert!(!result.decision.can_proceed);
        assert_eq!(result.audit, AuditStatus::Skipped);
    }

    #[test]
    fn test_snapshot_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/snapshot.json");
        let guard = StabilityGuard::in_memory(&Config::minimal());
        guard.register("UserCard", user_card(), vec![]).unwrap();
        guard.save_snapshot(&path).unwrap();

        let restored = StabilityGuard::in_memory(&Config::minimal());
        assert_eq!(restored.load_snapshot(&path).unwrap(), 1);
        assert_eq!(restored.similar("UserCard", None).len(), 0);
        assert!(restored.load_snapshot(&path).is_err());
    }

    #[test]
    fn test_import_with_bad_catalog_version_changes_nothing() {
        let source = StabilityGuard::in_memory(&Config::minimal());
        source.register("UserCard", user_card(), vec![]).unwrap();
        let mut snapshot = source.export();
        snapshot.catalog.version = 99;

        let target = StabilityGuard::in_memory(&Config::minimal());
        assert!(target.import(snapshot.clone()).is_err());
        let stats = target.stats();
        assert_eq!(stats.registry.total, 0);
        assert_eq!(stats.catalog.total, 0);

        snapshot.catalog.version = source.export().catalog.version;
        assert_eq!(target.import(snapshot).unwrap(), 1);
        assert_eq!(target.stats().catalog.total, 1);
    }

    #[test]
    fn test_import_conflict_leaves_catalog_alone() {
        let guard = StabilityGuard::in_memory(&Config::minimal());
        guard.register("UserCard", user_card(), vec![]).unwrap();
        let mut snapshot = guard.export();
        snapshot.catalog.entries[0].description = Some("changed".into());

        assert!(guard.import(snapshot).is_err());
        let hits = guard.search("usercard", &SearchOptions::default());
        assert_eq!(
            hits[0].entry.description.as_deref(),
            Some("Card showing a user")
        );
    }
}
