//! Filesystem scan of an application source tree.
//!
//! Walks `[scan].root`, keeps files matching the include globs (minus the
//! exclude globs, `node_modules`, `.git`, build output and, by default,
//! test and mock files), then:
//!
//! 1. extracts exported declarations with the shallow scanner and records
//!    them in the registry,
//! 2. reports names declared twice within one kind,
//! 3. reports same-kind pairs at or above the rejection threshold,
//! 4. runs the mock-data detector over every file.
//!
//! `sguard scan` exits 1 when [`ScanReport::has_findings`] is true.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use walkdir::WalkDir;

use stability_guard_core::detector::{MockDataReport, Severity, SourceFile};
use stability_guard_core::models::{EntityKind, EntityMetadata};
use stability_guard_core::registry::RegistryError;

use crate::config::ScanConfig;
use crate::guard::StabilityGuard;

const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/node_modules/**",
    "**/dist/**",
    "**/build/**",
];
const TEST_EXCLUDES: &[&str] = &[
    "**/*.test.*",
    "**/*.spec.*",
    "**/__tests__/**",
    "**/__mocks__/**",
];

/// A name exported from more than one place.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateDeclaration {
    pub name: String,
    pub kind: EntityKind,
    pub first_path: String,
    pub duplicate_path: String,
    pub line: usize,
}

/// Two differently named declarations that score as duplicates.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionalPair {
    pub kind: EntityKind,
    pub first: String,
    pub second: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub root: String,
    pub files_scanned: usize,
    pub declarations: usize,
    pub recorded: usize,
    pub duplicate_declarations: Vec<DuplicateDeclaration>,
    pub functional_duplicates: Vec<FunctionalPair>,
    pub mock_data: MockDataReport,
}

impl ScanReport {
    pub fn has_findings(&self) -> bool {
        !self.mock_data.violations.is_empty()
            || !self.duplicate_declarations.is_empty()
            || !self.functional_duplicates.is_empty()
    }
}

/// Collect the files a scan would read, sorted by relative path.
pub fn collect_files(config: &ScanConfig, root: &Path) -> Result<Vec<SourceFile>> {
    if !root.exists() {
        bail!("Scan root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    if config.skip_tests {
        excludes.extend(TEST_EXCLUDES.iter().map(|s| s.to_string()));
    }
    excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match std::fs::read_to_string(path) {
            Ok(text) => files.push(SourceFile::new(rel_str, text)),
            Err(e) => log::warn!("skipping unreadable file {}: {}", path.display(), e),
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Scan `root` (or `[scan].root`) into the guard.
pub fn run_scan(guard: &StabilityGuard, config: &ScanConfig, root: Option<&Path>) -> Result<ScanReport> {
    let root = root.unwrap_or(&config.root);
    let files = collect_files(config, root)?;
    log::info!("scanning {} file(s) under {}", files.len(), root.display());

    let mut first_seen: BTreeMap<(EntityKind, String), String> = BTreeMap::new();
    let mut duplicate_declarations = Vec::new();
    let mut recorded_names: Vec<(EntityKind, String)> = Vec::new();
    let mut declarations = 0;

    for file in &files {
        for decl in guard.scanner().scan(&file.path, &file.text) {
            declarations += 1;
            let key = (decl.kind, decl.name.clone());
            if let Some(first_path) = first_seen.get(&key) {
                duplicate_declarations.push(DuplicateDeclaration {
                    name: decl.name.clone(),
                    kind: decl.kind,
                    first_path: first_path.clone(),
                    duplicate_path: file.path.clone(),
                    line: decl.line,
                });
                continue;
            }
            first_seen.insert(key.clone(), file.path.clone());

            match guard.record_existing(decl.into_record()) {
                Ok(()) => recorded_names.push(key),
                Err(RegistryError::DuplicateName { kind, name }) => {
                    log::debug!("{} '{}' already registered, not re-recorded", kind, name);
                }
                Err(e) => log::warn!("{}: {}", file.path, e),
            }
        }
    }

    let functional_duplicates = functional_pairs(guard, &recorded_names);
    let mock_data = guard.analyze_files(&files);

    Ok(ScanReport {
        root: root.display().to_string(),
        files_scanned: files.len(),
        declarations,
        recorded: recorded_names.len(),
        duplicate_declarations,
        functional_duplicates,
        mock_data,
    })
}

fn functional_pairs(guard: &StabilityGuard, names: &[(EntityKind, String)]) -> Vec<FunctionalPair> {
    let snapshot = guard.export().registry;
    let by_key: BTreeMap<(EntityKind, &str), &EntityMetadata> = snapshot
        .entries
        .iter()
        .map(|r| ((r.kind(), r.name.as_str()), &r.metadata))
        .collect();
    let rejection = guard.rejection_threshold();
    let mut seen: BTreeSet<(EntityKind, String, String)> = BTreeSet::new();
    let mut pairs = Vec::new();
    for record in snapshot
        .entries
        .iter()
        .filter(|r| names.iter().any(|(k, n)| *k == r.kind() && *n == r.name))
    {
        for m in guard.find_similar(&record.name, &record.metadata, rejection) {
            let Some(other) = by_key.get(&(m.kind, m.name.as_str())) else {
                continue;
            };
            // Scanned records always carry a directory category; on its own it
            // says nothing about behaviour.
            if !shares_behaviour_field(&record.metadata, other) {
                continue;
            }
            let (first, second) = if record.name < m.name {
                (record.name.clone(), m.name)
            } else {
                (m.name, record.name.clone())
            };
            if seen.insert((m.kind, first.clone(), second.clone())) {
                pairs.push(FunctionalPair {
                    kind: m.kind,
                    first,
                    second,
                    score: m.score,
                });
            }
        }
    }
    pairs
}

/// True when both records have functionality, or both have members.
fn shares_behaviour_field(a: &EntityMetadata, b: &EntityMetadata) -> bool {
    (!a.functionality().is_empty() && !b.functionality().is_empty())
        || (!a.members().is_empty() && !b.members().is_empty())
}

pub fn print_report(report: &ScanReport) {
    println!("Scan of {}", report.root);
    println!();
    println!("  Files:         {}", report.files_scanned);
    println!("  Declarations:  {}", report.declarations);
    println!("  Recorded:      {}", report.recorded);
    println!(
        "  Database usage score: {}/100",
        report.mock_data.database_usage_score
    );

    if !report.duplicate_declarations.is_empty() {
        println!();
        println!("Duplicate declarations:");
        for d in &report.duplicate_declarations {
            println!(
                "  {} '{}' in {}:{} (first declared in {})",
                d.kind, d.name, d.duplicate_path, d.line, d.first_path
            );
        }
    }

    if !report.functional_duplicates.is_empty() {
        println!();
        println!("Functional duplicates:");
        for p in &report.functional_duplicates {
            println!(
                "  {} '{}' ~ '{}' (similarity {:.2})",
                p.kind, p.first, p.second, p.score
            );
        }
    }

    let violations = &report.mock_data.violations;
    if !violations.is_empty() {
        println!();
        println!(
            "Mock data: {} violation(s) ({} high, {} medium, {} low)",
            violations.len(),
            report.mock_data.count_by_severity(Severity::High),
            report.mock_data.count_by_severity(Severity::Medium),
            report.mock_data.count_by_severity(Severity::Low)
        );
        for v in violations {
            println!(
                "  {}:{} [{:?}] {}: {}",
                v.path, v.line, v.severity, v.pattern, v.snippet
            );
            println!("      → {}", v.suggestion);
        }
    }

    if !report.mock_data.missing_evidence.is_empty() {
        println!();
        println!("Missing real-data evidence:");
        for m in &report.mock_data.missing_evidence {
            println!("  {} (-{})", m.evidence, m.penalty);
        }
    }

    println!();
    if report.has_findings() {
        println!("✗ scan found issues");
    } else {
        println!("✓ no issues found");
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_collect_respects_globs_and_tests() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "components/Card.tsx", "export function Card() {}");
        write(dir.path(), "components/Card.test.tsx", "const mockCard = 1;");
        write(dir.path(), "node_modules/x/index.js", "const mockX = 1;");
        write(dir.path(), "README.md", "# readme");

        let config = ScanConfig::default();
        let files = collect_files(&config, dir.path()).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["components/Card.tsx"]);

        let with_tests = ScanConfig {
            skip_tests: false,
            ..ScanConfig::default()
        };
        assert_eq!(collect_files(&with_tests, dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_scan_records_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "components/ui/UserCard.tsx",
            "export function UserCard({ user }) { return null; }\n",
        );
        write(
            dir.path(),
            "components/legacy/UserCard.tsx",
            "export function UserCard({ user }) { return null; }\n",
        );
        write(
            dir.path(),
            "pages/Users.tsx",
            "const mockUsers = [{ id: 1 }];\nexport function Users() { return null; }\n",
        );

        let guard = StabilityGuard::in_memory(&Config::minimal());
        let report = run_scan(&guard, &ScanConfig::default(), Some(dir.path())).unwrap();

        assert_eq!(report.files_scanned, 3);
        assert_eq!(report.declarations, 3);
        assert_eq!(report.recorded, 2);
        assert_eq!(report.duplicate_declarations.len(), 1);
        assert_eq!(report.duplicate_declarations[0].name, "UserCard");
        assert_eq!(report.mock_data.violations.len(), 1);
        assert!(report.has_findings());
        assert_eq!(guard.stats().registry.total, 2);
    }

    #[test]
    fn test_type_aliases_in_one_directory_are_not_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "types/ids.ts",
            "export type UserId = string;\nexport type Status = 'active' | 'inactive';\n",
        );

        let guard = StabilityGuard::in_memory(&Config::minimal());
        let report = run_scan(&guard, &ScanConfig::default(), Some(dir.path())).unwrap();

        assert_eq!(report.recorded, 2);
        assert!(report.functional_duplicates.is_empty());
        assert!(!report.has_findings());
    }

    #[test]
    fn test_similar_declarations_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "components/cards/ProfileCard.tsx",
            "export function ProfileCard({ user, onSelect }) {\n  return null;\n}\n",
        );
        write(
            dir.path(),
            "components/cards/CardProfile.tsx",
            "export function CardProfile({ user, onSelect }) {\n  return null;\n}\n",
        );

        let guard = StabilityGuard::in_memory(&Config::minimal());
        let report = run_scan(&guard, &ScanConfig::default(), Some(dir.path())).unwrap();

        assert!(report.duplicate_declarations.is_empty());
        assert_eq!(report.functional_duplicates.len(), 1);
        let pair = &report.functional_duplicates[0];
        assert_eq!(pair.kind, EntityKind::Component);
        assert_eq!(pair.first, "CardProfile");
        assert_eq!(pair.second, "ProfileCard");
        assert!((pair.score - 1.0).abs() < 1e-9);
        assert!(report.has_findings());
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let config = ScanConfig::default();
        assert!(collect_files(&config, Path::new("/definitely/not/here")).is_err());
    }
}
