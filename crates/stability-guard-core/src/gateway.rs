//! Creation gateway: the allow/block decision for a proposed artifact.
//!
//! A request walks a fixed sequence of stages and every stage it visits is
//! recorded on the resulting [`Decision`]:
//!
//! ```text
//! received → duplicate-checks → mock-data-checks → type/schema-checks → decision
//! ```
//!
//! Findings are either **blocking** (the request cannot proceed) or
//! **advisory** (they raise the risk score but never block on their own).
//!
//! # Risk score
//!
//! ```text
//! risk = 30·blocking + 10·warnings + (100 − type_safety)/2 + (100 − db_usage)/4
//! ```
//!
//! clamped to 100. The gateway reads the registry but never mutates it.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::detector::{MockDataDetector, Violation};
use crate::models::EntityKind;
use crate::registry::{ComponentRegistry, SimilarMatch};
use crate::similarity::Comparable;

pub const DEFAULT_FUNCTIONAL_THRESHOLD: f64 = 0.8;
pub const DEFAULT_MAX_RISK: u32 = 70;
pub const DEFAULT_MIN_TYPE_SAFETY: u32 = 70;
pub const DEFAULT_MIN_DATABASE_USAGE: u32 = 70;

const SERVICE_SUFFIXES: &[&str] = &[
    "service", "manager", "handler", "helper", "utils", "client", "provider",
];
const REQUIRED_TABLE_COLUMNS: &[&str] = &["id", "created_at"];

/// Known tables and their columns.
pub type SchemaTables = BTreeMap<String, Vec<String>>;

/// What the caller wants to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Component,
    Service,
    Hook,
    Type,
    Module,
    Utility,
    Table,
    Column,
}

impl RequestKind {
    /// Registry partition the request is checked against. Modules and
    /// utilities are compared with services; database requests have none.
    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            RequestKind::Component => Some(EntityKind::Component),
            RequestKind::Service | RequestKind::Module | RequestKind::Utility => {
                Some(EntityKind::Service)
            }
            RequestKind::Hook => Some(EntityKind::Hook),
            RequestKind::Type => Some(EntityKind::Type),
            RequestKind::Table | RequestKind::Column => None,
        }
    }

    fn counts_database_usage(&self) -> bool {
        matches!(
            self,
            RequestKind::Component | RequestKind::Service | RequestKind::Hook | RequestKind::Module
        )
    }
}

/// A proposed artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationRequest {
    pub kind: RequestKind,
    pub name: String,
    /// Owning table for `column` requests.
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub functionality: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Columns a `table` request will define.
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Props, methods, returns or fields, depending on kind.
    #[serde(default)]
    pub members: Vec<String>,
    /// Proposed source text, if already written.
    #[serde(default)]
    pub source: Option<String>,
}

impl CreationRequest {
    pub fn new(kind: RequestKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            table_name: None,
            functionality: Vec::new(),
            description: None,
            required_fields: Vec::new(),
            category: None,
            members: Vec::new(),
            source: None,
        }
    }

    fn comparable(&self) -> Comparable<'_> {
        Comparable {
            category: self.category.as_deref(),
            functionality: &self.functionality,
            members: &self.members,
            tags: &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub functional_threshold: f64,
    pub max_risk: u32,
    pub min_type_safety: u32,
    pub min_database_usage: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            functional_threshold: DEFAULT_FUNCTIONAL_THRESHOLD,
            max_risk: DEFAULT_MAX_RISK,
            min_type_safety: DEFAULT_MIN_TYPE_SAFETY,
            min_database_usage: DEFAULT_MIN_DATABASE_USAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Received,
    DuplicateChecks,
    MockDataChecks,
    TypeSchemaChecks,
    Decision,
}

/// The gateway's verdict on one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub name: String,
    pub kind: RequestKind,
    pub can_proceed: bool,
    pub should_proceed: bool,
    pub approved_for_creation: bool,
    pub blocking_reasons: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub existing_alternatives: Vec<SimilarMatch>,
    pub violations: Vec<Violation>,
    pub risk_score: u32,
    pub type_safety_score: u32,
    pub database_usage_score: u32,
    pub stages: Vec<Stage>,
}

impl Decision {
    /// One-line summary for logs and audit rows.
    pub fn summary(&self) -> String {
        if self.can_proceed {
            format!(
                "{} '{}' may proceed (risk {}, {} warning(s))",
                kind_label(self.kind),
                self.name,
                self.risk_score,
                self.warnings.len()
            )
        } else {
            format!(
                "{} '{}' blocked: {}",
                kind_label(self.kind),
                self.name,
                self.blocking_reasons.join("; ")
            )
        }
    }
}

fn kind_label(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Component => "component",
        RequestKind::Service => "service",
        RequestKind::Hook => "hook",
        RequestKind::Type => "type",
        RequestKind::Module => "module",
        RequestKind::Utility => "utility",
        RequestKind::Table => "table",
        RequestKind::Column => "column",
    }
}

/// Counts of unsafe TypeScript constructs in a source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeSafetyReport {
    pub any_types: usize,
    pub suppressions: usize,
    pub non_null_assertions: usize,
    pub score: u32,
}

/// Regex-based type-safety scorer. Starts at 100; `any` costs 10,
/// `@ts-ignore`/`@ts-nocheck` and `!.` cost 5 each.
pub struct TypeSafetyChecker {
    any_type: Regex,
    suppression: Regex,
    non_null: Regex,
}

impl TypeSafetyChecker {
    pub fn new() -> Self {
        let compile = |re: &str| Regex::new(re).expect("built-in type-safety pattern must compile");
        Self {
            any_type: compile(r"(?::\s*|\bas\s+|<)any\b"),
            suppression: compile(r"@ts-(?:ignore|nocheck)\b"),
            non_null: compile(r"[\w)\]]!\."),
        }
    }

    pub fn check(&self, source: &str) -> TypeSafetyReport {
        let any_types = self.any_type.find_iter(source).count();
        let suppressions = self.suppression.find_iter(source).count();
        let non_null_assertions = self.non_null.find_iter(source).count();
        let penalty = 10 * any_types + 5 * suppressions + 5 * non_null_assertions;
        TypeSafetyReport {
            any_types,
            suppressions,
            non_null_assertions,
            score: 100u32.saturating_sub(penalty.min(100) as u32),
        }
    }
}

impl Default for TypeSafetyChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs every check for a request against borrowed state.
pub struct Gateway<'a> {
    pub registry: &'a ComponentRegistry,
    pub detector: &'a MockDataDetector,
    pub type_checker: &'a TypeSafetyChecker,
    pub schema: &'a SchemaTables,
    pub config: &'a GatewayConfig,
}

#[derive(Default)]
struct Findings {
    blocking: Vec<String>,
    warnings: Vec<String>,
    recommendations: Vec<String>,
    alternatives: Vec<SimilarMatch>,
    violations: Vec<Violation>,
    stages: Vec<Stage>,
}

impl Findings {
    fn recommend(&mut self, text: String) {
        if !self.recommendations.contains(&text) {
            self.recommendations.push(text);
        }
    }

    fn alternative(&mut self, m: SimilarMatch) {
        if !self
            .alternatives
            .iter()
            .any(|a| a.name == m.name && a.kind == m.kind)
        {
            self.alternatives.push(m);
        }
    }
}

impl<'a> Gateway<'a> {
    pub fn evaluate(&self, request: &CreationRequest) -> Decision {
        let mut f = Findings::default();
        f.stages.push(Stage::Received);
        log::debug!(
            "gateway: evaluating {} '{}'",
            kind_label(request.kind),
            request.name
        );

        f.stages.push(Stage::DuplicateChecks);
        if let Some(kind) = request.kind.entity_kind() {
            self.check_duplicates(kind, request, &mut f);
        }

        f.stages.push(Stage::MockDataChecks);
        let database_usage_score = self.check_mock_data(request, &mut f);

        f.stages.push(Stage::TypeSchemaChecks);
        let type_safety_score = self.check_type_safety(request, &mut f);
        match request.kind {
            RequestKind::Table => self.check_table(request, &mut f),
            RequestKind::Column => self.check_column(request, &mut f),
            _ => {}
        }

        f.stages.push(Stage::Decision);
        let risk_score = risk_score(
            f.blocking.len(),
            f.warnings.len(),
            type_safety_score,
            database_usage_score,
        );
        let can_proceed = f.blocking.is_empty();
        let should_proceed = can_proceed && risk_score < self.config.max_risk;
        let approved_for_creation = should_proceed
            && f.recommendations.is_empty()
            && type_safety_score >= self.config.min_type_safety
            && database_usage_score >= self.config.min_database_usage;

        let decision = Decision {
            name: request.name.clone(),
            kind: request.kind,
            can_proceed,
            should_proceed,
            approved_for_creation,
            blocking_reasons: f.blocking,
            warnings: f.warnings,
            recommendations: f.recommendations,
            existing_alternatives: f.alternatives,
            violations: f.violations,
            risk_score,
            type_safety_score,
            database_usage_score,
            stages: f.stages,
        };
        log::debug!("gateway: {}", decision.summary());
        decision
    }

    fn check_duplicates(&self, kind: EntityKind, request: &CreationRequest, f: &mut Findings) {
        if let Some(existing) = self.registry.get(kind, &request.name) {
            let path = existing.metadata.file_path().unwrap_or("unknown path");
            f.blocking.push(format!(
                "{} '{}' already exists at {}",
                kind, request.name, path
            ));
            f.recommend(format!(
                "Extend the existing {} '{}' instead of creating a new one",
                kind, request.name
            ));
            f.alternative(SimilarMatch {
                name: existing.name.clone(),
                kind,
                file_path: existing.metadata.file_path().map(str::to_string),
                score: 1.0,
            });
        }

        let matches = self.registry.find_similar_to(
            kind,
            &request.name,
            &request.comparable(),
            self.config.functional_threshold,
        );
        for m in matches {
            f.blocking.push(format!(
                "functionally similar to {} '{}' (similarity {:.2})",
                m.kind, m.name, m.score
            ));
            f.recommend(format!(
                "Add the missing behaviour to '{}' rather than duplicating it",
                m.name
            ));
            f.alternative(m);
        }

        if kind == EntityKind::Service {
            let wanted = normalize_service_name(&request.name);
            for existing in self.registry.list(EntityKind::Service) {
                if existing.name == request.name {
                    continue;
                }
                if normalize_service_name(&existing.name) == wanted {
                    f.blocking.push(format!(
                        "service name '{}' collides with existing service '{}'",
                        request.name, existing.name
                    ));
                    f.recommend(format!(
                        "Reuse '{}' for {} responsibilities",
                        existing.name, wanted
                    ));
                    f.alternative(SimilarMatch {
                        name: existing.name.clone(),
                        kind: EntityKind::Service,
                        file_path: existing.metadata.file_path().map(str::to_string),
                        score: 1.0,
                    });
                }
            }
        }
    }

    /// Returns the database usage score that feeds the risk formula.
    fn check_mock_data(&self, request: &CreationRequest, f: &mut Findings) -> u32 {
        let Some(source) = request.source.as_deref() else {
            return 100;
        };
        let report = self.detector.analyze_text(&request.name, source);
        if !report.violations.is_empty() {
            f.blocking.push(format!(
                "source contains {} mock-data violation(s)",
                report.violations.len()
            ));
            for v in &report.violations {
                f.recommend(v.suggestion.clone());
            }
        }
        f.violations = report.violations;

        if !request.kind.counts_database_usage() {
            return 100;
        }
        if report.database_usage_score < self.config.min_database_usage {
            let missing: Vec<&str> = report
                .missing_evidence
                .iter()
                .map(|m| m.evidence.as_str())
                .collect();
            f.warnings.push(format!(
                "database usage score {} is below {} (missing: {})",
                report.database_usage_score,
                self.config.min_database_usage,
                missing.join(", ")
            ));
        }
        report.database_usage_score
    }

    fn check_type_safety(&self, request: &CreationRequest, f: &mut Findings) -> u32 {
        let Some(source) = request.source.as_deref() else {
            return 100;
        };
        let report = self.type_checker.check(source);
        if report.score < self.config.min_type_safety {
            f.warnings.push(format!(
                "type safety score {} is below {} ({} any, {} suppression(s), {} non-null assertion(s))",
                report.score,
                self.config.min_type_safety,
                report.any_types,
                report.suppressions,
                report.non_null_assertions
            ));
        }
        report.score
    }

    fn check_table(&self, request: &CreationRequest, f: &mut Findings) {
        let table = request.name.as_str();
        if self.schema.contains_key(table) {
            f.blocking.push(format!("table '{}' already exists", table));
            f.recommend(format!("Add columns to the existing '{}' table", table));
        }
        if !is_snake_case(table) {
            f.warnings
                .push(format!("table name '{}' is not snake_case", table));
        }
        for column in REQUIRED_TABLE_COLUMNS {
            if !request.required_fields.iter().any(|c| c == column) {
                f.warnings
                    .push(format!("table '{}' does not define '{}'", table, column));
            }
        }
    }

    fn check_column(&self, request: &CreationRequest, f: &mut Findings) {
        let column = request.name.as_str();
        match request.table_name.as_deref().filter(|t| !t.trim().is_empty()) {
            None => f
                .blocking
                .push(format!("column '{}' has no table_name", column)),
            Some(table) => match self.schema.get(table) {
                Some(columns) if columns.iter().any(|c| c == column) => {
                    f.blocking.push(format!(
                        "column '{}' already exists on '{}'",
                        column, table
                    ));
                }
                Some(_) => {}
                None => f.warnings.push(format!(
                    "table '{}' is not in the schema snapshot",
                    table
                )),
            },
        }
        if !is_snake_case(column) {
            f.warnings
                .push(format!("column name '{}' is not snake_case", column));
        }
    }
}

pub fn risk_score(blocking: usize, warnings: usize, type_safety: u32, database_usage: u32) -> u32 {
    let raw = 30 * blocking as u64
        + 10 * warnings as u64
        + u64::from(100u32.saturating_sub(type_safety)) / 2
        + u64::from(100u32.saturating_sub(database_usage)) / 4;
    raw.min(100) as u32
}

/// Lower-case with one trailing role suffix removed:
/// `AuthManager` and `auth_service` both become `auth`.
pub fn normalize_service_name(name: &str) -> String {
    let lowered: String = name
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    for suffix in SERVICE_SUFFIXES {
        if let Some(stem) = lowered.strip_suffix(suffix) {
            if !stem.is_empty() {
                return stem.to_string();
            }
        }
    }
    lowered
}

fn is_snake_case(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .next()
            .map(|c| c.is_ascii_lowercase())
            .unwrap_or(false)
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComponentMeta, EntityMetadata, ServiceMeta};
    use crate::registry::RegistryConfig;

    struct Fixture {
        registry: ComponentRegistry,
        detector: MockDataDetector,
        types: TypeSafetyChecker,
        schema: SchemaTables,
        config: GatewayConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let mut registry = ComponentRegistry::new(RegistryConfig::default());
            registry
                .register(
                    "UserCard",
                    EntityMetadata::Component(ComponentMeta {
                        file_path: Some("src/components/UserCard.tsx".into()),
                        category: Some("ui".into()),
                        functionality: vec!["display user info".into()],
                        props: vec!["user".into(), "onClick".into()],
                        description: None,
                    }),
                )
                .unwrap();
            registry
                .register(
                    "AuthService",
                    EntityMetadata::Service(ServiceMeta {
                        file_path: Some("src/services/AuthService.ts".into()),
                        methods: vec!["login".into(), "logout".into()],
                        ..Default::default()
                    }),
                )
                .unwrap();
            let mut schema = SchemaTables::new();
            schema.insert(
                "users".into(),
                vec!["id".into(), "email".into(), "created_at".into()],
            );
            Self {
                registry,
                detector: MockDataDetector::new(),
                types: TypeSafetyChecker::new(),
                schema,
                config: GatewayConfig::default(),
            }
        }

        fn evaluate(&self, request: &CreationRequest) -> Decision {
            Gateway {
                registry: &self.registry,
                detector: &self.detector,
                type_checker: &self.types,
                schema: &self.schema,
                config: &self.config,
            }
            .evaluate(request)
        }
    }

    const CLEAN_SOURCE: &str = r#"
export function ProjectList() {
  const [isLoading, setLoading] = useState(true);
  const { data, error } = await supabase.from('projects').select('*');
  if (error) throw error;
}
"#;

    #[test]
    fn test_exact_duplicate_blocks() {
        let fx = Fixture::new();
        let req = CreationRequest::new(RequestKind::Component, "UserCard");
        let d = fx.evaluate(&req);
        assert!(!d.can_proceed);
        assert!(!d.should_proceed);
        assert!(d.blocking_reasons[0].contains("already exists"));
        assert_eq!(d.existing_alternatives[0].name, "UserCard");
        assert!(!d.recommendations.is_empty());
    }

    #[test]
    fn test_functional_duplicate_blocks() {
        let fx = Fixture::new();
        let mut req = CreationRequest::new(RequestKind::Component, "UserCardV2");
        req.category = Some("ui".into());
        req.functionality = vec!["display user info".into()];
        req.members = vec!["user".into(), "onClick".into()];
        let d = fx.evaluate(&req);
        assert!(!d.can_proceed);
        assert_eq!(d.existing_alternatives.len(), 1);
        assert!((d.existing_alternatives[0].score - 1.0).abs() < 1e-9);
        assert_eq!(d.risk_score, 30 + 10 * d.warnings.len() as u32);
    }

    #[test]
    fn test_clean_request_is_approved() {
        let fx = Fixture::new();
        let mut req = CreationRequest::new(RequestKind::Component, "ProjectList");
        req.category = Some("projects".into());
        req.functionality = vec!["list projects".into()];
        req.source = Some(CLEAN_SOURCE.into());
        let d = fx.evaluate(&req);
        assert!(d.can_proceed, "{:?}", d.blocking_reasons);
        assert!(d.should_proceed);
        assert!(d.approved_for_creation);
        assert_eq!(d.risk_score, 0);
        assert_eq!(d.type_safety_score, 100);
        assert_eq!(d.database_usage_score, 100);
        assert_eq!(
            d.stages,
            vec![
                Stage::Received,
                Stage::DuplicateChecks,
                Stage::MockDataChecks,
                Stage::TypeSchemaChecks,
                Stage::Decision
            ]
        );
    }

    #[test]
    fn test_service_name_collision() {
        let fx = Fixture::new();
        let d = fx.evaluate(&CreationRequest::new(RequestKind::Module, "auth_manager"));
        assert!(!d.can_proceed);
        assert!(d.blocking_reasons[0].contains("AuthService"));
        assert_eq!(normalize_service_name("AuthManager"), "auth");
        assert_eq!(normalize_service_name("ApiClient"), "api");
        assert_eq!(normalize_service_name("Service"), "service");
    }

    #[test]
    fn test_mock_source_blocks() {
        let fx = Fixture::new();
        let mut req = CreationRequest::new(RequestKind::Hook, "useTeams");
        req.source = Some("const mockTeams = [{ id: 1 }];\nexport const useTeams = () => mockTeams;\n".into());
        let d = fx.evaluate(&req);
        assert!(!d.can_proceed);
        assert_eq!(d.violations.len(), 1);
        assert_eq!(d.database_usage_score, 25);
        // 1 blocking + 1 warning (db usage) + (100-25)/4
        assert_eq!(d.risk_score, 30 + 10 + 18);
    }

    #[test]
    fn test_type_safety_is_advisory() {
        let fx = Fixture::new();
        let mut req = CreationRequest::new(RequestKind::Type, "Payload");
        req.source = Some(
            "// @ts-ignore\nexport type Payload = { a: any; b: any; c: any };\nconst x = y!.z;\n"
                .into(),
        );
        let d = fx.evaluate(&req);
        assert!(d.can_proceed);
        assert_eq!(d.type_safety_score, 100 - 30 - 5 - 5);
        assert_eq!(d.database_usage_score, 100);
        assert_eq!(d.warnings.len(), 1);
        assert!(!d.approved_for_creation);
    }

    #[test]
    fn test_table_checks() {
        let fx = Fixture::new();
        let mut existing = CreationRequest::new(RequestKind::Table, "users");
        existing.required_fields = vec!["id".into(), "created_at".into()];
        let d = fx.evaluate(&existing);
        assert!(!d.can_proceed);

        let mut fresh = CreationRequest::new(RequestKind::Table, "TeamMembers");
        fresh.required_fields = vec!["id".into()];
        let d = fx.evaluate(&fresh);
        assert!(d.can_proceed);
        assert_eq!(d.warnings.len(), 2);
        assert_eq!(d.risk_score, 20);
    }

    #[test]
    fn test_column_checks() {
        let fx = Fixture::new();
        let d = fx.evaluate(&CreationRequest::new(RequestKind::Column, "avatar_url"));
        assert!(!d.can_proceed);
        assert!(d.blocking_reasons[0].contains("table_name"));

        let mut dup = CreationRequest::new(RequestKind::Column, "email");
        dup.table_name = Some("users".into());
        assert!(!fx.evaluate(&dup).can_proceed);

        let mut ok = CreationRequest::new(RequestKind::Column, "avatar_url");
        ok.table_name = Some("users".into());
        let d = fx.evaluate(&ok);
        assert!(d.approved_for_creation);
    }

    #[test]
    fn test_risk_score_clamped() {
        assert_eq!(risk_score(5, 3, 0, 0), 100);
        assert_eq!(risk_score(0, 0, 60, 100), 20);
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let req: CreationRequest =
            serde_json::from_str(r#"{"kind":"utility","name":"dateUtils"}"#).unwrap();
        assert_eq!(req.kind, RequestKind::Utility);
        assert_eq!(req.kind.entity_kind(), Some(EntityKind::Service));
        assert!(req.members.is_empty());
        assert!(req.source.is_none());
    }
}
