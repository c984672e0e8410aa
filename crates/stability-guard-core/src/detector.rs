//! Mock-data and placeholder detection over source text.
//!
//! Two passes run over every file:
//!
//! 1. **Violations**: a fixed checklist of regex patterns that flag
//!    mock, dummy, fake or placeholder literals. Each hit is reported with
//!    severity, location and a suggestion. Nothing is rewritten.
//! 2. **Database usage score**: starts at 100 and loses a fixed penalty
//!    for every category of real-data evidence that is absent from the
//!    whole input.
//!
//! | Missing evidence | Penalty |
//! |------------------|---------|
//! | data access call (`supabase.from(`, `.rpc(`) | 30 |
//! | query builder select (`.select(`) | 20 |
//! | query error handling (`{ data, error }`, `if (error)`) | 15 |
//! | loading state (`isLoading`, `setLoading`, `loading`) | 10 |

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MAX_DATABASE_USAGE_SCORE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A single pattern hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub pattern: String,
    pub severity: Severity,
    pub path: String,
    /// 1-based line number.
    pub line: usize,
    pub snippet: String,
    pub suggestion: String,
}

/// Missing real-data evidence and the penalty it cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingEvidence {
    pub evidence: String,
    pub penalty: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockDataReport {
    pub violations: Vec<Violation>,
    pub database_usage_score: u32,
    pub missing_evidence: Vec<MissingEvidence>,
    pub files_analyzed: usize,
}

impl MockDataReport {
    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    }
}

/// Source text handed to the detector.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

struct MockPattern {
    id: &'static str,
    regex: Regex,
    severity: Severity,
    suggestion: &'static str,
}

struct EvidencePattern {
    id: &'static str,
    regex: Regex,
    penalty: u32,
}

const MOCK_PATTERNS: &[(&str, &str, Severity, &str)] = &[
    (
        "mock-variable",
        r"\b(?:const|let|var)\s+(?:mock|MOCK)[A-Za-z0-9_]*\s*(?::[^=]+)?=",
        Severity::High,
        "Replace the mock collection with a query against the real data source",
    ),
    (
        "mock-import",
        r#"(?:from\s+['"][^'"]*(?:__mocks__|/mocks?/|mockData)[^'"]*['"])"#,
        Severity::High,
        "Import from the real service module instead of a mocks directory",
    ),
    (
        "dummy-data",
        r"(?i)\bdummy[A-Za-z0-9_]*",
        Severity::Medium,
        "Remove dummy values and load data from the database",
    ),
    (
        "fake-data",
        r"\b(?:fake|FAKE|Fake)[A-Z_][A-Za-z0-9_]*|\bfake(?:Data|Users?|Items?)\b",
        Severity::Medium,
        "Remove fabricated data and read it from the backing table",
    ),
    (
        "lorem-ipsum",
        r"(?i)lorem\s+ipsum",
        Severity::Medium,
        "Replace placeholder copy with real content",
    ),
    (
        "sample-identity",
        r#"(?i)['"](?:john|jane)\s+doe['"]|['"][a-z0-9._%+-]+@example\.(?:com|org)['"]"#,
        Severity::Medium,
        "Hard-coded sample identities should come from user records",
    ),
    (
        "random-id",
        r"Math\.random\(\)",
        Severity::Low,
        "Use database-generated identifiers instead of Math.random()",
    ),
    (
        "placeholder-marker",
        r"(?i)\bTODO:?\s*(?:replace|remove)\s+(?:with\s+real|mock|dummy|placeholder)|\bplaceholder\s+data\b",
        Severity::Low,
        "Resolve the placeholder before shipping",
    ),
];

const EVIDENCE_PATTERNS: &[(&str, &str, u32)] = &[
    ("data-access-call", r"supabase\s*\.\s*from\(|\.rpc\(", 30),
    ("select-query", r"\.select\(", 20),
    (
        "query-error-handling",
        r"\{\s*data\s*,\s*error\s*\}|\{\s*error\s*\}|if\s*\(\s*error\s*\)",
        15,
    ),
    ("loading-state", r"\b(?:isLoading|setLoading|loading)\b", 10),
];

/// Regex checklist detector. Build once and reuse.
pub struct MockDataDetector {
    patterns: Vec<MockPattern>,
    evidence: Vec<EvidencePattern>,
}

impl MockDataDetector {
    pub fn new() -> Self {
        let patterns = MOCK_PATTERNS
            .iter()
            .map(|(id, re, severity, suggestion)| MockPattern {
                id: *id,
                regex: Regex::new(re).expect("built-in mock pattern must compile"),
                severity: *severity,
                suggestion: *suggestion,
            })
            .collect();
        let evidence = EVIDENCE_PATTERNS
            .iter()
            .map(|(id, re, penalty)| EvidencePattern {
                id: *id,
                regex: Regex::new(re).expect("built-in evidence pattern must compile"),
                penalty: *penalty,
            })
            .collect();
        Self { patterns, evidence }
    }

    /// Analyze a set of files as one unit.
    pub fn analyze(&self, files: &[SourceFile]) -> MockDataReport {
        let mut violations = Vec::new();
        for file in files {
            violations.extend(self.violations_in(&file.path, &file.text));
        }

        let missing_evidence: Vec<MissingEvidence> = self
            .evidence
            .iter()
            .filter(|e| !files.iter().any(|f| e.regex.is_match(&f.text)))
            .map(|e| MissingEvidence {
                evidence: e.id.to_string(),
                penalty: e.penalty,
            })
            .collect();
        let penalty: u32 = missing_evidence.iter().map(|m| m.penalty).sum();

        MockDataReport {
            violations,
            database_usage_score: MAX_DATABASE_USAGE_SCORE.saturating_sub(penalty),
            missing_evidence,
            files_analyzed: files.len(),
        }
    }

    pub fn analyze_text(&self, path: &str, text: &str) -> MockDataReport {
        self.analyze(&[SourceFile::new(path, text)])
    }

    /// Pattern violations only, without the evidence pass.
    pub fn violations_in(&self, path: &str, text: &str) -> Vec<Violation> {
        let mut out = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            for p in &self.patterns {
                if p.regex.is_match(line) {
                    out.push(Violation {
                        pattern: p.id.to_string(),
                        severity: p.severity,
                        path: path.to_string(),
                        line: idx + 1,
                        snippet: truncate(line.trim(), 160),
                        suggestion: p.suggestion.to_string(),
                    });
                }
            }
        }
        out
    }
}

impl Default for MockDataDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max_chars).collect();
        t.push('…');
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_users_without_supabase() {
        let detector = MockDataDetector::new();
        let text = "const mockUsers = [{ id: 1, name: 'A' }];\nexport default mockUsers;\n";
        let report = detector.analyze_text("src/pages/Users.tsx", text);
        assert!(!report.violations.is_empty());
        assert!(report.database_usage_score < 100);
        assert_eq!(report.violations[0].pattern, "mock-variable");
        assert_eq!(report.violations[0].severity, Severity::High);
        assert_eq!(report.violations[0].line, 1);
    }

    #[test]
    fn test_clean_data_access_scores_full() {
        let detector = MockDataDetector::new();
        let text = r#"
const [isLoading, setLoading] = useState(true);
const { data, error } = await supabase.from('users').select('*');
if (error) throw error;
"#;
        let report = detector.analyze_text("src/hooks/useUsers.ts", text);
        assert!(report.violations.is_empty(), "{:?}", report.violations);
        assert_eq!(report.database_usage_score, 100);
        assert!(report.missing_evidence.is_empty());
    }

    #[test]
    fn test_penalties_accumulate() {
        let detector = MockDataDetector::new();
        let report = detector.analyze_text("a.ts", "export const x = 1;\n");
        assert_eq!(report.database_usage_score, 100 - 30 - 20 - 15 - 10);
        assert_eq!(report.missing_evidence.len(), 4);
    }

    #[test]
    fn test_evidence_counts_across_files() {
        let detector = MockDataDetector::new();
        let files = vec![
            SourceFile::new("a.ts", "await supabase.from('t').select('id');"),
            SourceFile::new("b.ts", "const { data, error } = res; const loading = false;"),
        ];
        let report = detector.analyze(&files);
        assert_eq!(report.database_usage_score, 100);
        assert_eq!(report.files_analyzed, 2);
    }

    #[test]
    fn test_severity_mix() {
        let detector = MockDataDetector::new();
        let text = "const dummyRows = [];\nconst id = Math.random();\nconst copy = 'Lorem ipsum dolor';\n";
        let report = detector.analyze_text("x.tsx", text);
        assert_eq!(report.count_by_severity(Severity::Medium), 2);
        assert_eq!(report.count_by_severity(Severity::Low), 1);
        assert_eq!(report.count_by_severity(Severity::High), 0);
    }

    #[test]
    fn test_ordinary_words_not_flagged() {
        let detector = MockDataDetector::new();
        let text = "const mockingbird = 'bird';\nconst sample = load();\n";
        // `mockingbird` is still a mock-prefixed variable; `sample` alone is fine.
        let report = detector.analyze_text("x.ts", text);
        assert_eq!(report.violations.len(), 1);
    }
}
