//! Best-effort audit trail of gateway decisions.
//!
//! Every decision can be written as one `issue_fixes` row:
//!
//! | Column | Content |
//! |--------|---------|
//! | `id` | UUID v4 |
//! | `issue_type` | `creation_blocked`, `creation_review` or `creation_approved` |
//! | `issue_message` | [`Decision::summary`] |
//! | `metadata` | the full decision as JSON |
//! | `created_at` | RFC 3339 UTC timestamp |
//!
//! Writes never fail the caller. [`record_decision`] turns every outcome into
//! an [`AuditStatus`] and logs failures with `log::warn!`. No retries.
//!
//! Sinks:
//!
//! - `disabled`: [`NullSink`], every write is skipped.
//! - `sqlite`: [`SqliteSink`], a local database migrated on open.
//! - `supabase`: [`SupabaseSink`], `POST {url}/rest/v1/{table}` via PostgREST.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stability_guard_core::gateway::Decision;

use crate::config::AuditConfig;
use crate::{db, migrate};

/// One audit row.
#[derive(Debug, Clone, Serialize)]
pub struct IssueFix {
    pub id: String,
    pub issue_type: String,
    pub issue_message: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl IssueFix {
    pub fn from_decision(decision: &Decision) -> Self {
        let issue_type = if !decision.can_proceed {
            "creation_blocked"
        } else if decision.approved_for_creation {
            "creation_approved"
        } else {
            "creation_review"
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            issue_type: issue_type.to_string(),
            issue_message: decision.summary(),
            metadata: serde_json::to_value(decision).unwrap_or(Value::Null),
            created_at: Utc::now(),
        }
    }
}

/// Outcome of an audit write, reported next to the decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum AuditStatus {
    Recorded,
    Skipped,
    Failed(String),
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Sink name for logs (`disabled`, `sqlite`, `supabase`).
    fn name(&self) -> &str;

    /// Whether writes are attempted at all.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn record(&self, fix: &IssueFix) -> Result<()>;
}

pub struct NullSink;

#[async_trait]
impl AuditSink for NullSink {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn record(&self, _fix: &IssueFix) -> Result<()> {
        Ok(())
    }
}

pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path)
            .await
            .with_context(|| format!("Failed to open audit database {}", path.display()))?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of rows written so far.
    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM issue_fixes")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl AuditSink for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn record(&self, fix: &IssueFix) -> Result<()> {
        sqlx::query(
            "INSERT INTO issue_fixes (id, issue_type, issue_message, metadata, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&fix.id)
        .bind(&fix.issue_type)
        .bind(&fix.issue_message)
        .bind(fix.metadata.to_string())
        .bind(fix.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct SupabaseSink {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl SupabaseSink {
    pub fn new(url: &str, table: &str, api_key: String, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1/{}", url.trim_end_matches('/'), table),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AuditSink for SupabaseSink {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn record(&self, fix: &IssueFix) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(fix)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Supabase insert failed {}: {}", status, body_text);
        }
        Ok(())
    }
}

/// Build the sink named by `[audit]`.
pub async fn sink_from_config(config: &AuditConfig) -> Result<Arc<dyn AuditSink>> {
    match config.sink.as_str() {
        "disabled" => Ok(Arc::new(NullSink)),
        "sqlite" => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("audit.path required for sqlite sink"))?;
            Ok(Arc::new(SqliteSink::open(path).await?))
        }
        "supabase" => {
            let url = config
                .url
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("audit.url required for supabase sink"))?;
            let api_key = std::env::var(&config.api_key_env)
                .map_err(|_| anyhow::anyhow!("{} not set", config.api_key_env))?;
            Ok(Arc::new(SupabaseSink::new(
                url,
                &config.table,
                api_key,
                config.timeout_secs,
            )?))
        }
        other => bail!("Unknown audit sink: '{}'", other),
    }
}

/// Write one decision. Never returns an error.
pub async fn record_decision(sink: &dyn AuditSink, decision: &Decision) -> AuditStatus {
    if !sink.is_enabled() {
        return AuditStatus::Skipped;
    }
    let fix = IssueFix::from_decision(decision);
    match sink.record(&fix).await {
        Ok(()) => {
            log::debug!("audit: recorded {} via {}", fix.id, sink.name());
            AuditStatus::Recorded
        }
        Err(e) => {
            log::warn!("audit: {} write failed: {:#}", sink.name(), e);
            AuditStatus::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stability_guard_core::gateway::{RequestKind, Stage};

    fn decision(can_proceed: bool) -> Decision {
        Decision {
            name: "UserCard".into(),
            kind: RequestKind::Component,
            can_proceed,
            should_proceed: can_proceed,
            approved_for_creation: false,
            blocking_reasons: if can_proceed {
                vec![]
            } else {
                vec!["component 'UserCard' already exists at src/UserCard.tsx".into()]
            },
            warnings: vec![],
            recommendations: vec![],
            existing_alternatives: vec![],
            violations: vec![],
            risk_score: if can_proceed { 0 } else { 30 },
            type_safety_score: 100,
            database_usage_score: 100,
            stages: vec![Stage::Received, Stage::Decision],
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn record(&self, _fix: &IssueFix) -> Result<()> {
            bail!("connection refused")
        }
    }

    #[test]
    fn test_issue_type_follows_gates() {
        assert_eq!(
            IssueFix::from_decision(&decision(false)).issue_type,
            "creation_blocked"
        );
        let fix = IssueFix::from_decision(&decision(true));
        assert_eq!(fix.issue_type, "creation_review");
        assert_eq!(fix.metadata["name"], "UserCard");
    }

    #[tokio::test]
    async fn test_null_sink_skips() {
        assert_eq!(
            record_decision(&NullSink, &decision(true)).await,
            AuditStatus::Skipped
        );
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_raised() {
        let status = record_decision(&FailingSink, &decision(false)).await;
        assert_eq!(status, AuditStatus::Failed("connection refused".into()));
    }

    #[tokio::test]
    async fn test_sqlite_sink_writes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SqliteSink::open(&dir.path().join("audit/audit.sqlite"))
            .await
            .unwrap();
        assert_eq!(
            record_decision(&sink, &decision(false)).await,
            AuditStatus::Recorded
        );
        assert_eq!(sink.count().await.unwrap(), 1);

        let (issue_type, metadata): (String, String) =
            sqlx::query_as("SELECT issue_type, metadata FROM issue_fixes")
                .fetch_one(sink.pool())
                .await
                .unwrap();
        assert_eq!(issue_type, "creation_blocked");
        assert!(metadata.contains("\"can_proceed\":false"));
    }

    #[test]
    fn test_supabase_endpoint() {
        let sink =
            SupabaseSink::new("https://x.supabase.co/", "issue_fixes", "k".into(), 5).unwrap();
        assert_eq!(sink.endpoint(), "https://x.supabase.co/rest/v1/issue_fixes");
    }
}
