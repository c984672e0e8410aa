use anyhow::{Context, Result};
use sqlx::SqlitePool;

/// Create the `issue_fixes` audit table and its index.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS issue_fixes (
            id TEXT PRIMARY KEY,
            issue_type TEXT NOT NULL,
            issue_message TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create issue_fixes table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_issue_fixes_created_at ON issue_fixes(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
