//! DDL for the bridge tables.

use sqlx_core::query::query;

use crate::{PgPool, PgResult};

/// Statements executed by [`ensure_schema`], in order.
///
/// Each entry is a single statement; prepared queries cannot batch.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS credential_tokens (
        user_id       TEXT PRIMARY KEY,
        access_token  TEXT NOT NULL,
        refresh_token TEXT,
        expires_at    TIMESTAMPTZ NOT NULL,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        scope         TEXT,
        patient       TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_trails (
        seq           BIGSERIAL PRIMARY KEY,
        id            UUID NOT NULL UNIQUE,
        user_id       TEXT NOT NULL,
        action        TEXT NOT NULL,
        resource_type TEXT NOT NULL,
        resource_id   TEXT,
        details       JSONB NOT NULL DEFAULT '{}'::jsonb,
        timestamp     TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS audit_trails_user_idx ON audit_trails (user_id, seq)",
    r#"
    CREATE TABLE IF NOT EXISTS security_logs (
        seq        BIGSERIAL PRIMARY KEY,
        id         UUID NOT NULL UNIQUE,
        event_type TEXT NOT NULL,
        user_id    TEXT,
        details    JSONB NOT NULL DEFAULT '{}'::jsonb,
        success    BOOLEAN NOT NULL,
        timestamp  TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS security_logs_user_idx ON security_logs (user_id, seq)",
    r#"
    CREATE TABLE IF NOT EXISTS permission_grants (
        user_id  TEXT NOT NULL,
        resource TEXT NOT NULL,
        action   TEXT NOT NULL,
        PRIMARY KEY (user_id, resource, action)
    )
    "#,
];

/// Create all bridge tables and indexes if they do not exist.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub async fn ensure_schema(pool: &PgPool) -> PgResult<()> {
    for statement in SCHEMA_STATEMENTS {
        query(statement).execute(pool).await?;
    }
    tracing::info!(
        statements = SCHEMA_STATEMENTS.len(),
        "Bridge schema ensured"
    );
    Ok(())
}
