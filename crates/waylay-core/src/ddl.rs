//! Dialect-specific schema DDL (spec §3.1, §4.1.2: "lives outside the
//! core's hot path"). The only contractual part of `waylay-cli init_db`.

use crate::dialect::Dialect;

/// The `CREATE TABLE jobs (...)` statement for `dialect`. Postgres uses
/// `BIGSERIAL`/`TIMESTAMPTZ`; SQLite has neither, so ids are
/// `INTEGER PRIMARY KEY AUTOINCREMENT` and timestamps are stored as RFC3339
/// text — matching how `Backend` reads and writes them on that dialect.
pub fn create_jobs_table_sql(dialect: Dialect) -> String {
    match dialect {
        Dialect::Postgres => {
            "CREATE TABLE IF NOT EXISTS jobs (
                id BIGSERIAL PRIMARY KEY,
                priority INTEGER NOT NULL DEFAULT 0,
                attempts INTEGER NOT NULL DEFAULT 0,
                queue TEXT,
                handler TEXT NOT NULL,
                handler_id TEXT NOT NULL,
                last_error TEXT,
                run_at TIMESTAMPTZ,
                locked_at TIMESTAMPTZ,
                failed_at TIMESTAMPTZ,
                locked_by TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )"
            .to_string()
        }
        Dialect::Sqlite => {
            "CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                priority INTEGER NOT NULL DEFAULT 0,
                attempts INTEGER NOT NULL DEFAULT 0,
                queue TEXT,
                handler TEXT NOT NULL,
                handler_id TEXT NOT NULL,
                last_error TEXT,
                run_at TEXT,
                locked_at TEXT,
                failed_at TEXT,
                locked_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"
            .to_string()
        }
    }
}

/// Indexes supporting the reservation protocol's candidate SELECT (spec
/// §4.1.1's `ORDER BY priority ASC, run_at ASC` over unlocked, unfailed
/// rows). Not contractual — an implementation without these is still
/// correct, just slower under a large table.
pub fn create_jobs_indexes_sql(dialect: Dialect) -> Vec<String> {
    let _ = dialect;
    vec![
        "CREATE INDEX IF NOT EXISTS jobs_priority_run_at_idx ON jobs (priority, run_at)".to_string(),
        "CREATE INDEX IF NOT EXISTS jobs_locked_by_idx ON jobs (locked_by)".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_ddl_uses_bigserial_and_timestamptz() {
        let sql = create_jobs_table_sql(Dialect::Postgres);
        assert!(sql.contains("BIGSERIAL"));
        assert!(sql.contains("TIMESTAMPTZ"));
    }

    #[test]
    fn sqlite_ddl_uses_autoincrement_and_text_timestamps() {
        let sql = create_jobs_table_sql(Dialect::Sqlite);
        assert!(sql.contains("AUTOINCREMENT"));
        assert!(!sql.contains("TIMESTAMPTZ"));
    }
}
