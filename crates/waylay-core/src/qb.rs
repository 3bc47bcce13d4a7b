//! Predicate-to-SQL builder for `Backend::count` / `Backend::where_rows`.
//!
//! Spec §9 calls out a bug in the reference implementation: the placeholder
//! index was recomputed as `len(params)+1` per clause instead of threaded
//! through as a running counter, which breaks under a predicate with more
//! than one key. This builder takes a starting index and returns the next
//! free index precisely so nothing downstream can make that mistake.
//!
//! Spec §4.1 describes predicate keys as `@`-prefixed to distinguish column
//! names from handler-argument keys sharing the same map in the original
//! implementation. This crate gives predicates and handler arguments
//! distinct Rust types, so that ambiguity — and the prefix used to paper
//! over it — doesn't arise here; `Predicate` columns are always column
//! names.

use crate::dialect::Dialect;
use serde_json::Value;

/// A single column constraint: `column = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub value: Value,
}

impl Column {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A read predicate for `count` / `where_rows` (spec §4.1).
///
/// Columns are kept in an ordered `Vec` rather than a map — this sidesteps
/// spec property P7's caveat about map-iteration order entirely, since a
/// `Vec` always iterates in insertion order. The builder is idempotent
/// regardless of key count, not just for single-key predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub columns: Vec<Column>,
    pub group_by: Option<String>,
    pub having: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: Value) -> Self {
        self.columns.push(Column::new(column, value));
        self
    }

    pub fn group_by(mut self, clause: impl Into<String>) -> Self {
        self.group_by = Some(clause.into());
        self
    }

    pub fn having(mut self, clause: impl Into<String>) -> Self {
        self.having = Some(clause.into());
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self
    }
}

/// A rendered `WHERE ...` fragment plus the ordered bind values it needs,
/// and the next free placeholder index (for callers composing further
/// clauses after this one).
pub struct Rendered {
    pub sql: String,
    pub binds: Vec<Value>,
    pub next_index: usize,
}

/// Render `predicate.columns` as a `WHERE` clause (without the `WHERE`
/// keyword — callers prepend it, or `AND` it onto a base predicate) using a
/// running placeholder index starting at `start_index`.
pub fn render_where(dialect: Dialect, predicate: &Predicate, start_index: usize) -> Rendered {
    let mut clauses = Vec::with_capacity(predicate.columns.len());
    let mut binds = Vec::with_capacity(predicate.columns.len());
    let mut idx = start_index;

    for col in &predicate.columns {
        if col.value.is_null() {
            clauses.push(format!("{} IS NULL", col.name));
        } else {
            clauses.push(format!("{} = {}", col.name, dialect.placeholder(idx)));
            binds.push(col.value.clone());
            idx += 1;
        }
    }

    Rendered {
        sql: clauses.join(" AND "),
        binds,
        next_index: idx,
    }
}

/// Render an `UPDATE jobs SET ...` assignment list for `Backend::update`
/// (spec §4.1: "a `NULL` value becomes `SET col = NULL`"). Unlike
/// `render_where`, `NULL` needs no special case here — `SET col = NULL` is
/// ordinary SQL, it's only equality comparison in a `WHERE` that can't use
/// `=` against `NULL`.
pub fn render_set(dialect: Dialect, columns: &[Column], start_index: usize) -> Rendered {
    let mut clauses = Vec::with_capacity(columns.len());
    let mut binds = Vec::with_capacity(columns.len());
    let mut idx = start_index;

    for col in columns {
        clauses.push(format!("{} = {}", col.name, dialect.placeholder(idx)));
        binds.push(col.value.clone());
        idx += 1;
    }

    Rendered {
        sql: clauses.join(", "),
        binds,
        next_index: idx,
    }
}

/// Render a full `SELECT ... FROM jobs ...` statement for `where_rows`.
pub fn render_select(dialect: Dialect, predicate: &Predicate) -> Rendered {
    let where_part = render_where(dialect, predicate, 1);
    let mut sql = String::from("SELECT * FROM jobs");
    if !where_part.sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_part.sql);
    }
    if let Some(group_by) = &predicate.group_by {
        sql.push_str(" GROUP BY ");
        sql.push_str(group_by);
    }
    if let Some(having) = &predicate.having {
        sql.push_str(" HAVING ");
        sql.push_str(having);
    }
    if let Some(order_by) = &predicate.order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(order_by);
    }

    let mut binds = where_part.binds;
    let mut idx = where_part.next_index;

    if let Some(limit) = predicate.limit {
        sql.push_str(&format!(" LIMIT {}", dialect.placeholder(idx)));
        binds.push(Value::from(limit));
        idx += 1;
    }
    if let Some(offset) = predicate.offset {
        sql.push_str(&format!(" OFFSET {}", dialect.placeholder(idx)));
        binds.push(Value::from(offset));
        idx += 1;
    }

    Rendered {
        sql,
        binds,
        next_index: idx,
    }
}

/// Render a `SELECT COUNT(*) FROM jobs ...` statement for `count`.
///
/// Ignores `order_by`/`limit`/`offset` — they have no meaning for a scalar
/// count — but still honors `group_by`/`having` (a grouped count returns one
/// row per group; callers who want that should use `where_rows` with a
/// `COUNT(*)` projection instead, this helper is the common case).
pub fn render_count(dialect: Dialect, predicate: &Predicate) -> Rendered {
    let where_part = render_where(dialect, predicate, 1);
    let mut sql = String::from("SELECT COUNT(*) FROM jobs");
    if !where_part.sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_part.sql);
    }
    if let Some(group_by) = &predicate.group_by {
        sql.push_str(" GROUP BY ");
        sql.push_str(group_by);
    }
    if let Some(having) = &predicate.having {
        sql.push_str(" HAVING ");
        sql.push_str(having);
    }

    Rendered {
        sql,
        binds: where_part.binds,
        next_index: where_part.next_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_key_predicate_is_idempotent() {
        let predicate = Predicate::new().eq("queue", Value::from("default"));
        let first = render_select(Dialect::Postgres, &predicate);
        let second = render_select(Dialect::Postgres, &predicate);
        assert_eq!(first.sql, second.sql);
        assert_eq!(first.binds, second.binds);
    }

    #[test]
    fn multi_key_predicate_is_idempotent() {
        let predicate = Predicate::new()
            .eq("queue", Value::from("default"))
            .eq("locked_by", Value::Null)
            .eq("priority", Value::from(5));
        let first = render_select(Dialect::Postgres, &predicate);
        let second = render_select(Dialect::Postgres, &predicate);
        assert_eq!(first.sql, second.sql);
        assert_eq!(first.binds, second.binds);
    }

    #[test]
    fn running_index_survives_null_columns() {
        let predicate = Predicate::new()
            .eq("locked_by", Value::Null)
            .eq("queue", Value::from("default"))
            .eq("priority", Value::from(1));
        let rendered = render_select(Dialect::Postgres, &predicate);
        // locked_by IS NULL consumes no placeholder; queue and priority do.
        assert!(rendered.sql.contains("locked_by IS NULL"));
        assert!(rendered.sql.contains("queue = $1"));
        assert!(rendered.sql.contains("priority = $2"));
    }

    #[test]
    fn limit_and_offset_continue_the_running_index() {
        let predicate = Predicate::new()
            .eq("queue", Value::from("default"))
            .limit(10)
            .offset(20);
        let rendered = render_select(Dialect::Postgres, &predicate);
        assert!(rendered.sql.contains("queue = $1"));
        assert!(rendered.sql.contains("LIMIT $2"));
        assert!(rendered.sql.contains("OFFSET $3"));
        assert_eq!(rendered.next_index, 4);
    }

    #[test]
    fn sqlite_dialect_uses_bare_placeholders() {
        let predicate = Predicate::new()
            .eq("queue", Value::from("default"))
            .eq("priority", Value::from(1));
        let rendered = render_select(Dialect::Sqlite, &predicate);
        assert!(rendered.sql.contains("queue = ?"));
        assert!(rendered.sql.contains("priority = ?"));
    }

    #[test]
    fn render_set_has_no_null_special_case() {
        let columns = vec![
            Column::new("failed_at", Value::Null),
            Column::new("attempts", Value::from(3)),
        ];
        let rendered = render_set(Dialect::Postgres, &columns, 1);
        assert_eq!(rendered.sql, "failed_at = $1, attempts = $2");
        assert_eq!(rendered.binds, vec![Value::Null, Value::from(3)]);
        assert_eq!(rendered.next_index, 3);
    }

    #[test]
    fn count_ignores_order_and_paging() {
        let predicate = Predicate::new()
            .eq("queue", Value::from("default"))
            .order_by("id DESC")
            .limit(5);
        let rendered = render_count(Dialect::Postgres, &predicate);
        assert!(!rendered.sql.contains("ORDER BY"));
        assert!(!rendered.sql.contains("LIMIT"));
    }
}
