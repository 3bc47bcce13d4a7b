//! Placeholder-dialect handling (spec §4.1.2).
//!
//! `Backend` talks to either Postgres or SQLite through a single
//! `sqlx::AnyPool`, so only the placeholder syntax in hand-built SQL
//! differs between the two — everything else (the reservation protocol,
//! the predicate builder, the lifecycle operations) is dialect-free.

use std::fmt;

/// Which placeholder syntax a connection expects.
///
/// Selected once at `Backend::connect` time from the URL scheme, then
/// threaded through every dynamically-built query. This is the "boolean
/// flag selected at open time" from spec §4.1, generalized to an enum so
/// an unsupported dialect can't silently compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `$1`, `$2`, ... — Postgres.
    Postgres,
    /// `?` repeated — SQLite (and, incidentally, MySQL, though this crate
    /// never connects to one).
    Sqlite,
}

impl Dialect {
    /// Infer the dialect from a `sqlx`-style connection URL.
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Dialect::Postgres)
        } else if url.starts_with("sqlite://") || url.starts_with("sqlite:") {
            Some(Dialect::Sqlite)
        } else {
            None
        }
    }

    /// Whether this dialect uses `$N` placeholders (as opposed to bare `?`).
    pub fn uses_dollar_placeholders(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Render the placeholder for the `n`th bound parameter (1-based).
    ///
    /// Every dynamically-built query in this crate goes through this one
    /// function with a running index — the bug spec §9 calls out
    /// (`$<len(params)+1>` recomputed per-clause instead of a running
    /// counter) can only happen if a caller stops threading the index
    /// through, which the predicate builder in `qb.rs` never does.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${n}"),
            Dialect::Sqlite => "?".to_string(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_postgres() {
        assert_eq!(
            Dialect::from_url("postgres://localhost/db"),
            Some(Dialect::Postgres)
        );
        assert_eq!(
            Dialect::from_url("postgresql://localhost/db"),
            Some(Dialect::Postgres)
        );
    }

    #[test]
    fn infers_sqlite() {
        assert_eq!(Dialect::from_url("sqlite://test.db"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_url("sqlite::memory:"), Some(Dialect::Sqlite));
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert_eq!(Dialect::from_url("mysql://localhost/db"), None);
    }

    #[test]
    fn placeholder_styles_differ() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
    }
}
