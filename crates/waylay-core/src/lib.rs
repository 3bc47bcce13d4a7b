//! The durable job store: `Backend`, `Job`, the dialect-agnostic SQL
//! predicate builder, and the handler contract/registry (spec §4.1–§4.3).
//!
//! Concrete handler bodies and the worker poll loop live in sibling crates
//! (`waylay-handlers`, `waylay-worker`); this crate is the part every
//! worker and every admin tool shares.

mod backend;
mod ddl;
mod dialect;
mod error;
mod handler;
mod job;
mod qb;

pub use backend::{describe_handler, Backend, NewJob, ReserveQuery, Stats};
pub use ddl::{create_jobs_indexes_sql, create_jobs_table_sql};
pub use dialect::Dialect;
pub use error::{DeserializationError, Result, WaylayError};
pub use handler::{Handler, HandlerBuildError, HandlerContext, HandlerRegistry};
pub use job::{parse_handler, stale_lock_boundary, truncate_error, Job, JobRow, MIN_TRY_INTERVAL};
pub use qb::{render_count, render_select, render_set, render_where, Column, Predicate, Rendered};
