//! Shared tracing targets for lifecycle instrumentation.
//!
//! Centralises the log targets used by the crate so subscribers can filter
//! events per area without pulling in unrelated application logs.

/// Target used by lifecycle spans and logs.
pub(crate) const LOG_TARGET: &str = "pg_embed::lifecycle";

/// Target used by cache lookup and population logs.
pub(crate) const CACHE_LOG_TARGET: &str = "pg_embed::cache";

/// Target used by remote download logs.
pub(crate) const FETCH_LOG_TARGET: &str = "pg_embed::fetch";

/// Target used by `pg_ctl` and `initdb` invocations.
pub(crate) const PROCESS_LOG_TARGET: &str = "pg_embed::process";
