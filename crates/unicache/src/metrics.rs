//! Cache metrics recorded through the `metrics` facade.
//!
//! The library never installs a recorder; the host application decides how
//! (and whether) to export them.

use metrics::counter;

use crate::orchestrator::{FallbackReason, ReadPath};

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_READS_TOTAL: &str = "cache_reads_total";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "cache_invalidations_total";
    pub const CACHE_LOCK_CONTENTION_TOTAL: &str = "cache_lock_contention_total";
    pub const CACHE_DEGRADED_TOTAL: &str = "cache_degraded_total";
    pub const CACHE_DECODE_ERRORS_TOTAL: &str = "cache_decode_errors_total";
}

pub fn record_read(namespace: &str, path: ReadPath) {
    counter!(
        names::CACHE_READS_TOTAL,
        "namespace" => namespace.to_string(),
        "path" => path.as_str()
    )
    .increment(1);
}

pub fn record_invalidation(namespace: &str, kind: &'static str) {
    counter!(
        names::CACHE_INVALIDATIONS_TOTAL,
        "namespace" => namespace.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_lock_contention(namespace: &str) {
    counter!(names::CACHE_LOCK_CONTENTION_TOTAL, "namespace" => namespace.to_string()).increment(1);
}

pub fn record_degraded(namespace: &str, reason: FallbackReason) {
    counter!(
        names::CACHE_DEGRADED_TOTAL,
        "namespace" => namespace.to_string(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

pub fn record_decode_error(namespace: &str, tier: &'static str) {
    counter!(
        names::CACHE_DECODE_ERRORS_TOTAL,
        "namespace" => namespace.to_string(),
        "tier" => tier
    )
    .increment(1);
}
