//! Synctrack applier: bookkeeping for one sync pass.
//!
//! The actuation engine records a [`ObjectStatus`] per object as it applies or
//! deletes it and as reconciliation settles. Callers query the map with
//! [`ObjectStatusMap::filter`] and log the end-of-pass summary with
//! [`ObjectStatusMap::log`].

#![forbid(unsafe_code)]

use std::str::FromStr;

use tracing::{warn, Level};

mod report;
mod status;
mod tracker;

pub use report::{
    Dimension, StatusBucket, StatusLogger, StatusReport, TracingLogger, ACTUATION_LOG_ORDER,
    RECONCILE_LOG_ORDER, REPORT_ORDER,
};
pub use status::{ActuationStatus, ActuationStrategy, ObjectStatus, ObjectStatusMap, ReconcileStatus};
pub use tracker::{spawn_recorder, spawn_recorder_default, StatusTracker, StatusUpdate};

pub use synctrack_core::{GroupKind, ResourceId};

const DEFAULT_RECORDER_CAP: usize = 1024;

fn status_log_level() -> Level {
    match std::env::var("SYNCTRACK_STATUS_LOG_LEVEL") {
        Ok(s) => parse_level(&s).unwrap_or_else(|| {
            warn!(value = %s, "invalid SYNCTRACK_STATUS_LOG_LEVEL; using debug");
            Level::DEBUG
        }),
        Err(_) => Level::DEBUG,
    }
}

fn parse_level(s: &str) -> Option<Level> {
    Level::from_str(s.trim()).ok()
}

fn recorder_capacity() -> usize {
    std::env::var("SYNCTRACK_RECORDER_CAP")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|cap| *cap > 0)
        .unwrap_or(DEFAULT_RECORDER_CAP)
}
