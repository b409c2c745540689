//! Per-object actuation and reconcile status, keyed by [`ResourceId`].

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use metrics::counter;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use synctrack_core::ResourceId;
use tracing::trace;

/// How an object is actuated in this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActuationStrategy {
    Apply,
    Delete,
}

impl ActuationStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apply => "Apply",
            Self::Delete => "Delete",
        }
    }
}

/// Whether actuation was attempted yet and how it went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActuationStatus {
    Pending,
    Skipped,
    Succeeded,
    Failed,
}

impl ActuationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Skipped => "Skipped",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }
}

/// Whether the observed state converged after actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconcileStatus {
    Pending,
    Skipped,
    Succeeded,
    Failed,
    Timeout,
}

impl ReconcileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Skipped => "Skipped",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Timeout => "Timeout",
        }
    }
}

macro_rules! str_enum_impls {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok(Self::$variant),)+
                    other => Err(anyhow!("unknown {}: {:?}", stringify!($ty), other)),
                }
            }
        }
    };
}

str_enum_impls!(ActuationStrategy { Apply, Delete });
str_enum_impls!(ActuationStatus { Pending, Skipped, Succeeded, Failed });
str_enum_impls!(ReconcileStatus { Pending, Skipped, Succeeded, Failed, Timeout });

/// Strategy plus the latest actuation and reconcile outcome for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectStatus {
    pub strategy: ActuationStrategy,
    pub actuation: ActuationStatus,
    pub reconcile: ReconcileStatus,
}

impl ObjectStatus {
    pub fn new(strategy: ActuationStrategy, actuation: ActuationStatus, reconcile: ReconcileStatus) -> Self {
        Self { strategy, actuation, reconcile }
    }

    /// A freshly planned object: nothing attempted yet.
    pub fn pending(strategy: ActuationStrategy) -> Self {
        Self::new(strategy, ActuationStatus::Pending, ReconcileStatus::Pending)
    }

    /// `None` constraints match anything.
    pub fn matches(
        &self,
        strategy: Option<ActuationStrategy>,
        actuation: Option<ActuationStatus>,
        reconcile: Option<ReconcileStatus>,
    ) -> bool {
        strategy.map_or(true, |s| s == self.strategy)
            && actuation.map_or(true, |a| a == self.actuation)
            && reconcile.map_or(true, |r| r == self.reconcile)
    }
}

/// Status of every object touched during one sync pass.
///
/// A `None` value is a reserved slot: the object is known but has no status
/// yet. Reserved slots never match a filter and never show up in reports.
///
/// The map itself is not synchronized. Share it across workers through
/// [`crate::StatusTracker`] or keep a single owner per pass.
#[derive(Debug, Clone, Default)]
pub struct ObjectStatusMap {
    entries: FxHashMap<ResourceId, Option<ObjectStatus>>,
}

impl ObjectStatusMap {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Replace whatever is stored for `id`. Updates never merge.
    pub fn set(&mut self, id: ResourceId, status: Option<ObjectStatus>) {
        trace!(id = %id, status = ?status, "object status set");
        counter!("status_updates_total", 1u64);
        self.entries.insert(id, status);
    }

    /// Current status for `id`, if one is recorded.
    pub fn get(&self, id: &ResourceId) -> Option<ObjectStatus> {
        self.entries.get(id).copied().flatten()
    }

    /// True if `id` has an entry, even a reserved one.
    pub fn contains(&self, id: &ResourceId) -> bool { self.entries.contains_key(id) }

    pub fn remove(&mut self, id: &ResourceId) -> Option<ObjectStatus> {
        self.entries.remove(id).flatten()
    }

    /// Drop every entry, ready for the next pass.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Entries with a recorded status, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, &ObjectStatus)> + '_ {
        self.entries.iter().filter_map(|(id, status)| status.as_ref().map(|s| (id, s)))
    }

    /// Ids whose status satisfies every given constraint. Unordered.
    pub fn filter(
        &self,
        strategy: Option<ActuationStrategy>,
        actuation: Option<ActuationStatus>,
        reconcile: Option<ReconcileStatus>,
    ) -> Vec<ResourceId> {
        self.iter()
            .filter(|(_, status)| status.matches(strategy, actuation, reconcile))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Same constraints as [`Self::filter`] without collecting ids.
    pub fn count(
        &self,
        strategy: Option<ActuationStrategy>,
        actuation: Option<ActuationStatus>,
        reconcile: Option<ReconcileStatus>,
    ) -> usize {
        self.iter().filter(|(_, status)| status.matches(strategy, actuation, reconcile)).count()
    }
}

impl FromIterator<(ResourceId, ObjectStatus)> for ObjectStatusMap {
    fn from_iter<T: IntoIterator<Item = (ResourceId, ObjectStatus)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (id, status) in iter {
            map.set(id, Some(status));
        }
        map
    }
}
