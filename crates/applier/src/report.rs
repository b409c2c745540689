//! Aggregated status reports: one line per strategy and status dimension.

use std::fmt;

use metrics::gauge;
use synctrack_core::ResourceId;
use tracing::Level;

use crate::status::{ActuationStatus, ActuationStrategy, ObjectStatusMap, ReconcileStatus};

/// Actuation buckets in log order. Pending is left out: not every object emits it.
pub const ACTUATION_LOG_ORDER: [ActuationStatus; 3] =
    [ActuationStatus::Skipped, ActuationStatus::Succeeded, ActuationStatus::Failed];

/// Reconcile buckets in log order. Pending is left out: not every object emits it.
pub const RECONCILE_LOG_ORDER: [ReconcileStatus; 4] = [
    ReconcileStatus::Skipped,
    ReconcileStatus::Succeeded,
    ReconcileStatus::Failed,
    ReconcileStatus::Timeout,
];

/// Order in which [`ObjectStatusMap::log`] emits its lines.
pub const REPORT_ORDER: [(ActuationStrategy, Dimension); 4] = [
    (ActuationStrategy::Apply, Dimension::Actuation),
    (ActuationStrategy::Apply, Dimension::Reconcile),
    (ActuationStrategy::Delete, Dimension::Actuation),
    (ActuationStrategy::Delete, Dimension::Reconcile),
];

// Escaped on purpose: each report stays a single log line.
const ESCAPED_NEWLINE: &str = "\\n";
const COMMA_ESCAPED_NEWLINE: &str = ",\\n";
const COMMA_SPACE: &str = ", ";

const STATUS_TARGET: &str = "synctrack::status";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Actuation,
    Reconcile,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Actuation => "actuation",
            Self::Reconcile => "reconcile",
        }
    }

    fn plural_title(self) -> &'static str {
        match self {
            Self::Actuation => "Actuations",
            Self::Reconcile => "Reconciles",
        }
    }
}

/// Objects sharing one status value. `ids` are sorted by their text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBucket {
    pub status: &'static str,
    pub ids: Vec<String>,
}

impl StatusBucket {
    fn new(status: &'static str, ids: Vec<ResourceId>) -> Self {
        let mut ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        ids.sort_unstable();
        Self { status, ids }
    }

    pub fn count(&self) -> usize { self.ids.len() }
}

impl fmt::Display for StatusBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ids.is_empty() {
            write!(f, "{} ({})", self.status, self.ids.len())
        } else {
            write!(f, "{} ({}): [{}]", self.status, self.ids.len(), self.ids.join(COMMA_SPACE))
        }
    }
}

/// Counts for one strategy along one dimension.
///
/// Rendered through `Display`; writing into a `String` cannot fail, so
/// `to_string()` panicking would mean a broken `Display` impl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub strategy: ActuationStrategy,
    pub dimension: Dimension,
    pub buckets: Vec<StatusBucket>,
    pub total: usize,
}

impl StatusReport {
    pub fn title(&self) -> String {
        format!("{} {}", self.strategy, self.dimension.plural_title())
    }

    pub fn bucket(&self, status: &str) -> Option<&StatusBucket> {
        self.buckets.iter().find(|b| b.status == status)
    }

    /// Bucket segments joined with `delimiter`, without the title.
    pub fn body(&self, delimiter: &str) -> String {
        self.buckets.iter().map(ToString::to_string).collect::<Vec<_>>().join(delimiter)
    }

    fn record_metrics(&self) {
        for b in &self.buckets {
            gauge!(
                "status_bucket_objects",
                b.count() as f64,
                "strategy" => self.strategy.as_str(),
                "dimension" => self.dimension.as_str(),
                "status" => b.status
            );
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total == 0 {
            return write!(f, "{} (Total: {})", self.title(), self.total);
        }
        write!(f, "{} (Total: {}):{}", self.title(), self.total, ESCAPED_NEWLINE)?;
        for (i, b) in self.buckets.iter().enumerate() {
            if i > 0 {
                f.write_str(COMMA_ESCAPED_NEWLINE)?;
            }
            write!(f, "{}", b)?;
        }
        Ok(())
    }
}

/// Minimal leveled sink for status reports.
pub trait StatusLogger {
    /// Checked once per [`ObjectStatusMap::log`] call, before any work.
    fn enabled(&self) -> bool;
    fn log(&self, line: &str);
}

/// Emits reports as `tracing` events at a fixed level.
#[derive(Debug, Clone, Copy)]
pub struct TracingLogger {
    level: Level,
}

impl TracingLogger {
    pub fn new(level: Level) -> Self { Self { level } }

    /// Level from `SYNCTRACK_STATUS_LOG_LEVEL`, debug by default.
    pub fn from_env() -> Self { Self::new(crate::status_log_level()) }

    pub fn level(&self) -> Level { self.level }
}

impl Default for TracingLogger {
    fn default() -> Self { Self::new(Level::DEBUG) }
}

impl StatusLogger for TracingLogger {
    fn enabled(&self) -> bool {
        // Macro levels must be constants.
        if self.level == Level::ERROR {
            tracing::enabled!(target: STATUS_TARGET, Level::ERROR)
        } else if self.level == Level::WARN {
            tracing::enabled!(target: STATUS_TARGET, Level::WARN)
        } else if self.level == Level::INFO {
            tracing::enabled!(target: STATUS_TARGET, Level::INFO)
        } else if self.level == Level::DEBUG {
            tracing::enabled!(target: STATUS_TARGET, Level::DEBUG)
        } else {
            tracing::enabled!(target: STATUS_TARGET, Level::TRACE)
        }
    }

    fn log(&self, line: &str) {
        if self.level == Level::ERROR {
            tracing::event!(target: STATUS_TARGET, Level::ERROR, "{}", line);
        } else if self.level == Level::WARN {
            tracing::event!(target: STATUS_TARGET, Level::WARN, "{}", line);
        } else if self.level == Level::INFO {
            tracing::event!(target: STATUS_TARGET, Level::INFO, "{}", line);
        } else if self.level == Level::DEBUG {
            tracing::event!(target: STATUS_TARGET, Level::DEBUG, "{}", line);
        } else {
            tracing::event!(target: STATUS_TARGET, Level::TRACE, "{}", line);
        }
    }
}

impl ObjectStatusMap {
    /// Group objects with `strategy` by their `dimension` status, in log order.
    pub fn report(&self, strategy: ActuationStrategy, dimension: Dimension) -> StatusReport {
        let buckets: Vec<StatusBucket> = match dimension {
            Dimension::Actuation => ACTUATION_LOG_ORDER
                .iter()
                .map(|s| StatusBucket::new(s.as_str(), self.filter(Some(strategy), Some(*s), None)))
                .collect(),
            Dimension::Reconcile => RECONCILE_LOG_ORDER
                .iter()
                .map(|s| StatusBucket::new(s.as_str(), self.filter(Some(strategy), None, Some(*s))))
                .collect(),
        };
        let total = buckets.iter().map(StatusBucket::count).sum();
        StatusReport { strategy, dimension, buckets, total }
    }

    /// All four reports in [`REPORT_ORDER`].
    pub fn reports(&self) -> Vec<StatusReport> {
        REPORT_ORDER.iter().map(|(strategy, dimension)| self.report(*strategy, *dimension)).collect()
    }

    /// Write one line per report if `logger` is enabled. Does nothing otherwise.
    pub fn log<L: StatusLogger + ?Sized>(&self, logger: &L) {
        if !logger.enabled() {
            return;
        }
        self.emit(logger);
    }

    pub(crate) fn emit<L: StatusLogger + ?Sized>(&self, logger: &L) {
        for report in self.reports() {
            report.record_metrics();
            logger.log(&report.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ObjectStatus;
    use std::cell::{Cell, RefCell};
    use synctrack_core::GroupKind;
    use ActuationStatus as A;
    use ActuationStrategy::{Apply, Delete};
    use ReconcileStatus as R;

    #[derive(Default)]
    struct FakeLogger {
        enabled: bool,
        enabled_calls: Cell<usize>,
        lines: RefCell<Vec<String>>,
    }

    impl StatusLogger for FakeLogger {
        fn enabled(&self) -> bool {
            self.enabled_calls.set(self.enabled_calls.get() + 1);
            self.enabled
        }
        fn log(&self, line: &str) { self.lines.borrow_mut().push(line.to_string()); }
    }

    fn id(kind: &str, ns: &str, name: &str) -> ResourceId {
        ResourceId::new(GroupKind::new("", kind), ns, name)
    }

    fn sample() -> ObjectStatusMap {
        vec![
            (id("ConfigMap", "ns", "b"), ObjectStatus::new(Apply, A::Succeeded, R::Succeeded)),
            (id("ConfigMap", "ns", "a"), ObjectStatus::new(Apply, A::Succeeded, R::Timeout)),
            (id("Secret", "ns", "s"), ObjectStatus::new(Apply, A::Failed, R::Pending)),
            (id("Namespace", "", "old"), ObjectStatus::new(Delete, A::Skipped, R::Skipped)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn report_lists_sorted_ids_per_bucket() {
        let r = sample().report(Apply, Dimension::Actuation);
        assert_eq!(r.total, 3);
        assert_eq!(
            r.to_string(),
            "Apply Actuations (Total: 3):\\nSkipped (0),\\nSucceeded (2): [ConfigMap, ns/a, ConfigMap, ns/b],\\nFailed (1): [Secret, ns/s]"
        );
    }

    #[test]
    fn reconcile_report_leaves_pending_out() {
        let r = sample().report(Apply, Dimension::Reconcile);
        assert_eq!(r.total, 2);
        let statuses: Vec<&str> = r.buckets.iter().map(|b| b.status).collect();
        assert_eq!(statuses, vec!["Skipped", "Succeeded", "Failed", "Timeout"]);
        assert_eq!(r.bucket("Timeout").unwrap().ids, vec!["ConfigMap, ns/a"]);
        assert!(r.bucket("Pending").is_none());
    }

    #[test]
    fn empty_report_has_no_body() {
        let r = ObjectStatusMap::new().report(Delete, Dimension::Reconcile);
        assert_eq!(r.to_string(), "Delete Reconciles (Total: 0)");
    }

    #[test]
    fn log_emits_four_lines_in_fixed_order() {
        let logger = FakeLogger { enabled: true, ..Default::default() };
        sample().log(&logger);
        let lines = logger.lines.borrow();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Apply Actuations (Total: 3)"));
        assert!(lines[1].starts_with("Apply Reconciles (Total: 2)"));
        assert!(lines[2].starts_with("Delete Actuations (Total: 1)"));
        assert!(lines[3].starts_with("Delete Reconciles (Total: 1)"));
        assert_eq!(logger.enabled_calls.get(), 1);
    }

    #[test]
    fn disabled_logger_gets_nothing() {
        let logger = FakeLogger::default();
        sample().log(&logger);
        assert!(logger.lines.borrow().is_empty());
        assert_eq!(logger.enabled_calls.get(), 1);
    }

    #[test]
    fn log_output_is_stable_across_insertion_orders() {
        let forward = sample();
        let mut backward = ObjectStatusMap::new();
        let mut entries: Vec<_> = forward.iter().map(|(id, s)| (id.clone(), *s)).collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        for (id, s) in entries {
            backward.set(id, Some(s));
        }
        let (l1, l2) = (FakeLogger { enabled: true, ..Default::default() }, FakeLogger { enabled: true, ..Default::default() });
        forward.log(&l1);
        backward.log(&l2);
        assert_eq!(*l1.lines.borrow(), *l2.lines.borrow());
    }
}
