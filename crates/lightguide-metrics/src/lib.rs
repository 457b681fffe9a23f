//! Metric declarations for the LightGuide sender.
//!
//! Every metric the serial crate records is declared once here as a
//! [`Metric`] constant, so names, units and label keys live in one place.
//! Recording goes through the `metrics` facade; with no recorder installed
//! the macros do nothing.
//!
//! ```rust,ignore
//! use lightguide_metrics::{describe_metrics, metric_defs, MetricLabels};
//!
//! describe_metrics();
//! let labels = MetricLabels::new("/dev/ttyUSB0");
//! metrics::counter!(metric_defs::FRAMES_WRITTEN.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// Counter, gauge or histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonically increasing count, e.g. frames written.
    Counter,
    /// Value that moves both ways, e.g. queue depth.
    Gauge,
    /// Distribution of samples, e.g. write time.
    Histogram,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        };
        f.write_str(name)
    }
}

/// Static description of one metric.
///
/// ```rust
/// use lightguide_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const RETRIES: Metric = Metric::counter("lightguide.example.retries")
///     .with_description("Example counter")
///     .with_unit(Unit::Count)
///     .with_labels(&["port"]);
///
/// assert_eq!(RETRIES.kind, MetricKind::Counter);
/// assert_eq!(RETRIES.labels, &["port"]);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// Dotted name, e.g. `lightguide.wire.frames_written`.
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    pub unit: Option<Unit>,
    /// Label keys every recording of this metric carries.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn declare(name: &'static str, kind: MetricKind) -> Self {
        Metric {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn counter(name: &'static str) -> Self {
        Self::declare(name, MetricKind::Counter)
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self::declare(name, MetricKind::Gauge)
    }

    pub const fn histogram(name: &'static str) -> Self {
        Self::declare(name, MetricKind::Histogram)
    }

    pub const fn with_description(self, description: &'static str) -> Self {
        Metric { description, ..self }
    }

    pub const fn with_unit(self, unit: Unit) -> Self {
        Metric {
            unit: Some(unit),
            ..self
        }
    }

    pub const fn with_labels(self, labels: &'static [&'static str]) -> Self {
        Metric { labels, ..self }
    }

    /// Hand the description and unit to the installed recorder.
    pub fn describe(&self) {
        let description = self.description;
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => describe_counter!(self.name, unit, description),
            (MetricKind::Counter, None) => describe_counter!(self.name, description),
            (MetricKind::Gauge, Some(unit)) => describe_gauge!(self.name, unit, description),
            (MetricKind::Gauge, None) => describe_gauge!(self.name, description),
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, description)
            }
            (MetricKind::Histogram, None) => describe_histogram!(self.name, description),
        }
    }
}

/// Every metric recorded by the connection and the sender.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Label keys on all port-scoped metrics.
    pub const STANDARD_LABELS: &[&str] = &["port"];

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    pub const CONNECT_ATTEMPTS: Metric = Metric::counter("lightguide.connection.attempts")
        .with_description("Serial port open attempts")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const CONNECT_FAILURES: Metric = Metric::counter("lightguide.connection.failures")
        .with_description("Serial port open attempts that failed")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    pub const FRAMES_QUEUED: Metric = Metric::counter("lightguide.sender.frames_queued")
        .with_description("Frames accepted into the send queue")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Frames rejected or discarded because the sender stopped.
    pub const FRAMES_DROPPED: Metric = Metric::counter("lightguide.sender.frames_dropped")
        .with_description("Frames discarded after the sender stopped")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const QUEUE_DEPTH: Metric = Metric::gauge("lightguide.sender.queue_depth")
        .with_description("Frames waiting in the send queue")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    // ------------------------------------------------------------------
    // Wire
    // ------------------------------------------------------------------

    pub const FRAMES_WRITTEN: Metric = Metric::counter("lightguide.wire.frames_written")
        .with_description("Frames written and drained to the port")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const BYTES_WRITTEN: Metric = Metric::counter("lightguide.wire.bytes_written")
        .with_description("Bytes written to the port")
        .with_unit(Unit::Bytes)
        .with_labels(STANDARD_LABELS);

    /// Includes write timeouts.
    pub const WRITE_ERRORS: Metric = Metric::counter("lightguide.wire.write_errors")
        .with_description("Frames whose write or drain failed")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const WRITE_TIME: Metric = Metric::histogram("lightguide.wire.write_time_us")
        .with_description("Time to write, flush and drain one frame")
        .with_unit(Unit::Microseconds)
        .with_labels(STANDARD_LABELS);

    // ------------------------------------------------------------------
    // ACK
    // ------------------------------------------------------------------

    pub const ACKS_RECEIVED: Metric = Metric::counter("lightguide.ack.received")
        .with_description("Frames acknowledged by the panel")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    pub const ACK_TIMEOUTS: Metric = Metric::counter("lightguide.ack.timeouts")
        .with_description("Frames with no ACK inside the wait window")
        .with_unit(Unit::Count)
        .with_labels(STANDARD_LABELS);

    /// Measured from the end of the inter-frame delay.
    pub const ACK_LATENCY: Metric = Metric::histogram("lightguide.ack.latency_us")
        .with_description("Time from frame write to ACK")
        .with_unit(Unit::Microseconds)
        .with_labels(STANDARD_LABELS);

    pub const ALL: &[&Metric] = &[
        &CONNECT_ATTEMPTS,
        &CONNECT_FAILURES,
        &FRAMES_QUEUED,
        &FRAMES_DROPPED,
        &QUEUE_DEPTH,
        &FRAMES_WRITTEN,
        &BYTES_WRITTEN,
        &WRITE_ERRORS,
        &WRITE_TIME,
        &ACKS_RECEIVED,
        &ACK_TIMEOUTS,
        &ACK_LATENCY,
    ];
}

/// The `port` label attached to every recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLabels {
    pub port: String,
}

impl MetricLabels {
    pub fn new(port: impl Into<String>) -> Self {
        MetricLabels { port: port.into() }
    }

    /// Labels in the shape the `metrics` macros accept.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("port", self.port.clone())]
    }
}

/// Describe every metric in [`metric_defs::ALL`]. Call once, after a
/// recorder is installed.
pub fn describe_metrics() {
    metric_defs::ALL.iter().for_each(|metric| metric.describe());
}
