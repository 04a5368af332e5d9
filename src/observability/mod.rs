//! Tracing spans and atomic counters for archive operations.
//!
//! Spans follow the `component.operation` naming (`archive.save`,
//! `codec.encode`, `codec.decode`, `identity.lookup`). Counters are local and
//! can be read at any time through [`ArchiveMetrics::summary`].

mod metrics;
mod spans;

pub use metrics::{ArchiveMetrics, Counter, Histogram, MetricsSummary};
pub use spans::{ArchiveSpans, SaveSpan};
