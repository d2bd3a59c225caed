/*!
 * Replica Telemetry
 * Observability core for a distributed database replica
 *
 * Records per-event spans in Chrome-trace JSON for offline visualization and
 * aggregates per-event statistics (gauges and timings) that are emitted
 * periodically as packed StatsD datagrams over UDP.
 */

pub mod core;
pub mod events;
pub mod io;
pub mod statsd;
pub mod tracer;

pub use crate::core::errors::{EmitError, TelemetryError};
pub use events::{
    CommitStage, Event, EventMetric, EventMetricAggregate, EventTag, EventTiming,
    EventTimingAggregate, Tree,
};
pub use io::{
    Clock, Completion, CompletionPool, LogTransport, MonotonicClock, SendSink, Transport,
    UdpTransport,
};
pub use statsd::{StatsD, TimingStat, PACKET_COUNT_MAX, PACKET_SIZE_MAX, STATSD_LINE_SIZE_MAX};
pub use tracer::{StatsDConfig, Tracer, TracerConfig, TRACE_SPAN_SIZE_MAX};
