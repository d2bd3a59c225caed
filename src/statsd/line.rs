/*!
 * Line Formatter
 * One metric sample in, one newline-terminated StatsD line out
 *
 * Grammar:
 * `tb.<name><suffix>:<value>|<type>|#cluster:<32-hex>,replica:<dec>[,<field>:<value>]*\n`
 */

use crate::events::{EventMetricAggregate, EventTimingAggregate, TimingValues};
use std::fmt::{self, Write};

/// The five statistics a timing aggregate emits, in emission order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingStat {
    Min,
    Max,
    Avg,
    Sum,
    Count,
}

impl TimingStat {
    pub const COUNT: usize = 5;

    pub const ALL: [TimingStat; Self::COUNT] = [
        TimingStat::Min,
        TimingStat::Max,
        TimingStat::Avg,
        TimingStat::Sum,
        TimingStat::Count,
    ];

    /// Metric name suffix selecting this statistic
    pub const fn suffix(self) -> &'static str {
        match self {
            TimingStat::Min => "_us.min",
            TimingStat::Max => "_us.max",
            TimingStat::Avg => "_us.avg",
            TimingStat::Sum => "_us.sum",
            TimingStat::Count => "_us.count",
        }
    }

    /// StatsD metric type: gauges for the point statistics, counters for the
    /// window accumulators
    pub const fn statsd_type(self) -> &'static str {
        match self {
            TimingStat::Min | TimingStat::Max | TimingStat::Avg => "g",
            TimingStat::Sum | TimingStat::Count => "c",
        }
    }

    pub fn value(self, values: &TimingValues) -> u64 {
        match self {
            TimingStat::Min => values.duration_min_us,
            TimingStat::Max => values.duration_max_us,
            TimingStat::Avg => values.average_us(),
            TimingStat::Sum => values.duration_sum_us,
            TimingStat::Count => values.count,
        }
    }

    pub(crate) const fn suffix_bytes_max() -> usize {
        let mut max = 0;
        let mut i = 0;
        while i < Self::COUNT {
            let len = Self::ALL[i].suffix().len();
            if len > max {
                max = len;
            }
            i += 1;
        }
        max
    }
}

/// One sample to format: a gauge, or one statistic of a timing aggregate
#[derive(Debug, Clone, Copy)]
pub enum MetricSample<'a> {
    Gauge(&'a EventMetricAggregate),
    Timing(&'a EventTimingAggregate, TimingStat),
}

/// Per-line identity tags shared by every sample of one emitter
#[derive(Debug, Clone, Copy)]
pub(crate) struct LineOptions {
    pub cluster: u128,
    pub replica: u8,
}

/// Bounded writer over a byte slice; the only failure is "no space left"
pub(crate) struct SliceWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> SliceWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        if end > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

/// Format exactly one newline-terminated StatsD line into `out`
///
/// Fails only when `out` has no space left, which the compile-time line
/// budget rules out for any payload the catalogue admits. The caller seals
/// the current datagram and retries into a fresh one.
pub(crate) fn format_metric(
    out: &mut SliceWriter<'_>,
    sample: &MetricSample<'_>,
    options: &LineOptions,
) -> fmt::Result {
    let (name, suffix, value, statsd_type) = match sample {
        MetricSample::Gauge(aggregate) => (aggregate.event.name(), "", aggregate.value, "g"),
        MetricSample::Timing(aggregate, stat) => (
            aggregate.event.tag().name(),
            stat.suffix(),
            stat.value(&aggregate.values),
            stat.statsd_type(),
        ),
    };
    write!(
        out,
        "tb.{name}{suffix}:{value}|{statsd_type}|#cluster:{cluster:032x},replica:{replica}",
        cluster = options.cluster,
        replica = options.replica,
    )?;
    match sample {
        MetricSample::Gauge(aggregate) => aggregate.event.write_fields(out)?,
        MetricSample::Timing(aggregate, _) => aggregate.event.write_fields(out)?,
    }
    out.write_str("\n")
}
