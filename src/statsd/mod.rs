/*!
 * StatsD Module
 * Line formatting and datagram packing with a compile-time byte budget
 *
 * The worst-case line size is evaluated over the whole event catalogue at
 * build time; a catalogue change that would overflow a datagram fails
 * compilation instead of dropping metrics at runtime.
 */

mod line;
mod packet;

pub use line::TimingStat;
pub(crate) use line::{format_metric, LineOptions, MetricSample, SliceWriter};
pub use packet::StatsD;

use crate::events::{EventMetric, EventTag, EventTiming, U64_DIGITS_MAX, U8_DIGITS_MAX};

/// Maximum UDP datagram payload handed to the transport
pub const PACKET_SIZE_MAX: usize = 1400;

const CLUSTER_HEX_DIGITS: usize = 32;

const fn line_bytes(name_len: usize, suffix_len: usize, field_bytes: usize) -> usize {
    "tb.".len()
        + name_len
        + suffix_len
        + ":".len()
        + U64_DIGITS_MAX
        + "|g".len()
        + "|#cluster:".len()
        + CLUSTER_HEX_DIGITS
        + ",replica:".len()
        + U8_DIGITS_MAX
        + field_bytes
        + "\n".len()
}

const fn statsd_line_size_max() -> usize {
    let mut max = 0;

    let mut i = 0;
    while i < EventTag::COUNT {
        let tag = EventTag::ALL[i];
        let bytes = line_bytes(
            tag.name().len(),
            TimingStat::suffix_bytes_max(),
            tag.timing_field_bytes_max(),
        );
        if bytes > max {
            max = bytes;
        }
        i += 1;
    }

    let mut i = 0;
    while i < EventMetric::VARIANTS.len() {
        let metric = EventMetric::VARIANTS[i];
        let bytes = line_bytes(metric.name().len(), 0, metric.field_bytes_max());
        if bytes > max {
            max = bytes;
        }
        i += 1;
    }

    max
}

const fn div_ceil(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

/// Supremum of formatted line length over every payload the catalogue admits
pub const STATSD_LINE_SIZE_MAX: usize = statsd_line_size_max();

/// Lines guaranteed to fit one datagram
pub const PACKET_MESSAGES_MAX: usize = PACKET_SIZE_MAX / STATSD_LINE_SIZE_MAX;

/// Upper bound on datagrams per emission: every gauge slot plus five lines
/// per timing slot
pub const PACKET_COUNT_MAX: usize = div_ceil(
    EventMetric::SLOT_COUNT as usize + EventTiming::SLOT_COUNT as usize * TimingStat::COUNT,
    PACKET_MESSAGES_MAX,
);

const _: () = assert!(
    STATSD_LINE_SIZE_MAX <= PACKET_SIZE_MAX,
    "a worst-case metric line no longer fits one datagram"
);
const _: () = assert!(PACKET_MESSAGES_MAX > 0);
const _: () = assert!(
    PACKET_COUNT_MAX >= 1 && PACKET_COUNT_MAX < 256,
    "emission datagram bound out of range"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_constants() {
        assert!(STATSD_LINE_SIZE_MAX <= PACKET_SIZE_MAX);
        assert!(PACKET_MESSAGES_MAX > 0);
        assert!(PACKET_COUNT_MAX >= 1 && PACKET_COUNT_MAX < 256);
        // Every line of a full table emission fits the provisioned buffer.
        let lines =
            EventMetric::SLOT_COUNT as usize + EventTiming::SLOT_COUNT as usize * TimingStat::COUNT;
        assert!(lines <= PACKET_COUNT_MAX * PACKET_MESSAGES_MAX);
    }
}
