/*!
 * Packet Packer / Emitter
 * Greedy packing of metric lines into bounded fire-and-forget datagrams
 *
 * One reusable send buffer holds every datagram of an emission. The buffer
 * is only rewritten once the previous emission has drained its completions;
 * until then `emit` reports Busy and the caller's aggregates stay put.
 */

use super::{
    format_metric, LineOptions, MetricSample, SliceWriter, TimingStat, PACKET_COUNT_MAX,
    PACKET_SIZE_MAX,
};
use crate::core::errors::EmitError;
use crate::events::{EventMetricAggregate, EventTimingAggregate};
use crate::io::{CompletionPool, LogTransport, SendSink, Transport, UdpTransport};
use log::{debug, warn};
use std::io;
use std::net::SocketAddr;

/// StatsD emitter over a datagram transport
pub struct StatsD {
    options: LineOptions,
    transport: Box<dyn Transport>,
    pool: CompletionPool,
    sink: SendSink,
    send_buffer: Box<[u8]>,
    packet_sizes: Vec<usize>,
}

impl StatsD {
    /// Emitter that writes datagram payloads to the logger
    pub fn log(cluster: u128, replica: u8) -> Self {
        Self::with_transport(cluster, replica, Box::new(LogTransport))
    }

    /// Emitter over a connected non-blocking UDP socket
    pub fn udp(cluster: u128, replica: u8, address: SocketAddr) -> io::Result<Self> {
        let transport = UdpTransport::connect(address)?;
        Ok(Self::with_transport(cluster, replica, Box::new(transport)))
    }

    pub fn with_transport(cluster: u128, replica: u8, transport: Box<dyn Transport>) -> Self {
        Self {
            options: LineOptions { cluster, replica },
            transport,
            pool: CompletionPool::new(PACKET_COUNT_MAX),
            sink: SendSink::new(),
            send_buffer: vec![0u8; PACKET_COUNT_MAX * PACKET_SIZE_MAX].into_boxed_slice(),
            packet_sizes: Vec::with_capacity(PACKET_COUNT_MAX),
        }
    }

    /// Sends still in flight from the previous emission
    pub fn executing(&self) -> usize {
        self.pool.executing()
    }

    /// Send failures accumulated since the last emission started
    pub fn send_errors(&self) -> u64 {
        self.sink.errors()
    }

    /// Pack the aggregate tables into datagrams and dispatch them
    ///
    /// Returns Busy while the previous emission is still draining; nothing
    /// is queued and the caller keeps its aggregates. Datagrams that cannot
    /// get a completion are dropped with a log.
    pub fn emit(
        &mut self,
        metrics: &[Option<EventMetricAggregate>],
        timings: &[Option<EventTimingAggregate>],
    ) -> Result<(), EmitError> {
        if self.pool.executing() > 0 {
            return Err(EmitError::Busy);
        }
        let failed = self.sink.take_errors();
        if failed > 0 {
            warn!("{failed} datagram(s) failed to send during the previous emission");
        }

        self.packet_sizes.clear();
        let mut lines = 0usize;
        for aggregate in metrics.iter().flatten() {
            let sample = MetricSample::Gauge(aggregate);
            if Self::append(
                &mut self.send_buffer,
                &mut self.packet_sizes,
                &sample,
                &self.options,
            ) {
                lines += 1;
            }
        }
        for aggregate in timings.iter().flatten() {
            for stat in TimingStat::ALL {
                let sample = MetricSample::Timing(aggregate, stat);
                if Self::append(
                    &mut self.send_buffer,
                    &mut self.packet_sizes,
                    &sample,
                    &self.options,
                ) {
                    lines += 1;
                }
            }
        }

        let mut sent = 0usize;
        for (index, &size) in self.packet_sizes.iter().enumerate() {
            if size == 0 {
                continue;
            }
            debug_assert!(size <= PACKET_SIZE_MAX);
            let Some(completion) = self.pool.acquire() else {
                warn!(
                    "completion pool exhausted: dropping {} datagram(s)",
                    self.packet_sizes.len() - index
                );
                break;
            };
            let start = index * PACKET_SIZE_MAX;
            self.transport
                .send(&self.send_buffer[start..start + size], completion, &self.sink);
            sent += 1;
        }
        debug!("emitted {lines} line(s) in {sent} datagram(s)");
        Ok(())
    }

    /// Append one line, sealing the current datagram and opening the next
    /// when the line does not fit the remaining space
    fn append(
        send_buffer: &mut [u8],
        packet_sizes: &mut Vec<usize>,
        sample: &MetricSample<'_>,
        options: &LineOptions,
    ) -> bool {
        if packet_sizes.is_empty() {
            packet_sizes.push(0);
        }
        // Two attempts: the current datagram, then a fresh one.
        for _ in 0..2 {
            let index = packet_sizes.len() - 1;
            let used = packet_sizes[index];
            let start = index * PACKET_SIZE_MAX;
            let region = &mut send_buffer[start + used..start + PACKET_SIZE_MAX];
            let mut out = SliceWriter::new(region);
            match format_metric(&mut out, sample, options) {
                Ok(()) => {
                    packet_sizes[index] = used + out.len();
                    return true;
                }
                Err(_) if used > 0 && packet_sizes.len() < PACKET_COUNT_MAX => {
                    packet_sizes.push(0);
                }
                Err(_) => {
                    warn!("metric line dropped: no space left");
                    return false;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventMetric, EventMetricAggregate, Tree};
    use crate::io::Completion;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingTransport {
        datagrams: Rc<RefCell<Vec<Vec<u8>>>>,
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, datagram: &[u8], completion: Completion, sink: &SendSink) {
            self.datagrams.borrow_mut().push(datagram.to_vec());
            sink.complete(completion, Ok(()));
        }
    }

    #[test]
    fn test_empty_emission_sends_nothing() {
        let datagrams = Rc::new(RefCell::new(Vec::new()));
        let mut statsd = StatsD::with_transport(
            0,
            0,
            Box::new(RecordingTransport {
                datagrams: Rc::clone(&datagrams),
            }),
        );

        statsd.emit(&[None, None], &[None]).unwrap();
        assert!(datagrams.borrow().is_empty());
        assert_eq!(statsd.executing(), 0);
    }

    #[test]
    fn test_single_gauge_single_datagram() {
        let datagrams = Rc::new(RefCell::new(Vec::new()));
        let mut statsd = StatsD::with_transport(
            1,
            7,
            Box::new(RecordingTransport {
                datagrams: Rc::clone(&datagrams),
            }),
        );

        let aggregate = EventMetricAggregate {
            event: EventMetric::CacheHits {
                tree: Tree::AccountId,
            },
            value: 42,
        };
        statsd.emit(&[Some(aggregate)], &[]).unwrap();

        let datagrams = datagrams.borrow();
        assert_eq!(datagrams.len(), 1);
        assert_eq!(
            String::from_utf8(datagrams[0].clone()).unwrap(),
            "tb.cache_hits:42|g|#cluster:00000000000000000000000000000001,replica:7,tree:Account.id\n"
        );
    }
}
