/*!
 * Tracer Façade
 * Per-event spans, gauge and timing aggregation, periodic metric emission
 *
 * All operations run on one logical thread and complete synchronously; the
 * only asynchrony is the transport draining its completions. Start/stop
 * misuse is a caller bug and aborts, matching the state machine each stack
 * slot follows (`Idle --start--> Running --stop/cancel--> Idle`).
 */

mod span;

use span::SpanWriter;
pub use span::TRACE_SPAN_SIZE_MAX;

use crate::core::errors::EmitError;
use crate::core::types::TelemetryResult;
use crate::events::{
    Event, EventMetric, EventMetricAggregate, EventTag, EventTiming, EventTimingAggregate,
    TimingValues, STACK_COUNT,
};
use crate::io::{Clock, MonotonicClock, Transport};
use crate::statsd::StatsD;
use log::debug;
use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

/// Stop log lines switch from microseconds to milliseconds past this
const SLOW_EVENT_THRESHOLD: Duration = Duration::from_millis(5);

/// Destination for emitted metrics
pub enum StatsDConfig {
    /// Format datagram payloads and write them to the logger
    Log,
    /// Send packed datagrams to a StatsD endpoint
    Udp { address: SocketAddr },
    /// Caller-supplied transport (deterministic test harnesses)
    Custom(Box<dyn Transport>),
}

impl Default for StatsDConfig {
    fn default() -> Self {
        StatsDConfig::Log
    }
}

/// Tracer configuration
#[derive(Default)]
pub struct TracerConfig {
    /// Optional Chrome-trace sink. Without one, start/stop still validate
    /// the stack invariants and feed the aggregates.
    pub writer: Option<Box<dyn Write>>,
    pub statsd: StatsDConfig,
    pub cluster: u128,
    pub replica: u8,
}

/// The public surface of the telemetry core
pub struct Tracer {
    replica: u8,
    clock: Box<dyn Clock>,
    time_start: Duration,
    writer: Option<SpanWriter>,
    events_started: Box<[Option<Duration>]>,
    events_metric: Box<[Option<EventMetricAggregate>]>,
    events_timing: Box<[Option<EventTimingAggregate>]>,
    statsd: StatsD,
}

impl Tracer {
    pub fn new(config: TracerConfig) -> TelemetryResult<Self> {
        Self::with_clock(Box::new(MonotonicClock::new()), config)
    }

    pub fn with_clock(clock: Box<dyn Clock>, config: TracerConfig) -> TelemetryResult<Self> {
        let statsd = match config.statsd {
            StatsDConfig::Log => StatsD::log(config.cluster, config.replica),
            StatsDConfig::Udp { address } => StatsD::udp(config.cluster, config.replica, address)?,
            StatsDConfig::Custom(transport) => {
                StatsD::with_transport(config.cluster, config.replica, transport)
            }
        };
        let time_start = clock.monotonic();
        Ok(Self {
            replica: config.replica,
            clock,
            time_start,
            writer: config.writer.map(SpanWriter::new),
            events_started: vec![None; STACK_COUNT as usize].into_boxed_slice(),
            events_metric: vec![None; EventMetric::SLOT_COUNT as usize].into_boxed_slice(),
            events_timing: vec![None; EventTiming::SLOT_COUNT as usize].into_boxed_slice(),
            statsd,
        })
    }

    /// Microseconds since tracer init; the timebase of every span
    pub fn time_us(&self) -> u64 {
        self.clock.monotonic().saturating_sub(self.time_start).as_micros() as u64
    }

    /// Open the event's span. Starting an event whose stack is already
    /// running is a caller bug and aborts.
    pub fn start(&mut self, event: Event) {
        let stack = event.stack();
        assert!(
            self.events_started[stack as usize].is_none(),
            "event already started: {event}"
        );
        let now = self.clock.monotonic();
        self.events_started[stack as usize] = Some(now);
        if let Some(writer) = &mut self.writer {
            let timestamp_us = now.saturating_sub(self.time_start).as_micros() as u64;
            writer.begin(self.replica, stack, timestamp_us, &event);
        }
        debug!("start: {event}");
    }

    /// Close the event's span and fold its duration into the timing
    /// aggregates. Stopping an idle stack is a caller bug and aborts.
    pub fn stop(&mut self, event: Event) {
        let stack = event.stack();
        let Some(started) = self.events_started[stack as usize].take() else {
            panic!("event not started: {event}");
        };
        let now = self.clock.monotonic();
        let duration = now.saturating_sub(started);
        let duration_us = duration.as_micros() as u64;
        self.timing(event.timing(), duration_us);
        if let Some(writer) = &mut self.writer {
            let timestamp_us = now.saturating_sub(self.time_start).as_micros() as u64;
            writer.end(self.replica, stack, timestamp_us);
        }
        if duration >= SLOW_EVENT_THRESHOLD {
            debug!("stop: {event} duration_ms={}", duration.as_millis());
        } else {
            debug!("stop: {event} duration_us={duration_us}");
        }
    }

    /// Close every running span of the tag without touching the timing
    /// aggregates. Safe to call when none is running.
    pub fn cancel(&mut self, tag: EventTag) {
        let base = tag.stack_base();
        let timestamp_us = self.time_us();
        for stack in base..base + tag.stack_limit() {
            if self.events_started[stack as usize].take().is_some() {
                if let Some(writer) = &mut self.writer {
                    writer.end(self.replica, stack, timestamp_us);
                }
                debug!("cancel: {} stack={}", tag.name(), stack);
            }
        }
    }

    /// Record a gauge sample. Last write wins.
    pub fn gauge(&mut self, event: EventMetric, value: u64) {
        self.events_metric[event.slot() as usize] = Some(EventMetricAggregate { event, value });
    }

    /// Fold a duration sample into the timing aggregate table
    pub fn timing(&mut self, event: EventTiming, duration_us: u64) {
        let slot = &mut self.events_timing[event.slot() as usize];
        match slot {
            Some(aggregate) => aggregate.values.record(duration_us),
            None => {
                *slot = Some(EventTimingAggregate {
                    event,
                    values: TimingValues::single(duration_us),
                });
            }
        }
    }

    /// Emit both aggregate tables as StatsD datagrams
    ///
    /// On success both tables reset, so each aggregate spans exactly one
    /// emission window. On Busy (the previous emission has not drained) the
    /// tables are preserved untouched and the caller retries next tick. The
    /// emission itself is traced as a `metrics_emit` span.
    pub fn emit_metrics(&mut self) -> Result<(), EmitError> {
        self.start(Event::MetricsEmit {});
        let result = self.statsd.emit(&self.events_metric, &self.events_timing);
        match result {
            Ok(()) => {
                self.stop(Event::MetricsEmit {});
                self.events_metric.fill(None);
                self.events_timing.fill(None);
            }
            Err(EmitError::Busy) => self.cancel(EventTag::MetricsEmit),
        }
        result
    }

    /// Gauge aggregates of the current emission window, indexed by slot
    pub fn metric_aggregates(&self) -> &[Option<EventMetricAggregate>] {
        &self.events_metric
    }

    /// Timing aggregates of the current emission window, indexed by slot
    pub fn timing_aggregates(&self) -> &[Option<EventTimingAggregate>] {
        &self.events_timing
    }

    /// The underlying emitter, for backpressure and error inspection
    pub fn statsd(&self) -> &StatsD {
        &self.statsd
    }
}

impl Drop for Tracer {
    fn drop(&mut self) {
        if let Some(writer) = &mut self.writer {
            writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CommitStage, Tree};
    use std::cell::Cell;
    use std::rc::Rc;

    struct TestClock {
        now_us: Rc<Cell<u64>>,
    }

    impl Clock for TestClock {
        fn monotonic(&self) -> Duration {
            Duration::from_micros(self.now_us.get())
        }
    }

    fn test_tracer() -> (Tracer, Rc<Cell<u64>>) {
        let now_us = Rc::new(Cell::new(0));
        let clock = TestClock {
            now_us: Rc::clone(&now_us),
        };
        let tracer = Tracer::with_clock(Box::new(clock), TracerConfig::default()).unwrap();
        (tracer, now_us)
    }

    #[test]
    fn test_start_stop_records_timing() {
        let (mut tracer, now_us) = test_tracer();
        let event = Event::ReplicaAofWrite { op: 1 };

        tracer.start(event);
        now_us.set(250);
        tracer.stop(event);

        let slot = event.timing().slot() as usize;
        let aggregate = tracer.timing_aggregates()[slot].unwrap();
        assert_eq!(aggregate.values.duration_min_us, 250);
        assert_eq!(aggregate.values.duration_max_us, 250);
        assert_eq!(aggregate.values.count, 1);
    }

    #[test]
    #[should_panic(expected = "already started")]
    fn test_double_start_aborts() {
        let (mut tracer, _) = test_tracer();
        tracer.start(Event::Checkpoint {});
        tracer.start(Event::Checkpoint {});
    }

    #[test]
    #[should_panic(expected = "not started")]
    fn test_stop_idle_aborts() {
        let (mut tracer, _) = test_tracer();
        tracer.stop(Event::Checkpoint {});
    }

    #[test]
    fn test_stop_matches_stack_not_payload() {
        let (mut tracer, now_us) = test_tracer();
        tracer.start(Event::ReplicaCommit {
            stage: CommitStage::Idle,
            op: 123,
        });
        now_us.set(10);
        // A different op lands on the same stack; the pair is balanced.
        tracer.stop(Event::ReplicaCommit {
            stage: CommitStage::Idle,
            op: 456,
        });
    }

    #[test]
    fn test_cancel_clears_running_spans() {
        let (mut tracer, _) = test_tracer();
        tracer.start(Event::GridRead { iop: 0 });
        tracer.start(Event::GridRead { iop: 3 });

        tracer.cancel(EventTag::GridRead);

        // Cancelled spans leave no timing aggregate and free their stacks.
        let slot = Event::GridRead { iop: 0 }.timing().slot() as usize;
        assert!(tracer.timing_aggregates()[slot].is_none());
        tracer.start(Event::GridRead { iop: 0 });
        tracer.start(Event::GridRead { iop: 3 });
    }

    #[test]
    fn test_cancel_idle_is_noop() {
        let (mut tracer, _) = test_tracer();
        tracer.cancel(EventTag::CompactBeat);
        assert!(tracer.timing_aggregates().iter().all(Option::is_none));
    }

    #[test]
    fn test_gauge_last_write_wins() {
        let (mut tracer, _) = test_tracer();
        let event = EventMetric::CacheHits { tree: Tree::Account };
        tracer.gauge(event, 1);
        tracer.gauge(event, 2);
        let aggregate = tracer.metric_aggregates()[event.slot() as usize].unwrap();
        assert_eq!(aggregate.value, 2);
    }

    #[test]
    fn test_emit_metrics_resets_tables() {
        let (mut tracer, now_us) = test_tracer();
        tracer.gauge(EventMetric::JournalDirty {}, 3);
        tracer.start(Event::Lookup {});
        now_us.set(100);
        tracer.stop(Event::Lookup {});

        tracer.emit_metrics().unwrap();

        assert!(tracer.metric_aggregates().iter().all(Option::is_none));
        assert!(tracer.timing_aggregates().iter().all(Option::is_none));
    }
}
