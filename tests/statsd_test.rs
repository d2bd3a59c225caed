/*!
 * StatsD Integration Tests
 * Datagram packing, line grammar, and emission ordering under full tables
 */

use replica_telemetry::{
    Completion, Event, EventMetric, EventTiming, SendSink, StatsDConfig, TimingStat, Tracer,
    TracerConfig, Transport, Tree, PACKET_COUNT_MAX, PACKET_SIZE_MAX, STATSD_LINE_SIZE_MAX,
};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Default)]
struct RecordingTransport {
    datagrams: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl Transport for RecordingTransport {
    fn send(&mut self, datagram: &[u8], completion: Completion, sink: &SendSink) {
        self.datagrams.borrow_mut().push(datagram.to_vec());
        sink.complete(completion, Ok(()));
    }
}

fn recording_tracer() -> (Tracer, Rc<RefCell<Vec<Vec<u8>>>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let datagrams = Rc::new(RefCell::new(Vec::new()));
    let tracer = Tracer::new(TracerConfig {
        statsd: StatsDConfig::Custom(Box::new(RecordingTransport {
            datagrams: Rc::clone(&datagrams),
        })),
        cluster: 1,
        replica: 2,
        ..TracerConfig::default()
    })
    .unwrap();
    (tracer, datagrams)
}

#[test]
fn test_full_tables_pack_within_bounds() {
    let (mut tracer, datagrams) = recording_tracer();

    for tree in Tree::ALL {
        tracer.gauge(EventMetric::CacheHits { tree }, 10);
        tracer.gauge(EventMetric::CacheMisses { tree }, 20);
        tracer.gauge(EventMetric::TableCountVisible { tree }, 30);
    }
    tracer.gauge(EventMetric::JournalDirty {}, 1);
    tracer.gauge(EventMetric::JournalFaulty {}, 0);
    tracer.gauge(EventMetric::GridBlocksAcquired {}, 512);
    let gauge_count = 18;

    let mut timing_count = 0;
    for tree in Tree::ALL {
        for level_b in 0..7u8 {
            tracer.timing(EventTiming::CompactBeat { tree, level_b }, 100);
            tracer.timing(EventTiming::CompactBeat { tree, level_b }, 300);
            timing_count += 1;
        }
    }

    tracer.emit_metrics().unwrap();

    let datagrams = datagrams.borrow();
    assert!(!datagrams.is_empty());
    assert!(datagrams.len() <= PACKET_COUNT_MAX);

    // Every datagram is a concatenation of whole lines within the budget.
    for datagram in datagrams.iter() {
        assert!(datagram.len() <= PACKET_SIZE_MAX);
        let text = std::str::from_utf8(datagram).unwrap();
        assert!(text.ends_with('\n'));
        for line in text.lines() {
            assert!(line.starts_with("tb."));
            assert!(line.len() < STATSD_LINE_SIZE_MAX);
            assert!(line.contains("|#cluster:00000000000000000000000000000001,replica:2"));
        }
    }

    // Greedy packing: each sealed datagram had no room for the line that
    // opens the next one.
    for window in datagrams.windows(2) {
        let next_line_len = window[1]
            .iter()
            .position(|&byte| byte == b'\n')
            .map(|index| index + 1)
            .unwrap();
        assert!(window[0].len() + next_line_len > PACKET_SIZE_MAX);
    }

    let lines: Vec<String> = datagrams
        .iter()
        .flat_map(|datagram| {
            std::str::from_utf8(datagram)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect();
    assert_eq!(lines.len(), gauge_count + timing_count * TimingStat::COUNT);

    // Gauges precede timings, and each timing aggregate contributes its five
    // statistics in order.
    let first_timing = lines
        .iter()
        .position(|line| line.contains("_us."))
        .unwrap();
    assert_eq!(first_timing, gauge_count);
    for chunk in lines[first_timing..].chunks(TimingStat::COUNT) {
        assert!(chunk[0].contains("_us.min:100|g"));
        assert!(chunk[1].contains("_us.max:300|g"));
        assert!(chunk[2].contains("_us.avg:200|g"));
        assert!(chunk[3].contains("_us.sum:400|c"));
        assert!(chunk[4].contains("_us.count:2|c"));
    }
}

#[test]
fn test_gauge_last_write_wins_on_the_wire() {
    let (mut tracer, datagrams) = recording_tracer();

    let event = EventMetric::GridBlocksAcquired {};
    tracer.gauge(event, 1);
    tracer.gauge(event, 2);
    tracer.emit_metrics().unwrap();

    let datagrams = datagrams.borrow();
    let text = std::str::from_utf8(&datagrams[0]).unwrap();
    let matching: Vec<_> = text
        .lines()
        .filter(|line| line.starts_with("tb.grid_blocks_acquired:"))
        .collect();
    assert_eq!(matching.len(), 1);
    assert!(matching[0].starts_with("tb.grid_blocks_acquired:2|g"));
}

#[test]
fn test_saturated_timing_on_the_wire() {
    let (mut tracer, datagrams) = recording_tracer();

    tracer.timing(EventTiming::ReplicaAofWrite {}, u64::MAX - 1);
    tracer.timing(EventTiming::ReplicaAofWrite {}, u64::MAX - 1);
    tracer.emit_metrics().unwrap();

    let datagrams = datagrams.borrow();
    let text = std::str::from_utf8(&datagrams[0]).unwrap();
    let sum_line = text
        .lines()
        .find(|line| line.starts_with("tb.replica_aof_write_us.sum:"))
        .unwrap();
    assert!(sum_line.starts_with(&format!("tb.replica_aof_write_us.sum:{}|c", u64::MAX)));
    let count_line = text
        .lines()
        .find(|line| line.starts_with("tb.replica_aof_write_us.count:"))
        .unwrap();
    assert!(count_line.starts_with("tb.replica_aof_write_us.count:2|c"));
}

#[test]
fn test_stop_feeds_the_wire_through_aggregation() {
    let (mut tracer, datagrams) = recording_tracer();

    tracer.start(Event::Lookup {});
    tracer.stop(Event::Lookup {});
    tracer.emit_metrics().unwrap();

    let datagrams = datagrams.borrow();
    let text = std::str::from_utf8(&datagrams[0]).unwrap();
    assert!(text
        .lines()
        .any(|line| line.starts_with("tb.lookup_us.count:1|c")));
}
