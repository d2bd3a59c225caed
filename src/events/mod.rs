/*!
 * Event System
 * Closed catalogue of replica events with compile-time stack and slot layout
 *
 * Every observable operation of the replica is one variant of [`Event`].
 * Three views are derived from the catalogue: the tracing view (a unique
 * stack slot per concurrent instance, used as the Chrome-trace `tid`), the
 * timing view ([`EventTiming`], a flat slot into the duration aggregate
 * table), and the gauge view ([`EventMetric`]).
 */

mod metric;
mod timing;

pub use metric::{EventMetric, EventMetricAggregate};
pub use timing::{EventTiming, EventTimingAggregate, TimingValues};

use serde::{Serialize, Serializer};
use std::fmt;

/// LSM tree levels addressable by compaction and scans
pub const LSM_LEVEL_COUNT: u32 = 7;

/// Concurrent grid read IOPs, one event stack each
pub const GRID_IOPS_READ_MAX: u32 = 16;

/// Concurrent grid write IOPs, one event stack each
pub const GRID_IOPS_WRITE_MAX: u32 = 16;

/// Concurrent tree scans, one event stack each
pub const SCANS_MAX: u32 = 6;

/// Concurrent table syncs during state sync
pub const SYNC_TABLES_MAX: u32 = 8;

/// LSM trees of the replica's forest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tree {
    Account,
    AccountId,
    Transfer,
    TransferId,
    TransferPending,
}

impl Tree {
    pub const COUNT: u32 = 5;

    pub const ALL: [Tree; Self::COUNT as usize] = [
        Tree::Account,
        Tree::AccountId,
        Tree::Transfer,
        Tree::TransferId,
        Tree::TransferPending,
    ];

    /// Tree name as it appears in StatsD tags and trace args
    pub const fn name(self) -> &'static str {
        match self {
            Tree::Account => "Account",
            Tree::AccountId => "Account.id",
            Tree::Transfer => "Transfer",
            Tree::TransferId => "Transfer.id",
            Tree::TransferPending => "Transfer.pending",
        }
    }

    pub const fn index(self) -> u32 {
        self as u32
    }

    pub(crate) const fn name_bytes_max() -> usize {
        let mut max = 0;
        let mut i = 0;
        while i < Self::ALL.len() {
            let len = Self::ALL[i].name().len();
            if len > max {
                max = len;
            }
            i += 1;
        }
        max
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Tree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Stages of the commit pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitStage {
    Idle,
    Prefetch,
    Execute,
    Compact,
    Checkpoint,
}

impl CommitStage {
    pub const COUNT: u32 = 5;

    pub const ALL: [CommitStage; Self::COUNT as usize] = [
        CommitStage::Idle,
        CommitStage::Prefetch,
        CommitStage::Execute,
        CommitStage::Compact,
        CommitStage::Checkpoint,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            CommitStage::Idle => "idle",
            CommitStage::Prefetch => "prefetch",
            CommitStage::Execute => "execute",
            CommitStage::Compact => "compact",
            CommitStage::Checkpoint => "checkpoint",
        }
    }

    pub const fn index(self) -> u32 {
        self as u32
    }

    pub(crate) const fn name_bytes_max() -> usize {
        let mut max = 0;
        let mut i = 0;
        while i < Self::ALL.len() {
            let len = Self::ALL[i].name().len();
            if len > max {
                max = len;
            }
            i += 1;
        }
        max
    }
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for CommitStage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Unified event type - all observable replica operations flow through this
///
/// Serialization is untagged: the payload fields alone become the `args`
/// object of the Chrome-trace span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Event {
    ReplicaCommit { stage: CommitStage, op: u64 },
    ReplicaAofWrite { op: u64 },
    ReplicaSyncTable { index: u32 },
    CompactBeat { tree: Tree, level_b: u8 },
    CompactManifest {},
    CompactMutable { tree: Tree },
    GridRead { iop: u32 },
    GridWrite { iop: u32 },
    Checkpoint {},
    Lookup {},
    ScanTree { index: u32 },
    ScanTreeLevel { index: u32, level: u8 },
    MetricsEmit {},
}

/// Fieldless discriminant of [`Event`], used for per-tag stack ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    ReplicaCommit,
    ReplicaAofWrite,
    ReplicaSyncTable,
    CompactBeat,
    CompactManifest,
    CompactMutable,
    GridRead,
    GridWrite,
    Checkpoint,
    Lookup,
    ScanTree,
    ScanTreeLevel,
    MetricsEmit,
}

impl EventTag {
    pub const COUNT: usize = 13;

    pub const ALL: [EventTag; Self::COUNT] = [
        EventTag::ReplicaCommit,
        EventTag::ReplicaAofWrite,
        EventTag::ReplicaSyncTable,
        EventTag::CompactBeat,
        EventTag::CompactManifest,
        EventTag::CompactMutable,
        EventTag::GridRead,
        EventTag::GridWrite,
        EventTag::Checkpoint,
        EventTag::Lookup,
        EventTag::ScanTree,
        EventTag::ScanTreeLevel,
        EventTag::MetricsEmit,
    ];

    /// Tag name as it appears in StatsD lines and the trace `cat` field
    pub const fn name(self) -> &'static str {
        match self {
            EventTag::ReplicaCommit => "replica_commit",
            EventTag::ReplicaAofWrite => "replica_aof_write",
            EventTag::ReplicaSyncTable => "replica_sync_table",
            EventTag::CompactBeat => "compact_beat",
            EventTag::CompactManifest => "compact_manifest",
            EventTag::CompactMutable => "compact_mutable",
            EventTag::GridRead => "grid_read",
            EventTag::GridWrite => "grid_write",
            EventTag::Checkpoint => "checkpoint",
            EventTag::Lookup => "lookup",
            EventTag::ScanTree => "scan_tree",
            EventTag::ScanTreeLevel => "scan_tree_level",
            EventTag::MetricsEmit => "metrics_emit",
        }
    }

    /// Number of stacks reserved for concurrent instances of this tag
    pub const fn stack_limit(self) -> u32 {
        match self {
            EventTag::ReplicaCommit => 1,
            EventTag::ReplicaAofWrite => 1,
            EventTag::ReplicaSyncTable => SYNC_TABLES_MAX,
            EventTag::CompactBeat => Tree::COUNT * LSM_LEVEL_COUNT,
            EventTag::CompactManifest => 1,
            EventTag::CompactMutable => Tree::COUNT,
            EventTag::GridRead => GRID_IOPS_READ_MAX,
            EventTag::GridWrite => GRID_IOPS_WRITE_MAX,
            EventTag::Checkpoint => 1,
            EventTag::Lookup => 1,
            EventTag::ScanTree => SCANS_MAX,
            EventTag::ScanTreeLevel => SCANS_MAX * LSM_LEVEL_COUNT,
            EventTag::MetricsEmit => 1,
        }
    }

    /// First stack of this tag's contiguous range
    pub const fn stack_base(self) -> u32 {
        let mut base = 0;
        let mut i = 0;
        while i < Self::COUNT {
            let tag = Self::ALL[i];
            if tag as u32 == self as u32 {
                return base;
            }
            base += tag.stack_limit();
            i += 1;
        }
        base
    }

    /// Timing slots reserved for this tag: one per combination of its
    /// low-cardinality fields
    pub(crate) const fn timing_slots(self) -> u32 {
        match self {
            EventTag::ReplicaCommit => CommitStage::COUNT,
            EventTag::CompactBeat => Tree::COUNT * LSM_LEVEL_COUNT,
            EventTag::CompactMutable => Tree::COUNT,
            EventTag::ScanTreeLevel => LSM_LEVEL_COUNT,
            _ => 1,
        }
    }

    pub(crate) const fn timing_base(self) -> u32 {
        let mut base = 0;
        let mut i = 0;
        while i < Self::COUNT {
            let tag = Self::ALL[i];
            if tag as u32 == self as u32 {
                return base;
            }
            base += tag.timing_slots();
            i += 1;
        }
        base
    }

    /// Worst-case bytes of the `,field:value` suffix a timing line of this
    /// tag can carry (integers at their widest, enums at their longest name)
    pub(crate) const fn timing_field_bytes_max(self) -> usize {
        match self {
            EventTag::ReplicaCommit => ",stage:".len() + CommitStage::name_bytes_max(),
            EventTag::CompactBeat => {
                ",tree:".len() + Tree::name_bytes_max() + ",level_b:".len() + U8_DIGITS_MAX
            }
            EventTag::CompactMutable => ",tree:".len() + Tree::name_bytes_max(),
            EventTag::ScanTreeLevel => ",level:".len() + U8_DIGITS_MAX,
            _ => 0,
        }
    }

}

/// Decimal digits of u64::MAX
pub(crate) const U64_DIGITS_MAX: usize = 20;

/// Decimal digits of u8::MAX
pub(crate) const U8_DIGITS_MAX: usize = 3;

const fn stack_count() -> u32 {
    let mut count = 0;
    let mut i = 0;
    while i < EventTag::COUNT {
        count += EventTag::ALL[i].stack_limit();
        i += 1;
    }
    count
}

/// Total number of event stacks across all tags
pub const STACK_COUNT: u32 = stack_count();

impl Event {
    pub const fn tag(&self) -> EventTag {
        match self {
            Event::ReplicaCommit { .. } => EventTag::ReplicaCommit,
            Event::ReplicaAofWrite { .. } => EventTag::ReplicaAofWrite,
            Event::ReplicaSyncTable { .. } => EventTag::ReplicaSyncTable,
            Event::CompactBeat { .. } => EventTag::CompactBeat,
            Event::CompactManifest {} => EventTag::CompactManifest,
            Event::CompactMutable { .. } => EventTag::CompactMutable,
            Event::GridRead { .. } => EventTag::GridRead,
            Event::GridWrite { .. } => EventTag::GridWrite,
            Event::Checkpoint {} => EventTag::Checkpoint,
            Event::Lookup {} => EventTag::Lookup,
            Event::ScanTree { .. } => EventTag::ScanTree,
            Event::ScanTreeLevel { .. } => EventTag::ScanTreeLevel,
            Event::MetricsEmit {} => EventTag::MetricsEmit,
        }
    }

    /// Unique stack slot in `[0, STACK_COUNT)` for this event instance
    ///
    /// The slot is the tag's base plus an intra-tag offset derived from the
    /// payload fields that distinguish concurrent instances. Out-of-range
    /// payload values are a caller bug.
    pub fn stack(&self) -> u32 {
        let tag = self.tag();
        let offset = match *self {
            Event::ReplicaSyncTable { index } => index,
            Event::CompactBeat { tree, level_b } => {
                tree.index() * LSM_LEVEL_COUNT + u32::from(level_b)
            }
            Event::CompactMutable { tree } => tree.index(),
            Event::GridRead { iop } => iop,
            Event::GridWrite { iop } => iop,
            Event::ScanTree { index } => index,
            Event::ScanTreeLevel { index, level } => {
                index * LSM_LEVEL_COUNT + u32::from(level)
            }
            _ => 0,
        };
        assert!(
            offset < tag.stack_limit(),
            "event payload out of range: {} offset={} limit={}",
            tag.name(),
            offset,
            tag.stack_limit(),
        );
        tag.stack_base() + offset
    }

    /// Project this event onto its timing view, dropping the
    /// per-instance fields and keeping the low-cardinality ones
    pub fn timing(&self) -> EventTiming {
        match *self {
            Event::ReplicaCommit { stage, .. } => EventTiming::ReplicaCommit { stage },
            Event::ReplicaAofWrite { .. } => EventTiming::ReplicaAofWrite {},
            Event::ReplicaSyncTable { .. } => EventTiming::ReplicaSyncTable {},
            Event::CompactBeat { tree, level_b } => EventTiming::CompactBeat { tree, level_b },
            Event::CompactManifest {} => EventTiming::CompactManifest {},
            Event::CompactMutable { tree } => EventTiming::CompactMutable { tree },
            Event::GridRead { .. } => EventTiming::GridRead {},
            Event::GridWrite { .. } => EventTiming::GridWrite {},
            Event::Checkpoint {} => EventTiming::Checkpoint {},
            Event::Lookup {} => EventTiming::Lookup {},
            Event::ScanTree { .. } => EventTiming::ScanTree {},
            Event::ScanTreeLevel { level, .. } => EventTiming::ScanTreeLevel { level },
            Event::MetricsEmit {} => EventTiming::MetricsEmit {},
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        match *self {
            Event::ReplicaCommit { stage, op } => {
                write!(f, "{} stage={} op={}", tag.name(), stage, op)
            }
            Event::ReplicaAofWrite { op } => write!(f, "{} op={}", tag.name(), op),
            Event::ReplicaSyncTable { index } => write!(f, "{} index={}", tag.name(), index),
            Event::CompactBeat { tree, level_b } => {
                write!(f, "{} tree={} level_b={}", tag.name(), tree, level_b)
            }
            Event::CompactMutable { tree } => write!(f, "{} tree={}", tag.name(), tree),
            Event::GridRead { iop } | Event::GridWrite { iop } => {
                write!(f, "{} iop={}", tag.name(), iop)
            }
            Event::ScanTree { index } => write!(f, "{} index={}", tag.name(), index),
            Event::ScanTreeLevel { index, level } => {
                write!(f, "{} index={} level={}", tag.name(), index, level)
            }
            Event::CompactManifest {}
            | Event::Checkpoint {}
            | Event::Lookup {}
            | Event::MetricsEmit {} => f.write_str(tag.name()),
        }
    }
}

// Payload field names. `cluster` and `replica` are reserved for the tag set
// every StatsD line carries; a payload reusing them is rejected at build time.
const FIELD_NAMES: [&str; 7] = ["stage", "op", "index", "tree", "level_b", "iop", "level"];

pub(crate) const fn str_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

const _: () = {
    let mut i = 0;
    while i < FIELD_NAMES.len() {
        assert!(!str_eq(FIELD_NAMES[i], "cluster"), "payload field name reserved");
        assert!(!str_eq(FIELD_NAMES[i], "replica"), "payload field name reserved");
        i += 1;
    }
};
