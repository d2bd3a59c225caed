/*!
 * Gauge View
 * Gauge identities and their last-write-wins aggregates
 */

use super::Tree;
use std::fmt;

/// Gauge identity: a metric whose latest value is reported each emission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventMetric {
    CacheHits { tree: Tree },
    CacheMisses { tree: Tree },
    TableCountVisible { tree: Tree },
    JournalDirty {},
    JournalFaulty {},
    GridBlocksAcquired {},
}

const TREES: u32 = Tree::COUNT;

impl EventMetric {
    /// Size of the gauge aggregate table
    pub const SLOT_COUNT: u32 = 3 * TREES + 3;

    /// One value per variant; payloads are placeholders. Used to take the
    /// worst case over the catalogue when sizing lines at build time.
    pub(crate) const VARIANTS: [EventMetric; 6] = [
        EventMetric::CacheHits { tree: Tree::Account },
        EventMetric::CacheMisses { tree: Tree::Account },
        EventMetric::TableCountVisible { tree: Tree::Account },
        EventMetric::JournalDirty {},
        EventMetric::JournalFaulty {},
        EventMetric::GridBlocksAcquired {},
    ];

    /// Gauge name as it appears in StatsD lines
    pub const fn name(self) -> &'static str {
        match self {
            EventMetric::CacheHits { .. } => "cache_hits",
            EventMetric::CacheMisses { .. } => "cache_misses",
            EventMetric::TableCountVisible { .. } => "table_count_visible",
            EventMetric::JournalDirty {} => "journal_dirty",
            EventMetric::JournalFaulty {} => "journal_faulty",
            EventMetric::GridBlocksAcquired {} => "grid_blocks_acquired",
        }
    }

    /// Flat index into the gauge aggregate table, `[0, SLOT_COUNT)`
    pub fn slot(&self) -> u32 {
        match *self {
            EventMetric::CacheHits { tree } => tree.index(),
            EventMetric::CacheMisses { tree } => TREES + tree.index(),
            EventMetric::TableCountVisible { tree } => 2 * TREES + tree.index(),
            EventMetric::JournalDirty {} => 3 * TREES,
            EventMetric::JournalFaulty {} => 3 * TREES + 1,
            EventMetric::GridBlocksAcquired {} => 3 * TREES + 2,
        }
    }

    /// Worst-case bytes of the `,field:value` suffix a gauge line of this
    /// variant can carry
    pub(crate) const fn field_bytes_max(self) -> usize {
        match self {
            EventMetric::CacheHits { .. }
            | EventMetric::CacheMisses { .. }
            | EventMetric::TableCountVisible { .. } => ",tree:".len() + Tree::name_bytes_max(),
            EventMetric::JournalDirty {}
            | EventMetric::JournalFaulty {}
            | EventMetric::GridBlocksAcquired {} => 0,
        }
    }

    pub(crate) const fn name_bytes_max() -> usize {
        let mut max = 0;
        let mut i = 0;
        while i < Self::VARIANTS.len() {
            let len = Self::VARIANTS[i].name().len();
            if len > max {
                max = len;
            }
            i += 1;
        }
        max
    }

    /// Append the `,field:value` tags this gauge carries on a StatsD line
    pub(crate) fn write_fields<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        match *self {
            EventMetric::CacheHits { tree }
            | EventMetric::CacheMisses { tree }
            | EventMetric::TableCountVisible { tree } => write!(w, ",tree:{tree}"),
            EventMetric::JournalDirty {}
            | EventMetric::JournalFaulty {}
            | EventMetric::GridBlocksAcquired {} => Ok(()),
        }
    }
}

/// One slot of the gauge aggregate table. Last write wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMetricAggregate {
    pub event: EventMetric,
    pub value: u64,
}
