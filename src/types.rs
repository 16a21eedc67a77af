use std::fmt;

/// Identifies a segment within a table.
pub type SegmentId = u32;
/// Row position within a segment, in `[0, SEGMENT_CAPACITY)`.
pub type SegmentOffset = u32;
/// Identifies a block within a segment.
pub type BlockId = u32;
/// Identifies a column of the base table.
pub type ColumnId = u32;
/// Commit timestamp of a transaction; reads see everything committed at or
/// before their `begin_ts`.
pub type TxnTimestamp = u64;

/// Number of rows in a full block, the unit of I/O. Power of two.
pub const BLOCK_CAPACITY: usize = 8192;
/// Maximum number of rows in a segment, the unit of parallelism.
pub const SEGMENT_CAPACITY: usize = 1024 * BLOCK_CAPACITY;

/// Sentinel column id requesting the synthesized row-identifier column
/// instead of a stored one.
pub const ROWID_COLUMN_ID: ColumnId = 0xFFFF_FFFF;

pub const INVALID_SEGMENT_ID: SegmentId = 0xFFFF_FFFF;
pub const INVALID_ROWID: RowID = RowID {
    segment_id: INVALID_SEGMENT_ID,
    segment_offset: 0xFFFF_FFFF,
};

/// Identifies a logical row as a `(segment_id, segment_offset)` pair.
///
/// The derived ordering is lexicographic (segment first), which makes row ids
/// monotonic in table scan order. For block `b` of a segment, offset `k`
/// within the block maps to segment offset `b * BLOCK_CAPACITY + k`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowID {
    pub segment_id: SegmentId,
    pub segment_offset: SegmentOffset,
}

impl RowID {
    pub fn new(segment_id: SegmentId, segment_offset: SegmentOffset) -> RowID {
        RowID {
            segment_id,
            segment_offset,
        }
    }

    /// Packs the pair into a single sortable u64.
    pub fn to_u64(self) -> u64 {
        (self.segment_id as u64) << 32 | self.segment_offset as u64
    }

    pub fn from_u64(packed: u64) -> RowID {
        RowID {
            segment_id: (packed >> 32) as u32,
            segment_offset: packed as u32,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.segment_id != INVALID_SEGMENT_ID
    }
}

impl fmt::Display for RowID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.segment_id, self.segment_offset)
    }
}
