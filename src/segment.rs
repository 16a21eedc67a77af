use std::collections::BTreeMap;
use std::sync::Arc;

use crate::bitmask::Bitmask;
use crate::buffer::BufferManager;
use crate::column_vector::ColumnVector;
use crate::error::Result;
use crate::summary::SegmentSummary;
use crate::types::{BlockId, ColumnId, SegmentId, SegmentOffset, TxnTimestamp, BLOCK_CAPACITY};

/// One block of a segment: the unit of I/O. Row `k` of this block is segment
/// offset `block_id * BLOCK_CAPACITY + k`; the block reader relies on that.
#[derive(Clone, Debug)]
pub struct BlockEntry {
    segment_id: SegmentId,
    block_id: BlockId,
    row_count: usize,
}

impl BlockEntry {
    pub fn segment_id(&self) -> SegmentId {
        self.segment_id
    }

    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Pins the stored, immutable column vector of this block.
    pub fn get_const_column_vector(
        &self,
        buffer_mgr: &BufferManager,
        column_id: ColumnId,
    ) -> Result<Arc<ColumnVector>> {
        buffer_mgr.pin((self.segment_id, self.block_id, column_id))
    }
}

/// A segment: up to `SEGMENT_CAPACITY` rows partitioned into blocks, plus
/// the summary the coarse filter probes and the delete log the visibility
/// pass consults. Immutable while queries run against it.
pub struct SegmentEntry {
    segment_id: SegmentId,
    row_count: usize,
    blocks: Vec<BlockEntry>,
    summary: SegmentSummary,
    // commit timestamp -> offsets deleted at that timestamp
    delete_log: BTreeMap<TxnTimestamp, Vec<SegmentOffset>>,
}

impl SegmentEntry {
    /// A segment of `row_count` populated rows. Blocks are full except the
    /// last one.
    pub fn new(segment_id: SegmentId, row_count: usize, summary: SegmentSummary) -> SegmentEntry {
        assert!(
            row_count <= crate::types::SEGMENT_CAPACITY,
            "segment {} over capacity: {} rows",
            segment_id,
            row_count
        );
        let mut blocks = Vec::new();
        let mut remaining = row_count;
        let mut block_id = 0;
        while remaining > 0 {
            let n = remaining.min(BLOCK_CAPACITY);
            blocks.push(BlockEntry {
                segment_id,
                block_id,
                row_count: n,
            });
            remaining -= n;
            block_id += 1;
        }
        SegmentEntry {
            segment_id,
            row_count,
            blocks,
            summary,
            delete_log: BTreeMap::new(),
        }
    }

    pub fn segment_id(&self) -> SegmentId {
        self.segment_id
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn get_fast_rough_filter(&self) -> &SegmentSummary {
        &self.summary
    }

    pub fn block_iter(&self) -> BlockEntryIter {
        BlockEntryIter {
            blocks: &self.blocks,
            ix: 0,
        }
    }

    /// Records rows deleted by a transaction that committed at `ts`.
    pub fn delete_rows(&mut self, ts: TxnTimestamp, offsets: &[SegmentOffset]) {
        self.delete_log.entry(ts).or_default().extend_from_slice(offsets);
    }

    pub fn has_delete(&self) -> bool {
        !self.delete_log.is_empty()
    }

    pub fn first_delete_ts(&self) -> Option<TxnTimestamp> {
        self.delete_log.keys().next().copied()
    }

    /// Clears from `result` every row deleted at or before `ts`. Deletion is
    /// monotone over timestamps, so a segment whose earliest delete is newer
    /// than `ts` skips the scan entirely.
    pub fn check_rows_visible(&self, result: &mut Bitmask, ts: TxnTimestamp) {
        match self.first_delete_ts() {
            None => return,
            Some(first) if first > ts => return,
            Some(_) => {}
        }
        for offsets in self.delete_log.range(..=ts).map(|(_, v)| v) {
            for &off in offsets {
                // rows past the snapshot's populated count are invisible anyway
                if off < result.count() {
                    result.set_false(off);
                }
            }
        }
    }
}

/// Stateful forward iterator over a segment's blocks, in ascending block
/// order.
pub struct BlockEntryIter<'a> {
    blocks: &'a [BlockEntry],
    ix: usize,
}

impl<'a> Iterator for BlockEntryIter<'a> {
    type Item = &'a BlockEntry;

    fn next(&mut self) -> Option<&'a BlockEntry> {
        if self.ix == self.blocks.len() {
            None
        } else {
            self.ix += 1;
            Some(&self.blocks[self.ix - 1])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::SegmentSummary;

    fn make_segment(row_count: usize) -> SegmentEntry {
        SegmentEntry::new(0, row_count, SegmentSummary::empty())
    }

    #[test]
    fn test_block_partitioning() {
        let seg = make_segment(2 * BLOCK_CAPACITY + 10);
        let blocks: Vec<&BlockEntry> = seg.block_iter().collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].row_count(), BLOCK_CAPACITY);
        assert_eq!(blocks[1].row_count(), BLOCK_CAPACITY);
        assert_eq!(blocks[2].row_count(), 10);
        assert_eq!(blocks[2].block_id(), 2);
    }

    #[test]
    fn test_empty_segment_has_no_blocks() {
        let seg = make_segment(0);
        assert_eq!(seg.block_iter().count(), 0);
    }

    #[test]
    fn test_check_rows_visible() {
        let mut seg = make_segment(10);
        seg.delete_rows(5, &[1, 3]);
        seg.delete_rows(9, &[5]);

        let mut mask = Bitmask::all_true(10);
        seg.check_rows_visible(&mut mask, 7);
        assert!(!mask.is_true(1));
        assert!(!mask.is_true(3));
        // deleted after ts 7, still visible
        assert!(mask.is_true(5));
        assert_eq!(mask.count_true(), 8);

        let mut mask = Bitmask::all_true(10);
        seg.check_rows_visible(&mut mask, 9);
        assert_eq!(mask.count_true(), 7);
    }

    #[test]
    fn test_clean_segment_skips_scan() {
        let seg = make_segment(4);
        assert!(!seg.has_delete());
        let mut mask = Bitmask::all_true(4);
        seg.check_rows_visible(&mut mask, 100);
        assert_eq!(mask.count_true(), 4);
    }

    #[test]
    fn test_deletes_newer_than_snapshot_are_invisible() {
        let mut seg = make_segment(4);
        seg.delete_rows(50, &[0, 1, 2, 3]);
        let mut mask = Bitmask::all_true(4);
        seg.check_rows_visible(&mut mask, 49);
        assert_eq!(mask.count_true(), 4);
        assert_eq!(seg.first_delete_ts(), Some(50));
    }
}
