use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use log::debug;

use crate::bitmask::{Bitmask, BitmaskIter};
use crate::block_reader::read_data_block;
use crate::data_block::DataBlock;
use crate::decompose::{push_down_to_coarse, push_down_to_index_scan};
use crate::error::Result;
use crate::eval::{evaluate, BoolColumn};
use crate::expression::{collect_used_columns, Expr};
use crate::index::IndexEvaluator;
use crate::summary::CoarseEvaluator;
use crate::table::{BaseTableRef, Txn};
use crate::types::{RowID, SegmentId, INVALID_ROWID, INVALID_SEGMENT_ID, ROWID_COLUMN_ID};
use crate::value::LogicalType;

/// Clears, for each of the first `count` rows whose evaluation came out
/// false or SQL-NULL, the corresponding bit of `result` at `offset` plus the
/// row's position. NULL does not match a top-level predicate.
fn merge_false_into_bitmask(
    bools: &BoolColumn,
    count: usize,
    result: &mut Bitmask,
    offset: usize,
) {
    for row in 0..count {
        match bools.row(row) {
            Some(true) => {}
            Some(false) | None => result.set_false((offset + row) as u32),
        }
    }
}

/// The published outcome of filter construction: one bitmask per segment
/// with at least one surviving row, plus the total survivor count. Immutable
/// once readers can see it.
#[derive(Debug, Default, PartialEq)]
pub struct FilterResult {
    map: BTreeMap<SegmentId, Bitmask>,
    count: u64,
}

impl FilterResult {
    pub fn segment(&self, segment_id: SegmentId) -> Option<&Bitmask> {
        self.map.get(&segment_id)
    }

    /// The first surviving segment with id at or after `segment_id`.
    pub fn first_segment_at_or_after(
        &self,
        segment_id: SegmentId,
    ) -> Option<(SegmentId, &Bitmask)> {
        self.map
            .range(segment_id..)
            .next()
            .map(|(&id, mask)| (id, mask))
    }

    pub fn segment_ids(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.map.keys().copied()
    }

    pub fn count_true(&self) -> u64 {
        self.count
    }
}

#[derive(Default)]
struct Pending {
    map: BTreeMap<SegmentId, Bitmask>,
    count: u64,
}

/// Query-time row filter over one table snapshot.
///
/// Lifecycle: construct, apply the two push-down optimizers once each (in
/// order), have a pool run `build_filter` once per task, then raise the
/// completion barrier with `finish_build`. From that point the filter is
/// read-only; any number of `FilterCursor`s may consult it concurrently.
pub struct QueryFilter {
    table: Arc<BaseTableRef>,
    txn: Arc<Txn>,
    original_filter: Option<Expr>,
    tasks: Vec<SegmentId>,
    always_true: bool,

    coarse_evaluator: Option<CoarseEvaluator>,
    index_evaluator: Option<IndexEvaluator>,
    index_filter: Option<Expr>,
    leftover_filter: Option<Expr>,
    finish_build_coarse_filter: bool,
    finish_build_index_filter: bool,

    pending: Mutex<Pending>,
    built: OnceLock<FilterResult>,
    finish_build: AtomicBool,
}

impl QueryFilter {
    /// Snapshots the table's segments into one build task each. A table with
    /// no segments, or an empty filter over a table without deletes, is
    /// complete immediately.
    pub fn new(
        original_filter: Option<Expr>,
        table: Arc<BaseTableRef>,
        txn: Arc<Txn>,
    ) -> QueryFilter {
        let tasks: Vec<SegmentId> = table.block_index.keys().copied().collect();
        let always_true =
            original_filter.is_none() && !txn.check_table_has_delete(&table);
        let filter = QueryFilter {
            table,
            txn,
            original_filter,
            tasks,
            always_true,
            coarse_evaluator: None,
            index_evaluator: None,
            index_filter: None,
            leftover_filter: None,
            finish_build_coarse_filter: false,
            finish_build_index_filter: false,
            pending: Mutex::new(Pending::default()),
            built: OnceLock::new(),
            finish_build: AtomicBool::new(false),
        };
        if filter.always_true || filter.tasks.is_empty() {
            filter.publish();
        }
        filter
    }

    /// Compiles the coarse (summary-statistics) layer from the original
    /// filter. Idempotent; must run before tasks are dispatched.
    pub fn try_apply_coarse_filter_optimizer(&mut self) {
        if self.finish_build_coarse_filter {
            return;
        }
        self.finish_build_coarse_filter = true;
        self.coarse_evaluator = Some(push_down_to_coarse(self.original_filter.as_ref()));
    }

    /// Splits the original filter into the index-answered part and the
    /// leftover. Idempotent; must run after the coarse optimizer and before
    /// tasks are dispatched.
    pub fn try_apply_index_filter_optimizer(&mut self) -> Result<()> {
        if self.finish_build_index_filter {
            return Ok(());
        }
        self.finish_build_index_filter = true;
        let pushed = push_down_to_index_scan(&self.table, self.original_filter.as_ref())?;
        self.index_filter = pushed.index_filter;
        self.leftover_filter = pushed.leftover_filter;
        self.index_evaluator = Some(pushed.index_evaluator);
        Ok(())
    }

    pub fn total_task_num(&self) -> usize {
        self.tasks.len()
    }

    pub fn always_true(&self) -> bool {
        self.always_true
    }

    /// The conjuncts answered by secondary indexes, as split by the index
    /// filter optimizer.
    pub fn index_filter(&self) -> Option<&Expr> {
        self.index_filter.as_ref()
    }

    /// The residual expression evaluated row-wise, or `None` when the index
    /// result is already exact.
    pub fn leftover_filter(&self) -> Option<&Expr> {
        self.leftover_filter.as_ref()
    }

    /// Builds the survival bitmask of one segment. Callable concurrently for
    /// distinct `task_id`s; at most once per task.
    pub fn build_filter(&self, task_id: usize) -> Result<()> {
        let buffer_mgr = self.txn.buffer_mgr();
        let begin_ts = self.txn.begin_ts();
        let segment_id = self.tasks[task_id];
        let snapshot = match self.table.block_index.get(&segment_id) {
            Some(s) => s,
            None => panic!("task {}: segment {} vanished from the snapshot", task_id, segment_id),
        };
        let coarse = self
            .coarse_evaluator
            .as_ref()
            .unwrap_or_else(|| panic!("build_filter before the coarse filter optimizer ran"));
        let index_evaluator = self
            .index_evaluator
            .as_ref()
            .unwrap_or_else(|| panic!("build_filter before the index filter optimizer ran"));

        if !coarse.evaluate(begin_ts, snapshot.segment.get_fast_rough_filter()) {
            debug!("segment {} pruned by summary statistics", segment_id);
            return Ok(());
        }

        let segment_row_count = snapshot.row_count;
        let mut result = index_evaluator.evaluate(segment_id, segment_row_count as u32, &self.txn);
        if result.count_true() == 0 {
            debug!("segment {}: index scan found no candidates", segment_id);
            return Ok(());
        }
        if result.count() as usize != segment_row_count {
            panic!(
                "segment {}: index scan produced a domain of {}, segment has {} rows",
                segment_id,
                result.count(),
                segment_row_count
            );
        }

        if let Some(leftover) = &self.leftover_filter {
            // Block layout: every table column in order, row ids last. Only
            // the columns the leftover actually references get loaded.
            let mut column_ids = self.table.column_ids.clone();
            let mut read_types = self.table.column_types.clone();
            if read_types.last() != Some(&LogicalType::RowId) {
                column_ids.push(ROWID_COLUMN_ID);
                read_types.push(LogicalType::RowId);
            }
            let mut column_should_load = vec![false; column_ids.len()];
            collect_used_columns(leftover, &mut column_should_load);

            let mut block = DataBlock::init(&read_types);
            let mut rows_read = 0usize;
            for block_entry in snapshot.segment.block_iter() {
                if rows_read >= segment_row_count {
                    break;
                }
                let row_count = (segment_row_count - rows_read).min(block_entry.row_count());
                read_data_block(
                    &mut block,
                    buffer_mgr,
                    row_count,
                    block_entry,
                    &column_ids,
                    &column_should_load,
                )?;
                let bools = evaluate(leftover, &block)?;
                merge_false_into_bitmask(&bools, row_count, &mut result, rows_read);
                rows_read += row_count;
            }
            if rows_read != segment_row_count {
                panic!(
                    "segment {}: blocks ran out after {} rows, segment has {}",
                    segment_id, rows_read, segment_row_count
                );
            }
        }

        snapshot.segment.check_rows_visible(&mut result, begin_ts);
        result.run_optimize();

        let result_count = result.count_true();
        if result_count > 0 {
            let mut pending = self.pending.lock()?;
            pending.count += result_count;
            pending.map.insert(segment_id, result);
            debug!("segment {}: {} rows survive the filter", segment_id, result_count);
        } else {
            debug!("segment {}: no surviving rows", segment_id);
        }
        Ok(())
    }

    /// Raises the completion barrier. Call after the last `build_filter`
    /// invocation has returned; readers observe the published result through
    /// an acquire load of the flag.
    pub fn finish_build(&self) {
        self.publish();
    }

    pub fn finished(&self) -> bool {
        self.finish_build.load(Ordering::Acquire)
    }

    /// The published per-segment result. Consulting it before completion is
    /// a structural error.
    pub fn filter_result(&self) -> &FilterResult {
        self.assert_finished()
    }

    /// Opens a cursor over the completed filter. Each reader takes its own;
    /// cursor state is not shared.
    pub fn cursor(&self) -> FilterCursor<'_> {
        let result = self.assert_finished();
        FilterCursor {
            filter: self,
            result,
            current_segment_id: INVALID_SEGMENT_ID,
            current: None,
        }
    }

    fn assert_finished(&self) -> &FilterResult {
        if !self.finished() {
            panic!("query filter consulted before construction finished");
        }
        match self.built.get() {
            Some(result) => result,
            None => panic!("completion flag raised without a published result"),
        }
    }

    fn publish(&self) {
        if self.built.get().is_none() {
            let inner = std::mem::take(&mut *self.pending.lock().unwrap());
            let _ = self.built.set(FilterResult {
                map: inner.map,
                count: inner.count,
            });
        }
        self.finish_build.store(true, Ordering::Release);
    }
}

/// A reader's view into a completed `QueryFilter`: the segment it is
/// positioned on and a forward iterator into that segment's bitmask. Not
/// shared between threads; open one cursor per reader.
pub struct FilterCursor<'a> {
    filter: &'a QueryFilter,
    result: &'a FilterResult,
    current_segment_id: SegmentId,
    current: Option<(&'a Bitmask, BitmaskIter<'a>)>,
}

impl<'a> FilterCursor<'a> {
    /// Whether the row survived the filter.
    pub fn pass_filter(&mut self, row_id: RowID) -> bool {
        if self.filter.always_true {
            return true;
        }
        if row_id.segment_id != self.current_segment_id || self.current.is_none() {
            match self.result.segment(row_id.segment_id) {
                None => {
                    self.current_segment_id = INVALID_SEGMENT_ID;
                    self.current = None;
                    return false;
                }
                Some(mask) => {
                    self.current_segment_id = row_id.segment_id;
                    self.current = Some((mask, mask.iter()));
                }
            }
        }
        let (mask, _) = self.current.as_ref().unwrap();
        mask.is_true(row_id.segment_offset)
    }

    /// The smallest surviving row id `>= row_id`, or `INVALID_ROWID`. Calls
    /// with non-decreasing arguments advance in amortized sub-linear time,
    /// which is what skip-scanning scorers rely on.
    pub fn equal_or_larger(&mut self, mut row_id: RowID) -> RowID {
        if self.filter.always_true {
            return row_id;
        }
        loop {
            if row_id.segment_id != self.current_segment_id || self.current.is_none() {
                match self.result.first_segment_at_or_after(row_id.segment_id) {
                    None => {
                        self.current_segment_id = INVALID_SEGMENT_ID;
                        self.current = None;
                        return INVALID_ROWID;
                    }
                    Some((segment_id, mask)) => {
                        if segment_id != row_id.segment_id {
                            row_id = RowID::new(segment_id, 0);
                        }
                        self.current_segment_id = segment_id;
                        self.current = Some((mask, mask.iter()));
                    }
                }
            }
            let (_, iter) = self.current.as_mut().unwrap();
            iter.lower_bound(row_id.segment_offset);
            if let Some(offset) = iter.peek() {
                return RowID::new(self.current_segment_id, offset);
            }
            // this segment is exhausted, move to the next one
            row_id = RowID::new(self.current_segment_id + 1, 0);
        }
    }
}
