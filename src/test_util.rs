//! Fixture tables for the module tests: in-memory storage, summaries,
//! postings and delete logs assembled from plain value lists.

use std::collections::HashMap;
use std::sync::Arc;

use crate::buffer::{BufferManager, MemBlockStore};
use crate::column_vector::ColumnVector;
use crate::index::SortedIndex;
use crate::query_filter::QueryFilter;
use crate::segment::SegmentEntry;
use crate::summary::{ColumnSummary, SegmentSummary};
use crate::table::{BaseTableRef, SegmentSnapshot, Txn};
use crate::types::{ColumnId, SegmentId, SegmentOffset, TxnTimestamp, BLOCK_CAPACITY};
use crate::value::{LogicalType, Value};

const SUMMARY_BITS_PER_KEY: usize = 10;

pub struct FixtureTable {
    pub table: Arc<BaseTableRef>,
    pub txn: Arc<Txn>,
    pub buffer_mgr: Arc<BufferManager>,
}

struct SegmentSpec {
    columns: Vec<Vec<Value>>,
    deletes: Vec<(TxnTimestamp, Vec<SegmentOffset>)>,
}

/// Declarative fixture: columns, per-segment values, indexes and deletes.
/// Summaries are stamped at ts 1 and the querying transaction begins at
/// ts 100 unless overridden.
pub struct TableSpec {
    column_ids: Vec<ColumnId>,
    column_types: Vec<LogicalType>,
    indexed_columns: Vec<ColumnId>,
    segments: Vec<SegmentSpec>,
    begin_ts: TxnTimestamp,
    summary_ts: TxnTimestamp,
}

impl TableSpec {
    pub fn new(column_ids: &[ColumnId], column_types: &[LogicalType]) -> TableSpec {
        assert_eq!(column_ids.len(), column_types.len());
        TableSpec {
            column_ids: column_ids.to_vec(),
            column_types: column_types.to_vec(),
            indexed_columns: Vec::new(),
            segments: Vec::new(),
            begin_ts: 100,
            summary_ts: 1,
        }
    }

    pub fn index_on(mut self, column_id: ColumnId) -> TableSpec {
        self.indexed_columns.push(column_id);
        self
    }

    /// Adds a segment; one value list per table column, equal lengths.
    pub fn segment(mut self, columns: Vec<Vec<Value>>) -> TableSpec {
        assert_eq!(columns.len(), self.column_ids.len());
        if let Some(first) = columns.first() {
            assert!(columns.iter().all(|c| c.len() == first.len()));
        }
        self.segments.push(SegmentSpec {
            columns,
            deletes: Vec::new(),
        });
        self
    }

    /// Records deletes against the most recently added segment.
    pub fn delete(mut self, ts: TxnTimestamp, offsets: &[SegmentOffset]) -> TableSpec {
        self.segments
            .last_mut()
            .expect("delete before any segment")
            .deletes
            .push((ts, offsets.to_vec()));
        self
    }

    pub fn begin_ts(mut self, ts: TxnTimestamp) -> TableSpec {
        self.begin_ts = ts;
        self
    }

    pub fn summary_ts(mut self, ts: TxnTimestamp) -> TableSpec {
        self.summary_ts = ts;
        self
    }

    pub fn build(self) -> FixtureTable {
        let store = Arc::new(MemBlockStore::new());
        let mut table = BaseTableRef::new(
            "db1",
            "t1",
            self.column_ids.clone(),
            self.column_types.clone(),
        );

        for (sid, spec) in self.segments.iter().enumerate() {
            let segment_id = sid as SegmentId;
            let row_count = spec.columns.first().map(|c| c.len()).unwrap_or(0);

            let mut summaries = HashMap::new();
            for (ci, values) in spec.columns.iter().enumerate() {
                summaries.insert(
                    self.column_ids[ci],
                    ColumnSummary::build(values, SUMMARY_BITS_PER_KEY),
                );
            }
            let summary = SegmentSummary::new(self.summary_ts, summaries);

            let mut segment = SegmentEntry::new(segment_id, row_count, summary);
            for (ts, offsets) in &spec.deletes {
                segment.delete_rows(*ts, offsets);
            }

            for (ci, values) in spec.columns.iter().enumerate() {
                for (block_id, chunk) in values.chunks(BLOCK_CAPACITY).enumerate() {
                    let column =
                        ColumnVector::from_values(self.column_types[ci], chunk).unwrap();
                    store.put((segment_id, block_id as u32, self.column_ids[ci]), column);
                }
            }

            table.add_segment(SegmentSnapshot {
                segment: Arc::new(segment),
                row_count,
            });
        }

        for &column_id in &self.indexed_columns {
            let ci = self
                .column_ids
                .iter()
                .position(|&id| id == column_id)
                .expect("index on unknown column");
            let per_segment: Vec<(SegmentId, &[Value])> = self
                .segments
                .iter()
                .enumerate()
                .map(|(sid, spec)| (sid as SegmentId, spec.columns[ci].as_slice()))
                .collect();
            table.add_index(column_id, Arc::new(SortedIndex::build(&per_segment)));
        }

        let buffer_mgr = Arc::new(BufferManager::new(store, 64));
        let txn = Arc::new(Txn::new(self.begin_ts, buffer_mgr.clone()));
        FixtureTable {
            table: Arc::new(table),
            txn,
            buffer_mgr,
        }
    }
}

pub fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|&v| Value::Int(v)).collect()
}

pub fn opt_ints(values: &[Option<i64>]) -> Vec<Value> {
    values
        .iter()
        .map(|v| v.map(Value::Int).unwrap_or(Value::Null))
        .collect()
}

/// Runs the whole construction protocol on the calling thread: both
/// optimizers, every task in order, then the completion barrier.
pub fn run_build(filter: &mut QueryFilter) {
    filter.try_apply_coarse_filter_optimizer();
    filter.try_apply_index_filter_optimizer().unwrap();
    for task_id in 0..filter.total_task_num() {
        filter.build_filter(task_id).unwrap();
    }
    filter.finish_build();
}
