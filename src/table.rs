use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::buffer::BufferManager;
use crate::index::IndexReader;
use crate::segment::SegmentEntry;
use crate::types::{ColumnId, SegmentId, TxnTimestamp, ROWID_COLUMN_ID};
use crate::value::LogicalType;

/// One segment as pinned by a query snapshot: the entry plus the number of
/// rows populated when the snapshot was taken.
#[derive(Clone)]
pub struct SegmentSnapshot {
    pub segment: Arc<SegmentEntry>,
    pub row_count: usize,
}

/// A table reference as handed to the filter core by the planner: the
/// segment snapshot taken at query start, the column layout, and whatever
/// secondary indexes exist. Immutable for the query's lifetime.
pub struct BaseTableRef {
    db_name: String,
    table_name: String,
    pub block_index: BTreeMap<SegmentId, SegmentSnapshot>,
    pub column_ids: Vec<ColumnId>,
    pub column_types: Vec<LogicalType>,
    indexes: HashMap<ColumnId, Arc<dyn IndexReader>>,
}

impl BaseTableRef {
    pub fn new(
        db_name: &str,
        table_name: &str,
        column_ids: Vec<ColumnId>,
        column_types: Vec<LogicalType>,
    ) -> BaseTableRef {
        assert_eq!(
            column_ids.len(),
            column_types.len(),
            "table {}.{}: {} column ids vs {} types",
            db_name,
            table_name,
            column_ids.len(),
            column_types.len()
        );
        BaseTableRef {
            db_name: db_name.to_string(),
            table_name: table_name.to_string(),
            block_index: BTreeMap::new(),
            column_ids,
            column_types,
            indexes: HashMap::new(),
        }
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn add_segment(&mut self, snapshot: SegmentSnapshot) {
        self.block_index
            .insert(snapshot.segment.segment_id(), snapshot);
    }

    pub fn add_index(&mut self, column_id: ColumnId, reader: Arc<dyn IndexReader>) {
        self.indexes.insert(column_id, reader);
    }

    pub fn index_reader(&self, column_id: ColumnId) -> Option<Arc<dyn IndexReader>> {
        self.indexes.get(&column_id).cloned()
    }

    /// Position of a column in the block layout the segment builder reads:
    /// the table's columns in declaration order, row-id column last.
    pub fn ordinal_of(&self, column_id: ColumnId) -> Option<usize> {
        if column_id == ROWID_COLUMN_ID {
            return Some(self.column_ids.len());
        }
        self.column_ids.iter().position(|&id| id == column_id)
    }

    pub fn type_of(&self, column_id: ColumnId) -> Option<LogicalType> {
        if column_id == ROWID_COLUMN_ID {
            return Some(LogicalType::RowId);
        }
        self.column_ids
            .iter()
            .position(|&id| id == column_id)
            .map(|pos| self.column_types[pos])
    }

    pub fn has_delete(&self) -> bool {
        self.block_index
            .values()
            .any(|snap| snap.segment.has_delete())
    }
}

/// The filter core's view of the querying transaction: its snapshot
/// timestamp and the handles it reads through.
pub struct Txn {
    begin_ts: TxnTimestamp,
    buffer_mgr: Arc<BufferManager>,
}

impl Txn {
    pub fn new(begin_ts: TxnTimestamp, buffer_mgr: Arc<BufferManager>) -> Txn {
        Txn {
            begin_ts,
            buffer_mgr,
        }
    }

    pub fn begin_ts(&self) -> TxnTimestamp {
        self.begin_ts
    }

    pub fn buffer_mgr(&self) -> &BufferManager {
        &self.buffer_mgr
    }

    /// Whether any delete has ever been committed against the table. The
    /// always-true short circuit keys off this, so it is deliberately
    /// conservative: deletes invisible to this snapshot still count.
    pub fn check_table_has_delete(&self, table: &BaseTableRef) -> bool {
        table.has_delete()
    }
}
