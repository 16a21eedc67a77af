//! Query-time row filtering for a columnar table store.
//!
//! A [`QueryFilter`] decomposes a predicate into three layers (segment-skip
//! summary statistics, secondary-index scans, and a row-wise leftover
//! expression), builds one survival [`Bitmask`] per segment in parallel, and
//! exposes a skip cursor so downstream scorers can step over non-matching
//! rows cheaply.

mod bitmask;
mod block_reader;
mod buffer;
mod column_vector;
mod data_block;
mod decompose;
mod error;
mod eval;
mod expression;
mod index;
mod query_filter;
mod segment;
mod summary;
mod table;
#[cfg(test)]
mod test_util;
mod types;
mod value;

pub use bitmask::{Bitmask, BitmaskIter};
pub use block_reader::read_data_block;
pub use buffer::{BlockStore, BufferManager, CacheKey, MemBlockStore};
pub use column_vector::{ColumnData, ColumnVector, CompactBits};
pub use data_block::DataBlock;
pub use decompose::{push_down_to_coarse, push_down_to_index_scan, IndexScanPushDown};
pub use error::{Result, Status, StatusCode};
pub use eval::{evaluate, BoolColumn};
pub use expression::{and_all, collect_used_columns, split_conjuncts, CompareOp, Expr};
pub use index::{IndexEvaluator, IndexReader, SortedIndex};
pub use query_filter::{FilterCursor, FilterResult, QueryFilter};
pub use segment::{BlockEntry, BlockEntryIter, SegmentEntry};
pub use summary::{BloomFilter, CoarseEvaluator, ColumnSummary, SegmentSummary};
pub use table::{BaseTableRef, SegmentSnapshot, Txn};
pub use types::{
    BlockId, ColumnId, RowID, SegmentId, SegmentOffset, TxnTimestamp, BLOCK_CAPACITY,
    INVALID_ROWID, INVALID_SEGMENT_ID, ROWID_COLUMN_ID, SEGMENT_CAPACITY,
};
pub use value::{LogicalType, Value};
