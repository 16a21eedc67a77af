use crate::buffer::BufferManager;
use crate::column_vector::ColumnVector;
use crate::data_block::DataBlock;
use crate::error::Result;
use crate::segment::BlockEntry;
use crate::types::{ColumnId, BLOCK_CAPACITY, ROWID_COLUMN_ID};

/// Materializes `row_count` rows of a block into `output`, one column per
/// entry of `column_ids`.
///
/// The reserved row-id column is synthesized from the block's position, not
/// loaded. Columns with `column_should_load[i] == false` are finalized at the
/// right length but carry no data; the caller has promised not to read them,
/// which keeps unreferenced columns out of the buffer cache.
pub fn read_data_block(
    output: &mut DataBlock,
    buffer_mgr: &BufferManager,
    row_count: usize,
    block_entry: &BlockEntry,
    column_ids: &[ColumnId],
    column_should_load: &[bool],
) -> Result<()> {
    assert_eq!(
        column_ids.len(),
        output.column_count(),
        "block read of {} columns into a layout of {}",
        column_ids.len(),
        output.column_count()
    );
    output.reset();
    let segment_id = block_entry.segment_id();
    let start_offset = block_entry.block_id() * BLOCK_CAPACITY as u32;
    for (i, &column_id) in column_ids.iter().enumerate() {
        if column_id == ROWID_COLUMN_ID {
            output
                .columns
                .push(ColumnVector::rowid_run(segment_id, start_offset, row_count));
        } else if column_should_load[i] {
            let stored = block_entry.get_const_column_vector(buffer_mgr, column_id)?;
            output.columns.push(stored.prefix(row_count));
        } else {
            let ty = output.column_types()[i];
            output
                .columns
                .push(ColumnVector::new_unloaded(ty, row_count));
        }
    }
    output.finalize(row_count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::buffer::MemBlockStore;
    use crate::summary::SegmentSummary;
    use crate::segment::SegmentEntry;
    use crate::types::RowID;
    use crate::value::{LogicalType, Value};

    fn make_fixture() -> (Arc<BufferManager>, SegmentEntry) {
        let store = Arc::new(MemBlockStore::new());
        // segment 2, block 0: column 0 = [10, 20, 30], column 1 = ['a', 'b', 'c']
        store.put(
            (2, 0, 0),
            ColumnVector::from_values(
                LogicalType::Integer,
                &[Value::Int(10), Value::Int(20), Value::Int(30)],
            )
            .unwrap(),
        );
        store.put(
            (2, 0, 1),
            ColumnVector::from_values(
                LogicalType::Varchar,
                &[
                    Value::Varchar("a".into()),
                    Value::Varchar("b".into()),
                    Value::Varchar("c".into()),
                ],
            )
            .unwrap(),
        );
        let mgr = Arc::new(BufferManager::new(store, 8));
        let seg = SegmentEntry::new(2, 3, SegmentSummary::empty());
        (mgr, seg)
    }

    #[test]
    fn test_read_with_rowid_synthesis() {
        let (mgr, seg) = make_fixture();
        let block_entry = seg.block_iter().next().unwrap();

        let types = [
            LogicalType::Integer,
            LogicalType::Varchar,
            LogicalType::RowId,
        ];
        let mut block = DataBlock::init(&types);
        let column_ids = [0, 1, ROWID_COLUMN_ID];
        // only column 0 is referenced by the predicate
        let should_load = [true, false, false];
        read_data_block(&mut block, &mgr, 3, block_entry, &column_ids, &should_load).unwrap();

        assert_eq!(block.row_count(), 3);
        assert_eq!(block.column(0).get_value(1), Value::Int(20));
        assert!(!block.column(1).is_loaded());
        assert_eq!(block.column(1).len(), 3);
        assert_eq!(block.column(2).get_value(0), Value::RowId(RowID::new(2, 0)));
        assert_eq!(block.column(2).get_value(2), Value::RowId(RowID::new(2, 2)));
    }

    #[test]
    fn test_partial_read() {
        let (mgr, seg) = make_fixture();
        let block_entry = seg.block_iter().next().unwrap();

        let types = [LogicalType::Integer];
        let mut block = DataBlock::init(&types);
        read_data_block(&mut block, &mgr, 2, block_entry, &[0], &[true]).unwrap();
        assert_eq!(block.row_count(), 2);
        assert_eq!(block.column(0).get_value(1), Value::Int(20));
    }

    #[test]
    fn test_unreferenced_columns_stay_out_of_cache() {
        let (mgr, seg) = make_fixture();
        let block_entry = seg.block_iter().next().unwrap();

        let types = [LogicalType::Integer, LogicalType::Varchar];
        let mut block = DataBlock::init(&types);
        read_data_block(&mut block, &mgr, 3, block_entry, &[0, 1], &[true, false]).unwrap();
        assert_eq!(mgr.cached(), 1);
    }
}
