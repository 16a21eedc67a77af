use crate::column_vector::ColumnVector;
use crate::value::LogicalType;

/// A column-major batch of rows: one `ColumnVector` per requested column
/// plus a row count. Blocks are reused across reads via `reset`.
#[derive(Clone, Debug)]
pub struct DataBlock {
    pub columns: Vec<ColumnVector>,
    column_types: Vec<LogicalType>,
    row_count: usize,
    finalized: bool,
}

impl DataBlock {
    /// An empty block declaring the column layout. Columns are filled by the
    /// block reader and the block is usable once `finalize` has run.
    pub fn init(column_types: &[LogicalType]) -> DataBlock {
        DataBlock {
            columns: Vec::with_capacity(column_types.len()),
            column_types: column_types.to_vec(),
            row_count: 0,
            finalized: false,
        }
    }

    /// Drops the previous read's columns so the block can be refilled.
    pub fn reset(&mut self) {
        self.columns.clear();
        self.row_count = 0;
        self.finalized = false;
    }

    pub fn column_types(&self) -> &[LogicalType] {
        &self.column_types
    }

    pub fn column_count(&self) -> usize {
        self.column_types.len()
    }

    /// Seals the block after every column has been produced. All columns,
    /// loaded or not, must agree on the row count.
    pub fn finalize(&mut self, row_count: usize) {
        if self.columns.len() != self.column_types.len() {
            panic!(
                "data block finalized with {} of {} columns",
                self.columns.len(),
                self.column_types.len()
            );
        }
        for (i, col) in self.columns.iter().enumerate() {
            if col.len() != row_count {
                panic!(
                    "data block column {} has {} rows, expected {}",
                    i,
                    col.len(),
                    row_count
                );
            }
        }
        self.row_count = row_count;
        self.finalized = true;
    }

    pub fn row_count(&self) -> usize {
        assert!(self.finalized, "row_count of a block that is not finalized");
        self.row_count
    }

    pub fn column(&self, index: usize) -> &ColumnVector {
        match self.columns.get(index) {
            Some(col) => col,
            None => panic!(
                "column index {} out of block layout of {} columns",
                index,
                self.columns.len()
            ),
        }
    }
}
