use crate::error::{Result, Status, StatusCode};
use crate::types::{RowID, SegmentId, SegmentOffset};
use crate::value::{LogicalType, Value};

/// Word-packed boolean storage, the compact-bit representation used for
/// boolean columns and null masks.
#[derive(Clone, Debug, PartialEq)]
pub struct CompactBits {
    words: Vec<u64>,
    len: usize,
}

impl CompactBits {
    /// All-false bits of the given length.
    pub fn new(len: usize) -> CompactBits {
        CompactBits {
            words: vec![0u64; (len + 63) / 64],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, i: usize) -> bool {
        assert!(i < self.len, "compact bit {} out of length {}", i, self.len);
        self.words[i / 64] & (1u64 << (i % 64)) != 0
    }

    pub fn set(&mut self, i: usize, v: bool) {
        assert!(i < self.len, "compact bit {} out of length {}", i, self.len);
        if v {
            self.words[i / 64] |= 1u64 << (i % 64);
        } else {
            self.words[i / 64] &= !(1u64 << (i % 64));
        }
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn and(&self, other: &CompactBits) -> CompactBits {
        self.zip_words(other, |a, b| a & b)
    }

    pub fn or(&self, other: &CompactBits) -> CompactBits {
        self.zip_words(other, |a, b| a | b)
    }

    pub fn not(&self) -> CompactBits {
        let mut out = CompactBits {
            words: self.words.iter().map(|w| !w).collect(),
            len: self.len,
        };
        out.mask_tail();
        out
    }

    fn zip_words(&self, other: &CompactBits, f: impl Fn(u64, u64) -> u64) -> CompactBits {
        assert_eq!(
            self.len, other.len,
            "compact bit length mismatch: {} vs {}",
            self.len, other.len
        );
        CompactBits {
            words: self
                .words
                .iter()
                .zip(other.words.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
            len: self.len,
        }
    }

    fn mask_tail(&mut self) {
        let tail = self.len % 64;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
    }
}

/// Typed storage behind a `ColumnVector`. `Unloaded` holds only a length;
/// the reader produces it for columns the caller promised not to touch.
#[derive(Clone, Debug)]
pub enum ColumnData {
    Bool(CompactBits),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Varchar(Vec<String>),
    RowId(Vec<RowID>),
    Unloaded { len: usize },
}

/// One column of a `DataBlock`: typed values plus an optional null mask
/// (set bit = SQL-NULL at that row).
#[derive(Clone, Debug)]
pub struct ColumnVector {
    ty: LogicalType,
    data: ColumnData,
    nulls: Option<CompactBits>,
}

impl ColumnVector {
    pub fn from_values(ty: LogicalType, values: &[Value]) -> Result<ColumnVector> {
        fn mark_null(i: usize, len: usize, nulls: &mut Option<CompactBits>) {
            nulls.get_or_insert_with(|| CompactBits::new(len)).set(i, true);
        }
        let mut nulls: Option<CompactBits> = None;
        let data = match ty {
            LogicalType::Boolean => {
                let mut bits = CompactBits::new(values.len());
                for (i, v) in values.iter().enumerate() {
                    match v {
                        Value::Bool(b) => bits.set(i, *b),
                        Value::Null => mark_null(i, values.len(), &mut nulls),
                        other => return Err(type_error(ty, other)),
                    }
                }
                ColumnData::Bool(bits)
            }
            LogicalType::Integer => {
                let mut out = vec![0i64; values.len()];
                for (i, v) in values.iter().enumerate() {
                    match v {
                        Value::Int(x) => out[i] = *x,
                        Value::Null => mark_null(i, values.len(), &mut nulls),
                        other => return Err(type_error(ty, other)),
                    }
                }
                ColumnData::Int(out)
            }
            LogicalType::Float => {
                let mut out = vec![0f64; values.len()];
                for (i, v) in values.iter().enumerate() {
                    match v {
                        Value::Float(x) => out[i] = *x,
                        Value::Null => mark_null(i, values.len(), &mut nulls),
                        other => return Err(type_error(ty, other)),
                    }
                }
                ColumnData::Float(out)
            }
            LogicalType::Varchar => {
                let mut out = vec![String::new(); values.len()];
                for (i, v) in values.iter().enumerate() {
                    match v {
                        Value::Varchar(s) => out[i] = s.clone(),
                        Value::Null => mark_null(i, values.len(), &mut nulls),
                        other => return Err(type_error(ty, other)),
                    }
                }
                ColumnData::Varchar(out)
            }
            LogicalType::RowId => {
                let mut out = vec![RowID::new(0, 0); values.len()];
                for (i, v) in values.iter().enumerate() {
                    match v {
                        Value::RowId(r) => out[i] = *r,
                        Value::Null => mark_null(i, values.len(), &mut nulls),
                        other => return Err(type_error(ty, other)),
                    }
                }
                ColumnData::RowId(out)
            }
        };
        Ok(ColumnVector { ty, data, nulls })
    }

    /// The synthesized row-identifier column: `row_count` consecutive row ids
    /// starting at `(segment_id, start_offset)`.
    pub fn rowid_run(
        segment_id: SegmentId,
        start_offset: SegmentOffset,
        row_count: usize,
    ) -> ColumnVector {
        let rows = (0..row_count)
            .map(|k| RowID::new(segment_id, start_offset + k as u32))
            .collect();
        ColumnVector {
            ty: LogicalType::RowId,
            data: ColumnData::RowId(rows),
            nulls: None,
        }
    }

    /// A finalized column of declared length whose contents were not loaded.
    /// Reading values from it is a structural error.
    pub fn new_unloaded(ty: LogicalType, len: usize) -> ColumnVector {
        ColumnVector {
            ty,
            data: ColumnData::Unloaded { len },
            nulls: None,
        }
    }

    /// Copies out the first `n` rows.
    pub fn prefix(&self, n: usize) -> ColumnVector {
        assert!(
            n <= self.len(),
            "prefix of {} rows from column of {}",
            n,
            self.len()
        );
        let data = match &self.data {
            ColumnData::Bool(bits) => {
                let mut out = CompactBits::new(n);
                for i in 0..n {
                    out.set(i, bits.get(i));
                }
                ColumnData::Bool(out)
            }
            ColumnData::Int(v) => ColumnData::Int(v[..n].to_vec()),
            ColumnData::Float(v) => ColumnData::Float(v[..n].to_vec()),
            ColumnData::Varchar(v) => ColumnData::Varchar(v[..n].to_vec()),
            ColumnData::RowId(v) => ColumnData::RowId(v[..n].to_vec()),
            ColumnData::Unloaded { .. } => {
                panic!("prefix of a column that was not loaded")
            }
        };
        let nulls = self.nulls.as_ref().map(|bits| {
            let mut out = CompactBits::new(n);
            for i in 0..n {
                out.set(i, bits.get(i));
            }
            out
        });
        ColumnVector {
            ty: self.ty,
            data,
            nulls,
        }
    }

    pub fn logical_type(&self) -> LogicalType {
        self.ty
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Bool(bits) => bits.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Varchar(v) => v.len(),
            ColumnData::RowId(v) => v.len(),
            ColumnData::Unloaded { len } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loaded(&self) -> bool {
        !matches!(self.data, ColumnData::Unloaded { .. })
    }

    pub fn is_null(&self, i: usize) -> bool {
        self.nulls.as_ref().map(|bits| bits.get(i)).unwrap_or(false)
    }

    pub fn get_value(&self, i: usize) -> Value {
        if self.is_null(i) {
            return Value::Null;
        }
        match &self.data {
            ColumnData::Bool(bits) => Value::Bool(bits.get(i)),
            ColumnData::Int(v) => Value::Int(v[i]),
            ColumnData::Float(v) => Value::Float(v[i]),
            ColumnData::Varchar(v) => Value::Varchar(v[i].clone()),
            ColumnData::RowId(v) => Value::RowId(v[i]),
            ColumnData::Unloaded { .. } => {
                panic!("read of row {} from a column that was not loaded", i)
            }
        }
    }
}

fn type_error(ty: LogicalType, v: &Value) -> Status {
    Status::new(
        StatusCode::TypeMismatch,
        &format!("value {:?} in column of type {:?}", v, ty),
    )
}
