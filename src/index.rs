use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::bitmask::Bitmask;
use crate::expression::CompareOp;
use crate::table::Txn;
use crate::types::{ColumnId, SegmentId, SegmentOffset};
use crate::value::Value;

/// Read access to the secondary index of one column. Implementations answer
/// a comparison against a constant with the exact set of matching offsets of
/// a segment, as a bitmask over `[0, row_count)`.
pub trait IndexReader: Send + Sync {
    fn scan_compare(
        &self,
        segment_id: SegmentId,
        row_count: u32,
        op: CompareOp,
        value: &Value,
    ) -> Bitmask;

    fn scan_in(&self, segment_id: SegmentId, row_count: u32, values: &[Value]) -> Bitmask {
        let mut out = Bitmask::all_false(row_count);
        for v in values {
            out = union(out, self.scan_compare(segment_id, row_count, CompareOp::Eq, v));
        }
        out
    }
}

fn union(a: Bitmask, b: Bitmask) -> Bitmask {
    // set union over equal domains, via the sorted merge of both iterators
    assert_eq!(a.count(), b.count(), "bitmask domain mismatch in union");
    let mut merged: Vec<SegmentOffset> = a.iter().chain(b.iter()).collect();
    merged.sort_unstable();
    merged.dedup();
    Bitmask::from_sorted_positions(a.count(), merged)
}

/// In-memory sorted postings: `(value, offset)` pairs per segment, ordered by
/// value then offset. This is the fixture-grade index the core's tests run
/// against; a disk-backed index plugs in through the same trait.
pub struct SortedIndex {
    segments: HashMap<SegmentId, Vec<(Value, SegmentOffset)>>,
}

impl SortedIndex {
    /// Builds postings from per-segment column values. Null values are not
    /// indexed; a predicate can never select them.
    pub fn build(columns: &[(SegmentId, &[Value])]) -> SortedIndex {
        let mut segments = HashMap::new();
        for (segment_id, values) in columns {
            let mut postings: Vec<(Value, SegmentOffset)> = values
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_null())
                .map(|(off, v)| (v.clone(), off as SegmentOffset))
                .collect();
            postings.sort_by(|(va, oa), (vb, ob)| {
                va.compare_same_type(vb)
                    .unwrap_or(Ordering::Equal)
                    .then(oa.cmp(ob))
            });
            segments.insert(*segment_id, postings);
        }
        SortedIndex { segments }
    }
}

impl IndexReader for SortedIndex {
    fn scan_compare(
        &self,
        segment_id: SegmentId,
        row_count: u32,
        op: CompareOp,
        value: &Value,
    ) -> Bitmask {
        let postings = match self.segments.get(&segment_id) {
            Some(p) => p,
            None => return Bitmask::all_false(row_count),
        };
        let mut offsets: Vec<SegmentOffset> = postings
            .iter()
            .filter(|(v, _)| match v.compare_same_type(value) {
                Ok(ord) => op.matches(ord),
                Err(_) => false,
            })
            .map(|(_, off)| *off)
            .collect();
        offsets.sort_unstable();
        Bitmask::from_sorted_positions(row_count, offsets)
    }
}

/// Compiled index filter: evaluates the index-eligible conjuncts of a query
/// to a segment-local bitmask. `AllTrue` stands in when no conjunct was
/// index-eligible, so the segment builder always has an exact starting mask.
pub enum IndexEvaluator {
    AllTrue,
    Compare {
        reader: Arc<dyn IndexReader>,
        column_id: ColumnId,
        op: CompareOp,
        value: Value,
    },
    InSet {
        reader: Arc<dyn IndexReader>,
        column_id: ColumnId,
        values: Vec<Value>,
    },
    And(Vec<IndexEvaluator>),
}

impl std::fmt::Debug for IndexEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexEvaluator::AllTrue => write!(f, "AllTrue"),
            IndexEvaluator::Compare {
                column_id,
                op,
                value,
                ..
            } => f
                .debug_struct("Compare")
                .field("column_id", column_id)
                .field("op", op)
                .field("value", value)
                .finish(),
            IndexEvaluator::InSet {
                column_id, values, ..
            } => f
                .debug_struct("InSet")
                .field("column_id", column_id)
                .field("values", values)
                .finish(),
            IndexEvaluator::And(children) => f.debug_tuple("And").field(children).finish(),
        }
    }
}

impl IndexEvaluator {
    /// Returns a bitmask of domain exactly `row_count`.
    pub fn evaluate(&self, segment_id: SegmentId, row_count: u32, txn: &Txn) -> Bitmask {
        match self {
            IndexEvaluator::AllTrue => Bitmask::all_true(row_count),
            IndexEvaluator::Compare {
                reader, op, value, ..
            } => reader.scan_compare(segment_id, row_count, *op, value),
            IndexEvaluator::InSet { reader, values, .. } => {
                reader.scan_in(segment_id, row_count, values)
            }
            IndexEvaluator::And(children) => {
                let mut iter = children.iter();
                let mut acc = match iter.next() {
                    Some(first) => first.evaluate(segment_id, row_count, txn),
                    None => return Bitmask::all_true(row_count),
                };
                for child in iter {
                    if acc.count_true() == 0 {
                        break;
                    }
                    acc.merge_and(&child.evaluate(segment_id, row_count, txn));
                }
                acc
            }
        }
    }

    pub fn is_all_true(&self) -> bool {
        matches!(self, IndexEvaluator::AllTrue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferManager, MemBlockStore};
    use crate::table::Txn;

    fn make_index() -> SortedIndex {
        // segment 0: a = [7, 1, 7, 3, 7]; segment 1: a = [2, 2]
        let seg0 = vec![
            Value::Int(7),
            Value::Int(1),
            Value::Int(7),
            Value::Int(3),
            Value::Int(7),
        ];
        let seg1 = vec![Value::Int(2), Value::Int(2)];
        SortedIndex::build(&[(0, &seg0), (1, &seg1)])
    }

    fn make_txn() -> Txn {
        Txn::new(
            100,
            Arc::new(BufferManager::new(Arc::new(MemBlockStore::new()), 16)),
        )
    }

    #[test]
    fn test_scan_eq() {
        let index = make_index();
        let mask = index.scan_compare(0, 5, CompareOp::Eq, &Value::Int(7));
        assert_eq!(mask.count(), 5);
        assert_eq!(mask.iter().collect::<Vec<u32>>(), vec![0, 2, 4]);
    }

    #[test]
    fn test_scan_range() {
        let index = make_index();
        let mask = index.scan_compare(0, 5, CompareOp::LtEq, &Value::Int(3));
        assert_eq!(mask.iter().collect::<Vec<u32>>(), vec![1, 3]);
    }

    #[test]
    fn test_scan_unknown_segment() {
        let index = make_index();
        let mask = index.scan_compare(9, 4, CompareOp::Eq, &Value::Int(7));
        assert_eq!(mask.count(), 4);
        assert_eq!(mask.count_true(), 0);
    }

    #[test]
    fn test_scan_in() {
        let index = make_index();
        let mask = index.scan_in(0, 5, &[Value::Int(1), Value::Int(3)]);
        assert_eq!(mask.iter().collect::<Vec<u32>>(), vec![1, 3]);
    }

    #[test]
    fn test_evaluator_and() {
        let index = Arc::new(make_index());
        let txn = make_txn();
        let eval = IndexEvaluator::And(vec![
            IndexEvaluator::Compare {
                reader: index.clone(),
                column_id: 0,
                op: CompareOp::Eq,
                value: Value::Int(7),
            },
            IndexEvaluator::Compare {
                reader: index.clone(),
                column_id: 0,
                op: CompareOp::Gt,
                value: Value::Int(0),
            },
        ]);
        let mask = eval.evaluate(0, 5, &txn);
        assert_eq!(mask.iter().collect::<Vec<u32>>(), vec![0, 2, 4]);
    }

    #[test]
    fn test_evaluator_all_true_domain() {
        let txn = make_txn();
        let mask = IndexEvaluator::AllTrue.evaluate(3, 17, &txn);
        assert_eq!(mask.count(), 17);
        assert_eq!(mask.count_true(), 17);
    }
}
