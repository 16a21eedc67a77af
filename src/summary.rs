use std::collections::HashMap;

use integer_encoding::FixedInt;

use crate::expression::CompareOp;
use crate::types::{ColumnId, TxnTimestamp};
use crate::value::Value;

const BLOOM_SEED: u32 = 0xbc9f1d34;

fn bloom_hash(data: &[u8]) -> u32 {
    let m: u32 = 0xc6a4a793;
    let r = 24;
    let mut h = BLOOM_SEED ^ (data.len() as u32).wrapping_mul(m);
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let w = u32::decode_fixed(chunk).unwrap();
        h = h.wrapping_add(w).wrapping_mul(m);
        h ^= h >> 16;
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        if rest.len() >= 3 {
            h = h.wrapping_add((rest[2] as u32) << 16);
        }
        if rest.len() >= 2 {
            h = h.wrapping_add((rest[1] as u32) << 8);
        }
        h = h.wrapping_add(rest[0] as u32);
        h = h.wrapping_mul(m);
        h ^= h >> r;
    }
    h
}

/// Bloom filter over the distinct values of one column in one segment.
/// Probing may report false positives, never false negatives.
pub struct BloomFilter {
    bits: Vec<u8>,
    k: u8,
}

impl BloomFilter {
    pub fn build(keys: &[Vec<u8>], bits_per_key: usize) -> BloomFilter {
        let mut k = (bits_per_key as f64 * 0.69) as usize;
        k = k.clamp(1, 30);

        let mut nbits = keys.len() * bits_per_key;
        if nbits < 64 {
            nbits = 64;
        }
        let nbytes = (nbits + 7) / 8;
        nbits = nbytes * 8;

        let mut bits = vec![0u8; nbytes];
        for key in keys {
            let mut h = bloom_hash(key);
            let delta = h.rotate_right(17);
            for _ in 0..k {
                let pos = (h as usize) % nbits;
                bits[pos / 8] |= 1 << (pos % 8);
                h = h.wrapping_add(delta);
            }
        }
        BloomFilter { bits, k: k as u8 }
    }

    pub fn may_contain(&self, key: &[u8]) -> bool {
        let nbits = self.bits.len() * 8;
        let mut h = bloom_hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..self.k {
            let pos = (h as usize) % nbits;
            if self.bits[pos / 8] & (1 << (pos % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }
}

/// Summary statistics of one column over one segment. `min`/`max` are `Null`
/// when the column holds no non-null values there.
pub struct ColumnSummary {
    pub min: Value,
    pub max: Value,
    bloom: BloomFilter,
}

impl ColumnSummary {
    pub fn build(values: &[Value], bits_per_key: usize) -> ColumnSummary {
        let mut min = Value::Null;
        let mut max = Value::Null;
        let mut keys = Vec::new();
        for v in values {
            if v.is_null() {
                continue;
            }
            let smaller = match &min {
                Value::Null => true,
                m => matches!(
                    v.compare_same_type(m),
                    Ok(std::cmp::Ordering::Less)
                ),
            };
            if smaller {
                min = v.clone();
            }
            let larger = match &max {
                Value::Null => true,
                m => matches!(
                    v.compare_same_type(m),
                    Ok(std::cmp::Ordering::Greater)
                ),
            };
            if larger {
                max = v.clone();
            }
            let mut key = Vec::new();
            v.encode_for_hash(&mut key);
            keys.push(key);
        }
        ColumnSummary {
            min,
            max,
            bloom: BloomFilter::build(&keys, bits_per_key),
        }
    }

    fn may_contain_value(&self, v: &Value) -> bool {
        let mut key = Vec::new();
        v.encode_for_hash(&mut key);
        self.bloom.may_contain(&key)
    }
}

/// Per-segment summary the coarse filter consults: one `ColumnSummary` per
/// summarized column, stamped with the timestamp it was built at.
pub struct SegmentSummary {
    build_ts: TxnTimestamp,
    columns: HashMap<ColumnId, ColumnSummary>,
}

impl SegmentSummary {
    pub fn new(build_ts: TxnTimestamp, columns: HashMap<ColumnId, ColumnSummary>) -> SegmentSummary {
        SegmentSummary { build_ts, columns }
    }

    /// A summary that can prune nothing.
    pub fn empty() -> SegmentSummary {
        SegmentSummary {
            build_ts: 0,
            columns: HashMap::new(),
        }
    }

    pub fn build_ts(&self) -> TxnTimestamp {
        self.build_ts
    }

    pub fn column(&self, id: ColumnId) -> Option<&ColumnSummary> {
        self.columns.get(&id)
    }
}

/// Compiled coarse filter: decides per segment, from summary statistics
/// alone, whether the segment may contain matching rows. It over-approximates
/// at segment granularity and never excludes a segment that holds a match.
pub enum CoarseEvaluator {
    AlwaysTrue,
    And(Vec<CoarseEvaluator>),
    /// Range probe against min/max.
    MinMax {
        column_id: ColumnId,
        op: CompareOp,
        value: Value,
    },
    /// Equality probe: min/max range plus bloom membership.
    Equal { column_id: ColumnId, value: Value },
    /// Membership probe: any value may be present.
    InSet {
        column_id: ColumnId,
        values: Vec<Value>,
    },
}

impl CoarseEvaluator {
    /// `true` means the segment may contain matches. A summary built after
    /// the querying transaction began describes rows the snapshot cannot
    /// see, so it is not trusted for pruning.
    pub fn evaluate(&self, begin_ts: TxnTimestamp, summary: &SegmentSummary) -> bool {
        if summary.build_ts() > begin_ts {
            return true;
        }
        self.eval_node(summary)
    }

    fn eval_node(&self, summary: &SegmentSummary) -> bool {
        match self {
            CoarseEvaluator::AlwaysTrue => true,
            CoarseEvaluator::And(children) => children.iter().all(|c| c.eval_node(summary)),
            CoarseEvaluator::MinMax {
                column_id,
                op,
                value,
            } => match summary.column(*column_id) {
                Some(col) => range_may_match(col, *op, value),
                None => true,
            },
            CoarseEvaluator::Equal { column_id, value } => match summary.column(*column_id) {
                Some(col) => {
                    range_may_match(col, CompareOp::Eq, value) && col.may_contain_value(value)
                }
                None => true,
            },
            CoarseEvaluator::InSet { column_id, values } => match summary.column(*column_id) {
                Some(col) => values.iter().any(|v| {
                    range_may_match(col, CompareOp::Eq, v) && col.may_contain_value(v)
                }),
                None => true,
            },
        }
    }
}

fn range_may_match(col: &ColumnSummary, op: CompareOp, value: &Value) -> bool {
    use std::cmp::Ordering::*;
    if col.min.is_null() || col.max.is_null() {
        // no non-null values in the segment, nothing can match
        return false;
    }
    let min_cmp = match col.min.compare_same_type(value) {
        Ok(ord) => ord,
        Err(_) => return true,
    };
    let max_cmp = match col.max.compare_same_type(value) {
        Ok(ord) => ord,
        Err(_) => return true,
    };
    match op {
        CompareOp::Eq => min_cmp != Greater && max_cmp != Less,
        CompareOp::Lt => min_cmp == Less,
        CompareOp::LtEq => min_cmp != Greater,
        CompareOp::Gt => max_cmp == Greater,
        CompareOp::GtEq => max_cmp != Less,
        CompareOp::NotEq => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_values(range: std::ops::Range<i64>) -> Vec<Value> {
        range.map(Value::Int).collect()
    }

    fn make_summary(values: &[Value]) -> SegmentSummary {
        let mut columns = HashMap::new();
        columns.insert(0, ColumnSummary::build(values, 10));
        SegmentSummary::new(5, columns)
    }

    #[test]
    fn test_bloom_no_false_negatives() {
        let keys: Vec<Vec<u8>> = (0..100i64)
            .map(|i| {
                let mut k = Vec::new();
                Value::Int(i * 3).encode_for_hash(&mut k);
                k
            })
            .collect();
        let bloom = BloomFilter::build(&keys, 10);
        for k in &keys {
            assert!(bloom.may_contain(k));
        }
    }

    #[test]
    fn test_bloom_filters_most_absent_keys() {
        let keys: Vec<Vec<u8>> = (0..200i64)
            .map(|i| {
                let mut k = Vec::new();
                Value::Int(i).encode_for_hash(&mut k);
                k
            })
            .collect();
        let bloom = BloomFilter::build(&keys, 10);
        let mut false_positives = 0;
        for i in 1000..2000i64 {
            let mut k = Vec::new();
            Value::Int(i).encode_for_hash(&mut k);
            if bloom.may_contain(&k) {
                false_positives += 1;
            }
        }
        // ~1% expected at 10 bits/key; leave generous slack
        assert!(false_positives < 100, "{} false positives", false_positives);
    }

    #[test]
    fn test_min_max_pruning() {
        let summary = make_summary(&int_values(10..20));
        let probe = |op, v| {
            CoarseEvaluator::MinMax {
                column_id: 0,
                op,
                value: Value::Int(v),
            }
            .evaluate(100, &summary)
        };
        assert!(!probe(CompareOp::Lt, 10));
        assert!(probe(CompareOp::Lt, 11));
        assert!(!probe(CompareOp::Gt, 19));
        assert!(probe(CompareOp::GtEq, 19));
        assert!(probe(CompareOp::LtEq, 10));
        assert!(!probe(CompareOp::LtEq, 9));
    }

    #[test]
    fn test_equal_probe_uses_range_and_bloom() {
        let summary = make_summary(&[Value::Int(10), Value::Int(12), Value::Int(19)]);
        let eq = |v| {
            CoarseEvaluator::Equal {
                column_id: 0,
                value: Value::Int(v),
            }
            .evaluate(100, &summary)
        };
        assert!(eq(12));
        // out of [10, 19] range: pruned regardless of bloom
        assert!(!eq(42));
    }

    #[test]
    fn test_untrusted_summary_never_prunes() {
        let summary = make_summary(&int_values(10..20));
        let probe = CoarseEvaluator::MinMax {
            column_id: 0,
            op: CompareOp::Lt,
            value: Value::Int(0),
        };
        // summary built at ts 5, query began at ts 3
        assert!(probe.evaluate(3, &summary));
        assert!(!probe.evaluate(5, &summary));
    }

    #[test]
    fn test_all_null_column_prunes() {
        let summary = make_summary(&[Value::Null, Value::Null]);
        let probe = CoarseEvaluator::MinMax {
            column_id: 0,
            op: CompareOp::GtEq,
            value: Value::Int(0),
        };
        assert!(!probe.evaluate(100, &summary));
    }

    #[test]
    fn test_unknown_column_never_prunes() {
        let summary = make_summary(&int_values(0..5));
        let probe = CoarseEvaluator::Equal {
            column_id: 77,
            value: Value::Int(123),
        };
        assert!(probe.evaluate(100, &summary));
    }

    #[test]
    fn test_in_set_probe() {
        let summary = make_summary(&[Value::Int(10), Value::Int(20)]);
        let in_set = |vals: Vec<i64>| {
            CoarseEvaluator::InSet {
                column_id: 0,
                values: vals.into_iter().map(Value::Int).collect(),
            }
            .evaluate(100, &summary)
        };
        assert!(in_set(vec![99, 10]));
        assert!(!in_set(vec![99, 1000]));
    }
}
