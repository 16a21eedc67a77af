use std::cmp::Ordering;

use crate::column_vector::{ColumnVector, CompactBits};
use crate::data_block::DataBlock;
use crate::error::{Result, Status, StatusCode};
use crate::expression::Expr;
use crate::value::{LogicalType, Value};

/// Result of evaluating a boolean expression over a block: a compact-bit
/// value column and a null mask of the same length (set bit = SQL-NULL).
///
/// Invariant: a row is never both set in `bits` and set in `nulls`.
#[derive(Clone, Debug)]
pub struct BoolColumn {
    pub bits: CompactBits,
    pub nulls: CompactBits,
    len: usize,
}

impl BoolColumn {
    fn new(len: usize) -> BoolColumn {
        BoolColumn {
            bits: CompactBits::new(len),
            nulls: CompactBits::new(len),
            len,
        }
    }

    fn set_row(&mut self, i: usize, v: Option<bool>) {
        match v {
            Some(b) => self.bits.set(i, b),
            None => self.nulls.set(i, true),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Three-valued truth of a row: `None` is SQL-NULL.
    pub fn row(&self, i: usize) -> Option<bool> {
        if self.nulls.get(i) {
            None
        } else {
            Some(self.bits.get(i))
        }
    }
}

enum Operand<'a> {
    Col(&'a ColumnVector),
    Owned(ColumnVector),
    Const(Value),
}

impl<'a> Operand<'a> {
    fn value_at(&self, i: usize) -> Value {
        match self {
            Operand::Col(c) => c.get_value(i),
            Operand::Owned(c) => c.get_value(i),
            Operand::Const(v) => v.clone(),
        }
    }
}

/// Evaluates a boolean expression tree against a finalized `DataBlock`,
/// using SQL three-valued logic throughout. Column references must already
/// be block ordinals; an unresolved base-table column is a broken invariant
/// and halts. Typing problems surface as `Status` and propagate unchanged.
pub fn evaluate(expr: &Expr, block: &DataBlock) -> Result<BoolColumn> {
    let row_count = block.row_count();
    match expr {
        Expr::Column { column_id } => {
            panic!("unresolved column {} reached the evaluator", column_id)
        }
        Expr::Ref { index, .. } => {
            let col = block.column(*index);
            if col.logical_type() != LogicalType::Boolean {
                return Err(Status::new(
                    StatusCode::TypeMismatch,
                    &format!(
                        "column ordinal {} has type {:?}, expected Boolean",
                        index,
                        col.logical_type()
                    ),
                ));
            }
            let mut out = BoolColumn::new(row_count);
            for i in 0..row_count {
                out.set_row(
                    i,
                    match col.get_value(i) {
                        Value::Null => None,
                        Value::Bool(b) => Some(b),
                        _ => unreachable!(),
                    },
                );
            }
            Ok(out)
        }
        Expr::Literal(v) => {
            let truth = match v {
                Value::Null => None,
                Value::Bool(b) => Some(*b),
                other => {
                    return Err(Status::new(
                        StatusCode::TypeMismatch,
                        &format!("literal {:?} is not a boolean predicate", other),
                    ))
                }
            };
            let mut out = BoolColumn::new(row_count);
            for i in 0..row_count {
                out.set_row(i, truth);
            }
            Ok(out)
        }
        Expr::Compare { op, left, right } => {
            let lhs = eval_operand(left, block)?;
            let rhs = eval_operand(right, block)?;
            let mut out = BoolColumn::new(row_count);
            for i in 0..row_count {
                let lv = lhs.value_at(i);
                let rv = rhs.value_at(i);
                if lv.is_null() || rv.is_null() {
                    out.set_row(i, None);
                } else {
                    let ord = lv.compare_same_type(&rv)?;
                    out.set_row(i, Some(op.matches(ord)));
                }
            }
            Ok(out)
        }
        Expr::And(l, r) => {
            let a = evaluate(l, block)?;
            let b = evaluate(r, block)?;
            // Kleene AND: false dominates null.
            let not_false_a = a.bits.or(&a.nulls);
            let not_false_b = b.bits.or(&b.nulls);
            let bits = a.bits.and(&b.bits);
            let nulls = a.nulls.or(&b.nulls).and(&not_false_a).and(&not_false_b);
            Ok(BoolColumn {
                bits,
                nulls,
                len: row_count,
            })
        }
        Expr::Or(l, r) => {
            let a = evaluate(l, block)?;
            let b = evaluate(r, block)?;
            // Kleene OR: true dominates null.
            let bits = a.bits.or(&b.bits);
            let nulls = a.nulls.or(&b.nulls).and(&bits.not());
            Ok(BoolColumn {
                bits,
                nulls,
                len: row_count,
            })
        }
        Expr::Not(inner) => {
            let a = evaluate(inner, block)?;
            let bits = a.bits.or(&a.nulls).not();
            Ok(BoolColumn {
                bits,
                nulls: a.nulls,
                len: row_count,
            })
        }
        Expr::In { left, set } => {
            let lhs = eval_operand(left, block)?;
            let set_has_null = set.iter().any(Value::is_null);
            let mut out = BoolColumn::new(row_count);
            for i in 0..row_count {
                let lv = lhs.value_at(i);
                if lv.is_null() {
                    out.set_row(i, None);
                    continue;
                }
                let mut found = false;
                for member in set {
                    if member.is_null() {
                        continue;
                    }
                    if lv.compare_same_type(member)? == Ordering::Equal {
                        found = true;
                        break;
                    }
                }
                // no match against a list containing NULL is unknown, not false
                if found {
                    out.set_row(i, Some(true));
                } else if set_has_null {
                    out.set_row(i, None);
                } else {
                    out.set_row(i, Some(false));
                }
            }
            Ok(out)
        }
    }
}

fn eval_operand<'a>(expr: &Expr, block: &'a DataBlock) -> Result<Operand<'a>> {
    match expr {
        Expr::Ref { index, .. } => Ok(Operand::Col(block.column(*index))),
        Expr::Literal(v) => Ok(Operand::Const(v.clone())),
        Expr::Column { column_id } => {
            panic!("unresolved column {} reached the evaluator", column_id)
        }
        // A nested boolean expression used as a comparison operand.
        nested => {
            let b = evaluate(nested, block)?;
            let values: Vec<Value> = (0..b.len())
                .map(|i| match b.row(i) {
                    Some(v) => Value::Bool(v),
                    None => Value::Null,
                })
                .collect();
            Ok(Operand::Owned(ColumnVector::from_values(
                LogicalType::Boolean,
                &values,
            )?))
        }
    }
}
