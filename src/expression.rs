use std::fmt;

use crate::types::ColumnId;
use crate::value::{LogicalType, Value};

/// Comparison operators a predicate may use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    /// The operator with swapped operands: `a op b == b op.flip() a`.
    pub fn flip(self) -> CompareOp {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::NotEq => CompareOp::NotEq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
        }
    }

    pub fn matches(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ord == Equal,
            CompareOp::NotEq => ord != Equal,
            CompareOp::Lt => ord == Less,
            CompareOp::LtEq => ord != Greater,
            CompareOp::Gt => ord == Greater,
            CompareOp::GtEq => ord != Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        };
        f.write_str(s)
    }
}

/// A scalar boolean predicate over table rows, as a plain tree of variants.
///
/// `Column` names a base-table column and only occurs before decomposition;
/// the decomposer rewrites every column use into `Ref`, an ordinal into the
/// block layout the segment builder assembles. The `In` value list is a pure
/// value set; a column cannot appear there by construction.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Base-table column, pre-rewrite.
    Column { column_id: ColumnId },
    /// Block-ordinal column reference, post-rewrite.
    Ref { index: usize, ty: LogicalType },
    Literal(Value),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    In {
        left: Box<Expr>,
        set: Vec<Value>,
    },
}

impl Expr {
    pub fn column(column_id: ColumnId) -> Expr {
        Expr::Column { column_id }
    }

    pub fn literal(v: Value) -> Expr {
        Expr::Literal(v)
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Expr {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Expr {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Expr {
        Expr::Or(Box::new(left), Box::new(right))
    }

    pub fn not(inner: Expr) -> Expr {
        Expr::Not(Box::new(inner))
    }

    pub fn in_set(left: Expr, set: Vec<Value>) -> Expr {
        Expr::In {
            left: Box::new(left),
            set,
        }
    }
}

/// Flattens nested conjunctions into the list of top-level conjuncts.
pub fn split_conjuncts(expr: &Expr) -> Vec<&Expr> {
    let mut out = Vec::new();
    fn walk<'a>(e: &'a Expr, out: &mut Vec<&'a Expr>) {
        match e {
            Expr::And(l, r) => {
                walk(l, out);
                walk(r, out);
            }
            other => out.push(other),
        }
    }
    walk(expr, &mut out);
    out
}

/// Rebuilds a conjunction from conjuncts, preserving order. Returns `None`
/// for an empty list.
pub fn and_all(mut conjuncts: Vec<Expr>) -> Option<Expr> {
    let first = if conjuncts.is_empty() {
        return None;
    } else {
        conjuncts.remove(0)
    };
    Some(conjuncts.into_iter().fold(first, Expr::and))
}

/// Marks, for every block ordinal the expression touches, that the column
/// must be materialized. For `In`, only the left operand is scanned; the
/// value set cannot reference columns. A surviving `Column` here means the
/// decomposer failed to rewrite it, which is a broken invariant.
pub fn collect_used_columns(expr: &Expr, column_should_load: &mut [bool]) {
    match expr {
        Expr::Column { column_id } => {
            panic!(
                "unresolved column {} in a decomposed filter expression",
                column_id
            );
        }
        Expr::Ref { index, .. } => {
            if *index >= column_should_load.len() {
                panic!(
                    "column ordinal {} out of block layout of {} columns",
                    index,
                    column_should_load.len()
                );
            }
            column_should_load[*index] = true;
        }
        Expr::Literal(_) => {}
        Expr::Compare { left, right, .. } => {
            collect_used_columns(left, column_should_load);
            collect_used_columns(right, column_should_load);
        }
        Expr::And(l, r) | Expr::Or(l, r) => {
            collect_used_columns(l, column_should_load);
            collect_used_columns(r, column_should_load);
        }
        Expr::Not(inner) => collect_used_columns(inner, column_should_load),
        Expr::In { left, .. } => collect_used_columns(left, column_should_load),
    }
}
