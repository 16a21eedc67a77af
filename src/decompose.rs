use crate::error::{Result, Status, StatusCode};
use crate::expression::{and_all, split_conjuncts, CompareOp, Expr};
use crate::index::IndexEvaluator;
use crate::summary::CoarseEvaluator;
use crate::table::BaseTableRef;
use crate::types::ColumnId;
use crate::value::Value;

/// Output of the index push-down: the conjuncts a secondary index answers
/// exactly (compiled into `index_evaluator`), and the leftover expression to
/// evaluate row-wise, with every column use rewritten to a block ordinal.
#[derive(Debug)]
pub struct IndexScanPushDown {
    pub index_filter: Option<Expr>,
    pub leftover_filter: Option<Expr>,
    pub index_evaluator: IndexEvaluator,
}

/// Extracts the conjuncts that per-segment summary statistics can answer.
/// The result over-approximates: conjuncts it cannot express are simply not
/// probed, and every extracted conjunct is still evaluated by the exact
/// layers downstream.
pub fn push_down_to_coarse(filter: Option<&Expr>) -> CoarseEvaluator {
    let filter = match filter {
        Some(f) => f,
        None => return CoarseEvaluator::AlwaysTrue,
    };
    let mut probes: Vec<CoarseEvaluator> = split_conjuncts(filter)
        .into_iter()
        .filter_map(coarse_probe)
        .collect();
    match probes.len() {
        0 => CoarseEvaluator::AlwaysTrue,
        1 => probes.pop().unwrap(),
        _ => CoarseEvaluator::And(probes),
    }
}

fn coarse_probe(conjunct: &Expr) -> Option<CoarseEvaluator> {
    match conjunct {
        Expr::Compare { op, left, right } => {
            let (column_id, op, value) = normalize_compare(*op, left, right)?;
            match op {
                CompareOp::Eq => Some(CoarseEvaluator::Equal {
                    column_id,
                    value: value.clone(),
                }),
                // `<>` prunes nothing at min/max granularity
                CompareOp::NotEq => None,
                op => Some(CoarseEvaluator::MinMax {
                    column_id,
                    op,
                    value: value.clone(),
                }),
            }
        }
        Expr::In { left, set } => match left.as_ref() {
            Expr::Column { column_id }
                if !set.is_empty() && set.iter().all(|v| !v.is_null()) =>
            {
                Some(CoarseEvaluator::InSet {
                    column_id: *column_id,
                    values: set.clone(),
                })
            }
            _ => None,
        },
        _ => None,
    }
}

/// Splits the filter into index-eligible conjuncts and the leftover, exact
/// on both sides: a row passes the original filter iff it passes the index
/// result and the leftover. Column references in the leftover are rewritten
/// to ordinals of the block layout (table columns in order, row-id last).
pub fn push_down_to_index_scan(
    table: &BaseTableRef,
    filter: Option<&Expr>,
) -> Result<IndexScanPushDown> {
    let filter = match filter {
        Some(f) => f,
        None => {
            return Ok(IndexScanPushDown {
                index_filter: None,
                leftover_filter: None,
                index_evaluator: IndexEvaluator::AllTrue,
            })
        }
    };

    let mut index_parts: Vec<Expr> = Vec::new();
    let mut leftover_parts: Vec<Expr> = Vec::new();
    let mut probes: Vec<IndexEvaluator> = Vec::new();

    for conjunct in split_conjuncts(filter) {
        match index_probe(table, conjunct) {
            Some(probe) => {
                probes.push(probe);
                index_parts.push(conjunct.clone());
            }
            None => leftover_parts.push(conjunct.clone()),
        }
    }

    let index_evaluator = match probes.len() {
        0 => IndexEvaluator::AllTrue,
        1 => probes.pop().unwrap(),
        _ => IndexEvaluator::And(probes),
    };

    let leftover_filter = match and_all(leftover_parts) {
        Some(expr) => Some(rewrite_column_refs(table, expr)?),
        None => None,
    };

    Ok(IndexScanPushDown {
        index_filter: and_all(index_parts),
        leftover_filter,
        index_evaluator,
    })
}

fn index_probe(table: &BaseTableRef, conjunct: &Expr) -> Option<IndexEvaluator> {
    match conjunct {
        Expr::Compare { op, left, right } => {
            let (column_id, op, value) = normalize_compare(*op, left, right)?;
            if op == CompareOp::NotEq {
                return None;
            }
            let reader = table.index_reader(column_id)?;
            Some(IndexEvaluator::Compare {
                reader,
                column_id,
                op,
                value: value.clone(),
            })
        }
        Expr::In { left, set } => match left.as_ref() {
            Expr::Column { column_id }
                if !set.is_empty() && set.iter().all(|v| !v.is_null()) =>
            {
                let reader = table.index_reader(*column_id)?;
                Some(IndexEvaluator::InSet {
                    reader,
                    column_id: *column_id,
                    values: set.clone(),
                })
            }
            _ => None,
        },
        _ => None,
    }
}

fn normalize_compare<'a>(
    op: CompareOp,
    left: &'a Expr,
    right: &'a Expr,
) -> Option<(ColumnId, CompareOp, &'a Value)> {
    match (left, right) {
        (Expr::Column { column_id }, Expr::Literal(v)) if !v.is_null() => {
            Some((*column_id, op, v))
        }
        (Expr::Literal(v), Expr::Column { column_id }) if !v.is_null() => {
            Some((*column_id, op.flip(), v))
        }
        _ => None,
    }
}

/// Rewrites every base-table column reference into a block ordinal. An
/// unknown column is a typing problem from the surrounding optimizer and
/// propagates as a recoverable error.
fn rewrite_column_refs(table: &BaseTableRef, expr: Expr) -> Result<Expr> {
    Ok(match expr {
        Expr::Column { column_id } => {
            let index = table.ordinal_of(column_id).ok_or_else(|| {
                Status::new(
                    StatusCode::NotFound,
                    &format!(
                        "column {} not in table {}.{}",
                        column_id,
                        table.db_name(),
                        table.table_name()
                    ),
                )
            })?;
            let ty = table.type_of(column_id).unwrap();
            Expr::Ref { index, ty }
        }
        Expr::Ref { .. } | Expr::Literal(_) => expr,
        Expr::Compare { op, left, right } => Expr::Compare {
            op,
            left: Box::new(rewrite_column_refs(table, *left)?),
            right: Box::new(rewrite_column_refs(table, *right)?),
        },
        Expr::And(l, r) => Expr::And(
            Box::new(rewrite_column_refs(table, *l)?),
            Box::new(rewrite_column_refs(table, *r)?),
        ),
        Expr::Or(l, r) => Expr::Or(
            Box::new(rewrite_column_refs(table, *l)?),
            Box::new(rewrite_column_refs(table, *r)?),
        ),
        Expr::Not(inner) => Expr::Not(Box::new(rewrite_column_refs(table, *inner)?)),
        Expr::In { left, set } => Expr::In {
            left: Box::new(rewrite_column_refs(table, *left)?),
            set,
        },
    })
}
