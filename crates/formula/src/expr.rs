// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	cmp::Ordering,
	collections::BTreeSet,
	fmt::{Display, Formatter},
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering as AtomicOrdering},
	},
};

use smallvec::SmallVec;
use tabula_type::{Value, compare_numeric_aware, loose_eq};
use tracing::warn;

use crate::{
	EvaluationContext, FormulaError,
	ast::{BinaryOp, UnaryOp},
	function::{AggregateKind, AggregateScope, ScalarFunction, aggregate::ArgRow},
};

/// A formula with every name bound to a column, constant or function.
#[derive(Debug, Clone)]
pub enum Expr {
	Constant(Value),
	Column {
		index: usize,
		name: String,
	},
	Unavailable {
		name: String,
		message: String,
		logged: Arc<AtomicBool>,
	},
	Unary {
		op: UnaryOp,
		operand: Box<Expr>,
	},
	Binary {
		op: BinaryOp,
		left: Box<Expr>,
		right: Box<Expr>,
	},
	Call {
		name: String,
		function: Arc<dyn ScalarFunction>,
		args: Vec<Expr>,
	},
	If {
		condition: Box<Expr>,
		then: Box<Expr>,
		otherwise: Box<Expr>,
	},
	Coalesce(Vec<Expr>),
	Aggregate {
		kind: AggregateKind,
		args: Vec<Expr>,
		scope: Arc<AggregateScope>,
	},
}

impl Expr {
	pub fn evaluate(&self, ctx: &EvaluationContext) -> crate::Result<Value> {
		match self {
			Expr::Constant(v) => Ok(v.clone()),
			Expr::Column {
				index,
				name,
			} => ctx.read(*index, name),
			Expr::Unavailable {
				name,
				message,
				logged,
			} => {
				if !logged.swap(true, AtomicOrdering::Relaxed) {
					warn!(field = %name, "{}", message);
				}
				Err(FormulaError::FieldUnavailable {
					name: name.clone(),
					message: message.clone(),
				})
			}
			Expr::Unary {
				op,
				operand,
			} => unary(*op, operand.evaluate(ctx)?),
			Expr::Binary {
				op: BinaryOp::And,
				left,
				right,
			} => {
				if !left.evaluate(ctx)?.is_true() {
					return Ok(Value::Boolean(false));
				}
				Ok(Value::Boolean(right.evaluate(ctx)?.is_true()))
			}
			Expr::Binary {
				op: BinaryOp::Or,
				left,
				right,
			} => {
				if left.evaluate(ctx)?.is_true() {
					return Ok(Value::Boolean(true));
				}
				Ok(Value::Boolean(right.evaluate(ctx)?.is_true()))
			}
			Expr::Binary {
				op,
				left,
				right,
			} => binary(*op, &left.evaluate(ctx)?, &right.evaluate(ctx)?),
			Expr::Call {
				function,
				args,
				..
			} => {
				let values = args.iter().map(|a| a.evaluate(ctx)).collect::<crate::Result<SmallVec<[Value; 4]>>>()?;
				function.call(&values)
			}
			Expr::If {
				condition,
				then,
				otherwise,
			} => {
				if condition.evaluate(ctx)?.is_true() {
					then.evaluate(ctx)
				} else {
					otherwise.evaluate(ctx)
				}
			}
			Expr::Coalesce(args) => {
				for arg in args {
					let v = arg.evaluate(ctx)?;
					if !v.is_undefined() {
						return Ok(v);
					}
				}
				Ok(Value::Undefined)
			}
			Expr::Aggregate {
				kind,
				args,
				scope,
			} => {
				let outside = || FormulaError::AggregateOutsideGroup {
					name: kind.name().to_string(),
				};
				let group = ctx.row.ok_or_else(outside)?;
				let sources = scope.groups.get(group).ok_or_else(outside)?;

				let mut rows: Vec<ArgRow> = Vec::with_capacity(sources.len());
				for source in sources {
					let source_ctx = EvaluationContext::new(ctx.datasources, scope.source_datasource, scope.source_table)
						.with_row(*source);
					rows.push(args.iter().map(|a| a.evaluate(&source_ctx)).collect::<crate::Result<ArgRow>>()?);
				}
				kind.reduce(&rows)
			}
		}
	}

	/// Whether the value can differ between rows of the same table.
	pub fn is_row_dependent(&self) -> bool {
		match self {
			Expr::Constant(_) => false,
			Expr::Column {
				..
			}
			| Expr::Unavailable {
				..
			}
			| Expr::Aggregate {
				..
			} => true,
			Expr::Unary {
				operand,
				..
			} => operand.is_row_dependent(),
			Expr::Binary {
				left,
				right,
				..
			} => left.is_row_dependent() || right.is_row_dependent(),
			Expr::Call {
				args,
				..
			}
			| Expr::Coalesce(args) => args.iter().any(Expr::is_row_dependent),
			Expr::If {
				condition,
				then,
				otherwise,
			} => condition.is_row_dependent() || then.is_row_dependent() || otherwise.is_row_dependent(),
		}
	}

	pub fn contains_aggregate(&self) -> bool {
		let mut found = false;
		self.walk(&mut |e| found |= matches!(e, Expr::Aggregate { .. }));
		found
	}

	pub fn contains_unavailable(&self) -> bool {
		let mut found = false;
		self.walk(&mut |e| found |= matches!(e, Expr::Unavailable { .. }));
		found
	}

	/// Column indices read directly by this expression. Columns inside
	/// aggregate arguments belong to the ungrouped table and are not included.
	pub fn referenced_columns(&self) -> BTreeSet<usize> {
		let mut columns = BTreeSet::new();
		self.walk(&mut |e| {
			if let Expr::Column {
				index,
				..
			} = e
			{
				columns.insert(*index);
			}
		});
		columns
	}

	/// Splits top-level `and` into its terms.
	pub fn conjuncts(&self) -> Vec<Expr> {
		match self {
			Expr::Binary {
				op: BinaryOp::And,
				left,
				right,
			} => {
				let mut result = left.conjuncts();
				result.extend(right.conjuncts());
				result
			}
			other => vec![other.clone()],
		}
	}

	fn walk(&self, visit: &mut dyn FnMut(&Expr)) {
		visit(self);
		match self {
			Expr::Constant(_)
			| Expr::Column {
				..
			}
			| Expr::Unavailable {
				..
			}
			| Expr::Aggregate {
				..
			} => {}
			Expr::Unary {
				operand,
				..
			} => operand.walk(visit),
			Expr::Binary {
				left,
				right,
				..
			} => {
				left.walk(visit);
				right.walk(visit);
			}
			Expr::Call {
				args,
				..
			}
			| Expr::Coalesce(args) => args.iter().for_each(|a| a.walk(visit)),
			Expr::If {
				condition,
				then,
				otherwise,
			} => {
				condition.walk(visit);
				then.walk(visit);
				otherwise.walk(visit);
			}
		}
	}
}

fn unary(op: UnaryOp, value: Value) -> crate::Result<Value> {
	if value.is_undefined() {
		return Ok(Value::Undefined);
	}
	match op {
		UnaryOp::Not => Ok(Value::Boolean(!value.is_true())),
		UnaryOp::Neg => match value {
			Value::Int8(v) => Ok(v.checked_neg().map(Value::Int8).unwrap_or(Value::Float8(-(v as f64)))),
			other => other
				.as_f64()
				.map(|v| Value::float8(-v))
				.ok_or_else(|| FormulaError::evaluation(format!("cannot negate '{}'", other))),
		},
	}
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> crate::Result<Value> {
	match op {
		BinaryOp::Eq => Ok(Value::Boolean(loose_eq(l, r))),
		BinaryOp::Ne => Ok(Value::Boolean(!loose_eq(l, r))),
		BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
			if l.is_undefined() || r.is_undefined() {
				return Ok(Value::Undefined);
			}
			let ordering = compare_numeric_aware(l, r);
			Ok(Value::Boolean(match op {
				BinaryOp::Lt => ordering == Ordering::Less,
				BinaryOp::Le => ordering != Ordering::Greater,
				BinaryOp::Gt => ordering == Ordering::Greater,
				_ => ordering != Ordering::Less,
			}))
		}
		BinaryOp::And | BinaryOp::Or => Ok(Value::Boolean(match op {
			BinaryOp::And => l.is_true() && r.is_true(),
			_ => l.is_true() || r.is_true(),
		})),
		_ => arithmetic(op, l, r),
	}
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> crate::Result<Value> {
	if l.is_undefined() || r.is_undefined() {
		return Ok(Value::Undefined);
	}

	if op == BinaryOp::Add && (matches!(l, Value::Utf8(_)) || matches!(r, Value::Utf8(_))) {
		return Ok(Value::Utf8(format!("{}{}", l, r)));
	}

	if let (Value::Int8(a), Value::Int8(b)) = (l, r) {
		let exact = match op {
			BinaryOp::Add => a.checked_add(*b),
			BinaryOp::Sub => a.checked_sub(*b),
			BinaryOp::Mul => a.checked_mul(*b),
			BinaryOp::Rem if *b == 0 => return Err(FormulaError::evaluation("division by zero")),
			BinaryOp::Rem => a.checked_rem(*b),
			_ => None,
		};
		if let Some(v) = exact {
			return Ok(Value::Int8(v));
		}
	}

	let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
		return Err(FormulaError::evaluation(format!("cannot apply '{}' to '{}' and '{}'", op, l, r)));
	};
	let result = match op {
		BinaryOp::Add => a + b,
		BinaryOp::Sub => a - b,
		BinaryOp::Mul => a * b,
		BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Err(FormulaError::evaluation("division by zero")),
		BinaryOp::Div => a / b,
		_ => a % b,
	};
	Ok(Value::float8(result))
}

fn write_literal(f: &mut Formatter<'_>, value: &Value) -> std::fmt::Result {
	match value {
		Value::Undefined => f.write_str("null"),
		Value::Utf8(s) => write!(f, "'{}'", s.replace('\'', "''")),
		Value::Geometry(g) => write!(f, "'{}'", g),
		Value::Float8(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{:.1}", v),
		other => Display::fmt(other, f),
	}
}

fn write_args(f: &mut Formatter<'_>, args: &[Expr]) -> std::fmt::Result {
	for (i, arg) in args.iter().enumerate() {
		if i > 0 {
			f.write_str(", ")?;
		}
		Display::fmt(arg, f)?;
	}
	Ok(())
}

/// Renders the expression as formula text that compiles back to it.
impl Display for Expr {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Expr::Constant(v) => write_literal(f, v),
			Expr::Column {
				name,
				..
			}
			| Expr::Unavailable {
				name,
				..
			} => write!(f, "\"{}\"", name.replace('"', "\"\"")),
			Expr::Unary {
				op: UnaryOp::Neg,
				operand,
			} => write!(f, "-({})", operand),
			Expr::Unary {
				op: UnaryOp::Not,
				operand,
			} => write!(f, "not ({})", operand),
			Expr::Binary {
				op,
				left,
				right,
			} => write!(f, "({} {} {})", left, op, right),
			Expr::Call {
				name,
				args,
				..
			} => {
				write!(f, "{}(", name)?;
				write_args(f, args)?;
				f.write_str(")")
			}
			Expr::If {
				condition,
				then,
				otherwise,
			} => write!(f, "if({}, {}, {})", condition, then, otherwise),
			Expr::Coalesce(args) => {
				f.write_str("coalesce(")?;
				write_args(f, args)?;
				f.write_str(")")
			}
			Expr::Aggregate {
				kind,
				args,
				..
			} => {
				write!(f, "{}(", kind)?;
				write_args(f, args)?;
				f.write_str(")")
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_arithmetic() {
		assert_eq!(arithmetic(BinaryOp::Add, &Value::Int8(2), &Value::Int8(3)).unwrap(), Value::Int8(5));
		assert_eq!(arithmetic(BinaryOp::Div, &Value::Int8(7), &Value::Int8(2)).unwrap(), Value::Float8(3.5));
		assert_eq!(arithmetic(BinaryOp::Mul, &Value::Int8(i64::MAX), &Value::Int8(2)).unwrap(), Value::Float8(i64::MAX as f64 * 2.0));
		assert_eq!(arithmetic(BinaryOp::Add, &Value::utf8("a"), &Value::Int8(1)).unwrap(), Value::utf8("a1"));
		assert_eq!(arithmetic(BinaryOp::Sub, &Value::Undefined, &Value::Int8(1)).unwrap(), Value::Undefined);
		assert!(arithmetic(BinaryOp::Div, &Value::Int8(1), &Value::Int8(0)).is_err());
		assert!(arithmetic(BinaryOp::Rem, &Value::Int8(1), &Value::Int8(0)).is_err());
		assert!(arithmetic(BinaryOp::Mul, &Value::utf8("a"), &Value::Int8(1)).is_err());
	}

	#[test]
	fn test_comparison() {
		assert_eq!(binary(BinaryOp::Eq, &Value::Int8(5), &Value::Float8(5.0)).unwrap(), Value::Boolean(true));
		assert_eq!(binary(BinaryOp::Lt, &Value::utf8("9"), &Value::utf8("10")).unwrap(), Value::Boolean(true));
		assert_eq!(binary(BinaryOp::Ge, &Value::Undefined, &Value::Int8(1)).unwrap(), Value::Undefined);
		assert_eq!(binary(BinaryOp::Ne, &Value::Undefined, &Value::Int8(1)).unwrap(), Value::Boolean(true));
	}

	#[test]
	fn test_display() {
		let e = Expr::Binary {
			op: BinaryOp::Eq,
			left: Box::new(Expr::Column {
				index: 0,
				name: "x".into(),
			}),
			right: Box::new(Expr::Constant(Value::utf8("it's"))),
		};
		assert_eq!(e.to_string(), "(\"x\" == 'it''s')");
	}
}
