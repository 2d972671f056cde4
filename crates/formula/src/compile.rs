// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{collections::BTreeSet, sync::Arc};

use tabula_type::Value;
use tracing::instrument;

use crate::{
	EvaluationContext, FormulaError, FunctionLibrary, Resolved, VariableResolver,
	ast::{Ast, BinaryOp},
	expr::Expr,
	function::AggregateKind,
	parser::parse,
};

pub trait Expression: Send + Sync {
	fn evaluate(&self, ctx: &EvaluationContext) -> crate::Result<Value>;

	fn text(&self) -> &str;
}

pub trait Compiler: Send + Sync {
	fn compile(
		&self,
		text: &str,
		resolver: &dyn VariableResolver,
		library: &FunctionLibrary,
	) -> crate::Result<CompiledExpression>;
}

/// Compiles formulas with the bundled parser and evaluator.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardCompiler;

impl Compiler for StandardCompiler {
	#[instrument(name = "formula::compile", level = "trace", skip(self, resolver, library))]
	fn compile(
		&self,
		text: &str,
		resolver: &dyn VariableResolver,
		library: &FunctionLibrary,
	) -> crate::Result<CompiledExpression> {
		let ast = parse(text)?;
		let root = Binder {
			resolver,
			library,
			in_aggregate: false,
		}
		.bind(&ast)?;
		Ok(CompiledExpression {
			text: text.to_string(),
			root: Arc::new(root),
		})
	}
}

struct Binder<'a> {
	resolver: &'a dyn VariableResolver,
	library: &'a FunctionLibrary,
	in_aggregate: bool,
}

impl Binder<'_> {
	fn bind(&self, ast: &Ast) -> crate::Result<Expr> {
		match ast {
			Ast::Literal(v) => Ok(Expr::Constant(v.clone())),
			Ast::Field(name) => self.bind_field(name),
			Ast::Unary {
				op,
				operand,
			} => Ok(Expr::Unary {
				op: *op,
				operand: Box::new(self.bind(operand)?),
			}),
			Ast::Binary {
				op,
				left,
				right,
			} => Ok(Expr::Binary {
				op: *op,
				left: Box::new(self.bind(left)?),
				right: Box::new(self.bind(right)?),
			}),
			Ast::Call {
				name,
				args,
			} => self.bind_call(name, args),
		}
	}

	fn bind_field(&self, name: &str) -> crate::Result<Expr> {
		let resolved = match (self.in_aggregate, self.library.aggregates()) {
			(true, Some(binding)) => binding.resolver.resolve(name),
			_ => self.resolver.resolve(name),
		};
		match resolved {
			Some(Resolved::Column(index)) => Ok(Expr::Column {
				index,
				name: name.to_string(),
			}),
			Some(Resolved::Constant(v)) => Ok(Expr::Constant(v)),
			Some(Resolved::Unavailable {
				message,
				logged,
			}) => Ok(Expr::Unavailable {
				name: name.to_string(),
				message,
				logged,
			}),
			None => Err(FormulaError::UnknownField {
				name: name.to_string(),
			}),
		}
	}

	fn bind_args(&self, args: &[Ast]) -> crate::Result<Vec<Expr>> {
		args.iter().map(|a| self.bind(a)).collect()
	}

	fn bind_call(&self, name: &str, args: &[Ast]) -> crate::Result<Expr> {
		match name.to_ascii_lowercase().as_str() {
			"if" => {
				check_arity(name, (3, Some(3)), args.len())?;
				let mut bound = self.bind_args(args)?.into_iter();
				let (Some(condition), Some(then), Some(otherwise)) = (bound.next(), bound.next(), bound.next())
				else {
					return Err(FormulaError::evaluation("if() expects three arguments"));
				};
				return Ok(Expr::If {
					condition: Box::new(condition),
					then: Box::new(then),
					otherwise: Box::new(otherwise),
				});
			}
			"coalesce" => {
				check_arity(name, (1, None), args.len())?;
				return Ok(Expr::Coalesce(self.bind_args(args)?));
			}
			_ => {}
		}

		if let Some(function) = self.library.scalar(name) {
			check_arity(name, function.arity(), args.len())?;
			return Ok(Expr::Call {
				name: name.to_string(),
				function,
				args: self.bind_args(args)?,
			});
		}

		let Some(kind) = AggregateKind::from_name(name) else {
			return Err(FormulaError::UnknownFunction {
				name: name.to_string(),
			});
		};
		let Some(binding) = self.library.aggregates() else {
			return Err(FormulaError::AggregateOutsideGroup {
				name: name.to_string(),
			});
		};
		if self.in_aggregate {
			return Err(FormulaError::evaluation(format!("aggregate '{}' cannot be nested", name)));
		}
		check_arity(name, kind.arity(), args.len())?;

		let inner = Binder {
			resolver: self.resolver,
			library: self.library,
			in_aggregate: true,
		};
		Ok(Expr::Aggregate {
			kind,
			args: inner.bind_args(args)?,
			scope: binding.scope.clone(),
		})
	}
}

fn check_arity(name: &str, (min, max): (usize, Option<usize>), actual: usize) -> crate::Result<()> {
	if actual >= min && max.is_none_or(|max| actual <= max) {
		return Ok(());
	}
	let expected = match max {
		Some(max) if max == min => format!("{}", min),
		Some(max) => format!("{} to {}", min, max),
		None => format!("at least {}", min),
	};
	Err(FormulaError::Arity {
		name: name.to_string(),
		expected,
		actual,
	})
}

/// `geomContains(geometry, lat, lon)` with both coordinates read straight
/// from columns.
#[derive(Debug, Clone)]
pub struct GeomContains {
	pub geometry: CompiledExpression,
	pub lat: usize,
	pub lon: usize,
}

/// A compiled formula. Cheap to clone; the bound tree is shared.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
	text: String,
	root: Arc<Expr>,
}

impl CompiledExpression {
	pub fn new(root: Expr) -> Self {
		Self {
			text: root.to_string(),
			root: Arc::new(root),
		}
	}

	pub fn constant(value: Value) -> Self {
		Self::new(Expr::Constant(value))
	}

	pub fn root(&self) -> &Expr {
		&self.root
	}

	pub fn evaluate(&self, ctx: &EvaluationContext) -> crate::Result<Value> {
		self.root.evaluate(ctx)
	}

	/// The top-level `and` terms, each as its own expression.
	pub fn conjuncts(&self) -> Vec<CompiledExpression> {
		let terms = self.root.conjuncts();
		if terms.len() == 1 {
			return vec![self.clone()];
		}
		terms.into_iter().map(CompiledExpression::new).collect()
	}

	pub fn is_row_dependent(&self) -> bool {
		self.root.is_row_dependent()
	}

	pub fn referenced_columns(&self) -> BTreeSet<usize> {
		self.root.referenced_columns()
	}

	pub fn contains_aggregate(&self) -> bool {
		self.root.contains_aggregate()
	}

	/// Column index when the formula is nothing but a field reference.
	pub fn as_bare_column(&self) -> Option<usize> {
		match self.root.as_ref() {
			Expr::Column {
				index,
				..
			} => Some(*index),
			_ => None,
		}
	}

	/// `field == constant` in either operand order.
	pub fn as_column_equals_constant(&self) -> Option<(usize, Value)> {
		let Expr::Binary {
			op: BinaryOp::Eq,
			left,
			right,
		} = self.root.as_ref()
		else {
			return None;
		};
		match (left.as_ref(), right.as_ref()) {
			(
				Expr::Column {
					index,
					..
				},
				Expr::Constant(v),
			)
			| (
				Expr::Constant(v),
				Expr::Column {
					index,
					..
				},
			) => Some((*index, v.clone())),
			_ => None,
		}
	}

	pub fn as_geom_contains(&self) -> Option<GeomContains> {
		let Expr::Call {
			name,
			args,
			..
		} = self.root.as_ref()
		else {
			return None;
		};
		if !name.eq_ignore_ascii_case("geomcontains") {
			return None;
		}
		match args.as_slice() {
			[
				geometry,
				Expr::Column {
					index: lat,
					..
				},
				Expr::Column {
					index: lon,
					..
				},
			] => Some(GeomContains {
				geometry: CompiledExpression::new(geometry.clone()),
				lat: *lat,
				lon: *lon,
			}),
			_ => None,
		}
	}
}

impl Expression for CompiledExpression {
	fn evaluate(&self, ctx: &EvaluationContext) -> crate::Result<Value> {
		self.root.evaluate(ctx)
	}

	fn text(&self) -> &str {
		&self.text
	}
}
