// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

#![cfg_attr(not(debug_assertions), deny(warnings))]

pub use compile::{CompiledExpression, Compiler, Expression, GeomContains, StandardCompiler};
pub use context::EvaluationContext;
pub use error::FormulaError;
pub use expr::Expr;
pub use function::{
	AggregateBinding, AggregateKind, AggregateScope, FunctionLibrary, GroupRows, NativeFunction, ScalarFunction,
};
pub use resolver::{GroupedResolver, Resolved, TableResolver, VariableResolver};

pub mod ast;
mod compile;
mod context;
mod error;
mod expr;
pub mod function;
pub mod lexer;
pub mod parser;
mod resolver;

pub type Result<T> = std::result::Result<T, FormulaError>;
