// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	collections::HashMap,
	fmt::{Debug, Formatter},
	sync::Arc,
};

use tabula_core::{RowId, TableId};
use tabula_type::Value;

use crate::VariableResolver;

pub mod aggregate;
mod geo;
mod scalar;

pub use aggregate::AggregateKind;

pub trait ScalarFunction: Send + Sync + Debug {
	fn name(&self) -> &str;

	/// Minimum and (if bounded) maximum argument count.
	fn arity(&self) -> (usize, Option<usize>);

	fn call(&self, args: &[Value]) -> crate::Result<Value>;
}

/// A scalar function backed by a plain function pointer.
#[derive(Debug, Clone, Copy)]
pub struct NativeFunction {
	pub name: &'static str,
	pub min: usize,
	pub max: Option<usize>,
	pub body: fn(&[Value]) -> crate::Result<Value>,
}

impl ScalarFunction for NativeFunction {
	fn name(&self) -> &str {
		self.name
	}

	fn arity(&self) -> (usize, Option<usize>) {
		(self.min, self.max)
	}

	fn call(&self, args: &[Value]) -> crate::Result<Value> {
		(self.body)(args)
	}
}

/// Source rows backing each group row of a grouped table.
#[derive(Debug, Default)]
pub struct GroupRows {
	rows: HashMap<RowId, Vec<RowId>>,
}

impl GroupRows {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, group: RowId, source: RowId) {
		self.rows.entry(group).or_default().push(source);
	}

	pub fn get(&self, group: RowId) -> Option<&[RowId]> {
		self.rows.get(&group).map(Vec::as_slice)
	}

	pub fn group_count(&self) -> usize {
		self.rows.len()
	}

	pub fn source_count(&self) -> usize {
		self.rows.values().map(Vec::len).sum()
	}
}

/// The ungrouped table that aggregate arguments are evaluated against.
#[derive(Debug)]
pub struct AggregateScope {
	pub groups: Arc<GroupRows>,
	pub source_datasource: usize,
	pub source_table: TableId,
}

#[derive(Clone)]
pub struct AggregateBinding {
	pub scope: Arc<AggregateScope>,
	/// Resolves field names inside aggregate arguments.
	pub resolver: Arc<dyn VariableResolver>,
}

/// Functions available to the compiler. Aggregates are only bound when the
/// library carries an [`AggregateBinding`].
#[derive(Clone)]
pub struct FunctionLibrary {
	scalars: HashMap<String, Arc<dyn ScalarFunction>>,
	aggregates: Option<AggregateBinding>,
}

impl Debug for FunctionLibrary {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let mut names: Vec<&String> = self.scalars.keys().collect();
		names.sort();
		f.debug_struct("FunctionLibrary")
			.field("scalars", &names)
			.field("aggregates", &self.aggregates.is_some())
			.finish()
	}
}

impl Default for FunctionLibrary {
	fn default() -> Self {
		Self::standard()
	}
}

impl FunctionLibrary {
	pub fn empty() -> Self {
		Self {
			scalars: HashMap::new(),
			aggregates: None,
		}
	}

	pub fn standard() -> Self {
		let mut library = Self::empty();
		for function in scalar::FUNCTIONS.iter().chain(geo::FUNCTIONS.iter()) {
			library.register(Arc::new(*function));
		}
		library
	}

	pub fn register(&mut self, function: Arc<dyn ScalarFunction>) {
		self.scalars.insert(function.name().to_ascii_lowercase(), function);
	}

	pub fn scalar(&self, name: &str) -> Option<Arc<dyn ScalarFunction>> {
		self.scalars.get(&name.to_ascii_lowercase()).cloned()
	}

	/// Copy of this library with aggregates bound to `binding`.
	pub fn with_aggregates(&self, binding: AggregateBinding) -> Self {
		Self {
			scalars: self.scalars.clone(),
			aggregates: Some(binding),
		}
	}

	pub fn aggregates(&self) -> Option<&AggregateBinding> {
		self.aggregates.as_ref()
	}
}
