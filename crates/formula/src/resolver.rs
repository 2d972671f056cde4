// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, atomic::AtomicBool},
};

use tabula_core::TableDef;
use tabula_type::{Value, standardise};

/// What a field name in a formula refers to.
#[derive(Debug, Clone)]
pub enum Resolved {
	Column(usize),
	Constant(Value),
	/// The name is known but cannot be read in this position. Evaluating it
	/// fails; the first failure is logged through `logged`.
	Unavailable {
		message: String,
		logged: Arc<AtomicBool>,
	},
}

pub trait VariableResolver: Send + Sync {
	fn resolve(&self, name: &str) -> Option<Resolved>;
}

/// Resolves field names against a column list, case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct TableResolver {
	columns: HashMap<String, usize>,
	constants: HashMap<String, Value>,
}

impl TableResolver {
	pub fn new<I, S>(names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut columns = HashMap::new();
		for (index, name) in names.into_iter().enumerate() {
			columns.entry(standardise(name.as_ref())).or_insert(index);
		}
		Self {
			columns,
			constants: HashMap::new(),
		}
	}

	pub fn from_def(def: &TableDef) -> Self {
		Self::new(def.columns.iter().map(|c| c.name.as_str()))
	}

	pub fn with_constant(mut self, name: &str, value: Value) -> Self {
		self.constants.insert(standardise(name), value);
		self
	}
}

impl VariableResolver for TableResolver {
	fn resolve(&self, name: &str) -> Option<Resolved> {
		let key = standardise(name);
		if let Some(index) = self.columns.get(&key) {
			return Some(Resolved::Column(*index));
		}
		self.constants.get(&key).map(|v| Resolved::Constant(v.clone()))
	}
}

/// Resolver for formulas on a grouped table.
///
/// Group-by fields resolve to columns of the grouped table. Other fields of
/// the ungrouped source are only readable inside an aggregate; outside one
/// they resolve to [`Resolved::Unavailable`], sharing one log flag per table.
pub struct GroupedResolver {
	grouped: TableResolver,
	source_fields: HashSet<String>,
	table: String,
	logged: Arc<AtomicBool>,
}

impl GroupedResolver {
	pub fn new<S: AsRef<str>>(grouped: TableResolver, source_fields: impl IntoIterator<Item = S>, table: &str) -> Self {
		Self {
			grouped,
			source_fields: source_fields.into_iter().map(|s| standardise(s.as_ref())).collect(),
			table: table.to_string(),
			logged: Arc::new(AtomicBool::new(false)),
		}
	}
}

impl VariableResolver for GroupedResolver {
	fn resolve(&self, name: &str) -> Option<Resolved> {
		if let Some(resolved) = self.grouped.resolve(name) {
			return Some(resolved);
		}
		if self.source_fields.contains(&standardise(name)) {
			return Some(Resolved::Unavailable {
				message: format!(
					"table '{}' is grouped; only group-by fields can be read outside an aggregate",
					self.table
				),
				logged: self.logged.clone(),
			});
		}
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_case_insensitive_first_wins() {
		let resolver = TableResolver::new(["Name", "Age", "name"]).with_constant("pi", Value::Float8(2.5));
		assert!(matches!(resolver.resolve(" NAME "), Some(Resolved::Column(0))));
		assert!(matches!(resolver.resolve("age"), Some(Resolved::Column(1))));
		assert!(matches!(resolver.resolve("PI"), Some(Resolved::Constant(Value::Float8(_)))));
		assert!(resolver.resolve("height").is_none());
	}

	#[test]
	fn test_grouped_fields() {
		let resolver = GroupedResolver::new(TableResolver::new(["region"]), ["region", "amount"], "sales");
		assert!(matches!(resolver.resolve("region"), Some(Resolved::Column(0))));
		assert!(matches!(resolver.resolve("amount"), Some(Resolved::Unavailable { .. })));
		assert!(resolver.resolve("missing").is_none());
	}
}
