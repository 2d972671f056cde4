// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::Arc;

use tabula_core::{ColumnToCreate, MemoryDatastore, RowId, TableId, TableToCreate, Type, Value};

/// Builds a table with rows inside a [`MemoryDatastore`].
pub struct TableBuilder {
	to_create: TableToCreate,
	rows: Vec<Vec<Value>>,
}

impl TableBuilder {
	pub fn new(name: &str) -> Self {
		Self {
			to_create: TableToCreate::new(name),
			rows: vec![],
		}
	}

	pub fn column(mut self, name: &str, ty: Type) -> Self {
		self.to_create = self.to_create.column(name, ty);
		self
	}

	pub fn tagged_column(mut self, name: &str, ty: Type, tag: &str) -> Self {
		self.to_create = self.to_create.with_column(ColumnToCreate::new(name, ty).with_tag(tag));
		self
	}

	pub fn row(mut self, values: impl IntoIterator<Item = Value>) -> Self {
		self.rows.push(values.into_iter().collect());
		self
	}

	/// Creates the table in `store` and returns its id and the new row ids.
	pub fn build_in(self, store: &MemoryDatastore) -> (TableId, Vec<RowId>) {
		let table = store.create_table_with(self.to_create).unwrap();
		let rows = self.rows.into_iter().map(|values| store.append_row(table, values).unwrap()).collect();
		(table, rows)
	}

	/// Creates the table in a store of its own.
	pub fn build(self) -> (Arc<MemoryDatastore>, TableId, Vec<RowId>) {
		let store = MemoryDatastore::new();
		let (table, rows) = self.build_in(&store);
		(store, table, rows)
	}
}

/// Table `T` with rows `{id=1, x=5}`, `{id=2, x=-3}`, `{id=3, x=5}`.
pub fn example_t() -> (Arc<MemoryDatastore>, TableId, Vec<RowId>) {
	TableBuilder::new("T")
		.column("id", Type::Int8)
		.column("x", Type::Int8)
		.row([Value::Int8(1), Value::Int8(5)])
		.row([Value::Int8(2), Value::Int8(-3)])
		.row([Value::Int8(3), Value::Int8(5)])
		.build()
}

/// Evenly spaced points `(lat, lon)` on a `side` by `side` grid starting at
/// the origin, one unit apart, named `p<row>_<col>`.
pub fn point_grid(name: &str, side: usize) -> (Arc<MemoryDatastore>, TableId, Vec<RowId>) {
	let mut builder = TableBuilder::new(name)
		.column("name", Type::Utf8)
		.column("lat", Type::Float8)
		.column("lon", Type::Float8);
	for r in 0..side {
		for c in 0..side {
			builder = builder.row([Value::utf8(format!("p{r}_{c}")), Value::Float8(r as f64), Value::Float8(c as f64)]);
		}
	}
	builder.build()
}

#[cfg(test)]
mod tests {
	use tabula_core::Datastore;

	use super::*;

	#[test]
	fn test_example_t() {
		let (store, table, rows) = example_t();
		assert_eq!(rows.len(), 3);
		assert_eq!(store.value_by_id(table, rows[1], 1).unwrap(), Value::Int8(-3));
	}

	#[test]
	fn test_point_grid() {
		let (store, table, rows) = point_grid("pts", 3);
		assert_eq!(rows.len(), 9);
		assert_eq!(store.value_at(table, 5, 0).unwrap(), Value::utf8("p1_2"));
	}
}
