// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Brute-force reference answers for differential tests.

use std::collections::HashSet;

use tabula_core::{DatastoreRef, MemoryDatastore, RowId, TableId, TableToCreate, Value};
use tabula_formula::{Compiler, EvaluationContext, FunctionLibrary, StandardCompiler, TableResolver};
use tabula_type::standardise;

/// Rows of `table` for which `formula` evaluates to true, in table order.
pub fn filter_rows(store: &DatastoreRef, table: TableId, formula: &str) -> Vec<RowId> {
	let def = store.table_def(table).unwrap();
	let expr = StandardCompiler.compile(formula, &TableResolver::from_def(&def), &FunctionLibrary::standard()).unwrap();
	let datasources = [store.clone()];
	store.row_ids(table)
		.unwrap()
		.into_iter()
		.filter(|row| expr.evaluate(&EvaluationContext::new(&datasources, 0, table).with_row(*row)).unwrap().is_true())
		.collect()
}

/// Every `(outer, inner)` pair for which `formula`, compiled over the outer
/// columns followed by the inner columns, evaluates to true.
///
/// Each pair is copied into a scratch table and tested on its own.
pub fn nested_loop_join(
	outer: &DatastoreRef,
	outer_table: TableId,
	inner: &DatastoreRef,
	inner_table: TableId,
	formula: &str,
) -> HashSet<(RowId, RowId)> {
	let columns: Vec<_> =
		outer.columns(outer_table).unwrap().into_iter().chain(inner.columns(inner_table).unwrap()).collect();

	let scratch = MemoryDatastore::new();
	let mut to_create = TableToCreate::new("oracle");
	for column in &columns {
		to_create = to_create.column(column.name.clone(), column.ty);
	}
	let table = scratch.create_table_with(to_create).unwrap();
	let expr = StandardCompiler
		.compile(formula, &TableResolver::new(columns.iter().map(|c| c.name.as_str())), &FunctionLibrary::standard())
		.unwrap();

	let datasources = [scratch.clone() as DatastoreRef];
	let mut result = HashSet::new();
	for outer_row in outer.row_ids(outer_table).unwrap() {
		let outer_values = row_values(outer, outer_table, outer_row);
		for inner_row in inner.row_ids(inner_table).unwrap() {
			let values: Vec<Value> =
				outer_values.iter().cloned().chain(row_values(inner, inner_table, inner_row)).collect();
			let row = scratch.append_row(table, values).unwrap();
			let ctx = EvaluationContext::new(&datasources, 0, table).with_row(row);
			if expr.evaluate(&ctx).unwrap().is_true() {
				result.insert((outer_row, inner_row));
			}
		}
	}
	result
}

/// Number of distinct standardised key tuples over `columns` of `table`.
pub fn distinct_keys(store: &DatastoreRef, table: TableId, columns: &[&str]) -> usize {
	let indices: Vec<usize> = columns.iter().map(|c| store.column_index(table, c).unwrap().unwrap()).collect();
	let mut keys = HashSet::new();
	for row in store.row_ids(table).unwrap() {
		let key: Vec<String> = indices
			.iter()
			.map(|col| standardise(&store.value_by_id(table, row, *col).unwrap().to_string()))
			.collect();
		keys.insert(key);
	}
	keys.len()
}

fn row_values(store: &DatastoreRef, table: TableId, row: RowId) -> Vec<Value> {
	(0..store.column_count(table).unwrap()).map(|col| store.value_by_id(table, row, col).unwrap()).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::example_t;

	#[test]
	fn test_filter_oracle() {
		let (store, table, rows) = example_t();
		let store: DatastoreRef = store;
		assert_eq!(filter_rows(&store, table, "x == 5"), vec![rows[0], rows[2]]);
		assert_eq!(distinct_keys(&store, table, &["x"]), 2);
	}

	#[test]
	fn test_join_oracle() {
		let (left, l, left_rows) = example_t();
		let (right, r, right_rows) = crate::TableBuilder::new("U")
			.column("key", tabula_core::Type::Int8)
			.column("y", tabula_core::Type::Int8)
			.row([Value::Int8(1), Value::Int8(-3)])
			.row([Value::Int8(2), Value::Int8(4)])
			.build();
		let left: DatastoreRef = left;
		let right: DatastoreRef = right;
		let pairs = nested_loop_join(&left, l, &right, r, "x == y and key == 1");
		assert_eq!(pairs, HashSet::from([(left_rows[1], right_rows[0])]));
	}
}
