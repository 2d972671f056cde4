// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::Arc;

use tabula_core::{DatastoreRef, MemoryDatastore, TableId, TableToCreate, Type, Value};
use tabula_formula::{
	AggregateBinding, AggregateScope, Compiler, EvaluationContext, FormulaError, FunctionLibrary, GroupRows,
	GroupedResolver, StandardCompiler, TableResolver,
};

struct Fixture {
	datasources: Vec<DatastoreRef>,
	orders: TableId,
}

fn fixture() -> Fixture {
	let store = MemoryDatastore::new();
	let orders = store
		.create_table_with(
			TableToCreate::new("orders")
				.column("region", Type::Utf8)
				.column("qty", Type::Int8)
				.column("lat", Type::Float8)
				.column("lon", Type::Float8),
		)
		.unwrap();
	for (region, qty, lat, lon) in [("north", 3, 1.0, 1.0), ("south", 5, 2.0, 2.0), ("north", 4, 3.0, 5.0)] {
		store.append_row(orders, [Value::utf8(region), Value::Int8(qty), Value::Float8(lat), Value::Float8(lon)])
			.unwrap();
	}
	Fixture {
		datasources: vec![store as DatastoreRef],
		orders,
	}
}

fn eval_rows(f: &Fixture, text: &str) -> Vec<Value> {
	let store = &f.datasources[0];
	let resolver = TableResolver::from_def(&store.table_def(f.orders).unwrap());
	let expr = StandardCompiler.compile(text, &resolver, &FunctionLibrary::standard()).unwrap();
	store.row_ids(f.orders)
		.unwrap()
		.into_iter()
		.map(|row| expr.evaluate(&EvaluationContext::new(&f.datasources, 0, f.orders).with_row(row)).unwrap())
		.collect()
}

#[test]
fn test_row_formulas() {
	let f = fixture();
	assert_eq!(eval_rows(&f, "qty * 2 + 1"), vec![Value::Int8(7), Value::Int8(11), Value::Int8(9)]);
	assert_eq!(
		eval_rows(&f, "if(region == 'north', 'n', 's')"),
		vec![Value::utf8("n"), Value::utf8("s"), Value::utf8("n")]
	);
	assert_eq!(
		eval_rows(&f, "geomContains('POLYGON ((0 0, 3 0, 3 3, 0 3))', lat, lon)"),
		vec![Value::Boolean(true), Value::Boolean(true), Value::Boolean(false)]
	);
}

#[test]
fn test_index_context() {
	let f = fixture();
	let resolver = TableResolver::from_def(&f.datasources[0].table_def(f.orders).unwrap());
	let expr = StandardCompiler.compile("upper(region)", &resolver, &FunctionLibrary::standard()).unwrap();

	let ctx = EvaluationContext::new(&f.datasources, 0, f.orders);
	assert!(matches!(expr.evaluate(&ctx), Err(FormulaError::FieldUnavailable { .. })));
	assert_eq!(expr.evaluate(&ctx.with_row_index(1)).unwrap(), Value::utf8("SOUTH"));
}

#[test]
fn test_aggregates_over_groups() {
	let f = fixture();
	let source = &f.datasources[0];
	let rows = source.row_ids(f.orders).unwrap();

	let grouped = MemoryDatastore::new();
	let groups_table = grouped.create_table_with(TableToCreate::new("by_region").column("region", Type::Utf8)).unwrap();
	let north = grouped.append_row(groups_table, [Value::utf8("north")]).unwrap();
	let south = grouped.append_row(groups_table, [Value::utf8("south")]).unwrap();

	let mut groups = GroupRows::new();
	groups.push(north, rows[0]);
	groups.push(south, rows[1]);
	groups.push(north, rows[2]);

	let datasources: Vec<DatastoreRef> = vec![source.clone(), grouped.clone() as DatastoreRef];
	let binding = AggregateBinding {
		scope: Arc::new(AggregateScope {
			groups: Arc::new(groups),
			source_datasource: 0,
			source_table: f.orders,
		}),
		resolver: Arc::new(TableResolver::from_def(&source.table_def(f.orders).unwrap())),
	};
	let library = FunctionLibrary::standard().with_aggregates(binding);
	let resolver = GroupedResolver::new(TableResolver::new(["region"]), ["region", "qty", "lat", "lon"], "by_region");

	let eval = |text: &str, row| {
		let expr = StandardCompiler.compile(text, &resolver, &library).unwrap();
		expr.evaluate(&EvaluationContext::new(&datasources, 1, groups_table).with_row(row))
	};

	assert_eq!(eval("sum(qty)", north).unwrap(), Value::Int8(7));
	assert_eq!(eval("groupcount()", south).unwrap(), Value::Int8(1));
	assert_eq!(eval("region + ':' + max(qty)", north).unwrap(), Value::utf8("north:4"));
	assert!(matches!(eval("qty", north), Err(FormulaError::FieldUnavailable { .. })));

	let unrelated = source.row_id(f.orders, 0).unwrap();
	assert!(matches!(eval("count()", unrelated), Err(FormulaError::AggregateOutsideGroup { .. })));
	assert!(StandardCompiler.compile("sum(sum(qty))", &resolver, &library).is_err());
}
