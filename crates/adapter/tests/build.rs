// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{collections::HashSet, sync::Arc};

use tabula_adapter::{
	AdaptedTableConfig, AdapterColumnConfig, AdapterConfig, BuildError, BuildSession, BuilderConfig,
	CancellationFlag, Environment,
};
use tabula_core::{Datastore, DatastoreRef, TableId, Type, Value};
use tabula_testing::{TableBuilder, example_t, fixture::point_grid, init_tracing, oracle};

fn with_t() -> (Environment, DatastoreRef, TableId) {
	let (store, table, _) = example_t();
	let store: DatastoreRef = store;
	let env = Environment::new().with_datastore("src", store.clone());
	(env, store, table)
}

fn ids(store: &dyn Datastore, table: TableId) -> Vec<i64> {
	(0..store.row_count(table).unwrap()).map(|i| store.value_at(table, i, 0).unwrap().as_i64().unwrap()).collect()
}

fn build(env: &Environment, id: &str) -> tabula_adapter::Result<Arc<tabula_decorator::AdaptedDecorator>> {
	BuildSession::new(env, BuilderConfig::default()).build(id)
}

#[test]
fn test_filter_and_sort_example() {
	init_tracing();
	let (env, store, table) = with_t();
	let env = env
		.with_adapter(
			AdapterConfig::new("fives").with_table(AdaptedTableConfig::new("T").from_source("src", "T").filter("x == 5")),
		)
		.with_adapter(
			AdapterConfig::new("positive").with_table(AdaptedTableConfig::new("T").from_source("src", "T").filter("x > 0")),
		)
		.with_adapter(AdapterConfig::new("sorted").with_table(AdaptedTableConfig::new("T").from_source("src", "T").sort("x", true)))
		.with_adapter(
			AdapterConfig::new("top").with_table(AdaptedTableConfig::new("T").from_source("src", "T").sort("x", false).limit(2)),
		);

	let fives = build(&env, "fives").unwrap();
	assert_eq!(ids(fives.as_ref(), TableId(1)), vec![1, 3]);
	assert_eq!(oracle::filter_rows(&store, table, "x == 5").len(), 2);

	let positive = build(&env, "positive").unwrap();
	assert_eq!(ids(positive.as_ref(), TableId(1)), vec![1, 3]);

	let sorted = build(&env, "sorted").unwrap();
	assert_eq!(ids(sorted.as_ref(), TableId(1)), vec![2, 1, 3]);

	let top = build(&env, "top").unwrap();
	assert_eq!(ids(top.as_ref(), TableId(1)), vec![1, 3]);
}

#[test]
fn test_pass_through_round_trip() {
	let (env, store, table) = with_t();
	let env = env.with_adapter(
		AdapterConfig::new("copy")
			.with_table(AdaptedTableConfig::new("T").from_source("src", "T"))
			.with_table(AdaptedTableConfig::new("Again").from_source("SRC", "t")),
	);
	let adapter = build(&env, "copy").unwrap();
	assert_eq!(adapter.datasources().len(), 1);
	assert_eq!(adapter.table_count(), 2);

	let copied = adapter.find_table("t").unwrap();
	for index in 0..store.row_count(table).unwrap() {
		for col in 0..store.column_count(table).unwrap() {
			assert_eq!(adapter.value_at(copied, index, col).unwrap(), store.value_at(table, index, col).unwrap());
		}
	}

	adapter.set_value_at(copied, 1, 1, Value::Int8(9)).unwrap();
	assert_eq!(store.value_at(table, 1, 1).unwrap(), Value::Int8(9));
	let again = adapter.find_table("again").unwrap();
	assert_eq!(adapter.value_at(again, 1, 1).unwrap(), Value::Int8(9));
}

#[test]
fn test_adapter_over_adapter() {
	let (env, _, _) = with_t();
	let env = env
		.with_adapter(
			AdapterConfig::new("base").with_table(
				AdaptedTableConfig::new("T")
					.from_source("src", "T")
					.column(AdapterColumnConfig::field("id"))
					.column(AdapterColumnConfig::formula("double", "x * 2")),
			),
		)
		.with_adapter(
			AdapterConfig::new("doubled").with_table(AdaptedTableConfig::new("T").from_source("base", "T").filter("double > 0")),
		);

	let mut session = BuildSession::new(&env, BuilderConfig::default());
	let doubled = session.build("doubled").unwrap();
	assert_eq!(ids(doubled.as_ref(), TableId(1)), vec![1, 3]);
	assert_eq!(doubled.value_at(TableId(1), 1, 1).unwrap().as_i64(), Some(10));

	let base = session.built().get("BASE").unwrap().clone();
	assert!(Arc::ptr_eq(&base, &session.build("base").unwrap()));
	assert!(Arc::ptr_eq(&doubled, &session.build("doubled").unwrap()));
	assert_eq!(session.built().len(), 2);
}

#[test]
fn test_cycles_are_detected() {
	let env = Environment::new()
		.with_adapter(AdapterConfig::new("self").with_table(AdaptedTableConfig::new("t").from_source("self", "t")))
		.with_adapter(AdapterConfig::new("a").with_table(AdaptedTableConfig::new("t").from_source("b", "t")))
		.with_adapter(AdapterConfig::new("b").with_table(AdaptedTableConfig::new("t").from_source("a", "t")));

	match build(&env, "self") {
		Err(BuildError::CyclicDependency {
			chain,
			..
		}) => assert_eq!(chain, vec!["self", "self"]),
		other => panic!("expected a cycle, got {:?}", other.map(|_| ())),
	}

	let mut session = BuildSession::new(&env, BuilderConfig::default());
	match session.build("a") {
		Err(BuildError::CyclicDependency {
			chain,
			..
		}) => assert_eq!(chain, vec!["a", "b", "a"]),
		other => panic!("expected a cycle, got {:?}", other.map(|_| ())),
	}
	assert!(session.built().is_empty());
}

#[test]
fn test_unknown_references() {
	let (env, _, _) = with_t();
	let env = env
		.with_adapter(AdapterConfig::new("no_store").with_table(AdaptedTableConfig::new("T").from_source("nowhere", "T")))
		.with_adapter(AdapterConfig::new("no_table").with_table(AdaptedTableConfig::new("T").from_source("src", "missing")))
		.with_adapter(
			AdapterConfig::new("no_field")
				.with_table(AdaptedTableConfig::new("T").from_source("src", "T").column(AdapterColumnConfig::field("y"))),
		)
		.with_adapter(
			AdapterConfig::new("bad_formula")
				.with_table(AdaptedTableConfig::new("T").from_source("src", "T").filter("x ==")),
		)
		.with_adapter(AdapterConfig::new("no_source").with_table(AdaptedTableConfig::new("T")));

	let mut session = BuildSession::new(&env, BuilderConfig::default());
	assert!(matches!(session.build("ghost"), Err(BuildError::UnknownAdapter { .. })));
	assert!(matches!(session.build("no_store"), Err(BuildError::UnknownDatastore { name, .. }) if name == "nowhere"));
	assert!(matches!(session.build("no_table"), Err(BuildError::UnknownTable { name, .. }) if name == "missing"));
	assert!(matches!(session.build("no_field"), Err(BuildError::UnknownField { field, .. }) if field == "y"));
	assert!(matches!(session.build("bad_formula"), Err(BuildError::Formula { .. })));
	assert!(matches!(session.build("no_source"), Err(BuildError::InvalidConfiguration { .. })));
	assert!(session.built().is_empty());
}

#[test]
fn test_cancellation_aborts_the_build() {
	let (env, _, _) = with_t();
	let env = env
		.with_adapter(AdapterConfig::new("positive").with_table(AdaptedTableConfig::new("T").from_source("src", "T").filter("x > 0")));

	let flag = Arc::new(CancellationFlag::new());
	let config = BuilderConfig {
		progress_interval: 1,
		..BuilderConfig::default()
	};
	let mut session = BuildSession::with_monitor(&env, config, flag.clone());
	flag.cancel();
	let err = session.build("positive").err().unwrap();
	assert!(err.is_cancelled());
	assert!(!session.built().contains("positive"));
}

fn zones() -> TableBuilder {
	TableBuilder::new("zones")
		.column("zone", Type::Utf8)
		.column("area", Type::Utf8)
		.row([Value::utf8("west"), Value::utf8("POLYGON ((0.5 0.5, 2.5 0.5, 2.5 3.5, 0.5 3.5))")])
		.row([Value::utf8("east"), Value::utf8("POLYGON ((3.5 3.5, 6.5 3.5, 5 6.5))")])
}

/// Builds a join of zones with an 8 by 8 point grid and checks it holds
/// exactly the pairs a brute-force evaluation accepts. Returns how many
/// spatial indexes the session built.
fn check_join(filter: &str) -> usize {
	let (zones, zones_table, _) = zones().build();
	let (points, points_table, _) = point_grid("points", 8);
	let zones: DatastoreRef = zones;
	let points: DatastoreRef = points;

	let env = Environment::new().with_datastore("zones", zones.clone()).with_datastore("points", points.clone()).with_adapter(
		AdapterConfig::new("visits").with_table(
			AdaptedTableConfig::new("visits")
				.from_source("zones", "zones")
				.join("points", "points")
				.filter(filter)
				.column(AdapterColumnConfig::field("zone"))
				.column(AdapterColumnConfig::field("name")),
		),
	);
	let mut session = BuildSession::new(&env, BuilderConfig::default());
	let visits = session.build("visits").unwrap();
	let table = visits.find_table("visits").unwrap();

	let actual: HashSet<(String, String)> = (0..visits.row_count(table).unwrap())
		.map(|i| (visits.value_at(table, i, 0).unwrap().to_string(), visits.value_at(table, i, 1).unwrap().to_string()))
		.collect();
	let expected: HashSet<(String, String)> =
		oracle::nested_loop_join(&zones, zones_table, &points, points_table, filter)
			.into_iter()
			.map(|(zone, point)| {
				(
					zones.value_by_id(zones_table, zone, 0).unwrap().to_string(),
					points.value_by_id(points_table, point, 0).unwrap().to_string(),
				)
			})
			.collect();
	assert_eq!(actual, expected, "{filter}");
	assert_eq!(actual.len(), visits.row_count(table).unwrap());
	session.spatial_cache().len()
}

#[test]
fn test_join_matches_nested_loop() {
	init_tracing();
	assert_eq!(check_join("geomContains(area, lat, lon) and name != 'p1_1'"), 1);
	assert_eq!(check_join("zone == 'east' and geomContains(area, lat, lon)"), 1);
	assert_eq!(check_join("lat + lon < 4 and zone != 'east'"), 0);
	assert_eq!(check_join("1 > 2 and zone == 'west'"), 0);
	assert_eq!(check_join("lat == lon"), 0);
}

#[test]
fn test_group_counts() {
	let regions = ["North", "north ", "South", "East", "NORTH", "south", "West", "east"];
	let mut builder = TableBuilder::new("sales").column("region", Type::Utf8).column("amount", Type::Int8);
	for (i, region) in regions.iter().enumerate() {
		builder = builder.row([Value::utf8(*region), Value::Int8(i as i64)]);
	}
	let (store, table, _) = builder.build();
	let store: DatastoreRef = store;

	let env = Environment::new().with_datastore("shop", store.clone()).with_adapter(
		AdapterConfig::new("regions").with_table(
			AdaptedTableConfig::new("regions")
				.from_source("shop", "sales")
				.column(AdapterColumnConfig::field("region").group_by())
				.column(AdapterColumnConfig::formula("rows", "groupcount()"))
				.column(AdapterColumnConfig::formula("total", "sum(amount)")),
		),
	);
	let adapter = build(&env, "regions").unwrap();
	let grouped = adapter.find_table("regions").unwrap();

	let groups = adapter.row_count(grouped).unwrap();
	assert_eq!(groups, oracle::distinct_keys(&store, table, &["region"]));
	assert_eq!(groups, 4);

	let counted: i64 = (0..groups).map(|i| adapter.value_at(grouped, i, 1).unwrap().as_i64().unwrap()).sum();
	assert_eq!(counted as usize, store.row_count(table).unwrap());
	let total: f64 = (0..groups).map(|i| adapter.value_at(grouped, i, 2).unwrap().as_f64().unwrap()).sum();
	assert_eq!(total, 28.0);
}

#[test]
fn test_build_from_json() {
	let (env, _, _) = with_t();
	let config = AdapterConfig::from_json(
		r#"{
			"id": "positive",
			"tables": [{
				"name": "T",
				"from_datastore": "src",
				"filter": "x > 0",
				"sort": [{"formula": "id", "ascending": false}],
				"columns": [
					{"name": "id"},
					{"name": "twice", "source": "x * 2", "formula": true, "type": "float"}
				]
			}]
		}"#,
	)
	.unwrap();
	let env = env.with_adapter(config);
	let adapter = build(&env, "positive").unwrap();
	let table = adapter.find_table("t").unwrap();
	assert_eq!(ids(adapter.as_ref(), table), vec![3, 1]);
	assert_eq!(adapter.value_at(table, 0, 1).unwrap(), Value::Float8(10.0));
	assert!(adapter.column(table, 1).unwrap().flags.contains(tabula_core::ColumnFlags::READ_ONLY));
}

fn readings() -> TableBuilder {
	let undefined = Value::Undefined;
	TableBuilder::new("readings")
		.column("id", Type::Int8)
		.column("n", Type::Int8)
		.column("level", Type::Float8)
		.column("label", Type::Utf8)
		.column("flag", Type::Boolean)
		.row([Value::Int8(1), Value::Int8(5), Value::Float8(2.0), Value::utf8("North"), Value::Boolean(true)])
		.row([Value::Int8(2), Value::Int8(4), Value::Float8(2.5), Value::utf8("north"), Value::Boolean(false)])
		.row([Value::Int8(3), Value::Int8(5), Value::Float8(4.6), Value::utf8("5"), undefined.clone()])
		.row([Value::Int8(4), undefined.clone(), Value::Float8(5.0), Value::utf8("South"), Value::Boolean(true)])
		.row([Value::Int8(5), Value::Int8(6), undefined.clone(), undefined.clone(), undefined])
}

/// Builds one filtered adapter per formula over `source` and checks each
/// admits exactly the rows a row-by-row evaluation accepts.
fn check_filters(mut env: Environment, source: &str, oracle_store: &DatastoreRef, filters: &[&str]) {
	for (i, filter) in filters.iter().enumerate() {
		env = env.with_adapter(
			AdapterConfig::new(format!("filtered{i}"))
				.with_table(AdaptedTableConfig::new("readings").from_source(source, "readings").filter(*filter)),
		);
	}
	let table = oracle_store.find_table("readings").unwrap();
	let mut session = BuildSession::new(&env, BuilderConfig::default());
	for (i, filter) in filters.iter().enumerate() {
		let adapter = session.build(&format!("filtered{i}")).unwrap();
		let expected: Vec<i64> = oracle::filter_rows(oracle_store, table, filter)
			.into_iter()
			.map(|row| oracle_store.value_by_id(table, row, 0).unwrap().as_i64().unwrap())
			.collect();
		assert_eq!(ids(adapter.as_ref(), adapter.find_table("readings").unwrap()), expected, "{filter}");
	}
}

#[test]
fn test_filter_index_paths_match_scan() {
	init_tracing();
	let (store, table, _) = readings().build();
	let store: DatastoreRef = store;
	assert!(oracle::filter_rows(&store, table, "n == 4.6").is_empty());

	let env = Environment::new().with_datastore("src", store.clone());
	check_filters(
		env,
		"src",
		&store,
		&[
			"n == 4.6",
			"4.6 == n",
			"n == 5",
			"5.0 == n",
			"level == 2",
			"2.5 == level",
			"level == 4.6",
			"label == 'North'",
			"'north' == label",
			"label == 5",
			"n == '5'",
			"flag",
			"flag == true",
			"flag == false",
		],
	);
}

#[test]
fn test_filter_index_paths_over_typed_formula_column() {
	let (store, _, _) = readings().build();
	let env = Environment::new().with_datastore("src", store).with_adapter(
		AdapterConfig::new("rounded").with_table(
			AdaptedTableConfig::new("readings")
				.from_source("src", "readings")
				.column(AdapterColumnConfig::field("id"))
				.column(AdapterColumnConfig::formula("level", "level").with_type(Type::Int8)),
		),
	);
	let rounded: DatastoreRef = BuildSession::new(&env, BuilderConfig::default()).build("rounded").unwrap();
	let table = rounded.find_table("readings").unwrap();
	assert!(oracle::filter_rows(&rounded, table, "level == 4.6").is_empty());

	check_filters(env, "rounded", &rounded, &["level == 4.6", "level == 5", "5 == level", "level == 3"]);
}

#[test]
fn test_cancellation_aborts_group_join_and_union() {
	let (env, _, _) = with_t();
	let (points, _, _) = point_grid("points", 2);
	let env = env
		.with_datastore("points", points)
		.with_adapter(
			AdapterConfig::new("grouped").with_table(
				AdaptedTableConfig::new("T")
					.from_source("src", "T")
					.column(AdapterColumnConfig::field("x").group_by())
					.column(AdapterColumnConfig::formula("rows", "groupcount()")),
			),
		)
		.with_adapter(
			AdapterConfig::new("joined")
				.with_table(AdaptedTableConfig::new("pairs").from_source("src", "T").join("points", "points")),
		)
		.with_adapter(
			AdapterConfig::new("merged")
				.with_table(AdaptedTableConfig::new("T").from_source("src", "T"))
				.with_table(AdaptedTableConfig::new("t").from_source("src", "T")),
		);
	let config = BuilderConfig {
		progress_interval: 1,
		..BuilderConfig::default()
	};

	for id in ["grouped", "joined", "merged"] {
		let mut session = BuildSession::new(&env, config.clone());
		assert!(session.build(id).is_ok(), "{id}");

		let flag = Arc::new(CancellationFlag::new());
		flag.cancel();
		let mut session = BuildSession::with_monitor(&env, config.clone(), flag);
		assert!(matches!(session.build(id), Err(BuildError::Cancelled)), "{id}");
		assert!(!session.built().contains(id));
		assert!(session.built().is_empty());
	}
}

#[test]
fn test_join_warns_about_hidden_inner_fields() {
	let (env, _, _) = with_t();
	let env = env.with_adapter(
		AdapterConfig::new("self_join")
			.with_table(AdaptedTableConfig::new("pairs").from_source("src", "T").join("src", "T").filter("x > 0")),
	);
	let mut session = BuildSession::new(&env, BuilderConfig::default());
	let adapter = session.build("self_join").unwrap();
	let table = adapter.find_table("pairs").unwrap();
	assert_eq!(adapter.row_count(table).unwrap(), 6);

	let warnings = session.report().warnings();
	assert_eq!(warnings.len(), 1);
	assert_eq!(warnings[0].table, "pairs");
	assert!(warnings[0].message.contains("id, x"));
}
