// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	collections::{BTreeSet, HashSet},
	sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tabula_core::{
	ColumnDef, Datastore, DatastoreRef, Error, ListenerSupport, RowFlags, RowId, TableDef, TableEvent, TableFlags,
	TableHandles, TableId, TableListener, TransactionPropagation, Value,
};
use tabula_formula::EvaluationContext;
use tabula_type::loose_eq;
use tracing::{debug, instrument, trace};

use crate::{AdapterMapping, MappedColumn, MappedTable};

/// Destination tables presented through an [`AdapterMapping`].
///
/// Row `i` (or row id `r`) of a destination table is row `i` (or `r`) of its
/// source table. Each column either reads a source column, coerced to the
/// destination type, evaluates a formula against the source row, or reads its
/// default when it is optional and unmapped. Formula failures read as
/// undefined.
pub struct AdaptedDecorator {
	datasources: Vec<DatastoreRef>,
	mapping: AdapterMapping,
	listeners: Arc<ListenerSupport>,
	relayed: Mutex<HashSet<TableId>>,
	transactions: TransactionPropagation,
	handles: TableHandles,
}

/// Re-raises events of a source table as events of a destination table.
struct Relay {
	target: Weak<ListenerSupport>,
	table: TableId,
}

impl TableListener for Relay {
	fn table_changed(&self, event: &TableEvent) {
		let Some(target) = self.target.upgrade() else {
			return;
		};
		target.fire(match *event {
			TableEvent::StructureChanged {
				..
			} => TableEvent::structure(self.table),
			TableEvent::RowsChanged {
				first,
				last,
				..
			} => TableEvent::rows(self.table, first, last),
		});
	}
}

impl AdaptedDecorator {
	#[instrument(name = "adapted::new", level = "debug", skip_all, fields(tables = mapping.len()))]
	pub fn new(datasources: Vec<DatastoreRef>, mapping: AdapterMapping) -> tabula_core::Result<Arc<Self>> {
		for table in mapping.tables() {
			let store = datasources.get(table.datasource).ok_or_else(|| Error::TableNotFound {
				table: table.source_table,
			})?;
			store.check_table(table.source_table)?;
		}

		Ok(Arc::new_cyclic(|this: &Weak<AdaptedDecorator>| {
			let owner: Weak<dyn Datastore> = this.clone();
			AdaptedDecorator {
				datasources,
				mapping,
				listeners: Arc::new(ListenerSupport::new()),
				relayed: Mutex::new(HashSet::new()),
				transactions: TransactionPropagation::new(),
				handles: TableHandles::new(owner),
			}
		}))
	}

	pub fn mapping(&self) -> &AdapterMapping {
		&self.mapping
	}

	pub fn datasources(&self) -> &[DatastoreRef] {
		&self.datasources
	}

	fn mapped(&self, table: TableId) -> tabula_core::Result<&MappedTable> {
		self.mapping.get(table).ok_or(Error::TableNotFound {
			table,
		})
	}

	fn store(&self, mapped: &MappedTable) -> tabula_core::Result<&DatastoreRef> {
		self.datasources.get(mapped.datasource).ok_or(Error::TableNotFound {
			table: mapped.source_table,
		})
	}

	fn column_of<'a>(
		&self,
		mapped: &'a MappedTable,
		col: usize,
	) -> tabula_core::Result<(&'a MappedColumn, &'a ColumnDef)> {
		match (mapped.columns.get(col), mapped.destination.columns.get(col)) {
			(Some(column), Some(def)) => Ok((column, def)),
			_ => Err(Error::ColumnOutOfBounds {
				table: mapped.destination.id,
				index: col,
				count: mapped.columns.len(),
			}),
		}
	}

	fn read(&self, table: TableId, row: RowId, index: Option<usize>, col: usize) -> tabula_core::Result<Value> {
		let mapped = self.mapped(table)?;
		let (column, def) = self.column_of(mapped, col)?;
		match column {
			MappedColumn::Source(source_col) => {
				let value = self.store(mapped)?.value_by_id(mapped.source_table, row, *source_col)?;
				Ok(convert(def, value))
			}
			MappedColumn::Formula(expr) => {
				let mut ctx = EvaluationContext::new(&self.datasources, mapped.datasource, mapped.source_table)
					.with_row(row);
				if let Some(index) = index {
					ctx = ctx.with_row_index(index);
				}
				match expr.evaluate(&ctx) {
					Ok(value) => Ok(convert(def, value)),
					Err(err) => {
						trace!(table = %table, column = %def.name, row = %row, %err, "formula evaluation failed");
						Ok(Value::Undefined)
					}
				}
			}
			MappedColumn::Unset => Ok(def.default.clone()),
		}
	}

	fn scan(&self, table: TableId, col: usize, wanted: &Value) -> tabula_core::Result<Vec<RowId>> {
		let mut result = vec![];
		for index in 0..self.row_count(table)? {
			let row = self.row_id(table, index)?;
			if loose_eq(&self.read(table, row, Some(index), col)?, wanted) {
				result.push(row);
			}
		}
		Ok(result)
	}

	fn changed(&self, table: TableId, first: usize, last: usize) {
		if !self.relayed.lock().contains(&table) {
			self.listeners.fire(TableEvent::rows(table, first, last));
		}
	}

	fn backing_stores(&self) -> Vec<DatastoreRef> {
		let stores: Vec<DatastoreRef> =
			self.mapping.datasources().into_iter().filter_map(|i| self.datasources.get(i).cloned()).collect();
		TransactionPropagation::distinct(&stores)
	}
}

/// Converts a source value to the destination column. Geometries read as a
/// coordinate when the column is tagged `latitude` or `longitude`.
fn convert(def: &ColumnDef, value: Value) -> Value {
	if let Value::Geometry(geometry) = &value {
		if def.has_tag("latitude") {
			return geometry.latitude().map(Value::float8).unwrap_or_default();
		}
		if def.has_tag("longitude") {
			return geometry.longitude().map(Value::float8).unwrap_or_default();
		}
	}
	match def.ty.coerce(&value) {
		Ok(v) => v,
		Err(err) => {
			trace!(column = %def.name, %err, "value does not fit destination column");
			Value::Undefined
		}
	}
}

impl Datastore for AdaptedDecorator {
	fn handles(&self) -> &TableHandles {
		&self.handles
	}

	fn table_count(&self) -> usize {
		self.mapping.len()
	}

	fn table_id_at(&self, index: usize) -> Option<TableId> {
		self.mapping.table_id_at(index)
	}

	fn contains_table(&self, table: TableId) -> bool {
		self.mapping.get(table).is_some()
	}

	fn table_name(&self, table: TableId) -> tabula_core::Result<String> {
		Ok(self.mapped(table)?.destination.name.clone())
	}

	fn table_flags(&self, table: TableId) -> tabula_core::Result<TableFlags> {
		Ok(self.mapped(table)?.destination.flags.without(TableFlags::COLUMN_EDIT))
	}

	fn table_tags(&self, table: TableId) -> tabula_core::Result<BTreeSet<String>> {
		Ok(self.mapped(table)?.destination.tags.clone())
	}

	fn column_count(&self, table: TableId) -> tabula_core::Result<usize> {
		Ok(self.mapped(table)?.destination.columns.len())
	}

	fn column(&self, table: TableId, col: usize) -> tabula_core::Result<ColumnDef> {
		let mapped = self.mapped(table)?;
		Ok(self.column_of(mapped, col)?.1.clone())
	}

	fn columns(&self, table: TableId) -> tabula_core::Result<Vec<ColumnDef>> {
		Ok(self.mapped(table)?.destination.columns.clone())
	}

	fn table_def(&self, table: TableId) -> tabula_core::Result<TableDef> {
		Ok(self.mapped(table)?.destination.clone())
	}

	fn row_count(&self, table: TableId) -> tabula_core::Result<usize> {
		let mapped = self.mapped(table)?;
		self.store(mapped)?.row_count(mapped.source_table)
	}

	fn row_id(&self, table: TableId, index: usize) -> tabula_core::Result<RowId> {
		let mapped = self.mapped(table)?;
		self.store(mapped)?.row_id(mapped.source_table, index)
	}

	fn row_index(&self, table: TableId, row: RowId) -> tabula_core::Result<Option<usize>> {
		let mapped = self.mapped(table)?;
		self.store(mapped)?.row_index(mapped.source_table, row)
	}

	fn value_at(&self, table: TableId, index: usize, col: usize) -> tabula_core::Result<Value> {
		let row = self.row_id(table, index)?;
		self.read(table, row, Some(index), col)
	}

	fn value_by_id(&self, table: TableId, row: RowId, col: usize) -> tabula_core::Result<Value> {
		self.read(table, row, None, col)
	}

	/// Writes go to the source column, coerced to the source type. Formula
	/// columns cannot be written; writes to unset optional columns are
	/// dropped.
	fn set_value_by_id(&self, table: TableId, row: RowId, col: usize, value: Value) -> tabula_core::Result<()> {
		let mapped = self.mapped(table)?;
		let (column, _) = self.column_of(mapped, col)?;
		let source_col = match column {
			MappedColumn::Source(source_col) => *source_col,
			MappedColumn::Formula(_) => return Err(Error::unsupported("set_value on formula column")),
			MappedColumn::Unset => return Ok(()),
		};
		let store = self.store(mapped)?;
		let ty = store.column(mapped.source_table, source_col)?.ty;
		store.set_value_by_id(mapped.source_table, row, source_col, ty.coerce(&value)?)?;
		if let Some(index) = store.row_index(mapped.source_table, row)? {
			self.changed(table, index, index);
		}
		Ok(())
	}

	fn row_flags(&self, table: TableId, row: RowId) -> tabula_core::Result<RowFlags> {
		let mapped = self.mapped(table)?;
		self.store(mapped)?.row_flags(mapped.source_table, row)
	}

	fn set_row_flags(&self, table: TableId, row: RowId, flags: RowFlags) -> tabula_core::Result<()> {
		let mapped = self.mapped(table)?;
		self.store(mapped)?.set_row_flags(mapped.source_table, row, flags)
	}

	fn row_last_modified(&self, table: TableId, row: RowId) -> tabula_core::Result<i64> {
		let mapped = self.mapped(table)?;
		self.store(mapped)?.row_last_modified(mapped.source_table, row)
	}

	fn create_row(&self, table: TableId) -> tabula_core::Result<RowId> {
		let mapped = self.mapped(table)?;
		let store = self.store(mapped)?;
		let row = store.create_row(mapped.source_table)?;
		if let Some(index) = store.row_index(mapped.source_table, row)? {
			self.changed(table, index, usize::MAX);
		}
		Ok(row)
	}

	fn delete_row(&self, table: TableId, row: RowId) -> tabula_core::Result<()> {
		let mapped = self.mapped(table)?;
		let store = self.store(mapped)?;
		let index = store.require_row(mapped.source_table, row)?;
		store.delete_row(mapped.source_table, row)?;
		self.changed(table, index, usize::MAX);
		Ok(())
	}

	/// Mapped columns are looked up through the source index and re-checked
	/// against the destination value; everything else is scanned.
	fn find(&self, table: TableId, col: usize, value: &Value) -> tabula_core::Result<Vec<RowId>> {
		let mapped = self.mapped(table)?;
		let (column, def) = self.column_of(mapped, col)?;
		let Ok(wanted) = def.ty.coerce(value) else {
			return Ok(vec![]);
		};

		let MappedColumn::Source(source_col) = column else {
			return self.scan(table, col, &wanted);
		};
		if def.has_tag("latitude") || def.has_tag("longitude") {
			return self.scan(table, col, &wanted);
		}

		let store = self.store(mapped)?;
		let source_ty = store.column(mapped.source_table, *source_col)?.ty;
		let Ok(query) = source_ty.coerce(&wanted) else {
			return self.scan(table, col, &wanted);
		};
		let mut result = vec![];
		for row in store.find(mapped.source_table, *source_col, &query)? {
			if loose_eq(&self.read(table, row, None, col)?, &wanted) {
				result.push(row);
			}
		}
		Ok(result)
	}

	/// Listeners also hear about changes made directly to the source table
	/// when the source store supports listeners.
	fn add_listener(&self, table: TableId, listener: Arc<dyn TableListener>) -> tabula_core::Result<()> {
		let mapped = self.mapped(table)?;
		self.listeners.add(table, listener);

		if self.relayed.lock().contains(&table) {
			return Ok(());
		}
		let relay = Arc::new(Relay {
			target: Arc::downgrade(&self.listeners),
			table,
		});
		match self.store(mapped)?.add_listener(mapped.source_table, relay) {
			Ok(()) => {
				self.relayed.lock().insert(table);
			}
			Err(err) => debug!(table = %table, %err, "source does not raise events; only local writes are reported"),
		}
		Ok(())
	}

	fn remove_listener(&self, table: TableId, listener: &Arc<dyn TableListener>) -> tabula_core::Result<bool> {
		Ok(self.listeners.remove(table, listener))
	}

	fn disable_listeners(&self) {
		self.listeners.disable();
	}

	fn enable_listeners(&self) {
		self.listeners.enable();
	}

	fn is_rollback_supported(&self) -> bool {
		TransactionPropagation::rollback_supported(&self.backing_stores())
	}

	fn is_in_transaction(&self) -> bool {
		self.transactions.is_active()
	}

	fn start_transaction(&self) -> tabula_core::Result<()> {
		self.transactions.start(&self.backing_stores())
	}

	fn end_transaction(&self) -> tabula_core::Result<()> {
		self.transactions.end()
	}

	fn rollback_transaction(&self) -> tabula_core::Result<()> {
		self.transactions.rollback()?;
		for table in self.table_ids() {
			if !self.relayed.lock().contains(&table) {
				self.listeners.fire(TableEvent::structure(table));
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use parking_lot::Mutex;
	use tabula_core::{ColumnFlags, ColumnId, MemoryDatastore, TableToCreate, Type};
	use tabula_formula::{Compiler, FunctionLibrary, StandardCompiler, TableResolver};
	use tabula_type::{Geometry, Point};

	use super::*;

	struct Fixture {
		source: Arc<MemoryDatastore>,
		source_table: TableId,
		adapted: Arc<AdaptedDecorator>,
		rows: Vec<RowId>,
	}

	fn column(id: u32, name: &str, ty: Type) -> ColumnDef {
		ColumnDef {
			id: ColumnId(id),
			name: name.to_string(),
			ty,
			flags: ColumnFlags::empty(),
			tags: BTreeSet::new(),
			default: Value::Undefined,
		}
	}

	fn fixture() -> Fixture {
		let source = MemoryDatastore::new();
		let source_table = source
			.create_table_with(
				TableToCreate::new("stops")
					.column("name", Type::Utf8)
					.column("qty", Type::Int8)
					.column("where", Type::Geometry),
			)
			.unwrap();
		let rows = [("a", 3, (51.5, -0.1)), ("b", 8, (48.8, 2.3))]
			.into_iter()
			.map(|(name, qty, (lat, lon))| {
				source.append_row(
					source_table,
					[Value::utf8(name), Value::Int8(qty), Value::geometry(Point::from_lat_lon(lat, lon))],
				)
				.unwrap()
			})
			.collect();

		let formula = StandardCompiler
			.compile(
				"qty * 10",
				&TableResolver::from_def(&source.table_def(source_table).unwrap()),
				&FunctionLibrary::standard(),
			)
			.unwrap();

		let mut lat = column(3, "lat", Type::Float8);
		lat.tags.insert("latitude".to_string());
		let mut note = column(4, "note", Type::Utf8);
		note.flags = ColumnFlags::OPTIONAL;
		note.default = Value::utf8("-");

		let mut mapping = AdapterMapping::new();
		mapping.insert(MappedTable {
			destination: TableDef {
				id: TableId(1),
				name: "Stops".to_string(),
				flags: TableFlags::ALL,
				tags: BTreeSet::new(),
				columns: vec![
					column(0, "id", Type::Utf8),
					column(1, "amount", Type::Utf8),
					column(2, "scaled", Type::Int8),
					lat,
					note,
				],
			},
			datasource: 0,
			source_table,
			columns: vec![
				MappedColumn::Source(0),
				MappedColumn::Source(1),
				MappedColumn::Formula(formula),
				MappedColumn::Source(2),
				MappedColumn::Unset,
			],
		});

		let adapted = AdaptedDecorator::new(vec![source.clone() as DatastoreRef], mapping).unwrap();
		Fixture {
			source,
			source_table,
			adapted,
			rows,
		}
	}

	#[test]
	fn test_reads() {
		let f = fixture();
		let t = TableId(1);
		assert_eq!(f.adapted.table_name(t).unwrap(), "Stops");
		assert_eq!(f.adapted.row_count(t).unwrap(), 2);
		assert_eq!(f.adapted.value_at(t, 1, 0).unwrap(), Value::utf8("b"));
		assert_eq!(f.adapted.value_at(t, 0, 1).unwrap(), Value::utf8("3"));
		assert_eq!(f.adapted.value_by_id(t, f.rows[1], 2).unwrap(), Value::Int8(80));
		assert_eq!(f.adapted.value_at(t, 0, 3).unwrap(), Value::Float8(51.5));
		assert_eq!(f.adapted.value_at(t, 0, 4).unwrap(), Value::utf8("-"));
		assert_eq!(f.adapted.row_id(t, 1).unwrap(), f.rows[1]);
	}

	#[test]
	fn test_writes() {
		let f = fixture();
		let t = TableId(1);
		f.adapted.set_value_by_id(t, f.rows[0], 1, Value::utf8("12")).unwrap();
		assert_eq!(f.source.value_by_id(f.source_table, f.rows[0], 1).unwrap(), Value::Int8(12));
		assert_eq!(f.adapted.value_by_id(t, f.rows[0], 2).unwrap(), Value::Int8(120));

		assert!(f.adapted.set_value_by_id(t, f.rows[0], 1, Value::utf8("many")).is_err());
		assert!(matches!(
			f.adapted.set_value_by_id(t, f.rows[0], 2, Value::Int8(1)),
			Err(Error::UnsupportedOperation { .. })
		));
		f.adapted.set_value_by_id(t, f.rows[0], 4, Value::utf8("ignored")).unwrap();
		assert_eq!(f.adapted.value_at(t, 0, 4).unwrap(), Value::utf8("-"));

		let row = f.adapted.create_row(t).unwrap();
		assert!(f.source.contains_row(f.source_table, row).unwrap());
		f.adapted.delete_row(t, row).unwrap();
		assert!(matches!(f.adapted.add_column(t, tabula_core::ColumnToCreate::new("x", Type::Int8)), Err(_)));
	}

	#[test]
	fn test_find() {
		let f = fixture();
		let t = TableId(1);
		assert_eq!(f.adapted.find(t, 1, &Value::utf8("8")).unwrap(), vec![f.rows[1]]);
		assert_eq!(f.adapted.find(t, 2, &Value::Int8(30)).unwrap(), vec![f.rows[0]]);
		assert!(f.adapted.find(t, 1, &Value::utf8("x")).unwrap().is_empty());
	}

	#[test]
	fn test_source_events_are_relayed() {
		let f = fixture();
		let t = TableId(1);
		let seen = Arc::new(Mutex::new(vec![]));
		let sink = seen.clone();
		f.adapted.add_listener(t, Arc::new(move |e: &TableEvent| sink.lock().push(*e))).unwrap();

		f.source.set_value_by_id(f.source_table, f.rows[1], 0, Value::utf8("c")).unwrap();
		assert_eq!(seen.lock().as_slice(), &[TableEvent::rows(t, 1, 1)]);

		f.adapted.set_value_by_id(t, f.rows[0], 0, Value::utf8("z")).unwrap();
		assert_eq!(seen.lock().len(), 2);
	}

	#[test]
	fn test_geometry_text_for_untagged_columns() {
		let def = column(0, "shape", Type::Utf8);
		let value = convert(&def, Value::geometry(Geometry::Point(Point::new(1.0, 2.0))));
		assert_eq!(value, Value::utf8("POINT (1 2)"));
	}
}
