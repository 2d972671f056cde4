// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	collections::BTreeSet,
	sync::{Arc, Weak},
};

use tabula_core::{
	ColumnDef, ColumnId, Datastore, DatastoreRef, Error, ListenerSupport, MemoryDatastore, RowFlags, RowId, TableDef,
	TableEvent, TableFlags, TableHandles, TableId, TableListener, TableToCreate, TransactionPropagation, Type, Value,
};
use tracing::instrument;

/// One table whose rows pair a row of an outer table with a row of an inner
/// table.
///
/// Columns are the outer table's columns followed by the inner table's, so an
/// outer column keeps its index. The pairs live in a private two-column table
/// holding the packed row ids; values are read from and written to the two
/// source tables.
pub struct JoinDecorator {
	outer: DatastoreRef,
	outer_table: TableId,
	inner: DatastoreRef,
	inner_table: TableId,
	outer_width: usize,
	def: TableDef,
	pairs: Arc<MemoryDatastore>,
	listeners: ListenerSupport,
	transactions: TransactionPropagation,
	handles: TableHandles,
}

impl JoinDecorator {
	#[instrument(name = "join::new", level = "debug", skip(outer, inner))]
	pub fn new(
		name: &str,
		outer: DatastoreRef,
		outer_table: TableId,
		inner: DatastoreRef,
		inner_table: TableId,
	) -> tabula_core::Result<Arc<Self>> {
		let outer_columns = outer.columns(outer_table)?;
		let inner_columns = inner.columns(inner_table)?;
		let outer_width = outer_columns.len();

		let pairs = MemoryDatastore::new();
		let id = pairs.create_table_with(
			TableToCreate::new(name).column("outer", Type::Int8).column("inner", Type::Int8),
		)?;

		let columns = outer_columns
			.into_iter()
			.chain(inner_columns)
			.enumerate()
			.map(|(index, column)| ColumnDef {
				id: ColumnId(index as u32),
				..column
			})
			.collect();
		let def = TableDef {
			id,
			name: name.to_string(),
			flags: TableFlags::ALLOW_ROW_EDIT | TableFlags::ALLOW_DELETE_ROW,
			tags: BTreeSet::new(),
			columns,
		};

		Ok(Arc::new_cyclic(|this: &Weak<JoinDecorator>| {
			let owner: Weak<dyn Datastore> = this.clone();
			JoinDecorator {
				outer,
				outer_table,
				inner,
				inner_table,
				outer_width,
				def,
				pairs,
				listeners: ListenerSupport::new(),
				transactions: TransactionPropagation::new(),
				handles: TableHandles::new(owner),
			}
		}))
	}

	/// Id of the single joined table.
	pub fn table_id(&self) -> TableId {
		self.def.id
	}

	pub fn outer_width(&self) -> usize {
		self.outer_width
	}

	pub fn outer(&self) -> (&DatastoreRef, TableId) {
		(&self.outer, self.outer_table)
	}

	pub fn inner(&self) -> (&DatastoreRef, TableId) {
		(&self.inner, self.inner_table)
	}

	pub fn add_join_row(&self, outer_row: RowId, inner_row: RowId) -> tabula_core::Result<RowId> {
		let row = self.pairs.append_row(
			self.def.id,
			[Value::Int8(outer_row.raw() as i64), Value::Int8(inner_row.raw() as i64)],
		)?;
		if self.listeners.has_listeners(self.def.id) || self.listeners.is_disabled() {
			let index = self.pairs.require_row(self.def.id, row)?;
			self.listeners.fire(TableEvent::rows(self.def.id, index, index));
		}
		Ok(row)
	}

	/// Outer and inner row ids behind joined row `row`.
	pub fn pair(&self, row: RowId) -> tabula_core::Result<(RowId, RowId)> {
		let read = |col| -> tabula_core::Result<RowId> {
			let raw = self.pairs.value_by_id(self.def.id, row, col)?.as_i64().ok_or(Error::RowNotFound {
				row,
			})?;
			Ok(RowId::from_raw(raw as u64))
		};
		Ok((read(0)?, read(1)?))
	}

	/// Which source table column `col` reads from, with the row to read.
	fn source(
		&self,
		table: TableId,
		row: RowId,
		col: usize,
	) -> tabula_core::Result<(&DatastoreRef, TableId, RowId, usize)> {
		self.check_table(table)?;
		if col >= self.def.columns.len() {
			return Err(Error::ColumnOutOfBounds {
				table,
				index: col,
				count: self.def.columns.len(),
			});
		}
		let (outer_row, inner_row) = self.pair(row)?;
		if col < self.outer_width {
			Ok((&self.outer, self.outer_table, outer_row, col))
		} else {
			Ok((&self.inner, self.inner_table, inner_row, col - self.outer_width))
		}
	}

	fn stores(&self) -> [DatastoreRef; 2] {
		[self.outer.clone(), self.inner.clone()]
	}
}

impl Datastore for JoinDecorator {
	fn handles(&self) -> &TableHandles {
		&self.handles
	}

	fn table_count(&self) -> usize {
		1
	}

	fn table_id_at(&self, index: usize) -> Option<TableId> {
		(index == 0).then_some(self.def.id)
	}

	fn table_name(&self, table: TableId) -> tabula_core::Result<String> {
		self.check_table(table)?;
		Ok(self.def.name.clone())
	}

	fn table_flags(&self, table: TableId) -> tabula_core::Result<TableFlags> {
		self.check_table(table)?;
		Ok(self.def.flags)
	}

	fn column_count(&self, table: TableId) -> tabula_core::Result<usize> {
		self.check_table(table)?;
		Ok(self.def.columns.len())
	}

	fn column(&self, table: TableId, col: usize) -> tabula_core::Result<ColumnDef> {
		self.check_table(table)?;
		self.def.columns.get(col).cloned().ok_or(Error::ColumnOutOfBounds {
			table,
			index: col,
			count: self.def.columns.len(),
		})
	}

	fn row_count(&self, table: TableId) -> tabula_core::Result<usize> {
		self.check_table(table)?;
		self.pairs.row_count(table)
	}

	fn row_id(&self, table: TableId, index: usize) -> tabula_core::Result<RowId> {
		self.check_table(table)?;
		self.pairs.row_id(table, index)
	}

	fn row_index(&self, table: TableId, row: RowId) -> tabula_core::Result<Option<usize>> {
		self.check_table(table)?;
		self.pairs.row_index(table, row)
	}

	fn value_by_id(&self, table: TableId, row: RowId, col: usize) -> tabula_core::Result<Value> {
		let (store, source_table, source_row, source_col) = self.source(table, row, col)?;
		store.value_by_id(source_table, source_row, source_col)
	}

	fn set_value_by_id(&self, table: TableId, row: RowId, col: usize, value: Value) -> tabula_core::Result<()> {
		let (store, source_table, source_row, source_col) = self.source(table, row, col)?;
		store.set_value_by_id(source_table, source_row, source_col, value)?;
		let index = self.require_row(table, row)?;
		self.listeners.fire(TableEvent::rows(table, index, index));
		Ok(())
	}

	fn row_flags(&self, table: TableId, row: RowId) -> tabula_core::Result<RowFlags> {
		self.check_table(table)?;
		self.pairs.row_flags(table, row)
	}

	fn set_row_flags(&self, table: TableId, row: RowId, flags: RowFlags) -> tabula_core::Result<()> {
		self.check_table(table)?;
		self.pairs.set_row_flags(table, row, flags)
	}

	fn delete_row(&self, table: TableId, row: RowId) -> tabula_core::Result<()> {
		self.check_table(table)?;
		let index = self.pairs.require_row(table, row)?;
		self.pairs.delete_row(table, row)?;
		self.listeners.fire(TableEvent::rows(table, index, usize::MAX));
		Ok(())
	}

	fn add_listener(&self, table: TableId, listener: Arc<dyn TableListener>) -> tabula_core::Result<()> {
		self.check_table(table)?;
		self.listeners.add(table, listener);
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
		TransactionPropagation::rollback_supported(&self.stores())
	}

	fn is_in_transaction(&self) -> bool {
		self.transactions.is_active()
	}

	fn start_transaction(&self) -> tabula_core::Result<()> {
		self.transactions.start(&self.stores())
	}

	fn end_transaction(&self) -> tabula_core::Result<()> {
		self.transactions.end()
	}

	fn rollback_transaction(&self) -> tabula_core::Result<()> {
		self.transactions.rollback()?;
		self.listeners.fire(TableEvent::rows(self.def.id, 0, usize::MAX));
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_joined_columns_and_values() {
		let depots = MemoryDatastore::new();
		let d = depots.create_table_with(TableToCreate::new("depots").column("depot", Type::Utf8)).unwrap();
		let north = depots.append_row(d, [Value::utf8("north")]).unwrap();

		let stops = MemoryDatastore::new();
		let s = stops
			.create_table_with(TableToCreate::new("stops").column("stop", Type::Utf8).column("qty", Type::Int8))
			.unwrap();
		let first = stops.append_row(s, [Value::utf8("a"), Value::Int8(1)]).unwrap();
		let second = stops.append_row(s, [Value::utf8("b"), Value::Int8(2)]).unwrap();

		let join = JoinDecorator::new("depots_stops", depots.clone(), d, stops.clone(), s).unwrap();
		let table = join.table_id();
		assert_eq!(join.outer_width(), 1);
		let names: Vec<String> = join.columns(table).unwrap().into_iter().map(|c| c.name).collect();
		assert_eq!(names, vec!["depot", "stop", "qty"]);

		join.add_join_row(north, second).unwrap();
		let row = join.add_join_row(north, first).unwrap();
		assert_eq!(join.row_count(table).unwrap(), 2);
		assert_eq!(join.pair(row).unwrap(), (north, first));
		assert_eq!(join.value_at(table, 0, 1).unwrap(), Value::utf8("b"));
		assert_eq!(join.value_by_id(table, row, 0).unwrap(), Value::utf8("north"));

		join.set_value_by_id(table, row, 2, Value::Int8(7)).unwrap();
		assert_eq!(stops.value_by_id(s, first, 1).unwrap(), Value::Int8(7));
		assert!(join.value_by_id(table, row, 3).is_err());

		join.delete_row(table, row).unwrap();
		assert_eq!(join.row_count(table).unwrap(), 1);
		assert!(stops.contains_row(s, first).unwrap());
		assert!(matches!(join.create_row(table), Err(Error::UnsupportedOperation { .. })));
	}
}
