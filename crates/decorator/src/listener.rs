// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::{Arc, Weak};

use tabula_core::{
	ColumnFlags, ColumnId, ColumnToCreate, Datastore, DatastoreRef, ListenerSupport, RowFlags, RowId, TableEvent,
	TableFlags, TableHandles, TableId, TableListener, Value,
};

/// Pass-through store that raises its own events for changes made through it.
///
/// Listeners registered here only hear about writes that went through this
/// decorator, which lets a view batch its own notifications with
/// `disable_listeners`/`enable_listeners` without touching the backing store.
pub struct ListenerDecorator {
	inner: DatastoreRef,
	listeners: ListenerSupport,
	handles: TableHandles,
}

impl ListenerDecorator {
	pub fn new(inner: DatastoreRef) -> Arc<Self> {
		Arc::new_cyclic(|this: &Weak<ListenerDecorator>| {
			let owner: Weak<dyn Datastore> = this.clone();
			ListenerDecorator {
				inner,
				listeners: ListenerSupport::new(),
				handles: TableHandles::new(owner),
			}
		})
	}

	fn rows_changed(&self, table: TableId, first: usize, last: usize) {
		self.listeners.fire(TableEvent::rows(table, first, last));
	}

	fn row_changed(&self, table: TableId, row: RowId) {
		if let Ok(Some(index)) = self.inner.row_index(table, row) {
			self.rows_changed(table, index, index);
		}
	}

	fn structure_changed(&self, table: TableId) {
		self.listeners.fire(TableEvent::structure(table));
	}
}

impl Datastore for ListenerDecorator {
	forward_columns!(inner);

	fn handles(&self) -> &TableHandles {
		&self.handles
	}

	fn table_count(&self) -> usize {
		self.inner.table_count()
	}

	fn table_id_at(&self, index: usize) -> Option<TableId> {
		self.inner.table_id_at(index)
	}

	fn contains_table(&self, table: TableId) -> bool {
		self.inner.contains_table(table)
	}

	fn table_flags(&self, table: TableId) -> tabula_core::Result<TableFlags> {
		self.inner.table_flags(table)
	}

	fn row_count(&self, table: TableId) -> tabula_core::Result<usize> {
		self.inner.row_count(table)
	}

	fn row_id(&self, table: TableId, index: usize) -> tabula_core::Result<RowId> {
		self.inner.row_id(table, index)
	}

	fn row_index(&self, table: TableId, row: RowId) -> tabula_core::Result<Option<usize>> {
		self.inner.row_index(table, row)
	}

	fn value_by_id(&self, table: TableId, row: RowId, col: usize) -> tabula_core::Result<Value> {
		self.inner.value_by_id(table, row, col)
	}

	fn set_value_by_id(&self, table: TableId, row: RowId, col: usize, value: Value) -> tabula_core::Result<()> {
		self.inner.set_value_by_id(table, row, col, value)?;
		self.row_changed(table, row);
		Ok(())
	}

	fn row_flags(&self, table: TableId, row: RowId) -> tabula_core::Result<RowFlags> {
		self.inner.row_flags(table, row)
	}

	fn set_row_flags(&self, table: TableId, row: RowId, flags: RowFlags) -> tabula_core::Result<()> {
		self.inner.set_row_flags(table, row, flags)?;
		self.row_changed(table, row);
		Ok(())
	}

	fn row_last_modified(&self, table: TableId, row: RowId) -> tabula_core::Result<i64> {
		self.inner.row_last_modified(table, row)
	}

	fn create_row(&self, table: TableId) -> tabula_core::Result<RowId> {
		let row = self.inner.create_row(table)?;
		self.row_changed(table, row);
		Ok(row)
	}

	fn insert_row(&self, table: TableId, index: usize) -> tabula_core::Result<RowId> {
		let row = self.inner.insert_row(table, index)?;
		self.rows_changed(table, index, usize::MAX);
		Ok(row)
	}

	fn delete_row(&self, table: TableId, row: RowId) -> tabula_core::Result<()> {
		let index = self.inner.require_row(table, row)?;
		self.inner.delete_row(table, row)?;
		self.rows_changed(table, index, usize::MAX);
		Ok(())
	}

	fn add_column(&self, table: TableId, column: ColumnToCreate) -> tabula_core::Result<ColumnId> {
		let id = self.inner.add_column(table, column)?;
		self.structure_changed(table);
		Ok(id)
	}

	fn insert_column(&self, table: TableId, index: usize, column: ColumnToCreate) -> tabula_core::Result<ColumnId> {
		let id = self.inner.insert_column(table, index, column)?;
		self.structure_changed(table);
		Ok(id)
	}

	fn delete_column(&self, table: TableId, col: usize) -> tabula_core::Result<()> {
		self.inner.delete_column(table, col)?;
		self.structure_changed(table);
		Ok(())
	}

	fn set_column_flags(&self, table: TableId, col: usize, flags: ColumnFlags) -> tabula_core::Result<()> {
		self.inner.set_column_flags(table, col, flags)?;
		self.structure_changed(table);
		Ok(())
	}

	fn set_column_default(&self, table: TableId, col: usize, value: Value) -> tabula_core::Result<()> {
		self.inner.set_column_default(table, col, value)?;
		self.structure_changed(table);
		Ok(())
	}

	fn set_table_name(&self, table: TableId, name: &str) -> tabula_core::Result<()> {
		self.inner.set_table_name(table, name)?;
		self.structure_changed(table);
		Ok(())
	}

	fn create_table(&self, name: &str) -> tabula_core::Result<TableId> {
		let table = self.inner.create_table(name)?;
		self.structure_changed(table);
		Ok(table)
	}

	fn delete_table(&self, table: TableId) -> tabula_core::Result<()> {
		self.inner.delete_table(table)?;
		self.handles.forget(table);
		self.structure_changed(table);
		Ok(())
	}

	fn find(&self, table: TableId, col: usize, value: &Value) -> tabula_core::Result<Vec<RowId>> {
		self.inner.find(table, col, value)
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
		self.inner.is_rollback_supported()
	}

	fn is_in_transaction(&self) -> bool {
		self.inner.is_in_transaction()
	}

	fn start_transaction(&self) -> tabula_core::Result<()> {
		self.inner.start_transaction()
	}

	fn end_transaction(&self) -> tabula_core::Result<()> {
		self.inner.end_transaction()
	}

	fn rollback_transaction(&self) -> tabula_core::Result<()> {
		let tables = self.inner.table_ids();
		self.inner.rollback_transaction()?;
		for table in tables {
			self.structure_changed(table);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use parking_lot::Mutex;
	use tabula_core::{Datastore, MemoryDatastore, TableEvent, TableListener, TableToCreate, Type, Value};

	use super::ListenerDecorator;

	#[test]
	fn test_events_for_writes_through_decorator() {
		let store = MemoryDatastore::new();
		let table = store.create_table_with(TableToCreate::new("t").column("x", Type::Int8)).unwrap();
		store.append_row(table, [Value::Int8(1)]).unwrap();
		store.append_row(table, [Value::Int8(2)]).unwrap();

		let decorator = ListenerDecorator::new(store.clone());
		let seen = Arc::new(Mutex::new(vec![]));
		let sink = seen.clone();
		let listener: Arc<dyn TableListener> = Arc::new(move |e: &TableEvent| sink.lock().push(*e));
		decorator.add_listener(table, listener.clone()).unwrap();

		store.set_value_at(table, 0, 0, Value::Int8(9)).unwrap();
		assert!(seen.lock().is_empty());

		decorator.set_value_at(table, 1, 0, Value::Int8(3)).unwrap();
		assert_eq!(seen.lock().as_slice(), &[TableEvent::rows(table, 1, 1)]);

		seen.lock().clear();
		decorator.disable_listeners();
		decorator.set_value_at(table, 0, 0, Value::Int8(4)).unwrap();
		decorator.create_row(table).unwrap();
		assert!(seen.lock().is_empty());
		decorator.enable_listeners();
		assert_eq!(
			seen.lock().as_slice(),
			&[TableEvent::structure(table), TableEvent::rows(table, 0, usize::MAX)]
		);

		assert!(decorator.remove_listener(table, &listener).unwrap());
	}
}
