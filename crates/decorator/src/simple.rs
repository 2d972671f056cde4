// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::{Arc, Weak};

use tabula_core::{
	ColumnFlags, ColumnId, ColumnToCreate, Datastore, DatastoreRef, RowFlags, RowId, TableFlags, TableHandles, TableId,
	TableListener, Value,
};

/// Forwards every operation to one backing store unchanged.
///
/// Table facades handed out by this decorator belong to it, so collaborators
/// comparing handles see the decorator rather than the store underneath.
pub struct SimpleDecorator {
	inner: DatastoreRef,
	handles: TableHandles,
}

impl SimpleDecorator {
	pub fn new(inner: DatastoreRef) -> Arc<Self> {
		Arc::new_cyclic(|this: &Weak<SimpleDecorator>| {
			let owner: Weak<dyn Datastore> = this.clone();
			SimpleDecorator {
				inner,
				handles: TableHandles::new(owner),
			}
		})
	}

	pub fn inner(&self) -> &DatastoreRef {
		&self.inner
	}
}

impl Datastore for SimpleDecorator {
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

	fn value_at(&self, table: TableId, index: usize, col: usize) -> tabula_core::Result<Value> {
		self.inner.value_at(table, index, col)
	}

	fn value_by_id(&self, table: TableId, row: RowId, col: usize) -> tabula_core::Result<Value> {
		self.inner.value_by_id(table, row, col)
	}

	fn set_value_by_id(&self, table: TableId, row: RowId, col: usize, value: Value) -> tabula_core::Result<()> {
		self.inner.set_value_by_id(table, row, col, value)
	}

	fn row_flags(&self, table: TableId, row: RowId) -> tabula_core::Result<RowFlags> {
		self.inner.row_flags(table, row)
	}

	fn set_row_flags(&self, table: TableId, row: RowId, flags: RowFlags) -> tabula_core::Result<()> {
		self.inner.set_row_flags(table, row, flags)
	}

	fn row_last_modified(&self, table: TableId, row: RowId) -> tabula_core::Result<i64> {
		self.inner.row_last_modified(table, row)
	}

	fn create_row(&self, table: TableId) -> tabula_core::Result<RowId> {
		self.inner.create_row(table)
	}

	fn insert_row(&self, table: TableId, index: usize) -> tabula_core::Result<RowId> {
		self.inner.insert_row(table, index)
	}

	fn delete_row(&self, table: TableId, row: RowId) -> tabula_core::Result<()> {
		self.inner.delete_row(table, row)
	}

	fn add_column(&self, table: TableId, column: ColumnToCreate) -> tabula_core::Result<ColumnId> {
		self.inner.add_column(table, column)
	}

	fn insert_column(&self, table: TableId, index: usize, column: ColumnToCreate) -> tabula_core::Result<ColumnId> {
		self.inner.insert_column(table, index, column)
	}

	fn delete_column(&self, table: TableId, col: usize) -> tabula_core::Result<()> {
		self.inner.delete_column(table, col)
	}

	fn set_column_flags(&self, table: TableId, col: usize, flags: ColumnFlags) -> tabula_core::Result<()> {
		self.inner.set_column_flags(table, col, flags)
	}

	fn set_column_default(&self, table: TableId, col: usize, value: Value) -> tabula_core::Result<()> {
		self.inner.set_column_default(table, col, value)
	}

	fn set_table_name(&self, table: TableId, name: &str) -> tabula_core::Result<()> {
		self.inner.set_table_name(table, name)
	}

	fn create_table(&self, name: &str) -> tabula_core::Result<TableId> {
		self.inner.create_table(name)
	}

	fn delete_table(&self, table: TableId) -> tabula_core::Result<()> {
		self.inner.delete_table(table)?;
		self.handles.forget(table);
		Ok(())
	}

	fn find(&self, table: TableId, col: usize, value: &Value) -> tabula_core::Result<Vec<RowId>> {
		self.inner.find(table, col, value)
	}

	fn add_listener(&self, table: TableId, listener: Arc<dyn TableListener>) -> tabula_core::Result<()> {
		self.inner.add_listener(table, listener)
	}

	fn remove_listener(&self, table: TableId, listener: &Arc<dyn TableListener>) -> tabula_core::Result<bool> {
		self.inner.remove_listener(table, listener)
	}

	fn disable_listeners(&self) {
		self.inner.disable_listeners()
	}

	fn enable_listeners(&self) {
		self.inner.enable_listeners()
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
		self.inner.rollback_transaction()
	}
}
