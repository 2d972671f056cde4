// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	collections::{BTreeSet, HashMap},
	fmt::{Debug, Formatter},
	sync::{Arc, Weak},
};

use parking_lot::RwLock;
use tabula_type::Value;

use crate::{
	ColumnDef, ColumnFlags, ColumnId, ColumnToCreate, Datastore, DatastoreRef, Error, RowFlags, RowId, TableDef,
	TableFlags, TableId, TableListener,
};

/// Facade over one table of a datastore.
///
/// Every call forwards to the owning store with this handle's table id.
pub struct TableHandle {
	store: Weak<dyn Datastore>,
	id: TableId,
}

impl Debug for TableHandle {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TableHandle").field("id", &self.id).finish()
	}
}

impl TableHandle {
	pub fn id(&self) -> TableId {
		self.id
	}

	pub fn store(&self) -> crate::Result<DatastoreRef> {
		self.store.upgrade().ok_or(Error::Detached {
			table: self.id,
		})
	}

	pub fn name(&self) -> crate::Result<String> {
		self.store()?.table_name(self.id)
	}

	pub fn set_name(&self, name: &str) -> crate::Result<()> {
		self.store()?.set_table_name(self.id, name)
	}

	pub fn flags(&self) -> crate::Result<TableFlags> {
		self.store()?.table_flags(self.id)
	}

	pub fn tags(&self) -> crate::Result<BTreeSet<String>> {
		self.store()?.table_tags(self.id)
	}

	pub fn def(&self) -> crate::Result<TableDef> {
		self.store()?.table_def(self.id)
	}

	pub fn column_count(&self) -> crate::Result<usize> {
		self.store()?.column_count(self.id)
	}

	pub fn column(&self, col: usize) -> crate::Result<ColumnDef> {
		self.store()?.column(self.id, col)
	}

	pub fn column_index(&self, name: &str) -> crate::Result<Option<usize>> {
		self.store()?.column_index(self.id, name)
	}

	pub fn add_column(&self, column: ColumnToCreate) -> crate::Result<ColumnId> {
		self.store()?.add_column(self.id, column)
	}

	pub fn insert_column(&self, index: usize, column: ColumnToCreate) -> crate::Result<ColumnId> {
		self.store()?.insert_column(self.id, index, column)
	}

	pub fn delete_column(&self, col: usize) -> crate::Result<()> {
		self.store()?.delete_column(self.id, col)
	}

	pub fn set_column_flags(&self, col: usize, flags: ColumnFlags) -> crate::Result<()> {
		self.store()?.set_column_flags(self.id, col, flags)
	}

	pub fn set_column_default(&self, col: usize, value: Value) -> crate::Result<()> {
		self.store()?.set_column_default(self.id, col, value)
	}

	pub fn row_count(&self) -> crate::Result<usize> {
		self.store()?.row_count(self.id)
	}

	pub fn row_id(&self, index: usize) -> crate::Result<RowId> {
		self.store()?.row_id(self.id, index)
	}

	pub fn row_index(&self, row: RowId) -> crate::Result<Option<usize>> {
		self.store()?.row_index(self.id, row)
	}

	pub fn contains_row(&self, row: RowId) -> crate::Result<bool> {
		self.store()?.contains_row(self.id, row)
	}

	pub fn value_at(&self, index: usize, col: usize) -> crate::Result<Value> {
		self.store()?.value_at(self.id, index, col)
	}

	pub fn value_by_id(&self, row: RowId, col: usize) -> crate::Result<Value> {
		self.store()?.value_by_id(self.id, row, col)
	}

	pub fn set_value_at(&self, index: usize, col: usize, value: Value) -> crate::Result<()> {
		self.store()?.set_value_at(self.id, index, col, value)
	}

	pub fn set_value_by_id(&self, row: RowId, col: usize, value: Value) -> crate::Result<()> {
		self.store()?.set_value_by_id(self.id, row, col, value)
	}

	pub fn row_flags(&self, row: RowId) -> crate::Result<RowFlags> {
		self.store()?.row_flags(self.id, row)
	}

	pub fn set_row_flags(&self, row: RowId, flags: RowFlags) -> crate::Result<()> {
		self.store()?.set_row_flags(self.id, row, flags)
	}

	pub fn row_last_modified(&self, row: RowId) -> crate::Result<i64> {
		self.store()?.row_last_modified(self.id, row)
	}

	pub fn create_row(&self) -> crate::Result<RowId> {
		self.store()?.create_row(self.id)
	}

	pub fn insert_row(&self, index: usize) -> crate::Result<RowId> {
		self.store()?.insert_row(self.id, index)
	}

	pub fn delete_row(&self, row: RowId) -> crate::Result<()> {
		self.store()?.delete_row(self.id, row)
	}

	pub fn find(&self, col: usize, value: &Value) -> crate::Result<Vec<RowId>> {
		self.store()?.find(self.id, col, value)
	}

	pub fn add_listener(&self, listener: Arc<dyn TableListener>) -> crate::Result<()> {
		self.store()?.add_listener(self.id, listener)
	}

	pub fn remove_listener(&self, listener: &Arc<dyn TableListener>) -> crate::Result<bool> {
		self.store()?.remove_listener(self.id, listener)
	}
}

/// Lazily populated cache of [`TableHandle`]s owned by a datastore.
pub struct TableHandles {
	owner: Weak<dyn Datastore>,
	handles: RwLock<HashMap<TableId, Arc<TableHandle>>>,
}

impl TableHandles {
	pub fn new(owner: Weak<dyn Datastore>) -> Self {
		Self {
			owner,
			handles: RwLock::new(HashMap::new()),
		}
	}

	/// Returns the cached handle, creating it on first access.
	pub fn get(&self, table: TableId) -> Arc<TableHandle> {
		if let Some(handle) = self.handles.read().get(&table) {
			return handle.clone();
		}

		self.handles
			.write()
			.entry(table)
			.or_insert_with(|| {
				Arc::new(TableHandle {
					store: self.owner.clone(),
					id: table,
				})
			})
			.clone()
	}

	/// Drops the cached handle of a deleted table.
	pub fn forget(&self, table: TableId) {
		self.handles.write().remove(&table);
	}
}
