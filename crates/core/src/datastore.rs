// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{collections::BTreeSet, sync::Arc};

use tabula_type::{Value, loose_eq, standardise};

use crate::{
	ColumnDef, ColumnFlags, ColumnId, ColumnToCreate, Error, RowFlags, RowId, TableDef, TableFlags, TableHandle,
	TableHandles, TableId, TableListener,
};

pub type DatastoreRef = Arc<dyn Datastore>;

/// A collection of tables addressed by table id.
///
/// Every operation takes the id of the table it applies to, so one store
/// object serves all of its tables. Per-table views are obtained through
/// [`Datastore::table`]. Mutating operations fail with
/// [`Error::UnsupportedOperation`] unless the implementation supports them.
pub trait Datastore: Send + Sync {
	/// Cache of the per-table facades handed out by [`Datastore::table`].
	fn handles(&self) -> &TableHandles;

	fn table_count(&self) -> usize;

	fn table_id_at(&self, index: usize) -> Option<TableId>;

	fn table_ids(&self) -> Vec<TableId> {
		(0..self.table_count()).filter_map(|i| self.table_id_at(i)).collect()
	}

	fn contains_table(&self, table: TableId) -> bool {
		self.table_ids().contains(&table)
	}

	/// Case-insensitive, trimmed lookup of a table by name.
	fn find_table(&self, name: &str) -> Option<TableId> {
		let wanted = standardise(name);
		self.table_ids().into_iter().find(|id| self.table_name(*id).is_ok_and(|n| standardise(&n) == wanted))
	}

	fn table_name(&self, table: TableId) -> crate::Result<String>;

	fn table_flags(&self, table: TableId) -> crate::Result<TableFlags>;

	fn table_tags(&self, table: TableId) -> crate::Result<BTreeSet<String>> {
		self.check_table(table)?;
		Ok(BTreeSet::new())
	}

	fn column_count(&self, table: TableId) -> crate::Result<usize>;

	fn column(&self, table: TableId, col: usize) -> crate::Result<ColumnDef>;

	fn columns(&self, table: TableId) -> crate::Result<Vec<ColumnDef>> {
		(0..self.column_count(table)?).map(|c| self.column(table, c)).collect()
	}

	fn column_index(&self, table: TableId, name: &str) -> crate::Result<Option<usize>> {
		let wanted = standardise(name);
		for c in 0..self.column_count(table)? {
			if standardise(&self.column(table, c)?.name) == wanted {
				return Ok(Some(c));
			}
		}
		Ok(None)
	}

	fn table_def(&self, table: TableId) -> crate::Result<TableDef> {
		Ok(TableDef {
			id: table,
			name: self.table_name(table)?,
			flags: self.table_flags(table)?,
			tags: self.table_tags(table)?,
			columns: self.columns(table)?,
		})
	}

	fn row_count(&self, table: TableId) -> crate::Result<usize>;

	fn row_id(&self, table: TableId, index: usize) -> crate::Result<RowId>;

	fn row_index(&self, table: TableId, row: RowId) -> crate::Result<Option<usize>>;

	fn contains_row(&self, table: TableId, row: RowId) -> crate::Result<bool> {
		Ok(self.row_index(table, row)?.is_some())
	}

	fn row_ids(&self, table: TableId) -> crate::Result<Vec<RowId>> {
		(0..self.row_count(table)?).map(|i| self.row_id(table, i)).collect()
	}

	fn value_at(&self, table: TableId, index: usize, col: usize) -> crate::Result<Value> {
		let row = self.row_id(table, index)?;
		self.value_by_id(table, row, col)
	}

	fn value_by_id(&self, table: TableId, row: RowId, col: usize) -> crate::Result<Value>;

	fn set_value_at(&self, table: TableId, index: usize, col: usize, value: Value) -> crate::Result<()> {
		let row = self.row_id(table, index)?;
		self.set_value_by_id(table, row, col, value)
	}

	fn set_value_by_id(&self, _table: TableId, _row: RowId, _col: usize, _value: Value) -> crate::Result<()> {
		Err(Error::unsupported("set_value"))
	}

	fn row_flags(&self, table: TableId, row: RowId) -> crate::Result<RowFlags> {
		self.require_row(table, row)?;
		Ok(RowFlags::empty())
	}

	fn set_row_flags(&self, _table: TableId, _row: RowId, _flags: RowFlags) -> crate::Result<()> {
		Err(Error::unsupported("set_row_flags"))
	}

	/// Milliseconds since the unix epoch of the last write to the row.
	fn row_last_modified(&self, table: TableId, row: RowId) -> crate::Result<i64> {
		self.require_row(table, row)?;
		Ok(0)
	}

	fn create_row(&self, _table: TableId) -> crate::Result<RowId> {
		Err(Error::unsupported("create_row"))
	}

	fn insert_row(&self, _table: TableId, _index: usize) -> crate::Result<RowId> {
		Err(Error::unsupported("insert_row"))
	}

	fn delete_row(&self, _table: TableId, _row: RowId) -> crate::Result<()> {
		Err(Error::unsupported("delete_row"))
	}

	fn add_column(&self, _table: TableId, _column: ColumnToCreate) -> crate::Result<ColumnId> {
		Err(Error::unsupported("add_column"))
	}

	fn insert_column(&self, _table: TableId, _index: usize, _column: ColumnToCreate) -> crate::Result<ColumnId> {
		Err(Error::unsupported("insert_column"))
	}

	fn delete_column(&self, _table: TableId, _col: usize) -> crate::Result<()> {
		Err(Error::unsupported("delete_column"))
	}

	fn set_column_flags(&self, _table: TableId, _col: usize, _flags: ColumnFlags) -> crate::Result<()> {
		Err(Error::unsupported("set_column_flags"))
	}

	fn set_column_default(&self, _table: TableId, _col: usize, _value: Value) -> crate::Result<()> {
		Err(Error::unsupported("set_column_default"))
	}

	fn set_table_name(&self, _table: TableId, _name: &str) -> crate::Result<()> {
		Err(Error::unsupported("set_table_name"))
	}

	fn create_table(&self, _name: &str) -> crate::Result<TableId> {
		Err(Error::unsupported("create_table"))
	}

	fn delete_table(&self, _table: TableId) -> crate::Result<()> {
		Err(Error::unsupported("delete_table"))
	}

	/// Ids of the rows whose value in `col` equals `value`.
	///
	/// The default implementation scans the table. Stores with an index
	/// override it.
	fn find(&self, table: TableId, col: usize, value: &Value) -> crate::Result<Vec<RowId>> {
		let ty = self.column(table, col)?.ty;
		let Ok(wanted) = ty.coerce(value) else {
			return Ok(vec![]);
		};
		let mut result = vec![];
		for index in 0..self.row_count(table)? {
			if loose_eq(&self.value_at(table, index, col)?, &wanted) {
				result.push(self.row_id(table, index)?);
			}
		}
		Ok(result)
	}

	fn add_listener(&self, _table: TableId, _listener: Arc<dyn TableListener>) -> crate::Result<()> {
		Err(Error::unsupported("add_listener"))
	}

	fn remove_listener(&self, _table: TableId, _listener: &Arc<dyn TableListener>) -> crate::Result<bool> {
		Ok(false)
	}

	/// Queues events until the matching [`Datastore::enable_listeners`].
	fn disable_listeners(&self) {}

	fn enable_listeners(&self) {}

	fn is_rollback_supported(&self) -> bool {
		false
	}

	fn is_in_transaction(&self) -> bool {
		false
	}

	fn start_transaction(&self) -> crate::Result<()> {
		Ok(())
	}

	fn end_transaction(&self) -> crate::Result<()> {
		Ok(())
	}

	fn rollback_transaction(&self) -> crate::Result<()> {
		Err(Error::unsupported("rollback_transaction"))
	}

	/// The identity-stable facade of `table`.
	fn table(&self, table: TableId) -> crate::Result<Arc<TableHandle>> {
		self.check_table(table)?;
		Ok(self.handles().get(table))
	}

	fn check_table(&self, table: TableId) -> crate::Result<()> {
		if self.contains_table(table) {
			Ok(())
		} else {
			Err(Error::TableNotFound {
				table,
			})
		}
	}

	fn require_row(&self, table: TableId, row: RowId) -> crate::Result<usize> {
		self.row_index(table, row)?.ok_or(Error::RowNotFound {
			row,
		})
	}
}
