// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Row store kept entirely in memory.
//!
//! Values are coerced to the column type on write. `find` uses a per-column
//! hash index that is built on first use and dropped on the next write to the
//! table. Transactions snapshot the whole store and restore it on rollback.

use std::{
	collections::{BTreeSet, HashMap},
	sync::{Arc, Weak},
};

use parking_lot::{Mutex, RwLock};
use tabula_type::Value;
use tracing::{debug, instrument};

use crate::{
	ColumnDef, ColumnFlags, ColumnId, ColumnToCreate, Datastore, Error, ListenerSupport, RowFlags, RowId, TableFlags,
	TableHandles, TableId, TableListener, TableToCreate,
	listener::TableEvent,
	memory::{index::ColumnIndex, table::MemoryTable},
	now_millis,
};

mod index;
mod table;

#[derive(Debug, Clone, Default)]
struct State {
	tables: Vec<MemoryTable>,
	next_table: u32,
}

impl State {
	fn table(&self, id: TableId) -> crate::Result<&MemoryTable> {
		self.tables.iter().find(|t| t.id() == id).ok_or(Error::TableNotFound {
			table: id,
		})
	}

	fn table_mut(&mut self, id: TableId) -> crate::Result<&mut MemoryTable> {
		self.tables.iter_mut().find(|t| t.id() == id).ok_or(Error::TableNotFound {
			table: id,
		})
	}
}

pub struct MemoryDatastore {
	state: RwLock<State>,
	snapshot: Mutex<Option<State>>,
	indexes: Mutex<HashMap<(TableId, usize), Arc<ColumnIndex>>>,
	listeners: ListenerSupport,
	handles: TableHandles,
}

impl MemoryDatastore {
	pub fn new() -> Arc<Self> {
		Arc::new_cyclic(|this: &Weak<MemoryDatastore>| {
			let owner: Weak<dyn Datastore> = this.clone();
			MemoryDatastore {
				state: RwLock::new(State {
					tables: vec![],
					next_table: 1,
				}),
				snapshot: Mutex::new(None),
				indexes: Mutex::new(HashMap::new()),
				listeners: ListenerSupport::new(),
				handles: TableHandles::new(owner),
			}
		})
	}

	#[instrument(name = "memory::create_table", level = "trace", skip(self, to_create), fields(name = %to_create.name))]
	pub fn create_table_with(&self, to_create: TableToCreate) -> crate::Result<TableId> {
		let id = {
			let mut state = self.state.write();
			let id = TableId(state.next_table);
			state.next_table += 1;
			state.tables.push(MemoryTable::new(id, to_create));
			id
		};
		self.listeners.fire(TableEvent::structure(id));
		Ok(id)
	}

	/// Appends a row, coercing each value to its column type. Missing trailing
	/// values take the column default.
	pub fn append_row(&self, table: TableId, values: impl IntoIterator<Item = Value>) -> crate::Result<RowId> {
		let (row, index) = {
			let mut state = self.state.write();
			let t = state.table_mut(table)?;
			let coerced = values
				.into_iter()
				.enumerate()
				.map(|(col, value)| t.column(col).and_then(|c| Ok(c.ty.coerce(&value)?)))
				.collect::<crate::Result<Vec<_>>>()?;
			let at = t.rows.len();
			let (row, index) = t.insert_row(at)?;
			let stored = &mut t.rows[index];
			for (col, value) in coerced.into_iter().enumerate() {
				stored.values[col] = value;
			}
			(row, index)
		};
		self.invalidate(table);
		self.listeners.fire(TableEvent::rows(table, index, index));
		Ok(row)
	}

	fn invalidate(&self, table: TableId) {
		self.indexes.lock().retain(|(t, _), _| *t != table);
	}

	fn index(&self, table: TableId, col: usize) -> crate::Result<Arc<ColumnIndex>> {
		if let Some(index) = self.indexes.lock().get(&(table, col)) {
			return Ok(index.clone());
		}

		let built = {
			let state = self.state.read();
			let t = state.table(table)?;
			t.column(col)?;
			Arc::new(ColumnIndex::build(t.rows.iter().map(|r| (r.id, &r.values[col]))))
		};
		debug!(table = %table, col, "built column index");
		self.indexes.lock().insert((table, col), built.clone());
		Ok(built)
	}

	fn structure_changed(&self, table: TableId) {
		self.invalidate(table);
		self.listeners.fire(TableEvent::structure(table));
	}
}

impl Datastore for MemoryDatastore {
	fn handles(&self) -> &TableHandles {
		&self.handles
	}

	fn table_count(&self) -> usize {
		self.state.read().tables.len()
	}

	fn table_id_at(&self, index: usize) -> Option<TableId> {
		self.state.read().tables.get(index).map(|t| t.id())
	}

	fn contains_table(&self, table: TableId) -> bool {
		self.state.read().table(table).is_ok()
	}

	fn table_name(&self, table: TableId) -> crate::Result<String> {
		Ok(self.state.read().table(table)?.def.name.clone())
	}

	fn table_flags(&self, table: TableId) -> crate::Result<TableFlags> {
		Ok(self.state.read().table(table)?.def.flags)
	}

	fn table_tags(&self, table: TableId) -> crate::Result<BTreeSet<String>> {
		Ok(self.state.read().table(table)?.def.tags.clone())
	}

	fn column_count(&self, table: TableId) -> crate::Result<usize> {
		Ok(self.state.read().table(table)?.def.columns.len())
	}

	fn column(&self, table: TableId, col: usize) -> crate::Result<ColumnDef> {
		Ok(self.state.read().table(table)?.column(col)?.clone())
	}

	fn columns(&self, table: TableId) -> crate::Result<Vec<ColumnDef>> {
		Ok(self.state.read().table(table)?.def.columns.clone())
	}

	fn row_count(&self, table: TableId) -> crate::Result<usize> {
		Ok(self.state.read().table(table)?.rows.len())
	}

	fn row_id(&self, table: TableId, index: usize) -> crate::Result<RowId> {
		Ok(self.state.read().table(table)?.row_at(index)?.id)
	}

	fn row_index(&self, table: TableId, row: RowId) -> crate::Result<Option<usize>> {
		Ok(self.state.read().table(table)?.index_of(row))
	}

	fn row_ids(&self, table: TableId) -> crate::Result<Vec<RowId>> {
		Ok(self.state.read().table(table)?.rows.iter().map(|r| r.id).collect())
	}

	fn value_at(&self, table: TableId, index: usize, col: usize) -> crate::Result<Value> {
		let state = self.state.read();
		let t = state.table(table)?;
		t.column(col)?;
		Ok(t.row_at(index)?.values[col].clone())
	}

	fn value_by_id(&self, table: TableId, row: RowId, col: usize) -> crate::Result<Value> {
		let state = self.state.read();
		let t = state.table(table)?;
		t.column(col)?;
		Ok(t.row(row)?.values[col].clone())
	}

	fn set_value_by_id(&self, table: TableId, row: RowId, col: usize, value: Value) -> crate::Result<()> {
		let index = {
			let mut state = self.state.write();
			let t = state.table_mut(table)?;
			let value = t.column(col)?.ty.coerce(&value)?;
			let index = t.index_of(row).ok_or(Error::RowNotFound {
				row,
			})?;
			let stored = &mut t.rows[index];
			stored.values[col] = value;
			stored.modified = now_millis();
			index
		};
		self.invalidate(table);
		self.listeners.fire(TableEvent::rows(table, index, index));
		Ok(())
	}

	fn row_flags(&self, table: TableId, row: RowId) -> crate::Result<RowFlags> {
		Ok(self.state.read().table(table)?.row(row)?.flags)
	}

	fn set_row_flags(&self, table: TableId, row: RowId, flags: RowFlags) -> crate::Result<()> {
		let index = {
			let mut state = self.state.write();
			let t = state.table_mut(table)?;
			t.row_mut(row)?.flags = flags;
			t.index_of(row).unwrap_or(0)
		};
		self.listeners.fire(TableEvent::rows(table, index, index));
		Ok(())
	}

	fn row_last_modified(&self, table: TableId, row: RowId) -> crate::Result<i64> {
		Ok(self.state.read().table(table)?.row(row)?.modified)
	}

	fn create_row(&self, table: TableId) -> crate::Result<RowId> {
		let count = self.row_count(table)?;
		self.insert_row(table, count)
	}

	fn insert_row(&self, table: TableId, index: usize) -> crate::Result<RowId> {
		let (row, index) = self.state.write().table_mut(table)?.insert_row(index)?;
		self.invalidate(table);
		self.listeners.fire(TableEvent::rows(table, index, usize::MAX));
		Ok(row)
	}

	fn delete_row(&self, table: TableId, row: RowId) -> crate::Result<()> {
		let index = self.state.write().table_mut(table)?.remove_row(row)?;
		self.invalidate(table);
		self.listeners.fire(TableEvent::rows(table, index, usize::MAX));
		Ok(())
	}

	fn add_column(&self, table: TableId, column: ColumnToCreate) -> crate::Result<ColumnId> {
		let count = self.column_count(table)?;
		self.insert_column(table, count, column)
	}

	fn insert_column(&self, table: TableId, index: usize, column: ColumnToCreate) -> crate::Result<ColumnId> {
		let id = self.state.write().table_mut(table)?.insert_column(index, column);
		self.structure_changed(table);
		Ok(id)
	}

	fn delete_column(&self, table: TableId, col: usize) -> crate::Result<()> {
		self.state.write().table_mut(table)?.delete_column(col)?;
		self.structure_changed(table);
		Ok(())
	}

	fn set_column_flags(&self, table: TableId, col: usize, flags: ColumnFlags) -> crate::Result<()> {
		self.state.write().table_mut(table)?.column_mut(col)?.flags = flags;
		self.structure_changed(table);
		Ok(())
	}

	fn set_column_default(&self, table: TableId, col: usize, value: Value) -> crate::Result<()> {
		{
			let mut state = self.state.write();
			let column = state.table_mut(table)?.column_mut(col)?;
			column.default = column.ty.coerce(&value)?;
		}
		self.structure_changed(table);
		Ok(())
	}

	fn set_table_name(&self, table: TableId, name: &str) -> crate::Result<()> {
		self.state.write().table_mut(table)?.def.name = name.to_string();
		self.structure_changed(table);
		Ok(())
	}

	fn create_table(&self, name: &str) -> crate::Result<TableId> {
		self.create_table_with(TableToCreate::new(name))
	}

	fn delete_table(&self, table: TableId) -> crate::Result<()> {
		{
			let mut state = self.state.write();
			state.table(table)?;
			state.tables.retain(|t| t.id() != table);
		}
		self.handles.forget(table);
		self.structure_changed(table);
		Ok(())
	}

	fn find(&self, table: TableId, col: usize, value: &Value) -> crate::Result<Vec<RowId>> {
		let ty = self.column(table, col)?.ty;
		let Ok(wanted) = ty.coerce(value) else {
			return Ok(vec![]);
		};
		Ok(self.index(table, col)?.get(&wanted))
	}

	fn add_listener(&self, table: TableId, listener: Arc<dyn TableListener>) -> crate::Result<()> {
		self.check_table(table)?;
		self.listeners.add(table, listener);
		Ok(())
	}

	fn remove_listener(&self, table: TableId, listener: &Arc<dyn TableListener>) -> crate::Result<bool> {
		Ok(self.listeners.remove(table, listener))
	}

	fn disable_listeners(&self) {
		self.listeners.disable();
	}

	fn enable_listeners(&self) {
		self.listeners.enable();
	}

	fn is_rollback_supported(&self) -> bool {
		true
	}

	fn is_in_transaction(&self) -> bool {
		self.snapshot.lock().is_some()
	}

	fn start_transaction(&self) -> crate::Result<()> {
		let mut snapshot = self.snapshot.lock();
		if snapshot.is_some() {
			return Err(Error::TransactionState {
				reason: "transaction already started".to_string(),
			});
		}
		*snapshot = Some(self.state.read().clone());
		Ok(())
	}

	fn end_transaction(&self) -> crate::Result<()> {
		match self.snapshot.lock().take() {
			Some(_) => Ok(()),
			None => Err(Error::TransactionState {
				reason: "no transaction in progress".to_string(),
			}),
		}
	}

	fn rollback_transaction(&self) -> crate::Result<()> {
		let Some(restored) = self.snapshot.lock().take() else {
			return Err(Error::TransactionState {
				reason: "no transaction in progress".to_string(),
			});
		};
		let tables: Vec<TableId> = {
			let mut state = self.state.write();
			let mut affected: Vec<TableId> = state.tables.iter().map(|t| t.id()).collect();
			for t in &restored.tables {
				if !affected.contains(&t.id()) {
					affected.push(t.id());
				}
			}
			*state = restored;
			affected
		};
		self.indexes.lock().clear();
		for table in tables {
			self.listeners.fire(TableEvent::structure(table));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use tabula_type::Type;

	use super::*;

	fn people() -> (Arc<MemoryDatastore>, TableId) {
		let store = MemoryDatastore::new();
		let table = store
			.create_table_with(TableToCreate::new("people").column("name", Type::Utf8).column("age", Type::Int8))
			.unwrap();
		store.append_row(table, [Value::utf8("ann"), Value::utf8("31")]).unwrap();
		store.append_row(table, [Value::utf8("bob"), Value::Int8(40)]).unwrap();
		store.append_row(table, [Value::utf8("cid"), Value::Float8(31.0)]).unwrap();
		(store, table)
	}

	#[test]
	fn test_values_are_coerced() {
		let (store, table) = people();
		assert_eq!(store.value_at(table, 0, 1).unwrap(), Value::Int8(31));
		assert!(store.set_value_at(table, 0, 1, Value::utf8("old")).is_err());
	}

	#[test]
	fn test_find_uses_index_and_tracks_writes() {
		let (store, table) = people();
		let found = store.find(table, 1, &Value::utf8("31")).unwrap();
		assert_eq!(found, vec![store.row_id(table, 0).unwrap(), store.row_id(table, 2).unwrap()]);

		store.set_value_at(table, 1, 1, Value::Int8(31)).unwrap();
		assert_eq!(store.find(table, 1, &Value::Int8(31)).unwrap().len(), 3);
		assert!(store.find(table, 1, &Value::utf8("not a number")).unwrap().is_empty());
	}

	#[test]
	fn test_row_ids_survive_deletes() {
		let (store, table) = people();
		let bob = store.row_id(table, 1).unwrap();
		let cid = store.row_id(table, 2).unwrap();
		store.delete_row(table, bob).unwrap();
		assert_eq!(store.row_index(table, cid).unwrap(), Some(1));
		assert!(!store.contains_row(table, bob).unwrap());
		assert!(matches!(store.value_by_id(table, bob, 0), Err(Error::RowNotFound { .. })));
	}

	#[test]
	fn test_handles_are_identity_stable() {
		let (store, table) = people();
		let a = store.table(table).unwrap();
		let b = store.table(table).unwrap();
		assert!(Arc::ptr_eq(&a, &b));
		assert_eq!(a.name().unwrap(), "people");
		assert_eq!(a.value_at(2, 0).unwrap(), Value::utf8("cid"));
		assert!(matches!(store.table(TableId(99)), Err(Error::TableNotFound { .. })));
	}

	#[test]
	fn test_handle_detaches() {
		let (store, table) = people();
		let handle = store.table(table).unwrap();
		drop(store);
		assert!(matches!(handle.row_count(), Err(Error::Detached { .. })));
	}

	#[test]
	fn test_rollback_restores_snapshot() {
		let (store, table) = people();
		store.start_transaction().unwrap();
		assert!(store.start_transaction().is_err());
		store.set_value_at(table, 0, 0, Value::utf8("zed")).unwrap();
		store.create_row(table).unwrap();
		store.rollback_transaction().unwrap();

		assert_eq!(store.row_count(table).unwrap(), 3);
		assert_eq!(store.value_at(table, 0, 0).unwrap(), Value::utf8("ann"));
		assert!(!store.is_in_transaction());
	}

	#[test]
	fn test_column_edits() {
		let (store, table) = people();
		let col = store.insert_column(table, 0, ColumnToCreate::new("id", Type::Int8).with_default(Value::Int8(0))).unwrap();
		assert_eq!(store.column(table, 0).unwrap().id, col);
		assert_eq!(store.value_at(table, 2, 0).unwrap(), Value::Int8(0));
		assert_eq!(store.value_at(table, 2, 1).unwrap(), Value::utf8("cid"));
		store.delete_column(table, 0).unwrap();
		assert_eq!(store.column_index(table, " AGE ").unwrap(), Some(1));
	}
}
