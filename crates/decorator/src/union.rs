// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::{Arc, Weak};

use tabula_core::{
	Datastore, DatastoreRef, Error, ListenerSupport, RowFlags, RowId, TableEvent, TableFlags, TableHandles, TableId,
	TableListener, TransactionPropagation, Value,
};
use tracing::instrument;

/// Concatenation of two or more structurally identical stores.
///
/// Row index `i` of a table addresses the stores in order, each contributing
/// its row count. Row ids are looked up by asking each store in turn whether
/// it holds the id. Values can be written through; anything that would change
/// rows or columns fails because it is ambiguous which store it applies to.
pub struct UnionDecorator {
	stores: Vec<DatastoreRef>,
	listeners: ListenerSupport,
	transactions: TransactionPropagation,
	handles: TableHandles,
}

impl UnionDecorator {
	/// Fails with [`Error::MalformedUnion`] unless there are at least two
	/// stores with the same table ids, and per table the same column ids and
	/// types, all in the same order.
	#[instrument(name = "union::new", level = "debug", skip(stores), fields(stores = stores.len()))]
	pub fn new(stores: Vec<DatastoreRef>) -> tabula_core::Result<Arc<Self>> {
		if stores.len() < 2 {
			return Err(Error::MalformedUnion {
				reason: format!("a union needs at least two stores, got {}", stores.len()),
			});
		}

		let first = &stores[0];
		let tables = first.table_ids();
		for (position, store) in stores.iter().enumerate().skip(1) {
			if store.table_ids() != tables {
				return Err(Error::MalformedUnion {
					reason: format!("store {} does not have the same tables as store 0", position),
				});
			}
			for table in &tables {
				if !first.table_def(*table)?.same_layout(&store.table_def(*table)?) {
					return Err(Error::MalformedUnion {
						reason: format!("table {} of store {} has different columns", table, position),
					});
				}
			}
		}

		Ok(Arc::new_cyclic(|this: &Weak<UnionDecorator>| {
			let owner: Weak<dyn Datastore> = this.clone();
			UnionDecorator {
				stores,
				listeners: ListenerSupport::new(),
				transactions: TransactionPropagation::new(),
				handles: TableHandles::new(owner),
			}
		}))
	}

	pub fn stores(&self) -> &[DatastoreRef] {
		&self.stores
	}

	/// Store position and store-local row index of union row `index`.
	pub fn locate(&self, table: TableId, index: usize) -> tabula_core::Result<(usize, usize)> {
		let mut offset = 0;
		for (position, store) in self.stores.iter().enumerate() {
			let count = store.row_count(table)?;
			if index < offset + count {
				return Ok((position, index - offset));
			}
			offset += count;
		}
		Err(Error::RowIndexOutOfBounds {
			table,
			index,
			count: offset,
		})
	}

	/// The store holding `row`, with the union row index of the row.
	fn owner(&self, table: TableId, row: RowId) -> tabula_core::Result<Option<(&DatastoreRef, usize)>> {
		let mut offset = 0;
		for store in &self.stores {
			if let Some(local) = store.row_index(table, row)? {
				return Ok(Some((store, offset + local)));
			}
			offset += store.row_count(table)?;
		}
		Ok(None)
	}

	fn require_owner(&self, table: TableId, row: RowId) -> tabula_core::Result<(&DatastoreRef, usize)> {
		self.owner(table, row)?.ok_or(Error::RowNotFound {
			row,
		})
	}
}

impl Datastore for UnionDecorator {
	fn handles(&self) -> &TableHandles {
		&self.handles
	}

	fn table_count(&self) -> usize {
		self.stores[0].table_count()
	}

	fn table_id_at(&self, index: usize) -> Option<TableId> {
		self.stores[0].table_id_at(index)
	}

	fn table_name(&self, table: TableId) -> tabula_core::Result<String> {
		self.stores[0].table_name(table)
	}

	/// Flags of the first store without any row or column structure edits.
	fn table_flags(&self, table: TableId) -> tabula_core::Result<TableFlags> {
		Ok(self.stores[0]
			.table_flags(table)?
			.without(TableFlags::COLUMN_EDIT | TableFlags::ALLOW_ADD_ROW | TableFlags::ALLOW_DELETE_ROW))
	}

	fn table_tags(&self, table: TableId) -> tabula_core::Result<std::collections::BTreeSet<String>> {
		self.stores[0].table_tags(table)
	}

	fn column_count(&self, table: TableId) -> tabula_core::Result<usize> {
		self.stores[0].column_count(table)
	}

	fn column(&self, table: TableId, col: usize) -> tabula_core::Result<tabula_core::ColumnDef> {
		self.stores[0].column(table, col)
	}

	fn row_count(&self, table: TableId) -> tabula_core::Result<usize> {
		self.stores.iter().map(|s| s.row_count(table)).sum()
	}

	fn row_id(&self, table: TableId, index: usize) -> tabula_core::Result<RowId> {
		let (position, local) = self.locate(table, index)?;
		self.stores[position].row_id(table, local)
	}

	fn row_index(&self, table: TableId, row: RowId) -> tabula_core::Result<Option<usize>> {
		Ok(self.owner(table, row)?.map(|(_, index)| index))
	}

	fn value_at(&self, table: TableId, index: usize, col: usize) -> tabula_core::Result<Value> {
		let (position, local) = self.locate(table, index)?;
		self.stores[position].value_at(table, local, col)
	}

	fn value_by_id(&self, table: TableId, row: RowId, col: usize) -> tabula_core::Result<Value> {
		let (store, _) = self.require_owner(table, row)?;
		store.value_by_id(table, row, col)
	}

	fn set_value_by_id(&self, table: TableId, row: RowId, col: usize, value: Value) -> tabula_core::Result<()> {
		let (store, index) = self.require_owner(table, row)?;
		store.set_value_by_id(table, row, col, value)?;
		self.listeners.fire(TableEvent::rows(table, index, index));
		Ok(())
	}

	fn row_flags(&self, table: TableId, row: RowId) -> tabula_core::Result<RowFlags> {
		let (store, _) = self.require_owner(table, row)?;
		store.row_flags(table, row)
	}

	fn set_row_flags(&self, table: TableId, row: RowId, flags: RowFlags) -> tabula_core::Result<()> {
		let (store, index) = self.require_owner(table, row)?;
		store.set_row_flags(table, row, flags)?;
		self.listeners.fire(TableEvent::rows(table, index, index));
		Ok(())
	}

	fn row_last_modified(&self, table: TableId, row: RowId) -> tabula_core::Result<i64> {
		let (store, _) = self.require_owner(table, row)?;
		store.row_last_modified(table, row)
	}

	fn find(&self, table: TableId, col: usize, value: &Value) -> tabula_core::Result<Vec<RowId>> {
		let mut result = vec![];
		for store in &self.stores {
			result.extend(store.find(table, col, value)?);
		}
		Ok(result)
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
		TransactionPropagation::rollback_supported(&self.stores)
	}

	fn is_in_transaction(&self) -> bool {
		self.transactions.is_active()
	}

	fn start_transaction(&self) -> tabula_core::Result<()> {
		self.transactions.start(&self.stores)
	}

	fn end_transaction(&self) -> tabula_core::Result<()> {
		self.transactions.end()
	}

	fn rollback_transaction(&self) -> tabula_core::Result<()> {
		self.transactions.rollback()?;
		for table in self.table_ids() {
			self.listeners.fire(TableEvent::structure(table));
		}
		Ok(())
	}
}
