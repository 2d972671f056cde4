// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	cmp::Ordering,
	collections::{BTreeSet, HashMap, HashSet},
	sync::{Arc, Weak},
};

use indexmap::{IndexMap, IndexSet, map::Entry};
use parking_lot::RwLock;
use tabula_core::{
	ColumnDef, Datastore, DatastoreRef, Error, ListenerSupport, RowFlags, RowId, TableEvent, TableFlags, TableHandles,
	TableId, TableListener, TransactionPropagation, Value,
};
use tabula_type::loose_eq;
use tracing::{debug, instrument};

use crate::DEFAULT_INDEX_THRESHOLD;

/// Admitted rows of one table, in view order.
#[derive(Debug, Default, Clone)]
struct Admitted {
	rows: Vec<RowId>,
	positions: HashMap<RowId, usize>,
}

impl Admitted {
	fn len(&self) -> usize {
		self.rows.len()
	}

	fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	fn position(&self, row: RowId) -> Option<usize> {
		self.positions.get(&row).copied()
	}

	fn push(&mut self, row: RowId) -> bool {
		if self.positions.contains_key(&row) {
			return false;
		}
		self.positions.insert(row, self.rows.len());
		self.rows.push(row);
		true
	}

	fn remove(&mut self, row: RowId) -> Option<usize> {
		let index = self.positions.remove(&row)?;
		self.rows.remove(index);
		self.reindex(index);
		Some(index)
	}

	/// Keeps the rows for which `keep` holds, returning how many were dropped.
	fn retain(&mut self, keep: impl Fn(&RowId) -> bool) -> usize {
		let before = self.rows.len();
		self.rows.retain(|r| keep(r));
		if self.rows.len() != before {
			self.positions.clear();
			self.reindex(0);
		}
		before - self.rows.len()
	}

	fn replace(&mut self, rows: Vec<RowId>) {
		self.rows = rows;
		self.positions.clear();
		self.reindex(0);
	}

	fn reindex(&mut self, from: usize) {
		for (offset, row) in self.rows[from..].iter().enumerate() {
			self.positions.insert(*row, from + offset);
		}
	}
}

/// Counts reported by [`RowFilterDecorator::update`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterUpdate {
	pub rows_added: usize,
	pub rows_removed: usize,
	pub tables_added: usize,
	pub tables_removed: usize,
}

impl FilterUpdate {
	pub fn is_unchanged(&self) -> bool {
		*self == FilterUpdate::default()
	}
}

/// A view exposing only the admitted rows of some tables of a backing store.
///
/// Values are read from and written to the backing store; deleting a row
/// deletes it underneath as well. Rows cannot be created or inserted and
/// columns cannot be edited through the view. The admitted lists are not part
/// of any transaction, so rollback is never supported.
pub struct RowFilterDecorator {
	inner: DatastoreRef,
	tables: RwLock<IndexMap<TableId, Admitted>>,
	index_threshold: usize,
	listeners: ListenerSupport,
	transactions: TransactionPropagation,
	handles: TableHandles,
}

impl RowFilterDecorator {
	pub fn new(inner: DatastoreRef) -> Arc<Self> {
		Self::with_index_threshold(inner, DEFAULT_INDEX_THRESHOLD)
	}

	pub fn with_index_threshold(inner: DatastoreRef, index_threshold: usize) -> Arc<Self> {
		Arc::new_cyclic(|this: &Weak<RowFilterDecorator>| {
			let owner: Weak<dyn Datastore> = this.clone();
			RowFilterDecorator {
				inner,
				tables: RwLock::new(IndexMap::new()),
				index_threshold,
				listeners: ListenerSupport::new(),
				transactions: TransactionPropagation::new(),
				handles: TableHandles::new(owner),
			}
		})
	}

	pub fn inner(&self) -> &DatastoreRef {
		&self.inner
	}

	pub fn index_threshold(&self) -> usize {
		self.index_threshold
	}

	/// Exposes `table` with no admitted rows. Returns `false` when the table
	/// is already part of the view.
	pub fn add_table(&self, table: TableId) -> tabula_core::Result<bool> {
		self.inner.check_table(table)?;
		let added = match self.tables.write().entry(table) {
			Entry::Occupied(_) => false,
			Entry::Vacant(v) => {
				v.insert(Admitted::default());
				true
			}
		};
		if added {
			self.listeners.fire(TableEvent::structure(table));
		}
		Ok(added)
	}

	/// Admits `row`, adding its table to the view if needed. Returns `false`
	/// when the backing table has no such row or the row is already admitted.
	pub fn add_row_to_filter(&self, table: TableId, row: RowId) -> tabula_core::Result<bool> {
		if !self.inner.contains_table(table) || !self.inner.contains_row(table, row)? {
			return Ok(false);
		}
		let (index, new_table) = {
			let mut tables = self.tables.write();
			let new_table = !tables.contains_key(&table);
			let admitted = tables.entry(table).or_default();
			if !admitted.push(row) {
				return Ok(false);
			}
			(admitted.len() - 1, new_table)
		};
		if new_table {
			self.listeners.fire(TableEvent::structure(table));
		} else {
			self.listeners.fire(TableEvent::rows(table, index, index));
		}
		Ok(true)
	}

	/// Reconciles the view with `ids`, a set of row ids across all tables.
	///
	/// Admitted rows missing from `ids` are dropped. Rows of `ids` that exist
	/// in the backing store are admitted, in backing-store order, adding their
	/// tables as needed. With `allow_table_deletion`, tables left without rows
	/// leave the view.
	#[instrument(name = "filter::update", level = "debug", skip(self, ids), fields(ids = ids.len()))]
	pub fn update(&self, ids: &HashSet<RowId>, allow_table_deletion: bool) -> tabula_core::Result<FilterUpdate> {
		let mut additions: IndexMap<TableId, Vec<(usize, RowId)>> = IndexMap::new();
		for row in ids {
			if !self.inner.contains_table(row.table) {
				continue;
			}
			if let Some(index) = self.inner.row_index(row.table, *row)? {
				additions.entry(row.table).or_default().push((index, *row));
			}
		}

		let mut result = FilterUpdate::default();
		let mut changed: IndexSet<TableId> = IndexSet::new();
		{
			let mut tables = self.tables.write();
			for (table, admitted) in tables.iter_mut() {
				let removed = admitted.retain(|r| ids.contains(r));
				if removed > 0 {
					result.rows_removed += removed;
					changed.insert(*table);
				}
			}

			for (table, mut rows) in additions {
				rows.sort_by_key(|(index, _)| *index);
				let admitted = match tables.entry(table) {
					Entry::Occupied(e) => e.into_mut(),
					Entry::Vacant(v) => {
						result.tables_added += 1;
						changed.insert(table);
						v.insert(Admitted::default())
					}
				};
				for (_, row) in rows {
					if admitted.push(row) {
						result.rows_added += 1;
						changed.insert(table);
					}
				}
			}

			if allow_table_deletion {
				let before = tables.len();
				tables.retain(|table, admitted| {
					if admitted.is_empty() {
						changed.insert(*table);
						false
					} else {
						true
					}
				});
				result.tables_removed = before - tables.len();
			}
		}

		debug!(?result, "filter updated");
		for table in changed {
			self.listeners.fire(TableEvent::structure(table));
		}
		Ok(result)
	}

	/// Admitted row ids of `table` in view order.
	pub fn admitted_rows(&self, table: TableId) -> tabula_core::Result<Vec<RowId>> {
		self.read(table, |a| a.rows.clone())
	}

	/// Reorders the admitted rows of `table`. Rows comparing equal keep their
	/// current relative order.
	pub fn sort_rows(
		&self,
		table: TableId,
		compare: impl FnMut(&RowId, &RowId) -> Ordering,
	) -> tabula_core::Result<()> {
		let mut rows = self.admitted_rows(table)?;
		rows.sort_by(compare);
		self.write(table, |a| a.replace(rows))?;
		self.listeners.fire(TableEvent::rows(table, 0, usize::MAX));
		Ok(())
	}

	/// Keeps only the first `limit` admitted rows of `table`. Returns how many
	/// were dropped.
	pub fn truncate(&self, table: TableId, limit: usize) -> tabula_core::Result<usize> {
		let dropped = self.write(table, |a| {
			if a.len() <= limit {
				return 0;
			}
			let kept = a.rows[..limit].to_vec();
			let dropped = a.len() - limit;
			a.replace(kept);
			dropped
		})?;
		if dropped > 0 {
			self.listeners.fire(TableEvent::rows(table, limit, usize::MAX));
		}
		Ok(dropped)
	}

	/// Drops every admitted row of `table`; the table stays in the view.
	pub fn clear_filter(&self, table: TableId) -> tabula_core::Result<()> {
		self.write(table, |a| a.replace(vec![]))?;
		self.listeners.fire(TableEvent::rows(table, 0, usize::MAX));
		Ok(())
	}

	fn read<R>(&self, table: TableId, f: impl FnOnce(&Admitted) -> R) -> tabula_core::Result<R> {
		let tables = self.tables.read();
		let admitted = tables.get(&table).ok_or(Error::TableNotFound {
			table,
		})?;
		Ok(f(admitted))
	}

	fn write<R>(&self, table: TableId, f: impl FnOnce(&mut Admitted) -> R) -> tabula_core::Result<R> {
		let mut tables = self.tables.write();
		let admitted = tables.get_mut(&table).ok_or(Error::TableNotFound {
			table,
		})?;
		Ok(f(admitted))
	}

	/// View index of an admitted row.
	fn admitted(&self, table: TableId, row: RowId) -> tabula_core::Result<usize> {
		self.read(table, |a| a.position(row))?.ok_or(Error::RowNotFound {
			row,
		})
	}
}

impl Datastore for RowFilterDecorator {
	fn handles(&self) -> &TableHandles {
		&self.handles
	}

	fn table_count(&self) -> usize {
		self.tables.read().len()
	}

	fn table_id_at(&self, index: usize) -> Option<TableId> {
		self.tables.read().get_index(index).map(|(id, _)| *id)
	}

	fn contains_table(&self, table: TableId) -> bool {
		self.tables.read().contains_key(&table)
	}

	fn table_name(&self, table: TableId) -> tabula_core::Result<String> {
		self.check_table(table)?;
		self.inner.table_name(table)
	}

	fn table_flags(&self, table: TableId) -> tabula_core::Result<TableFlags> {
		self.check_table(table)?;
		Ok(self.inner.table_flags(table)?.without(TableFlags::ALLOW_ADD_ROW | TableFlags::COLUMN_EDIT))
	}

	fn table_tags(&self, table: TableId) -> tabula_core::Result<BTreeSet<String>> {
		self.check_table(table)?;
		self.inner.table_tags(table)
	}

	fn column_count(&self, table: TableId) -> tabula_core::Result<usize> {
		self.check_table(table)?;
		self.inner.column_count(table)
	}

	fn column(&self, table: TableId, col: usize) -> tabula_core::Result<ColumnDef> {
		self.check_table(table)?;
		self.inner.column(table, col)
	}

	fn columns(&self, table: TableId) -> tabula_core::Result<Vec<ColumnDef>> {
		self.check_table(table)?;
		self.inner.columns(table)
	}

	fn row_count(&self, table: TableId) -> tabula_core::Result<usize> {
		self.read(table, Admitted::len)
	}

	fn row_id(&self, table: TableId, index: usize) -> tabula_core::Result<RowId> {
		self.read(table, |a| a.rows.get(index).copied().ok_or(a.len()))?.map_err(|count| {
			Error::RowIndexOutOfBounds {
				table,
				index,
				count,
			}
		})
	}

	fn row_index(&self, table: TableId, row: RowId) -> tabula_core::Result<Option<usize>> {
		self.read(table, |a| a.position(row))
	}

	fn value_by_id(&self, table: TableId, row: RowId, col: usize) -> tabula_core::Result<Value> {
		self.admitted(table, row)?;
		self.inner.value_by_id(table, row, col)
	}

	fn set_value_by_id(&self, table: TableId, row: RowId, col: usize, value: Value) -> tabula_core::Result<()> {
		let index = self.admitted(table, row)?;
		self.inner.set_value_by_id(table, row, col, value)?;
		self.listeners.fire(TableEvent::rows(table, index, index));
		Ok(())
	}

	fn row_flags(&self, table: TableId, row: RowId) -> tabula_core::Result<RowFlags> {
		self.admitted(table, row)?;
		self.inner.row_flags(table, row)
	}

	fn set_row_flags(&self, table: TableId, row: RowId, flags: RowFlags) -> tabula_core::Result<()> {
		let index = self.admitted(table, row)?;
		self.inner.set_row_flags(table, row, flags)?;
		self.listeners.fire(TableEvent::rows(table, index, index));
		Ok(())
	}

	fn row_last_modified(&self, table: TableId, row: RowId) -> tabula_core::Result<i64> {
		self.admitted(table, row)?;
		self.inner.row_last_modified(table, row)
	}

	fn delete_row(&self, table: TableId, row: RowId) -> tabula_core::Result<()> {
		self.admitted(table, row)?;
		self.inner.delete_row(table, row)?;
		if let Some(index) = self.write(table, |a| a.remove(row))? {
			self.listeners.fire(TableEvent::rows(table, index, usize::MAX));
		}
		Ok(())
	}

	fn find(&self, table: TableId, col: usize, value: &Value) -> tabula_core::Result<Vec<RowId>> {
		let count = self.row_count(table)?;
		if count >= self.index_threshold {
			let hits = self.inner.find(table, col, value)?;
			let mut positioned: Vec<(usize, RowId)> =
				self.read(table, |a| hits.iter().filter_map(|r| a.position(*r).map(|p| (p, *r))).collect())?;
			positioned.sort_by_key(|(p, _)| *p);
			return Ok(positioned.into_iter().map(|(_, r)| r).collect());
		}

		let ty = self.inner.column(table, col)?.ty;
		let Ok(wanted) = ty.coerce(value) else {
			return Ok(vec![]);
		};
		let mut result = vec![];
		for row in self.admitted_rows(table)? {
			if loose_eq(&self.inner.value_by_id(table, row, col)?, &wanted) {
				result.push(row);
			}
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
		false
	}

	fn is_in_transaction(&self) -> bool {
		self.transactions.is_active()
	}

	fn start_transaction(&self) -> tabula_core::Result<()> {
		self.transactions.start(std::slice::from_ref(&self.inner))
	}

	fn end_transaction(&self) -> tabula_core::Result<()> {
		self.transactions.end()
	}
}

#[cfg(test)]
mod tests {
	use std::{cmp::Ordering, collections::HashSet};

	use tabula_core::{Datastore, Error, MemoryDatastore, RowId, TableId, TableToCreate, Type, Value};
	use tabula_type::compare_numeric_aware;

	use super::*;

	fn example() -> (Arc<MemoryDatastore>, TableId, Vec<RowId>) {
		let store = MemoryDatastore::new();
		let table =
			store.create_table_with(TableToCreate::new("T").column("id", Type::Int8).column("x", Type::Int8)).unwrap();
		let rows = [(1, 5), (2, -3), (3, 5)]
			.into_iter()
			.map(|(id, x)| store.append_row(table, [Value::Int8(id), Value::Int8(x)]).unwrap())
			.collect();
		(store, table, rows)
	}

	fn ids(filter: &RowFilterDecorator, table: TableId) -> Vec<Value> {
		(0..filter.row_count(table).unwrap()).map(|i| filter.value_at(table, i, 0).unwrap()).collect()
	}

	#[test]
	fn test_add_row_to_filter() {
		let (store, table, rows) = example();
		let filter = RowFilterDecorator::new(store.clone());
		assert!(filter.add_row_to_filter(table, rows[2]).unwrap());
		assert!(filter.add_row_to_filter(table, rows[0]).unwrap());
		assert!(!filter.add_row_to_filter(table, rows[0]).unwrap());

		store.delete_row(table, rows[1]).unwrap();
		assert!(!filter.add_row_to_filter(table, rows[1]).unwrap());
		assert!(!filter.add_row_to_filter(TableId(99), rows[1]).unwrap());

		assert_eq!(ids(&filter, table), vec![Value::Int8(3), Value::Int8(1)]);
	}

	#[test]
	fn test_update_is_idempotent() {
		let (store, table, rows) = example();
		let filter = RowFilterDecorator::new(store);
		let wanted: HashSet<RowId> = [rows[2], rows[0]].into_iter().collect();

		let first = filter.update(&wanted, true).unwrap();
		assert_eq!(
			first,
			FilterUpdate {
				rows_added: 2,
				rows_removed: 0,
				tables_added: 1,
				tables_removed: 0,
			}
		);
		assert_eq!(ids(&filter, table), vec![Value::Int8(1), Value::Int8(3)]);
		assert!(filter.update(&wanted, true).unwrap().is_unchanged());

		let fewer: HashSet<RowId> = [rows[2]].into_iter().collect();
		assert_eq!(filter.update(&fewer, true).unwrap().rows_removed, 1);

		let removed = filter.update(&HashSet::new(), true).unwrap();
		assert_eq!((removed.rows_removed, removed.tables_removed), (1, 1));
		assert_eq!(filter.table_count(), 0);
	}

	#[test]
	fn test_find_below_and_above_threshold() {
		let (store, table, rows) = example();
		let small = RowFilterDecorator::new(store.clone());
		let indexed = RowFilterDecorator::with_index_threshold(store, 1);
		for filter in [&small, &indexed] {
			filter.add_row_to_filter(table, rows[2]).unwrap();
			filter.add_row_to_filter(table, rows[1]).unwrap();
			assert_eq!(filter.find(table, 1, &Value::utf8("5")).unwrap(), vec![rows[2]]);
			assert_eq!(filter.find(table, 1, &Value::Int8(-3)).unwrap(), vec![rows[1]]);
			assert!(filter.find(table, 1, &Value::utf8("nope")).unwrap().is_empty());
		}
	}

	#[test]
	fn test_sort_is_stable() {
		let (store, table, rows) = example();
		let filter = RowFilterDecorator::new(store.clone());
		for row in &rows {
			filter.add_row_to_filter(table, *row).unwrap();
		}
		filter.sort_rows(table, |l, r| {
			compare_numeric_aware(&store.value_by_id(table, *l, 1).unwrap(), &store.value_by_id(table, *r, 1).unwrap())
		})
		.unwrap();
		assert_eq!(ids(&filter, table), vec![Value::Int8(2), Value::Int8(1), Value::Int8(3)]);

		filter.sort_rows(table, |_, _| Ordering::Equal).unwrap();
		assert_eq!(ids(&filter, table), vec![Value::Int8(2), Value::Int8(1), Value::Int8(3)]);

		assert_eq!(filter.truncate(table, 1).unwrap(), 2);
		assert_eq!(ids(&filter, table), vec![Value::Int8(2)]);
		filter.clear_filter(table).unwrap();
		assert_eq!(filter.row_count(table).unwrap(), 0);
		assert!(filter.contains_table(table));
	}

	#[test]
	fn test_writes_and_unsupported_operations() {
		let (store, table, rows) = example();
		let filter = RowFilterDecorator::new(store.clone());
		filter.add_row_to_filter(table, rows[0]).unwrap();
		filter.add_row_to_filter(table, rows[2]).unwrap();

		filter.set_value_by_id(table, rows[2], 1, Value::Int8(6)).unwrap();
		assert_eq!(store.value_by_id(table, rows[2], 1).unwrap(), Value::Int8(6));
		assert!(matches!(filter.set_value_by_id(table, rows[1], 1, Value::Int8(0)), Err(Error::RowNotFound { .. })));

		assert!(matches!(filter.create_row(table), Err(Error::UnsupportedOperation { .. })));
		assert!(matches!(filter.insert_row(table, 0), Err(Error::UnsupportedOperation { .. })));
		assert!(matches!(filter.delete_column(table, 0), Err(Error::UnsupportedOperation { .. })));
		assert!(!filter.table_flags(table).unwrap().contains(TableFlags::ALLOW_ADD_ROW));

		filter.delete_row(table, rows[0]).unwrap();
		assert!(!store.contains_row(table, rows[0]).unwrap());
		assert_eq!(filter.admitted_rows(table).unwrap(), vec![rows[2]]);

		assert!(!filter.is_rollback_supported());
		filter.start_transaction().unwrap();
		assert!(store.is_in_transaction());
		assert!(matches!(filter.rollback_transaction(), Err(Error::UnsupportedOperation { .. })));
		filter.end_transaction().unwrap();
		assert!(!store.is_in_transaction());
	}
}
