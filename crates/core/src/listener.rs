// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{collections::HashMap, sync::Arc};

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::TableId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableEvent {
	StructureChanged {
		table: TableId,
	},
	/// Rows `first..=last` changed. `last == usize::MAX` means every row from
	/// `first` onwards.
	RowsChanged {
		table: TableId,
		first: usize,
		last: usize,
	},
}

impl TableEvent {
	pub fn table(&self) -> TableId {
		match self {
			TableEvent::StructureChanged {
				table,
			} => *table,
			TableEvent::RowsChanged {
				table,
				..
			} => *table,
		}
	}

	pub fn rows(table: TableId, first: usize, last: usize) -> Self {
		TableEvent::RowsChanged {
			table,
			first,
			last,
		}
	}

	pub fn structure(table: TableId) -> Self {
		TableEvent::StructureChanged {
			table,
		}
	}
}

pub trait TableListener: Send + Sync {
	fn table_changed(&self, event: &TableEvent);
}

impl<F> TableListener for F
where
	F: Fn(&TableEvent) + Send + Sync,
{
	fn table_changed(&self, event: &TableEvent) {
		self(event)
	}
}

/// Per-table listener registry with batching.
///
/// While disabled, events are reduced to the set of affected tables. Enabling
/// again replays one `StructureChanged` and one `RowsChanged { 0, usize::MAX }`
/// per affected table. Listeners are always called without the registry lock
/// held.
#[derive(Default)]
pub struct ListenerSupport {
	inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
	listeners: HashMap<TableId, Vec<Arc<dyn TableListener>>>,
	disabled: usize,
	queued: IndexSet<TableId>,
}

impl ListenerSupport {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&self, table: TableId, listener: Arc<dyn TableListener>) {
		self.inner.lock().listeners.entry(table).or_default().push(listener);
	}

	pub fn remove(&self, table: TableId, listener: &Arc<dyn TableListener>) -> bool {
		let mut inner = self.inner.lock();
		let Some(listeners) = inner.listeners.get_mut(&table) else {
			return false;
		};
		let before = listeners.len();
		listeners.retain(|l| !Arc::ptr_eq(l, listener));
		before != listeners.len()
	}

	pub fn has_listeners(&self, table: TableId) -> bool {
		self.inner.lock().listeners.get(&table).is_some_and(|l| !l.is_empty())
	}

	pub fn is_disabled(&self) -> bool {
		self.inner.lock().disabled > 0
	}

	pub fn fire(&self, event: TableEvent) {
		let listeners = {
			let mut inner = self.inner.lock();
			if inner.disabled > 0 {
				inner.queued.insert(event.table());
				return;
			}
			match inner.listeners.get(&event.table()) {
				Some(listeners) if !listeners.is_empty() => listeners.clone(),
				_ => return,
			}
		};

		for listener in listeners {
			listener.table_changed(&event);
		}
	}

	pub fn disable(&self) {
		self.inner.lock().disabled += 1;
	}

	pub fn enable(&self) {
		let queued: Vec<TableId> = {
			let mut inner = self.inner.lock();
			if inner.disabled == 0 {
				return;
			}
			inner.disabled -= 1;
			if inner.disabled > 0 {
				return;
			}
			inner.queued.drain(..).collect()
		};

		for table in queued {
			self.fire(TableEvent::structure(table));
			self.fire(TableEvent::rows(table, 0, usize::MAX));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn recorder() -> (Arc<Mutex<Vec<TableEvent>>>, Arc<dyn TableListener>) {
		let events = Arc::new(Mutex::new(vec![]));
		let sink = events.clone();
		let listener: Arc<dyn TableListener> = Arc::new(move |e: &TableEvent| sink.lock().push(*e));
		(events, listener)
	}

	#[test]
	fn test_fire_reaches_table_listeners_only() {
		let support = ListenerSupport::new();
		let (events, listener) = recorder();
		support.add(TableId(1), listener);

		support.fire(TableEvent::rows(TableId(1), 3, 3));
		support.fire(TableEvent::rows(TableId(2), 0, 0));

		assert_eq!(*events.lock(), vec![TableEvent::rows(TableId(1), 3, 3)]);
	}

	#[test]
	fn test_batching_deduplicates() {
		let support = ListenerSupport::new();
		let (events, listener) = recorder();
		support.add(TableId(1), listener);

		support.disable();
		support.disable();
		for i in 0..5 {
			support.fire(TableEvent::rows(TableId(1), i, i));
		}
		support.fire(TableEvent::structure(TableId(1)));
		support.enable();
		assert!(events.lock().is_empty());
		support.enable();

		assert_eq!(
			*events.lock(),
			vec![TableEvent::structure(TableId(1)), TableEvent::rows(TableId(1), 0, usize::MAX)]
		);
	}

	#[test]
	fn test_remove() {
		let support = ListenerSupport::new();
		let (events, listener) = recorder();
		support.add(TableId(1), listener.clone());
		assert!(support.remove(TableId(1), &listener));
		assert!(!support.remove(TableId(1), &listener));
		support.fire(TableEvent::structure(TableId(1)));
		assert!(events.lock().is_empty());
	}
}
