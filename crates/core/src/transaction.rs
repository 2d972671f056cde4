// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use parking_lot::Mutex;
use tracing::debug;

use crate::{DatastoreRef, Error};

/// Propagates transactions from a composed store to its backing stores.
///
/// Each distinct backing store is started at most once. Stores already inside
/// a transaction are skipped, and only the stores started here are ended or
/// rolled back.
#[derive(Default)]
pub struct TransactionPropagation {
	started: Mutex<Option<Vec<DatastoreRef>>>,
}

impl TransactionPropagation {
	pub fn new() -> Self {
		Self::default()
	}

	/// Backing stores with duplicates (by identity) removed, in first-seen order.
	pub fn distinct(stores: &[DatastoreRef]) -> Vec<DatastoreRef> {
		let mut result: Vec<DatastoreRef> = Vec::with_capacity(stores.len());
		for store in stores {
			if !result.iter().any(|s| same_store(s, store)) {
				result.push(store.clone());
			}
		}
		result
	}

	pub fn rollback_supported(stores: &[DatastoreRef]) -> bool {
		stores.iter().all(|s| s.is_rollback_supported())
	}

	pub fn is_active(&self) -> bool {
		self.started.lock().is_some()
	}

	pub fn start(&self, stores: &[DatastoreRef]) -> crate::Result<()> {
		let mut started = self.started.lock();
		if started.is_some() {
			return Err(Error::TransactionState {
				reason: "transaction already started".to_string(),
			});
		}

		let mut list: Vec<DatastoreRef> = vec![];
		for store in Self::distinct(stores) {
			if store.is_in_transaction() {
				continue;
			}
			if let Err(err) = store.start_transaction() {
				for s in &list {
					let _ = s.end_transaction();
				}
				return Err(err);
			}
			list.push(store);
		}
		debug!(started = list.len(), "transaction started on backing stores");
		*started = Some(list);
		Ok(())
	}

	pub fn end(&self) -> crate::Result<()> {
		let list = self.take()?;
		let mut first_error = None;
		for store in list {
			if let Err(err) = store.end_transaction() {
				first_error.get_or_insert(err);
			}
		}
		first_error.map_or(Ok(()), Err)
	}

	pub fn rollback(&self) -> crate::Result<()> {
		let list = self.take()?;
		if !Self::rollback_supported(&list) {
			for store in list {
				let _ = store.end_transaction();
			}
			return Err(Error::unsupported("rollback_transaction"));
		}
		let mut first_error = None;
		for store in list {
			if let Err(err) = store.rollback_transaction() {
				first_error.get_or_insert(err);
			}
		}
		first_error.map_or(Ok(()), Err)
	}

	fn take(&self) -> crate::Result<Vec<DatastoreRef>> {
		self.started.lock().take().ok_or_else(|| Error::TransactionState {
			reason: "no transaction in progress".to_string(),
		})
	}
}

/// Identity comparison of two store references.
pub fn same_store(l: &DatastoreRef, r: &DatastoreRef) -> bool {
	std::ptr::addr_eq(std::sync::Arc::as_ptr(l), std::sync::Arc::as_ptr(r))
}
