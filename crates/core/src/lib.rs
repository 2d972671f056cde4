// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

#![cfg_attr(not(debug_assertions), deny(warnings))]

pub use datastore::{Datastore, DatastoreRef};
pub use def::{ColumnDef, ColumnToCreate, TableDef, TableToCreate};
pub use error::Error;
pub use flags::{ColumnFlags, RowFlags, TableFlags};
pub use handle::{TableHandle, TableHandles};
pub use id::{ColumnId, RowId, TableId};
pub use listener::{ListenerSupport, TableEvent, TableListener};
pub use memory::MemoryDatastore;
pub use tabula_type::{Type, Value};
pub use transaction::{TransactionPropagation, same_store};

mod datastore;
mod def;
mod error;
mod flags;
mod handle;
mod id;
mod listener;
mod memory;
mod transaction;

pub type Result<T> = std::result::Result<T, Error>;

/// Milliseconds since the unix epoch, used for row modification stamps.
pub fn now_millis() -> i64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_millis() as i64)
		.unwrap_or(0)
}
