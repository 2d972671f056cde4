// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use tabula_type::TypeError;

use crate::{RowId, TableId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
	#[error("operation '{operation}' is not supported by this datastore")]
	UnsupportedOperation {
		operation: &'static str,
	},

	#[error("table {table} not found")]
	TableNotFound {
		table: TableId,
	},

	#[error("row {row} not found")]
	RowNotFound {
		row: RowId,
	},

	#[error("row index {index} out of bounds for table {table} with {count} rows")]
	RowIndexOutOfBounds {
		table: TableId,
		index: usize,
		count: usize,
	},

	#[error("column index {index} out of bounds for table {table} with {count} columns")]
	ColumnOutOfBounds {
		table: TableId,
		index: usize,
		count: usize,
	},

	#[error("handle of table {table} outlived its datastore")]
	Detached {
		table: TableId,
	},

	#[error("malformed union: {reason}")]
	MalformedUnion {
		reason: String,
	},

	#[error(transparent)]
	Type(#[from] TypeError),

	#[error("transaction error: {reason}")]
	TransactionState {
		reason: String,
	},
}

impl Error {
	pub fn unsupported(operation: &'static str) -> Self {
		Error::UnsupportedOperation {
			operation,
		}
	}
}
