// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	fmt::{Display, Formatter},
	ops::Deref,
};

use serde::{Deserialize, Serialize};

#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(pub u32);

impl Deref for TableId {
	type Target = u32;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl PartialEq<u32> for TableId {
	fn eq(&self, other: &u32) -> bool {
		self.0.eq(other)
	}
}

impl From<TableId> for u32 {
	fn from(value: TableId) -> Self {
		value.0
	}
}

impl Display for TableId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		Display::fmt(&self.0, f)
	}
}

#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(pub u32);

impl Deref for ColumnId {
	type Target = u32;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl PartialEq<u32> for ColumnId {
	fn eq(&self, other: &u32) -> bool {
		self.0.eq(other)
	}
}

impl From<ColumnId> for u32 {
	fn from(value: ColumnId) -> Self {
		value.0
	}
}

impl Display for ColumnId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		Display::fmt(&self.0, f)
	}
}

/// Identity of a row: the owning table plus a local id that is never reused.
///
/// Row ids are opaque. Virtual tables only rely on their identity, never on
/// the position of a row.
#[derive(Debug, Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
pub struct RowId {
	pub table: TableId,
	pub local: u32,
}

impl RowId {
	pub const fn new(table: TableId, local: u32) -> Self {
		Self {
			table,
			local,
		}
	}

	/// Packed form for storing a row id inside an integer column.
	pub const fn raw(&self) -> u64 {
		((self.table.0 as u64) << 32) | self.local as u64
	}

	pub const fn from_raw(raw: u64) -> Self {
		Self {
			table: TableId((raw >> 32) as u32),
			local: raw as u32,
		}
	}
}

impl Display for RowId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self.table, self.local)
	}
}
