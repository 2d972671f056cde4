// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tabula_type::{Type, Value, standardise};

use crate::{ColumnFlags, ColumnId, TableFlags, TableId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
	pub id: ColumnId,
	pub name: String,
	pub ty: Type,
	pub flags: ColumnFlags,
	pub tags: BTreeSet<String>,
	pub default: Value,
}

impl ColumnDef {
	pub fn has_tag(&self, tag: &str) -> bool {
		self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
	}

	pub fn is_optional(&self) -> bool {
		self.flags.contains(ColumnFlags::OPTIONAL)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
	pub id: TableId,
	pub name: String,
	pub flags: TableFlags,
	pub tags: BTreeSet<String>,
	pub columns: Vec<ColumnDef>,
}

impl TableDef {
	/// Case-insensitive, trimmed lookup of a column by name.
	pub fn column_index(&self, name: &str) -> Option<usize> {
		let wanted = standardise(name);
		self.columns.iter().position(|c| standardise(&c.name) == wanted)
	}

	/// Structural equality used by unions: same column ids and types in the
	/// same order.
	pub fn same_layout(&self, other: &TableDef) -> bool {
		self.id == other.id
			&& self.columns.len() == other.columns.len()
			&& self.columns.iter().zip(other.columns.iter()).all(|(l, r)| l.id == r.id && l.ty == r.ty)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnToCreate {
	pub name: String,
	pub ty: Type,
	pub flags: ColumnFlags,
	pub tags: BTreeSet<String>,
	pub default: Value,
}

impl ColumnToCreate {
	pub fn new(name: impl Into<String>, ty: Type) -> Self {
		Self {
			name: name.into(),
			ty,
			flags: ColumnFlags::empty(),
			tags: BTreeSet::new(),
			default: Value::Undefined,
		}
	}

	pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
		self.tags.insert(tag.into());
		self
	}

	pub fn with_flags(mut self, flags: ColumnFlags) -> Self {
		self.flags = flags;
		self
	}

	pub fn with_default(mut self, default: Value) -> Self {
		self.default = default;
		self
	}
}

impl From<&ColumnDef> for ColumnToCreate {
	fn from(def: &ColumnDef) -> Self {
		Self {
			name: def.name.clone(),
			ty: def.ty,
			flags: def.flags,
			tags: def.tags.clone(),
			default: def.default.clone(),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableToCreate {
	pub name: String,
	pub flags: TableFlags,
	pub tags: BTreeSet<String>,
	pub columns: Vec<ColumnToCreate>,
}

impl TableToCreate {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			flags: TableFlags::ALL,
			tags: BTreeSet::new(),
			columns: vec![],
		}
	}

	pub fn column(mut self, name: impl Into<String>, ty: Type) -> Self {
		self.columns.push(ColumnToCreate::new(name, ty));
		self
	}

	pub fn with_column(mut self, column: ColumnToCreate) -> Self {
		self.columns.push(column);
		self
	}

	pub fn with_flags(mut self, flags: TableFlags) -> Self {
		self.flags = flags;
		self
	}
}
