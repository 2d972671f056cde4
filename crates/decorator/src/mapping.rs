// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use indexmap::IndexMap;
use tabula_core::{TableDef, TableId};
use tabula_formula::CompiledExpression;

/// Where a destination column gets its values.
#[derive(Debug, Clone)]
pub enum MappedColumn {
	/// Read from this column of the source table.
	Source(usize),
	/// Computed per source row.
	Formula(CompiledExpression),
	/// Optional column with no source; reads the column default.
	Unset,
}

impl MappedColumn {
	pub fn source_index(&self) -> Option<usize> {
		match self {
			MappedColumn::Source(index) => Some(*index),
			_ => None,
		}
	}

	pub fn is_formula(&self) -> bool {
		matches!(self, MappedColumn::Formula(_))
	}
}

/// One destination table and the source table backing it.
#[derive(Debug, Clone)]
pub struct MappedTable {
	pub destination: TableDef,
	pub datasource: usize,
	pub source_table: TableId,
	/// One entry per destination column.
	pub columns: Vec<MappedColumn>,
}

/// Destination tables of an adapter keyed by destination table id.
#[derive(Debug, Clone, Default)]
pub struct AdapterMapping {
	tables: IndexMap<TableId, MappedTable>,
}

impl AdapterMapping {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a destination table.
	///
	/// Panics when the destination id is already mapped or the column count
	/// does not match the destination schema; both are builder bugs.
	pub fn insert(&mut self, table: MappedTable) {
		assert_eq!(
			table.destination.columns.len(),
			table.columns.len(),
			"mapping for '{}' must cover every destination column",
			table.destination.name
		);
		let id = table.destination.id;
		let previous = self.tables.insert(id, table);
		assert!(previous.is_none(), "destination table {} mapped twice", id);
	}

	pub fn get(&self, table: TableId) -> Option<&MappedTable> {
		self.tables.get(&table)
	}

	pub fn len(&self) -> usize {
		self.tables.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tables.is_empty()
	}

	pub fn table_id_at(&self, index: usize) -> Option<TableId> {
		self.tables.get_index(index).map(|(id, _)| *id)
	}

	pub fn tables(&self) -> impl Iterator<Item = &MappedTable> {
		self.tables.values()
	}

	/// Distinct datasource positions used by any destination table.
	pub fn datasources(&self) -> Vec<usize> {
		let mut result: Vec<usize> = self.tables.values().map(|t| t.datasource).collect();
		result.sort_unstable();
		result.dedup();
		result
	}
}
