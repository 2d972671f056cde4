// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	collections::HashMap,
	sync::atomic::{AtomicU32, Ordering},
};

use tabula_type::Value;

use crate::{ColumnDef, ColumnId, ColumnToCreate, Error, RowFlags, RowId, TableDef, TableId, TableToCreate, now_millis};

static NEXT_LOCAL: AtomicU32 = AtomicU32::new(1);

/// Local row ids come from one process-wide sequence, so row ids stay unique
/// even between stores that share table ids.
fn next_local() -> u32 {
	NEXT_LOCAL.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub(crate) struct MemoryRow {
	pub id: RowId,
	pub values: Vec<Value>,
	pub flags: RowFlags,
	pub modified: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct MemoryTable {
	pub def: TableDef,
	pub rows: Vec<MemoryRow>,
	positions: HashMap<RowId, usize>,
	next_column: u32,
}

impl MemoryTable {
	pub fn new(id: TableId, to_create: TableToCreate) -> Self {
		let mut table = Self {
			def: TableDef {
				id,
				name: to_create.name,
				flags: to_create.flags,
				tags: to_create.tags,
				columns: vec![],
			},
			rows: vec![],
			positions: HashMap::new(),
			next_column: 1,
		};
		for column in to_create.columns {
			let index = table.def.columns.len();
			table.insert_column(index, column);
		}
		table
	}

	pub fn id(&self) -> TableId {
		self.def.id
	}

	pub fn index_of(&self, row: RowId) -> Option<usize> {
		self.positions.get(&row).copied()
	}

	pub fn row(&self, row: RowId) -> crate::Result<&MemoryRow> {
		self.index_of(row).map(|i| &self.rows[i]).ok_or(Error::RowNotFound {
			row,
		})
	}

	pub fn row_mut(&mut self, row: RowId) -> crate::Result<&mut MemoryRow> {
		match self.index_of(row) {
			Some(i) => Ok(&mut self.rows[i]),
			None => Err(Error::RowNotFound {
				row,
			}),
		}
	}

	pub fn row_at(&self, index: usize) -> crate::Result<&MemoryRow> {
		self.rows.get(index).ok_or(Error::RowIndexOutOfBounds {
			table: self.def.id,
			index,
			count: self.rows.len(),
		})
	}

	pub fn column(&self, col: usize) -> crate::Result<&ColumnDef> {
		self.def.columns.get(col).ok_or(Error::ColumnOutOfBounds {
			table: self.def.id,
			index: col,
			count: self.def.columns.len(),
		})
	}

	pub fn column_mut(&mut self, col: usize) -> crate::Result<&mut ColumnDef> {
		let (table, count) = (self.def.id, self.def.columns.len());
		self.def.columns.get_mut(col).ok_or(Error::ColumnOutOfBounds {
			table,
			index: col,
			count,
		})
	}

	/// Inserts a fresh row filled with column defaults at `index`.
	pub fn insert_row(&mut self, index: usize) -> crate::Result<(RowId, usize)> {
		if index > self.rows.len() {
			return Err(Error::RowIndexOutOfBounds {
				table: self.def.id,
				index,
				count: self.rows.len(),
			});
		}
		let id = RowId::new(self.def.id, next_local());
		let values = self.def.columns.iter().map(|c| c.default.clone()).collect();
		self.rows.insert(
			index,
			MemoryRow {
				id,
				values,
				flags: RowFlags::empty(),
				modified: now_millis(),
			},
		);
		self.reindex_from(index);
		Ok((id, index))
	}

	pub fn remove_row(&mut self, row: RowId) -> crate::Result<usize> {
		let index = self.index_of(row).ok_or(Error::RowNotFound {
			row,
		})?;
		self.rows.remove(index);
		self.positions.remove(&row);
		self.reindex_from(index);
		Ok(index)
	}

	pub fn insert_column(&mut self, index: usize, column: ColumnToCreate) -> ColumnId {
		let id = ColumnId(self.next_column);
		self.next_column += 1;
		let index = index.min(self.def.columns.len());
		for row in &mut self.rows {
			row.values.insert(index, column.default.clone());
		}
		self.def.columns.insert(
			index,
			ColumnDef {
				id,
				name: column.name,
				ty: column.ty,
				flags: column.flags,
				tags: column.tags,
				default: column.default,
			},
		);
		id
	}

	pub fn delete_column(&mut self, col: usize) -> crate::Result<()> {
		self.column(col)?;
		self.def.columns.remove(col);
		for row in &mut self.rows {
			row.values.remove(col);
		}
		Ok(())
	}

	fn reindex_from(&mut self, start: usize) {
		for (i, row) in self.rows.iter().enumerate().skip(start) {
			self.positions.insert(row.id, i);
		}
	}
}
