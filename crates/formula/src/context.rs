// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use tabula_core::{DatastoreRef, RowId, TableId};
use tabula_type::Value;

use crate::FormulaError;

/// Where a formula is evaluated: one table of one datasource, optionally at
/// one row. A context without a row only serves row-independent formulas.
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
	pub datasources: &'a [DatastoreRef],
	pub datasource: usize,
	pub table: TableId,
	pub row: Option<RowId>,
	pub row_index: Option<usize>,
}

impl<'a> EvaluationContext<'a> {
	pub fn new(datasources: &'a [DatastoreRef], datasource: usize, table: TableId) -> Self {
		Self {
			datasources,
			datasource,
			table,
			row: None,
			row_index: None,
		}
	}

	pub fn with_row(mut self, row: RowId) -> Self {
		self.row = Some(row);
		self
	}

	pub fn with_row_index(mut self, index: usize) -> Self {
		self.row_index = Some(index);
		self
	}

	pub fn store(&self) -> crate::Result<&'a DatastoreRef> {
		self.datasources.get(self.datasource).ok_or_else(|| {
			FormulaError::evaluation(format!("datasource {} is not available", self.datasource))
		})
	}

	/// Value of column `col` at the current row.
	pub fn read(&self, col: usize, name: &str) -> crate::Result<Value> {
		let store = self.store()?;
		match (self.row, self.row_index) {
			(Some(row), _) => Ok(store.value_by_id(self.table, row, col)?),
			(None, Some(index)) => Ok(store.value_at(self.table, index, col)?),
			(None, None) => Err(FormulaError::FieldUnavailable {
				name: name.to_string(),
				message: "no current row".to_string(),
			}),
		}
	}
}
