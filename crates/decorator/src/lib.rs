// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

#![cfg_attr(not(debug_assertions), deny(warnings))]

//! Virtual tables built by wrapping other datastores.
//!
//! Every decorator implements [`tabula_core::Datastore`], so decorators nest
//! freely: a mapping over a filter over a join over two stores is just another
//! store to its caller.

/// Forwards the table and column metadata reads of `Datastore` to the store in
/// `self.$inner`.
macro_rules! forward_columns {
	($inner:ident) => {
		fn table_name(&self, table: tabula_core::TableId) -> tabula_core::Result<String> {
			self.$inner.table_name(table)
		}

		fn table_tags(
			&self,
			table: tabula_core::TableId,
		) -> tabula_core::Result<std::collections::BTreeSet<String>> {
			self.$inner.table_tags(table)
		}

		fn column_count(&self, table: tabula_core::TableId) -> tabula_core::Result<usize> {
			self.$inner.column_count(table)
		}

		fn column(&self, table: tabula_core::TableId, col: usize) -> tabula_core::Result<tabula_core::ColumnDef> {
			self.$inner.column(table, col)
		}

		fn columns(&self, table: tabula_core::TableId) -> tabula_core::Result<Vec<tabula_core::ColumnDef>> {
			self.$inner.columns(table)
		}
	};
}

pub use adapted::AdaptedDecorator;
pub use filter::{FilterUpdate, RowFilterDecorator};
pub use join::JoinDecorator;
pub use listener::ListenerDecorator;
pub use mapping::{AdapterMapping, MappedColumn, MappedTable};
pub use simple::SimpleDecorator;
pub use union::UnionDecorator;

mod adapted;
mod filter;
mod join;
mod listener;
mod mapping;
mod simple;
mod union;

/// Default admitted-row count from which `RowFilterDecorator::find` goes
/// through the backing index instead of scanning.
pub const DEFAULT_INDEX_THRESHOLD: usize = 10;
