// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::Arc;

use indexmap::IndexMap;
use tabula_core::{
	ColumnDef, ColumnFlags, ColumnId, ColumnToCreate, Datastore, DatastoreRef, MemoryDatastore, TableDef, TableId,
	TableToCreate,
};
use tabula_decorator::{AdaptedDecorator, AdapterMapping, MappedColumn, MappedTable, UnionDecorator};
use tabula_type::standardise;
use tracing::{debug, instrument};

use super::{AdapterBuilder, Stage};
use crate::{AdaptedTableConfig, AdapterConfig};

/// Table id of the single table of a constituent sub-adapter.
const CONSTITUENT_TABLE: TableId = TableId(1);

impl AdapterBuilder<'_, '_> {
	/// Builds every table sharing one destination name on its own and
	/// concatenates them.
	///
	/// Columns are the superset over all constituents by name, typed and
	/// ordered by their first occurrence. A column some constituent lacks is
	/// optional and reads as its default there.
	#[instrument(name = "adapter::build_union", level = "debug", skip_all, fields(table = %tables[0].name, constituents = tables.len()))]
	pub(super) fn build_union(
		&mut self,
		destination: TableId,
		tables: Vec<AdaptedTableConfig>,
	) -> crate::Result<MappedTable> {
		let mut built = Vec::with_capacity(tables.len());
		for (position, table) in tables.iter().enumerate() {
			let config = AdapterConfig {
				id: format!("{}[{}#{}]", self.config.id, table.name, position),
				tables: vec![table.clone()],
			};
			let adapter = AdapterBuilder::new(&mut *self.session, config, self.callers.clone()).build()?;
			let def = adapter.table_def(CONSTITUENT_TABLE)?;
			built.push((adapter, def));
		}

		let mut superset: IndexMap<String, (ColumnDef, usize)> = IndexMap::new();
		for (_, def) in &built {
			for column in &def.columns {
				superset.entry(standardise(&column.name)).or_insert_with(|| (column.clone(), 0)).1 += 1;
			}
		}

		let name = &tables[0].name;
		let columns: Vec<ColumnDef> = superset
			.values()
			.enumerate()
			.map(|(position, (column, present))| {
				let mut column = column.clone();
				column.id = ColumnId(position as u32);
				if *present < built.len() {
					column.flags.insert(ColumnFlags::OPTIONAL);
				}
				column
			})
			.collect();
		for (column, present) in superset.values().filter(|(_, present)| *present < built.len()) {
			self.session.report_mut().warn(
				&self.config.id,
				name,
				format!("field '{}' is missing from {} of {} union tables", column.name, built.len() - present, built.len()),
			);
		}

		let mut layers: Vec<DatastoreRef> = Vec::with_capacity(built.len());
		for (adapter, def) in built {
			layers.push(widen(adapter, &def, &columns)?);
		}
		let union = UnionDecorator::new(layers)?;

		let stage = if self.session.config().copy_unions {
			let copy = self.copy_union(&union, name, &columns)?;
			Stage {
				datasource: self.push(copy.0),
				table: copy.1,
			}
		} else {
			Stage {
				datasource: self.push(union),
				table: CONSTITUENT_TABLE,
			}
		};

		Ok(MappedTable {
			destination: self.destination_def(destination, &tables[0], stage, columns.clone())?,
			datasource: stage.datasource,
			source_table: stage.table,
			columns: (0..columns.len()).map(MappedColumn::Source).collect(),
		})
	}

	/// Copies the union into a plain table so row ids are unique again.
	fn copy_union(
		&self,
		union: &UnionDecorator,
		name: &str,
		columns: &[ColumnDef],
	) -> crate::Result<(Arc<MemoryDatastore>, TableId)> {
		let store = MemoryDatastore::new();
		let layout = columns.iter().fold(TableToCreate::new(name), |table, c| table.with_column(ColumnToCreate::from(c)));
		let table = store.create_table_with(layout)?;

		let rows = union.row_count(CONSTITUENT_TABLE)?;
		for index in 0..rows {
			self.session.poll(index)?;
			let values = (0..columns.len())
				.map(|col| union.value_at(CONSTITUENT_TABLE, index, col))
				.collect::<tabula_core::Result<Vec<_>>>()?;
			store.append_row(table, values)?;
		}
		debug!(rows, "union copied");
		Ok((store, table))
	}
}

/// Presents the table of a constituent with the superset columns, leaving
/// the ones it lacks unset.
fn widen(adapter: Arc<AdaptedDecorator>, def: &TableDef, columns: &[ColumnDef]) -> crate::Result<DatastoreRef> {
	let mut mapping = AdapterMapping::new();
	mapping.insert(MappedTable {
		destination: TableDef {
			id: CONSTITUENT_TABLE,
			name: def.name.clone(),
			flags: def.flags,
			tags: def.tags.clone(),
			columns: columns.to_vec(),
		},
		datasource: 0,
		source_table: CONSTITUENT_TABLE,
		columns: columns
			.iter()
			.map(|c| def.column_index(&c.name).map_or(MappedColumn::Unset, MappedColumn::Source))
			.collect(),
	});
	Ok(AdaptedDecorator::new(vec![adapter as DatastoreRef], mapping)?)
}
