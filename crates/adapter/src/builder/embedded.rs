// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use tabula_core::{Datastore, MemoryDatastore, TableId, TableToCreate, Type};
use tabula_decorator::{MappedColumn, MappedTable};
use tabula_type::standardise;
use tracing::debug;

use super::{AdapterBuilder, Stage, destination_column};
use crate::{AdaptedTableConfig, BuildError, EmbeddedData};

impl AdapterBuilder<'_, '_> {
	/// Loads literal rows into the adapter's own memory store. Literal tables
	/// take no other source and compute nothing.
	pub(super) fn build_embedded(
		&mut self,
		destination: TableId,
		config: &AdaptedTableConfig,
		data: &EmbeddedData,
	) -> crate::Result<MappedTable> {
		self.check_embedded(config)?;

		let typed = |name: &str| {
			config
				.columns
				.iter()
				.find(|c| standardise(c.source_text()) == standardise(name))
				.and_then(|c| c.ty)
				.unwrap_or(Type::Any)
		};
		let layout = data
			.columns
			.iter()
			.fold(TableToCreate::new(config.name.clone()), |table, name| table.column(name.clone(), typed(name)));

		let (store, datasource) = self.embedded_store();
		let table = store.create_table_with(layout)?;
		let take = config.limit.unwrap_or(usize::MAX);
		for (index, row) in data.rows.iter().take(take).enumerate() {
			if row.len() > data.columns.len() {
				return Err(self.invalid(
					config,
					format!("row {} has {} values for {} columns", index, row.len(), data.columns.len()),
				));
			}
			let mut values = Vec::with_capacity(data.columns.len());
			for (col, name) in data.columns.iter().enumerate() {
				let value = row.get(col).cloned().unwrap_or_default();
				let value = typed(name).coerce(&value).map_err(|source| BuildError::Type {
					field: format!("{}.{}", config.name, name),
					source,
				})?;
				values.push(value);
			}
			store.append_row(table, values)?;
		}
		debug!(table = %config.name, rows = data.rows.len().min(take), "embedded rows loaded");

		let stage = Stage {
			datasource,
			table,
		};
		let source = store.table_def(table)?;
		let mut columns = vec![];
		let mut defs = vec![];
		if config.columns.is_empty() {
			for (index, column) in source.columns.iter().enumerate() {
				columns.push(MappedColumn::Source(index));
				defs.push(column.clone());
			}
		}
		for column in &config.columns {
			let mapped = match source.column_index(column.source_text()) {
				Some(index) => MappedColumn::Source(index),
				None if column.optional => MappedColumn::Unset,
				None => return Err(self.unknown_field(config, column.source_text())),
			};
			let ty = match mapped {
				MappedColumn::Source(index) => column.ty.unwrap_or(source.columns[index].ty),
				_ => column.ty.unwrap_or(Type::Any),
			};
			defs.push(destination_column(defs.len(), column, ty));
			columns.push(mapped);
		}

		Ok(MappedTable {
			destination: self.destination_def(destination, config, stage, defs)?,
			datasource,
			source_table: table,
			columns,
		})
	}

	fn check_embedded(&self, config: &AdaptedTableConfig) -> crate::Result<()> {
		let rejected = if config.from_datastore.is_some() {
			Some("embedded data cannot also name a source datastore")
		} else if config.join.is_some() {
			Some("embedded data cannot be joined")
		} else if config.filter.is_some() {
			Some("embedded data cannot be filtered")
		} else if !config.sort.is_empty() {
			Some("embedded data cannot be sorted")
		} else if config.columns.iter().any(|c| c.formula) {
			Some("embedded data cannot have formula columns")
		} else if config.is_grouped() {
			Some("embedded data cannot be grouped")
		} else {
			None
		};
		match rejected {
			Some(message) => Err(self.invalid(config, message)),
			None => Ok(()),
		}
	}

	/// The memory store holding this adapter's literal tables, added to the
	/// datasources on first use.
	fn embedded_store(&mut self) -> (std::sync::Arc<MemoryDatastore>, usize) {
		if let Some((store, datasource)) = &self.embedded {
			return (store.clone(), *datasource);
		}
		let store = MemoryDatastore::new();
		let datasource = self.push(store.clone());
		self.embedded = Some((store.clone(), datasource));
		(store, datasource)
	}
}

#[cfg(test)]
mod tests {
	use tabula_core::{Datastore, Value};

	use crate::{AdapterColumnConfig, AdapterConfig, BuildSession, BuilderConfig, Environment};

	use super::*;

	fn codes() -> EmbeddedData {
		EmbeddedData {
			columns: vec!["code".into(), "label".into()],
			rows: vec![
				vec![Value::utf8("1"), Value::utf8("one")],
				vec![Value::Int8(2)],
				vec![Value::Int8(3), Value::utf8("three")],
			],
		}
	}

	fn build(table: AdaptedTableConfig) -> crate::Result<std::sync::Arc<tabula_decorator::AdaptedDecorator>> {
		let env = Environment::new().with_adapter(AdapterConfig::new("lookup").with_table(table));
		let mut session = BuildSession::new(&env, BuilderConfig::default());
		session.build("lookup")
	}

	#[test]
	fn test_literal_rows_are_typed_and_limited() {
		let adapter = build(
			AdaptedTableConfig::new("codes")
				.data(codes())
				.limit(2)
				.column(AdapterColumnConfig::field("code").with_type(Type::Int8))
				.column(AdapterColumnConfig::field("label"))
				.column(AdapterColumnConfig::field("note").optional()),
		)
		.unwrap();
		let table = adapter.find_table("codes").unwrap();
		assert_eq!(adapter.row_count(table).unwrap(), 2);
		assert_eq!(adapter.value_at(table, 0, 0).unwrap(), Value::Int8(1));
		assert_eq!(adapter.value_at(table, 1, 1).unwrap(), Value::Undefined);
		assert_eq!(adapter.value_at(table, 0, 2).unwrap(), Value::Undefined);
	}

	#[test]
	fn test_rejects_computed_embedded_tables() {
		let rejected = [
			AdaptedTableConfig::new("codes").data(codes()).filter("code > 1"),
			AdaptedTableConfig::new("codes").data(codes()).sort("code", true),
			AdaptedTableConfig::new("codes").data(codes()).from_source("shop", "codes"),
			AdaptedTableConfig::new("codes").data(codes()).join("shop", "codes"),
			AdaptedTableConfig::new("codes").data(codes()).column(AdapterColumnConfig::formula("twice", "code * 2")),
			AdaptedTableConfig::new("codes").data(codes()).column(AdapterColumnConfig::field("code").group_by()),
		];
		for table in rejected {
			assert!(matches!(build(table), Err(BuildError::InvalidConfiguration { .. })));
		}
	}

	#[test]
	fn test_bad_literal_value() {
		let data = EmbeddedData {
			columns: vec!["code".into()],
			rows: vec![vec![Value::utf8("abc")]],
		};
		let table = AdaptedTableConfig::new("codes").data(data).column(AdapterColumnConfig::field("code").with_type(Type::Int8));
		assert!(matches!(build(table), Err(BuildError::Type { field, .. }) if field == "codes.code"));
	}
}
