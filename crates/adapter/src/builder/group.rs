// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tabula_core::{MemoryDatastore, RowId, TableId, TableToCreate, Type};
use tabula_decorator::{MappedColumn, MappedTable};
use tabula_formula::{
	AggregateBinding, AggregateScope, CompiledExpression, EvaluationContext, Expr, GroupRows, GroupedResolver,
	Resolved, TableResolver, VariableResolver,
};
use tabula_type::standardise;
use tracing::{debug, instrument};

use super::{AdapterBuilder, Stage, destination_column, evaluation};
use crate::{AdaptedTableConfig, AdapterColumnConfig, BuildError};

/// Where one component of a group key comes from.
enum KeySource {
	Field(usize),
	Formula(CompiledExpression),
}

struct GroupKey<'c> {
	column: &'c AdapterColumnConfig,
	source: KeySource,
	ty: Type,
}

type KeyTuple = SmallVec<[String; 4]>;

impl AdapterBuilder<'_, '_> {
	/// Groups the rows of `stage` by the group-by columns of `config` in one
	/// pass and maps the remaining columns over the group rows.
	#[instrument(name = "adapter::build_grouped", level = "debug", skip_all, fields(table = %config.name))]
	pub(super) fn build_grouped(
		&mut self,
		destination: TableId,
		config: &AdaptedTableConfig,
		stage: Stage,
	) -> crate::Result<MappedTable> {
		let source = self.store(stage).table_def(stage.table)?;
		let source_resolver = TableResolver::from_def(&source);
		let library = self.session.environment().library().clone();

		let mut keys = vec![];
		for column in config.columns.iter().filter(|c| c.group_by) {
			let key = if column.formula {
				let expr = self.compile(config, column.source_text(), &source_resolver, &library)?;
				GroupKey {
					column,
					source: KeySource::Formula(expr),
					ty: column.ty.unwrap_or(Type::Any),
				}
			} else {
				let Some(index) = source.column_index(column.source_text()) else {
					return Err(self.unknown_field(config, column.source_text()));
				};
				GroupKey {
					column,
					source: KeySource::Field(index),
					ty: column.ty.unwrap_or(source.columns[index].ty),
				}
			};
			keys.push(key);
		}

		let grouped = MemoryDatastore::new();
		let layout = keys
			.iter()
			.fold(TableToCreate::new(config.name.clone()), |table, key| table.column(key.column.name.clone(), key.ty));
		let grouped_table = grouped.create_table_with(layout)?;

		let mut group_of: IndexMap<KeyTuple, RowId> = IndexMap::new();
		let mut groups = GroupRows::new();
		let rows = self.store(stage).row_ids(stage.table)?;
		for (index, row) in rows.iter().enumerate() {
			self.session.poll(index)?;
			let ctx = EvaluationContext::new(&self.datasources, stage.datasource, stage.table)
				.with_row(*row)
				.with_row_index(index);

			let mut values = Vec::with_capacity(keys.len());
			for key in &keys {
				let value = match &key.source {
					KeySource::Field(col) => self.store(stage).value_by_id(stage.table, *row, *col)?,
					KeySource::Formula(expr) => {
						expr.evaluate(&ctx).map_err(|source| evaluation(expr, Some(index), source))?
					}
				};
				let value = key.ty.coerce(&value).map_err(|source| BuildError::Type {
					field: format!("{}.{}", config.name, key.column.name),
					source,
				})?;
				values.push(value);
			}

			let tuple: KeyTuple = values.iter().map(|v| standardise(&v.to_string())).collect();
			let group = match group_of.get(&tuple) {
				Some(group) => *group,
				None => {
					let group = grouped.append_row(grouped_table, values)?;
					group_of.insert(tuple, group);
					group
				}
			};
			groups.push(group, *row);
		}
		debug!(rows = rows.len(), groups = group_of.len(), "rows grouped");

		let grouped_stage = Stage {
			datasource: self.push(grouped),
			table: grouped_table,
		};
		let scope = Arc::new(AggregateScope {
			groups: Arc::new(groups),
			source_datasource: stage.datasource,
			source_table: stage.table,
		});
		let library = library.with_aggregates(AggregateBinding {
			scope,
			resolver: Arc::new(source_resolver),
		});

		// Direct group-by fields keep their source name; formula keys are
		// read by their destination name.
		let readable = TableResolver::new(keys.iter().map(|key| match key.source {
			KeySource::Field(col) => source.columns[col].name.as_str(),
			KeySource::Formula(_) => key.column.name.as_str(),
		}));
		let resolver = GroupedResolver::new(readable, source.columns.iter().map(|c| c.name.as_str()), &config.name);

		let mut stage = grouped_stage;
		if !config.sort.is_empty() || config.limit.is_some() {
			let sort = self.compile_sort(config, &config.sort, &resolver, &library)?;
			stage = self.build_filter(config, stage, None, &sort, config.limit, None)?;
		}

		let mut columns = Vec::with_capacity(config.columns.len());
		let mut defs = Vec::with_capacity(config.columns.len());
		let mut next_key = 0;
		for column in &config.columns {
			let (mapped, ty) = if column.group_by {
				let key = &keys[next_key];
				next_key += 1;
				(MappedColumn::Source(next_key - 1), key.ty)
			} else if column.formula {
				let expr = self.compile(config, column.source_text(), &resolver, &library)?;
				(MappedColumn::Formula(expr), column.ty.unwrap_or(Type::Any))
			} else {
				match ungrouped_field(&resolver, column.source_text()) {
					Some(expr) => (MappedColumn::Formula(expr), column.ty.unwrap_or(Type::Any)),
					None if column.optional => (MappedColumn::Unset, column.ty.unwrap_or(Type::Any)),
					None => return Err(self.unknown_field(config, column.source_text())),
				}
			};
			defs.push(destination_column(defs.len(), column, ty));
			columns.push(mapped);
		}

		Ok(MappedTable {
			destination: self.destination_def(destination, config, stage, defs)?,
			datasource: stage.datasource,
			source_table: stage.table,
			columns,
		})
	}
}

/// A plain field read on a grouped table. Fields that are not group keys
/// compile to an expression that fails when read.
fn ungrouped_field(resolver: &GroupedResolver, name: &str) -> Option<CompiledExpression> {
	let expr = match resolver.resolve(name)? {
		Resolved::Column(index) => Expr::Column {
			index,
			name: name.to_string(),
		},
		Resolved::Constant(value) => Expr::Constant(value),
		Resolved::Unavailable {
			message,
			logged,
		} => Expr::Unavailable {
			name: name.to_string(),
			message,
			logged,
		},
	};
	Some(CompiledExpression::new(expr))
}
