// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Turns one [`AdapterConfig`] into an [`AdaptedDecorator`].
//!
//! Every destination table runs through the same stages: embedded data, or a
//! resolved source that is optionally joined, filtered and sorted, then
//! either grouped or mapped column by column. Each stage that produces a new
//! store appends it to the adapter's datasources; a [`Stage`] names the store
//! and table the next stage reads.

mod embedded;
mod group;
mod union;

use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};

use indexmap::IndexMap;
use tabula_core::{
	ColumnDef, ColumnFlags, ColumnId, Datastore, DatastoreRef, MemoryDatastore, RowId, TableDef, TableId, Type,
	Value,
};
use tabula_decorator::{
	AdaptedDecorator, AdapterMapping, JoinDecorator, MappedColumn, MappedTable, RowFilterDecorator,
};
use tabula_formula::{
	CompiledExpression, EvaluationContext, Expression, FormulaError, FunctionLibrary, TableResolver, VariableResolver,
};
use tabula_type::{compare_numeric_aware, loose_eq, standardise};
use tracing::{debug, instrument};

use crate::{
	AdaptedTableConfig, AdapterColumnConfig, AdapterConfig, BuildError, BuildSession, SortConfig,
	optimiser::FilterFormulaOptimiser,
};

/// A table of one of the adapter's datasources.
#[derive(Debug, Clone, Copy)]
struct Stage {
	datasource: usize,
	table: TableId,
}

pub(crate) struct AdapterBuilder<'s, 'e> {
	session: &'s mut BuildSession<'e>,
	config: AdapterConfig,
	/// Adapter ids on the current build path, this one last.
	callers: Vec<String>,
	datasources: Vec<DatastoreRef>,
	/// Datasource position of each named source, by standardised name.
	named: HashMap<String, usize>,
	embedded: Option<(Arc<MemoryDatastore>, usize)>,
	mapping: AdapterMapping,
}

impl<'s, 'e> AdapterBuilder<'s, 'e> {
	pub(crate) fn new(session: &'s mut BuildSession<'e>, config: AdapterConfig, callers: Vec<String>) -> Self {
		Self {
			session,
			config,
			callers,
			datasources: vec![],
			named: HashMap::new(),
			embedded: None,
			mapping: AdapterMapping::new(),
		}
	}

	#[instrument(name = "adapter::build_tables", level = "debug", skip(self), fields(adapter = %self.config.id))]
	pub(crate) fn build(mut self) -> crate::Result<Arc<AdaptedDecorator>> {
		let mut by_name: IndexMap<String, Vec<AdaptedTableConfig>> = IndexMap::new();
		for table in &self.config.tables {
			by_name.entry(standardise(&table.name)).or_default().push(table.clone());
		}

		for (position, (_, tables)) in by_name.into_iter().enumerate() {
			let destination = TableId(position as u32 + 1);
			let mapped = match tables.as_slice() {
				[table] => self.build_table(destination, table)?,
				_ => self.build_union(destination, tables)?,
			};
			self.mapping.insert(mapped);
		}

		debug!(tables = self.mapping.len(), datasources = self.datasources.len(), "adapter built");
		Ok(AdaptedDecorator::new(self.datasources, self.mapping)?)
	}

	#[instrument(name = "adapter::build_table", level = "debug", skip(self, config), fields(table = %config.name))]
	fn build_table(&mut self, destination: TableId, config: &AdaptedTableConfig) -> crate::Result<MappedTable> {
		if let Some(data) = &config.data {
			return self.build_embedded(destination, config, data);
		}

		let mut stage = self.resolve_source(config)?;
		let mut filter = config.filter.as_deref();
		if config.join.is_some() {
			stage = self.build_join(config, stage)?;
			filter = None;
		}

		let library = self.session.environment().library().clone();
		if config.is_grouped() {
			if filter.is_some() {
				stage = self.build_filter(config, stage, filter, &[], None, None)?;
			}
			return self.build_grouped(destination, config, stage);
		}

		if filter.is_some() || !config.sort.is_empty() || config.limit.is_some() {
			let resolver = TableResolver::from_def(&self.store(stage).table_def(stage.table)?);
			let keys = self.compile_sort(config, &config.sort, &resolver, &library)?;
			stage = self.build_filter(config, stage, filter, &keys, config.limit, Some(&resolver))?;
		}
		self.map_columns(destination, config, stage)
	}

	fn store(&self, stage: Stage) -> &DatastoreRef {
		&self.datasources[stage.datasource]
	}

	fn push(&mut self, store: DatastoreRef) -> usize {
		self.datasources.push(store);
		self.datasources.len() - 1
	}

	fn resolve_source(&mut self, config: &AdaptedTableConfig) -> crate::Result<Stage> {
		let Some(name) = config.from_datastore.as_deref() else {
			return Err(self.invalid(config, "no source datastore and no embedded data"));
		};
		let datasource = self.resolve_datastore(config, name)?;
		let table_name = config.from_table.as_deref().unwrap_or(&config.name);
		let table = self.find_table(config, datasource, name, table_name)?;
		Ok(Stage {
			datasource,
			table,
		})
	}

	/// Datasource position of the datastore or adapter called `name`,
	/// building the adapter first if this session has not yet.
	fn resolve_datastore(&mut self, config: &AdaptedTableConfig, name: &str) -> crate::Result<usize> {
		let key = standardise(name);
		if let Some(position) = self.named.get(&key) {
			return Ok(*position);
		}

		let environment = self.session.environment();
		let store = if let Some(store) = environment.datastore(name) {
			store.clone()
		} else if environment.adapter(name).is_some() {
			self.session.build_with_callers(name, &self.callers)? as DatastoreRef
		} else {
			return Err(BuildError::UnknownDatastore {
				adapter: self.config.id.clone(),
				table: config.name.clone(),
				name: name.to_string(),
			});
		};

		let position = self.push(store);
		self.named.insert(key, position);
		Ok(position)
	}

	fn find_table(
		&self,
		config: &AdaptedTableConfig,
		datasource: usize,
		source_name: &str,
		table_name: &str,
	) -> crate::Result<TableId> {
		self.datasources[datasource].find_table(table_name).ok_or_else(|| BuildError::UnknownTable {
			adapter: self.config.id.clone(),
			table: config.name.clone(),
			source_name: source_name.to_string(),
			name: table_name.to_string(),
		})
	}

	#[instrument(name = "adapter::build_join", level = "debug", skip_all, fields(table = %config.name))]
	fn build_join(&mut self, config: &AdaptedTableConfig, outer: Stage) -> crate::Result<Stage> {
		let Some(join) = &config.join else {
			return Ok(outer);
		};
		let inner_datasource = self.resolve_datastore(config, &join.datastore)?;
		let inner_table = self.find_table(config, inner_datasource, &join.datastore, &join.table)?;

		// Names resolve to the first match, so an inner column named like an
		// outer one cannot be referenced.
		let outer_def = self.store(outer).table_def(outer.table)?;
		let inner_def = self.datasources[inner_datasource].table_def(inner_table)?;
		let shadowed: Vec<&str> = inner_def
			.columns
			.iter()
			.filter(|c| outer_def.column_index(&c.name).is_some())
			.map(|c| c.name.as_str())
			.collect();
		if !shadowed.is_empty() {
			self.session.report_mut().warn(
				&self.config.id,
				&config.name,
				format!("inner fields {} are hidden by outer fields of the same name", shadowed.join(", ")),
			);
		}

		let joined = JoinDecorator::new(
			&config.name,
			self.store(outer).clone(),
			outer.table,
			self.datasources[inner_datasource].clone(),
			inner_table,
		)?;
		let filter = match config.filter.as_deref() {
			Some(text) => {
				let resolver = TableResolver::from_def(&joined.table_def(joined.table_id())?);
				let library = self.session.environment().library().clone();
				Some(self.compile(config, text, &resolver, &library)?)
			}
			None => None,
		};

		let optimiser = FilterFormulaOptimiser::new(joined.clone(), filter.as_ref());
		optimiser.fill(&*self.session)?;

		let table = joined.table_id();
		Ok(Stage {
			datasource: self.push(joined),
			table,
		})
	}

	/// Wraps `stage` in a [`RowFilterDecorator`] admitting the rows `filter`
	/// accepts, ordered by `keys` and cut to `limit`.
	///
	/// Without a filter every row is admitted. Rows with equal sort keys keep
	/// their source order.
	fn build_filter(
		&mut self,
		config: &AdaptedTableConfig,
		stage: Stage,
		filter: Option<&str>,
		keys: &[(CompiledExpression, bool)],
		limit: Option<usize>,
		resolver: Option<&TableResolver>,
	) -> crate::Result<Stage> {
		let store = self.store(stage).clone();
		let admitted: HashSet<RowId> = match filter {
			Some(text) => {
				let resolver = match resolver {
					Some(resolver) => resolver.clone(),
					None => TableResolver::from_def(&store.table_def(stage.table)?),
				};
				let library = self.session.environment().library().clone();
				let expr = self.compile(config, text, &resolver, &library)?;
				self.select_rows(stage, &expr)?
			}
			None => store.row_ids(stage.table)?.into_iter().collect(),
		};

		let view = RowFilterDecorator::with_index_threshold(store, self.session.config().filter_index_threshold);
		view.add_table(stage.table)?;
		let update = view.update(&admitted, false)?;
		debug!(table = %config.name, rows = update.rows_added, "rows admitted");

		let stage = Stage {
			datasource: self.push(view.clone()),
			table: stage.table,
		};
		if !keys.is_empty() {
			self.sort_view(&view, stage, keys)?;
		}
		if let Some(limit) = limit {
			view.truncate(stage.table, limit)?;
		}
		Ok(stage)
	}

	/// Ids of the rows of `stage` that `expr` accepts.
	fn select_rows(&self, stage: Stage, expr: &CompiledExpression) -> crate::Result<HashSet<RowId>> {
		let store = self.store(stage);

		if let Some((col, value)) = expr.as_column_equals_constant() {
			let ty = store.column(stage.table, col)?.ty;
			if index_compatible(ty, &value) {
				debug!(column = col, %value, "filter answered by the column index");
				return index_hits(&**store, stage.table, col, &value, |v| loose_eq(v, &value));
			}
		}
		if let Some(col) = expr.as_bare_column() {
			if store.column(stage.table, col)?.ty == Type::Boolean {
				debug!(column = col, "filter answered by the column index");
				return index_hits(&**store, stage.table, col, &Value::Boolean(true), Value::is_true);
			}
		}

		let mut result = HashSet::new();
		for (index, row) in store.row_ids(stage.table)?.into_iter().enumerate() {
			self.session.poll(index)?;
			let ctx = EvaluationContext::new(&self.datasources, stage.datasource, stage.table)
				.with_row(row)
				.with_row_index(index);
			let value = expr.evaluate(&ctx).map_err(|source| evaluation(expr, Some(index), source))?;
			if value.is_true() {
				result.insert(row);
			}
		}
		Ok(result)
	}

	fn compile_sort(
		&self,
		config: &AdaptedTableConfig,
		sort: &[SortConfig],
		resolver: &dyn VariableResolver,
		library: &FunctionLibrary,
	) -> crate::Result<Vec<(CompiledExpression, bool)>> {
		sort.iter().map(|key| Ok((self.compile(config, &key.formula, resolver, library)?, key.ascending))).collect()
	}

	/// Orders the admitted rows of `view` by `keys`, compared numerically
	/// where both sides are numbers.
	fn sort_view(&self, view: &RowFilterDecorator, stage: Stage, keys: &[(CompiledExpression, bool)]) -> crate::Result<()> {
		let mut values: HashMap<RowId, Vec<Value>> = HashMap::new();
		for (index, row) in view.admitted_rows(stage.table)?.into_iter().enumerate() {
			self.session.poll(index)?;
			let ctx = EvaluationContext::new(&self.datasources, stage.datasource, stage.table)
				.with_row(row)
				.with_row_index(index);
			let row_keys = keys
				.iter()
				.map(|(expr, _)| expr.evaluate(&ctx).map_err(|source| evaluation(expr, Some(index), source)))
				.collect::<crate::Result<Vec<_>>>()?;
			values.insert(row, row_keys);
		}

		view.sort_rows(stage.table, |a, b| {
			let (Some(a), Some(b)) = (values.get(a), values.get(b)) else {
				return std::cmp::Ordering::Equal;
			};
			keys.iter()
				.zip(a.iter().zip(b))
				.map(|((_, ascending), (l, r))| {
					let ordering = compare_numeric_aware(l, r);
					if *ascending {
						ordering
					} else {
						ordering.reverse()
					}
				})
				.find(|o| o.is_ne())
				.unwrap_or(std::cmp::Ordering::Equal)
		})?;
		Ok(())
	}

	/// Maps each configured column onto a source column or a formula over
	/// the source row. Without configured columns every source column passes
	/// through.
	fn map_columns(
		&mut self,
		destination: TableId,
		config: &AdaptedTableConfig,
		stage: Stage,
	) -> crate::Result<MappedTable> {
		let source = self.store(stage).table_def(stage.table)?;
		let library = self.session.environment().library().clone();
		let resolver = TableResolver::from_def(&source);

		let configured: Vec<AdapterColumnConfig> = if config.columns.is_empty() {
			source.columns.iter().map(|c| AdapterColumnConfig::field(c.name.clone())).collect()
		} else {
			config.columns.clone()
		};

		let mut columns = Vec::with_capacity(configured.len());
		let mut defs = Vec::with_capacity(configured.len());
		for column in &configured {
			let (mapped, ty) = if column.formula {
				let expr = self.compile(config, column.source_text(), &resolver, &library)?;
				(MappedColumn::Formula(expr), column.ty.unwrap_or(Type::Any))
			} else {
				match source.column_index(column.source_text()) {
					Some(index) => (MappedColumn::Source(index), column.ty.unwrap_or(source.columns[index].ty)),
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

	fn destination_def(
		&self,
		id: TableId,
		config: &AdaptedTableConfig,
		stage: Stage,
		columns: Vec<ColumnDef>,
	) -> crate::Result<TableDef> {
		let granted = self.store(stage).table_flags(stage.table)?;
		let flags = match config.flags {
			Some(wanted) => granted & wanted,
			None => granted,
		};
		Ok(TableDef {
			id,
			name: config.name.clone(),
			flags,
			tags: config.tags.clone(),
			columns,
		})
	}

	fn compile(
		&self,
		config: &AdaptedTableConfig,
		text: &str,
		resolver: &dyn VariableResolver,
		library: &FunctionLibrary,
	) -> crate::Result<CompiledExpression> {
		self.session.environment().compiler().compile(text, resolver, library).map_err(|source| BuildError::Formula {
			adapter: self.config.id.clone(),
			table: config.name.clone(),
			formula: text.to_string(),
			source,
		})
	}

	fn invalid(&self, config: &AdaptedTableConfig, message: impl Into<String>) -> BuildError {
		BuildError::InvalidConfiguration {
			adapter: self.config.id.clone(),
			table: config.name.clone(),
			message: message.into(),
		}
	}

	fn unknown_field(&self, config: &AdaptedTableConfig, field: &str) -> BuildError {
		BuildError::UnknownField {
			adapter: self.config.id.clone(),
			table: config.name.clone(),
			field: field.to_string(),
		}
	}
}

fn evaluation(expr: &CompiledExpression, row: Option<usize>, source: FormulaError) -> BuildError {
	BuildError::Evaluation {
		formula: expr.text().to_string(),
		row,
		source,
	}
}

fn destination_column(position: usize, config: &AdapterColumnConfig, ty: Type) -> ColumnDef {
	let mut flags = ColumnFlags::empty();
	if config.optional {
		flags.insert(ColumnFlags::OPTIONAL);
	}
	if config.formula {
		flags.insert(ColumnFlags::READ_ONLY);
	}
	ColumnDef {
		id: ColumnId(position as u32),
		name: config.name.clone(),
		ty,
		flags,
		tags: config.tags.clone(),
		default: config.default.clone(),
	}
}

/// Whether an index lookup for `value` in a column of type `ty` finds
/// exactly the rows a `==` comparison accepts.
///
/// The constant must also convert to the column type without loss: the
/// index looks up the converted value, so `4.6` on an integer column would
/// otherwise find the rows holding `5`.
fn index_compatible(ty: Type, value: &Value) -> bool {
	let shape = match value {
		Value::Int8(_) | Value::Float8(_) => ty.is_number(),
		Value::Utf8(_) => ty == Type::Utf8,
		Value::Boolean(_) => ty == Type::Boolean,
		Value::Undefined | Value::Geometry(_) => false,
	};
	shape && ty.coerce(value).is_ok_and(|converted| loose_eq(&converted, value))
}

/// Rows the index of `col` returns for `wanted`, keeping only those whose
/// stored value `accept`s. Decorated stores answer `find` with their own
/// conversions, so every hit is checked against what a scan would see.
fn index_hits(
	store: &dyn Datastore,
	table: TableId,
	col: usize,
	wanted: &Value,
	accept: impl Fn(&Value) -> bool,
) -> crate::Result<HashSet<RowId>> {
	let mut rows = HashSet::new();
	for row in store.find(table, col, wanted)? {
		if accept(&store.value_by_id(table, row, col)?) {
			rows.insert(row);
		}
	}
	Ok(rows)
}
