// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Fills a join table from a filter formula without testing every pair when
//! the formula allows a shortcut.

use std::{cmp::Reverse, sync::Arc};

use tabula_core::{Datastore, DatastoreRef, RowId, Type};
use tabula_decorator::JoinDecorator;
use tabula_formula::{CompiledExpression, EvaluationContext, Expression, FormulaError, GeomContains};
use tabula_type::{Geometry, Point, Value};
use tracing::{debug, instrument};

use crate::{BuildError, BuildSession};

/// Shortcuts a filter conjunct qualifies for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimisationClasses(u8);

impl OptimisationClasses {
	/// Reads no row; evaluated once for the whole join.
	pub const ROW_INDEPENDENT: Self = Self(1);
	/// Reads only outer columns; can reject an outer row before any pairing.
	pub const INNER_TABLE_INDEPENDENT: Self = Self(1 << 1);
	/// `geomContains(outer geometry, inner lat, inner lon)`.
	pub const GEOM_CONTAINS_LAT_LONG: Self = Self(1 << 2);

	pub const fn contains(&self, other: Self) -> bool {
		self.0 & other.0 == other.0
	}

	pub fn insert(&mut self, other: Self) {
		self.0 |= other.0;
	}

	pub const fn count(&self) -> u32 {
		self.0.count_ones()
	}
}

/// One conjunct of a join filter and the shortcuts it qualifies for.
#[derive(Debug, Clone)]
pub struct FunctionRecord {
	pub conjunct: CompiledExpression,
	pub classes: OptimisationClasses,
	/// Set when the conjunct qualifies for the spatial index.
	pub spatial: Option<GeomContains>,
}

impl FunctionRecord {
	fn classify(conjunct: CompiledExpression, outer_width: usize) -> Self {
		let mut classes = OptimisationClasses::default();
		if !conjunct.is_row_dependent() {
			classes.insert(OptimisationClasses::ROW_INDEPENDENT);
		}
		if conjunct.referenced_columns().iter().all(|c| *c < outer_width) {
			classes.insert(OptimisationClasses::INNER_TABLE_INDEPENDENT);
		}
		let spatial = conjunct.as_geom_contains().filter(|g| {
			g.geometry.referenced_columns().iter().all(|c| *c < outer_width)
				&& g.lat >= outer_width
				&& g.lon >= outer_width
		});
		if spatial.is_some() {
			classes.insert(OptimisationClasses::GEOM_CONTAINS_LAT_LONG);
		}
		Self {
			conjunct,
			classes,
			spatial,
		}
	}

	fn is(&self, class: OptimisationClasses) -> bool {
		self.classes.contains(class)
	}

	fn test(&self, ctx: &EvaluationContext, row: Option<usize>) -> crate::Result<bool> {
		self.conjunct.evaluate(ctx).map(|v| v.is_true()).map_err(|source| BuildError::Evaluation {
			formula: self.conjunct.text().to_string(),
			row,
			source,
		})
	}
}

/// Materialises the rows of a [`JoinDecorator`] that satisfy a filter.
///
/// The filter, compiled over the joined columns, is split into conjuncts.
/// Records are ordered by how many shortcuts they qualify for, most first;
/// ties keep formula order.
pub struct FilterFormulaOptimiser {
	join: Arc<JoinDecorator>,
	records: Vec<FunctionRecord>,
}

impl FilterFormulaOptimiser {
	pub fn new(join: Arc<JoinDecorator>, filter: Option<&CompiledExpression>) -> Self {
		let outer_width = join.outer_width();
		let mut records: Vec<FunctionRecord> = filter
			.map(|f| f.conjuncts())
			.unwrap_or_default()
			.into_iter()
			.map(|c| FunctionRecord::classify(c, outer_width))
			.collect();
		records.sort_by_key(|r| Reverse(r.classes.count()));
		Self {
			join,
			records,
		}
	}

	pub fn records(&self) -> &[FunctionRecord] {
		&self.records
	}

	pub fn uses_spatial_index(&self) -> bool {
		self.spatial_record().is_some()
	}

	fn spatial_record(&self) -> Option<(usize, &GeomContains)> {
		self.records.iter().enumerate().find_map(|(i, r)| r.spatial.as_ref().map(|g| (i, g)))
	}

	/// Adds every qualifying pair to the join and returns how many were added.
	#[instrument(name = "adapter::fill_join", level = "debug", skip_all, fields(table = %self.join.table_id(), conjuncts = self.records.len()))]
	pub fn fill(&self, session: &BuildSession) -> crate::Result<usize> {
		let table = self.join.table_id();
		let joined = [self.join.clone() as DatastoreRef];

		let rowless = EvaluationContext::new(&joined, 0, table);
		for record in self.records.iter().filter(|r| r.is(OptimisationClasses::ROW_INDEPENDENT)) {
			if !record.test(&rowless, None)? {
				debug!(conjunct = record.conjunct.text(), "row-independent conjunct is false; join stays empty");
				return Ok(0);
			}
		}

		let spatial = self.spatial_record();
		let outer_checks: Vec<&FunctionRecord> = self
			.records
			.iter()
			.filter(|r| r.is(OptimisationClasses::INNER_TABLE_INDEPENDENT) && !r.is(OptimisationClasses::ROW_INDEPENDENT))
			.collect();
		let pair_checks: Vec<&FunctionRecord> = self
			.records
			.iter()
			.enumerate()
			.filter(|(i, r)| !r.is(OptimisationClasses::INNER_TABLE_INDEPENDENT) && spatial.is_none_or(|(s, _)| s != *i))
			.map(|(_, r)| r)
			.collect();

		let (outer, outer_table) = self.join.outer();
		let outer_sources = [outer.clone()];
		let outer_rows = outer.row_ids(outer_table)?;
		let mut added = 0;

		match spatial {
			Some((_, contains)) => {
				let index = session.spatial_cache().get_or_build(self.inner_points(contains)?);
				debug!(points = index.len(), "join uses the spatial index");
				for (n, outer_row) in outer_rows.into_iter().enumerate() {
					session.poll(n)?;
					let ctx = EvaluationContext::new(&outer_sources, 0, outer_table).with_row(outer_row);
					if !passes(&outer_checks, &ctx, n)? {
						continue;
					}
					let value = contains.geometry.evaluate(&ctx).map_err(|source| BuildError::Evaluation {
						formula: contains.geometry.text().to_string(),
						row: Some(n),
						source,
					})?;
					let geometry = as_geometry(&value).map_err(|source| BuildError::Evaluation {
						formula: contains.geometry.text().to_string(),
						row: Some(n),
						source,
					})?;
					let Some(geometry) = geometry else {
						continue;
					};
					for inner_row in index.query(&geometry) {
						if self.try_pair(outer_row, inner_row, &pair_checks, &joined, n)? {
							added += 1;
						}
					}
				}
			}
			None => {
				let (inner, inner_table) = self.join.inner();
				let inner_rows = inner.row_ids(inner_table)?;
				for (n, outer_row) in outer_rows.into_iter().enumerate() {
					session.poll(n)?;
					let ctx = EvaluationContext::new(&outer_sources, 0, outer_table).with_row(outer_row);
					if !passes(&outer_checks, &ctx, n)? {
						continue;
					}
					for inner_row in &inner_rows {
						if self.try_pair(outer_row, *inner_row, &pair_checks, &joined, n)? {
							added += 1;
						}
					}
				}
			}
		}

		debug!(rows = added, "join filled");
		Ok(added)
	}

	/// Inner rows with both coordinates set. Rows missing one can never be
	/// contained.
	fn inner_points(&self, contains: &GeomContains) -> crate::Result<Vec<(RowId, Point)>> {
		let width = self.join.outer_width();
		let (inner, inner_table) = self.join.inner();
		let mut points = vec![];
		for row in inner.row_ids(inner_table)? {
			let lat = inner.value_by_id(inner_table, row, contains.lat - width)?;
			let lon = inner.value_by_id(inner_table, row, contains.lon - width)?;
			if let (Some(lat), Some(lon)) = (lat.as_f64(), lon.as_f64()) {
				points.push((row, Point::from_lat_lon(lat, lon)));
			}
		}
		Ok(points)
	}

	fn try_pair(
		&self,
		outer_row: RowId,
		inner_row: RowId,
		checks: &[&FunctionRecord],
		joined: &[DatastoreRef],
		n: usize,
	) -> crate::Result<bool> {
		let table = self.join.table_id();
		let row = self.join.add_join_row(outer_row, inner_row)?;
		let ctx = EvaluationContext::new(joined, 0, table).with_row(row);
		if passes(checks, &ctx, n)? {
			return Ok(true);
		}
		self.join.delete_row(table, row)?;
		Ok(false)
	}
}

fn passes(checks: &[&FunctionRecord], ctx: &EvaluationContext, n: usize) -> crate::Result<bool> {
	for record in checks {
		if !record.test(ctx, Some(n))? {
			return Ok(false);
		}
	}
	Ok(true)
}

fn as_geometry(value: &Value) -> Result<Option<Arc<Geometry>>, FormulaError> {
	match value {
		Value::Undefined => Ok(None),
		Value::Geometry(g) => Ok(Some(g.clone())),
		Value::Utf8(_) => match Type::Geometry.coerce(value)? {
			Value::Geometry(g) => Ok(Some(g)),
			_ => Ok(None),
		},
		other => Err(FormulaError::evaluation(format!("expected a geometry, got '{}'", other))),
	}
}
