// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Aggregates over the source rows of one group row.

use std::fmt::{Display, Formatter};

use smallvec::SmallVec;
use tabula_type::{Geometry, Point, Value, compare_numeric_aware};

use crate::{FormulaError, function::geo::geometry};

/// Argument values of one source row.
pub type ArgRow = SmallVec<[Value; 3]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
	Sum,
	Count,
	GroupCount,
	Avg,
	Min,
	Max,
	First,
	Last,
	GroupConcat,
	WeightedCentroid,
	GeomUnion,
}

impl AggregateKind {
	pub fn from_name(name: &str) -> Option<Self> {
		Some(match name.to_ascii_lowercase().as_str() {
			"sum" => AggregateKind::Sum,
			"count" => AggregateKind::Count,
			"groupcount" => AggregateKind::GroupCount,
			"avg" | "average" => AggregateKind::Avg,
			"min" => AggregateKind::Min,
			"max" => AggregateKind::Max,
			"first" => AggregateKind::First,
			"last" => AggregateKind::Last,
			"groupconcat" => AggregateKind::GroupConcat,
			"weightedcentroid" => AggregateKind::WeightedCentroid,
			"geomunion" => AggregateKind::GeomUnion,
			_ => return None,
		})
	}

	pub fn name(&self) -> &'static str {
		match self {
			AggregateKind::Sum => "sum",
			AggregateKind::Count => "count",
			AggregateKind::GroupCount => "groupcount",
			AggregateKind::Avg => "avg",
			AggregateKind::Min => "min",
			AggregateKind::Max => "max",
			AggregateKind::First => "first",
			AggregateKind::Last => "last",
			AggregateKind::GroupConcat => "groupconcat",
			AggregateKind::WeightedCentroid => "weightedcentroid",
			AggregateKind::GeomUnion => "geomunion",
		}
	}

	pub fn arity(&self) -> (usize, Option<usize>) {
		match self {
			AggregateKind::GroupCount => (0, Some(0)),
			AggregateKind::Count => (0, Some(1)),
			AggregateKind::GroupConcat => (1, Some(2)),
			AggregateKind::WeightedCentroid => (2, Some(3)),
			_ => (1, Some(1)),
		}
	}

	/// Folds the argument values of every source row of a group.
	pub fn reduce(&self, rows: &[ArgRow]) -> crate::Result<Value> {
		let first_args = || rows.iter().filter_map(|r| r.first()).filter(|v| !v.is_undefined());
		match self {
			AggregateKind::GroupCount => Ok(Value::Int8(rows.len() as i64)),
			AggregateKind::Count => {
				if rows.first().is_some_and(|r| r.is_empty()) {
					Ok(Value::Int8(rows.len() as i64))
				} else {
					Ok(Value::Int8(first_args().count() as i64))
				}
			}
			AggregateKind::Sum => sum(first_args()),
			AggregateKind::Avg => {
				let mut total = 0.0;
				let mut n = 0usize;
				for v in first_args() {
					total += number(v, "avg")?;
					n += 1;
				}
				Ok(if n == 0 {
					Value::Undefined
				} else {
					Value::float8(total / n as f64)
				})
			}
			AggregateKind::Min => Ok(first_args().min_by(|l, r| compare_numeric_aware(l, r)).cloned().unwrap_or_default()),
			AggregateKind::Max => Ok(first_args().max_by(|l, r| compare_numeric_aware(l, r)).cloned().unwrap_or_default()),
			AggregateKind::First => Ok(rows.first().and_then(|r| r.first()).cloned().unwrap_or_default()),
			AggregateKind::Last => Ok(rows.last().and_then(|r| r.first()).cloned().unwrap_or_default()),
			AggregateKind::GroupConcat => {
				let separator = rows
					.first()
					.and_then(|r| r.get(1))
					.map(|v| v.to_string())
					.unwrap_or_else(|| ",".to_string());
				let parts: Vec<String> =
					first_args().map(|v| v.to_string()).filter(|s| !s.is_empty()).collect();
				Ok(Value::Utf8(parts.join(&separator)))
			}
			AggregateKind::WeightedCentroid => weighted_centroid(rows),
			AggregateKind::GeomUnion => {
				let mut parts: Vec<Geometry> = vec![];
				for v in first_args() {
					if let Some(g) = geometry(v)? {
						parts.extend(g.parts().into_iter().cloned());
					}
				}
				Ok(match parts.len() {
					0 => Value::Undefined,
					1 => Value::geometry(parts.remove(0)),
					_ => Value::geometry(Geometry::Multi(parts)),
				})
			}
		}
	}
}

impl Display for AggregateKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

fn number(value: &Value, function: &str) -> crate::Result<f64> {
	value
		.as_f64()
		.ok_or_else(|| FormulaError::evaluation(format!("{}() expects numbers, got '{}'", function, value)))
}

fn sum<'a>(values: impl Iterator<Item = &'a Value>) -> crate::Result<Value> {
	let mut int_total: Option<i64> = Some(0);
	let mut float_total = 0.0;
	for v in values {
		let f = number(v, "sum")?;
		float_total += f;
		int_total = match (int_total, v) {
			(Some(total), Value::Int8(i)) => total.checked_add(*i),
			_ => None,
		};
	}
	Ok(match int_total {
		Some(total) => Value::Int8(total),
		None => Value::float8(float_total),
	})
}

/// `weightedcentroid(geometry, weight)` or `weightedcentroid(lat, lon, weight)`.
fn weighted_centroid(rows: &[ArgRow]) -> crate::Result<Value> {
	let mut total_weight = 0.0;
	let mut x = 0.0;
	let mut y = 0.0;
	for row in rows {
		let (point, weight) = match row.as_slice() {
			[g, w] => (geometry(g)?.and_then(|g| g.centroid()), w),
			[lat, lon, w] => {
				let p = match (lat.as_f64(), lon.as_f64()) {
					(Some(lat), Some(lon)) => Some(Point::from_lat_lon(lat, lon)),
					_ => None,
				};
				(p, w)
			}
			_ => continue,
		};
		let (Some(point), Some(weight)) = (point, weight.as_f64()) else {
			continue;
		};
		total_weight += weight;
		x += point.x * weight;
		y += point.y * weight;
	}
	if total_weight.abs() <= f64::EPSILON {
		return Ok(Value::Undefined);
	}
	Ok(Value::geometry(Point::new(x / total_weight, y / total_weight)))
}

#[cfg(test)]
mod tests {
	use smallvec::smallvec;

	use super::*;

	fn column(values: &[Value]) -> Vec<ArgRow> {
		values.iter().map(|v| smallvec![v.clone()]).collect()
	}

	#[test]
	fn test_sum_stays_integer() {
		let rows = column(&[Value::Int8(2), Value::Undefined, Value::Int8(5)]);
		assert_eq!(AggregateKind::Sum.reduce(&rows).unwrap(), Value::Int8(7));
		let rows = column(&[Value::Int8(2), Value::Float8(0.5)]);
		assert_eq!(AggregateKind::Sum.reduce(&rows).unwrap(), Value::Float8(2.5));
		assert_eq!(AggregateKind::Sum.reduce(&[]).unwrap(), Value::Int8(0));
	}

	#[test]
	fn test_counts() {
		let rows = column(&[Value::Int8(1), Value::Undefined, Value::utf8("x")]);
		assert_eq!(AggregateKind::Count.reduce(&rows).unwrap(), Value::Int8(2));
		assert_eq!(AggregateKind::GroupCount.reduce(&rows).unwrap(), Value::Int8(3));
		let empty_args: Vec<ArgRow> = vec![smallvec![], smallvec![]];
		assert_eq!(AggregateKind::Count.reduce(&empty_args).unwrap(), Value::Int8(2));
	}

	#[test]
	fn test_min_max_avg() {
		let rows = column(&[Value::Int8(4), Value::utf8("10"), Value::Float8(-1.5)]);
		assert_eq!(AggregateKind::Min.reduce(&rows).unwrap(), Value::Float8(-1.5));
		assert_eq!(AggregateKind::Max.reduce(&rows).unwrap(), Value::utf8("10"));
		assert_eq!(AggregateKind::Avg.reduce(&rows).unwrap(), Value::Float8(12.5 / 3.0));
	}

	#[test]
	fn test_group_concat() {
		let rows: Vec<ArgRow> = vec![
			smallvec![Value::utf8("a"), Value::utf8("|")],
			smallvec![Value::Undefined, Value::utf8("|")],
			smallvec![Value::utf8("b"), Value::utf8("|")],
		];
		assert_eq!(AggregateKind::GroupConcat.reduce(&rows).unwrap(), Value::utf8("a|b"));
	}

	#[test]
	fn test_weighted_centroid() {
		let rows: Vec<ArgRow> = vec![
			smallvec![Value::Float8(0.0), Value::Float8(0.0), Value::Float8(1.0)],
			smallvec![Value::Float8(10.0), Value::Float8(20.0), Value::Float8(3.0)],
		];
		let centroid = AggregateKind::WeightedCentroid.reduce(&rows).unwrap();
		let p = centroid.as_geometry().and_then(|g| g.centroid()).unwrap();
		assert_eq!((p.latitude(), p.longitude()), (7.5, 15.0));
	}

	#[test]
	fn test_geom_union() {
		let rows = column(&[Value::utf8("POINT (1 2)"), Value::utf8("MULTIPOINT ((3 4), (5 6))")]);
		let union = AggregateKind::GeomUnion.reduce(&rows).unwrap();
		assert!(matches!(union.as_geometry(), Some(Geometry::Multi(parts)) if parts.len() == 3));
	}
}
