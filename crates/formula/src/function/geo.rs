// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::Arc;

use tabula_type::{Geometry, Point, Type, Value};

use crate::{FormulaError, function::NativeFunction};

pub(super) const FUNCTIONS: [NativeFunction; 4] = [
	NativeFunction {
		name: "point",
		min: 2,
		max: Some(2),
		body: point,
	},
	NativeFunction {
		name: "lat",
		min: 1,
		max: Some(1),
		body: |args| Ok(geometry(&args[0])?.and_then(|g| g.latitude()).map(Value::float8).unwrap_or_default()),
	},
	NativeFunction {
		name: "lon",
		min: 1,
		max: Some(1),
		body: |args| Ok(geometry(&args[0])?.and_then(|g| g.longitude()).map(Value::float8).unwrap_or_default()),
	},
	NativeFunction {
		name: "geomContains",
		min: 2,
		max: Some(3),
		body: geom_contains,
	},
];

/// Reads a geometry argument; text is parsed as WKT.
pub(crate) fn geometry(value: &Value) -> crate::Result<Option<Arc<Geometry>>> {
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

fn coordinate(value: &Value, what: &str) -> crate::Result<Option<f64>> {
	if value.is_undefined() {
		return Ok(None);
	}
	value.as_f64().map(Some).ok_or_else(|| FormulaError::evaluation(format!("{} must be a number, got '{}'", what, value)))
}

fn point(args: &[Value]) -> crate::Result<Value> {
	match (coordinate(&args[0], "latitude")?, coordinate(&args[1], "longitude")?) {
		(Some(lat), Some(lon)) => Ok(Value::geometry(Point::from_lat_lon(lat, lon))),
		_ => Ok(Value::Undefined),
	}
}

/// `geomContains(geometry, latitude, longitude)` or `geomContains(geometry, point)`.
fn geom_contains(args: &[Value]) -> crate::Result<Value> {
	let Some(container) = geometry(&args[0])? else {
		return Ok(Value::Boolean(false));
	};
	let probe = if args.len() == 3 {
		match (coordinate(&args[1], "latitude")?, coordinate(&args[2], "longitude")?) {
			(Some(lat), Some(lon)) => Point::from_lat_lon(lat, lon),
			_ => return Ok(Value::Boolean(false)),
		}
	} else {
		match geometry(&args[1])?.and_then(|g| g.centroid()) {
			Some(p) => p,
			None => return Ok(Value::Boolean(false)),
		}
	};
	Ok(Value::Boolean(container.contains_point(probe)))
}
