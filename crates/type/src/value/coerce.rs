// SPDX-License-Identifier: MIT
// Copyright (c) 2025 ReifyDB

use std::sync::Arc;

use crate::{Geometry, Type, TypeError, Value};

pub(crate) fn parse_bool(text: &str) -> Option<bool> {
	match text.trim().to_ascii_lowercase().as_str() {
		"true" | "t" | "yes" | "y" | "1" => Some(true),
		"false" | "f" | "no" | "n" | "0" => Some(false),
		_ => None,
	}
}

impl Type {
	/// Converts `value` to this type using the shared column coercion rules.
	///
	/// Undefined always stays undefined, empty text becomes undefined for every
	/// non-text type.
	pub fn coerce(&self, value: &Value) -> crate::Result<Value> {
		if value.is_undefined() {
			return Ok(Value::Undefined);
		}

		if let Value::Utf8(s) = value {
			if *self != Type::Utf8 && *self != Type::Any && s.trim().is_empty() {
				return Ok(Value::Undefined);
			}
		}

		match self {
			Type::Any => Ok(value.clone()),
			Type::Boolean => coerce_boolean(value),
			Type::Int4 => {
				let v = coerce_integer(value, *self)?;
				match v {
					Value::Int8(n) if i32::try_from(n).is_err() => Err(TypeError::OutOfRange {
						value: n.to_string(),
						target: *self,
					}),
					v => Ok(v),
				}
			}
			Type::Int8 => coerce_integer(value, *self),
			Type::Float8 => match value {
				Value::Geometry(_) => Err(TypeError::cannot_coerce(value, *self)),
				Value::Float8(_) => Ok(value.clone()),
				_ => value.as_f64().map(Value::Float8).ok_or_else(|| TypeError::cannot_coerce(value, *self)),
			},
			Type::Utf8 => match value {
				Value::Utf8(_) => Ok(value.clone()),
				other => Ok(Value::Utf8(other.to_string())),
			},
			Type::Geometry => match value {
				Value::Geometry(_) => Ok(value.clone()),
				Value::Utf8(s) => Ok(Value::Geometry(Arc::new(Geometry::from_wkt(s)?))),
				_ => Err(TypeError::cannot_coerce(value, *self)),
			},
		}
	}
}

fn coerce_boolean(value: &Value) -> crate::Result<Value> {
	match value {
		Value::Boolean(_) => Ok(value.clone()),
		Value::Int8(v) => Ok(Value::Boolean(*v != 0)),
		Value::Float8(v) => Ok(Value::Boolean(*v != 0.0)),
		Value::Utf8(s) => parse_bool(s)
			.or_else(|| s.trim().parse::<f64>().ok().map(|v| v != 0.0))
			.map(Value::Boolean)
			.ok_or_else(|| TypeError::cannot_coerce(value, Type::Boolean)),
		Value::Geometry(_) | Value::Undefined => Err(TypeError::cannot_coerce(value, Type::Boolean)),
	}
}

fn coerce_integer(value: &Value, target: Type) -> crate::Result<Value> {
	match value {
		Value::Int8(_) => Ok(value.clone()),
		Value::Boolean(b) => Ok(Value::Int8(*b as i64)),
		Value::Float8(v) => float_to_integer(*v, value, target),
		Value::Utf8(s) => {
			let trimmed = s.trim();
			if let Ok(v) = trimmed.parse::<i64>() {
				return Ok(Value::Int8(v));
			}
			match trimmed.parse::<f64>() {
				Ok(v) => float_to_integer(v, value, target),
				Err(_) => Err(TypeError::cannot_coerce(value, target)),
			}
		}
		Value::Geometry(_) | Value::Undefined => Err(TypeError::cannot_coerce(value, target)),
	}
}

fn float_to_integer(v: f64, original: &Value, target: Type) -> crate::Result<Value> {
	if !v.is_finite() {
		return Err(TypeError::cannot_coerce(original, target));
	}
	let rounded = v.round();
	if rounded < i64::MIN as f64 || rounded > i64::MAX as f64 {
		return Err(TypeError::OutOfRange {
			value: original.to_string(),
			target,
		});
	}
	Ok(Value::Int8(rounded as i64))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Point;

	#[test]
	fn test_text_to_numbers() {
		assert_eq!(Type::Int8.coerce(&Value::utf8(" 42 ")).unwrap(), Value::Int8(42));
		assert_eq!(Type::Int8.coerce(&Value::utf8("2.6")).unwrap(), Value::Int8(3));
		assert_eq!(Type::Float8.coerce(&Value::utf8("2.5")).unwrap(), Value::Float8(2.5));
		assert_eq!(Type::Float8.coerce(&Value::utf8("")).unwrap(), Value::Undefined);
		assert!(Type::Int8.coerce(&Value::utf8("abc")).is_err());
	}

	#[test]
	fn test_int4_range() {
		let result = Type::Int4.coerce(&Value::Int8(i64::MAX));
		assert!(matches!(result, Err(TypeError::OutOfRange { .. })));
	}

	#[test]
	fn test_to_text() {
		assert_eq!(Type::Utf8.coerce(&Value::Float8(5.0)).unwrap(), Value::utf8("5"));
		assert_eq!(Type::Utf8.coerce(&Value::Boolean(true)).unwrap(), Value::utf8("true"));
	}

	#[test]
	fn test_boolean() {
		assert_eq!(Type::Boolean.coerce(&Value::utf8("Yes")).unwrap(), Value::Boolean(true));
		assert_eq!(Type::Boolean.coerce(&Value::Int8(0)).unwrap(), Value::Boolean(false));
		assert!(Type::Boolean.coerce(&Value::utf8("maybe")).is_err());
	}

	#[test]
	fn test_geometry_from_text() {
		let v = Type::Geometry.coerce(&Value::utf8("POINT (1 2)")).unwrap();
		assert_eq!(v.as_geometry(), Some(&Geometry::Point(Point::new(1.0, 2.0))));
		assert!(Type::Geometry.coerce(&Value::Int8(1)).is_err());
	}
}
