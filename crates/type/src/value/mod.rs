// SPDX-License-Identifier: MIT
// Copyright (c) 2025 ReifyDB

use std::{
	fmt::{Display, Formatter},
	sync::Arc,
};

use serde::{Deserialize, Serialize};

mod coerce;
pub mod compare;
pub mod geometry;
pub mod r#type;

use geometry::Geometry;
use r#type::Type;

/// A cell value, represented as a native Rust type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
	/// Value is not defined (think null in common programming languages)
	#[default]
	Undefined,
	/// A boolean: true or false.
	Boolean(bool),
	/// An 8-byte signed integer
	Int8(i64),
	/// An 8-byte floating point
	Float8(f64),
	/// A UTF-8 encoded text.
	Utf8(String),
	/// A geometry in unprojected longitude/latitude coordinates
	Geometry(Arc<Geometry>),
}

impl Value {
	pub fn undefined() -> Self {
		Value::Undefined
	}

	pub fn bool(v: impl Into<bool>) -> Self {
		Value::Boolean(v.into())
	}

	pub fn int8(v: impl Into<i64>) -> Self {
		Value::Int8(v.into())
	}

	pub fn float8(v: impl Into<f64>) -> Self {
		let v = v.into();
		if v.is_nan() {
			Value::Undefined
		} else {
			Value::Float8(v)
		}
	}

	pub fn utf8(v: impl Into<String>) -> Self {
		Value::Utf8(v.into())
	}

	pub fn geometry(v: impl Into<Geometry>) -> Self {
		Value::Geometry(Arc::new(v.into()))
	}

	pub fn is_undefined(&self) -> bool {
		matches!(self, Value::Undefined)
	}

	/// The natural type of this value, `None` for undefined.
	pub fn get_type(&self) -> Option<Type> {
		match self {
			Value::Undefined => None,
			Value::Boolean(_) => Some(Type::Boolean),
			Value::Int8(_) => Some(Type::Int8),
			Value::Float8(_) => Some(Type::Float8),
			Value::Utf8(_) => Some(Type::Utf8),
			Value::Geometry(_) => Some(Type::Geometry),
		}
	}

	/// Numeric view of the value. Text is parsed, booleans map to 0/1.
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Boolean(b) => Some(if *b {
				1.0
			} else {
				0.0
			}),
			Value::Int8(v) => Some(*v as f64),
			Value::Float8(v) => Some(*v),
			Value::Utf8(s) => s.trim().parse::<f64>().ok().filter(|v| !v.is_nan()),
			Value::Undefined | Value::Geometry(_) => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Value::Int8(v) => Some(*v),
			Value::Boolean(b) => Some(*b as i64),
			_ => self.as_f64().filter(|v| v.is_finite()).map(|v| v.round() as i64),
		}
	}

	/// Truthiness used by filters: numbers are true when non-zero, text when it
	/// reads as a true boolean or a non-zero number.
	pub fn is_true(&self) -> bool {
		match self {
			Value::Boolean(b) => *b,
			Value::Int8(v) => *v != 0,
			Value::Float8(v) => *v != 0.0,
			Value::Utf8(s) => {
				coerce::parse_bool(s).unwrap_or_else(|| s.trim().parse::<f64>().is_ok_and(|v| v != 0.0))
			}
			Value::Undefined | Value::Geometry(_) => false,
		}
	}

	pub fn as_geometry(&self) -> Option<&Geometry> {
		match self {
			Value::Geometry(g) => Some(g),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Utf8(s) => Some(s),
			_ => None,
		}
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Undefined => Ok(()),
			Value::Boolean(b) => Display::fmt(b, f),
			Value::Int8(v) => Display::fmt(v, f),
			Value::Float8(v) => Display::fmt(v, f),
			Value::Utf8(s) => f.write_str(s),
			Value::Geometry(g) => Display::fmt(g, f),
		}
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Boolean(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Value::Int8(v as i64)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Int8(v)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::float8(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::Utf8(v.to_string())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::Utf8(v)
	}
}

impl From<Geometry> for Value {
	fn from(v: Geometry) -> Self {
		Value::geometry(v)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(v: Option<T>) -> Self {
		v.map(Into::into).unwrap_or(Value::Undefined)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truthiness() {
		assert!(Value::int8(3).is_true());
		assert!(!Value::int8(0).is_true());
		assert!(Value::utf8("yes").is_true());
		assert!(Value::utf8("1.5").is_true());
		assert!(!Value::utf8("no").is_true());
		assert!(!Value::Undefined.is_true());
	}

	#[test]
	fn test_nan_is_undefined() {
		assert_eq!(Value::float8(f64::NAN), Value::Undefined);
	}

	#[test]
	fn test_untagged_json() {
		let values: Vec<Value> = serde_json::from_str(r#"[null, true, 5, 5.5, "x"]"#).unwrap();
		assert_eq!(
			values,
			vec![Value::Undefined, Value::Boolean(true), Value::Int8(5), Value::Float8(5.5), Value::utf8("x")]
		);
	}
}
