// SPDX-License-Identifier: MIT
// Copyright (c) 2025 ReifyDB

use std::{
	fmt::{Display, Formatter},
	str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::TypeError;

/// All possible column types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
	/// A boolean: true or false.
	#[serde(alias = "bool")]
	Boolean,
	/// A 4-byte signed integer
	#[serde(alias = "int", alias = "integer")]
	Int4,
	/// An 8-byte signed integer
	#[serde(alias = "long")]
	Int8,
	/// An 8-byte floating point
	#[serde(alias = "double", alias = "float")]
	Float8,
	/// A UTF-8 encoded text
	#[serde(alias = "string", alias = "text")]
	Utf8,
	/// A longitude/latitude geometry
	#[serde(alias = "geom")]
	Geometry,
	/// Accepts any value unchanged
	Any,
}

impl Type {
	pub fn is_number(&self) -> bool {
		matches!(self, Type::Int4 | Type::Int8 | Type::Float8)
	}
}

impl Display for Type {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Type::Boolean => f.write_str("BOOLEAN"),
			Type::Int4 => f.write_str("INT4"),
			Type::Int8 => f.write_str("INT8"),
			Type::Float8 => f.write_str("FLOAT8"),
			Type::Utf8 => f.write_str("UTF8"),
			Type::Geometry => f.write_str("GEOMETRY"),
			Type::Any => f.write_str("ANY"),
		}
	}
}

impl FromStr for Type {
	type Err = TypeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"boolean" | "bool" => Ok(Type::Boolean),
			"int4" | "int" | "integer" => Ok(Type::Int4),
			"int8" | "long" => Ok(Type::Int8),
			"float8" | "double" | "float" => Ok(Type::Float8),
			"utf8" | "string" | "text" => Ok(Type::Utf8),
			"geometry" | "geom" => Ok(Type::Geometry),
			"any" => Ok(Type::Any),
			_ => Err(TypeError::UnknownType {
				name: s.to_string(),
			}),
		}
	}
}
