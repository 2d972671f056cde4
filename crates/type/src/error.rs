// SPDX-License-Identifier: MIT
// Copyright (c) 2025 ReifyDB

use crate::Type;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
	#[error("cannot coerce '{value}' to {target}")]
	CannotCoerce {
		value: String,
		target: Type,
	},

	#[error("value '{value}' is out of range for {target}")]
	OutOfRange {
		value: String,
		target: Type,
	},

	#[error("invalid geometry '{text}': {reason}")]
	InvalidGeometry {
		text: String,
		reason: String,
	},

	#[error("unknown type '{name}'")]
	UnknownType {
		name: String,
	},
}

impl TypeError {
	pub(crate) fn cannot_coerce(value: &crate::Value, target: Type) -> Self {
		TypeError::CannotCoerce {
			value: value.to_string(),
			target,
		}
	}
}
