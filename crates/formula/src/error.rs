// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use tabula_type::TypeError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
	#[error("unexpected character '{ch}' at offset {offset}")]
	UnexpectedChar {
		ch: char,
		offset: usize,
	},

	#[error("unterminated {what} starting at offset {offset}")]
	Unterminated {
		what: &'static str,
		offset: usize,
	},

	#[error("invalid number '{text}' at offset {offset}")]
	InvalidNumber {
		text: String,
		offset: usize,
	},

	#[error("expected {expected} but found {found} at offset {offset}")]
	UnexpectedToken {
		expected: &'static str,
		found: String,
		offset: usize,
	},

	#[error("unknown function '{name}'")]
	UnknownFunction {
		name: String,
	},

	#[error("unknown field '{name}'")]
	UnknownField {
		name: String,
	},

	#[error("function '{name}' expects {expected} arguments, got {actual}")]
	Arity {
		name: String,
		expected: String,
		actual: usize,
	},

	#[error("{message}")]
	Evaluation {
		message: String,
	},

	#[error("aggregate function '{name}' used outside of a grouped row")]
	AggregateOutsideGroup {
		name: String,
	},

	#[error("field '{name}' is not available here: {message}")]
	FieldUnavailable {
		name: String,
		message: String,
	},

	#[error(transparent)]
	Type(#[from] TypeError),

	#[error(transparent)]
	Store(#[from] tabula_core::Error),
}

impl FormulaError {
	pub fn evaluation(message: impl Into<String>) -> Self {
		FormulaError::Evaluation {
			message: message.into(),
		}
	}
}
