// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use tabula_formula::FormulaError;
use tabula_type::TypeError;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
	#[error("adapter '{adapter}' is not registered")]
	UnknownAdapter {
		adapter: String,
	},

	#[error("adapter '{adapter}', table '{table}': no datastore or adapter named '{name}'")]
	UnknownDatastore {
		adapter: String,
		table: String,
		name: String,
	},

	#[error("adapter '{adapter}', table '{table}': '{source_name}' has no table named '{name}'")]
	UnknownTable {
		adapter: String,
		table: String,
		source_name: String,
		name: String,
	},

	#[error("adapter '{adapter}', table '{table}': unknown field '{field}'")]
	UnknownField {
		adapter: String,
		table: String,
		field: String,
	},

	#[error("adapter '{adapter}' depends on itself through {}", .chain.join(" -> "))]
	CyclicDependency {
		adapter: String,
		chain: Vec<String>,
	},

	#[error("adapter '{adapter}', table '{table}': {message}")]
	InvalidConfiguration {
		adapter: String,
		table: String,
		message: String,
	},

	#[error("adapter '{adapter}', table '{table}': cannot compile '{formula}': {source}")]
	Formula {
		adapter: String,
		table: String,
		formula: String,
		source: FormulaError,
	},

	#[error("evaluating '{formula}'{} failed: {source}", row_suffix(.row))]
	Evaluation {
		formula: String,
		row: Option<usize>,
		source: FormulaError,
	},

	#[error("field '{field}': {source}")]
	Type {
		field: String,
		source: TypeError,
	},

	#[error("build cancelled")]
	Cancelled,

	#[error("malformed adapter configuration: {0}")]
	Parse(#[from] serde_json::Error),

	#[error(transparent)]
	Store(#[from] tabula_core::Error),
}

fn row_suffix(row: &Option<usize>) -> String {
	match row {
		Some(row) => format!(" at row {row}"),
		None => String::new(),
	}
}

impl BuildError {
	pub fn is_cancelled(&self) -> bool {
		matches!(self, BuildError::Cancelled)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_messages_carry_context() {
		let err = BuildError::CyclicDependency {
			adapter: "a".into(),
			chain: vec!["a".into(), "b".into(), "a".into()],
		};
		assert_eq!(err.to_string(), "adapter 'a' depends on itself through a -> b -> a");

		let err = BuildError::Evaluation {
			formula: "x / 0".into(),
			row: Some(3),
			source: FormulaError::evaluation("division by zero"),
		};
		assert_eq!(err.to_string(), "evaluating 'x / 0' at row 3 failed: division by zero");
	}
}
