// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::fmt::{Display, Formatter};

use tracing::warn;

/// A non-fatal finding of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildWarning {
	pub adapter: String,
	pub table: String,
	pub message: String,
}

impl Display for BuildWarning {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "adapter '{}', table '{}': {}", self.adapter, self.table, self.message)
	}
}

/// Warnings collected over a build session. Each one is also logged.
#[derive(Debug, Default)]
pub struct BuildReport {
	warnings: Vec<BuildWarning>,
}

impl BuildReport {
	pub fn warn(&mut self, adapter: &str, table: &str, message: impl Into<String>) {
		let warning = BuildWarning {
			adapter: adapter.to_string(),
			table: table.to_string(),
			message: message.into(),
		};
		warn!(adapter, table, message = %warning.message, "adapter build warning");
		self.warnings.push(warning);
	}

	pub fn warnings(&self) -> &[BuildWarning] {
		&self.warnings
	}

	pub fn is_empty(&self) -> bool {
		self.warnings.is_empty()
	}
}
