// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::collections::HashMap;

use tabula_type::Value;

use crate::RowId;

/// Hashable form of a value. Numbers of any width hash to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum IndexKey {
	Undefined,
	Number(u64),
	Text(String),
}

impl IndexKey {
	pub fn of(value: &Value) -> Self {
		match value {
			Value::Undefined => IndexKey::Undefined,
			Value::Boolean(_) | Value::Int8(_) | Value::Float8(_) => {
				let v = value.as_f64().unwrap_or(0.0);
				// -0.0 and 0.0 must share a key
				let v = if v == 0.0 {
					0.0
				} else {
					v
				};
				IndexKey::Number(v.to_bits())
			}
			Value::Utf8(s) => IndexKey::Text(s.clone()),
			Value::Geometry(g) => IndexKey::Text(g.to_wkt()),
		}
	}
}

#[derive(Debug, Default)]
pub(crate) struct ColumnIndex {
	entries: HashMap<IndexKey, Vec<RowId>>,
}

impl ColumnIndex {
	pub fn build<'a>(values: impl Iterator<Item = (RowId, &'a Value)>) -> Self {
		let mut entries: HashMap<IndexKey, Vec<RowId>> = HashMap::new();
		for (row, value) in values {
			entries.entry(IndexKey::of(value)).or_default().push(row);
		}
		Self {
			entries,
		}
	}

	pub fn get(&self, value: &Value) -> Vec<RowId> {
		self.entries.get(&IndexKey::of(value)).cloned().unwrap_or_default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::TableId;

	#[test]
	fn test_numbers_share_keys() {
		let a = RowId::new(TableId(1), 1);
		let b = RowId::new(TableId(1), 2);
		let values = [Value::Int8(5), Value::Float8(5.0)];
		let index = ColumnIndex::build([a, b].into_iter().zip(values.iter()));
		assert_eq!(index.get(&Value::Boolean(false)), vec![]);
		assert_eq!(index.get(&Value::Int8(5)), vec![a, b]);
	}
}
