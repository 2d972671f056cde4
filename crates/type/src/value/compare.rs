// SPDX-License-Identifier: MIT
// Copyright (c) 2025 ReifyDB

use std::cmp::Ordering;

use crate::Value;

/// Canonical form used for group keys and case-insensitive matching.
pub fn standardise(text: &str) -> String {
	text.trim().to_lowercase()
}

/// Orders two values the way sort keys are ordered.
///
/// Undefined sorts first. When both sides read as numbers (including numeric
/// text) they compare numerically, otherwise they compare as case-insensitive
/// text with the exact text as a tie-break.
pub fn compare_numeric_aware(l: &Value, r: &Value) -> Ordering {
	match (l.is_undefined(), r.is_undefined()) {
		(true, true) => return Ordering::Equal,
		(true, false) => return Ordering::Less,
		(false, true) => return Ordering::Greater,
		(false, false) => {}
	}

	if let (Some(lv), Some(rv)) = (l.as_f64(), r.as_f64()) {
		return lv.partial_cmp(&rv).unwrap_or(Ordering::Equal);
	}

	let ls = l.to_string();
	let rs = r.to_string();
	ls.to_lowercase().cmp(&rs.to_lowercase()).then_with(|| ls.cmp(&rs))
}

/// Loose equality used by formula comparisons and index lookups: numbers
/// compare numerically, everything else by canonical text.
pub fn loose_eq(l: &Value, r: &Value) -> bool {
	match (l, r) {
		(Value::Undefined, Value::Undefined) => true,
		(Value::Undefined, _) | (_, Value::Undefined) => false,
		(Value::Utf8(a), Value::Utf8(b)) => a == b,
		(Value::Geometry(a), Value::Geometry(b)) => a == b,
		_ => match (l.as_f64(), r.as_f64()) {
			(Some(a), Some(b)) => a == b,
			_ => l.to_string() == r.to_string(),
		},
	}
}
