// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use tabula_type::Value;

use crate::{FormulaError, function::NativeFunction};

pub(super) const FUNCTIONS: [NativeFunction; 13] = [
	NativeFunction {
		name: "abs",
		min: 1,
		max: Some(1),
		body: abs,
	},
	NativeFunction {
		name: "round",
		min: 1,
		max: Some(2),
		body: round,
	},
	NativeFunction {
		name: "floor",
		min: 1,
		max: Some(1),
		body: |args| unary_float(args, "floor", f64::floor),
	},
	NativeFunction {
		name: "ceil",
		min: 1,
		max: Some(1),
		body: |args| unary_float(args, "ceil", f64::ceil),
	},
	NativeFunction {
		name: "sqrt",
		min: 1,
		max: Some(1),
		body: |args| unary_float(args, "sqrt", f64::sqrt),
	},
	NativeFunction {
		name: "pow",
		min: 2,
		max: Some(2),
		body: pow,
	},
	NativeFunction {
		name: "lower",
		min: 1,
		max: Some(1),
		body: |args| text(args, |s| s.to_lowercase()),
	},
	NativeFunction {
		name: "upper",
		min: 1,
		max: Some(1),
		body: |args| text(args, |s| s.to_uppercase()),
	},
	NativeFunction {
		name: "trim",
		min: 1,
		max: Some(1),
		body: |args| text(args, |s| s.trim().to_string()),
	},
	NativeFunction {
		name: "len",
		min: 1,
		max: Some(1),
		body: len,
	},
	NativeFunction {
		name: "concat",
		min: 0,
		max: None,
		body: concat,
	},
	NativeFunction {
		name: "contains",
		min: 2,
		max: Some(2),
		body: contains,
	},
	NativeFunction {
		name: "isnull",
		min: 1,
		max: Some(1),
		body: |args| Ok(Value::Boolean(args[0].is_undefined() || args[0].as_str().is_some_and(|s| s.trim().is_empty()))),
	},
];

fn number(value: &Value, function: &str) -> crate::Result<Option<f64>> {
	if value.is_undefined() {
		return Ok(None);
	}
	value
		.as_f64()
		.map(Some)
		.ok_or_else(|| FormulaError::evaluation(format!("{}() expects a number, got '{}'", function, value)))
}

fn abs(args: &[Value]) -> crate::Result<Value> {
	match &args[0] {
		Value::Int8(v) => Ok(v.checked_abs().map(Value::Int8).unwrap_or(Value::Float8((*v as f64).abs()))),
		other => Ok(number(other, "abs")?.map(|v| Value::float8(v.abs())).unwrap_or_default()),
	}
}

fn round(args: &[Value]) -> crate::Result<Value> {
	let Some(v) = number(&args[0], "round")? else {
		return Ok(Value::Undefined);
	};
	let digits = match args.get(1) {
		Some(d) => number(d, "round")?.unwrap_or(0.0) as i32,
		None => 0,
	};
	if digits == 0 {
		return Ok(match &args[0] {
			Value::Int8(i) => Value::Int8(*i),
			_ => Value::float8(v.round()),
		});
	}
	let scale = 10f64.powi(digits);
	Ok(Value::float8((v * scale).round() / scale))
}

fn unary_float(args: &[Value], name: &str, f: fn(f64) -> f64) -> crate::Result<Value> {
	Ok(number(&args[0], name)?.map(|v| Value::float8(f(v))).unwrap_or_default())
}

fn pow(args: &[Value]) -> crate::Result<Value> {
	match (number(&args[0], "pow")?, number(&args[1], "pow")?) {
		(Some(base), Some(exp)) => Ok(Value::float8(base.powf(exp))),
		_ => Ok(Value::Undefined),
	}
}

fn text(args: &[Value], f: fn(&str) -> String) -> crate::Result<Value> {
	if args[0].is_undefined() {
		return Ok(Value::Undefined);
	}
	Ok(Value::Utf8(f(&args[0].to_string())))
}

fn len(args: &[Value]) -> crate::Result<Value> {
	if args[0].is_undefined() {
		return Ok(Value::Int8(0));
	}
	Ok(Value::Int8(args[0].to_string().chars().count() as i64))
}

fn concat(args: &[Value]) -> crate::Result<Value> {
	Ok(Value::Utf8(args.iter().map(|v| v.to_string()).collect()))
}

fn contains(args: &[Value]) -> crate::Result<Value> {
	if args[0].is_undefined() || args[1].is_undefined() {
		return Ok(Value::Boolean(false));
	}
	Ok(Value::Boolean(args[0].to_string().contains(&args[1].to_string())))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn call(name: &str, args: &[Value]) -> Value {
		let f = FUNCTIONS.iter().find(|f| f.name == name).unwrap();
		(f.body)(args).unwrap()
	}

	#[test]
	fn test_math() {
		assert_eq!(call("abs", &[Value::Int8(-4)]), Value::Int8(4));
		assert_eq!(call("round", &[Value::Float8(2.346), Value::Int8(2)]), Value::Float8(2.35));
		assert_eq!(call("round", &[Value::utf8("2.5")]), Value::Float8(3.0));
		assert_eq!(call("floor", &[Value::Undefined]), Value::Undefined);
		assert_eq!(call("pow", &[Value::Int8(2), Value::Int8(10)]), Value::Float8(1024.0));
		assert_eq!(call("sqrt", &[Value::Int8(-1)]), Value::Undefined);
	}

	#[test]
	fn test_text() {
		assert_eq!(call("upper", &[Value::utf8("abc")]), Value::utf8("ABC"));
		assert_eq!(call("len", &[Value::utf8("héllo")]), Value::Int8(5));
		assert_eq!(call("concat", &[Value::utf8("a"), Value::Int8(1), Value::Undefined]), Value::utf8("a1"));
		assert_eq!(call("contains", &[Value::utf8("depot 4"), Value::utf8("pot")]), Value::Boolean(true));
		assert_eq!(call("isnull", &[Value::utf8("  ")]), Value::Boolean(true));
	}

	#[test]
	fn test_type_errors() {
		let abs = FUNCTIONS.iter().find(|f| f.name == "abs").unwrap();
		assert!((abs.body)(&[Value::utf8("x")]).is_err());
	}
}
