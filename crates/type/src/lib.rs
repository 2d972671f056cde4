// SPDX-License-Identifier: MIT
// Copyright (c) 2025 ReifyDB

#![cfg_attr(not(debug_assertions), deny(warnings))]

pub mod error;
pub mod value;

pub use error::TypeError;
pub use value::{
	Value,
	compare::{compare_numeric_aware, loose_eq, standardise},
	geometry::{BoundingBox, Geometry, Point},
	r#type::Type,
};

pub type Result<T> = std::result::Result<T, TypeError>;
