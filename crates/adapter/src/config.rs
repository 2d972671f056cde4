// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Declarative adapter descriptions and builder settings.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tabula_core::{TableFlags, Type, Value};

/// A named set of destination tables derived from datastores or other
/// adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
	pub id: String,
	#[serde(default)]
	pub tables: Vec<AdaptedTableConfig>,
}

impl AdapterConfig {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			tables: vec![],
		}
	}

	pub fn with_table(mut self, table: AdaptedTableConfig) -> Self {
		self.tables.push(table);
		self
	}

	pub fn from_json(text: &str) -> crate::Result<Self> {
		Ok(serde_json::from_str(text)?)
	}

	pub fn to_json(&self) -> crate::Result<String> {
		Ok(serde_json::to_string_pretty(self)?)
	}
}

/// One destination table. Tables of one adapter sharing a name are merged
/// into a union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptedTableConfig {
	pub name: String,
	/// Name of a registered datastore or adapter.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub from_datastore: Option<String>,
	/// Defaults to the destination table name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub from_table: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub join: Option<JoinConfig>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub filter: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub sort: Vec<SortConfig>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit: Option<usize>,
	/// Literal rows; excludes every other way of sourcing rows.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<EmbeddedData>,
	/// Permissions to keep; the built table never grants more than its
	/// backing table does.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub flags: Option<TableFlags>,
	#[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
	pub tags: BTreeSet<String>,
	#[serde(default)]
	pub columns: Vec<AdapterColumnConfig>,
}

impl AdaptedTableConfig {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			from_datastore: None,
			from_table: None,
			join: None,
			filter: None,
			sort: vec![],
			limit: None,
			data: None,
			flags: None,
			tags: BTreeSet::new(),
			columns: vec![],
		}
	}

	pub fn from_source(mut self, datastore: impl Into<String>, table: impl Into<String>) -> Self {
		self.from_datastore = Some(datastore.into());
		self.from_table = Some(table.into());
		self
	}

	pub fn join(mut self, datastore: impl Into<String>, table: impl Into<String>) -> Self {
		self.join = Some(JoinConfig {
			datastore: datastore.into(),
			table: table.into(),
		});
		self
	}

	pub fn filter(mut self, formula: impl Into<String>) -> Self {
		self.filter = Some(formula.into());
		self
	}

	pub fn sort(mut self, formula: impl Into<String>, ascending: bool) -> Self {
		self.sort.push(SortConfig {
			formula: formula.into(),
			ascending,
		});
		self
	}

	pub fn limit(mut self, limit: usize) -> Self {
		self.limit = Some(limit);
		self
	}

	pub fn data(mut self, data: EmbeddedData) -> Self {
		self.data = Some(data);
		self
	}

	pub fn column(mut self, column: AdapterColumnConfig) -> Self {
		self.columns.push(column);
		self
	}

	pub fn is_grouped(&self) -> bool {
		self.columns.iter().any(|c| c.group_by)
	}
}

/// Second table of a join; the source table is the outer side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinConfig {
	pub datastore: String,
	pub table: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortConfig {
	pub formula: String,
	#[serde(default = "ascending")]
	pub ascending: bool,
}

fn ascending() -> bool {
	true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedData {
	pub columns: Vec<String>,
	#[serde(default)]
	pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterColumnConfig {
	pub name: String,
	/// Destination type; defaults to the source field's type, or `any` for
	/// formulas.
	#[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
	pub ty: Option<Type>,
	/// Source field name, or the formula text when `formula` is set. A field
	/// defaults to the column name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
	#[serde(default)]
	pub formula: bool,
	#[serde(default)]
	pub group_by: bool,
	#[serde(default)]
	pub optional: bool,
	#[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
	pub tags: BTreeSet<String>,
	#[serde(default)]
	pub default: Value,
}

impl AdapterColumnConfig {
	/// Column reading the source field of the same name.
	pub fn field(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			ty: None,
			source: None,
			formula: false,
			group_by: false,
			optional: false,
			tags: BTreeSet::new(),
			default: Value::Undefined,
		}
	}

	pub fn formula(name: impl Into<String>, text: impl Into<String>) -> Self {
		Self {
			source: Some(text.into()),
			formula: true,
			..Self::field(name)
		}
	}

	pub fn with_source(mut self, source: impl Into<String>) -> Self {
		self.source = Some(source.into());
		self
	}

	pub fn with_type(mut self, ty: Type) -> Self {
		self.ty = Some(ty);
		self
	}

	pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
		self.tags.insert(tag.into());
		self
	}

	pub fn group_by(mut self) -> Self {
		self.group_by = true;
		self
	}

	pub fn optional(mut self) -> Self {
		self.optional = true;
		self
	}

	/// Source field name or formula text.
	pub fn source_text(&self) -> &str {
		self.source.as_deref().unwrap_or(&self.name)
	}
}

pub const DEFAULT_PROGRESS_INTERVAL: usize = 1024;
pub const DEFAULT_SPATIAL_CACHE_CAPACITY: usize = 8;

/// Tuning of [`crate::BuildSession`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
	/// Rows processed between two cancellation polls.
	pub progress_interval: usize,
	/// Admitted rows from which filtered tables answer `find` through the
	/// backing index.
	pub filter_index_threshold: usize,
	/// Spatial indexes kept per session; zero disables caching.
	pub spatial_cache_capacity: usize,
	/// Copy unions into a plain table before building on top of them.
	pub copy_unions: bool,
}

impl Default for BuilderConfig {
	fn default() -> Self {
		Self {
			progress_interval: DEFAULT_PROGRESS_INTERVAL,
			filter_index_threshold: tabula_decorator::DEFAULT_INDEX_THRESHOLD,
			spatial_cache_capacity: DEFAULT_SPATIAL_CACHE_CAPACITY,
			copy_unions: true,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_from_json() {
		let config = AdapterConfig::from_json(
			r#"{
				"id": "deliveries",
				"tables": [{
					"name": "Stops",
					"from_datastore": "orders",
					"from_table": "orders",
					"filter": "qty > 0",
					"sort": [{"formula": "qty", "ascending": false}, {"formula": "name"}],
					"limit": 10,
					"tags": ["routable"],
					"columns": [
						{"name": "name"},
						{"name": "qty", "type": "int8"},
						{"name": "double", "source": "qty * 2", "formula": true},
						{"name": "lat", "type": "float", "tags": ["latitude"], "optional": true}
					]
				}]
			}"#,
		)
		.unwrap();

		assert_eq!(config.id, "deliveries");
		let table = &config.tables[0];
		assert_eq!(table.from_datastore.as_deref(), Some("orders"));
		assert_eq!(table.sort.len(), 2);
		assert!(!table.sort[0].ascending);
		assert!(table.sort[1].ascending);
		assert_eq!(table.limit, Some(10));
		assert_eq!(table.columns[1].ty, Some(Type::Int8));
		assert!(table.columns[2].formula);
		assert_eq!(table.columns[2].source_text(), "qty * 2");
		assert_eq!(table.columns[0].source_text(), "name");
		assert_eq!(table.columns[3].ty, Some(Type::Float8));
		assert!(table.columns[3].optional);
		assert!(table.data.is_none());
		assert!(!table.is_grouped());
	}

	#[test]
	fn test_embedded_data_and_round_trip() {
		let config = AdapterConfig::new("lookup").with_table(
			AdaptedTableConfig::new("codes")
				.data(EmbeddedData {
					columns: vec!["code".into(), "label".into()],
					rows: vec![vec![Value::Int8(1), Value::utf8("one")], vec![Value::Int8(2), Value::Undefined]],
				})
				.column(AdapterColumnConfig::field("code"))
				.column(AdapterColumnConfig::field("label")),
		);
		let parsed = AdapterConfig::from_json(&config.to_json().unwrap()).unwrap();
		assert_eq!(parsed, config);
	}

	#[test]
	fn test_builder_config_defaults() {
		let config: BuilderConfig = serde_json::from_str(r#"{"progress_interval": 16}"#).unwrap();
		assert_eq!(config.progress_interval, 16);
		assert_eq!(config.filter_index_threshold, 10);
		assert_eq!(config.spatial_cache_capacity, 8);
		assert!(config.copy_unions);
	}

	#[test]
	fn test_malformed_json() {
		assert!(matches!(AdapterConfig::from_json("{\"tables\": []}"), Err(crate::BuildError::Parse(_))));
	}
}
