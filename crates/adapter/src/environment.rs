// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::sync::Arc;

use indexmap::IndexMap;
use tabula_core::DatastoreRef;
use tabula_formula::{Compiler, FunctionLibrary, StandardCompiler};
use tabula_type::standardise;

use crate::AdapterConfig;

/// The datastores and adapter configurations builds resolve names against.
///
/// Names match case-insensitively. A source name is looked up among the
/// datastores first and among the adapters second.
pub struct Environment {
	datastores: IndexMap<String, DatastoreRef>,
	adapters: IndexMap<String, Arc<AdapterConfig>>,
	compiler: Arc<dyn Compiler>,
	library: FunctionLibrary,
}

impl Default for Environment {
	fn default() -> Self {
		Self::new()
	}
}

impl Environment {
	pub fn new() -> Self {
		Self {
			datastores: IndexMap::new(),
			adapters: IndexMap::new(),
			compiler: Arc::new(StandardCompiler),
			library: FunctionLibrary::standard(),
		}
	}

	/// Panics when a datastore of that name is already registered.
	pub fn register_datastore(&mut self, name: &str, store: DatastoreRef) {
		let previous = self.datastores.insert(standardise(name), store);
		assert!(previous.is_none(), "datastore '{}' registered twice", name);
	}

	/// Panics when an adapter with that id is already registered.
	pub fn register_adapter(&mut self, config: AdapterConfig) {
		let id = config.id.clone();
		let previous = self.adapters.insert(standardise(&id), Arc::new(config));
		assert!(previous.is_none(), "adapter '{}' registered twice", id);
	}

	pub fn with_datastore(mut self, name: &str, store: DatastoreRef) -> Self {
		self.register_datastore(name, store);
		self
	}

	pub fn with_adapter(mut self, config: AdapterConfig) -> Self {
		self.register_adapter(config);
		self
	}

	pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
		self.compiler = compiler;
		self
	}

	pub fn with_library(mut self, library: FunctionLibrary) -> Self {
		self.library = library;
		self
	}

	pub fn datastore(&self, name: &str) -> Option<&DatastoreRef> {
		self.datastores.get(&standardise(name))
	}

	pub fn adapter(&self, id: &str) -> Option<&Arc<AdapterConfig>> {
		self.adapters.get(&standardise(id))
	}

	pub fn adapter_ids(&self) -> impl Iterator<Item = &str> {
		self.adapters.values().map(|c| c.id.as_str())
	}

	pub fn compiler(&self) -> &dyn Compiler {
		self.compiler.as_ref()
	}

	pub fn library(&self) -> &FunctionLibrary {
		&self.library
	}
}

#[cfg(test)]
mod tests {
	use tabula_core::MemoryDatastore;

	use super::*;

	#[test]
	fn test_lookup_is_case_insensitive() {
		let env = Environment::new()
			.with_datastore("Orders", MemoryDatastore::new())
			.with_adapter(AdapterConfig::new("Deliveries"));
		assert!(env.datastore(" orders ").is_some());
		assert!(env.adapter("DELIVERIES").is_some());
		assert!(env.adapter("orders").is_none());
		assert_eq!(env.adapter_ids().collect::<Vec<_>>(), vec!["Deliveries"]);
	}

	#[test]
	#[should_panic(expected = "registered twice")]
	fn test_duplicate_adapter_panics() {
		Environment::new().with_adapter(AdapterConfig::new("a")).with_adapter(AdapterConfig::new("A"));
	}
}
