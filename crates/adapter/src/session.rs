// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{
	collections::HashMap,
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
};

use tabula_decorator::AdaptedDecorator;
use tabula_type::standardise;
use tracing::instrument;

use crate::{
	BuildError, BuildReport, BuilderConfig, Environment, builder::AdapterBuilder, spatial::SpatialIndexCache,
};

/// Polled by long-running build passes; returning `true` aborts the build
/// with [`BuildError::Cancelled`].
pub trait ProgressMonitor: Send + Sync {
	fn is_cancelled(&self) -> bool;
}

/// Never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct Uncancellable;

impl ProgressMonitor for Uncancellable {
	fn is_cancelled(&self) -> bool {
		false
	}
}

/// Cancels once [`CancellationFlag::cancel`] was called.
#[derive(Debug, Default)]
pub struct CancellationFlag(AtomicBool);

impl CancellationFlag {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::Release);
	}
}

impl ProgressMonitor for CancellationFlag {
	fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::Acquire)
	}
}

/// Adapters built successfully within one session, by id.
#[derive(Default)]
pub struct BuiltAdapters {
	adapters: HashMap<String, Arc<AdaptedDecorator>>,
}

impl BuiltAdapters {
	pub fn get(&self, id: &str) -> Option<&Arc<AdaptedDecorator>> {
		self.adapters.get(&standardise(id))
	}

	pub fn contains(&self, id: &str) -> bool {
		self.adapters.contains_key(&standardise(id))
	}

	pub fn len(&self) -> usize {
		self.adapters.len()
	}

	pub fn is_empty(&self) -> bool {
		self.adapters.is_empty()
	}

	pub(crate) fn insert(&mut self, id: &str, adapter: Arc<AdaptedDecorator>) {
		self.adapters.insert(standardise(id), adapter);
	}
}

/// State shared by every adapter built in one run.
///
/// Each adapter id is built at most once per session; later requests get
/// the same virtual datastore. Failed builds are not remembered.
pub struct BuildSession<'e> {
	environment: &'e Environment,
	config: BuilderConfig,
	monitor: Arc<dyn ProgressMonitor>,
	built: BuiltAdapters,
	spatial: SpatialIndexCache,
	report: BuildReport,
}

impl<'e> BuildSession<'e> {
	pub fn new(environment: &'e Environment, config: BuilderConfig) -> Self {
		Self::with_monitor(environment, config, Arc::new(Uncancellable))
	}

	pub fn with_monitor(environment: &'e Environment, config: BuilderConfig, monitor: Arc<dyn ProgressMonitor>) -> Self {
		let spatial = SpatialIndexCache::new(config.spatial_cache_capacity);
		Self {
			environment,
			config,
			monitor,
			built: BuiltAdapters::default(),
			spatial,
			report: BuildReport::default(),
		}
	}

	/// Builds the adapter registered as `id`, or returns the one this session
	/// built before.
	#[instrument(name = "adapter::build", level = "debug", skip(self))]
	pub fn build(&mut self, id: &str) -> crate::Result<Arc<AdaptedDecorator>> {
		self.build_with_callers(id, &[])
	}

	/// `callers` holds the ids of the adapters whose builds requested this
	/// one, outermost first.
	pub(crate) fn build_with_callers(&mut self, id: &str, callers: &[String]) -> crate::Result<Arc<AdaptedDecorator>> {
		let key = standardise(id);
		if callers.iter().any(|c| standardise(c) == key) {
			let mut chain = callers.to_vec();
			chain.push(id.to_string());
			return Err(BuildError::CyclicDependency {
				adapter: id.to_string(),
				chain,
			});
		}
		if let Some(adapter) = self.built.get(id) {
			return Ok(adapter.clone());
		}

		let environment = self.environment;
		let config = environment.adapter(id).ok_or_else(|| BuildError::UnknownAdapter {
			adapter: id.to_string(),
		})?;

		let mut callers = callers.to_vec();
		callers.push(config.id.clone());
		let adapter = AdapterBuilder::new(self, config.as_ref().clone(), callers).build()?;
		self.built.insert(id, adapter.clone());
		Ok(adapter)
	}

	pub fn environment(&self) -> &'e Environment {
		self.environment
	}

	pub fn config(&self) -> &BuilderConfig {
		&self.config
	}

	pub fn built(&self) -> &BuiltAdapters {
		&self.built
	}

	pub fn report(&self) -> &BuildReport {
		&self.report
	}

	pub(crate) fn report_mut(&mut self) -> &mut BuildReport {
		&mut self.report
	}

	pub fn spatial_cache(&self) -> &SpatialIndexCache {
		&self.spatial
	}

	/// Fails with [`BuildError::Cancelled`] when `processed` reached a poll
	/// point and the monitor asks to stop.
	pub(crate) fn poll(&self, processed: usize) -> crate::Result<()> {
		if processed % self.config.progress_interval.max(1) == 0 && self.monitor.is_cancelled() {
			return Err(BuildError::Cancelled);
		}
		Ok(())
	}
}
