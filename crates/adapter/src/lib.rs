// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

#![cfg_attr(not(debug_assertions), deny(warnings))]

//! Declarative adapters over tabular datastores.
//!
//! An [`AdapterConfig`] names destination tables and says where their rows
//! come from: a registered datastore, another adapter, or literal data, each
//! optionally joined, filtered, sorted, grouped and mapped through formulas.
//! A [`BuildSession`] turns a registered configuration into a virtual
//! datastore without copying source rows, building every adapter it depends
//! on first.
//!
//! ```ignore
//! let env = Environment::new()
//! 	.with_datastore("shop", store)
//! 	.with_adapter(AdapterConfig::from_json(text)?);
//! let mut session = BuildSession::new(&env, BuilderConfig::default());
//! let orders = session.build("orders")?;
//! ```

mod builder;
pub mod config;
mod environment;
mod error;
pub mod optimiser;
mod report;
mod session;
pub mod spatial;

pub use config::{
	AdaptedTableConfig, AdapterColumnConfig, AdapterConfig, BuilderConfig, EmbeddedData, JoinConfig, SortConfig,
};
pub use environment::Environment;
pub use error::BuildError;
pub use optimiser::{FilterFormulaOptimiser, FunctionRecord, OptimisationClasses};
pub use report::{BuildReport, BuildWarning};
pub use session::{BuildSession, BuiltAdapters, CancellationFlag, ProgressMonitor, Uncancellable};
pub use spatial::{PointIndex, SpatialIndexCache};

pub type Result<T> = std::result::Result<T, BuildError>;
