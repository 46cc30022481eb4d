//! # rundown_core - Multi-storey Load Rundown Engine
//!
//! `rundown_core` accumulates gravity load down a building, floor by floor.
//! Each floor model is solved, its column and wall reactions are extracted
//! and combined into composite series, and those series are written as
//! transfer loads onto the floor below before it is solved in turn. Along
//! the way it can re-estimate column stiffness from factored axial load and
//! compute load centroids for seismic distribution.
//!
//! ## Design Philosophy
//!
//! - **Explicit state**: per-floor results live in a [`controller::FloorRunState`];
//!   only the composites of the last floor cross floor boundaries
//! - **Pure algebra**: reaction-set combination returns new sets, never mutates
//! - **Engine-agnostic**: the analysis engine sits behind [`engine::AnalysisEngine`]
//! - **JSON-First**: settings, models and reports implement Serialize/Deserialize
//! - **Rich Errors**: structured error types, not just strings
//!
//! ## Quick Start
//!
//! ```rust
//! use rundown_core::engine::table::{FloorModel, LoadCombination, LoadingLayer, TableEngine};
//! use rundown_core::engine::ColumnElement;
//! use rundown_core::geometry::Point2D;
//! use rundown_core::settings::{FloorEntry, LayerNames, RundownSettings};
//! use rundown_core::RundownController;
//!
//! let floor = |name: &str| {
//!     FloorModel::new(name)
//!         .with_column(ColumnElement {
//!             name: "C1".into(),
//!             location: Point2D::new(0.0, 0.0),
//!             b: 400.0,
//!             d: 400.0,
//!             height: 3.0,
//!             fc: 40.0,
//!             i_factor: 1.0,
//!         })
//!         .with_loading_layer(LoadingLayer::new("Dead").with_column_fz("C1", 100.0))
//!         .with_loading_layer(LoadingLayer::new("Transfer - Dead"))
//!         .with_loading_layer(LoadingLayer::new("Transfer - LL reducible"))
//!         .with_loading_layer(LoadingLayer::new("Live").with_column_fz("C1", 50.0))
//!         .with_load_combination(
//!             LoadCombination::new("All Dead LC")
//!                 .with_factor("Dead", 1.0)
//!                 .with_factor("Transfer - Dead", 1.0),
//!         )
//! };
//!
//! let engine = TableEngine::in_memory();
//! engine.insert_model("roof.json", floor("Roof")).unwrap();
//! engine.insert_model("l1.json", floor("L1")).unwrap();
//!
//! let mut settings = RundownSettings::default();
//! settings.floors = vec![FloorEntry::new("Roof", "roof.json"), FloorEntry::new("L1", "l1.json")];
//! settings.layers = LayerNames {
//!     transfer_ll_unreducible: String::new(),
//!     all_live_lc: String::new(),
//!     live_reducible_plans: vec!["Live".into()],
//!     live_unreducible_plans: Vec::new(),
//!     ..LayerNames::default()
//! };
//!
//! let report = RundownController::new(&engine, settings).run().unwrap();
//! assert_eq!(report.passes_completed, 2);
//! ```
//!
//! ## Modules
//!
//! - [`geometry`] - Plan points, wall lines and exact location keys
//! - [`reactions`] - Reaction sets, combination algebra, rounding, composite series
//! - [`engine`] - Analysis engine interface and the tabulated reference engine
//! - [`extract`] - Reaction extraction with self-weight
//! - [`transfer`] - Writing reactions as transfer loads
//! - [`stiffness`] - Column stiffness re-estimate
//! - [`centroid`] - Load centroids and seismic combinations
//! - [`sequence`] - Floor run order and progress cursor
//! - [`controller`] - The per-floor state machine and retry loop
//! - [`export`] - Centroid CSV export
//! - [`settings`] - Run configuration
//! - [`errors`] - Structured error types
//! - [`file_io`] - Atomic writes, run lock, settings files, backups

pub mod centroid;
pub mod controller;
pub mod engine;
pub mod errors;
pub mod export;
pub mod extract;
pub mod file_io;
pub mod geometry;
pub mod reactions;
pub mod sequence;
pub mod settings;
pub mod stiffness;
pub mod transfer;

// Re-export commonly used types at crate root for convenience
pub use controller::{RundownController, RunReport};
pub use errors::{RundownError, RundownResult};
pub use file_io::{load_settings, save_settings, RunLock};
pub use settings::{FloorEntry, RundownSettings};
