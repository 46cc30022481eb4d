//! # Analysis Engine Interface
//!
//! The structural-analysis engine is an external collaborator. The rundown
//! only needs a narrow capability set from it: open a floor model, list its
//! layers and supports, query reactions, write loads, set column stiffness,
//! mesh, solve, save and close. [`AnalysisEngine`] and [`ModelSession`]
//! describe exactly that and nothing more.
//!
//! [`table::TableEngine`] is a tabulated reference implementation used by
//! the CLI and the test suite.
//!
//! ## Session lifetime
//!
//! A session is scoped to one floor pass. Wrap it in [`OpenModel`] so it is
//! closed on every exit path:
//!
//! ```rust
//! use rundown_core::engine::{AnalysisEngine, ModelSession, OpenModel};
//! use rundown_core::engine::table::{FloorModel, TableEngine};
//!
//! let engine = TableEngine::in_memory();
//! engine.insert_model("L2.json", FloorModel::new("L2")).unwrap();
//!
//! let model = OpenModel::new(engine.open("L2.json".as_ref()).unwrap());
//! assert!(model.loading_layer_names().unwrap().is_empty());
//! model.close().unwrap();
//! ```

pub mod table;

use std::ops::{Deref, DerefMut};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{RundownError, RundownResult};
use crate::geometry::{wall_line, LineSegment2D, Point2D};

/// Reference to a result layer of a floor model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerRef {
    /// A force-loading layer (can carry applied loads)
    Loading(String),
    /// A load combination layer (factored sum of loading layers)
    Combination(String),
}

impl LayerRef {
    pub fn name(&self) -> &str {
        match self {
            LayerRef::Loading(name) | LayerRef::Combination(name) => name,
        }
    }
}

/// A column element below the floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnElement {
    pub name: String,
    pub location: Point2D,

    /// Width in mm; zero for circular columns
    pub b: f64,

    /// Depth in mm, or diameter for circular columns
    pub d: f64,

    /// Height in m
    pub height: f64,

    /// Concrete strength in MPa
    pub fc: f64,

    /// Stiffness-reduction factor currently assigned
    #[serde(default = "default_i_factor")]
    pub i_factor: f64,
}

fn default_i_factor() -> f64 {
    1.0
}

impl ColumnElement {
    /// Gross cross-section area in mm²
    pub fn gross_area_mm2(&self) -> f64 {
        if self.b == 0.0 {
            std::f64::consts::PI * self.d.powi(2) / 4.0
        } else {
            self.b * self.d
        }
    }

    /// Gross cross-section area in m²
    pub fn gross_area_m2(&self) -> f64 {
        self.gross_area_mm2() * 1e-6
    }
}

/// A wall element group below the floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallGroupElement {
    pub name: String,
    pub centroid: Point2D,

    /// Total length in m
    pub total_length: f64,

    /// Reaction angle in degrees
    pub reaction_angle: f64,

    /// Total cross-section area in mm²
    pub total_area: f64,
}

impl WallGroupElement {
    /// Line of the group used as its location key
    pub fn line(&self) -> LineSegment2D {
        wall_line(self.centroid, self.reaction_angle, self.total_length)
    }
}

/// Reaction reported by the engine in the standard context
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReactionVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rot_x: f64,
    pub rot_y: f64,
}

/// Point load written to a loading layer
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointLoad {
    pub location: Point2D,
    pub elevation: f64,
    pub fx: f64,
    pub fy: f64,
    pub fz: f64,
    pub mx: f64,
    pub my: f64,
}

/// Line load written to a loading layer; values are per metre of line
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LineLoad {
    pub line: LineSegment2D,
    pub elevation: f64,
    pub fx: f64,
    pub fy: f64,
    pub fz: f64,
    pub mx: f64,
    pub my: f64,
}

/// An open floor model
pub trait ModelSession {
    /// Label used in logs and errors
    fn label(&self) -> &str;

    fn loading_layer_names(&self) -> RundownResult<Vec<String>>;

    fn load_combination_names(&self) -> RundownResult<Vec<String>>;

    fn columns_below(&self) -> RundownResult<Vec<ColumnElement>>;

    fn wall_groups_below(&self) -> RundownResult<Vec<WallGroupElement>>;

    fn column_reaction(&self, layer: &LayerRef, column: &ColumnElement) -> RundownResult<ReactionVector>;

    fn wall_group_reaction(&self, layer: &LayerRef, wall: &WallGroupElement) -> RundownResult<ReactionVector>;

    /// Delete every point and line load on a loading layer, returning how many
    fn clear_loads(&mut self, layer: &str) -> RundownResult<usize>;

    fn add_point_load(&mut self, layer: &str, load: PointLoad) -> RundownResult<()>;

    fn add_line_load(&mut self, layer: &str, load: LineLoad) -> RundownResult<()>;

    fn set_column_i_factor(&mut self, column: &ColumnElement, i_factor: f64) -> RundownResult<()>;

    fn generate_mesh(&mut self) -> RundownResult<()>;

    fn solve(&mut self) -> RundownResult<()>;

    fn save(&mut self, path: &Path) -> RundownResult<()>;

    fn close(&mut self) -> RundownResult<()>;
}

/// Opens floor models by path
pub trait AnalysisEngine {
    type Session: ModelSession;

    fn open(&self, path: &Path) -> RundownResult<Self::Session>;

    /// Whether a model can be opened from `path`
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

impl<E: AnalysisEngine> AnalysisEngine for &E {
    type Session = E::Session;

    fn open(&self, path: &Path) -> RundownResult<Self::Session> {
        (**self).open(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }
}

/// Resolve a layer name against the loading layers first, then the load
/// combinations. Names compare after trimming.
pub fn resolve_layer<S: ModelSession + ?Sized>(session: &S, name: &str) -> RundownResult<LayerRef> {
    let wanted = name.trim();
    if let Some(found) = session.loading_layer_names()?.into_iter().find(|n| n.trim() == wanted) {
        return Ok(LayerRef::Loading(found));
    }
    if let Some(found) = session.load_combination_names()?.into_iter().find(|n| n.trim() == wanted) {
        return Ok(LayerRef::Combination(found));
    }
    Err(RundownError::layer_not_found(name))
}

/// Session guard that closes the model when dropped.
///
/// Use [`OpenModel::close`] on the success path to surface close errors;
/// on early return the drop closes the session and logs any failure.
pub struct OpenModel<S: ModelSession> {
    session: S,
    closed: bool,
}

impl<S: ModelSession> OpenModel<S> {
    pub fn new(session: S) -> Self {
        OpenModel { session, closed: false }
    }

    pub fn close(mut self) -> RundownResult<()> {
        self.closed = true;
        self.session.close()
    }
}

impl<S: ModelSession> Deref for OpenModel<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: ModelSession> DerefMut for OpenModel<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: ModelSession> Drop for OpenModel<S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.session.close() {
            warn!(model = %self.session.label(), error = %e, "Failed to close model session");
        }
    }
}
