//! Tabulated reference engine
//!
//! Each floor model is a JSON [`FloorModel`]: support elements, loading
//! layers with tabulated reactions, and load combinations as factored sums
//! of loading layers. Loads applied to a loading layer react fully on the
//! support they sit on: a point load on the column at the same location, a
//! line load on the wall group whose line it follows. This is enough to run
//! and test a full rundown without the commercial engine.
//!
//! Reactions may only be queried after [`ModelSession::solve`]; any load
//! edit, stiffness change or re-mesh invalidates the solve.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    AnalysisEngine, ColumnElement, LayerRef, LineLoad, ModelSession, PointLoad, ReactionVector, WallGroupElement,
};
use crate::errors::{RundownError, RundownResult};
use crate::file_io::write_atomic;
use crate::geometry::{LineSegment2D, PlanCoord};

/// One floor model on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorModel {
    pub name: String,

    #[serde(default)]
    pub columns: Vec<ColumnElement>,

    #[serde(default)]
    pub wall_groups: Vec<WallGroupElement>,

    #[serde(default)]
    pub loading_layers: Vec<LoadingLayer>,

    #[serde(default)]
    pub load_combinations: Vec<LoadCombination>,

    /// Whether a mesh exists for the current element stiffnesses
    #[serde(default)]
    pub meshed: bool,
}

impl FloorModel {
    pub fn new(name: impl Into<String>) -> Self {
        FloorModel {
            name: name.into(),
            columns: Vec::new(),
            wall_groups: Vec::new(),
            loading_layers: Vec::new(),
            load_combinations: Vec::new(),
            meshed: false,
        }
    }

    pub fn with_column(mut self, column: ColumnElement) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_wall_group(mut self, wall: WallGroupElement) -> Self {
        self.wall_groups.push(wall);
        self
    }

    pub fn with_loading_layer(mut self, layer: LoadingLayer) -> Self {
        self.loading_layers.push(layer);
        self
    }

    pub fn with_load_combination(mut self, combination: LoadCombination) -> Self {
        self.load_combinations.push(combination);
        self
    }

    pub fn layer(&self, name: &str) -> Option<&LoadingLayer> {
        self.loading_layers.iter().find(|l| l.name == name)
    }

    fn layer_mut(&mut self, name: &str) -> RundownResult<&mut LoadingLayer> {
        self.loading_layers
            .iter_mut()
            .find(|l| l.name == name)
            .ok_or_else(|| RundownError::layer_not_found(name))
    }

    fn combination(&self, name: &str) -> RundownResult<&LoadCombination> {
        self.load_combinations
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| RundownError::layer_not_found(name))
    }
}

/// Force-loading layer: tabulated reactions plus applied loads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingLayer {
    pub name: String,

    /// Reaction per column name from loads the model itself carries
    #[serde(default)]
    pub column_reactions: BTreeMap<String, ReactionVector>,

    /// Reaction per wall group name from loads the model itself carries
    #[serde(default)]
    pub wall_reactions: BTreeMap<String, ReactionVector>,

    #[serde(default)]
    pub point_loads: Vec<PointLoad>,

    #[serde(default)]
    pub line_loads: Vec<LineLoad>,
}

impl LoadingLayer {
    pub fn new(name: impl Into<String>) -> Self {
        LoadingLayer {
            name: name.into(),
            column_reactions: BTreeMap::new(),
            wall_reactions: BTreeMap::new(),
            point_loads: Vec::new(),
            line_loads: Vec::new(),
        }
    }

    /// Tabulate a vertical column reaction (builder pattern)
    pub fn with_column_fz(mut self, column: impl Into<String>, fz: f64) -> Self {
        self.column_reactions.insert(column.into(), ReactionVector { z: fz, ..Default::default() });
        self
    }

    pub fn with_column_reaction(mut self, column: impl Into<String>, reaction: ReactionVector) -> Self {
        self.column_reactions.insert(column.into(), reaction);
        self
    }

    /// Tabulate a vertical wall group reaction (builder pattern)
    pub fn with_wall_fz(mut self, wall: impl Into<String>, fz: f64) -> Self {
        self.wall_reactions.insert(wall.into(), ReactionVector { z: fz, ..Default::default() });
        self
    }

    fn column_reaction(&self, column: &ColumnElement) -> ReactionVector {
        let mut reaction = self.column_reactions.get(&column.name).copied().unwrap_or_default();
        let at = PlanCoord::from(column.location);
        for load in self.point_loads.iter().filter(|l| PlanCoord::from(l.location) == at) {
            reaction.x += load.fx;
            reaction.y += load.fy;
            reaction.z += load.fz;
            reaction.rot_x += load.mx;
            reaction.rot_y += load.my;
        }
        reaction
    }

    fn wall_reaction(&self, wall: &WallGroupElement) -> ReactionVector {
        let mut reaction = self.wall_reactions.get(&wall.name).copied().unwrap_or_default();
        let line = wall.line();
        for load in self.line_loads.iter().filter(|l| same_line(&l.line, &line)) {
            let length = load.line.length();
            reaction.x += load.fx * length;
            reaction.y += load.fy * length;
            reaction.z += load.fz * length;
            reaction.rot_x += load.mx * length;
            reaction.rot_y += load.my * length;
        }
        reaction
    }
}

fn same_line(a: &LineSegment2D, b: &LineSegment2D) -> bool {
    let (a0, a1) = (PlanCoord::from(a.start), PlanCoord::from(a.end));
    let (b0, b1) = (PlanCoord::from(b.start), PlanCoord::from(b.end));
    (a0 == b0 && a1 == b1) || (a0 == b1 && a1 == b0)
}

/// Factored sum of loading layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadCombination {
    pub name: String,

    #[serde(default)]
    pub factors: Vec<CombinationFactor>,
}

impl LoadCombination {
    pub fn new(name: impl Into<String>) -> Self {
        LoadCombination {
            name: name.into(),
            factors: Vec::new(),
        }
    }

    pub fn with_factor(mut self, layer: impl Into<String>, factor: f64) -> Self {
        self.factors.push(CombinationFactor {
            layer: layer.into(),
            factor,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationFactor {
    pub layer: String,
    pub factor: f64,
}

#[derive(Debug, Clone)]
enum Storage {
    Disk,
    Memory(Arc<Mutex<HashMap<PathBuf, FloorModel>>>),
}

/// Engine over tabulated [`FloorModel`]s
#[derive(Debug, Clone)]
pub struct TableEngine {
    storage: Storage,
    open_sessions: Arc<AtomicUsize>,
}

impl TableEngine {
    /// Engine reading and writing floor model JSON files
    pub fn on_disk() -> Self {
        TableEngine {
            storage: Storage::Disk,
            open_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Engine over a shared in-memory map of models keyed by path
    pub fn in_memory() -> Self {
        TableEngine {
            storage: Storage::Memory(Arc::new(Mutex::new(HashMap::new()))),
            open_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Store a model (writes the file for disk storage)
    ///
    /// # Errors
    ///
    /// * `FileError`, `SerializationError` - the model file could not be written
    pub fn insert_model(&self, path: impl AsRef<Path>, model: FloorModel) -> RundownResult<()> {
        let path = path.as_ref();
        match &self.storage {
            Storage::Memory(models) => {
                let mut models = models.lock().unwrap_or_else(|e| e.into_inner());
                models.insert(path.to_path_buf(), model);
                Ok(())
            }
            Storage::Disk => save_model(path, &model),
        }
    }

    /// Current copy of a stored model
    pub fn model(&self, path: impl AsRef<Path>) -> RundownResult<FloorModel> {
        self.load(path.as_ref())
    }

    /// Number of sessions opened and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    fn load(&self, path: &Path) -> RundownResult<FloorModel> {
        match &self.storage {
            Storage::Memory(models) => {
                let models = models.lock().unwrap_or_else(|e| e.into_inner());
                models
                    .get(path)
                    .cloned()
                    .ok_or_else(|| RundownError::engine("open", path.display().to_string(), "model not found"))
            }
            Storage::Disk => {
                let json = fs::read_to_string(path)
                    .map_err(|e| RundownError::engine("open", path.display().to_string(), e.to_string()))?;
                serde_json::from_str(&json).map_err(|e| RundownError::serialization(e.to_string()))
            }
        }
    }
}

fn save_model(path: &Path, model: &FloorModel) -> RundownResult<()> {
    let json = serde_json::to_string_pretty(model).map_err(|e| RundownError::serialization(e.to_string()))?;
    write_atomic(path, json.as_bytes())
}

impl AnalysisEngine for TableEngine {
    type Session = TableSession;

    fn open(&self, path: &Path) -> RundownResult<TableSession> {
        let model = self.load(path)?;
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        debug!(model = %model.name, path = %path.display(), "Opened floor model");
        Ok(TableSession {
            model,
            storage: self.storage.clone(),
            open_sessions: Arc::clone(&self.open_sessions),
            solved: false,
            closed: false,
        })
    }

    fn exists(&self, path: &Path) -> bool {
        match &self.storage {
            Storage::Memory(models) => models.lock().map(|m| m.contains_key(path)).unwrap_or(false),
            Storage::Disk => path.exists(),
        }
    }
}

/// Open [`FloorModel`]; edits stay in the session until saved
#[derive(Debug)]
pub struct TableSession {
    model: FloorModel,
    storage: Storage,
    open_sessions: Arc<AtomicUsize>,
    solved: bool,
    closed: bool,
}

impl TableSession {
    pub fn model(&self) -> &FloorModel {
        &self.model
    }

    fn ensure_open(&self, operation: &str) -> RundownResult<()> {
        if self.closed {
            return Err(RundownError::engine(operation, &self.model.name, "session is closed"));
        }
        Ok(())
    }

    fn ensure_solved(&self, operation: &str) -> RundownResult<()> {
        self.ensure_open(operation)?;
        if !self.solved {
            return Err(RundownError::engine(operation, &self.model.name, "model has not been solved"));
        }
        Ok(())
    }

    fn layer_reaction<F>(&self, layer: &LayerRef, reaction: F) -> RundownResult<ReactionVector>
    where
        F: Fn(&LoadingLayer) -> ReactionVector,
    {
        match layer {
            LayerRef::Loading(name) => self
                .model
                .layer(name)
                .map(&reaction)
                .ok_or_else(|| RundownError::layer_not_found(name.as_str())),
            LayerRef::Combination(name) => {
                let mut total = ReactionVector::default();
                for factor in &self.model.combination(name)?.factors {
                    let part = self
                        .model
                        .layer(&factor.layer)
                        .map(&reaction)
                        .ok_or_else(|| RundownError::layer_not_found(factor.layer.as_str()))?;
                    total.x += part.x * factor.factor;
                    total.y += part.y * factor.factor;
                    total.z += part.z * factor.factor;
                    total.rot_x += part.rot_x * factor.factor;
                    total.rot_y += part.rot_y * factor.factor;
                }
                Ok(total)
            }
        }
    }
}

impl ModelSession for TableSession {
    fn label(&self) -> &str {
        &self.model.name
    }

    fn loading_layer_names(&self) -> RundownResult<Vec<String>> {
        self.ensure_open("list loading layers")?;
        Ok(self.model.loading_layers.iter().map(|l| l.name.clone()).collect())
    }

    fn load_combination_names(&self) -> RundownResult<Vec<String>> {
        self.ensure_open("list load combinations")?;
        Ok(self.model.load_combinations.iter().map(|c| c.name.clone()).collect())
    }

    fn columns_below(&self) -> RundownResult<Vec<ColumnElement>> {
        self.ensure_open("list columns")?;
        Ok(self.model.columns.clone())
    }

    fn wall_groups_below(&self) -> RundownResult<Vec<WallGroupElement>> {
        self.ensure_open("list wall groups")?;
        Ok(self.model.wall_groups.clone())
    }

    fn column_reaction(&self, layer: &LayerRef, column: &ColumnElement) -> RundownResult<ReactionVector> {
        self.ensure_solved("column reaction")?;
        self.layer_reaction(layer, |l| l.column_reaction(column))
    }

    fn wall_group_reaction(&self, layer: &LayerRef, wall: &WallGroupElement) -> RundownResult<ReactionVector> {
        self.ensure_solved("wall group reaction")?;
        self.layer_reaction(layer, |l| l.wall_reaction(wall))
    }

    fn clear_loads(&mut self, layer: &str) -> RundownResult<usize> {
        self.ensure_open("clear loads")?;
        let layer = self.model.layer_mut(layer)?;
        let removed = layer.point_loads.len() + layer.line_loads.len();
        layer.point_loads.clear();
        layer.line_loads.clear();
        self.solved = false;
        Ok(removed)
    }

    fn add_point_load(&mut self, layer: &str, load: PointLoad) -> RundownResult<()> {
        self.ensure_open("add point load")?;
        self.model.layer_mut(layer)?.point_loads.push(load);
        self.solved = false;
        Ok(())
    }

    fn add_line_load(&mut self, layer: &str, load: LineLoad) -> RundownResult<()> {
        self.ensure_open("add line load")?;
        self.model.layer_mut(layer)?.line_loads.push(load);
        self.solved = false;
        Ok(())
    }

    fn set_column_i_factor(&mut self, column: &ColumnElement, i_factor: f64) -> RundownResult<()> {
        self.ensure_open("set column stiffness")?;
        let label = self.model.name.clone();
        let target = self
            .model
            .columns
            .iter_mut()
            .find(|c| c.name == column.name && PlanCoord::from(c.location) == PlanCoord::from(column.location))
            .ok_or_else(|| RundownError::engine("set column stiffness", label, format!("no column {}", column.name)))?;
        target.i_factor = i_factor;
        self.model.meshed = false;
        self.solved = false;
        Ok(())
    }

    fn generate_mesh(&mut self) -> RundownResult<()> {
        self.ensure_open("generate mesh")?;
        self.model.meshed = true;
        self.solved = false;
        Ok(())
    }

    fn solve(&mut self) -> RundownResult<()> {
        self.ensure_open("solve")?;
        if !self.model.meshed {
            return Err(RundownError::engine("solve", &self.model.name, "model has no mesh"));
        }
        self.solved = true;
        Ok(())
    }

    fn save(&mut self, path: &Path) -> RundownResult<()> {
        self.ensure_open("save")?;
        match &self.storage {
            Storage::Memory(models) => {
                let mut models = models.lock().unwrap_or_else(|e| e.into_inner());
                models.insert(path.to_path_buf(), self.model.clone());
                Ok(())
            }
            Storage::Disk => save_model(path, &self.model),
        }
    }

    fn close(&mut self) -> RundownResult<()> {
        if !self.closed {
            self.closed = true;
            self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2D;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn column(name: &str, x: f64, y: f64) -> ColumnElement {
        ColumnElement {
            name: name.into(),
            location: Point2D::new(x, y),
            b: 400.0,
            d: 400.0,
            height: 3.0,
            fc: 40.0,
            i_factor: 1.0,
        }
    }

    fn sample_model() -> FloorModel {
        FloorModel::new("L3")
            .with_column(column("C1", 0.0, 0.0))
            .with_wall_group(WallGroupElement {
                name: "W1".into(),
                centroid: Point2D::new(5.0, 0.0),
                total_length: 4.0,
                reaction_angle: 0.0,
                total_area: 800_000.0,
            })
            .with_loading_layer(LoadingLayer::new("Self Dead").with_column_fz("C1", 100.0).with_wall_fz("W1", 60.0))
            .with_loading_layer(LoadingLayer::new("Transfer - Dead"))
            .with_load_combination(
                LoadCombination::new("All Dead LC")
                    .with_factor("Self Dead", 1.0)
                    .with_factor("Transfer - Dead", 1.0),
            )
    }

    fn open_solved(engine: &TableEngine) -> TableSession {
        let mut session = engine.open(Path::new("L3.json")).unwrap();
        session.generate_mesh().unwrap();
        session.solve().unwrap();
        session
    }

    #[test]
    fn test_query_before_solve_fails() {
        let engine = TableEngine::in_memory();
        engine.insert_model("L3.json", sample_model()).unwrap();
        let session = engine.open(Path::new("L3.json")).unwrap();
        let column = column("C1", 0.0, 0.0);
        let err = session.column_reaction(&LayerRef::Loading("Self Dead".into()), &column).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_applied_point_load_reacts_on_column() {
        let engine = TableEngine::in_memory();
        engine.insert_model("L3.json", sample_model()).unwrap();
        let mut session = engine.open(Path::new("L3.json")).unwrap();
        session
            .add_point_load(
                "Transfer - Dead",
                PointLoad {
                    location: Point2D::new(0.0, 0.0),
                    fz: 25.0,
                    ..Default::default()
                },
            )
            .unwrap();
        session.generate_mesh().unwrap();
        session.solve().unwrap();

        let c1 = column("C1", 0.0, 0.0);
        let combo = session.column_reaction(&LayerRef::Combination("All Dead LC".into()), &c1).unwrap();
        assert_relative_eq!(combo.z, 125.0);
    }

    #[test]
    fn test_line_load_reacts_on_matching_wall() {
        let engine = TableEngine::in_memory();
        engine.insert_model("L3.json", sample_model()).unwrap();
        let mut session = open_solved(&engine);
        let wall = session.wall_groups_below().unwrap().remove(0);
        session
            .add_line_load(
                "Transfer - Dead",
                LineLoad {
                    line: wall.line(),
                    fz: 10.0,
                    ..Default::default()
                },
            )
            .unwrap();
        session.solve().unwrap();

        let reaction = session.wall_group_reaction(&LayerRef::Combination("All Dead LC".into()), &wall).unwrap();
        assert_relative_eq!(reaction.z, 100.0);
    }

    #[test]
    fn test_clear_loads_counts_and_invalidates() {
        let engine = TableEngine::in_memory();
        engine.insert_model("L3.json", sample_model()).unwrap();
        let mut session = open_solved(&engine);
        session.add_point_load("Transfer - Dead", PointLoad::default()).unwrap();
        session.add_point_load("Transfer - Dead", PointLoad::default()).unwrap();
        assert_eq!(session.clear_loads("Transfer - Dead").unwrap(), 2);
        assert_eq!(session.clear_loads("Transfer - Dead").unwrap(), 0);
        let c1 = column("C1", 0.0, 0.0);
        assert!(session.column_reaction(&LayerRef::Loading("Self Dead".into()), &c1).is_err());
    }

    #[test]
    fn test_stiffness_change_requires_remesh() {
        let engine = TableEngine::in_memory();
        engine.insert_model("L3.json", sample_model()).unwrap();
        let mut session = open_solved(&engine);
        session.set_column_i_factor(&column("C1", 0.0, 0.0), 0.55).unwrap();
        assert!(session.solve().is_err());
        session.generate_mesh().unwrap();
        session.solve().unwrap();
        assert_eq!(session.model().columns[0].i_factor, 0.55);
    }

    #[test]
    fn test_edits_only_persist_on_save() {
        let engine = TableEngine::in_memory();
        engine.insert_model("L3.json", sample_model()).unwrap();
        let mut session = open_solved(&engine);
        session.add_point_load("Transfer - Dead", PointLoad::default()).unwrap();
        session.close().unwrap();
        assert!(engine.model("L3.json").unwrap().layer("Transfer - Dead").unwrap().point_loads.is_empty());

        let mut session = open_solved(&engine);
        session.add_point_load("Transfer - Dead", PointLoad::default()).unwrap();
        session.save(Path::new("L3.json")).unwrap();
        session.close().unwrap();
        assert_eq!(engine.model("L3.json").unwrap().layer("Transfer - Dead").unwrap().point_loads.len(), 1);
    }

    #[test]
    fn test_disk_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("L3.json");
        let engine = TableEngine::on_disk();
        engine.insert_model(&path, sample_model()).unwrap();

        let mut session = engine.open(&path).unwrap();
        session.generate_mesh().unwrap();
        session.save(&path).unwrap();
        session.close().unwrap();

        let reloaded = engine.model(&path).unwrap();
        assert!(reloaded.meshed);
        assert_eq!(reloaded.columns.len(), 1);
        assert_eq!(engine.open_sessions(), 0);
    }

    #[test]
    fn test_disk_insert_reports_write_failure() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("floors");
        fs::write(&blocker, b"not a directory").unwrap();

        let engine = TableEngine::on_disk();
        let err = engine.insert_model(blocker.join("L3.json"), sample_model()).unwrap_err();
        assert_eq!(err.error_code(), "FILE_ERROR");
        assert!(!engine.exists(&blocker.join("L3.json")));
    }
}
