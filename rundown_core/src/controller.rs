//! # Rundown Controller
//!
//! Drives one run: floor passes top to bottom, one open model at a time.
//! Each pass walks a fixed sequence of states:
//!
//! ```text
//! VALIDATE -> BACKUP? -> CLEAR + APPLY_TRANSFER (not first pass)
//!   -> MESH? -> SOLVE -> EXTRACT columns
//!   -> [STIFFNESS -> RE-MESH -> RE-SOLVE -> RE-EXTRACT columns]?
//!   -> EXTRACT walls -> CENTROID? -> SAVE -> CLOSE
//! ```
//!
//! The only state crossing floor boundaries is [`CarriedLoads`]: the
//! composite series of the last completed pass, which become the transfer
//! loads of the next one. A floor's model file is only written at SAVE, so
//! a failure mid-pass leaves it as it was.
//!
//! Transient engine errors restart the run from the progress cursor after a
//! fixed backoff, up to a run-wide attempt budget. Everything else is fatal.
//!
//! ## Example
//!
//! ```rust
//! use rundown_core::controller::RundownController;
//! use rundown_core::engine::table::TableEngine;
//! use rundown_core::settings::RundownSettings;
//!
//! // No floors configured: the run fails before any model is opened
//! let controller = RundownController::new(TableEngine::in_memory(), RundownSettings::default());
//! let err = controller.run().unwrap_err();
//! assert_eq!(err.error_code(), "EMPTY_FLOOR_LIST");
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::centroid::{floor_centroids, FloorCentroids};
use crate::engine::{resolve_layer, AnalysisEngine, LayerRef, ModelSession, OpenModel};
use crate::errors::{RundownError, RundownResult};
use crate::export::write_centroid_export;
use crate::extract::extract;
use crate::file_io::{prepare_backup, RunLock};
use crate::reactions::{derive_composites, ReactionSet, SeriesName, SupportType};
use crate::sequence::{FloorPass, RunSequence};
use crate::settings::{LayerNames, RundownSettings};
use crate::stiffness::{ultimate_column_reactions, update_column_stiffness, StiffnessUpdate};
use crate::transfer::{apply_transfer, FZ_ONLY};

/// Everything extracted and derived during one floor pass
#[derive(Debug, Clone, PartialEq)]
pub struct FloorRunState {
    pass: FloorPass,
    series: BTreeMap<(SupportType, SeriesName), ReactionSet>,
    unmatched: BTreeMap<SupportType, usize>,
    pub stiffness: Vec<StiffnessUpdate>,
    pub centroids: Option<FloorCentroids>,
}

impl FloorRunState {
    pub fn new(pass: FloorPass) -> Self {
        FloorRunState {
            pass,
            series: BTreeMap::new(),
            unmatched: BTreeMap::new(),
            stiffness: Vec::new(),
            centroids: None,
        }
    }

    pub fn pass(&self) -> &FloorPass {
        &self.pass
    }

    pub fn label(&self) -> &str {
        &self.pass.label
    }

    /// Store a series, replacing any earlier extraction of it
    pub fn insert(&mut self, support_type: SupportType, name: SeriesName, set: ReactionSet) {
        self.series.insert((support_type, name), set);
    }

    pub fn get(&self, support_type: SupportType, name: &SeriesName) -> Option<&ReactionSet> {
        self.series.get(&(support_type, name.clone()))
    }

    /// Like [`FloorRunState::get`], failing with `LayerNotFound` when the
    /// series was never extracted or derived
    pub fn require(&self, support_type: SupportType, name: &SeriesName) -> RundownResult<&ReactionSet> {
        self.get(support_type, name)
            .ok_or_else(|| RundownError::layer_not_found(format!("{} {}", name.key(), support_type)))
    }

    /// Unmatched keys of the latest derivation, over both support types
    pub fn unmatched(&self) -> usize {
        self.unmatched.values().sum()
    }

    fn set_unmatched(&mut self, support_type: SupportType, count: usize) {
        self.unmatched.insert(support_type, count);
    }
}

/// Composite series of the last completed pass, applied as transfer loads
/// on the next one
#[derive(Debug, Clone, PartialEq)]
pub struct CarriedLoads {
    pub from: String,
    sets: BTreeMap<(SupportType, SeriesName), ReactionSet>,
}

impl CarriedLoads {
    const SERIES: [SeriesName; 4] = [
        SeriesName::AllDead,
        SeriesName::AllLiveReducible,
        SeriesName::AllLiveUnreducible,
        SeriesName::AllLive,
    ];

    pub fn from_state(state: &FloorRunState) -> Self {
        let mut sets = BTreeMap::new();
        for support_type in SupportType::ALL {
            for name in Self::SERIES {
                if let Some(set) = state.get(support_type, &name) {
                    sets.insert((support_type, name), set.clone());
                }
            }
        }
        CarriedLoads {
            from: state.label().to_string(),
            sets,
        }
    }

    /// Column and wall sets of a carried series
    pub fn pair(&self, name: &SeriesName) -> RundownResult<(&ReactionSet, &ReactionSet)> {
        let get = |support_type: SupportType| {
            self.sets
                .get(&(support_type, name.clone()))
                .ok_or_else(|| RundownError::layer_not_found(format!("{} {} from {}", name.key(), support_type, self.from)))
        };
        Ok((get(SupportType::Columns)?, get(SupportType::Walls)?))
    }
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub passes_completed: usize,
    pub passes_total: usize,

    /// Attempts used, including the first
    pub attempts: u32,

    /// Supports dropped while combining series, over the whole run
    pub unmatched_keys: usize,

    pub stiffness_updates: usize,
    pub centroids: Vec<FloorCentroids>,
    pub export_path: Option<PathBuf>,

    /// Stopped at a floor boundary by the cancel flag
    pub cancelled: bool,
}

/// Model layers bound for one pass
#[derive(Debug, Clone)]
struct BoundLayers {
    series: Vec<(SeriesName, LayerRef)>,
}

impl BoundLayers {
    fn layer(&self, name: &SeriesName) -> RundownResult<&LayerRef> {
        self.series
            .iter()
            .find(|(series, _)| series == name)
            .map(|(_, layer)| layer)
            .ok_or_else(|| RundownError::layer_not_found(name.key()))
    }
}

#[derive(Debug, Default)]
struct RunProgress {
    carried: Option<CarriedLoads>,
    centroids: Vec<FloorCentroids>,
    unmatched: usize,
    stiffness_updates: usize,
    cancelled: bool,
}

/// Runs the rundown over an [`AnalysisEngine`]
pub struct RundownController<E: AnalysisEngine> {
    engine: E,
    settings: RundownSettings,
    cancel: Arc<AtomicBool>,
    export_dir: Option<PathBuf>,
    lock: Option<RunLock>,
}

impl<E: AnalysisEngine> RundownController<E> {
    /// Controller exporting centroids to `<root>/exports` when the settings
    /// carry a root directory
    pub fn new(engine: E, settings: RundownSettings) -> Self {
        let export_dir = if settings.root().as_os_str().is_empty() {
            None
        } else {
            Some(settings.root().join("exports"))
        };
        RundownController {
            engine,
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
            export_dir,
            lock: None,
        }
    }

    /// Set the centroid export directory (builder pattern)
    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = Some(dir.into());
        self
    }

    /// Share a cancel flag with another thread (builder pattern)
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Hold a project run lock for the controller's lifetime and record each
    /// floor pass in it (builder pattern)
    pub fn with_run_lock(mut self, lock: RunLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Flag that stops the run at the next floor boundary when set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn settings(&self) -> &RundownSettings {
        &self.settings
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run every pass of the configured sequence.
    ///
    /// # Errors
    ///
    /// * `NothingToDo`, `InvalidSetting` - settings fail validation
    /// * `EmptyFloorList`, `InvalidRange`, `MissingFiles` - bad floor list
    /// * `MissingTemplateNames`, `LayerNotFound` - a model lacks a configured name
    /// * `RetriesExhausted` - engine errors outlasted the attempt budget
    pub fn run(&self) -> RundownResult<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("rundown", %run_id);
        let _entered = span.enter();

        let result = self.run_inner(run_id);
        if let Err(e) = &result {
            error!(code = e.error_code(), error = %e, "Rundown failed");
        }
        result
    }

    fn run_inner(&self, run_id: Uuid) -> RundownResult<RunReport> {
        self.settings.validate()?;
        let mut sequence = RunSequence::build(&self.settings)?;
        sequence.check_files_by(|path| self.engine.exists(path))?;
        info!(passes = sequence.len(), "Starting load rundown");

        let max_attempts = self.settings.retry.max_attempts.max(1);
        let mut attempts = 1;
        let mut progress = RunProgress::default();

        loop {
            match self.run_passes(&mut sequence, &mut progress) {
                Ok(()) => break,
                Err(e) if e.is_recoverable() => {
                    if attempts >= max_attempts {
                        return Err(RundownError::RetriesExhausted {
                            attempts,
                            last_error: e.to_string(),
                        });
                    }
                    warn!(
                        attempt = attempts,
                        max_attempts,
                        error = %e,
                        "Engine error, restarting from pass {} of {}",
                        sequence.progress() + 1,
                        sequence.len()
                    );
                    attempts += 1;
                    if !self.wait_before_retry() {
                        progress.cancelled = true;
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let export_path = match (&self.export_dir, self.settings.tasks.centroids) {
            (Some(dir), true) if !progress.centroids.is_empty() => Some(write_centroid_export(
                dir,
                &progress.centroids,
                self.settings.drawing_scale,
                &Local::now(),
            )?),
            _ => None,
        };

        if progress.cancelled {
            warn!(completed = sequence.progress(), total = sequence.len(), "Rundown cancelled");
        } else {
            info!(passes = sequence.len(), attempts, "Rundown completed");
        }

        Ok(RunReport {
            run_id,
            passes_completed: sequence.progress(),
            passes_total: sequence.len(),
            attempts,
            unmatched_keys: progress.unmatched,
            stiffness_updates: progress.stiffness_updates,
            centroids: progress.centroids,
            export_path,
            cancelled: progress.cancelled,
        })
    }

    /// Log a countdown over the backoff window. False when cancelled while
    /// waiting.
    fn wait_before_retry(&self) -> bool {
        let policy = self.settings.retry;
        let mut remaining = policy.backoff_secs;
        let step = if policy.countdown_step_secs == 0 {
            remaining
        } else {
            policy.countdown_step_secs
        };

        while remaining > 0 {
            if self.is_cancelled() {
                return false;
            }
            info!("Restarting in {} seconds", remaining);
            let wait = step.min(remaining);
            thread::sleep(Duration::from_secs(wait));
            remaining -= wait;
        }
        !self.is_cancelled()
    }

    fn run_passes(&self, sequence: &mut RunSequence, progress: &mut RunProgress) -> RundownResult<()> {
        while let Some(pass) = sequence.next_pass().cloned() {
            if self.is_cancelled() {
                warn!(floor = %pass.label, "Cancel requested, stopping before floor");
                progress.cancelled = true;
                return Ok(());
            }
            if let Some(lock) = &self.lock {
                if let Err(e) = lock.record_pass(&pass.label, &pass.path, pass.position, sequence.len()) {
                    warn!(error = %e, "Could not record progress in run lock");
                }
            }

            let state = self.process_pass(&pass, progress.carried.as_ref())?;

            progress.unmatched += state.unmatched();
            progress.stiffness_updates += state.stiffness.len();
            if let Some(centroids) = &state.centroids {
                progress.centroids.push(centroids.clone());
            }
            progress.carried = Some(CarriedLoads::from_state(&state));
            sequence.advance();
        }
        Ok(())
    }

    /// One floor pass, from opening the model to closing it
    pub fn process_pass(&self, pass: &FloorPass, carried: Option<&CarriedLoads>) -> RundownResult<FloorRunState> {
        let span = info_span!("floor", floor = %pass.label);
        let _entered = span.enter();
        let tasks = &self.settings.tasks;
        let layers = &self.settings.layers;

        info!(path = %pass.path.display(), "Opening floor model");
        let mut model = OpenModel::new(self.engine.open(&pass.path)?);

        info!("Validating loading layers and load combinations");
        validate_template(&*model, layers, &pass.label)?;
        let bound = bind_layers(&*model, layers)?;

        if tasks.create_backups {
            let backup = prepare_backup(&pass.path, &Local::now())?;
            model.save(&backup)?;
        }

        match carried {
            Some(carried) if tasks.load_rundown => {
                info!(from = %carried.from, "Replacing transfer loads");
                for (target, source) in transfer_targets(layers) {
                    let layer = bound.layer(&target)?.name().to_string();
                    let (columns, walls) = carried.pair(&source)?;
                    apply_transfer(&mut *model, &layer, &[columns, walls], &FZ_ONLY)?;
                }
            }
            _ => info!("No transfer loads to apply"),
        }

        if tasks.generate_mesh {
            info!("Generating mesh");
            model.generate_mesh()?;
        }
        info!("Solving model");
        model.solve()?;

        let mut state = FloorRunState::new(pass.clone());
        info!("Extracting column reactions");
        self.extract_support(&*model, &bound, SupportType::Columns, &mut state)?;

        if tasks.column_stiffness {
            let ultimate = ultimate_column_reactions(
                state.require(SupportType::Columns, &SeriesName::AllDead)?,
                state.require(SupportType::Columns, &SeriesName::AllLive)?,
            )?;
            state.stiffness = update_column_stiffness(&mut *model, &ultimate, self.settings.column_stiffness.into())?;

            info!("Regenerating mesh for updated column stiffness");
            model.generate_mesh()?;
            model.solve()?;
            info!("Extracting revised column reactions");
            self.extract_support(&*model, &bound, SupportType::Columns, &mut state)?;
        }

        info!("Extracting wall reactions");
        self.extract_support(&*model, &bound, SupportType::Walls, &mut state)?;

        if tasks.centroids {
            let centroids = floor_centroids(&state, layers.has_unreducible(), &self.settings.seismic)?;
            centroids.log();
            state.centroids = Some(centroids);
        }

        info!("Saving floor model");
        model.save(&pass.path)?;
        info!("Closing floor model");
        model.close()?;

        Ok(state)
    }

    /// Extract every raw series of one support type and derive its composites
    fn extract_support<S: ModelSession + ?Sized>(
        &self,
        session: &S,
        bound: &BoundLayers,
        support_type: SupportType,
        state: &mut FloorRunState,
    ) -> RundownResult<()> {
        let layers = &self.settings.layers;
        let mut raw = BTreeMap::new();
        for (name, layer) in &bound.series {
            let density = if *name == SeriesName::AllDead {
                self.settings.concrete_density
            } else {
                0.0
            };
            raw.insert(name.clone(), extract(session, layer, support_type, density)?);
        }

        let derived = derive_composites(&raw, &layers.live_reducible_plans, layers.unreducible_plans())?;
        state.set_unmatched(support_type, derived.unmatched);
        for (name, set) in raw.into_iter().chain(derived.sets) {
            state.insert(support_type, name, set);
        }
        Ok(())
    }
}

/// `(transfer layer series, carried series)` pairs written on every pass
/// after the first
pub fn transfer_targets(layers: &LayerNames) -> Vec<(SeriesName, SeriesName)> {
    if layers.has_unreducible() {
        vec![
            (SeriesName::TransferDead, SeriesName::AllDead),
            (SeriesName::TransferLlReducible, SeriesName::AllLiveReducible),
            (SeriesName::TransferLlUnreducible, SeriesName::AllLiveUnreducible),
        ]
    } else {
        vec![
            (SeriesName::TransferDead, SeriesName::AllDead),
            (SeriesName::TransferLlReducible, SeriesName::AllLive),
        ]
    }
}

/// Check that every configured loading layer and load combination exists in
/// the model, comparing trimmed names.
///
/// # Errors
///
/// * `MissingTemplateNames` - lists every missing name of the first kind
///   found lacking
pub fn validate_template<S: ModelSession + ?Sized>(session: &S, layers: &LayerNames, floor: &str) -> RundownResult<()> {
    let checks = [
        ("loading layer", layers.required_loading_layers(), session.loading_layer_names()?),
        ("load combination", layers.required_load_combinations(), session.load_combination_names()?),
    ];

    for (kind, required, available) in checks {
        let missing: Vec<String> = required
            .iter()
            .filter(|name| !available.iter().any(|a| a.trim() == name.trim()))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(RundownError::MissingTemplateNames {
                floor: floor.to_string(),
                kind: kind.to_string(),
                names: missing,
            });
        }
    }
    Ok(())
}

/// Resolve every configured name to a model layer
fn bind_layers<S: ModelSession + ?Sized>(session: &S, layers: &LayerNames) -> RundownResult<BoundLayers> {
    let mut names: Vec<(SeriesName, &str)> = vec![
        (SeriesName::TransferDead, &layers.transfer_dead),
        (SeriesName::TransferLlReducible, &layers.transfer_ll_reducible),
    ];
    if layers.has_unreducible() {
        names.push((SeriesName::TransferLlUnreducible, &layers.transfer_ll_unreducible));
    }
    names.push((SeriesName::AllDead, &layers.all_dead_lc));
    if !layers.all_live_lc.trim().is_empty() {
        names.push((SeriesName::AllLiveLc, &layers.all_live_lc));
    }
    for plan in layers.live_reducible_plans.iter().chain(layers.unreducible_plans()) {
        names.push((SeriesName::LivePlan(plan.clone()), plan));
    }

    let mut series = Vec::with_capacity(names.len());
    for (name, layer) in names {
        series.push((name, resolve_layer(session, layer)?));
    }
    Ok(BoundLayers { series })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::table::{FloorModel, LoadCombination, LoadingLayer, TableEngine};
    use crate::engine::ColumnElement;
    use crate::geometry::Point2D;
    use crate::settings::FloorEntry;
    use approx::assert_relative_eq;
    use std::path::Path;

    fn layers() -> LayerNames {
        LayerNames {
            transfer_dead: "Transfer - Dead".into(),
            transfer_ll_reducible: "Transfer - LL reducible".into(),
            transfer_ll_unreducible: String::new(),
            all_dead_lc: "All Dead LC".into(),
            all_live_lc: String::new(),
            live_reducible_plans: vec!["Live (Reducible) Loading".into()],
            live_unreducible_plans: Vec::new(),
        }
    }

    fn model(name: &str, dead: f64, live: f64) -> FloorModel {
        FloorModel::new(name)
            .with_column(ColumnElement {
                name: "C1".into(),
                location: Point2D::new(0.0, 0.0),
                b: 500.0,
                d: 500.0,
                height: 3.0,
                fc: 40.0,
                i_factor: 0.7,
            })
            .with_loading_layer(LoadingLayer::new("Self Dead").with_column_fz("C1", dead))
            .with_loading_layer(LoadingLayer::new("Transfer - Dead"))
            .with_loading_layer(LoadingLayer::new("Transfer - LL reducible"))
            .with_loading_layer(LoadingLayer::new("Live (Reducible) Loading").with_column_fz("C1", live))
            .with_load_combination(
                LoadCombination::new("All Dead LC")
                    .with_factor("Self Dead", 1.0)
                    .with_factor("Transfer - Dead", 1.0),
            )
    }

    fn settings(floors: &[&str]) -> RundownSettings {
        let mut settings = RundownSettings::default();
        settings.layers = layers();
        settings.concrete_density = 0.0;
        settings.retry.backoff_secs = 0;
        settings.floors = floors.iter().map(|f| FloorEntry::new(*f, format!("{f}.json"))).collect();
        settings
    }

    fn engine(floors: &[&str]) -> TableEngine {
        let engine = TableEngine::in_memory();
        for floor in floors {
            engine.insert_model(format!("{floor}.json"), model(floor, 100.0, 50.0)).unwrap();
        }
        engine
    }

    #[test]
    fn test_transfer_targets_follow_template() {
        let mut names = layers();
        assert_eq!(transfer_targets(&names)[1], (SeriesName::TransferLlReducible, SeriesName::AllLive));

        names.transfer_ll_unreducible = "Transfer - LL unreducible".into();
        names.live_unreducible_plans = vec!["Live (Storage) Loading".into()];
        let targets = transfer_targets(&names);
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[2], (SeriesName::TransferLlUnreducible, SeriesName::AllLiveUnreducible));
    }

    #[test]
    fn test_validate_template_lists_missing_names() {
        let engine = TableEngine::in_memory();
        engine.insert_model("L1.json", model("L1", 1.0, 1.0)).unwrap();
        let session = engine.open(Path::new("L1.json")).unwrap();

        let mut names = layers();
        assert!(validate_template(&session, &names, "L1").is_ok());

        names.live_reducible_plans.push("Live (Parking) Loading".into());
        names.all_dead_lc = "Dead LC".into();
        match validate_template(&session, &names, "L1").unwrap_err() {
            RundownError::MissingTemplateNames { floor, kind, names } => {
                assert_eq!(floor, "L1");
                assert_eq!(kind, "loading layer");
                assert_eq!(names, vec!["Live (Parking) Loading".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_single_pass_extracts_composites() {
        let controller = RundownController::new(engine(&["Roof"]), settings(&["Roof"]));
        let sequence = RunSequence::build(controller.settings()).unwrap();
        let state = controller.process_pass(&sequence.passes()[0], None).unwrap();

        let dead = state.require(SupportType::Columns, &SeriesName::AllDead).unwrap();
        assert_relative_eq!(dead.total_fz(), 100.0);
        let live = state.require(SupportType::Columns, &SeriesName::AllLive).unwrap();
        assert_relative_eq!(live.total_fz(), 50.0);
        assert!(state.get(SupportType::Walls, &SeriesName::AllLiveFloor).unwrap().is_empty());
        assert!(state.get(SupportType::Columns, &SeriesName::AllLiveUnreducible).is_none());
        assert_eq!(controller.engine().open_sessions(), 0);
    }

    #[test]
    fn test_carried_loads_become_transfer_loads() {
        let floors = ["Roof", "L2"];
        let controller = RundownController::new(engine(&floors), settings(&floors));
        let sequence = RunSequence::build(controller.settings()).unwrap();

        let roof = controller.process_pass(&sequence.passes()[0], None).unwrap();
        let carried = CarriedLoads::from_state(&roof);
        let l2 = controller.process_pass(&sequence.passes()[1], Some(&carried)).unwrap();

        let dead = l2.require(SupportType::Columns, &SeriesName::AllDead).unwrap();
        assert_relative_eq!(dead.total_fz(), 200.0);
        let reducible = l2.require(SupportType::Columns, &SeriesName::AllLiveReducible).unwrap();
        assert_relative_eq!(reducible.total_fz(), 100.0);

        let saved = controller.engine().model("L2.json").unwrap();
        assert_eq!(saved.layer("Transfer - Dead").unwrap().point_loads.len(), 1);
    }

    #[test]
    fn test_stiffness_pass_updates_columns() {
        let mut s = settings(&["Roof"]);
        s.tasks.column_stiffness = true;
        let controller = RundownController::new(engine(&["Roof"]), s);
        let sequence = RunSequence::build(controller.settings()).unwrap();
        let state = controller.process_pass(&sequence.passes()[0], None).unwrap();

        // N* = max(1.2·100 + 1.5·50, 135) = 195 kN over 250 000 mm² at 40 MPa
        assert_eq!(state.stiffness.len(), 1);
        assert_relative_eq!(state.stiffness[0].check, 0.0195, epsilon = 1e-12);
        assert_eq!(state.stiffness[0].previous, 0.7);
        let saved = controller.engine().model("Roof.json").unwrap();
        assert_eq!(saved.columns[0].i_factor, state.stiffness[0].i_factor);
    }

    #[test]
    fn test_cancel_before_first_floor() {
        let floors = ["Roof", "L2"];
        let controller = RundownController::new(engine(&floors), settings(&floors));
        controller.cancel_flag().store(true, Ordering::SeqCst);
        let report = controller.run().unwrap();
        assert!(report.cancelled);
        assert_eq!(report.passes_completed, 0);
        assert_eq!(report.passes_total, 2);
    }

    #[test]
    fn test_run_lock_tracks_floor_passes() {
        let dir = tempfile::tempdir().unwrap();
        let floors = ["Roof", "L2"];
        let lock = RunLock::acquire(dir.path(), "engineer").unwrap();
        let controller = RundownController::new(engine(&floors), settings(&floors)).with_run_lock(lock);
        controller.run().unwrap();

        let holder = RunLock::check(dir.path()).unwrap();
        assert_eq!(holder.current_pass.as_deref(), Some("L2"));
        assert_eq!(holder.current_file.as_deref(), Some(Path::new("L2.json")));
        assert_eq!((holder.passes_started, holder.passes_total), (2, 2));

        drop(controller);
        assert!(RunLock::check(dir.path()).is_none());
    }

    #[test]
    fn test_missing_model_is_reported_before_opening() {
        let controller = RundownController::new(engine(&["Roof"]), settings(&["Roof", "L2"]));
        match controller.run().unwrap_err() {
            RundownError::MissingFiles { paths } => assert_eq!(paths, vec!["L2.json".to_string()]),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
