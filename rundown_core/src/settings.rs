//! # Rundown Settings
//!
//! Everything a run is configured by: floor order and typical counts, layer
//! name bindings, material and stiffness parameters, seismic combination
//! factors, task flags and retry policy. Settings are stored as JSON
//! (`rundown.json`) next to the floor models.
//!
//! ## Example
//!
//! ```rust
//! use rundown_core::settings::{FloorEntry, RundownSettings};
//!
//! let mut settings = RundownSettings::default();
//! settings.floors.push(FloorEntry::new("Roof", "roof.json"));
//! settings.floors.push(FloorEntry::new("L2", "l2.json").typical(3));
//!
//! assert!(settings.validate().is_ok());
//! assert!(settings.layers.has_unreducible());
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{RundownError, RundownResult};

/// Current settings schema version
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Default settings file name in a project directory
pub const SETTINGS_FILE_NAME: &str = "rundown.json";

/// Root settings container, serialized to `rundown.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RundownSettings {
    /// Schema version (for migration compatibility)
    pub version: String,

    /// Directory floor paths are relative to, and where logs and exports go.
    /// Empty means the directory holding the settings file.
    pub root_directory: PathBuf,

    /// Floors in run order, top to bottom
    pub floors: Vec<FloorEntry>,

    /// First floor to process (inclusive), by name or zero-based index
    pub start_from: Option<FloorSelector>,

    /// Last floor to process (inclusive), by name or zero-based index
    pub end_at: Option<FloorSelector>,

    pub layers: LayerNames,

    pub tasks: Tasks,

    /// Reinforced concrete density for self-weight (kN/m³)
    pub concrete_density: f64,

    pub column_stiffness: StiffnessRatios,

    pub seismic: SeismicFactors,

    /// Drawing scale denominator (1:N) used by the centroid export
    pub drawing_scale: f64,

    pub retry: RetryPolicy,

    /// Seconds to keep the log visible after a fatal error
    pub exit_delay_secs: u64,

    /// Exit immediately on fatal errors
    pub debug: bool,
}

impl Default for RundownSettings {
    fn default() -> Self {
        RundownSettings {
            version: SCHEMA_VERSION.to_string(),
            root_directory: PathBuf::new(),
            floors: Vec::new(),
            start_from: None,
            end_at: None,
            layers: LayerNames::default(),
            tasks: Tasks::default(),
            concrete_density: 24.0,
            column_stiffness: StiffnessRatios::default(),
            seismic: SeismicFactors::default(),
            drawing_scale: 100.0,
            retry: RetryPolicy::default(),
            exit_delay_secs: 10,
            debug: false,
        }
    }
}

impl RundownSettings {
    /// Check every numeric and naming rule. Runs before any floor is opened.
    pub fn validate(&self) -> RundownResult<()> {
        let tasks = &self.tasks;
        if !tasks.load_rundown && !tasks.centroids && !tasks.column_stiffness {
            return Err(RundownError::NothingToDo);
        }

        if !(self.concrete_density >= 0.0) {
            return Err(RundownError::invalid_setting(
                "concrete_density",
                self.concrete_density.to_string(),
                "Density cannot be negative",
            ));
        }

        let ratios = &self.column_stiffness;
        for (field, value) in [("column_stiffness.min_ratio", ratios.min_ratio), ("column_stiffness.max_ratio", ratios.max_ratio)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RundownError::invalid_setting(field, value.to_string(), "Ratio must be between 0 and 1"));
            }
        }
        if ratios.max_ratio < ratios.min_ratio {
            return Err(RundownError::invalid_setting(
                "column_stiffness.max_ratio",
                ratios.max_ratio.to_string(),
                format!("Max ratio is less than min ratio {}", ratios.min_ratio),
            ));
        }

        if !(self.drawing_scale > 0.0) {
            return Err(RundownError::invalid_setting(
                "drawing_scale",
                self.drawing_scale.to_string(),
                "Drawing scale must be greater than 0",
            ));
        }

        let seismic = &self.seismic;
        for (field, value) in [
            ("seismic.dead", seismic.dead),
            ("seismic.live_reducible", seismic.live_reducible),
            ("seismic.live_unreducible", seismic.live_unreducible),
        ] {
            if !(value >= 0.0) {
                return Err(RundownError::invalid_setting(field, value.to_string(), "Factor cannot be negative"));
            }
        }

        if self.layers.live_reducible_plans.iter().all(|p| p.trim().is_empty()) {
            return Err(RundownError::invalid_setting(
                "layers.live_reducible_plans",
                format!("{:?}", self.layers.live_reducible_plans),
                "At least one reducible live load plan is required",
            ));
        }

        for (field, name) in [
            ("layers.transfer_dead", &self.layers.transfer_dead),
            ("layers.transfer_ll_reducible", &self.layers.transfer_ll_reducible),
            ("layers.all_dead_lc", &self.layers.all_dead_lc),
        ] {
            if name.trim().is_empty() {
                return Err(RundownError::invalid_setting(field, "\"\"", "Layer name cannot be empty"));
            }
        }

        if let Some(floor) = self.floors.iter().find(|f| f.typical == 0) {
            return Err(RundownError::invalid_setting(
                format!("floors[{}].typical", floor.name),
                "0",
                "Typical count must be at least 1",
            ));
        }

        Ok(())
    }

    /// Directory floor paths, logs and exports are relative to
    pub fn root(&self) -> &Path {
        &self.root_directory
    }

    /// Absolute-or-root-relative path of a floor model
    pub fn floor_path(&self, floor: &FloorEntry) -> PathBuf {
        if floor.path.is_absolute() {
            floor.path.clone()
        } else {
            self.root_directory.join(&floor.path)
        }
    }
}

/// One floor model in the run order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorEntry {
    /// Floor name used in logs and the centroid export
    pub name: String,

    /// Model file path, relative to the root directory unless absolute
    pub path: PathBuf,

    /// Number of identical storeys this model represents
    #[serde(default = "default_typical")]
    pub typical: u32,
}

fn default_typical() -> u32 {
    1
}

impl FloorEntry {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        FloorEntry {
            name: name.into(),
            path: path.into(),
            typical: 1,
        }
    }

    /// Set the typical count (builder pattern)
    pub fn typical(mut self, count: u32) -> Self {
        self.typical = count;
        self
    }
}

/// Floor selected by zero-based index or by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FloorSelector {
    Index(usize),
    Name(String),
}

impl fmt::Display for FloorSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloorSelector::Index(i) => write!(f, "index {}", i),
            FloorSelector::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Layer and combination names the run binds to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerNames {
    pub transfer_dead: String,
    pub transfer_ll_reducible: String,

    /// Empty when the template has no unreducible transfer layer
    pub transfer_ll_unreducible: String,

    /// Load combination of all dead loads
    pub all_dead_lc: String,

    /// Optional load combination of all live loads; empty to skip
    pub all_live_lc: String,

    pub live_reducible_plans: Vec<String>,
    pub live_unreducible_plans: Vec<String>,
}

impl Default for LayerNames {
    fn default() -> Self {
        LayerNames {
            transfer_dead: "Transfer - Dead".to_string(),
            transfer_ll_reducible: "Transfer - LL reducible".to_string(),
            transfer_ll_unreducible: "Transfer - LL unreducible".to_string(),
            all_dead_lc: "All Dead LC".to_string(),
            all_live_lc: "All live loads".to_string(),
            live_reducible_plans: vec![
                "Live (Reducible) Loading".to_string(),
                "Live (Parking) Loading".to_string(),
                "Live (Roof) Loading".to_string(),
            ],
            live_unreducible_plans: vec![
                "Live (Unreducible) Loading".to_string(),
                "Live (Storage) Loading".to_string(),
            ],
        }
    }
}

impl LayerNames {
    /// Whether the template carries unreducible live load: the unreducible
    /// transfer layer is named and at least one unreducible plan is listed.
    pub fn has_unreducible(&self) -> bool {
        !self.transfer_ll_unreducible.trim().is_empty() && !self.live_unreducible_plans.is_empty()
    }

    /// Unreducible plans in effect (empty when the template has none)
    pub fn unreducible_plans(&self) -> &[String] {
        if self.has_unreducible() {
            &self.live_unreducible_plans
        } else {
            &[]
        }
    }

    /// Loading layer names every floor model must define
    pub fn required_loading_layers(&self) -> Vec<&str> {
        let mut names = vec![self.transfer_dead.as_str(), self.transfer_ll_reducible.as_str()];
        if self.has_unreducible() {
            names.push(self.transfer_ll_unreducible.as_str());
        }
        names.extend(self.live_reducible_plans.iter().map(String::as_str));
        names.extend(self.unreducible_plans().iter().map(String::as_str));
        names
    }

    /// Load combination names every floor model must define
    pub fn required_load_combinations(&self) -> Vec<&str> {
        let mut names = vec![self.all_dead_lc.as_str()];
        if !self.all_live_lc.trim().is_empty() {
            names.push(self.all_live_lc.as_str());
        }
        names
    }
}

/// Which parts of the pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tasks {
    /// Accumulate reactions down the building as transfer loads
    pub load_rundown: bool,

    /// Compute and export load centroids
    pub centroids: bool,

    /// Re-estimate column stiffness from factored axial load
    pub column_stiffness: bool,

    /// Generate the mesh before solving
    pub generate_mesh: bool,

    /// Save a timestamped backup of each model before modifying it
    pub create_backups: bool,
}

impl Default for Tasks {
    fn default() -> Self {
        Tasks {
            load_rundown: true,
            centroids: false,
            column_stiffness: false,
            generate_mesh: true,
            create_backups: false,
        }
    }
}

/// Bounds on the column stiffness-reduction factor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StiffnessRatios {
    pub min_ratio: f64,
    pub max_ratio: f64,
}

impl Default for StiffnessRatios {
    fn default() -> Self {
        StiffnessRatios {
            min_ratio: 0.0,
            max_ratio: 0.8,
        }
    }
}

/// Multipliers of the seismic centroid combination
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeismicFactors {
    pub dead: f64,
    pub live_reducible: f64,
    pub live_unreducible: f64,
}

impl Default for SeismicFactors {
    fn default() -> Self {
        SeismicFactors {
            dead: 1.0,
            live_reducible: 0.3,
            live_unreducible: 0.6,
        }
    }
}

/// Run-level retry on transient engine errors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,

    /// Wait before restarting from the progress cursor
    pub backoff_secs: u64,

    /// Interval between countdown log lines while waiting
    pub countdown_step_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            backoff_secs: 60,
            countdown_step_secs: 5,
        }
    }
}
