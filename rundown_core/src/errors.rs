//! # Error Types
//!
//! Structured error types for rundown_core. Every failure the pipeline can
//! raise is one variant of [`RundownError`], carrying enough context for the
//! operator log to say which floor, layer or setting is at fault.
//!
//! Only [`RundownError::Engine`] is recoverable: the controller retries the
//! run from its progress cursor when the analysis engine throws. Everything
//! else is fatal for the run.
//!
//! ## Example
//!
//! ```rust
//! use rundown_core::errors::{RundownError, RundownResult};
//!
//! fn validate_density(density: f64) -> RundownResult<()> {
//!     if density < 0.0 {
//!         return Err(RundownError::invalid_setting(
//!             "concrete_density",
//!             density.to_string(),
//!             "Density cannot be negative",
//!         ));
//!     }
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for rundown_core operations
pub type RundownResult<T> = Result<T, RundownError>;

/// Structured error type for load rundown operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum RundownError {
    /// A setting is out of range or inconsistent with another setting
    #[error("Invalid setting '{field}': {value} - {reason}")]
    InvalidSetting {
        field: String,
        value: String,
        reason: String,
    },

    /// Every task flag is off
    #[error("Nothing to do: enable the load rundown, centroid or column stiffness task")]
    NothingToDo,

    /// The floor list is empty
    #[error("No floors configured: add at least one floor model to the run")]
    EmptyFloorList,

    /// Start/end selection does not describe a valid slice of the floor list
    #[error("Invalid floor range: {reason}")]
    InvalidRange { reason: String },

    /// Floor model files that do not exist on disk
    #[error("Missing floor model files: {}", paths.join(", "))]
    MissingFiles { paths: Vec<String> },

    /// Configured names absent from a floor model's catalogue
    #[error("For floor {floor}: {kind} names {names:?} are not found in the model template")]
    MissingTemplateNames {
        floor: String,
        kind: String,
        names: Vec<String>,
    },

    /// A layer name resolved to neither a loading layer nor a load combination
    #[error("Load layer '{name}' not found in loading layers or load combinations")]
    LayerNotFound { name: String },

    /// The analysis engine failed (mesh, solve, reaction query, save...)
    #[error("Engine error during {operation} on {floor}: {reason}")]
    Engine {
        operation: String,
        floor: String,
        reason: String,
    },

    /// Total load of a centroid calculation is zero
    #[error("Total load is zero, cannot calculate centroid for {context}")]
    ZeroTotalLoad { context: String },

    /// A support present in one series is missing from another it must pair with
    #[error("Support at {location} not found in {series}")]
    MissingSupport { series: String, location: String },

    /// The transient error budget of the run is spent
    #[error("Gave up after {attempts} attempts; last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// File I/O error
    #[error("File error: {operation} on '{path}' - {reason}")]
    FileError {
        operation: String,
        path: String,
        reason: String,
    },

    /// The project directory is locked by another rundown
    #[error("File locked: '{path}' is locked by {locked_by} since {locked_at}")]
    FileLocked {
        path: String,
        locked_by: String,
        locked_at: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {reason}")]
    SerializationError { reason: String },

    /// Settings schema version mismatch
    #[error("Version mismatch: file version {file_version}, expected {expected_version}")]
    VersionMismatch {
        file_version: String,
        expected_version: String,
    },
}

impl RundownError {
    /// Create an InvalidSetting error
    pub fn invalid_setting(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        RundownError::InvalidSetting {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidRange error
    pub fn invalid_range(reason: impl Into<String>) -> Self {
        RundownError::InvalidRange { reason: reason.into() }
    }

    /// Create a LayerNotFound error
    pub fn layer_not_found(name: impl Into<String>) -> Self {
        RundownError::LayerNotFound { name: name.into() }
    }

    /// Create an Engine error
    pub fn engine(operation: impl Into<String>, floor: impl Into<String>, reason: impl Into<String>) -> Self {
        RundownError::Engine {
            operation: operation.into(),
            floor: floor.into(),
            reason: reason.into(),
        }
    }

    /// Create a ZeroTotalLoad error
    pub fn zero_total_load(context: impl Into<String>) -> Self {
        RundownError::ZeroTotalLoad { context: context.into() }
    }

    /// Create a MissingSupport error
    pub fn missing_support(series: impl Into<String>, location: impl Into<String>) -> Self {
        RundownError::MissingSupport {
            series: series.into(),
            location: location.into(),
        }
    }

    /// Create a FileError
    pub fn file_error(operation: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        RundownError::FileError {
            operation: operation.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileLocked error
    pub fn file_locked(path: impl Into<String>, locked_by: impl Into<String>, locked_at: impl Into<String>) -> Self {
        RundownError::FileLocked {
            path: path.into(),
            locked_by: locked_by.into(),
            locked_at: locked_at.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization(reason: impl Into<String>) -> Self {
        RundownError::SerializationError { reason: reason.into() }
    }

    /// Whether the controller may retry the run after this error.
    ///
    /// Only engine failures are transient. Configuration and validation
    /// errors cannot be fixed by waiting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RundownError::Engine { .. })
    }

    /// Get a short error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            RundownError::InvalidSetting { .. } => "INVALID_SETTING",
            RundownError::NothingToDo => "NOTHING_TO_DO",
            RundownError::EmptyFloorList => "EMPTY_FLOOR_LIST",
            RundownError::InvalidRange { .. } => "INVALID_RANGE",
            RundownError::MissingFiles { .. } => "MISSING_FILES",
            RundownError::MissingTemplateNames { .. } => "MISSING_TEMPLATE_NAMES",
            RundownError::LayerNotFound { .. } => "LAYER_NOT_FOUND",
            RundownError::Engine { .. } => "ENGINE_ERROR",
            RundownError::ZeroTotalLoad { .. } => "ZERO_TOTAL_LOAD",
            RundownError::MissingSupport { .. } => "MISSING_SUPPORT",
            RundownError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            RundownError::FileError { .. } => "FILE_ERROR",
            RundownError::FileLocked { .. } => "FILE_LOCKED",
            RundownError::SerializationError { .. } => "SERIALIZATION_ERROR",
            RundownError::VersionMismatch { .. } => "VERSION_MISMATCH",
        }
    }
}
