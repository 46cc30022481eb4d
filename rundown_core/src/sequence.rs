//! Run order
//!
//! A [`RunSequence`] is the list of floor passes a run walks, top to bottom:
//! the configured floors sliced by `start_from` / `end_at` and expanded by
//! typical count. It is fixed before the first floor is opened; only the
//! progress cursor moves, so a retry can resume where the last attempt
//! stopped.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{RundownError, RundownResult};
use crate::settings::{FloorEntry, FloorSelector, RundownSettings};

/// One pass over a floor model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorPass {
    /// Zero-based position in the run
    pub position: usize,

    /// Configured floor name
    pub floor: String,

    /// Name used in logs and exports: the floor name, or `name (k/n)` for
    /// the k-th of n typical storeys
    pub label: String,

    pub path: PathBuf,

    /// 1-based repeat number within a typical floor
    pub repeat: u32,

    pub typical: u32,
}

/// Ordered, typical-expanded floor passes with a progress cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSequence {
    passes: Vec<FloorPass>,
    progress: usize,
}

impl RunSequence {
    /// Build the run order from settings.
    ///
    /// # Errors
    ///
    /// * `EmptyFloorList` - no floors configured
    /// * `InvalidRange` - unknown start/end floor, index out of range, or
    ///   start after end
    pub fn build(settings: &RundownSettings) -> RundownResult<Self> {
        let floors = &settings.floors;
        if floors.is_empty() {
            return Err(RundownError::EmptyFloorList);
        }

        let start = match &settings.start_from {
            Some(selector) => resolve(selector, floors, "start_from")?,
            None => 0,
        };
        let end = match &settings.end_at {
            Some(selector) => resolve(selector, floors, "end_at")?,
            None => floors.len() - 1,
        };
        if start > end {
            return Err(RundownError::invalid_range(format!(
                "start floor '{}' comes after end floor '{}'",
                floors[start].name, floors[end].name
            )));
        }

        let mut passes = Vec::new();
        for floor in &floors[start..=end] {
            let path = settings.floor_path(floor);
            for repeat in 1..=floor.typical {
                let label = if floor.typical > 1 {
                    format!("{} ({}/{})", floor.name, repeat, floor.typical)
                } else {
                    floor.name.clone()
                };
                passes.push(FloorPass {
                    position: passes.len(),
                    floor: floor.name.clone(),
                    label,
                    path: path.clone(),
                    repeat,
                    typical: floor.typical,
                });
            }
        }

        Ok(RunSequence { passes, progress: 0 })
    }

    pub fn passes(&self) -> &[FloorPass] {
        &self.passes
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Number of passes completed and saved
    pub fn progress(&self) -> usize {
        self.progress
    }

    /// Next pass to run, if any
    pub fn next_pass(&self) -> Option<&FloorPass> {
        self.passes.get(self.progress)
    }

    /// Mark the current pass as completed
    pub fn advance(&mut self) {
        if self.progress < self.passes.len() {
            self.progress += 1;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= self.passes.len()
    }

    /// Distinct floor model paths that do not exist on disk, in run order
    pub fn missing_files(&self) -> Vec<PathBuf> {
        self.missing_files_by(Path::exists)
    }

    /// Distinct floor model paths for which `exists` is false, in run order
    pub fn missing_files_by<F: Fn(&Path) -> bool>(&self, exists: F) -> Vec<PathBuf> {
        let mut missing: Vec<PathBuf> = Vec::new();
        for pass in &self.passes {
            if !exists(&pass.path) && !missing.contains(&pass.path) {
                missing.push(pass.path.clone());
            }
        }
        missing
    }

    /// Fail with every missing path at once
    pub fn check_files(&self) -> RundownResult<()> {
        self.check_files_by(Path::exists)
    }

    pub fn check_files_by<F: Fn(&Path) -> bool>(&self, exists: F) -> RundownResult<()> {
        let missing = self.missing_files_by(exists);
        if missing.is_empty() {
            return Ok(());
        }
        Err(RundownError::MissingFiles {
            paths: missing.iter().map(|p| p.display().to_string()).collect(),
        })
    }
}

fn resolve(selector: &FloorSelector, floors: &[FloorEntry], field: &str) -> RundownResult<usize> {
    match selector {
        FloorSelector::Index(index) if *index < floors.len() => Ok(*index),
        FloorSelector::Index(index) => Err(RundownError::invalid_range(format!(
            "{} index {} is out of range for {} floors",
            field,
            index,
            floors.len()
        ))),
        FloorSelector::Name(name) => floors
            .iter()
            .position(|f| f.name.trim() == name.trim())
            .ok_or_else(|| RundownError::invalid_range(format!("{} floor '{}' is not in the floor list", field, name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn settings() -> RundownSettings {
        let mut settings = RundownSettings::default();
        settings.floors = vec![
            FloorEntry::new("Roof", "roof.json"),
            FloorEntry::new("L3", "typ.json").typical(2),
            FloorEntry::new("L1", "l1.json"),
        ];
        settings
    }

    #[test]
    fn test_typical_expansion() {
        let sequence = RunSequence::build(&settings()).unwrap();
        let labels: Vec<&str> = sequence.passes().iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Roof", "L3 (1/2)", "L3 (2/2)", "L1"]);
        assert_eq!(sequence.passes()[2].path, sequence.passes()[1].path);
        assert_eq!(sequence.passes()[3].position, 3);
    }

    #[test]
    fn test_range_by_name_and_index() {
        let mut s = settings();
        s.start_from = Some(FloorSelector::Name("L3".into()));
        s.end_at = Some(FloorSelector::Index(1));
        let sequence = RunSequence::build(&s).unwrap();
        assert_eq!(sequence.len(), 2);
        assert!(sequence.passes().iter().all(|p| p.floor == "L3"));
    }

    #[test]
    fn test_invalid_ranges() {
        let mut s = settings();
        s.start_from = Some(FloorSelector::Index(2));
        s.end_at = Some(FloorSelector::Index(0));
        assert_eq!(RunSequence::build(&s).unwrap_err().error_code(), "INVALID_RANGE");

        let mut s = settings();
        s.end_at = Some(FloorSelector::Index(3));
        assert!(RunSequence::build(&s).is_err());

        let mut s = settings();
        s.start_from = Some(FloorSelector::Name("Basement".into()));
        assert!(RunSequence::build(&s).is_err());
    }

    #[test]
    fn test_empty_floor_list() {
        let s = RundownSettings::default();
        assert_eq!(RunSequence::build(&s).unwrap_err(), RundownError::EmptyFloorList);
    }

    #[test]
    fn test_progress_cursor() {
        let mut sequence = RunSequence::build(&settings()).unwrap();
        assert_eq!(sequence.next_pass().map(|p| p.label.as_str()), Some("Roof"));
        sequence.advance();
        sequence.advance();
        assert_eq!(sequence.progress(), 2);
        assert_eq!(sequence.next_pass().map(|p| p.label.as_str()), Some("L3 (2/2)"));
        sequence.advance();
        sequence.advance();
        sequence.advance();
        assert!(sequence.is_complete());
        assert_eq!(sequence.progress(), 4);
    }

    #[test]
    fn test_missing_files_listed_once() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("roof.json"), "{}").unwrap();
        let mut s = settings();
        s.root_directory = dir.path().to_path_buf();

        let sequence = RunSequence::build(&s).unwrap();
        let missing = sequence.missing_files();
        assert_eq!(missing, vec![dir.path().join("typ.json"), dir.path().join("l1.json")]);
        match sequence.check_files().unwrap_err() {
            RundownError::MissingFiles { paths } => assert_eq!(paths.len(), 2),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
