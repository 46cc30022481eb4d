//! Column stiffness re-estimate from factored axial load
//!
//! The ultimate axial load of each column is
//! `N* = max(1.2·G + 1.5·Q, 1.35·G)` from the accumulated dead (`G`) and
//! live (`Q`) reactions. Its ratio to the squash capacity,
//! `check = N*·1000 / (Ag·f'c)`, sets the stiffness-reduction factor:
//!
//! | `check`         | `i_factor`                 |
//! |-----------------|----------------------------|
//! | `>= 0.5`        | `0.8`                      |
//! | `0.2 ..= 0.5`   | `0.5 + (check - 0.2)`      |
//! | `0 ..= 0.2`     | `0.3 + check · (0.2 / 0.3)`|
//! | `< 0`           | `0.3`                      |
//!
//! The factor is floored to three decimals and clamped to the configured
//! limits. This is a one-shot estimate per pass, not a fixed-point iteration.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{ColumnElement, ModelSession};
use crate::errors::{RundownError, RundownResult};
use crate::geometry::PlanCoord;
use crate::reactions::{LocationKey, Reaction, ReactionSet, SupportType};
use crate::settings::StiffnessRatios;

/// Clamp range for `i_factor`, never wider than `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StiffnessLimits {
    min: f64,
    max: f64,
}

impl StiffnessLimits {
    pub fn new(min_ratio: f64, max_ratio: f64) -> Self {
        StiffnessLimits {
            min: min_ratio.max(0.0),
            max: max_ratio.min(1.0),
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

impl From<StiffnessRatios> for StiffnessLimits {
    fn from(ratios: StiffnessRatios) -> Self {
        StiffnessLimits::new(ratios.min_ratio, ratios.max_ratio)
    }
}

impl Default for StiffnessLimits {
    fn default() -> Self {
        StiffnessRatios::default().into()
    }
}

/// Stiffness-reduction factor for an axial load ratio
///
/// # Example
/// ```
/// use rundown_core::stiffness::{stiffness_factor, StiffnessLimits};
///
/// let limits = StiffnessLimits::new(0.0, 0.8);
/// assert_eq!(stiffness_factor(0.35, limits), 0.65);
/// assert_eq!(stiffness_factor(2.0, limits), 0.8);
/// assert_eq!(stiffness_factor(-1.0, limits), 0.3);
/// ```
pub fn stiffness_factor(check: f64, limits: StiffnessLimits) -> f64 {
    let raw = if check >= 0.5 {
        0.8
    } else if check >= 0.2 {
        0.5 + (check - 0.2)
    } else if check >= 0.0 {
        0.3 + check * (0.2 / 0.3)
    } else {
        0.3
    };

    // 1e-9 keeps values like 0.65 from flooring to 0.649
    let floored = ((raw * 1000.0) + 1e-9).floor() / 1000.0;

    if floored > limits.max {
        limits.max
    } else if floored < limits.min {
        limits.min
    } else {
        floored
    }
}

/// Axial load ratio `N*·1000 / (Ag·f'c)` of a column (N* in kN)
pub fn axial_load_ratio(column: &ColumnElement, ultimate_fz: f64) -> f64 {
    ultimate_fz * 1000.0 / (column.gross_area_mm2() * column.fc)
}

/// Ultimate column reactions `max(1.2·G + 1.5·Q, 1.35·G)`.
///
/// # Errors
///
/// * `MissingSupport` - a dead-load column has no live-load reaction
pub fn ultimate_column_reactions(dead: &ReactionSet, live: &ReactionSet) -> RundownResult<ReactionSet> {
    let mut ultimate = ReactionSet::new(SupportType::Columns);
    for (key, dead_reaction) in dead.iter() {
        let live_reaction = live
            .get(key)
            .ok_or_else(|| RundownError::missing_support("ALL_LIVE", key.to_string()))?;
        let fz = (1.2 * dead_reaction.fz + 1.5 * live_reaction.fz).max(1.35 * dead_reaction.fz);
        let mut reaction = Reaction::column(dead_reaction.geometry.load_point()).with_fz(fz);
        reaction.name = dead_reaction.name.clone();
        ultimate.insert(reaction);
    }
    Ok(ultimate)
}

/// One column's stiffness change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StiffnessUpdate {
    pub column: String,
    pub check: f64,
    pub previous: f64,
    pub i_factor: f64,
}

/// Write a new `i_factor` on every column below the floor.
///
/// # Errors
///
/// * `MissingSupport` - a column has no ultimate reaction
pub fn update_column_stiffness<S: ModelSession + ?Sized>(
    session: &mut S,
    ultimate: &ReactionSet,
    limits: StiffnessLimits,
) -> RundownResult<Vec<StiffnessUpdate>> {
    let mut updates = Vec::new();
    for column in session.columns_below()? {
        let key = LocationKey::Column(PlanCoord::from(column.location));
        let n_star = ultimate
            .get(&key)
            .map(|r| r.fz)
            .ok_or_else(|| RundownError::missing_support("ultimate column reactions", key.to_string()))?;

        let check = axial_load_ratio(&column, n_star);
        let i_factor = stiffness_factor(check, limits);
        session.set_column_i_factor(&column, i_factor)?;
        debug!(column = %column.name, check, i_factor, "Column stiffness updated");

        updates.push(StiffnessUpdate {
            column: column.name.clone(),
            check,
            previous: column.i_factor,
            i_factor,
        });
    }
    info!(columns = updates.len(), model = session.label(), "Column stiffness factors written");
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::table::{FloorModel, TableEngine};
    use crate::engine::AnalysisEngine;
    use crate::geometry::Point2D;
    use approx::assert_abs_diff_eq;
    use std::path::Path;

    fn column_set(fz: f64) -> ReactionSet {
        let mut set = ReactionSet::new(SupportType::Columns);
        set.insert(Reaction::column(Point2D::new(0.0, 0.0)).with_fz(fz));
        set
    }

    #[test]
    fn test_stiffness_segments() {
        let limits = StiffnessLimits::new(0.0, 1.0);
        assert_eq!(stiffness_factor(-1.0, limits), 0.3);
        assert_eq!(stiffness_factor(0.0, limits), 0.3);
        assert_eq!(stiffness_factor(0.1, limits), 0.366);
        assert_eq!(stiffness_factor(0.2, limits), 0.5);
        assert_eq!(stiffness_factor(0.35, limits), 0.65);
        assert_eq!(stiffness_factor(0.5, limits), 0.8);
        assert_eq!(stiffness_factor(2.0, limits), 0.8);
    }

    #[test]
    fn test_stiffness_is_monotonic_and_clamped() {
        let limits = StiffnessLimits::new(0.4, 0.7);
        let mut previous = f64::NEG_INFINITY;
        for check in [-1.0, 0.0, 0.1, 0.2, 0.35, 0.5, 2.0] {
            let value = stiffness_factor(check, limits);
            assert!(value >= previous, "{} at check {}", value, check);
            assert!((0.4..=0.7).contains(&value));
            previous = value;
        }
    }

    #[test]
    fn test_limits_ceiling() {
        let limits = StiffnessLimits::new(-0.5, 1.5);
        assert_eq!(limits.min(), 0.0);
        assert_eq!(limits.max(), 1.0);
    }

    #[test]
    fn test_ultimate_takes_governing_combination() {
        let ultimate = ultimate_column_reactions(&column_set(100.0), &column_set(50.0)).unwrap();
        assert_abs_diff_eq!(ultimate.total_fz(), 195.0, epsilon = 1e-9);

        // Dead-dominated: 1.35G governs
        let ultimate = ultimate_column_reactions(&column_set(100.0), &column_set(5.0)).unwrap();
        assert_abs_diff_eq!(ultimate.total_fz(), 135.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ultimate_requires_live_support() {
        let live = ReactionSet::new(SupportType::Columns);
        let err = ultimate_column_reactions(&column_set(100.0), &live).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_SUPPORT");
    }

    #[test]
    fn test_update_writes_to_model() {
        let engine = TableEngine::in_memory();
        engine.insert_model(
            "L1.json",
            FloorModel::new("L1").with_column(ColumnElement {
                name: "C1".into(),
                location: Point2D::new(0.0, 0.0),
                b: 500.0,
                d: 500.0,
                height: 3.0,
                fc: 40.0,
                i_factor: 1.0,
            }),
        )
        .unwrap();
        let mut session = engine.open(Path::new("L1.json")).unwrap();

        // 3500 kN over 250 000 mm² at 40 MPa -> check 0.35
        let updates =
            update_column_stiffness(&mut session, &column_set(3500.0), StiffnessLimits::new(0.0, 0.8)).unwrap();
        assert_eq!(updates.len(), 1);
        assert_abs_diff_eq!(updates[0].check, 0.35, epsilon = 1e-12);
        assert_eq!(updates[0].i_factor, 0.65);
        assert_eq!(updates[0].previous, 1.0);
        assert_eq!(session.model().columns[0].i_factor, 0.65);
    }
}
