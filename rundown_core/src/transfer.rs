//! Transfer loads: reactions of the floor above written onto the floor below
//!
//! Each column reaction becomes one point load at the column location; each
//! wall group reaction becomes one line load along the group line, per
//! metre. Loads sit at elevation 0 (floor soffit). Values are rounded with
//! [`round_component`] by the kind of the source component before writing;
//! a zero `Fz` is left unset.
//!
//! The target layer is cleared first so re-running a floor never doubles
//! its transfer loads.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{LineLoad, ModelSession, PointLoad};
use crate::errors::RundownResult;
use crate::reactions::rounding::round_component;
use crate::reactions::{Component, Reaction, ReactionSet, SupportGeometry};

/// `(source, target)` component pairs written by default: vertical load only
pub const FZ_ONLY: [(Component, Component); 1] = [(Component::Fz, Component::Fz)];

/// What [`apply_transfer`] wrote
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TransferSummary {
    /// Loads removed from the layer before writing
    pub cleared: usize,
    pub point_loads: usize,
    pub line_loads: usize,

    /// Total vertical load written (kN), after rounding
    pub total_fz: f64,
}

/// Remove every load on `layer`
pub fn clear_layer<S: ModelSession + ?Sized>(session: &mut S, layer: &str) -> RundownResult<usize> {
    let cleared = session.clear_loads(layer)?;
    debug!(layer, cleared, "Cleared transfer loads");
    Ok(cleared)
}

/// Clear `layer`, then write one load per reaction of every set.
///
/// Columns and walls share the transfer layer, so pass both sets in one
/// call; the layer is cleared once.
pub fn apply_transfer<S: ModelSession + ?Sized>(
    session: &mut S,
    layer: &str,
    sets: &[&ReactionSet],
    mapping: &[(Component, Component)],
) -> RundownResult<TransferSummary> {
    let mut summary = TransferSummary {
        cleared: clear_layer(session, layer)?,
        ..Default::default()
    };

    for set in sets {
        for reaction in set.reactions() {
            match reaction.geometry {
                SupportGeometry::Column { location } => {
                    let mut load = PointLoad {
                        location,
                        elevation: 0.0,
                        ..Default::default()
                    };
                    for (source, target) in mapping {
                        let value = round_component(*source, reaction.get(*source));
                        write_point_component(&mut load, *target, value);
                    }
                    summary.total_fz += load.fz;
                    summary.point_loads += 1;
                    session.add_point_load(layer, load)?;
                }
                SupportGeometry::Wall { line, .. } => {
                    let length = line.length();
                    let mut load = LineLoad {
                        line,
                        elevation: 0.0,
                        ..Default::default()
                    };
                    for (source, target) in mapping {
                        let per_metre = per_metre(reaction, *source, length);
                        let value = round_component(*source, per_metre);
                        write_line_component(&mut load, *target, value);
                    }
                    summary.total_fz += load.fz * length;
                    summary.line_loads += 1;
                    session.add_line_load(layer, load)?;
                }
            }
        }
    }

    info!(
        layer,
        point_loads = summary.point_loads,
        line_loads = summary.line_loads,
        total_fz = summary.total_fz,
        "Transfer loads written"
    );
    Ok(summary)
}

fn per_metre(reaction: &Reaction, source: Component, length: f64) -> f64 {
    if source == Component::FzPerM {
        return reaction.get(source);
    }
    if length > 0.0 {
        reaction.get(source) / length
    } else {
        0.0
    }
}

fn write_point_component(load: &mut PointLoad, target: Component, value: f64) {
    if value == 0.0 {
        return;
    }
    match target {
        Component::Fx => load.fx = value,
        Component::Fy => load.fy = value,
        Component::Fz | Component::FzPerM => load.fz = value,
        Component::Mx => load.mx = value,
        Component::My => load.my = value,
    }
}

fn write_line_component(load: &mut LineLoad, target: Component, value: f64) {
    if value == 0.0 {
        return;
    }
    match target {
        Component::Fx => load.fx = value,
        Component::Fy => load.fy = value,
        Component::Fz | Component::FzPerM => load.fz = value,
        Component::Mx => load.mx = value,
        Component::My => load.my = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::table::{FloorModel, LoadingLayer, TableEngine};
    use crate::engine::AnalysisEngine;
    use crate::geometry::{LineSegment2D, Point2D};
    use crate::reactions::SupportType;
    use approx::assert_relative_eq;
    use std::path::Path;

    fn open_session(engine: &TableEngine) -> crate::engine::table::TableSession {
        engine.insert_model(
            "L1.json",
            FloorModel::new("L1").with_loading_layer(LoadingLayer::new("Transfer - Dead")),
        )
        .unwrap();
        engine.open(Path::new("L1.json")).unwrap()
    }

    fn columns() -> ReactionSet {
        let mut set = ReactionSet::new(SupportType::Columns);
        set.insert(Reaction::column(Point2D::new(0.0, 0.0)).with_fz(100.2));
        set.insert(Reaction::column(Point2D::new(5.0, 0.0)).with_fz(-3.0));
        set.insert(
            Reaction::column(Point2D::new(9.0, 0.0))
                .with_fz(3.21)
                .with(Component::Mx, -2.5)
                .with(Component::Fx, 4.04),
        );
        set
    }

    fn walls() -> ReactionSet {
        let line = LineSegment2D::new(Point2D::new(0.0, 10.0), Point2D::new(4.0, 10.0));
        let mut set = ReactionSet::new(SupportType::Walls);
        set.insert(Reaction::wall(line, line.midpoint()).with_fz(130.0));
        set
    }

    #[test]
    fn test_point_loads_rounded_at_soffit() {
        let engine = TableEngine::in_memory();
        let mut session = open_session(&engine);
        let summary = apply_transfer(&mut session, "Transfer - Dead", &[&columns()], &FZ_ONLY).unwrap();
        assert_eq!(summary.point_loads, 3);
        assert_relative_eq!(summary.total_fz, 101.0 + 0.0 + 3.3, epsilon = 1e-9);

        let loads = &session.model().layer("Transfer - Dead").unwrap().point_loads;
        assert!(loads.iter().all(|l| l.elevation == 0.0));
        assert_eq!(loads[0].fz, 101.0);
        assert_eq!(loads[1].fz, 0.0);
        assert_eq!(loads[2].mx, 0.0);
    }

    #[test]
    fn test_component_mapping_rounds_moments_down() {
        let engine = TableEngine::in_memory();
        let mut session = open_session(&engine);
        let mapping = [
            (Component::Fz, Component::Fz),
            (Component::Fx, Component::Fx),
            (Component::Mx, Component::Mx),
        ];
        let mut set = ReactionSet::new(SupportType::Columns);
        set.insert(
            Reaction::column(Point2D::new(9.0, 0.0))
                .with_fz(3.21)
                .with(Component::Mx, -2.5)
                .with(Component::Fx, 4.04),
        );
        apply_transfer(&mut session, "Transfer - Dead", &[&set], &mapping).unwrap();
        let load = session.model().layer("Transfer - Dead").unwrap().point_loads[0];
        assert_relative_eq!(load.fz, 3.3, epsilon = 1e-12);
        assert_relative_eq!(load.fx, 4.1, epsilon = 1e-12);
        assert_eq!(load.mx, -3.0);
    }

    #[test]
    fn test_cross_kind_mapping_rounds_by_source() {
        let engine = TableEngine::in_memory();
        let mut session = open_session(&engine);
        let mapping = [(Component::Fx, Component::Mx), (Component::My, Component::Fy)];
        let mut set = ReactionSet::new(SupportType::Columns);
        set.insert(
            Reaction::column(Point2D::new(0.0, 0.0))
                .with(Component::Fx, -2.5)
                .with(Component::My, -2.5),
        );
        apply_transfer(&mut session, "Transfer - Dead", &[&set], &mapping).unwrap();
        let load = session.model().layer("Transfer - Dead").unwrap().point_loads[0];
        // A negative force clamps to zero even on a moment slot
        assert_eq!(load.mx, 0.0);
        // A negative moment floors even on a force slot
        assert_eq!(load.fy, -3.0);
    }

    #[test]
    fn test_wall_line_load_per_metre() {
        let engine = TableEngine::in_memory();
        let mut session = open_session(&engine);
        let summary = apply_transfer(&mut session, "Transfer - Dead", &[&walls()], &FZ_ONLY).unwrap();
        assert_eq!(summary.line_loads, 1);
        let load = session.model().layer("Transfer - Dead").unwrap().line_loads[0];
        // 130 / 4 = 32.5 -> 33
        assert_eq!(load.fz, 33.0);
        assert_relative_eq!(summary.total_fz, 132.0);
    }

    #[test]
    fn test_reapplying_is_idempotent() {
        let engine = TableEngine::in_memory();
        let mut session = open_session(&engine);
        let first = apply_transfer(&mut session, "Transfer - Dead", &[&columns(), &walls()], &FZ_ONLY).unwrap();
        let second = apply_transfer(&mut session, "Transfer - Dead", &[&columns(), &walls()], &FZ_ONLY).unwrap();
        assert_eq!(first.cleared, 0);
        assert_eq!(second.cleared, 4);
        let layer = session.model().layer("Transfer - Dead").unwrap();
        assert_eq!(layer.point_loads.len() + layer.line_loads.len(), 4);
    }

    #[test]
    fn test_missing_layer() {
        let engine = TableEngine::in_memory();
        let mut session = open_session(&engine);
        let err = apply_transfer(&mut session, "Nope", &[&columns()], &FZ_ONLY).unwrap_err();
        assert_eq!(err.error_code(), "LAYER_NOT_FOUND");
    }
}
