//! Reaction extraction from a solved floor model
//!
//! Builds a [`ReactionSet`] for one layer and one support type. When a
//! concrete density is given, the self-weight of the supports themselves is
//! added to `Fz`: column height times gross area, and for wall groups an
//! assumed storey height times group area.

use tracing::debug;

use crate::engine::{ColumnElement, LayerRef, ModelSession, WallGroupElement};
use crate::errors::RundownResult;
use crate::reactions::{Reaction, ReactionSet, SupportType};

/// Storey height (m) assumed for wall group self-weight
pub const WALL_STOREY_HEIGHT: f64 = 3.0;

/// Self-weight of a column (kN) at `density` (kN/m³)
pub fn column_self_weight(column: &ColumnElement, density: f64) -> f64 {
    if density == 0.0 {
        return 0.0;
    }
    density * column.height * column.gross_area_m2()
}

/// Self-weight of a wall group (kN) at `density` (kN/m³)
pub fn wall_self_weight(wall: &WallGroupElement, density: f64) -> f64 {
    density * WALL_STOREY_HEIGHT * wall.total_area * 1e-6
}

/// Reactions of every column below the floor on `layer`
pub fn column_reactions<S: ModelSession + ?Sized>(
    session: &S,
    layer: &LayerRef,
    density: f64,
) -> RundownResult<ReactionSet> {
    let mut set = ReactionSet::new(SupportType::Columns);
    for column in session.columns_below()? {
        let vector = session.column_reaction(layer, &column)?;
        let reaction = Reaction {
            fx: vector.x,
            fy: vector.y,
            fz: vector.z + column_self_weight(&column, density),
            mx: vector.rot_x,
            my: vector.rot_y,
            ..Reaction::column(column.location)
        }
        .with_name(column.name);
        set.insert(reaction);
    }
    debug!(layer = layer.name(), columns = set.len(), "Extracted column reactions");
    Ok(set)
}

/// Reactions of every wall group below the floor on `layer`
pub fn wall_reactions<S: ModelSession + ?Sized>(
    session: &S,
    layer: &LayerRef,
    density: f64,
) -> RundownResult<ReactionSet> {
    let mut set = ReactionSet::new(SupportType::Walls);
    for wall in session.wall_groups_below()? {
        let vector = session.wall_group_reaction(layer, &wall)?;
        let fz = vector.z + wall_self_weight(&wall, density);
        let line = wall.line();
        let reaction = Reaction::wall(line, wall.centroid).with_name(wall.name.clone());
        let fz_per_m = if wall.total_length > 0.0 { fz / wall.total_length } else { 0.0 };
        set.insert(Reaction {
            fz,
            fz_per_m: Some(fz_per_m),
            ..reaction
        });
    }
    debug!(layer = layer.name(), walls = set.len(), "Extracted wall group reactions");
    Ok(set)
}

/// Reactions of one support type on `layer`
pub fn extract<S: ModelSession + ?Sized>(
    session: &S,
    layer: &LayerRef,
    support_type: SupportType,
    density: f64,
) -> RundownResult<ReactionSet> {
    match support_type {
        SupportType::Columns => column_reactions(session, layer, density),
        SupportType::Walls => wall_reactions(session, layer, density),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::table::{FloorModel, LoadingLayer, TableEngine};
    use crate::engine::{AnalysisEngine, ReactionVector};
    use crate::geometry::{PlanCoord, Point2D};
    use crate::reactions::LocationKey;
    use approx::assert_relative_eq;
    use std::path::Path;

    fn column(name: &str, b: f64, d: f64) -> ColumnElement {
        ColumnElement {
            name: name.into(),
            location: Point2D::new(1.0, 2.0),
            b,
            d,
            height: 3.0,
            fc: 40.0,
            i_factor: 1.0,
        }
    }

    fn wall() -> WallGroupElement {
        WallGroupElement {
            name: "W1".into(),
            centroid: Point2D::new(0.0, 5.0),
            total_length: 5.0,
            reaction_angle: 90.0,
            total_area: 1_000_000.0,
        }
    }

    #[test]
    fn test_rectangular_column_self_weight() {
        // 24 kN/m³ × 3 m × 0.4 m × 0.5 m
        assert_relative_eq!(column_self_weight(&column("C1", 400.0, 500.0), 24.0), 14.4, epsilon = 1e-12);
        assert_eq!(column_self_weight(&column("C1", 400.0, 500.0), 0.0), 0.0);
    }

    #[test]
    fn test_circular_column_self_weight() {
        let expected = 24.0 * 3.0 * std::f64::consts::PI * 0.6 * 0.6 / 4.0;
        assert_relative_eq!(column_self_weight(&column("C2", 0.0, 600.0), 24.0), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_wall_self_weight_uses_storey_height() {
        assert_relative_eq!(wall_self_weight(&wall(), 24.0), 72.0, epsilon = 1e-12);
    }

    #[test]
    fn test_extract_from_session() {
        let model = FloorModel::new("L4")
            .with_column(column("C1", 400.0, 500.0))
            .with_wall_group(wall())
            .with_loading_layer(
                LoadingLayer::new("Dead")
                    .with_column_reaction(
                        "C1",
                        ReactionVector {
                            x: 1.0,
                            y: -2.0,
                            z: 100.0,
                            rot_x: 3.0,
                            rot_y: 4.0,
                        },
                    )
                    .with_wall_fz("W1", 50.0),
            );
        let engine = TableEngine::in_memory();
        engine.insert_model("L4.json", model).unwrap();
        let mut session = engine.open(Path::new("L4.json")).unwrap();
        session.generate_mesh().unwrap();
        session.solve().unwrap();

        let layer = LayerRef::Loading("Dead".into());
        let columns = extract(&session, &layer, SupportType::Columns, 24.0).unwrap();
        let c1 = columns.get(&LocationKey::Column(PlanCoord::new(1.0, 2.0))).unwrap();
        assert_relative_eq!(c1.fz, 114.4, epsilon = 1e-9);
        assert_eq!((c1.fx, c1.fy, c1.mx, c1.my), (1.0, -2.0, 3.0, 4.0));
        assert_eq!(c1.name.as_deref(), Some("C1"));

        let walls = extract(&session, &layer, SupportType::Walls, 0.0).unwrap();
        let w1 = walls.reactions().next().unwrap();
        assert_eq!(w1.fz, 50.0);
        assert_eq!(w1.fz_per_m, Some(10.0));
        let line = wall().line();
        assert_eq!(w1.key(), LocationKey::Wall(line.start.into(), line.end.into()));
    }

    #[test]
    fn test_unsolved_model_fails() {
        let engine = TableEngine::in_memory();
        engine.insert_model(
            "L5.json",
            FloorModel::new("L5").with_column(column("C1", 400.0, 400.0)).with_loading_layer(LoadingLayer::new("Dead")),
        )
        .unwrap();
        let session = engine.open(Path::new("L5.json")).unwrap();
        let err = column_reactions(&session, &LayerRef::Loading("Dead".into()), 0.0).unwrap_err();
        assert!(err.is_recoverable());
    }
}
