//! # Load Centroids
//!
//! Load-weighted centroids of a floor's support reactions, used to place
//! seismic forces. Per floor the run records the floor-only and accumulated
//! (everything above included) centroid of dead, live, reducible live and
//! unreducible live load, plus a factored seismic combination of them.
//!
//! A zero total load has no centroid. Single-series centroids come back as
//! `None` (logged); the seismic combination skips absent inputs and only
//! fails when everything it combines is zero.
//!
//! ## Example
//!
//! ```rust
//! use rundown_core::centroid::{weighted_centroid_of_multiple, LoadCentroid};
//! use rundown_core::geometry::Point2D;
//!
//! let dead = LoadCentroid { fz: 100.0, location: Point2D::new(0.0, 0.0) };
//! let live = LoadCentroid { fz: 100.0, location: Point2D::new(10.0, 0.0) };
//!
//! let seismic = weighted_centroid_of_multiple(&[Some(dead), Some(live)], &[1.0, 0.3]).unwrap();
//! assert_eq!(seismic.fz, 130.0);
//! assert!((seismic.location.x - 30.0 / 13.0).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::controller::FloorRunState;
use crate::errors::{RundownError, RundownResult};
use crate::geometry::Point2D;
use crate::reactions::{weighted_sum, CombineOp, Component, ReactionSet, SeriesName, SupportType};
use crate::settings::SeismicFactors;

/// Total vertical load and where it acts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadCentroid {
    /// Total load (kN)
    pub fz: f64,
    pub location: Point2D,
}

/// Centroid of column and wall reactions together, or `None` when the
/// total load is zero.
pub fn calculate_weighted_centroid(columns: &ReactionSet, walls: &ReactionSet) -> Option<LoadCentroid> {
    match weighted_sum(&[columns, walls], &[1.0, 1.0]) {
        Ok(centroid) => Some(centroid),
        Err(e) => {
            warn!(error = %e, "Total load is zero, cannot calculate centroid");
            None
        }
    }
}

/// Combine already computed centroids with multipliers. Absent centroids
/// are skipped.
///
/// # Errors
///
/// * `InvalidSetting` - `centroids` and `multipliers` differ in length
/// * `ZeroTotalLoad` - the combined total is zero
pub fn weighted_centroid_of_multiple(
    centroids: &[Option<LoadCentroid>],
    multipliers: &[f64],
) -> RundownResult<LoadCentroid> {
    if centroids.len() != multipliers.len() {
        return Err(RundownError::invalid_setting(
            "multipliers",
            multipliers.len().to_string(),
            format!("expected one multiplier per centroid ({})", centroids.len()),
        ));
    }

    let mut total = 0.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    for (centroid, multiplier) in centroids.iter().zip(multipliers) {
        let Some(centroid) = centroid else { continue };
        let load = centroid.fz * multiplier;
        total += load;
        sum_x += load * centroid.location.x;
        sum_y += load * centroid.location.y;
    }

    if total == 0.0 {
        return Err(RundownError::zero_total_load("combined centroids"));
    }

    Ok(LoadCentroid {
        fz: total,
        location: Point2D::new(sum_x / total, sum_y / total),
    })
}

/// A factor as it appears in a series name: `1`, `0.3`, `1.5`
pub fn format_factor(factor: f64) -> String {
    if factor.fract() == 0.0 {
        format!("{}", factor as i64)
    } else {
        format!("{}", (factor * 10.0).round() / 10.0)
    }
}

/// One named centroid of a floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCentroid {
    pub series: String,
    pub centroid: Option<LoadCentroid>,
}

/// All centroids computed for one floor pass, in log order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorCentroids {
    pub floor: String,
    pub entries: Vec<NamedCentroid>,
}

impl FloorCentroids {
    pub fn get(&self, series: &str) -> Option<&LoadCentroid> {
        self.entries
            .iter()
            .find(|e| e.series == series)
            .and_then(|e| e.centroid.as_ref())
    }

    fn push(&mut self, series: impl Into<String>, centroid: Option<LoadCentroid>) {
        self.entries.push(NamedCentroid {
            series: series.into(),
            centroid,
        });
    }

    /// Log every present centroid as `<floor> <SERIES> = <Fz>kN @ <x>,<y>`
    pub fn log(&self) {
        for entry in &self.entries {
            if let Some(centroid) = &entry.centroid {
                info!("{}", centroid_log_line(&self.floor, &entry.series, centroid));
            }
        }
    }
}

/// `"<floor> <SERIES> = <Fz>kN @ <x>,<y>"` with the series key upper-cased
/// and underscores as spaces
pub fn centroid_log_line(floor: &str, series: &str, centroid: &LoadCentroid) -> String {
    format!(
        "{} {} = {}kN @ {:.3},{:.3}",
        floor,
        series.to_uppercase().replace('_', " "),
        centroid.fz.round(),
        centroid.location.x,
        centroid.location.y
    )
}

fn both<'a>(state: &'a FloorRunState, name: &SeriesName) -> RundownResult<(&'a ReactionSet, &'a ReactionSet)> {
    Ok((
        state.require(SupportType::Columns, name)?,
        state.require(SupportType::Walls, name)?,
    ))
}

fn series_centroid(state: &FloorRunState, name: &SeriesName) -> RundownResult<Option<LoadCentroid>> {
    let (columns, walls) = both(state, name)?;
    Ok(calculate_weighted_centroid(columns, walls))
}

/// Every centroid of one floor pass.
///
/// Floor dead load is `ALL_DEAD` less `TRANSFER_DEAD` (vertical only), so
/// it excludes what was transferred from above.
pub fn floor_centroids(
    state: &FloorRunState,
    has_unreducible: bool,
    factors: &SeismicFactors,
) -> RundownResult<FloorCentroids> {
    let mut result = FloorCentroids {
        floor: state.label().to_string(),
        entries: Vec::new(),
    };

    let (dead_columns, dead_walls) = both(state, &SeriesName::AllDead)?;
    let (transfer_columns, transfer_walls) = both(state, &SeriesName::TransferDead)?;
    let floor_dead_columns = dead_columns
        .combine(transfer_columns, CombineOp::Subtract, 1.0, &[Component::Fz])
        .set;
    let floor_dead_walls = dead_walls
        .combine(transfer_walls, CombineOp::Subtract, 1.0, &[Component::Fz])
        .set;

    let acc_dead = calculate_weighted_centroid(dead_columns, dead_walls);
    let floor_dead = calculate_weighted_centroid(&floor_dead_columns, &floor_dead_walls);
    result.push("Accumulative_ALL_DL", acc_dead);
    result.push("Floor_ALL_DL", floor_dead);
    result.push("Floor_ALL_LL", series_centroid(state, &SeriesName::AllLiveFloor)?);
    result.push("Accumulative_ALL_LL", series_centroid(state, &SeriesName::AllLive)?);

    let acc_llr = series_centroid(state, &SeriesName::AllLiveReducible)?;
    let floor_llr = series_centroid(state, &SeriesName::AllLiveReducibleFloor)?;
    result.push("Accumulative_ALL_LLR", acc_llr);
    result.push("Floor_ALL_LLR", floor_llr);

    let (label, acc_inputs, floor_inputs, multipliers) = if has_unreducible {
        let acc_llur = series_centroid(state, &SeriesName::AllLiveUnreducible)?;
        let floor_llur = series_centroid(state, &SeriesName::AllLiveUnreducibleFloor)?;
        result.push("Accumulative_ALL_LLUR", acc_llur);
        result.push("Floor_ALL_LLUR", floor_llur);
        (
            format!(
                "{}DL_{}LLR_{}LLUR",
                format_factor(factors.dead),
                format_factor(factors.live_reducible),
                format_factor(factors.live_unreducible)
            ),
            vec![acc_dead, acc_llr, acc_llur],
            vec![floor_dead, floor_llr, floor_llur],
            vec![factors.dead, factors.live_reducible, factors.live_unreducible],
        )
    } else {
        (
            format!("{}DL_{}LLR", format_factor(factors.dead), format_factor(factors.live_reducible)),
            vec![acc_dead, acc_llr],
            vec![floor_dead, floor_llr],
            vec![factors.dead, factors.live_reducible],
        )
    };

    for (prefix, inputs) in [("Accumulative", acc_inputs), ("Floor", floor_inputs)] {
        let series = format!("{}_{}", prefix, label);
        let centroid = match weighted_centroid_of_multiple(&inputs, &multipliers) {
            Ok(centroid) => Some(centroid),
            Err(RundownError::ZeroTotalLoad { .. }) => {
                warn!(floor = %result.floor, series = %series, "Seismic combination has zero load");
                None
            }
            Err(e) => return Err(e),
        };
        result.push(series, centroid);
    }

    Ok(result)
}
