//! Support reactions and reaction-set algebra
//!
//! A [`ReactionSet`] holds one reaction per support for one
//! (support type, load layer) pair on one floor. Sets are snapshots: every
//! operation here returns a new set and never mutates its inputs.
//!
//! # Overview
//!
//! - [`SupportType`] - Columns or wall groups
//! - [`Component`] - Reaction components (`Fx`, `Fy`, `Fz`, `Mx`, `My`, `FzPerM`)
//! - [`LocationKey`] - Exact geometric identity of a support
//! - [`Reaction`] - One support's reaction on one layer
//! - [`ReactionSet`] - Keyed collection with [`ReactionSet::combine`]
//! - [`weighted_sum`] - Load-weighted centroid over several sets
//!
//! # Example
//!
//! ```
//! use rundown_core::geometry::Point2D;
//! use rundown_core::reactions::{Reaction, ReactionSet, SupportType};
//!
//! let mut dead = ReactionSet::new(SupportType::Columns);
//! dead.insert(Reaction::column(Point2D::new(0.0, 0.0)).with_fz(100.0));
//!
//! let mut live = ReactionSet::new(SupportType::Columns);
//! live.insert(Reaction::column(Point2D::new(0.0, 0.0)).with_fz(50.0));
//!
//! let total = dead.sum(&live);
//! assert_eq!(total.set.total_fz(), 150.0);
//! assert_eq!(total.unmatched, 0);
//! ```

pub mod rounding;
pub mod series;

pub use series::{derive_composites, SeriesName};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::centroid::LoadCentroid;
use crate::errors::{RundownError, RundownResult};
use crate::geometry::{LineSegment2D, PlanCoord, Point2D};

/// Kind of support a reaction belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SupportType {
    /// Columns below the floor
    Columns,
    /// Wall element groups below the floor
    Walls,
}

impl SupportType {
    pub const ALL: [SupportType; 2] = [SupportType::Columns, SupportType::Walls];

    pub fn code(&self) -> &'static str {
        match self {
            SupportType::Columns => "COLUMNS",
            SupportType::Walls => "WALLS",
        }
    }
}

impl fmt::Display for SupportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A reaction component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    /// Horizontal force along plan x
    Fx,
    /// Horizontal force along plan y
    Fy,
    /// Vertical force (kN)
    Fz,
    /// Moment about plan x
    Mx,
    /// Moment about plan y
    My,
    /// Vertical force per metre of wall (kN/m)
    FzPerM,
}

impl Component {
    pub const ALL: [Component; 6] = [
        Component::Fx,
        Component::Fy,
        Component::Fz,
        Component::Mx,
        Component::My,
        Component::FzPerM,
    ];

    /// Components touched when accumulating loads down the building
    pub const VERTICAL: [Component; 2] = [Component::Fz, Component::FzPerM];

    /// Moments round down when non-positive; forces clamp at zero
    pub fn is_moment(&self) -> bool {
        matches!(self, Component::Mx | Component::My)
    }

    pub fn code(&self) -> &'static str {
        match self {
            Component::Fx => "Fx",
            Component::Fy => "Fy",
            Component::Fz => "Fz",
            Component::Mx => "Mx",
            Component::My => "My",
            Component::FzPerM => "Fz_per_m",
        }
    }
}

/// Exact identity of a support on plan.
///
/// Columns are keyed by their plan location; wall groups by both endpoints
/// of their derived line, so geometry and not just the centroid is identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LocationKey {
    Column(PlanCoord),
    Wall(PlanCoord, PlanCoord),
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationKey::Column(p) => write!(f, "{}", p),
            LocationKey::Wall(a, b) => write!(f, "{}-{}", a, b),
        }
    }
}

/// Where a reaction acts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SupportGeometry {
    Column { location: Point2D },
    Wall { line: LineSegment2D, centroid: Point2D },
}

impl SupportGeometry {
    pub fn key(&self) -> LocationKey {
        match self {
            SupportGeometry::Column { location } => LocationKey::Column((*location).into()),
            SupportGeometry::Wall { line, .. } => LocationKey::Wall(line.start.into(), line.end.into()),
        }
    }

    /// Point at which the reaction's load is lumped for centroid purposes
    pub fn load_point(&self) -> Point2D {
        match self {
            SupportGeometry::Column { location } => *location,
            SupportGeometry::Wall { centroid, .. } => *centroid,
        }
    }

    pub fn support_type(&self) -> SupportType {
        match self {
            SupportGeometry::Column { .. } => SupportType::Columns,
            SupportGeometry::Wall { .. } => SupportType::Walls,
        }
    }
}

/// One support's reaction on one load layer.
///
/// Force components in kN, moments in kN·m. Wall groups additionally carry
/// `fz_per_m`, the total vertical reaction spread over the group length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub geometry: SupportGeometry,

    /// Element name reported by the engine, when it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub fx: f64,
    #[serde(default)]
    pub fy: f64,
    #[serde(default)]
    pub fz: f64,
    #[serde(default)]
    pub mx: f64,
    #[serde(default)]
    pub my: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fz_per_m: Option<f64>,
}

impl Reaction {
    /// Zero reaction of a column at `location`
    pub fn column(location: Point2D) -> Self {
        Reaction {
            geometry: SupportGeometry::Column { location },
            name: None,
            fx: 0.0,
            fy: 0.0,
            fz: 0.0,
            mx: 0.0,
            my: 0.0,
            fz_per_m: None,
        }
    }

    /// Zero reaction of a wall group along `line`
    pub fn wall(line: LineSegment2D, centroid: Point2D) -> Self {
        Reaction {
            geometry: SupportGeometry::Wall { line, centroid },
            name: None,
            fx: 0.0,
            fy: 0.0,
            fz: 0.0,
            mx: 0.0,
            my: 0.0,
            fz_per_m: Some(0.0),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set Fz (and Fz per metre for walls) and return self (builder pattern)
    pub fn with_fz(mut self, fz: f64) -> Self {
        self.fz = fz;
        if let SupportGeometry::Wall { line, .. } = self.geometry {
            let length = line.length();
            self.fz_per_m = Some(if length > 0.0 { fz / length } else { 0.0 });
        }
        self
    }

    /// Set any component and return self (builder pattern)
    pub fn with(mut self, component: Component, value: f64) -> Self {
        self.set(component, value);
        self
    }

    pub fn key(&self) -> LocationKey {
        self.geometry.key()
    }

    /// Component value; a missing `fz_per_m` reads as 0
    pub fn get(&self, component: Component) -> f64 {
        match component {
            Component::Fx => self.fx,
            Component::Fy => self.fy,
            Component::Fz => self.fz,
            Component::Mx => self.mx,
            Component::My => self.my,
            Component::FzPerM => self.fz_per_m.unwrap_or(0.0),
        }
    }

    pub fn set(&mut self, component: Component, value: f64) {
        match component {
            Component::Fx => self.fx = value,
            Component::Fy => self.fy = value,
            Component::Fz => self.fz = value,
            Component::Mx => self.mx = value,
            Component::My => self.my = value,
            Component::FzPerM => self.fz_per_m = Some(value),
        }
    }
}

/// Operation applied by [`ReactionSet::combine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombineOp {
    Add,
    Subtract,
}

impl CombineOp {
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            CombineOp::Add => a + b,
            CombineOp::Subtract => a - b,
        }
    }
}

/// Result of combining two sets
#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub set: ReactionSet,

    /// Keys of the right-hand set with no match in the left-hand set.
    /// Their reactions were not carried into `set`.
    pub unmatched: usize,
}

/// All reactions of one support type for one load layer on one floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ReactionSetRepr", from = "ReactionSetRepr")]
pub struct ReactionSet {
    support_type: SupportType,
    entries: BTreeMap<LocationKey, Reaction>,
}

#[derive(Serialize, Deserialize)]
struct ReactionSetRepr {
    support_type: SupportType,
    reactions: Vec<Reaction>,
}

impl From<ReactionSet> for ReactionSetRepr {
    fn from(set: ReactionSet) -> Self {
        ReactionSetRepr {
            support_type: set.support_type,
            reactions: set.entries.into_values().collect(),
        }
    }
}

impl From<ReactionSetRepr> for ReactionSet {
    fn from(repr: ReactionSetRepr) -> Self {
        let mut set = ReactionSet::new(repr.support_type);
        for reaction in repr.reactions {
            set.insert(reaction);
        }
        set
    }
}

impl ReactionSet {
    pub fn new(support_type: SupportType) -> Self {
        ReactionSet {
            support_type,
            entries: BTreeMap::new(),
        }
    }

    pub fn support_type(&self) -> SupportType {
        self.support_type
    }

    /// Insert a reaction under its own location key, replacing any previous one
    pub fn insert(&mut self, reaction: Reaction) -> Option<Reaction> {
        debug_assert_eq!(reaction.geometry.support_type(), self.support_type);
        self.entries.insert(reaction.key(), reaction)
    }

    pub fn get(&self, key: &LocationKey) -> Option<&Reaction> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &LocationKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LocationKey, &Reaction)> {
        self.entries.iter()
    }

    pub fn reactions(&self) -> impl Iterator<Item = &Reaction> {
        self.entries.values()
    }

    /// Sum of Fz over all supports
    pub fn total_fz(&self) -> f64 {
        self.entries.values().map(|r| r.fz).sum()
    }

    /// Combine `other` into a copy of `self`.
    ///
    /// For every key of `other` present in `self`, each requested component
    /// becomes `op(self, other * factor)`. Keys of `other` missing from
    /// `self` are not added; they are counted in [`Combination::unmatched`].
    /// `FzPerM` is only updated where `self` already carries it.
    pub fn combine(&self, other: &ReactionSet, op: CombineOp, factor: f64, components: &[Component]) -> Combination {
        let mut set = self.clone();
        let mut unmatched = 0;

        for (key, rhs) in &other.entries {
            let Some(lhs) = set.entries.get_mut(key) else {
                unmatched += 1;
                continue;
            };
            for component in components {
                if *component == Component::FzPerM && lhs.fz_per_m.is_none() {
                    continue;
                }
                let value = op.apply(lhs.get(*component), rhs.get(*component) * factor);
                lhs.set(*component, value);
            }
        }

        Combination { set, unmatched }
    }

    /// Accumulate vertical load: `Fz` and `FzPerM` of `other` added to `self`
    pub fn sum(&self, other: &ReactionSet) -> Combination {
        self.combine(other, CombineOp::Add, 1.0, &Component::VERTICAL)
    }

    /// Remove `other` from `self` across every component
    pub fn difference(&self, other: &ReactionSet) -> Combination {
        self.combine(other, CombineOp::Subtract, 1.0, &Component::ALL)
    }
}

/// Load-weighted centroid over several sets with scalar multipliers.
///
/// Total load is `Σ Fz·m`; the centroid is `Σ Fz·m·p / total` where `p` is
/// the column location or the wall group centroid.
///
/// # Errors
///
/// * `InvalidSetting` - `sets` and `multipliers` differ in length
/// * `ZeroTotalLoad` - the weighted total is exactly zero
pub fn weighted_sum(sets: &[&ReactionSet], multipliers: &[f64]) -> RundownResult<LoadCentroid> {
    if sets.len() != multipliers.len() {
        return Err(RundownError::invalid_setting(
            "multipliers",
            multipliers.len().to_string(),
            format!("expected one multiplier per reaction set ({})", sets.len()),
        ));
    }

    let mut total = 0.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    for (set, multiplier) in sets.iter().zip(multipliers) {
        for reaction in set.reactions() {
            let load = reaction.fz * multiplier;
            let p = reaction.geometry.load_point();
            total += load;
            sum_x += load * p.x;
            sum_y += load * p.y;
        }
    }

    if total == 0.0 {
        return Err(RundownError::zero_total_load("weighted reaction sum"));
    }

    Ok(LoadCentroid {
        fz: total,
        location: Point2D::new(sum_x / total, sum_y / total),
    })
}
