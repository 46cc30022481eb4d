//! # Plan Geometry
//!
//! Minimal 2D plan geometry in the analysis model's native unit (metres).
//!
//! Supports are matched across floors and load layers by *exact* coordinate
//! identity, so [`PlanCoord`] compares `f64` bit patterns rather than using
//! a tolerance. Two reactions of the same physical support always come from
//! the same element geometry and therefore share identical bits.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A point on plan
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Point2D { x, y }
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

/// A straight line on plan
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LineSegment2D {
    pub start: Point2D,
    pub end: Point2D,
}

impl LineSegment2D {
    pub fn new(start: Point2D, end: Point2D) -> Self {
        LineSegment2D { start, end }
    }

    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }

    pub fn midpoint(&self) -> Point2D {
        Point2D::new((self.start.x + self.end.x) / 2.0, (self.start.y + self.end.y) / 2.0)
    }
}

/// Line of a wall group derived from its centroid, reaction angle and length.
///
/// Endpoints are `centroid ± (length / 2)·(cos θ, sin θ)` with θ in degrees.
///
/// # Example
/// ```
/// use rundown_core::geometry::{wall_line, Point2D};
///
/// let line = wall_line(Point2D::new(5.0, 2.0), 0.0, 4.0);
/// assert_eq!(line.start, Point2D::new(3.0, 2.0));
/// assert_eq!(line.end, Point2D::new(7.0, 2.0));
/// ```
pub fn wall_line(centroid: Point2D, angle_deg: f64, total_length: f64) -> LineSegment2D {
    let theta = angle_deg.to_radians();
    let dx = (total_length / 2.0) * theta.cos();
    let dy = (total_length / 2.0) * theta.sin();
    LineSegment2D::new(
        Point2D::new(centroid.x - dx, centroid.y - dy),
        Point2D::new(centroid.x + dx, centroid.y + dy),
    )
}

/// Exact, hashable plan coordinate used as a support identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlanCoord {
    x: f64,
    y: f64,
}

impl PlanCoord {
    pub fn new(x: f64, y: f64) -> Self {
        // -0.0 and 0.0 are the same support
        PlanCoord {
            x: if x == 0.0 { 0.0 } else { x },
            y: if y == 0.0 { 0.0 } else { y },
        }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn point(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }
}

impl From<Point2D> for PlanCoord {
    fn from(p: Point2D) -> Self {
        PlanCoord::new(p.x, p.y)
    }
}

impl PartialEq for PlanCoord {
    fn eq(&self, other: &Self) -> bool {
        self.x.to_bits() == other.x.to_bits() && self.y.to_bits() == other.y.to_bits()
    }
}

impl Eq for PlanCoord {}

impl Hash for PlanCoord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x.to_bits().hash(state);
        self.y.to_bits().hash(state);
    }
}

impl Ord for PlanCoord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.x
            .total_cmp(&other.x)
            .then_with(|| self.y.total_cmp(&other.y))
    }
}

impl PartialOrd for PlanCoord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PlanCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}
