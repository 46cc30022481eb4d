//! Rounding applied when a reaction is written back as a transfer load.
//!
//! Reads are never rounded. Writes are rounded conservatively:
//!
//! | Value            | Forces (`Fx`, `Fy`, `Fz`, `FzPerM`) | Moments (`Mx`, `My`) |
//! |------------------|-------------------------------------|----------------------|
//! | `v < 0`          | `0`                                 | floor to integer     |
//! | `v == 0`         | `0`                                 | `0`                  |
//! | `0 < v < 10`     | ceil to 0.1                         | ceil to 0.1          |
//! | `v >= 10`        | ceil to integer                     | ceil to integer      |

use super::Component;

/// Tolerance on the scaled value so grid values (0.3, 12.0...) are not bumped
/// a step by binary representation error.
const GRID_SNAP: f64 = 1e-9;

fn ceil_to(value: f64, step: f64) -> f64 {
    let scaled = value / step;
    let nearest = scaled.round();
    let steps = if (scaled - nearest).abs() < GRID_SNAP {
        nearest
    } else {
        scaled.ceil()
    };
    if step < 1.0 {
        steps / (1.0 / step).round()
    } else {
        steps * step
    }
}

fn floor_to(value: f64, step: f64) -> f64 {
    let scaled = value / step;
    let nearest = scaled.round();
    let steps = if (scaled - nearest).abs() < GRID_SNAP {
        nearest
    } else {
        scaled.floor()
    };
    if step < 1.0 {
        steps / (1.0 / step).round()
    } else {
        steps * step
    }
}

/// Round a force for writing: negatives clamp to 0, below 10 ceil to 0.1,
/// from 10 ceil to the next integer.
///
/// # Example
/// ```
/// use rundown_core::reactions::rounding::round_force;
///
/// assert_eq!(round_force(-4.0), 0.0);
/// assert_eq!(round_force(3.21), 3.3);
/// assert_eq!(round_force(10.01), 11.0);
/// ```
pub fn round_force(value: f64) -> f64 {
    if value < 0.0 {
        0.0
    } else if value >= 10.0 {
        ceil_to(value, 1.0)
    } else {
        ceil_to(value, 0.1)
    }
}

/// Round a moment for writing.
///
/// Positive moments round up with the force tiers. Non-positive moments
/// round down; they always fall in the `<= 10` tier, so they floor to an
/// integer.
pub fn round_moment(value: f64) -> f64 {
    if value > 0.0 {
        if value >= 10.0 {
            ceil_to(value, 1.0)
        } else {
            ceil_to(value, 0.1)
        }
    } else {
        floor_to(value, 1.0)
    }
}

/// Round a component value with the rule for its kind
pub fn round_component(component: Component, value: f64) -> f64 {
    if component.is_moment() {
        round_moment(value)
    } else {
        round_force(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_force_negative_clamps_to_zero() {
        assert_eq!(round_force(-0.01), 0.0);
        assert_eq!(round_force(-250.0), 0.0);
    }

    #[test]
    fn test_force_small_rounds_up_to_tenth() {
        assert_abs_diff_eq!(round_force(0.01), 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(round_force(9.91), 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(round_force(0.3), 0.3, epsilon = 1e-12);
        assert_eq!(round_force(0.0), 0.0);
    }

    #[test]
    fn test_force_large_rounds_up_to_integer() {
        assert_eq!(round_force(10.0), 10.0);
        assert_eq!(round_force(100.2), 101.0);
        assert_eq!(round_force(12.0), 12.0);
    }

    #[test]
    fn test_force_property_over_range() {
        let mut v = -20.0;
        while v < 40.0 {
            let r = round_force(v);
            assert!(r >= 0.0);
            if v < 0.0 {
                assert_eq!(r, 0.0);
            } else if v < 10.0 {
                assert!(r >= v - 1e-9, "{} -> {}", v, r);
                assert_abs_diff_eq!((r * 10.0).round(), r * 10.0, epsilon = 1e-9);
            } else {
                assert!(r >= v - 1e-9);
                assert_eq!(r.fract(), 0.0);
            }
            v += 0.37;
        }
    }

    #[test]
    fn test_moment_positive_rounds_up() {
        assert_abs_diff_eq!(round_moment(2.34), 2.4, epsilon = 1e-12);
        assert_eq!(round_moment(15.2), 16.0);
    }

    #[test]
    fn test_moment_non_positive_rounds_down() {
        assert_eq!(round_moment(0.0), 0.0);
        assert_eq!(round_moment(-0.25), -1.0);
        assert_eq!(round_moment(-12.34), -13.0);
        assert_eq!(round_moment(-3.0), -3.0);
    }

    #[test]
    fn test_moment_property_over_range() {
        let mut v = -30.0;
        while v < 30.0 {
            let r = round_moment(v);
            if v > 0.0 {
                assert!(r >= v - 1e-9);
            } else {
                assert!(r <= v + 1e-9);
            }
            v += 0.41;
        }
    }

    #[test]
    fn test_round_component_dispatch() {
        assert_eq!(round_component(Component::Mx, -2.5), -3.0);
        assert_eq!(round_component(Component::Fx, -2.5), 0.0);
        assert_eq!(round_component(Component::FzPerM, 33.3), 34.0);
    }
}
