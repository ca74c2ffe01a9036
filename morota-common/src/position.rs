use serde::{Deserialize, Serialize};

/// A point in the 2D simulation space (`space.width` x `space.height`).
///
/// Distances are plain Euclidean; the simulation space has no obstacles or
/// topology beyond the bounding rectangle named in the scenario config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// x coordinate.
    pub x: f64,
    /// y coordinate.
    pub y: f64,
}

/// Below this distance, two positions are treated as coincident. Guards
/// against floating-point motion overshoot/undershoot as described in
/// §4.2's edge cases ("numerical guard `|v| < 1e-8`").
pub const EPS: f64 = 1e-8;

impl Position {
    /// Construct a position.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Move `self` towards `target` by up to `max_dist`, returning the
    /// actual distance traveled. If `max_dist` covers the remaining
    /// distance (within [`EPS`]), `self` lands exactly on `target`.
    pub fn step_towards(&mut self, target: &Position, max_dist: f64) -> f64 {
        let dist = self.distance_to(target);
        if dist < EPS {
            return 0.0;
        }
        if max_dist >= dist {
            *self = *target;
            return dist;
        }
        if max_dist <= 0.0 {
            return 0.0;
        }
        let frac = max_dist / dist;
        self.x += (target.x - self.x) * frac;
        self.y += (target.y - self.y) * frac;
        max_dist
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert_eq!(a.distance_to(&b), 5.0);
    }

    #[test]
    fn step_towards_reaches_target_exactly() {
        let mut p = Position::new(0.0, 0.0);
        let target = Position::new(1.0, 0.0);
        let used = p.step_towards(&target, 5.0);
        assert_eq!(used, 1.0);
        assert_eq!(p, target);
    }

    #[test]
    fn step_towards_partial_move() {
        let mut p = Position::new(0.0, 0.0);
        let target = Position::new(10.0, 0.0);
        let used = p.step_towards(&target, 4.0);
        assert_eq!(used, 4.0);
        assert_eq!(p, Position::new(4.0, 0.0));
    }

    #[test]
    fn step_towards_within_eps_is_noop() {
        let mut p = Position::new(1.0, 1.0);
        let target = Position::new(1.0 + 1e-10, 1.0);
        let used = p.step_towards(&target, 10.0);
        assert_eq!(used, 0.0);
    }
}
