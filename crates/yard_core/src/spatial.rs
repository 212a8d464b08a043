//! Planar yard geometry: distances, travel times and fence intersection tests.
//!
//! Coordinates are meters in the terminal's local frame, speeds are meters per
//! second, and every duration handed to the scheduler is integer simulation
//! milliseconds.

use serde::{Deserialize, Serialize};

use crate::clock::ONE_SEC_MS;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// True when `other` is within `threshold` meters of this point.
    pub fn is_within(self, other: Point, threshold: f64) -> bool {
        self.distance_to(other) <= threshold
    }
}

/// Travel time for `distance_m` at `speed_mps`, rounded to whole milliseconds.
///
/// Returns `None` for a non-positive or non-finite speed, or when the result
/// does not fit in a `u64`; a zero distance is always reachable in zero time.
pub fn travel_time_ms(distance_m: f64, speed_mps: f64) -> Option<u64> {
    if !distance_m.is_finite() || !speed_mps.is_finite() || speed_mps <= 0.0 {
        return None;
    }
    if distance_m <= 0.0 {
        return Some(0);
    }
    let ms = (distance_m / speed_mps * ONE_SEC_MS as f64).round();
    if ms >= u64::MAX as f64 {
        return None;
    }
    Some(ms as u64)
}

/// Moves `step_m` meters from `from` toward `to`, never overshooting `to`.
pub fn advance_towards(from: Point, to: Point, step_m: f64) -> Point {
    let remaining = from.distance_to(to);
    if step_m <= 0.0 {
        return from;
    }
    if remaining <= step_m || remaining <= f64::EPSILON {
        return to;
    }
    let ratio = step_m / remaining;
    Point::new(from.x + (to.x - from.x) * ratio, from.y + (to.y - from.y) * ratio)
}

/// Shortest distance from `p` to the closed segment `a`–`b`.
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f64::EPSILON {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance_to(Point::new(a.x + t * dx, a.y + t * dy))
}

/// True when any point of the segment `a`–`b` lies inside the circle.
pub fn segment_enters_circle(a: Point, b: Point, center: Point, radius: f64) -> bool {
    distance_to_segment(center, a, b) <= radius
}
