//! Arena Geometry
//!
//! Axis-aligned square footprints and the overlap/distance tests every
//! other part of the simulation is built on.
//!
//! Positions are the top-left corner of a square, in canvas units.
//! Overlap is strict: squares that only share an edge do not collide.

use serde::{Serialize, Deserialize};

/// A point on the canvas (top-left anchor of an entity).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Point {
    /// Origin.
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new point.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[inline]
    pub fn distance(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Offset by a step in each axis.
    #[inline]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Clamp both axes into `[min, max]`.
    #[inline]
    pub fn clamp(self, min: f64, max: f64) -> Self {
        Self::new(self.x.max(min).min(max), self.y.max(min).min(max))
    }
}

/// Axis-aligned square footprint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Square {
    /// Top-left corner
    pub origin: Point,
    /// Edge length
    pub size: f64,
}

impl Square {
    /// Create a square from its top-left corner and edge length.
    #[inline]
    pub const fn new(x: f64, y: f64, size: f64) -> Self {
        Self { origin: Point::new(x, y), size }
    }

    /// Create a square anchored at a point.
    #[inline]
    pub const fn at(origin: Point, size: f64) -> Self {
        Self { origin, size }
    }

    /// Check overlap with another square.
    #[inline]
    pub fn overlaps(&self, other: &Square) -> bool {
        squares_overlap(
            self.origin.x, self.origin.y, self.size,
            other.origin.x, other.origin.y, other.size,
        )
    }
}

/// Check if two axis-aligned squares overlap.
///
/// `(ax, ay)` / `(bx, by)` are top-left corners.
#[inline]
pub fn squares_overlap(ax: f64, ay: f64, a_size: f64, bx: f64, by: f64, b_size: f64) -> bool {
    ax < bx + b_size
        && ax + a_size > bx
        && ay < by + b_size
        && ay + a_size > by
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squares_overlap() {
        let a = Square::new(0.0, 0.0, 30.0);
        let b = Square::new(20.0, 20.0, 30.0);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));

        // Far apart
        let c = Square::new(100.0, 100.0, 30.0);
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_touching_edges_do_not_overlap() {
        let a = Square::new(0.0, 0.0, 30.0);
        let right = Square::new(30.0, 0.0, 30.0);
        let below = Square::new(0.0, 30.0, 30.0);

        assert!(!a.overlaps(&right));
        assert!(!a.overlaps(&below));
    }

    #[test]
    fn test_containment_overlaps() {
        let big = Square::new(0.0, 0.0, 60.0);
        let small = Square::new(10.0, 10.0, 5.0);
        assert!(big.overlaps(&small));
        assert!(small.overlaps(&big));
    }

    #[test]
    fn test_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance(b), 5.0);
        assert_eq!(b.distance(a), 5.0);
    }

    #[test]
    fn test_clamp() {
        let p = Point::new(-5.0, 900.0).clamp(0.0, 770.0);
        assert_eq!(p, Point::new(0.0, 770.0));
    }
}
