//! Property-based invariant tests for pixel-space geometry.
//!
//! These tests verify structural invariants that must hold for any valid
//! inputs:
//!
//! 1. Intersection is commutative.
//! 2. A box intersects itself.
//! 3. `from_corners` normalizes: min <= max on both axes.
//! 4. A square footprint always contains (and intersects around) its center.
//! 5. `within_square` is symmetric and agrees with the square footprint.
//! 6. Geographic containment agrees with edge ordering for non-wrapping
//!    bounds.

use pinfold_core::geometry::{LatLng, LatLngBounds, PixelBounds, PixelPoint, within_square};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

// Integer-valued coordinates keep every comparison in the properties exact:
// pixel sums stay far below 2^53, so no rounding can blur a boundary.
fn point_strategy() -> impl Strategy<Value = PixelPoint> {
    (-1_000_000i32..1_000_000, -1_000_000i32..1_000_000)
        .prop_map(|(x, y)| PixelPoint::new(f64::from(x), f64::from(y)))
}

fn half_strategy() -> impl Strategy<Value = f64> {
    (0u32..10_000).prop_map(f64::from)
}

fn bounds_strategy() -> impl Strategy<Value = PixelBounds> {
    (point_strategy(), point_strategy()).prop_map(|(a, b)| PixelBounds::from_corners(a, b))
}

proptest! {
    #[test]
    fn intersection_commutative(a in bounds_strategy(), b in bounds_strategy()) {
        prop_assert_eq!(a.intersects(&b), b.intersects(&a));
    }

    #[test]
    fn box_intersects_itself(a in bounds_strategy()) {
        prop_assert!(a.intersects(&a));
    }

    #[test]
    fn from_corners_normalizes(a in point_strategy(), b in point_strategy()) {
        let r = PixelBounds::from_corners(a, b);
        prop_assert!(r.min_x <= r.max_x);
        prop_assert!(r.min_y <= r.max_y);
    }

    #[test]
    fn square_contains_center(c in point_strategy(), half in half_strategy()) {
        let sq = PixelBounds::square(c, half);
        prop_assert!(sq.contains(c));
        prop_assert!(sq.intersects(&PixelBounds::square(c, 0.0)));
    }

    #[test]
    fn within_square_symmetric(a in point_strategy(), b in point_strategy(), half in half_strategy()) {
        prop_assert_eq!(within_square(a, b, half), within_square(b, a, half));
    }

    #[test]
    fn within_square_agrees_with_footprint(a in point_strategy(), b in point_strategy(), half in half_strategy()) {
        // b is within the square neighborhood of a iff a's square footprint
        // contains b.
        let sq = PixelBounds::square(a, half);
        prop_assert_eq!(within_square(a, b, half), sq.contains(b));
    }

    #[test]
    fn geo_contains_requires_edge_ordering(
        lat in -85.0f64..85.0,
        lng in -180.0f64..180.0,
        south in -85.0f64..85.0,
        north in -85.0f64..85.0,
        west in -180.0f64..180.0,
        east in -180.0f64..180.0,
    ) {
        prop_assume!(west <= east);
        let b = LatLngBounds::new(LatLng::new(south, west), LatLng::new(north, east));
        let inside = b.contains(LatLng::new(lat, lng));
        let expected = lat >= south && lat <= north && lng >= west && lng <= east;
        prop_assert_eq!(inside, expected);
    }
}
