#![forbid(unsafe_code)]

//! The shared marker/placement record.

use pinfold_core::geometry::LatLng;
use pinfold_core::map::{Marker, MarkerId};

/// A caller-owned marker together with its placement state.
///
/// `placed` tracks whether the underlying visual marker is currently
/// attached to the map, as opposed to being represented only by its
/// cluster's aggregate badge. An entry is owned by exactly one cluster at a
/// time, or by the pending list while its position is outside the viewport;
/// ownership transfers during dissolution and re-placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerEntry {
    marker: Marker,
    placed: bool,
}

impl MarkerEntry {
    /// Wrap a caller-owned marker with an initial placement state.
    #[inline]
    pub(crate) const fn new(marker: Marker, placed: bool) -> Self {
        Self { marker, placed }
    }

    /// The marker's identity.
    #[inline]
    pub fn id(&self) -> MarkerId {
        self.marker.id
    }

    /// The marker's geographic position.
    #[inline]
    pub fn position(&self) -> LatLng {
        self.marker.position
    }

    /// The underlying caller-owned record.
    #[inline]
    pub fn marker(&self) -> Marker {
        self.marker
    }

    /// Whether the visual marker is currently attached to the map.
    #[inline]
    pub fn is_placed(&self) -> bool {
        self.placed
    }

    #[inline]
    pub(crate) fn set_placed(&mut self, placed: bool) {
        self.placed = placed;
    }
}

#[cfg(test)]
mod tests {
    use super::MarkerEntry;
    use pinfold_core::geometry::LatLng;
    use pinfold_core::map::{Marker, MarkerId};

    #[test]
    fn entry_tracks_placement() {
        let mut entry = MarkerEntry::new(Marker::new(MarkerId(7), LatLng::new(1.0, 2.0)), false);
        assert_eq!(entry.id(), MarkerId(7));
        assert!(!entry.is_placed());
        entry.set_placed(true);
        assert!(entry.is_placed());
    }
}
