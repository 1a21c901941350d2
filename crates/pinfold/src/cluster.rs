#![forbid(unsafe_code)]

//! A single cluster: an ordered set of member markers sharing one fixed
//! display anchor and one zoom stamp.
//!
//! # Invariants
//!
//! 1. `center` is `None` iff `members` is empty.
//! 2. A cluster with exactly one member is always drawn individually, never
//!    as a badge.
//! 3. `zoom` is meaningful only while `members` is non-empty; an empty
//!    cluster is dead and must not be considered a placement candidate.
//! 4. `zoom` changes only inside [`Cluster::redraw`].
//!
//! A cluster holds no reference to the collaborators; the owning clusterer
//! passes them into each method, so the dependency points strictly from the
//! engine to the host map and never back.

use smallvec::SmallVec;
use tracing::trace;

use pinfold_core::config::ClustererConfig;
use pinfold_core::geometry::{LatLng, LatLngBounds, PixelBounds};
use pinfold_core::map::{BadgeId, BadgeRenderer, MapAdapter, Marker, MarkerId, Overlay};

use crate::marker::MarkerEntry;

/// Engine-allocated cluster identity, carried by badge-click notifications.
///
/// Identities are not stable across zoom changes: re-clustering dissolves a
/// stale cluster and allocates fresh ids for its replacements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterId(pub u64);

pub(crate) type MemberVec = SmallVec<[MarkerEntry; 8]>;

/// A group of markers with a fixed center and a zoom stamp.
#[derive(Debug, Clone)]
pub struct Cluster {
    id: ClusterId,
    center: Option<LatLng>,
    members: MemberVec,
    zoom: u8,
    badge: Option<BadgeId>,
}

impl Cluster {
    /// Create an empty cluster stamped with the current zoom.
    ///
    /// The first marker added fixes the center. A cluster emptied by
    /// [`Cluster::dissolve`] or [`Cluster::clear`] keeps its stale center
    /// and must be destroyed, not reused.
    pub(crate) fn new(id: ClusterId, zoom: u8) -> Self {
        Self {
            id,
            center: None,
            members: SmallVec::new(),
            zoom,
            badge: None,
        }
    }

    /// Append a member. The first member fixes the center forever; it is
    /// never recomputed as membership changes.
    pub(crate) fn add_entry(&mut self, entry: MarkerEntry) {
        if self.center.is_none() {
            self.center = Some(entry.position());
        }
        self.members.push(entry);
    }

    /// Remove a member by identity, detaching its visual if placed.
    /// Returns whether a removal occurred.
    pub(crate) fn remove_marker<M: MapAdapter>(&mut self, id: MarkerId, map: &mut M) -> bool {
        let Some(idx) = self.members.iter().position(|e| e.id() == id) else {
            return false;
        };
        let entry = self.members.remove(idx);
        if entry.is_placed() {
            map.detach(Overlay::Marker(id));
        }
        true
    }

    /// Tear down the cluster's visual state and take its members.
    ///
    /// Detaches the badge and every placed member, tagging each member as
    /// not placed so its visual state is rebuilt on the next placement. The
    /// shell left behind is empty and must be destroyed.
    pub(crate) fn dissolve<M: MapAdapter>(&mut self, map: &mut M) -> MemberVec {
        if let Some(badge) = self.badge.take() {
            map.detach(Overlay::Badge(badge));
        }
        let mut members = std::mem::take(&mut self.members);
        for entry in members.iter_mut() {
            if entry.is_placed() {
                map.detach(Overlay::Marker(entry.id()));
                entry.set_placed(false);
            }
        }
        members
    }

    /// Tear down the cluster's visual state and drop its members.
    pub(crate) fn clear<M: MapAdapter>(&mut self, map: &mut M) {
        let _ = self.dissolve(map);
    }

    /// Whether the cluster's square footprint intersects the given bounds.
    ///
    /// Both are compared in pixel space at the map's current zoom. If the
    /// cluster was last drawn at a different zoom, its half-size is rescaled
    /// by `2^(current - stamped)`: pixel distances double per zoom level, so
    /// the grid size must follow to keep the test consistent across zoom
    /// changes. An empty cluster is never in bounds.
    pub(crate) fn is_in_bounds<M: MapAdapter>(
        &self,
        bounds: &LatLngBounds,
        map: &M,
        grid_size: u32,
    ) -> bool {
        let Some(center) = self.center else {
            return false;
        };
        let zoom_diff = i32::from(map.zoom()) - i32::from(self.zoom);
        let half = f64::from(grid_size) * f64::powi(2.0, zoom_diff);
        let footprint = PixelBounds::square(map.project(center), half);
        let view = PixelBounds::from_corners(map.project(bounds.sw), map.project(bounds.ne));
        footprint.intersects(&view)
    }

    /// Re-evaluate the display mode and bring the visual state in line.
    ///
    /// Skips entirely when not forced and out of the viewport. Otherwise
    /// stamps the current zoom and picks one of two modes:
    ///
    /// - **Individual** (at or above max zoom, or exactly one member):
    ///   every member's visual marker is attached and any badge hidden.
    /// - **Aggregate** (otherwise): every placed member is detached and the
    ///   badge created or updated for the current member count.
    ///
    /// There is no stored mode flag; the mode is recomputed on every call,
    /// so a redraw with unchanged membership and zoom is a no-op on the
    /// visual layer.
    pub(crate) fn redraw<M: MapAdapter, B: BadgeRenderer>(
        &mut self,
        map: &mut M,
        badges: &mut B,
        config: &ClustererConfig,
        force: bool,
    ) {
        if self.members.is_empty() {
            return;
        }
        if !force && !self.is_in_bounds(&map.bounds(), map, config.grid_size()) {
            return;
        }

        // The only place the zoom stamp changes.
        self.zoom = map.zoom();

        let max_zoom = config.max_zoom().unwrap_or_else(|| map.max_zoom());
        let individual = self.zoom >= max_zoom || self.members.len() == 1;
        trace!(
            cluster = self.id.0,
            members = self.members.len(),
            zoom = self.zoom,
            individual,
            "redraw"
        );

        if individual {
            for entry in self.members.iter_mut() {
                if !entry.is_placed() {
                    map.attach(Overlay::Marker(entry.id()));
                    entry.set_placed(true);
                }
            }
            if let Some(badge) = self.badge {
                badges.hide_badge(badge);
            }
        } else {
            for entry in self.members.iter_mut() {
                if entry.is_placed() {
                    map.detach(Overlay::Marker(entry.id()));
                    entry.set_placed(false);
                }
            }
            let count = self.members.len();
            let style = config.style_for_count(count);
            match self.badge {
                None => {
                    let Some(center) = self.center else {
                        return;
                    };
                    let badge = badges.create_badge(center, count, style);
                    map.attach(Overlay::Badge(badge));
                    self.badge = Some(badge);
                }
                Some(badge) => {
                    badges.update_badge(badge, count, style);
                    if badges.is_hidden(badge) {
                        badges.show_badge(badge);
                    }
                }
            }
        }
    }

    // --- Queries -----------------------------------------------------------

    /// Cluster identity.
    #[inline]
    pub fn id(&self) -> ClusterId {
        self.id
    }

    /// The fixed display anchor; `None` only while empty.
    #[inline]
    pub fn center(&self) -> Option<LatLng> {
        self.center
    }

    /// The zoom level active when the cluster was last drawn.
    #[inline]
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Member count.
    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the cluster is dead.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The aggregate badge handle, present only in aggregate display mode
    /// (possibly hidden after shrinking back to individual mode).
    #[inline]
    pub fn badge(&self) -> Option<BadgeId> {
        self.badge
    }

    /// Whether a marker is a member.
    pub fn contains(&self, id: MarkerId) -> bool {
        self.members.iter().any(|e| e.id() == id)
    }

    /// Iterate over the member markers.
    pub fn markers(&self) -> impl Iterator<Item = Marker> + '_ {
        self.members.iter().map(MarkerEntry::marker)
    }

    /// Iterate over the member entries, placement state included.
    pub fn entries(&self) -> impl Iterator<Item = &MarkerEntry> + '_ {
        self.members.iter()
    }
}
