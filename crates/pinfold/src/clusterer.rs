#![forbid(unsafe_code)]

//! The clustering orchestrator.
//!
//! Owns the full set of clusters and the markers awaiting placement, owns
//! the configuration, and reacts to viewport-settled notifications from the
//! host map by invalidating and rebuilding affected clusters.
//!
//! # Data flow
//!
//! Caller adds markers -> each is screened against the current viewport ->
//! in-viewport markers are greedily matched to an existing cluster or become
//! the seed of a new one -> cluster redraw decides the visual mode. On a
//! viewport-settled notification the host invokes
//! [`Clusterer::reset_viewport`], which dissolves clusters whose zoom stamp
//! went stale, re-places their members, drains the pending list, and redraws
//! everything in view.
//!
//! # Invariants
//!
//! Every registered marker is in exactly one of {some cluster's members,
//! the pending list} -- never both, never neither, never duplicated. No
//! operation is permitted to break this partition.
//!
//! # Concurrency
//!
//! Single-threaded and event-driven: all mutation happens synchronously
//! inside calls triggered by the caller or by host notifications, which the
//! host delivers serially. The re-clustering pass snapshots the set of
//! affected clusters before any structural mutation, so nothing iterates a
//! collection while removing from it.

use std::fmt;

use tracing::{debug, trace};

use pinfold_core::config::ClustererConfig;
use pinfold_core::geometry::LatLng;
use pinfold_core::map::{
    BadgeId, BadgeRenderer, MapAdapter, Marker, MarkerId, ViewportSubscription,
};

use crate::cluster::{Cluster, ClusterId};
use crate::marker::MarkerEntry;

/// Per-call knobs for [`Clusterer::add_marker_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    /// Suppress the post-placement redraw (batch insertion).
    pub skip_redraw: bool,
    /// Bypass the viewport screen; the marker is placed even if its
    /// position is outside the current bounds.
    pub skip_viewport_check: bool,
    /// Initial placement state, for markers the caller has already attached
    /// to the map. Defaults to not placed.
    pub initial_placed: Option<bool>,
}

/// Identity of a clicked cluster, delivered to the badge-click handler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterHit {
    pub id: ClusterId,
    pub center: LatLng,
    pub size: usize,
}

/// The clustering engine.
///
/// Generic over the host map and the badge renderer; the engine depends on
/// both collaborators, never the other way around.
pub struct Clusterer<M: MapAdapter, B: BadgeRenderer> {
    map: M,
    badges: B,
    config: ClustererConfig,
    clusters: Vec<Cluster>,
    pending: Vec<MarkerEntry>,
    viewport_sub: Option<ViewportSubscription>,
    click_handler: Option<Box<dyn FnMut(ClusterHit)>>,
    next_cluster: u64,
}

impl<M: MapAdapter, B: BadgeRenderer> Clusterer<M, B> {
    /// Create an engine over the given collaborators and subscribe to
    /// viewport-settled notifications. The subscription is cancelled by
    /// [`Clusterer::clear_markers`] or on drop.
    pub fn new(mut map: M, badges: B, config: ClustererConfig) -> Self {
        let sub = map.subscribe_viewport_settled();
        debug!(
            grid_size = config.grid_size(),
            max_zoom = config.max_zoom(),
            tiers = config.styles().len(),
            "clusterer constructed"
        );
        Self {
            map,
            badges,
            config,
            clusters: Vec::new(),
            pending: Vec::new(),
            viewport_sub: Some(sub),
            click_handler: None,
            next_cluster: 0,
        }
    }

    /// Create an engine with the default configuration.
    pub fn with_defaults(map: M, badges: B) -> Self {
        Self::new(map, badges, ClustererConfig::default())
    }

    // --- Insertion -----------------------------------------------------------

    /// Register a marker and place it immediately.
    ///
    /// Markers outside the current viewport are deferred to the pending
    /// list and picked up by the next [`Clusterer::reset_viewport`] whose
    /// viewport covers them.
    pub fn add_marker(&mut self, marker: Marker) {
        self.add_marker_with(marker, AddOptions::default());
    }

    /// Register a marker with explicit placement options.
    pub fn add_marker_with(&mut self, marker: Marker, opts: AddOptions) {
        let entry = MarkerEntry::new(marker, opts.initial_placed.unwrap_or(false));
        self.place(entry, opts.skip_viewport_check, opts.skip_redraw);
    }

    /// Register a batch of markers, then redraw once.
    pub fn add_markers<I: IntoIterator<Item = Marker>>(&mut self, markers: I) {
        for marker in markers {
            self.add_marker_with(
                marker,
                AddOptions {
                    skip_redraw: true,
                    ..AddOptions::default()
                },
            );
        }
        self.redraw_all();
    }

    fn place(&mut self, entry: MarkerEntry, skip_viewport_check: bool, skip_redraw: bool) {
        if !skip_viewport_check && !self.map.bounds().contains(entry.position()) {
            trace!(marker = entry.id().0, "outside viewport, deferred");
            self.pending.push(entry);
            return;
        }
        let idx = assign(
            &self.map,
            &mut self.clusters,
            entry,
            self.config.grid_size(),
            &mut self.next_cluster,
        );
        if !skip_redraw {
            self.clusters[idx].redraw(&mut self.map, &mut self.badges, &self.config, false);
        }
    }

    // --- Removal -------------------------------------------------------------

    /// Remove a marker by identity.
    ///
    /// The first cluster containing it removes it (detaching its visual if
    /// placed) and is redrawn; a cluster emptied by the removal is
    /// destroyed. Returns `false` if no cluster contains the marker.
    /// Markers still on the pending list are not removable by this call.
    pub fn remove_marker(&mut self, id: MarkerId) -> bool {
        self.remove_marker_inner(id, false)
    }

    /// Remove a batch of markers, then redraw once. Returns how many were
    /// found and removed.
    pub fn remove_markers<I: IntoIterator<Item = MarkerId>>(&mut self, ids: I) -> usize {
        let mut removed = 0;
        for id in ids {
            if self.remove_marker_inner(id, true) {
                removed += 1;
            }
        }
        if removed > 0 {
            self.redraw_all();
        }
        removed
    }

    fn remove_marker_inner(&mut self, id: MarkerId, skip_redraw: bool) -> bool {
        let Some(idx) = self.clusters.iter().position(|c| c.contains(id)) else {
            return false;
        };
        self.clusters[idx].remove_marker(id, &mut self.map);
        if self.clusters[idx].is_empty() {
            // Last member gone: the cluster is dead.
            let mut dead = self.clusters.remove(idx);
            dead.clear(&mut self.map);
            trace!(cluster = dead.id().0, "cluster emptied and destroyed");
        } else if !skip_redraw {
            self.clusters[idx].redraw(&mut self.map, &mut self.badges, &self.config, false);
        }
        true
    }

    // --- Viewport invalidation -------------------------------------------------

    /// Rebuild clustering after a completed pan/zoom gesture.
    ///
    /// Clusters intersecting the viewport whose zoom stamp differs from the
    /// current zoom are dissolved; their members are re-placed against each
    /// other only (never against surviving clusters), in reverse collection
    /// order. Previously deferred markers are then re-screened against the
    /// new viewport, and every in-view cluster is redrawn.
    ///
    /// A zoom change rescales the screen-space grid uniformly, so clusters
    /// computed at one zoom are not valid at another; rebuilding only the
    /// affected clusters bounds the cost to what actually changed.
    pub fn reset_viewport(&mut self) {
        let current_zoom = self.map.zoom();
        let bounds = self.map.bounds();
        let grid = self.config.grid_size();

        // Snapshot the stale set before any structural mutation.
        let stale: Vec<usize> = self
            .clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                c.zoom() != current_zoom && c.is_in_bounds(&bounds, &self.map, grid)
            })
            .map(|(i, _)| i)
            .collect();

        // Dissolve in snapshot order; the emptied shells are swept after.
        let mut collected: Vec<MarkerEntry> = Vec::new();
        for &i in &stale {
            collected.extend(self.clusters[i].dissolve(&mut self.map));
        }
        self.clusters.retain(|c| !c.is_empty());

        debug!(
            dissolved = stale.len(),
            markers = collected.len(),
            zoom = current_zoom,
            "re-clustering stale clusters"
        );

        // Re-place the collected markers through a fresh candidate set so
        // they only match against each other. They are known to be near the
        // current view, so the viewport screen is bypassed.
        let mut rebuilt: Vec<Cluster> = Vec::new();
        for entry in collected.into_iter().rev() {
            assign(&self.map, &mut rebuilt, entry, grid, &mut self.next_cluster);
        }
        self.clusters.append(&mut rebuilt);

        // The viewport moved: some deferred markers may now qualify.
        let pending = std::mem::take(&mut self.pending);
        for entry in pending {
            self.place(entry, false, true);
        }

        self.redraw_all();
    }

    /// Redraw every cluster currently in the viewport.
    pub fn redraw_all(&mut self) {
        let Self {
            map,
            badges,
            config,
            clusters,
            ..
        } = self;
        for cluster in clusters.iter_mut() {
            cluster.redraw(map, badges, config, false);
        }
    }

    /// Destroy every cluster, drop the pending markers, and cancel the
    /// viewport subscription.
    pub fn clear_markers(&mut self) {
        debug!(
            clusters = self.clusters.len(),
            pending = self.pending.len(),
            "clearing all markers"
        );
        for cluster in self.clusters.iter_mut() {
            cluster.clear(&mut self.map);
        }
        self.clusters.clear();
        self.pending.clear();
        if let Some(sub) = self.viewport_sub.take() {
            self.map.unsubscribe(sub);
        }
    }

    // --- Badge clicks ----------------------------------------------------------

    /// Register the handler for badge-click notifications.
    pub fn on_badge_click<F: FnMut(ClusterHit) + 'static>(&mut self, handler: F) {
        self.click_handler = Some(Box::new(handler));
    }

    /// Route a host-reported click on a badge to the registered handler.
    /// Returns `false` if no live cluster owns the badge.
    pub fn notify_badge_click(&mut self, badge: BadgeId) -> bool {
        let hit = self
            .clusters
            .iter()
            .find(|c| c.badge() == Some(badge))
            .and_then(|c| {
                Some(ClusterHit {
                    id: c.id(),
                    center: c.center()?,
                    size: c.len(),
                })
            });
        let Some(hit) = hit else {
            return false;
        };
        if let Some(handler) = self.click_handler.as_mut() {
            handler(hit);
        }
        true
    }

    // --- Queries ---------------------------------------------------------------

    /// Clusters whose footprint intersects the current viewport.
    pub fn clusters_in_viewport(&self) -> Vec<&Cluster> {
        let bounds = self.map.bounds();
        let grid = self.config.grid_size();
        self.clusters
            .iter()
            .filter(|c| c.is_in_bounds(&bounds, &self.map, grid))
            .collect()
    }

    /// Total markers across all clusters. Deferred (pending) markers are
    /// not counted; see [`Clusterer::pending_markers`].
    pub fn total_markers(&self) -> usize {
        self.clusters.iter().map(Cluster::len).sum()
    }

    /// Number of live clusters.
    pub fn total_clusters(&self) -> usize {
        self.clusters.len()
    }

    /// Number of markers deferred because they were outside the viewport.
    pub fn pending_markers(&self) -> usize {
        self.pending.len()
    }

    /// Iterate over all live clusters.
    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> + '_ {
        self.clusters.iter()
    }

    /// The membership half-size in pixels.
    pub fn grid_size(&self) -> u32 {
        self.config.grid_size()
    }

    /// The configured max zoom, if any; the host map's maximum applies
    /// otherwise.
    pub fn max_zoom(&self) -> Option<u8> {
        self.config.max_zoom()
    }
}

impl<M: MapAdapter, B: BadgeRenderer> fmt::Debug for Clusterer<M, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clusterer")
            .field("clusters", &self.clusters.len())
            .field("pending", &self.pending.len())
            .field("grid_size", &self.config.grid_size())
            .finish_non_exhaustive()
    }
}

impl<M: MapAdapter, B: BadgeRenderer> Drop for Clusterer<M, B> {
    fn drop(&mut self) {
        if let Some(sub) = self.viewport_sub.take() {
            self.map.unsubscribe(sub);
        }
    }
}

/// Greedy first-fit assignment against a candidate cluster list.
///
/// The list is searched in reverse insertion order for the first cluster
/// whose projected center lies within `grid_size` pixels of the marker on
/// both axes; the first match wins. With no match the marker seeds a new
/// cluster appended to the list. Returns the index of the receiving
/// cluster.
fn assign<M: MapAdapter>(
    map: &M,
    candidates: &mut Vec<Cluster>,
    entry: MarkerEntry,
    grid_size: u32,
    next_cluster: &mut u64,
) -> usize {
    let px = map.project(entry.position());
    let half = f64::from(grid_size);
    let hit = candidates
        .iter()
        .enumerate()
        .rev()
        .find(|(_, c)| {
            c.center()
                .is_some_and(|center| pinfold_core::within_square(map.project(center), px, half))
        })
        .map(|(i, _)| i);

    match hit {
        Some(i) => {
            trace!(marker = entry.id().0, cluster = candidates[i].id().0, "joined");
            candidates[i].add_entry(entry);
            i
        }
        None => {
            let id = ClusterId(*next_cluster);
            *next_cluster += 1;
            trace!(marker = entry.id().0, cluster = id.0, "seeded new cluster");
            let mut cluster = Cluster::new(id, map.zoom());
            cluster.add_entry(entry);
            candidates.push(cluster);
            candidates.len() - 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AddOptions, Clusterer};
    use pinfold_core::config::ClustererConfig;
    use pinfold_core::geometry::LatLng;
    use pinfold_core::map::{BadgeRenderer, MapAdapter, Marker, MarkerId, Overlay};
    use pinfold_harness::{RecordingBadges, ScriptedMap};

    fn engine(map: &ScriptedMap, badges: &RecordingBadges) -> Clusterer<ScriptedMap, RecordingBadges> {
        Clusterer::new(
            map.clone(),
            badges.clone(),
            ClustererConfig::new().with_max_zoom(18),
        )
    }

    fn marker_at_px(map: &ScriptedMap, id: u64, x: f64, y: f64) -> Marker {
        Marker::new(MarkerId(id), map.latlng_at_px(x, y))
    }

    #[test]
    fn nearby_markers_share_a_cluster() {
        let map = ScriptedMap::default_viewport();
        let badges = RecordingBadges::new();
        let mut clusterer = engine(&map, &badges);

        clusterer.add_marker(marker_at_px(&map, 1, 100.0, 100.0));
        clusterer.add_marker(marker_at_px(&map, 2, 110.0, 110.0));
        assert_eq!(clusterer.total_clusters(), 1);
        assert_eq!(clusterer.total_markers(), 2);
    }

    #[test]
    fn square_neighborhood_not_radius() {
        let map = ScriptedMap::default_viewport();
        let badges = RecordingBadges::new();
        let mut clusterer = engine(&map, &badges);

        clusterer.add_marker(marker_at_px(&map, 1, 100.0, 100.0));
        // 40px on both axes: inside the square even though the euclidean
        // distance is ~56.6.
        clusterer.add_marker(marker_at_px(&map, 2, 140.0, 140.0));
        assert_eq!(clusterer.total_clusters(), 1);

        // 41px on one axis: outside.
        clusterer.add_marker(marker_at_px(&map, 3, 141.0, 100.0));
        assert_eq!(clusterer.total_clusters(), 2);
    }

    #[test]
    fn reverse_order_first_fit() {
        let map = ScriptedMap::default_viewport();
        let badges = RecordingBadges::new();
        let mut clusterer = engine(&map, &badges);

        // Two clusters 50px apart; a marker within 40px of both joins the
        // most recently created one.
        clusterer.add_marker(marker_at_px(&map, 1, 100.0, 100.0));
        clusterer.add_marker(marker_at_px(&map, 2, 150.0, 100.0));
        assert_eq!(clusterer.total_clusters(), 2);

        clusterer.add_marker(marker_at_px(&map, 3, 125.0, 100.0));
        assert_eq!(clusterer.total_clusters(), 2);
        let sizes: Vec<usize> = clusterer.clusters().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![1, 2]);
    }

    #[test]
    fn out_of_viewport_markers_are_deferred() {
        let map = ScriptedMap::default_viewport();
        let badges = RecordingBadges::new();
        let mut clusterer = engine(&map, &badges);

        clusterer.add_marker(Marker::new(MarkerId(1), LatLng::new(50.0, 50.0)));
        assert_eq!(clusterer.total_clusters(), 0);
        assert_eq!(clusterer.total_markers(), 0);
        assert_eq!(clusterer.pending_markers(), 1);
    }

    #[test]
    fn skip_viewport_check_places_anyway() {
        let map = ScriptedMap::default_viewport();
        let badges = RecordingBadges::new();
        let mut clusterer = engine(&map, &badges);

        clusterer.add_marker_with(
            Marker::new(MarkerId(1), LatLng::new(50.0, 50.0)),
            AddOptions {
                skip_viewport_check: true,
                ..AddOptions::default()
            },
        );
        assert_eq!(clusterer.total_clusters(), 1);
        assert_eq!(clusterer.pending_markers(), 0);
    }

    #[test]
    fn remove_marker_redraws_and_destroys_empty_clusters() {
        let map = ScriptedMap::default_viewport();
        let badges = RecordingBadges::new();
        let mut clusterer = engine(&map, &badges);

        clusterer.add_marker(marker_at_px(&map, 1, 100.0, 100.0));
        assert!(map.is_attached(Overlay::Marker(MarkerId(1))));

        assert!(clusterer.remove_marker(MarkerId(1)));
        assert_eq!(clusterer.total_clusters(), 0);
        assert!(!map.is_attached(Overlay::Marker(MarkerId(1))));

        // Unknown markers are a no-op result, not a failure.
        assert!(!clusterer.remove_marker(MarkerId(99)));
    }

    #[test]
    fn removal_shrinks_badge_to_individual() {
        let map = ScriptedMap::default_viewport();
        let badges = RecordingBadges::new();
        let mut clusterer = engine(&map, &badges);

        clusterer.add_markers([
            marker_at_px(&map, 1, 100.0, 100.0),
            marker_at_px(&map, 2, 110.0, 110.0),
        ]);
        let badge = clusterer.clusters().next().unwrap().badge().unwrap();
        assert!(!badges.is_hidden(badge));

        clusterer.remove_marker(MarkerId(2));
        // One member left: individual mode, badge hidden.
        assert!(badges.is_hidden(badge));
        assert!(map.is_attached(Overlay::Marker(MarkerId(1))));
    }

    #[test]
    fn batch_add_redraws_once() {
        let map = ScriptedMap::default_viewport();
        let badges = RecordingBadges::new();
        let mut clusterer = engine(&map, &badges);

        clusterer.add_markers((0..5).map(|i| marker_at_px(&map, i, 100.0 + i as f64, 100.0)));
        assert_eq!(clusterer.total_clusters(), 1);
        // One badge, created once, never updated during the batch.
        assert_eq!(badges.created(), 1);
        assert_eq!(badges.records()[0].updates, 0);
        assert_eq!(badges.records()[0].count, 5);
    }

    #[test]
    fn clear_markers_unsubscribes_and_detaches() {
        let map = ScriptedMap::default_viewport();
        let badges = RecordingBadges::new();
        let mut clusterer = engine(&map, &badges);
        assert_eq!(map.active_subscriptions(), 1);

        clusterer.add_markers([
            marker_at_px(&map, 1, 100.0, 100.0),
            marker_at_px(&map, 2, 110.0, 110.0),
            marker_at_px(&map, 3, 500.0, 500.0),
        ]);
        assert!(map.attached_count() > 0);

        clusterer.clear_markers();
        assert_eq!(clusterer.total_clusters(), 0);
        assert_eq!(clusterer.pending_markers(), 0);
        assert_eq!(map.attached_count(), 0);
        assert_eq!(map.active_subscriptions(), 0);
    }

    #[test]
    fn drop_cancels_subscription() {
        let map = ScriptedMap::default_viewport();
        let badges = RecordingBadges::new();
        {
            let _clusterer = engine(&map, &badges);
            assert_eq!(map.active_subscriptions(), 1);
        }
        assert_eq!(map.active_subscriptions(), 0);
    }

    #[test]
    fn badge_click_reports_cluster_identity() {
        let map = ScriptedMap::default_viewport();
        let badges = RecordingBadges::new();
        let mut clusterer = engine(&map, &badges);

        clusterer.add_markers([
            marker_at_px(&map, 1, 100.0, 100.0),
            marker_at_px(&map, 2, 110.0, 110.0),
        ]);
        let cluster = clusterer.clusters().next().unwrap();
        let badge = cluster.badge().unwrap();
        let expected_id = cluster.id();

        let hits = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = hits.clone();
        clusterer.on_badge_click(move |hit| sink.borrow_mut().push(hit));

        assert!(clusterer.notify_badge_click(badge));
        assert!(!clusterer.notify_badge_click(pinfold_core::map::BadgeId(999)));

        let hits = hits.borrow();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, expected_id);
        assert_eq!(hits[0].size, 2);
    }

    #[test]
    fn initial_placed_marker_is_detached_on_aggregate() {
        let map = ScriptedMap::default_viewport();
        let badges = RecordingBadges::new();
        let mut clusterer = engine(&map, &badges);

        // The caller already attached this marker to the map.
        let mut map_handle = map.clone();
        map_handle.attach(Overlay::Marker(MarkerId(1)));
        clusterer.add_marker_with(
            marker_at_px(&map, 1, 100.0, 100.0),
            AddOptions {
                initial_placed: Some(true),
                skip_redraw: true,
                ..AddOptions::default()
            },
        );
        clusterer.add_marker(marker_at_px(&map, 2, 110.0, 110.0));

        // Aggregate mode must retract the pre-placed visual.
        assert!(!map.is_attached(Overlay::Marker(MarkerId(1))));
    }
}
