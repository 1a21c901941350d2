#![forbid(unsafe_code)]

//! Deterministic test doubles for the pinfold collaborator contracts.
//!
//! - [`ScriptedMap`]: a host map with a scriptable viewport and a linear
//!   projection whose pixel distances double per zoom level, exactly like a
//!   standard tile-map projection. Records every attach/detach and
//!   subscription call.
//! - [`RecordingBadges`]: a badge renderer that allocates handles and keeps
//!   the full visual state of every badge it has created.
//!
//! Both doubles are cheap `Rc` handles: clone one, hand a copy to the engine
//! under test, and keep the other to script viewport changes and assert on
//! recorded calls.

use std::cell::RefCell;
use std::rc::Rc;

use pinfold_core::config::BadgeStyle;
use pinfold_core::geometry::{LatLng, LatLngBounds, PixelPoint};
use pinfold_core::map::{
    BadgeId, BadgeRenderer, MapAdapter, Overlay, ViewportSubscription,
};

// ============================================================================
// Scripted host map
// ============================================================================

/// A recorded host-map call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapEvent {
    Attach(Overlay),
    Detach(Overlay),
    Subscribe(ViewportSubscription),
    Unsubscribe(ViewportSubscription),
}

#[derive(Debug)]
struct MapState {
    bounds: LatLngBounds,
    zoom: u8,
    max_zoom: u8,
    attached: Vec<Overlay>,
    events: Vec<MapEvent>,
    active_subs: Vec<ViewportSubscription>,
    next_sub: u64,
}

/// Scriptable [`MapAdapter`] double.
///
/// The projection is viewport-relative with the origin at the viewport's
/// top-left corner and a scale of `2^zoom` pixels per degree, so one degree
/// is 1024 px at zoom 10 and pixel distances double per zoom level.
#[derive(Debug, Clone)]
pub struct ScriptedMap {
    inner: Rc<RefCell<MapState>>,
}

impl ScriptedMap {
    /// Create a map with the given viewport, zoom, and maximum zoom.
    pub fn new(bounds: LatLngBounds, zoom: u8, max_zoom: u8) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MapState {
                bounds,
                zoom,
                max_zoom,
                attached: Vec::new(),
                events: Vec::new(),
                active_subs: Vec::new(),
                next_sub: 0,
            })),
        }
    }

    /// A viewport spanning one degree in each direction around the origin,
    /// at zoom 10 with max zoom 18. Enough room for pixel-scripted markers.
    pub fn default_viewport() -> Self {
        Self::new(
            LatLngBounds::new(LatLng::new(-1.0, -1.0), LatLng::new(1.0, 1.0)),
            10,
            18,
        )
    }

    /// Move the viewport.
    pub fn set_bounds(&self, bounds: LatLngBounds) {
        self.inner.borrow_mut().bounds = bounds;
    }

    /// Change the zoom level. Projection output scales accordingly.
    pub fn set_zoom(&self, zoom: u8) {
        self.inner.borrow_mut().zoom = zoom;
    }

    fn scale(&self) -> f64 {
        f64::powi(2.0, self.inner.borrow().zoom as i32)
    }

    /// Inverse projection: the geographic position currently at pixel
    /// `(x, y)`. Lets tests script marker layouts in pixel space.
    pub fn latlng_at_px(&self, x: f64, y: f64) -> LatLng {
        let s = self.inner.borrow();
        let k = f64::powi(2.0, s.zoom as i32);
        LatLng::new(s.bounds.ne.lat - y / k, s.bounds.sw.lng + x / k)
    }

    /// Whether the overlay is currently attached.
    pub fn is_attached(&self, overlay: Overlay) -> bool {
        self.inner.borrow().attached.contains(&overlay)
    }

    /// Number of currently attached overlays.
    pub fn attached_count(&self) -> usize {
        self.inner.borrow().attached.len()
    }

    /// All recorded calls so far, in order.
    pub fn events(&self) -> Vec<MapEvent> {
        self.inner.borrow().events.clone()
    }

    /// Drain the recorded calls.
    pub fn take_events(&self) -> Vec<MapEvent> {
        std::mem::take(&mut self.inner.borrow_mut().events)
    }

    /// Number of live viewport subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.inner.borrow().active_subs.len()
    }
}

impl MapAdapter for ScriptedMap {
    fn bounds(&self) -> LatLngBounds {
        self.inner.borrow().bounds
    }

    fn zoom(&self) -> u8 {
        self.inner.borrow().zoom
    }

    fn max_zoom(&self) -> u8 {
        self.inner.borrow().max_zoom
    }

    fn project(&self, pos: LatLng) -> PixelPoint {
        let k = self.scale();
        let s = self.inner.borrow();
        PixelPoint::new(
            (pos.lng - s.bounds.sw.lng) * k,
            (s.bounds.ne.lat - pos.lat) * k,
        )
    }

    fn attach(&mut self, overlay: Overlay) {
        let mut s = self.inner.borrow_mut();
        s.events.push(MapEvent::Attach(overlay));
        // Hosts tolerate re-attaching; the attached set stays deduplicated.
        if !s.attached.contains(&overlay) {
            s.attached.push(overlay);
        }
    }

    fn detach(&mut self, overlay: Overlay) {
        let mut s = self.inner.borrow_mut();
        s.events.push(MapEvent::Detach(overlay));
        s.attached.retain(|o| *o != overlay);
    }

    fn subscribe_viewport_settled(&mut self) -> ViewportSubscription {
        let mut s = self.inner.borrow_mut();
        let sub = ViewportSubscription(s.next_sub);
        s.next_sub += 1;
        s.active_subs.push(sub);
        s.events.push(MapEvent::Subscribe(sub));
        sub
    }

    fn unsubscribe(&mut self, sub: ViewportSubscription) {
        let mut s = self.inner.borrow_mut();
        s.active_subs.retain(|a| *a != sub);
        s.events.push(MapEvent::Unsubscribe(sub));
    }
}

// ============================================================================
// Recording badge renderer
// ============================================================================

/// Full visual state of one badge created by [`RecordingBadges`].
#[derive(Debug, Clone, PartialEq)]
pub struct BadgeRecord {
    pub id: BadgeId,
    pub center: LatLng,
    pub count: usize,
    pub image: String,
    pub width: u32,
    pub hidden: bool,
    /// Number of `update_badge` calls received.
    pub updates: u32,
}

#[derive(Debug, Default)]
struct BadgeState {
    next: u64,
    badges: Vec<BadgeRecord>,
}

/// Recording [`BadgeRenderer`] double.
#[derive(Debug, Clone, Default)]
pub struct RecordingBadges {
    inner: Rc<RefCell<BadgeState>>,
}

impl RecordingBadges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total badges ever created.
    pub fn created(&self) -> usize {
        self.inner.borrow().badges.len()
    }

    /// Snapshot of one badge's state.
    pub fn record(&self, id: BadgeId) -> Option<BadgeRecord> {
        self.inner.borrow().badges.iter().find(|b| b.id == id).cloned()
    }

    /// Snapshot of every badge's state.
    pub fn records(&self) -> Vec<BadgeRecord> {
        self.inner.borrow().badges.clone()
    }
}

impl BadgeRenderer for RecordingBadges {
    fn create_badge(&mut self, center: LatLng, count: usize, style: &BadgeStyle) -> BadgeId {
        let mut s = self.inner.borrow_mut();
        let id = BadgeId(s.next);
        s.next += 1;
        s.badges.push(BadgeRecord {
            id,
            center,
            count,
            image: style.image.clone(),
            width: style.width,
            hidden: false,
            updates: 0,
        });
        id
    }

    fn update_badge(&mut self, id: BadgeId, count: usize, style: &BadgeStyle) {
        let mut s = self.inner.borrow_mut();
        if let Some(b) = s.badges.iter_mut().find(|b| b.id == id) {
            b.count = count;
            b.image = style.image.clone();
            b.width = style.width;
            b.updates += 1;
        }
    }

    fn show_badge(&mut self, id: BadgeId) {
        let mut s = self.inner.borrow_mut();
        if let Some(b) = s.badges.iter_mut().find(|b| b.id == id) {
            b.hidden = false;
        }
    }

    fn hide_badge(&mut self, id: BadgeId) {
        let mut s = self.inner.borrow_mut();
        if let Some(b) = s.badges.iter_mut().find(|b| b.id == id) {
            b.hidden = true;
        }
    }

    fn is_hidden(&self, id: BadgeId) -> bool {
        self.inner
            .borrow()
            .badges
            .iter()
            .find(|b| b.id == id)
            .is_some_and(|b| b.hidden)
    }
}
