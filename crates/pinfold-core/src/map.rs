#![forbid(unsafe_code)]

//! Collaborator contracts.
//!
//! The engine depends on two external collaborators, seen only through
//! these traits:
//!
//! - [`MapAdapter`]: the host map widget — viewport bounds, zoom, the
//!   point-to-pixel projection, and the attach/detach overlay primitives.
//! - [`BadgeRenderer`]: the visual representation of the aggregate count
//!   badge.
//!
//! # Event delivery
//!
//! Viewport-settled notifications are modeled as an explicit subscription:
//! the engine calls [`MapAdapter::subscribe_viewport_settled`] at
//! construction and cancels the returned token at teardown. Delivery itself
//! is host-driven and synchronous — while a subscription is active, the host
//! invokes the engine's `reset_viewport` once per completed pan/zoom
//! gesture. There is no ambient global event bus.

use crate::config::BadgeStyle;
use crate::geometry::{LatLng, LatLngBounds, PixelPoint};

/// Caller-allocated identity of a point marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerId(pub u64);

/// Renderer-allocated identity of an aggregate badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BadgeId(pub u64);

/// Token for an active viewport-settled subscription.
///
/// Returned by [`MapAdapter::subscribe_viewport_settled`]; passing it back
/// to [`MapAdapter::unsubscribe`] cancels delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportSubscription(pub u64);

/// A caller-owned point marker: identity plus geographic position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub id: MarkerId,
    pub position: LatLng,
}

impl Marker {
    /// Create a marker record.
    #[inline]
    pub const fn new(id: MarkerId, position: LatLng) -> Self {
        Self { id, position }
    }
}

/// Anything the engine can attach to or detach from the host map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Overlay {
    /// A caller-owned individual marker.
    Marker(MarkerId),
    /// An aggregate count badge.
    Badge(BadgeId),
}

/// The host map widget, as seen by the engine.
///
/// `project` is viewport-relative: its output changes whenever the map pans
/// or zooms, and pixel distances double per zoom level.
pub trait MapAdapter {
    /// Current visible bounds.
    fn bounds(&self) -> LatLngBounds;

    /// Current zoom level.
    fn zoom(&self) -> u8;

    /// The map's maximum zoom level.
    fn max_zoom(&self) -> u8;

    /// Project a geographic position to viewport-relative pixel space.
    fn project(&self, pos: LatLng) -> PixelPoint;

    /// Attach an overlay to the map.
    fn attach(&mut self, overlay: Overlay);

    /// Detach an overlay from the map.
    fn detach(&mut self, overlay: Overlay);

    /// Subscribe to viewport-settled notifications (one per completed
    /// pan/zoom gesture).
    fn subscribe_viewport_settled(&mut self) -> ViewportSubscription;

    /// Cancel a viewport-settled subscription.
    fn unsubscribe(&mut self, sub: ViewportSubscription);
}

/// The aggregate-badge visual collaborator.
///
/// The engine resolves the style tier to a concrete [`BadgeStyle`] before
/// calling in; the renderer never consults the tier table itself.
pub trait BadgeRenderer {
    /// Create a badge for `count` members at `center`. The returned handle
    /// is attached to the map by the engine via [`MapAdapter::attach`].
    fn create_badge(&mut self, center: LatLng, count: usize, style: &BadgeStyle) -> BadgeId;

    /// Update an existing badge's count and style.
    fn update_badge(&mut self, id: BadgeId, count: usize, style: &BadgeStyle);

    /// Make a hidden badge visible again.
    fn show_badge(&mut self, id: BadgeId);

    /// Hide a badge without destroying it.
    fn hide_badge(&mut self, id: BadgeId);

    /// Whether the badge is currently hidden.
    fn is_hidden(&self, id: BadgeId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::{BadgeId, Marker, MarkerId, Overlay};
    use crate::geometry::LatLng;

    #[test]
    fn overlay_identity() {
        assert_eq!(Overlay::Marker(MarkerId(3)), Overlay::Marker(MarkerId(3)));
        assert_ne!(Overlay::Marker(MarkerId(3)), Overlay::Badge(BadgeId(3)));
    }

    #[test]
    fn marker_carries_position() {
        let m = Marker::new(MarkerId(1), LatLng::new(52.5, 13.4));
        assert_eq!(m.id, MarkerId(1));
        assert_eq!(m.position.lat, 52.5);
    }
}
