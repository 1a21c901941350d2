#![forbid(unsafe_code)]

//! Pinfold: a grid-based, viewport-sensitive marker clustering engine.
//!
//! Groups a large set of geographic point markers into visually manageable
//! clusters on an interactive tile map, re-clusters as the viewport pans
//! and zooms, and toggles each cluster between an aggregate count badge and
//! individual markers depending on zoom level and cluster size.
//!
//! The engine is generic over two collaborators, defined in
//! [`pinfold_core`]: a [`MapAdapter`] (viewport, zoom, projection,
//! attach/detach) and a [`BadgeRenderer`] (the aggregate badge visual).
//! Clustering is greedy and order-dependent: each in-viewport marker joins
//! the most recently created cluster whose center lies within the grid
//! half-size on both axes, or seeds a new cluster fixing its own position
//! as the center.
//!
//! ```ignore
//! use pinfold::{Clusterer, ClustererConfig};
//!
//! let mut clusterer = Clusterer::new(map, badges, ClustererConfig::new().with_max_zoom(17));
//! clusterer.add_markers(markers);
//! // ...host fires a viewport-settled notification...
//! clusterer.reset_viewport();
//! ```

pub mod cluster;
pub mod clusterer;
pub mod marker;

pub use cluster::{Cluster, ClusterId};
pub use clusterer::{AddOptions, ClusterHit, Clusterer};
pub use marker::MarkerEntry;

// Re-export the shared primitives so callers need only one crate.
pub use pinfold_core::config::{BadgeStyle, ClustererConfig, ConfigError, DEFAULT_GRID_SIZE};
pub use pinfold_core::geometry::{LatLng, LatLngBounds, PixelBounds, PixelPoint};
pub use pinfold_core::map::{
    BadgeId, BadgeRenderer, MapAdapter, Marker, MarkerId, Overlay, ViewportSubscription,
};
