#![forbid(unsafe_code)]

//! Shared primitives for the pinfold marker clusterer.
//!
//! This crate holds everything the engine and its collaborators agree on:
//! geometry in both coordinate spaces, the collaborator contracts
//! ([`MapAdapter`], [`BadgeRenderer`]), and the typed, validated
//! configuration. It has no dependency on the engine itself.

pub mod config;
pub mod geometry;
pub mod map;

pub use config::{BadgeStyle, ClustererConfig, ConfigError, DEFAULT_GRID_SIZE, style_tier};
pub use geometry::{LatLng, LatLngBounds, PixelBounds, PixelPoint, within_square};
pub use map::{
    BadgeId, BadgeRenderer, MapAdapter, Marker, MarkerId, Overlay, ViewportSubscription,
};
