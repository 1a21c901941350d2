#![forbid(unsafe_code)]

//! Clusterer configuration and badge style tiers.
//!
//! Validation here is defensive rather than exception-driven: a rejected
//! value is logged and the default retained, so a misconfigured caller gets
//! a working engine instead of a panic. The one eager check is
//! [`ClustererConfig::validate_tier_coverage`], which reports an
//! under-provisioned style table at configuration time instead of letting it
//! surface on first render.

use std::fmt;

use tracing::warn;

/// Default membership half-size in pixels.
pub const DEFAULT_GRID_SIZE: u32 = 40;

/// Visual description of one aggregate-badge size tier.
///
/// Tier 0 of the configured sequence is the smallest-count tier. The engine
/// resolves a member count to a tier with [`style_tier`] and hands the
/// resolved style to the badge renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeStyle {
    /// Reference to the badge image (URL, sprite key, asset id...).
    pub image: String,
    /// Rendered width in pixels.
    pub width: u32,
    /// Rendered height in pixels.
    pub height: u32,
    /// Count label color; renderer default when `None`.
    pub text_color: Option<String>,
    /// Anchor offset from the badge's natural anchor point, in pixels.
    pub anchor: Option<(i32, i32)>,
}

impl BadgeStyle {
    /// Create a style with just an image and square-ish dimensions.
    pub fn new(image: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            image: image.into(),
            width,
            height,
            text_color: None,
            anchor: None,
        }
    }

    /// Set the count label color.
    #[must_use]
    pub fn with_text_color(mut self, color: impl Into<String>) -> Self {
        self.text_color = Some(color.into());
        self
    }

    /// Set the anchor offset.
    #[must_use]
    pub fn with_anchor(mut self, x: i32, y: i32) -> Self {
        self.anchor = Some((x, y));
        self
    }
}

/// The five built-in badge tiers.
pub fn default_styles() -> Vec<BadgeStyle> {
    const SIZES: [u32; 5] = [53, 56, 66, 78, 90];
    SIZES
        .iter()
        .enumerate()
        .map(|(i, &size)| BadgeStyle::new(format!("m{}.png", i + 1), size, size))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration errors surfaced by eager validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The style table has fewer tiers than the expected maximum cluster
    /// size requires, so large clusters would all share the top tier.
    TierCoverage {
        /// Tiers required to cover the expected maximum count.
        required: usize,
        /// Tiers actually configured.
        provided: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TierCoverage { required, provided } => write!(
                f,
                "style table covers {provided} tier(s) but the expected maximum \
                 cluster size requires {required}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Engine configuration accepted at construction.
///
/// Fields are private so rejected values can fall back to defaults; use the
/// builder methods.
#[derive(Debug, Clone, PartialEq)]
pub struct ClustererConfig {
    grid_size: u32,
    max_zoom: Option<u8>,
    styles: Vec<BadgeStyle>,
}

impl Default for ClustererConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            max_zoom: None,
            styles: default_styles(),
        }
    }
}

impl ClustererConfig {
    /// Default configuration: 40px grid, host max zoom, built-in tiers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the membership half-size in pixels. Zero is rejected and the
    /// default retained.
    #[must_use]
    pub fn with_grid_size(mut self, px: u32) -> Self {
        if px == 0 {
            warn!(grid_size = px, "ignoring non-positive grid size, keeping default");
        } else {
            self.grid_size = px;
        }
        self
    }

    /// Set the zoom level at or above which clusters always expand into
    /// individual markers. `None` means use the host map's maximum.
    #[must_use]
    pub fn with_max_zoom(mut self, zoom: u8) -> Self {
        self.max_zoom = Some(zoom);
        self
    }

    /// Replace the badge style tiers. An empty table is rejected and the
    /// built-in tiers retained.
    #[must_use]
    pub fn with_styles(mut self, styles: Vec<BadgeStyle>) -> Self {
        if styles.is_empty() {
            warn!("ignoring empty badge style table, keeping built-in tiers");
        } else {
            self.styles = styles;
        }
        self
    }

    /// Membership half-size in pixels (always > 0).
    #[inline]
    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// Configured max zoom, if any.
    #[inline]
    pub fn max_zoom(&self) -> Option<u8> {
        self.max_zoom
    }

    /// The configured style tiers (never empty).
    #[inline]
    pub fn styles(&self) -> &[BadgeStyle] {
        &self.styles
    }

    /// Resolve a member count to its badge style.
    pub fn style_for_count(&self, count: usize) -> &BadgeStyle {
        let tier = style_tier(count, self.styles.len());
        &self.styles[tier - 1]
    }

    /// Eagerly check that the style table covers the expected maximum
    /// cluster size, so tier exhaustion is reported at configuration time
    /// rather than silently collapsing large counts onto the top tier.
    pub fn validate_tier_coverage(&self, expected_max_count: usize) -> Result<(), ConfigError> {
        let required = decimal_digits(expected_max_count);
        let provided = self.styles.len();
        if required > provided {
            return Err(ConfigError::TierCoverage { required, provided });
        }
        Ok(())
    }
}

/// Select the 1-based style tier for a member count.
///
/// The tier is the number of decimal digits in the count (1-9 -> 1,
/// 10-99 -> 2, ...), clamped to `[1, tiers]`. Counts of zero clamp to tier 1
/// rather than underflowing the digit arithmetic.
pub fn style_tier(count: usize, tiers: usize) -> usize {
    debug_assert!(tiers > 0, "style table must not be empty");
    decimal_digits(count).clamp(1, tiers)
}

fn decimal_digits(n: usize) -> usize {
    n.max(1).ilog10() as usize + 1
}
