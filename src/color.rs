//! Card colors: hex parsing, lightness classification and the derived theme.
//!
//! Everything the renderer paints on top of the card background is chosen
//! from a [`Theme`], and a theme is a function of a single boolean: whether
//! the background is light. Front and back therefore always agree.

use palette::Srgb;

/// Luminance above which a background counts as light.
pub const LIGHT_THRESHOLD: f32 = 0.7;

// ============================================================================
// Paint
// ============================================================================

/// An sRGB color with a separate straight alpha.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint {
    pub color: Srgb<u8>,
    pub alpha: f32,
}

impl Paint {
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const BLACK: Self = Self::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            color: Srgb::new(r, g, b),
            alpha: 1.0,
        }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, alpha: f32) -> Self {
        Self {
            color: Srgb::new(r, g, b),
            alpha,
        }
    }

    /// Parses `#rgb` / `#rrggbb` into an opaque paint.
    pub fn from_hex(hex: &str) -> Option<Self> {
        parse_hex(hex).map(|color| Self { color, alpha: 1.0 })
    }

    /// Returns a copy with the given alpha.
    pub fn with_alpha(self, alpha: f32) -> Self {
        Self { alpha, ..self }
    }

    /// `#rrggbb`, ignoring alpha.
    pub fn hex(&self) -> String {
        format!(
            "#{:02x}{:02x}{:02x}",
            self.color.red, self.color.green, self.color.blue
        )
    }

    /// CSS `rgba(...)` notation.
    pub fn css(&self) -> String {
        format!(
            "rgba({}, {}, {}, {})",
            self.color.red, self.color.green, self.color.blue, self.alpha
        )
    }

    /// SVG presentation attributes for a fill, e.g. `fill="#000000" fill-opacity="0.08"`.
    pub fn svg_fill(&self) -> String {
        self.svg_attrs("fill")
    }

    /// SVG presentation attributes for a stroke.
    pub fn svg_stroke(&self) -> String {
        self.svg_attrs("stroke")
    }

    fn svg_attrs(&self, attr: &str) -> String {
        if self.alpha >= 1.0 {
            format!("{attr}=\"{}\"", self.hex())
        } else {
            format!("{attr}=\"{}\" {attr}-opacity=\"{}\"", self.hex(), self.alpha)
        }
    }
}

// ============================================================================
// Lightness
// ============================================================================

/// Parses a hex color. Accepts an optional leading `#`, surrounding
/// whitespace, and the three-digit shorthand.
pub fn parse_hex(hex: &str) -> Option<Srgb<u8>> {
    let digits = hex.trim().trim_start_matches('#').trim();
    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 => digits.to_string(),
        _ => return None,
    };
    if !expanded.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
    Some(Srgb::new(channel(0)?, channel(2)?, channel(4)?))
}

/// Broadcast luma of a color, normalized to `[0, 1]`.
pub fn luminance(color: Srgb<u8>) -> f32 {
    let c: Srgb<f32> = color.into_format();
    0.299 * c.red + 0.587 * c.green + 0.114 * c.blue
}

/// Returns true when the background is light enough to need dark text.
///
/// Malformed input is treated as dark.
pub fn is_light(hex: &str) -> bool {
    parse_hex(hex).is_some_and(|c| luminance(c) > LIGHT_THRESHOLD)
}

// ============================================================================
// Theme
// ============================================================================

/// The paints used on top of the card background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    pub primary_text: Paint,
    pub secondary_text: Paint,
    pub border: Paint,
    pub accent_surface: Paint,
    pub tile_surface: Paint,
    pub tile_text: Paint,
    pub empty_slot_border: Paint,
    pub empty_slot_text: Paint,
}

impl Theme {
    /// Dark text on a light card.
    pub const LIGHT: Self = Self {
        primary_text: Paint::rgb(0x0f, 0x17, 0x2a),
        secondary_text: Paint::rgb(0x33, 0x41, 0x55),
        border: Paint::rgba(0, 0, 0, 0.1),
        accent_surface: Paint::rgba(0, 0, 0, 0.1),
        tile_surface: Paint::rgba(0, 0, 0, 0.05),
        tile_text: Paint::rgb(0x1e, 0x29, 0x3b),
        empty_slot_border: Paint::rgba(0, 0, 0, 0.2),
        empty_slot_text: Paint::rgb(0x47, 0x55, 0x69),
    };

    /// Light text on a dark card.
    pub const DARK: Self = Self {
        primary_text: Paint::WHITE,
        secondary_text: Paint::rgba(255, 255, 255, 0.8),
        border: Paint::rgba(255, 255, 255, 0.2),
        accent_surface: Paint::rgba(255, 255, 255, 0.15),
        tile_surface: Paint::rgba(255, 255, 255, 0.15),
        tile_text: Paint::WHITE,
        empty_slot_border: Paint::rgba(255, 255, 255, 0.3),
        empty_slot_text: Paint::rgba(255, 255, 255, 0.6),
    };

    pub fn for_background(background_is_light: bool) -> Self {
        if background_is_light {
            Self::LIGHT
        } else {
            Self::DARK
        }
    }

    /// Whether this theme uses the dark-text palette.
    pub fn has_dark_text(&self) -> bool {
        luminance(self.primary_text.color) < 0.5
    }
}
