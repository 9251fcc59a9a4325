//! Underprint pattern generation.
//!
//! [`generate`] maps a [`PatternKind`], the background lightness and a scale
//! factor to a [`PatternDescriptor`]: one tile of SVG markup plus the tile
//! size, and an equivalent CSS background for web front ends. The function is
//! pure, so descriptors can be memoized on their inputs (see [`PatternCache`]).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize};

use crate::color::Paint;

/// Smallest scale applied to a tile. Lower values are raised to this.
pub const MIN_SCALE: f32 = 0.1;

/// Overlay used on light backgrounds.
pub const LIGHT_OVERLAY: Paint = Paint::rgba(0, 0, 0, 0.08);

/// Overlay used on dark backgrounds.
pub const DARK_OVERLAY: Paint = Paint::rgba(255, 255, 255, 0.12);

const STAR_POINTS: &str = "40,8 48,30 72,30 52,44 59,66 40,52 21,66 28,44 8,30 32,30";
const ZIGZAG_POINTS: &str = "0,30 10,10 20,30 30,10 40,30 50,10 60,30 70,10 80,30";
const WAVE_PATHS: [(&str, f32); 2] = [
    ("M0 30 Q 15 5 30 30 T 60 30 T 90 30 T 120 30", 1.0),
    ("M0 45 Q 15 20 30 45 T 60 45 T 90 45 T 120 45", 0.5),
];

// ============================================================================
// PatternKind
// ============================================================================

/// The closed set of underprint patterns.
///
/// Deserializing never fails on an unknown string: it becomes
/// [`PatternKind::None`], like [`PatternKind::parse_or_none`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum PatternKind {
    #[default]
    None,
    Stars,
    Grid,
    Dots,
    Stripes,
    Triangles,
    Waves,
    Zigzag,
}

impl PatternKind {
    pub const ALL: [PatternKind; 8] = [
        Self::None,
        Self::Stars,
        Self::Grid,
        Self::Dots,
        Self::Stripes,
        Self::Triangles,
        Self::Waves,
        Self::Zigzag,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Stars => "stars",
            Self::Grid => "grid",
            Self::Dots => "dots",
            Self::Stripes => "stripes",
            Self::Triangles => "triangles",
            Self::Waves => "waves",
            Self::Zigzag => "zigzag",
        }
    }

    /// Human-readable label for pickers.
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Stars => "Stars",
            Self::Grid => "Grid",
            Self::Dots => "Dots",
            Self::Stripes => "Stripes",
            Self::Triangles => "Triangles",
            Self::Waves => "Waves",
            Self::Zigzag => "Zigzag",
        }
    }

    /// Unscaled tile size in CSS pixels.
    pub fn base_size(&self) -> (f32, f32) {
        match self {
            Self::None => (0.0, 0.0),
            Self::Stars => (60.0, 60.0),
            Self::Grid | Self::Dots => (30.0, 30.0),
            Self::Stripes => (18.0, 18.0),
            Self::Triangles => (40.0, 40.0),
            Self::Waves => (80.0, 40.0),
            Self::Zigzag => (60.0, 30.0),
        }
    }

    /// Parses an identifier, failing closed to [`PatternKind::None`].
    pub fn parse_or_none(id: &str) -> Self {
        id.parse().unwrap_or_default()
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PatternKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        Ok(Self::parse_or_none(&id))
    }
}

impl FromStr for PatternKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "stars" => Ok(Self::Stars),
            "grid" => Ok(Self::Grid),
            "dots" | "circles" => Ok(Self::Dots),
            "stripes" | "diagonal" => Ok(Self::Stripes),
            "triangles" => Ok(Self::Triangles),
            "waves" => Ok(Self::Waves),
            "zigzag" => Ok(Self::Zigzag),
            _ => Err(()),
        }
    }
}

// ============================================================================
// PatternDescriptor
// ============================================================================

/// CSS rendition of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssBackground {
    pub image: String,
    pub size: Option<String>,
    pub position: Option<String>,
}

impl CssBackground {
    /// Inline style declarations, e.g. for a `style=""` attribute.
    pub fn declarations(&self) -> String {
        let mut out = format!("background-image: {};", self.image);
        if let Some(size) = &self.size {
            out.push_str(&format!(" background-size: {size};"));
        }
        if let Some(position) = &self.position {
            out.push_str(&format!(" background-position: {position};"));
        }
        out
    }
}

/// One repeatable tile of a pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternTile {
    pub kind: PatternKind,
    pub overlay: Paint,
    pub width: f32,
    pub height: f32,
    /// Rotation of the whole tiling, in degrees.
    pub rotation: f32,
    /// SVG elements in tile coordinates (`0..width`, `0..height`).
    pub markup: String,
    pub css: CssBackground,
}

/// Output of [`generate`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PatternDescriptor {
    #[default]
    Empty,
    Tiled(PatternTile),
}

impl PatternDescriptor {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn tile(&self) -> Option<&PatternTile> {
        match self {
            Self::Empty => None,
            Self::Tiled(tile) => Some(tile),
        }
    }

    /// Tile size in CSS pixels, `None` for the empty descriptor.
    pub fn tile_size(&self) -> Option<(f32, f32)> {
        self.tile().map(|t| (t.width, t.height))
    }

    /// An SVG `<pattern>` definition with the given id.
    pub fn svg_definition(&self, id: &str) -> Option<String> {
        let tile = self.tile()?;
        let transform = if tile.rotation != 0.0 {
            format!(" patternTransform=\"rotate({})\"", num(tile.rotation))
        } else {
            String::new()
        };
        Some(format!(
            "<pattern id=\"{id}\" patternUnits=\"userSpaceOnUse\" width=\"{}\" height=\"{}\"{transform}>{}</pattern>",
            num(tile.width),
            num(tile.height),
            tile.markup
        ))
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Builds the descriptor for a pattern.
///
/// `scale` is raised to [`MIN_SCALE`] before being applied to the tile.
pub fn generate(kind: PatternKind, background_is_light: bool, scale: f32) -> PatternDescriptor {
    let overlay = if background_is_light {
        LIGHT_OVERLAY
    } else {
        DARK_OVERLAY
    };
    let scale = if scale.is_finite() {
        scale.max(MIN_SCALE)
    } else {
        1.0
    };
    let (base_w, base_h) = kind.base_size();
    let (w, h) = (base_w * scale, base_h * scale);
    let fill = overlay.svg_fill();
    let stroke = overlay.svg_stroke();
    let c = overlay.css();

    let (markup, rotation, css) = match kind {
        PatternKind::None => return PatternDescriptor::Empty,
        PatternKind::Stars => {
            let art = format!("<polygon points=\"{STAR_POINTS}\" {fill}/>");
            let css = CssBackground {
                image: svg_url(80.0, 80.0, &art),
                size: Some(size_px(w, h)),
                position: None,
            };
            (scaled_group(w / 80.0, &art), 0.0, css)
        }
        PatternKind::Grid => {
            let markup = format!(
                "<rect x=\"0\" y=\"{}\" width=\"{}\" height=\"1\" {fill}/><rect x=\"0\" y=\"0\" width=\"1\" height=\"{}\" {fill}/>",
                num(h - 1.0),
                num(w),
                num(h)
            );
            let css = CssBackground {
                image: format!(
                    "linear-gradient(0deg, {c} 1px, transparent 1px), linear-gradient(90deg, {c} 1px, transparent 1px)"
                ),
                size: Some(size_px(w, h)),
                position: None,
            };
            (markup, 0.0, css)
        }
        PatternKind::Dots => {
            // 25% of the farthest-corner ellipse.
            let (rx, ry) = (0.25 * w / 2.0 * SQRT_2, 0.25 * h / 2.0 * SQRT_2);
            let centers = [(w / 2.0, h / 2.0), (0.0, 0.0), (w, 0.0), (0.0, h), (w, h)];
            let markup: String = centers
                .iter()
                .map(|(cx, cy)| {
                    format!(
                        "<ellipse cx=\"{}\" cy=\"{}\" rx=\"{}\" ry=\"{}\" {fill}/>",
                        num(*cx),
                        num(*cy),
                        num(rx),
                        num(ry)
                    )
                })
                .collect();
            let css = CssBackground {
                image: format!(
                    "radial-gradient({c} 25%, transparent 26%), radial-gradient({c} 25%, transparent 26%)"
                ),
                size: Some(size_px(w, h)),
                position: Some(format!("0 0, {}px {}px", num(w / 2.0), num(h / 2.0))),
            };
            (markup, 0.0, css)
        }
        PatternKind::Stripes => {
            let band = 6.0 * scale;
            let markup = format!(
                "<rect x=\"0\" y=\"0\" width=\"{}\" height=\"{}\" {fill}/>",
                num(band),
                num(h)
            );
            let css = CssBackground {
                image: format!(
                    "repeating-linear-gradient(135deg, {c}, {c} {b}px, transparent {b}px, transparent {p}px)",
                    b = num(band),
                    p = num(w)
                ),
                size: None,
                position: None,
            };
            (markup, 45.0, css)
        }
        PatternKind::Triangles => {
            let markup = triangle_markup(w, h, &fill);
            let css = CssBackground {
                image: format!(
                    "linear-gradient(150deg, {c} 25%, transparent 25%), linear-gradient(210deg, {c} 25%, transparent 25%)"
                ),
                size: Some(size_px(w, h)),
                position: Some(format!("0 0, {}px {}px", num(w / 2.0), num(h / 2.0))),
            };
            (markup, 0.0, css)
        }
        PatternKind::Waves => {
            let art: String = WAVE_PATHS
                .iter()
                .map(|(d, opacity)| {
                    let opacity = if *opacity < 1.0 {
                        format!(" opacity=\"{}\"", num(*opacity))
                    } else {
                        String::new()
                    };
                    format!("<path d=\"{d}\" {stroke} stroke-width=\"4\" fill=\"none\"{opacity}/>")
                })
                .collect();
            let css = CssBackground {
                image: svg_url(120.0, 60.0, &art),
                size: Some(size_px(w, h)),
                position: None,
            };
            (scaled_group(w / 120.0, &art), 0.0, css)
        }
        PatternKind::Zigzag => {
            let art = format!(
                "<polyline points=\"{ZIGZAG_POINTS}\" {stroke} stroke-width=\"4\" fill=\"none\"/>"
            );
            let css = CssBackground {
                image: svg_url(80.0, 40.0, &art),
                size: Some(size_px(w, h)),
                position: None,
            };
            (scaled_group(w / 80.0, &art), 0.0, css)
        }
    };

    PatternDescriptor::Tiled(PatternTile {
        kind,
        overlay,
        width: w,
        height: h,
        rotation,
        markup,
        css,
    })
}

const SQRT_2: f32 = std::f32::consts::SQRT_2;

/// Corner wedges of a 150° and a 210° gradient, the second layer shifted by
/// half a tile. Each wedge covers the first quarter of its gradient line.
fn triangle_markup(w: f32, h: f32, fill: &str) -> String {
    let (sin, cos) = (0.5_f32, 0.75_f32.sqrt());
    let quarter = 0.25 * (w * sin + h * cos);
    let run = quarter / sin;
    let drop = quarter / cos;

    let mut wedges = vec![[(0.0, 0.0), (run, 0.0), (0.0, drop)]];
    for dx in [0.0, w] {
        let (x, y) = (w / 2.0 + dx, h / 2.0);
        wedges.push([(x, y), (x - run, y), (x, y + drop)]);
    }

    wedges
        .iter()
        .map(|pts| {
            let points: Vec<String> = pts
                .iter()
                .map(|(x, y)| format!("{},{}", num(*x), num(*y)))
                .collect();
            format!("<polygon points=\"{}\" {fill}/>", points.join(" "))
        })
        .collect()
}

fn scaled_group(factor: f32, art: &str) -> String {
    format!("<g transform=\"scale({})\">{art}</g>", num(factor))
}

fn svg_url(width: f32, height: f32, art: &str) -> String {
    let svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">{art}</svg>",
        w = num(width),
        h = num(height)
    );
    format!("url(\"data:image/svg+xml;base64,{}\")", STANDARD.encode(svg))
}

fn size_px(w: f32, h: f32) -> String {
    format!("{}px {}px", num(w), num(h))
}

/// Formats a coordinate with at most three decimals and no trailing zeros.
pub(crate) fn num(v: f32) -> String {
    let s = format!("{:.3}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

// ============================================================================
// Memoization
// ============================================================================

/// Key for memoized descriptors. The scale is keyed by its bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternKey {
    kind: PatternKind,
    light: bool,
    scale_bits: u32,
}

impl PatternKey {
    pub fn new(kind: PatternKind, light: bool, scale: f32) -> Self {
        Self {
            kind,
            light,
            scale_bits: scale.to_bits(),
        }
    }
}

/// Memoizes [`generate`] results.
///
/// Sound only because `generate` is pure.
#[derive(Debug, Default)]
pub struct PatternCache {
    entries: HashMap<PatternKey, PatternDescriptor>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, kind: PatternKind, light: bool, scale: f32) -> &PatternDescriptor {
        self.entries
            .entry(PatternKey::new(kind, light, scale))
            .or_insert_with(|| generate(kind, light, scale))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_empty() {
        assert!(generate(PatternKind::None, true, 1.0).is_empty());
        assert!(generate(PatternKind::None, false, 3.0).svg_definition("p").is_none());
    }

    #[test]
    fn unknown_ids_fail_closed() {
        assert_eq!(PatternKind::parse_or_none("hexagons"), PatternKind::None);
        assert_eq!(PatternKind::parse_or_none(""), PatternKind::None);
        assert!(generate(PatternKind::parse_or_none("plaid"), true, 1.0).is_empty());
    }

    #[test]
    fn legacy_aliases() {
        assert_eq!(PatternKind::parse_or_none("circles"), PatternKind::Dots);
        assert_eq!(PatternKind::parse_or_none("Diagonal"), PatternKind::Stripes);
        let kind: PatternKind = serde_json::from_str("\"circles\"").unwrap();
        assert_eq!(kind, PatternKind::Dots);
    }

    #[test]
    fn unknown_ids_deserialize_to_none() {
        let kind: PatternKind = serde_json::from_str("\"plaid\"").unwrap();
        assert_eq!(kind, PatternKind::None);
        assert_eq!(serde_json::to_string(&PatternKind::Waves).unwrap(), "\"waves\"");
    }

    #[test]
    fn overlay_follows_lightness() {
        let light = generate(PatternKind::Grid, true, 1.0);
        let dark = generate(PatternKind::Grid, false, 1.0);
        assert_eq!(light.tile().unwrap().overlay, LIGHT_OVERLAY);
        assert_eq!(dark.tile().unwrap().overlay, DARK_OVERLAY);
        assert!(light.tile().unwrap().css.image.contains("rgba(0, 0, 0, 0.08)"));
        assert!(dark.tile().unwrap().css.image.contains("rgba(255, 255, 255, 0.12)"));
    }

    #[test]
    fn base_tile_sizes() {
        let cases = [
            (PatternKind::Stars, (60.0, 60.0)),
            (PatternKind::Grid, (30.0, 30.0)),
            (PatternKind::Dots, (30.0, 30.0)),
            (PatternKind::Triangles, (40.0, 40.0)),
            (PatternKind::Waves, (80.0, 40.0)),
            (PatternKind::Zigzag, (60.0, 30.0)),
            (PatternKind::Stripes, (18.0, 18.0)),
        ];
        for (kind, size) in cases {
            assert_eq!(generate(kind, false, 1.0).tile_size(), Some(size), "{kind}");
        }
    }

    #[test]
    fn tiles_scale_linearly() {
        for kind in PatternKind::ALL.into_iter().filter(|k| *k != PatternKind::None) {
            let (bw, bh) = kind.base_size();
            for s in [0.1, 0.5, 1.0, 1.75, 3.0] {
                let (w, h) = generate(kind, true, s).tile_size().unwrap();
                assert!((w - bw * s).abs() < 1e-4, "{kind} at {s}");
                assert!((h - bh * s).abs() < 1e-4, "{kind} at {s}");
            }
        }
    }

    #[test]
    fn scale_below_floor_matches_floor() {
        for kind in PatternKind::ALL {
            let floor = generate(kind, false, MIN_SCALE);
            assert_eq!(generate(kind, false, 0.01), floor);
            assert_eq!(generate(kind, false, 0.0), floor);
            assert_eq!(generate(kind, false, -2.0), floor);
        }
    }

    #[test]
    fn generation_is_pure() {
        for kind in PatternKind::ALL {
            for light in [true, false] {
                let a = generate(kind, light, 1.3);
                let b = generate(kind, light, 1.3);
                assert_eq!(a, b);
                assert_eq!(a.svg_definition("x"), b.svg_definition("x"));
            }
        }
    }

    #[test]
    fn stripes_band_and_period() {
        let tile = generate(PatternKind::Stripes, true, 2.0);
        let tile = tile.tile().unwrap();
        assert_eq!(tile.rotation, 45.0);
        assert!(tile.markup.contains("width=\"12\""));
        assert!(tile.css.image.contains("12px, transparent 12px, transparent 36px"));
        assert!(tile.css.size.is_none());
    }

    #[test]
    fn svg_patterns_are_data_uris() {
        for kind in [PatternKind::Stars, PatternKind::Waves, PatternKind::Zigzag] {
            let d = generate(kind, true, 1.0);
            assert!(d.tile().unwrap().css.image.starts_with("url(\"data:image/svg+xml;base64,"));
        }
    }

    #[test]
    fn definition_is_wellformed_svg() {
        for kind in PatternKind::ALL.into_iter().filter(|k| *k != PatternKind::None) {
            let def = generate(kind, false, 1.0).svg_definition("underprint").unwrap();
            let doc = format!(
                "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"100\" height=\"100\"><defs>{def}</defs><rect width=\"100\" height=\"100\" fill=\"url(#underprint)\"/></svg>"
            );
            assert!(
                resvg::usvg::Tree::from_str(&doc, &resvg::usvg::Options::default()).is_ok(),
                "{kind}"
            );
        }
    }

    #[test]
    fn css_declarations() {
        let d = generate(PatternKind::Dots, true, 1.0);
        let css = d.tile().unwrap().css.declarations();
        assert!(css.contains("background-size: 30px 30px;"));
        assert!(css.contains("background-position: 0 0, 15px 15px;"));
    }

    #[test]
    fn cache_reuses_entries() {
        let mut cache = PatternCache::new();
        let first = cache.get(PatternKind::Waves, true, 1.0).clone();
        let second = cache.get(PatternKind::Waves, true, 1.0).clone();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);

        cache.get(PatternKind::Waves, false, 1.0);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn number_formatting() {
        assert_eq!(num(6.000_000_1), "6");
        assert_eq!(num(0.25), "0.25");
        assert_eq!(num(-0.0001), "0");
    }
}
