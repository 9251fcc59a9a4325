//! Capturing an export container as a PNG.
//!
//! A capture temporarily pulls the off-screen container into view, waits
//! for its images, rasterizes it at the configured pixel ratio on an opaque
//! background, and puts the original style back on every exit path.

use std::ops::{Deref, DerefMut};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbaImage};
use tracing::{debug, info};

use crate::color::Paint;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::images::{ImageLoader, WaitOptions, await_all_images, reset_failed_images};
use crate::model::CardModel;
use crate::pattern::PatternDescriptor;
use crate::render::{self, Node, NodeStyle, Position, svg};

pub const PNG_MIME: &str = "image/png";

const DATA_URI_PREFIX: &str = "data:image/png;base64,";

// ============================================================================
// ExportArtifact
// ============================================================================

/// An encoded export, ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    pub background: Paint,
}

impl ExportArtifact {
    /// `data:image/png;base64,...`
    pub fn to_data_uri(&self) -> String {
        format!("{DATA_URI_PREFIX}{}", STANDARD.encode(&self.png))
    }

    /// Parses a PNG data URI. The background is assumed white.
    pub fn from_data_uri(uri: &str, pixel_ratio: f32) -> Result<Self> {
        let payload = uri
            .strip_prefix(DATA_URI_PREFIX)
            .ok_or_else(|| Error::Decode("not a base64 PNG data URI".to_string()))?;
        let png = STANDARD
            .decode(payload)
            .map_err(|e| Error::Decode(e.to_string()))?;
        let decoded = decode_png(&png)?;
        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            png,
            pixel_ratio,
            background: Paint::WHITE,
        })
    }

    /// Decodes the PNG back into pixels.
    pub fn decode(&self) -> Result<RgbaImage> {
        decode_png(&self.png)
    }
}

fn decode_png(bytes: &[u8]) -> Result<RgbaImage> {
    image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map(|img| img.to_rgba8())
        .map_err(|e| Error::Decode(e.to_string()))
}

// ============================================================================
// StyleGuard
// ============================================================================

/// Overrides a node's style for as long as the guard lives. Dropping the
/// guard restores the style it replaced.
pub struct StyleGuard<'a> {
    node: &'a mut Node,
    saved: NodeStyle,
}

impl<'a> StyleGuard<'a> {
    pub fn apply(node: &'a mut Node, style: NodeStyle) -> Self {
        let saved = std::mem::replace(&mut node.style, style);
        Self { node, saved }
    }

    /// The style that will be restored.
    pub fn saved(&self) -> &NodeStyle {
        &self.saved
    }
}

impl Deref for StyleGuard<'_> {
    type Target = Node;

    fn deref(&self) -> &Node {
        &*self.node
    }
}

impl DerefMut for StyleGuard<'_> {
    fn deref_mut(&mut self) -> &mut Node {
        &mut *self.node
    }
}

impl Drop for StyleGuard<'_> {
    fn drop(&mut self) {
        self.node.style = self.saved;
    }
}

/// Style applied while capturing: fixed at the origin, fully opaque, behind
/// everything and not hit-testable.
pub fn capture_style() -> NodeStyle {
    NodeStyle {
        position: Position::Fixed,
        left: 0.0,
        top: 0.0,
        opacity: 1.0,
        pointer_events: false,
        z_index: -1,
    }
}

// ============================================================================
// Capture
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    pub pixel_ratio: f32,
    pub background: Paint,
    pub image_timeout: std::time::Duration,
    /// Retry failed images and load every image past caches.
    pub cache_bust: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            pixel_ratio: 2.0,
            background: Paint::WHITE,
            image_timeout: std::time::Duration::from_secs(10),
            cache_bust: true,
        }
    }
}

impl CaptureOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pixel_ratio: config.pixel_ratio,
            background: Paint::from_hex(&config.background_fill).unwrap_or(Paint::WHITE),
            image_timeout: config.image_timeout(),
            cache_bust: true,
        }
    }
}

fn cache_bust_token() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

/// Captures `node` as a PNG.
///
/// The node's style is the same after this returns as before, whether the
/// capture succeeded or not.
pub async fn capture(
    node: &mut Node,
    loader: &dyn ImageLoader,
    options: &CaptureOptions,
) -> Result<ExportArtifact> {
    let mut guard = StyleGuard::apply(node, capture_style());

    let cache_bust = options.cache_bust.then(cache_bust_token);
    if cache_bust.is_some() {
        let reset = reset_failed_images(&mut guard);
        if reset > 0 {
            debug!(reset, "Retrying failed images");
        }
    }
    let wait = WaitOptions {
        timeout: options.image_timeout,
        cache_bust,
    };
    await_all_images(&mut guard, loader, &wait).await;

    let pixels = svg::rasterize(&guard, options.pixel_ratio, options.background)?;
    let png = svg::encode_png(&pixels)?;
    info!(
        width = pixels.width(),
        height = pixels.height(),
        bytes = png.len(),
        "Captured export"
    );

    Ok(ExportArtifact {
        png,
        width: pixels.width(),
        height: pixels.height(),
        pixel_ratio: options.pixel_ratio,
        background: options.background,
    })
}

// ============================================================================
// Export kinds and naming
// ============================================================================

/// What is being exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum ExportKind {
    /// Front above back.
    Single,
    /// Three front+back pairs for printing.
    Sheet,
}

impl ExportKind {
    /// Builds the off-screen container for this export.
    pub fn render(&self, model: &CardModel, pattern: &PatternDescriptor, year: i32) -> Node {
        match self {
            Self::Single => render::render_export_panel(model, pattern, year),
            Self::Sheet => render::render_sheet(model, pattern, year),
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Self::Single => "card",
            Self::Sheet => "card-sheet",
        }
    }

    pub fn progress_message(&self) -> &'static str {
        match self {
            Self::Single => "Preparing your PNG...",
            Self::Sheet => "Building your print sheet...",
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            Self::Single => "Card downloaded as PNG! Check your Downloads folder.",
            Self::Sheet => "Triple sheet downloaded as PNG! Check your Downloads folder.",
        }
    }

    pub fn failure_message(&self) -> &'static str {
        match self {
            Self::Single => "Unable to build the PNG. Try again in a few seconds.",
            Self::Sheet => "Unable to build the sheet. Try again in a few seconds.",
        }
    }
}

/// Trimmed, lowercased, with whitespace runs collapsed to one hyphen.
/// `trainer` when nothing is left.
pub fn slug(name: &str) -> String {
    let slug = name
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "trainer".to_string()
    } else {
        slug
    }
}

/// `<slug>-card.png` or `<slug>-card-sheet.png`.
pub fn export_filename(trainer_name: &str, kind: ExportKind) -> String {
    format!("{}-{}.png", slug(trainer_name), kind.suffix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, PokemonEntry, reduce};
    use crate::render::{CARD_WIDTH, Frame, PANEL_PADDING};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves a 4x4 opaque PNG for every reference.
    #[derive(Default)]
    struct SpriteLoader {
        tokens: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl ImageLoader for SpriteLoader {
        async fn load(&self, _href: &str, cache_bust: Option<&str>) -> Result<Vec<u8>> {
            self.tokens.lock().unwrap().push(cache_bust.map(str::to_string));
            let sprite = RgbaImage::from_pixel(4, 4, image::Rgba([255, 203, 5, 255]));
            svg::encode_png(&sprite)
        }
    }

    fn two_pokemon() -> CardModel {
        let add = |model: &CardModel, id: u32, name: &str| {
            reduce(
                model,
                Action::AddPokemon(PokemonEntry {
                    id,
                    name: name.into(),
                    sprite: format!("https://sprites.invalid/{id}.png"),
                    types: vec![],
                }),
            )
            .model
        };
        let model = add(&CardModel::default(), 25, "Pikachu");
        add(&model, 6, "Charizard")
    }

    #[tokio::test]
    async fn capture_is_twice_layout_size_and_opaque() {
        let model = two_pokemon();
        let mut panel = ExportKind::Single.render(&model, &PatternDescriptor::Empty, 2024);
        let (width, height) = panel.size();

        let loader = SpriteLoader::default();
        let artifact = capture(&mut panel, &loader, &CaptureOptions::default()).await.unwrap();

        assert_eq!(artifact.width, (width * 2.0).ceil() as u32);
        assert_eq!(artifact.height, (height * 2.0).ceil() as u32);
        assert_eq!(artifact.width, ((CARD_WIDTH + 2.0 * PANEL_PADDING) * 2.0) as u32);

        let pixels = artifact.decode().unwrap();
        assert!(pixels.pixels().all(|p| p[3] == 255));
        assert_eq!(pixels.get_pixel(1, 1).0, [255, 255, 255, 255]);

        let tokens = loader.tokens.lock().unwrap();
        assert_eq!(tokens.len(), 3);
        assert!(tokens.iter().all(Option::is_some));
    }

    #[tokio::test]
    async fn style_is_restored_after_success() {
        let mut panel = ExportKind::Single.render(&CardModel::default(), &PatternDescriptor::Empty, 2024);
        let before = panel.style;
        capture(&mut panel, &SpriteLoader::default(), &CaptureOptions::default())
            .await
            .unwrap();
        assert_eq!(panel.style, before);
        assert_eq!(panel.style, NodeStyle::offscreen());
    }

    #[tokio::test]
    async fn style_is_restored_after_failure() {
        let mut node = Node::group(Frame::default()).with_style(NodeStyle::offscreen());
        let result = capture(&mut node, &SpriteLoader::default(), &CaptureOptions::default()).await;
        assert!(matches!(result, Err(Error::Render(_))));
        assert_eq!(node.style, NodeStyle::offscreen());
    }

    #[test]
    fn guard_overrides_then_restores() {
        let mut node = Node::group(Frame::from_size(1.0, 1.0)).with_style(NodeStyle::offscreen());
        {
            let guard = StyleGuard::apply(&mut node, capture_style());
            assert_eq!(guard.style.position, Position::Fixed);
            assert_eq!(guard.style.z_index, -1);
            assert_eq!(*guard.saved(), NodeStyle::offscreen());
        }
        assert_eq!(node.style, NodeStyle::offscreen());
    }

    #[test]
    fn data_uri_round_trip_keeps_dimensions() {
        let png = svg::encode_png(&RgbaImage::new(6, 3)).unwrap();
        let artifact = ExportArtifact {
            png,
            width: 6,
            height: 3,
            pixel_ratio: 2.0,
            background: Paint::WHITE,
        };
        let uri = artifact.to_data_uri();
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(ExportArtifact::from_data_uri(&uri, 2.0).unwrap(), artifact);

        assert!(matches!(
            ExportArtifact::from_data_uri("data:text/plain,hi", 2.0),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn filenames_use_the_slug() {
        assert_eq!(export_filename("", ExportKind::Single), "trainer-card.png");
        assert_eq!(export_filename("   ", ExportKind::Sheet), "trainer-card-sheet.png");
        assert_eq!(export_filename("  Ash   Ketchum ", ExportKind::Single), "ash-ketchum-card.png");
        assert_eq!(slug("Red\tBlue"), "red-blue");
    }

    #[test]
    fn config_drives_capture_options() {
        let config = Config {
            pixel_ratio: 3.0,
            background_fill: "#000".into(),
            ..Config::default()
        };
        let options = CaptureOptions::from_config(&config);
        assert_eq!(options.pixel_ratio, 3.0);
        assert_eq!(options.background, Paint::BLACK);
    }
}
