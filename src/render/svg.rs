//! SVG serialization and rasterization of visual trees using resvg/usvg.

use std::io::Cursor;
use std::sync::{Arc, OnceLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, Rgba, RgbaImage};
use resvg::tiny_skia::{Color, Pixmap, Transform};
use resvg::usvg::{Options, Tree, fontdb};

use super::{ImageNode, ImageState, Node, NodeKind, PATTERN_OPACITY, Surface, TextAnchor, TextRun};
use crate::color::Paint;
use crate::error::{Error, Result};
use crate::pattern::num;

const FONT_FAMILY: &str = "Inter, Helvetica, Arial, sans-serif";
const BUTTON_FILL: Paint = Paint::rgba(15, 23, 42, 0.75);

// ============================================================================
// Serialization
// ============================================================================

impl Node {
    /// Serializes the tree to a standalone SVG document.
    ///
    /// The root is drawn at the origin regardless of its own offsets. Images
    /// that have not loaded are left out.
    pub fn to_svg(&self) -> String {
        let mut writer = SvgWriter::default();
        writer.node(self, true);

        let (width, height) = self.size();
        let mut out = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">",
            w = num(width),
            h = num(height)
        );
        if !writer.defs.is_empty() {
            out.push_str("<defs>");
            out.push_str(&writer.defs);
            out.push_str("</defs>");
        }
        out.push_str(&writer.body);
        out.push_str("</svg>");
        out
    }
}

#[derive(Default)]
struct SvgWriter {
    defs: String,
    body: String,
    patterns: usize,
}

impl SvgWriter {
    fn node(&mut self, node: &Node, root: bool) {
        let (x, y) = if root {
            (0.0, 0.0)
        } else {
            (node.frame.x, node.frame.y)
        };

        let mut attrs = String::new();
        if x != 0.0 || y != 0.0 {
            attrs.push_str(&format!(" transform=\"translate({} {})\"", num(x), num(y)));
        }
        if node.style.opacity < 1.0 {
            attrs.push_str(&format!(" opacity=\"{}\"", num(node.style.opacity.max(0.0))));
        }
        self.body.push_str(&format!("<g{attrs}>"));

        let (width, height) = node.size();
        match &node.kind {
            NodeKind::Group => {}
            NodeKind::Surface(surface) => self.surface(surface, width, height),
            NodeKind::Text(run) => self.text(run, width, height),
            NodeKind::Image(image) => self.image(image, width, height),
            NodeKind::RemoveButton(_) => self.remove_button(width, height),
        }
        for child in &node.children {
            self.node(child, false);
        }

        self.body.push_str("</g>");
    }

    fn surface(&mut self, surface: &Surface, width: f32, height: f32) {
        let radius = surface.radius.min(width / 2.0).min(height / 2.0).max(0.0);
        let rect = |x: f32, w: f32, h: f32| {
            format!(
                "<rect x=\"{x}\" y=\"{x}\" width=\"{}\" height=\"{}\" rx=\"{r}\" ry=\"{r}\"",
                num(w),
                num(h),
                x = num(x),
                r = num(radius)
            )
        };

        if let Some(fill) = &surface.fill {
            self.body.push_str(&format!("{} {}/>", rect(0.0, width, height), fill.svg_fill()));
        }

        if let Some(pattern) = &surface.pattern {
            let id = format!("pattern-{}", self.patterns);
            if let Some(definition) = pattern.svg_definition(&id) {
                self.patterns += 1;
                self.defs.push_str(&definition);
                self.body.push_str(&format!(
                    "{} fill=\"url(#{id})\" opacity=\"{}\"/>",
                    rect(0.0, width, height),
                    num(PATTERN_OPACITY)
                ));
            }
        }

        if let Some(stroke) = &surface.stroke {
            let inset = stroke.width / 2.0;
            let dash = if stroke.dashed {
                " stroke-dasharray=\"6 4\""
            } else {
                ""
            };
            self.body.push_str(&format!(
                "{} fill=\"none\" {} stroke-width=\"{}\"{dash}/>",
                rect(inset, width - stroke.width, height - stroke.width),
                stroke.paint.svg_stroke(),
                num(stroke.width)
            ));
        }
    }

    fn text(&mut self, run: &TextRun, width: f32, height: f32) {
        let (x, anchor) = match run.anchor {
            TextAnchor::Start => (0.0, ""),
            TextAnchor::Middle => (width / 2.0, " text-anchor=\"middle\""),
            TextAnchor::End => (width, " text-anchor=\"end\""),
        };
        let y = height / 2.0 + run.size * 0.35;
        let weight = if run.bold { " font-weight=\"700\"" } else { "" };
        let spacing = if run.letter_spacing != 0.0 {
            format!(" letter-spacing=\"{}\"", num(run.letter_spacing))
        } else {
            String::new()
        };

        self.body.push_str(&format!(
            "<text x=\"{}\" y=\"{}\" font-family=\"{FONT_FAMILY}\" font-size=\"{}\"{weight}{spacing}{anchor} {}>{}</text>",
            num(x),
            num(y),
            num(run.size),
            run.paint.svg_fill(),
            escape_xml(&run.content)
        ));
    }

    fn image(&mut self, image: &ImageNode, width: f32, height: f32) {
        let ImageState::Loaded(bytes) = &image.state else {
            return;
        };
        let mime = image::guess_format(bytes)
            .map(|format| format.to_mime_type())
            .unwrap_or("image/png");
        self.body.push_str(&format!(
            "<image width=\"{}\" height=\"{}\" preserveAspectRatio=\"xMidYMid meet\" href=\"data:{mime};base64,{}\"/>",
            num(width),
            num(height),
            STANDARD.encode(bytes)
        ));
    }

    fn remove_button(&mut self, width: f32, height: f32) {
        let r = width.min(height) / 2.0;
        let arm = r * 0.4;
        let (cx, cy) = (width / 2.0, height / 2.0);
        self.body.push_str(&format!(
            "<circle cx=\"{}\" cy=\"{}\" r=\"{}\" {}/>",
            num(cx),
            num(cy),
            num(r),
            BUTTON_FILL.svg_fill()
        ));
        self.body.push_str(&format!(
            "<path d=\"M{a} {a}L{b} {b}M{b} {a}L{a} {b}\" stroke=\"#ffffff\" stroke-width=\"1.5\" stroke-linecap=\"round\"/>",
            a = num(cx - arm),
            b = num(cx + arm)
        ));
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            // Not representable in XML 1.0.
            '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}' => {}
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Rasterization
// ============================================================================

/// System fonts, loaded once per process.
fn font_database() -> Arc<fontdb::Database> {
    static FONTS: OnceLock<Arc<fontdb::Database>> = OnceLock::new();
    FONTS
        .get_or_init(|| {
            let mut db = fontdb::Database::new();
            db.load_system_fonts();
            Arc::new(db)
        })
        .clone()
}

fn options() -> Options<'static> {
    let mut opt = Options::default();
    opt.fontdb = font_database();
    opt
}

/// Rasterizes a tree at `pixel_ratio` device pixels per layout pixel, with
/// `background` composited beneath every transparent region.
///
/// Fails when the node has no area, is hidden, or the SVG cannot be parsed.
pub fn rasterize(node: &Node, pixel_ratio: f32, background: Paint) -> Result<RgbaImage> {
    if !node.is_laid_out() {
        return Err(Error::Render("node has no size or is hidden".to_string()));
    }
    if !(pixel_ratio > 0.0) {
        return Err(Error::Render(format!("invalid pixel ratio {pixel_ratio}")));
    }

    let svg = node.to_svg();
    let tree = Tree::from_str(&svg, &options()).map_err(|e| Error::Render(e.to_string()))?;

    let (width, height) = node.size();
    let width = (width * pixel_ratio).ceil() as u32;
    let height = (height * pixel_ratio).ceil() as u32;
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| Error::Render(format!("cannot allocate a {width}x{height} pixmap")))?;

    let bg = background.color;
    pixmap.fill(Color::from_rgba8(bg.red, bg.green, bg.blue, 255));
    resvg::render(&tree, Transform::from_scale(pixel_ratio, pixel_ratio), &mut pixmap.as_mut());

    Ok(pixmap_to_rgba_image(&pixmap))
}

/// Encodes an image as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| Error::Render(e.to_string()))?;
    Ok(bytes)
}

/// Converts a tiny_skia Pixmap to an image::RgbaImage.
fn pixmap_to_rgba_image(pixmap: &Pixmap) -> RgbaImage {
    let mut img = RgbaImage::new(pixmap.width(), pixmap.height());
    for (pixel, out) in pixmap.pixels().iter().zip(img.pixels_mut()) {
        // tiny_skia stores premultiplied alpha
        let (r, g, b, a) = unpremultiply(pixel.red(), pixel.green(), pixel.blue(), pixel.alpha());
        *out = Rgba([r, g, b, a]);
    }
    img
}

fn unpremultiply(r: u8, g: u8, b: u8, a: u8) -> (u8, u8, u8, u8) {
    if a == 0 {
        (0, 0, 0, 0)
    } else {
        let a_f = a as f32 / 255.0;
        (
            (r as f32 / a_f).round().min(255.0) as u8,
            (g as f32 / a_f).round().min(255.0) as u8,
            (b as f32 / a_f).round().min(255.0) as u8,
            a,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
