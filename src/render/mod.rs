//! Visual trees for the card faces and the export containers.
//!
//! The renderer is pure: a [`CardModel`], a [`PatternDescriptor`] and
//! [`RenderOptions`] fully determine the tree. Trees are serialized with
//! [`Node::to_svg`] and rasterized by [`svg::rasterize`].

pub mod svg;

use crate::color::{Paint, Theme};
use crate::model::{CardModel, PokemonPick, SlotId, TEAM_SIZE};
use crate::pattern::PatternDescriptor;

/// Card width in layout pixels.
pub const CARD_WIDTH: f32 = 448.0;

/// Card height, from the ID-1 aspect ratio (85.6mm × 54mm).
pub const CARD_HEIGHT: f32 = CARD_WIDTH * 54.0 / 85.6;

/// Padding of the white export containers.
pub const PANEL_PADDING: f32 = 24.0;

/// Vertical gap between cards inside an export container.
pub const PANEL_GAP: f32 = 24.0;

/// Number of front+back pairs on a print sheet.
pub const SHEET_COPIES: usize = 3;

/// Opacity of the pattern layer over the card color.
pub const PATTERN_OPACITY: f32 = 0.6;

/// Horizontal offset that keeps export containers out of view.
pub const OFFSCREEN_LEFT: f32 = -9999.0;

const CARD_RADIUS: f32 = 32.0;
const CARD_PADDING: f32 = 16.0;
const PANEL_RADIUS: f32 = 24.0;
const AVATAR_BOX: f32 = 80.0;
const AVATAR_RADIUS: f32 = 24.0;
const GRID_COLUMNS: usize = 3;
const GRID_GAP: f32 = 8.0;
const TILE_RADIUS: f32 = 12.0;
const EMPTY_SLOT_RADIUS: f32 = 16.0;
const SPRITE_SIZE: f32 = 32.0;
const TILE_TEXT_SIZE: f32 = 7.4;
const BUTTON_SIZE: f32 = 18.0;
const UNSET_BIO: &str = "—";

// ============================================================================
// Geometry
// ============================================================================

/// A box in layout pixels, relative to the parent node's origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frame {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Frame {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// A frame at the origin with the given size.
    pub fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// True when the frame covers no area. NaN sizes count as empty.
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

// ============================================================================
// Style
// ============================================================================

/// How a node is positioned relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    Static,
    Absolute,
    Fixed,
}

/// The mutable presentation properties of a node.
///
/// These are what the exporter overrides while a capture is in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeStyle {
    pub position: Position,
    pub left: f32,
    pub top: f32,
    pub opacity: f32,
    pub pointer_events: bool,
    pub z_index: i32,
}

impl Default for NodeStyle {
    fn default() -> Self {
        Self {
            position: Position::Static,
            left: 0.0,
            top: 0.0,
            opacity: 1.0,
            pointer_events: true,
            z_index: 0,
        }
    }
}

impl NodeStyle {
    /// Style of the hidden export containers: out of view, invisible and
    /// not hit-testable.
    pub fn offscreen() -> Self {
        Self {
            position: Position::Absolute,
            left: OFFSCREEN_LEFT,
            top: 0.0,
            opacity: 0.0,
            pointer_events: false,
            z_index: 0,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.opacity > 0.0
    }
}

// ============================================================================
// Node
// ============================================================================

/// Semantic marker on a node, used by callers and tests to find parts of a
/// tree without depending on its exact shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    CardFront,
    CardBack,
    TeamTile(SlotId),
    EmptySlot,
    BioPanel,
    CardBackPlaceholder,
    ExportPanel,
    Sheet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub paint: Paint,
    pub width: f32,
    pub dashed: bool,
}

/// A filled and/or stroked rounded rectangle covering the node's frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Surface {
    pub fill: Option<Paint>,
    pub stroke: Option<Stroke>,
    pub radius: f32,
    /// Tiled pattern drawn over the fill at [`PATTERN_OPACITY`].
    pub pattern: Option<PatternDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAnchor {
    #[default]
    Start,
    Middle,
    End,
}

/// One line of text, vertically centered in the node's frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub content: String,
    pub size: f32,
    pub bold: bool,
    pub paint: Paint,
    pub anchor: TextAnchor,
    pub letter_spacing: f32,
}

impl TextRun {
    pub fn new(content: impl Into<String>, size: f32, paint: Paint) -> Self {
        Self {
            content: content.into(),
            size,
            bold: false,
            paint,
            anchor: TextAnchor::Start,
            letter_spacing: 0.0,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn anchored(mut self, anchor: TextAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn spaced(mut self, letter_spacing: f32) -> Self {
        self.letter_spacing = letter_spacing;
        self
    }
}

/// Load state of an image node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageState {
    #[default]
    Pending,
    Loaded(Vec<u8>),
    /// Load failed or timed out. Settled; drawn as nothing.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageNode {
    pub href: String,
    pub state: ImageState,
}

impl ImageNode {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            state: ImageState::Pending,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self.state, ImageState::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, ImageState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    Surface(Surface),
    Text(TextRun),
    Image(ImageNode),
    /// Control that removes the given team slot.
    RemoveButton(SlotId),
}

/// An element of a visual tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub tag: Option<Tag>,
    pub style: NodeStyle,
    pub frame: Frame,
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

impl Node {
    fn new(frame: Frame, kind: NodeKind) -> Self {
        Self {
            tag: None,
            style: NodeStyle::default(),
            frame,
            kind,
            children: Vec::new(),
        }
    }

    pub fn group(frame: Frame) -> Self {
        Self::new(frame, NodeKind::Group)
    }

    pub fn surface(frame: Frame, surface: Surface) -> Self {
        Self::new(frame, NodeKind::Surface(surface))
    }

    pub fn text(frame: Frame, run: TextRun) -> Self {
        Self::new(frame, NodeKind::Text(run))
    }

    pub fn image(frame: Frame, href: impl Into<String>) -> Self {
        Self::new(frame, NodeKind::Image(ImageNode::new(href)))
    }

    pub fn remove_button(frame: Frame, slot: SlotId) -> Self {
        Self::new(frame, NodeKind::RemoveButton(slot))
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn with_style(mut self, style: NodeStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    /// Layout size of this node in pixels.
    pub fn size(&self) -> (f32, f32) {
        (self.frame.width, self.frame.height)
    }

    /// Whether the node can be rasterized: it has area and is not hidden.
    pub fn is_laid_out(&self) -> bool {
        !self.frame.is_empty() && self.style.is_visible()
    }

    /// This node and all of its descendants, in document order.
    pub fn descendants(&self) -> Vec<&Node> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.descendants());
        }
        out
    }

    pub fn count_tagged(&self, matches: impl Fn(&Tag) -> bool) -> usize {
        self.descendants()
            .into_iter()
            .filter(|n| n.tag.as_ref().is_some_and(&matches))
            .count()
    }

    pub fn find_tagged(&self, tag: Tag) -> Option<&Node> {
        self.descendants().into_iter().find(|n| n.tag == Some(tag))
    }

    pub fn texts(&self) -> Vec<&TextRun> {
        self.descendants()
            .into_iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Text(run) => Some(run),
                _ => None,
            })
            .collect()
    }

    /// The first text run with exactly this content.
    pub fn find_text(&self, content: &str) -> Option<&TextRun> {
        self.texts().into_iter().find(|t| t.content == content)
    }

    pub fn images(&self) -> Vec<&ImageNode> {
        self.descendants()
            .into_iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Image(image) => Some(image),
                _ => None,
            })
            .collect()
    }

    pub fn images_mut(&mut self) -> Vec<&mut ImageNode> {
        let mut out = Vec::new();
        collect_images(self, &mut out);
        out
    }

    pub fn remove_buttons(&self) -> Vec<SlotId> {
        self.descendants()
            .into_iter()
            .filter_map(|n| match n.kind {
                NodeKind::RemoveButton(slot) => Some(slot),
                _ => None,
            })
            .collect()
    }
}

fn collect_images<'a>(node: &'a mut Node, out: &mut Vec<&'a mut ImageNode>) {
    if let NodeKind::Image(image) = &mut node.kind {
        out.push(image);
    }
    for child in &mut node.children {
        collect_images(child, out);
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Inputs that are not part of the card model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Editing controls are shown: remove buttons and empty-slot labels.
    pub interactive: bool,
    /// Year printed under "LEAGUE CERTIFIED".
    pub year: i32,
}

impl RenderOptions {
    /// The on-screen editor view.
    pub fn preview(year: i32) -> Self {
        Self {
            interactive: true,
            year,
        }
    }

    /// The static view used in export containers.
    pub fn export(year: i32) -> Self {
        Self {
            interactive: false,
            year,
        }
    }
}

fn card_surface(model: &CardModel, theme: &Theme, pattern: &PatternDescriptor) -> Surface {
    Surface {
        fill: Some(Paint::from_hex(&model.background_color).unwrap_or(Paint::BLACK)),
        stroke: Some(Stroke {
            paint: theme.border,
            width: 1.0,
            dashed: false,
        }),
        radius: CARD_RADIUS,
        pattern: (!pattern.is_empty()).then(|| pattern.clone()),
    }
}

fn card_frame() -> Frame {
    Frame::from_size(CARD_WIDTH, CARD_HEIGHT)
}

/// The card front: avatar, trainer name, certification and the team grid.
pub fn render_front(model: &CardModel, pattern: &PatternDescriptor, options: RenderOptions) -> Node {
    let theme = model.theme();
    let inner_right = CARD_WIDTH - CARD_PADDING;
    let text_x = CARD_PADDING + AVATAR_BOX + 16.0;
    let text_width = 220.0;

    let avatar = Node::surface(
        Frame::new(CARD_PADDING, CARD_PADDING, AVATAR_BOX, AVATAR_BOX),
        Surface {
            fill: Some(theme.accent_surface),
            radius: AVATAR_RADIUS,
            ..Surface::default()
        },
    )
    .with_child(Node::image(
        Frame::new(4.0, 4.0, AVATAR_BOX - 8.0, AVATAR_BOX - 8.0),
        model.avatar.proxied_url(),
    ));

    let heading = [
        Node::text(
            Frame::new(text_x, 20.0, text_width, 14.0),
            TextRun::new("TRAINER", 10.0, theme.secondary_text).bold().spaced(2.0),
        ),
        Node::text(
            Frame::new(text_x, 36.0, text_width, 30.0),
            TextRun::new(model.display_name(), 24.0, theme.primary_text).bold(),
        ),
        Node::text(
            Frame::new(text_x, 68.0, text_width, 16.0),
            TextRun::new(model.avatar.name.as_str(), 12.0, theme.secondary_text),
        ),
    ];

    let certification = [
        Node::text(
            Frame::new(inner_right - 120.0, 20.0, 120.0, 14.0),
            TextRun::new("LEAGUE CERTIFIED", 9.0, theme.secondary_text)
                .bold()
                .spaced(1.5)
                .anchored(TextAnchor::End),
        ),
        Node::text(
            Frame::new(inner_right - 120.0, 36.0, 120.0, 16.0),
            TextRun::new(options.year.to_string(), 12.0, theme.primary_text)
                .bold()
                .anchored(TextAnchor::End),
        ),
    ];

    let grid_top = CARD_PADDING + AVATAR_BOX + 12.0;
    let grid = team_grid(
        model,
        &theme,
        options,
        Frame::new(
            CARD_PADDING,
            grid_top,
            CARD_WIDTH - 2.0 * CARD_PADDING,
            CARD_HEIGHT - CARD_PADDING - grid_top,
        ),
    );

    Node::surface(card_frame(), card_surface(model, &theme, pattern))
        .with_tag(Tag::CardFront)
        .with_child(avatar)
        .with_children(heading)
        .with_children(certification)
        .with_child(grid)
}

fn team_grid(model: &CardModel, theme: &Theme, options: RenderOptions, frame: Frame) -> Node {
    let rows = TEAM_SIZE.div_ceil(GRID_COLUMNS);
    let tile_width = (frame.width - GRID_GAP * (GRID_COLUMNS - 1) as f32) / GRID_COLUMNS as f32;
    let tile_height = (frame.height - GRID_GAP * (rows - 1) as f32) / rows as f32;

    let tiles = (0..TEAM_SIZE).map(|index| {
        let column = index % GRID_COLUMNS;
        let row = index / GRID_COLUMNS;
        let tile_frame = Frame::new(
            column as f32 * (tile_width + GRID_GAP),
            row as f32 * (tile_height + GRID_GAP),
            tile_width,
            tile_height,
        );
        match model.team.get(index) {
            Some(pick) => team_tile(pick, theme, options, tile_frame),
            None => empty_slot(theme, options, tile_frame),
        }
    });

    Node::group(frame).with_children(tiles)
}

fn team_tile(pick: &PokemonPick, theme: &Theme, options: RenderOptions, frame: Frame) -> Node {
    let sprite_x = (frame.width - SPRITE_SIZE) / 2.0;
    let mut tile = Node::surface(
        frame,
        Surface {
            fill: Some(theme.tile_surface),
            radius: TILE_RADIUS,
            ..Surface::default()
        },
    )
    .with_tag(Tag::TeamTile(pick.slot_id))
    .with_child(Node::image(
        Frame::new(sprite_x, 8.0, SPRITE_SIZE, SPRITE_SIZE),
        pick.sprite.as_str(),
    ))
    .with_child(Node::text(
        Frame::new(4.0, 8.0 + SPRITE_SIZE + 4.0, frame.width - 8.0, 12.0),
        TextRun::new(pick.name.as_str(), TILE_TEXT_SIZE, theme.tile_text)
            .bold()
            .anchored(TextAnchor::Middle),
    ));

    if options.interactive {
        tile = tile.with_child(Node::remove_button(
            Frame::new(frame.width - BUTTON_SIZE - 4.0, 4.0, BUTTON_SIZE, BUTTON_SIZE),
            pick.slot_id,
        ));
    }
    tile
}

fn empty_slot(theme: &Theme, options: RenderOptions, frame: Frame) -> Node {
    let slot = Node::surface(
        frame,
        Surface {
            stroke: Some(Stroke {
                paint: theme.empty_slot_border,
                width: 1.5,
                dashed: true,
            }),
            radius: EMPTY_SLOT_RADIUS,
            ..Surface::default()
        },
    )
    .with_tag(Tag::EmptySlot);

    if options.interactive {
        slot.with_child(Node::text(
            Frame::from_size(frame.width, frame.height),
            TextRun::new("EMPTY SLOT", TILE_TEXT_SIZE, theme.empty_slot_text)
                .bold()
                .spaced(1.0)
                .anchored(TextAnchor::Middle),
        ))
    } else {
        slot
    }
}

/// The card back: journal heading and either the bio panel or the
/// "Card back" placeholder.
pub fn render_back(model: &CardModel, pattern: &PatternDescriptor, _options: RenderOptions) -> Node {
    let theme = model.theme();
    let left = 24.0;
    let inner_width = CARD_WIDTH - 2.0 * left;

    let heading = [
        Node::text(
            Frame::new(left, 24.0, 200.0, 14.0),
            TextRun::new("TRAINER JOURNAL", 10.0, theme.secondary_text).bold().spaced(2.0),
        ),
        Node::text(
            Frame::new(left, 40.0, 260.0, 28.0),
            TextRun::new(model.display_name(), 22.0, theme.primary_text).bold(),
        ),
        Node::text(
            Frame::new(CARD_WIDTH - left - 140.0, 24.0, 140.0, 14.0),
            TextRun::new("LEAGUE PROFILE", 9.0, theme.secondary_text)
                .bold()
                .spaced(1.5)
                .anchored(TextAnchor::End),
        ),
    ];

    let body = if model.card_back_enabled {
        bio_panel(model, &theme, Frame::new(left, 80.0, inner_width, 150.0))
    } else {
        let (width, height) = (120.0, 32.0);
        Node::surface(
            Frame::new((CARD_WIDTH - width) / 2.0, 130.0, width, height),
            Surface {
                stroke: Some(Stroke {
                    paint: theme.empty_slot_border,
                    width: 1.5,
                    dashed: true,
                }),
                radius: height / 2.0,
                ..Surface::default()
            },
        )
        .with_tag(Tag::CardBackPlaceholder)
        .with_child(Node::text(
            Frame::from_size(width, height),
            TextRun::new("Card back", 11.0, theme.empty_slot_text).anchored(TextAnchor::Middle),
        ))
    };

    let footer = Node::text(
        Frame::new(0.0, CARD_HEIGHT - 32.0, CARD_WIDTH, 14.0),
        TextRun::new("LEAGUE ARCHIVES", 9.0, theme.secondary_text)
            .bold()
            .spaced(2.0)
            .anchored(TextAnchor::Middle),
    );

    Node::surface(card_frame(), card_surface(model, &theme, pattern))
        .with_tag(Tag::CardBack)
        .with_children(heading)
        .with_child(body)
        .with_child(footer)
}

/// Bio values as printed: Pokémon and type upper-cased, game as typed.
pub fn bio_lines(model: &CardModel) -> [(&'static str, String); 3] {
    let or_unset = |value: &str, upper: bool| match value.trim() {
        "" => UNSET_BIO.to_string(),
        v if upper => v.to_uppercase(),
        v => v.to_string(),
    };
    [
        ("FAVORITE POKÉMON", or_unset(&model.bio.favorite_pokemon, true)),
        ("FAVORITE TYPE", or_unset(&model.bio.favorite_type, true)),
        ("FAVORITE GAME", or_unset(&model.bio.favorite_game, false)),
    ]
}

fn bio_panel(model: &CardModel, theme: &Theme, frame: Frame) -> Node {
    let row_height = (frame.height - 24.0) / 3.0;
    let rows = bio_lines(model).into_iter().enumerate().flat_map(|(i, (label, value))| {
        let y = 12.0 + i as f32 * row_height;
        [
            Node::text(
                Frame::new(16.0, y, frame.width - 32.0, 12.0),
                TextRun::new(label, 8.0, theme.secondary_text).bold().spaced(1.5),
            ),
            Node::text(
                Frame::new(16.0, y + 13.0, frame.width - 32.0, 18.0),
                TextRun::new(value, 14.0, theme.primary_text).bold(),
            ),
        ]
    });

    Node::surface(
        frame,
        Surface {
            fill: Some(theme.accent_surface),
            radius: 20.0,
            ..Surface::default()
        },
    )
    .with_tag(Tag::BioPanel)
    .with_children(rows)
}

fn white_panel(width: f32, height: f32, tag: Tag) -> Node {
    Node::surface(
        Frame::from_size(width, height),
        Surface {
            fill: Some(Paint::WHITE),
            radius: PANEL_RADIUS,
            ..Surface::default()
        },
    )
    .with_tag(tag)
    .with_style(NodeStyle::offscreen())
}

fn place(mut node: Node, x: f32, y: f32) -> Node {
    node.frame.x = x;
    node.frame.y = y;
    node
}

/// Alternating fronts and backs, stacked from the panel padding down.
fn stacked_pairs(model: &CardModel, pattern: &PatternDescriptor, year: i32, pairs: usize) -> Vec<Node> {
    let options = RenderOptions::export(year);
    (0..pairs * 2)
        .map(|i| {
            let y = PANEL_PADDING + i as f32 * (CARD_HEIGHT + PANEL_GAP);
            let card = if i % 2 == 0 {
                render_front(model, pattern, options)
            } else {
                render_back(model, pattern, options)
            };
            place(card, PANEL_PADDING, y)
        })
        .collect()
}

fn stack_height(cards: usize) -> f32 {
    2.0 * PANEL_PADDING + cards as f32 * CARD_HEIGHT + cards.saturating_sub(1) as f32 * PANEL_GAP
}

/// The single-card export container: front above back on a white panel,
/// built off-screen.
pub fn render_export_panel(model: &CardModel, pattern: &PatternDescriptor, year: i32) -> Node {
    white_panel(CARD_WIDTH + 2.0 * PANEL_PADDING, stack_height(2), Tag::ExportPanel)
        .with_children(stacked_pairs(model, pattern, year, 1))
}

/// The print sheet: [`SHEET_COPIES`] identical front+back pairs, built
/// off-screen.
pub fn render_sheet(model: &CardModel, pattern: &PatternDescriptor, year: i32) -> Node {
    white_panel(
        CARD_WIDTH + 2.0 * PANEL_PADDING,
        stack_height(2 * SHEET_COPIES),
        Tag::Sheet,
    )
    .with_children(stacked_pairs(model, pattern, year, SHEET_COPIES))
}
