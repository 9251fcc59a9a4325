//! Trainer avatars: the built-in set, the remote catalog, search, and the
//! offline routine that builds the catalog from a sprite directory listing.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Route of the avatar proxy, relative to the site root.
pub const AVATAR_PROXY_PATH: &str = "/api/trainer-avatar";

/// Queries shorter than this produce no suggestions.
pub const MIN_QUERY_LEN: usize = 3;

/// Maximum number of avatar suggestions.
pub const MAX_AVATAR_SUGGESTIONS: usize = 8;

/// A selectable trainer sprite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct TrainerAvatar {
    pub id: String,
    pub name: String,
    /// File name on the upstream sprite host, e.g. `cynthia.png`.
    pub sprite: String,
}

impl TrainerAvatar {
    pub fn new(id: impl Into<String>, name: impl Into<String>, sprite: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            sprite: sprite.into(),
        }
    }

    /// Same-origin URL that serves this sprite through the proxy.
    pub fn proxied_url(&self) -> String {
        proxied_sprite_url(&self.sprite)
    }
}

/// `/api/trainer-avatar?sprite=<file>` with the file name form-encoded.
pub fn proxied_sprite_url(sprite: &str) -> String {
    let query: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("sprite", sprite)
        .finish();
    format!("{AVATAR_PROXY_PATH}?{query}")
}

/// Avatars available before the remote catalog has loaded.
pub fn default_avatars() -> Vec<TrainerAvatar> {
    [
        ("acetrainer-gen7", "Ace Trainer", "acetrainer-gen7.png"),
        ("cynthia", "Champion Cynthia", "cynthia.png"),
        ("breeder", "Pokémon Breeder", "pokemonbreeder-gen7.png"),
        ("bugcatcher", "Bug Catcher", "bugcatcher-gen3.png"),
        ("rocketgruntf", "Rocket Grunt", "rocketgruntf.png"),
        ("hexmaniac", "Hex Maniac", "hexmaniac-gen6.png"),
        ("rosa", "Rosa", "rosa.png"),
        ("hilbert", "Hilbert", "hilbert.png"),
    ]
    .into_iter()
    .map(|(id, name, sprite)| TrainerAvatar::new(id, name, sprite))
    .collect()
}

// ============================================================================
// AvatarList (wire format)
// ============================================================================

/// The locally hosted `trainer-avatars.json` document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AvatarList {
    #[serde(default)]
    pub avatars: Vec<TrainerAvatar>,
}

// ============================================================================
// AvatarCatalog
// ============================================================================

/// Built-in avatars followed by any remote avatars with new ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarCatalog {
    avatars: Vec<TrainerAvatar>,
}

impl Default for AvatarCatalog {
    fn default() -> Self {
        Self {
            avatars: default_avatars(),
        }
    }
}

impl AvatarCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the remote part of the catalog. Remote entries whose id is
    /// already present are skipped.
    pub fn set_remote(&mut self, remote: Vec<TrainerAvatar>) {
        let mut avatars = default_avatars();
        for avatar in remote {
            if !avatars.iter().any(|a| a.id == avatar.id) {
                avatars.push(avatar);
            }
        }
        self.avatars = avatars;
    }

    pub fn avatars(&self) -> &[TrainerAvatar] {
        &self.avatars
    }

    pub fn len(&self) -> usize {
        self.avatars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avatars.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&TrainerAvatar> {
        self.avatars.iter().find(|a| a.id == id)
    }

    /// The avatar with `id`, or the first entry when it is unknown.
    pub fn resolve(&self, id: &str) -> Option<&TrainerAvatar> {
        self.find(id).or_else(|| self.avatars.first())
    }

    /// Case-insensitive substring search on display names.
    pub fn suggest(&self, query: &str) -> Suggestions<TrainerAvatar> {
        let needle = query.trim().to_lowercase();
        if needle.chars().count() < MIN_QUERY_LEN || self.avatars.is_empty() {
            return Suggestions::default();
        }
        let matches = self
            .avatars
            .iter()
            .filter(|a| a.name.to_lowercase().contains(&needle))
            .take(MAX_AVATAR_SUGGESTIONS)
            .cloned()
            .collect();
        Suggestions::from_matches(matches)
    }
}

/// Result of a suggestion query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestions<T> {
    pub items: Vec<T>,
    /// True when a search ran and matched nothing.
    pub no_results: bool,
}

impl<T> Default for Suggestions<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            no_results: false,
        }
    }
}

impl<T> Suggestions<T> {
    pub(crate) fn from_matches(items: Vec<T>) -> Self {
        let no_results = items.is_empty();
        Self { items, no_results }
    }
}

// ============================================================================
// Offline collection
// ============================================================================

/// Builds the avatar list from an HTML directory listing of sprite files.
///
/// Every `href` ending in `.png` becomes one avatar; duplicates are dropped
/// and the result is sorted by display name.
pub fn avatars_from_listing(html: &str) -> AvatarList {
    let mut avatars: Vec<TrainerAvatar> = Vec::new();

    for file in png_links(html) {
        let id = strip_png(&file);
        if id.is_empty() || avatars.iter().any(|a| a.id == id) {
            continue;
        }
        let name = match title_case(id) {
            name if name.is_empty() => id.to_string(),
            name => name,
        };
        avatars.push(TrainerAvatar::new(id, name, file.as_str()));
    }

    avatars.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    AvatarList { avatars }
}

/// `href` values ending in `.png` (case-insensitive), in document order.
fn png_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("[href]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|node| node.value().attr("href"))
        .filter(|href| href.to_ascii_lowercase().ends_with(".png"))
        .map(str::to_string)
        .collect()
}

fn strip_png(file: &str) -> &str {
    &file[..file.len() - ".png".len()]
}

/// Splits on `-`, `_` and `.` and capitalizes each part.
pub fn title_case(value: &str) -> String {
    value
        .split(['-', '_', '.'])
        .filter(|part| !part.is_empty())
        .map(crate::pokedex::capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}
