//! Pokémon payloads: the lookup response, the cached name list, and name
//! search.

use serde::{Deserialize, Serialize};

use crate::avatar::{MIN_QUERY_LEN, Suggestions};
use crate::model::PokemonEntry;

/// Quick-add suggestions shown before anything is typed.
pub const STARTER_POKEMON: [&str; 6] = ["pikachu", "charizard", "gengar", "lucario", "snorlax", "greninja"];

/// Maximum number of name suggestions.
pub const MAX_NAME_SUGGESTIONS: usize = 6;

/// Number of entries requested from the index when building the name list.
pub const NAME_INDEX_LIMIT: usize = 2000;

/// Sprite URL used when a lookup response carries no artwork.
pub const DEFAULT_SPRITE_TEMPLATE: &str =
    "https://raw.githubusercontent.com/PokeAPI/sprites/master/sprites/pokemon/{id}.png";

// ============================================================================
// Lookup response
// ============================================================================

/// `GET /pokemon/{name-or-id}` response, reduced to the fields the card uses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PokemonResponse {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub sprites: Sprites,
    #[serde(default)]
    pub types: Vec<TypeSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Sprites {
    pub front_default: Option<String>,
    #[serde(default)]
    pub other: Option<OtherSprites>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct OtherSprites {
    #[serde(rename = "official-artwork", default)]
    pub official_artwork: Option<Artwork>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Artwork {
    pub front_default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypeSlot {
    #[serde(rename = "type")]
    pub kind: NamedResource,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedResource {
    pub name: String,
}

impl PokemonResponse {
    /// Official artwork, then the default front sprite, then the templated
    /// fallback for this id.
    pub fn sprite_url(&self, fallback_template: &str) -> String {
        self.sprites
            .other
            .as_ref()
            .and_then(|o| o.official_artwork.as_ref())
            .and_then(|a| a.front_default.clone())
            .or_else(|| self.sprites.front_default.clone())
            .unwrap_or_else(|| fallback_template.replace("{id}", &self.id.to_string()))
    }

    /// Converts to a team entry with capitalized name and types.
    pub fn into_entry(self, fallback_template: &str) -> PokemonEntry {
        let sprite = self.sprite_url(fallback_template);
        PokemonEntry {
            id: self.id,
            name: capitalize(&self.name),
            sprite,
            types: self.types.iter().map(|t| capitalize(&t.kind.name)).collect(),
        }
    }
}

/// Normalizes user input for a lookup: trimmed and lowercased.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Upper-cases the first character.
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Name list
// ============================================================================

/// The locally hosted `pokemon-list.json` document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NameList {
    #[serde(default)]
    pub names: Vec<String>,
}

impl NameList {
    /// Prefix search over the names.
    pub fn suggest(&self, query: &str) -> Suggestions<String> {
        let needle = normalize_query(query);
        if needle.chars().count() < MIN_QUERY_LEN || self.names.is_empty() {
            return Suggestions::default();
        }
        let matches = self
            .names
            .iter()
            .filter(|name| name.starts_with(&needle))
            .take(MAX_NAME_SUGGESTIONS)
            .cloned()
            .collect();
        Suggestions::from_matches(matches)
    }

    /// Options for the favorite-Pokémon field: the full list once loaded,
    /// the starters until then.
    pub fn favorite_options(&self) -> Vec<String> {
        if self.names.is_empty() {
            STARTER_POKEMON.iter().map(|s| s.to_string()).collect()
        } else {
            self.names.clone()
        }
    }
}

/// `GET /pokemon?limit=N` index response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PokemonIndex {
    #[serde(default)]
    pub results: Vec<NamedResource>,
}

impl From<PokemonIndex> for NameList {
    fn from(index: PokemonIndex) -> Self {
        Self {
            names: index.results.into_iter().map(|r| r.name).collect(),
        }
    }
}
