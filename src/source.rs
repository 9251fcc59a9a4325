//! Data access for the card: Pokémon lookup and the two cached lists.
//!
//! Everything that talks to the network goes through [`CardDataSource`], so
//! the session and the pipeline can be exercised with an in-memory fake.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::avatar::{AvatarList, avatars_from_listing};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::PokemonEntry;
use crate::pokedex::{NAME_INDEX_LIMIT, NameList, PokemonIndex, PokemonResponse, normalize_query};

/// The narrow interface the session uses to fetch card data.
#[async_trait]
pub trait CardDataSource: Send + Sync {
    /// Looks up a Pokémon by name or Pokédex number.
    async fn fetch_pokemon(&self, query: &str) -> Result<PokemonEntry>;

    /// Loads the pre-generated avatar catalog.
    async fn fetch_avatar_list(&self) -> Result<AvatarList>;

    /// Loads the pre-generated Pokémon name list.
    async fn fetch_name_list(&self) -> Result<NameList>;
}

/// [`CardDataSource`] backed by HTTP and local files.
///
/// List locations starting with `http://` or `https://` are fetched; anything
/// else is read from disk.
#[derive(Debug, Clone)]
pub struct HttpDataSource {
    client: reqwest::Client,
    pokeapi_base_url: String,
    sprite_fallback_template: String,
    avatar_list_location: String,
    name_list_location: String,
}

impl HttpDataSource {
    pub fn new(
        config: &Config,
        avatar_list_location: impl Into<String>,
        name_list_location: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            pokeapi_base_url: config.pokeapi_base_url.trim_end_matches('/').to_string(),
            sprite_fallback_template: config.sprite_fallback_template.clone(),
            avatar_list_location: avatar_list_location.into(),
            name_list_location: name_list_location.into(),
        }
    }

    async fn load_document<T: DeserializeOwned>(&self, location: &str) -> Result<T> {
        if is_remote(location) {
            let response = self.client.get(location).send().await?;
            if !response.status().is_success() {
                return Err(Error::Network(format!("{location} returned {}", response.status())));
            }
            Ok(response.json::<T>().await?)
        } else {
            let contents = tokio::fs::read_to_string(location).await?;
            Ok(serde_json::from_str(&contents)?)
        }
    }
}

#[async_trait]
impl CardDataSource for HttpDataSource {
    async fn fetch_pokemon(&self, query: &str) -> Result<PokemonEntry> {
        let query = normalize_query(query);
        let url = format!("{}/pokemon/{}", self.pokeapi_base_url, query);
        debug!(%url, "Looking up Pokémon");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), %query, "Pokémon lookup failed");
            return Err(Error::NotFound(query));
        }
        let body: PokemonResponse = response.json().await?;
        Ok(body.into_entry(&self.sprite_fallback_template))
    }

    async fn fetch_avatar_list(&self) -> Result<AvatarList> {
        self.load_document(&self.avatar_list_location).await
    }

    async fn fetch_name_list(&self) -> Result<NameList> {
        self.load_document(&self.name_list_location).await
    }
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

// ============================================================================
// Offline collection
// ============================================================================

/// Scrapes the sprite directory listing into an avatar list.
pub async fn collect_avatars(client: &reqwest::Client, listing_url: &str) -> Result<AvatarList> {
    let response = client.get(listing_url).send().await?;
    if !response.status().is_success() {
        return Err(Error::Network(format!(
            "Failed to fetch trainer sprites: {}",
            response.status()
        )));
    }
    let html = response.text().await?;
    Ok(avatars_from_listing(&html))
}

/// Fetches the first [`NAME_INDEX_LIMIT`] names from the Pokémon index.
pub async fn collect_names(client: &reqwest::Client, pokeapi_base_url: &str) -> Result<NameList> {
    let url = format!(
        "{}/pokemon?limit={NAME_INDEX_LIMIT}",
        pokeapi_base_url.trim_end_matches('/')
    );
    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(Error::Network(format!(
            "Failed to fetch Pokemon list: {}",
            response.status()
        )));
    }
    let index: PokemonIndex = response.json().await?;
    Ok(index.into())
}
