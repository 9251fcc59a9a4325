//! The editing session: one card, its catalogs, and the status line.
//!
//! [`CardSession`] is what a front end drives. It applies actions through
//! the reducer, turns fetch failures into status text, keeps the toast
//! timer, and runs exports end to end.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Datelike;
use tracing::{info, warn};

use crate::avatar::{AvatarCatalog, Suggestions, TrainerAvatar};
use crate::config::Config;
use crate::dispatch::{DeliveryOptions, DeliveryOutcome, DownloadHost, ShareTarget, deliver};
use crate::error::Result;
use crate::export::{CaptureOptions, ExportKind, capture, export_filename};
use crate::images::ImageLoader;
use crate::model::{Action, CardModel, TEAM_FULL_MESSAGE, reduce};
use crate::pattern::{PatternCache, PatternDescriptor};
use crate::pokedex::NameList;
use crate::render::{self, Node, RenderOptions};
use crate::source::CardDataSource;

pub const EMPTY_QUERY_MESSAGE: &str = "Enter a Pokémon name or Pokédex number first.";
pub const NOT_FOUND_MESSAGE: &str = "Pokémon not found. Check the spelling and try again.";

/// A transient notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub message: String,
    pub expires_at: Instant,
}

/// Everything an export needs besides the card.
#[derive(Clone)]
pub struct ExportContext {
    pub loader: Arc<dyn ImageLoader>,
    pub share: Arc<dyn ShareTarget>,
    pub host: Arc<dyn DownloadHost>,
    pub capture: CaptureOptions,
    pub delivery: DeliveryOptions,
}

impl ExportContext {
    pub fn new(
        config: &Config,
        loader: Arc<dyn ImageLoader>,
        share: Arc<dyn ShareTarget>,
        host: Arc<dyn DownloadHost>,
    ) -> Self {
        Self {
            loader,
            share,
            host,
            capture: CaptureOptions::from_config(config),
            delivery: DeliveryOptions {
                release_delay: config.release_delay(),
            },
        }
    }
}

pub struct CardSession<S> {
    source: S,
    model: CardModel,
    avatars: AvatarCatalog,
    names: NameList,
    status: String,
    toast: Option<Toast>,
    toast_duration: Duration,
    patterns: PatternCache,
    year: i32,
}

impl<S: CardDataSource> CardSession<S> {
    pub fn new(source: S, config: &Config) -> Self {
        Self {
            source,
            model: CardModel::default(),
            avatars: AvatarCatalog::new(),
            names: NameList::default(),
            status: String::new(),
            toast: None,
            toast_duration: config.toast_duration(),
            patterns: PatternCache::new(),
            year: chrono::Local::now().year(),
        }
    }

    /// Starts from an existing card instead of the default one.
    pub fn with_model(mut self, model: CardModel) -> Self {
        self.model = model;
        self
    }

    /// Overrides the year printed on the card.
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = year;
        self
    }

    pub fn model(&self) -> &CardModel {
        &self.model
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn avatars(&self) -> &AvatarCatalog {
        &self.avatars
    }

    pub fn names(&self) -> &NameList {
        &self.names
    }

    /// The toast message, if it is still showing at `now`.
    pub fn toast_at(&self, now: Instant) -> Option<&str> {
        self.toast
            .as_ref()
            .filter(|toast| now < toast.expires_at)
            .map(|toast| toast.message.as_str())
    }

    pub fn toast(&self) -> Option<&str> {
        self.toast_at(Instant::now())
    }

    /// Shows a toast. A newer toast replaces the current one and restarts
    /// the timer.
    pub fn show_toast(&mut self, message: impl Into<String>) {
        self.toast = Some(Toast {
            message: message.into(),
            expires_at: Instant::now() + self.toast_duration,
        });
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Applies an action. Returns false when it was refused.
    pub fn dispatch(&mut self, action: Action) -> bool {
        let transition = reduce(&self.model, action);
        if let Some(status) = transition.status {
            self.set_status(status);
        }
        if let Some(toast) = transition.toast {
            self.show_toast(toast);
        }
        self.model = transition.model;
        !transition.rejected
    }

    // ------------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------------

    /// Looks up a Pokémon and adds it to the team.
    pub async fn add_pokemon(&mut self, query: &str) -> bool {
        if query.trim().is_empty() {
            self.set_status(EMPTY_QUERY_MESSAGE);
            return false;
        }
        if self.model.is_team_full() {
            self.set_status(TEAM_FULL_MESSAGE);
            return false;
        }

        match self.source.fetch_pokemon(query).await {
            Ok(entry) => {
                info!(name = %entry.name, id = entry.id, "Adding Pokémon");
                self.dispatch(Action::AddPokemon(entry))
            }
            Err(err) => {
                warn!(%query, error = %err, "Pokémon lookup failed");
                self.set_status(NOT_FOUND_MESSAGE);
                false
            }
        }
    }

    /// Loads the remote avatar catalog. On failure the built-ins remain.
    pub async fn load_avatar_list(&mut self) -> bool {
        match self.source.fetch_avatar_list().await {
            Ok(list) => {
                info!(count = list.avatars.len(), "Loaded avatar list");
                self.avatars.set_remote(list.avatars);
                true
            }
            Err(err) => {
                warn!(error = %err, "Unable to load trainer avatars");
                false
            }
        }
    }

    /// Loads the Pokémon name list. On failure suggestions stay empty.
    pub async fn load_name_list(&mut self) -> bool {
        match self.source.fetch_name_list().await {
            Ok(list) => {
                info!(count = list.names.len(), "Loaded Pokémon names");
                self.names = list;
                true
            }
            Err(err) => {
                warn!(error = %err, "Unable to load Pokémon list");
                false
            }
        }
    }

    pub fn avatar_suggestions(&self, query: &str) -> Suggestions<TrainerAvatar> {
        self.avatars.suggest(query)
    }

    pub fn name_suggestions(&self, query: &str) -> Suggestions<String> {
        self.names.suggest(query)
    }

    /// Selects a catalog avatar by id. Returns false for unknown ids.
    pub fn select_avatar(&mut self, id: &str) -> bool {
        match self.avatars.find(id).cloned() {
            Some(avatar) => self.dispatch(Action::SelectAvatar(avatar)),
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Rendering and export
    // ------------------------------------------------------------------------

    pub fn pattern(&mut self) -> PatternDescriptor {
        self.patterns
            .get(
                self.model.pattern,
                self.model.background_is_light(),
                self.model.effective_pattern_scale(),
            )
            .clone()
    }

    pub fn render_front(&mut self) -> Node {
        let pattern = self.pattern();
        render::render_front(&self.model, &pattern, RenderOptions::preview(self.year))
    }

    pub fn render_back(&mut self) -> Node {
        let pattern = self.pattern();
        render::render_back(&self.model, &pattern, RenderOptions::preview(self.year))
    }

    pub fn export_filename(&self, kind: ExportKind) -> String {
        export_filename(&self.model.trainer_name, kind)
    }

    /// Builds, captures and delivers an export, updating the status line.
    pub async fn export(&mut self, kind: ExportKind, ctx: &ExportContext) -> Result<DeliveryOutcome> {
        self.set_status(kind.progress_message());

        let pattern = self.pattern();
        let mut container = kind.render(&self.model, &pattern, self.year);
        let filename = self.export_filename(kind);

        let result: Result<DeliveryOutcome> = async {
            let artifact = capture(&mut container, ctx.loader.as_ref(), &ctx.capture).await?;
            deliver(
                &artifact,
                &filename,
                ctx.share.as_ref(),
                Arc::clone(&ctx.host),
                &ctx.delivery,
            )
            .await
        }
        .await;

        match &result {
            Ok(_) => self.set_status(kind.success_message()),
            Err(err) => {
                warn!(?kind, error = %err, "Export failed");
                self.set_status(kind.failure_message());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::AvatarList;
    use crate::dispatch::{FsDownloadHost, NoShare};
    use crate::error::Error;
    use crate::model::{PokemonEntry, TEAM_SIZE};
    use crate::render::Tag;
    use async_trait::async_trait;
    use image::RgbaImage;

    #[derive(Default)]
    struct FakeSource {
        avatars: Option<AvatarList>,
        names: Option<NameList>,
    }

    #[async_trait]
    impl CardDataSource for FakeSource {
        async fn fetch_pokemon(&self, query: &str) -> Result<PokemonEntry> {
            let query = crate::pokedex::normalize_query(query);
            match query.as_str() {
                "pikachu" | "25" => Ok(PokemonEntry {
                    id: 25,
                    name: "Pikachu".into(),
                    sprite: "https://sprites.invalid/25.png".into(),
                    types: vec!["Electric".into()],
                }),
                _ => Err(Error::NotFound(query)),
            }
        }

        async fn fetch_avatar_list(&self) -> Result<AvatarList> {
            self.avatars.clone().ok_or_else(|| Error::Network("offline".into()))
        }

        async fn fetch_name_list(&self) -> Result<NameList> {
            self.names.clone().ok_or_else(|| Error::Network("offline".into()))
        }
    }

    struct BlankLoader;

    #[async_trait]
    impl ImageLoader for BlankLoader {
        async fn load(&self, _href: &str, _cache_bust: Option<&str>) -> Result<Vec<u8>> {
            crate::render::svg::encode_png(&RgbaImage::new(2, 2))
        }
    }

    fn session() -> CardSession<FakeSource> {
        CardSession::new(FakeSource::default(), &Config::default()).with_year(2024)
    }

    #[tokio::test]
    async fn add_pokemon_messages() {
        let mut s = session();

        assert!(!s.add_pokemon("   ").await);
        assert_eq!(s.status(), EMPTY_QUERY_MESSAGE);

        assert!(!s.add_pokemon("missingno").await);
        assert_eq!(s.status(), NOT_FOUND_MESSAGE);

        assert!(s.add_pokemon(" Pikachu ").await);
        assert_eq!(s.status(), "Pikachu added to your party!");
        assert_eq!(s.toast(), Some("Pikachu added to the front!"));
        assert_eq!(s.model().team.len(), 1);
    }

    #[tokio::test]
    async fn full_team_is_refused_before_fetching() {
        let mut s = session();
        for _ in 0..TEAM_SIZE {
            assert!(s.add_pokemon("25").await);
        }
        let before = s.model().clone();

        assert!(!s.add_pokemon("pikachu").await);
        assert_eq!(s.status(), TEAM_FULL_MESSAGE);
        assert_eq!(*s.model(), before);
    }

    #[tokio::test]
    async fn list_failures_keep_defaults() {
        let mut s = session();
        let builtin = s.avatars().len();

        assert!(!s.load_avatar_list().await);
        assert!(!s.load_name_list().await);
        assert_eq!(s.avatars().len(), builtin);
        assert_eq!(s.names().favorite_options().len(), 6);
    }

    #[tokio::test]
    async fn lists_feed_suggestions() {
        let source = FakeSource {
            avatars: Some(AvatarList {
                avatars: vec![TrainerAvatar::new("youngster", "Youngster", "youngster.png")],
            }),
            names: Some(NameList {
                names: vec!["pikachu".into(), "pichu".into()],
            }),
        };
        let mut s = CardSession::new(source, &Config::default());
        assert!(s.load_avatar_list().await);
        assert!(s.load_name_list().await);

        assert_eq!(s.avatar_suggestions("young").items[0].id, "youngster");
        assert_eq!(s.name_suggestions("pik").items, ["pikachu"]);

        assert!(s.select_avatar("youngster"));
        assert_eq!(s.model().avatar.id, "youngster");
        assert_eq!(s.toast(), Some("Youngster added to the front!"));
        assert!(!s.select_avatar("nobody"));
    }

    #[test]
    fn toast_expires_after_duration() {
        let mut s = session();
        s.show_toast("hello");
        let now = Instant::now();
        assert_eq!(s.toast_at(now), Some("hello"));
        assert_eq!(s.toast_at(now + Duration::from_millis(2700)), None);

        s.show_toast("again");
        assert_eq!(s.toast(), Some("again"));
    }

    #[test]
    fn preview_uses_session_year_and_controls() {
        let mut s = session();
        let front = s.render_front();
        assert!(front.find_text("2024").is_some());
        assert!(front.find_text("EMPTY SLOT").is_some());
        assert!(s.render_back().find_tagged(Tag::BioPanel).is_some());
    }

    #[tokio::test]
    async fn export_downloads_with_status() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            release_delay_ms: 10,
            ..Config::default()
        };
        let ctx = ExportContext::new(
            &config,
            Arc::new(BlankLoader),
            Arc::new(NoShare),
            Arc::new(FsDownloadHost::new(dir.path())),
        );

        let mut s = session();
        s.dispatch(Action::SetTrainerName("".into()));
        let outcome = s.export(ExportKind::Single, &ctx).await.unwrap();

        assert!(matches!(outcome, DeliveryOutcome::Downloaded { .. }));
        assert_eq!(s.status(), ExportKind::Single.success_message());
        assert!(dir.path().join("trainer-card.png").exists());
    }

    #[tokio::test]
    async fn export_failure_sets_retry_status() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            pixel_ratio: 0.0,
            ..Config::default()
        };
        let ctx = ExportContext::new(
            &config,
            Arc::new(BlankLoader),
            Arc::new(NoShare),
            Arc::new(FsDownloadHost::new(dir.path())),
        );

        let mut s = session();
        let result = s.export(ExportKind::Sheet, &ctx).await;

        assert!(matches!(result, Err(Error::Render(_))));
        assert_eq!(s.status(), "Unable to build the sheet. Try again in a few seconds.");
        assert!(!dir.path().join("trainer-card-sheet.png").exists());
    }
}
