//! trainer-card: Pokémon trainer card rendering and export
//!
//! This crate turns a [`CardModel`] into visual trees for the card front and
//! back, rasterizes them into PNG exports, and delivers the result. It also
//! carries the small HTTP proxy that serves trainer sprites same-origin.
//!
//! # Example
//!
//! ```
//! use trainer_card::{CardModel, PatternKind, RenderOptions, Tag, render_front};
//!
//! let mut model = CardModel::default();
//! model.trainer_name = "Misty".into();
//! model.background_color = "#1976d2".into();
//! model.pattern = PatternKind::Waves;
//!
//! let pattern = model.pattern_descriptor();
//! let front = render_front(&model, &pattern, RenderOptions::export(2024));
//!
//! assert_eq!(front.count_tagged(|t| *t == Tag::EmptySlot), 6);
//! assert!(front.to_svg().contains("<pattern"));
//! ```
//!
//! # Exporting
//!
//! Exports are built off-screen, captured at 2× on white, and handed to a
//! [`DownloadHost`](dispatch::DownloadHost):
//!
//! ```no_run
//! use std::sync::Arc;
//! use trainer_card::dispatch::{FsDownloadHost, NoShare};
//! use trainer_card::images::HttpImageLoader;
//! use trainer_card::session::{CardSession, ExportContext};
//! use trainer_card::source::HttpDataSource;
//! use trainer_card::{Config, ExportKind};
//!
//! # async fn run() -> trainer_card::Result<()> {
//! let config = Config::default();
//! let ctx = ExportContext::new(
//!     &config,
//!     Arc::new(HttpImageLoader::from_config(&config)?),
//!     Arc::new(NoShare),
//!     Arc::new(FsDownloadHost::new(config.resolve_downloads_dir())),
//! );
//! let source = HttpDataSource::new(&config, "trainer-avatars.json", "pokemon-list.json");
//! let mut session = CardSession::new(source, &config);
//! session.add_pokemon("pikachu").await;
//! session.export(ExportKind::Single, &ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod avatar;
pub mod color;
pub mod config;
pub mod dispatch;
mod error;
pub mod export;
pub mod images;
pub mod model;
pub mod pattern;
pub mod pokedex;
pub mod proxy;
pub mod render;
pub mod session;
pub mod source;

pub use avatar::{AvatarCatalog, AvatarList, TrainerAvatar};
pub use color::{Paint, Theme};
pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use export::{ExportArtifact, ExportKind};
pub use model::{Action, BioFields, CardModel, PokemonEntry, PokemonPick, SlotId, Transition, reduce};
pub use pattern::{PatternCache, PatternDescriptor, PatternKind, generate};
pub use render::{Node, RenderOptions, Tag, render_back, render_front, render_export_panel, render_sheet};
