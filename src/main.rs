use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Datelike;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use trainer_card::dispatch::{FsDownloadHost, NoShare};
use trainer_card::images::HttpImageLoader;
use trainer_card::proxy::{AvatarProxy, HttpUpstream};
use trainer_card::render::{self, RenderOptions};
use trainer_card::session::{CardSession, ExportContext};
use trainer_card::source::{self, HttpDataSource};
use trainer_card::{CardModel, Config, ExportKind};

#[derive(Parser)]
#[command(name = "trainer-card")]
#[command(about = "Render, export and serve Pokémon trainer cards")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Face {
    Front,
    Back,
    /// Single export panel: front above back
    Panel,
    /// Print sheet with three pairs
    Sheet,
}

#[derive(Subcommand)]
enum Command {
    /// Write a card face or export container as SVG
    Render {
        /// Card snapshot (JSON). The default card when omitted
        #[arg(long)]
        card: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "front")]
        face: Face,
        /// Include editing controls
        #[arg(long)]
        interactive: bool,
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Export a card as PNG into the downloads directory
    Export {
        #[arg(long)]
        card: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "single")]
        kind: ExportKind,
        /// Overrides the configured downloads directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Run the avatar proxy
    Serve {
        /// Overrides the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Build trainer-avatars.json from the sprite directory listing
    CollectAvatars {
        #[arg(long, short, default_value = "public/trainer-avatars.json")]
        out: PathBuf,
    },
    /// Build pokemon-list.json from the Pokémon index
    CollectNames {
        #[arg(long, short, default_value = "public/pokemon-list.json")]
        out: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Render {
            card,
            face,
            interactive,
            out,
        } => {
            let model = load_card(card.as_deref())?;
            let pattern = model.pattern_descriptor();
            let year = chrono::Local::now().year();
            let options = RenderOptions { interactive, year };
            let node = match face {
                Face::Front => render::render_front(&model, &pattern, options),
                Face::Back => render::render_back(&model, &pattern, options),
                Face::Panel => render::render_export_panel(&model, &pattern, year),
                Face::Sheet => render::render_sheet(&model, &pattern, year),
            };
            write_output(&out, node.to_svg().as_bytes())?;
        }
        Command::Export {
            card,
            kind,
            out_dir,
        } => {
            let model = load_card(card.as_deref())?;
            let dir = out_dir.unwrap_or_else(|| config.resolve_downloads_dir());
            let ctx = ExportContext::new(
                &config,
                Arc::new(HttpImageLoader::from_config(&config)?),
                Arc::new(NoShare),
                Arc::new(FsDownloadHost::new(&dir)),
            );
            let data = HttpDataSource::new(&config, "public/trainer-avatars.json", "public/pokemon-list.json");
            let mut session = CardSession::new(data, &config).with_model(model);

            let runtime = tokio::runtime::Runtime::new()?;
            let result = runtime.block_on(async {
                let result = session.export(kind, &ctx).await;
                // Let the delayed object URL release run before exiting.
                tokio::time::sleep(ctx.delivery.release_delay).await;
                result
            });
            println!("{}", session.status());
            result?;
        }
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.proxy_bind.clone());
            let upstream = HttpUpstream::new(config.image_timeout())?;
            let proxy = AvatarProxy::new(config.avatar_upstream_url.clone(), upstream);
            trainer_card::proxy::serve(&bind, proxy, config.proxy_workers)?;
        }
        Command::CollectAvatars { out } => {
            let runtime = tokio::runtime::Runtime::new()?;
            let client = reqwest::Client::new();
            let list = runtime.block_on(source::collect_avatars(&client, &config.avatar_upstream_url))?;
            write_output(&out, serde_json::to_string_pretty(&list)?.as_bytes())?;
            info!(count = list.avatars.len(), path = %out.display(), "Saved trainer avatars");
        }
        Command::CollectNames { out } => {
            let runtime = tokio::runtime::Runtime::new()?;
            let client = reqwest::Client::new();
            let list = runtime.block_on(source::collect_names(&client, &config.pokeapi_base_url))?;
            write_output(&out, serde_json::to_string_pretty(&list)?.as_bytes())?;
            info!(count = list.names.len(), path = %out.display(), "Saved Pokémon names");
        }
    }

    Ok(())
}

fn load_card(path: Option<&Path>) -> Result<CardModel, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(CardModel::from_json(&fs::read_to_string(path)?)?),
        None => Ok(CardModel::default()),
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}
