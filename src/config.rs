//! Runtime configuration, read from a TOML file.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//!
//! ```toml
//! pokeapi_base_url = "https://pokeapi.co/api/v2"
//! proxy_bind = "127.0.0.1:8787"
//! pixel_ratio = 2.0
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};

use crate::pokedex::DEFAULT_SPRITE_TEMPLATE;

pub const DEFAULT_POKEAPI_BASE_URL: &str = "https://pokeapi.co/api/v2";
pub const DEFAULT_AVATAR_UPSTREAM_URL: &str = "https://play.pokemonshowdown.com/sprites/trainers/";

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config at {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config at {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base of the Pokémon lookup API.
    pub pokeapi_base_url: String,
    /// Directory on the sprite host that the avatar proxy forwards to.
    pub avatar_upstream_url: String,
    /// Fallback sprite URL; `{id}` is replaced by the Pokédex number.
    pub sprite_fallback_template: String,
    /// Origin that relative image URLs (such as the avatar proxy) resolve
    /// against during export.
    pub site_origin: String,
    /// Address the avatar proxy listens on.
    pub proxy_bind: String,
    /// Worker threads serving proxy requests.
    pub proxy_workers: usize,
    /// Device pixels per layout pixel in exported images.
    pub pixel_ratio: f32,
    /// Color composited behind transparent regions of exports.
    pub background_fill: String,
    /// Upper bound on a single image load during export.
    pub image_timeout_ms: u64,
    /// Delay before a download's object URL is released.
    pub release_delay_ms: u64,
    /// How long a toast stays visible.
    pub toast_duration_ms: u64,
    /// Where downloads are written. Defaults to the user's Downloads folder.
    pub downloads_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pokeapi_base_url: DEFAULT_POKEAPI_BASE_URL.to_string(),
            avatar_upstream_url: DEFAULT_AVATAR_UPSTREAM_URL.to_string(),
            sprite_fallback_template: DEFAULT_SPRITE_TEMPLATE.to_string(),
            site_origin: "http://127.0.0.1:8787".to_string(),
            proxy_bind: "127.0.0.1:8787".to_string(),
            proxy_workers: 4,
            pixel_ratio: 2.0,
            background_fill: "#ffffff".to_string(),
            image_timeout_ms: 10_000,
            release_delay_ms: 1_000,
            toast_duration_ms: 2_600,
            downloads_dir: None,
        }
    }
}

impl Config {
    /// Loads the config at `path`, or the defaults when the file is absent.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads from `path` if given, else from the platform config directory.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => match Self::default_path() {
                Some(path) => Self::load_from_path(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// `<config dir>/trainer-card/config.toml`, when the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "trainer-card", "trainer-card")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_millis(self.image_timeout_ms)
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.release_delay_ms)
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }

    /// The configured downloads directory, the user's Downloads folder, or
    /// the current directory, in that order.
    pub fn resolve_downloads_dir(&self) -> PathBuf {
        self.downloads_dir
            .clone()
            .or_else(|| UserDirs::new().and_then(|d| d.download_dir().map(Path::to_path_buf)))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.toast_duration(), Duration::from_millis(2600));
        assert_eq!(config.release_delay(), Duration::from_secs(1));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pixel_ratio = 3.0\nproxy_bind = \"0.0.0.0:9000\"").unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.pixel_ratio, 3.0);
        assert_eq!(config.proxy_bind, "0.0.0.0:9000");
        assert_eq!(config.pokeapi_base_url, DEFAULT_POKEAPI_BASE_URL);
        assert_eq!(config.proxy_workers, 4);
    }

    #[test]
    fn parse_errors_name_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pixel_ratio = \"lots\"").unwrap();

        let err = Config::load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn explicit_downloads_dir_wins() {
        let config = Config {
            downloads_dir: Some(PathBuf::from("/tmp/cards")),
            ..Config::default()
        };
        assert_eq!(config.resolve_downloads_dir(), PathBuf::from("/tmp/cards"));
    }
}
