//! Settling the images of a visual tree before it is rasterized.
//!
//! Every pending [`ImageNode`](crate::render::ImageNode) is loaded
//! concurrently, each with its own timeout. A failed or timed-out load marks
//! the image as failed and is otherwise ignored: the wait itself never fails.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::future::join_all;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::render::{ImageState, Node};

/// Query parameter carrying the cache-defeating token.
pub const CACHE_BUST_PARAM: &str = "cacheBust";

/// Fetches the bytes behind an image reference.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    /// Loads `href`. When `cache_bust` is set, the load must bypass caches.
    async fn load(&self, href: &str, cache_bust: Option<&str>) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions {
    /// Upper bound on each individual load.
    pub timeout: Duration,
    pub cache_bust: Option<String>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            cache_bust: None,
        }
    }
}

/// Image states in a tree after a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitSummary {
    pub loaded: usize,
    pub failed: usize,
}

/// Loads every pending image in `root` and records the outcome on the node.
pub async fn await_all_images(
    root: &mut Node,
    loader: &dyn ImageLoader,
    options: &WaitOptions,
) -> WaitSummary {
    let mut pending: Vec<_> = root
        .images_mut()
        .into_iter()
        .filter(|image| !image.is_settled())
        .collect();

    let cache_bust = options.cache_bust.as_deref();
    let loads = pending.iter().map(|image| {
        let href = image.href.clone();
        async move {
            match tokio::time::timeout(options.timeout, loader.load(&href, cache_bust)).await {
                Ok(Ok(bytes)) => ImageState::Loaded(bytes),
                Ok(Err(err)) => {
                    warn!(%href, error = %err, "Image failed to load");
                    ImageState::Failed
                }
                Err(_) => {
                    warn!(%href, timeout = ?options.timeout, "Image load timed out");
                    ImageState::Failed
                }
            }
        }
    });
    let states = join_all(loads).await;

    for (image, state) in pending.iter_mut().zip(states) {
        image.state = state;
    }

    let summary = root.images().iter().fold(WaitSummary::default(), |mut s, image| {
        match image.state {
            ImageState::Loaded(_) => s.loaded += 1,
            ImageState::Failed => s.failed += 1,
            ImageState::Pending => {}
        }
        s
    });
    debug!(loaded = summary.loaded, failed = summary.failed, "Images settled");
    summary
}

/// Marks every failed image as pending again, so the next wait retries it.
/// Returns how many were reset.
pub fn reset_failed_images(root: &mut Node) -> usize {
    let mut reset = 0;
    for image in root.images_mut() {
        if image.is_failed() {
            image.state = ImageState::Pending;
            reset += 1;
        }
    }
    reset
}

// ============================================================================
// HttpImageLoader
// ============================================================================

/// [`ImageLoader`] over HTTP. Relative references resolve against the site
/// origin, and `data:` URIs are decoded in place.
#[derive(Debug, Clone)]
pub struct HttpImageLoader {
    client: reqwest::Client,
    origin: Url,
}

impl HttpImageLoader {
    pub fn new(origin: &str) -> Result<Self> {
        let origin = Url::parse(origin).map_err(|e| Error::Config(format!("site origin: {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            origin,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.site_origin)
    }

    /// The absolute URL fetched for `href`.
    pub fn resolve(&self, href: &str, cache_bust: Option<&str>) -> Result<Url> {
        let mut url = self
            .origin
            .join(href)
            .map_err(|e| Error::Network(format!("bad image URL {href}: {e}")))?;
        if let Some(token) = cache_bust {
            url.query_pairs_mut().append_pair(CACHE_BUST_PARAM, token);
        }
        Ok(url)
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, href: &str, cache_bust: Option<&str>) -> Result<Vec<u8>> {
        if let Some(bytes) = decode_data_uri(href) {
            return bytes;
        }

        let url = self.resolve(href, cache_bust)?;
        let mut request = self.client.get(url.clone());
        if cache_bust.is_some() {
            request = request.header(reqwest::header::CACHE_CONTROL, "no-cache");
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Network(format!("{url} returned {}", response.status())));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Decodes a base64 `data:` URI. `None` when `href` is not a data URI.
fn decode_data_uri(href: &str) -> Option<Result<Vec<u8>>> {
    let rest = href.strip_prefix("data:")?;
    let Some((_, payload)) = rest.split_once(";base64,") else {
        return Some(Err(Error::Decode("only base64 data URIs are supported".into())));
    };
    Some(STANDARD.decode(payload).map_err(|e| Error::Decode(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Frame;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeLoader {
        responses: HashMap<String, Vec<u8>>,
        hang: Vec<String>,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl ImageLoader for FakeLoader {
        async fn load(&self, href: &str, cache_bust: Option<&str>) -> Result<Vec<u8>> {
            self.calls
                .lock()
                .unwrap()
                .push((href.to_string(), cache_bust.map(str::to_string)));
            if self.hang.iter().any(|h| h == href) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.responses
                .get(href)
                .cloned()
                .ok_or_else(|| Error::Network(format!("404 {href}")))
        }
    }

    fn tree(hrefs: &[&str]) -> Node {
        Node::group(Frame::from_size(10.0, 10.0)).with_children(
            hrefs
                .iter()
                .map(|href| Node::image(Frame::from_size(5.0, 5.0), *href)),
        )
    }

    #[tokio::test]
    async fn failures_settle_without_failing_the_wait() {
        let loader = FakeLoader {
            responses: HashMap::from([("ok.png".to_string(), vec![1, 2, 3])]),
            ..FakeLoader::default()
        };
        let mut root = tree(&["ok.png", "missing.png"]);

        let summary = await_all_images(&mut root, &loader, &WaitOptions::default()).await;
        assert_eq!(summary, WaitSummary { loaded: 1, failed: 1 });
        assert_eq!(root.images()[0].state, ImageState::Loaded(vec![1, 2, 3]));
        assert!(root.images()[1].is_failed());
    }

    #[tokio::test]
    async fn slow_images_time_out() {
        let loader = FakeLoader {
            responses: HashMap::from([("slow.png".to_string(), vec![1])]),
            hang: vec!["slow.png".to_string()],
            ..FakeLoader::default()
        };
        let mut root = tree(&["slow.png"]);
        let options = WaitOptions {
            timeout: Duration::from_millis(20),
            cache_bust: None,
        };

        let summary = await_all_images(&mut root, &loader, &options).await;
        assert_eq!(summary, WaitSummary { loaded: 0, failed: 1 });
    }

    #[tokio::test]
    async fn settled_images_are_not_reloaded() {
        let loader = FakeLoader::default();
        let mut root = tree(&["a.png"]);
        root.images_mut()[0].state = ImageState::Loaded(vec![9]);

        let summary = await_all_images(&mut root, &loader, &WaitOptions::default()).await;
        assert_eq!(summary.loaded, 1);
        assert!(loader.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_failed_images_retries_with_token() {
        let loader = FakeLoader {
            responses: HashMap::from([("a.png".to_string(), vec![7])]),
            ..FakeLoader::default()
        };
        let mut root = tree(&["a.png", "b.png"]);
        root.images_mut()[0].state = ImageState::Failed;
        root.images_mut()[1].state = ImageState::Loaded(vec![1]);

        assert_eq!(reset_failed_images(&mut root), 1);
        let options = WaitOptions {
            cache_bust: Some("123".into()),
            ..WaitOptions::default()
        };
        await_all_images(&mut root, &loader, &options).await;

        let calls = loader.calls.lock().unwrap();
        assert_eq!(*calls, [("a.png".to_string(), Some("123".to_string()))]);
        assert_eq!(root.images()[0].state, ImageState::Loaded(vec![7]));
    }

    #[test]
    fn relative_urls_resolve_against_origin() {
        let loader = HttpImageLoader::new("http://127.0.0.1:8787").unwrap();
        let url = loader
            .resolve("/api/trainer-avatar?sprite=red.png", Some("42"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8787/api/trainer-avatar?sprite=red.png&cacheBust=42"
        );

        let url = loader.resolve("https://sprites.invalid/25.png", None).unwrap();
        assert_eq!(url.as_str(), "https://sprites.invalid/25.png");
    }

    #[tokio::test]
    async fn data_uris_are_decoded_locally() {
        let loader = HttpImageLoader::new("http://127.0.0.1:8787").unwrap();
        let bytes = loader.load("data:image/png;base64,AQID", None).await.unwrap();
        assert_eq!(bytes, [1, 2, 3]);

        assert!(matches!(
            loader.load("data:image/svg+xml,<svg/>", None).await,
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn bad_origin_is_a_config_error() {
        assert!(matches!(HttpImageLoader::new("not a url"), Err(Error::Config(_))));
    }
}
