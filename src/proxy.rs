//! Same-origin proxy for trainer sprites.
//!
//! `GET /api/trainer-avatar?sprite=<file>` fetches `<file>` from the sprite
//! host and streams it back with long-lived cache headers, so exported cards
//! can embed avatars without cross-origin restrictions.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use url::form_urlencoded;

use crate::avatar::AVATAR_PROXY_PATH;
use crate::error::{Error, Result};

pub const CACHE_CONTROL: &str = "public, max-age=86400";
const DEFAULT_CONTENT_TYPE: &str = "image/png";

/// What the upstream host answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetches a URL from the sprite host. An `Err` means no response arrived.
pub trait UpstreamFetch: Send + Sync {
    fn fetch(&self, url: &str) -> Result<UpstreamResponse>;
}

/// [`UpstreamFetch`] over a blocking reqwest client.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::blocking::Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl UpstreamFetch for HttpUpstream {
    fn fetch(&self, url: &str) -> Result<UpstreamResponse> {
        let response = self.client.get(url).send()?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes()?.to_vec();
        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

/// A response from the proxy, independent of the HTTP server in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ProxyResponse {
    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "text/plain; charset=utf-8".into())],
            body: body.as_bytes().to_vec(),
        }
    }

    /// The first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// ============================================================================
// AvatarProxy
// ============================================================================

pub struct AvatarProxy<F> {
    upstream_base: String,
    fetch: F,
}

impl<F: UpstreamFetch> AvatarProxy<F> {
    pub fn new(upstream_base: impl Into<String>, fetch: F) -> Self {
        Self {
            upstream_base: upstream_base.into(),
            fetch,
        }
    }

    /// The upstream URL for a sprite file. The name is percent-encoded as a
    /// single path component.
    pub fn upstream_url(&self, sprite: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(sprite.as_bytes()).collect();
        format!("{}{}", self.upstream_base, encoded.replace('+', "%20"))
    }

    /// Routes one request. `target` is the request path with its query.
    pub fn handle(&self, method: &str, target: &str) -> ProxyResponse {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        if path != AVATAR_PROXY_PATH {
            return ProxyResponse::text(404, "Not found");
        }
        if !method.eq_ignore_ascii_case("GET") {
            return ProxyResponse::text(405, "Method not allowed");
        }

        let sprite = form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "sprite")
            .map(|(_, value)| value.into_owned());
        match sprite {
            Some(sprite) if !sprite.is_empty() => self.avatar(&sprite),
            _ => ProxyResponse::text(400, "Missing sprite param"),
        }
    }

    fn avatar(&self, sprite: &str) -> ProxyResponse {
        let url = self.upstream_url(sprite);
        let upstream = match self.fetch.fetch(&url) {
            Ok(upstream) => upstream,
            Err(err) => {
                warn!(%sprite, error = %err, "Upstream unreachable");
                return ProxyResponse::text(502, "Avatar not found");
            }
        };

        if !upstream.is_success() {
            info!(%sprite, status = upstream.status, "Upstream has no such avatar");
            return ProxyResponse::text(upstream.status, "Avatar not found");
        }

        info!(%sprite, bytes = upstream.body.len(), "Proxied avatar");
        ProxyResponse {
            status: 200,
            headers: vec![
                (
                    "Content-Type".into(),
                    upstream
                        .content_type
                        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                ),
                ("Cache-Control".into(), CACHE_CONTROL.into()),
                ("Access-Control-Allow-Origin".into(), "*".into()),
            ],
            body: upstream.body,
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// Binds `addr` and serves the proxy with `workers` threads until the
/// process exits.
pub fn serve<F: UpstreamFetch + 'static>(addr: &str, proxy: AvatarProxy<F>, workers: usize) -> Result<()> {
    let server = tiny_http::Server::http(addr)
        .map_err(|e| Error::Network(format!("cannot bind {addr}: {e}")))?;
    info!(%addr, workers, "Avatar proxy listening");
    serve_on(Arc::new(server), Arc::new(proxy), workers);
    Ok(())
}

/// Serves requests from an already bound server on a fixed pool of worker
/// threads (at least one). Returns once every worker has stopped.
pub fn serve_on<F: UpstreamFetch + 'static>(
    server: Arc<tiny_http::Server>,
    proxy: Arc<AvatarProxy<F>>,
    workers: usize,
) {
    let handles: Vec<_> = (0..workers.max(1))
        .map(|worker| {
            let server = Arc::clone(&server);
            let proxy = Arc::clone(&proxy);
            std::thread::spawn(move || {
                loop {
                    match server.recv() {
                        Ok(request) => {
                            let response = proxy.handle(request.method().as_str(), request.url());
                            respond(request, response);
                        }
                        Err(err) => {
                            warn!(worker, error = %err, "Proxy worker stopped");
                            break;
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            warn!("Proxy worker panicked");
        }
    }
}

fn respond(request: tiny_http::Request, response: ProxyResponse) {
    let mut out = tiny_http::Response::from_data(response.body).with_status_code(response.status);
    for (name, value) in &response.headers {
        if let Ok(header) = tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            out.add_header(header);
        }
    }
    if let Err(err) = request.respond(out) {
        warn!(error = %err, "Failed to write proxy response");
    }
}
