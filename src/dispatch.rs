//! Handing a finished export to the user.
//!
//! Delivery tries the share target first. If it cannot share files, or the
//! share is cancelled or refused, the file is downloaded through an object
//! URL on the [`DownloadHost`]; hosts that cannot download open the URL
//! instead. The URL is released after a short delay either way.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::export::{ExportArtifact, PNG_MIME};

/// A named in-memory file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl FileBlob {
    pub fn png(name: impl Into<String>, artifact: &ExportArtifact) -> Self {
        Self {
            name: name.into(),
            mime: PNG_MIME.to_string(),
            bytes: artifact.png.clone(),
        }
    }
}

/// A system share sheet or similar.
#[async_trait]
pub trait ShareTarget: Send + Sync {
    fn can_share(&self, file: &FileBlob) -> bool;

    /// Shares the file. An error means the user cancelled or the target
    /// refused.
    async fn share(&self, file: &FileBlob) -> Result<()>;
}

/// The environment that turns blobs into downloads.
#[async_trait]
pub trait DownloadHost: Send + Sync {
    /// Whether [`click_download`](Self::click_download) is available.
    fn supports_download(&self) -> bool;

    /// Registers the blob and returns a URL that refers to it.
    fn create_object_url(&self, blob: FileBlob) -> Result<String>;

    /// Saves the blob behind `url` under `filename`.
    async fn click_download(&self, url: &str, filename: &str) -> Result<()>;

    /// Shows the blob behind `url` in a new viewing context.
    async fn open_in_new_context(&self, url: &str) -> Result<()>;

    /// Releases `url`. Unknown URLs are ignored.
    fn revoke(&self, url: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// Delay before the object URL is revoked.
    pub release_delay: Duration,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            release_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Shared,
    Downloaded { url: String },
    OpenedInNewContext { url: String },
}

/// Delivers an artifact as `filename`. Best effort, no retries.
///
/// Must be called inside a tokio runtime: revocation runs on a detached
/// task that owns only the URL and the host handle.
pub async fn deliver(
    artifact: &ExportArtifact,
    filename: &str,
    share: &dyn ShareTarget,
    host: Arc<dyn DownloadHost>,
    options: &DeliveryOptions,
) -> Result<DeliveryOutcome> {
    let blob = FileBlob::png(filename, artifact);

    if share.can_share(&blob) {
        match share.share(&blob).await {
            Ok(()) => {
                info!(%filename, "Shared export");
                return Ok(DeliveryOutcome::Shared);
            }
            Err(err) => debug!(error = %err, "Share declined, falling back to download"),
        }
    }

    let url = host.create_object_url(blob)?;
    let result = if host.supports_download() {
        host.click_download(&url, filename)
            .await
            .map(|()| DeliveryOutcome::Downloaded { url: url.clone() })
    } else {
        host.open_in_new_context(&url)
            .await
            .map(|()| DeliveryOutcome::OpenedInNewContext { url: url.clone() })
    };

    let delay = options.release_delay;
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        host.revoke(&url);
    });

    if let Ok(outcome) = &result {
        info!(%filename, ?outcome, "Delivered export");
    }
    result
}

// ============================================================================
// Native implementations
// ============================================================================

/// A share target that never shares. Delivery always downloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoShare;

#[async_trait]
impl ShareTarget for NoShare {
    fn can_share(&self, _file: &FileBlob) -> bool {
        false
    }

    async fn share(&self, _file: &FileBlob) -> Result<()> {
        Err(Error::Share("sharing is not available".to_string()))
    }
}

/// Downloads into a directory on disk.
#[derive(Debug)]
pub struct FsDownloadHost {
    dir: PathBuf,
    objects: Mutex<HashMap<String, FileBlob>>,
    next_id: AtomicU64,
}

impl FsDownloadHost {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            objects: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of object URLs not yet revoked.
    pub fn live_urls(&self) -> usize {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn save(&self, url: &str, filename: &str) -> Result<PathBuf> {
        let blob = self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object URL {url}")))?;

        // Only the final component of the name is used.
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| Error::Io(std::io::Error::other(format!("invalid file name {filename:?}"))))?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, &blob.bytes).await?;
        info!(path = %path.display(), bytes = blob.bytes.len(), "Saved download");
        Ok(path)
    }
}

#[async_trait]
impl DownloadHost for FsDownloadHost {
    fn supports_download(&self) -> bool {
        true
    }

    fn create_object_url(&self, blob: FileBlob) -> Result<String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = format!("blob:trainer-card/{id}");
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.clone(), blob);
        Ok(url)
    }

    async fn click_download(&self, url: &str, filename: &str) -> Result<()> {
        self.save(url, filename).await.map(|_| ())
    }

    async fn open_in_new_context(&self, url: &str) -> Result<()> {
        let name = self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .map(|blob| blob.name.clone())
            .ok_or_else(|| Error::NotFound(format!("object URL {url}")))?;
        self.save(url, &name).await.map(|_| ())
    }

    fn revoke(&self, url: &str) {
        if self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(url)
            .is_some()
        {
            debug!(%url, "Revoked object URL");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Paint;

    fn artifact() -> ExportArtifact {
        ExportArtifact {
            png: vec![0x89, b'P', b'N', b'G'],
            width: 2,
            height: 2,
            pixel_ratio: 2.0,
            background: Paint::WHITE,
        }
    }

    fn quick() -> DeliveryOptions {
        DeliveryOptions {
            release_delay: Duration::from_millis(10),
        }
    }

    struct FakeShare {
        accept: bool,
        shared: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ShareTarget for FakeShare {
        fn can_share(&self, file: &FileBlob) -> bool {
            file.mime == PNG_MIME
        }

        async fn share(&self, file: &FileBlob) -> Result<()> {
            self.shared.lock().unwrap().push(file.name.clone());
            if self.accept {
                Ok(())
            } else {
                Err(Error::Share("AbortError".into()))
            }
        }
    }

    #[derive(Default)]
    struct RecordingHost {
        download: bool,
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DownloadHost for RecordingHost {
        fn supports_download(&self) -> bool {
            self.download
        }

        fn create_object_url(&self, blob: FileBlob) -> Result<String> {
            self.events.lock().unwrap().push(format!("create {}", blob.name));
            Ok("blob:test/0".into())
        }

        async fn click_download(&self, url: &str, filename: &str) -> Result<()> {
            self.events.lock().unwrap().push(format!("click {url} {filename}"));
            Ok(())
        }

        async fn open_in_new_context(&self, url: &str) -> Result<()> {
            self.events.lock().unwrap().push(format!("open {url}"));
            Ok(())
        }

        fn revoke(&self, url: &str) {
            self.events.lock().unwrap().push(format!("revoke {url}"));
        }
    }

    #[tokio::test]
    async fn successful_share_skips_download() {
        let share = FakeShare {
            accept: true,
            shared: Mutex::new(vec![]),
        };
        let host = Arc::new(RecordingHost::default());

        let outcome = deliver(&artifact(), "ash-card.png", &share, host.clone(), &quick())
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::Shared);
        assert_eq!(*share.shared.lock().unwrap(), ["ash-card.png"]);
        assert!(host.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_share_falls_through_to_download() {
        let share = FakeShare {
            accept: false,
            shared: Mutex::new(vec![]),
        };
        let host = Arc::new(RecordingHost {
            download: true,
            ..RecordingHost::default()
        });

        let outcome = deliver(&artifact(), "ash-card.png", &share, host.clone(), &quick())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DeliveryOutcome::Downloaded {
                url: "blob:test/0".into()
            }
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            *host.events.lock().unwrap(),
            [
                "create ash-card.png",
                "click blob:test/0 ash-card.png",
                "revoke blob:test/0"
            ]
        );
    }

    #[tokio::test]
    async fn hosts_without_download_open_the_url() {
        let host = Arc::new(RecordingHost::default());
        let outcome = deliver(&artifact(), "x.png", &NoShare, host.clone(), &quick())
            .await
            .unwrap();
        assert!(matches!(outcome, DeliveryOutcome::OpenedInNewContext { .. }));
        assert!(host.events.lock().unwrap().contains(&"open blob:test/0".to_string()));
    }

    #[tokio::test]
    async fn revocation_waits_for_the_delay() {
        let host = Arc::new(RecordingHost {
            download: true,
            ..RecordingHost::default()
        });
        let options = DeliveryOptions {
            release_delay: Duration::from_secs(30),
        };
        deliver(&artifact(), "x.png", &NoShare, host.clone(), &options)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!host.events.lock().unwrap().iter().any(|e| e.starts_with("revoke")));
    }

    #[tokio::test]
    async fn fs_host_writes_into_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(FsDownloadHost::new(dir.path()));

        deliver(&artifact(), "trainer-card.png", &NoShare, host.clone(), &quick())
            .await
            .unwrap();

        let saved = std::fs::read(dir.path().join("trainer-card.png")).unwrap();
        assert_eq!(saved, artifact().png);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(host.live_urls(), 0);
    }

    #[tokio::test]
    async fn fs_host_strips_directories_from_names() {
        let dir = tempfile::tempdir().unwrap();
        let host = FsDownloadHost::new(dir.path());
        let url = host.create_object_url(FileBlob::png("a.png", &artifact())).unwrap();

        host.click_download(&url, "../../escape.png").await.unwrap();
        assert!(dir.path().join("escape.png").exists());

        host.revoke(&url);
        assert!(matches!(
            host.click_download(&url, "a.png").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn fs_host_opens_under_the_blob_name() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("downloads");
        let host = FsDownloadHost::new(&nested);
        let url = host
            .create_object_url(FileBlob::png("misty-card.png", &artifact()))
            .unwrap();

        host.open_in_new_context(&url).await.unwrap();
        let saved = tokio::fs::read(nested.join("misty-card.png")).await.unwrap();
        assert_eq!(saved, artifact().png);
    }
}
