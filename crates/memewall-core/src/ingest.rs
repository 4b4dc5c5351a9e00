// ABOUTME: Content ingestor turning untrusted bytes into artifacts.
// ABOUTME: Local uploads are written as-is; remote downloads are sniffed while streaming.

use crate::error::{Result, WallError};
use crate::sniff::{sniff, SNIFF_LEN};
use crate::store::{discard, is_allowed_extension, split_file_name, Artifact, ArtifactStore};
use futures::{Stream, StreamExt};
use std::path::Path;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Normalize a requested base name: lower-case, every run of characters outside
/// `[a-z0-9]` becomes one `_`, no leading or trailing `_`.
///
/// `"My Meme!!"` becomes `"my_meme"`.
pub fn sanitize_name(requested: &str) -> String {
    let mut out = String::with_capacity(requested.len());
    let mut pending_separator = false;

    for c in requested.chars().map(|c| c.to_ascii_lowercase()) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(c);
        } else {
            pending_separator = true;
        }
    }

    out
}

/// Validates and writes new artifacts into the store.
#[derive(Debug, Clone)]
pub struct Ingestor {
    store: ArtifactStore,
    client: reqwest::Client,
    max_download_bytes: Option<u64>,
    fetch_timeout: Option<Duration>,
}

/// Deadline for a whole download unless configured otherwise.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

impl Ingestor {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
            max_download_bytes: None,
            fetch_timeout: Some(DEFAULT_FETCH_TIMEOUT),
        }
    }

    /// Abort downloads still running after `timeout` (None = wait forever).
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Cap remote downloads at `limit` bytes (None = unlimited).
    pub fn with_download_limit(mut self, limit: Option<u64>) -> Self {
        self.max_download_bytes = limit;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Store an uploaded file under `sanitize_name(requested_name) + extension`.
    ///
    /// The upload transport already filtered extension and mimetype, so the bytes
    /// are not sniffed again here. `original_extension` keeps its case and may be
    /// given with or without the leading dot.
    pub async fn ingest_local(
        &self,
        bytes: &[u8],
        requested_name: &str,
        original_extension: &str,
    ) -> Result<Artifact> {
        let base = sanitize_name(requested_name);
        if base.is_empty() {
            return Err(WallError::InvalidName(requested_name.to_string()));
        }
        let extension = original_extension.trim_start_matches('.');
        if extension.is_empty() {
            return Err(WallError::InvalidFileType(requested_name.to_string()));
        }
        let file_name = format!("{}.{}", base, extension);

        if self.store.contains(&file_name) {
            return Err(WallError::ArtifactAlreadyExists(file_name));
        }

        let partial = self.store.partial_path();
        if let Err(e) = write_all(&partial, bytes).await {
            discard(&partial).await;
            return Err(e);
        }

        let artifact = self.store.publish(&partial, &file_name).await?;
        info!(file = %file_name, bytes = bytes.len(), "Stored uploaded artifact");
        Ok(artifact)
    }

    /// Download `url` into the store as `requested_file_name`.
    ///
    /// The extension must be allow-listed and must agree with the sniffed type of
    /// the first bytes received; otherwise nothing is left behind.
    pub async fn ingest_from_url(&self, url: &str, requested_file_name: &str) -> Result<Artifact> {
        let extension = check_extension(requested_file_name)?;

        if self.store.contains(requested_file_name) {
            return Err(WallError::ArtifactAlreadyExists(
                requested_file_name.to_string(),
            ));
        }
        // Reject names that would escape the flat directory before touching the network.
        self.store.target_path(requested_file_name)?;

        let parsed = url::Url::parse(url).map_err(|_| WallError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WallError::InvalidUrl(url.to_string()));
        }

        debug!(url = %parsed, file = %requested_file_name, "Fetching remote image");
        let mut request = self.client.get(parsed);
        if let Some(timeout) = self.fetch_timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?.error_for_status()?;

        self.ingest_stream(response.bytes_stream(), requested_file_name, &extension)
            .await
    }

    /// Write a byte stream as `file_name`, sniffing the leading bytes against `extension`.
    ///
    /// Nothing is written until the leading bytes pass the type check. Any failure
    /// (type mismatch, transport error, disk error, size limit) removes the partial file.
    pub async fn ingest_stream<S, B, E>(
        &self,
        stream: S,
        file_name: &str,
        extension: &str,
    ) -> Result<Artifact>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<WallError>,
    {
        let partial = self.store.partial_path();

        match self.write_sniffed(stream, &partial, extension).await {
            Ok(written) => {
                let artifact = self.store.publish(&partial, file_name).await?;
                info!(file = %file_name, bytes = written, "Stored downloaded artifact");
                Ok(artifact)
            }
            Err(e) => {
                discard(&partial).await;
                warn!(file = %file_name, error = %e, "Rejected download");
                Err(e)
            }
        }
    }

    async fn write_sniffed<S, B, E>(&self, stream: S, partial: &Path, extension: &str) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<WallError>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut head: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
        let mut file: Option<File> = None;
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(Into::into)?;
            let chunk = chunk.as_ref();

            written += chunk.len() as u64;
            if let Some(limit) = self.max_download_bytes {
                if written > limit {
                    return Err(WallError::DownloadTooLarge { limit });
                }
            }

            match file.as_mut() {
                Some(f) => f.write_all(chunk).await?,
                None => {
                    head.extend_from_slice(chunk);
                    if head.len() >= SNIFF_LEN {
                        file = Some(open_checked(&head, partial, extension).await?);
                    }
                }
            }
        }

        // Bodies shorter than the sniff window end up here.
        let mut file = match file {
            Some(f) => f,
            None => open_checked(&head, partial, extension).await?,
        };
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

/// Extension of a requested remote file name, if allow-listed.
fn check_extension(requested_file_name: &str) -> Result<String> {
    match split_file_name(requested_file_name) {
        (_, Some(ext)) if is_allowed_extension(ext) => Ok(ext.to_string()),
        _ => Err(WallError::InvalidFileType(requested_file_name.to_string())),
    }
}

/// Sniff the leading bytes and, if they match `extension`, create the partial file
/// and write them to it.
async fn open_checked(head: &[u8], partial: &Path, extension: &str) -> Result<File> {
    match sniff(head) {
        Some(kind) if kind.matches_extension(extension) => {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(partial)
                .await?;
            file.write_all(head).await?;
            Ok(file)
        }
        Some(kind) => Err(WallError::InvalidFileType(format!(
            "content is {} but name claims .{}",
            kind.canonical_extension(),
            extension
        ))),
        None => Err(WallError::InvalidFileType(
            "content is not a recognized image".to_string(),
        )),
    }
}

async fn write_all(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sniff::fixtures::{GIF, JPEG, PNG};
    use futures::stream;
    use tempfile::TempDir;

    fn ingestor() -> (TempDir, Ingestor) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        (dir, Ingestor::new(store))
    }

    fn chunks(parts: Vec<&'static [u8]>) -> impl Stream<Item = std::result::Result<Vec<u8>, WallError>> {
        stream::iter(parts.into_iter().map(|p| Ok(p.to_vec())))
    }

    fn visible_files(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("My Meme!!"), "my_meme");
        assert_eq!(sanitize_name("cat"), "cat");
        assert_eq!(sanitize_name("  Grumpy--Cat 2 "), "grumpy_cat_2");
        assert_eq!(sanitize_name("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_name("Ünïcødé"), "n_c_d");
        assert_eq!(sanitize_name("!!!"), "");
    }

    #[tokio::test]
    async fn test_ingest_local_normalizes_name_and_keeps_extension_case() {
        let (dir, ingestor) = ingestor();
        let artifact = ingestor
            .ingest_local(PNG, "My Meme!!", ".PNG")
            .await
            .unwrap();

        assert_eq!(artifact.file_name(), "my_meme.PNG");
        assert_eq!(std::fs::read(dir.path().join("my_meme.PNG")).unwrap(), PNG);
        assert_eq!(visible_files(&dir), vec!["my_meme.PNG"]);
    }

    #[tokio::test]
    async fn test_ingest_local_rejects_existing_name() {
        let (dir, ingestor) = ingestor();
        ingestor.ingest_local(b"first", "cat", ".png").await.unwrap();

        let second = ingestor.ingest_local(b"second", "Cat", "png").await;
        assert!(matches!(second, Err(WallError::ArtifactAlreadyExists(_))));
        assert_eq!(std::fs::read(dir.path().join("cat.png")).unwrap(), b"first");
        assert_eq!(visible_files(&dir), vec!["cat.png"]);
    }

    #[tokio::test]
    async fn test_ingest_local_rejects_empty_name() {
        let (_dir, ingestor) = ingestor();
        let result = ingestor.ingest_local(PNG, "???", ".png").await;
        assert!(matches!(result, Err(WallError::InvalidName(_))));
    }

    #[tokio::test]
    async fn test_stream_accepts_matching_type_split_across_chunks() {
        let (dir, ingestor) = ingestor();
        let artifact = ingestor
            .ingest_stream(chunks(vec![&GIF[..3], &GIF[3..], b"rest-of-gif"]), "party.gif", "gif")
            .await
            .unwrap();

        assert_eq!(artifact.file_name(), "party.gif");
        let mut expected = GIF.to_vec();
        expected.extend_from_slice(b"rest-of-gif");
        assert_eq!(std::fs::read(dir.path().join("party.gif")).unwrap(), expected);
        assert_eq!(visible_files(&dir), vec!["party.gif"]);
    }

    #[tokio::test]
    async fn test_stream_accepts_jpeg_for_jpeg_extension() {
        let (_dir, ingestor) = ingestor();
        let artifact = ingestor
            .ingest_stream(chunks(vec![JPEG]), "photo.jpeg", "jpeg")
            .await
            .unwrap();
        assert_eq!(artifact.extension, "jpeg");
    }

    #[tokio::test]
    async fn test_stream_rejects_mismatched_type_and_leaves_nothing() {
        let (dir, ingestor) = ingestor();
        let result = ingestor
            .ingest_stream(chunks(vec![GIF, b"more"]), "a.png", "png")
            .await;

        assert!(matches!(result, Err(WallError::InvalidFileType(_))));
        assert!(visible_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_stream_rejects_non_image() {
        let (dir, ingestor) = ingestor();
        let result = ingestor
            .ingest_stream(chunks(vec![b"<html>not an image</html>"]), "a.png", "png")
            .await;

        assert!(matches!(result, Err(WallError::InvalidFileType(_))));
        assert!(visible_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_stream_error_mid_transfer_rolls_back() {
        let (dir, ingestor) = ingestor();
        let parts: Vec<std::result::Result<Vec<u8>, WallError>> = vec![
            Ok(PNG.to_vec()),
            Ok(b"partial body".to_vec()),
            Err(WallError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))),
        ];
        let result = ingestor
            .ingest_stream(stream::iter(parts), "a.png", "png")
            .await;

        assert!(matches!(result, Err(WallError::Io(_))));
        assert!(visible_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_stream_enforces_download_limit() {
        let (dir, ingestor) = ingestor();
        let ingestor = ingestor.with_download_limit(Some(20));
        let result = ingestor
            .ingest_stream(chunks(vec![PNG, b"0123456789"]), "a.png", "png")
            .await;

        assert!(matches!(result, Err(WallError::DownloadTooLarge { limit: 20 })));
        assert!(visible_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_url_requires_allowed_extension() {
        let (_dir, ingestor) = ingestor();
        for name in ["noext", "image.webp", "image."] {
            let result = ingestor.ingest_from_url("http://127.0.0.1:9/x", name).await;
            assert!(
                matches!(result, Err(WallError::InvalidFileType(_))),
                "{name} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_url_rejects_existing_name_before_fetching() {
        let (dir, ingestor) = ingestor();
        std::fs::write(dir.path().join("cat.png"), b"original").unwrap();

        // Port 9 (discard) is never contacted: the collision is detected first.
        let result = ingestor
            .ingest_from_url("http://127.0.0.1:9/cat.png", "cat.png")
            .await;
        assert!(matches!(result, Err(WallError::ArtifactAlreadyExists(_))));
        assert_eq!(std::fs::read(dir.path().join("cat.png")).unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_url_rejects_unsupported_scheme() {
        let (_dir, ingestor) = ingestor();
        let result = ingestor.ingest_from_url("file:///etc/passwd", "a.png").await;
        assert!(matches!(result, Err(WallError::InvalidUrl(_))));
    }
}
