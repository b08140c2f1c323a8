//! GitHub repository storage
//!
//! Files are committed through the Contents API and served from
//! raw.githubusercontent.com. Rate limiting (429) and server errors are
//! retried with exponential backoff; every attempt builds a fresh request.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;

use super::{join_path, unique_file_name, FileStorage, StorageError};
use crate::config::GitHubStorageConfig;

const RAW_HOST: &str = "https://raw.githubusercontent.com";
const AGENT: &str = "SarasBlogg/1.0";
const API_VERSION: &str = "2022-11-28";
const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY_MS: u64 = 200;
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct FileInfo {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct DirEntry {
    path: String,
    sha: String,
    #[serde(rename = "type")]
    kind: String,
}

pub struct GitHubFileStorage {
    client: reqwest::Client,
    config: GitHubStorageConfig,
}

impl GitHubFileStorage {
    pub fn new(config: GitHubStorageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Repository path for `segments` below the upload folder and media environment
    fn repo_path(&self, segments: &[&str]) -> String {
        let mut parts = vec![
            self.config.upload_folder.as_str(),
            self.config.media_env.as_deref().unwrap_or_default(),
        ];
        parts.extend_from_slice(segments);
        join_path(parts)
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            escape_path(path)
        )
    }

    fn raw_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            RAW_HOST,
            self.config.owner,
            self.config.repo,
            self.config.branch,
            escape_path(path)
        )
    }

    /// Repository path of a stored file, from its raw url or a repo-relative path.
    pub(crate) fn repo_path_from_url(&self, url: &str) -> Option<String> {
        if let Some(rest) = url.strip_prefix(RAW_HOST) {
            let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
            if segments.len() < 4
                || !segments[0].eq_ignore_ascii_case(&self.config.owner)
                || !segments[1].eq_ignore_ascii_case(&self.config.repo)
            {
                return None;
            }
            let decoded: Vec<String> = segments[3..]
                .iter()
                .map(|s| {
                    urlencoding::decode(s)
                        .map(|d| d.into_owned())
                        .unwrap_or_else(|_| s.to_string())
                })
                .collect();
            return Some(decoded.join("/"));
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            return None;
        }
        let path = url.trim_start_matches('/');
        (!path.is_empty()).then(|| path.to_string())
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(USER_AGENT, AGENT)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .bearer_auth(&self.config.token)
    }

    /// Send the request produced by `build`, retrying transient failures.
    async fn send_with_retry<F, Fut>(&self, build: F) -> Result<Response, StorageError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<RequestBuilder, StorageError>>,
    {
        let mut attempt = 1;
        loop {
            match build().await?.send().await {
                Ok(response) if is_transient(response.status()) && attempt < MAX_ATTEMPTS => {
                    let delay = retry_delay(attempt, retry_after(response.headers()));
                    tracing::warn!(
                        "GitHub answered {} (attempt {}/{}), retrying in {:?}",
                        response.status(),
                        attempt,
                        MAX_ATTEMPTS,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => return Ok(response),
                Err(e) if attempt < MAX_ATTEMPTS && (e.is_connect() || e.is_timeout()) => {
                    let delay = retry_delay(attempt, None);
                    tracing::warn!("GitHub request failed ({}), retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
            attempt += 1;
        }
    }

    async fn put_file(&self, path: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let body = write_put_body(bytes.to_vec(), self.config.branch.clone()).await?;
        let body_path = body.path();
        let length = tokio::fs::metadata(body_path).await?.len();
        let url = self.contents_url(path);
        let (this, url) = (self, url.as_str());

        let response = self
            .send_with_retry(move || async move {
                Ok(this
                    .request(Method::PUT, url)
                    .header(CONTENT_TYPE, "application/json")
                    .header(CONTENT_LENGTH, length)
                    .body(file_body(body_path).await?))
            })
            .await?;

        ensure_success(response).await?;
        tracing::info!("Committed {} to {}/{}", path, self.config.owner, self.config.repo);
        Ok(self.raw_url(path))
    }

    async fn file_sha(&self, path: &str) -> Result<Option<String>, StorageError> {
        let url = self.contents_url(path);
        let branch = self.config.branch.as_str();
        let (this, url) = (self, url.as_str());

        let response = self
            .send_with_retry(move || async move {
                Ok(this.request(Method::GET, url).query(&[("ref", branch)]))
            })
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let info: FileInfo = ensure_success(response).await?.json().await?;
        Ok(Some(info.sha))
    }

    async fn delete_file(&self, path: &str, sha: &str) -> Result<(), StorageError> {
        let url = self.contents_url(path);
        let body = json!({
            "message": "Delete blog image",
            "branch": self.config.branch,
            "sha": sha,
        });
        let (this, url, body) = (self, url.as_str(), &body);

        let response = self
            .send_with_retry(move || async move {
                Ok(this.request(Method::DELETE, url).json(body))
            })
            .await?;
        ensure_success(response).await?;
        tracing::info!("Deleted {} from {}/{}", path, self.config.owner, self.config.repo);
        Ok(())
    }

    fn delete_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            let url = self.contents_url(path);
            let branch = self.config.branch.as_str();
            let (this, url) = (self, url.as_str());

            let response = self
                .send_with_retry(move || async move {
                    Ok(this.request(Method::GET, url).query(&[("ref", branch)]))
                })
                .await?;
            if response.status() == StatusCode::NOT_FOUND {
                tracing::warn!("Folder to delete not found: {}", path);
                return Ok(());
            }

            let entries: Vec<DirEntry> = ensure_success(response).await?.json().await?;
            for entry in entries {
                match entry.kind.as_str() {
                    "file" => self.delete_file(&entry.path, &entry.sha).await?,
                    "dir" => self.delete_dir(&entry.path).await?,
                    other => tracing::debug!("Skipping {} entry {}", other, entry.path),
                }
            }
            Ok(())
        }
        .boxed()
    }
}

#[async_trait]
impl FileStorage for GitHubFileStorage {
    async fn save_image(
        &self,
        bytes: &[u8],
        file_name: &str,
        folder: &str,
    ) -> Result<String, StorageError> {
        let name = unique_file_name(file_name);
        let path = self.repo_path(&[folder, &name]);
        self.put_file(&path, bytes).await
    }

    async fn save_blogg_image(
        &self,
        bytes: &[u8],
        file_name: &str,
        blogg_id: i64,
        folder: &str,
    ) -> Result<String, StorageError> {
        let name = unique_file_name(file_name);
        let id = blogg_id.to_string();
        let path = self.repo_path(&[folder, &id, &name]);
        self.put_file(&path, bytes).await
    }

    async fn delete_image(&self, url: &str) -> Result<(), StorageError> {
        let Some(path) = self.repo_path_from_url(url) else {
            tracing::warn!("Not a url of this repository, nothing deleted: {}", url);
            return Ok(());
        };
        match self.file_sha(&path).await? {
            Some(sha) => self.delete_file(&path, &sha).await,
            None => {
                tracing::warn!("File to delete not found: {}", path);
                Ok(())
            }
        }
    }

    async fn delete_blogg_folder(&self, blogg_id: i64, folder: &str) -> Result<(), StorageError> {
        let id = blogg_id.to_string();
        let path = self.repo_path(&[folder, &id]);
        self.delete_dir(&path).await
    }
}

fn escape_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// `Retry-After` when the server sent one, else 200 ms doubled per attempt
fn retry_delay(attempt: u32, retry_after: Option<Duration>) -> Duration {
    retry_after
        .unwrap_or_else(|| Duration::from_millis(BASE_DELAY_MS << attempt.saturating_sub(1).min(16)))
}

async fn ensure_success(response: Response) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!("GitHub API error {}: {}", status, body);
    Err(StorageError::GitHub {
        status: status.as_u16(),
        body,
    })
}

/// Write the Contents API PUT body to a temp file, base64-encoding `bytes` on the way.
async fn write_put_body(bytes: Vec<u8>, branch: String) -> Result<NamedTempFile, StorageError> {
    let file = tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        {
            let mut out = std::io::BufWriter::new(file.as_file_mut());
            write!(
                out,
                "{{\"message\":\"Add blog image\",\"branch\":{},\"content\":\"",
                serde_json::to_string(&branch)?
            )?;
            let mut encoder = base64::write::EncoderWriter::new(&mut out, &STANDARD);
            encoder.write_all(&bytes)?;
            encoder.finish()?;
            drop(encoder);
            out.write_all(b"\"}")?;
            out.flush()?;
        }
        Ok(file)
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(file)
}

/// Stream a file as a request body
async fn file_body(path: &Path) -> Result<reqwest::Body, StorageError> {
    let file = tokio::fs::File::open(path).await?;
    let chunks = futures::stream::try_unfold(file, |mut file| async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let read = file.read(&mut buf).await?;
        if read == 0 {
            return Ok::<_, std::io::Error>(None);
        }
        buf.truncate(read);
        Ok(Some((buf, file)))
    });
    Ok(reqwest::Body::wrap_stream(chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::Uri, response::IntoResponse, Router};
    use base64::Engine;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Call {
        method: String,
        uri: String,
        body: String,
    }

    #[derive(Clone, Default)]
    struct FakeGitHub {
        calls: Arc<Mutex<Vec<Call>>>,
        put_failures: Arc<AtomicU32>,
    }

    impl FakeGitHub {
        fn calls(&self, method: &str) -> Vec<Call> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.method == method)
                .cloned()
                .collect()
        }
    }

    async fn fake_api(
        State(fake): State<FakeGitHub>,
        method: axum::http::Method,
        uri: Uri,
        body: String,
    ) -> axum::response::Response {
        let uri_text = uri.to_string();
        fake.calls.lock().unwrap().push(Call {
            method: method.to_string(),
            uri: uri_text.clone(),
            body,
        });

        let path = uri.path();
        match method.as_str() {
            "PUT" => {
                let remaining = fake.put_failures.load(Ordering::SeqCst);
                if remaining > 0 {
                    fake.put_failures.store(remaining - 1, Ordering::SeqCst);
                    return axum::http::StatusCode::BAD_GATEWAY.into_response();
                }
                (axum::http::StatusCode::CREATED, "{}").into_response()
            }
            "GET" if path.contains("missing") => axum::http::StatusCode::NOT_FOUND.into_response(),
            "GET" if path.ends_with("/blogg/5") => axum::Json(json!([
                { "type": "file", "path": "uploads/test/blogg/5/a.png", "sha": "s1" },
                { "type": "dir", "path": "uploads/test/blogg/5/thumbs", "sha": "d1" }
            ]))
            .into_response(),
            "GET" if path.ends_with("/thumbs") => axum::Json(json!([
                { "type": "file", "path": "uploads/test/blogg/5/thumbs/b.png", "sha": "s2" }
            ]))
            .into_response(),
            "GET" => axum::Json(json!({ "sha": "abc" })).into_response(),
            _ => axum::Json(json!({})).into_response(),
        }
    }

    async fn start_fake(fake: FakeGitHub) -> String {
        let app = Router::new().fallback(fake_api).with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(api_base: &str) -> GitHubStorageConfig {
        GitHubStorageConfig {
            owner: "sara".into(),
            repo: "media".into(),
            branch: "main".into(),
            token: "ghp_test".into(),
            upload_folder: "uploads".into(),
            media_env: Some("test".into()),
            api_base: api_base.to_string(),
        }
    }

    #[test]
    fn test_repo_path_skips_empty_segments() {
        let storage = GitHubFileStorage::new(GitHubStorageConfig {
            media_env: None,
            ..config("http://unused")
        });
        assert_eq!(storage.repo_path(&["blogg", "3", "x.png"]), "uploads/blogg/3/x.png");

        let storage = GitHubFileStorage::new(config("http://unused"));
        assert_eq!(storage.repo_path(&["about", "x.png"]), "uploads/test/about/x.png");
    }

    #[test]
    fn test_urls() {
        let storage = GitHubFileStorage::new(config("https://api.github.com/"));
        assert_eq!(
            storage.contents_url("uploads/a b.png"),
            "https://api.github.com/repos/sara/media/contents/uploads/a%20b.png"
        );
        assert_eq!(
            storage.raw_url("uploads/test/x.png"),
            "https://raw.githubusercontent.com/sara/media/main/uploads/test/x.png"
        );
    }

    #[test]
    fn test_repo_path_from_url() {
        let storage = GitHubFileStorage::new(config("http://unused"));

        assert_eq!(
            storage.repo_path_from_url(
                "https://raw.githubusercontent.com/Sara/Media/main/uploads/test/a%20b.png"
            ),
            Some("uploads/test/a b.png".to_string())
        );
        assert_eq!(
            storage.repo_path_from_url("/uploads/test/x.png"),
            Some("uploads/test/x.png".to_string())
        );
        assert_eq!(
            storage.repo_path_from_url("https://raw.githubusercontent.com/other/media/main/x.png"),
            None
        );
        assert_eq!(storage.repo_path_from_url("https://example.com/x.png"), None);
    }

    #[test]
    fn test_retry_delay() {
        assert_eq!(retry_delay(1, None), Duration::from_millis(200));
        assert_eq!(retry_delay(2, None), Duration::from_millis(400));
        assert_eq!(retry_delay(4, None), Duration::from_millis(1600));
        assert_eq!(
            retry_delay(3, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(!is_transient(StatusCode::NOT_FOUND));
        assert!(!is_transient(StatusCode::CONFLICT));
    }

    #[tokio::test]
    async fn test_save_retries_and_returns_raw_url() {
        let fake = FakeGitHub::default();
        fake.put_failures.store(1, Ordering::SeqCst);
        let storage = GitHubFileStorage::new(config(&start_fake(fake.clone()).await));

        let url = storage
            .save_blogg_image(b"image-bytes", "photo.PNG", 7, "blogg")
            .await
            .unwrap();

        assert!(url.starts_with("https://raw.githubusercontent.com/sara/media/main/uploads/test/blogg/7/"));
        assert!(url.ends_with(".png"));

        let puts = fake.calls("PUT");
        assert_eq!(puts.len(), 2);
        assert!(puts[1].uri.starts_with("/repos/sara/media/contents/uploads/test/blogg/7/"));

        let body: serde_json::Value = serde_json::from_str(&puts[1].body).unwrap();
        assert_eq!(body["message"], "Add blog image");
        assert_eq!(body["branch"], "main");
        let content = STANDARD.decode(body["content"].as_str().unwrap()).unwrap();
        assert_eq!(content, b"image-bytes");
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let fake = FakeGitHub::default();
        fake.put_failures.store(10, Ordering::SeqCst);
        let storage = GitHubFileStorage::new(config(&start_fake(fake.clone()).await));

        let result = storage.save_image(b"x", "x.png", "about").await;

        assert!(matches!(result, Err(StorageError::GitHub { status: 502, .. })));
        assert_eq!(fake.calls("PUT").len(), MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn test_delete_image_looks_up_sha() {
        let fake = FakeGitHub::default();
        let storage = GitHubFileStorage::new(config(&start_fake(fake.clone()).await));

        storage
            .delete_image("https://raw.githubusercontent.com/sara/media/main/uploads/test/about/x.png")
            .await
            .unwrap();

        let gets = fake.calls("GET");
        assert_eq!(gets.len(), 1);
        assert_eq!(gets[0].uri, "/repos/sara/media/contents/uploads/test/about/x.png?ref=main");

        let deletes = fake.calls("DELETE");
        assert_eq!(deletes.len(), 1);
        let body: serde_json::Value = serde_json::from_str(&deletes[0].body).unwrap();
        assert_eq!(body["sha"], "abc");
        assert_eq!(body["message"], "Delete blog image");
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_noop() {
        let fake = FakeGitHub::default();
        let storage = GitHubFileStorage::new(config(&start_fake(fake.clone()).await));

        storage.delete_image("uploads/test/missing.png").await.unwrap();

        assert_eq!(fake.calls("GET").len(), 1);
        assert!(fake.calls("DELETE").is_empty());
    }

    #[tokio::test]
    async fn test_delete_blogg_folder_recurses() {
        let fake = FakeGitHub::default();
        let storage = GitHubFileStorage::new(config(&start_fake(fake.clone()).await));

        storage.delete_blogg_folder(5, "blogg").await.unwrap();

        let deleted: Vec<String> = fake
            .calls("DELETE")
            .iter()
            .map(|c| {
                let body: serde_json::Value = serde_json::from_str(&c.body).unwrap();
                body["sha"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(deleted, vec!["s1", "s2"]);
    }
}
