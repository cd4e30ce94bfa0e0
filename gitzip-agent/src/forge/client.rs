//! HTTP implementation of [`ContentApi`] using reqwest.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{RequestBuilder, Response, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::classify::{classify_response, classify_transport};
use super::{ContentApi, EntryKind, Quota, RemoteEntry};
use crate::config::ForgeConfig;
use crate::model::{ContentRef, RepoReference};
use crate::utils::errors::{GitzipError, Result};

/// Media type that makes the blob endpoint return raw file bytes.
const RAW_MEDIA_TYPE: &str = "application/vnd.github.v3.raw";

/// A single item of the contents API response.
#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: EntryKind,
    #[serde(default)]
    size: Option<u64>,
    sha: String,
    #[serde(default)]
    download_url: Option<String>,
}

/// The contents endpoint returns an object for a file and an array for a directory.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<ContentItem>),
    Single(ContentItem),
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    rate: RateLimit,
}

#[derive(Debug, Deserialize)]
struct RateLimit {
    limit: u64,
    remaining: u64,
    #[serde(default)]
    used: u64,
    reset: i64,
}

/// Authenticated client for one credential.
pub struct ForgeClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    accept: String,
}

impl ForgeClient {
    pub fn new(config: &ForgeConfig, token: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(&config.api_base_url).map_err(|e| {
            GitzipError::Config(format!("invalid forge URL {}: {e}", config.api_base_url))
        })?;

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GitzipError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            token: token.into(),
            accept: config.accept.clone(),
        })
    }

    /// Build an API URL from path segments, percent-encoding each one.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GitzipError::Config(format!("forge URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments.into_iter().filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn blob_url(&self, repo: &RepoReference, sha: &str) -> Result<Url> {
        self.endpoint(["repos", repo.owner.as_str(), repo.name.as_str(), "git", "blobs", sha])
    }

    fn get(&self, url: Url) -> RequestBuilder {
        self.http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, self.accept.as_str())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        debug!("{} {}", status.as_u16(), response.url());

        if status.is_success() {
            return Ok(response);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(classify_response(status, &headers, &body))
    }

    fn to_entry(&self, repo: &RepoReference, item: ContentItem) -> Result<RemoteEntry> {
        let content_ref = match item.download_url.filter(|u| !u.is_empty()) {
            Some(url) => ContentRef::Download(url),
            None => ContentRef::GitBlob(self.blob_url(repo, &item.sha)?.to_string()),
        };
        Ok(RemoteEntry {
            name: item.name,
            path: item.path,
            kind: item.kind,
            size: item.size,
            content_ref,
            sha: item.sha,
        })
    }
}

#[async_trait]
impl ContentApi for ForgeClient {
    async fn list_directory(&self, repo: &RepoReference, path: &str) -> Result<Vec<RemoteEntry>> {
        let mut url = self.endpoint(
            ["repos", repo.owner.as_str(), repo.name.as_str(), "contents"]
                .into_iter()
                .chain(path.split('/')),
        )?;
        url.query_pairs_mut().append_pair("ref", &repo.git_ref);

        let response = self.send(self.get(url)).await?;
        let items = match response
            .json::<ContentsResponse>()
            .await
            .map_err(|e| GitzipError::Transient(format!("malformed listing for {path:?}: {e}")))?
        {
            ContentsResponse::Listing(items) => items,
            ContentsResponse::Single(item) => vec![item],
        };

        items.into_iter().map(|item| self.to_entry(repo, item)).collect()
    }

    async fn fetch_blob(&self, content_ref: &ContentRef) -> Result<Bytes> {
        let request = match content_ref {
            ContentRef::Download(url) => self.http.get(url).header(AUTHORIZATION, format!("Bearer {}", self.token)),
            ContentRef::GitBlob(url) => self
                .http
                .get(url)
                .header(AUTHORIZATION, format!("Bearer {}", self.token))
                .header(ACCEPT, RAW_MEDIA_TYPE),
        };

        let response = self.send(request).await?;
        response
            .bytes()
            .await
            .map_err(|e| GitzipError::Transient(format!("failed to read body: {e}")))
    }

    async fn check_quota(&self) -> Result<Quota> {
        let response = self.send(self.get(self.endpoint(["rate_limit"])?)).await?;
        let body = response
            .json::<RateLimitResponse>()
            .await
            .map_err(|e| GitzipError::Transient(format!("malformed rate limit response: {e}")))?;

        let reset_at = DateTime::from_timestamp(body.rate.reset, 0).ok_or_else(|| {
            GitzipError::Transient(format!("invalid rate limit reset: {}", body.rate.reset))
        })?;

        Ok(Quota {
            limit: body.rate.limit,
            remaining: body.rate.remaining,
            used: body.rate.used,
            reset_at,
        })
    }

    async fn validate_credential(&self) -> Result<bool> {
        match self.send(self.get(self.endpoint(["user"])?)).await {
            Ok(_) => Ok(true),
            Err(GitzipError::Auth(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ForgeClient {
        let config = ForgeConfig {
            api_base_url: server.uri(),
            ..Default::default()
        };
        ForgeClient::new(&config, "ghp_test").unwrap()
    }

    fn repo() -> RepoReference {
        RepoReference::new("acme", "widgets", "main", "docs")
    }

    #[tokio::test]
    async fn test_list_directory_sends_credential_and_client_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/contents/docs"))
            .and(query_param("ref", "main"))
            .and(header("authorization", "Bearer ghp_test"))
            .and(header("user-agent", "GitHub-Dir-Download-Extension/1.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "a.md", "path": "docs/a.md", "type": "file", "size": 5, "sha": "s1",
                 "download_url": "https://raw.example/docs/a.md"},
                {"name": "sub", "path": "docs/sub", "type": "dir", "sha": "s2", "download_url": null},
                {"name": "mod", "path": "docs/mod", "type": "submodule", "sha": "s3"}
            ])))
            .mount(&server)
            .await;

        let entries = client(&server).list_directory(&repo(), "docs").await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].size, Some(5));
        assert_eq!(
            entries[0].content_ref,
            ContentRef::Download("https://raw.example/docs/a.md".to_string())
        );
        assert_eq!(entries[1].kind, EntryKind::Dir);
        assert_eq!(entries[2].kind, EntryKind::Other);
    }

    #[tokio::test]
    async fn test_single_file_listing_is_one_element() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/contents/docs/a.md"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(
                {"name": "a.md", "path": "docs/a.md", "type": "file", "size": 5, "sha": "s1"}
            )))
            .mount(&server)
            .await;

        let entries = client(&server).list_directory(&repo(), "docs/a.md").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].content_ref,
            ContentRef::GitBlob(format!("{}/repos/acme/widgets/git/blobs/s1", server.uri()))
        );
    }

    #[tokio::test]
    async fn test_listing_404_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        let err = client(&server).list_directory(&repo(), "missing").await.unwrap_err();
        assert!(matches!(err, GitzipError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_git_blob_uses_raw_media_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/git/blobs/s1"))
            .and(header("accept", RAW_MEDIA_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"raw bytes".to_vec()))
            .mount(&server)
            .await;

        let url = format!("{}/repos/acme/widgets/git/blobs/s1", server.uri());
        let bytes = client(&server).fetch_blob(&ContentRef::GitBlob(url)).await.unwrap();
        assert_eq!(&bytes[..], b"raw bytes");
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let url = format!("{}/raw/a.md", server.uri());
        let err = client(&server).fetch_blob(&ContentRef::Download(url)).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_check_quota() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rate_limit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rate": {"limit": 5000, "remaining": 4990, "used": 10, "reset": 1714566645}
            })))
            .mount(&server)
            .await;

        let quota = client(&server).check_quota().await.unwrap();
        assert_eq!(quota.remaining, 4990);
        assert_eq!(quota.reset_at.timestamp(), 1714566645);
    }

    #[tokio::test]
    async fn test_validate_credential() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
            .mount(&server)
            .await;

        assert!(!client(&server).validate_credential().await.unwrap());
    }
}
