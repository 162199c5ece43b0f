//! GitLab publisher: project uploads and issue notes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::Publisher;
use crate::error::PublishError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

#[derive(Debug, Clone)]
pub struct GitLabConfig {
    /// Instance root, e.g. `https://gitlab.example.com`.
    pub base_url: String,
    pub token: String,
    pub project_id: u64,
    /// Project-scoped issue number receiving the summary.
    pub issue_iid: u64,
    pub timeout: Duration,
}

impl GitLabConfig {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        project_id: u64,
        issue_iid: u64,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            project_id,
            issue_iid,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_base(&self) -> String {
        format!(
            "{}/api/v4/projects/{}",
            self.base_url.trim_end_matches('/'),
            self.project_id
        )
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    markdown: Option<String>,
}

/// [`Publisher`] that uploads to a GitLab project and comments on one issue.
pub struct GitLabPublisher {
    client: Client,
    config: GitLabConfig,
}

impl GitLabPublisher {
    /// Creates a publisher.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::RequestFailed` if the HTTP client cannot be built.
    pub fn new(config: GitLabConfig) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PublishError::RequestFailed(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Publisher for GitLabPublisher {
    /// Uploads the file and returns its markdown link.
    async fn upload_file(&self, path: &Path) -> Result<String, PublishError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let display = path.display().to_string();
        let upload_failed = |reason: String| PublishError::UploadFailed {
            file: display.clone(),
            reason,
        };

        let content = tokio::fs::read(path).await?;
        let size = content.len();
        let part = Part::bytes(content).file_name(file_name.clone());
        let form = Form::new().part("file", part);

        let url = format!("{}/uploads", self.config.api_base());
        debug!(url = %url, file = %file_name, size, "Uploading file to GitLab");

        let response = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, &self.config.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| upload_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(upload_failed(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| upload_failed(format!("invalid upload response: {}", e)))?;

        let reference = uploaded
            .markdown
            .or(uploaded.url)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| upload_failed("upload response has no markdown link".to_string()))?;

        info!(file = %file_name, size, "Uploaded file to GitLab");
        Ok(reference)
    }

    async fn post_comment(&self, body: &str) -> Result<(), PublishError> {
        let url = format!(
            "{}/issues/{}/notes",
            self.config.api_base(),
            self.config.issue_iid
        );

        let response = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, &self.config.token)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await
            .map_err(|e| PublishError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PublishError::CommentFailed {
                status: status.as_u16(),
                body: text,
            });
        }

        info!(
            project_id = self.config.project_id,
            issue_iid = self.config.issue_iid,
            "Posted summary comment"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publisher_for(server: &MockServer) -> GitLabPublisher {
        let config = GitLabConfig::new(format!("{}/", server.uri()), "glpat-token", 42, 7)
            .with_timeout(Duration::from_secs(5));
        GitLabPublisher::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_upload_returns_markdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects/42/uploads"))
            .and(header("PRIVATE-TOKEN", "glpat-token"))
            .and(body_string_contains("Prefix,Type"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "alt": "r-1_topprefix.csv",
                "url": "/uploads/abc/r-1_topprefix.csv",
                "markdown": "[r-1_topprefix.csv](/uploads/abc/r-1_topprefix.csv)"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("r-1_topprefix.csv");
        std::fs::write(&file, "Prefix,Type\nuser:*,hash\n").unwrap();

        let reference = publisher_for(&server).upload_file(&file).await.unwrap();
        assert_eq!(reference, "[r-1_topprefix.csv](/uploads/abc/r-1_topprefix.csv)");
    }

    #[tokio::test]
    async fn test_upload_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects/42/uploads"))
            .respond_with(ResponseTemplate::new(413).set_body_string("too large"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.csv");
        std::fs::write(&file, "x").unwrap();

        let err = publisher_for(&server).upload_file(&file).await.unwrap_err();
        match err {
            PublishError::UploadFailed { file, reason } => {
                assert!(file.ends_with("big.csv"));
                assert!(reason.contains("413"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let server = MockServer::start().await;
        let err = publisher_for(&server)
            .upload_file(Path::new("/definitely/missing.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Io(_)));
    }

    #[tokio::test]
    async fn test_post_comment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects/42/issues/7/notes"))
            .and(header("PRIVATE-TOKEN", "glpat-token"))
            .and(body_json(json!({"body": "#### summary"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        publisher_for(&server).post_comment("#### summary").await.unwrap();
    }

    #[tokio::test]
    async fn test_post_comment_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/projects/42/issues/7/notes"))
            .respond_with(ResponseTemplate::new(401).set_body_string("401 Unauthorized"))
            .mount(&server)
            .await;

        let err = publisher_for(&server).post_comment("x").await.unwrap_err();
        assert!(matches!(err, PublishError::CommentFailed { status: 401, .. }));
    }
}
