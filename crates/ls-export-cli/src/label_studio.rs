//! REST client for the Label Studio endpoints used to publish tasks.

use std::time::Duration;

use ls_export::{Project, ProjectSpec, ReviewBackend, Task, UploadReceipt};
use serde::Deserialize;
use tracing::{debug, info};

/// HTTP client for one Label Studio instance.
pub struct LabelStudio {
    client: reqwest::Client,
    base: String,
    token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (connection refused, DNS, ...).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Label Studio returned a non-2xx status code.
    #[error("Label Studio API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Label Studio did not answer at {url} within {secs}s")]
    Timeout { url: String, secs: u64 },
}

#[derive(Deserialize)]
struct CreatedProject {
    id: u64,
    title: String,
}

impl LabelStudio {
    /// * `base` - e.g. `http://localhost:8081`; a trailing `/` is ignored.
    pub fn new(base: &str, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Poll `GET /api/version` once a second until it answers 200.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), ApiError> {
        let url = self.url("/api/version");
        info!(%url, "waiting for Label Studio");
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!("Label Studio is ready");
                    return Ok(());
                }
                Ok(resp) => debug!(status = resp.status().as_u16(), "Label Studio not ready"),
                Err(e) => debug!(error = %e, "Label Studio not reachable yet"),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ApiError::Timeout {
                    url,
                    secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: serde::Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.token))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

impl ReviewBackend for LabelStudio {
    type Error = ApiError;

    /// `POST /api/projects`
    async fn create_project(&self, spec: &ProjectSpec) -> Result<Project, ApiError> {
        let created: CreatedProject = self.post_json("/api/projects", spec).await?;
        Ok(Project {
            url: Some(self.url(&format!("/projects/{}/data", created.id))),
            id: created.id,
            title: created.title,
        })
    }

    /// `POST /api/projects/{id}/import`
    async fn upload_tasks(&self, project: &Project, tasks: &[Task]) -> Result<UploadReceipt, ApiError> {
        self.post_json(&format!("/api/projects/{}/import", project.id), tasks)
            .await
    }
}
