//! Boundary to the review tool: project creation and task upload.
//!
//! The core never talks HTTP itself. Callers supply a [`ReviewBackend`]
//! (the CLI's Label Studio client, or a fake in tests) and [`publish`]
//! sequences conversion and upload against it.

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::convert::{convert, ConvertOptions};
use crate::error::{Error, Result};
use crate::labels::{active_categories, label_config};
use crate::task::Task;
use crate::types::Dataset;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub title: String,
    pub label_config: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub title: String,
    /// Browser URL of the project's data view, when the backend knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub task_count: usize,
    #[serde(default)]
    pub prediction_count: usize,
}

/// A remote project store that accepts pre-annotated tasks.
pub trait ReviewBackend {
    type Error: std::error::Error + Send + Sync + 'static;

    fn create_project(
        &self,
        spec: &ProjectSpec,
    ) -> impl Future<Output = std::result::Result<Project, Self::Error>> + Send;

    fn upload_tasks(
        &self,
        project: &Project,
        tasks: &[Task],
    ) -> impl Future<Output = std::result::Result<UploadReceipt, Self::Error>> + Send;
}

#[derive(Debug, Clone)]
pub struct Published {
    pub project: Project,
    pub tasks: Vec<Task>,
    pub receipt: UploadReceipt,
}

/// Convert `dataset`, create a project titled `title` and upload the tasks.
///
/// Conversion runs first; a document that fails to convert never reaches the
/// backend.
pub async fn publish<B: ReviewBackend>(
    backend: &B,
    title: &str,
    dataset: &Dataset,
    urls: &HashMap<u64, String>,
    options: &ConvertOptions,
) -> Result<Published> {
    let tasks = convert(dataset, urls, options)?;
    let spec = ProjectSpec {
        title: title.to_string(),
        label_config: label_config(&active_categories(dataset)),
    };

    let project = backend
        .create_project(&spec)
        .await
        .map_err(|e| Error::Backend(Box::new(e)))?;
    info!(id = project.id, title = %project.title, "created review project");

    let receipt = backend
        .upload_tasks(&project, &tasks)
        .await
        .map_err(|e| Error::Backend(Box::new(e)))?;
    info!(
        id = project.id,
        tasks = receipt.task_count,
        predictions = receipt.prediction_count,
        "uploaded tasks"
    );

    Ok(Published {
        project,
        tasks,
        receipt,
    })
}
