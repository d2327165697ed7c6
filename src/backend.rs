use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::models::StudentMarks;

/// Client for the prediction backend that trains the models and serves marks.
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadOutcome {
    pub message: String,
    #[serde(default)]
    pub records: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct TrainOutcome {
    pub message: String,
}

/// The backend answered, but with a non-success status.
#[derive(Debug)]
pub struct RequestFailed {
    pub status: StatusCode,
    pub message: String,
}

impl fmt::Display for RequestFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RequestFailed {}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to create HTTP client")?;

        tracing::debug!(%base_url, "backend client ready");

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn upload_exam1(&self, path: &Path) -> Result<UploadOutcome> {
        self.upload("/upload_exam1/", path, "Upload failed").await
    }

    pub async fn train_models(&self) -> Result<TrainOutcome> {
        let response = self
            .client
            .post(self.url("/train_models/"))
            .send()
            .await
            .with_context(|| format!("failed to reach backend at {}", self.base_url))?;
        read_json(response, "Training failed").await
    }

    pub async fn predict_exam2(&self, path: &Path) -> Result<UploadOutcome> {
        self.upload("/predict_exam2/", path, "Prediction failed").await
    }

    pub async fn student_marks(&self, id: u32) -> Result<StudentMarks> {
        let response = self
            .client
            .get(self.url(&format!("/student_marks_data/{}", id)))
            .send()
            .await
            .with_context(|| format!("failed to reach backend at {}", self.base_url))?;
        read_json(response, "Failed to fetch student data").await
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn upload(&self, endpoint: &str, path: &Path, fallback: &str) -> Result<UploadOutcome> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.csv".to_string());

        tracing::info!(endpoint, file = %file_name, bytes = bytes.len(), "uploading file");

        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
        let response = self
            .client
            .post(self.url(endpoint))
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("failed to reach backend at {}", self.base_url))?;
        read_json(response, fallback).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response, fallback: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = failure_message(&body, fallback);
        tracing::warn!(%status, %message, "backend request failed");
        return Err(RequestFailed { status, message }.into());
    }

    response
        .json::<T>()
        .await
        .context("failed to parse backend response")
}

/// The server's `detail` when it sent one, otherwise `fallback`.
pub fn failure_message(body: &str, fallback: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body).ok().and_then(|e| e.detail) {
        Some(serde_json::Value::String(detail)) if !detail.trim().is_empty() => detail,
        Some(serde_json::Value::Null) | Some(serde_json::Value::String(_)) | None => {
            fallback.to_string()
        }
        Some(other) => other.to_string(),
    }
}
