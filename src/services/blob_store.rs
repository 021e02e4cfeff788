use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::BlobConfig;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("blob store rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected blob store response: {0}")]
    Response(String),
}

/// Outcome of a destroy call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destroyed {
    Deleted,
    NotFound,
}

/// Image storage behind the upload endpoints.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `folder/public_id` and return the public URL.
    async fn upload(
        &self,
        folder: &str,
        public_id: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String, BlobError>;

    async fn destroy(&self, folder: &str, public_id: &str) -> Result<Destroyed, BlobError>;
}

/// Public id of a stored image from its URL: the last path segment without
/// the extension.
pub fn public_id_from_url(url: &str) -> &str {
    let name = url.rsplit('/').next().unwrap_or(url);
    match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    }
}

/// Stem of an uploaded file name (`photo.final.png` → `photo`).
pub fn file_stem(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

/// Cloudinary upload API adapter. Requests are signed with the API secret.
pub struct CloudinaryStore {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryStore {
    pub fn new(config: &BlobConfig) -> Result<Self, BlobError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: format!("https://api.cloudinary.com/v1_1/{}/image", config.cloudinary_name),
            api_key: config.cloudinary_api_key.clone(),
            api_secret: config.cloudinary_api_secret.clone(),
        })
    }

    fn sign(&self, params: &[(&str, &str)]) -> String {
        cloudinary_signature(params, &self.api_secret)
    }

    async fn read<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, BlobError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BlobError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| BlobError::Response(e.to_string()))
    }
}

/// SHA-256 over the `&`-joined, key-sorted parameters followed by the secret.
pub fn cloudinary_signature(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl BlobStore for CloudinaryStore {
    async fn upload(
        &self,
        folder: &str,
        public_id: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String, BlobError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[("folder", folder), ("public_id", public_id), ("timestamp", &timestamp)]);

        let mut file = multipart::Part::bytes(bytes).file_name(public_id.to_string());
        if let Some(mime) = content_type {
            file = file.mime_str(mime)?;
        }
        let form = multipart::Form::new()
            .part("file", file)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder.to_string())
            .text("public_id", public_id.to_string())
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;
        let uploaded: UploadResponse = Self::read(response).await?;
        Ok(uploaded.secure_url)
    }

    async fn destroy(&self, folder: &str, public_id: &str) -> Result<Destroyed, BlobError> {
        let full_id = format!("{}/{}", folder, public_id);
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", &full_id), ("timestamp", &timestamp)]);

        let response = self
            .client
            .post(format!("{}/destroy", self.base_url))
            .form(&[
                ("public_id", full_id.as_str()),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.api_key.as_str()),
                ("signature_algorithm", "sha256"),
                ("signature", signature.as_str()),
            ])
            .send()
            .await?;
        let destroyed: DestroyResponse = Self::read(response).await?;
        match destroyed.result.as_str() {
            "ok" => Ok(Destroyed::Deleted),
            "not found" => Ok(Destroyed::NotFound),
            other => Err(BlobError::Response(other.to_string())),
        }
    }
}

/// In-process store for development without Cloudinary credentials and for
/// tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, folder: &str, public_id: &str) -> bool {
        self.blobs.lock().await.contains_key(&format!("{}/{}", folder, public_id))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        folder: &str,
        public_id: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<String, BlobError> {
        let key = format!("{}/{}", folder, public_id);
        let extension = match content_type {
            Some("image/jpeg") => "jpg",
            Some("image/gif") => "gif",
            Some("image/webp") => "webp",
            _ => "png",
        };
        self.blobs.lock().await.insert(key.clone(), bytes);
        Ok(format!("memory://images/{}.{}", key, extension))
    }

    async fn destroy(&self, folder: &str, public_id: &str) -> Result<Destroyed, BlobError> {
        let removed = self.blobs.lock().await.remove(&format!("{}/{}", folder, public_id));
        Ok(if removed.is_some() {
            Destroyed::Deleted
        } else {
            Destroyed::NotFound
        })
    }
}
