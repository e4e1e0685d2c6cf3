use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Hosted transform service upload endpoint.
const HOSTED_UPLOAD_URL: &str = "https://upload.imagekit.io/api/v1/files/upload";
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Width caps for the delivery URLs of each kind of image.
pub const MESSAGE_IMAGE_WIDTH: u32 = 1280;
pub const PROFILE_IMAGE_WIDTH: u32 = 512;
pub const COVER_IMAGE_WIDTH: u32 = 1280;

/// Delivery-time image transformation, applied by the asset service when the
/// URL is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transform {
    pub quality: &'static str,
    pub width: u32,
    pub format: &'static str,
}

impl Transform {
    pub fn webp(width: u32) -> Self {
        Self {
            quality: "auto",
            width,
            format: "webp",
        }
    }

    /// Chained transformation steps, one per parameter.
    fn query(&self) -> String {
        format!("tr=q-{}:w-{}:f-{}", self.quality, self.width, self.format)
    }
}

#[derive(Debug, Clone)]
pub struct StoredAsset {
    pub path: String,
}

/// Where uploaded images go: the hosted transform service, or a local
/// directory served by this process.
pub enum AssetStore {
    Hosted(HostedAssets),
    Local(LocalAssets),
}

impl AssetStore {
    pub async fn upload(&self, bytes: &[u8], filename: &str) -> Result<StoredAsset> {
        match self {
            Self::Hosted(hosted) => hosted.upload(bytes, filename).await,
            Self::Local(local) => local.upload(bytes, filename).await,
        }
    }

    pub fn delivery_url(&self, path: &str, transform: &Transform) -> String {
        let base = match self {
            Self::Hosted(hosted) => hosted.url_endpoint.trim_end_matches('/').to_string(),
            Self::Local(local) => format!("{}/uploads", local.public_base.trim_end_matches('/')),
        };
        let path = path.trim_start_matches('/');
        format!("{}/{}?{}", base, path, transform.query())
    }

    /// Upload and return the webp delivery URL capped at `width`.
    pub async fn store_image(&self, bytes: &[u8], filename: &str, width: u32) -> Result<String> {
        let asset = self.upload(bytes, filename).await.context("Image upload failed")?;
        Ok(self.delivery_url(&asset.path, &Transform::webp(width)))
    }

    /// Directory to serve under `/uploads`, if assets are kept locally.
    pub fn local_dir(&self) -> Option<&Path> {
        match self {
            Self::Hosted(_) => None,
            Self::Local(local) => Some(&local.dir),
        }
    }
}

pub struct HostedAssets {
    client: reqwest::Client,
    private_key: String,
    url_endpoint: String,
}

#[derive(Deserialize)]
struct HostedUploadResponse {
    #[serde(rename = "filePath")]
    file_path: String,
}

impl HostedAssets {
    pub fn new(private_key: String, url_endpoint: String) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(UPLOAD_TIMEOUT).build()?;
        Ok(Self {
            client,
            private_key,
            url_endpoint,
        })
    }

    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<StoredAsset> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("fileName", filename.to_string());

        let response: HostedUploadResponse = self
            .client
            .post(HOSTED_UPLOAD_URL)
            .basic_auth(&self.private_key, Some(""))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!("Uploaded {} ({} bytes) to {}", filename, bytes.len(), response.file_path);
        Ok(StoredAsset {
            path: response.file_path,
        })
    }
}

/// Content-addressed files in a directory. No transformation happens; the
/// transform parameters are still carried on the URL.
pub struct LocalAssets {
    dir: PathBuf,
    public_base: String,
}

impl LocalAssets {
    pub async fn new(dir: PathBuf, public_base: String) -> Result<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        info!("Local asset directory: {}", dir.display());
        Ok(Self { dir, public_base })
    }

    async fn upload(&self, bytes: &[u8], filename: &str) -> Result<StoredAsset> {
        let name = match extension(filename) {
            Some(ext) => format!("{}.{}", hex::encode(Sha256::digest(bytes)), ext),
            None => hex::encode(Sha256::digest(bytes)),
        };
        let path = self.dir.join(&name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        debug!("Stored {} ({} bytes) as {}", filename, bytes.len(), name);
        Ok(StoredAsset {
            path: format!("/{}", name),
        })
    }
}

/// Lowercased alphanumeric extension of an uploaded file name, if sane.
fn extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
