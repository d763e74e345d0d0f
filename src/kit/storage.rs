// SPDX-License-Identifier: MIT

//! File storage for uploaded and generated images
//!
//! All paths handed out by [`Storage`] live under the configured upload
//! root, so they can always be turned back into a public URL with
//! [`Storage::url_for`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use url::Url;

use super::config::Settings;
use super::error::{CanvasError, Result};

/// An asset found under the upload root
#[derive(Debug, Clone, Serialize)]
pub struct Asset {
    pub filename: String,
    pub url: String,
    pub path: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Coarse file-type filter for asset listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetType {
    Image,
    Template,
}

impl AssetType {
    /// `None` for anything but `image` or `template`; such values do not filter
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "image" => Some(AssetType::Image),
            "template" => Some(AssetType::Template),
            _ => None,
        }
    }

    fn extensions(&self) -> &'static [&'static str] {
        match self {
            AssetType::Image => &["png", "jpg", "jpeg", "gif", "webp", "svg"],
            AssetType::Template => &["json", "yaml"],
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions().contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

/// Local file store rooted at the upload directory
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    output_subdir: String,
    public_url: String,
    client: Client,
}

impl Storage {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.provider_timeout)
            .build()?;

        Ok(Self {
            root: settings.upload_dir.clone(),
            output_subdir: settings.output_subdir.clone(),
            public_url: settings.public_url.clone(),
            client,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_subdir(&self) -> &str {
        &self.output_subdir
    }

    /// Resolve a caller-supplied file reference to a path under the root
    ///
    /// Absolute paths and paths already prefixed with the root are kept.
    pub fn resolve(&self, reference: &str) -> PathBuf {
        let candidate = Path::new(reference);
        if candidate.is_absolute() || candidate.starts_with(&self.root) {
            return candidate.to_path_buf();
        }
        self.root
            .join(reference.trim_start_matches(['/', '\\']))
    }

    /// Directory of `path` relative to the root, if it lies under it
    pub fn subdir_of(&self, path: &Path) -> Option<PathBuf> {
        let relative = path.strip_prefix(&self.root).ok()?;
        Some(
            relative
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        )
    }

    /// Path for a new file derived from `source`, placed next to it
    pub fn derived_path(
        &self,
        source: &Path,
        execution_id: &str,
        node_id: &str,
        operation: &str,
        extension: &str,
    ) -> PathBuf {
        let subdir = self
            .subdir_of(source)
            .unwrap_or_else(|| PathBuf::from(&self.output_subdir));
        self.root
            .join(subdir)
            .join(unique_file_name(execution_id, node_id, operation, extension))
    }

    /// Download (or decode) an image and store it under the output subdirectory
    pub async fn save_from_url(
        &self,
        url: &str,
        execution_id: &str,
        node_id: &str,
    ) -> Result<PathBuf> {
        self.save_from_url_in(url, &self.output_subdir, execution_id, node_id)
            .await
    }

    /// Like [`Storage::save_from_url`] but into the category `subdir`
    pub async fn save_from_url_in(
        &self,
        url: &str,
        subdir: &str,
        execution_id: &str,
        node_id: &str,
    ) -> Result<PathBuf> {
        let (bytes, extension) = if let Some(data) = url.strip_prefix("data:") {
            decode_data_uri(data)?
        } else {
            self.download(url).await?
        };

        let path = self
            .root
            .join(safe_category(subdir))
            .join(unique_file_name(execution_id, node_id, "download", &extension));
        write_file(&path, &bytes).await?;

        log::debug!("Stored {} bytes from {} at {}", bytes.len(), truncate(url), path.display());
        Ok(path)
    }

    /// Persist raw bytes under a sanitised category directory
    pub async fn save_bytes(&self, bytes: &[u8], subdir: &str, file_name: &str) -> Result<PathBuf> {
        let file_name = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CanvasError::config("No filename provided"))?;

        let path = self.root.join(safe_category(subdir)).join(file_name);
        write_file(&path, bytes).await?;
        Ok(path)
    }

    /// Remove `<root>/<category>/<filename>`
    ///
    /// Only the last component of `filename` is used, and the resolved
    /// file must still lie under the root.
    pub async fn delete(&self, category: &str, filename: &str) -> Result<PathBuf> {
        let name = Path::new(filename)
            .file_name()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CanvasError::config("No filename provided"))?;
        let path = self.root.join(safe_category(category)).join(name);

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(CanvasError::ResourceMissing(path));
        }

        let root = fs::canonicalize(&self.root).await?;
        let resolved = fs::canonicalize(&path).await?;
        if !resolved.starts_with(&root) {
            return Err(CanvasError::config(format!(
                "Refusing to delete outside the upload root: {}",
                filename
            )));
        }

        fs::remove_file(&path).await?;
        log::info!("Deleted asset {}", path.display());
        Ok(path)
    }

    /// Public URL for a stored file
    pub fn url_for(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        match Url::parse(&self.public_url) {
            Ok(mut base) if !base.cannot_be_a_base() => {
                if let Ok(mut parts) = base.path_segments_mut() {
                    parts.pop_if_empty().extend(&segments);
                }
                base.to_string()
            }
            _ => format!(
                "{}/{}",
                self.public_url.trim_end_matches('/'),
                segments.join("/")
            ),
        }
    }

    /// List every non-hidden file under the root (or one category)
    pub async fn list_assets(
        &self,
        category: Option<&str>,
        file_type: Option<AssetType>,
    ) -> Result<Vec<Asset>> {
        let search_root = match category {
            Some(c) => self.root.join(safe_category(c)),
            None => self.root.clone(),
        };

        let mut assets = Vec::new();
        if !fs::try_exists(&search_root).await.unwrap_or(false) {
            return Ok(assets);
        }

        let mut pending = vec![search_root];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }

                let filename = entry.file_name().to_string_lossy().into_owned();
                if filename.starts_with('.') {
                    continue;
                }
                if file_type.is_some_and(|t| !t.matches(&path)) {
                    continue;
                }

                let category = if dir == self.root {
                    "general".to_string()
                } else {
                    dir.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "general".to_string())
                };

                assets.push(Asset {
                    url: self.url_for(&path),
                    path: path.to_string_lossy().into_owned(),
                    kind: path
                        .extension()
                        .map(|e| e.to_string_lossy().to_lowercase())
                        .unwrap_or_default(),
                    filename,
                    category,
                });
            }
        }

        assets.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(assets)
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(CanvasError::other(format!(
                "Failed to download image from {}: HTTP {}",
                url,
                resp.status()
            )));
        }

        let from_mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(extension_for_mime);
        let extension = from_mime
            .or_else(|| extension_from_url(url))
            .unwrap_or("png")
            .to_string();

        let bytes = resp.bytes().await?;
        Ok((bytes.to_vec(), extension))
    }
}

/// `<execution>_<node>_<operation>_<suffix>.<ext>`
pub fn unique_file_name(execution_id: &str, node_id: &str, operation: &str, extension: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{}.{}",
        execution_id,
        safe_category(node_id),
        operation,
        &suffix[..8],
        extension
    )
}

/// Keep alphanumerics, `_` and `-`; everything else becomes `_`
pub fn safe_category(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "general".to_string()
    } else {
        cleaned
    }
}

fn decode_data_uri(data: &str) -> Result<(Vec<u8>, String)> {
    let (header, payload) = data
        .split_once(',')
        .ok_or_else(|| CanvasError::other("Malformed data URI"))?;

    let mut parts = header.split(';');
    let mime = parts.next().unwrap_or_default();
    if !parts.any(|p| p.eq_ignore_ascii_case("base64")) {
        return Err(CanvasError::other("Only base64 data URIs are supported"));
    }

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| CanvasError::other(format!("Invalid base64 image data: {}", e)))?;
    let extension = extension_for_mime(mime).unwrap_or("png").to_string();
    Ok((bytes, extension))
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/bmp" => Some("bmp"),
        "image/tiff" => Some("tiff"),
        _ => None,
    }
}

fn extension_from_url(url: &str) -> Option<&'static str> {
    let path = Url::parse(url).ok()?.path().to_ascii_lowercase();
    let ext = path.rsplit_once('.')?.1.to_string();
    match ext.as_str() {
        "png" => Some("png"),
        "jpg" | "jpeg" => Some("jpg"),
        "webp" => Some("webp"),
        "gif" => Some("gif"),
        "bmp" => Some("bmp"),
        "tif" | "tiff" => Some("tiff"),
        _ => None,
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, bytes).await?;
    Ok(())
}

fn truncate(url: &str) -> &str {
    match url.char_indices().nth(64) {
        Some((idx, _)) => &url[..idx],
        None => url,
    }
}
