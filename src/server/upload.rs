//! Upload validation and storage

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// A file persisted in the upload directory
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub filename: String,
    pub timestamp: String,
    pub path: PathBuf,
}

/// Reduce a client-supplied name to a safe ASCII file name.
///
/// Directory components are dropped, whitespace becomes `_`, and anything
/// outside `[A-Za-z0-9._-]` is removed.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Lowercased extension after the last dot
pub fn extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

pub fn is_allowed(name: &str, allowed: &[String]) -> bool {
    extension(name).is_some_and(|ext| allowed.iter().any(|a| *a == ext))
}

/// `<YYYYmmdd_HHMMSS>_<8 hex>_<sanitized name>`
pub fn stored_name(original: &str, now: DateTime<Local>) -> (String, String) {
    let timestamp = now.format("%Y%m%d_%H%M%S").to_string();
    let tag = Uuid::new_v4().simple().to_string();

    let mut name = sanitize_filename(original);
    if extension(&name).is_none() {
        let ext = extension(original).unwrap_or_else(|| "img".to_string());
        name = format!("image.{}", ext);
    }

    (format!("{}_{}_{}", timestamp, &tag[..8], name), timestamp)
}

/// Write an uploaded file under `dir`
pub async fn store(dir: &Path, original: &str, bytes: &[u8]) -> std::io::Result<StoredUpload> {
    tokio::fs::create_dir_all(dir).await?;

    let (filename, timestamp) = stored_name(original, Local::now());
    let path = dir.join(&filename);
    tokio::fs::write(&path, bytes).await?;

    info!(filename = %filename, bytes = bytes.len(), "Image saved");
    Ok(StoredUpload {
        filename,
        timestamp,
        path,
    })
}
