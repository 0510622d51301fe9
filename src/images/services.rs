use anyhow::Context;
use bytes::Bytes;
use time::{macros::format_description, Date};
use tracing::{info, warn};
use uuid::Uuid;

use crate::days::model::ScanType;
use crate::storage::StorageClient;

pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Object key for a scan photo: `{user}/pic_{scan}_{dd_mm_yyyy}-{upload}.{ext}`.
/// Every upload gets its own object, so a new photo never overwrites one a
/// stored record still points at.
pub fn scan_image_key(
    user_id: Uuid,
    scan: &ScanType,
    captured_on: Date,
    upload_id: Uuid,
    content_type: &str,
) -> String {
    let date = captured_on
        .format(format_description!("[day]_[month]_[year]"))
        .unwrap_or_else(|_| captured_on.to_string());
    let ext = ext_from_mime(content_type).unwrap_or("jpg");
    format!(
        "{}/pic_{}_{}-{}.{}",
        user_id,
        scan.as_str(),
        date,
        upload_id.simple(),
        ext
    )
}

/// Stores the photo and returns its public URL.
pub async fn upload_scan_image(
    storage: &dyn StorageClient,
    user_id: Uuid,
    scan: &ScanType,
    captured_on: Date,
    body: Bytes,
    content_type: &str,
) -> anyhow::Result<String> {
    anyhow::ensure!(!body.is_empty(), "empty image");
    let key = scan_image_key(user_id, scan, captured_on, Uuid::new_v4(), content_type);
    storage
        .put_object(&key, body, content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    let url = storage.public_url(&key);
    info!(%user_id, scan = %scan, key = %key, "scan image uploaded");
    Ok(url)
}

/// Best effort; a leftover object only costs storage.
pub async fn delete_scan_image(storage: &dyn StorageClient, url: &str) {
    let Some(key) = storage.key_from_public_url(url) else {
        warn!(url, "image url does not belong to our bucket; skipping delete");
        return;
    };
    if let Err(e) = storage.delete_object(&key).await {
        warn!(error = %e, key = %key, "failed to delete scan image");
    }
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
