use log::{error, info};
use serde_json::Value;

use crate::error_handling::types::UploadError;
use crate::normalization::normalize_batch;
use crate::storage::storage_trait::Storage;

/// Parses a raw upload body into a JSON document.
pub fn parse_body(body: &[u8]) -> Result<Value, UploadError> {
    serde_json::from_slice(body).map_err(|e| UploadError::InvalidJson(e.to_string()))
}

/// Normalizes a JSON array of entries and stores them as one batch.
///
/// Nothing is written unless every element is an object and the whole batch commits.
pub async fn upload_batch(storage: &dyn Storage, body: &Value) -> Result<usize, UploadError> {
    let entries = body.as_array().ok_or(UploadError::NotAnArray)?;

    let records = normalize_batch(entries).map_err(|e| {
        error!("Rejected upload: {}", e);
        UploadError::from(e)
    })?;

    let inserted = storage.insert_batch(&records).await.map_err(|e| {
        error!("Upload failed: {}", e);
        UploadError::from(e)
    })?;

    info!("Stored {} session records", inserted);
    Ok(inserted)
}
