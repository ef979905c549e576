use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use futures::TryStreamExt;
use log::{error, info, warn};
use serde_json::Value;
use warp::multipart::FormData;
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::types::{
    ApiError, ClearResponse, HealthResponse, PageQuery, SessionRecordsResponse, SummariesResponse,
    UploadResponse,
};
use crate::error_handling::types::{StorageError, UploadError};
use crate::ingest::{parse_body, upload_batch};
use crate::normalization::nest;
use crate::storage::storage_trait::Storage;
use crate::storage::types::{PageRequest, DEFAULT_PAGE_LIMIT};

/// Largest accepted `POST /upload` body.
pub const MAX_UPLOAD_BYTES: u64 = 32 * 1024 * 1024;

const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>VR Session Dashboard</title></head>
<body>
<h1>VR session server is running</h1>
<pre id="stats">Loading statistics...</pre>
<ul>
  <li><a href="/api/stats">/api/stats</a></li>
  <li><a href="/api/sessions">/api/sessions</a></li>
  <li><a href="/api/session-summaries">/api/session-summaries</a></li>
  <li><a href="/api/health">/api/health</a></li>
</ul>
<script>
function show(text) { document.getElementById("stats").textContent = text; }
fetch("/api/stats")
  .then(r => r.json())
  .then(s => { show(JSON.stringify(s, null, 2)); })
  .catch(e => { show("Failed to load statistics: " + e); });
</script>
</body>
</html>"#;

pub(crate) fn json_error(status: StatusCode, body: ApiError) -> reply::Response {
    reply::with_status(reply::json(&body), status).into_response()
}

fn storage_failure(e: StorageError) -> reply::Response {
    error!("Storage operation failed: {}", e);
    let index = match &e {
        StorageError::WriteFailed { index, .. } => *index,
        _ => None,
    };
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        ApiError::new(e.kind(), e.to_string()).at(index),
    )
}

fn upload_failure(e: UploadError) -> reply::Response {
    match e {
        UploadError::Malformed(inner) => json_error(
            StatusCode::BAD_REQUEST,
            ApiError::new(inner.kind(), inner.to_string()).at(Some(inner.index())),
        ),
        UploadError::Storage(inner) => storage_failure(inner),
        _ => {
            warn!("Rejected upload: {}", e);
            json_error(
                StatusCode::BAD_REQUEST,
                ApiError::new(e.kind(), e.to_string()),
            )
        }
    }
}

fn multipart_error(e: warp::Error) -> UploadError {
    UploadError::InvalidMultipart(e.to_string())
}

// The first part named `file` holds the JSON array; other parts are ignored.
async fn read_file_part(form: FormData) -> Result<Bytes, UploadError> {
    let mut parts = Box::pin(form);
    while let Some(part) = parts.try_next().await.map_err(multipart_error)? {
        if part.name() != "file" {
            continue;
        }
        let mut data = BytesMut::new();
        let mut chunks = Box::pin(part.stream());
        while let Some(chunk) = chunks.try_next().await.map_err(multipart_error)? {
            data.put(chunk);
        }
        return Ok(data.freeze());
    }
    Err(UploadError::MissingFilePart)
}

fn page_request(query: &PageQuery) -> PageRequest {
    PageRequest::new(
        query.offset.unwrap_or(0),
        query.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
    )
}

// Path segments arrive percent-encoded.
fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn download_filename(session_id: &str) -> String {
    let safe: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("session_{}.json", safe)
}

/// GET /
pub fn dashboard_route() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path::end()
        .and(warp::get())
        .and_then(|| async move { Ok::<_, Rejection>(reply::html(DASHBOARD_HTML)) })
}

/// POST /upload
///
/// The JSON array is either the raw request body or, for `multipart/form-data`, the content of
/// the `file` part.
pub fn upload_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let multipart_body = warp::multipart::form()
        .max_length(MAX_UPLOAD_BYTES)
        .and_then(|form: FormData| async move {
            Ok::<_, Rejection>(read_file_part(form).await)
        });
    let raw_body = warp::body::content_length_limit(MAX_UPLOAD_BYTES)
        .and(warp::body::bytes())
        .map(Ok::<Bytes, UploadError>);

    warp::path("upload")
        .and(warp::path::end())
        .and(warp::post())
        .and(multipart_body.or(raw_body).unify())
        .and_then(move |body: Result<Bytes, UploadError>| {
            let storage = storage.clone();
            async move {
                let result = match body.and_then(|body| parse_body(&body)) {
                    Ok(value) => upload_batch(storage.as_ref(), &value).await,
                    Err(e) => Err(e),
                };
                let res = match result {
                    Ok(inserted) => reply::with_status(
                        reply::json(&UploadResponse { inserted }),
                        StatusCode::OK,
                    )
                    .into_response(),
                    Err(e) => upload_failure(e),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// GET /api/sessions?offset=&limit=
pub fn list_records_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "sessions")
        .and(warp::get())
        .and(warp::query::<PageQuery>())
        .and_then(move |query: PageQuery| {
            let storage = storage.clone();
            async move {
                let res = match storage.query_page(page_request(&query)).await {
                    Ok(page) => reply::json(&page).into_response(),
                    Err(e) => storage_failure(e),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// GET /api/sessions/:session_id
pub fn session_records_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "sessions" / String)
        .and(warp::get())
        .and_then(move |raw_id: String| {
            let storage = storage.clone();
            async move {
                let session_id = decode_segment(&raw_id);
                let res = match storage.query_by_id(&session_id).await {
                    Ok(records) => {
                        reply::json(&SessionRecordsResponse { session_id, records }).into_response()
                    }
                    Err(e) => storage_failure(e),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// GET /api/sessions/:session_id/download
pub fn download_session_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "sessions" / String / "download")
        .and(warp::get())
        .and_then(move |raw_id: String| {
            let storage = storage.clone();
            async move {
                let session_id = decode_segment(&raw_id);
                let res = match storage.query_by_id(&session_id).await {
                    Ok(records) => {
                        let nested: Vec<Value> =
                            records.iter().map(|stored| nest(&stored.record)).collect();
                        info!(
                            "Exporting {} records for session {}",
                            nested.len(),
                            session_id
                        );
                        reply::with_header(
                            reply::json(&nested),
                            "Content-Disposition",
                            format!("attachment; filename={}", download_filename(&session_id)),
                        )
                        .into_response()
                    }
                    Err(e) => storage_failure(e),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// GET /api/session-summaries?offset=&limit=
pub fn session_summaries_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "session-summaries")
        .and(warp::get())
        .and(warp::query::<PageQuery>())
        .and_then(move |query: PageQuery| {
            let storage = storage.clone();
            async move {
                let page = page_request(&query);
                let res = match storage.session_summaries(page).await {
                    Ok(summaries) => {
                        let has_more = page.offset() + (summaries.items.len() as u64)
                            < summaries.total;
                        reply::json(&SummariesResponse {
                            items: summaries.items,
                            total: summaries.total,
                            has_more,
                        })
                        .into_response()
                    }
                    Err(e) => storage_failure(e),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// GET /api/stats
pub fn stats_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "stats")
        .and(warp::get())
        .and_then(move || {
            let storage = storage.clone();
            async move {
                let res = match storage.aggregate_stats().await {
                    Ok(stats) => reply::json(&stats).into_response(),
                    Err(e) => storage_failure(e),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// GET /api/health
pub fn health_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "health")
        .and(warp::get())
        .and_then(move || {
            let storage = storage.clone();
            async move {
                let res = match storage.health().await {
                    Ok(report) => reply::with_status(
                        reply::json(&HealthResponse {
                            status: "healthy".into(),
                            database: "connected".into(),
                            backend: Some(report.backend),
                            total_records: Some(report.total_records),
                            total_sessions: Some(report.total_sessions),
                            error: None,
                        }),
                        StatusCode::OK,
                    ),
                    Err(e) => {
                        error!("Health check failed: {}", e);
                        reply::with_status(
                            reply::json(&HealthResponse {
                                status: "unhealthy".into(),
                                database: "disconnected".into(),
                                backend: None,
                                total_records: None,
                                total_sessions: None,
                                error: Some(e.to_string()),
                            }),
                            StatusCode::SERVICE_UNAVAILABLE,
                        )
                    }
                };
                Ok::<_, Rejection>(res)
            }
        })
}

/// DELETE /api/clear
pub fn clear_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "clear")
        .and(warp::delete())
        .and_then(move || {
            let storage = storage.clone();
            async move {
                let res = match storage.clear_all().await {
                    Ok(deleted) => {
                        info!("Cleared {} session records", deleted);
                        reply::json(&ClearResponse { deleted }).into_response()
                    }
                    Err(e) => storage_failure(e),
                };
                Ok::<_, Rejection>(res)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_segment() {
        assert_eq!(decode_segment("team%20a%2F1"), "team a/1");
        assert_eq!(decode_segment("plain"), "plain");
        // invalid utf-8 after decoding keeps the raw segment
        assert_eq!(decode_segment("%FF"), "%FF");
    }

    #[test]
    fn test_download_filename_is_header_safe() {
        assert_eq!(download_filename("abc-123"), "session_abc-123.json");
        assert_eq!(download_filename("a b/\"c\""), "session_a_b__c_.json");
    }

    #[test]
    fn test_page_request_defaults_and_clamps() {
        assert_eq!(page_request(&PageQuery::default()), PageRequest::default());
        let page = page_request(&PageQuery {
            offset: Some(10),
            limit: Some(10_000),
        });
        assert_eq!(page.offset(), 10);
        assert_eq!(page.limit(), 500);
    }
}
