use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::{error, info};
use warp::{http::StatusCode, Filter, Rejection, Reply};

use super::routes::*;
use super::types::ApiError;
use crate::error_handling::types::WebError;
use crate::storage::storage_trait::Storage;

/// Web server for the upload endpoint, the JSON API and the dashboard
pub struct WebServer {
    storage: Arc<dyn Storage>,
}

impl WebServer {
    /// Create a new WebServer instance
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// All routes, with rejections turned into JSON error bodies
    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
        let storage = self.storage.clone();

        dashboard_route()
            .or(upload_route(storage.clone()))
            .or(list_records_route(storage.clone()))
            .or(session_records_route(storage.clone()))
            .or(download_session_route(storage.clone()))
            .or(session_summaries_route(storage.clone()))
            .or(stats_route(storage.clone()))
            .or(health_route(storage.clone()))
            .or(clear_route(storage))
            .recover(handle_rejection)
    }

    /// Start the web server on the given address and port
    pub async fn start(&self, bind_address: &str, port: u16) -> Result<(), WebError> {
        let ip: IpAddr = bind_address
            .parse()
            .map_err(|e| WebError::InvalidAddress(format!("{}: {}", bind_address, e)))?;
        let addr = SocketAddr::new(ip, port);

        info!(
            "Listening on http://{} using the {} backend",
            addr,
            self.storage.backend()
        );
        warp::serve(self.routes()).run(addr).await;

        Ok(())
    }
}

/// Maps filter rejections to JSON error payloads.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, kind, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "NotFound", "Not found".to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, "InvalidQuery", e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "PayloadTooLarge",
            format!("Upload body exceeds {} bytes", MAX_UPLOAD_BYTES),
        )
    } else if let Some(e) = err.find::<warp::reject::LengthRequired>() {
        (StatusCode::LENGTH_REQUIRED, "LengthRequired", e.to_string())
    } else if let Some(e) = err.find::<warp::reject::MethodNotAllowed>() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "MethodNotAllowed",
            e.to_string(),
        )
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "InternalError",
            "Unhandled request error".to_string(),
        )
    };

    Ok(json_error(status, ApiError::new(kind, message)))
}
