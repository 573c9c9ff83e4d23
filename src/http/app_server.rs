//! Router assembly for the HTTP serving layer (spec §4.6).

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::AssetStore;

use super::routes;

/// Owns the assembled [`Router`]; `bin/server.rs` hands it straight to
/// `axum::serve` the same way it hands `HotDataEngine`'s router through
/// today.
pub struct AppServer {
    pub router: Router,
}

impl AppServer {
    /// Builds the router. `allowed_origins` narrows the wildcard CORS
    /// origin the platform otherwise serves (spec §4.6); `None` means no
    /// config override, so `*` is used.
    pub fn new(store: Arc<AssetStore>, allowed_origins: Option<Vec<String>>) -> Self {
        let cors = build_cors_layer(allowed_origins);

        let router = Router::new()
            .route(
                "/am/file/v/{versionId}/{basename}",
                get(routes::get_version_asset_with_filename),
            )
            .route("/assets/v/{versionId}", get(routes::get_version_asset))
            .route("/assets/{*path}", get(routes::get_stable_asset))
            .route("/internal/blobs", post(routes::accept_blob_upload))
            .route("/internal/blobs/{storageId}", get(routes::stream_blob))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(store);

        Self { router }
    }
}

fn build_cors_layer(allowed_origins: Option<Vec<String>>) -> CorsLayer {
    let origin = match allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let parsed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            AllowOrigin::list(parsed)
        }
        _ => AllowOrigin::any(),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
        .max_age(Duration::from_secs(3600))
}
