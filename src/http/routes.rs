//! HTTP serving layer routes (spec §4.6).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};

use crate::api::{AssetStore, ServeOutcome};
use crate::auth::Actor;
use crate::ids::VersionId;

use super::error::ApiError;

fn serve_response(outcome: ServeOutcome, cache_control: &'static str, etag: Option<String>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static(cache_control));
    if let Some(etag) = etag {
        if let Ok(value) = etag.parse() {
            headers.insert(header::ETAG, value);
        }
    }

    match outcome {
        ServeOutcome::Redirect(url) => {
            (headers, Redirect::temporary(&url)).into_response()
        }
        ServeOutcome::Inline { content_type, bytes } => {
            if let Ok(value) = content_type.parse() {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (StatusCode::OK, headers, bytes).into_response()
        }
    }
}

/// `GET /assets/{folderPath...}/{basename}` - published bytes for the
/// named asset, cached for 60 seconds and revalidated by `ETag`.
pub async fn get_stable_asset(
    State(store): State<Arc<AssetStore>>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let (folder_path, basename) = split_asset_path(&path)?;
    let (version, outcome) = store
        .get_published_file(Actor::Anonymous, &folder_path, &basename)
        .await?;
    Ok(serve_response(
        outcome,
        "public, max-age=60, must-revalidate",
        Some(format!("\"{}\"", version.id)),
    ))
}

/// `GET /assets/v/{versionId}` - a specific version's bytes, immutable.
pub async fn get_version_asset(
    State(store): State<Arc<AssetStore>>,
    Path(version_id): Path<String>,
) -> Result<Response, ApiError> {
    let version_id: VersionId = version_id
        .parse()
        .map_err(|_| ApiError::not_found("unknown version id"))?;
    let (version, outcome) = store.get_version_file(Actor::Anonymous, version_id).await?;
    Ok(serve_response(
        outcome,
        "public, max-age=31536000, immutable",
        Some(format!("\"{}\"", version.id)),
    ))
}

/// `GET /am/file/v/{versionId}/{basename}` - identical to
/// `get_version_asset` but with a human-friendly filename segment that is
/// not otherwise consulted.
pub async fn get_version_asset_with_filename(
    State(store): State<Arc<AssetStore>>,
    Path((version_id, _basename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let version_id: VersionId = version_id
        .parse()
        .map_err(|_| ApiError::not_found("unknown version id"))?;
    let (version, outcome) = store.get_version_file(Actor::Anonymous, version_id).await?;
    Ok(serve_response(
        outcome,
        "public, max-age=31536000, immutable",
        Some(format!("\"{}\"", version.id)),
    ))
}

/// `POST /internal/blobs` - upload-accept route for the platform backend,
/// which has no independent endpoint of its own to presign a URL against
/// (see `storage::convex`). Returns the opaque `storageId` the client
/// must pass back to `finishUpload`.
pub async fn accept_blob_upload(
    State(store): State<Arc<AssetStore>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let storage_id = store.accept_blob_upload(body).await?;
    Ok(axum::Json(serde_json::json!({ "storageId": storage_id })).into_response())
}

/// `GET /internal/blobs/{storageId}` - streams a platform-backed blob by
/// its opaque handle, the target of `signedReadUrl` for that backend.
pub async fn stream_blob(
    State(store): State<Arc<AssetStore>>,
    Path(storage_id): Path<String>,
) -> Result<Response, ApiError> {
    let version = store
        .repo()
        .get_version_by_storage_id(&storage_id)
        .await?
        .ok_or_else(|| ApiError::not_found("unknown storage id"))?;
    let (_version, outcome) = store.get_version_file(Actor::Anonymous, version.id).await?;
    Ok(serve_response(outcome, "private, max-age=60", None))
}

/// Splits a `/assets/{folderPath...}/{basename}` wildcard capture into
/// `(folderPath, basename)`. The last segment is always the basename;
/// everything before it is the folder path (`""` for root-level assets).
fn split_asset_path(path: &str) -> Result<(String, String), ApiError> {
    let path = path.trim_matches('/');
    match path.rsplit_once('/') {
        Some((folder_path, basename)) if !basename.is_empty() => {
            Ok((folder_path.to_string(), basename.to_string()))
        }
        Some(_) => Err(ApiError::bad_request("missing basename")),
        None if !path.is_empty() => Ok((String::new(), path.to_string())),
        None => Err(ApiError::bad_request("missing basename")),
    }
}
