use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use imagestore_core::routes::blob_manifest_route;
use imagestore_core::{ContentDigest, UploadInfo};

use super::errors::{Error, Result};
use super::{path_param, repository_name, Imagestore};

pub fn router() -> Router<Imagestore> {
    Router::new()
        .route("/v1/:name/blobs/:digest/manifest", get(get_blob_manifest))
        .route("/v1/:name/blobs/:digest/chunks/:chunk", get(get_chunk))
        .route("/v1/:name/blobs/uploads/", post(uploads_post))
        .route("/v1/:name/blobs/uploads/:session", put(uploads_complete))
        .route(
            "/v1/:name/blobs/uploads/:session/chunks/:index/:digest",
            put(uploads_put_chunk),
        )
}

fn digest_param(params: &HashMap<String, String>, key: &'static str) -> Result<ContentDigest> {
    Ok(ContentDigest::try_from(path_param(params, key)?)?)
}

fn session_param(params: &HashMap<String, String>) -> Result<Uuid> {
    Uuid::parse_str(path_param(params, "session")?)
        .map_err(|e| Error::InvalidPathParameter("session", format!("{e}")))
}

/// Body returned when an upload session is opened.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadSessionResponse {
    pub uuid: Uuid,
    pub location: String,
}

async fn get_blob_manifest(
    State(imagestore): State<Imagestore>,
    Path(path_params): Path<HashMap<String, String>>,
) -> Result<Response> {
    let blobsum = digest_param(&path_params, "digest")?;
    let ctx = imagestore.request_context();
    let manifest = imagestore.registry.get_blob_manifest(&ctx, &blobsum).await?;
    Ok((StatusCode::OK, Json(manifest)).into_response())
}

async fn get_chunk(
    State(imagestore): State<Imagestore>,
    Path(path_params): Path<HashMap<String, String>>,
) -> Result<Response> {
    let blobsum = digest_param(&path_params, "digest")?;
    let chunk = digest_param(&path_params, "chunk")?;
    let ctx = imagestore.request_context();
    let bs = imagestore.registry.get_chunk(&ctx, &blobsum, &chunk).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        HeaderName::from_static("imagestore-content-digest"),
        HeaderValue::from_str(&chunk.to_string())?,
    );
    Ok((StatusCode::OK, headers, bs).into_response())
}

async fn uploads_post(
    State(imagestore): State<Imagestore>,
    Path(path_params): Path<HashMap<String, String>>,
    Json(info): Json<UploadInfo>,
) -> Result<Response> {
    let name = repository_name(&path_params)?;
    let ctx = imagestore.request_context();
    let session = imagestore
        .registry
        .prepare_blob_upload(&ctx, &name, &info)
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::LOCATION, HeaderValue::from_str(&session.location)?);
    let body = UploadSessionResponse {
        uuid: session.uuid,
        location: session.location,
    };
    Ok((StatusCode::ACCEPTED, headers, Json(body)).into_response())
}

async fn uploads_put_chunk(
    State(imagestore): State<Imagestore>,
    Path(path_params): Path<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response> {
    let name = repository_name(&path_params)?;
    let session = session_param(&path_params)?;
    let digest = digest_param(&path_params, "digest")?;
    let index: u32 = path_param(&path_params, "index")?
        .parse()
        .map_err(|e| Error::InvalidPathParameter("index", format!("{e}")))?;

    let ctx = imagestore.request_context();
    let mut writer = imagestore
        .registry
        .get_chunk_writer(&ctx, &name, &session, index, &digest)
        .await?;
    writer.write(&body)?;
    writer.commit(&ctx).await?;

    Ok((StatusCode::CREATED, "").into_response())
}

async fn uploads_complete(
    State(imagestore): State<Imagestore>,
    Path(path_params): Path<HashMap<String, String>>,
) -> Result<Response> {
    let name = repository_name(&path_params)?;
    let session = session_param(&path_params)?;
    let ctx = imagestore.request_context();
    let digest = imagestore
        .registry
        .complete_upload(&ctx, &name, &session)
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("imagestore-content-digest"),
        HeaderValue::from_str(&digest.to_string())?,
    );
    headers.insert(
        header::LOCATION,
        HeaderValue::from_str(&blob_manifest_route(&name, &digest))?,
    );
    Ok((StatusCode::CREATED, headers, "").into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::Method;

    use imagestore_core::chunks::chunk_ranges;
    use imagestore_core::routes::blob_chunk_route;
    use imagestore_core::{BlobManifest, RepositoryName};

    use crate::testing::{router, send};

    use super::*;

    #[tokio::test]
    async fn chunked_upload_over_http() {
        let router = router();
        let blob = b"0123456789";
        let digest = ContentDigest::from(&blob[..]);
        let info = serde_json::to_vec(&UploadInfo {
            digest: digest.clone(),
            size: Some(blob.len() as u64),
        })
        .unwrap();

        let (status, headers, body) =
            send(&router, Method::POST, "/v1/foo/blobs/uploads/", info.clone()).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let session: UploadSessionResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(headers[header::LOCATION], session.location.as_str());

        for r in chunk_ranges(blob.len() as u64, 4) {
            let bs = blob[r.offset as usize..(r.offset + r.len) as usize].to_vec();
            let uri = format!(
                "{}/chunks/{}/{}",
                session.location,
                r.index,
                ContentDigest::from(bs.as_slice())
            );
            let (status, _, _) = send(&router, Method::PUT, &uri, bs).await;
            assert_eq!(status, StatusCode::CREATED, "{uri}");
        }

        let (status, headers, _) = send(&router, Method::PUT, &session.location, "").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(headers["imagestore-content-digest"], digest.to_string().as_str());

        let uri = format!("/v1/foo/blobs/{digest}/manifest");
        let (status, _, body) = send(&router, Method::GET, &uri, "").await;
        assert_eq!(status, StatusCode::OK);
        let manifest = BlobManifest::from_json(&body).unwrap();
        assert_eq!(manifest.chunks.len(), 3);

        let name = RepositoryName::try_from("foo").unwrap();
        let uri = blob_chunk_route(&name, &digest, &manifest.chunks[2]);
        let (status, headers, body) = send(&router, Method::GET, &uri, "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(&body[..], b"89");

        let (status, _, _) = send(&router, Method::POST, "/v1/foo/blobs/uploads/", info).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn oversized_and_corrupt_chunks_are_rejected() {
        let router = router();
        let info = serde_json::to_vec(&UploadInfo {
            digest: ContentDigest::from(&b"abcd"[..]),
            size: None,
        })
        .unwrap();
        let (_, _, body) = send(&router, Method::POST, "/v1/foo/blobs/uploads/", info).await;
        let session: UploadSessionResponse = serde_json::from_slice(&body).unwrap();

        let big = b"abcdef".to_vec();
        let uri = format!(
            "{}/chunks/0/{}",
            session.location,
            ContentDigest::from(big.as_slice())
        );
        let (status, _, _) = send(&router, Method::PUT, &uri, big).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        let uri = format!(
            "{}/chunks/0/{}",
            session.location,
            ContentDigest::from(&b"abcd"[..])
        );
        let (status, _, _) = send(&router, Method::PUT, &uri, b"abce".to_vec()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!("/v1/foo/blobs/uploads/{}", Uuid::new_v4());
        let (status, _, _) = send(&router, Method::PUT, &uri, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = send(&router, Method::PUT, "/v1/foo/blobs/uploads/nope", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
