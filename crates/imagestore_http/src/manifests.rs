use std::collections::HashMap;
use std::str::FromStr;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;

use imagestore_core::routes::manifest_route;
use imagestore_core::{ImageManifest, Reference};

use super::errors::Result;
use super::{path_param, repository_name, Imagestore};

pub fn router() -> Router<Imagestore> {
    Router::new().route(
        "/v1/:name/manifests/:reference",
        get(get_manifest).put(put_manifest),
    )
}

async fn get_manifest(
    State(imagestore): State<Imagestore>,
    Path(path_params): Path<HashMap<String, String>>,
) -> Result<Response> {
    let name = repository_name(&path_params)?;
    let reference = Reference::from_str(path_param(&path_params, "reference")?)?;

    let ctx = imagestore.request_context();
    let manifest = imagestore
        .registry
        .get_manifest(&ctx, &name, &reference)
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("imagestore-content-digest"),
        HeaderValue::from_str(&manifest.id.to_string())?,
    );
    Ok((StatusCode::OK, headers, Json(manifest)).into_response())
}

async fn put_manifest(
    State(imagestore): State<Imagestore>,
    Path(path_params): Path<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response> {
    let name = repository_name(&path_params)?;
    let reference = Reference::from_str(path_param(&path_params, "reference")?)?;
    let manifest = ImageManifest::from_json(&body)?;

    let ctx = imagestore.request_context();
    let id = imagestore
        .registry
        .put_manifest(&ctx, &name, &reference, &manifest)
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("imagestore-content-digest"),
        HeaderValue::from_str(&id.to_string())?,
    );
    headers.insert(
        header::LOCATION,
        HeaderValue::from_str(&manifest_route(&name, &Reference::from(&id)))?,
    );
    Ok((StatusCode::CREATED, headers, "").into_response())
}
