use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use super::errors::Result;
use super::{repository_name, Imagestore};

pub fn router() -> Router<Imagestore> {
    Router::new()
        .route("/v1/:name/tags/list", get(get_tags))
        .route("/v1/:name/images", get(get_images))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TagList {
    pub name: String,
    pub tags: Vec<String>,
}

async fn get_tags(
    State(imagestore): State<Imagestore>,
    Path(path_params): Path<HashMap<String, String>>,
) -> Result<Response> {
    let name = repository_name(&path_params)?;
    let ctx = imagestore.request_context();
    let tags = imagestore.registry.list_tags(&ctx, &name).await?;

    let tag_list = TagList {
        name: name.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    };
    Ok((StatusCode::OK, Json(tag_list)).into_response())
}

async fn get_images(
    State(imagestore): State<Imagestore>,
    Path(path_params): Path<HashMap<String, String>>,
) -> Result<Response> {
    let name = repository_name(&path_params)?;
    let ctx = imagestore.request_context();
    let images = imagestore.registry.find_images(&ctx, &name).await?;
    Ok((StatusCode::OK, Json(images)).into_response())
}
