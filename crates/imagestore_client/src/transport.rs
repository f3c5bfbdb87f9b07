//! The transfer channel: fetch a route, get bytes back or a structured error.
use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request, Uri};

use imagestore_core::routes::{
    blob_chunk_route, blob_manifest_route, images_route, manifest_route, tags_route,
};
use imagestore_core::{
    BlobManifest, ContentDigest, Context, Error as CoreError, ErrorResponse, ImageManifest,
    Reference, RepositoryName,
};

use crate::errors::{Error, Result};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `route`. Any status other than 200 is decoded into the error it carries.
    async fn get(&self, ctx: &Context, route: &str) -> Result<Bytes>;

    async fn get_manifest(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        reference: &Reference,
    ) -> Result<ImageManifest> {
        let bs = self.get(ctx, &manifest_route(name, reference)).await?;
        Ok(ImageManifest::from_json(&bs)?)
    }

    async fn get_blob_manifest(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        blobsum: &ContentDigest,
    ) -> Result<BlobManifest> {
        let bs = self.get(ctx, &blob_manifest_route(name, blobsum)).await?;
        Ok(BlobManifest::from_json(&bs)?)
    }

    async fn get_chunk(
        &self,
        ctx: &Context,
        name: &RepositoryName,
        blobsum: &ContentDigest,
        chunk: &ContentDigest,
    ) -> Result<Bytes> {
        self.get(ctx, &blob_chunk_route(name, blobsum, chunk)).await
    }

    async fn list_tags(&self, ctx: &Context, name: &RepositoryName) -> Result<Vec<String>> {
        let bs = self.get(ctx, &tags_route(name)).await?;
        let list: TagList = serde_json::from_slice(&bs)
            .map_err(|e| CoreError::BackendError(format!("unreadable tag list: {e}")))?;
        Ok(list.tags)
    }

    async fn find_images(
        &self,
        ctx: &Context,
        name: &RepositoryName,
    ) -> Result<Vec<ImageManifest>> {
        let bs = self.get(ctx, &images_route(name)).await?;
        Ok(serde_json::from_slice(&bs)
            .map_err(|e| CoreError::InvalidManifest(format!("{e}")))?)
    }
}

#[derive(serde::Deserialize)]
struct TagList {
    tags: Vec<String>,
}

/// Turn a response into its body, or into the error its payload describes.
pub fn decode_response(status: StatusCode, body: Bytes) -> Result<Bytes> {
    if status == StatusCode::OK {
        return Ok(body);
    }
    match serde_json::from_slice::<ErrorResponse>(&body) {
        Ok(response) => Err(CoreError::from(response).into()),
        Err(_) => Err(Error::UnexpectedStatus(
            status,
            String::from_utf8_lossy(&body).into_owned(),
        )),
    }
}

/// [`Transport`] over plain HTTP.
pub struct HttpTransport {
    client: Client<HttpConnector, Body>,
    base: String,
}

impl HttpTransport {
    /// `base` is the server address, e.g. `http://127.0.0.1:13030`.
    pub fn new(base: &str) -> Result<Self> {
        // fail on a bad address now rather than on first use
        base.parse::<Uri>()?;
        Ok(Self {
            client: Client::new(),
            base: base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, ctx: &Context, route: &str) -> Result<Bytes> {
        let uri: Uri = format!("{}{route}", self.base).parse()?;
        tracing::debug!("GET {uri}");
        let request = Request::get(uri).body(Body::empty())?;

        let (status, body) = ctx
            .run(async {
                let response = self.client.request(request).await?;
                let status = response.status();
                let body = hyper::body::to_bytes(response.into_body()).await?;
                Ok::<_, Error>((status, body))
            })
            .await?;
        decode_response(status, body)
    }
}
