//! # Imagestore HTTP
//!
//! `imagestore_http` exposes the catalog, upload and blob read surface of any
//! [`imagestore_core::registry::Registry`] implementation over HTTP. It is the server side of
//! the transfer channel used by pull clients.
//!
//! ## Example `main.rs`
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use imagestore_backend::StorageCatalog;
//! use imagestore_http::Imagestore;
//! use imagestore_objectstore::Memory;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let catalog = StorageCatalog::new(Arc::new(Memory::default()));
//!     let imagestore = Imagestore::new(Arc::new(catalog));
//!
//!     axum::Server::bind(&"0.0.0.0:13030".parse()?)
//!         .serve(imagestore.router()?.into_make_service())
//!         .await?;
//!     Ok(())
//! }
//! ```
use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{self, TraceLayer};

mod errors;
pub(crate) use errors::Error;
pub(crate) use errors::Result;

mod blobs;
mod manifests;
mod tags;

use imagestore_core::registry::Registry;
use imagestore_core::{Context, RepositoryName, BLOB_CHUNK_SIZE};

const MANIFEST_BODY_LIMIT: u64 = 4 * 1024 * 1024;

/// Shared handler state: the registry backend plus the root context every request derives its
/// own context from.
#[derive(Clone)]
pub struct Imagestore {
    registry: Arc<dyn Registry>,
    ctx: Context,
    chunk_size: u64,
}

impl Imagestore {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            ctx: Context::background(),
            chunk_size: BLOB_CHUNK_SIZE,
        }
    }

    /// Derive request contexts from `ctx`; cancelling it aborts every in-flight request.
    pub fn with_context(mut self, ctx: Context) -> Self {
        self.ctx = ctx;
        self
    }

    /// Largest chunk body accepted by the upload routes.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub(crate) fn request_context(&self) -> Context {
        self.ctx.child()
    }

    /// Return an [`axum::Router`] serving every route under `/v1`.
    pub fn router(&self) -> Result<axum::Router> {
        let body_limit = self.chunk_size.max(MANIFEST_BODY_LIMIT) as usize;

        let app = Router::new()
            .route("/v1/", get(version))
            .merge(manifests::router())
            .merge(tags::router())
            .merge(blobs::router())
            .layer(DefaultBodyLimit::max(body_limit))
            .with_state(self.clone())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new().include_headers(true))
                    .on_response(trace::DefaultOnResponse::new())
                    .on_request(trace::DefaultOnRequest::new()),
            )
            .layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static("imagestore-api-version"),
                HeaderValue::from_static("v1"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            ));

        Ok(app)
    }
}

async fn version() -> Result<Response> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str("application/json")?,
    );
    Ok((StatusCode::OK, headers, "{}").into_response())
}

fn path_param<'a>(params: &'a HashMap<String, String>, key: &'static str) -> Result<&'a str> {
    params
        .get(key)
        .map(String::as_str)
        .ok_or(Error::MissingPathParameter(key))
}

/// Repository names arrive percent-decoded, so nested names are whole again here.
fn repository_name(params: &HashMap<String, String>) -> Result<RepositoryName> {
    Ok(RepositoryName::try_from(path_param(params, "name")?)?)
}
