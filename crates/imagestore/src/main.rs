use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

use imagestore_backend::StorageCatalog;
use imagestore_client::{HttpTransport, LocalLayout, Puller, Transport, Uploader};
use imagestore_core::registry::Catalog;
use imagestore_core::{
    ContentDigest, Context, Error as CoreError, ImageManifest, ManifestSpec, Reference,
    RepositoryName, TagName,
};
use imagestore_http::Imagestore;

mod config;
use crate::config::{ClientConfig, Config};

#[derive(Parser)]
struct Cli {
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the registry over HTTP.
    Serve,
    /// Upload a layer file and push its manifest.
    Add {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        arch: String,
        #[arg(long, default_value = "")]
        author: String,
        #[arg(long, default_value = "")]
        desc: String,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Pull an image and its missing ancestors into the client root.
    Pull {
        #[arg(long)]
        name: String,
        #[arg(long)]
        reference: String,
    },
    Tags {
        #[arg(long)]
        name: String,
    },
    Images {
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .compact()
        .init();

    // load configuration
    let mut config_file = File::open(cli.config_file.unwrap_or("./imagestore.yml".into()))?;
    let mut s = String::new();
    config_file.read_to_string(&mut s)?;
    let config: Config = serde_yaml::from_str(&s)?;

    let ctx = Context::background();
    match cli.command {
        Command::Serve => serve(ctx, config).await,
        Command::Add {
            file,
            name,
            arch,
            author,
            desc,
            parent,
            tag,
        } => {
            let catalog = Arc::new(config.catalog.new_catalog().await?);
            let spec = ManifestSpec {
                name,
                parent: parent.as_deref().map(ContentDigest::try_from).transpose()?,
                arch,
                author,
                desc,
                ..Default::default()
            };
            let id = add(&ctx, catalog, &file, spec, tag.as_deref()).await?;
            println!("{id}");
            Ok(())
        }
        Command::Pull { name, reference } => {
            let (transport, client) = transport(&config)?;
            let puller = Puller::new(transport, LocalLayout::new(&client.root));
            let name = RepositoryName::try_from(name.as_str())?;
            let reference = Reference::from_str(&reference)?;
            for id in puller.pull(&ctx, &name, &reference).await? {
                println!("{id}");
            }
            Ok(())
        }
        Command::Tags { name } => {
            let (transport, _) = transport(&config)?;
            let name = RepositoryName::try_from(name.as_str())?;
            for tag in transport.list_tags(&ctx, &name).await? {
                println!("{tag}");
            }
            Ok(())
        }
        Command::Images { name } => {
            let (transport, _) = transport(&config)?;
            let name = RepositoryName::try_from(name.as_str())?;
            for image in transport.find_images(&ctx, &name).await? {
                println!("{}\t{}\t{}", image.id, image.arch, image.desc);
            }
            Ok(())
        }
    }
}

async fn serve(ctx: Context, config: Config) -> Result<()> {
    let catalog = config.catalog.new_catalog().await?;
    let imagestore = Imagestore::new(Arc::new(catalog))
        .with_chunk_size(config.catalog.chunk_size)
        .with_context(ctx.clone());
    let router = imagestore.router()?;

    tracing::info!("listening on {}", config.listen);
    axum::Server::bind(&config.listen)
        .serve(router.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("unable to listen for shutdown signal: {e}");
            }
            ctx.cancel();
        })
        .await?;

    Ok(())
}

/// Upload `file` as a blob, then push the manifest describing it. The manifest goes under `tag`
/// if one is given and under its own id otherwise.
async fn add(
    ctx: &Context,
    catalog: Arc<StorageCatalog>,
    file: &Path,
    mut spec: ManifestSpec,
    tag: Option<&str>,
) -> Result<ContentDigest> {
    let size = std::fs::metadata(file)?.len();
    if size == 0 {
        return Err(CoreError::InvalidManifest(format!("{} is empty", file.display())).into());
    }

    let chunk_size = catalog.chunk_size();
    let outcome = Uploader::new(catalog.clone())
        .with_chunk_size(chunk_size)
        .upload_file(ctx, &RepositoryName::try_from(spec.name.as_str())?, file)
        .await
        .with_context(|| format!("uploading {}", file.display()))?;

    spec.blobsum = Some(outcome.digest().clone());
    spec.size = size;
    spec.created = chrono::Utc::now().to_rfc3339();
    let manifest = ImageManifest::from_spec(spec)?;

    let name = RepositoryName::try_from(manifest.name.as_str())?;
    let reference = match tag {
        Some(tag) => Reference::from(TagName::try_from(tag)?),
        None => Reference::from(&manifest.id),
    };
    let id = catalog.put_manifest(ctx, &name, &reference, &manifest).await?;
    tracing::info!("added {name}@{id} ({reference})");
    Ok(id)
}

fn transport(config: &Config) -> Result<(Arc<HttpTransport>, &ClientConfig)> {
    let client = config
        .client
        .as_ref()
        .context("configuration has no client section")?;
    Ok((Arc::new(HttpTransport::new(&client.server)?), client))
}
