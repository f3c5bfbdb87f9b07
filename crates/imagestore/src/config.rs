use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

use imagestore_backend::StorageCatalogConfig;

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(flatten)]
    pub catalog: StorageCatalogConfig,
    pub client: Option<ClientConfig>,
}

#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    pub root: PathBuf,
    #[serde(default = "default_server")]
    pub server: String,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 13030))
}

fn default_server() -> String {
    String::from("http://127.0.0.1:13030")
}

#[cfg(test)]
mod tests {
    use imagestore_core::BLOB_CHUNK_SIZE;

    use super::*;

    #[test]
    fn full_config() {
        let cfg: Config = serde_yaml::from_str(
            r#"
listen: 127.0.0.1:8080
chunk_size: 1024
storage:
  type: Filesystem
  root: /var/lib/imagestore
client:
  root: /var/lib/imagestore-client
  server: http://registry:8080
"#,
        )
        .unwrap();
        assert_eq!(cfg.listen, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(cfg.catalog.chunk_size, 1024);
        assert!(matches!(
            cfg.catalog.storage,
            imagestore_objectstore::Config::Filesystem { .. }
        ));
        let client = cfg.client.unwrap();
        assert_eq!(client.root, PathBuf::from("/var/lib/imagestore-client"));
        assert_eq!(client.server, "http://registry:8080");
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg: Config = serde_yaml::from_str("storage:\n  type: Inmemory\n").unwrap();
        assert_eq!(cfg.listen, default_listen());
        assert_eq!(cfg.catalog.chunk_size, BLOB_CHUNK_SIZE);
        assert!(cfg.client.is_none());
    }
}
