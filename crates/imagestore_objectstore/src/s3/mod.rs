use async_trait::async_trait;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use http::{StatusCode, Uri};
use serde::Deserialize;

pub(crate) mod logging;
use super::errors::{Error, Result};
use super::s3::logging::TracingInterceptor;
use super::{Key, ObjectInfo, StorageDriver};

#[derive(Clone, Deserialize)]
pub struct S3Config {
    secret_key: String,
    access_key: String,
    hostname: String,
    bucket_name: String,
    region: String,
}

impl S3Config {
    pub async fn new_driver(&self) -> Result<S3> {
        let scp = SharedCredentialsProvider::new(
            Credentials::new(
                self.access_key.clone(),
                self.secret_key.clone(),
                None,
                None,
                "imagestore",
            )
            .provide_credentials()
            .await?,
        );

        let uri = Uri::builder()
            .scheme("https")
            .authority(self.hostname.as_str())
            .path_and_query("/")
            .build()?;

        let sdk_config = aws_config::load_from_env().await;

        let config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .region(Region::new(self.region.clone()))
            .credentials_provider(scp)
            .endpoint_url(uri.to_string())
            .interceptor(TracingInterceptor)
            .build();

        let s3_client = aws_sdk_s3::Client::from_conf(config);

        Ok(S3 {
            bucket_name: self.bucket_name.clone(),
            client: s3_client,
        })
    }
}

/// S3 has no directories; a key is a "directory" when objects exist below `<key>/`.
#[derive(Clone)]
pub struct S3 {
    bucket_name: String,
    client: Client,
}

impl S3 {
    /// Every object key below `key/`, optionally stopping at the first `/` after the prefix
    /// so only immediate children come back.
    async fn list_prefix(&self, key: &Key, delimited: bool) -> Result<Vec<String>> {
        let prefix = format!("{key}/");
        let mut found = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket_name)
                .prefix(&prefix);
            if delimited {
                req = req.delimiter("/");
            }
            if let Some(token) = continuation.take() {
                req = req.continuation_token(token);
            }
            let output = req.send().await?;

            for object in output.contents().unwrap_or_default() {
                if let Some(k) = object.key() {
                    found.push(k.to_string());
                }
            }
            for common in output.common_prefixes().unwrap_or_default() {
                if let Some(p) = common.prefix() {
                    found.push(p.trim_end_matches('/').to_string());
                }
            }

            match output.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        Ok(found)
    }

    async fn head(&self, key: &Key) -> Result<Option<u64>> {
        match self
            .client
            .head_object()
            .key(String::from(key))
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            Err(SdkError::ServiceError(e)) => {
                let http = e.raw();
                match http.status() {
                    StatusCode::NOT_FOUND => Ok(None),
                    _ => Err(SdkError::ServiceError(e).into()),
                }
            }
            Err(e) => Err(Error::AWSSDKHeadObjectError(e)),
            Ok(output) => Ok(Some(output.content_length().max(0) as u64)),
        }
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let copy_source = format!("{}/{}", &self.bucket_name, from);
        let _copy_object_output = self
            .client
            .copy_object()
            .copy_source(copy_source)
            .key(to)
            .bucket(&self.bucket_name)
            .send()
            .await?;
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> Result<()> {
        let _delete_object_output = self
            .client
            .delete_object()
            .key(key)
            .bucket(&self.bucket_name)
            .send()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for S3 {
    async fn get_content(&self, key: &Key) -> Result<Bytes> {
        let output = match self
            .client
            .get_object()
            .key(String::from(key))
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            Err(SdkError::ServiceError(e)) => {
                let http = e.raw();
                return match http.status() {
                    StatusCode::NOT_FOUND => Err(Error::NotFound(String::from(key))),
                    _ => Err(SdkError::ServiceError(e).into()),
                };
            }
            Err(e) => return Err(Error::AWSSDKGetObjectError(e)),
            Ok(output) => output,
        };

        Ok(output.body.collect().await?.into_bytes())
    }

    async fn put_content(&self, key: &Key, content: Bytes) -> Result<()> {
        let content_length = content.len() as i64;
        let _put_object_output = self
            .client
            .put_object()
            .key(String::from(key))
            .body(ByteStream::from(content))
            .content_length(content_length)
            .bucket(&self.bucket_name)
            .send()
            .await?;
        Ok(())
    }

    async fn list(&self, key: &Key) -> Result<Vec<Key>> {
        let mut children = self
            .list_prefix(key, true)
            .await?
            .into_iter()
            .map(Key::try_from)
            .collect::<Result<Vec<Key>>>()?;
        if children.is_empty() {
            return Err(Error::NotFound(String::from(key)));
        }
        children.sort();
        children.dedup();
        Ok(children)
    }

    async fn stat(&self, key: &Key) -> Result<ObjectInfo> {
        if let Some(size) = self.head(key).await? {
            return Ok(ObjectInfo {
                key: key.clone(),
                size,
                is_dir: false,
            });
        }
        match self.list_prefix(key, true).await?.is_empty() {
            false => Ok(ObjectInfo {
                key: key.clone(),
                size: 0,
                is_dir: true,
            }),
            true => Err(Error::NotFound(String::from(key))),
        }
    }

    async fn move_object(&self, from: &Key, to: &Key) -> Result<()> {
        if self.head(from).await?.is_some() {
            let (src, dst) = (String::from(from), String::from(to));
            self.copy(&src, &dst).await?;
            return self.delete_key(&src).await;
        }

        let objects = self.list_prefix(from, false).await?;
        if objects.is_empty() {
            return Err(Error::NotFound(String::from(from)));
        }
        for src in objects {
            let dst = Key::try_from(src.as_str())?
                .rebase(from, to)
                .ok_or_else(|| Error::NotFound(src.clone()))?;
            self.copy(&src, &String::from(&dst)).await?;
            self.delete_key(&src).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        let mut doomed = self.list_prefix(key, false).await?;
        if self.head(key).await?.is_some() {
            doomed.push(String::from(key));
        }
        if doomed.is_empty() {
            return Err(Error::NotFound(String::from(key)));
        }
        for k in doomed {
            self.delete_key(&k).await?;
        }
        Ok(())
    }
}
