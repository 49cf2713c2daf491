//! Manual S3 REST client: SigV4 signing, concurrent multipart upload,
//! chunked parallel download, and V2 bucket listing.
//!
//! This exists because the core's contract (its own signer, its own
//! part-size growth curve, its own checksum-of-checksums verification) is
//! observable on the wire and not just an implementation detail an SDK could
//! paper over.

mod client;
mod download;
pub mod sign;
mod upload;
mod xml;

pub use sign::AwsCredentials;

use async_trait::async_trait;
use reqwest::Method;

use self::client::S3Client;
use self::download::ChunkedDownload;
use self::upload::MultipartUpload;
use crate::remote::{natural_key_order, RemoteStorage};
use crate::sink::{Sink, Source};
use crate::StorageError;

pub struct S3Bucket {
    client: S3Client,
    prefix: String,
}

impl S3Bucket {
    pub fn new(host: String, bucket: String, prefix: String, credentials: AwsCredentials) -> Self {
        Self {
            client: S3Client::new(host, bucket, credentials),
            prefix,
        }
    }

    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{key}", self.prefix.trim_end_matches('/'))
        }
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<xml::ListBucketResult, StorageError> {
        // Params must stay in ASCII-sorted order: the canonical query string
        // in a SigV4 signature is this literal string, not a re-sorted copy.
        let mut query = String::new();
        if let Some(token) = continuation_token {
            query.push_str(&format!("continuation-token={}&", urlencoding::encode(token)));
        }
        query.push_str(&format!(
            "delimiter=%2F&fetch-owner=true&list-type=2&prefix={}",
            urlencoding::encode(prefix)
        ));
        let path = format!("/{}/", self.client.bucket);
        let resp = self
            .client
            .send(Method::GET, &path, &query, &[], None)
            .await?;
        let body = String::from_utf8_lossy(&resp.body);
        xml::parse_list(&body).map_err(|e| StorageError::Remote {
            status: resp.status.as_u16(),
            code: "MalformedResponse".to_string(),
            message: format!("could not parse ListBucketResult: {e}"),
        })
    }

    /// Lists the immediate contents of `prefix`: files, and both forms of
    /// pseudo-directory (`CommonPrefixes`, and zero-size keys ending in `/`).
    async fn list_one_level(&self, prefix: &str) -> Result<(Vec<String>, Vec<String>), StorageError> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        let mut token = None;
        loop {
            let page = self.list_page(prefix, token.as_deref()).await?;
            for obj in page.contents {
                if obj.key.ends_with('/') && obj.size == 0 {
                    dirs.push(obj.key);
                } else {
                    files.push(obj.key);
                }
            }
            for common in page.common_prefixes {
                dirs.push(common.prefix);
            }
            if page.is_truncated {
                token = page.next_continuation_token;
                if token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }
        Ok((files, dirs))
    }
}

#[async_trait]
impl RemoteStorage for S3Bucket {
    async fn create(&self, key: &str) -> Result<Box<dyn Sink>, StorageError> {
        let upload = MultipartUpload::create(self.client.clone(), self.full_key(key)).await?;
        Ok(Box::new(upload))
    }

    async fn open(&self, key: &str) -> Result<Box<dyn Source>, StorageError> {
        let download = ChunkedDownload::open(self.client.clone(), self.full_key(key)).await?;
        Ok(Box::new(download))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Box<dyn Source>)>, StorageError> {
        let full_prefix = self.full_key(prefix);
        let mut stack = vec![full_prefix];
        let mut keys = Vec::new();

        while let Some(dir) = stack.pop() {
            let (files, dirs) = self.list_one_level(&dir).await?;
            keys.extend(files);
            stack.extend(dirs);
        }

        keys.sort_by(|a, b| natural_key_order(a, b));

        let mut out = Vec::with_capacity(keys.len());
        for full_key in keys {
            let relative = if self.prefix.is_empty() {
                full_key.clone()
            } else {
                let strip = format!("{}/", self.prefix.trim_end_matches('/'));
                full_key.strip_prefix(&strip).unwrap_or(&full_key).to_string()
            };
            let source = ChunkedDownload::open(self.client.clone(), full_key).await?;
            out.push((relative, Box::new(source) as Box<dyn Source>));
        }
        Ok(out)
    }
}
