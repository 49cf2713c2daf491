use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::Method;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::client::S3Client;
use super::retry::retry_idempotent;
use super::xml::{self, CompleteMultipartUpload, CompletedPart};
use crate::sink::Sink;
use crate::StorageError;

pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;
/// Growth factor applied to the part-size threshold after every flush, so
/// part sizes climb from `MIN_PART_SIZE` towards `MAX_PART_SIZE` over the
/// life of a large upload instead of either over-allocating early parts or
/// running out of the 10,000-part budget on a multi-terabyte object.
const PART_GROWTH: f64 = 1.001;

struct PartResult {
    part_number: u32,
    etag: String,
    md5: [u8; 16],
}

/// A `create`d multipart upload. Buffers writes locally and flushes parts to
/// a bounded worker pool once the (growing) size threshold is reached.
pub struct MultipartUpload {
    client: S3Client,
    key: String,
    upload_id: String,
    buffer: BytesMut,
    next_part_size: u64,
    part_number: u32,
    concurrency: Arc<Semaphore>,
    handles: Vec<JoinHandle<Result<PartResult, StorageError>>>,
    results: Arc<Mutex<Vec<PartResult>>>,
    first_error: Arc<Mutex<Option<String>>>,
}

impl MultipartUpload {
    pub async fn create(client: S3Client, key: String) -> Result<Self, StorageError> {
        let path = client.object_path(&key);
        let resp = client
            .send(Method::POST, &path, "uploads=", &[], None)
            .await?;
        let body = String::from_utf8_lossy(&resp.body);
        let parsed = xml::parse_initiate(&body).map_err(|e| StorageError::Remote {
            status: resp.status.as_u16(),
            code: "MalformedResponse".to_string(),
            message: format!("could not parse InitiateMultipartUploadResult: {e}"),
        })?;

        Ok(Self {
            client,
            key,
            upload_id: parsed.upload_id,
            buffer: BytesMut::new(),
            next_part_size: MIN_PART_SIZE,
            part_number: 0,
            concurrency: Arc::new(Semaphore::new(num_cpus::get().max(1))),
            handles: Vec::new(),
            results: Arc::new(Mutex::new(Vec::new())),
            first_error: Arc::new(Mutex::new(None)),
        })
    }

    async fn check_error(&self) -> Result<(), StorageError> {
        if let Some(msg) = self.first_error.lock().await.clone() {
            return Err(StorageError::Remote {
                status: 0,
                code: "PriorPartFailed".to_string(),
                message: msg,
            });
        }
        Ok(())
    }

    fn spawn_flush(&mut self, chunk: Bytes) {
        self.part_number += 1;
        let part_number = self.part_number;
        let client = self.client.clone();
        let key = self.key.clone();
        let upload_id = self.upload_id.clone();
        let semaphore = self.concurrency.clone();
        let first_error = self.first_error.clone();

        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            let result = upload_part(&client, &key, &upload_id, part_number, chunk).await;
            if let Err(e) = &result {
                let mut guard = first_error.lock().await;
                if guard.is_none() {
                    *guard = Some(e.to_string());
                }
            }
            result
        });
        self.handles.push(handle);
    }

    async fn flush_if_ready(&mut self) {
        while self.buffer.len() as u64 >= self.next_part_size {
            let take = self.next_part_size as usize;
            let chunk = self.buffer.split_to(take).freeze();
            self.spawn_flush(chunk);
            self.next_part_size =
                ((self.next_part_size as f64 * PART_GROWTH) as u64).min(MAX_PART_SIZE);
        }
    }

    async fn drain_workers(&mut self) -> Result<(), StorageError> {
        let handles = std::mem::take(&mut self.handles);
        let mut first_err = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(part)) => self.results.lock().await.push(part),
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(join_err) => {
                    if first_err.is_none() {
                        first_err = Some(StorageError::Io(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            join_err,
                        )));
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn abort(&self) {
        let path = self.client.object_path(&self.key);
        let query = format!("uploadId={}", urlencoding::encode(&self.upload_id));
        if let Err(e) = self
            .client
            .send(Method::DELETE, &path, &query, &[], None)
            .await
        {
            warn!(key = %self.key, upload_id = %self.upload_id, error = %e, "failed to abort multipart upload");
        }
    }
}

async fn upload_part(
    client: &S3Client,
    key: &str,
    upload_id: &str,
    part_number: u32,
    chunk: Bytes,
) -> Result<PartResult, StorageError> {
    let digest: [u8; 16] = *md5::compute(&chunk);
    let content_md5 = base64::encode(digest);

    let path = client.object_path(key);
    let query = format!(
        "partNumber={part_number}&uploadId={}",
        urlencoding::encode(upload_id)
    );
    let headers = [("content-md5", content_md5)];

    let resp = retry_idempotent(&format!("upload part {part_number}"), || {
        let chunk = chunk.clone();
        async {
            client
                .send(Method::PUT, &path, &query, &headers, Some(chunk))
                .await
        }
    })
    .await?;

    let etag = resp
        .headers
        .get("etag")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim_matches('"')
        .to_string();

    debug!(part_number, bytes = chunk.len(), "uploaded part");

    Ok(PartResult {
        part_number,
        etag,
        md5: digest,
    })
}

#[async_trait]
impl Sink for MultipartUpload {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
        self.check_error().await?;
        self.buffer.extend_from_slice(buf);
        self.flush_if_ready().await;
        Ok(buf.len())
    }

    async fn close(mut self: Box<Self>) -> Result<(), StorageError> {
        if self.check_error().await.is_ok() {
            if !self.buffer.is_empty() || self.part_number == 0 {
                let chunk = std::mem::take(&mut self.buffer).freeze();
                self.spawn_flush(chunk);
            }
        }

        let drain_result = self.drain_workers().await;
        let prior_error = self.check_error().await;

        if drain_result.is_err() || prior_error.is_err() {
            self.abort().await;
            return drain_result.and(prior_error);
        }

        let mut results = self.results.lock().await;
        results.sort_by_key(|p| p.part_number);

        let concat_md5: Vec<u8> = results.iter().flat_map(|p| p.md5).collect();
        let expected_digest = hex::encode(*md5::compute(&concat_md5));

        let complete = CompleteMultipartUpload {
            parts: results
                .iter()
                .map(|p| CompletedPart {
                    part_number: p.part_number,
                    etag: format!("\"{}\"", p.etag),
                })
                .collect(),
        };
        drop(results);
        let body = xml::serialize_complete(&complete);

        let path = self.client.object_path(&self.key);
        let query = format!("uploadId={}", urlencoding::encode(&self.upload_id));
        let resp = self
            .client
            .send(
                Method::POST,
                &path,
                &query,
                &[("content-type", "application/xml".to_string())],
                Some(Bytes::from(body)),
            )
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                self.abort().await;
                return Err(e);
            }
        };

        let body_str = String::from_utf8_lossy(&resp.body);
        let parsed = xml::parse_complete(&body_str).map_err(|e| StorageError::Remote {
            status: resp.status.as_u16(),
            code: "MalformedResponse".to_string(),
            message: format!("could not parse CompleteMultipartUploadResult: {e}"),
        })?;

        let actual = parsed
            .etag
            .trim_matches('"')
            .split('-')
            .next()
            .unwrap_or("")
            .to_string();

        if actual != expected_digest {
            self.abort().await;
            return Err(StorageError::ChecksumMismatch {
                expected: expected_digest,
                actual,
            });
        }

        Ok(())
    }
}
