use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};

use super::sign::{AwsCredentials, SignableRequest, V4Signer};
use super::xml;
use crate::StorageError;

/// Thin wrapper around `reqwest` that signs every outgoing request with
/// SigV4 and maps non-2xx responses to [`StorageError`]. Shared (cloned,
/// cheaply — `reqwest::Client` is an `Arc` internally) across the upload and
/// download worker pools.
#[derive(Clone)]
pub struct S3Client {
    http: reqwest::Client,
    signer: V4Signer,
    pub host: String,
    pub bucket: String,
}

pub struct PreparedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl S3Client {
    pub fn new(host: String, bucket: String, credentials: AwsCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            signer: V4Signer::new(credentials),
            host,
            bucket,
        }
    }

    /// Builds the path-style object path `/bucket/key`.
    pub fn object_path(&self, key: &str) -> String {
        format!("/{}/{}", self.bucket, key)
    }

    /// Sends a signed request. `body` is always an owned, replayable buffer
    /// (the upload path never streams a non-seekable body through here), so
    /// the digest is always computed over the actual bytes rather than the
    /// empty-body placeholder.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: &str,
        extra_headers: &[(&str, String)],
        body: Option<Bytes>,
    ) -> Result<PreparedResponse, StorageError> {
        let mut headers = HeaderMap::new();
        for (name, value) in extra_headers {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes()).expect("static header name is valid"),
                HeaderValue::from_str(value).expect("header value is valid ascii"),
            );
        }

        let signable = SignableRequest {
            method: method.as_str(),
            host: &self.host,
            path,
            query,
            headers: &headers,
            body: body.as_deref(),
        };
        let now = chrono::Utc::now();
        let signature = self.signer.sign(&signable, now);

        let url = if query.is_empty() {
            format!("https://{}{}", self.host, path)
        } else {
            format!("https://{}{}?{}", self.host, path, query)
        };

        let mut req = self.http.request(method, url);
        for (name, value) in extra_headers {
            req = req.header(*name, value.clone());
        }
        req = req
            .header("x-amz-date", signature.amz_date)
            .header("x-amz-content-sha256", signature.content_sha256)
            .header("authorization", signature.authorization);
        if let Some(token) = signature.security_token {
            req = req.header("x-amz-security-token", token);
        }
        if let Some(body) = body {
            req = req.body(body);
        }

        let resp = req.send().await.map_err(StorageError::from)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(StorageError::from)?;

        if status.is_success() {
            return Ok(PreparedResponse {
                status,
                headers,
                body,
            });
        }

        let body_str = String::from_utf8_lossy(&body);
        let parsed = xml::parse_error(&body_str);
        Err(StorageError::Remote {
            status: status.as_u16(),
            code: parsed
                .as_ref()
                .map(|e| e.code.clone())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string()),
            message: parsed
                .map(|e| e.message)
                .unwrap_or_else(|| body_str.into_owned()),
        })
    }
}
