use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::file_backend::FileBackend;
use crate::s3::{AwsCredentials, S3Bucket};
use crate::sink::{Sink, Source};
use crate::StorageError;

/// Unified create/open/list interface over a storage source name (SSN).
///
/// Selected by URL scheme: `file://` for the local filesystem, `s3://` for
/// S3-compatible object storage. Implementations own everything needed to
/// authenticate and address objects; callers only ever see keys.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    async fn create(&self, key: &str) -> Result<Box<dyn Sink>, StorageError>;

    async fn open(&self, key: &str) -> Result<Box<dyn Source>, StorageError>;

    /// Returns every object under `prefix`, already opened for reading, in
    /// natural (numeric-aware) key order.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Box<dyn Source>)>, StorageError>;
}

/// Constructs the backend addressed by `ssn`.
///
/// `file://<root>` is resolved relative to the process's working directory
/// when `<root>` is not absolute. `s3://<host>/<bucket>/<prefix?>` dials the
/// given host as an S3-compatible endpoint; `aws` supplies the credentials
/// and default region used to sign requests.
pub fn from_ssn(ssn: &str, aws: AwsCredentials) -> Result<Arc<dyn RemoteStorage>, StorageError> {
    let url = Url::parse(ssn)
        .map_err(|e| StorageError::ConfigMissing(format!("invalid storage url {ssn:?}: {e}")))?;

    match url.scheme() {
        "file" => {
            let root = format!("{}{}", url.host_str().unwrap_or(""), url.path());
            Ok(Arc::new(FileBackend::new(root)))
        }
        "s3" => {
            let host = url
                .host_str()
                .ok_or_else(|| StorageError::ConfigMissing("s3 ssn missing host".to_string()))?
                .to_string();
            let mut segments = url
                .path_segments()
                .map(|s| s.filter(|s| !s.is_empty()).collect::<Vec<_>>())
                .unwrap_or_default();
            if segments.is_empty() {
                return Err(StorageError::ConfigMissing(
                    "s3 ssn missing bucket".to_string(),
                ));
            }
            let bucket = segments.remove(0).to_string();
            let prefix = segments.join("/");
            Ok(Arc::new(S3Bucket::new(host, bucket, prefix, aws)))
        }
        other => Err(StorageError::UnsupportedScheme(other.to_string())),
    }
}

/// Orders keys the way a human expects partition numbering to sort: by
/// comparing embedded runs of digits numerically instead of lexicographically,
/// so `part_2.tar.gz` sorts before `part_10.tar.gz`. Falls back to a plain
/// byte comparison once one side runs out of digits/text to compare.
pub fn natural_key_order(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek(), bi.peek()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ac), Some(bc)) if ac.is_ascii_digit() && bc.is_ascii_digit() => {
                let mut anum = String::new();
                let mut bnum = String::new();
                while matches!(ai.peek(), Some(c) if c.is_ascii_digit()) {
                    anum.push(ai.next().unwrap());
                }
                while matches!(bi.peek(), Some(c) if c.is_ascii_digit()) {
                    bnum.push(bi.next().unwrap());
                }
                let an: u64 = anum.parse().unwrap_or(0);
                let bn: u64 = bnum.parse().unwrap_or(0);
                match an.cmp(&bn) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            (Some(ac), Some(bc)) => match ac.cmp(bc) {
                Ordering::Equal => {
                    ai.next();
                    bi.next();
                    continue;
                }
                other => return other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_order_handles_partition_numbers() {
        let mut keys = vec![
            "part_10.tar.gz",
            "part_2.tar.gz",
            "part_1.tar.gz",
            "part_0.tar.gz",
        ];
        keys.sort_by(|a, b| natural_key_order(a, b));
        assert_eq!(
            keys,
            vec!["part_0.tar.gz", "part_1.tar.gz", "part_2.tar.gz", "part_10.tar.gz"]
        );
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let aws = AwsCredentials::default();
        let err = from_ssn("scheme://x/y", aws).unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedScheme(s) if s == "scheme"));
    }
}
