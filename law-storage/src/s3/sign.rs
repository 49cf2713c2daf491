use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const ISO_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const SHORT_FORMAT: &str = "%Y%m%d";

const IGNORED_HEADERS: [&str; 4] = ["authorization", "content-type", "content-length", "user-agent"];

/// Credentials consumed by the signer; populated from `AWS_ACCESS_KEY_ID`,
/// `AWS_SECRET_ACCESS_KEY`, `AWS_SECURITY_TOKEN`, and `AWS_REGION`.
#[derive(Debug, Clone, Default)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub security_token: Option<String>,
    /// Fallback region used when it cannot be inferred from the host.
    pub region: String,
}

/// An AWS SigV4 request signer, immutable after construction and shared
/// freely across concurrent upload/download workers.
#[derive(Debug, Clone)]
pub struct V4Signer {
    credentials: AwsCredentials,
    service: &'static str,
}

/// Everything about a request that the signer needs, independent of any
/// particular HTTP client's request type.
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    pub headers: &'a HeaderMap,
    /// `None` for streaming bodies: the signer falls back to the SHA-256 of
    /// the empty string, per the upload path's "non-replayable body" case.
    pub body: Option<&'a [u8]>,
}

/// The computed `Authorization`/`X-Amz-*` headers a caller must add to the
/// request before sending it.
pub struct Signature {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: String,
    pub security_token: Option<String>,
}

impl V4Signer {
    pub fn new(credentials: AwsCredentials) -> Self {
        Self {
            credentials,
            service: "s3",
        }
    }

    /// Infers the signing region from the request host, falling back to the
    /// signer's configured default region (supports S3-compatible endpoints
    /// and S3 Accelerate, whose hostnames don't encode a region at all).
    pub fn region_for_host(&self, host: &str) -> String {
        match host {
            "s3.amazonaws.com" | "s3-external-1.amazonaws.com" => "us-east-1".to_string(),
            other => region_from_host(other).unwrap_or_else(|| self.credentials.region.clone()),
        }
    }

    pub fn sign(&self, req: &SignableRequest<'_>, now: chrono::DateTime<chrono::Utc>) -> Signature {
        let region = self.region_for_host(req.host);
        let amz_date = now.format(ISO_FORMAT).to_string();
        let short_date = now.format(SHORT_FORMAT).to_string();

        let digest = match req.body {
            Some(body) => hex::encode(sha256(body)),
            None => hex::encode(sha256(b"")),
        };

        let credential_scope = format!("{short_date}/{region}/{}/aws4_request", self.service);

        let mut header_names: Vec<String> = vec!["host".to_string()];
        for name in req.headers.keys() {
            let lower = name.as_str().to_ascii_lowercase();
            if IGNORED_HEADERS.contains(&lower.as_str()) {
                continue;
            }
            header_names.push(lower);
        }
        header_names.sort();
        header_names.dedup();
        let signed_headers = header_names.join(";");

        let canonical_headers: String = header_names
            .iter()
            .map(|name| {
                if name == "host" {
                    format!("host:{}\n", req.host)
                } else {
                    let value = req
                        .headers
                        .get(HeaderName::from_bytes(name.as_bytes()).unwrap())
                        .and_then(|v: &HeaderValue| v.to_str().ok())
                        .unwrap_or("");
                    format!("{name}:{value}\n")
                }
            })
            .collect();

        let canonical_uri = if req.path.is_empty() {
            "/".to_string()
        } else {
            uri_encode(req.path)
        };

        let canonical_request = format!(
            "{method}\n{uri}\n{query}\n{headers}\n{signed}\n{digest}",
            method = req.method,
            uri = canonical_uri,
            query = req.query,
            headers = canonical_headers,
            signed = signed_headers,
            digest = digest,
        );

        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
            hex::encode(sha256(canonical_request.as_bytes()))
        );

        let date_key = hmac_sha256(format!("AWS4{}", self.credentials.secret_access_key).as_bytes(), short_date.as_bytes());
        let region_key = hmac_sha256(&date_key, region.as_bytes());
        let service_key = hmac_sha256(&region_key, self.service.as_bytes());
        let signing_key = hmac_sha256(&service_key, b"aws4_request");
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "{ALGORITHM} Credential={}/{credential_scope},SignedHeaders={signed_headers},Signature={signature}",
            self.credentials.access_key_id,
        );

        Signature {
            authorization,
            amz_date,
            content_sha256: digest,
            security_token: self.credentials.security_token.clone(),
        }
    }
}

/// Finds the first substring matching `\w{2}-(\w+|gov-\w+)-\d+`, the region
/// pattern embedded in regional S3 hostnames (e.g. `us-west-2`,
/// `cn-north-1`, `us-gov-west-1`).
fn region_from_host(host: &str) -> Option<String> {
    let chars: Vec<char> = host.chars().collect();
    let n = chars.len();
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';

    for start in 0..n {
        if start + 2 > n || !is_word(chars[start]) || !is_word(chars[start + 1]) {
            continue;
        }
        if start + 2 >= n || chars[start + 2] != '-' {
            continue;
        }
        let zone_start = start + 3;
        if let Some(end) = try_zone_and_digits(&chars, zone_start) {
            return Some(chars[start..end].iter().collect());
        }
    }
    None
}

/// From `zone_start`, matches either `\w+-\d+` or `gov-\w+-\d+` and returns
/// the end index of the match, or `None`.
fn try_zone_and_digits(chars: &[char], zone_start: usize) -> Option<usize> {
    let n = chars.len();
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';

    // `gov-\w+-\d+`
    if chars[zone_start..].starts_with(&['g', 'o', 'v', '-']) {
        let rest_start = zone_start + 4;
        let mut pos = rest_start;
        while pos < n && is_word(chars[pos]) {
            pos += 1;
        }
        if pos > rest_start && pos < n && chars[pos] == '-' {
            let digits_start = pos + 1;
            let mut dpos = digits_start;
            while dpos < n && chars[dpos].is_ascii_digit() {
                dpos += 1;
            }
            if dpos > digits_start {
                return Some(dpos);
            }
        }
    }

    // `\w+-\d+`
    let mut pos = zone_start;
    while pos < n && is_word(chars[pos]) {
        pos += 1;
    }
    if pos > zone_start && pos < n && chars[pos] == '-' {
        let digits_start = pos + 1;
        let mut dpos = digits_start;
        while dpos < n && chars[dpos].is_ascii_digit() {
            dpos += 1;
        }
        if dpos > digits_start {
            return Some(dpos);
        }
    }
    None
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn should_escape(c: u8) -> bool {
    if c.is_ascii_alphanumeric() {
        return false;
    }
    !matches!(c, b'-' | b'_' | b'.' | b'~' | b'/')
}

/// Percent-encodes everything outside the unreserved set plus `/`, matching
/// the source signer's URI-encoding rule for the canonical request path.
fn uri_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if should_escape(b) {
            out.push('%');
            out.push_str(&format!("{b:02X}"));
        } else {
            out.push(b as char);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_region_regions_resolve_to_us_east_1() {
        let signer = V4Signer::new(AwsCredentials {
            region: "us-west-2".to_string(),
            ..Default::default()
        });
        assert_eq!(signer.region_for_host("s3.amazonaws.com"), "us-east-1");
        assert_eq!(
            signer.region_for_host("s3-external-1.amazonaws.com"),
            "us-east-1"
        );
    }

    #[test]
    fn region_is_inferred_from_regional_host() {
        let signer = V4Signer::new(AwsCredentials::default());
        assert_eq!(
            signer.region_for_host("bucket.s3-us-west-2.amazonaws.com"),
            "us-west-2"
        );
        assert_eq!(
            signer.region_for_host("bucket.s3.eu-central-1.amazonaws.com"),
            "eu-central-1"
        );
    }

    #[test]
    fn unmatched_host_falls_back_to_configured_region() {
        let signer = V4Signer::new(AwsCredentials {
            region: "us-east-2".to_string(),
            ..Default::default()
        });
        assert_eq!(signer.region_for_host("minio.example.internal"), "us-east-2");
    }

    #[test]
    fn uri_encode_preserves_unreserved_and_slash() {
        assert_eq!(uri_encode("/law_001/seg one.gz"), "/law_001/seg%20one.gz");
        assert_eq!(uri_encode("/a-b_c.d~e/f"), "/a-b_c.d~e/f");
    }

    #[test]
    fn timestamp_formats_match_amz_date_shapes() {
        use chrono::TimeZone;
        let ts = chrono::Utc.timestamp_opt(1704164645, 0).unwrap();
        assert_eq!(ts.format(ISO_FORMAT).to_string(), "20240102T030405Z");
        assert_eq!(ts.format(SHORT_FORMAT).to_string(), "20240102");
    }

    #[test]
    fn region_matches_gov_cloud_zone() {
        assert_eq!(
            region_from_host("bucket.s3-fips.us-gov-west-1.amazonaws.com"),
            Some("us-gov-west-1".to_string())
        );
    }
}
