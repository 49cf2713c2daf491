//! Serde structs for the handful of S3 REST XML bodies this client speaks:
//! multipart initiate/complete, V2 bucket listing, and the generic error
//! envelope.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename = "InitiateMultipartUploadResult")]
pub struct InitiateMultipartUploadResult {
    #[serde(rename = "UploadId")]
    pub upload_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
pub struct CompleteMultipartUpload {
    #[serde(rename = "Part")]
    pub parts: Vec<CompletedPart>,
}

#[derive(Debug, Serialize)]
pub struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "CompleteMultipartUploadResult")]
pub struct CompleteMultipartUploadResult {
    #[serde(rename = "ETag")]
    pub etag: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Error")]
pub struct ErrorResponse {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename = "ListBucketResult")]
pub struct ListBucketResult {
    #[serde(rename = "IsTruncated", default)]
    pub is_truncated: bool,
    #[serde(rename = "NextContinuationToken")]
    pub next_continuation_token: Option<String>,
    #[serde(rename = "Contents", default)]
    pub contents: Vec<ObjectSummary>,
    #[serde(rename = "CommonPrefixes", default)]
    pub common_prefixes: Vec<CommonPrefix>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectSummary {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Size")]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
pub struct CommonPrefix {
    #[serde(rename = "Prefix")]
    pub prefix: String,
}

pub fn parse_initiate(body: &str) -> Result<InitiateMultipartUploadResult, quick_xml::DeError> {
    quick_xml::de::from_str(body)
}

pub fn parse_complete(body: &str) -> Result<CompleteMultipartUploadResult, quick_xml::DeError> {
    quick_xml::de::from_str(body)
}

pub fn parse_list(body: &str) -> Result<ListBucketResult, quick_xml::DeError> {
    quick_xml::de::from_str(body)
}

pub fn parse_error(body: &str) -> Option<ErrorResponse> {
    quick_xml::de::from_str(body).ok()
}

pub fn serialize_complete(req: &CompleteMultipartUpload) -> String {
    let mut body = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    body.push_str("<CompleteMultipartUpload>");
    for part in &req.parts {
        body.push_str(&format!(
            "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
            part.part_number, part.etag
        ));
    }
    body.push_str("</CompleteMultipartUpload>");
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_initiate_response() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <InitiateMultipartUploadResult>
                <Bucket>b</Bucket>
                <Key>k</Key>
                <UploadId>abc-123</UploadId>
            </InitiateMultipartUploadResult>"#;
        let parsed = parse_initiate(xml).unwrap();
        assert_eq!(parsed.upload_id, "abc-123");
    }

    #[test]
    fn parses_list_with_continuation() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult>
                <IsTruncated>true</IsTruncated>
                <NextContinuationToken>tok</NextContinuationToken>
                <Contents><Key>a/b</Key><Size>10</Size></Contents>
                <CommonPrefixes><Prefix>a/c/</Prefix></CommonPrefixes>
            </ListBucketResult>"#;
        let parsed = parse_list(xml).unwrap();
        assert!(parsed.is_truncated);
        assert_eq!(parsed.next_continuation_token.as_deref(), Some("tok"));
        assert_eq!(parsed.contents.len(), 1);
        assert_eq!(parsed.common_prefixes[0].prefix, "a/c/");
    }

    #[test]
    fn serializes_complete_request_in_order() {
        let req = CompleteMultipartUpload {
            parts: vec![
                CompletedPart {
                    part_number: 1,
                    etag: "\"e1\"".to_string(),
                },
                CompletedPart {
                    part_number: 2,
                    etag: "\"e2\"".to_string(),
                },
            ],
        };
        let xml = serialize_complete(&req);
        assert!(xml.find("PartNumber>1<").unwrap() < xml.find("PartNumber>2<").unwrap());
    }
}
