//! Typed views of the XML bodies s3vfs sends and receives.

/// `<Error>` body returned by S3 on failed requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorBody {
    /// Machine-readable error code, e.g. `NoSuchKey`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Region the bucket lives in, sent with `AuthorizationHeaderMalformed`.
    pub region: Option<String>,
    /// Request ID for support tickets.
    pub request_id: Option<String>,
}

/// Response to `POST ?uploads`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitiateMultipartUploadResult {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Upload ID used by every following part request.
    pub upload_id: String,
}

/// One `<Contents>` entry of a ListObjectsV2 page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListedObject {
    /// Object key as sent by the server (still URL-encoded with `encoding-type=url`).
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

/// One page of a ListObjectsV2 response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListBucketResult {
    /// Objects on this page.
    pub contents: Vec<ListedObject>,
    /// Prefixes rolled up by the delimiter.
    pub common_prefixes: Vec<String>,
    /// Whether more pages follow.
    pub is_truncated: bool,
    /// Token for the next page.
    pub next_continuation_token: Option<String>,
}

/// Response to a successful `POST ?uploadId=`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompleteMultipartUploadResult {
    /// Object URL.
    pub location: Option<String>,
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// ETag of the assembled object.
    pub etag: Option<String>,
}

/// A part reference inside a `CompleteMultipartUpload` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: u32,
    /// ETag returned when the part was uploaded, quotes included.
    pub etag: String,
}

/// Body of the request that completes a multipart upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompleteMultipartUpload {
    /// Parts in ascending part-number order.
    pub parts: Vec<CompletedPart>,
}
