//! End-to-end tests for s3vfs.
//!
//! The tests drive [`S3FileSystem`] against [`FakeS3`], an in-memory S3
//! service that checks SigV4 signatures the way the real service does, so
//! they need neither network access nor a running server:
//! ```text
//! cargo test -p s3vfs-integration
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, LazyLock, Once};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method};
use parking_lot::Mutex;
use regex::Regex;
use s3vfs_auth::{hash_payload, url_decode, url_encode};
use s3vfs_core::{
    HttpRequest, HttpResponse, HttpTransport, S3FileSystem, S3Settings, TransportError,
};
use s3vfs_secrets::{SecretManager, StaticEnvironment};

use crate::signature::{SignatureError, check_signature};

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

const HOST_SUFFIX: &str = ".s3.amazonaws.com";
const LAST_MODIFIED: &str = "Tue, 14 Oct 2025 10:00:00 GMT";

static INIT: Once = Once::new();

static COMPLETED_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<Part>\s*<ETag>([^<]*)</ETag>\s*<PartNumber>(\d+)</PartNumber>\s*</Part>")
        .expect("valid regex")
});

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A multipart upload in progress.
#[derive(Debug)]
struct Upload {
    host: String,
    key: String,
    parts: BTreeMap<u32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct FakeState {
    credentials: HashMap<String, String>,
    public_hosts: HashSet<String>,
    objects: BTreeMap<(String, String), Bytes>,
    uploads: HashMap<String, Upload>,
    page_size: Option<usize>,
    part_delays: HashMap<u32, Duration>,
    part_arrivals: Vec<u32>,
    completions: Vec<Vec<u32>>,
    aborted: usize,
    rejected: usize,
}

/// The request target, split the way the service sees it.
#[derive(Debug)]
struct Target {
    host: String,
    path: String,
    key: String,
    raw_query: String,
    query: HashMap<String, String>,
}

impl Target {
    fn parse(url: &str) -> Self {
        let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
        let (host, path_and_query) = rest.split_once('/').unwrap_or((rest, ""));
        let (raw_path, raw_query) = path_and_query
            .split_once('?')
            .unwrap_or((path_and_query, ""));
        let path = url_decode(&format!("/{raw_path}"));
        let query = raw_query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                (name.to_owned(), url_decode(value))
            })
            .collect();
        Self {
            host: host.to_owned(),
            key: path[1..].to_owned(),
            path,
            raw_query: raw_query.to_owned(),
            query,
        }
    }

    fn bucket(&self) -> &str {
        self.host.strip_suffix(HOST_SUFFIX).unwrap_or(&self.host)
    }
}

/// In-memory S3 service.
///
/// Buckets are addressed by virtual host (`{bucket}.s3.amazonaws.com`).
/// Signed requests must verify against a key registered with
/// [`allow`](Self::allow); unsigned reads are served only from buckets
/// marked with [`make_public`](Self::make_public).
#[derive(Debug, Default)]
pub struct FakeS3 {
    state: Mutex<FakeState>,
}

impl FakeS3 {
    /// An empty service.
    #[must_use]
    pub fn new() -> Arc<Self> {
        init_tracing();
        Arc::new(Self::default())
    }

    /// Accept signatures made with `key_id`/`secret`.
    pub fn allow(&self, key_id: &str, secret: &str) {
        self.state
            .lock()
            .credentials
            .insert(key_id.to_owned(), secret.to_owned());
    }

    /// Serve unsigned reads from `bucket`.
    pub fn make_public(&self, bucket: &str) {
        self.state
            .lock()
            .public_hosts
            .insert(format!("{bucket}{HOST_SUFFIX}"));
    }

    /// Return at most `size` entries per listing page.
    pub fn set_page_size(&self, size: usize) {
        self.state.lock().page_size = Some(size);
    }

    /// Hold back the response to every upload of part `part_number`.
    pub fn delay_part(&self, part_number: u32, delay: Duration) {
        self.state.lock().part_delays.insert(part_number, delay);
    }

    /// Store an object directly.
    pub fn insert_object(&self, url: &str, data: impl Into<Bytes>) {
        self.state.lock().objects.insert(address(url), data.into());
    }

    /// The stored object at `url`.
    #[must_use]
    pub fn object(&self, url: &str) -> Option<Bytes> {
        self.state.lock().objects.get(&address(url)).cloned()
    }

    /// Part numbers of every completed multipart upload, as sent.
    #[must_use]
    pub fn completions(&self) -> Vec<Vec<u32>> {
        self.state.lock().completions.clone()
    }

    /// Part numbers in the order their uploads finished.
    #[must_use]
    pub fn part_arrivals(&self) -> Vec<u32> {
        self.state.lock().part_arrivals.clone()
    }

    /// Number of aborted multipart uploads.
    #[must_use]
    pub fn aborted(&self) -> usize {
        self.state.lock().aborted
    }

    /// Number of multipart uploads neither completed nor aborted.
    #[must_use]
    pub fn open_uploads(&self) -> usize {
        self.state.lock().uploads.len()
    }

    /// Number of requests refused for bad or missing credentials.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.state.lock().rejected
    }

    fn part_delay(&self, request: &HttpRequest) -> Option<Duration> {
        if request.method != Method::PUT {
            return None;
        }
        let target = Target::parse(&request.url);
        let part_number: u32 = target.query.get("partNumber")?.parse().ok()?;
        self.state.lock().part_delays.get(&part_number).copied()
    }

    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let target = Target::parse(&request.url);
        let mut state = self.state.lock();
        if let Err(denied) = state.authorize(request, &target) {
            state.rejected += 1;
            return denied;
        }

        let upload_id = target.query.get("uploadId").cloned();
        match (&request.method, upload_id) {
            (&Method::POST, None) if target.query.contains_key("uploads") => {
                state.initiate(&target)
            }
            (&Method::POST, Some(id)) => state.complete(&target, &id, &request.body),
            (&Method::PUT, Some(id)) => state.upload_part(&target, &id, &request.body),
            (&Method::DELETE, Some(id)) => state.abort(&id),
            (&Method::PUT, None) => {
                let etag = etag_of(&request.body);
                state
                    .objects
                    .insert((target.host, target.key), request.body.clone());
                response(200, &[("etag", &etag)], "")
            }
            (&Method::DELETE, None) => {
                state.objects.remove(&(target.host, target.key));
                response(204, &[], "")
            }
            (&Method::GET, None) if target.query.contains_key("list-type") => state.list(&target),
            (&Method::GET, None) => state.get_object(&target, &request.headers),
            (&Method::HEAD, None) => state.head_object(&target),
            _ => error_response(405, "MethodNotAllowed", "Unsupported request"),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeS3 {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if let Some(delay) = self.part_delay(&request) {
            tokio::time::sleep(delay).await;
        }
        Ok(self.handle(&request))
    }
}

impl FakeState {
    fn authorize(&self, request: &HttpRequest, target: &Target) -> Result<(), HttpResponse> {
        if !request.headers.contains_key(http::header::AUTHORIZATION) {
            let readable = matches!(request.method, Method::GET | Method::HEAD);
            if readable && self.public_hosts.contains(&target.host) {
                return Ok(());
            }
            return Err(error_response(403, "AccessDenied", "Access Denied"));
        }
        check_signature(
            request.method.as_str(),
            &target.path,
            &target.raw_query,
            &request.headers,
            |key_id| self.credentials.get(key_id).cloned(),
        )
        .map(|_| ())
        .map_err(|err| {
            let code = match &err {
                SignatureError::AccessKeyNotFound(_) => "InvalidAccessKeyId",
                _ => "SignatureDoesNotMatch",
            };
            error_response(403, code, &err.to_string())
        })
    }

    fn initiate(&mut self, target: &Target) -> HttpResponse {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.uploads.insert(
            id.clone(),
            Upload {
                host: target.host.clone(),
                key: target.key.clone(),
                parts: BTreeMap::new(),
            },
        );
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <InitiateMultipartUploadResult><Bucket>{}</Bucket><Key>{}</Key>\
             <UploadId>{id}</UploadId></InitiateMultipartUploadResult>",
            target.bucket(),
            target.key
        );
        response(200, &[], &body)
    }

    fn upload_part(&mut self, target: &Target, id: &str, body: &Bytes) -> HttpResponse {
        let Some(part_number) = target
            .query
            .get("partNumber")
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| (1..=10_000).contains(n))
        else {
            return error_response(400, "InvalidArgument", "Part number must be 1-10000");
        };
        let Some(upload) = self.uploads.get_mut(id) else {
            return error_response(404, "NoSuchUpload", "The upload does not exist");
        };
        if upload.host != target.host || upload.key != target.key {
            return error_response(404, "NoSuchUpload", "The upload does not exist");
        }
        let etag = etag_of(body);
        upload.parts.insert(part_number, (etag.clone(), body.clone()));
        self.part_arrivals.push(part_number);
        response(200, &[("etag", &etag)], "")
    }

    fn complete(&mut self, target: &Target, id: &str, body: &Bytes) -> HttpResponse {
        let Some(upload) = self.uploads.get(id) else {
            return error_response(404, "NoSuchUpload", "The upload does not exist");
        };
        let text = String::from_utf8_lossy(body);
        let mut numbers = Vec::new();
        let mut data = Vec::new();
        for captures in COMPLETED_PART.captures_iter(&text) {
            let etag = &captures[1];
            let Ok(number) = captures[2].parse::<u32>() else {
                return error_response(400, "MalformedXML", "Bad part number");
            };
            if numbers.last().is_some_and(|last| *last >= number) {
                return error_response(400, "InvalidPartOrder", "Parts must be ascending");
            }
            match upload.parts.get(&number) {
                Some((stored, part)) if stored == etag => data.extend_from_slice(part),
                _ => return error_response(400, "InvalidPart", "Unknown part or ETag"),
            }
            numbers.push(number);
        }
        if numbers.is_empty() {
            return error_response(400, "MalformedXML", "No parts listed");
        }

        let data = Bytes::from(data);
        let etag = format!("\"{}-{}\"", &hash_payload(&data)[..32], numbers.len());
        if let Some(upload) = self.uploads.remove(id) {
            self.objects.insert((upload.host, upload.key), data);
        }
        self.completions.push(numbers);
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <CompleteMultipartUploadResult><Bucket>{}</Bucket><Key>{}</Key>\
             <ETag>{etag}</ETag></CompleteMultipartUploadResult>",
            target.bucket(),
            target.key
        );
        response(200, &[], &body)
    }

    fn abort(&mut self, id: &str) -> HttpResponse {
        if self.uploads.remove(id).is_none() {
            return error_response(404, "NoSuchUpload", "The upload does not exist");
        }
        self.aborted += 1;
        response(204, &[], "")
    }

    fn get_object(&self, target: &Target, headers: &HeaderMap) -> HttpResponse {
        let Some(data) = self
            .objects
            .get(&(target.host.clone(), target.key.clone()))
        else {
            return error_response(404, "NoSuchKey", "The specified key does not exist.");
        };
        let range = headers
            .get(http::header::RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("bytes="))
            .and_then(|value| value.split_once('-'))
            .and_then(|(start, end)| Some((start.parse::<usize>().ok()?, end.parse::<usize>().ok()?)));
        match range {
            Some((start, end)) if start < data.len() => HttpResponse {
                status: 206,
                headers: HeaderMap::new(),
                body: data.slice(start..=end.min(data.len() - 1)),
            },
            Some(_) => error_response(416, "InvalidRange", "The requested range is not satisfiable"),
            None => HttpResponse {
                status: 200,
                headers: HeaderMap::new(),
                body: data.clone(),
            },
        }
    }

    fn head_object(&self, target: &Target) -> HttpResponse {
        match self
            .objects
            .get(&(target.host.clone(), target.key.clone()))
        {
            Some(data) => response(
                200,
                &[
                    ("content-length", &data.len().to_string()),
                    ("etag", &etag_of(data)),
                    ("last-modified", LAST_MODIFIED),
                ],
                "",
            ),
            None => response(404, &[], ""),
        }
    }

    fn list(&self, target: &Target) -> HttpResponse {
        let prefix = target.query.get("prefix").map_or("", String::as_str);
        let delimiter = target.query.get("delimiter").filter(|d| !d.is_empty());
        let encode = target.query.get("encoding-type").map(String::as_str) == Some("url");
        let start: usize = target
            .query
            .get("continuation-token")
            .and_then(|token| token.parse().ok())
            .unwrap_or(0);
        let page_size = self.page_size.unwrap_or(1000).max(1);

        let mut seen_prefixes = HashSet::new();
        let mut entries = Vec::new();
        for ((host, key), data) in &self.objects {
            if *host != target.host || !key.starts_with(prefix) {
                continue;
            }
            let common = delimiter.and_then(|delimiter| {
                key[prefix.len()..]
                    .find(delimiter.as_str())
                    .map(|at| key[..prefix.len() + at + delimiter.len()].to_owned())
            });
            match common {
                Some(common) => {
                    if seen_prefixes.insert(common.clone()) {
                        entries.push(ListItem::Prefix(common));
                    }
                }
                None => entries.push(ListItem::Object(key.clone(), data.len())),
            }
        }

        let end = (start + page_size).min(entries.len());
        let page = entries.get(start..end).unwrap_or_default();
        let truncated = end < entries.len();
        let text = |value: &str| {
            if encode {
                url_encode(value, false)
            } else {
                value.to_owned()
            }
        };

        let mut contents = String::new();
        let mut prefixes = String::new();
        for item in page {
            match item {
                ListItem::Object(key, size) => contents.push_str(&format!(
                    "<Contents><Key>{}</Key><Size>{size}</Size></Contents>",
                    text(key)
                )),
                ListItem::Prefix(common) => prefixes.push_str(&format!(
                    "<CommonPrefixes><Prefix>{}</Prefix></CommonPrefixes>",
                    text(common)
                )),
            }
        }
        let token = if truncated {
            format!("<NextContinuationToken>{end}</NextContinuationToken>")
        } else {
            String::new()
        };
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
             <Name>{}</Name><Prefix>{}</Prefix><KeyCount>{}</KeyCount>\
             <IsTruncated>{truncated}</IsTruncated>{token}{contents}{prefixes}</ListBucketResult>",
            target.bucket(),
            text(prefix),
            page.len()
        );
        response(200, &[], &body)
    }
}

#[derive(Debug)]
enum ListItem {
    Object(String, usize),
    Prefix(String),
}

fn address(url: &str) -> (String, String) {
    let rest = url.strip_prefix("s3://").unwrap_or(url);
    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
    (format!("{bucket}{HOST_SUFFIX}"), key.to_owned())
}

fn etag_of(data: &[u8]) -> String {
    format!("\"{}\"", &hash_payload(data)[..32])
}

fn response(status: u16, headers: &[(&'static str, &str)], body: &str) -> HttpResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        if let Ok(value) = HeaderValue::from_str(value) {
            map.insert(*name, value);
        }
    }
    HttpResponse {
        status,
        headers: map,
        body: Bytes::from(body.to_owned()),
    }
}

fn error_response(status: u16, code: &str, message: &str) -> HttpResponse {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Error><Code>{code}</Code><Message>{message}</Message></Error>"
    );
    response(status, &[], &body)
}

/// Access key accepted by [`credentials`].
pub const TEST_KEY_ID: &str = "AKIDTEST";
/// Secret of [`TEST_KEY_ID`].
pub const TEST_SECRET: &str = "test-secret";

/// Register the test key with `fake` and return an environment exporting it.
#[must_use]
pub fn credentials(fake: &FakeS3) -> Arc<StaticEnvironment> {
    fake.allow(TEST_KEY_ID, TEST_SECRET);
    Arc::new(
        StaticEnvironment::new()
            .with("AWS_ACCESS_KEY_ID", TEST_KEY_ID)
            .with("AWS_SECRET_ACCESS_KEY", TEST_SECRET),
    )
}

/// An [`S3FileSystem`] talking to `fake`, reading variables from `env`.
#[must_use]
pub fn filesystem(fake: &Arc<FakeS3>, env: Arc<StaticEnvironment>) -> S3FileSystem {
    filesystem_with_settings(fake, env, S3Settings::default())
}

/// [`filesystem`] with explicit settings.
#[must_use]
pub fn filesystem_with_settings(
    fake: &Arc<FakeS3>,
    env: Arc<StaticEnvironment>,
    settings: S3Settings,
) -> S3FileSystem {
    let secrets = Arc::new(SecretManager::with_environment(env));
    S3FileSystem::new(Arc::<FakeS3>::clone(fake), secrets, settings)
}

/// Settings giving 5 MiB parts.
#[must_use]
pub fn small_part_settings() -> S3Settings {
    S3Settings {
        max_file_size: 5 * MIB * 10_000,
        ..S3Settings::default()
    }
}

/// `len` bytes of a repeating pattern.
#[must_use]
pub fn patterned(len: u64) -> Vec<u8> {
    (0..len)
        .map(|i| u8::try_from(i % 251).unwrap_or_default())
        .collect()
}

mod signature;
mod test_listing;
mod test_multipart;
mod test_object;
mod test_refresh;
