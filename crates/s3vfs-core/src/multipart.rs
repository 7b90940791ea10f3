//! Multipart upload engine.
//!
//! An [`S3FileHandle`] buffers sequential writes into part-sized
//! [`WriteBuffer`]s. A full buffer is admitted into the shared
//! [`BufferPool`], then moved into a spawned task that uploads it and reports
//! the part's etag (or error) on a channel owned by the handle. The buffer
//! being filled holds no pool capacity, so handles left idle mid-part never
//! starve each other. The handle is the only consumer of that channel, so its etag map
//! and in-flight counter are updated without locks.
//!
//! ```text
//! open ──► initiate (POST ?uploads=)
//! write ─► fill buffer ──full──► spawn PUT ?partNumber=N&uploadId=…
//! finalize ─► flush tail, await in-flight, POST ?uploadId=… <CompleteMultipartUpload>
//! close (not finalized) ─► DELETE ?uploadId=…
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use s3vfs_auth::url_encode;
use s3vfs_xml::{
    CompleteMultipartUpload, CompletedPart, InitiateMultipartUploadResult,
    complete_multipart_upload_xml, from_xml, root_element_name,
};
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, warn};

use crate::auth_params::AuthParams;
use crate::buffer_pool::BufferPool;
use crate::client::{S3Client, kms_headers};
use crate::config::S3Settings;
use crate::error::{Result, S3FsError};
use crate::url::parse_s3_url;

/// One part of a multipart upload being filled in memory.
#[derive(Debug)]
pub struct WriteBuffer {
    /// 0-based part index; the wire part number is `part_no + 1`.
    pub part_no: u32,
    /// Offset of the first byte of the part in the file.
    pub start: u64,
    /// Offset one past the last byte the part can hold.
    pub end: u64,
    data: BytesMut,
}

impl WriteBuffer {
    /// Bytes written into the part so far.
    #[must_use]
    pub fn filled(&self) -> u64 {
        self.data.len() as u64
    }

    /// Whether the part holds `end - start` bytes.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.start + self.filled() == self.end
    }
}

/// Lifecycle of a write handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// Upload initiated; accepting writes.
    Open,
    /// `CompleteMultipartUpload` succeeded.
    Completed,
    /// The upload was aborted.
    Aborted,
}

/// What an upload task reports back.
#[derive(Debug)]
struct PartOutcome {
    part_number: u32,
    result: Result<String>,
}

/// Write handle for one S3 object, backed by a multipart upload.
pub struct S3FileHandle {
    path: String,
    auth: AuthParams,
    client: S3Client,
    pool: BufferPool,
    holders: Arc<Semaphore>,
    part_size: u64,
    max_parts: u64,
    upload_id: String,
    length: u64,
    current: Option<WriteBuffer>,
    etags: BTreeMap<u32, String>,
    dispatched: u32,
    in_flight: usize,
    outcomes_tx: mpsc::UnboundedSender<PartOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<PartOutcome>,
    error: Option<(u32, Arc<S3FsError>)>,
    state: UploadState,
}

impl fmt::Debug for S3FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3FileHandle")
            .field("path", &self.path)
            .field("upload_id", &self.upload_id)
            .field("part_size", &self.part_size)
            .field("length", &self.length)
            .field("etags", &self.etags.len())
            .field("in_flight", &self.in_flight)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl S3FileHandle {
    /// Open `path` for writing by initiating a multipart upload.
    pub async fn open(
        path: &str,
        auth: AuthParams,
        client: S3Client,
        pool: BufferPool,
        settings: &S3Settings,
    ) -> Result<Self> {
        let upload_id = initialize_multipart_upload(&client, path, &auth).await?;
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Ok(Self {
            path: path.to_owned(),
            auth,
            client,
            pool,
            holders: Arc::new(Semaphore::new(settings.max_upload_threads.max(1))),
            part_size: settings.part_size(),
            max_parts: settings.max_parts_per_file,
            upload_id,
            length: 0,
            current: None,
            etags: BTreeMap::new(),
            dispatched: 0,
            in_flight: 0,
            outcomes_tx,
            outcomes_rx,
            error: None,
            state: UploadState::Open,
        })
    }

    /// The object path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The multipart upload ID.
    #[must_use]
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// Bytes written so far.
    #[must_use]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Size of every part but the last.
    #[must_use]
    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Write `data` at `offset`, which must equal the bytes written so far.
    ///
    /// Full parts are handed to upload tasks without waiting for the
    /// network; the call only waits when the pool or this handle's upload
    /// slots are saturated.
    pub async fn write(&mut self, data: &[u8], offset: u64) -> Result<()> {
        self.ensure_open("write")?;
        self.drain_outcomes();
        self.check_error()?;

        if offset != self.length {
            return Err(S3FsError::NonSequentialWrite {
                path: self.path.clone(),
                expected: self.length,
                offset,
            });
        }

        let mut remaining = data;
        while !remaining.is_empty() {
            let part_idx = self.length / self.part_size;
            if part_idx >= self.max_parts {
                return Err(S3FsError::FileTooLarge {
                    path: self.path.clone(),
                    max_parts: self.max_parts,
                });
            }

            let mut buffer = match self.current.take() {
                Some(buffer) => buffer,
                None => self.new_buffer(part_idx)?,
            };

            let room = usize::try_from(buffer.end - self.length).unwrap_or(usize::MAX);
            let n = room.min(remaining.len());
            buffer.data.extend_from_slice(&remaining[..n]);
            self.length += n as u64;
            remaining = &remaining[n..];

            if buffer.is_full() {
                self.upload_buffer(buffer).await;
            } else {
                self.current = Some(buffer);
            }
        }
        Ok(())
    }

    /// Upload all written data and complete the multipart upload.
    ///
    /// Finalizing a completed handle is a no-op.
    pub async fn finalize(&mut self) -> Result<()> {
        match self.state {
            UploadState::Completed => return Ok(()),
            UploadState::Aborted => return self.ensure_open("finalize"),
            UploadState::Open => {}
        }
        self.drain_outcomes();
        self.check_error()?;

        if let Some(tail) = self.current.take() {
            self.upload_buffer(tail).await;
        } else if self.dispatched == 0 {
            // The object must exist even when nothing was written.
            let empty = self.new_buffer(0)?;
            self.upload_buffer(empty).await;
        }

        while self.in_flight > 0 {
            match self.outcomes_rx.recv().await {
                Some(outcome) => self.record(outcome),
                None => break,
            }
        }
        self.check_error()?;

        let mut parts = Vec::with_capacity(self.etags.len());
        for part_number in 1..=self.dispatched {
            let etag = self
                .etags
                .get(&part_number)
                .ok_or_else(|| S3FsError::IncompleteUpload {
                    path: self.path.clone(),
                    part: part_number,
                })?;
            parts.push(CompletedPart {
                part_number,
                etag: etag.clone(),
            });
        }

        let body = complete_multipart_upload_xml(&CompleteMultipartUpload { parts })?;
        let query = format!("uploadId={}", url_encode(&self.upload_id, true));
        let response = self
            .client
            .post(&self.path, &self.auth, &query, &[], Bytes::from(body))
            .await?;

        // S3 may report a failed completion with status 200 and an <Error> body.
        if root_element_name(&response.body).as_deref() != Some("CompleteMultipartUploadResult") {
            return Err(S3FsError::UnexpectedResponse {
                url: self.request_url(&query),
                message: format!(
                    "unexpected response during multipart upload completion: {}",
                    String::from_utf8_lossy(&response.body)
                ),
            });
        }

        self.state = UploadState::Completed;
        debug!(
            path = %self.path,
            parts = self.dispatched,
            bytes = self.length,
            "Completed multipart upload"
        );
        Ok(())
    }

    /// Close the handle, aborting the upload unless it was finalized.
    ///
    /// Abort failures are logged, not returned. A part upload failure seen
    /// earlier is re-raised.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == UploadState::Open {
            self.abort().await;
        }
        self.drain_outcomes();
        self.check_error()
    }

    async fn abort(&mut self) {
        self.current = None;
        self.state = UploadState::Aborted;

        let query = format!("uploadId={}", url_encode(&self.upload_id, true));
        match self.client.delete(&self.path, &self.auth, &query).await {
            Ok(_) => debug!(path = %self.path, upload_id = %self.upload_id, "Aborted multipart upload"),
            Err(e) => warn!(
                path = %self.path,
                upload_id = %self.upload_id,
                error = %e,
                "Failed to abort multipart upload"
            ),
        }
    }

    /// Admit `buffer` into the pool and move it into an upload task.
    async fn upload_buffer(&mut self, buffer: WriteBuffer) {
        let part_number = buffer.part_no + 1;
        let filled = buffer.filled();
        let pooled = self.pool.admit(buffer.data, &self.holders).await;
        self.dispatched = self.dispatched.max(part_number);
        self.in_flight += 1;

        let client = self.client.clone();
        let auth = self.auth.clone();
        let path = self.path.clone();
        let query = format!(
            "partNumber={part_number}&uploadId={}",
            url_encode(&self.upload_id, true)
        );
        let tx = self.outcomes_tx.clone();

        debug!(path = %path, part_number, bytes = filled, "Dispatching part upload");
        tokio::spawn(async move {
            let (body, permits) = pooled.into_parts();
            let result = upload_part(&client, &path, &auth, &query, body).await;
            drop(permits);
            // The receiver is gone only when the handle was dropped.
            let _ = tx.send(PartOutcome {
                part_number,
                result,
            });
        });
    }

    fn new_buffer(&self, part_idx: u64) -> Result<WriteBuffer> {
        let part_no = u32::try_from(part_idx).map_err(|_| S3FsError::FileTooLarge {
            path: self.path.clone(),
            max_parts: self.max_parts,
        })?;
        let size = usize::try_from(self.part_size).unwrap_or(usize::MAX);
        let start = part_idx * self.part_size;
        Ok(WriteBuffer {
            part_no,
            start,
            end: start + self.part_size,
            data: BytesMut::with_capacity(size),
        })
    }

    fn drain_outcomes(&mut self) {
        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            self.record(outcome);
        }
    }

    fn record(&mut self, outcome: PartOutcome) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match outcome.result {
            Ok(etag) => {
                self.etags.insert(outcome.part_number, etag);
            }
            Err(e) => {
                warn!(path = %self.path, part = outcome.part_number, error = %e, "Part upload failed");
                if self.error.is_none() {
                    self.error = Some((outcome.part_number, Arc::new(e)));
                }
            }
        }
    }

    fn check_error(&self) -> Result<()> {
        match &self.error {
            Some((part, source)) => Err(S3FsError::UploadFailed {
                path: self.path.clone(),
                part: *part,
                source: Arc::clone(source),
            }),
            None => Ok(()),
        }
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        match self.state {
            UploadState::Open => Ok(()),
            state => Err(S3FsError::InvalidState {
                path: self.path.clone(),
                message: format!("cannot {operation} a handle in state {state:?}"),
            }),
        }
    }

    fn request_url(&self, query: &str) -> String {
        parse_s3_url(&self.path, &self.auth)
            .map(|parsed| parsed.http_url(query))
            .unwrap_or_else(|_| self.path.clone())
    }
}

impl Drop for S3FileHandle {
    fn drop(&mut self) {
        if self.state != UploadState::Open || self.upload_id.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(path = %self.path, upload_id = %self.upload_id, "Write handle dropped without close");
            return;
        };
        warn!(path = %self.path, upload_id = %self.upload_id, "Write handle dropped without close; aborting upload");
        let client = self.client.clone();
        let auth = self.auth.clone();
        let path = self.path.clone();
        let query = format!("uploadId={}", url_encode(&self.upload_id, true));
        runtime.spawn(async move {
            if let Err(e) = client.delete(&path, &auth, &query).await {
                warn!(path = %path, error = %e, "Failed to abort multipart upload");
            }
        });
    }
}

/// Start a multipart upload for `path` and return its upload ID.
pub async fn initialize_multipart_upload(
    client: &S3Client,
    path: &str,
    auth: &AuthParams,
) -> Result<String> {
    let kms = kms_headers(&auth.kms_key_id);
    let headers: Vec<(&str, &str)> = kms.iter().map(|(k, v)| (*k, v.as_str())).collect();
    let response = client
        .post(path, auth, "uploads=", &headers, Bytes::new())
        .await?;
    let result: InitiateMultipartUploadResult = from_xml(&response.body)?;
    if result.upload_id.is_empty() {
        return Err(S3FsError::UnexpectedResponse {
            url: path.to_owned(),
            message: "empty UploadId in InitiateMultipartUploadResult".to_owned(),
        });
    }
    debug!(path, upload_id = %result.upload_id, "Initiated multipart upload");
    Ok(result.upload_id)
}

async fn upload_part(
    client: &S3Client,
    path: &str,
    auth: &AuthParams,
    query: &str,
    body: Bytes,
) -> Result<String> {
    let response = client.put(path, auth, query, &[], body).await?;
    response
        .header("etag")
        .map(ToOwned::to_owned)
        .ok_or_else(|| S3FsError::UnexpectedResponse {
            url: path.to_owned(),
            message: format!("no ETag header in response to part upload ({query})"),
        })
}
