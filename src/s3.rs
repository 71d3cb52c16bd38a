// AWS implementation of `ObjectStore`. The SDK is async; the rest of the
// program is not, so the backend owns a Tokio runtime and blocks on it.
// Large files go through a multipart upload with a bounded number of parts
// in flight.

use std::error::Error as StdError;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::{ByteStream, DateTimeFormat};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use aws_sdk_s3::Client;
use aws_smithy_types::body::SdkBody;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::stream::{self, StreamExt, TryStreamExt};
use futures::FutureExt;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::body;
use crate::config::BucketConfig;
use crate::error::UploadError;
use crate::storage::{
    Interrupt, ObjectStore, ObjectSummary, Part, PutRequest, TransferConfig, UploadOptions,
};

/// How often a multipart upload checks for Ctrl-C.
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

pub struct S3Backend {
    runtime: Runtime,
    client: Client,
    credentials: Option<SharedCredentialsProvider>,
    transfer: TransferConfig,
    interrupt: Interrupt,
}

impl S3Backend {
    /// Build a client for `config.region`, using the explicit key pair when
    /// one was configured and the SDK default chain otherwise.
    pub fn connect(config: &BucketConfig, transfer: TransferConfig) -> Result<Self> {
        let runtime = runtime()?;

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let Some(creds) = &config.credentials {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.clone(),
                None,
                None,
                "environment",
            ));
        }
        let sdk_config = runtime.block_on(loader.load());
        debug!(region = %config.region, static_credentials = config.credentials.is_some(), "loaded AWS config");

        Ok(S3Backend::assemble(runtime, Client::new(&sdk_config), transfer))
    }

    /// Wrap an already configured client.
    pub fn with_client(client: Client, transfer: TransferConfig) -> Result<Self> {
        Ok(S3Backend::assemble(runtime()?, client, transfer))
    }

    /// Abort multipart uploads when `interrupt` is raised.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    fn assemble(runtime: Runtime, client: Client, transfer: TransferConfig) -> Self {
        S3Backend {
            credentials: client.config().credentials_provider(),
            client,
            runtime,
            transfer,
            interrupt: Interrupt::default(),
        }
    }

    async fn ensure_credentials(&self) -> Result<(), UploadError> {
        let provider = self
            .credentials
            .as_ref()
            .ok_or_else(|| UploadError::Credentials("no credential provider configured".into()))?;
        provider
            .provide_credentials()
            .await
            .map(|_| ())
            .map_err(|e| UploadError::Credentials(DisplayErrorContext(&e).to_string()))
    }

    async fn put_single(&self, req: &PutRequest<'_>, progress: &dyn Fn(u64)) -> Result<(), UploadError> {
        let file = ByteStream::from_path(req.path)
            .await
            .map_err(|e| UploadError::Unknown(format!("reading {}: {}", req.path.display(), e)))?;
        let (tx, rx) = mpsc::unbounded();
        let sending = self
            .client
            .put_object()
            .bucket(req.bucket)
            .key(req.key)
            .content_length(req.size as i64)
            .body(ByteStream::new(body::counted(file.into_inner(), tx)))
            .set_content_type(req.options.content_type.clone())
            .set_acl(canned_acl(req.options))
            .set_metadata(metadata(req.options))
            .send();
        reporting(sending, rx, progress)
            .await
            .map_err(|e| classify(e, req.bucket))?;
        Ok(())
    }

    async fn put_multipart(&self, req: &PutRequest<'_>, progress: &dyn Fn(u64)) -> Result<(), UploadError> {
        let _active = self.interrupt.track();
        let created = self
            .client
            .create_multipart_upload()
            .bucket(req.bucket)
            .key(req.key)
            .set_content_type(req.options.content_type.clone())
            .set_acl(canned_acl(req.options))
            .set_metadata(metadata(req.options))
            .send()
            .await
            .map_err(|e| classify(e, req.bucket))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| UploadError::Unknown("multipart upload returned no upload id".into()))?
            .to_string();

        let plan = self.transfer.plan(req.size);
        debug!(key = req.key, parts = plan.len(), upload_id = %upload_id, "started multipart upload");

        let (tx, rx) = mpsc::unbounded();
        let uploading = until_interrupted(&self.interrupt, self.upload_parts(req, &upload_id, &plan, tx));
        let parts = match reporting(uploading, rx, progress).await {
            Ok(parts) => parts,
            Err(e) => {
                self.abort(req, &upload_id).await;
                return Err(e);
            }
        };

        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(req.bucket)
            .key(req.key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await;
        if let Err(e) = completed {
            self.abort(req, &upload_id).await;
            return Err(classify(e, req.bucket));
        }
        Ok(())
    }

    /// Upload every part with at most `max_concurrency` in flight. The
    /// result is ordered by part number.
    async fn upload_parts(
        &self,
        req: &PutRequest<'_>,
        upload_id: &str,
        plan: &[Part],
        tx: UnboundedSender<u64>,
    ) -> Result<Vec<CompletedPart>, UploadError> {
        let mut parts: Vec<CompletedPart> = stream::iter(plan.iter().copied())
            .map(|part| self.upload_part(req, upload_id, part, tx.clone()))
            .buffer_unordered(self.transfer.max_concurrency.max(1))
            .try_collect()
            .await?;
        parts.sort_by_key(|p| p.part_number());
        Ok(parts)
    }

    async fn upload_part(
        &self,
        req: &PutRequest<'_>,
        upload_id: &str,
        part: Part,
        tx: UnboundedSender<u64>,
    ) -> Result<CompletedPart, UploadError> {
        let chunk = read_chunk(req, part)
            .await
            .map_err(|e| UploadError::Unknown(format!("reading {}: {}", req.path.display(), e)))?;
        let out = self
            .client
            .upload_part()
            .bucket(req.bucket)
            .key(req.key)
            .upload_id(upload_id)
            .part_number(part.number)
            .content_length(part.len as i64)
            .body(ByteStream::new(body::counted(SdkBody::from(chunk), tx)))
            .send()
            .await
            .map_err(|e| classify(e, req.bucket))?;
        Ok(CompletedPart::builder()
            .part_number(part.number)
            .set_e_tag(out.e_tag().map(str::to_string))
            .build())
    }

    async fn abort(&self, req: &PutRequest<'_>, upload_id: &str) {
        let res = self
            .client
            .abort_multipart_upload()
            .bucket(req.bucket)
            .key(req.key)
            .upload_id(upload_id)
            .send()
            .await;
        match res {
            Ok(_) => warn!(key = req.key, upload_id, "aborted multipart upload"),
            Err(e) => warn!(key = req.key, upload_id, error = %DisplayErrorContext(&e), "failed to abort multipart upload"),
        }
    }
}

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

/// Drive `work` to completion, handing the byte deltas that arrive on `rx`
/// to `progress` on the calling thread as they come in.
async fn reporting<T>(
    work: impl Future<Output = T>,
    mut rx: UnboundedReceiver<u64>,
    progress: &dyn Fn(u64),
) -> T {
    let mut work = pin!(work.fuse());
    let out = loop {
        futures::select! {
            out = work => break out,
            delta = rx.next() => {
                if let Some(delta) = delta {
                    progress(delta);
                }
            }
        }
    };
    // Settled requests may keep their bodies alive; take what is buffered.
    rx.close();
    while let Some(delta) = rx.next().await {
        progress(delta);
    }
    out
}

/// Resolve to `Cancelled` as soon as `interrupt` is raised, dropping
/// whatever `work` still has in flight.
async fn until_interrupted<T>(
    interrupt: &Interrupt,
    work: impl Future<Output = Result<T, UploadError>>,
) -> Result<T, UploadError> {
    let raised = async {
        while !interrupt.is_raised() {
            tokio::time::sleep(INTERRUPT_POLL).await;
        }
    };
    let mut raised = pin!(raised.fuse());
    let mut work = pin!(work.fuse());
    futures::select_biased! {
        () = raised => Err(UploadError::Cancelled),
        out = work => out,
    }
}

impl ObjectStore for S3Backend {
    fn head_bucket(&self, bucket: &str) -> Result<(), UploadError> {
        self.runtime.block_on(async {
            self.ensure_credentials().await?;
            self.client
                .head_bucket()
                .bucket(bucket)
                .send()
                .await
                .map_err(|e| classify(e, bucket))?;
            info!(bucket, "bucket reachable");
            Ok(())
        })
    }

    fn put_file(&self, req: &PutRequest<'_>, progress: &dyn Fn(u64)) -> Result<(), UploadError> {
        self.runtime.block_on(async {
            if self.transfer.is_multipart(req.size) {
                self.put_multipart(req, progress).await
            } else {
                self.put_single(req, progress).await
            }
        })
    }

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: i32,
    ) -> Result<Vec<ObjectSummary>, UploadError> {
        self.runtime.block_on(async {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .max_keys(max_keys)
                .send()
                .await
                .map_err(|e| classify(e, bucket))?;
            let objects = resp
                .contents()
                .iter()
                .map(|obj| ObjectSummary {
                    key: obj.key().unwrap_or_default().to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj
                        .last_modified()
                        .and_then(|d| d.fmt(DateTimeFormat::DateTime).ok()),
                })
                .collect();
            Ok(objects)
        })
    }

    fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, UploadError> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| UploadError::validation(format!("Invalid expiration: {}", e)))?;
        self.runtime.block_on(async {
            let req = self
                .client
                .put_object()
                .bucket(bucket)
                .key(key)
                .presigned(presigning)
                .await
                .map_err(|e| classify(e, bucket))?;
            Ok(req.uri().to_string())
        })
    }
}

async fn read_chunk(req: &PutRequest<'_>, part: Part) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(req.path).await?;
    file.seek(std::io::SeekFrom::Start(part.offset)).await?;
    let mut buf = vec![0u8; part.len as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

fn canned_acl(options: &UploadOptions) -> Option<ObjectCannedAcl> {
    options.acl.as_deref().map(ObjectCannedAcl::from)
}

fn metadata(options: &UploadOptions) -> Option<std::collections::HashMap<String, String>> {
    if options.metadata.is_empty() {
        None
    } else {
        Some(options.metadata.clone())
    }
}

/// Map an SDK failure onto the error taxonomy. Status codes are checked
/// before error codes because `HeadBucket` responses carry no body.
fn classify<E>(err: SdkError<E, HttpResponse>, bucket: &str) -> UploadError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
{
    if let SdkError::ServiceError(ctx) = &err {
        let status = ctx.raw().status().as_u16();
        let code = ctx.err().code().map(str::to_string);
        let message = ctx.err().message().map(str::to_string);
        return service_error(status, code, message, bucket);
    }
    let detail = DisplayErrorContext(&err).to_string();
    if credentials_missing(&err) {
        UploadError::Credentials(detail)
    } else {
        UploadError::Unknown(detail)
    }
}

/// Identity resolution failures surface as construction or dispatch
/// failures with the provider's `CredentialsError` somewhere below.
fn credentials_missing(err: &(dyn StdError + 'static)) -> bool {
    let mut cause = Some(err);
    while let Some(e) = cause {
        if e.is::<CredentialsError>() {
            return true;
        }
        cause = e.source();
    }
    false
}

fn service_error(
    status: u16,
    code: Option<String>,
    message: Option<String>,
    bucket: &str,
) -> UploadError {
    match (status, code.as_deref()) {
        (_, Some("NoSuchBucket")) | (404, None) | (404, Some("NotFound")) => {
            UploadError::BucketNotFound(bucket.to_string())
        }
        (403, _) | (_, Some("AccessDenied")) => UploadError::AccessDenied(bucket.to_string()),
        (_, Some("InvalidAccessKeyId")) | (_, Some("SignatureDoesNotMatch")) | (_, Some("ExpiredToken")) => {
            UploadError::Credentials(message.unwrap_or_else(|| code.unwrap_or_default()))
        }
        _ => UploadError::Service {
            code: code.unwrap_or_else(|| status.to_string()),
            message: message.unwrap_or_else(|| "no message".to_string()),
        },
    }
}
