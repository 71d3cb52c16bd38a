// The storage seam. `ObjectStore` is the handful of bucket operations the
// uploader needs; `s3::S3Backend` implements it against AWS, tests use an
// in-memory fake.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::error::UploadError;

pub const MIB: u64 = 1024 * 1024;

/// S3 refuses multipart uploads with more parts than this.
pub const MAX_PARTS: u64 = 10_000;

/// Blocking bucket operations. Implementations classify failures into
/// `UploadError` so callers never see SDK types.
pub trait ObjectStore {
    /// Metadata-only reachability check.
    fn head_bucket(&self, bucket: &str) -> Result<(), UploadError>;

    /// Upload a local file. `progress` receives transferred-byte deltas.
    fn put_file(&self, req: &PutRequest<'_>, progress: &dyn Fn(u64)) -> Result<(), UploadError>;

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: i32,
    ) -> Result<Vec<ObjectSummary>, UploadError>;

    /// A URL that allows a `PUT` of `key` until `expires_in` elapses.
    fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, UploadError>;
}

/// A single upload as handed to the backend.
#[derive(Debug, Clone, Copy)]
pub struct PutRequest<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub path: &'a Path,
    pub size: u64,
    pub options: &'a UploadOptions,
}

/// Extra object settings for an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Guessed from the file extension when `None`.
    pub content_type: Option<String>,
    /// Canned ACL name, e.g. `public-read`.
    pub acl: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl UploadOptions {
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn acl(mut self, acl: impl Into<String>) -> Self {
        self.acl = Some(acl.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<String>,
}

impl ObjectSummary {
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / MIB as f64
    }
}

/// When and how a file is split into a multipart upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// Files at or above this size go multipart.
    pub multipart_threshold: u64,
    pub part_size: u64,
    /// Parts in flight per file.
    pub max_concurrency: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            multipart_threshold: 25 * MIB,
            part_size: 25 * MIB,
            max_concurrency: 10,
        }
    }
}

/// One slice of a multipart upload. Part numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    pub number: i32,
    pub offset: u64,
    pub len: u64,
}

impl TransferConfig {
    pub fn is_multipart(&self, size: u64) -> bool {
        size >= self.multipart_threshold
    }

    /// The configured part size, grown if the file would otherwise need
    /// more than `MAX_PARTS` parts.
    pub fn part_size_for(&self, size: u64) -> u64 {
        let min = size.div_ceil(MAX_PARTS);
        self.part_size.max(min).max(1)
    }

    pub fn plan(&self, size: u64) -> Vec<Part> {
        let part_size = self.part_size_for(size);
        let mut parts = Vec::new();
        let mut offset = 0;
        let mut number = 1;
        while offset < size {
            let len = part_size.min(size - offset);
            parts.push(Part {
                number,
                offset,
                len,
            });
            offset += len;
            number += 1;
        }
        parts
    }
}

/// Ctrl-C shared between the signal handler and the backend. Transfers that
/// leave server-side state behind (multipart uploads) register with
/// `track` so the handler can wait for them to clean up before exiting.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    state: Arc<InterruptState>,
}

#[derive(Debug, Default)]
struct InterruptState {
    raised: AtomicBool,
    active: Mutex<usize>,
    idle: Condvar,
}

impl Interrupt {
    pub fn raise(&self) {
        self.state.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.state.raised.load(Ordering::SeqCst)
    }

    /// Mark a transfer as in flight until the guard drops.
    pub fn track(&self) -> Active {
        *self.state.active.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Active {
            state: self.state.clone(),
        }
    }

    /// Raise the flag, then wait up to `timeout` for tracked transfers to
    /// finish. True when none are left.
    pub fn raise_and_wait(&self, timeout: Duration) -> bool {
        self.raise();
        let active = self.state.active.lock().unwrap_or_else(PoisonError::into_inner);
        let (active, _) = self
            .state
            .idle
            .wait_timeout_while(active, timeout, |n| *n > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *active == 0
    }
}

/// Guard returned by `Interrupt::track`.
#[derive(Debug)]
pub struct Active {
    state: Arc<InterruptState>,
}

impl Drop for Active {
    fn drop(&mut self) {
        let mut active = self.state.active.lock().unwrap_or_else(PoisonError::into_inner);
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.state.idle.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn defaults_match_the_transfer_settings() {
        let cfg = TransferConfig::default();
        assert_eq!(cfg.multipart_threshold, 25 * MIB);
        assert_eq!(cfg.part_size, 25 * MIB);
        assert_eq!(cfg.max_concurrency, 10);
        assert!(!cfg.is_multipart(25 * MIB - 1));
        assert!(cfg.is_multipart(25 * MIB));
    }

    #[test]
    fn plan_covers_the_file_exactly() {
        let cfg = TransferConfig::default();
        let size = 60 * MIB + 7;
        let parts = cfg.plan(size);

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], Part { number: 1, offset: 0, len: 25 * MIB });
        assert_eq!(parts[2].number, 3);
        assert_eq!(parts[2].offset, 50 * MIB);
        assert_eq!(parts[2].len, 10 * MIB + 7);
        assert_eq!(parts.iter().map(|p| p.len).sum::<u64>(), size);
    }

    #[test]
    fn huge_files_get_bigger_parts() {
        let cfg = TransferConfig::default();
        let size = 500 * 1024 * MIB;
        let part_size = cfg.part_size_for(size);

        assert!(part_size > cfg.part_size);
        assert!(size.div_ceil(part_size) <= MAX_PARTS);
    }

    #[test]
    fn empty_file_has_no_parts() {
        assert!(TransferConfig::default().plan(0).is_empty());
    }

    #[test]
    fn options_builder() {
        let opts = UploadOptions::default()
            .content_type("image/png")
            .acl("private")
            .metadata("owner", "ops");
        assert_eq!(opts.content_type.as_deref(), Some("image/png"));
        assert_eq!(opts.acl.as_deref(), Some("private"));
        assert_eq!(opts.metadata.get("owner").map(String::as_str), Some("ops"));
    }

    #[test]
    fn interrupt_waits_for_tracked_transfers() {
        let interrupt = Interrupt::default();
        let guard = interrupt.track();
        let worker = {
            let interrupt = interrupt.clone();
            thread::spawn(move || {
                while !interrupt.is_raised() {
                    thread::sleep(Duration::from_millis(5));
                }
                drop(guard);
            })
        };

        assert!(interrupt.raise_and_wait(Duration::from_secs(5)));
        worker.join().unwrap();
    }

    #[test]
    fn interrupt_gives_up_after_the_timeout() {
        let interrupt = Interrupt::default();
        let _guard = interrupt.track();
        assert!(!interrupt.raise_and_wait(Duration::from_millis(10)));
        assert!(interrupt.is_raised());
    }
}
