// Storage client wrapper: the bucket operations the CLI offers, over any
// `ObjectStore`. Each operation comes in two forms: `try_*` returns the
// typed error, the plain one prints the error and returns a bool, an empty
// list or `None` so the menu loop never has to handle failures itself.

use std::fs;
use std::path::Path;
use std::time::Duration;

use indicatif::{HumanBytes, HumanCount, ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::error::UploadError;
use crate::output::{Sink, Tone};
use crate::storage::{ObjectStore, ObjectSummary, PutRequest, UploadOptions, MIB};
use crate::walk::{self, Filter};

/// Default page size for `list_bucket_contents`.
pub const DEFAULT_MAX_ITEMS: i32 = 100;

/// Default lifetime of a presigned upload URL.
pub const DEFAULT_URL_EXPIRATION: Duration = Duration::from_secs(3600);

pub struct Uploader<S> {
    store: S,
    bucket: String,
    out: Sink,
    show_progress: bool,
}

impl<S: ObjectStore> Uploader<S> {
    pub fn new(store: S, bucket: impl Into<String>, out: Sink) -> Self {
        Uploader {
            store,
            bucket: bucket.into(),
            out,
            show_progress: true,
        }
    }

    /// Turn off the live progress bar (batch runs, tests).
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    #[cfg(test)]
    fn store(&self) -> &S {
        &self.store
    }

    /// Check that the bucket exists and we may use it.
    pub fn bucket_exists(&self) -> bool {
        match self.store.head_bucket(&self.bucket) {
            Ok(()) => true,
            Err(e) => {
                let msg = match &e {
                    UploadError::BucketNotFound(_) | UploadError::AccessDenied(_) => e.to_string(),
                    UploadError::Credentials(_) => "AWS credentials not found.".to_string(),
                    other => format!("Error checking bucket: {}", other),
                };
                self.out.print(Tone::Error, &msg);
                debug!(kind = %e.kind(), error = %e, "bucket check failed");
                false
            }
        }
    }

    /// Upload one file. `key` defaults to the file name. Returns true only
    /// when the store confirmed the upload.
    pub fn upload_file(
        &self,
        path: &Path,
        key: Option<&str>,
        options: &UploadOptions,
        on_progress: Option<&dyn Fn(u64)>,
    ) -> bool {
        match self.try_upload_file(path, key, options, on_progress) {
            Ok(key) => {
                self.out.blank();
                self.out.print(Tone::Success, "✓ Upload successful!");
                self.out
                    .print(Tone::Success, &format!("S3 URI: s3://{}/{}", self.bucket, key));
                self.out.blank();
                true
            }
            Err(e) => {
                self.report_upload_error(&e);
                false
            }
        }
    }

    /// Typed form of `upload_file`. Returns the key that was written.
    pub fn try_upload_file(
        &self,
        path: &Path,
        key: Option<&str>,
        options: &UploadOptions,
        on_progress: Option<&dyn Fn(u64)>,
    ) -> Result<String, UploadError> {
        let meta = fs::metadata(path)
            .map_err(|_| UploadError::validation(format!("File not found: {}", path.display())))?;
        if !meta.is_file() {
            return Err(UploadError::validation(format!(
                "Path is not a file: {}",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = key.map(str::to_string).unwrap_or_else(|| name.clone());
        let size = meta.len();

        let mut options = options.clone();
        if options.content_type.is_none() {
            options.content_type = mime_guess::from_path(path).first().map(|m| m.to_string());
        }

        self.out.blank();
        self.out.print(Tone::Info, &format!("Uploading: {}", name));
        self.out.print(Tone::Info, &format!("To bucket: {}", self.bucket));
        self.out.print(Tone::Info, &format!("S3 key: {}", key));
        self.out.print(
            Tone::Info,
            &format!(
                "Size: {} bytes ({:.2} MB)",
                HumanCount(size),
                size as f64 / MIB as f64
            ),
        );
        self.out.blank();

        let bar = self.progress_bar(size);
        let tick = |delta: u64| {
            bar.inc(delta);
            if let Some(cb) = on_progress {
                cb(delta);
            }
        };
        let req = PutRequest {
            bucket: &self.bucket,
            key: &key,
            path,
            size,
            options: &options,
        };
        let result = self.store.put_file(&req, &tick);
        match &result {
            Ok(()) => bar.finish(),
            Err(_) => bar.abandon(),
        }
        result?;

        info!(bucket = %self.bucket, key = %key, size, "upload complete");
        Ok(key)
    }

    /// Upload every selected file under `dir`, one at a time. Failures are
    /// counted, never fatal. Returns `(successful, failed)`.
    pub fn upload_directory(
        &self,
        dir: &Path,
        prefix: &str,
        include: Option<&[String]>,
        exclude: Option<&[String]>,
    ) -> (usize, usize) {
        if !dir.is_dir() {
            self.out
                .print(Tone::Error, &format!("Directory not found: {}", dir.display()));
            return (0, 0);
        }
        let filter = match Filter::new(include, exclude) {
            Ok(f) => f,
            Err(e) => {
                self.out.print(Tone::Error, &e.to_string());
                return (0, 0);
            }
        };

        let files = walk::collect(dir, &filter);
        if files.is_empty() {
            self.out.print(Tone::Warning, "No files found to upload.");
            return (0, 0);
        }
        self.out.blank();
        self.out
            .print(Tone::Info, &format!("Found {} file(s) to upload", files.len()));

        let mut successful = 0;
        let mut failed = 0;
        for file in &files {
            let key = walk::object_key(prefix, &file.relative);
            if self.upload_file(&file.path, Some(key.as_str()), &UploadOptions::default(), None) {
                successful += 1;
            } else {
                failed += 1;
            }
        }

        self.out.blank();
        self.out.print(Tone::Info, "Upload Summary:");
        self.out
            .print(Tone::Success, &format!("✓ Successful: {}", successful));
        self.out.print(Tone::Error, &format!("✗ Failed: {}", failed));
        (successful, failed)
    }

    /// List up to `max_items` objects under `prefix` and print them.
    /// Errors print and yield an empty list.
    pub fn list_bucket_contents(&self, prefix: &str, max_items: i32) -> Vec<ObjectSummary> {
        let objects = match self.store.list_objects(&self.bucket, prefix, max_items) {
            Ok(objects) => objects,
            Err(e) => {
                self.out
                    .print(Tone::Error, &format!("Error listing bucket: {}", e));
                return Vec::new();
            }
        };
        if objects.is_empty() {
            self.out.print(Tone::Warning, "Bucket is empty.");
            return objects;
        }

        self.out.blank();
        self.out.print(
            Tone::Info,
            &format!("Found {} object(s) in bucket:", objects.len()),
        );
        self.out.blank();
        for obj in &objects {
            self.out
                .print(Tone::Plain, &format!("  • {} ({:.2} MB)", obj.key, obj.size_mb()));
        }
        objects
    }

    /// Presigned `PUT` URL for `key`, or `None` after printing why not.
    pub fn get_upload_url(&self, key: &str, expiration: Duration) -> Option<String> {
        match self.store.presign_put(&self.bucket, key, expiration) {
            Ok(url) => Some(url),
            Err(e) => {
                self.out
                    .print(Tone::Error, &format!("Error generating presigned URL: {}", e));
                None
            }
        }
    }

    fn report_upload_error(&self, e: &UploadError) {
        debug!(kind = %e.kind(), error = %e, "upload failed");
        let msg = match e {
            UploadError::Validation(m) => m.clone(),
            UploadError::Credentials(_) => "✗ AWS credentials not found.".to_string(),
            UploadError::Service { code, message } => {
                self.out
                    .print(Tone::Error, &format!("✗ Upload failed: {}", code));
                message.clone()
            }
            UploadError::Unknown(_) => format!("✗ {}", e),
            other => format!("✗ Upload failed: {}", other),
        };
        self.out.print(Tone::Error, &msg);
        if let Some(hint) = e.hint() {
            self.out.print(Tone::Warning, hint);
        }
    }

    fn progress_bar(&self, size: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(size);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {msg:.bold.blue} [{bar:40.cyan/blue}] {percent:>3}% {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        bar.set_message("Uploading");
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }
}

/// Human readable size for summaries, e.g. `3.20 MiB`.
pub fn human_size(bytes: u64) -> String {
    HumanBytes(bytes).to_string()
}
