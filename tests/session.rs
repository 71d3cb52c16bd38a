// End-to-end runs of the interactive session against a scripted user, a
// stub file picker and an in-memory bucket.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use s3_uploader::config::BucketConfig;
use s3_uploader::error::{AppError, UploadError};
use s3_uploader::output::{Capture, Tone};
use s3_uploader::picker::FilePicker;
use s3_uploader::prompt::Prompter;
use s3_uploader::storage::{ObjectStore, ObjectSummary, PutRequest};
use s3_uploader::ui::App;

#[derive(Debug, Clone)]
enum Answer {
    Text(&'static str),
    Yes,
    No,
    Pick(usize),
    Enter,
}

/// Plays back answers in order and records every prompt it was shown.
#[derive(Clone, Default)]
struct Script {
    answers: Rc<RefCell<VecDeque<Answer>>>,
    asked: Rc<RefCell<Vec<String>>>,
}

impl Script {
    fn new(answers: Vec<Answer>) -> Self {
        Script {
            answers: Rc::new(RefCell::new(answers.into())),
            asked: Rc::default(),
        }
    }

    fn next(&self, prompt: &str) -> Answer {
        self.asked.borrow_mut().push(prompt.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("no answer left for prompt {:?}", prompt))
    }

    fn remaining(&self) -> usize {
        self.answers.borrow().len()
    }
}

impl Prompter for Script {
    fn input(&self, prompt: &str, default: Option<&str>) -> anyhow::Result<String> {
        match self.next(prompt) {
            Answer::Text("") => Ok(default.unwrap_or_default().to_string()),
            Answer::Text(t) => Ok(t.to_string()),
            other => panic!("{:?} is not text for {:?}", other, prompt),
        }
    }

    fn confirm(&self, prompt: &str, _default: bool) -> anyhow::Result<bool> {
        match self.next(prompt) {
            Answer::Yes => Ok(true),
            Answer::No => Ok(false),
            other => panic!("{:?} is not yes/no for {:?}", other, prompt),
        }
    }

    fn select(&self, prompt: &str, choices: &[&str], _default: usize) -> anyhow::Result<usize> {
        match self.next(prompt) {
            Answer::Pick(i) if i < choices.len() => Ok(i),
            other => panic!("{:?} is not a choice among {:?}", other, choices),
        }
    }

    fn pause(&self, prompt: &str) -> anyhow::Result<()> {
        match self.next(prompt) {
            Answer::Enter => Ok(()),
            other => panic!("{:?} is not Enter for {:?}", other, prompt),
        }
    }
}

struct StubPicker(Option<PathBuf>);

impl FilePicker for StubPicker {
    fn pick_file(&self) -> anyhow::Result<Option<PathBuf>> {
        Ok(self.0.clone())
    }
}

struct BrokenPicker;

impl FilePicker for BrokenPicker {
    fn pick_file(&self) -> anyhow::Result<Option<PathBuf>> {
        Err(io::Error::from(io::ErrorKind::PermissionDenied)).context("cannot read directory")
    }
}

struct InterruptedPicker;

impl FilePicker for InterruptedPicker {
    fn pick_file(&self) -> anyhow::Result<Option<PathBuf>> {
        Err(io::Error::from(io::ErrorKind::Interrupted).into())
    }
}

/// Bucket that accepts everything and remembers the keys it was given.
#[derive(Clone, Default)]
struct MemoryBucket {
    reachable: bool,
    objects: Rc<RefCell<HashMap<String, u64>>>,
    puts: Rc<RefCell<Vec<String>>>,
}

impl MemoryBucket {
    fn reachable() -> Self {
        MemoryBucket {
            reachable: true,
            ..Default::default()
        }
    }

    fn puts(&self) -> Vec<String> {
        self.puts.borrow().clone()
    }
}

impl ObjectStore for MemoryBucket {
    fn head_bucket(&self, bucket: &str) -> Result<(), UploadError> {
        if self.reachable {
            Ok(())
        } else {
            Err(UploadError::BucketNotFound(bucket.to_string()))
        }
    }

    fn put_file(&self, req: &PutRequest<'_>, progress: &dyn Fn(u64)) -> Result<(), UploadError> {
        self.puts.borrow_mut().push(req.key.to_string());
        self.objects.borrow_mut().insert(req.key.to_string(), req.size);
        progress(req.size);
        Ok(())
    }

    fn list_objects(
        &self,
        _bucket: &str,
        prefix: &str,
        max_keys: i32,
    ) -> Result<Vec<ObjectSummary>, UploadError> {
        let mut found: Vec<ObjectSummary> = self
            .objects
            .borrow()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, size)| ObjectSummary {
                key: k.clone(),
                size: *size,
                last_modified: None,
            })
            .collect();
        found.sort_by(|a, b| a.key.cmp(&b.key));
        found.truncate(max_keys as usize);
        Ok(found)
    }

    fn presign_put(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String, UploadError> {
        Ok(format!("https://{}/{}?expires={}", bucket, key, expires_in.as_secs()))
    }
}

fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |name| {
        pairs
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    }
}

const CONFIGURED: &[(&str, &str)] = &[("AWS_S3_BUCKET_NAME", "my-bucket"), ("AWS_REGION", "eu-west-1")];

fn app(script: &Script, picked: Option<PathBuf>, out: &std::sync::Arc<Capture>) -> App {
    App::new(Box::new(script.clone()), Box::new(StubPicker(picked)), out.clone()).without_progress()
}

#[test]
fn prompts_for_missing_configuration() {
    let out = Capture::new();
    let script = Script::new(vec![
        Answer::Text("my-bucket"),
        Answer::Text(""),
        Answer::Pick(2),
    ]);
    let bucket = MemoryBucket::reachable();
    let seen = Rc::new(RefCell::new(None));

    let seen_in = seen.clone();
    let result = app(&script, None, &out).with_env(env(&[])).run(|config: &BucketConfig| {
        *seen_in.borrow_mut() = Some(config.clone());
        Ok(bucket.clone())
    });

    assert!(result.is_ok());
    assert_eq!(
        out.rows()[..2],
        [
            ("Bucket".to_string(), "my-bucket".to_string()),
            ("Region".to_string(), "eu-central-1".to_string()),
        ]
    );
    let config = seen.borrow().clone().unwrap();
    assert_eq!(config.bucket, "my-bucket");
    assert_eq!(config.region, "eu-central-1");
    assert_eq!(script.asked.borrow()[..2], ["Bucket Name", "AWS Region"]);
    assert!(out.contains("Goodbye!"));
}

#[test]
fn missing_bucket_name_stops_before_connecting() {
    let out = Capture::new();
    let script = Script::new(vec![Answer::Text("")]);
    let mut connected = false;

    let result = app(&script, None, &out).with_env(env(&[])).run(|_| {
        connected = true;
        Ok(MemoryBucket::reachable())
    });

    assert!(matches!(result, Err(AppError::MissingBucket)));
    assert!(!connected);
    assert!(out.contains_tone(Tone::Error, "Bucket name is required"));
}

#[test]
fn unreachable_bucket_is_a_connection_error() {
    let out = Capture::new();
    let script = Script::new(vec![]);

    let result = app(&script, None, &out)
        .with_env(env(CONFIGURED))
        .run(|_| Ok(MemoryBucket::default()));

    assert!(matches!(result, Err(AppError::Connection(ref b)) if b == "my-bucket"));
    assert!(out.contains("Bucket 'my-bucket' does not exist"));
    assert!(out.contains("Connection Failed"));
    assert!(out.contains("AWS credentials are configured"));
}

#[test]
fn directory_upload_with_include_pattern() {
    let tmp = tempfile::tempdir().unwrap();
    for name in ["a.txt", "b.png", "c.txt"] {
        fs::write(tmp.path().join(name), name).unwrap();
    }
    let dir: &'static str = Box::leak(tmp.path().to_string_lossy().into_owned().into_boxed_str());

    let out = Capture::new();
    let script = Script::new(vec![
        Answer::Pick(0),          // upload
        Answer::Pick(1),          // directory
        Answer::Text(dir),        // path
        Answer::Text("notes"),    // prefix
        Answer::Yes,              // filters
        Answer::Text("*.txt"),    // include
        Answer::Text(""),         // exclude
        Answer::No,               // another operation
    ]);
    let bucket = MemoryBucket::reachable();

    let result = app(&script, None, &out)
        .with_env(env(CONFIGURED))
        .run(|_| Ok(bucket.clone()));

    assert!(result.is_ok());
    assert_eq!(bucket.puts(), vec!["notes/a.txt", "notes/c.txt"]);
    assert!(out.contains("All files uploaded successfully (2 files)"));
    assert_eq!(script.remaining(), 0);
}

#[test]
fn single_file_goes_under_media_by_default() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("holiday.jpg");
    fs::write(&file, vec![7u8; 4096]).unwrap();

    let out = Capture::new();
    let script = Script::new(vec![
        Answer::Pick(0), // upload
        Answer::Pick(0), // file
        Answer::No,      // customise key
        Answer::Yes,     // another operation
        Answer::Pick(0), // upload
        Answer::Pick(0), // file
        Answer::Yes,     // customise key
        Answer::Text("albums/2024/holiday.jpg"),
        Answer::No,
    ]);
    let bucket = MemoryBucket::reachable();

    let result = app(&script, Some(file), &out)
        .with_env(env(CONFIGURED))
        .run(|_| Ok(bucket.clone()));

    assert!(result.is_ok());
    assert_eq!(bucket.puts(), vec!["media/holiday.jpg", "albums/2024/holiday.jpg"]);
    assert!(out.contains("s3://my-bucket/media/holiday.jpg"));
    assert!(out.contains_tone(Tone::Success, "Upload completed successfully"));
    // The screen is redrawn between operations.
    assert!(out.lines().contains(&s3_uploader::output::Line::Cleared));
}

#[test]
fn cancelled_picker_uploads_nothing() {
    let out = Capture::new();
    let script = Script::new(vec![Answer::Pick(0), Answer::Pick(0), Answer::No]);
    let bucket = MemoryBucket::reachable();

    let result = app(&script, None, &out)
        .with_env(env(CONFIGURED))
        .run(|_| Ok(bucket.clone()));

    assert!(result.is_ok());
    assert!(bucket.puts().is_empty());
    assert!(out.contains_tone(Tone::Warning, "File selection cancelled"));
}

#[test]
fn missing_directory_is_reported_and_the_loop_continues() {
    let out = Capture::new();
    let script = Script::new(vec![
        Answer::Pick(0),
        Answer::Pick(1),
        Answer::Text("/definitely/not/here"),
        Answer::Yes,
        Answer::Pick(2),
    ]);
    let bucket = MemoryBucket::reachable();

    let result = app(&script, None, &out)
        .with_env(env(CONFIGURED))
        .run(|_| Ok(bucket.clone()));

    assert!(result.is_ok());
    assert!(bucket.puts().is_empty());
    assert!(out.contains("Directory not found: /definitely/not/here"));
    assert_eq!(script.remaining(), 0);
}

#[test]
fn listing_filters_by_prefix_and_waits_for_enter() {
    let bucket = MemoryBucket::reachable();
    bucket.objects.borrow_mut().insert("media/a.png".into(), 1024 * 1024);
    bucket.objects.borrow_mut().insert("docs/readme.md".into(), 10);

    let out = Capture::new();
    let script = Script::new(vec![
        Answer::Pick(1),
        Answer::Text("media/"),
        Answer::Enter,
        Answer::Yes,
        Answer::Pick(2),
    ]);

    let result = app(&script, None, &out)
        .with_env(env(CONFIGURED))
        .run(|_| Ok(bucket.clone()));

    assert!(result.is_ok());
    assert!(out.contains("Found 1 object(s) in bucket:"));
    assert!(out.contains("• media/a.png (1.00 MB)"));
    assert!(!out.contains("docs/readme.md"));
    assert_eq!(script.remaining(), 0);
}

#[test]
fn declining_to_continue_after_a_listing_ends_the_session() {
    let out = Capture::new();
    let script = Script::new(vec![
        Answer::Pick(1),
        Answer::Text(""),
        Answer::Enter,
        Answer::No,
    ]);

    let result = app(&script, None, &out)
        .with_env(env(CONFIGURED))
        .run(|_| Ok(MemoryBucket::reachable()));

    assert!(result.is_ok());
    assert!(out.contains("Bucket is empty."));
    assert!(out.contains("Goodbye!"));
    assert_eq!(
        script.asked.borrow().last().map(String::as_str),
        Some("Perform another operation?")
    );
    assert_eq!(script.remaining(), 0);
}

#[test]
fn picker_failure_is_reported_and_the_loop_continues() {
    let out = Capture::new();
    let script = Script::new(vec![
        Answer::Pick(0),
        Answer::Pick(0),
        Answer::Yes,
        Answer::Pick(2),
    ]);
    let bucket = MemoryBucket::reachable();

    let result = App::new(Box::new(script.clone()), Box::new(BrokenPicker), out.clone())
        .without_progress()
        .with_env(env(CONFIGURED))
        .run(|_| Ok(bucket.clone()));

    assert!(result.is_ok());
    assert!(bucket.puts().is_empty());
    assert!(out.contains_tone(Tone::Error, "Error: cannot read directory"));
    assert_eq!(script.remaining(), 0);
}

#[test]
fn picker_interrupt_still_ends_the_session() {
    let out = Capture::new();
    let script = Script::new(vec![Answer::Pick(0), Answer::Pick(0)]);

    let result = App::new(Box::new(script.clone()), Box::new(InterruptedPicker), out.clone())
        .without_progress()
        .with_env(env(CONFIGURED))
        .run(|_| Ok(MemoryBucket::reachable()));

    assert!(matches!(result, Err(AppError::Other(ref e)) if s3_uploader::error::is_interrupt(e)));
}

#[test]
fn backend_construction_errors_propagate() {
    let out = Capture::new();
    let script = Script::new(vec![]);

    let result = app(&script, None, &out)
        .with_env(env(CONFIGURED))
        .run(|_| -> anyhow::Result<MemoryBucket> { anyhow::bail!("no runtime") });

    assert!(matches!(result, Err(AppError::Other(ref e)) if e.to_string() == "no runtime"));
}
