// UI layer: the interactive session. `App` walks through configuration,
// connects, then runs the menu loop until the user exits. Prompts, the file
// picker and all printing go through injected capabilities so the whole
// flow can run against fakes.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::{self, section, BucketConfig};
use crate::error::{is_interrupt, AppError};
use crate::output::{Sink, Tone};
use crate::picker::FilePicker;
use crate::prompt::{split_patterns, Prompter};
use crate::storage::{ObjectStore, UploadOptions};
use crate::uploader::{human_size, Uploader, DEFAULT_MAX_ITEMS};

/// Folder used for single-file uploads unless the user picks a key.
pub const DEFAULT_FOLDER: &str = "media";

const ACTIONS: [(&str, &str); 3] = [
    ("upload", "Upload file or directory"),
    ("list", "List bucket contents"),
    ("exit", "Exit application"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Upload,
    List,
    Exit,
}

impl Action {
    fn from_index(i: usize) -> Self {
        match i {
            0 => Action::Upload,
            1 => Action::List,
            _ => Action::Exit,
        }
    }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

pub struct App {
    prompter: Box<dyn Prompter>,
    picker: Box<dyn FilePicker>,
    out: Sink,
    env: EnvLookup,
    show_progress: bool,
}

impl App {
    pub fn new(prompter: Box<dyn Prompter>, picker: Box<dyn FilePicker>, out: Sink) -> Self {
        App {
            prompter,
            picker,
            out,
            env: Box::new(config::env_var),
            show_progress: true,
        }
    }

    /// Replace the process environment lookup.
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Run the whole session. `connect` builds the storage backend once the
    /// configuration is known.
    pub fn run<S, C>(&self, connect: C) -> Result<(), AppError>
    where
        S: ObjectStore,
        C: FnOnce(&BucketConfig) -> Result<S>,
    {
        self.banner();
        let config = BucketConfig::resolve(&*self.env, &*self.prompter, &*self.out)?;
        let uploader = self.connect(&config, connect)?;
        self.menu_loop(&uploader)?;
        Ok(())
    }

    fn connect<S, C>(&self, config: &BucketConfig, connect: C) -> Result<Uploader<S>, AppError>
    where
        S: ObjectStore,
        C: FnOnce(&BucketConfig) -> Result<S>,
    {
        self.out.print(Tone::Dim, "  Connecting to S3...");
        let store = connect(config)?;
        let mut uploader = Uploader::new(store, config.bucket.clone(), self.out.clone());
        if !self.show_progress {
            uploader = uploader.without_progress();
        }

        if !uploader.bucket_exists() {
            self.out.blank();
            self.out.print(Tone::Error, "  Connection Failed");
            self.out.blank();
            self.out.print(Tone::Plain, "  Cannot access S3 bucket. Please verify:");
            self.out.print(Tone::Plain, "    - Bucket name is correct");
            self.out.print(Tone::Plain, "    - AWS credentials are configured");
            self.out.print(Tone::Plain, "    - You have proper permissions");
            self.out.blank();
            return Err(AppError::Connection(config.bucket.clone()));
        }
        self.out.print(Tone::Success, "  Connected successfully");
        Ok(uploader)
    }

    fn menu_loop<S: ObjectStore>(&self, uploader: &Uploader<S>) -> Result<()> {
        loop {
            match self.choose_action()? {
                Action::Exit => {
                    self.goodbye();
                    return Ok(());
                }
                Action::List => {
                    self.out.blank();
                    self.list_contents(uploader)?;
                    self.out.blank();
                    self.prompter.pause("Press Enter to continue...")?;
                }
                Action::Upload => {
                    self.out.blank();
                    let kind = self
                        .prompter
                        .select("What to upload?", &["file", "directory"], 0)?;
                    if kind == 0 {
                        self.upload_single_file(uploader)?;
                    } else {
                        self.upload_directory(uploader)?;
                    }
                }
            }
            self.out.blank();
            if !self.prompter.confirm("Perform another operation?", true)? {
                self.goodbye();
                return Ok(());
            }
            self.out.clear();
            self.banner();
        }
    }

    fn choose_action(&self) -> Result<Action> {
        section(&*self.out, "Main Menu");
        self.out.table(&ACTIONS);
        self.out.blank();
        let labels: Vec<&str> = ACTIONS.iter().map(|(name, _)| *name).collect();
        let picked = self.prompter.select("Choose an action", &labels, 0)?;
        Ok(Action::from_index(picked))
    }

    fn list_contents<S: ObjectStore>(&self, uploader: &Uploader<S>) -> Result<()> {
        let prefix = self.prompter.input("Filter by prefix", Some(""))?;
        self.out.blank();
        uploader.list_bucket_contents(&prefix, DEFAULT_MAX_ITEMS);
        Ok(())
    }

    fn upload_single_file<S: ObjectStore>(&self, uploader: &Uploader<S>) -> Result<()> {
        self.out.blank();
        self.out.print(Tone::Dim, "  Opening file picker...");

        let picked = match self.picker.pick_file() {
            Ok(picked) => picked,
            Err(e) if is_interrupt(&e) => return Err(e),
            Err(e) => {
                self.out.blank();
                self.out.print(Tone::Error, &format!("  Error: {:#}", e));
                return Ok(());
            }
        };
        let Some(path) = picked else {
            self.out.blank();
            self.out.print(Tone::Warning, "  File selection cancelled");
            return Ok(());
        };
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        self.out.print(
            Tone::Dim,
            &format!("  Selected: {} ({})", path.display(), human_size(size)),
        );
        self.out.blank();

        let suggested = default_key(&path);
        let key = if self
            .prompter
            .confirm("Customize S3 path? (default: media/filename)", false)?
        {
            self.prompter.input("S3 Key", Some(suggested.as_str()))?
        } else {
            suggested
        };

        self.out.blank();
        self.out.print(Tone::Info, &format!("  Uploading to: {}", key));

        let ok = uploader.upload_file(&path, Some(key.as_str()), &UploadOptions::default(), None);
        self.out.blank();
        if ok {
            self.out.print(Tone::Success, "  Upload completed successfully");
        } else {
            self.out.print(Tone::Error, "  Upload failed");
            self.out.print(Tone::Plain, "  Check the errors above for details");
        }
        Ok(())
    }

    fn upload_directory<S: ObjectStore>(&self, uploader: &Uploader<S>) -> Result<()> {
        let raw = self.prompter.input("Directory path", None)?;
        let dir = expand_home(&raw);
        if !dir.is_dir() {
            self.out.blank();
            self.out.print(
                Tone::Error,
                &format!("  Error: Directory not found: {}", dir.display()),
            );
            return Ok(());
        }

        let prefix = self
            .prompter
            .input("S3 prefix (folder path in bucket)", Some(""))?;

        self.out.blank();
        let (include, exclude) = if self.prompter.confirm("Apply file filters?", false)? {
            let include = self
                .prompter
                .input("Include patterns (e.g., *.txt,*.pdf)", Some(""))?;
            let exclude = self
                .prompter
                .input("Exclude patterns (e.g., *.tmp,*.log)", Some(""))?;
            (split_patterns(&include), split_patterns(&exclude))
        } else {
            (None, None)
        };

        self.out.blank();
        self.out.print(Tone::Dim, "  Uploading directory contents...");
        let (successful, failed) =
            uploader.upload_directory(&dir, &prefix, include.as_deref(), exclude.as_deref());

        self.out.blank();
        if failed == 0 {
            self.out.print(
                Tone::Success,
                &format!("  All files uploaded successfully ({} files)", successful),
            );
        } else {
            self.out.print(Tone::Warning, "  Upload completed with issues");
            self.out.print(Tone::Plain, &format!("  Successful: {}", successful));
            self.out.print(Tone::Plain, &format!("  Failed: {}", failed));
        }
        Ok(())
    }

    fn banner(&self) {
        let rule = "=".repeat(60);
        self.out.blank();
        self.out.print(Tone::Info, &rule);
        self.out.blank();
        self.out.print(Tone::Heading, "  AWS S3 FILE UPLOADER");
        self.out.print(Tone::Dim, "  Cloud storage made simple");
        self.out.blank();
        self.out.print(Tone::Info, &rule);
        self.out.blank();
    }

    fn goodbye(&self) {
        self.out.blank();
        self.out.print(Tone::Info, "  Goodbye!");
        self.out.blank();
    }
}

/// `media/<file name>`.
pub fn default_key(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}/{}", DEFAULT_FOLDER, name)
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw));
    }
    match (raw.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_key_lives_under_media() {
        assert_eq!(default_key(Path::new("/tmp/videos/clip.mp4")), "media/clip.mp4");
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/docs"), home.join("docs"));
            assert_eq!(expand_home("~"), home);
        }
        assert_eq!(expand_home(" /var/data "), PathBuf::from("/var/data"));
        assert_eq!(expand_home("rel/~x"), PathBuf::from("rel/~x"));
    }

    #[test]
    fn action_indices_follow_the_menu() {
        assert_eq!(Action::from_index(0), Action::Upload);
        assert_eq!(Action::from_index(1), Action::List);
        assert_eq!(Action::from_index(2), Action::Exit);
        assert_eq!(ACTIONS[Action::from_index(1) as usize].0, "list");
    }
}
