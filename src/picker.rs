// File picker. The orchestrator only needs "give me a file or tell me the
// user gave up", so the picker is a trait with one method. `Browser` is a
// small terminal file-open dialog built on `dialoguer::Select`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;

pub trait FilePicker {
    /// `Ok(None)` means the user cancelled.
    fn pick_file(&self) -> Result<Option<PathBuf>>;
}

/// One row in the dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Parent,
    Dir(String),
    File(String),
}

impl Entry {
    fn label(&self) -> String {
        match self {
            Entry::Parent => "..".to_string(),
            Entry::Dir(name) => format!("{}/", name),
            Entry::File(name) => name.clone(),
        }
    }
}

/// Read `dir` for display: `..` first, then directories, then files, each
/// group sorted by name. An unreadable directory yields only `..`.
pub fn entries(dir: &Path) -> Vec<Entry> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    if let Ok(read) = fs::read_dir(dir) {
        for item in read.flatten() {
            let name = item.file_name().to_string_lossy().into_owned();
            // Follows symlinks so a link to a directory can be entered.
            match fs::metadata(item.path()) {
                Ok(meta) if meta.is_dir() => dirs.push(name),
                Ok(meta) if meta.is_file() => files.push(name),
                _ => {}
            }
        }
    }
    dirs.sort();
    files.sort();

    let mut out = Vec::with_capacity(dirs.len() + files.len() + 1);
    out.push(Entry::Parent);
    out.extend(dirs.into_iter().map(Entry::Dir));
    out.extend(files.into_iter().map(Entry::File));
    out
}

/// Terminal file-open dialog starting in `start`.
pub struct Browser {
    start: PathBuf,
    theme: ColorfulTheme,
}

impl Browser {
    pub fn new(start: impl Into<PathBuf>) -> Self {
        Browser {
            start: start.into(),
            theme: ColorfulTheme::default(),
        }
    }

    /// Starts in the process working directory.
    pub fn from_cwd() -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }
}

impl FilePicker for Browser {
    fn pick_file(&self) -> Result<Option<PathBuf>> {
        let mut dir = self.start.canonicalize().unwrap_or_else(|_| self.start.clone());
        loop {
            let items = entries(&dir);
            let labels: Vec<String> = items.iter().map(Entry::label).collect();
            // Esc / q returns None.
            let choice = Select::with_theme(&self.theme)
                .with_prompt(format!("Open file ({})  [Esc to cancel]", dir.display()))
                .items(&labels)
                .default(0)
                .interact_opt()?;

            let Some(index) = choice else {
                return Ok(None);
            };
            match &items[index] {
                Entry::Parent => {
                    if let Some(parent) = dir.parent() {
                        dir = parent.to_path_buf();
                    }
                }
                Entry::Dir(name) => dir.push(name),
                Entry::File(name) => return Ok(Some(dir.join(name))),
            }
        }
    }
}
