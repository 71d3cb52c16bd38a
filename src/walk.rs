// Directory selection for batch uploads: walk the tree, apply include and
// exclude globs, and derive each object key from the relative path.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::UploadError;

/// A file picked for upload along with its path relative to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    pub path: PathBuf,
    /// Forward-slash separated, no leading slash.
    pub relative: String,
}

/// Include/exclude globs. A pattern matches a file when it matches either
/// the relative path or the bare file name, so `*.txt` hits files at any
/// depth.
#[derive(Debug, Clone)]
pub struct Filter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl Filter {
    pub fn new(include: Option<&[String]>, exclude: Option<&[String]>) -> Result<Self, UploadError> {
        Ok(Filter {
            include: build_set(include)?,
            exclude: build_set(exclude)?,
        })
    }

    pub fn accepts(&self, relative: &str) -> bool {
        let name = relative.rsplit('/').next().unwrap_or(relative);
        let hit = |set: &GlobSet| set.is_match(relative) || set.is_match(name);
        let included = self.include.as_ref().map_or(true, hit);
        let excluded = self.exclude.as_ref().map_or(false, hit);
        included && !excluded
    }
}

fn build_set(patterns: Option<&[String]>) -> Result<Option<GlobSet>, UploadError> {
    let Some(patterns) = patterns.filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| UploadError::validation(format!("Invalid pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| UploadError::validation(format!("Invalid patterns: {}", e)))
}

/// Every regular file under `root` accepted by `filter`, sorted by path.
/// Symlinks are not followed; unreadable entries are skipped.
pub fn collect(root: &Path, filter: &Filter) -> Vec<Selected> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let relative = relative_key(root, e.path())?;
            filter.accepts(&relative).then(|| Selected {
                path: e.into_path(),
                relative,
            })
        })
        .collect()
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(normalize(&rel.to_string_lossy()))
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Join `prefix` and `relative` into an object key: forward slashes only,
/// no leading slash, no doubled slash at the join.
pub fn object_key(prefix: &str, relative: &str) -> String {
    let prefix = normalize(prefix);
    let relative = normalize(relative);
    let prefix = prefix.trim_matches('/');
    let relative = relative.trim_start_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}
