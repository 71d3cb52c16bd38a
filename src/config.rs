// Bucket configuration: read once at startup from the environment (after
// loading any `.env` files), with prompts for whatever is missing.

use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::error::AppError;
use crate::output::{Output, Tone};
use crate::prompt::Prompter;

pub const BUCKET_VAR: &str = "AWS_S3_BUCKET_NAME";
pub const REGION_VAR: &str = "AWS_REGION";
pub const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";

/// Offered when `AWS_REGION` is unset.
pub const DEFAULT_REGION: &str = "eu-central-1";

/// Explicit key pair from the environment. Without one the SDK's default
/// credential chain is used.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketConfig {
    pub bucket: String,
    pub region: String,
    pub credentials: Option<StaticCredentials>,
}

/// Environment lookup that treats empty values as unset.
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load `.env` from the working directory, then the per-user one from
/// `<config dir>/s3-uploader/.env`. Variables already set are not
/// overwritten. Returns the files that were loaded.
pub fn load_env_files() -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    if let Ok(path) = dotenvy::dotenv() {
        loaded.push(path);
    }
    if let Some(path) = user_env_file() {
        if path.is_file() && dotenvy::from_path(&path).is_ok() {
            loaded.push(path);
        }
    }
    for path in &loaded {
        debug!(path = %path.display(), "loaded environment file");
    }
    loaded
}

fn user_env_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("s3-uploader").join(".env"))
}

impl BucketConfig {
    /// Resolve the configuration, prompting for the bucket and region when
    /// the environment does not provide them, and print the result.
    pub fn resolve(
        env: &dyn Fn(&str) -> Option<String>,
        prompter: &dyn Prompter,
        out: &dyn Output,
    ) -> Result<BucketConfig, AppError> {
        let bucket = match env(BUCKET_VAR) {
            Some(b) => b,
            None => {
                section(out, "Configuration Required");
                out.print(Tone::Warning, &format!("  {} not set in environment", BUCKET_VAR));
                out.blank();
                prompter.input("Bucket Name", None)?
            }
        };
        let bucket = bucket.trim().to_string();
        if bucket.is_empty() {
            out.blank();
            out.print(Tone::Error, "  Error: Bucket name is required");
            out.blank();
            return Err(AppError::MissingBucket);
        }

        let region = match env(REGION_VAR) {
            Some(r) => r,
            None => prompter.input("AWS Region", Some(DEFAULT_REGION))?,
        };
        let region = match region.trim() {
            "" => DEFAULT_REGION.to_string(),
            r => r.to_string(),
        };

        let credentials = match (env(ACCESS_KEY_VAR), env(SECRET_KEY_VAR)) {
            (Some(access_key_id), Some(secret_access_key)) => Some(StaticCredentials {
                access_key_id,
                secret_access_key,
            }),
            _ => None,
        };

        let config = BucketConfig {
            bucket,
            region,
            credentials,
        };
        config.show(out);
        Ok(config)
    }

    fn show(&self, out: &dyn Output) {
        section(out, "Configuration");
        out.table(&[("Bucket", self.bucket.as_str()), ("Region", self.region.as_str())]);
        out.blank();
    }
}

/// Section header used across the interactive screens.
pub(crate) fn section(out: &dyn Output, title: &str) {
    out.blank();
    out.print(Tone::Heading, &format!("  {}", title));
    out.print(Tone::Dim, &format!("  {}", "-".repeat(50)));
}
