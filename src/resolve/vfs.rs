//! Storage locations for mirrored secret and key stores

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::StoragePathResolver;
use crate::{Error, Result};

/// A concrete storage location
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum StoragePath {
    /// Amazon S3 object prefix
    S3 {
        /// Bucket name
        bucket: String,
        /// Key prefix within the bucket (may be empty)
        key: String,
    },
    /// Google Cloud Storage object prefix
    Gcs {
        /// Bucket name
        bucket: String,
        /// Object prefix within the bucket (may be empty)
        key: String,
    },
    /// OpenStack Swift object prefix
    Swift {
        /// Container name
        container: String,
        /// Object prefix within the container (may be empty)
        key: String,
    },
    /// In-memory filesystem, used by tests and dry runs
    Memfs {
        /// Filesystem name
        name: String,
        /// Path within the filesystem (may be empty)
        key: String,
    },
    /// Local filesystem directory (absolute)
    File(PathBuf),
}

impl StoragePath {
    /// S3 location
    pub fn s3(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::S3 {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// GCS location
    pub fn gcs(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Gcs {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// In-memory location
    pub fn memfs(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Memfs {
            name: name.into(),
            key: key.into(),
        }
    }

    /// Local filesystem location
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// URL scheme of this location
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::S3 { .. } => "s3",
            Self::Gcs { .. } => "gs",
            Self::Swift { .. } => "swift",
            Self::Memfs { .. } => "memfs",
            Self::File(_) => "file",
        }
    }
}

impl std::fmt::Display for StoragePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (root, key) = match self {
            Self::File(path) => return write!(f, "{}", path.display()),
            Self::S3 { bucket, key } | Self::Gcs { bucket, key } => (bucket, key),
            Self::Swift { container, key } => (container, key),
            Self::Memfs { name, key } => (name, key),
        };
        if key.is_empty() {
            write!(f, "{}://{}", self.scheme(), root)
        } else {
            write!(f, "{}://{}/{}", self.scheme(), root, key)
        }
    }
}

fn split_root(location: &str, rest: &str) -> Result<(String, String)> {
    let (root, key) = rest.split_once('/').unwrap_or((rest, ""));
    if root.is_empty() {
        return Err(Error::resolution(
            location,
            "missing bucket or container name",
        ));
    }
    Ok((root.to_string(), key.trim_matches('/').to_string()))
}

impl FromStr for StoragePath {
    type Err = Error;

    fn from_str(location: &str) -> Result<Self> {
        let trimmed = location.trim();
        if trimmed.is_empty() {
            return Err(Error::resolution("storage path", "location is empty"));
        }

        if trimmed.starts_with('/') {
            return Ok(Self::File(PathBuf::from(trimmed)));
        }

        let (scheme, rest) = trimmed.split_once("://").ok_or_else(|| {
            Error::resolution(location, "expected an absolute path or a scheme:// URL")
        })?;

        match scheme.to_lowercase().as_str() {
            "file" => {
                let path = Path::new(rest);
                if !path.is_absolute() {
                    return Err(Error::resolution(location, "file paths must be absolute"));
                }
                Ok(Self::File(path.to_path_buf()))
            }
            "s3" => split_root(location, rest).map(|(bucket, key)| Self::S3 { bucket, key }),
            "gs" => split_root(location, rest).map(|(bucket, key)| Self::Gcs { bucket, key }),
            "swift" => {
                split_root(location, rest).map(|(container, key)| Self::Swift { container, key })
            }
            "memfs" => split_root(location, rest).map(|(name, key)| Self::Memfs { name, key }),
            other => Err(Error::resolution(
                location,
                format!("unknown storage scheme {other:?}, expected one of: s3, gs, swift, memfs, file"),
            )),
        }
    }
}

impl TryFrom<String> for StoragePath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<StoragePath> for String {
    fn from(path: StoragePath) -> Self {
        path.to_string()
    }
}

/// Resolves store locations by URL scheme
#[derive(Clone, Copy, Debug, Default)]
pub struct VfsContext;

impl VfsContext {
    /// Create a resolver
    pub fn new() -> Self {
        Self
    }
}

impl StoragePathResolver for VfsContext {
    fn resolve(&self, location: &str) -> Result<StoragePath> {
        location.parse()
    }
}
