use std::path::PathBuf;
use thiserror::Error;

/// Failure scoped to a single record. The batch keeps going.
#[derive(Debug, Error)]
pub enum ShelfError {
    #[error("key={key} path={path}: cannot parse record: {message}")]
    Parse {
        key: String,
        path: PathBuf,
        message: String,
    },
    #[error("key={key} path={path}: {message}")]
    Precondition {
        key: String,
        path: PathBuf,
        message: String,
    },
    #[error("key={key} path={path}: {action} failed: {source}")]
    Io {
        key: String,
        path: PathBuf,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("key={key} path={path}: collides with {other}")]
    Collision {
        key: String,
        path: PathBuf,
        other: String,
    },
    #[error("key={key} path={path}: {action} link failed: {source}")]
    Link {
        key: String,
        path: PathBuf,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ShelfError {
    pub fn key(&self) -> &str {
        match self {
            Self::Parse { key, .. }
            | Self::Precondition { key, .. }
            | Self::Io { key, .. }
            | Self::Collision { key, .. }
            | Self::Link { key, .. } => key,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Parse { path, .. }
            | Self::Precondition { path, .. }
            | Self::Io { path, .. }
            | Self::Collision { path, .. }
            | Self::Link { path, .. } => path,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "RECORD_PARSE",
            Self::Precondition { .. } => "RECORD_PRECONDITION",
            Self::Io { .. } => "RECORD_IO",
            Self::Collision { .. } => "RECORD_COLLISION",
            Self::Link { .. } => "RECORD_LINK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShelfErrorCode {
    E001Locked,
    E002LibraryMissing,
    E003ConfigInvalid,
    E004CatalogCorrupt,
}

impl ShelfErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002LibraryMissing => "E002_LIBRARY_MISSING",
            Self::E003ConfigInvalid => "E003_CONFIG_INVALID",
            Self::E004CatalogCorrupt => "E004_CATALOG_CORRUPT",
        }
    }
}
