use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The serialized document does not conform to the COCO layout.
    #[error("COCO document failed validation: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The document is structurally inconsistent (dangling ids, zero-sized images, ...).
    #[error("inconsistent document: {0}")]
    Data(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A caller-supplied option or input value is out of its allowed range.
    #[error("invalid input: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to load image: {0}")]
    Image(#[from] image::ImageError),

    #[error("review backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Coarse classification of [`Error`] for callers that dispatch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Data,
    Io,
    Config,
    Backend,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Data(_) | Error::Json(_) => ErrorKind::Data,
            Error::Io { .. } | Error::Image(_) => ErrorKind::Io,
            Error::Config(_) => ErrorKind::Config,
            Error::Backend(_) => ErrorKind::Backend,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
