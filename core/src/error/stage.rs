use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading stage definitions from disk.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("{path} is not a {ext} file")]
    NotAStageFile { path: PathBuf, ext: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse stage definition {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("stage definition {path} has an invalid stage id {id:?}")]
    InvalidId { path: PathBuf, id: String },

    #[error(transparent)]
    Merge(#[from] MergeError),
}

impl LoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Raised when two sources declare the same stage id with different definitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("stage '{id}' is defined differently in {first} and {second}")]
    Conflict {
        id: String,
        first: String,
        second: String,
    },
}
