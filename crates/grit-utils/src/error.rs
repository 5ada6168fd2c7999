use std::path::PathBuf;

/// Base error type for grit-utils operations.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error("unable to persist temporary file to '{path}': {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
