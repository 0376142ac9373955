use std::io;
use std::path::PathBuf;

use crate::naming::NameRule;

/// Rejected before a run starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no source folders configured")]
    NoFolders,
    #[error("invalid custom filename text {text:?}: {rule}")]
    InvalidCustomText { text: String, rule: NameRule },
    #[error("unknown filename tag {0:?}")]
    UnknownTag(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid boundary dataset {path}: {source}")]
    Dataset {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write geocode cache {path}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure of a single copy or move. Never aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TransferError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that end a run without a normal summary.
#[derive(Debug, thiserror::Error)]
pub enum OrganizeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Geo(#[from] GeoError),
    #[error("destination {destination} is inside source folder {source_folder}")]
    DestinationInsideSource {
        destination: PathBuf,
        source_folder: PathBuf,
    },
    #[error("worker thread panicked")]
    WorkerPanicked,
}
