use cellcache_core::{CellId, GridError};

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

/// Everything that can go wrong between a cell request and the tile that answers it.
///
/// The error is `Clone` because a single failed load is reported to every thread that was waiting on it.
#[derive(Clone, Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    #[error("{cell} has {actual} bytes on disk, expected {expected}")]
    TileSize {
        cell: CellId,
        expected: usize,
        actual: usize,
    },

    /// A failure reported by application loader code.
    #[error("loader failed: {0}")]
    Loader(#[source] Arc<dyn StdError + Send + Sync>),

    /// A failure reported by a removal callback, including one that panicked.
    #[error("remover failed: {0}")]
    Remover(#[source] Arc<dyn StdError + Send + Sync>),

    /// Loading a missing entry failed. Nothing was inserted and the load may be retried.
    #[error("load failed: {0}")]
    Load(#[source] Box<CacheError>),

    /// Writing an entry back during removal failed. The entry is still resident.
    #[error("write-back failed: {0}")]
    Store(#[source] Box<CacheError>),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0} is a placeholder and cannot be written")]
    PlaceholderWrite(CellId),

    #[error("the fetch queue has been closed")]
    SchedulerClosed,
}

impl CacheError {
    /// Wraps an arbitrary application error as a loader failure.
    pub fn loader(error: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        CacheError::Loader(Arc::from(error.into()))
    }

    /// Wraps an arbitrary application error as a remover failure.
    pub fn remover(error: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        CacheError::Remover(Arc::from(error.into()))
    }

    pub(crate) fn load(cause: CacheError) -> Self {
        match cause {
            already @ CacheError::Load(_) => already,
            other => CacheError::Load(Box::new(other)),
        }
    }

    pub(crate) fn store(cause: CacheError) -> Self {
        match cause {
            already @ CacheError::Store(_) => already,
            other => CacheError::Store(Box::new(other)),
        }
    }

    /// Returns `true` iff the error came from a failed load.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, CacheError::Load(_))
    }

    /// Returns `true` iff the error came from a failed write-back.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, CacheError::Store(_))
    }
}

impl From<io::Error> for CacheError {
    fn from(e: io::Error) -> Self {
        CacheError::Io(Arc::new(e))
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
