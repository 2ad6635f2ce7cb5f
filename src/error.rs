use std::path::PathBuf;

use thiserror::Error;

use crate::locate::Coordinates;

pub type Result<T> = std::result::Result<T, ConvertError>;

#[derive(Debug, Error)]
pub enum ConvertError {
    /// A node below `DataSet` is missing
    #[error("{path} not found for {coordinates}")]
    NotFound {
        path: String,
        coordinates: Coordinates,
    },

    /// Filtering would leave a stack without any slices
    #[error("all {slices} slices are empty at threshold {threshold}")]
    AllSlicesEmpty { slices: usize, threshold: f64 },

    #[error("unsupported container structure: {0}")]
    UnsupportedStructure(String),

    #[error("slice {z} out of range, volume has {depth} slices")]
    SliceOutOfRange { z: usize, depth: usize },

    #[error("invalid slice threshold {0}, expected a finite value >= 0")]
    InvalidThreshold(f64),

    #[error("output {0:?} already exists")]
    OutputExists(PathBuf),

    /// Two batch inputs would write the same output
    #[error("output {output:?} is already claimed by {claimed_by:?}")]
    OutputCollision { output: PathBuf, claimed_by: PathBuf },

    #[error("HDF5 failure at {path}: {source}")]
    Hdf5 {
        path: String,
        #[source]
        source: hdf5::Error,
    },

    #[error("TIFF encode failure: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl ConvertError {
    pub(crate) fn hdf5(path: impl Into<String>) -> impl FnOnce(hdf5::Error) -> Self {
        let path = path.into();
        move |source| ConvertError::Hdf5 { path, source }
    }

    /// Structural errors describe the file itself; retrying them is pointless.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ConvertError::NotFound { .. }
                | ConvertError::AllSlicesEmpty { .. }
                | ConvertError::UnsupportedStructure(_)
                | ConvertError::SliceOutOfRange { .. }
                | ConvertError::OutputCollision { .. }
        )
    }
}
