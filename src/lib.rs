//! Convert Imaris `.ims` volumes into TIFF stacks, dropping empty Z slices
//! along the way.

pub mod batch;
pub mod common;
pub mod convert;
pub mod error;
pub mod filter;
pub mod locate;
pub mod metadata;
pub mod read;
pub mod volume;
pub mod write;

#[cfg(test)]
mod testing;

pub use batch::{BatchOptions, BatchSummary, convert_batch, discover};
pub use common::{ArgEndianess, ConvertOptions, ExportMode};
pub use convert::{ConversionReport, convert, convert_container};
pub use error::{ConvertError, Result};
pub use filter::{DEFAULT_SLICE_THRESHOLD, SliceReport, filter_empty_slices};
pub use locate::{Coordinates, DatasetPath, locate};
pub use metadata::{ContainerInfo, inspect};
pub use read::{Container, ImsFile};
pub use volume::{SampleType, Volume};
