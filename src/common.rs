use std::path::{Path, PathBuf};

use crate::{filter::DEFAULT_SLICE_THRESHOLD, locate::Coordinates};

#[derive(Debug, clap::ValueEnum, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgEndianess {
    Big,
    #[default]
    Native,
}

#[derive(Debug, clap::ValueEnum, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    /// One multi-page TIFF with the whole Z stack
    #[default]
    Stack,
    /// One single-page TIFF per Z slice
    Slices,
    /// Multi-page OME-TIFF with OME-XML metadata
    Ome,
    /// LZW compressed multi-page TIFF
    Compressed,
}

impl ExportMode {
    /// Default output location for `ims_path`, inside `dest_dir` when given,
    /// next to the input otherwise.
    pub fn default_output(self, ims_path: &Path, dest_dir: Option<&Path>) -> PathBuf {
        let stem = file_stem(ims_path);
        let name = match self {
            ExportMode::Stack | ExportMode::Compressed => format!("{stem}.tif"),
            ExportMode::Ome => format!("{stem}.ome.tif"),
            ExportMode::Slices => format!("{stem}_slices"),
        };
        let dir = dest_dir
            .map(Path::to_path_buf)
            .or_else(|| ims_path.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        dir.join(name)
    }
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_owned())
}

/// Options for converting a single `.ims` file.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub export_mode: ExportMode,
    pub coordinates: Coordinates,
    /// Drop slices whose samples are all at or below `slice_threshold`
    pub filter_empty: bool,
    pub slice_threshold: f64,
    /// Export only this Z slice (0-indexed); disables filtering
    pub z_slice: Option<usize>,
    /// Byte order of plain stack and slice output
    pub endianess: ArgEndianess,
    pub overwrite: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            export_mode: ExportMode::default(),
            coordinates: Coordinates::default(),
            filter_empty: true,
            slice_threshold: DEFAULT_SLICE_THRESHOLD,
            z_slice: None,
            endianess: ArgEndianess::default(),
            overwrite: false,
        }
    }
}
