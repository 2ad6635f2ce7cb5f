use std::fmt;

use log::debug;
use serde::Serialize;

use crate::{
    error::Result,
    locate::{
        Coordinates, DATASET_ROOT, TIMEPOINT_PREFIX, locate, resolution_level_path,
        resolve_timepoint,
    },
    read::Container,
    volume::SampleType,
};

const DATASET_INFO: &str = "DataSetInfo";
const IMAGE_INFO: &str = "DataSetInfo/Image";
const LEVEL_PREFIX: &str = "ResolutionLevel";
const CHANNEL_PREFIX: &str = "Channel";

/// Physical size of one voxel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoxelSize {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub unit: String,
}

impl Default for VoxelSize {
    fn default() -> Self {
        Self {
            x: 1.0,
            y: 1.0,
            z: 1.0,
            unit: "µm".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelInfo {
    pub level: usize,
    /// Stored (nz, ny, nx), including any chunk padding
    pub shape: Vec<usize>,
}

/// Structure of an IMS container, as far as the converter cares.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerInfo {
    pub resolution_levels: Vec<LevelInfo>,
    pub timepoints: usize,
    pub channels: usize,
    pub sample_type: Option<SampleType>,
    /// Image size (x, y, z) as recorded by the acquisition software
    pub image_size: Option<(usize, usize, usize)>,
    pub voxel_size: Option<VoxelSize>,
    pub channel_names: Vec<String>,
}

/// Parse a trailing index off names like `ResolutionLevel 3` or `TimePoint3`.
fn node_index(name: &str, prefix: &str) -> Option<usize> {
    name.strip_prefix(prefix)?.trim().parse().ok()
}

fn indexed_members<C: Container + ?Sized>(
    container: &C,
    path: &str,
    prefix: &str,
) -> Result<Vec<usize>> {
    let mut indices: Vec<usize> = container
        .members(path)?
        .iter()
        .filter_map(|name| node_index(name, prefix))
        .collect();
    indices.sort_unstable();
    Ok(indices)
}

fn numeric_attribute<C: Container + ?Sized>(container: &C, path: &str, name: &str) -> Option<f64> {
    container.attribute(path, name)?.trim().parse().ok()
}

/// Image size in voxels (x, y, z) from `DataSetInfo/Image`.
pub fn image_size<C: Container + ?Sized>(container: &C) -> Option<(usize, usize, usize)> {
    let get = |name: &str| -> Option<usize> { container.attribute(IMAGE_INFO, name)?.trim().parse().ok() };
    Some((get("X")?, get("Y")?, get("Z")?))
}

/// Voxel size from the image extents, if the container records them.
pub fn voxel_size<C: Container + ?Sized>(container: &C) -> Option<VoxelSize> {
    let (nx, ny, nz) = image_size(container)?;
    let extent = |axis: usize, n: usize| -> Option<f64> {
        let min = numeric_attribute(container, IMAGE_INFO, &format!("ExtMin{axis}"))?;
        let max = numeric_attribute(container, IMAGE_INFO, &format!("ExtMax{axis}"))?;
        (n > 0).then(|| (max - min).abs() / n as f64)
    };
    let unit = container
        .attribute(IMAGE_INFO, "Unit")
        .filter(|unit| !unit.trim().is_empty())
        .map(|unit| match unit.trim() {
            "um" => "µm".to_owned(),
            other => other.to_owned(),
        })
        .unwrap_or_else(|| VoxelSize::default().unit);
    Some(VoxelSize {
        x: extent(0, nx)?,
        y: extent(1, ny)?,
        z: extent(2, nz)?,
        unit,
    })
}

/// Display name of a channel, `Channel {c}` when none is recorded.
pub fn channel_display_name<C: Container + ?Sized>(container: &C, channel: usize) -> String {
    container
        .attribute(&format!("{DATASET_INFO}/Channel {channel}"), "Name")
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("Channel {channel}"))
}

/// Describe the container without reading any sample data.
pub fn inspect<C: Container + ?Sized>(container: &C) -> Result<ContainerInfo> {
    let first = locate(container, Coordinates::default())?;

    let mut resolution_levels = Vec::new();
    for level in indexed_members(container, DATASET_ROOT, LEVEL_PREFIX)? {
        let coordinates = Coordinates::new(level, 0, 0);
        match locate(container, coordinates) {
            Ok(path) => resolution_levels.push(LevelInfo {
                level,
                shape: container.shape(&path.data)?,
            }),
            Err(err) => debug!("skipping level {level}: {err}"),
        }
    }

    let level_path = resolution_level_path(0);
    let mut timepoints = indexed_members(container, &level_path, TIMEPOINT_PREFIX)?.len();
    if timepoints == 0 && container.exists(&format!("{level_path}/{TIMEPOINT_PREFIX}")) {
        timepoints = 1;
    }
    let timepoint_group = resolve_timepoint(container, &level_path, Coordinates::default())?;
    let channels = indexed_members(container, &timepoint_group, CHANNEL_PREFIX)?.len();

    let sample_type = container.sample_type(&first.data).ok();
    let channel_names = (0..channels)
        .map(|c| channel_display_name(container, c))
        .collect();

    Ok(ContainerInfo {
        resolution_levels,
        timepoints,
        channels,
        sample_type,
        image_size: image_size(container),
        voxel_size: voxel_size(container),
        channel_names,
    })
}

impl fmt::Display for ContainerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "resolution levels: {}", self.resolution_levels.len())?;
        for level in &self.resolution_levels {
            writeln!(f, "  level {}: {:?} (z, y, x)", level.level, level.shape)?;
        }
        writeln!(f, "timepoints: {}", self.timepoints)?;
        writeln!(f, "channels: {} {:?}", self.channels, self.channel_names)?;
        if let Some(sample_type) = self.sample_type {
            writeln!(f, "sample type: {sample_type}")?;
        }
        if let Some((x, y, z)) = self.image_size {
            writeln!(f, "image size: {x} x {y} x {z} (x, y, z)")?;
        }
        if let Some(voxel) = &self.voxel_size {
            writeln!(
                f,
                "voxel size: {} x {} x {} {}",
                voxel.x, voxel.y, voxel.z, voxel.unit
            )?;
        }
        Ok(())
    }
}
