use std::fmt;

use log::debug;
use serde::Serialize;

use crate::{
    error::{ConvertError, Result},
    read::Container,
};

pub const DATASET_ROOT: &str = "DataSet";
pub const TIMEPOINT_PREFIX: &str = "TimePoint";
pub const DATA_NODE: &str = "Data";

/// Selects one channel dataset inside a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Coordinates {
    pub resolution_level: usize,
    pub timepoint: usize,
    pub channel: usize,
}

impl Coordinates {
    pub fn new(resolution_level: usize, timepoint: usize, channel: usize) -> Self {
        Self {
            resolution_level,
            timepoint,
            channel,
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resolution level {}, timepoint {}, channel {}",
            self.resolution_level, self.timepoint, self.channel
        )
    }
}

/// Builds the name of a timepoint node from its index, `None` when the naming
/// can't express that index.
pub type NameBuilder = fn(usize) -> Option<String>;

fn timepoint_compact(timepoint: usize) -> Option<String> {
    Some(format!("{TIMEPOINT_PREFIX}{timepoint}"))
}

fn timepoint_spaced(timepoint: usize) -> Option<String> {
    Some(format!("{TIMEPOINT_PREFIX} {timepoint}"))
}

/// Single-timepoint files may carry a bare `TimePoint` node. It only ever
/// stands for timepoint 0.
fn timepoint_bare(timepoint: usize) -> Option<String> {
    (timepoint == 0).then(|| TIMEPOINT_PREFIX.to_owned())
}

/// Known timepoint node namings, in probing order.
pub const TIMEPOINT_NAMINGS: [NameBuilder; 3] =
    [timepoint_compact, timepoint_spaced, timepoint_bare];

pub fn resolution_level_path(resolution_level: usize) -> String {
    format!("{DATASET_ROOT}/ResolutionLevel {resolution_level}")
}

pub fn channel_name(channel: usize) -> String {
    format!("Channel {channel}")
}

/// Resolved location of a channel dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPath {
    pub coordinates: Coordinates,
    /// Path of the timepoint group the dataset lives in
    pub timepoint_group: String,
    /// Full path of the `Data` dataset
    pub data: String,
}

impl fmt::Display for DatasetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.data)
    }
}

fn require<C: Container + ?Sized>(
    container: &C,
    path: &str,
    coordinates: Coordinates,
) -> Result<()> {
    if container.exists(path) {
        Ok(())
    } else {
        Err(ConvertError::NotFound {
            path: path.to_owned(),
            coordinates,
        })
    }
}

/// Find the timepoint group below `level_path`, trying each known naming.
pub fn resolve_timepoint<C: Container + ?Sized>(
    container: &C,
    level_path: &str,
    coordinates: Coordinates,
) -> Result<String> {
    let mut attempted = Vec::with_capacity(TIMEPOINT_NAMINGS.len());
    for naming in TIMEPOINT_NAMINGS {
        let Some(name) = naming(coordinates.timepoint) else {
            continue;
        };
        let candidate = format!("{level_path}/{name}");
        if container.exists(&candidate) {
            debug!("timepoint {} resolved to {candidate}", coordinates.timepoint);
            return Ok(candidate);
        }
        attempted.push(candidate);
    }

    let members = container.members(level_path)?;
    if !members.iter().any(|m| m.starts_with(TIMEPOINT_PREFIX)) {
        return Err(ConvertError::UnsupportedStructure(format!(
            "{level_path} has no {TIMEPOINT_PREFIX} nodes, found {members:?}"
        )));
    }

    Err(ConvertError::NotFound {
        path: attempted.join(" or "),
        coordinates,
    })
}

/// Resolve the `Data` dataset for `coordinates`. Only performs existence checks.
pub fn locate<C: Container + ?Sized>(container: &C, coordinates: Coordinates) -> Result<DatasetPath> {
    if !container.exists(DATASET_ROOT) {
        return Err(ConvertError::UnsupportedStructure(format!(
            "no {DATASET_ROOT} group, not an Imaris file"
        )));
    }

    let level_path = resolution_level_path(coordinates.resolution_level);
    require(container, &level_path, coordinates)?;

    let timepoint_group = resolve_timepoint(container, &level_path, coordinates)?;

    let channel_path = format!("{timepoint_group}/{}", channel_name(coordinates.channel));
    require(container, &channel_path, coordinates)?;

    let data = format!("{channel_path}/{DATA_NODE}");
    require(container, &data, coordinates)?;

    Ok(DatasetPath {
        coordinates,
        timepoint_group,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryContainer, planes};

    fn compact_container() -> MemoryContainer {
        MemoryContainer::new()
            .with_volume(
                "DataSet/ResolutionLevel 0/TimePoint0/Channel 0/Data",
                planes(&[1, 2], 2, 2),
            )
            .with_volume(
                "DataSet/ResolutionLevel 0/TimePoint1/Channel 0/Data",
                planes(&[3, 4], 2, 2),
            )
    }

    #[test]
    fn compact_naming_resolves_every_timepoint() {
        let container = compact_container();
        let t0 = locate(&container, Coordinates::new(0, 0, 0)).unwrap();
        let t1 = locate(&container, Coordinates::new(0, 1, 0)).unwrap();
        assert_eq!(t0.data, "DataSet/ResolutionLevel 0/TimePoint0/Channel 0/Data");
        assert_eq!(t1.data, "DataSet/ResolutionLevel 0/TimePoint1/Channel 0/Data");
        assert_eq!(t1.timepoint_group, "DataSet/ResolutionLevel 0/TimePoint1");
    }

    #[test]
    fn both_namings_return_the_same_data() {
        let volume = planes(&[0, 7, 9], 3, 2);
        let compact = MemoryContainer::new().with_volume(
            "DataSet/ResolutionLevel 0/TimePoint0/Channel 0/Data",
            volume.clone(),
        );
        let spaced = MemoryContainer::imaris(&[((0, 0, 0), volume)]);

        let a = locate(&compact, Coordinates::default()).unwrap();
        let b = locate(&spaced, Coordinates::default()).unwrap();
        assert_ne!(a.data, b.data);
        assert_eq!(
            compact.read_volume(&a.data).unwrap(),
            spaced.read_volume(&b.data).unwrap()
        );
    }

    #[test]
    fn missing_timepoint_is_not_found() {
        let container = compact_container();
        let err = locate(&container, Coordinates::new(0, 7, 0)).unwrap_err();
        match err {
            ConvertError::NotFound { path, coordinates } => {
                assert!(path.contains("TimePoint7"));
                assert!(path.contains("TimePoint 7"));
                assert_eq!(coordinates.timepoint, 7);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn missing_channel_reports_full_path() {
        let container = MemoryContainer::imaris(&[
            ((0, 0, 0), planes(&[1], 1, 1)),
            ((0, 0, 1), planes(&[1], 1, 1)),
        ]);
        let err = locate(&container, Coordinates::new(0, 0, 2)).unwrap_err();
        match err {
            ConvertError::NotFound { path, .. } => {
                assert_eq!(path, "DataSet/ResolutionLevel 0/TimePoint 0/Channel 2");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(
            err_message(&container, Coordinates::new(0, 0, 2))
                .contains("DataSet/ResolutionLevel 0/TimePoint 0/Channel 2")
        );
    }

    fn err_message(container: &MemoryContainer, coordinates: Coordinates) -> String {
        locate(container, coordinates).unwrap_err().to_string()
    }

    #[test]
    fn missing_resolution_level() {
        let container = MemoryContainer::imaris(&[((0, 0, 0), planes(&[1], 1, 1))]);
        let err = locate(&container, Coordinates::new(3, 0, 0)).unwrap_err();
        assert!(
            matches!(err, ConvertError::NotFound { ref path, .. } if path == "DataSet/ResolutionLevel 3")
        );
    }

    #[test]
    fn missing_data_node() {
        let container =
            MemoryContainer::new().with_group("DataSet/ResolutionLevel 0/TimePoint 0/Channel 0");
        let err = locate(&container, Coordinates::default()).unwrap_err();
        assert!(matches!(err, ConvertError::NotFound { ref path, .. } if path.ends_with("/Data")));
    }

    #[test]
    fn unknown_timepoint_layout_is_unsupported() {
        let container = MemoryContainer::new().with_volume(
            "DataSet/ResolutionLevel 0/Frame 0/Channel 0/Data",
            planes(&[1], 1, 1),
        );
        let err = locate(&container, Coordinates::default()).unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedStructure(_)));
    }

    #[test]
    fn not_an_imaris_file() {
        let container = MemoryContainer::new().with_group("entry");
        let err = locate(&container, Coordinates::default()).unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedStructure(_)));
    }

    #[test]
    fn bare_timepoint_node_is_timepoint_zero() {
        let container = MemoryContainer::new().with_volume(
            "DataSet/ResolutionLevel 0/TimePoint/Channel 0/Data",
            planes(&[4, 5], 2, 2),
        );
        let path = locate(&container, Coordinates::default()).unwrap();
        assert_eq!(path.data, "DataSet/ResolutionLevel 0/TimePoint/Channel 0/Data");
        assert_eq!(path.timepoint_group, "DataSet/ResolutionLevel 0/TimePoint");

        let err = locate(&container, Coordinates::new(0, 1, 0)).unwrap_err();
        match err {
            ConvertError::NotFound { path, .. } => {
                assert_eq!(
                    path,
                    "DataSet/ResolutionLevel 0/TimePoint1 or DataSet/ResolutionLevel 0/TimePoint 1"
                );
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn bare_naming_only_builds_index_zero() {
        assert_eq!(timepoint_bare(0).as_deref(), Some("TimePoint"));
        assert_eq!(timepoint_bare(3), None);
    }

    #[test]
    fn compact_naming_wins_when_both_exist() {
        let container = MemoryContainer::new()
            .with_volume(
                "DataSet/ResolutionLevel 0/TimePoint0/Channel 0/Data",
                planes(&[1], 1, 1),
            )
            .with_volume(
                "DataSet/ResolutionLevel 0/TimePoint 0/Channel 0/Data",
                planes(&[2], 1, 1),
            );
        let path = locate(&container, Coordinates::default()).unwrap();
        assert_eq!(path.timepoint_group, "DataSet/ResolutionLevel 0/TimePoint0");
    }
}
