//! In-memory `Container` used by the unit tests.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array3;

use crate::{
    error::{ConvertError, Result},
    locate::Coordinates,
    read::Container,
    volume::{SampleType, Volume},
};

#[derive(Default)]
pub struct MemoryContainer {
    groups: BTreeSet<String>,
    datasets: BTreeMap<String, Volume>,
    attributes: BTreeMap<(String, String), String>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, path: &str) -> Self {
        let mut prefix = String::new();
        for component in path.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(component);
            self.groups.insert(prefix.clone());
        }
        self
    }

    pub fn with_volume(mut self, path: &str, volume: Volume) -> Self {
        if let Some((parent, _)) = path.rsplit_once('/') {
            self = self.with_group(parent);
        }
        self.datasets.insert(path.to_owned(), volume);
        self
    }

    pub fn with_attribute(mut self, path: &str, name: &str, value: &str) -> Self {
        self = self.with_group(path);
        self.attributes
            .insert((path.to_owned(), name.to_owned()), value.to_owned());
        self
    }

    /// Standard Imaris layout: `DataSet/ResolutionLevel r/TimePoint t/Channel c/Data`
    pub fn imaris(volumes: &[((usize, usize, usize), Volume)]) -> Self {
        volumes
            .iter()
            .fold(Self::new(), |container, ((r, t, c), volume)| {
                container.with_volume(
                    &format!("DataSet/ResolutionLevel {r}/TimePoint {t}/Channel {c}/Data"),
                    volume.clone(),
                )
            })
    }

    fn missing(path: &str) -> ConvertError {
        ConvertError::NotFound {
            path: path.to_owned(),
            coordinates: Coordinates::default(),
        }
    }
}

impl Container for MemoryContainer {
    fn exists(&self, path: &str) -> bool {
        self.groups.contains(path) || self.datasets.contains_key(path)
    }

    fn members(&self, path: &str) -> Result<Vec<String>> {
        if !self.groups.contains(path) {
            return Err(Self::missing(path));
        }
        let prefix = format!("{path}/");
        let children = self
            .groups
            .iter()
            .map(String::as_str)
            .chain(self.datasets.keys().map(String::as_str))
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_owned)
            .collect();
        Ok(children)
    }

    fn shape(&self, path: &str) -> Result<Vec<usize>> {
        let volume = self.datasets.get(path).ok_or_else(|| Self::missing(path))?;
        let (nz, ny, nx) = volume.dimensions();
        Ok(vec![nz, ny, nx])
    }

    fn sample_type(&self, path: &str) -> Result<SampleType> {
        self.datasets
            .get(path)
            .map(Volume::sample_type)
            .ok_or_else(|| Self::missing(path))
    }

    fn read_volume(&self, path: &str) -> Result<Volume> {
        self.datasets
            .get(path)
            .cloned()
            .ok_or_else(|| Self::missing(path))
    }

    fn attribute(&self, path: &str, name: &str) -> Option<String> {
        self.attributes
            .get(&(path.to_owned(), name.to_owned()))
            .cloned()
    }
}

/// u16 volume whose slice `z` is filled with `values[z]`.
pub fn planes(values: &[u16], ny: usize, nx: usize) -> Volume {
    Volume::U16(Array3::from_shape_fn((values.len(), ny, nx), |(z, _, _)| {
        values[z]
    }))
}
