use std::path::{Path, PathBuf};

use hdf5::types::{FixedAscii, FloatSize, IntSize, TypeDescriptor, VarLenUnicode};
use log::debug;
use ndarray::Ix3;

use crate::{
    error::{ConvertError, Result},
    volume::{SampleType, Volume},
};

/// Read-only view of a hierarchical container, addressed by `/`-separated paths
/// relative to the file root.
pub trait Container {
    /// Whether a group or dataset exists at `path`. Never fails: a missing
    /// intermediate node simply means `false`.
    fn exists(&self, path: &str) -> bool;

    /// Names of the direct children of the group at `path`.
    fn members(&self, path: &str) -> Result<Vec<String>>;

    /// Shape of the dataset at `path`.
    fn shape(&self, path: &str) -> Result<Vec<usize>>;

    /// Sample type of the dataset at `path`.
    fn sample_type(&self, path: &str) -> Result<SampleType>;

    /// Read the 3D dataset at `path` into memory.
    fn read_volume(&self, path: &str) -> Result<Volume>;

    /// String attribute `name` on the node at `path`, if present and readable.
    fn attribute(&self, path: &str, name: &str) -> Option<String>;
}

/// An open Imaris `.ims` file. The HDF5 handle is released on drop.
pub struct ImsFile {
    file: hdf5::File,
    path: PathBuf,
}

impl ImsFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            hdf5::File::open(path).map_err(ConvertError::hdf5(path.display().to_string()))?;
        debug!("opened {path:?}");
        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn location(&self, path: &str) -> String {
        format!("{}:{path}", self.path.display())
    }

    fn dataset(&self, path: &str) -> Result<hdf5::Dataset> {
        self.file
            .dataset(path)
            .map_err(ConvertError::hdf5(self.location(path)))
    }
}

impl Container for ImsFile {
    fn exists(&self, path: &str) -> bool {
        // walk component by component, H5Lexists chokes on missing intermediates
        let Ok(mut group) = self.file.group("/") else {
            return false;
        };
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        while let Some(name) = components.next() {
            if !group.link_exists(name) {
                return false;
            }
            if components.peek().is_some() {
                match group.group(name) {
                    Ok(child) => group = child,
                    Err(_) => return false,
                }
            }
        }
        true
    }

    fn members(&self, path: &str) -> Result<Vec<String>> {
        let group = self
            .file
            .group(path)
            .map_err(ConvertError::hdf5(self.location(path)))?;
        group
            .member_names()
            .map_err(ConvertError::hdf5(self.location(path)))
    }

    fn shape(&self, path: &str) -> Result<Vec<usize>> {
        Ok(self.dataset(path)?.shape())
    }

    fn sample_type(&self, path: &str) -> Result<SampleType> {
        let descriptor = self
            .dataset(path)?
            .dtype()
            .and_then(|dtype| dtype.to_descriptor())
            .map_err(ConvertError::hdf5(self.location(path)))?;
        match descriptor {
            TypeDescriptor::Unsigned(IntSize::U1) => Ok(SampleType::U8),
            TypeDescriptor::Unsigned(IntSize::U2) => Ok(SampleType::U16),
            TypeDescriptor::Unsigned(IntSize::U4) => Ok(SampleType::U32),
            TypeDescriptor::Integer(IntSize::U1) => Ok(SampleType::I8),
            TypeDescriptor::Integer(IntSize::U2) => Ok(SampleType::I16),
            TypeDescriptor::Integer(IntSize::U4) => Ok(SampleType::I32),
            TypeDescriptor::Float(FloatSize::U4) => Ok(SampleType::F32),
            other => Err(ConvertError::UnsupportedStructure(format!(
                "{} has unsupported sample type {other:?}",
                self.location(path)
            ))),
        }
    }

    fn read_volume(&self, path: &str) -> Result<Volume> {
        let dataset = self.dataset(path)?;
        let shape = dataset.shape();
        if shape.len() != 3 {
            return Err(ConvertError::UnsupportedStructure(format!(
                "{} has shape {shape:?}, expected Z x Y x X",
                self.location(path)
            )));
        }

        let sample_type = self.sample_type(path)?;
        debug!("reading {path} {shape:?} as {sample_type}");

        let volume = match sample_type {
            SampleType::U8 => dataset.read::<u8, Ix3>().map(Volume::U8),
            SampleType::U16 => dataset.read::<u16, Ix3>().map(Volume::U16),
            SampleType::U32 => dataset.read::<u32, Ix3>().map(Volume::U32),
            SampleType::I8 => dataset.read::<i8, Ix3>().map(Volume::I8),
            SampleType::I16 => dataset.read::<i16, Ix3>().map(Volume::I16),
            SampleType::I32 => dataset.read::<i32, Ix3>().map(Volume::I32),
            SampleType::F32 => dataset.read::<f32, Ix3>().map(Volume::F32),
        };
        volume.map_err(ConvertError::hdf5(self.location(path)))
    }

    fn attribute(&self, path: &str, name: &str) -> Option<String> {
        let attr = if path.is_empty() {
            self.file.attr(name).ok()?
        } else {
            self.file.group(path).ok()?.attr(name).ok()?
        };
        // Imaris writes attributes as arrays of single characters
        if let Ok(chars) = attr.read_raw::<FixedAscii<1>>() {
            return Some(chars.iter().map(|c| c.as_str()).collect());
        }
        attr.read_scalar::<VarLenUnicode>()
            .ok()
            .map(|value| value.as_str().to_owned())
    }
}
