use std::fmt;

use ndarray::{Array3, Axis, s};
use serde::Serialize;

use crate::error::{ConvertError, Result};

/// Numeric sample stored in an IMS channel dataset.
pub trait Sample: Copy + Send + Sync + PartialOrd + fmt::Debug + 'static {
    const TYPE: SampleType;

    fn to_f64(self) -> f64;
}

macro_rules! impl_sample {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl Sample for $t {
                const TYPE: SampleType = SampleType::$variant;

                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_sample!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    f32 => F32,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
}

impl SampleType {
    /// Pixel type name as used by the OME data model
    pub fn ome_name(self) -> &'static str {
        match self {
            SampleType::U8 => "uint8",
            SampleType::U16 => "uint16",
            SampleType::U32 => "uint32",
            SampleType::I8 => "int8",
            SampleType::I16 => "int16",
            SampleType::I32 => "int32",
            SampleType::F32 => "float",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ome_name())
    }
}

/// A Z × Y × X volume, keeping the sample type of the source dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Volume {
    U8(Array3<u8>),
    U16(Array3<u16>),
    U32(Array3<u32>),
    I8(Array3<i8>),
    I16(Array3<i16>),
    I32(Array3<i32>),
    F32(Array3<f32>),
}

/// Evaluate `$body` with `$arr` bound to the typed array inside a `Volume`.
macro_rules! with_volume {
    ($volume:expr, $arr:ident => $body:expr) => {
        match $volume {
            $crate::volume::Volume::U8($arr) => $body,
            $crate::volume::Volume::U16($arr) => $body,
            $crate::volume::Volume::U32($arr) => $body,
            $crate::volume::Volume::I8($arr) => $body,
            $crate::volume::Volume::I16($arr) => $body,
            $crate::volume::Volume::I32($arr) => $body,
            $crate::volume::Volume::F32($arr) => $body,
        }
    };
}

/// Like `with_volume!`, but wraps the resulting array back into the same variant.
macro_rules! map_volume {
    ($volume:expr, $arr:ident => $body:expr) => {
        match $volume {
            $crate::volume::Volume::U8($arr) => $crate::volume::Volume::U8($body),
            $crate::volume::Volume::U16($arr) => $crate::volume::Volume::U16($body),
            $crate::volume::Volume::U32($arr) => $crate::volume::Volume::U32($body),
            $crate::volume::Volume::I8($arr) => $crate::volume::Volume::I8($body),
            $crate::volume::Volume::I16($arr) => $crate::volume::Volume::I16($body),
            $crate::volume::Volume::I32($arr) => $crate::volume::Volume::I32($body),
            $crate::volume::Volume::F32($arr) => $crate::volume::Volume::F32($body),
        }
    };
}

pub(crate) use {map_volume, with_volume};

impl Volume {
    pub fn sample_type(&self) -> SampleType {
        match self {
            Volume::U8(_) => SampleType::U8,
            Volume::U16(_) => SampleType::U16,
            Volume::U32(_) => SampleType::U32,
            Volume::I8(_) => SampleType::I8,
            Volume::I16(_) => SampleType::I16,
            Volume::I32(_) => SampleType::I32,
            Volume::F32(_) => SampleType::F32,
        }
    }

    /// (nz, ny, nx)
    pub fn dimensions(&self) -> (usize, usize, usize) {
        with_volume!(self, arr => arr.dim())
    }

    pub fn depth(&self) -> usize {
        self.dimensions().0
    }

    /// Copy out a single Z plane as a one-slice volume.
    pub fn single_slice(&self, z: usize) -> Result<Volume> {
        let depth = self.depth();
        if z >= depth {
            return Err(ConvertError::SliceOutOfRange { z, depth });
        }
        Ok(map_volume!(self, arr => arr.slice(s![z..z + 1, .., ..]).to_owned()))
    }

    /// Minimum and maximum over all samples, `None` for an empty volume.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        with_volume!(self, arr => {
            arr.iter().fold(None, |acc: Option<(f64, f64)>, v| {
                let v = v.to_f64();
                Some(match acc {
                    None => (v, v),
                    Some((lo, hi)) => (lo.min(v), hi.max(v)),
                })
            })
        })
    }

    /// Maximum of each Z plane, in Z order.
    pub fn slice_maxima(&self) -> Vec<f64> {
        with_volume!(self, arr => {
            arr.axis_iter(Axis(0))
                .map(|plane| plane.iter().fold(f64::NEG_INFINITY, |m, v| m.max(v.to_f64())))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(nz: usize) -> Volume {
        Volume::U16(Array3::from_shape_fn((nz, 2, 3), |(z, y, x)| {
            (z * 100 + y * 10 + x) as u16
        }))
    }

    #[test]
    fn dimensions_are_zyx() {
        let volume = ramp(4);
        assert_eq!(volume.dimensions(), (4, 2, 3));
        assert_eq!(volume.depth(), 4);
        assert_eq!(volume.sample_type(), SampleType::U16);
    }

    #[test]
    fn single_slice_keeps_type_and_plane() {
        let volume = ramp(4);
        let plane = volume.single_slice(2).unwrap();
        assert_eq!(plane.dimensions(), (1, 2, 3));
        match plane {
            Volume::U16(arr) => assert_eq!(arr[[0, 1, 2]], 212),
            other => panic!("unexpected variant {:?}", other.sample_type()),
        }
    }

    #[test]
    fn single_slice_out_of_range() {
        let err = ramp(3).single_slice(3).unwrap_err();
        assert!(matches!(err, ConvertError::SliceOutOfRange { z: 3, depth: 3 }));
    }

    #[test]
    fn min_max_and_slice_maxima() {
        let volume = ramp(2);
        assert_eq!(volume.min_max(), Some((0.0, 112.0)));
        assert_eq!(volume.slice_maxima(), vec![12.0, 112.0]);
        let empty = Volume::I8(Array3::zeros((0, 2, 2)));
        assert_eq!(empty.min_max(), None);
    }

    #[test]
    fn ome_names() {
        assert_eq!(SampleType::U16.ome_name(), "uint16");
        assert_eq!(SampleType::F32.to_string(), "float");
    }
}
