use ndarray::{ArrayView2, ArrayView3, Axis};

use crate::{
    error::{ConvertError, Result},
    volume::{Sample, Volume, map_volume, with_volume},
};

/// Slices whose samples are all at or below this value are dropped by default,
/// i.e. only fully blank planes.
pub const DEFAULT_SLICE_THRESHOLD: f64 = 0.0;

/// Which Z planes of a volume were classified empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceReport {
    /// One flag per original Z index, `true` when the slice is empty
    pub empty: Vec<bool>,
    /// Original Z indices of the retained slices, ascending
    pub kept: Vec<usize>,
    /// Original Z indices of the dropped slices, ascending
    pub dropped: Vec<usize>,
}

impl SliceReport {
    pub fn from_flags(empty: Vec<bool>) -> Self {
        let (dropped, kept): (Vec<usize>, Vec<usize>) =
            (0..empty.len()).partition(|&z| empty[z]);
        Self {
            empty,
            kept,
            dropped,
        }
    }

    pub fn total(&self) -> usize {
        self.empty.len()
    }

    pub fn kept_count(&self) -> usize {
        self.kept.len()
    }
}

/// A slice is empty when no sample exceeds `threshold`.
pub fn is_empty_slice<T: Sample>(slice: ArrayView2<'_, T>, threshold: f64) -> bool {
    slice.iter().all(|&v| v.to_f64() <= threshold)
}

pub fn classify_slices<T: Sample>(volume: ArrayView3<'_, T>, threshold: f64) -> Vec<bool> {
    volume
        .axis_iter(Axis(0))
        .map(|slice| is_empty_slice(slice, threshold))
        .collect()
}

pub fn check_threshold(threshold: f64) -> Result<()> {
    if threshold.is_finite() && threshold >= 0.0 {
        Ok(())
    } else {
        Err(ConvertError::InvalidThreshold(threshold))
    }
}

/// Classify every Z plane of `volume` without copying anything.
pub fn slice_report(volume: &Volume, threshold: f64) -> Result<SliceReport> {
    check_threshold(threshold)?;
    let empty = with_volume!(volume, arr => classify_slices(arr.view(), threshold));
    Ok(SliceReport::from_flags(empty))
}

/// Drop the empty Z planes of `volume`, re-packing the remaining ones densely
/// in their original order.
///
/// Fails with [`ConvertError::AllSlicesEmpty`] rather than returning a volume
/// without slices.
pub fn filter_empty_slices(volume: &Volume, threshold: f64) -> Result<(Volume, SliceReport)> {
    let report = slice_report(volume, threshold)?;
    if report.kept.is_empty() {
        return Err(ConvertError::AllSlicesEmpty {
            slices: report.total(),
            threshold,
        });
    }
    let filtered = map_volume!(volume, arr => arr.select(Axis(0), &report.kept));
    Ok((filtered, report))
}

#[cfg(test)]
mod tests {
    use ndarray::{Array3, s};

    use super::*;
    use crate::testing::planes;

    #[test]
    fn drops_zero_slices_in_order() {
        let mut values = [5u16; 10];
        for z in [2, 5, 9] {
            values[z] = 0;
        }
        // make every retained plane distinguishable
        for (z, v) in values.iter_mut().enumerate() {
            if *v != 0 {
                *v = 10 + z as u16;
            }
        }
        let volume = planes(&values, 3, 4);

        let (filtered, report) = filter_empty_slices(&volume, 0.0).unwrap();
        assert_eq!(filtered.dimensions(), (7, 3, 4));
        assert_eq!(report.dropped, vec![2, 5, 9]);
        assert_eq!(report.kept, vec![0, 1, 3, 4, 6, 7, 8]);
        assert_eq!(report.kept_count(), 7);

        let Volume::U16(arr) = filtered else {
            panic!("sample type changed");
        };
        let firsts: Vec<u16> = (0..7).map(|z| arr[[z, 0, 0]]).collect();
        assert_eq!(firsts, vec![10, 11, 13, 14, 16, 17, 18]);
    }

    #[test]
    fn filtering_is_idempotent() {
        let volume = planes(&[0, 3, 0, 1, 2, 0], 2, 2);
        let (once, _) = filter_empty_slices(&volume, 1.0).unwrap();
        let (twice, report) = filter_empty_slices(&once, 1.0).unwrap();
        assert_eq!(once, twice);
        assert!(report.dropped.is_empty());
    }

    #[test]
    fn kept_and_dropped_partition_the_range() {
        let volume = planes(&[0, 9, 0, 0, 4, 8, 0, 1], 1, 3);
        let (_, report) = filter_empty_slices(&volume, 0.0).unwrap();
        let mut all: Vec<usize> = report.kept.iter().chain(&report.dropped).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..8).collect::<Vec<_>>());
        for z in 0..8 {
            assert_eq!(report.empty[z], report.dropped.contains(&z));
        }
    }

    #[test]
    fn all_empty_is_an_error() {
        let volume = planes(&[0, 0, 0], 4, 4);
        let err = filter_empty_slices(&volume, 0.0).unwrap_err();
        assert!(matches!(err, ConvertError::AllSlicesEmpty { slices: 3, .. }));
    }

    #[test]
    fn zero_depth_volume_is_all_empty() {
        let volume = Volume::U8(Array3::zeros((0, 4, 4)));
        assert!(matches!(
            filter_empty_slices(&volume, 0.0),
            Err(ConvertError::AllSlicesEmpty { slices: 0, .. })
        ));
    }

    #[test]
    fn threshold_is_inclusive() {
        let volume = planes(&[10, 11], 2, 2);
        let (_, report) = filter_empty_slices(&volume, 10.0).unwrap();
        assert_eq!(report.dropped, vec![0]);
    }

    #[test]
    fn single_bright_pixel_keeps_a_slice() {
        let mut arr = Array3::<u16>::zeros((3, 8, 8));
        arr[[1, 7, 7]] = 1;
        let (filtered, report) = filter_empty_slices(&Volume::U16(arr), 0.0).unwrap();
        assert_eq!(report.kept, vec![1]);
        assert_eq!(filtered.depth(), 1);
    }

    #[test]
    fn signed_samples_below_threshold_are_empty() {
        let mut arr = Array3::<i16>::from_elem((3, 2, 2), -40);
        arr.slice_mut(s![2, .., ..]).fill(3);
        let (_, report) = filter_empty_slices(&Volume::I16(arr), 0.0).unwrap();
        assert_eq!(report.dropped, vec![0, 1]);
    }

    #[test]
    fn nan_is_never_empty() {
        let mut arr = Array3::<f32>::zeros((2, 2, 2));
        arr[[0, 0, 0]] = f32::NAN;
        let (_, report) = filter_empty_slices(&Volume::F32(arr), 0.0).unwrap();
        assert_eq!(report.kept, vec![0]);
    }

    #[test]
    fn rejects_bad_thresholds() {
        let volume = planes(&[1], 1, 1);
        for t in [-1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                filter_empty_slices(&volume, t),
                Err(ConvertError::InvalidThreshold(_))
            ));
        }
    }

    #[test]
    fn deterministic() {
        let volume = planes(&[0, 2, 0, 2, 2, 0, 0, 3], 5, 5);
        let a = filter_empty_slices(&volume, 0.0).unwrap();
        let b = filter_empty_slices(&volume, 0.0).unwrap();
        assert_eq!(a, b);
    }
}
