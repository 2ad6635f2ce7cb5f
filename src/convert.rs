use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::Instant,
};

use indicatif::{MultiProgress, ParallelProgressIterator, ProgressBar};
use log::{debug, info, warn};
use ndarray::{ArrayView3, s};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tiff::encoder::TiffValue;

use crate::{
    common::{ArgEndianess, ConvertOptions, ExportMode, file_stem},
    error::Result,
    filter::filter_empty_slices,
    locate::locate,
    metadata::{channel_display_name, voxel_size},
    read::{Container, ImsFile},
    volume::{Volume, with_volume},
    write::{OmeDescription, TiffLayout, TiffSample, ome_xml, write_stack, write_volume},
};

/// What one conversion produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionReport {
    pub output: PathBuf,
    /// Internal path of the dataset that was read
    pub dataset: String,
    pub input_slices: usize,
    pub written_slices: usize,
    /// Original Z indices dropped as empty
    pub dropped: Vec<usize>,
}

pub fn is_ims_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ims"))
}

pub fn slice_file_name(name: &str, z: usize) -> String {
    format!("{name}_z{z:03}.tif")
}

pub fn convert(
    ims_path: &Path,
    dest_path: &Path, // file, or directory for ExportMode::Slices
    options: &ConvertOptions,
    multi_progress: &MultiProgress,
) -> Result<ConversionReport> {
    let t0 = Instant::now();

    if !is_ims_file(ims_path) {
        warn!("{ims_path:?} does not have an .ims extension, trying anyway");
    }

    let container = ImsFile::open(ims_path)?;
    let report = convert_container(
        &container,
        &file_stem(ims_path),
        dest_path,
        options,
        multi_progress,
    )?;

    info!("{:?} converted in {:?}", container.path(), t0.elapsed());

    Ok(report)
}

/// Keep the slices `options` asks for. Returns the volume to write, the
/// original Z index of each of its planes, and the dropped Z indices.
fn select_slices(
    volume: Volume,
    options: &ConvertOptions,
) -> Result<(Volume, Vec<usize>, Vec<usize>)> {
    let nz = volume.depth();

    if let Some(z) = options.z_slice {
        info!("extracting slice {z} of {nz}");
        return Ok((volume.single_slice(z)?, vec![z], Vec::new()));
    }

    if !options.filter_empty {
        return Ok((volume, (0..nz).collect(), Vec::new()));
    }

    debug!("slice maxima: {:?}", volume.slice_maxima());
    let (filtered, report) = filter_empty_slices(&volume, options.slice_threshold)?;
    info!(
        "{} slices, {} kept, {} empty (all samples <= {})",
        report.total(),
        report.kept_count(),
        report.dropped.len(),
        options.slice_threshold
    );
    if !report.dropped.is_empty() {
        info!("dropped slices: {:?}", report.dropped);
    }
    Ok((filtered, report.kept, report.dropped))
}

pub fn convert_container<C: Container + ?Sized>(
    container: &C,
    name: &str,
    dest_path: &Path,
    options: &ConvertOptions,
    multi_progress: &MultiProgress,
) -> Result<ConversionReport> {
    let dataset = locate(container, options.coordinates)?;
    let volume = container.read_volume(&dataset.data)?;

    let (nz, ny, nx) = volume.dimensions();
    info!("{dataset}: {nz}x{ny}x{nx}, {}", volume.sample_type());
    if let Some((min, max)) = volume.min_max() {
        debug!("value range: {min}..={max}");
    }

    let (volume, z_indices, dropped) = select_slices(volume, options)?;

    let mut layout = TiffLayout {
        endianess: options.endianess,
        overwrite: options.overwrite,
        ..TiffLayout::default()
    };
    match options.export_mode {
        ExportMode::Stack | ExportMode::Slices => {}
        ExportMode::Compressed => layout.compression = true,
        ExportMode::Ome => {
            layout.compression = true;
            let description = OmeDescription {
                name: name.to_owned(),
                channel_name: channel_display_name(container, options.coordinates.channel),
                sample_type: volume.sample_type(),
                dimensions: volume.dimensions(),
                voxel_size: voxel_size(container).unwrap_or_default(),
            };
            layout.description = Some(ome_xml(&description));
        }
    }
    if options.endianess == ArgEndianess::Big && layout.compression {
        warn!("big endian output can't be compressed, writing native endian instead");
        layout.endianess = ArgEndianess::Native;
    }

    let written_slices = if options.export_mode == ExportMode::Slices {
        fs::create_dir_all(dest_path)?;
        export_slices(&volume, &z_indices, dest_path, name, &layout, multi_progress)?
    } else {
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_volume(dest_path, &volume, &layout)?;
        volume.depth()
    };
    info!("wrote {written_slices} slices to {dest_path:?}");

    Ok(ConversionReport {
        output: dest_path.to_owned(),
        dataset: dataset.data,
        input_slices: nz,
        written_slices,
        dropped,
    })
}

fn export_slices(
    volume: &Volume,
    z_indices: &[usize],
    dest_dir: &Path,
    name: &str,
    layout: &TiffLayout,
    multi_progress: &MultiProgress,
) -> Result<usize> {
    with_volume!(volume, arr => write_slices(arr.view(), z_indices, dest_dir, name, layout, multi_progress))
}

/// One single-page TIFF per plane, named after the plane's original Z index.
fn write_slices<T: TiffSample>(
    volume: ArrayView3<'_, T>,
    z_indices: &[usize],
    dest_dir: &Path,
    name: &str,
    layout: &TiffLayout,
    multi_progress: &MultiProgress,
) -> Result<usize>
where
    [T]: TiffValue,
{
    let len = z_indices.len() as u64;
    let progress = multi_progress.add(ProgressBar::new(len));

    let done = AtomicUsize::new(0);

    let res: Result<Vec<()>> = (0..z_indices.len())
        .into_par_iter()
        .progress_with(progress.clone())
        .map(|i| -> Result<()> {
            let plane = volume.slice(s![i..i + 1, .., ..]);
            let out_path = dest_dir.join(slice_file_name(name, z_indices[i]));
            write_stack(&out_path, plane, layout)?;
            done.fetch_add(1, Ordering::SeqCst);
            debug!("created {out_path:?}");
            Ok(())
        })
        .collect();
    res?;

    progress.finish();
    multi_progress.remove(&progress);

    Ok(done.load(Ordering::SeqCst))
}
