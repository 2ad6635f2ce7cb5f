use std::{
    borrow::Cow,
    fs::File,
    io::{self, BufWriter},
    path::Path,
};

use byteorder::{BigEndian, WriteBytesExt};
use ndarray::{ArrayView2, ArrayView3, Axis};
use tiff::{
    encoder::{Compression, Predictor, TiffEncoder, TiffValue, colortype},
    tags::Tag,
};
use tiff_encoder::{
    LONG, RATIONAL, SHORT, TiffFile,
    ifd::{Ifd, IfdChain, tags},
    write::{ByteBlock, Endianness},
};

use crate::{
    common::ArgEndianess,
    error::{ConvertError, Result},
    metadata::VoxelSize,
    volume::{Sample, SampleType, Volume, with_volume},
};

/// Sample types we know how to put into a TIFF page.
pub trait TiffSample: Sample {
    type Color: colortype::ColorType<Inner = Self>;
    /// TIFF `SampleFormat`: 1 unsigned, 2 signed, 3 float
    const SAMPLE_FORMAT: u16;
    /// The tiff crate only implements horizontal differencing for integers
    const PREDICTABLE: bool;

    fn write_be(value: Self, out: &mut Vec<u8>) -> io::Result<()>;
}

macro_rules! impl_tiff_sample {
    ($t:ty, $color:ident, $format:expr, $predict:expr, |$v:ident, $out:ident| $write:expr) => {
        impl TiffSample for $t {
            type Color = colortype::$color;
            const SAMPLE_FORMAT: u16 = $format;
            const PREDICTABLE: bool = $predict;

            fn write_be($v: Self, $out: &mut Vec<u8>) -> io::Result<()> {
                $write
            }
        }
    };
}

impl_tiff_sample!(u8, Gray8, 1, true, |v, out| out.write_u8(v));
impl_tiff_sample!(u16, Gray16, 1, true, |v, out| out.write_u16::<BigEndian>(v));
impl_tiff_sample!(u32, Gray32, 1, true, |v, out| out.write_u32::<BigEndian>(v));
impl_tiff_sample!(i8, GrayI8, 2, true, |v, out| out.write_i8(v));
impl_tiff_sample!(i16, GrayI16, 2, true, |v, out| out.write_i16::<BigEndian>(v));
impl_tiff_sample!(i32, GrayI32, 2, true, |v, out| out.write_i32::<BigEndian>(v));
impl_tiff_sample!(f32, Gray32Float, 3, false, |v, out| out.write_f32::<BigEndian>(v));

/// How pages end up on disk.
#[derive(Debug, Clone, Default)]
pub struct TiffLayout {
    pub endianess: ArgEndianess,
    /// LZW, plus horizontal prediction for integer samples
    pub compression: bool,
    /// Written as `ImageDescription` of the first page
    pub description: Option<String>,
    pub overwrite: bool,
}

impl TiffLayout {
    /// Big endian output goes through `tiff-encoder`, which can't compress
    /// or carry a description.
    fn big_endian(&self) -> bool {
        self.endianess == ArgEndianess::Big && !self.compression && self.description.is_none()
    }
}

fn create_output(path: &Path, overwrite: bool) -> Result<File> {
    let file = if overwrite {
        File::create(path)
    } else {
        File::create_new(path)
    };
    file.map_err(|err| match err.kind() {
        io::ErrorKind::AlreadyExists => ConvertError::OutputExists(path.to_owned()),
        _ => ConvertError::Io(err),
    })
}

fn plane_samples<'a, T: Copy>(plane: ArrayView2<'a, T>) -> Cow<'a, [T]> {
    match plane.to_slice() {
        Some(samples) => Cow::Borrowed(samples),
        None => Cow::Owned(plane.iter().copied().collect()),
    }
}

/// Write every Z plane of `volume` as one page of `filename`.
pub fn write_stack<T: TiffSample>(
    filename: &Path,
    volume: ArrayView3<'_, T>,
    layout: &TiffLayout,
) -> Result<()>
where
    [T]: TiffValue,
{
    if volume.len_of(Axis(0)) == 0 {
        return Err(ConvertError::UnsupportedStructure(format!(
            "refusing to write {filename:?} without any slices"
        )));
    }
    if layout.big_endian() {
        write_tiff_big_endian(filename, volume, layout.overwrite)
    } else {
        write_tiff_native_endian(filename, volume, layout)
    }
}

pub fn write_tiff_native_endian<T: TiffSample>(
    filename: &Path,
    volume: ArrayView3<'_, T>,
    layout: &TiffLayout,
) -> Result<()>
where
    [T]: TiffValue,
{
    let (_, ny, nx) = volume.dim();
    let out_file = create_output(filename, layout.overwrite)?;
    let mut tiff = TiffEncoder::new(BufWriter::new(out_file))?;
    if layout.compression {
        tiff = tiff.with_compression(Compression::Lzw);
        if T::PREDICTABLE {
            tiff = tiff.with_predictor(Predictor::Horizontal);
        }
    }

    for (z, plane) in volume.axis_iter(Axis(0)).enumerate() {
        let samples = plane_samples(plane);
        let mut image = tiff.new_image::<T::Color>(nx as u32, ny as u32)?;
        if z == 0
            && let Some(description) = &layout.description
        {
            image
                .encoder()
                .write_tag(Tag::ImageDescription, description.as_str())?;
        }
        image.write_data(&samples)?;
    }
    Ok(())
}

fn big_endian_ifd<T: TiffSample>(plane: ArrayView2<'_, T>) -> Result<Ifd> {
    let (height, width) = plane.dim();
    let mut image_bytes: Vec<u8> = Vec::with_capacity(width * height * size_of::<T>());
    for value in plane.iter() {
        T::write_be(*value, &mut image_bytes)?;
    }
    let bits = (size_of::<T>() * 8) as u16;

    Ok(Ifd::new()
        .with_entry(tags::PhotometricInterpretation, SHORT![1]) // Black is zero
        .with_entry(tags::Compression, SHORT![1]) // No compression

        .with_entry(tags::BitsPerSample, SHORT![bits])
        .with_entry(tags::SamplesPerPixel, SHORT![1])
        .with_entry(tags::SampleFormat, SHORT![T::SAMPLE_FORMAT])

        .with_entry(tags::ImageLength, LONG![height as u32])
        .with_entry(tags::ImageWidth, LONG![width as u32])

        .with_entry(tags::ResolutionUnit, SHORT![1]) // No resolution unit
        .with_entry(tags::XResolution, RATIONAL![(1, 1)])
        .with_entry(tags::YResolution, RATIONAL![(1, 1)])

        .with_entry(tags::RowsPerStrip, LONG![height as u32]) // One strip for the whole image
        .with_entry(tags::StripByteCounts, LONG![image_bytes.len() as u32])
        .with_entry(tags::StripOffsets, ByteBlock::single(image_bytes)))
}

pub fn write_tiff_big_endian<T: TiffSample>(
    filename: &Path,
    volume: ArrayView3<'_, T>,
    overwrite: bool,
) -> Result<()> {
    if !overwrite && filename.exists() {
        return Err(ConvertError::OutputExists(filename.to_owned()));
    }
    let ifds = volume
        .axis_iter(Axis(0))
        .map(big_endian_ifd)
        .collect::<Result<Vec<Ifd>>>()?;

    TiffFile::new(IfdChain::new(ifds))
        .with_endianness(Endianness::MM)
        .write_to(filename)?;

    Ok(())
}

/// Write a whole volume, whatever its sample type.
pub fn write_volume(filename: &Path, volume: &Volume, layout: &TiffLayout) -> Result<()> {
    with_volume!(volume, arr => write_stack(filename, arr.view(), layout))
}

/// Everything the OME-XML header describes.
#[derive(Debug, Clone)]
pub struct OmeDescription {
    pub name: String,
    pub channel_name: String,
    pub sample_type: SampleType,
    /// (nz, ny, nx)
    pub dimensions: (usize, usize, usize),
    pub voxel_size: VoxelSize,
}

/// Escape markup and turn non-ASCII characters into numeric references, the
/// TIFF `ImageDescription` tag only takes 7-bit ASCII.
fn escape_xml(value: &str) -> Cow<'_, str> {
    if value.is_ascii() && !value.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c if c.is_ascii() => escaped.push(c),
            c => escaped.push_str(&format!("&#{};", u32::from(c))),
        }
    }
    Cow::Owned(escaped)
}

/// Minimal OME-XML for a single channel, single timepoint Z stack stored one
/// plane per IFD.
pub fn ome_xml(description: &OmeDescription) -> String {
    let (nz, ny, nx) = description.dimensions;
    let voxel = &description.voxel_size;
    let unit = escape_xml(&voxel.unit);
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06" "#,
            r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xsi:schemaLocation="http://www.openmicroscopy.org/Schemas/OME/2016-06 "#,
            r#"http://www.openmicroscopy.org/Schemas/OME/2016-06/ome.xsd">"#,
            r#"<Image ID="Image:0" Name="{name}">"#,
            r#"<Pixels ID="Pixels:0" DimensionOrder="XYZCT" Type="{pixel_type}" "#,
            r#"SizeX="{nx}" SizeY="{ny}" SizeZ="{nz}" SizeC="1" SizeT="1" "#,
            r#"PhysicalSizeX="{px}" PhysicalSizeXUnit="{unit}" "#,
            r#"PhysicalSizeY="{py}" PhysicalSizeYUnit="{unit}" "#,
            r#"PhysicalSizeZ="{pz}" PhysicalSizeZUnit="{unit}">"#,
            r#"<Channel ID="Channel:0:0" Name="{channel}" SamplesPerPixel="1"/>"#,
            r#"<TiffData IFD="0" PlaneCount="{nz}"/>"#,
            r#"</Pixels></Image></OME>"#,
        ),
        name = escape_xml(&description.name),
        pixel_type = description.sample_type.ome_name(),
        nx = nx,
        ny = ny,
        nz = nz,
        px = voxel.x,
        py = voxel.y,
        pz = voxel.z,
        unit = unit,
        channel = escape_xml(&description.channel_name),
    )
}
