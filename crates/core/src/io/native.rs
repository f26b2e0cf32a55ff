//! Native GeoTIFF reading/writing built on the `tiff` crate.
//!
//! Reads time series stacks stored one page per band, or interleaved as the
//! 3 and 4 sample layouts the decoder knows (RGB, RGBA, CMYK, YCbCr). Long
//! series must use the multi-page layout, which is also what [`write_stack`]
//! produces. Label rasters are written as unsigned 32-bit images with a
//! no-data tag. Georeferencing is limited to pixel scale + tiepoint and the
//! EPSG geokeys.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement, RasterStack};
use ndarray::Array3;
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{Gray32, Gray32Float};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::warn;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const USER_DEFINED: u16 = 32767;

/// Read a whole time series stack from a GeoTIFF file.
///
/// A single image with several samples per pixel yields one band per sample;
/// a single-sample file yields one band per page (pages whose size differs
/// from the first, such as overviews, end the stack). Interleaved images with
/// more than 4 samples are rejected with [`Error::UnsupportedDataType`].
pub fn read_stack<P: AsRef<Path>>(path: P) -> Result<RasterStack> {
    let file = File::open(path.as_ref())?;
    decode_stack(file)
}

/// Same as [`read_stack`] over an in-memory buffer
pub fn read_stack_from_buffer(data: &[u8]) -> Result<RasterStack> {
    decode_stack(Cursor::new(data))
}

/// Read one band (1-indexed, default 1) of a GeoTIFF into a Raster
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let stack = read_stack(path)?;
    let index = band.unwrap_or(1);
    if index == 0 {
        return Err(Error::invalid_parameter("band", index, "bands are 1-indexed"));
    }
    let values = stack.band(index - 1)?;
    let data = values
        .data()
        .mapv(|v| num_traits::cast(v).unwrap_or_else(T::default_nodata));
    Ok(values.with_same_meta(data))
}

fn decode_stack<R: Read + Seek>(reader: R) -> Result<RasterStack> {
    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    let rows = height as usize;
    let cols = width as usize;

    let color = match decoder.colortype() {
        Ok(color) => color,
        Err(e) => {
            let samples: u16 = decoder
                .find_tag_unsigned(Tag::SamplesPerPixel)
                .ok()
                .flatten()
                .unwrap_or(1);
            return Err(if samples > 4 {
                Error::UnsupportedDataType(format!(
                    "{} interleaved samples per pixel; store the series one page per band",
                    samples
                ))
            } else {
                Error::Other(format!("Cannot read color type: {}", e))
            });
        }
    };
    let samples = samples_per_pixel(color)?;

    let transform = read_geotransform(&mut decoder)?;
    if transform.is_none() {
        warn!("GeoTIFF has no pixel scale/tiepoint tags, using pixel coordinates");
    }
    let crs = read_crs(&mut decoder)?;
    let nodata = match decoder.find_tag(Tag::GdalNodata) {
        Ok(Some(_)) => {
            let text = decoder
                .get_tag_ascii_string(Tag::GdalNodata)
                .map_err(|e| Error::Other(format!("Cannot read nodata tag: {}", e)))?;
            let value = text.trim().trim_end_matches('\0').trim().parse::<f64>().ok();
            if value.is_none() {
                warn!("Ignoring unparsable GDAL_NODATA value {:?}", text);
            }
            value
        }
        Ok(None) => None,
        Err(e) => return Err(Error::Other(format!("Cannot read nodata tag: {}", e))),
    };

    let mut planes: Vec<Vec<f64>> = Vec::new();
    loop {
        let buf = decoding_to_f64(
            decoder
                .read_image()
                .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?,
        )?;
        if buf.len() != rows * cols * samples {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        if samples > 1 {
            for s in 0..samples {
                planes.push(buf.iter().skip(s).step_by(samples).copied().collect());
            }
            break;
        }
        planes.push(buf);

        if !decoder.more_images() {
            break;
        }
        decoder
            .next_image()
            .map_err(|e| Error::Other(format!("Cannot advance to next page: {}", e)))?;
        match decoder.dimensions() {
            Ok((w, h)) if w == width && h == height => {}
            _ => break,
        }
    }

    let bands = planes.len();
    let flat: Vec<f64> = planes
        .into_iter()
        .flatten()
        .map(|v| match nodata {
            Some(nd) if v == nd => f64::NAN,
            _ => v,
        })
        .collect();
    let data = Array3::from_shape_vec((bands, rows, cols), flat)
        .map_err(|e| Error::Other(e.to_string()))?;

    let mut stack = RasterStack::from_array(data);
    if let Some(transform) = transform {
        stack.set_transform(transform);
    }
    stack.set_crs(crs);
    Ok(stack)
}

fn samples_per_pixel(color: ColorType) -> Result<usize> {
    match color {
        ColorType::Gray(_) => Ok(1),
        ColorType::GrayA(_) => Ok(2),
        ColorType::RGB(_) | ColorType::YCbCr(_) => Ok(3),
        ColorType::RGBA(_) | ColorType::CMYK(_) => Ok(4),
        other => Err(Error::UnsupportedDataType(format!(
            "Unsupported TIFF color type {:?}",
            other
        ))),
    }
}

fn decoding_to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    let values = match result {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };
    Ok(values)
}

/// ModelPixelScaleTag + ModelTiepointTag; `None` when either is absent
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<GeoTransform>> {
    let scale = find_f64_vec(decoder, Tag::ModelPixelScaleTag)?;
    let tiepoint = find_f64_vec(decoder, Tag::ModelTiepointTag)?;

    match (scale, tiepoint) {
        (Some(scale), Some(tiepoint)) if scale.len() >= 2 && tiepoint.len() >= 6 => {
            // tiepoint: [I, J, K, X, Y, Z]
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            Ok(Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1])))
        }
        (Some(_), Some(_)) => Err(Error::Other("Malformed pixel scale or tiepoint tag".into())),
        _ => Ok(None),
    }
}

fn find_f64_vec<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<Vec<f64>>> {
    match decoder.find_tag(tag) {
        Ok(Some(value)) => value
            .into_f64_vec()
            .map(Some)
            .map_err(|e| Error::Other(format!("Cannot read tag {:?}: {}", tag, e))),
        Ok(None) => Ok(None),
        Err(e) => Err(Error::Other(format!("Cannot read tag {:?}: {}", tag, e))),
    }
}

/// EPSG code from the geokey directory, projected before geographic
fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<CRS>> {
    let keys: Vec<u16> = match decoder.find_tag_unsigned_vec(Tag::GeoKeyDirectoryTag) {
        Ok(Some(keys)) => keys,
        Ok(None) => return Ok(None),
        Err(e) => return Err(Error::Other(format!("Cannot read geokey directory: {}", e))),
    };
    let Some(rest) = keys.get(4..) else {
        warn!("Geokey directory too short, ignoring CRS");
        return Ok(None);
    };
    let entries: Vec<&[u16]> = rest.chunks_exact(4).collect();

    let crs = [PROJECTED_CS_TYPE_KEY, GEOGRAPHIC_TYPE_KEY]
        .iter()
        .find_map(|&wanted| {
            entries.iter().find_map(|e| {
                // location 0 means the value is stored inline
                if e[0] == wanted && e[1] == 0 && e[3] != 0 && e[3] != USER_DEFINED {
                    Some(CRS::from_epsg(u32::from(e[3])))
                } else {
                    None
                }
            })
        });
    if crs.is_none() {
        warn!("No EPSG code in geokey directory");
    }
    Ok(crs)
}

fn geokeys(crs: Option<&CRS>) -> Vec<u16> {
    let code = crs
        .and_then(|c| c.epsg())
        .and_then(|code| u16::try_from(code).ok());
    let geographic = code.is_some_and(|c| (4000..5000).contains(&c));

    let mut entries: Vec<[u16; 4]> = vec![
        [GT_MODEL_TYPE_KEY, 0, 1, if geographic { 2 } else { 1 }],
        [GT_RASTER_TYPE_KEY, 0, 1, 1],
    ];
    if let Some(code) = code {
        let key = if geographic {
            GEOGRAPHIC_TYPE_KEY
        } else {
            PROJECTED_CS_TYPE_KEY
        };
        entries.push([key, 0, 1, code]);
    }

    let mut out = vec![1, 1, 0, entries.len() as u16];
    out.extend(entries.into_iter().flatten());
    out
}

fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    transform: &GeoTransform,
    crs: Option<&CRS>,
    nodata: Option<&str>,
) -> Result<()> {
    let scale = [transform.pixel_width, transform.pixel_height.abs(), 0.0];
    dir.write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;

    let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
    dir.write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;

    let keys = geokeys(crs);
    dir.write_tag(Tag::GeoKeyDirectoryTag, keys.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    if let Some(nodata) = nodata {
        dir.write_tag(Tag::GdalNodata, nodata)
            .map_err(|e| Error::Other(format!("Cannot write nodata tag: {}", e)))?;
    }
    Ok(())
}

/// Write a label raster as a single-band unsigned 32-bit GeoTIFF.
///
/// Label 0 is the declared no-data value; negative labels are written as 0.
pub fn write_label_geotiff<P: AsRef<Path>>(raster: &Raster<i32>, path: P) -> Result<()> {
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_labels(raster, file)
}

/// Same as [`write_label_geotiff`] into a byte buffer
pub fn write_label_geotiff_to_buffer(raster: &Raster<i32>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_labels(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn encode_labels<W: Write + Seek>(raster: &Raster<i32>, writer: W) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer)
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;
    let (rows, cols) = raster.shape();

    let data: Vec<u32> = raster
        .data()
        .iter()
        .map(|&v| u32::try_from(v).unwrap_or(0))
        .collect();

    let mut image = encoder
        .new_image::<Gray32>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;
    write_geo_tags(image.encoder(), raster.transform(), raster.crs(), Some("0"))?;

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;
    Ok(())
}

/// Write a stack as a multi-page 32-bit float GeoTIFF, one page per band
pub fn write_stack<P: AsRef<Path>>(stack: &RasterStack, path: P) -> Result<()> {
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_stack(stack, file)
}

fn encode_stack<W: Write + Seek>(stack: &RasterStack, writer: W) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer)
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;
    let (bands, rows, cols) = stack.shape();

    for b in 0..bands {
        let band = stack.band(b)?;
        let data: Vec<f32> = band.data().iter().map(|&v| v as f32).collect();

        let mut image = encoder
            .new_image::<Gray32Float>(cols as u32, rows as u32)
            .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;
        write_geo_tags(image.encoder(), stack.transform(), stack.crs(), None)?;
        image
            .write_data(&data)
            .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_stack() -> RasterStack {
        let data = Array3::from_shape_fn((3, 4, 5), |(b, r, c)| (b * 100 + r * 10 + c) as f64);
        let mut stack = RasterStack::from_array(data);
        stack.set_transform(GeoTransform::new(500000.0, 4000000.0, 10.0, -10.0));
        stack.set_crs(Some(CRS::from_epsg(32633)));
        stack
    }

    #[test]
    fn test_stack_roundtrip_multipage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.tif");
        let stack = sample_stack();

        write_stack(&stack, &path).unwrap();
        let back = read_stack(&path).unwrap();

        assert_eq!(back.shape(), (3, 4, 5));
        assert_eq!(back.series(2, 3).to_vec(), vec![23.0, 123.0, 223.0]);
        assert_relative_eq!(back.transform().origin_x, 500000.0);
        assert_relative_eq!(back.transform().pixel_height, -10.0);
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32633));
    }

    #[test]
    fn test_single_band_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.tif");
        write_stack(&sample_stack(), &path).unwrap();

        let second: Raster<f64> = read_geotiff(&path, Some(2)).unwrap();
        assert_eq!(second.get(1, 1).unwrap(), 111.0);
        assert!(read_geotiff::<f64, _>(&path, Some(0)).is_err());
    }

    #[test]
    fn test_label_roundtrip_keeps_nodata() {
        let mut labels = Raster::from_vec(vec![1, 1, 2, 0, 2, 3], 2, 3).unwrap();
        labels.set_crs(Some(CRS::from_epsg(4326)));

        let buf = write_label_geotiff_to_buffer(&labels).unwrap();
        let back = read_stack_from_buffer(&buf).unwrap();

        assert_eq!(back.shape(), (1, 2, 3));
        // label 0 is declared no-data and comes back as NaN
        assert!(back.data()[(0, 1, 0)].is_nan());
        assert_eq!(back.data()[(0, 1, 2)], 3.0);
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(4326));
    }

    #[test]
    fn test_label_roundtrip_keeps_georeferencing() {
        let mut labels = Raster::from_vec(vec![1, 2, 3, 4], 2, 2).unwrap();
        labels.set_transform(GeoTransform::new(500000.0, 4000000.0, 10.0, -10.0));
        labels.set_crs(Some(CRS::from_epsg(32633)));

        let back = read_stack_from_buffer(&write_label_geotiff_to_buffer(&labels).unwrap()).unwrap();
        assert_eq!(back.transform(), labels.transform());
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32633));
    }

    #[test]
    fn test_plain_tiff_uses_pixel_coordinates() {
        let mut buf = Vec::new();
        {
            let mut encoder = TiffEncoder::new(Cursor::new(&mut buf)).unwrap();
            encoder
                .write_image::<Gray32Float>(2, 2, &[0.1, 0.2, 0.3, 0.4])
                .unwrap();
        }
        let stack = read_stack_from_buffer(&buf).unwrap();
        assert_eq!(stack.shape(), (1, 2, 2));
        assert_eq!(stack.transform(), &GeoTransform::default());
        assert!(stack.crs().is_none());
    }

    #[test]
    fn test_interleaved_rgb_reads_as_three_bands() {
        use tiff::encoder::colortype::RGB32Float;

        // 1 x 2 pixels, samples interleaved per pixel
        let values = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut buf = Vec::new();
        {
            let mut encoder = TiffEncoder::new(Cursor::new(&mut buf)).unwrap();
            encoder.write_image::<RGB32Float>(2, 1, &values).unwrap();
        }
        let stack = read_stack_from_buffer(&buf).unwrap();
        assert_eq!(stack.shape(), (3, 1, 2));
        assert_eq!(stack.series(0, 0).to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(stack.series(0, 1).to_vec(), vec![4.0, 5.0, 6.0]);
    }

    struct Gray32Float6;
    impl tiff::encoder::colortype::ColorType for Gray32Float6 {
        type Inner = f32;
        const TIFF_VALUE: tiff::tags::PhotometricInterpretation =
            tiff::tags::PhotometricInterpretation::BlackIsZero;
        const BITS_PER_SAMPLE: &'static [u16] = &[32; 6];
        const SAMPLE_FORMAT: &'static [tiff::tags::SampleFormat] =
            &[tiff::tags::SampleFormat::IEEEFP; 6];
    }

    #[test]
    fn test_long_interleaved_series_is_rejected() {
        let values: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let mut buf = Vec::new();
        {
            let mut encoder = TiffEncoder::new(Cursor::new(&mut buf)).unwrap();
            encoder.write_image::<Gray32Float6>(2, 2, &values).unwrap();
        }
        match read_stack_from_buffer(&buf) {
            Err(Error::UnsupportedDataType(msg)) => assert!(msg.contains("one page per band")),
            other => panic!("expected UnsupportedDataType, got {:?}", other.map(|s| s.shape())),
        }
    }

    #[test]
    fn test_long_series_multipage_roundtrip() {
        let data = Array3::from_shape_fn((8, 3, 3), |(b, r, c)| (b * 9 + r * 3 + c) as f64 * 0.5);
        let stack = RasterStack::from_array(data);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.tif");

        write_stack(&stack, &path).unwrap();
        let back = read_stack(&path).unwrap();
        assert_eq!(back.shape(), (8, 3, 3));
        assert_eq!(back.series(2, 1).to_vec(), stack.series(2, 1).to_vec());
    }

    #[test]
    fn test_geokeys_layout() {
        let keys = geokeys(Some(&CRS::from_epsg(32719)));
        assert_eq!(&keys[..4], &[1, 1, 0, 3]);
        assert_eq!(&keys[12..], &[PROJECTED_CS_TYPE_KEY, 0, 1, 32719]);
        assert_eq!(geokeys(None)[3], 2);
    }
}
