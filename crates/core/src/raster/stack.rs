//! Multi-band time series stack

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use ndarray::{s, Array2, Array3, ArrayView1, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

/// How raw band values are brought into [0, 1] before clustering.
///
/// NaN samples become 0 before any scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    /// `v * scale + offset`; the default maps index data in [-1, 1] to [0, 1]
    Affine { scale: f64, offset: f64 },
    /// Rescale the finite range of the whole stack to [0, 1]
    MinMax,
    /// Leave values untouched (NaN is still replaced)
    None,
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization::Affine {
            scale: 0.5,
            offset: 0.5,
        }
    }
}

/// A georeferenced band × row × column stack.
///
/// Each band is one time step; the values at `(.., row, col)` form the
/// temporal signature of that pixel.
#[derive(Debug, Clone)]
pub struct RasterStack {
    data: Array3<f64>,
    transform: GeoTransform,
    crs: Option<CRS>,
}

impl RasterStack {
    /// Wrap a (bands, rows, cols) array
    pub fn from_array(data: Array3<f64>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
        }
    }

    /// Stack single-band rasters in time order.
    ///
    /// Transform and CRS are taken from the first band; every band must share
    /// its dimensions.
    pub fn from_bands<T: RasterElement>(bands: &[Raster<T>]) -> Result<Self> {
        let first = bands.first().ok_or_else(|| {
            Error::invalid_parameter("bands", 0, "at least one band is required")
        })?;
        let (rows, cols) = first.shape();

        let mut data = Array3::zeros((bands.len(), rows, cols));
        for (b, band) in bands.iter().enumerate() {
            let (ar, ac) = band.shape();
            if ar != rows || ac != cols {
                return Err(Error::SizeMismatch {
                    er: rows,
                    ec: cols,
                    ar,
                    ac,
                });
            }
            let mut plane = data.index_axis_mut(Axis(0), b);
            for ((r, c), v) in band.data().indexed_iter() {
                plane[(r, c)] = if band.is_nodata(*v) {
                    f64::NAN
                } else {
                    v.to_f64().unwrap_or(f64::NAN)
                };
            }
        }

        let mut stack = Self::from_array(data);
        stack.transform = *first.transform();
        stack.crs = first.crs().cloned();
        Ok(stack)
    }

    /// Number of bands (time steps)
    pub fn bands(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn rows(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn cols(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Dimensions as (bands, rows, cols)
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Time series of pixel (row, col)
    pub fn series(&self, row: usize, col: usize) -> ArrayView1<'_, f64> {
        self.data.slice(s![.., row, col])
    }

    pub fn view(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// Copy one band out as a single-band raster with this stack's metadata
    pub fn band(&self, index: usize) -> Result<Raster<f64>> {
        if index >= self.bands() {
            return Err(Error::invalid_parameter(
                "band",
                index,
                format!("stack has {} bands", self.bands()),
            ));
        }
        Ok(self.raster_like(self.data.index_axis(Axis(0), index).to_owned()))
    }

    /// Wrap a (rows, cols) array in a raster carrying this stack's transform and CRS
    pub fn raster_like<T: RasterElement>(&self, data: Array2<T>) -> Raster<T> {
        let mut raster = Raster::from_array(data);
        raster.set_transform(self.transform);
        raster.set_crs(self.crs.clone());
        raster
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Finite (min, max) over all bands, `None` if no finite value exists
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Return a copy with values rescaled and no NaN left.
    ///
    /// `Affine` replaces NaN by 0 before scaling, `MinMax` sends NaN to 0
    /// after scaling so the output stays within [0, 1].
    pub fn normalized(&self, normalization: Normalization) -> RasterStack {
        let range = self.value_range();
        let mut data = self.data.clone();

        data.mapv_inplace(|v| match normalization {
            Normalization::Affine { scale, offset } => {
                let v = if v.is_nan() { 0.0 } else { v };
                v * scale + offset
            }
            Normalization::MinMax => match range {
                Some((lo, hi)) if hi > lo && !v.is_nan() => (v - lo) / (hi - lo),
                _ => 0.0,
            },
            Normalization::None => {
                if v.is_nan() {
                    0.0
                } else {
                    v
                }
            }
        });

        RasterStack {
            data,
            transform: self.transform,
            crs: self.crs.clone(),
        }
    }
}
