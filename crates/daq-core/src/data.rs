//! Data containers passed from drivers to the host data channel.

use crate::core::DataDim;
use crate::error::{AppResult, DaqError};
use ndarray::{Array2, ArrayD, Axis};
use serde::{Deserialize, Serialize};

/// A single camera readout.
///
/// Pixels are stored row-major, `height` rows of `width` columns, as the vendor
/// buffers deliver them after binning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Width in pixels (binned columns)
    pub width: u32,

    /// Height in pixels (binned rows)
    pub height: u32,

    /// Raw 16-bit pixel data
    pub pixels: Vec<u16>,
}

impl Frame {
    /// Create a new frame from 16-bit pixel data.
    pub fn from_u16(width: u32, height: u32, pixels: Vec<u16>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Expected number of pixels for the declared geometry.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Convert to a `(height, width)` floating point array with unit axes removed.
    pub fn to_squeezed_array(&self) -> AppResult<ArrayD<f64>> {
        if self.pixels.len() != self.expected_len() {
            return Err(DaqError::Processing(format!(
                "frame buffer holds {} pixels, expected {}x{}",
                self.pixels.len(),
                self.width,
                self.height
            )));
        }
        let data: Vec<f64> = self.pixels.iter().map(|&p| f64::from(p)).collect();
        let array = Array2::from_shape_vec((self.height as usize, self.width as usize), data)
            .map_err(|e| DaqError::Processing(e.to_string()))?;
        Ok(squeeze(array.into_dyn()))
    }
}

/// Drop every axis of length one.
pub fn squeeze(array: ArrayD<f64>) -> ArrayD<f64> {
    let mut out = array;
    for axis in (0..out.ndim()).rev() {
        if out.len_of(Axis(axis)) == 1 {
            out = out.index_axis_move(Axis(axis), 0);
        }
    }
    out
}

/// Axis metadata attached to 1D exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataAxis {
    pub label: String,
    pub units: String,
    pub data: Vec<f64>,
}

impl DataAxis {
    /// `0, 1, .., len - 1`.
    pub fn pixel_index(len: usize) -> Self {
        Self {
            label: "Pixels".to_string(),
            units: String::new(),
            data: (0..len).map(|i| i as f64).collect(),
        }
    }
}

/// One emission on the data channel: a named bundle of same-dimension arrays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataExport {
    pub name: String,
    pub dim: DataDim,
    pub arrays: Vec<ArrayD<f64>>,
    pub labels: Vec<String>,
    pub x_axis: Option<DataAxis>,
}

impl DataExport {
    pub fn new(name: impl Into<String>, dim: DataDim, arrays: Vec<ArrayD<f64>>) -> Self {
        Self {
            name: name.into(),
            dim,
            arrays,
            labels: Vec::new(),
            x_axis: None,
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_x_axis(mut self, axis: DataAxis) -> Self {
        self.x_axis = Some(axis);
        self
    }

    /// Shape of the first array, empty when there is none.
    pub fn shape(&self) -> Vec<usize> {
        self.arrays
            .first()
            .map(|a| a.shape().to_vec())
            .unwrap_or_default()
    }
}
