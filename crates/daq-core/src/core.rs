//! Geometry and dimensionality types shared by the camera drivers.

use serde::{Deserialize, Serialize};

/// Dimensionality tag attached to emitted data.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DataDim {
    Data1D,
    Data2D,
}

impl DataDim {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataDim::Data1D => "Data1D",
            DataDim::Data2D => "Data2D",
        }
    }
}

impl std::fmt::Display for DataDim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Region of Interest for camera acquisition, including binning.
///
/// Equality compares all six fields; a ROI commit that produces an equal value
/// must not touch the hardware.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Roi {
    /// X-coordinate of top-left corner in pixels
    pub x: u32,
    /// Y-coordinate of top-left corner in pixels
    pub y: u32,
    /// Width of ROI in pixels
    pub width: u32,
    /// Height of ROI in pixels
    pub height: u32,
    /// Horizontal binning factor
    pub x_binning: u32,
    /// Vertical binning factor
    pub y_binning: u32,
}

impl Roi {
    /// Full-sensor ROI with no binning.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
            x_binning: 1,
            y_binning: 1,
        }
    }

    /// Binned output size as `(columns, rows)`.
    ///
    /// A zero binning factor is read as 1.
    pub fn binned_size(&self) -> (u32, u32) {
        (
            self.width / self.x_binning.max(1),
            self.height / self.y_binning.max(1),
        )
    }

    /// Shape of one readout in row-major order: `(rows, columns)`.
    pub fn data_shape(&self) -> (usize, usize) {
        let (cols, rows) = self.binned_size();
        (rows as usize, cols as usize)
    }

    /// 1D when either binned dimension collapses to a single pixel.
    pub fn data_dim(&self) -> DataDim {
        let (cols, rows) = self.binned_size();
        if cols != 1 && rows != 1 {
            DataDim::Data2D
        } else {
            DataDim::Data1D
        }
    }
}

impl std::fmt::Display for Roi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(x={}, y={}, width={}, height={}, x_binning={}, y_binning={})",
            self.x, self.y, self.width, self.height, self.x_binning, self.y_binning
        )
    }
}

impl Default for Roi {
    fn default() -> Self {
        Self::full(1, 1)
    }
}
