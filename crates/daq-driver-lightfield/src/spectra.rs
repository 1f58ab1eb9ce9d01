//! Pump-probe spectra reduction.
//!
//! A capture holds alternating frames: even columns are taken with the pump on
//! (`I_on`), odd columns with the pump off (`I_off`). Per pixel:
//!
//! ```text
//! TA    = -1000 * mean(ln(I_on / I_off))
//! I_avg = mean(I_on + I_off) / 2
//! ```

use daq_core::error::{AppResult, DaqError};
use ndarray::{s, Array1, Array2, Axis, Zip};

/// Reduced spectra of one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectra {
    pub transient_absorption: Array1<f64>,
    pub average_intensity: Array1<f64>,
}

/// Split a `(pixels, frames)` capture into signal and reference columns.
pub fn split_pairs(image: &Array2<u16>) -> AppResult<(Array2<i64>, Array2<i64>)> {
    let frames = image.ncols();
    if frames == 0 || image.nrows() == 0 {
        return Err(DaqError::Processing("capture is empty".into()));
    }
    if frames % 2 != 0 {
        return Err(DaqError::Processing(format!(
            "capture holds {} frames, expected signal/reference pairs",
            frames
        )));
    }
    let on = image.slice(s![.., 0..;2]).mapv(i64::from);
    let off = image.slice(s![.., 1..;2]).mapv(i64::from);
    Ok((on, off))
}

/// `-1000 * mean(ln(I_on / I_off))` along the frame axis.
///
/// Zero counts follow float arithmetic (`inf`/`NaN`), as the camera never reports them
/// in practice.
pub fn transient_absorption(on: &Array2<i64>, off: &Array2<i64>) -> AppResult<Array1<f64>> {
    let log_ratio = Zip::from(on)
        .and(off)
        .map_collect(|&a, &b| (a as f64 / b as f64).ln());
    let mean = log_ratio
        .mean_axis(Axis(1))
        .ok_or_else(|| DaqError::Processing("no frame pairs to average".into()))?;
    Ok(mean * -1e3)
}

/// `mean(I_on + I_off) / 2` along the frame axis.
pub fn average_intensity(on: &Array2<i64>, off: &Array2<i64>) -> AppResult<Array1<f64>> {
    let sum = (on + off).mapv(|v| v as f64);
    let mean = sum
        .mean_axis(Axis(1))
        .ok_or_else(|| DaqError::Processing("no frame pairs to average".into()))?;
    Ok(mean / 2.0)
}

pub fn reduce(image: &Array2<u16>) -> AppResult<Spectra> {
    let (on, off) = split_pairs(image)?;
    Ok(Spectra {
        transient_absorption: transient_absorption(&on, &off)?,
        average_intensity: average_intensity(&on, &off)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn doubled_signal_gives_minus_ln2() {
        // one pixel, frames: on, off, on, off
        let image = array![[2u16, 1, 2, 1]];
        let spectra = reduce(&image).unwrap();
        assert!((spectra.transient_absorption[0] + 693.147).abs() < 1e-3);
        assert!((spectra.average_intensity[0] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn columns_alternate_signal_and_reference() {
        let image = array![[10u16, 20, 30, 40], [1, 2, 3, 4]];
        let (on, off) = split_pairs(&image).unwrap();
        assert_eq!(on, array![[10i64, 30], [1, 3]]);
        assert_eq!(off, array![[20i64, 40], [2, 4]]);
    }

    #[test]
    fn per_pixel_reduction() {
        let image = array![[100u16, 100, 100, 100], [300, 100, 100, 300]];
        let spectra = reduce(&image).unwrap();
        assert_eq!(spectra.transient_absorption.len(), 2);
        assert!(spectra.transient_absorption[0].abs() < 1e-12);
        // ln(3) and ln(1/3) cancel
        assert!(spectra.transient_absorption[1].abs() < 1e-9);
        assert_eq!(spectra.average_intensity[1], 200.0);
    }

    #[test]
    fn odd_or_empty_captures_are_rejected() {
        assert!(split_pairs(&array![[1u16, 2, 3]]).is_err());
        assert!(split_pairs(&Array2::<u16>::zeros((4, 0))).is_err());
    }

    #[test]
    fn widening_avoids_u16_overflow() {
        let image = array![[u16::MAX, u16::MAX]];
        let spectra = reduce(&image).unwrap();
        assert_eq!(spectra.average_intensity[0], f64::from(u16::MAX));
    }
}
