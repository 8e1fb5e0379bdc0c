//! Profile sample columns of the SUBINT record
//!
//! Each row's `DATA` cell holds every profile of one integration,
//! polarization-major then channel then bin. Samples decode as
//! `raw * DAT_SCL + DAT_OFFS`, where the scale and offset arrays are
//! indexed `ipol * nchan + ichan` (or by channel alone in files whose
//! arrays are only `nchan` long).
//!
//! `DATA` may be `f32` (written with scale 1 and offset 0, lossless) or
//! `i16` (each profile mapped onto the integer range with its own scale
//! and offset, lossy).

use std::sync::Arc;

use psrstore_core::{Error, Result};
use psrstore_durability::{ColumnType, Container, Record};
use psrstore_storage::{AmpBuffer, AmpStorage};
use tracing::warn;

use super::SUBINT;
use crate::deferred::Loader;

/// Lowest quantized sample; the range keeps clear of the i16 extremes
pub(crate) const QUANT_MIN: f64 = 1.0 - 32768.0 + 16.0;

/// Highest quantized sample
pub(crate) const QUANT_MAX: f64 = 32768.0 - 2.0 - 16.0;

/// Offset and scale mapping `amps` onto `[QUANT_MIN, QUANT_MAX]`
pub(crate) fn quantize(amps: &[f32], out: &mut Vec<i16>) -> (f32, f32) {
    if amps.is_empty() {
        return (0.0, 1.0);
    }
    let (min, max) = amps.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
        (lo.min(f64::from(x)), hi.max(f64::from(x)))
    });
    let range = QUANT_MAX - QUANT_MIN;
    let scale = if max == min { 1.0 } else { (max - min) / range };
    let offset = (min * QUANT_MAX - max * QUANT_MIN) / range;
    let offset = if max == min { min } else { offset };
    out.extend(amps.iter().map(|&x| {
        ((f64::from(x) - offset) / scale)
            .round()
            .clamp(QUANT_MIN, QUANT_MAX) as i16
    }));
    (offset as f32, scale as f32)
}

/// Location of one profile within the SUBINT record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProfileCell {
    pub row: usize,
    pub ipol: usize,
    pub ichan: usize,
    pub npol: usize,
    pub nchan: usize,
    pub nbin: usize,
}

impl ProfileCell {
    fn first_sample(&self) -> usize {
        (self.ipol * self.nchan + self.ichan) * self.nbin
    }
}

/// One element of a scale or offset array
fn calibration(record: &Record, column: &str, cell: &ProfileCell, default: f32) -> Result<f32> {
    let desc = match record.column(column) {
        Some(desc) => desc,
        None => return Ok(default),
    };
    let index = if desc.repeat == cell.npol * cell.nchan {
        cell.ipol * cell.nchan + cell.ichan
    } else if desc.repeat == cell.nchan {
        cell.ichan
    } else {
        return Err(Error::invalid_value(
            SUBINT,
            column,
            format!("length {} for npol={} nchan={}", desc.repeat, cell.npol, cell.nchan),
        ));
    };
    Ok(record.read_col_range::<f32>(column, cell.row, index, 1)?[0])
}

/// Decode one profile
pub(crate) fn read_profile(record: &Record, cell: &ProfileCell) -> Result<Vec<f32>> {
    let mut scale = calibration(record, "DAT_SCL", cell, 1.0)?;
    let mut offset = calibration(record, "DAT_OFFS", cell, 0.0)?;
    if !scale.is_finite() || !offset.is_finite() {
        warn!(
            target: "psrstore::codec",
            row = cell.row,
            ipol = cell.ipol,
            ichan = cell.ichan,
            "Non-finite scale or offset; profile zeroed"
        );
        scale = 0.0;
        offset = 0.0;
    } else if scale == 0.0 {
        scale = 1.0;
    }

    let ty = record
        .column("DATA")
        .ok_or_else(|| Error::missing(SUBINT, "DATA"))?
        .ty;
    let first = cell.first_sample();
    let mut amps: Vec<f32> = match ty {
        ColumnType::F32 => record
            .read_col_range::<f32>("DATA", cell.row, first, cell.nbin)?
            .into_iter()
            .map(|x| x * scale + offset)
            .collect(),
        ColumnType::I16 => record
            .read_col_range::<i16>("DATA", cell.row, first, cell.nbin)?
            .into_iter()
            .map(|x| f32::from(x) * scale + offset)
            .collect(),
        other => {
            return Err(Error::type_mismatch(SUBINT, "DATA", "i16 or f32", other.name()));
        }
    };

    let mut bad = 0;
    for x in amps.iter_mut().filter(|x| !x.is_finite()) {
        *x = 0.0;
        bad += 1;
    }
    if bad > 0 {
        warn!(
            target: "psrstore::codec",
            row = cell.row,
            ipol = cell.ipol,
            ichan = cell.ichan,
            count = bad,
            "Non-finite samples zeroed"
        );
    }
    Ok(amps)
}

/// Decode one moments profile from `AUX_DATA`
pub(crate) fn read_moments(record: &Record, cell: &ProfileCell) -> Result<Vec<f32>> {
    record.read_col_range::<f32>("AUX_DATA", cell.row, cell.first_sample(), cell.nbin)
}

/// Loads the samples of one profile from an open container
#[derive(Debug, Clone)]
pub(crate) struct AmpsLoader {
    pub container: Arc<Container>,
    pub cell: ProfileCell,
    pub storage: AmpStorage,
}

impl Loader<AmpBuffer> for AmpsLoader {
    fn load(self: Box<Self>) -> Result<AmpBuffer> {
        let record = self.container.require_record(SUBINT)?;
        let amps = read_profile(record, &self.cell)?;
        self.storage.from_slice(&amps)
    }

    fn boxed_clone(&self) -> Box<dyn Loader<AmpBuffer>> {
        Box::new(self.clone())
    }

    fn label(&self) -> String {
        format!(
            "SUBINT row {} profile (pol {}, chan {})",
            self.cell.row, self.cell.ipol, self.cell.ichan
        )
    }
}

/// Loads the moments of one profile from an open container
#[derive(Debug, Clone)]
pub(crate) struct MomentsLoader {
    pub container: Arc<Container>,
    pub cell: ProfileCell,
}

impl Loader<Vec<f32>> for MomentsLoader {
    fn load(self: Box<Self>) -> Result<Vec<f32>> {
        let record = self.container.require_record(SUBINT)?;
        read_moments(record, &self.cell)
    }

    fn boxed_clone(&self) -> Box<dyn Loader<Vec<f32>>> {
        Box::new(self.clone())
    }

    fn label(&self) -> String {
        format!(
            "SUBINT row {} moments (pol {}, chan {})",
            self.cell.row, self.cell.ipol, self.cell.ichan
        )
    }
}
