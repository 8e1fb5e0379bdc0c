//! FEEDPAR record: per-channel polarization calibrator solution
//!
//! One row holding every channel. A channel whose weight is zero (or not
//! finite) has no solution; its parameters are written as zeros.

use psrstore_core::{Error, Mjd, Result};
use psrstore_durability::{ColumnType, Container, Record};
use tracing::warn;

use super::{cell_len, check_finite, check_repeat, ensure_column, writable_record, FEEDPAR};
use crate::extensions::{CalChannel, PolnCalibratorExtension};
use crate::model::Archive;

fn count(record: &Record, key: &'static str) -> Result<usize> {
    match record.key_int(key)? {
        Some(n) if n >= 0 => Ok(n as usize),
        Some(n) => Err(Error::invalid_value(FEEDPAR, key, n.to_string())),
        None => Err(Error::missing(FEEDPAR, key)),
    }
}

fn sized_column<T: psrstore_durability::Element>(
    record: &Record,
    column: &'static str,
    len: usize,
) -> Result<Vec<T>> {
    let values = record.read_col::<T>(column, 0)?;
    if values.len() != len {
        return Err(Error::invalid_value(
            FEEDPAR,
            column,
            format!("length {}, expected {}", values.len(), len),
        ));
    }
    Ok(values)
}

pub(crate) fn read(container: &Container) -> Result<Option<PolnCalibratorExtension>> {
    let record = match container.record(FEEDPAR) {
        Some(record) => record,
        None => return Ok(None),
    };
    let model = record.key_str("CAL_MTHD")?.unwrap_or_default().trim().to_string();
    let nparam = count(record, "NCPAR")?;
    let nchan = count(record, "NCH_FDPR")?;
    cell_len(FEEDPAR, "NCH_FDPR", &[nchan])?;
    let nvalues = cell_len(FEEDPAR, "NCPAR", &[nchan, nparam])?;
    for (column, len) in [
        ("DAT_FREQ", nchan),
        ("DAT_WTS", nchan),
        ("DATA", nvalues),
        ("DATAERR", nvalues),
    ] {
        check_repeat(record, column, len)?;
    }
    let epoch = match record.key_float("EPOCH")? {
        Some(days) if days.is_finite() && days > 0.0 => Some(Mjd::from_days(days)),
        _ => None,
    };

    if record.nrows() == 0 {
        return Ok(Some(PolnCalibratorExtension::from_parts(
            model,
            nparam,
            epoch,
            vec![0.0; nchan],
            vec![CalChannel::invalid(nparam); nchan],
        )));
    }

    let frequencies = sized_column::<f64>(record, "DAT_FREQ", nchan)?;
    let weights = sized_column::<f32>(record, "DAT_WTS", nchan)?;
    let params = sized_column::<f64>(record, "DATA", nvalues)?;
    let errors = sized_column::<f64>(record, "DATAERR", nvalues)?;

    let mut channels = Vec::with_capacity(nchan);
    for (ichan, weight) in weights.iter().enumerate() {
        let span = ichan * nparam..(ichan + 1) * nparam;
        if !weight.is_finite() || *weight == 0.0 {
            channels.push(CalChannel::invalid(nparam));
            continue;
        }
        let values = &params[span.clone()];
        let errs = &errors[span];
        if values.iter().chain(errs).any(|v| !v.is_finite()) {
            warn!(target: "psrstore::codec", ichan, "Non-finite calibrator solution; channel marked invalid");
            channels.push(CalChannel::invalid(nparam));
            continue;
        }
        channels.push(CalChannel {
            valid: true,
            params: values.to_vec(),
            variance: errs.iter().map(|e| e * e).collect(),
        });
    }

    Ok(Some(PolnCalibratorExtension::from_parts(
        model,
        nparam,
        epoch,
        frequencies,
        channels,
    )))
}

pub(crate) fn write(archive: &Archive, container: &mut Container) -> Result<()> {
    let cal = match archive.get::<PolnCalibratorExtension>() {
        Some(cal) => cal,
        None => {
            container.delete_record(FEEDPAR);
            return Ok(());
        }
    };
    let (nparam, nchan) = (cal.nparam(), cal.nchan());
    if cal.frequencies.len() != nchan {
        return Err(Error::invalid_state(format!(
            "calibrator has {} frequencies for {} channels",
            cal.frequencies.len(),
            nchan
        )));
    }
    check_finite(FEEDPAR, "DAT_FREQ", &cal.frequencies)?;

    let mut weights = Vec::with_capacity(nchan);
    let mut params = Vec::with_capacity(nchan * nparam);
    let mut errors = Vec::with_capacity(nchan * nparam);
    for (ichan, channel) in cal.channels().iter().enumerate() {
        if channel.valid {
            check_finite(FEEDPAR, "DATA", &channel.params)
                .and_then(|_| check_finite(FEEDPAR, "DATAERR", &channel.variance))
                .map_err(|e| e.context(format!("channel {}", ichan)))?;
            if let Some(v) = channel.variance.iter().find(|v| **v < 0.0) {
                return Err(Error::invalid_value(
                    FEEDPAR,
                    "DATAERR",
                    format!("variance {} in channel {}", v, ichan),
                ));
            }
            weights.push(1.0f32);
            params.extend_from_slice(&channel.params);
            errors.extend(channel.variance.iter().map(|v| v.sqrt()));
        } else {
            weights.push(0.0f32);
            params.resize(params.len() + nparam, 0.0);
            errors.resize(errors.len() + nparam, 0.0);
        }
    }
    let epoch = cal.epoch.map_or(0.0, |mjd| mjd.as_days());

    let record = writable_record(container, FEEDPAR);
    record.set_keyword("CAL_MTHD", cal.model.as_str());
    record.set_keyword("NCPAR", nparam as i64);
    record.set_keyword("NCH_FDPR", nchan as i64);
    record.set_keyword("EPOCH", epoch);
    ensure_column(record, "DAT_FREQ", ColumnType::F64, nchan)?;
    ensure_column(record, "DAT_WTS", ColumnType::F32, nchan)?;
    ensure_column(record, "DATA", ColumnType::F64, nchan * nparam)?;
    ensure_column(record, "DATAERR", ColumnType::F64, nchan * nparam)?;
    record.set_rows(1);
    record.write_col("DAT_FREQ", 0, &cal.frequencies)?;
    record.write_col("DAT_WTS", 0, &weights)?;
    record.write_col("DATA", 0, &params)?;
    record.write_col("DATAERR", 0, &errors)?;
    Ok(())
}
