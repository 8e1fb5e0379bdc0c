//! SUBINT record: one row per integration

use std::sync::Arc;

use psrstore_core::{Error, Mjd, Result};
use psrstore_durability::{ColumnType, Container, Record};
use psrstore_storage::AmpStorage;
use tracing::{debug, warn};

use super::migration::{FieldReader, Revision};
use super::profile_column::{quantize, AmpsLoader, MomentsLoader, ProfileCell};
use super::{
    cell_len, check_finite, check_finite_from, check_repeat, ensure_column, writable_record, SUBINT,
};
use crate::config::StoreConfig;
use crate::extensions::{HistoryRow, Pointing};
use crate::model::{Archive, Integration, PolnState, Profile};

/// Pointing columns, in [`Pointing::to_array`] order
const POINTING_COLUMNS: [&str; 10] = [
    "LST_SUB", "RA_SUB", "DEC_SUB", "GLON_SUB", "GLAT_SUB", "FD_ANG", "POS_ANG", "PAR_ANG",
    "TEL_AZ", "TEL_ZEN",
];

/// Everything decoded from SUBINT
#[derive(Debug)]
pub(crate) struct SubintData {
    pub npol: usize,
    pub nchan: usize,
    pub nbin: usize,
    pub state: PolnState,
    pub rotation_measure: f64,
    pub integrations: Vec<Integration>,
}

/// Inputs to SUBINT decoding that come from other records
pub(crate) struct ReadContext<'a> {
    pub revision: Option<Revision>,
    pub reference_epoch: Mjd,
    pub centre_frequency: f64,
    pub bandwidth: f64,
    pub last_history: Option<&'a HistoryRow>,
    pub storage: &'a AmpStorage,
    pub defer_amps: bool,
}

fn dimension(record: &Record, key: &'static str, fallback: Option<u32>) -> Result<usize> {
    match record.key_int(key)? {
        Some(n) if n >= 0 => Ok(n as usize),
        Some(n) => Err(Error::invalid_value(SUBINT, key, n.to_string())),
        None => fallback
            .map(|n| n as usize)
            .ok_or_else(|| Error::missing(SUBINT, key)),
    }
}

pub(crate) fn read(container: &Arc<Container>, ctx: &ReadContext<'_>) -> Result<Option<SubintData>> {
    let record = match container.record(SUBINT) {
        Some(record) => record,
        None => return Ok(None),
    };
    let history = ctx.last_history;
    let npol = dimension(record, "NPOL", history.map(|h| h.npol))?;
    let nchan = dimension(record, "NCHAN", history.map(|h| h.nchan))?;
    let nbin = dimension(record, "NBIN", history.map(|h| h.nbin))?;
    check_shape(record, npol, nchan, nbin)?;

    let pol_type = match record.key_str("POL_TYPE")? {
        Some(label) => Some(label.to_string()),
        None => history.map(|h| h.pol_type.clone()),
    };
    let state = match pol_type {
        Some(label) => PolnState::parse(&label)
            .ok_or_else(|| Error::invalid_value(SUBINT, "POL_TYPE", label))?,
        None => match npol {
            2 => PolnState::PPQQ,
            4 => PolnState::Stokes,
            _ => PolnState::Intensity,
        },
    };

    let fields = FieldReader::new(record, ctx.revision);
    let duration_column = fields.column_name("TSUBINT");
    let has_pointing = record.has_column(POINTING_COLUMNS[0]);
    let has_moments = record.has_column("AUX_DATA");

    let mut integrations = Vec::with_capacity(record.nrows());
    for row in 0..record.nrows() {
        let offset = optional_scalar(record, "OFFS_SUB", row)?;
        let duration = match duration_column {
            Some(name) => record.read_scalar::<f64>(name, row)?,
            None => 0.0,
        };
        let frequencies = read_frequencies(record, row, nchan, ctx)?;
        let weights = read_weights(record, row, nchan)?;

        let mut profiles = Vec::with_capacity(npol * nchan);
        for ipol in 0..npol {
            for ichan in 0..nchan {
                let cell = ProfileCell {
                    row,
                    ipol,
                    ichan,
                    npol,
                    nchan,
                    nbin,
                };
                let loader = AmpsLoader {
                    container: Arc::clone(container),
                    cell,
                    storage: ctx.storage.clone(),
                };
                let mut profile = Profile::deferred(nbin, ctx.storage, Box::new(loader));
                if has_moments {
                    profile.set_moments_loader(Box::new(MomentsLoader {
                        container: Arc::clone(container),
                        cell,
                    }));
                }
                if !ctx.defer_amps {
                    profile.get_amps()?;
                }
                profiles.push(profile);
            }
        }

        let mut integration = Integration::from_parts(
            ctx.reference_epoch.add_seconds(offset),
            duration,
            npol,
            nchan,
            nbin,
            frequencies,
            weights,
            profiles,
        );
        if has_pointing {
            let mut values = [0.0; 10];
            for (value, column) in values.iter_mut().zip(POINTING_COLUMNS) {
                *value = optional_scalar(record, column, row)?;
            }
            integration.add_extension(Pointing::from_array(values));
        }
        integrations.push(integration);
    }

    Ok(Some(SubintData {
        npol,
        nchan,
        nbin,
        state,
        rotation_measure: record.key_float("RM")?.unwrap_or(0.0),
        integrations,
    }))
}

/// Reject dimensions the stored columns cannot back
fn check_shape(record: &Record, npol: usize, nchan: usize, nbin: usize) -> Result<()> {
    let nprof = cell_len(SUBINT, "NCHAN", &[npol, nchan])?;
    let nsamples = cell_len(SUBINT, "NBIN", &[npol, nchan, nbin])?;
    check_repeat(record, "DAT_FREQ", nchan)?;
    check_repeat(record, "DAT_WTS", nchan)?;
    check_repeat(record, "DATA", nsamples)?;
    check_repeat(record, "AUX_DATA", nsamples)?;
    if record.nrows() == 0 {
        return Ok(());
    }
    if nsamples > 0 && !record.has_column("DATA") {
        return Err(Error::missing(SUBINT, "DATA"));
    }
    // per-row vectors are built from row bytes, so the grid cannot outgrow a row
    let width = record.row_width();
    if width == 0 || nchan.max(nprof) > width {
        return Err(Error::invalid_value(
            SUBINT,
            "NCHAN",
            format!("{} channels x {} polarizations in {} byte rows", nchan, npol, width),
        ));
    }
    Ok(())
}

fn optional_scalar(record: &Record, column: &str, row: usize) -> Result<f64> {
    if record.has_column(column) {
        record.read_scalar::<f64>(column, row)
    } else {
        Ok(0.0)
    }
}

fn read_frequencies(record: &Record, row: usize, nchan: usize, ctx: &ReadContext<'_>) -> Result<Vec<f64>> {
    let stored = match record.column("DAT_FREQ") {
        Some(desc) if desc.repeat == nchan => Some(record.read_col::<f64>("DAT_FREQ", row)?),
        Some(desc) => {
            return Err(Error::invalid_value(
                SUBINT,
                "DAT_FREQ",
                format!("length {} for nchan={}", desc.repeat, nchan),
            ))
        }
        None => None,
    };
    match stored {
        // all-ones is the placeholder some writers leave behind
        Some(freqs) if nchan <= 1 || freqs.iter().any(|&f| f != 1.0) => Ok(freqs),
        _ => {
            debug!(target: "psrstore::codec", row, "Reconstructing channel frequencies");
            Ok(channel_frequencies(ctx.centre_frequency, ctx.bandwidth, nchan))
        }
    }
}

/// Evenly spaced channel centres across the band
pub(crate) fn channel_frequencies(centre: f64, bandwidth: f64, nchan: usize) -> Vec<f64> {
    if nchan == 0 {
        return Vec::new();
    }
    let chan_bw = bandwidth / nchan as f64;
    let low = centre - bandwidth / 2.0;
    (0..nchan)
        .map(|ichan| low + (ichan as f64 + 0.5) * chan_bw)
        .collect()
}

fn read_weights(record: &Record, row: usize, nchan: usize) -> Result<Vec<f32>> {
    let mut weights = match record.column("DAT_WTS") {
        Some(desc) if desc.repeat == nchan => record.read_col::<f32>("DAT_WTS", row)?,
        Some(desc) => {
            return Err(Error::invalid_value(
                SUBINT,
                "DAT_WTS",
                format!("length {} for nchan={}", desc.repeat, nchan),
            ))
        }
        None => vec![1.0; nchan],
    };
    for (ichan, weight) in weights.iter_mut().enumerate() {
        if !weight.is_finite() {
            warn!(target: "psrstore::codec", row, ichan, "Non-finite weight; channel marked invalid");
            *weight = 0.0;
        }
    }
    Ok(weights)
}

pub(crate) fn write(archive: &Archive, container: &mut Container, config: &StoreConfig) -> Result<()> {
    let (npol, nchan, nbin) = (archive.npol(), archive.nchan(), archive.nbin());
    let nprof = cell_len(SUBINT, "DAT_SCL", &[npol, nchan])?;
    let nsamples = cell_len(SUBINT, "DATA", &[npol, nchan, nbin])?;
    let integrations = archive.integrations();

    check_finite(SUBINT, "RM", &[archive.rotation_measure])?;
    let record = writable_record(container, SUBINT);
    record.set_keyword("NPOL", npol as i64);
    record.set_keyword("NCHAN", nchan as i64);
    record.set_keyword("NBIN", nbin as i64);
    record.set_keyword("POL_TYPE", archive.state.label());
    record.set_keyword("RM", archive.rotation_measure);

    ensure_column(record, "ISUBINT", ColumnType::I32, 1)?;
    ensure_column(record, "TSUBINT", ColumnType::F64, 1)?;
    ensure_column(record, "OFFS_SUB", ColumnType::F64, 1)?;

    let any_pointing = integrations.iter().any(|i| i.get::<Pointing>().is_some());
    for column in POINTING_COLUMNS {
        if any_pointing {
            ensure_column(record, column, ColumnType::F64, 1)?;
        } else {
            record.delete_column(column);
        }
    }

    ensure_column(record, "DAT_FREQ", ColumnType::F64, nchan)?;
    ensure_column(record, "DAT_WTS", ColumnType::F32, nchan)?;
    ensure_column(record, "DAT_OFFS", ColumnType::F32, nprof)?;
    ensure_column(record, "DAT_SCL", ColumnType::F32, nprof)?;
    let data_type = if config.quantize_amps {
        ColumnType::I16
    } else {
        ColumnType::F32
    };
    ensure_column(record, "DATA", data_type, nsamples)?;

    let any_moments = integrations
        .iter()
        .any(|i| i.profiles().iter().any(Profile::has_moments));
    if any_moments {
        ensure_column(record, "AUX_DATA", ColumnType::F32, nsamples)?;
    } else {
        record.delete_column("AUX_DATA");
    }

    record.set_rows(integrations.len());
    for (row, integration) in integrations.iter().enumerate() {
        check_finite(SUBINT, "TSUBINT", &[integration.duration()])?;
        check_finite(SUBINT, "DAT_FREQ", integration.frequencies())?;
        check_finite(SUBINT, "DAT_WTS", integration.weights())?;

        record.write_scalar("ISUBINT", row, (row + 1) as i32)?;
        record.write_scalar("TSUBINT", row, integration.duration())?;
        record.write_scalar(
            "OFFS_SUB",
            row,
            integration.epoch().seconds_since(&archive.reference_epoch),
        )?;
        record.write_col("DAT_FREQ", row, integration.frequencies())?;
        record.write_col("DAT_WTS", row, integration.weights())?;

        if any_pointing {
            let values = integration
                .get::<Pointing>()
                .copied()
                .unwrap_or_default()
                .to_array();
            for (column, value) in POINTING_COLUMNS.iter().zip(values) {
                check_finite(SUBINT, column, &[value])?;
                record.write_scalar(column, row, value)?;
            }
        }

        write_profiles(record, row, integration, config.quantize_amps)?;

        if any_moments {
            let mut moments = Vec::with_capacity(nsamples);
            for profile in integration.profiles() {
                match profile.moments()? {
                    Some(values) => moments.extend_from_slice(values),
                    None => moments.resize(moments.len() + nbin, 0.0),
                }
            }
            check_finite(SUBINT, "AUX_DATA", &moments)?;
            record.write_col("AUX_DATA", row, &moments)?;
        }
    }
    Ok(())
}

fn write_profiles(record: &mut Record, row: usize, integration: &Integration, quantized: bool) -> Result<()> {
    let nbin = integration.nbin();
    let nprof = integration.profiles().len();
    let mut offsets = Vec::with_capacity(nprof);
    let mut scales = Vec::with_capacity(nprof);

    if quantized {
        let mut raw = Vec::with_capacity(nprof * nbin);
        for (iprof, profile) in integration.profiles().iter().enumerate() {
            let amps = profile.get_amps()?;
            check_finite_from(SUBINT, "DATA", amps, iprof * nbin)?;
            let (offset, scale) = quantize(amps, &mut raw);
            offsets.push(offset);
            scales.push(scale);
        }
        record.write_col("DATA", row, &raw)?;
    } else {
        let mut data = Vec::with_capacity(nprof * nbin);
        for (iprof, profile) in integration.profiles().iter().enumerate() {
            let amps = profile.get_amps()?;
            check_finite_from(SUBINT, "DATA", amps, iprof * nbin)?;
            data.extend_from_slice(amps);
            offsets.push(0.0f32);
            scales.push(1.0f32);
        }
        record.write_col("DATA", row, &data)?;
    }
    record.write_col("DAT_OFFS", row, &offsets)?;
    record.write_col("DAT_SCL", row, &scales)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_frequencies() {
        assert_eq!(
            channel_frequencies(1400.0, 400.0, 4),
            vec![1250.0, 1350.0, 1450.0, 1550.0]
        );
        // inverted band counts down
        assert_eq!(channel_frequencies(1400.0, -200.0, 2), vec![1450.0, 1350.0]);
        assert!(channel_frequencies(1400.0, 100.0, 0).is_empty());
    }

    #[test]
    fn test_non_finite_weights_forced_invalid() {
        let mut record = Record::new(SUBINT);
        record.add_column("DAT_WTS", ColumnType::F32, 3).unwrap();
        record.set_rows(1);
        record
            .write_col("DAT_WTS", 0, &[1.0, f32::NAN, f32::INFINITY])
            .unwrap();
        assert_eq!(read_weights(&record, 0, 3).unwrap(), vec![1.0, 0.0, 0.0]);
        assert!(read_weights(&record, 0, 4).is_err());
    }

    #[test]
    fn test_shape_checked_before_allocating() {
        let mut record = Record::new(SUBINT);
        record.add_column("ISUBINT", ColumnType::I32, 1).unwrap();
        record.add_column("DATA", ColumnType::F32, 16).unwrap();
        record.set_rows(1);
        assert!(check_shape(&record, 1, 2, 8).is_ok());

        // beyond the repeat limit
        assert!(matches!(
            check_shape(&record, 1, 1 << 40, 8),
            Err(Error::InvalidValue { .. })
        ));
        // within the limit but disagreeing with DATA
        let err = check_shape(&record, 1, 4, 8).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { ref field, .. } if field == "DATA"));
        // a grid the row bytes cannot hold
        record.delete_column("DATA");
        assert!(matches!(
            check_shape(&record, 0, 1 << 20, 8),
            Err(Error::InvalidValue { .. })
        ));
        assert!(matches!(
            check_shape(&record, 1, 2, 8),
            Err(Error::MissingField { .. })
        ));
    }
}
