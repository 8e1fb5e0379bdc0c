//! SPECKURT record: spectral kurtosis, one row per integration

use std::sync::Arc;

use psrstore_core::{Error, Result};
use psrstore_durability::{ColumnType, Container, Record};

use super::{cell_len, check_finite, check_repeat, ensure_column, writable_record, SPECKURT};
use crate::deferred::Loader;
use crate::extensions::{KurtosisData, SpectralKurtosis};
use crate::model::{Archive, Integration};

fn dimension(record: &Record, key: &'static str) -> Result<usize> {
    match record.key_int(key)? {
        Some(n) if n >= 0 => Ok(n as usize),
        Some(n) => Err(Error::invalid_value(SPECKURT, key, n.to_string())),
        None => Err(Error::missing(SPECKURT, key)),
    }
}

fn read_hits(record: &Record, column: &'static str, row: usize) -> Result<Vec<u64>> {
    record
        .read_col::<i64>(column, row)?
        .into_iter()
        .map(|hits| u64::try_from(hits).map_err(|_| Error::invalid_value(SPECKURT, column, hits.to_string())))
        .collect()
}

fn read_row(record: &Record, row: usize, npol: usize, nchan: usize) -> Result<KurtosisData> {
    let data = KurtosisData {
        filtered_sum: record.read_col::<f32>("FIL_SUM", row)?,
        filtered_hits: read_hits(record, "FIL_HIT", row)?,
        unfiltered_sum: record.read_col::<f32>("UNFIL_SUM", row)?,
        unfiltered_hits: read_hits(record, "UNFIL_HIT", row)?,
    };
    data.check(npol, nchan).map_err(|_| {
        Error::invalid_value(
            SPECKURT,
            "FIL_SUM",
            format!("row {} does not match npol={} nchan={}", row, npol, nchan),
        )
    })?;
    Ok(data)
}

/// Loads one row of kurtosis sums from an open container
#[derive(Debug, Clone)]
struct KurtosisLoader {
    container: Arc<Container>,
    row: usize,
    npol: usize,
    nchan: usize,
}

impl Loader<KurtosisData> for KurtosisLoader {
    fn load(self: Box<Self>) -> Result<KurtosisData> {
        let record = self.container.require_record(SPECKURT)?;
        read_row(record, self.row, self.npol, self.nchan)
    }

    fn boxed_clone(&self) -> Box<dyn Loader<KurtosisData>> {
        Box::new(self.clone())
    }

    fn label(&self) -> String {
        format!("SPECKURT row {}", self.row)
    }
}

/// Attach kurtosis statistics to each integration
pub(crate) fn read(container: &Arc<Container>, integrations: &mut [Integration], defer: bool) -> Result<()> {
    let record = match container.record(SPECKURT) {
        Some(record) => record,
        None => return Ok(()),
    };
    if record.nrows() != integrations.len() {
        return Err(Error::invalid_value(
            SPECKURT,
            "rows",
            format!("{} rows for {} integrations", record.nrows(), integrations.len()),
        ));
    }
    let npol = dimension(record, "NPOL")?;
    let nchan = dimension(record, "NCHAN")?;
    cell_len(SPECKURT, "NCHAN", &[nchan])?;
    let nsums = cell_len(SPECKURT, "NPOL", &[npol, nchan])?;
    for (column, len) in [
        ("FIL_SUM", nsums),
        ("FIL_HIT", nchan),
        ("UNFIL_SUM", nsums),
        ("UNFIL_HIT", nchan),
    ] {
        check_repeat(record, column, len)?;
    }
    let factor = record.key_int("SK_INT")?.unwrap_or(0);
    let factor = u32::try_from(factor)
        .map_err(|_| Error::invalid_value(SPECKURT, "SK_INT", factor.to_string()))?;
    let threshold = record.key_float("SK_EXCIS")?.unwrap_or(0.0) as f32;

    for (row, integration) in integrations.iter_mut().enumerate() {
        let loader = KurtosisLoader {
            container: Arc::clone(container),
            row,
            npol,
            nchan,
        };
        let kurtosis = SpectralKurtosis::deferred(npol, nchan, factor, threshold, Box::new(loader));
        if !defer {
            kurtosis.data()?;
        }
        integration.add_extension(kurtosis);
    }
    Ok(())
}

pub(crate) fn write(archive: &Archive, container: &mut Container) -> Result<()> {
    let present: Vec<&SpectralKurtosis> = archive
        .integrations()
        .iter()
        .filter_map(|i| i.get::<SpectralKurtosis>())
        .collect();
    let first = match present.first() {
        Some(first) => *first,
        None => {
            container.delete_record(SPECKURT);
            return Ok(());
        }
    };
    if present.len() != archive.nsubint() {
        return Err(Error::invalid_state(format!(
            "spectral kurtosis on {} of {} integrations",
            present.len(),
            archive.nsubint()
        )));
    }
    let (npol, nchan) = (first.npol(), first.nchan());
    for kurtosis in &present {
        if (kurtosis.npol(), kurtosis.nchan()) != (npol, nchan)
            || kurtosis.integration_factor != first.integration_factor
            || kurtosis.excision_threshold.to_bits() != first.excision_threshold.to_bits()
        {
            return Err(Error::invalid_state(
                "spectral kurtosis parameters differ between integrations",
            ));
        }
    }
    check_finite(SPECKURT, "SK_EXCIS", &[first.excision_threshold])?;

    let record = writable_record(container, SPECKURT);
    record.set_keyword("NPOL", npol as i64);
    record.set_keyword("NCHAN", nchan as i64);
    record.set_keyword("SK_INT", i64::from(first.integration_factor));
    record.set_keyword("SK_EXCIS", f64::from(first.excision_threshold));
    ensure_column(record, "FIL_SUM", ColumnType::F32, npol * nchan)?;
    ensure_column(record, "FIL_HIT", ColumnType::I64, nchan)?;
    ensure_column(record, "UNFIL_SUM", ColumnType::F32, npol * nchan)?;
    ensure_column(record, "UNFIL_HIT", ColumnType::I64, nchan)?;
    record.set_rows(present.len());

    for (row, kurtosis) in present.iter().enumerate() {
        let data = kurtosis.data()?;
        check_finite(SPECKURT, "FIL_SUM", &data.filtered_sum)?;
        check_finite(SPECKURT, "UNFIL_SUM", &data.unfiltered_sum)?;
        record.write_col("FIL_SUM", row, &data.filtered_sum)?;
        record.write_col("FIL_HIT", row, &to_stored(&data.filtered_hits, "FIL_HIT")?)?;
        record.write_col("UNFIL_SUM", row, &data.unfiltered_sum)?;
        record.write_col("UNFIL_HIT", row, &to_stored(&data.unfiltered_hits, "UNFIL_HIT")?)?;
    }
    Ok(())
}

fn to_stored(hits: &[u64], column: &'static str) -> Result<Vec<i64>> {
    hits.iter()
        .map(|&h| i64::try_from(h).map_err(|_| Error::invalid_value(SPECKURT, column, h.to_string())))
        .collect()
}
