//! Primary header: identity, pointing centre, epoch, receiver

use psrstore_core::{Error, Frame, Mjd, Result, SkyCoord};
use psrstore_durability::Record;
use tracing::warn;

use super::migration::{FieldReader, Revision};
use super::{check_finite, PRIMARY};
use crate::extensions::{Basis, FeedTracking, HeaderInfo, ObsInfo, Receiver};
use crate::model::{Archive, ObservationType};

/// Keywords owned by [`HeaderInfo`]
const HEADER_INFO_KEYS: [&str; 5] = ["DATE", "TRK_MODE", "STT_DATE", "STT_TIME", "STT_LST"];

/// Keywords owned by [`ObsInfo`]
const OBS_INFO_KEYS: [&str; 3] = ["OBSERVER", "PROJID", "TELESCOP"];

/// Keywords owned by [`Receiver`]
const RECEIVER_KEYS: [&str; 6] = ["FRONTEND", "FD_POLN", "XPOL_ANG", "FD_MODE", "ATTEN_A", "ATTEN_B"];

/// Decoded primary header
#[derive(Debug, Clone, Default)]
pub(crate) struct PrimaryHeader {
    pub revision: Option<Revision>,
    pub revision_text: Option<String>,
    pub source: String,
    pub coordinates: SkyCoord,
    pub centre_frequency: Option<f64>,
    pub bandwidth: Option<f64>,
    pub dispersion_measure: f64,
    pub reference_epoch: Mjd,
    pub obs_type: ObservationType,
    pub obs_info: Option<ObsInfo>,
    pub header_info: Option<HeaderInfo>,
    pub receiver: Option<Receiver>,
}

impl PrimaryHeader {
    /// Copy the decoded fields into `archive`
    pub fn apply(self, archive: &mut Archive) {
        archive.source = self.source;
        archive.coordinates = self.coordinates;
        archive.dispersion_measure = self.dispersion_measure;
        archive.reference_epoch = self.reference_epoch;
        archive.obs_type = self.obs_type;
        if let Some(mhz) = self.centre_frequency {
            archive.centre_frequency = mhz;
        }
        if let Some(mhz) = self.bandwidth {
            archive.bandwidth = mhz;
        }
        archive.set_file_revision(self.revision_text);
        if let Some(info) = self.obs_info {
            archive.add_extension(info);
        }
        if let Some(header) = self.header_info {
            archive.add_extension(header);
        }
        if let Some(receiver) = self.receiver {
            archive.add_extension(receiver);
        }
    }
}

pub(crate) fn read(record: &Record) -> Result<PrimaryHeader> {
    let revision_text = record.key_str("HDRVER")?.map(|s| s.trim().to_string());
    let revision = revision_text.as_deref().and_then(Revision::parse);
    if revision.is_none() {
        warn!(
            target: "psrstore::codec",
            hdrver = revision_text.as_deref().unwrap_or(""),
            "Unknown header revision; accepting legacy fields"
        );
    }
    let fields = FieldReader::new(record, revision);

    let obs_type = match record.key_str("OBS_MODE")? {
        Some(label) => {
            let obs_type = ObservationType::parse(label);
            if obs_type == ObservationType::Unknown {
                warn!(target: "psrstore::codec", mode = label, "Unrecognised observation mode");
            }
            obs_type
        }
        None => ObservationType::Pulsar,
    };

    Ok(PrimaryHeader {
        revision,
        revision_text,
        source: record.key_str("SRC_NAME")?.unwrap_or_default().trim().to_string(),
        coordinates: read_coordinates(&fields)?,
        centre_frequency: fields.key_float("OBSFREQ")?,
        bandwidth: fields.key_float("OBSBW")?,
        dispersion_measure: fields.key_float("CHAN_DM")?.unwrap_or(0.0),
        reference_epoch: read_epoch(record)?,
        obs_type,
        obs_info: read_obs_info(record)?,
        header_info: read_header_info(&fields)?,
        receiver: read_receiver(record)?,
    })
}

fn read_coordinates(fields: &FieldReader<'_>) -> Result<SkyCoord> {
    let record = fields.record();
    let mode = fields
        .key_label("COORD_MD")?
        .unwrap_or_else(|| "J2000".to_string());
    let lon = record.key_str("STT_CRD1")?.unwrap_or("0");
    let lat = record.key_str("STT_CRD2")?.unwrap_or("0");
    match mode.trim().to_ascii_uppercase().as_str() {
        "J2000" => Ok(SkyCoord::equatorial(
            SkyCoord::parse_hms(lon).map_err(|_| Error::invalid_value(PRIMARY, "STT_CRD1", lon))?,
            SkyCoord::parse_dms(lat).map_err(|_| Error::invalid_value(PRIMARY, "STT_CRD2", lat))?,
        )),
        "GAL" | "GALACTIC" => Ok(SkyCoord::galactic(
            lon.trim()
                .parse()
                .map_err(|_| Error::invalid_value(PRIMARY, "STT_CRD1", lon))?,
            lat.trim()
                .parse()
                .map_err(|_| Error::invalid_value(PRIMARY, "STT_CRD2", lat))?,
        )),
        _ => {
            warn!(target: "psrstore::codec", mode = mode.as_str(), "Unsupported coordinate mode; position left at origin");
            Ok(SkyCoord::default())
        }
    }
}

fn read_epoch(record: &Record) -> Result<Mjd> {
    let day = match record.key_int("STT_IMJD")? {
        Some(day) => day,
        None => {
            warn!(target: "psrstore::codec", "No STT_IMJD; reference epoch set to zero");
            return Ok(Mjd::default());
        }
    };
    let secs = match record.key_int("STT_SMJD")? {
        Some(secs) => secs,
        None => {
            warn!(target: "psrstore::codec", "No STT_SMJD; start of day assumed");
            0
        }
    };
    let offs = record.key_float("STT_OFFS")?.unwrap_or(0.0);
    let secs = u32::try_from(secs)
        .map_err(|_| Error::invalid_value(PRIMARY, "STT_SMJD", secs.to_string()))?;
    Mjd::new(day, secs, offs).map_err(|_| {
        Error::invalid_value(PRIMARY, "STT_OFFS", format!("{} s + {}", secs, offs))
    })
}

fn read_obs_info(record: &Record) -> Result<Option<ObsInfo>> {
    if !OBS_INFO_KEYS.iter().any(|k| record.has_keyword(k)) {
        return Ok(None);
    }
    let text = |key: &str| -> Result<String> {
        Ok(record.key_str(key)?.unwrap_or_default().trim().to_string())
    };
    Ok(Some(ObsInfo {
        observer: text("OBSERVER")?,
        project_id: text("PROJID")?,
        telescope: text("TELESCOP")?,
    }))
}

fn read_header_info(fields: &FieldReader<'_>) -> Result<Option<HeaderInfo>> {
    let record = fields.record();
    let (start_date, start_time) = fields.start_date_time()?;
    let present = HEADER_INFO_KEYS.iter().any(|k| record.has_keyword(k))
        || start_date.is_some()
        || start_time.is_some();
    if !present {
        return Ok(None);
    }
    Ok(Some(HeaderInfo {
        creation_date: record.key_str("DATE")?.unwrap_or_default().to_string(),
        track_mode: record.key_str("TRK_MODE")?.unwrap_or_default().to_string(),
        start_date: start_date.unwrap_or_default(),
        start_time: start_time.unwrap_or_default(),
        start_lst: record.key_float("STT_LST")?.unwrap_or(0.0),
    }))
}

fn read_receiver(record: &Record) -> Result<Option<Receiver>> {
    let name = match record.key_str("FRONTEND")? {
        Some(name) => name.trim().to_string(),
        None => return Ok(None),
    };
    let basis = match record.key_str("FD_POLN")? {
        Some(label) => {
            Basis::parse(label).ok_or_else(|| Error::invalid_value(PRIMARY, "FD_POLN", label))?
        }
        None => Basis::default(),
    };
    let tracking = match record.key_str("FD_MODE")? {
        Some(label) => FeedTracking::parse(label)
            .ok_or_else(|| Error::invalid_value(PRIMARY, "FD_MODE", label))?,
        None => FeedTracking::default(),
    };
    Ok(Some(Receiver {
        name,
        basis,
        tracking,
        xpol_angle_deg: record.key_float("XPOL_ANG")?.unwrap_or(0.0),
        atten_a: record.key_float("ATTEN_A")?.unwrap_or(0.0),
        atten_b: record.key_float("ATTEN_B")?.unwrap_or(0.0),
    }))
}

pub(crate) fn write(archive: &Archive, record: &mut Record) -> Result<()> {
    check_finite(PRIMARY, "OBSFREQ", &[archive.centre_frequency])?;
    check_finite(PRIMARY, "OBSBW", &[archive.bandwidth])?;
    check_finite(PRIMARY, "CHAN_DM", &[archive.dispersion_measure])?;
    check_finite(PRIMARY, "STT_CRD1", &[archive.coordinates.lon_deg])?;
    check_finite(PRIMARY, "STT_CRD2", &[archive.coordinates.lat_deg])?;

    record.set_keyword("HDRVER", Revision::CURRENT.to_string());
    record.set_keyword("OBS_MODE", archive.obs_type.label());
    record.set_keyword("SRC_NAME", archive.source.as_str());

    match archive.coordinates.frame {
        Frame::Equatorial => {
            record.set_keyword("COORD_MD", "J2000");
            record.set_keyword("STT_CRD1", archive.coordinates.lon_hms());
            record.set_keyword("STT_CRD2", archive.coordinates.lat_dms());
        }
        Frame::Galactic => {
            record.set_keyword("COORD_MD", "GAL");
            record.set_keyword("STT_CRD1", format!("{:.6}", archive.coordinates.lon_deg));
            record.set_keyword("STT_CRD2", format!("{:.6}", archive.coordinates.lat_deg));
        }
    }

    let epoch = archive.reference_epoch;
    record.set_keyword("STT_IMJD", epoch.day());
    record.set_keyword("STT_SMJD", i64::from(epoch.secs()));
    record.set_keyword("STT_OFFS", epoch.frac());

    record.set_keyword("OBSFREQ", archive.centre_frequency);
    record.set_keyword("OBSBW", archive.bandwidth);
    record.set_keyword("OBSNCHAN", archive.nchan() as i64);
    record.set_keyword("CHAN_DM", archive.dispersion_measure);

    match archive.get::<ObsInfo>() {
        Some(info) => {
            record.set_keyword("OBSERVER", info.observer.as_str());
            record.set_keyword("PROJID", info.project_id.as_str());
            record.set_keyword("TELESCOP", info.telescope.as_str());
        }
        None => delete_keys(record, &OBS_INFO_KEYS),
    }

    match archive.get::<HeaderInfo>() {
        Some(header) => {
            check_finite(PRIMARY, "STT_LST", &[header.start_lst])?;
            record.set_keyword("DATE", header.creation_date.as_str());
            record.set_keyword("TRK_MODE", header.track_mode.as_str());
            record.set_keyword("STT_DATE", header.start_date.as_str());
            record.set_keyword("STT_TIME", header.start_time.as_str());
            record.set_keyword("STT_LST", header.start_lst);
        }
        None => delete_keys(record, &HEADER_INFO_KEYS),
    }

    match archive.get::<Receiver>() {
        Some(receiver) => {
            check_finite(
                PRIMARY,
                "XPOL_ANG",
                &[receiver.xpol_angle_deg, receiver.atten_a, receiver.atten_b],
            )?;
            record.set_keyword("FRONTEND", receiver.name.as_str());
            record.set_keyword("FD_POLN", receiver.basis.label());
            record.set_keyword("XPOL_ANG", receiver.xpol_angle_deg);
            record.set_keyword("FD_MODE", receiver.tracking.label());
            record.set_keyword("ATTEN_A", receiver.atten_a);
            record.set_keyword("ATTEN_B", receiver.atten_b);
        }
        None => delete_keys(record, &RECEIVER_KEYS),
    }
    Ok(())
}

fn delete_keys(record: &mut Record, keys: &[&str]) {
    for key in keys {
        record.delete_keyword(key);
    }
}
