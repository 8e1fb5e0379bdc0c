//! Archive load/unload through the full codec
//!
//! Every test writes real files into a temporary directory and reads them
//! back through `Archive::load_with`, so the container format, the atomic
//! persist path and the codec are all exercised together.

use psrstore_core::{Error, Mjd, SkyCoord};
use psrstore_durability::{AtomicPersist, ColumnType, Container, Record};
use psrstore_engine::{
    Archive, ArchiveExtension, Basis, DeferredState, ExtensionSlot, FeedTracking, HeaderInfo,
    ObsInfo, Pointing, PolnCalibratorExtension, PolnState, ProcessingHistory, Receiver,
    SlotTag, SpectralKurtosis, StoreConfig,
};
use std::path::Path;
use tempfile::TempDir;

fn sample_amps(isub: usize, ipol: usize, ichan: usize, nbin: usize) -> Vec<f32> {
    (0..nbin)
        .map(|b| b as f32 * 0.5 + ipol as f32 * 3.0 + ichan as f32 * 0.25 + isub as f32)
        .collect()
}

fn sample_archive(nsub: usize, npol: usize, nchan: usize, nbin: usize) -> Archive {
    let mut archive = Archive::new(nsub, npol, nchan, nbin).unwrap();
    archive.source = "J1022+1001".to_string();
    archive.coordinates = SkyCoord::equatorial(180.0, -45.5);
    archive.centre_frequency = 1400.0;
    archive.bandwidth = 256.0;
    archive.dispersion_measure = 10.25;
    archive.rotation_measure = -3.5;
    archive.reference_epoch = Mjd::new(55000, 43200, 0.0).unwrap();

    let reference = archive.reference_epoch;
    for isub in 0..nsub {
        let integration = archive.integration_mut(isub).unwrap();
        integration.set_epoch(reference.add_seconds(10.0 * isub as f64));
        integration.set_duration(10.0);
        for ichan in 0..nchan {
            let freq = 1272.0 + (ichan as f64 + 0.5) * 256.0 / nchan as f64;
            integration.set_frequency(ichan, freq).unwrap();
        }
        for ipol in 0..npol {
            for ichan in 0..nchan {
                integration
                    .profile_mut(ipol, ichan)
                    .unwrap()
                    .set_amps(&sample_amps(isub, ipol, ichan, nbin))
                    .unwrap();
            }
        }
    }
    archive
}

fn with_extensions(mut archive: Archive) -> Archive {
    archive.add_extension(ObsInfo {
        observer: "wvs".to_string(),
        project_id: "P456".to_string(),
        telescope: "Parkes".to_string(),
    });
    archive.add_extension(Receiver {
        name: "MULTI".to_string(),
        basis: Basis::Circular,
        tracking: FeedTracking::ConstantPosition,
        xpol_angle_deg: 45.0,
        atten_a: 1.5,
        atten_b: 2.5,
    });
    archive.add_extension(HeaderInfo {
        creation_date: "2009-06-18T12:30:00".to_string(),
        track_mode: "TRACK".to_string(),
        start_date: "2009-06-18".to_string(),
        start_time: "12:00:00".to_string(),
        start_lst: 3600.0,
    });
    archive.record_history("pdv -t");
    for isub in 0..archive.nsubint() {
        archive
            .integration_mut(isub)
            .unwrap()
            .add_extension(Pointing {
                lst: 3600.0 + isub as f64,
                ra: 180.0,
                dec: -45.5,
                parallactic_angle: 12.5,
                ..Pointing::default()
            });
    }
    archive
}

fn edit_file(path: &Path, edit: impl FnOnce(&mut Container)) {
    let mut container = Container::open(path).unwrap();
    edit(&mut container);
    AtomicPersist::new(path)
        .run(|file| container.write_to(file))
        .unwrap();
}

fn assert_same_profiles(a: &Archive, b: &Archive) {
    assert_eq!(a.nsubint(), b.nsubint());
    for (x, y) in a.integrations().iter().zip(b.integrations()) {
        for (p, q) in x.profiles().iter().zip(y.profiles()) {
            assert_eq!(p.get_amps().unwrap(), q.get_amps().unwrap());
        }
    }
}

#[test]
fn test_round_trip_preserves_archive() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("obs.psrc");
    let archive = with_extensions(sample_archive(3, 2, 4, 16));
    archive.unload(&path).unwrap();

    let loaded = Archive::load(&path).unwrap();
    assert_eq!(loaded.source, "J1022+1001");
    assert_eq!(loaded.coordinates, archive.coordinates);
    assert_eq!(loaded.centre_frequency, 1400.0);
    assert_eq!(loaded.bandwidth, 256.0);
    assert_eq!(loaded.dispersion_measure, 10.25);
    assert_eq!(loaded.rotation_measure, -3.5);
    assert_eq!(loaded.reference_epoch, archive.reference_epoch);
    assert_eq!(loaded.state, PolnState::PPQQ);
    assert_eq!((loaded.npol(), loaded.nchan(), loaded.nbin()), (2, 4, 16));
    assert_eq!(loaded.file_revision(), Some("6.1"));

    assert_eq!(loaded.get::<ObsInfo>(), archive.get::<ObsInfo>());
    assert_eq!(loaded.get::<Receiver>(), archive.get::<Receiver>());
    assert_eq!(loaded.get::<HeaderInfo>(), archive.get::<HeaderInfo>());
    assert_eq!(
        loaded.get::<ProcessingHistory>(),
        archive.get::<ProcessingHistory>()
    );

    for (isub, (x, y)) in archive
        .integrations()
        .iter()
        .zip(loaded.integrations())
        .enumerate()
    {
        assert_eq!(y.epoch().seconds_since(&loaded.reference_epoch), 10.0 * isub as f64);
        assert_eq!(y.duration(), 10.0);
        assert_eq!(y.frequencies(), x.frequencies());
        assert_eq!(y.weights(), x.weights());
        assert_eq!(y.get::<Pointing>(), x.get::<Pointing>());
    }
    assert_same_profiles(&archive, &loaded);
}

#[test]
fn test_profiles_load_once_on_first_access() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("obs.psrc");
    sample_archive(2, 1, 2, 8).unload(&path).unwrap();

    let loaded = Archive::load(&path).unwrap();
    let profile = loaded.integration(1).unwrap().profile(0, 1).unwrap();
    assert_eq!(profile.amps_state(), DeferredState::Unloaded);

    let first = profile.get_amps().unwrap();
    assert_eq!(profile.amps_state(), DeferredState::Loaded);
    assert_eq!(first, &sample_amps(1, 0, 1, 8)[..]);
    let second = profile.get_amps().unwrap();
    assert!(std::ptr::eq(first.as_ptr(), second.as_ptr()));

    // untouched profiles stay unloaded
    let other = loaded.integration(0).unwrap().profile(0, 0).unwrap();
    assert_eq!(other.amps_state(), DeferredState::Unloaded);
}

#[test]
fn test_eager_load_when_deferral_disabled() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("obs.psrc");
    sample_archive(1, 1, 2, 8).unload(&path).unwrap();

    let config = StoreConfig {
        defer_amps: false,
        ..StoreConfig::default()
    };
    let loaded = Archive::load_with(&path, &config).unwrap();
    for profile in loaded.integration(0).unwrap().profiles() {
        assert_eq!(profile.amps_state(), DeferredState::Loaded);
    }
}

#[test]
fn test_attach_replaces_extension_of_same_kind() {
    let mut archive = sample_archive(0, 1, 1, 8);
    assert!(archive
        .add_extension(ObsInfo {
            observer: "first".to_string(),
            ..ObsInfo::default()
        })
        .is_none());
    let previous = archive.add_extension(ObsInfo {
        observer: "second".to_string(),
        ..ObsInfo::default()
    });
    assert_eq!(previous.unwrap().observer, "first");
    assert_eq!(archive.extensions().len(), 1);
    assert_eq!(archive.get::<ObsInfo>().unwrap().observer, "second");
}

#[test]
fn test_removed_extension_stays_removed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("obs.psrc");
    with_extensions(sample_archive(1, 1, 2, 8)).unload(&path).unwrap();

    let mut loaded = Archive::load(&path).unwrap();
    assert!(loaded.remove_extension::<Receiver>().is_some());
    loaded.unload(&path).unwrap();

    let container = Container::open(&path).unwrap();
    let primary = container.record("PRIMARY").unwrap();
    assert!(!primary.has_keyword("FRONTEND"));
    assert!(!primary.has_keyword("FD_POLN"));

    let reloaded = Archive::load(&path).unwrap();
    assert!(reloaded.get::<Receiver>().is_none());
    assert!(reloaded.get::<ObsInfo>().is_some());
}

#[test]
fn test_legacy_revision_reads_like_current() {
    let dir = TempDir::new().unwrap();
    let current = dir.path().join("current.psrc");
    let legacy = dir.path().join("legacy.psrc");
    let archive = with_extensions(sample_archive(2, 1, 2, 8));
    archive.unload(&current).unwrap();
    archive.unload(&legacy).unwrap();

    edit_file(&legacy, |container| {
        let primary = container.record_mut("PRIMARY").unwrap();
        primary.set_keyword("HDRVER", "1.0");
        primary.delete_keyword("STT_DATE");
        primary.delete_keyword("STT_TIME");
        primary.set_keyword("DATE-OBS", "2009-06-18T12:00:00");
        primary.set_keyword("COORD_MD", "EQUAT");
        for (current, old) in [("OBSFREQ", "FREQ"), ("OBSBW", "BW"), ("CHAN_DM", "DM")] {
            let value = primary.key_float(current).unwrap().unwrap();
            primary.delete_keyword(current);
            primary.set_keyword(old, value);
        }

        let subint = container.record_mut("SUBINT").unwrap();
        let durations: Vec<f64> = (0..subint.nrows())
            .map(|row| subint.read_scalar::<f64>("TSUBINT", row).unwrap())
            .collect();
        subint.delete_column("TSUBINT");
        subint.add_column("INT_TIME", ColumnType::F64, 1).unwrap();
        for (row, duration) in durations.into_iter().enumerate() {
            subint.write_scalar("INT_TIME", row, duration).unwrap();
        }
    });

    let a = Archive::load(&current).unwrap();
    let b = Archive::load(&legacy).unwrap();
    assert_eq!(b.file_revision(), Some("1.0"));
    assert_eq!(a.coordinates, b.coordinates);
    assert_eq!(a.centre_frequency, b.centre_frequency);
    assert_eq!(a.bandwidth, b.bandwidth);
    assert_eq!(a.dispersion_measure, b.dispersion_measure);
    assert_eq!(a.get::<HeaderInfo>(), b.get::<HeaderInfo>());
    for (x, y) in a.integrations().iter().zip(b.integrations()) {
        assert_eq!(x.duration(), y.duration());
    }
    assert_same_profiles(&a, &b);

    // writing always produces the current revision
    b.unload(&legacy).unwrap();
    let primary = Container::open(&legacy).unwrap();
    let primary = primary.record("PRIMARY").unwrap();
    assert_eq!(primary.key_str("HDRVER").unwrap(), Some("6.1"));
    assert!(primary.has_keyword("OBSFREQ"));
    assert!(!primary.has_keyword("FREQ"));
}

#[test]
fn test_non_finite_weight_on_disk_reads_as_zero() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("obs.psrc");
    sample_archive(1, 1, 3, 8).unload(&path).unwrap();
    edit_file(&path, |container| {
        container
            .record_mut("SUBINT")
            .unwrap()
            .write_col("DAT_WTS", 0, &[1.0f32, f32::NAN, 0.5])
            .unwrap();
    });

    let loaded = Archive::load(&path).unwrap();
    assert_eq!(loaded.integration(0).unwrap().weights(), &[1.0, 0.0, 0.5]);
}

#[test]
fn test_failed_unload_leaves_existing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("obs.psrc");
    let mut archive = sample_archive(1, 1, 2, 8);
    archive.unload(&path).unwrap();
    let before = std::fs::read(&path).unwrap();

    archive
        .integration_mut(0)
        .unwrap()
        .set_weight(1, f32::INFINITY)
        .unwrap();
    let err = archive.unload(&path).unwrap_err();
    assert!(matches!(err.root(), Error::NonFinite { field, index: 1, .. } if field == "DAT_WTS"));

    archive
        .integration_mut(0)
        .unwrap()
        .set_weight(1, 1.0)
        .unwrap();
    archive
        .integration_mut(0)
        .unwrap()
        .profile_mut(0, 1)
        .unwrap()
        .get_amps_mut()
        .unwrap()[3] = f32::NAN;
    let err = archive.unload(&path).unwrap_err();
    assert!(matches!(err.root(), Error::NonFinite { index: 11, .. }));

    assert_eq!(std::fs::read(&path).unwrap(), before);
    let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 1);
}

#[test]
fn test_quantized_round_trip_within_tolerance() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("obs.psrc");
    let archive = sample_archive(2, 2, 2, 64);
    let config = StoreConfig {
        quantize_amps: true,
        ..StoreConfig::default()
    };
    archive.unload_with(&path, &config).unwrap();

    let container = Container::open(&path).unwrap();
    let data = container.record("SUBINT").unwrap().column("DATA").unwrap();
    assert_eq!(data.ty, ColumnType::I16);

    let loaded = Archive::load(&path).unwrap();
    for (x, y) in archive.integrations().iter().zip(loaded.integrations()) {
        for (p, q) in x.profiles().iter().zip(y.profiles()) {
            let original = p.get_amps().unwrap();
            let range = original.iter().cloned().fold(f32::MIN, f32::max)
                - original.iter().cloned().fold(f32::MAX, f32::min);
            for (a, b) in original.iter().zip(q.get_amps().unwrap()) {
                assert!((a - b).abs() <= range / 32000.0 + 1e-3, "{} vs {}", a, b);
            }
        }
    }
}

#[test]
fn test_swap_backed_profiles() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("obs.psrc");
    let archive = sample_archive(2, 1, 4, 32);
    archive.unload(&path).unwrap();

    let config = StoreConfig {
        amp_storage: "swap".to_string(),
        swap_dir: Some(dir.path().to_path_buf()),
        ..StoreConfig::default()
    };
    let mut loaded = Archive::load_with(&path, &config).unwrap();
    assert!(loaded.storage().is_swap());
    assert_same_profiles(&archive, &loaded);

    loaded
        .integration_mut(1)
        .unwrap()
        .profile_mut(0, 2)
        .unwrap()
        .get_amps_mut()
        .unwrap()
        .fill(4.0);
    let copy = dir.path().join("copy.psrc");
    loaded.unload(&copy).unwrap();
    let reloaded = Archive::load(&copy).unwrap();
    assert_eq!(
        reloaded.integration(1).unwrap().profile(0, 2).unwrap().get_amps().unwrap(),
        &[4.0; 32][..]
    );
}

#[test]
fn test_unknown_record_passes_through() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("obs.psrc");
    sample_archive(1, 1, 1, 8).unload(&path).unwrap();

    let mut extra = Record::new("DIG_STAT");
    extra.set_keyword("DIG_MODE", "AUTO");
    extra.add_column("LEVELS", ColumnType::I32, 4).unwrap();
    extra.set_rows(1);
    extra.write_col("LEVELS", 0, &[1i32, 2, 3, 4]).unwrap();
    let expected = extra.clone();
    edit_file(&path, |container| container.insert_record(extra));

    let loaded = Archive::load(&path).unwrap();
    let tags: Vec<String> = loaded
        .extensions()
        .iter()
        .map(|slot| slot.tag().to_string())
        .collect();
    assert_eq!(tags, vec!["DIG_STAT".to_string()]);
    assert!(loaded.extensions().iter().any(|slot| matches!(
        (slot, slot.tag()),
        (ArchiveExtension::Unknown(_), SlotTag::Unknown("DIG_STAT"))
    )));

    let copy = dir.path().join("copy.psrc");
    loaded.unload(&copy).unwrap();
    let container = Container::open(&copy).unwrap();
    assert_eq!(container.record("DIG_STAT").unwrap(), &expected);
}

#[test]
fn test_kurtosis_and_calibrator_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("obs.psrc");
    let mut archive = sample_archive(2, 1, 2, 8);
    for isub in 0..2 {
        let mut kurtosis = SpectralKurtosis::new(1, 2, 256, 4.0);
        kurtosis.data_mut().unwrap().unfiltered_hits = vec![100, 200 + isub as u64];
        archive.integration_mut(isub).unwrap().add_extension(kurtosis);
    }
    let mut cal = PolnCalibratorExtension::new("SINGLE", 3, 2);
    cal.frequencies = vec![1336.0, 1464.0];
    cal.set_solution(1, vec![1.0, 0.5, -0.5], vec![0.25, 0.25, 1.0])
        .unwrap();
    archive.add_extension(cal.clone());
    archive.unload(&path).unwrap();

    let loaded = Archive::load(&path).unwrap();
    assert_eq!(loaded.get::<PolnCalibratorExtension>(), Some(&cal));
    let kurtosis = loaded
        .integration(1)
        .unwrap()
        .get::<SpectralKurtosis>()
        .unwrap();
    assert_eq!(kurtosis.data_state(), DeferredState::Unloaded);
    assert_eq!(kurtosis.data().unwrap().unfiltered_hits, vec![100, 201]);
    assert_eq!(kurtosis.integration_factor, 256);
}

#[test]
fn test_moments_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("obs.psrc");
    let mut archive = sample_archive(1, 1, 2, 4);
    archive
        .integration_mut(0)
        .unwrap()
        .profile_mut(0, 1)
        .unwrap()
        .set_moments(Some(vec![0.5, 1.0, 1.5, 2.0]))
        .unwrap();
    archive.unload(&path).unwrap();

    let loaded = Archive::load(&path).unwrap();
    let integration = loaded.integration(0).unwrap();
    assert_eq!(
        integration.profile(0, 1).unwrap().moments().unwrap(),
        Some(&[0.5f32, 1.0, 1.5, 2.0][..])
    );
    // profiles written without moments come back with zeros
    assert_eq!(
        integration.profile(0, 0).unwrap().moments().unwrap(),
        Some(&[0.0f32; 4][..])
    );
}

#[test]
fn test_missing_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let err = Archive::load(dir.path().join("absent.psrc")).unwrap_err();
    assert!(err.to_string().contains("absent.psrc"));
}

#[test]
fn test_oversized_dimensions_fail_without_allocating() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("obs.psrc");
    sample_archive(1, 1, 2, 8).unload(&path).unwrap();
    edit_file(&path, |container| {
        let subint = container.record_mut("SUBINT").unwrap();
        subint.delete_column("DAT_FREQ");
        subint.delete_column("DAT_WTS");
        subint.set_keyword("NCHAN", 1i64 << 40);
    });
    let err = Archive::load(&path).unwrap_err();
    assert!(matches!(err.root(), Error::InvalidValue { field, .. } if field == "NCHAN"));

    // a plausible count that disagrees with the stored samples
    edit_file(&path, |container| {
        container
            .record_mut("SUBINT")
            .unwrap()
            .set_keyword("NCHAN", 1000i64);
    });
    let err = Archive::load(&path).unwrap_err();
    assert!(matches!(err.root(), Error::InvalidValue { field, .. } if field == "DATA"));
}

#[test]
fn test_unreadable_archive_is_never_written() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("huge.psrc");
    // 4 x 16384 x 4097 samples per row is past the container repeat limit
    let archive = Archive::new(0, 4, 16384, 4097).unwrap();
    let err = archive.unload(&path).unwrap_err();
    assert!(matches!(err.root(), Error::InvalidValue { field, .. } if field == "DATA"));
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_unsupported_coordinate_mode_still_loads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("obs.psrc");
    let archive = sample_archive(1, 1, 2, 8);
    archive.unload(&path).unwrap();
    edit_file(&path, |container| {
        container
            .record_mut("PRIMARY")
            .unwrap()
            .set_keyword("COORD_MD", "AZEL");
    });

    let loaded = Archive::load(&path).unwrap();
    assert_eq!(loaded.coordinates, SkyCoord::default());
    assert_eq!(loaded.source, archive.source);
    assert_same_profiles(&archive, &loaded);
}
