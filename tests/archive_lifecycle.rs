//! End-to-end archive lifecycle through the public facade
//!
//! Create, persist, reload, edit and persist again, with configuration
//! read from a `psrstore.toml` file the way an application would.

use psrstore::{
    Archive, Container, Error, HistoryRow, Mjd, ObsInfo, PolnState, ProcessingHistory,
    StoreConfig, CONFIG_FILE_NAME,
};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn ramp(nbin: usize, offset: f32) -> Vec<f32> {
    (0..nbin).map(|b| b as f32 + offset).collect()
}

#[test]
fn test_create_edit_reload() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("J0437-4715.psrc");

    let mut archive = Archive::new(2, 4, 8, 64).unwrap();
    assert_eq!(archive.state, PolnState::Stokes);
    archive.source = "J0437-4715".to_string();
    archive.centre_frequency = 1369.0;
    archive.bandwidth = 256.0;
    archive.reference_epoch = Mjd::new(56000, 100, 0.25).unwrap();
    archive.getadd::<ObsInfo>().telescope = "Parkes".to_string();
    for isub in 0..2 {
        let integration = archive.integration_mut(isub).unwrap();
        integration.set_duration(60.0);
        for ichan in 0..8 {
            integration
                .set_frequency(ichan, 1241.0 + 32.0 * (ichan as f64 + 0.5))
                .unwrap();
            integration
                .profile_mut(0, ichan)
                .unwrap()
                .set_amps(&ramp(64, ichan as f32))
                .unwrap();
        }
    }
    archive.record_history("psrstore create");
    let report = archive.unload(&path).unwrap();
    assert_eq!(report.path, path);
    assert!(report.bytes > 0);

    let mut loaded = Archive::load(&path).unwrap();
    assert_eq!(loaded.nsubint(), 2);
    assert_eq!(loaded.reference_epoch, archive.reference_epoch);
    assert_eq!(loaded.get::<ObsInfo>().unwrap().telescope, "Parkes");
    assert_eq!(
        loaded.integration(1).unwrap().profile(0, 5).unwrap().get_amps().unwrap(),
        &ramp(64, 5.0)[..]
    );

    // grow by one integration and halve the resolution
    loaded.resize(3).unwrap();
    loaded.resize_nbin(32).unwrap();
    loaded.integration_mut(2).unwrap().set_weight(3, 0.0).unwrap();
    loaded.record_history("psrstore edit");
    loaded.unload(&path).unwrap();

    let reloaded = Archive::load(&path).unwrap();
    assert_eq!(reloaded.nsubint(), 3);
    assert_eq!(reloaded.nbin(), 32);
    assert_eq!(reloaded.integration(2).unwrap().weight(3).unwrap(), 0.0);
    assert_eq!(
        reloaded.integration(0).unwrap().profile(0, 2).unwrap().get_amps().unwrap(),
        &ramp(32, 2.0)[..]
    );
    let history = reloaded.get::<ProcessingHistory>().unwrap();
    let commands: Vec<&str> = history.rows.iter().map(|r| r.command.as_str()).collect();
    assert_eq!(commands, vec!["psrstore create", "psrstore edit"]);
    assert_eq!(history.last().map(|r: &HistoryRow| r.nbin), Some(32));
}

#[test]
fn test_configuration_file_drives_codec() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join(CONFIG_FILE_NAME);
    StoreConfig::write_default_if_missing(&config_path).unwrap();
    assert_eq!(StoreConfig::from_file(&config_path).unwrap(), StoreConfig::default());

    let config = StoreConfig {
        amp_storage: "swap".to_string(),
        swap_dir: Some(dir.path().to_path_buf()),
        quantize_amps: true,
        ..StoreConfig::default()
    };
    config.write_to_file(&config_path).unwrap();
    let config = StoreConfig::from_file(&config_path).unwrap();
    assert!(config.quantize_amps);

    let path = dir.path().join("obs.psrc");
    let mut archive = Archive::new(1, 1, 2, 128).unwrap();
    archive
        .integration_mut(0)
        .unwrap()
        .profile_mut(0, 1)
        .unwrap()
        .set_amps(&ramp(128, -64.0))
        .unwrap();
    archive.unload_with(&path, &config).unwrap();

    let loaded = Archive::load_with(&path, &config).unwrap();
    assert!(loaded.storage().is_swap());
    let amps = loaded.integration(0).unwrap().profile(0, 1).unwrap().get_amps().unwrap();
    for (a, b) in amps.iter().zip(ramp(128, -64.0)) {
        assert!((a - b).abs() < 0.01);
    }
}

#[test]
fn test_custom_template_fills_missing_layout() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("minimal.toml");
    std::fs::write(
        &template,
        r#"
[[record]]
name = "PRIMARY"

[[record.keyword]]
name = "TELESCOP"
value = "GBT"

[[record]]
name = "OBSLOG"

[[record.keyword]]
name = "NOTE"
value = "site specific"
"#,
    )
    .unwrap();
    let config = StoreConfig {
        template: Some(template),
        ..StoreConfig::default()
    };

    let path = dir.path().join("obs.psrc");
    let archive = Archive::new(1, 1, 4, 16).unwrap();
    archive.unload_with(&path, &config).unwrap();

    let container = Container::open(&path).unwrap();
    let names = container.record_names();
    assert!(names.contains(&"SUBINT"));
    assert!(names.contains(&"OBSLOG"));
    assert!(!names.contains(&"HISTORY"));

    let loaded = Archive::load(&path).unwrap();
    assert_eq!((loaded.nchan(), loaded.nbin()), (4, 16));
    // OBSLOG is not a known record, so it rides along as an unknown slot
    assert_eq!(loaded.extensions().len(), 1);
}

#[test]
fn test_invalid_configuration_rejected() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        amp_storage: "tape".to_string(),
        ..StoreConfig::default()
    };
    let archive = Archive::new(1, 1, 1, 8).unwrap();
    let err = archive
        .unload_with(dir.path().join("obs.psrc"), &config)
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
