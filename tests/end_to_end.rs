//! Configuration file to finished acquisition.

use std::io::Write;
use std::path::Path;

use rust_mda::daq_experiment::{RunOutcome, SliceMode};
use rust_mda::{plan, run_acquisition, AppConfig};

fn example_config() -> AppConfig {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/mda.example.toml");
    AppConfig::load_from(path).unwrap()
}

#[test]
fn example_config_is_valid() {
    let config = example_config();
    config.validate().unwrap();
    assert_eq!(config.acquisition.slice_mode, SliceMode::Relative);
    assert_eq!(config.presets.presets("Channel"), vec!["DAPI", "FITC"]);

    // 3 time points x 2 positions x 3 slices x 2 channels
    let steps = plan(&config).unwrap();
    assert_eq!(steps.len(), 36);
    assert_eq!(steps.len(), config.acquisition.num_frames());
}

#[test]
fn example_config_runs_to_completion() {
    let mut config = example_config();
    config.acquisition.time_intervals_ms = vec![0.0; 3];
    config.camera.width = 64;
    config.camera.height = 64;
    config.buffer.memory_mb = 4;

    let summary = run_acquisition(&config, |_, _| {}).unwrap();
    assert!(summary.report.is_success(), "{summary}");
    assert_eq!(summary.report.frames_produced, 36);
    assert_eq!(summary.report.steps_completed, 36);
    assert_eq!(summary.drained.frames, 36);
    assert_eq!(summary.drained.bytes, 36 * 64 * 64 * 2);
}

#[test]
fn config_from_temp_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [buffer]
        memory_mb = 1

        [camera]
        width = 32
        height = 32
        depth = 1

        [acquisition]
        slices = [0.0, 5.0, 10.0]
        autofocus = true
        "#
    )
    .unwrap();

    let config = AppConfig::load_from(file.path()).unwrap();
    let summary = run_acquisition(&config, |_, _| {}).unwrap();
    assert!(matches!(summary.report.outcome, RunOutcome::Finished));
    assert_eq!(summary.drained.frames, 3);
}

#[test]
fn invalid_config_is_rejected_before_running() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [[acquisition.channels]]
        group = "Channel"
        name = "Cy5"
        exposure_ms = 10.0
        "#
    )
    .unwrap();

    let config = AppConfig::load_from(file.path()).unwrap();
    let err = run_acquisition(&config, |_, _| {}).unwrap_err();
    assert!(err.to_string().contains("Cy5"), "{err:#}");
}
