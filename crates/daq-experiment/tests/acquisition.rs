//! End-to-end runs through a `DeviceRegistry` populated with mock devices.

use std::sync::Arc;

use daq_core::metadata::tags;
use daq_core::{HardwareBoundary, ImageShape};
use daq_driver_mock::{
    ErrorConfig, ErrorScenario, MockCamera, MockStage, MockStateDevice, MockXYStage,
};
use daq_experiment::{
    AcquisitionRunner, AcquisitionSettings, ChannelSpec, PositionBundle, RunOutcome, RunnerState,
    SliceMode,
};
use daq_hardware::{ConfigPresets, DeviceComponents, DeviceRegistry, PropertySetting};
use daq_storage::CircularFrameBuffer;
use serde_json::json;

struct Rig {
    hw: Arc<dyn HardwareBoundary>,
    buffer: Arc<CircularFrameBuffer>,
    focus: Arc<MockStage>,
    xy: Arc<MockXYStage>,
    wheel: Arc<MockStateDevice>,
}

fn rig(camera: MockCamera, focus: MockStage, budget_mb: usize) -> Rig {
    let buffer = Arc::new(CircularFrameBuffer::new(budget_mb));
    let mut registry = DeviceRegistry::new(Arc::clone(&buffer));

    let focus = Arc::new(focus);
    let xy = Arc::new(MockXYStage::new());
    let wheel = Arc::new(MockStateDevice::new("Wheel").with_property("State", json!(0)));
    let camera = Arc::new(camera);

    registry
        .register("Z", DeviceComponents::new().movable(focus.clone()))
        .unwrap();
    registry
        .register("XY", DeviceComponents::new().xy_stage(xy.clone()))
        .unwrap();
    registry
        .register("Wheel", DeviceComponents::new().settable(wheel.clone()))
        .unwrap();
    registry
        .register("Camera", DeviceComponents::new().camera(camera.clone()))
        .unwrap();
    registry.set_focus_device("Z").unwrap();

    let mut presets = ConfigPresets::new();
    presets.add_setting("Channel", "DAPI", PropertySetting::new("Wheel", "State", 1));
    presets.add_setting("Channel", "FITC", PropertySetting::new("Wheel", "State", 2));
    registry.set_presets(presets).unwrap();

    buffer
        .initialize(1, ImageShape::new(16, 16, 1))
        .unwrap();

    Rig {
        hw: Arc::new(registry),
        buffer,
        focus,
        xy,
        wheel,
    }
}

fn small_camera() -> MockCamera {
    MockCamera::builder()
        .shape(ImageShape::new(16, 16, 1))
        .build()
}

#[test]
fn full_acquisition_fills_buffer_in_order() {
    let rig = rig(small_camera(), MockStage::new(), 1);
    let settings = AcquisitionSettings {
        time_intervals_ms: vec![0.0, 10.0],
        positions: vec![
            PositionBundle::new("A1").with_xy("XY", 0.0, 0.0),
            PositionBundle::new("A2").with_xy("XY", 100.0, 0.0),
        ],
        slices: vec![1.0, 2.0],
        channels: vec![
            ChannelSpec::new("Channel", "DAPI", 5.0),
            ChannelSpec::new("Channel", "FITC", 7.0),
        ],
        ..AcquisitionSettings::default()
    };
    let total = settings.num_frames();
    assert_eq!(total, 16);

    let runner = AcquisitionRunner::new(Arc::clone(&rig.hw));
    let run_id = runner.start(settings).unwrap();
    let report = runner.wait().unwrap();

    assert!(report.is_success(), "{report}");
    assert_eq!(report.run_id, run_id);
    assert_eq!(report.frames_produced, total);
    assert_eq!(runner.state(), RunnerState::Finished);
    assert_eq!(rig.buffer.remaining_image_count(), total);

    // positions outer, time inner, slices outer, channels inner
    let first = rig.buffer.next_image().unwrap();
    let md = first.find_image(0).unwrap().metadata();
    assert_eq!(md.get_str(tags::POSITION_NAME), Some("A1"));
    assert_eq!(md.get_str(tags::FRAME), Some("0"));
    assert_eq!(md.get_str(tags::CHANNEL), Some("DAPI"));

    let second = rig.buffer.next_image().unwrap();
    let md = second.find_image(0).unwrap().metadata();
    assert_eq!(md.get_str(tags::CHANNEL), Some("FITC"));
    assert_eq!(md.get_str(tags::SLICE_INDEX), Some("0"));

    let mut last = None;
    while let Some(frame) = rig.buffer.next_image() {
        last = Some(frame);
    }
    let last = last.unwrap();
    let md = last.find_image(0).unwrap().metadata();
    assert_eq!(md.get_str(tags::POSITION_NAME), Some("A2"));
    assert_eq!(md.get_str(tags::FRAME), Some("1"));
    assert_eq!(md.get_str(tags::SLICE_INDEX), Some("1"));
    assert_eq!(md.get_str(tags::CHANNEL_INDEX), Some("1"));

    // every step revisits its position and reapplies its channel preset
    assert_eq!(rig.xy.history().len(), total);
    assert_eq!(rig.xy.history()[total - 1], (100.0, 0.0));
    let writes = rig.wheel.write_log();
    assert_eq!(writes.len(), total);
    assert_eq!(writes[0], ("State".to_string(), json!(1)));
    assert_eq!(writes[1], ("State".to_string(), json!(2)));
}

#[test]
fn overflow_stops_run_early() {
    // 512x512x2 frames in a 1 MB budget leave room for two frames
    let rig = rig(MockCamera::new(), MockStage::new(), 1);
    rig.buffer
        .initialize(1, ImageShape::new(512, 512, 2))
        .unwrap();
    assert_eq!(rig.buffer.capacity(), 2);

    let runner = AcquisitionRunner::new(Arc::clone(&rig.hw));
    runner
        .start(AcquisitionSettings {
            slices: vec![0.0, 1.0, 2.0, 3.0, 4.0],
            ..AcquisitionSettings::default()
        })
        .unwrap();
    let report = runner.wait().unwrap();

    assert!(matches!(
        report.outcome,
        RunOutcome::Overflow {
            produced: 2,
            total: 5
        }
    ));
    assert_eq!(runner.state(), RunnerState::Stopped);
    assert!(rig.buffer.overflow());
    // the third slice was moved to and snapped before the overflow was seen
    assert_eq!(rig.focus.history(), vec![0.0, 1.0, 2.0]);
}

#[test]
fn injected_snap_failure_reports_step_indices() {
    let camera = MockCamera::builder()
        .shape(ImageShape::new(16, 16, 1))
        .error_config(ErrorConfig::scenario(ErrorScenario::FailOnCall {
            operation: "snap",
            call: 3,
        }))
        .build();
    let rig = rig(camera, MockStage::new(), 1);

    let runner = AcquisitionRunner::new(Arc::clone(&rig.hw));
    runner
        .start(AcquisitionSettings {
            slices: vec![0.0, 1.0, 2.0, 3.0],
            ..AcquisitionSettings::default()
        })
        .unwrap();
    let report = runner.wait().unwrap();

    match &report.outcome {
        RunOutcome::Failed(err) => {
            assert_eq!(err.indices.slice, Some(2));
            assert_eq!(err.indices.time, None);
            assert!(err.to_string().contains("slice=2"), "{err}");
            assert!(err.to_string().contains("Snapping image"), "{err}");
        }
        other => panic!("unexpected outcome {other}"),
    }
    assert_eq!(report.frames_produced, 2);
    assert_eq!(runner.state(), RunnerState::Failed);
    assert_eq!(rig.buffer.remaining_image_count(), 2);
}

#[test]
fn relative_slices_follow_initial_focus() {
    let focus = MockStage::builder().initial_position(50.0).build();
    let rig = rig(small_camera(), focus, 1);

    let runner = AcquisitionRunner::new(Arc::clone(&rig.hw));
    runner
        .start(AcquisitionSettings {
            slices: vec![-1.0, 0.0, 1.0],
            slice_mode: SliceMode::Relative,
            ..AcquisitionSettings::default()
        })
        .unwrap();
    assert!(runner.wait().unwrap().is_success());
    assert_eq!(rig.focus.history(), vec![49.0, 50.0, 51.0]);

    let frame = rig.buffer.nth_from_top_image(0).unwrap();
    assert_eq!(
        frame.find_image(0).unwrap().metadata().get_str(tags::Z_POSITION_UM),
        Some("51")
    );
}

#[test]
fn unknown_preset_fails_first_step() {
    let rig = rig(small_camera(), MockStage::new(), 1);
    let runner = AcquisitionRunner::new(Arc::clone(&rig.hw));
    runner
        .start(AcquisitionSettings {
            channels: vec![ChannelSpec::new("Channel", "Cy5", 10.0)],
            ..AcquisitionSettings::default()
        })
        .unwrap();
    let report = runner.wait().unwrap();
    assert!(matches!(report.outcome, RunOutcome::Failed(_)));
    assert_eq!(report.frames_produced, 0);
    assert!(rig.wheel.write_log().is_empty());
}

#[test]
fn settings_load_from_toml() {
    let text = r#"
        time_intervals_ms = [0.0, 500.0]
        slices = [-2.0, 0.0, 2.0]
        slice_mode = "relative"
        channels_first = false

        [[channels]]
        group = "Channel"
        name = "DAPI"
        exposure_ms = 20.0

        [[positions]]
        label = "Well-A1"
        stages = [{ stage = "Z2", position = 10.0 }]
        xy = [{ stage = "XY", x = 1.0, y = 2.0 }]
    "#;
    let settings: AcquisitionSettings = toml::from_str(text).unwrap();
    assert_eq!(settings.slice_mode, SliceMode::Relative);
    assert!(settings.positions_first);
    assert!(!settings.channels_first);
    assert_eq!(settings.positions[0].xy[0].y, 2.0);
    assert_eq!(settings.num_frames(), 2 * 3);
    settings.validate().unwrap();
}
