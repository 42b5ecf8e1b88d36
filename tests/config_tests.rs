// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

mod common;

use tether_camera::Config;
use tether_camera::constants::{
    FramePacing, MAX_FRAME_BYTES, RECORDING_FPS, ShutterSequence, StopSequence,
};
use tether_camera::errors::ConfigError;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.output_fps, RECORDING_FPS);
    assert_eq!(config.pacing, FramePacing::Drop);
    assert_eq!(config.settle_delay_ms, 500);
    assert_eq!(config.routing_wait_ms, 5000);
    assert_eq!(config.max_frame_bytes, MAX_FRAME_BYTES);
    assert_eq!(config.stop_sequence, StopSequence::DisableDofPreviewThenRouting);
    assert_eq!(config.shutter_sequence, ShutterSequence::PressRelease);
    assert!(config.image_dir.ends_with("Camera"));
    assert!(config.video_dir.ends_with("Camera"));
}

#[test]
fn test_config_save_and_load() {
    let root = common::temp_root("config");
    let path = root.join("nested").join("config.json");
    let config = Config {
        output_fps: 24,
        pacing: FramePacing::Fill,
        shutter_sequence: ShutterSequence::TakePicture,
        ..common::test_config(&root)
    };

    config.save(&path).unwrap();
    assert_eq!(Config::load(&path).unwrap(), config);
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn test_config_partial_file_uses_defaults() {
    let root = common::temp_root("config");
    std::fs::create_dir_all(&root).unwrap();
    let path = root.join("config.json");
    std::fs::write(&path, r#"{ "output_fps": 0, "pacing": "Fill" }"#).unwrap();

    let config = Config::load(&path).unwrap();
    // A zero rate cannot pace a recording
    assert_eq!(config.output_fps, RECORDING_FPS);
    assert_eq!(config.pacing, FramePacing::Fill);
    assert_eq!(config.settle_delay_ms, 500);
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn test_config_errors_name_the_file() {
    let root = common::temp_root("config");
    let missing = root.join("missing.json");
    match Config::load(&missing) {
        Err(ConfigError::Io { path, .. }) => assert_eq!(path, missing),
        other => panic!("expected io error, got {:?}", other),
    }

    std::fs::create_dir_all(&root).unwrap();
    let broken = root.join("broken.json");
    std::fs::write(&broken, "{ not json").unwrap();
    let err = Config::load(&broken).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("broken.json"));
    let _ = std::fs::remove_dir_all(&root);
}
