// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the session state machine

mod common;

use common::{Harness, TIMEOUT, fast_device, wait_until};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;
use tether_camera::backends::camera::{
    DeviceCommand, DeviceStatus, PropertyEvent, PropertyId, ShutterButton, dof_preview,
    evf_output, save_to,
};
use tether_camera::backends::virtual_camera::GatewayCall;
use tether_camera::constants::{ShutterSequence, StopSequence};
use tether_camera::{CameraError, SessionState};

/// Records every display-source change as "has a surface"
fn watch_display(harness: &Harness) -> Arc<Mutex<Vec<bool>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    harness
        .camera
        .on_display_source_changed(Some(Arc::new(move |surface| {
            sink.lock().unwrap().push(surface.is_some());
        })));
    seen
}

fn watch_paths(register: impl FnOnce(tether_camera::session::AssetCallback)) -> mpsc::Receiver<PathBuf> {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    register(Arc::new(move |path: &Path| {
        let _ = tx.lock().unwrap().send(path.to_path_buf());
    }));
    rx
}

#[test]
fn test_play_streams_to_display() {
    let h = Harness::new(fast_device());
    let seen = watch_display(&h);

    h.camera.play().unwrap();

    assert_eq!(h.camera.state(), SessionState::Streaming);
    assert!(h.camera.is_capturing());
    assert_ne!(
        h.device.device_property(PropertyId::EvfOutputDevice).unwrap() & evf_output::PC,
        0
    );
    assert!(wait_until(TIMEOUT, || h.camera.display().current().is_some()));
    assert!(wait_until(TIMEOUT, || seen.lock().unwrap().first() == Some(&true)));

    let display = h.camera.display();
    let mut tick = 0;
    assert!(wait_until(TIMEOUT, || {
        tick += 1;
        display
            .on_refresh_tick(Duration::from_millis(tick * 16))
            .is_some()
    }));
    assert_eq!(display.presented_count(), 1);
}

#[test]
fn test_stop_ends_capture_and_clears_display_once() {
    let h = Harness::new(fast_device());
    let seen = watch_display(&h);
    h.camera.play().unwrap();
    assert!(wait_until(TIMEOUT, || h.camera.display().current().is_some()));

    h.camera.stop().unwrap();

    assert_eq!(h.camera.state(), SessionState::Open);
    assert!(wait_until(TIMEOUT, || !h.camera.is_capturing()));
    assert!(wait_until(TIMEOUT, || h.camera.display().current().is_none()));
    std::thread::sleep(Duration::from_millis(50));
    let cleared = seen.lock().unwrap().iter().filter(|s| !**s).count();
    assert_eq!(cleared, 1);
    assert_eq!(seen.lock().unwrap().last(), Some(&false));
}

#[test]
fn test_capture_follows_routing_across_play_stop() {
    let h = Harness::new(fast_device());

    for _ in 0..3 {
        h.camera.play().unwrap();
        assert!(h.camera.is_capturing());
        h.camera.stop().unwrap();
        assert!(wait_until(TIMEOUT, || !h.camera.is_capturing()));
    }
    h.camera.play().unwrap();
    h.camera.play().unwrap();
    assert!(h.camera.is_capturing());
    assert!(wait_until(TIMEOUT, || h.device.frames_served() > 5));

    // Every gateway call went through the device lock
    assert_eq!(h.device.max_concurrent_calls(), 1);
}

#[test]
fn test_stop_without_session_is_noop() {
    let h = Harness::new(fast_device());
    h.camera.stop().unwrap();
    assert_eq!(h.camera.state(), SessionState::Idle);
    assert!(h.device.calls().iter().all(|c| !matches!(c, GatewayCall::SetProperty(..))));
}

#[test]
fn test_stop_disables_depth_of_field_preview_first() {
    let device = fast_device();
    device.set_device_property(PropertyId::EvfDepthOfFieldPreview, dof_preview::ON);
    let h = Harness::new(device);
    h.camera.play().unwrap();
    h.device.clear_calls();

    h.camera.stop().unwrap();

    let writes: Vec<GatewayCall> = h
        .device
        .calls()
        .into_iter()
        .filter(|c| matches!(c, GatewayCall::SetProperty(..)))
        .collect();
    assert_eq!(
        writes,
        vec![
            GatewayCall::SetProperty(PropertyId::EvfDepthOfFieldPreview, dof_preview::OFF),
            GatewayCall::SetProperty(PropertyId::EvfOutputDevice, evf_output::TFT),
        ]
    );
}

#[test]
fn test_routing_only_stop_leaves_preview_alone() {
    let device = fast_device();
    device.set_device_property(PropertyId::EvfDepthOfFieldPreview, dof_preview::ON);
    let h = Harness::with_config(device, |c| c.stop_sequence = StopSequence::RoutingOnly);
    h.camera.play().unwrap();

    h.camera.stop().unwrap();

    assert_eq!(h.device.property_writes(PropertyId::EvfDepthOfFieldPreview), 0);
    assert_eq!(
        h.device.device_property(PropertyId::EvfDepthOfFieldPreview),
        Some(dof_preview::ON)
    );
}

#[test]
fn test_take_picture_presses_then_releases() {
    let h = Harness::new(fast_device());
    let images = watch_paths(|cb| h.camera.on_new_image(Some(cb)));
    h.camera.play().unwrap();
    assert_eq!(h.device.property_writes(PropertyId::SaveTo), 1);

    h.camera.take_picture().unwrap();

    // Save destination was already the host
    assert_eq!(h.device.property_writes(PropertyId::SaveTo), 1);
    let commands = h.device.commands();
    assert_eq!(
        &commands[commands.len() - 2..],
        &[
            DeviceCommand::PressShutter(ShutterButton::Completely),
            DeviceCommand::PressShutter(ShutterButton::Off),
        ]
    );

    h.device.pump_events();
    let path = images.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(path, h.root.join("images").join("IMG_0001.jpg"));
    let img = image::open(&path).unwrap();
    assert_eq!((img.width(), img.height()), (64, 48));
}

#[test]
fn test_take_picture_single_command_sequence() {
    let h = Harness::with_config(fast_device(), |c| {
        c.shutter_sequence = ShutterSequence::TakePicture
    });
    h.camera.init().unwrap();

    h.camera.take_picture().unwrap();

    assert_eq!(h.device.commands().last(), Some(&DeviceCommand::TakePicture));
    assert!(!h
        .device
        .commands()
        .contains(&DeviceCommand::PressShutter(ShutterButton::Completely)));
}

#[test]
fn test_take_picture_restores_host_destination() {
    let h = Harness::new(fast_device());
    h.camera.init().unwrap();
    // Someone switched the device back to its card
    h.device.set_device_property(PropertyId::SaveTo, save_to::CAMERA);
    h.device
        .fire_property_event(PropertyEvent::ValueChanged(PropertyId::SaveTo.code()));
    h.device.clear_calls();

    h.camera.take_picture().unwrap();

    assert_eq!(h.device.property_writes(PropertyId::SaveTo), 1);
    assert_eq!(
        &h.device.commands()[..2],
        &[DeviceCommand::UiLock, DeviceCommand::UiUnlock]
    );
    assert!(h
        .device
        .calls()
        .iter()
        .any(|c| matches!(c, GatewayCall::SetCapacity(cap) if cap.reset)));
}

#[test]
fn test_failed_press_reports_step_and_status() {
    let h = Harness::new(fast_device());
    h.camera.play().unwrap();
    h.device.fail_command(
        DeviceCommand::PressShutter(ShutterButton::Completely),
        Some(DeviceStatus::DEVICE_BUSY),
    );

    let err = h.camera.take_picture().unwrap_err();

    assert_eq!(err.status(), Some(DeviceStatus::DEVICE_BUSY));
    let message = err.to_string();
    assert!(message.contains("press shutter"), "{}", message);
    assert!(message.contains("0x00000081"), "{}", message);
    assert!(!h
        .device
        .commands()
        .contains(&DeviceCommand::PressShutter(ShutterButton::Off)));
    assert_eq!(h.camera.state(), SessionState::Streaming);
}

#[test]
fn test_begin_record_requires_session() {
    let h = Harness::new(fast_device());
    assert_eq!(h.camera.begin_record(), Err(CameraError::NotConnected));
    assert!(!h.camera.is_recording());
}

#[test]
fn test_begin_record_starts_live_view() {
    let h = Harness::new(fast_device());
    let videos = watch_paths(|cb| h.camera.on_new_video(Some(cb)));
    h.camera.init().unwrap();
    assert_eq!(h.camera.state(), SessionState::Open);

    h.camera.begin_record().unwrap();
    h.camera.begin_record().unwrap();

    assert_eq!(h.camera.state(), SessionState::Recording);
    assert!(h.camera.is_capturing());
    assert!(wait_until(TIMEOUT, || h.root.join("videos").exists()));
    std::thread::sleep(Duration::from_millis(150));

    let path = h.camera.end_record().unwrap().unwrap();
    assert_eq!(h.camera.state(), SessionState::Streaming);
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("frames"));
    assert_eq!(videos.recv_timeout(TIMEOUT).unwrap(), path);
    assert!(path.join("00000000.jpg").exists());
}

#[test]
fn test_shutdown_while_recording_then_reattach() {
    let h = Harness::new(fast_device());
    let videos = watch_paths(|cb| h.camera.on_new_video(Some(cb)));
    h.camera.play().unwrap();
    h.camera.begin_record().unwrap();
    assert!(wait_until(TIMEOUT, || h.root.join("videos").exists()));

    h.device.disconnect();

    assert!(wait_until(TIMEOUT, || h.camera.state() == SessionState::Idle));
    assert!(wait_until(TIMEOUT, || !h.camera.is_capturing()));
    assert!(!h.camera.is_recording());
    let recorded = videos.recv_timeout(TIMEOUT).unwrap();
    assert!(recorded.join("manifest.json").exists());
    assert!(h.device.has_attach_handler());

    // Plugging the device back in resumes live view on its own
    h.device.attach();

    assert!(wait_until(TIMEOUT, || h.camera.state() == SessionState::Streaming));
    assert!(wait_until(TIMEOUT, || h.camera.is_capturing()));
    assert!(h.device.is_session_open());
    assert_eq!(h.camera.device_name().as_deref(), Some("Virtual EOS"));
}

#[test]
fn test_attach_without_session_plays() {
    let h = Harness::new(fast_device().detached());
    assert!(matches!(h.camera.play(), Err(CameraError::DeviceNotFound(_))));

    h.device.attach();

    assert!(wait_until(TIMEOUT, || h.camera.state() == SessionState::Streaming));
}

#[test]
fn test_property_notification_updates_mirror() {
    let h = Harness::new(fast_device());
    h.camera.init().unwrap();
    assert_eq!(h.camera.property(PropertyId::WhiteBalance), Some(0));

    h.device.set_device_property(PropertyId::WhiteBalance, 3);
    h.device
        .fire_property_event(PropertyEvent::ValueChanged(PropertyId::WhiteBalance.code()));

    assert_eq!(h.camera.property(PropertyId::WhiteBalance), Some(3));
}

#[test]
fn test_exposure_mode_select_updates_exposure_mode() {
    let h = Harness::new(fast_device());
    h.camera.init().unwrap();

    h.device.set_device_property(PropertyId::AeMode, 1);
    h.device
        .fire_property_event(PropertyEvent::ValueChanged(PropertyId::AeModeSelect.code()));

    assert_eq!(h.camera.property(PropertyId::AeMode), Some(1));
}

#[test]
fn test_dispose_detaches_everything() {
    let h = Harness::new(fast_device());
    let seen = watch_display(&h);
    h.camera.play().unwrap();
    assert!(wait_until(TIMEOUT, || !seen.lock().unwrap().is_empty()));

    h.camera.dispose();

    assert_eq!(h.camera.state(), SessionState::Idle);
    assert!(!h.device.is_session_open());
    assert!(!h.device.has_attach_handler());
    assert!(wait_until(TIMEOUT, || !h.camera.is_capturing()));
    assert_eq!(h.camera.play(), Err(CameraError::NotConnected));
}

#[test]
fn test_stop_finishes_recording() {
    let h = Harness::new(fast_device());
    let videos = watch_paths(|cb| h.camera.on_new_video(Some(cb)));
    h.camera.play().unwrap();
    h.camera.begin_record().unwrap();
    assert!(wait_until(TIMEOUT, || h.root.join("videos").exists()));

    h.camera.stop().unwrap();

    assert!(!h.camera.is_recording());
    assert_eq!(h.camera.state(), SessionState::Open);
    let recorded = videos.recv_timeout(TIMEOUT).unwrap();
    assert!(recorded.join("manifest.json").exists());
    assert!(wait_until(TIMEOUT, || !h.camera.is_capturing()));

    // Streaming again does not reopen the finished clip
    h.camera.play().unwrap();
    assert_eq!(h.camera.state(), SessionState::Streaming);
    assert!(!h.camera.is_recording());
    assert!(videos.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_busy_and_undecodable_frames_are_skipped() {
    let h = Harness::new(fast_device());
    h.camera.play().unwrap();
    assert!(wait_until(TIMEOUT, || h.camera.display().current().is_some()));
    let surface = h.camera.display().current().unwrap();

    h.device.fail_live_view(30);
    h.device.corrupt_live_view(10);
    let before = surface.generation();

    // Ten undecodable images are served, then real frames resume
    assert!(wait_until(TIMEOUT, || surface.generation() > before + 3));
    assert!(h.device.frames_served() >= 10);
    assert_eq!(h.camera.state(), SessionState::Streaming);
    assert!(h.camera.is_capturing());
    assert!(Arc::ptr_eq(&h.camera.display().current().unwrap(), &surface));
}

#[test]
fn test_frame_size_change_publishes_new_surface() {
    let h = Harness::new(fast_device());
    let sizes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sizes);
    h.camera
        .on_display_source_changed(Some(Arc::new(move |surface| {
            if let Some(surface) = surface {
                sink.lock().unwrap().push((surface.width(), surface.height()));
            }
        })));
    h.camera.play().unwrap();
    assert!(wait_until(TIMEOUT, || sizes.lock().unwrap().first() == Some(&(64, 48))));

    h.device.set_frame_size(80, 60);

    assert!(wait_until(TIMEOUT, || sizes.lock().unwrap().last() == Some(&(80, 60))));
    let current = h.camera.display().current().unwrap();
    assert_eq!((current.width(), current.height()), (80, 60));
    assert_eq!(current.stride(), 80 * 3);
    assert_eq!(sizes.lock().unwrap().len(), 2);
}

#[test]
fn test_failed_session_open_rolls_back() {
    let h = Harness::new(fast_device());
    h.device.fail_open_session(DeviceStatus::DEVICE_BUSY);

    let err = h.camera.init().unwrap_err();

    assert_eq!(err.status(), Some(DeviceStatus::DEVICE_BUSY));
    assert!(err.to_string().contains("open session"));
    assert_eq!(h.camera.state(), SessionState::Idle);
    assert!(!h.device.is_session_open());
    assert!(h.device.calls().contains(&GatewayCall::ReleaseDevice));
    assert!(h.device.has_attach_handler());

    // The failure was one-shot; a retry opens normally
    h.camera.init().unwrap();
    assert_eq!(h.camera.state(), SessionState::Open);
}

#[test]
fn test_missing_jpeg_quality_does_not_fail_init() {
    let h = Harness::new(fast_device());
    h.device.set_allowed_values(PropertyId::ImageQuality, vec![0x0013_0013, 0x0010_0010]);

    h.camera.init().unwrap();

    assert_eq!(h.camera.state(), SessionState::Open);
    assert_eq!(h.device.property_writes(PropertyId::ImageQuality), 0);
    assert_eq!(h.camera.property(PropertyId::ImageQuality), Some(0x0013_0013));
    // The remaining defaults are still pushed
    assert_eq!(h.device.property_writes(PropertyId::ExposureCompensation), 1);
}
