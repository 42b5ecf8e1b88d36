// SPDX-License-Identifier: GPL-3.0-only

//! Headless demo against the virtual device
//!
//! Runs the whole controller once: live view, a paced recording and a
//! picture that arrives through the transfer ingestor. Prints the produced
//! paths.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};
use tether_camera::ui;
use tether_camera::{Camera, Config, DeviceLock, VirtualDevice};

/// Wait for the first live-view frames before recording
const WARMUP: Duration = Duration::from_millis(500);

/// How long to wait for the captured picture to arrive
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);

pub fn run_demo(
    mut config: Config,
    duration: u64,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = output {
        config.image_dir = dir.clone();
        config.video_dir = dir;
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    let (ui_context, dispatcher) = ui::channel();
    dispatcher.spawn()?;

    let device = VirtualDevice::new("Virtual EOS").with_frame_interval(Duration::from_millis(30));
    let _pump = device.start_event_pump(Duration::from_millis(10))?;

    let camera = Camera::builder(DeviceLock::new(device.clone()), ui_context)
        .config(config)
        .build();

    let (image_tx, image_rx) = mpsc::channel::<PathBuf>();
    camera.on_new_image(Some(Arc::new(move |path: &Path| {
        let _ = image_tx.send(path.to_path_buf());
    })));

    camera.play()?;
    println!(
        "Connected to {}",
        camera.device_name().unwrap_or_else(|| "unknown device".into())
    );
    println!("Live view running ({:?})", camera.state());
    sleep_unless(&interrupted, WARMUP);

    camera.begin_record()?;
    println!("Recording for {} seconds... (Ctrl+C to stop early)", duration);
    sleep_unless(&interrupted, Duration::from_secs(duration));
    let video = camera.end_record()?;

    camera.take_picture()?;
    let image = image_rx.recv_timeout(TRANSFER_TIMEOUT).ok();

    camera.stop()?;
    println!("Live view stopped after {} frames", device.frames_served());

    match video {
        Some(path) => println!("Video saved to: {}", path.display()),
        None => println!("No video frames were recorded"),
    }
    match image {
        Some(path) => println!("Photo saved to: {}", path.display()),
        None => println!("Picture did not arrive within {:?}", TRANSFER_TIMEOUT),
    }

    camera.dispose();
    Ok(())
}

fn sleep_unless(interrupted: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline && !interrupted.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(20));
    }
}
