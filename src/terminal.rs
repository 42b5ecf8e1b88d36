// SPDX-License-Identifier: GPL-3.0-only

//! Terminal-based live-view host
//!
//! Drives a [`Camera`] on the virtual device and renders live view to the
//! terminal using Unicode half-block characters for improved vertical
//! resolution. The terminal thread is the UI thread: it pumps the UI task
//! queue and acts as the display-refresh consumer.

use crate::backends::camera::DeviceLock;
use crate::backends::virtual_camera::VirtualDevice;
use crate::config::Config;
use crate::media::frame::PixelFormat;
use crate::pipelines::display::{DisplayBridge, Presentation};
use crate::session::{Camera, SessionState};
use crate::ui::{self, UiDispatcher};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use std::io::{self, stdout};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Display refresh interval
const REFRESH_INTERVAL: Duration = Duration::from_millis(16);

/// Run the terminal live-view host
pub fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    init_file_logging();

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let result = run_app(&mut terminal, config);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Send logs to a file; stderr would corrupt the screen
fn init_file_logging() {
    let path = std::env::temp_dir().join("tether-camera.log");
    let Ok(file) = std::fs::File::create(&path) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let (ui_context, mut dispatcher) = ui::channel();
    // Claim the UI thread before anything is queued
    dispatcher.run_pending();

    let device = VirtualDevice::new("Virtual EOS").with_frame_size(320, 240);
    let _pump = device.start_event_pump(Duration::from_millis(10))?;
    let camera = Camera::builder(DeviceLock::new(device), ui_context)
        .config(config)
        .build();

    let last_asset: Arc<Mutex<Option<PathBuf>>> = Arc::default();
    let sink = Arc::clone(&last_asset);
    camera.on_new_image(Some(Arc::new(move |path: &Path| {
        *sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(path.to_path_buf());
    })));
    let sink = Arc::clone(&last_asset);
    camera.on_new_video(Some(Arc::new(move |path: &Path| {
        *sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(path.to_path_buf());
    })));

    let display = camera.display();
    let started = Instant::now();
    let mut frame_widget = FrameWidget::new();
    let mut show_help = false;
    let mut status_message = match camera.play() {
        Ok(()) => build_status_message(&camera),
        Err(e) => {
            error!(error = %e, "Failed to start live view");
            format!("Error: {}", e)
        }
    };

    loop {
        pump(&mut dispatcher, &display, started, &mut frame_widget);
        if let Some(path) = last_asset
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            status_message = format!("Saved: {}", path.display());
        }

        // Draw
        terminal.draw(|f| {
            let area = f.area();

            // Reserve bottom line for status
            let camera_area = Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height.saturating_sub(1),
            };

            f.render_widget(&frame_widget, camera_area);

            let status_area = Rect {
                x: area.x,
                y: area.height.saturating_sub(1),
                width: area.width,
                height: 1,
            };

            let status = StatusBar {
                message: &status_message,
            };
            f.render_widget(status, status_area);
        })?;

        // Handle input with timeout for the next refresh
        if event::poll(REFRESH_INTERVAL)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            // Ctrl+C or 'q' to quit
            if key.code == KeyCode::Char('q')
                || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
            {
                break;
            }

            let outcome = match key.code {
                KeyCode::Char(' ') => {
                    show_help = false;
                    if camera.state() == SessionState::Idle || camera.state() == SessionState::Open {
                        camera.play()
                    } else {
                        camera.stop()
                    }
                }
                KeyCode::Char('r') => {
                    show_help = false;
                    if camera.is_recording() {
                        camera.end_record().map(|_| ())
                    } else {
                        camera.begin_record()
                    }
                }
                KeyCode::Char('p') => {
                    show_help = false;
                    camera.take_picture()
                }
                KeyCode::Char('h') => {
                    show_help = !show_help;
                    Ok(())
                }
                _ => Ok(()),
            };

            status_message = match outcome {
                Err(e) => {
                    error!(error = %e, "Camera operation failed");
                    format!("Error: {}", e)
                }
                Ok(()) if show_help => build_help_message(),
                Ok(()) => build_status_message(&camera),
            };
        }
    }

    info!("Terminal host exiting");
    camera.dispose();
    // Deliver the final display clear and any pending events
    dispatcher.run_pending();
    Ok(())
}

/// Run queued UI work, then act as the display-refresh consumer
fn pump(
    dispatcher: &mut UiDispatcher,
    display: &DisplayBridge,
    started: Instant,
    widget: &mut FrameWidget,
) {
    dispatcher.run_pending();
    if display.current().is_none() {
        widget.clear();
        return;
    }
    if let Some(presentation) = display.on_refresh_tick(started.elapsed()) {
        widget.update(&presentation);
    }
}

fn build_status_message(camera: &Camera) -> String {
    let device = camera.device_name().unwrap_or_else(|| "no device".into());
    let state = match camera.state() {
        SessionState::Idle => "idle",
        SessionState::Open => "open",
        SessionState::Streaming => "live",
        SessionState::Recording => "REC",
    };
    format!(
        "{} [{}] | space play/stop | 'r' record | 'p' picture | 'h' help | 'q' quit",
        device, state
    )
}

fn build_help_message() -> String {
    String::from("space: Play/stop live view | r: Record | p: Take picture | h: Toggle help | q/Ctrl+C: Quit")
}

/// Copy of the last presented surface
struct FrameSnapshot {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    pixels: Vec<u8>,
}

/// Widget that renders a frame using half-block characters
struct FrameWidget {
    frame: Option<FrameSnapshot>,
}

impl FrameWidget {
    fn new() -> Self {
        Self { frame: None }
    }

    fn update(&mut self, presentation: &Presentation) {
        let surface = &presentation.surface;
        self.frame = Some(FrameSnapshot {
            width: surface.width(),
            height: surface.height(),
            stride: surface.stride(),
            format: surface.format(),
            pixels: surface.with_pixels(<[u8]>::to_vec),
        });
    }

    fn clear(&mut self) {
        self.frame = None;
    }
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = self.frame.as_ref().filter(|f| f.width > 0 && f.height > 0) else {
            let msg = "No live view";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, ratatui::style::Style::default());
            }
            return;
        };

        let view = fit_to_cells(frame.width, frame.height, area);
        if view.width == 0 || view.height == 0 {
            return;
        }

        // One cell shows two source rows: upper half as fg, lower half as bg
        let rows = u32::from(view.height) * 2;
        for cy in 0..view.height {
            let top = u32::from(cy) * 2 * frame.height / rows;
            let bottom = (u32::from(cy) * 2 + 1) * frame.height / rows;
            for cx in 0..view.width {
                let sx = u32::from(cx) * frame.width / u32::from(view.width);
                if let Some(cell) = buf.cell_mut((view.x + cx, view.y + cy)) {
                    cell.set_char('▀')
                        .set_fg(sample_pixel(frame, sx, top))
                        .set_bg(sample_pixel(frame, sx, bottom));
                }
            }
        }
    }
}

/// Largest centered cell rectangle inside `area` that keeps the frame's
/// aspect ratio, counting two pixel rows per cell
fn fit_to_cells(width: u32, height: u32, area: Rect) -> Rect {
    let cols = u32::from(area.width);
    let pixel_rows = u32::from(area.height) * 2;
    let (w, rows) = if cols * height > pixel_rows * width {
        (pixel_rows * width / height, pixel_rows)
    } else {
        (cols, cols * height / width)
    };
    let (w, h) = (w as u16, (rows / 2) as u16);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}

fn sample_pixel(frame: &FrameSnapshot, x: u32, y: u32) -> Color {
    let x = x.min(frame.width - 1) as usize;
    let y = y.min(frame.height - 1) as usize;
    let idx = y * frame.stride + x * frame.format.bytes_per_pixel();
    let Some(px) = frame.pixels.get(idx..idx + 3) else {
        return Color::Black;
    };
    match frame.format {
        PixelFormat::Rgb24 => Color::Rgb(px[0], px[1], px[2]),
        PixelFormat::Bgr24 => Color::Rgb(px[2], px[1], px[0]),
    }
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Fill background
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            ratatui::style::Style::default()
                .fg(Color::White)
                .bg(Color::DarkGray),
        );
    }
}
