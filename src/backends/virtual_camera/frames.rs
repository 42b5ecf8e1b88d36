// SPDX-License-Identifier: GPL-3.0-only

//! Test pattern images produced by the virtual device

use image::{ImageEncoder, Rgb, RgbImage};

/// Moving color-bar pattern, JPEG encoded
///
/// `sequence` shifts the bars so consecutive frames differ.
pub fn test_pattern_jpeg(width: u32, height: u32, sequence: u64) -> Result<Vec<u8>, String> {
    const BARS: [[u8; 3]; 7] = [
        [235, 235, 235],
        [235, 235, 16],
        [16, 235, 235],
        [16, 235, 16],
        [235, 16, 235],
        [235, 16, 16],
        [16, 16, 235],
    ];
    let width = width.max(1);
    let height = height.max(1);
    let shift = (sequence % width as u64) as u32;
    let bar_width = (width / BARS.len() as u32).max(1);

    let img = RgbImage::from_fn(width, height, |x, y| {
        // Last eighth of the image is a ticker row that moves twice as fast
        if y >= height - height / 8 {
            let on = ((x + shift * 2) / 8) % 2 == 0;
            return if on { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) };
        }
        let bar = (((x + shift) / bar_width) as usize) % BARS.len();
        Rgb(BARS[bar])
    });

    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 75)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| e.to_string())?;
    Ok(out)
}
