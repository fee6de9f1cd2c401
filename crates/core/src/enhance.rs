use image::DynamicImage;

/// Share of the darkest and brightest pixels ignored when picking the
/// black and white points, in tenths of a percent.
const CLIP_PERMILLE: u64 = 5;

/// Automatic tonal adjustment: a levels stretch that maps the clipped
/// luminance range of the image onto the full 0-255 range, applied with the
/// same curve to every colour channel so hues are preserved.
///
/// The result depends only on the input pixels, so enhancing the same
/// source twice gives identical output.
pub fn auto_enhance(image: &DynamicImage) -> DynamicImage {
    let lut = levels_lut(image);
    if image.color().has_alpha() {
        let mut rgba = image.to_rgba8();
        for px in rgba.pixels_mut() {
            for c in &mut px.0[..3] {
                *c = lut[*c as usize];
            }
        }
        DynamicImage::ImageRgba8(rgba)
    } else {
        let mut rgb = image.to_rgb8();
        for px in rgb.pixels_mut() {
            for c in &mut px.0 {
                *c = lut[*c as usize];
            }
        }
        DynamicImage::ImageRgb8(rgb)
    }
}

/// Build the 256-entry lookup table from the luminance histogram.
fn levels_lut(image: &DynamicImage) -> [u8; 256] {
    let mut histogram = [0u64; 256];
    let luma = image.to_luma8();
    for px in luma.pixels() {
        histogram[px.0[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    let clip = total * CLIP_PERMILLE / 1000;
    let low = percentile_from_bottom(&histogram, clip);
    let high = percentile_from_top(&histogram, clip);

    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate() {
        *slot = if high <= low {
            v as u8
        } else {
            let stretched = (v as i32 - low as i32) * 255 / (high as i32 - low as i32);
            stretched.clamp(0, 255) as u8
        };
    }
    lut
}

fn percentile_from_bottom(histogram: &[u64; 256], clip: u64) -> u8 {
    let mut seen = 0u64;
    for (v, count) in histogram.iter().enumerate() {
        seen += count;
        if seen > clip {
            return v as u8;
        }
    }
    255
}

fn percentile_from_top(histogram: &[u64; 256], clip: u64) -> u8 {
    let mut seen = 0u64;
    for (v, count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen > clip {
            return v as u8;
        }
    }
    0
}
